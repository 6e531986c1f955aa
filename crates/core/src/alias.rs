use std::collections::BTreeSet;

use crate::document::Document;
use crate::normalize::contains_any;

/// Lowercase name variants used for coarse mention filtering: the full name,
/// plus the first and last token when the name has several tokens.
pub fn make_aliases(name: &str) -> Vec<String> {
    let lowered = name.trim().to_lowercase();
    if lowered.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = lowered.split_whitespace().collect();
    let mut aliases = BTreeSet::new();
    if parts.len() >= 2 {
        aliases.insert(parts[0].to_string());
        aliases.insert(parts[parts.len() - 1].to_string());
    }
    aliases.insert(lowered.clone());
    aliases.into_iter().collect()
}

/// Documents whose text mentions at least one alias of `name`.
pub fn filter_by_entity<'a>(documents: &'a [Document], name: &str) -> Vec<&'a Document> {
    let aliases = make_aliases(name);
    if aliases.is_empty() {
        return Vec::new();
    }
    documents
        .iter()
        .filter(|doc| contains_any(&doc.text, &aliases))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_token_name_yields_full_first_and_last() {
        assert_eq!(make_aliases("Jane Doe"), vec!["doe", "jane", "jane doe"]);
    }

    #[test]
    fn single_token_name_yields_itself() {
        assert_eq!(make_aliases("Zorro"), vec!["zorro"]);
    }

    #[test]
    fn middle_tokens_are_not_aliases() {
        let aliases = make_aliases("  Mary   Ann Evans ");
        assert_eq!(aliases, vec!["evans", "mary", "mary   ann evans"]);
    }

    #[test]
    fn blank_name_has_no_aliases() {
        assert!(make_aliases("   ").is_empty());
        let docs = vec![Document::new("a.txt", "anything at all")];
        assert!(filter_by_entity(&docs, "").is_empty());
    }

    #[test]
    fn filter_keeps_documents_mentioning_any_alias() {
        let docs = vec![
            Document::new("a.txt", "Jane walked home."),
            Document::new("b.txt", "Nobody relevant here."),
            Document::new("c.txt", "The DOE family estate."),
        ];
        let kept: Vec<&str> = filter_by_entity(&docs, "Jane Doe")
            .into_iter()
            .map(|doc| doc.source.as_str())
            .collect();
        assert_eq!(kept, vec!["a.txt", "c.txt"]);
    }
}
