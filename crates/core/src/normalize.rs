use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Case-insensitive substring test against any of `keywords`.
pub fn contains_any<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lowered.contains(&keyword.as_ref().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize_text("  Hello \n\t world  \r\n"), "Hello world");
        assert_eq!(normalize_text("a\u{00a0}\u{2003}b"), "a b");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n "), "");
    }

    #[test]
    fn contains_any_ignores_case() {
        assert!(contains_any("Elizabeth Bennet smiled", &["bennet"]));
        assert!(contains_any("ELIZA", &["Eliza"]));
        assert!(!contains_any("Mr. Darcy", &["bennet", "lizzy"]));
        assert!(!contains_any::<&str>("anything", &[]));
    }
}
