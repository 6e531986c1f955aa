use psyche_index::RetrievalHit;
use serde::{Deserialize, Serialize};

const HIT_CHAR_LIMIT: usize = 800;

pub const PROFILE_JSON_SCHEMA: &str = r#"{
  "character": "string",
  "big_five": {"O": "0-1", "C": "0-1", "E": "0-1", "A": "0-1", "N": "0-1"},
  "attachment_style": "string",
  "core_traits": ["string", "..."],
  "coping_strategies": ["string", "..."],
  "emotional_arc": "string",
  "clinical_patterns": ["string", "..."],
  "supporting_quotes": [{"text": "string", "source": "string", "chunk_id": "string"}],
  "limitations": ["string", "..."],
  "confidence": "0-1"
}"#;

pub const SYSTEM_PROMPT: &str = "You are an expert psychologist. Follow the instructions precisely. \
Return output in TWO parts: (1) a valid JSON strictly following the provided schema; \
(2) then the line --- on its own line; \
(3) then a concise Markdown summary with citations (chunk_id).";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    En,
}

impl Language {
    /// Any tag starting with `pt` (case-insensitive) is Portuguese.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_lowercase().starts_with("pt") {
            Language::Pt
        } else {
            Language::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::En => "en",
        }
    }
}

fn render_hits(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|hit| {
            let text: String = hit.text.chars().take(HIT_CHAR_LIMIT).collect();
            format!("[{}] {}", hit.id, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(
    character: &str,
    char_hits: &[RetrievalHit],
    psych_hits: &[RetrievalHit],
    language: Language,
    user_context: Option<&str>,
) -> String {
    let evidence = render_hits(char_hits);
    let theory = render_hits(psych_hits);
    let user_context = user_context.map(str::trim).filter(|c| !c.is_empty());
    match language {
        Language::Pt => {
            let extra = user_context
                .map(|c| {
                    format!(
                        "\nINSTRUÇÕES ADICIONAIS DO UTILIZADOR:\n{c}\n\n(Incorpora estas instruções na análise, mas mantém o formato JSON + Markdown.)\n"
                    )
                })
                .unwrap_or_default();
            format!(
                "Tu és um psicólogo português a perfilar uma entidade (personagem, figura histórica, etc.).

INSTRUÇÕES CRÍTICAS:
- Usa APENAS as EVIDÊNCIAS e TEORIA fornecidas abaixo
- Usa português europeu (PT-PT), não brasileiro
- Não faças diagnóstico clínico formal; descreve traços e padrões comportamentais
- Primeiro devolve um JSON válido com as chaves do schema
- Depois adiciona um resumo em Markdown com citações (usar chunk_id)

LINGUAGEM PT-PT:
- Usa \"curioso\" (não \"amoroso\")
- Usa \"consciencioso\" (não \"consciente\")
- Usa \"extrovertido\" (grafia PT-PT)
- Usa \"amável\" ou \"simpático\" (não tradução literal de \"agreeable\")
- Usa \"estável emocionalmente\" vs \"neurótico\"

Entidade a analisar: {character}

JSON_SCHEMA (devolve exatamente estas chaves):
{PROFILE_JSON_SCHEMA}

EVIDÊNCIAS (citações do corpus):
{evidence}

TEORIA (conceitos psicológicos):
{theory}
{extra}
FORMATO DE RESPOSTA:
1. Primeiro: JSON válido com todas as chaves do schema
2. Depois: uma linha apenas com ---
3. Por fim: breve resumo em Markdown formatado, incluindo citações com [chunk_id]

Começa já com o JSON:
"
            )
        }
        Language::En => {
            let extra = user_context
                .map(|c| {
                    format!(
                        "\nADDITIONAL USER INSTRUCTIONS:\n{c}\n\n(Incorporate these instructions in the analysis, but maintain JSON + Markdown format.)\n"
                    )
                })
                .unwrap_or_default();
            format!(
                "You are a psychologist profiling an entity (character, historical figure, etc.).

CRITICAL INSTRUCTIONS:
- Use ONLY the EVIDENCE and THEORY provided below
- Do not make formal clinical diagnoses; describe behavioral patterns and traits
- First return a valid JSON with the schema keys
- Then add a Markdown summary with citations (using chunk_id)

Entity to analyze: {character}

JSON_SCHEMA (return exactly these keys):
{PROFILE_JSON_SCHEMA}

EVIDENCE (corpus quotes):
{evidence}

THEORY (psychological concepts):
{theory}
{extra}
RESPONSE FORMAT:
1. First: Valid JSON with all schema keys
2. Then: a line containing only ---
3. Finally: Brief Markdown summary, including citations with [chunk_id]

Start with the JSON now:
"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, text: &str) -> RetrievalHit {
        RetrievalHit {
            id: id.to_string(),
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn language_tags() {
        assert_eq!(Language::from_tag("pt-PT"), Language::Pt);
        assert_eq!(Language::from_tag("PT"), Language::Pt);
        assert_eq!(Language::from_tag("en"), Language::En);
        assert_eq!(Language::from_tag("fr"), Language::En);
        assert_eq!(Language::from_tag(""), Language::En);
    }

    #[test]
    fn hits_are_tagged_and_truncated() {
        let long = "x".repeat(1000);
        let prompt = build_prompt(
            "Ahab",
            &[hit("moby.txt#chunk0000", &long), hit("moby.txt#chunk0001", "the whale")],
            &[hit("big_five.md#chunk0000", "Big Five")],
            Language::En,
            None,
        );
        assert!(prompt.contains(&format!("[moby.txt#chunk0000] {}\n\n[moby.txt#chunk0001] the whale", "x".repeat(800))));
        assert!(!prompt.contains(&"x".repeat(801)));
        assert!(prompt.contains("[big_five.md#chunk0000] Big Five"));
        assert!(prompt.contains("Entity to analyze: Ahab"));
        assert!(prompt.contains(PROFILE_JSON_SCHEMA));
        assert!(!prompt.contains("ADDITIONAL USER INSTRUCTIONS"));
    }

    #[test]
    fn portuguese_prompt_carries_vocabulary_and_context() {
        let prompt = build_prompt("Ahab", &[], &[], Language::Pt, Some("  foca no conflito  "));
        assert!(prompt.contains("português europeu (PT-PT)"));
        assert!(prompt.contains("\"consciencioso\""));
        assert!(prompt.contains("INSTRUÇÕES ADICIONAIS DO UTILIZADOR:\nfoca no conflito\n"));
        assert!(prompt.contains("---"));
    }

    #[test]
    fn blank_context_is_ignored() {
        let prompt = build_prompt("Ahab", &[], &[], Language::En, Some("   "));
        assert!(!prompt.contains("ADDITIONAL USER INSTRUCTIONS"));
    }
}
