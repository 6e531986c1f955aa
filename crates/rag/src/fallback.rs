use psyche_index::RetrievalHit;

use crate::profile::{BigFive, Profile, ProfileOrigin, ProfileReport, Quote};
use crate::prompt::Language;

const MAX_QUOTES: usize = 4;
const QUOTE_CHAR_LIMIT: usize = 160;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn shorten(text: &str) -> String {
    let mut out: String = text.chars().take(QUOTE_CHAR_LIMIT).collect();
    if text.chars().count() > QUOTE_CHAR_LIMIT {
        out.push_str("...");
    }
    out
}

/// Deterministic profile built from retrieved evidence alone. Psych hits
/// are accepted for signature parity with generation but not used.
pub fn template_fallback(
    character: &str,
    char_hits: &[RetrievalHit],
    _psych_hits: &[RetrievalHit],
    language: Language,
) -> ProfileReport {
    let quotes: Vec<Quote> = char_hits
        .iter()
        .take(MAX_QUOTES)
        .map(|hit| Quote {
            text: shorten(&hit.text),
            source: "corpus".to_string(),
            chunk_id: hit.id.clone(),
        })
        .collect();
    let profile = Profile {
        character: Some(character.to_string()),
        big_five: Some(BigFive {
            openness: Some(0.7),
            conscientiousness: Some(0.6),
            extraversion: Some(0.4),
            agreeableness: Some(0.6),
            neuroticism: Some(0.5),
        }),
        attachment_style: Some("mixed/uncertain".to_string()),
        core_traits: Some(strings(&["goal-directed", "emotionally guarded"])),
        coping_strategies: Some(strings(&["planning", "information-seeking"])),
        emotional_arc: Some("fluctuating affect with moments of restraint".to_string()),
        clinical_patterns: Some(strings(&["speculative defensive sarcasm"])),
        supporting_quotes: Some(quotes),
        limitations: Some(strings(&["template fallback; no LLM generation"])),
        confidence: Some(0.6),
    };
    let markdown = fallback_markdown(&profile, character, language);
    ProfileReport {
        profile,
        markdown,
        origin: ProfileOrigin::Fallback,
        fallback_reason: None,
    }
}

fn fallback_markdown(profile: &Profile, character: &str, language: Language) -> String {
    let (heading, traits, attachment, arc, quotes_title) = match language {
        Language::Pt => (
            "Perfil",
            "Traços centrais",
            "Estilo de apego",
            "Arco emocional",
            "Citações (evidência)",
        ),
        Language::En => (
            "Profile",
            "Core traits",
            "Attachment style",
            "Emotional arc",
            "Quotes (evidence)",
        ),
    };
    let core_traits = profile.core_traits.as_deref().unwrap_or_default().join(", ");
    let mut md = format!(
        "# {heading}: {character}\n- {traits}: {core_traits}\n- {attachment}: {}\n- {arc}: {}\n\n### {quotes_title}\n",
        profile.attachment_style.as_deref().unwrap_or_default(),
        profile.emotional_arc.as_deref().unwrap_or_default(),
    );
    let lines: Vec<String> = profile
        .supporting_quotes
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|q| format!("- ({}) {}", q.chunk_id, q.text))
        .collect();
    md.push_str(&lines.join("\n"));
    md
}
