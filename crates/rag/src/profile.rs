use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::prompt::Language;

const QUOTE_MARKDOWN_LIMIT: usize = 200;

/// Big Five scores in [0, 1], serialized with the single-letter OCEAN keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BigFive {
    #[serde(rename = "O", skip_serializing_if = "Option::is_none")]
    pub openness: Option<f64>,
    #[serde(rename = "C", skip_serializing_if = "Option::is_none")]
    pub conscientiousness: Option<f64>,
    #[serde(rename = "E", skip_serializing_if = "Option::is_none")]
    pub extraversion: Option<f64>,
    #[serde(rename = "A", skip_serializing_if = "Option::is_none")]
    pub agreeableness: Option<f64>,
    #[serde(rename = "N", skip_serializing_if = "Option::is_none")]
    pub neuroticism: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub chunk_id: String,
}

/// Structured analysis record. A `None` field was absent from the source,
/// which is distinct from an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub big_five: Option<BigFive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_traits: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coping_strategies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_arc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_quotes: Option<Vec<Quote>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Profile {
    /// Converts a parsed model mapping, tolerating loose typing: numeric
    /// strings count as scores, scalar list items are stringified and scores
    /// outside [0, 1] are clamped.
    pub fn from_json_map(map: &Map<String, Value>) -> Self {
        Self {
            character: map.get("character").and_then(text_field),
            big_five: map.get("big_five").and_then(big_five_field),
            attachment_style: map.get("attachment_style").and_then(text_field),
            core_traits: map.get("core_traits").map(list_field),
            coping_strategies: map.get("coping_strategies").map(list_field),
            emotional_arc: map.get("emotional_arc").and_then(text_field),
            clinical_patterns: map.get("clinical_patterns").map(list_field),
            supporting_quotes: map.get("supporting_quotes").map(quotes_field),
            limitations: map.get("limitations").map(list_field),
            confidence: map
                .get("confidence")
                .and_then(|v| score_field("confidence", v)),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn list_field(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_field).collect(),
        Value::Null => Vec::new(),
        other => text_field(other).into_iter().collect(),
    }
}

fn score_field(name: &str, value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    if !(0.0..=1.0).contains(&raw) {
        warn!(field = name, value = raw, "score outside [0, 1], clamping");
    }
    Some(raw.clamp(0.0, 1.0))
}

fn big_five_field(value: &Value) -> Option<BigFive> {
    let map = value.as_object()?;
    let get = |key: &str| map.get(key).and_then(|v| score_field(key, v));
    Some(BigFive {
        openness: get("O"),
        conscientiousness: get("C"),
        extraversion: get("E"),
        agreeableness: get("A"),
        neuroticism: get("N"),
    })
}

fn quotes_field(value: &Value) -> Vec<Quote> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => {
                let field = |key: &str| obj.get(key).and_then(text_field).unwrap_or_default();
                Some(Quote {
                    text: field("text"),
                    source: field("source"),
                    chunk_id: field("chunk_id"),
                })
            }
            Value::String(text) => Some(Quote {
                text: text.clone(),
                ..Quote::default()
            }),
            _ => None,
        })
        .collect()
}

/// Where a report's profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileOrigin {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub profile: Profile,
    pub markdown: String,
    pub origin: ProfileOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

struct Labels {
    unknown: &'static str,
    heading: &'static str,
    big_five: &'static str,
    scores: [&'static str; 5],
    attachment: &'static str,
    core_traits: &'static str,
    coping: &'static str,
    arc: &'static str,
    clinical: &'static str,
    quotes: &'static str,
    limitations: &'static str,
    confidence: &'static str,
}

const PT_LABELS: Labels = Labels {
    unknown: "Desconhecido",
    heading: "Perfil",
    big_five: "Big Five (OCEAN)",
    scores: [
        "Abertura (O)",
        "Conscienciosidade (C)",
        "Extroversão (E)",
        "Amabilidade (A)",
        "Neuroticismo (N)",
    ],
    attachment: "Estilo de Apego",
    core_traits: "Traços Centrais",
    coping: "Estratégias de Coping",
    arc: "Arco Emocional",
    clinical: "Padrões Clínicos",
    quotes: "Citações de Apoio",
    limitations: "Limitações da Análise",
    confidence: "Confiança",
};

const EN_LABELS: Labels = Labels {
    unknown: "Unknown",
    heading: "Profile",
    big_five: "Big Five (OCEAN)",
    scores: [
        "Openness (O)",
        "Conscientiousness (C)",
        "Extraversion (E)",
        "Agreeableness (A)",
        "Neuroticism (N)",
    ],
    attachment: "Attachment Style",
    core_traits: "Core Traits",
    coping: "Coping Strategies",
    arc: "Emotional Arc",
    clinical: "Clinical Patterns",
    quotes: "Supporting Quotes",
    limitations: "Analysis Limitations",
    confidence: "Confidence",
};

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn list_block(out: &mut Vec<String>, title: &str, items: Option<&Vec<String>>) {
    match items.filter(|items| !items.is_empty()) {
        Some(items) => {
            out.push(format!("**{title}:**"));
            out.extend(items.iter().map(|item| format!("- {item}")));
            out.push(String::new());
        }
        None => out.push(format!("**{title}:** _n/a_\n")),
    }
}

/// Markdown summary of a profile, used when the model returned JSON without
/// the Markdown part.
pub fn profile_to_markdown(profile: &Profile, language: Language) -> String {
    let labels = match language {
        Language::Pt => &PT_LABELS,
        Language::En => &EN_LABELS,
    };
    let mut md = vec![format!(
        "# {}: {}",
        labels.heading,
        profile.character.as_deref().unwrap_or(labels.unknown)
    )];

    let big_five = profile.big_five.unwrap_or_default();
    md.push(format!("\n**{}:**", labels.big_five));
    let scores = [
        big_five.openness,
        big_five.conscientiousness,
        big_five.extraversion,
        big_five.agreeableness,
        big_five.neuroticism,
    ];
    for (label, score) in labels.scores.iter().zip(scores) {
        md.push(format!("- {label}: {}", or_na(score)));
    }
    md.push(String::new());

    md.push(format!(
        "**{}:** {}\n",
        labels.attachment,
        or_na(profile.attachment_style.as_deref())
    ));
    list_block(&mut md, labels.core_traits, profile.core_traits.as_ref());
    list_block(&mut md, labels.coping, profile.coping_strategies.as_ref());
    md.push(format!(
        "**{}:** {}\n",
        labels.arc,
        or_na(profile.emotional_arc.as_deref())
    ));
    list_block(&mut md, labels.clinical, profile.clinical_patterns.as_ref());

    match profile.supporting_quotes.as_ref().filter(|q| !q.is_empty()) {
        Some(quotes) => {
            md.push(format!("**{}:**", labels.quotes));
            for quote in quotes {
                let mut text: String = quote.text.chars().take(QUOTE_MARKDOWN_LIMIT).collect();
                if quote.text.chars().count() > QUOTE_MARKDOWN_LIMIT {
                    text.push_str("...");
                }
                let chunk_id = if quote.chunk_id.is_empty() {
                    "n/a"
                } else {
                    quote.chunk_id.as_str()
                };
                md.push(format!("- ({chunk_id}) \"{text}\""));
            }
            md.push(String::new());
        }
        None => md.push(format!("**{}:** _n/a_\n", labels.quotes)),
    }

    list_block(&mut md, labels.limitations, profile.limitations.as_ref());
    md.push(format!(
        "**{}:** {}",
        labels.confidence,
        or_na(profile.confidence)
    ));
    md.join("\n").trim().to_string()
}
