use anyhow::{bail, Context, Result};
use psyche_core::{
    bootstrap_reference_corpus, filter_by_entity, load_reference_corpus, make_aliases,
    ChunkConfig, Chunker, Document, Embedder,
};
use psyche_index::IndexStore;
use psyche_llm::{LlmClient, LlmProvider, LlmRequest};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::fallback::template_fallback;
use crate::parser::extract_json_then_md;
use crate::profile::{profile_to_markdown, Profile, ProfileOrigin, ProfileReport};
use crate::prompt::{build_prompt, Language, SYSTEM_PROMPT};
use crate::retrieval::{ensemble_retrieve, Domain, EnsembleHits, EnsembleQuery};

/// Anything that turns a system message and a prompt into raw model text.
pub trait TextGenerator: Send + Sync {
    fn describe(&self) -> String;

    fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Blocking adapter over the hosted chat client. The client is created per
/// call, so a missing credential surfaces as a generation error.
#[derive(Debug, Clone)]
pub struct LlmGenerator {
    provider: LlmProvider,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        let defaults = LlmRequest::default();
        Self {
            provider,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            provider: config.provider()?,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl TextGenerator for LlmGenerator {
    fn describe(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }

    fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let client = LlmClient::new(self.provider, self.model.clone())?;
        let response = client.generate_blocking(&LlmRequest {
            system: Some(system.to_string()),
            user: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..LlmRequest::default()
        })?;
        info!(
            generator = %self.describe(),
            route = ?response.route,
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "model responded"
        );
        Ok(response.content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub aliases: Vec<String>,
    pub matched_documents: usize,
    pub used_all_documents: bool,
    pub character_chunks: usize,
    pub psych_chunks: usize,
    /// Embedding dimension of both indices.
    pub dim: usize,
}

/// Writes the default reference documents if the directory is empty and
/// loads it.
pub fn prepare_reference_corpus(dir: &Path) -> Result<Vec<Document>> {
    bootstrap_reference_corpus(dir)
        .with_context(|| format!("bootstrapping reference corpus in {}", dir.display()))?;
    let docs = load_reference_corpus(dir)
        .with_context(|| format!("loading reference corpus from {}", dir.display()))?;
    Ok(docs)
}

/// Rebuilds the character and psych indices from scratch.
///
/// The corpus is narrowed to documents mentioning the character; when none
/// do, every document is indexed instead.
pub fn build_indices(
    store: &IndexStore,
    embedder: &dyn Embedder,
    character: &str,
    corpus: &[Document],
    reference: &[Document],
    chunking: ChunkConfig,
) -> Result<BuildSummary> {
    if corpus.iter().all(Document::is_blank) {
        bail!("corpus is empty: provide at least one non-empty document");
    }
    let chunker = Chunker::new(chunking)?;
    let aliases = make_aliases(character);
    let matched = filter_by_entity(corpus, character);
    let matched_documents = matched.len();
    let used_all_documents = matched.is_empty();
    let selected: Vec<&Document> = if used_all_documents {
        warn!(
            character,
            documents = corpus.len(),
            "no document mentions the character, indexing the whole corpus"
        );
        corpus.iter().collect()
    } else {
        matched
    };

    let character_chunks = chunker.chunk_documents(selected);
    let psych_chunks = chunker.chunk_documents(reference);
    let character_index = store
        .build(Domain::Character.index_name(), &character_chunks, embedder)
        .context("building character index")?;
    let psych_index = store
        .build(Domain::Psych.index_name(), &psych_chunks, embedder)
        .context("building psych index")?;
    info!(
        character,
        matched_documents,
        character_chunks = character_chunks.len(),
        psych_chunks = psych_chunks.len(),
        "indices ready"
    );
    Ok(BuildSummary {
        aliases,
        matched_documents,
        used_all_documents,
        character_chunks: character_index.vectors,
        psych_chunks: psych_index.vectors,
        dim: character_index.dim,
    })
}

#[derive(Debug, Clone)]
pub struct ProfileRequest {
    pub character: String,
    pub language: Language,
    pub query: EnsembleQuery,
    pub user_context: Option<String>,
}

impl ProfileRequest {
    pub fn new(character: &str, language: Language) -> Self {
        Self {
            character: character.trim().to_string(),
            language,
            query: EnsembleQuery::for_character(character),
            user_context: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileOutcome {
    #[serde(flatten)]
    pub report: ProfileReport,
    pub prompt: String,
    pub hits: EnsembleHits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

/// Retrieves evidence and theory, prompts the generator and parses its
/// answer. Without a generator, on generator errors and on output without a
/// JSON object the deterministic template is used and the reason recorded.
pub fn generate_profile(
    store: &IndexStore,
    embedder: &dyn Embedder,
    generator: Option<&dyn TextGenerator>,
    request: &ProfileRequest,
) -> Result<ProfileOutcome> {
    let hits = ensemble_retrieve(store, embedder, &request.query)?;
    let prompt = build_prompt(
        &request.character,
        &hits.character,
        &hits.psych,
        request.language,
        request.user_context.as_deref(),
    );

    let fallback = |reason: String| {
        warn!(character = %request.character, %reason, "using template profile");
        let mut report =
            template_fallback(&request.character, &hits.character, &hits.psych, request.language);
        report.fallback_reason = Some(reason);
        report
    };

    let Some(generator) = generator else {
        let report = fallback("generation disabled".to_string());
        return Ok(ProfileOutcome {
            report,
            prompt,
            hits,
            raw_output: None,
        });
    };

    let (report, raw_output) = match generator.generate(SYSTEM_PROMPT, &prompt) {
        Err(err) => (fallback(format!("generation unavailable: {err:#}")), None),
        Ok(raw) => {
            let parsed = extract_json_then_md(&raw);
            let report = if parsed.json.is_empty() {
                fallback("model output held no JSON object".to_string())
            } else {
                let profile = Profile::from_json_map(&parsed.json);
                let markdown = if parsed.markdown.trim().is_empty() {
                    profile_to_markdown(&profile, request.language)
                } else {
                    parsed.markdown
                };
                ProfileReport {
                    profile,
                    markdown,
                    origin: ProfileOrigin::Model,
                    fallback_reason: None,
                }
            };
            (report, Some(raw))
        }
    };
    Ok(ProfileOutcome {
        report,
        prompt,
        hits,
        raw_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_follows_generation_config() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            ..GenerationConfig::default()
        };
        let generator = LlmGenerator::from_config(&config).unwrap();
        assert_eq!(generator.describe(), "openai:gpt-4.1-mini");
        assert_eq!(
            generator.with_model("other").describe(),
            "openai:other"
        );
        let bad = GenerationConfig {
            provider: "carrier-pigeon".to_string(),
            ..GenerationConfig::default()
        };
        assert!(LlmGenerator::from_config(&bad).is_err());
    }

    #[test]
    fn request_uses_default_retrieval_depths() {
        let request = ProfileRequest::new("  Ahab ", Language::En);
        assert_eq!(request.character, "Ahab");
        assert_eq!(request.query.k_char, 10);
        assert_eq!(request.query.k_psych, 6);
        assert!(request.query.character_query.starts_with("Ahab behaviour"));
    }
}
