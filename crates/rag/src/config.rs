use anyhow::{anyhow, Context, Result};
use psyche_core::ChunkConfig;
use psyche_llm::{LlmProvider, DEFAULT_HF_MODEL};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::DEFAULT_EMBEDDING_MODEL;
use crate::retrieval::{DEFAULT_K_CHAR, DEFAULT_K_PSYCH};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsycheConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the `character` and `psych` indices.
    pub root: PathBuf,
    /// Directory of reference Markdown documents.
    pub reference_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            reference_dir: PathBuf::from("psych_corpus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k_char: usize,
    pub k_psych: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_char: DEFAULT_K_CHAR,
            k_psych: DEFAULT_K_PSYCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub language: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub use_llm: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::HuggingFace.as_str().to_string(),
            model: DEFAULT_HF_MODEL.to_string(),
            language: "pt".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            use_llm: false,
        }
    }
}

impl GenerationConfig {
    pub fn provider(&self) -> Result<LlmProvider> {
        LlmProvider::from_str(&self.provider)
            .ok_or_else(|| anyhow!("unknown provider {}", self.provider))
    }
}

impl PsycheConfig {
    /// Reads `path` if it exists (defaults otherwise), then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(root) = get("PSYCHE_STORAGE") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(dir) = get("PSYCHE_REFERENCE_DIR") {
            self.storage.reference_dir = PathBuf::from(dir);
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(model) = get("PSYCHE_LLM_MODEL") {
            self.generation.model = model;
        }
        if let Some(language) = get("PSYCHE_LANGUAGE") {
            self.generation.language = language;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .context("invalid [chunking] section")?;
        self.generation.provider()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_application_settings() {
        let config = PsycheConfig::default();
        assert_eq!(config.chunking.chunk_size, 900);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.k_char, 10);
        assert_eq!(config.retrieval.k_psych, 6);
        assert_eq!(config.embedding.model, "intfloat/multilingual-e5-base");
        assert_eq!(config.generation.model, "meta-llama/Meta-Llama-3-8B-Instruct");
        assert!(!config.generation.use_llm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = PsycheConfig::from_toml_str(
            r#"
[chunking]
chunk_size = 120
overlap = 20

[generation]
language = "en"
use_llm = true
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 120);
        assert_eq!(config.generation.language, "en");
        assert!(config.generation.use_llm);
        assert_eq!(config.retrieval.k_char, 10);
        assert_eq!(config.storage.root, PathBuf::from("storage"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PSYCHE_STORAGE", "/tmp/psyche"),
            ("EMBEDDING_MODEL", "hash:64"),
            ("PSYCHE_LANGUAGE", " "),
        ]
        .into_iter()
        .collect();
        let mut config = PsycheConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/psyche"));
        assert_eq!(config.embedding.model, "hash:64");
        assert_eq!(config.generation.language, "pt");
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let config = PsycheConfig::from_toml_str("[chunking]\nchunk_size = 10\noverlap = 10\n").unwrap();
        assert!(config.validate().is_err());
        let bad_provider = PsycheConfig::from_toml_str("[generation]\nprovider = \"nope\"\n").unwrap();
        assert!(bad_provider.validate().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PsycheConfig::load(Some(dir.path().join("psyche.toml").as_path())).unwrap();
        assert_eq!(config.chunking, ChunkConfig::default());
        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(PsycheConfig::from_toml_str("").unwrap(), PsycheConfig::default());
    }
}
