pub mod config;
pub mod embedding;
pub mod fallback;
pub mod parser;
pub mod pipeline;
pub mod profile;
pub mod prompt;
pub mod retrieval;

pub use config::{
    EmbeddingConfig, GenerationConfig, PsycheConfig, RetrievalConfig, StorageConfig,
};
pub use embedding::{EmbeddingClient, HuggingFaceEmbedder, DEFAULT_EMBEDDING_MODEL};
pub use fallback::template_fallback;
pub use parser::{clean_json_str, extract_json_then_md, ParsedResponse};
pub use pipeline::{
    build_indices, generate_profile, prepare_reference_corpus, BuildSummary, LlmGenerator,
    ProfileOutcome, ProfileRequest, TextGenerator,
};
pub use profile::{profile_to_markdown, BigFive, Profile, ProfileOrigin, ProfileReport, Quote};
pub use prompt::{build_prompt, Language, PROFILE_JSON_SCHEMA, SYSTEM_PROMPT};
pub use retrieval::{
    character_query, ensemble_retrieve, Domain, EnsembleHits, EnsembleQuery, THEORY_QUERY,
};
pub use psyche_llm::{LlmClient, LlmError, LlmProvider, LlmRequest, LlmResponse};
