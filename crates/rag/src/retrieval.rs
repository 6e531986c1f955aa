use anyhow::{Context, Result};
use psyche_core::Embedder;
use psyche_index::{IndexStore, RetrievalHit};
use serde::Serialize;
use tracing::info;

pub const THEORY_QUERY: &str = "big five traits attachment styles coping mechanisms defense mechanisms psychological profiling glossary examples";
pub const DEFAULT_K_CHAR: usize = 10;
pub const DEFAULT_K_PSYCH: usize = 6;

/// The two retrieval domains, each persisted as its own named index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Character,
    Psych,
}

impl Domain {
    pub fn index_name(&self) -> &'static str {
        match self {
            Domain::Character => "character",
            Domain::Psych => "psych",
        }
    }
}

pub fn character_query(character: &str) -> String {
    format!(
        "{} behaviour emotions relationships motivations internal conflict key scenes quotes descriptions",
        character.trim()
    )
}

#[derive(Debug, Clone)]
pub struct EnsembleQuery {
    pub character_query: String,
    pub theory_query: String,
    pub k_char: usize,
    pub k_psych: usize,
}

impl EnsembleQuery {
    pub fn for_character(character: &str) -> Self {
        Self {
            character_query: character_query(character),
            theory_query: THEORY_QUERY.to_string(),
            k_char: DEFAULT_K_CHAR,
            k_psych: DEFAULT_K_PSYCH,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnsembleHits {
    pub character: Vec<RetrievalHit>,
    pub psych: Vec<RetrievalHit>,
}

/// Two independent searches, one per domain. Results are neither fused nor
/// deduplicated; a domain whose index was never built contributes no hits.
pub fn ensemble_retrieve(
    store: &IndexStore,
    embedder: &dyn Embedder,
    query: &EnsembleQuery,
) -> Result<EnsembleHits> {
    let character = store
        .search(
            Domain::Character.index_name(),
            &query.character_query,
            embedder,
            query.k_char,
        )
        .context("searching character index")?;
    let psych = store
        .search(
            Domain::Psych.index_name(),
            &query.theory_query,
            embedder,
            query.k_psych,
        )
        .context("searching psych index")?;
    info!(
        character_hits = character.len(),
        psych_hits = psych.len(),
        "ensemble retrieval"
    );
    Ok(EnsembleHits { character, psych })
}
