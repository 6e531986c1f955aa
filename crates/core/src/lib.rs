mod alias;
mod chunk;
mod document;
mod embedding;
mod error;
mod loaders;
mod normalize;
mod reference;

pub use alias::{filter_by_entity, make_aliases};
pub use chunk::{Chunk, ChunkConfig, Chunker};
pub use document::Document;
pub use embedding::{l2_normalize, Embedder, HashEmbedder, HashEmbedderConfig};
pub use error::{PsycheError, Result};
pub use loaders::{load_text_files, load_reference_corpus};
pub use normalize::{contains_any, normalize_text};
pub use reference::{bootstrap_reference_corpus, DEFAULT_REFERENCE_DOCS};
