use std::fs;
use std::path::{Path, PathBuf};

use psyche_core::{l2_normalize, Chunk, Embedder, PsycheError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::flat::FlatIpIndex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Sidecar of a flat index; entry `i` describes vector `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index_name: String,
    pub index_path: PathBuf,
    pub meta_path: PathBuf,
    pub vectors: usize,
    pub dim: usize,
}

/// Directory holding named indices as `{name}.index` + `{name}.meta.json`.
///
/// Builds replace the previous files of the same name. Nothing here locks:
/// concurrent builds of one name must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.index")))
    }

    pub fn meta_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.meta.json")))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.index_path(name)?.exists() && self.meta_path(name)?.exists())
    }

    pub fn build(
        &self,
        name: &str,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
    ) -> Result<BuildReport> {
        let index_path = self.index_path(name)?;
        let meta_path = self.meta_path(name)?;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&texts)?
        };
        if embeddings.len() != chunks.len() {
            return Err(PsycheError::Embedding(format!(
                "{} returned {} vectors for {} chunks",
                embedder.model_id(),
                embeddings.len(),
                chunks.len()
            )));
        }
        let dim = embeddings.first().map(Vec::len).unwrap_or(0);
        let mut index = FlatIpIndex::new(dim);
        for mut vector in embeddings {
            l2_normalize(&mut vector);
            index.add(&vector)?;
        }
        let meta = IndexMeta {
            ids: chunks.iter().map(|chunk| chunk.id.clone()).collect(),
            texts,
        };
        write_replacing(&index_path, &index.to_bytes())?;
        write_replacing(&meta_path, &serde_json::to_vec(&meta)?)?;
        info!(
            index = name,
            vectors = index.len(),
            dim,
            model = embedder.model_id(),
            "built index"
        );
        Ok(BuildReport {
            index_name: name.to_string(),
            index_path,
            meta_path,
            vectors: index.len(),
            dim,
        })
    }

    /// Loads a persisted index, or `None` when it has never been built.
    pub fn load(&self, name: &str) -> Result<Option<(FlatIpIndex, IndexMeta)>> {
        if !self.exists(name)? {
            return Ok(None);
        }
        let index_path = self.index_path(name)?;
        let index = FlatIpIndex::load(&index_path)?;
        let meta: IndexMeta = serde_json::from_slice(&fs::read(self.meta_path(name)?)?)?;
        if meta.ids.len() != meta.texts.len() || meta.ids.len() != index.len() {
            return Err(PsycheError::CorruptIndex {
                path: index_path,
                reason: format!(
                    "{} vectors but {} ids and {} texts",
                    index.len(),
                    meta.ids.len(),
                    meta.texts.len()
                ),
            });
        }
        Ok(Some((index, meta)))
    }

    /// Top-k hits by descending cosine similarity. An index that was never
    /// built yields an empty list.
    pub fn search(
        &self,
        name: &str,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let Some((index, meta)) = self.load(name)? else {
            debug!(index = name, "index not built yet");
            return Ok(Vec::new());
        };
        if top_k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }
        let mut query_vec = embedder.embed(query)?;
        l2_normalize(&mut query_vec);
        let k = top_k.min(index.len());
        let neighbors = index.search(&query_vec, k)?;
        let hits: Vec<RetrievalHit> = neighbors
            .into_iter()
            .filter(|n| n.position >= 0)
            .filter_map(|n| {
                let pos = n.position as usize;
                Some(RetrievalHit {
                    id: meta.ids.get(pos)?.clone(),
                    text: meta.texts.get(pos)?.clone(),
                    score: n.score,
                })
            })
            .collect();
        debug!(index = name, hits = hits.len(), top_k, "searched index");
        Ok(hits)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PsycheError::InvalidIndexName(name.to_string()))
    }
}

fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
