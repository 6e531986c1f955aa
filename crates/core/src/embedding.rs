use crate::error::Result;

/// Text-to-vector encoder shared by index builds and queries.
///
/// Implementations are created once per process and used read-only, so
/// they must be `Send + Sync`.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, e.g. `hash:384` or a hub id.
    fn model_id(&self) -> &str;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut output = self.embed_batch(&[text.to_string()])?;
        Ok(output.pop().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            seed: 1337,
        }
    }
}

/// Feature-hashing embedder. Each token lands in a signed bucket picked by a
/// stable hash, so vectors survive process restarts and toolchain upgrades.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        let config = HashEmbedderConfig {
            dimensions: config.dimensions.max(1),
            ..config
        };
        Self {
            model_id: format!("hash:{}", config.dimensions),
            config,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.config.dimensions];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let (bucket, sign) = self.bucket_for(&token);
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> (usize, f32) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.config.seed.to_le_bytes());
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        let value = u64::from_le_bytes(head);
        let bucket = (value % self.config.dimensions as u64) as usize;
        let sign = if value >> 63 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HashEmbedderConfig::default())
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Scales `vector` to unit length in place; the zero vector is left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
