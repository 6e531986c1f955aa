use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use tracing::debug;

use psyche_core::{
    l2_normalize, Embedder, HashEmbedder, HashEmbedderConfig, PsycheError,
};

pub const DEFAULT_EMBEDDING_MODEL: &str = "intfloat/multilingual-e5-base";
const HF_BASE_URL: &str = "https://api-inference.huggingface.co";
const BATCH_SIZE: usize = 32;

#[derive(Clone)]
enum EmbeddingBackend {
    Hash(HashEmbedder),
    HuggingFace(HuggingFaceEmbedder),
}

/// Embedder selected by model id: `hash` / `hash:<dims>` stays offline,
/// anything else is treated as a hosted feature-extraction model.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn for_model(model: &str) -> Result<Self> {
        let model = model.trim();
        if let Some(dims) = parse_hash_model(model)? {
            return Ok(Self {
                backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                    dimensions: dims,
                    ..HashEmbedderConfig::default()
                })),
            });
        }
        Ok(Self {
            backend: EmbeddingBackend::HuggingFace(HuggingFaceEmbedder::new(model)?),
        })
    }

}

impl Embedder for EmbeddingClient {
    fn model_id(&self) -> &str {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.model_id(),
            EmbeddingBackend::HuggingFace(client) => &client.model,
        }
    }

    fn embed_batch(&self, inputs: &[String]) -> psyche_core::Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.embed_batch(inputs),
            EmbeddingBackend::HuggingFace(client) => client
                .embed_batch(inputs)
                .map_err(|err| PsycheError::Embedding(format!("{err:#}"))),
        }
    }
}

fn parse_hash_model(model: &str) -> Result<Option<usize>> {
    if model.eq_ignore_ascii_case("hash") {
        return Ok(Some(HashEmbedderConfig::default().dimensions));
    }
    match model.strip_prefix("hash:") {
        Some(dims) => {
            let dims: usize = dims
                .parse()
                .with_context(|| format!("invalid hash embedder dimensions in {model:?}"))?;
            if dims == 0 {
                return Err(anyhow!("hash embedder needs at least one dimension"));
            }
            Ok(Some(dims))
        }
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    http: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl HuggingFaceEmbedder {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("HF_API_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("HF_API_TOKEN is required for hosted embeddings ({model})"))?;
        let base_url = env::var("HF_INFERENCE_BASE_URL")
            .unwrap_or_else(|_| HF_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: Client::new(),
            model: model.to_string(),
            api_key,
            base_url,
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(BATCH_SIZE) {
            out.extend(self.embed_request(batch)?);
        }
        Ok(out)
    }

    fn embed_request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        );
        let payload = json!({
            "inputs": batch,
            "options": { "wait_for_model": true },
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .with_context(|| format!("feature extraction request to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "feature extraction for {} failed: {status} {body}",
                self.model
            ));
        }
        let parsed: FeatureExtraction = response.json().context("decoding feature extraction")?;
        let vectors = parsed.into_sentence_vectors();
        if vectors.len() != batch.len() {
            return Err(anyhow!(
                "feature extraction returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            ));
        }
        debug!(model = %self.model, batch = batch.len(), "embedded batch");
        Ok(vectors)
    }
}

/// Endpoints return one vector per input for sentence-transformer models and
/// one vector per token otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Pooled(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtraction {
    fn into_sentence_vectors(self) -> Vec<Vec<f32>> {
        match self {
            FeatureExtraction::Pooled(vectors) => vectors
                .into_iter()
                .map(|mut v| {
                    l2_normalize(&mut v);
                    v
                })
                .collect(),
            FeatureExtraction::Tokens(sequences) => {
                sequences.into_iter().map(mean_pool).collect()
            }
        }
    }
}

fn mean_pool(tokens: Vec<Vec<f32>>) -> Vec<f32> {
    let dim = tokens.first().map(Vec::len).unwrap_or(0);
    let mut pooled = vec![0f32; dim];
    for token in &tokens {
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }
    if !tokens.is_empty() {
        let n = tokens.len() as f32;
        pooled.iter_mut().for_each(|v| *v /= n);
    }
    l2_normalize(&mut pooled);
    pooled
}
