use reqwest::{header::HeaderValue, Client, StatusCode};
use serde_json::{json, Value};
use std::env;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

pub const DEFAULT_HF_MODEL: &str = "meta-llama/Meta-Llama-3-8B-Instruct";
const HF_BASE_URL: &str = "https://api-inference.huggingface.co";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    HuggingFace,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::HuggingFace => "huggingface",
            LlmProvider::OpenAi => "openai",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "huggingface" | "hf" => Some(LlmProvider::HuggingFace),
            "openai" => Some(LlmProvider::OpenAi),
            _ => None,
        }
    }

    pub fn credential_var(&self) -> &'static str {
        match self {
            LlmProvider::HuggingFace => "HF_API_TOKEN",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::HuggingFace => DEFAULT_HF_MODEL,
            LlmProvider::OpenAi => "gpt-4.1-mini",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            system: None,
            user: String::new(),
            temperature: 0.2,
            max_tokens: 800,
            top_p: 0.95,
        }
    }
}

/// Which endpoint produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRoute {
    Chat,
    TextGeneration,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub route: GenerationRoute,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} not set")]
    MissingCredential(&'static str),
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned status {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} response could not be decoded: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider} rate limited after {retries} retries")]
    RateLimited {
        provider: &'static str,
        retries: usize,
    },
    #[error("inference error (chat/text): {chat} / {completion}")]
    ChatAndCompletionFailed {
        chat: Box<LlmError>,
        completion: Box<LlmError>,
    },
    #[error("failed to create tokio runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl LlmError {
    /// True when the provider answered but refused or garbled the call, as
    /// opposed to the call never reaching it.
    fn is_provider_rejection(&self) -> bool {
        matches!(self, LlmError::Http { .. } | LlmError::Decode { .. })
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// Reads the provider credential (`HF_API_TOKEN` / `OPENAI_API_KEY`) and
    /// optional base URL override from the environment.
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = read_credential(provider.credential_var(), env::var(provider.credential_var()).ok())?;
        let base_url = match provider {
            LlmProvider::HuggingFace => env::var("HF_INFERENCE_BASE_URL").ok(),
            LlmProvider::OpenAi => env::var("OPENAI_BASE_URL").ok(),
        };
        Ok(Self::with_credentials(provider, model, api_key, base_url))
    }

    pub fn with_credentials(
        provider: LlmProvider,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| {
            match provider {
                LlmProvider::HuggingFace => HF_BASE_URL,
                LlmProvider::OpenAi => OPENAI_BASE_URL,
            }
            .to_string()
        });
        Self {
            http: Client::new(),
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion first; on Hugging Face a rejected chat call is retried
    /// as plain text generation.
    pub async fn generate(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match self.provider {
            LlmProvider::OpenAi => self.chat(req).await,
            LlmProvider::HuggingFace => match self.chat(req).await {
                Ok(response) => Ok(response),
                Err(chat) if chat.is_provider_rejection() => {
                    warn!(model = %self.model, error = %chat, "chat call rejected, falling back to text generation");
                    self.text_generation(req).await.map_err(|completion| {
                        LlmError::ChatAndCompletionFailed {
                            chat: Box::new(chat),
                            completion: Box::new(completion),
                        }
                    })
                }
                Err(err) => Err(err),
            },
        }
    }

    pub fn generate_blocking(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let rt = Runtime::new()?;
        rt.block_on(self.generate(req))
    }

    fn chat_url(&self) -> String {
        match self.provider {
            LlmProvider::HuggingFace => {
                format!("{}/models/{}/v1/chat/completions", self.base_url, self.model)
            }
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
        }
    }

    fn text_generation_url(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let provider = self.provider.as_str();
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "top_p": req.top_p,
            "stream": false,
        });
        let value = self.post_with_retry(&self.chat_url(), &payload).await?;
        let content = extract_chat_text(&value).ok_or_else(|| LlmError::Decode {
            provider,
            reason: "missing message content in chat response".to_string(),
        })?;
        let usage = value.get("usage");
        let tokens = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32
        };
        Ok(LlmResponse {
            content,
            route: GenerationRoute::Chat,
            prompt_tokens: tokens("prompt_tokens"),
            completion_tokens: tokens("completion_tokens"),
        })
    }

    async fn text_generation(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let payload = json!({
            "inputs": req.user,
            "parameters": {
                "max_new_tokens": req.max_tokens,
                "temperature": req.temperature,
                "top_p": req.top_p,
                "return_full_text": false,
            },
        });
        let value = self
            .post_with_retry(&self.text_generation_url(), &payload)
            .await?;
        let content = extract_generated_text(&value).ok_or_else(|| LlmError::Decode {
            provider: self.provider.as_str(),
            reason: "missing generated_text in text generation response".to_string(),
        })?;
        Ok(LlmResponse {
            content,
            route: GenerationRoute::TextGeneration,
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    async fn post_with_retry(&self, url: &str, payload: &Value) -> Result<Value, LlmError> {
        let provider = self.provider.as_str();
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await
                .map_err(|source| LlmError::Transport { provider, source })?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt > MAX_RETRIES {
                    return Err(LlmError::RateLimited {
                        provider,
                        retries: MAX_RETRIES,
                    });
                }
                let wait = backoff_delay(attempt, response.headers().get("retry-after"));
                debug!(url, attempt, wait_secs = wait.as_secs(), "rate limited, backing off");
                sleep(wait).await;
                continue;
            }
            return decode_body(provider, response).await;
        }
    }
}

fn read_credential(var: &'static str, value: Option<String>) -> Result<String, LlmError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(LlmError::MissingCredential(var)),
    }
}

fn backoff_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(value) = retry_after {
        if let Ok(text) = value.to_str() {
            if let Ok(secs) = text.trim().parse::<u64>() {
                return Duration::from_secs(secs.max(1));
            }
        }
    }
    let capped = attempt.min(5) as u32;
    Duration::from_secs(1u64 << capped)
}

async fn decode_body(provider: &'static str, response: reqwest::Response) -> Result<Value, LlmError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| LlmError::Transport { provider, source })?;
    if !status.is_success() {
        return Err(LlmError::Http {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|err| LlmError::Decode {
        provider,
        reason: err.to_string(),
    })
}

/// Message text of the first chat choice. Providers return either a plain
/// string or a list of typed parts; parts are concatenated.
fn extract_chat_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(message) = choice.get("message") {
        match message.get("content") {
            Some(Value::String(text)) => return Some(text.clone()),
            Some(Value::Array(parts)) => {
                let joined: String = parts
                    .iter()
                    .map(|part| match part {
                        Value::String(text) => text.as_str(),
                        other => other.get("text").and_then(Value::as_str).unwrap_or(""),
                    })
                    .collect();
                return Some(joined);
            }
            _ => {}
        }
    }
    choice
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn extract_generated_text(value: &Value) -> Option<String> {
    let entry = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    entry
        .get("generated_text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_roundtrip() {
        assert_eq!(LlmProvider::from_str("HF"), Some(LlmProvider::HuggingFace));
        assert_eq!(
            LlmProvider::from_str("huggingface").map(|p| p.as_str()),
            Some("huggingface")
        );
        assert_eq!(LlmProvider::from_str("OpenAI"), Some(LlmProvider::OpenAi));
        assert_eq!(LlmProvider::from_str("gemini"), None);
    }

    #[test]
    fn blank_credential_is_missing() {
        assert!(matches!(
            read_credential("HF_API_TOKEN", Some("   ".to_string())),
            Err(LlmError::MissingCredential("HF_API_TOKEN"))
        ));
        assert!(read_credential("HF_API_TOKEN", None).is_err());
        assert_eq!(
            read_credential("HF_API_TOKEN", Some(" hf_abc \n".to_string())).unwrap(),
            "hf_abc"
        );
    }

    #[test]
    fn urls_follow_provider_layout() {
        let hf = LlmClient::with_credentials(
            LlmProvider::HuggingFace,
            "org/model",
            "hf_x",
            Some("http://localhost:9/".to_string()),
        );
        assert_eq!(
            hf.chat_url(),
            "http://localhost:9/models/org/model/v1/chat/completions"
        );
        assert_eq!(hf.text_generation_url(), "http://localhost:9/models/org/model");
        let openai = LlmClient::with_credentials(LlmProvider::OpenAi, "gpt-4.1-mini", "sk-x", None);
        assert_eq!(openai.chat_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn chat_text_handles_string_and_parts() {
        let plain = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_chat_text(&plain).as_deref(), Some("hello"));
        let parts = json!({"choices": [{"message": {"content": [{"text": "a"}, "b", {"type": "x"}]}}]});
        assert_eq!(extract_chat_text(&parts).as_deref(), Some("ab"));
        let legacy = json!({"choices": [{"text": "old"}]});
        assert_eq!(extract_chat_text(&legacy).as_deref(), Some("old"));
        assert_eq!(extract_chat_text(&json!({"choices": []})), None);
    }

    #[test]
    fn generated_text_accepts_list_or_object() {
        let list = json!([{"generated_text": "one"}]);
        assert_eq!(extract_generated_text(&list).as_deref(), Some("one"));
        let object = json!({"generated_text": "two"});
        assert_eq!(extract_generated_text(&object).as_deref(), Some("two"));
        assert_eq!(extract_generated_text(&json!([])), None);
    }

    #[test]
    fn backoff_prefers_retry_after() {
        let header = HeaderValue::from_static("7");
        assert_eq!(backoff_delay(1, Some(&header)), Duration::from_secs(7));
        assert_eq!(backoff_delay(1, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(40, None), Duration::from_secs(32));
    }

    #[test]
    fn request_defaults_match_generation_settings() {
        let req = LlmRequest::default();
        assert_eq!(req.max_tokens, 800);
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
        assert!((req.top_p - 0.95).abs() < f32::EPSILON);
    }
}
