/// HTTP text-generation client.
///
/// Posts `{prompt, context}` as JSON to the configured endpoint and reads
/// `{text}` back. The API key, when set, is sent as a bearer token.
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationError, TextGenerator};
use crate::config::GenerationConfig;

const USER_AGENT: &str = concat!("storyfork/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GenerationError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Builds a client from config, or `None` when no endpoint is set.
    /// The API key is read from the environment variable the config names.
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>, GenerationError> {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return Ok(None);
        };
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            debug!("{} not set, calling {endpoint} without a key", config.api_key_env);
        }
        Self::new(endpoint, api_key).map(Some)
    }

    fn headers(&self) -> Result<HeaderMap, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| GenerationError::Configuration(format!("invalid API key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str, context: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&GenerateRequest { prompt, context })
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        Ok(body.text)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}
