//! [`OpenAiGenerator`]: a [`Generator`] backed by any OpenAI-compatible
//! `/chat/completions` endpoint.
//!
//! Structured calls send the schema as `response_format: json_schema` and
//! parse the reply's message content as JSON. Text calls forward the web
//! search flag as `web_search_options`, which search-capable models honour.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, trace};

use insight_core::{GenerateError, Generator, response::ResponseSchema};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Where the API key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKey {
  Key(String),
  /// The named environment variable was unset or empty. Every call fails
  /// with [`GenerateError::MissingCredentials`].
  Missing { env_var: String },
  /// Local servers that take no key.
  NotRequired,
}

impl ApiKey {
  /// Read the key from `env_var`. An empty variable name means the endpoint
  /// takes no key.
  pub fn from_env(env_var: &str) -> Self {
    if env_var.trim().is_empty() {
      return Self::NotRequired;
    }
    match std::env::var(env_var) {
      Ok(key) if !key.trim().is_empty() => Self::Key(key.trim().to_owned()),
      _ => Self::Missing { env_var: env_var.to_owned() },
    }
  }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
  /// Base URL up to and including the version segment, e.g.
  /// `https://api.openai.com/v1`.
  pub api_base_url:    String,
  pub model:           String,
  pub temperature:     Option<f32>,
  pub timeout_seconds: u64,
  pub api_key:         ApiKey,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model:              &'a str,
  messages:           Vec<Message<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature:        Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format:    Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  web_search_options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
  #[serde(default)]
  content: Option<String>,
}

// ─── Generator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
  client:      Client,
  endpoint:    String,
  model:       String,
  temperature: Option<f32>,
  api_key:     ApiKey,
}

impl OpenAiGenerator {
  pub fn new(config: OpenAiConfig) -> Result<Self, GenerateError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
      .build()
      .map_err(|e| GenerateError::Unavailable(format!("failed to build HTTP client: {e}")))?;

    Ok(Self {
      client,
      endpoint: format!("{}/chat/completions", config.api_base_url.trim_end_matches('/')),
      model: config.model,
      temperature: config.temperature,
      api_key: config.api_key,
    })
  }

  async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, GenerateError> {
    let mut builder = self.client.post(&self.endpoint).json(request);
    match &self.api_key {
      ApiKey::Key(key) => builder = builder.bearer_auth(key),
      ApiKey::Missing { env_var } => {
        return Err(GenerateError::MissingCredentials(format!(
          "set {env_var} to call {}",
          self.endpoint
        )));
      }
      ApiKey::NotRequired => {}
    }

    debug!(endpoint = %self.endpoint, model = %self.model, "sending chat completion");
    let response = builder.send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_owned());
      error!(%status, body = %body, "chat completion rejected");
      return Err(GenerateError::Rejected { status: status.as_u16(), body });
    }

    let parsed: ChatResponse = response
      .json()
      .await
      .map_err(|e| GenerateError::InvalidResponse(format!("unreadable completion: {e}")))?;
    let content = parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| GenerateError::InvalidResponse("completion has no message content".into()))?;
    trace!(chars = content.len(), "chat completion received");
    Ok(content)
  }
}

fn transport_error(e: reqwest::Error) -> GenerateError {
  if e.is_timeout() {
    GenerateError::Timeout
  } else {
    GenerateError::Unavailable(e.to_string())
  }
}

/// Some models wrap JSON replies in a markdown code fence.
fn strip_code_fence(content: &str) -> &str {
  let trimmed = content.trim();
  let Some(rest) = trimmed.strip_prefix("```") else {
    return trimmed;
  };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}

impl Generator for OpenAiGenerator {
  async fn generate_structured<'a>(
    &'a self,
    prompt: &'a str,
    schema: &'a ResponseSchema,
  ) -> Result<Value, GenerateError> {
    let request = ChatRequest {
      model:              &self.model,
      messages:           vec![Message { role: "user", content: prompt }],
      temperature:        self.temperature,
      response_format:    Some(json!({
        "type": "json_schema",
        "json_schema": { "name": schema.name, "schema": schema.schema },
      })),
      web_search_options: None,
    };
    let content = self.complete(&request).await?;
    serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
      GenerateError::InvalidResponse(format!("{} reply is not JSON: {e}", schema.name))
    })
  }

  async fn generate_text<'a>(
    &'a self,
    prompt: &'a str,
    allow_web_search: bool,
  ) -> Result<String, GenerateError> {
    let request = ChatRequest {
      model:              &self.model,
      messages:           vec![Message { role: "user", content: prompt }],
      temperature:        self.temperature,
      response_format:    None,
      web_search_options: allow_web_search.then(|| json!({})),
    };
    self.complete(&request).await
  }
}

#[cfg(test)]
mod tests;
