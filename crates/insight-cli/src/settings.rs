//! Layered configuration: an optional TOML file, then `INSIGHT_*`
//! environment variables. Every field has a default, so an empty
//! configuration works.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use insight_engine::{EngineConfig, QaLimits};
use insight_llm::{ApiKey, OpenAiConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub db_path:     PathBuf,
  pub llm:         LlmConfig,
  pub synthesis:   SynthesisConfig,
  pub compression: CompressionConfig,
  pub qa:          QaConfig,
  pub server:      ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
  pub api_base_url:    String,
  pub model:           String,
  pub temperature:     Option<f32>,
  pub timeout_seconds: u64,
  /// Environment variable holding the API key. Empty for keyless servers.
  pub api_key_env:     String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
  pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
  pub max_removal_percent: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QaConfig {
  pub max_documents:     usize,
  pub max_content_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      db_path:     PathBuf::from("knowledge.db"),
      llm:         LlmConfig::default(),
      synthesis:   SynthesisConfig::default(),
      compression: CompressionConfig::default(),
      qa:          QaConfig::default(),
      server:      ServerConfig::default(),
    }
  }
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      api_base_url:    "https://api.openai.com/v1".to_string(),
      model:           "gpt-4o-mini".to_string(),
      temperature:     None,
      timeout_seconds: 120,
      api_key_env:     "OPENAI_API_KEY".to_string(),
    }
  }
}

impl Default for SynthesisConfig {
  fn default() -> Self { Self { batch_size: EngineConfig::default().batch_size } }
}

impl Default for CompressionConfig {
  fn default() -> Self { Self { max_removal_percent: EngineConfig::default().max_removal_percent } }
}

impl Default for QaConfig {
  fn default() -> Self {
    let limits = QaLimits::default();
    Self { max_documents: limits.max_documents, max_content_chars: limits.max_content_chars }
  }
}

impl Default for ServerConfig {
  fn default() -> Self { Self { host: "127.0.0.1".to_string(), port: 8080 } }
}

impl AppConfig {
  /// Read `path` if it exists, then apply `INSIGHT_*` overrides
  /// (`INSIGHT_LLM__MODEL` sets `llm.model`).
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("INSIGHT")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut cfg: AppConfig = settings
      .try_deserialize()
      .context("failed to deserialise configuration")?;
    cfg.db_path = expand_tilde(&cfg.db_path);
    Ok(cfg)
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      batch_size:          self.synthesis.batch_size,
      max_removal_percent: self.compression.max_removal_percent,
      qa:                  QaLimits {
        max_documents:     self.qa.max_documents,
        max_content_chars: self.qa.max_content_chars,
      },
      generate_timeout:    Duration::from_secs(self.llm.timeout_seconds.max(1)),
    }
  }

  /// The key is looked up here; a missing key only fails once a call is made.
  pub fn openai_config(&self) -> OpenAiConfig {
    OpenAiConfig {
      api_base_url:    self.llm.api_base_url.clone(),
      model:           self.llm.model.clone(),
      temperature:     self.llm.temperature,
      timeout_seconds: self.llm.timeout_seconds,
      api_key:         ApiKey::from_env(&self.llm.api_key_env),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/") {
    if let Ok(home) = std::env::var("HOME") {
      return PathBuf::from(home).join(rest);
    }
  }
  path.to_path_buf()
}
