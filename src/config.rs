use crate::backend::{BackendSettings, RetryPolicy};
use crate::models::{GenerationOptions, TaskKind};
use crate::pricing::ModelPrice;
use crate::prompts::PromptOverrides;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport family a model is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions, or any compatible endpoint
    OpenAi,
    /// Google Gemini generateContent
    Gemini,
    /// Locally hosted models served by Ollama
    Ollama,
}

impl Provider {
    fn default_endpoint(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    fn default_api_key_var(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Gemini => Some("GOOGLE_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

/// A single model under evaluation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Model identifier sent to the provider and used in reports
    pub name: String,
    pub provider: Provider,
    /// API base URL; defaults per provider
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Environment variable name containing the API key
    #[serde(default)]
    pub env_var_api_key: Option<String>,
    /// Rate limit for API requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
}

impl ModelConfig {
    pub fn endpoint(&self) -> &str {
        self.api_endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    pub fn api_key_var(&self) -> Option<&str> {
        self.env_var_api_key
            .as_deref()
            .or_else(|| self.provider.default_api_key_var())
    }
}

/// Root configuration of an evaluation session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Models to evaluate
    pub models: Vec<ModelConfig>,
    /// Repetitions per (model, case) pair
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,
    /// Pairs evaluated concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-call timeout honoured by every backend
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Temperature for response generation
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens for response generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Task kinds to run; empty means all of them
    #[serde(default)]
    pub tasks: Vec<TaskKind>,
    /// JSON file replacing the built-in case tables
    #[serde(default)]
    pub cases_path: Option<PathBuf>,
    /// Optional directory to store reports in
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Per-model prices merged over the built-in table
    #[serde(default)]
    pub pricing: HashMap<String, ModelPrice>,
    /// System prompt overrides
    #[serde(default)]
    pub prompts: PromptOverrides,
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_n_runs() -> usize {
    3
}

fn default_max_workers() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_tokens() -> u32 {
    1000
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Reject settings that would make a run meaningless, before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("No models selected for evaluation");
        }
        if self.n_runs == 0 {
            bail!("n_runs must be at least 1");
        }
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        Ok(())
    }

    /// Keep only the named models. An empty filter keeps everything.
    pub fn retain_models(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.models.retain(|model| names.contains(&model.name));
    }

    /// Task kinds to run, in canonical order
    pub fn selected_tasks(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|kind| self.tasks.is_empty() || self.tasks.contains(kind))
            .collect()
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_output_tokens: self.max_tokens,
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        }
    }
}
