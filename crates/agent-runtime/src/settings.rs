//! Process settings
//!
//! Settings come from the process environment layered over dotenv files:
//! `.env` supplies defaults the real environment can override, then
//! `.env.prod` or `.env.test` (chosen by `ENV`) overrides both. The files are
//! read without touching the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use agent_core::config::AgentConfig;
use agent_core::error::{AgentError, Result};
use agent_core::provider::GenerationOptions;
use tracing::debug;

#[cfg(feature = "ollama")]
use crate::ollama::OllamaConfig;
use crate::openai::{DEFAULT_BASE_URL, OpenAiConfig};

const DEFAULT_OPENAI_MODEL: &str = "deepseek-v3.2";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Which LLM backend to talk to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai_compat" | "dashscope" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(AgentError::Config(format!(
                "LLM_PROVIDER must be 'openai' or 'ollama', got '{other}'"
            ))),
        }
    }
}

/// Everything the binary reads from its environment
#[derive(Clone, Debug)]
pub struct Settings {
    /// Deployment environment (`dev`, `test`, `prod`)
    pub env: String,
    pub log_level: Option<String>,

    pub provider: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub enable_thinking: bool,
    pub ollama_host: String,
    pub ollama_port: u16,

    pub max_iterations: usize,
    pub max_history: usize,
    pub system_prompt_file: Option<PathBuf>,
    pub session_dir: PathBuf,
}

impl Settings {
    /// Load from the process environment and dotenv files in the working directory
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load from the process environment and dotenv files in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let base = read_env_file(&dir.join(".env"))?;
        let process = |key: &str| std::env::var(key).ok();

        let env = process("ENV")
            .or_else(|| base.get("ENV").cloned())
            .unwrap_or_else(|| "dev".into());
        let overrides = match env.as_str() {
            "prod" => read_env_file(&dir.join(".env.prod"))?,
            "test" => read_env_file(&dir.join(".env.test"))?,
            _ => HashMap::new(),
        };
        debug!(env = %env, base_keys = base.len(), override_keys = overrides.len(), "Loaded dotenv layers");

        Self::from_lookup(|key| {
            overrides
                .get(key)
                .cloned()
                .or_else(|| process(key))
                .or_else(|| base.get(key).cloned())
        })
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = get("LLM_PROVIDER")
            .map(|v| v.parse::<ProviderKind>())
            .transpose()?
            .unwrap_or(ProviderKind::OpenAi);
        let default_model = match provider {
            ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            ProviderKind::Ollama => DEFAULT_OLLAMA_MODEL,
        };
        let defaults = GenerationOptions::default();

        Ok(Self {
            env: get("ENV").unwrap_or_else(|| "dev".into()),
            log_level: get("LOG_LEVEL"),
            provider,
            api_key: get("LLM_API_KEY").unwrap_or_default(),
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            model: get("LLM_MODEL").unwrap_or_else(|| default_model.into()),
            temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", defaults.max_tokens)?,
            enable_thinking: get("LLM_ENABLE_THINKING")
                .map(|v| parse_bool("LLM_ENABLE_THINKING", &v))
                .transpose()?
                .unwrap_or(false),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into()),
            ollama_port: parse_or(get("OLLAMA_PORT"), "OLLAMA_PORT", 11434)?,
            max_iterations: parse_or(
                get("AGENT_MAX_ITERATIONS"),
                "AGENT_MAX_ITERATIONS",
                agent_core::config::DEFAULT_ITERATION_LIMIT,
            )?,
            max_history: parse_or(
                get("AGENT_MAX_HISTORY"),
                "AGENT_MAX_HISTORY",
                agent_core::session::DEFAULT_MAX_HISTORY,
            )?,
            system_prompt_file: get("AGENT_SYSTEM_PROMPT_FILE").map(PathBuf::from),
            session_dir: get("SESSION_DIR").map_or_else(|| PathBuf::from("conversation_logs"), PathBuf::from),
        })
    }

    /// Agent configuration; reads the system prompt file when one is set
    pub fn agent_config(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::default()
            .with_iteration_limit(self.max_iterations)
            .with_max_history(self.max_history)
            .with_generation(GenerationOptions {
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                enable_thinking: self.enable_thinking,
                ..GenerationOptions::default()
            });

        if let Some(path) = &self.system_prompt_file {
            let prompt = std::fs::read_to_string(path).map_err(|e| {
                AgentError::Config(format!("cannot read system prompt {}: {e}", path.display()))
            })?;
            config = config.with_system_prompt(prompt);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }

    #[cfg(feature = "ollama")]
    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            host: self.ollama_host.clone(),
            port: self.ollama_port,
        }
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display()))),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(AgentError::Config(format!("{}: {e}", path.display()))),
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| AgentError::Config(format!("{key} has an invalid value: '{v}'"))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Config(format!("{key} must be a boolean, got '{value}'"))),
    }
}
