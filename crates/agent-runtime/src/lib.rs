//! # agent-runtime
//!
//! Concrete collaborators for the agent core.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/chat/completions` endpoint
//! - **Ollama**: local inference via `ollama-rs` (feature `ollama`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{settings::Settings, build_provider};
//!
//! let settings = Settings::load()?;
//! let provider = build_provider(&settings)?;
//! let producer = LlmDecisionProducer::new(provider, Arc::new(settings.agent_config()?));
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;
pub mod scheduler;
pub mod settings;

use std::sync::Arc;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use scheduler::{JobInfo, JobSpec, Scheduler, SchedulerError, Trigger};
pub use settings::{ProviderKind, Settings};

use agent_core::{LlmProvider, Result};

/// Construct the provider selected by `settings`
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    match settings.provider {
        ProviderKind::OpenAi => {
            if settings.api_key.is_empty() {
                tracing::warn!("LLM_API_KEY is empty; requests will likely be rejected");
            }
            Ok(Arc::new(OpenAiCompatProvider::new(settings.openai_config())?))
        }
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::from_config(settings.ollama_config()))),
        #[cfg(not(feature = "ollama"))]
        ProviderKind::Ollama => Err(agent_core::AgentError::Config(
            "LLM_PROVIDER=ollama requires the 'ollama' feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_select_openai() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn ollama_can_be_selected() {
        let settings = Settings::from_lookup(|key| (key == "LLM_PROVIDER").then(|| "ollama".to_string())).unwrap();
        assert_eq!(build_provider(&settings).unwrap().name(), "ollama");
    }
}
