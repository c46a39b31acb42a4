//! LLM provider backends.
//!
//! All backends implement `clawsmith_core::Provider`. Model identifiers
//! use the `provider/model` form; a bare model name defaults to openai.

pub mod anthropic;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;

use clawsmith_core::error::ProviderError;
use clawsmith_core::provider::Provider;

/// Split a `provider/model` identifier. A bare model name maps to the
/// openai provider.
pub fn parse_model(model: &str) -> (&str, &str) {
    match model.split_once('/') {
        Some((provider, model_id)) => (provider, model_id),
        None => ("openai", model),
    }
}

fn env_key(var: &str) -> Result<String, ProviderError> {
    std::env::var(var)
        .map_err(|_| ProviderError::NotConfigured(format!("{var} is not set")))
}

/// Build the provider for a `provider/model` identifier from the
/// environment. API keys come from `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`
/// / `DEEPSEEK_API_KEY`; base URLs can be overridden with the matching
/// `*_BASE_URL` variables.
pub fn create_provider(model: &str) -> Result<Box<dyn Provider>, ProviderError> {
    let (provider_id, _) = parse_model(model);
    match provider_id {
        "openai" => {
            let key = env_key("OPENAI_API_KEY")?;
            let provider = match std::env::var("OPENAI_BASE_URL") {
                Ok(base) => OpenAiCompatProvider::new("openai", base, key)?,
                Err(_) => OpenAiCompatProvider::openai(key)?,
            };
            Ok(Box::new(provider))
        }
        "anthropic" => {
            let key = env_key("ANTHROPIC_API_KEY")?;
            let provider = match std::env::var("ANTHROPIC_BASE_URL") {
                Ok(base) => AnthropicProvider::new(base, key)?,
                Err(_) => AnthropicProvider::anthropic(key)?,
            };
            Ok(Box::new(provider))
        }
        "deepseek" => {
            let key = env_key("DEEPSEEK_API_KEY")?;
            let provider = match std::env::var("DEEPSEEK_BASE_URL") {
                Ok(base) => OpenAiCompatProvider::new("deepseek", base, key)?,
                Err(_) => OpenAiCompatProvider::deepseek(key)?,
            };
            Ok(Box::new(provider))
        }
        other => Err(ProviderError::NotConfigured(format!(
            "unknown provider: {other} (supported: openai, anthropic, deepseek)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_slash() {
        assert_eq!(parse_model("openai/gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(
            parse_model("deepseek/deepseek-chat"),
            ("deepseek", "deepseek-chat")
        );
        // Only the first slash separates provider from model.
        assert_eq!(
            parse_model("openai/org/custom"),
            ("openai", "org/custom")
        );
    }

    #[test]
    fn bare_model_defaults_to_openai() {
        assert_eq!(parse_model("gpt-4o"), ("openai", "gpt-4o"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let Err(err) = create_provider("nonsense/model") else {
            panic!("expected an error for an unknown provider");
        };
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
