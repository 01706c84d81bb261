//! API key handling.
//!
//! Keys live in a [`SecretString`] from the moment they are read, so Debug
//! and Display never print them and the memory is zeroed on drop. The only
//! way to read a key back is [`ApiCredential::expose`], called where the
//! HTTP header is set.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The provider's JSON configuration
    Config,
    /// An environment variable
    Environment,
    /// Passed in by code
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// An API key that cannot leak through formatting.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read a key from an environment variable. Empty values count as unset.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(Self::new(value, CredentialSource::Environment, name))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "{} not set: configure the '{}' environment variable",
                name, env_var
            ))),
        }
    }

    /// Read `config[config_key]`, falling back to the `env_var` environment variable.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        match config[config_key].as_str() {
            Some(value) if !value.trim().is_empty() => {
                Ok(Self::new(value, CredentialSource::Config, name))
            }
            _ => Self::from_env(env_var, name).map_err(|_| {
                ProviderError::NotConfigured(format!(
                    "{} required: set '{}' in config or the {} environment variable",
                    name, config_key, env_var
                ))
            }),
        }
    }

    /// Whether a key could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].as_str().is_some_and(|v| !v.trim().is_empty())
            || std::env::var(env_var).is_ok_and(|v| !v.trim().is_empty())
    }

    /// The raw key. Call only where the request header is built.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk-dashscope-0123456789";

    #[test]
    fn test_redacted_in_debug_and_display() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Programmatic, "Judge API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(SECRET), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));

        let display = cred.to_string();
        assert!(!display.contains(SECRET), "Secret exposed in Display!");
        assert!(display.contains("Judge API key"));
        assert!(display.contains("programmatic"));
    }

    #[test]
    fn test_expose_returns_value() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Config, "Judge API key");
        assert_eq!(cred.expose(), SECRET);
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_config_value_wins() {
        let config = serde_json::json!({"api_key": SECRET});
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TURNWISE_TEST_UNSET_KEY_A",
            "Judge API key",
        )
        .unwrap();
        assert_eq!(cred.source(), CredentialSource::Config);
        assert_eq!(cred.expose(), SECRET);
    }

    #[test]
    fn test_missing_everywhere_names_both_places() {
        let config = serde_json::json!({"api_key": "  "});
        let err = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TURNWISE_TEST_UNSET_KEY_B",
            "Judge API key",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("api_key"));
        assert!(message.contains("TURNWISE_TEST_UNSET_KEY_B"));
        assert!(!ApiCredential::is_available(
            &config,
            "api_key",
            "TURNWISE_TEST_UNSET_KEY_B"
        ));
    }
}
