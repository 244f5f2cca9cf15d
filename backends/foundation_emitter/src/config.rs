use crate::chain::EmitterChain;
use crate::emitter::{Emitter, ResponseEmitter};
use crate::errors::{EmitterError, EmitterResult};
use crate::host::HostEnvironment;
use crate::stream::{StreamEmitter, DEFAULT_MAX_BUFFER_LENGTH};
use derive_more::derive::From;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    InvalidBufferLength,
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// The emitters that can be named from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitterStrategy {
    /// [`ResponseEmitter`]
    Response,
    /// [`StreamEmitter`]
    Stream,
}

impl FromStr for EmitterStrategy {
    type Err = EmitterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "response" => Ok(Self::Response),
            "stream" => Ok(Self::Stream),
            _ => Err(EmitterError::InvalidEmitter(s.to_string())),
        }
    }
}

/// Builds emitters by strategy name, all bound to the same host.
pub struct EmitterFactory<H: HostEnvironment> {
    host: Arc<H>,
    max_buffer_length: usize,
}

impl<H: HostEnvironment + 'static> EmitterFactory<H> {
    pub fn new(host: Arc<H>, max_buffer_length: usize) -> Self {
        Self {
            host,
            max_buffer_length,
        }
    }

    #[must_use]
    pub fn build(&self, strategy: EmitterStrategy) -> Box<dyn Emitter> {
        match strategy {
            EmitterStrategy::Response => Box::new(ResponseEmitter::new(Arc::clone(&self.host))),
            EmitterStrategy::Stream => Box::new(StreamEmitter::new(
                Arc::clone(&self.host),
                self.max_buffer_length,
            )),
        }
    }

    /// # Errors
    /// Returns [`EmitterError::InvalidEmitter`] when `name` is not a known
    /// strategy.
    pub fn resolve(&self, name: &str) -> EmitterResult<Box<dyn Emitter>> {
        let strategy = name.parse::<EmitterStrategy>()?;
        Ok(self.build(strategy))
    }
}

/// The `[emitter]` table of a configuration file.
///
/// ```toml
/// [emitter]
/// strategies = ["stream", "response"]
/// max_buffer_length = 8192
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub strategies: Vec<String>,
    pub max_buffer_length: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            strategies: vec![String::from("response")],
            max_buffer_length: DEFAULT_MAX_BUFFER_LENGTH,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    emitter: EmitterConfig,
}

impl EmitterConfig {
    /// # Errors
    /// Fails on malformed TOML or a zero `max_buffer_length`.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.emitter.validated()
    }

    /// # Errors
    /// Fails when the file cannot be read or [`EmitterConfig::from_toml_str`]
    /// rejects its content.
    pub fn from_path<V: Into<std::path::PathBuf>>(target: V) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(target.into())?;
        Self::from_toml_str(&content)
    }

    fn validated(self) -> ConfigResult<Self> {
        if self.max_buffer_length == 0 {
            return Err(ConfigError::InvalidBufferLength);
        }
        Ok(self)
    }

    /// Creates a chain holding the configured strategies in order.
    ///
    /// # Errors
    /// Returns [`EmitterError::InvalidEmitter`] for the first strategy name
    /// that is not known.
    pub fn build_chain<H: HostEnvironment + 'static>(
        &self,
        host: Arc<H>,
    ) -> EmitterResult<EmitterChain> {
        let factory = EmitterFactory::new(host, self.max_buffer_length);

        let mut chain = EmitterChain::new();
        for name in &self.strategies {
            chain.push_back_named(name, &factory)?;
        }

        tracing::debug!("Built emitter chain from strategies: {:?}", &self.strategies);
        Ok(chain)
    }
}

#[cfg(test)]
mod emitter_config_tests {
    use super::*;

    #[test]
    fn missing_table_uses_defaults() {
        let config = EmitterConfig::from_toml_str("").expect("should parse");
        assert_eq!(config, EmitterConfig::default());
    }

    #[test]
    fn reads_strategies_and_buffer_length() {
        let config = EmitterConfig::from_toml_str(
            r#"
[emitter]
strategies = ["stream", "response"]
max_buffer_length = 1024
"#,
        )
        .expect("should parse");

        assert_eq!(config.strategies, vec!["stream", "response"]);
        assert_eq!(config.max_buffer_length, 1024);
    }

    #[test]
    fn rejects_zero_buffer_length() {
        let result = EmitterConfig::from_toml_str("[emitter]\nmax_buffer_length = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidBufferLength)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = EmitterConfig::from_toml_str("[emitter\n");
        assert!(matches!(result, Err(ConfigError::DeserializationFailed(_))));
    }

    #[test]
    fn strategy_names_ignore_case() {
        assert_eq!(" Stream ".parse::<EmitterStrategy>().ok(), Some(EmitterStrategy::Stream));
        assert!(matches!(
            "buffered".parse::<EmitterStrategy>(),
            Err(EmitterError::InvalidEmitter(name)) if name == "buffered"
        ));
    }
}
