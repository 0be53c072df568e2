//! Resolution settings, loadable from TOML

use anyhow::Context;
use rv_macro::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml::de::Error as TomlError;

/// Order in which same-named visible definitions are tried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precedence {
    /// Closest scope first, declaration order within a scope
    #[default]
    FirstMatch,
    /// Closest scope first, textually nearest definition first within a scope
    Closest,
}

/// Settings for [`crate::MacroResolver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveConfig {
    /// Candidate ordering
    pub precedence: Precedence,
    /// Matcher limits
    pub matcher: MatcherConfig,
}

/// Invalid configuration text
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML did not parse or did not fit the schema
    #[error("invalid resolve configuration: {0}")]
    Parse(#[from] TomlError),
    /// A limit of zero would reject every invocation
    #[error("`matcher.{0}` must be greater than zero")]
    ZeroLimit(&'static str),
}

impl ResolveConfig {
    /// Parse a configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML, does not fit
    /// the schema, or sets a matcher limit to zero.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.matcher.max_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_depth"));
        }
        if config.matcher.max_fragment_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_fragment_depth"));
        }
        if config.matcher.max_repetitions == Some(0) {
            return Err(ConfigError::ZeroLimit("max_repetitions"));
        }
        Ok(config)
    }

    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or its contents are invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read resolve config: {}", path.display()))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse resolve config: {}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config = ResolveConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config, ResolveConfig::default());
        assert_eq!(config.matcher.max_depth, 64);
        assert_eq!(config.matcher.max_fragment_depth, 256);
        assert_eq!(config.matcher.max_repetitions, None);
    }

    #[test]
    fn test_full_config() {
        let config = ResolveConfig::from_toml_str(
            r#"
precedence = "closest"

[matcher]
max_depth = 8
max_repetitions = 10000
"#,
        )
        .expect("config parses");

        assert_eq!(config.precedence, Precedence::Closest);
        assert_eq!(config.matcher.max_depth, 8);
        assert_eq!(config.matcher.max_fragment_depth, 256);
        assert_eq!(config.matcher.max_repetitions, Some(10_000));
    }

    #[test]
    fn test_rejects_unknown_fields_and_zero_limits() {
        assert!(matches!(
            ResolveConfig::from_toml_str("precedence = \"last\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ResolveConfig::from_toml_str("colour = true"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ResolveConfig::from_toml_str("[matcher]\nmax_repetitions = 0"),
            Err(ConfigError::ZeroLimit("max_repetitions"))
        ));
        assert!(matches!(
            ResolveConfig::from_toml_str("[matcher]\nmax_fragment_depth = 0"),
            Err(ConfigError::ZeroLimit("max_fragment_depth"))
        ));
    }

    #[test]
    fn test_load_reports_path() {
        let error = ResolveConfig::load(Path::new("/nonexistent/resolve.toml"))
            .expect_err("missing file");
        assert!(error.to_string().contains("/nonexistent/resolve.toml"));
    }
}
