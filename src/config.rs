use crate::error::DispatchResult;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the polymorphic matcher settles several declared capabilities at the same distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Fail with `AmbiguousMatch`
    #[default]
    Reject,
    /// Pick the candidate declared first on the handler
    FirstDeclared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub tie_break: TieBreakPolicy,
    /// Build each call adapter at most once, holding a per-key guard while it is built
    pub single_flight_compilation: bool,
    /// Emit a structured record at every dispatch boundary
    pub log_dispatches: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreakPolicy::Reject,
            single_flight_compilation: false,
            log_dispatches: false,
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `RELAY_TIE_BREAK`, `RELAY_SINGLE_FLIGHT_COMPILATION` and
    /// `RELAY_LOG_DISPATCHES`
    pub fn from_env() -> DispatchResult<Self> {
        let config = Self::defaults()?.add_source(Self::environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults, then the file at `path` (format from its extension), then the environment
    pub fn from_file(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let config = Self::defaults()?
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults overridden by a TOML document
    pub fn from_toml_str(toml: &str) -> DispatchResult<Self> {
        let config = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn defaults() -> DispatchResult<ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(Config::builder()
            .set_default("tie_break", "reject")?
            .set_default(
                "single_flight_compilation",
                defaults.single_flight_compilation,
            )?
            .set_default("log_dispatches", defaults.log_dispatches)?)
    }

    fn environment() -> Environment {
        Environment::with_prefix("RELAY").try_parsing(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.tie_break, TieBreakPolicy::Reject);
        assert!(!config.single_flight_compilation);
        assert!(!config.log_dispatches);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = DispatcherConfig::from_toml_str(
            r#"
            tie_break = "first_declared"
            log_dispatches = true
            "#,
        )
        .unwrap();

        assert_eq!(config.tie_break, TieBreakPolicy::FirstDeclared);
        assert!(config.log_dispatches);
        assert!(!config.single_flight_compilation);
    }

    #[test]
    fn test_invalid_value_is_a_configuration_error() {
        let result = DispatcherConfig::from_toml_str(r#"tie_break = "coin_flip""#);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::set_var("RELAY_TIE_BREAK", "first_declared");
        let config = DispatcherConfig::from_env();
        std::env::remove_var("RELAY_TIE_BREAK");

        let config = config.unwrap();
        assert_eq!(config.tie_break, TieBreakPolicy::FirstDeclared);
        assert!(!config.single_flight_compilation);
        assert!(!config.log_dispatches);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("relay-config-{}.toml", std::process::id()));
        std::fs::write(&path, "single_flight_compilation = true\n").unwrap();

        let config = DispatcherConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(config.unwrap().single_flight_compilation);
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let result = DispatcherConfig::from_file("/nonexistent/relay.toml");
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }
}
