//! Application-wide settings, loadable from JSON.

use crate::binding::BindingOptions;
use crate::command::registry::DEFAULT_REGISTRY_SIZE;
use crate::command::undo::DEFAULT_UNDO_SIZE;
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Settings shared by every binding of a [`BindingsContext`](crate::context::BindingsContext).
///
/// Missing fields take their default value:
///
/// ```rust
/// use interacto::config::InteractoConfig;
///
/// let config = InteractoConfig::from_json(r#"{ "undo_size": 10 }"#).unwrap();
/// assert_eq!(config.undo_size, 10);
/// assert_eq!(config.registry_size, 50);
/// assert!(!config.binding.continuous_execution);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractoConfig {
    pub registry_size: usize,
    pub undo_size: usize,
    /// Where usage records are posted, if anywhere.
    pub usage_endpoint: Option<String>,
    /// Defaults for new bindings.
    pub binding: BindingOptions,
}

impl Default for InteractoConfig {
    fn default() -> Self {
        Self {
            registry_size: DEFAULT_REGISTRY_SIZE,
            undo_size: DEFAULT_UNDO_SIZE,
            usage_endpoint: None,
            binding: BindingOptions::default(),
        }
    }
}

/// A setting with an unusable value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigViolation {
    #[error("undo_size must be at least 1")]
    ZeroUndoSize,

    #[error("usage_endpoint '{endpoint}' is not an http(s) URL")]
    InvalidEndpoint { endpoint: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration ({} problem(s)): {}", .violations.len(), list(.violations))]
    Invalid { violations: Vec<ConfigViolation> },
}

fn list(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

type Check = Validation<(), NonEmptyVec<ConfigViolation>>;

fn check(ok: bool, violation: impl FnOnce() -> ConfigViolation) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation())
    }
}

impl InteractoConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Report every unusable value at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint_ok = self
            .usage_endpoint
            .as_deref()
            .map_or(true, |e| e.starts_with("http://") || e.starts_with("https://"));

        let checks = vec![
            check(self.undo_size > 0, || ConfigViolation::ZeroUndoSize),
            check(endpoint_ok, || ConfigViolation::InvalidEndpoint {
                endpoint: self.usage_endpoint.clone().unwrap_or_default(),
            }),
        ];

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => Err(ConfigError::Invalid {
                violations: errors.iter().cloned().collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = InteractoConfig::from_json("{}").unwrap();
        assert_eq!(config, InteractoConfig::default());
        assert_eq!(config.registry_size, 50);
        assert_eq!(config.undo_size, 30);
    }

    #[test]
    fn nested_binding_options_are_read() {
        let json = r#"{
            "registry_size": 5,
            "usage_endpoint": "https://usage.example/api",
            "binding": { "strict_start": true, "log_usage": true }
        }"#;
        let config = InteractoConfig::from_json(json).unwrap();

        assert_eq!(config.registry_size, 5);
        assert!(config.binding.strict_start);
        assert!(config.binding.log_usage);
        assert!(!config.binding.async_execution);
    }

    #[test]
    fn every_violation_is_reported() {
        let json = r#"{
            "undo_size": 0,
            "usage_endpoint": "ftp://usage"
        }"#;
        match InteractoConfig::from_json(json) {
            Err(ConfigError::Invalid { violations }) => {
                assert_eq!(violations.len(), 2);
                assert!(violations.contains(&ConfigViolation::ZeroUndoSize));
                assert!(violations.contains(&ConfigViolation::InvalidEndpoint {
                    endpoint: "ftp://usage".to_string()
                }));
            }
            other => panic!("expected invalid configuration, got {other:?}"),
        }
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let config = InteractoConfig {
            usage_endpoint: Some(String::new()),
            ..InteractoConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { violations })
                if violations == vec![ConfigViolation::InvalidEndpoint { endpoint: String::new() }]
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            InteractoConfig::from_json("{ registry_size: }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let config = InteractoConfig {
            usage_endpoint: Some("http://localhost:8080/usage".to_string()),
            ..InteractoConfig::default()
        };
        let parsed = InteractoConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
