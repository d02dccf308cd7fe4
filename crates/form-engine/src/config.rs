//! Engine configuration, loadable from JSON or TOML.

use crate::validation::ValidationMask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Property of an array element holding its stable row id.
    pub row_id_field: String,
    /// Upper bound on expression re-evaluation passes per run.
    pub max_resolve_passes: usize,
    /// Validation categories visible as soon as a node exists.
    pub always_visible: Vec<String>,
    /// Property expressions fall back to their default instead of failing.
    pub catch_expression_errors: bool,
    pub warn_on_non_array_binding: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_id_field: "altinnRowId".to_owned(),
            max_resolve_passes: 4,
            always_visible: Vec::new(),
            catch_expression_errors: true,
            warn_on_non_array_binding: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("maxResolvePasses must be at least 1")]
    NoResolvePasses,
}

impl EngineConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Self>(input)?.validated()
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Self>(input)?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.max_resolve_passes == 0 {
            return Err(ConfigError::NoResolvePasses);
        }
        Ok(self)
    }

    pub fn always_visible_mask(&self) -> ValidationMask {
        ValidationMask::from_categories(self.always_visible.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "alwaysVisible": ["Required"] }"#).unwrap();
        assert_eq!(config.row_id_field, "altinnRowId");
        assert_eq!(config.always_visible_mask(), ValidationMask::REQUIRED);
    }

    #[test]
    fn toml_and_validation() {
        let config = EngineConfig::from_toml_str("rowIdField = \"id\"\nmaxResolvePasses = 2\n").unwrap();
        assert_eq!(config.row_id_field, "id");
        assert_eq!(config.max_resolve_passes, 2);
        assert!(matches!(
            EngineConfig::from_toml_str("maxResolvePasses = 0"),
            Err(ConfigError::NoResolvePasses)
        ));
    }
}
