use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::guarded::GuardPolicy;

/// Settings shared by every scope a [`crate::ScopeRuntime`] hands out.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// File that profiling scopes append their timing records to.
    pub profile_log: PathBuf,
    /// Repeated once per nesting level in front of each timing record.
    pub indent_unit: String,
    /// Policy value consulted by guarded scopes.
    pub policy_variable: String,
    /// Value of `policy_variable` that grants execution.
    pub policy_sentinel: String,
    /// Action run by a guarded scope once execution is granted.
    pub guarded_command: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            profile_log: PathBuf::from("profile.log"),
            indent_unit: " ".into(),
            policy_variable: "ALLOW_EXECUTION".into(),
            policy_sentinel: "1".into(),
            guarded_command: vec!["ls".into(), "-la".into()],
        }
    }
}

impl ScopeConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ScopeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ScopeError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ScopeError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy_variable.trim().is_empty() {
            return Err(ScopeError::InvalidConfig(
                "policy_variable must not be empty".into(),
            ));
        }
        if self.guarded_command.is_empty() {
            return Err(ScopeError::InvalidConfig(
                "guarded_command must name a program".into(),
            ));
        }
        Ok(())
    }

    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            variable: self.policy_variable.clone(),
            sentinel: self.policy_sentinel.clone(),
            command: self.guarded_command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScopeConfig::default();
        assert_eq!(config.profile_log, PathBuf::from("profile.log"));
        assert_eq!(config.indent_unit, " ");
        assert_eq!(config.policy_variable, "ALLOW_EXECUTION");
        assert_eq!(config.policy_sentinel, "1");
        assert_eq!(config.guarded_command, vec!["ls", "-la"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ScopeConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScopeConfig::default());
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = ScopeConfig::from_toml_str(
            r#"
profile_log = "/tmp/timings.log"
indent_unit = "  "
guarded_command = ["echo", "hello"]
"#,
        )
        .unwrap();
        assert_eq!(config.profile_log, PathBuf::from("/tmp/timings.log"));
        assert_eq!(config.indent_unit, "  ");
        assert_eq!(config.guarded_command, vec!["echo", "hello"]);
        assert_eq!(config.policy_variable, "ALLOW_EXECUTION");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let err = ScopeConfig::from_toml_str("indent_unit = [").unwrap_err();
        assert!(matches!(err, ScopeError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = ScopeConfig::from_toml_str("guarded_command = []").unwrap_err();
        assert!(err.to_string().contains("guarded_command"));
    }

    #[test]
    fn test_blank_policy_variable_is_rejected() {
        let err = ScopeConfig::from_toml_str("policy_variable = \"  \"").unwrap_err();
        assert!(err.to_string().contains("policy_variable"));
    }

    #[test]
    fn test_load_from_file_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scoped.toml");
        let mut config = ScopeConfig::default();
        config.policy_sentinel = "yes".into();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = ScopeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScopeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().starts_with("invalid config: cannot read"));
    }

    #[test]
    fn test_guard_policy_from_config() {
        let policy = ScopeConfig::default().guard_policy();
        assert_eq!(policy.variable, "ALLOW_EXECUTION");
        assert_eq!(policy.sentinel, "1");
        assert_eq!(policy.command, vec!["ls", "-la"]);
    }
}
