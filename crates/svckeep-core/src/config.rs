//! Service configuration.
//!
//! Configuration is validated at load time with sensible defaults and clear
//! error messages.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{ServiceIdentity, StartType};

/// Maximum length of a service name accepted by the host manager.
pub const MAX_SERVICE_NAME_LEN: usize = 256;

/// Default wait hint reported with pending states.
pub const DEFAULT_WAIT_HINT: Duration = Duration::from_secs(7);

/// Flag the host manager passes to start the process in service mode.
pub const DEFAULT_SERVICE_FLAG: &str = "-service";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates an "invalid" error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name (record key).
    pub name: String,

    /// Display name; defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// Start type of the service record.
    #[serde(default)]
    pub start_type: StartType,

    /// Wait hint reported with pending states.
    #[serde(default = "default_wait_hint", with = "humantime_serde")]
    pub wait_hint: Duration,

    /// Flag the service record passes to the executable.
    #[serde(default = "default_service_flag")]
    pub service_flag: String,

    /// Executable registered with the host manager; defaults to the
    /// current executable.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Parameter store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_wait_hint() -> Duration {
    DEFAULT_WAIT_HINT
}

fn default_service_flag() -> String {
    DEFAULT_SERVICE_FLAG.to_string()
}

impl ServiceConfig {
    /// Creates a configuration with defaults for everything but the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            start_type: StartType::default(),
            wait_hint: default_wait_hint(),
            service_flag: default_service_flag(),
            executable: None,
            store: StoreConfig::default(),
        }
    }

    /// Returns the service identity described by this configuration.
    #[must_use]
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity {
            name: self.name.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            description: self.description.clone(),
        }
    }

    /// Returns the executable to register.
    ///
    /// # Errors
    /// Returns an error if no executable is configured and the current
    /// executable cannot be determined.
    pub fn executable_path(&self) -> std::io::Result<PathBuf> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid("name cannot be empty"));
        }
        if self.name.len() > MAX_SERVICE_NAME_LEN {
            return Err(ConfigError::invalid(format!(
                "name longer than {MAX_SERVICE_NAME_LEN} characters"
            )));
        }
        if self.name.contains(['/', '\\']) {
            return Err(ConfigError::invalid("name cannot contain '/' or '\\'"));
        }
        if self.wait_hint.is_zero() {
            return Err(ConfigError::invalid("wait_hint must be greater than zero"));
        }
        if !self.service_flag.starts_with('-') {
            return Err(ConfigError::invalid("service_flag must start with '-'"));
        }
        if let StoreConfig::File { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::invalid("store path cannot be empty"));
            }
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be parsed or is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

/// Parameter store backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// The host's native configuration store (the registry on Windows).
    #[default]
    Registry,
    /// JSON document at `path`.
    File {
        /// Document path.
        path: PathBuf,
    },
    /// Process memory (nothing survives a restart).
    Memory,
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_defaults() {
        let config = ServiceConfig::new("agent");
        assert_eq!(config.wait_hint, Duration::from_secs(7));
        assert_eq!(config.service_flag, "-service");
        assert_eq!(config.start_type, StartType::Auto);
        assert_eq!(config.store, StoreConfig::Registry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identity_display_name_defaults_to_name() {
        let mut config = ServiceConfig::new("agent");
        assert_eq!(config.identity().display_name, "agent");
        config.display_name = Some("Example Agent".to_string());
        assert_eq!(config.identity().display_name, "Example Agent");
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(ServiceConfig::new("").validate().is_err());
        assert!(ServiceConfig::new("a\\b").validate().is_err());
        assert!(ServiceConfig::new("a/b").validate().is_err());
        assert!(ServiceConfig::new("x".repeat(257)).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_wait_hint() {
        let mut config = ServiceConfig::new("agent");
        config.wait_hint = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ServiceConfig::from_toml(
            r#"
            name = "ExampleAgent"
            display_name = "Example Agent"
            description = "Example SNMP-style agent"
            start_type = "demand"
            wait_hint = "10s"

            [store]
            kind = "file"
            path = "/var/lib/svckeep/store.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "ExampleAgent");
        assert_eq!(config.start_type, StartType::Demand);
        assert_eq!(config.wait_hint, Duration::from_secs(10));
        assert_eq!(
            config.store,
            StoreConfig::File {
                path: PathBuf::from("/var/lib/svckeep/store.json")
            }
        );
        assert_eq!(
            config.identity().description.as_deref(),
            Some("Example SNMP-style agent")
        );
    }

    #[test]
    fn test_from_toml_invalid_duration() {
        let result = ServiceConfig::from_toml("name = \"a\"\nwait_hint = \"soon\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let config = ServiceConfig::new("agent");
        let toml = toml::to_string(&config).unwrap();
        let deserialized = ServiceConfig::from_toml(&toml).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ServiceConfig::load("/nonexistent/svckeep.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_executable_override() {
        let mut config = ServiceConfig::new("agent");
        config.executable = Some(PathBuf::from("/opt/agent/bin/agent"));
        assert_eq!(
            config.executable_path().unwrap(),
            PathBuf::from("/opt/agent/bin/agent")
        );
    }
}
