//! Harness configuration.
//!
//! Loaded once at startup from TOML, then overridden by command-line flags.

use crate::types::{CompletionRule, Role};
use fixlat_engine::{SessionSettings, SettingsError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Largest sample the harness will preallocate for.
pub const MAX_SAMPLE_SIZE: usize = 50_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid [session] settings: {0}")]
    Session(#[from] SettingsError),

    #[error("sample_size {0} exceeds the maximum of {MAX_SAMPLE_SIZE}")]
    SampleTooLarge(usize),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub harness: SamplingConfig,
    pub session: SessionSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// The `[harness]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Messages to exchange and sample.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Pause between completion and reduction.
    #[serde(default = "default_settle_delay", with = "humantime_duration")]
    pub settle_delay: Duration,
    /// Deadline for each wait; `None` waits forever.
    #[serde(default, with = "humantime_duration_opt")]
    pub completion_timeout: Option<Duration>,
    /// Overrides the role's default completion rule.
    #[serde(default)]
    pub completion_rule: Option<CompletionRule>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            settle_delay: default_settle_delay(),
            completion_timeout: None,
            completion_rule: None,
        }
    }
}

impl SamplingConfig {
    /// The completion rule in effect for `role`.
    pub fn rule_for(&self, role: Role) -> CompletionRule {
        self.completion_rule
            .unwrap_or_else(|| CompletionRule::default_for(role))
    }
}

/// The `[diagnostics]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Address for the progress HTTP listener; disabled when absent.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sample_size: Option<usize>,
    pub completion_timeout: Option<Duration>,
    pub settle_delay: Option<Duration>,
    pub diagnostics_listen: Option<SocketAddr>,
}

fn default_sample_size() -> usize {
    1000
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(500)
}

impl HarnessConfig {
    /// Configuration with default harness settings around `session`.
    pub fn new(session: SessionSettings) -> Self {
        Self {
            harness: SamplingConfig::default(),
            session,
            diagnostics: DiagnosticsConfig::default(),
        }
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(size) = overrides.sample_size {
            self.harness.sample_size = size;
        }
        if let Some(timeout) = overrides.completion_timeout {
            self.harness.completion_timeout = Some(timeout);
        }
        if let Some(settle) = overrides.settle_delay {
            self.harness.settle_delay = settle;
        }
        if let Some(listen) = overrides.diagnostics_listen {
            self.diagnostics.listen = Some(listen);
        }
    }

    /// Check everything `role` needs before any session starts.
    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        if self.harness.sample_size > MAX_SAMPLE_SIZE {
            return Err(ConfigError::SampleTooLarge(self.harness.sample_size));
        }
        match role {
            Role::Acceptor => {
                self.session.accept_address()?;
            }
            Role::Initiator => {
                self.session.connect_address()?;
            }
        }
        Ok(())
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod humantime_duration_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ACCEPTOR_TOML: &str = r#"
        [harness]
        sample_size = 250
        settle_delay = "100ms"
        completion_timeout = "30s"

        [session]
        sender_comp_id = "INBOUND"
        target_comp_id = "OUTBOUND"
        socket_accept_address = "127.0.0.1:5001"

        [diagnostics]
        listen = "127.0.0.1:6060"
    "#;

    #[test]
    fn parses_full_file() {
        let config: HarnessConfig = toml::from_str(ACCEPTOR_TOML).unwrap();
        assert_eq!(config.harness.sample_size, 250);
        assert_eq!(config.harness.settle_delay, Duration::from_millis(100));
        assert_eq!(config.harness.completion_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.harness.rule_for(Role::Acceptor), CompletionRule::Count);
        assert_eq!(
            config.diagnostics.listen,
            Some("127.0.0.1:6060".parse().unwrap())
        );
        assert!(config.validate(Role::Acceptor).is_ok());
    }

    #[test]
    fn harness_table_is_optional() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [session]
            sender_comp_id = "OUTBOUND"
            target_comp_id = "INBOUND"
            socket_connect_address = "127.0.0.1:5001"
            "#,
        )
        .unwrap();
        assert_eq!(config.harness.sample_size, 1000);
        assert_eq!(config.harness.settle_delay, Duration::from_millis(500));
        assert!(config.harness.completion_timeout.is_none());
        assert_eq!(config.harness.rule_for(Role::Initiator), CompletionRule::Marker);
        assert!(config.diagnostics.listen.is_none());
    }

    #[test]
    fn explicit_rule_overrides_role_default() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [harness]
            completion_rule = "count"
            [session]
            sender_comp_id = "OUTBOUND"
            target_comp_id = "INBOUND"
            "#,
        )
        .unwrap();
        assert_eq!(config.harness.rule_for(Role::Initiator), CompletionRule::Count);
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config: HarnessConfig = toml::from_str(ACCEPTOR_TOML).unwrap();
        config.apply_overrides(&Overrides {
            sample_size: Some(10),
            completion_timeout: Some(Duration::from_secs(2)),
            settle_delay: None,
            diagnostics_listen: None,
        });
        assert_eq!(config.harness.sample_size, 10);
        assert_eq!(config.harness.completion_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.harness.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn role_addresses_are_validated() {
        let config: HarnessConfig = toml::from_str(ACCEPTOR_TOML).unwrap();
        assert!(matches!(
            config.validate(Role::Initiator),
            Err(ConfigError::Session(SettingsError::MissingConnectAddress))
        ));
    }

    #[test]
    fn oversized_sample_rejected() {
        let mut config: HarnessConfig = toml::from_str(ACCEPTOR_TOML).unwrap();
        config.harness.sample_size = MAX_SAMPLE_SIZE + 1;
        assert!(matches!(
            config.validate(Role::Acceptor),
            Err(ConfigError::SampleTooLarge(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ACCEPTOR_TOML.as_bytes()).unwrap();
        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.session.sender_comp_id, "INBOUND");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn load_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[harness]\nsample_size = \"many\"\n").unwrap();
        let err = HarnessConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn shipped_configs_are_valid() {
        let acceptor: HarnessConfig =
            toml::from_str(include_str!("../../config/acceptor.toml")).unwrap();
        assert!(acceptor.validate(Role::Acceptor).is_ok());
        assert!(acceptor.diagnostics.listen.is_none());

        let initiator: HarnessConfig =
            toml::from_str(include_str!("../../config/initiator.toml")).unwrap();
        assert!(initiator.validate(Role::Initiator).is_ok());
        assert_eq!(initiator.harness.completion_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let result: Result<HarnessConfig, _> = toml::from_str(
            r#"
            [harness]
            completion_timeout = "whenever"
            [session]
            sender_comp_id = "A"
            target_comp_id = "B"
            "#,
        );
        assert!(result.is_err());
    }
}
