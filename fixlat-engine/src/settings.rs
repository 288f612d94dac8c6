//! Session settings.
//!
//! Deserialized from the `[session]` table of the harness configuration.

use crate::message::DEFAULT_BEGIN_STRING;
use crate::session::SessionId;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Problems detected when validating [`SessionSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("SenderCompID and TargetCompID are both '{0}'")]
    SameCompIds(String),

    #[error("acceptor sessions require socket_accept_address")]
    MissingAcceptAddress,

    #[error("initiator sessions require socket_connect_address")]
    MissingConnectAddress,

    #[error("heartbeat_interval must be at least one second")]
    HeartbeatTooShort,
}

/// Settings for one FIX session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Protocol version (BeginString).
    #[serde(default = "default_begin_string")]
    pub begin_string: String,
    /// Our CompID.
    pub sender_comp_id: String,
    /// Counterparty CompID.
    pub target_comp_id: String,
    /// HeartBtInt advertised at logon.
    #[serde(
        default = "default_heartbeat_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub heartbeat_interval: Duration,
    /// Listen address (acceptor only).
    #[serde(default)]
    pub socket_accept_address: Option<SocketAddr>,
    /// `host:port` to connect to (initiator only).
    #[serde(default)]
    pub socket_connect_address: Option<String>,
    /// Delay between connection attempts (initiator only).
    #[serde(
        default = "default_reconnect_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub reconnect_interval: Duration,
    /// How long to wait for the counterparty's Logon.
    #[serde(
        default = "default_logon_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub logon_timeout: Duration,
}

impl SessionSettings {
    /// Settings with defaults for everything but the CompIDs.
    pub fn new(sender_comp_id: impl Into<String>, target_comp_id: impl Into<String>) -> Self {
        Self {
            begin_string: default_begin_string(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            heartbeat_interval: default_heartbeat_interval(),
            socket_accept_address: None,
            socket_connect_address: None,
            reconnect_interval: default_reconnect_interval(),
            logon_timeout: default_logon_timeout(),
        }
    }

    /// The session this configuration describes, from our point of view.
    pub fn session_id(&self) -> SessionId {
        SessionId::new(
            &self.begin_string,
            &self.sender_comp_id,
            &self.target_comp_id,
        )
    }

    /// Validate fields common to both roles.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.begin_string.trim().is_empty() {
            return Err(SettingsError::Empty("begin_string"));
        }
        if self.sender_comp_id.trim().is_empty() {
            return Err(SettingsError::Empty("sender_comp_id"));
        }
        if self.target_comp_id.trim().is_empty() {
            return Err(SettingsError::Empty("target_comp_id"));
        }
        if self.sender_comp_id == self.target_comp_id {
            return Err(SettingsError::SameCompIds(self.sender_comp_id.clone()));
        }
        if self.heartbeat_interval < Duration::from_secs(1) {
            return Err(SettingsError::HeartbeatTooShort);
        }
        Ok(())
    }

    /// Validate and return the acceptor listen address.
    pub fn accept_address(&self) -> Result<SocketAddr, SettingsError> {
        self.validate()?;
        self.socket_accept_address
            .ok_or(SettingsError::MissingAcceptAddress)
    }

    /// Validate and return the initiator connect address.
    pub fn connect_address(&self) -> Result<&str, SettingsError> {
        self.validate()?;
        self.socket_connect_address
            .as_deref()
            .filter(|addr| !addr.trim().is_empty())
            .ok_or(SettingsError::MissingConnectAddress)
    }
}

fn default_begin_string() -> String {
    DEFAULT_BEGIN_STRING.to_string()
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_logon_timeout() -> Duration {
    Duration::from_secs(10)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let settings: SessionSettings = toml::from_str(
            r#"
            sender_comp_id = "OUTBOUND"
            target_comp_id = "INBOUND"
            "#,
        )
        .unwrap();

        assert_eq!(settings.begin_string, "FIX.4.2");
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.reconnect_interval, Duration::from_secs(5));
        assert!(settings.socket_accept_address.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn durations_parse_humantime() {
        let settings: SessionSettings = toml::from_str(
            r#"
            sender_comp_id = "A"
            target_comp_id = "B"
            heartbeat_interval = "2s"
            logon_timeout = "1500ms"
            "#,
        )
        .unwrap();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(settings.logon_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let result: Result<SessionSettings, _> = toml::from_str(
            r#"
            sender_comp_id = "A"
            target_comp_id = "B"
            heartbeat_interval = "soon"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn same_comp_ids_rejected() {
        let settings = SessionSettings::new("X", "X");
        assert_eq!(
            settings.validate(),
            Err(SettingsError::SameCompIds("X".to_string()))
        );
    }

    #[test]
    fn role_specific_addresses_required() {
        let settings = SessionSettings::new("A", "B");
        assert_eq!(
            settings.accept_address(),
            Err(SettingsError::MissingAcceptAddress)
        );
        assert_eq!(
            settings.connect_address(),
            Err(SettingsError::MissingConnectAddress)
        );
    }

    #[test]
    fn session_id_uses_our_perspective() {
        let settings = SessionSettings::new("OUTBOUND", "INBOUND");
        assert_eq!(settings.session_id().to_string(), "FIX.4.2:OUTBOUND->INBOUND");
    }
}
