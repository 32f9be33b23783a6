//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a partial file only overrides what it names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "url": "wss://race.example.com/ws" },
///   "connection": { "reconnectAttempts": 8 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TapsyncSettings {
    pub server: ServerSettings,
    pub connection: ConnectionSettings,
    pub gameplay: GameplaySettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Where the authoritative session owner lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// WebSocket endpoint of the session owner.
    pub url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/ws".to_string(),
        }
    }
}

/// Automatic reconnection behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Attempts before giving up for good.
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ConnectionSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Local timers. None of these are negotiated with the session owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameplaySettings {
    pub countdown_ticks: u8,
    pub tick_interval_ms: u64,
    /// Lifetime of a host-side tap marker.
    pub marker_ttl_ms: u64,
    /// Lifetime of a player-side tap ripple.
    pub ripple_ttl_ms: u64,
}

impl Default for GameplaySettings {
    fn default() -> Self {
        Self {
            countdown_ticks: 5,
            tick_interval_ms: 1000,
            marker_ttl_ms: 2000,
            ripple_ttl_ms: 1000,
        }
    }
}

/// Persisted participant identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file holding the identity; relative paths resolve under `~/.tapsync`.
    pub identity_db: String,
    /// Identity slot, so several players can share one machine.
    pub profile: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            identity_db: "identity.db".to_string(),
            profile: "default".to_string(),
        }
    }
}

impl StorageSettings {
    /// Resolve `identity_db` against `base` unless it is already absolute.
    pub fn identity_db_path(&self, base: &std::path::Path) -> PathBuf {
        let path = PathBuf::from(&self.identity_db);
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_on_disk() {
        let json = serde_json::to_value(TapsyncSettings::default()).unwrap();
        assert_eq!(json["connection"]["reconnectAttempts"], 5);
        assert_eq!(json["gameplay"]["countdownTicks"], 5);
        assert_eq!(json["storage"]["identityDb"], "identity.db");
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let settings: TapsyncSettings =
            serde_json::from_str(r#"{"gameplay": {"countdownTicks": 3}}"#).unwrap();
        assert_eq!(settings.gameplay.countdown_ticks, 3);
        assert_eq!(settings.gameplay.tick_interval_ms, 1000);
        assert_eq!(settings.connection, ConnectionSettings::default());
    }

    #[test]
    fn identity_db_resolution() {
        let storage = StorageSettings::default();
        let base = std::path::Path::new("/home/ada/.tapsync");
        assert_eq!(
            storage.identity_db_path(base),
            PathBuf::from("/home/ada/.tapsync/identity.db")
        );

        let absolute = StorageSettings {
            identity_db: "/var/lib/tapsync/id.db".into(),
            ..StorageSettings::default()
        };
        assert_eq!(
            absolute.identity_db_path(base),
            PathBuf::from("/var/lib/tapsync/id.db")
        );
    }

    #[test]
    fn reconnect_delay_duration() {
        assert_eq!(
            ConnectionSettings::default().reconnect_delay(),
            Duration::from_secs(1)
        );
    }
}
