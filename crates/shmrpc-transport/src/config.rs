use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default size of each per-connection memory segment: 4 MiB.
pub const DEFAULT_MEMORY_SIZE: usize = 4 * 1024 * 1024;

/// Default pause between accessor reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Configuration of the raw transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity in bytes of each direction's segment of a connection.
    pub memory_size: usize,
    /// Pause between reconnect attempts of a client accessor.
    #[serde(rename = "reconnect_delay_ms", with = "millis")]
    pub reconnect_delay: Duration,
    /// Connect timeout used when a call does not pass one. `None` waits indefinitely.
    #[serde(rename = "connect_timeout_ms", with = "millis::option")]
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: None,
        }
    }
}

/// Serde helpers encoding durations as whole milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// The same encoding for optional durations; `null` means "none".
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.memory_size, 4 * 1024 * 1024);
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn parses_millisecond_fields() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"memory_size": 65536, "reconnect_delay_ms": 5, "connect_timeout_ms": 250}"#,
        )
        .expect("config should parse");

        assert_eq!(config.memory_size, 65536);
        assert_eq!(config.reconnect_delay, Duration::from_millis(5));
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"connect_timeout_ms": null}"#).expect("config should parse");
        assert_eq!(config, TransportConfig::default());
    }

    #[test]
    fn serializes_round_trip() {
        let config = TransportConfig {
            connect_timeout: Some(Duration::from_secs(2)),
            ..TransportConfig::default()
        };
        let json = serde_json::to_string(&config).expect("config should serialize");
        assert!(json.contains("\"connect_timeout_ms\":2000"));

        let parsed: TransportConfig = serde_json::from_str(&json).expect("config should parse");
        assert_eq!(parsed, config);
    }
}
