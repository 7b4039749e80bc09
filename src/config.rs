//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tx::TxMode;
use crate::{Error, Result};

/// Runtime knobs for a [`TransactionManager`](crate::tx::TransactionManager).
///
/// On the wire the timeout is expressed in milliseconds:
///
/// ```json
/// { "lock_timeout_ms": 250, "default_mode": "Optimistic" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a pessimistic lock wait. `None` waits forever.
    #[serde(rename = "lock_timeout_ms", with = "millis")]
    pub lock_timeout: Option<Duration>,

    /// Mode used by [`TransactionManager::begin_default`](crate::tx::TransactionManager::begin_default).
    pub default_mode: TxMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { lock_timeout: None, default_mode: TxMode::None }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_default_mode(mut self, mode: TxMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "lock_timeout_ms must be positive; omit it to wait forever".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;
    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => {
                let ms = u64::try_from(d.as_millis()).map_err(ser::Error::custom)?;
                s.serialize_some(&ms)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_waits_forever() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.lock_timeout, None);
        assert_eq!(cfg.default_mode, TxMode::None);
    }

    #[test]
    fn test_from_json() {
        let cfg = EngineConfig::from_json_str(
            r#"{"lock_timeout_ms": 250, "default_mode": "Optimistic"}"#,
        ).unwrap();
        assert_eq!(cfg.lock_timeout, Some(Duration::from_millis(250)));
        assert_eq!(cfg.default_mode, TxMode::Optimistic);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let cfg = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = EngineConfig::from_json_str(r#"{"lock_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_serialize_round_trips_millis() {
        let cfg = EngineConfig::default().with_lock_timeout(Duration::from_millis(40));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"lock_timeout_ms\":40"));
    }

    #[test]
    fn test_serialize_rejects_unrepresentable_timeout() {
        let cfg = EngineConfig::default().with_lock_timeout(Duration::MAX);
        assert!(serde_json::to_string(&cfg).is_err());
    }
}
