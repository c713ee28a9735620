//! Serde support for backoff tables (feature-gated)
//!
//! A [`BackoffTable`] is written as a list of waits in milliseconds, so a
//! retry schedule can live in an application's own config file. Empty
//! lists are rejected on deserialize.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use steadfast::BackoffTable;
//!
//! #[derive(Deserialize)]
//! struct ClientConfig {
//!     reconnect_backoff: BackoffTable,
//! }
//!
//! let json = r#"{"reconnect_backoff": [500, 1000, 2000]}"#;
//! let config: ClientConfig = serde_json::from_str(json).unwrap();
//! assert_eq!(config.reconnect_backoff.steps(), 3);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::backoff::BackoffTable;

impl Serialize for BackoffTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = self
            .waits()
            .iter()
            .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX))
            .collect();
        millis.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BackoffTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        BackoffTable::from_millis(&millis).map_err(serde::de::Error::custom)
    }
}
