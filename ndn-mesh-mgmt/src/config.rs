//! Configuration for the management client.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_COMMAND_LIFETIME_MS;

/// Lifetimes and behaviour knobs of [`NfdClient`](crate::NfdClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Lifetime of signed command Interests (in milliseconds)
    pub command_lifetime_ms: u64,

    /// Lifetime of dataset and status Interests (in milliseconds)
    pub dataset_lifetime_ms: u64,

    /// Lifetime of ping Interests (in milliseconds)
    pub ping_lifetime_ms: u64,

    /// Log a warning when a dataset is requested with neither a segment
    /// number nor a child selector
    pub warn_unsegmented_dataset: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            command_lifetime_ms: DEFAULT_COMMAND_LIFETIME_MS,
            dataset_lifetime_ms: DEFAULT_COMMAND_LIFETIME_MS,
            ping_lifetime_ms: DEFAULT_COMMAND_LIFETIME_MS,
            warn_unsegmented_dataset: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.command_lifetime_ms, 2000);
        assert_eq!(options.dataset_lifetime_ms, 2000);
        assert!(options.warn_unsegmented_dataset);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: ClientOptions = serde_json::from_str(r#"{"command_lifetime_ms": 500}"#).unwrap();
        assert_eq!(options.command_lifetime_ms, 500);
        assert_eq!(options.ping_lifetime_ms, 2000);
    }
}
