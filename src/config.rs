//! Queue configuration.

use serde::Deserialize;

/// Maximum concurrent transfers when not configured otherwise.
///
/// Keeps throughput over many small files good without hammering the remote
/// service's connection and rate limits.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on transfers in `active` status at any moment.
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl QueueConfig {
    /// A zero cap would starve the queue forever, so it is bumped to 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cap_is_three() {
        assert_eq!(QueueConfig::default().max_concurrent, 3);
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        assert_eq!(QueueConfig::new(0).max_concurrent, 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: QueueConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);

        let config: QueueConfig =
            serde_json::from_str(r#"{"max_concurrent": 8}"#).expect("explicit cap");
        assert_eq!(config.max_concurrent, 8);
    }
}
