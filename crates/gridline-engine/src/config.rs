use serde::{Deserialize, Serialize};

/// Engine tunables.
///
/// No file I/O happens here: embedders construct one (or deserialize it from
/// whatever configuration channel the host editor provides) and hand it to
/// [`crate::Engine`]. Every field has a conservative default, so
/// `EngineConfig::default()` is the configuration actually shipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of lines scanned in each direction when locating the
    /// rows of a table around an interaction point. Tables are assumed
    /// contiguous; this cap bounds the cost of that assumption being wrong.
    pub scan_radius: usize,

    /// Consecutive non-table lines tolerated in one scan direction before the
    /// scan gives up on that direction.
    pub scan_miss_limit: usize,

    /// Minimum column width, as a percentage of the table width, that a
    /// resize drag may leave either affected column with.
    pub min_column_percent: f64,

    /// Host node-index failures tolerated before the session latches into
    /// safe mode and refuses all further destructive repairs.
    pub max_desync_errors: u32,

    /// How long captured styling spans stay reusable, in milliseconds.
    pub styling_span_ttl_ms: u64,

    /// Advisory delay before post-composition reconciliation runs, in
    /// milliseconds. The browser may still be settling the DOM right after a
    /// composition commit.
    pub reconcile_delay_ms: u64,

    /// Minimum length-similarity ratio between an orphan line and its
    /// composition snapshot for a destructive repair to proceed.
    pub similarity_threshold: f64,
}

impl EngineConfig {
    pub fn styling_span_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.styling_span_ttl_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_radius: 100,
            scan_miss_limit: 3,
            min_column_percent: 5.0,
            max_desync_errors: 3,
            styling_span_ttl_ms: 3_000,
            reconcile_delay_ms: 150,
            similarity_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = EngineConfig::default();
        assert!(config.scan_radius > 0);
        assert!(config.min_column_percent > 0.0 && config.min_column_percent < 50.0);
        assert!(config.similarity_threshold > 0.0 && config.similarity_threshold <= 1.0);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"scan_radius": 10}"#).unwrap();
        assert_eq!(config.scan_radius, 10);
        assert_eq!(config.max_desync_errors, EngineConfig::default().max_desync_errors);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let original = EngineConfig {
            scan_radius: 7,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&original).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scan_radius, 7);
    }
}
