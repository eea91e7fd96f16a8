//! Configuration types and defaults for the hit counter

use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

use crate::error::HitsError;

/// Elements examined per synchronous chunk of a full walk
pub const CSS_HITS_BATCH_SIZE: usize = 25;

/// Pause between chunks of a full walk (ms)
pub const COUNT_CSS_HITS_BATCH_DELAY_MS: u32 = 5;

/// Quiet period after the last mutation batch before a full rescan (ms)
pub const COUNT_ALL_CSS_HITS_TIMEOUT_MS: u32 = 500;

/// Reserved prefix of the injected `content` value
pub const CONTENT_ATTR_PREFIX: &str = "adguard";

// =============================================================================
// HitsConfig
// =============================================================================

/// Hit counter configuration. Every field has a default, so partial JSON or
/// JS objects are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HitsConfig {
    /// Chunk size of the full-document walk. Default: 25
    pub batch_size: usize,
    /// Delay between chunks of the walk. Default: 5
    pub batch_delay_ms: u32,
    /// Debounce window for mutation-triggered rescans. Default: 500
    pub rescan_debounce_ms: u32,
    /// Marker prefix looked for in computed `content`. Default: "adguard"
    pub marker_prefix: String,
    /// Emit verbose console lines. Default: false
    pub debug: bool,
}

impl Default for HitsConfig {
    fn default() -> Self {
        Self {
            batch_size: CSS_HITS_BATCH_SIZE,
            batch_delay_ms: COUNT_CSS_HITS_BATCH_DELAY_MS,
            rescan_debounce_ms: COUNT_ALL_CSS_HITS_TIMEOUT_MS,
            marker_prefix: CONTENT_ATTR_PREFIX.to_string(),
            debug: false,
        }
    }
}

impl HitsConfig {
    /// Parse from a JSON string, filling gaps with defaults
    pub fn from_json(json: &str) -> Result<Self, HitsError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| HitsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JS object; `undefined`/`null` yield the defaults
    pub fn from_js(value: JsValue) -> Result<Self, HitsError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_wasm_bindgen::from_value(value)
            .map_err(|e| HitsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scanner cannot work with
    pub fn validate(&self) -> Result<(), HitsError> {
        if self.batch_size == 0 {
            return Err(HitsError::InvalidConfig("batchSize must be > 0".into()));
        }
        if self.marker_prefix.is_empty() {
            return Err(HitsError::InvalidConfig("markerPrefix must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HitsConfig::default();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.batch_delay_ms, 5);
        assert_eq!(config.rescan_debounce_ms, 500);
        assert_eq!(config.marker_prefix, "adguard");
        assert!(!config.debug);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HitsConfig::from_json(r#"{ "batchSize": 10, "debug": true }"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert!(config.debug);
        assert_eq!(config.rescan_debounce_ms, 500);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = HitsConfig::from_json(r#"{ "batchSize": 0 }"#).unwrap_err();
        assert!(matches!(err, HitsError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = HitsConfig::from_json("{ batchSize: ").unwrap_err();
        assert!(matches!(err, HitsError::Config(_)));
    }
}
