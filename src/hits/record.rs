//! Hit records, rule keys and the shared hit sink

use serde::{Deserialize, Serialize};
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::hits::marker::ContentMarker;

/// Separator between filter id and rule text in a rule key
pub const RULE_FILTER_SEPARATOR: char = ';';

// =============================================================================
// Types
// =============================================================================

/// One confirmed observation that a rule affected an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRecord {
    pub filter_id: i64,
    pub rule_text: String,
    /// Element snapshot, see [`crate::hits::signature`]
    #[serde(rename = "element")]
    pub element_signature: String,
}

impl HitRecord {
    pub fn new(marker: ContentMarker, element_signature: String) -> Self {
        Self {
            filter_id: marker.filter_id,
            rule_text: marker.rule_text,
            element_signature,
        }
    }
}

/// Dedup key: `{filterId};{ruleText}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey(String);

impl RuleKey {
    pub fn new(filter_id: i64, rule_text: &str) -> Self {
        Self(format!("{}{}{}", filter_id, RULE_FILTER_SEPARATOR, rule_text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RuleKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Completed full-document walks
    pub full_scans: u64,
    /// Walk requests dropped because one was in flight
    pub skipped_scans: u64,
    /// Mutation batches handled by the reactor
    pub mutation_batches: u64,
    /// Top-level probe elements re-attached and scanned
    pub probes_processed: u64,
    /// Hits handed to the callback, all paths
    pub hits_reported: u64,
    /// Hits reported through the extended-css path
    pub external_reports: u64,
    /// Wall time of the last completed walk, first chunk to last
    pub last_walk_us: u64,
}

pub(crate) type SharedStats = Rc<RefCell<ScanStats>>;

pub(crate) fn shared_stats() -> SharedStats {
    Rc::new(RefCell::new(ScanStats::default()))
}

// =============================================================================
// HitSink
// =============================================================================

/// Callback receiving each delivered array of hits
pub type HitCallback = Rc<dyn Fn(Vec<HitRecord>)>;

/// The one callback all detection paths funnel into. Set once; empty arrays
/// are never delivered.
#[derive(Clone, Default)]
pub struct HitSink {
    callback: Rc<OnceCell<HitCallback>>,
    stats: SharedStats,
}

impl HitSink {
    pub(crate) fn new(stats: SharedStats) -> Self {
        Self {
            callback: Rc::new(OnceCell::new()),
            stats,
        }
    }

    /// Install the callback; false if one is already installed
    pub fn install(&self, callback: HitCallback) -> bool {
        self.callback.set(callback).is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.callback.get().is_some()
    }

    pub fn deliver(&self, hits: Vec<HitRecord>) {
        if hits.is_empty() {
            return;
        }
        // Clone out so the callback may re-enter the counter
        let Some(callback) = self.callback.get().cloned() else {
            return;
        };
        self.stats.borrow_mut().hits_reported += hits.len() as u64;
        callback(hits);
    }
}
