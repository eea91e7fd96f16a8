//! HitsController: the public entry point
//!
//! # Design Principles
//! 1. One controller per page context; it owns the callback, the dedup index
//!    and the in-flight flag, nothing lives in globals
//! 2. Counting starts once the document is interactive
//! 3. All detection paths end in the same [`HitSink`]
//!
//! # Usage
//! ```rust
//! use css_hits::{HitsConfig, HitsController};
//! use css_hits::host::{MemoryDom, StyleRule, VirtualClock};
//!
//! let dom = MemoryDom::new();
//! dom.inject_rule(StyleRule::class("ad", "adguard1;##.ad"));
//!
//! let controller = HitsController::new(dom.clone(), VirtualClock::new(), HitsConfig::default()).unwrap();
//! controller.init(|hits| println!("{} hits", hits.len())).unwrap();
//! ```

use std::cell::Cell;
use std::rc::Rc;

use crate::config::HitsConfig;
use crate::error::HitsError;
use crate::hits::batch::BatchScanner;
use crate::hits::detector::HitDetector;
use crate::hits::marker::MarkerCodec;
use crate::hits::reactor::MutationReactor;
use crate::hits::record::{shared_stats, HitCallback, HitRecord, HitSink, ScanStats, SharedStats};
use crate::hits::signature::serialize_element;
use crate::host::{Dom, ListenerId, Scheduler};

struct ControllerInner<D: Dom, S: Scheduler> {
    dom: Rc<D>,
    config: Rc<HitsConfig>,
    detector: Rc<HitDetector<D>>,
    scanner: BatchScanner<D, S>,
    reactor: MutationReactor<D, S>,
    sink: HitSink,
    stats: SharedStats,
    started: Cell<bool>,
    stopped: Cell<bool>,
    ready_listener: Cell<Option<ListenerId>>,
}

impl<D: Dom, S: Scheduler> ControllerInner<D, S> {
    fn start(&self) {
        if self.started.replace(true) {
            return;
        }
        debug_log!(self.config, "[CssHits] Document ready, counting started");
        let sink = self.sink.clone();
        self.scanner.scan_all(move |hits| sink.deliver(hits));
        // The first chunk runs synchronously and its callback may call stop()
        if !self.stopped.get() {
            self.reactor.start();
        }
    }
}

impl<D: Dom, S: Scheduler> Drop for ControllerInner<D, S> {
    fn drop(&mut self) {
        if let Some(id) = self.ready_listener.take() {
            self.dom.remove_ready_listener(id);
        }
        self.reactor.stop();
    }
}

// =============================================================================
// HitsController
// =============================================================================

pub struct HitsController<D: Dom, S: Scheduler> {
    inner: Rc<ControllerInner<D, S>>,
}

impl<D: Dom, S: Scheduler> HitsController<D, S> {
    pub fn new(dom: D, scheduler: S, config: HitsConfig) -> Result<Self, HitsError> {
        config.validate()?;

        let dom = Rc::new(dom);
        let scheduler = Rc::new(scheduler);
        let config = Rc::new(config);
        let stats = shared_stats();
        let sink = HitSink::new(stats.clone());
        let detector = Rc::new(HitDetector::new(
            dom.clone(),
            MarkerCodec::new(config.marker_prefix.clone()),
        ));
        let scanner = BatchScanner::new(
            detector.clone(),
            scheduler.clone(),
            config.clone(),
            stats.clone(),
        );
        let reactor = MutationReactor::new(
            detector.clone(),
            scanner.clone(),
            scheduler,
            config.clone(),
            sink.clone(),
            stats.clone(),
        );

        Ok(Self {
            inner: Rc::new(ControllerInner {
                dom,
                config,
                detector,
                scanner,
                reactor,
                sink,
                stats,
                started: Cell::new(false),
                stopped: Cell::new(false),
                ready_listener: Cell::new(None),
            }),
        })
    }

    /// Install the hit callback and start counting as soon as the document
    /// is interactive. A controller accepts exactly one callback.
    pub fn init<F>(&self, callback: F) -> Result<(), HitsError>
    where
        F: Fn(Vec<HitRecord>) + 'static,
    {
        self.init_shared(Rc::new(callback))
    }

    pub fn init_shared(&self, callback: HitCallback) -> Result<(), HitsError> {
        if !self.inner.sink.install(callback) {
            return Err(HitsError::AlreadyInitialized);
        }

        if self.inner.dom.ready_state().is_interactive() {
            self.inner.start();
            return Ok(());
        }

        let weak = Rc::downgrade(&self.inner);
        let id = self.inner.dom.add_ready_listener(Rc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.dom.ready_state().is_interactive() {
                return;
            }
            if let Some(id) = inner.ready_listener.take() {
                inner.dom.remove_ready_listener(id);
            }
            inner.start();
        }));
        self.inner.ready_listener.set(Some(id));
        Ok(())
    }

    /// Report an element the extended-css engine applied a rule to.
    /// `style_value` is the rule's `content` value, possibly ending with
    /// `!important`. Not deduplicated: the caller reports each match once.
    /// Returns whether a hit was delivered.
    pub fn report_external_match(&self, node: &D::Node, style_value: &str) -> bool {
        if !self.inner.sink.is_installed() {
            return false;
        }
        let Some(marker) = self.inner.detector.codec().decode_extended(style_value) else {
            return false;
        };
        let hit = HitRecord::new(marker, serialize_element(&*self.inner.dom, node));
        self.inner.stats.borrow_mut().external_reports += 1;
        self.inner.sink.deliver(vec![hit]);
        true
    }

    /// Request a full rescan. Dropped while counting has not started or a
    /// walk is already running.
    pub fn rescan(&self) -> bool {
        if !self.inner.started.get() {
            return false;
        }
        let sink = self.inner.sink.clone();
        self.inner.scanner.scan_all(move |hits| sink.deliver(hits))
    }

    /// Stop reacting to mutations, for good. Scans already running finish
    /// normally.
    pub fn stop(&self) {
        self.inner.stopped.set(true);
        self.inner.reactor.stop();
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.get()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanner.is_scanning()
    }

    pub fn is_observing(&self) -> bool {
        self.inner.reactor.is_observing()
    }

    pub fn has_pending_rescan(&self) -> bool {
        self.inner.reactor.has_pending_rescan()
    }

    pub fn stats(&self) -> ScanStats {
        self.inner.stats.borrow().clone()
    }

    pub fn config(&self) -> &HitsConfig {
        &self.inner.config
    }
}
