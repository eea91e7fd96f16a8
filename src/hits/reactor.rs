//! MutationReactor: incremental counting driven by DOM mutations
//!
//! # Probe elements
//! The extended-css engine tests some rules by appending an element and
//! removing it again in the same turn. By the time the mutation batch arrives
//! the element has no parent and no computed style. Such nodes are put back
//! under the record's target, scanned together with their descendants, and
//! removed again. Only the probe itself is removed: its descendants may be
//! real content that was wrapped in it.
//!
//! Nodes that are still attached ("potential probes") are scanned right away
//! when there are few of them. Every batch also (re)starts a debounce timer
//! for a full rescan.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::HitsConfig;
use crate::hits::batch::BatchScanner;
use crate::hits::detector::HitDetector;
use crate::hits::record::{HitSink, SharedStats};
use crate::host::{Dom, MutationCallback, MutationRecord, Scheduler, TimerId};

struct ReactorInner<D: Dom, S: Scheduler> {
    detector: Rc<HitDetector<D>>,
    scanner: BatchScanner<D, S>,
    scheduler: Rc<S>,
    config: Rc<HitsConfig>,
    sink: HitSink,
    stats: SharedStats,
    observing: Cell<bool>,
    /// Set by `stop()`, cleared by `start()`. Checked after every delivery
    /// because the hit callback may stop the reactor mid-batch.
    stopped: Cell<bool>,
    debounce: Cell<Option<TimerId>>,
}

pub struct MutationReactor<D: Dom, S: Scheduler> {
    inner: Rc<ReactorInner<D, S>>,
}

impl<D: Dom, S: Scheduler> MutationReactor<D, S> {
    pub(crate) fn new(
        detector: Rc<HitDetector<D>>,
        scanner: BatchScanner<D, S>,
        scheduler: Rc<S>,
        config: Rc<HitsConfig>,
        sink: HitSink,
        stats: SharedStats,
    ) -> Self {
        Self {
            inner: Rc::new(ReactorInner {
                detector,
                scanner,
                scheduler,
                config,
                sink,
                stats,
                observing: Cell::new(false),
                stopped: Cell::new(false),
                debounce: Cell::new(None),
            }),
        }
    }

    /// Subscribe to document mutations. False when the host has no
    /// change notifications; counting then relies on full scans only.
    pub fn start(&self) -> bool {
        if self.inner.observing.get() {
            return true;
        }
        self.inner.stopped.set(false);
        let observing = self.inner.connect();
        if !observing {
            debug_log!(self.inner.config, "[CssHits] MutationObserver unavailable, incremental counting disabled");
        }
        observing
    }

    /// Unsubscribe and drop any pending rescan
    pub fn stop(&self) {
        self.inner.stopped.set(true);
        self.inner.disconnect();
        if let Some(id) = self.inner.debounce.take() {
            self.inner.scheduler.clear_timeout(id);
        }
    }

    pub fn is_observing(&self) -> bool {
        self.inner.observing.get()
    }

    pub fn has_pending_rescan(&self) -> bool {
        self.inner.debounce.get().is_some()
    }
}

impl<D: Dom, S: Scheduler> ReactorInner<D, S> {
    fn connect(self: &Rc<Self>) -> bool {
        let weak = Rc::downgrade(self);
        let callback: MutationCallback<D::Node> =
            Rc::new(move |records: Vec<MutationRecord<D::Node>>| {
                if let Some(reactor) = weak.upgrade() {
                    reactor.handle(records);
                }
            });
        let observing = self.detector.dom().observe_mutations(callback);
        self.observing.set(observing);
        observing
    }

    fn disconnect(&self) {
        self.detector.dom().disconnect_mutations();
        self.observing.set(false);
    }

    fn handle(self: &Rc<Self>, records: Vec<MutationRecord<D::Node>>) {
        let dom = self.detector.dom();
        let mut probes: Vec<(D::Node, D::Node)> = Vec::new();
        let mut children_of_probes = Vec::new();
        let mut potential_probes = Vec::new();

        for record in &records {
            let Some(target) = record.target.as_ref() else {
                continue;
            };
            for node in &record.added_nodes {
                if !dom.is_element(node) {
                    continue;
                }
                if dom.parent(node).is_none() {
                    probes.push((node.clone(), target.clone()));
                    children_of_probes.extend(dom.descendants(node));
                } else {
                    potential_probes.push(node.clone());
                    potential_probes.extend(dom.descendants(node));
                }
            }
        }
        self.stats.borrow_mut().mutation_batches += 1;

        if !potential_probes.is_empty() && potential_probes.len() <= self.config.batch_size {
            self.sink.deliver(self.detector.detect(&potential_probes));
            if self.stopped.get() {
                return;
            }
        }

        let mut all_probes = Vec::new();
        self.add_unique(&mut all_probes, children_of_probes);
        self.add_unique(&mut all_probes, probes.iter().map(|(probe, _)| probe.clone()));

        if !all_probes.is_empty() {
            debug_log!(
                self.config,
                "[CssHits] Re-attaching {} probe elements ({} nodes)",
                probes.len(),
                all_probes.len()
            );
            // Our own re-attach/detach must not feed back into this observer
            self.disconnect();
            for (probe, target) in &probes {
                dom.append_child(target, probe);
            }
            self.sink.deliver(self.detector.detect(&all_probes));
            for (probe, _) in &probes {
                dom.remove(probe);
            }
            self.stats.borrow_mut().probes_processed += probes.len() as u64;
            if self.stopped.get() {
                return;
            }
            self.connect();
        }

        self.schedule_rescan();
    }

    fn add_unique(&self, target: &mut Vec<D::Node>, source: impl IntoIterator<Item = D::Node>) {
        let dom = self.detector.dom();
        for node in source {
            if !target.iter().any(|existing| dom.same_node(existing, &node)) {
                target.push(node);
            }
        }
    }

    fn schedule_rescan(self: &Rc<Self>) {
        if let Some(id) = self.debounce.take() {
            self.scheduler.clear_timeout(id);
        }
        let weak = Rc::downgrade(self);
        let id = self.scheduler.set_timeout(
            self.config.rescan_debounce_ms,
            Box::new(move || {
                let Some(reactor) = weak.upgrade() else {
                    return;
                };
                reactor.debounce.set(None);
                let sink = reactor.sink.clone();
                reactor.scanner.scan_all(move |hits| sink.deliver(hits));
            }),
        );
        self.debounce.set(Some(id));
    }
}
