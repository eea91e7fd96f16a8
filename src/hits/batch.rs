//! BatchScanner: full-document walk in small chunks
//!
//! The element list is captured once, split into chunks of `batch_size`, and
//! processed one chunk per scheduler tick with a short delay in between, so a
//! large page never pays for the whole walk in a single turn. Hits are
//! collected across chunks and delivered once, at the end.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::config::HitsConfig;
use crate::hits::detector::HitDetector;
use crate::hits::record::{HitRecord, SharedStats};
use crate::host::{Dom, Scheduler};

type DoneCallback = Box<dyn FnOnce(Vec<HitRecord>)>;

// =============================================================================
// BatchWalk
// =============================================================================

/// Pending work of one walk: chunks left to scan plus hits found so far
pub struct BatchWalk<N> {
    chunks: VecDeque<Vec<N>>,
    hits: Vec<HitRecord>,
    started: instant::Instant,
}

impl<N> BatchWalk<N> {
    pub fn new(elements: Vec<N>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let mut chunks = VecDeque::with_capacity(elements.len() / batch_size + 1);
        let mut elements = elements.into_iter().peekable();
        while elements.peek().is_some() {
            chunks.push_back(elements.by_ref().take(batch_size).collect());
        }
        Self {
            chunks,
            hits: Vec::new(),
            started: instant::Instant::now(),
        }
    }

    pub fn remaining_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_finished(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Scan the next chunk, if any
    pub fn step<D: Dom<Node = N>>(&mut self, detector: &HitDetector<D>) {
        if let Some(chunk) = self.chunks.pop_front() {
            self.hits.extend(detector.detect(&chunk));
        }
    }
}

// =============================================================================
// BatchScanner
// =============================================================================

/// Clones share the in-flight flag
pub struct BatchScanner<D: Dom, S: Scheduler> {
    detector: Rc<HitDetector<D>>,
    scheduler: Rc<S>,
    config: Rc<HitsConfig>,
    in_flight: Rc<Cell<bool>>,
    stats: SharedStats,
}

impl<D: Dom, S: Scheduler> Clone for BatchScanner<D, S> {
    fn clone(&self) -> Self {
        Self {
            detector: self.detector.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
            in_flight: self.in_flight.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<D: Dom, S: Scheduler> BatchScanner<D, S> {
    pub(crate) fn new(
        detector: Rc<HitDetector<D>>,
        scheduler: Rc<S>,
        config: Rc<HitsConfig>,
        stats: SharedStats,
    ) -> Self {
        Self {
            detector,
            scheduler,
            config,
            in_flight: Rc::new(Cell::new(false)),
            stats,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.get()
    }

    /// Walk every element of the document. `on_done` receives the new hits
    /// once the last chunk is processed, and is not called when there are
    /// none. Returns false (and drops the request) while a walk is running.
    pub fn scan_all<F>(&self, on_done: F) -> bool
    where
        F: FnOnce(Vec<HitRecord>) + 'static,
    {
        if self.in_flight.get() {
            self.stats.borrow_mut().skipped_scans += 1;
            debug_log!(self.config, "[CssHits] Full scan already running, request dropped");
            return false;
        }
        self.in_flight.set(true);

        let elements = self.detector.dom().all_elements();
        debug_log!(self.config, "[CssHits] Full scan of {} elements", elements.len());
        let walk = BatchWalk::new(elements, self.config.batch_size);
        self.tick(walk, Box::new(on_done));
        true
    }

    fn tick(&self, mut walk: BatchWalk<D::Node>, on_done: DoneCallback) {
        walk.step(&self.detector);

        if !walk.is_finished() {
            let scanner = self.clone();
            self.scheduler.set_timeout(
                self.config.batch_delay_ms,
                Box::new(move || scanner.tick(walk, on_done)),
            );
            return;
        }

        self.in_flight.set(false);
        {
            let mut stats = self.stats.borrow_mut();
            stats.full_scans += 1;
            stats.last_walk_us = walk.started.elapsed().as_micros() as u64;
        }
        debug_log!(self.config, "[CssHits] Full scan done, {} new hits", walk.hits.len());
        if !walk.hits.is_empty() {
            on_done(walk.hits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_chunking() {
        let walk = BatchWalk::new((0..26).collect::<Vec<u32>>(), 25);
        assert_eq!(walk.remaining_chunks(), 2);

        let walk = BatchWalk::new((0..25).collect::<Vec<u32>>(), 25);
        assert_eq!(walk.remaining_chunks(), 1);

        let walk = BatchWalk::new(Vec::<u32>::new(), 25);
        assert!(walk.is_finished());
    }

    #[test]
    fn test_walk_chunks_keep_order() {
        let walk = BatchWalk::new((0..7).collect::<Vec<u32>>(), 3);
        let chunks: Vec<Vec<u32>> = walk.chunks.into_iter().collect();
        assert_eq!(chunks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }
}
