//! VirtualClock: deterministic timer queue
//!
//! Time only moves when [`VirtualClock::advance`] is called. Timers due at the
//! same instant run in the order they were scheduled.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::host::{Scheduler, TimerId};

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct ClockInner {
    now: Cell<u64>,
    next_id: Cell<i32>,
    /// (due, id) → task; ids grow monotonically so ties keep insertion order
    timers: RefCell<BTreeMap<(u64, TimerId), Task>>,
}

/// Clones share the same clock
#[derive(Clone, Default)]
pub struct VirtualClock {
    inner: Rc<ClockInner>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time (ms)
    pub fn now(&self) -> u64 {
        self.inner.now.get()
    }

    pub fn pending(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Due time of the earliest pending timer
    pub fn next_due(&self) -> Option<u64> {
        self.inner.timers.borrow().keys().next().map(|(due, _)| *due)
    }

    /// Move time forward by `ms`, running every timer that falls due,
    /// including ones scheduled by timers that ran.
    pub fn advance(&self, ms: u64) {
        let target = self.now() + ms;
        while let Some((due, task)) = self.pop_due(target) {
            self.inner.now.set(due);
            task();
        }
        self.inner.now.set(target);
    }

    /// Run timers until none are left, up to `max_tasks`. Returns the number run.
    pub fn run_until_idle(&self, max_tasks: usize) -> usize {
        let mut ran = 0;
        while ran < max_tasks {
            let Some(due) = self.next_due() else {
                break;
            };
            let Some((due, task)) = self.pop_due(due) else {
                break;
            };
            self.inner.now.set(due);
            task();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, target: u64) -> Option<(u64, Task)> {
        let mut timers = self.inner.timers.borrow_mut();
        let key = *timers.keys().next()?;
        if key.0 > target {
            return None;
        }
        timers.remove(&key).map(|task| (key.0, task))
    }
}

impl Scheduler for VirtualClock {
    fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.inner.next_id.get() + 1);
        self.inner.next_id.set(id.0);
        let due = self.now() + u64::from(delay_ms);
        self.inner.timers.borrow_mut().insert((due, id), task);
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        self.inner
            .timers
            .borrow_mut()
            .retain(|(_, timer), _| *timer != id);
    }
}
