//! Host platform surface
//!
//! The engine never touches a browser API directly. Everything it reads or
//! mutates goes through [`Dom`], and everything it defers goes through
//! [`Scheduler`]. `web` implements both over `web-sys`; `memory` and `clock`
//! are the headless implementations the test-suite runs on.

pub mod clock;
pub mod memory;
pub mod web;

use std::rc::Rc;

pub use clock::VirtualClock;
pub use memory::{MemoryDom, MemoryNode, StyleRule, WeakNodeStore};
pub use web::{JsWeakStore, WebDom, WebScheduler};

use crate::hits::index::HitStore;

// =============================================================================
// Types
// =============================================================================

/// `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// True for `interactive` and `complete`
    pub fn is_interactive(self) -> bool {
        matches!(self, ReadyState::Interactive | ReadyState::Complete)
    }
}

/// One record of a mutation batch
#[derive(Debug, Clone)]
pub struct MutationRecord<N> {
    /// Node whose children or attributes changed
    pub target: Option<N>,
    pub added_nodes: Vec<N>,
    pub removed_nodes: Vec<N>,
}

impl<N> MutationRecord<N> {
    pub fn child_list(target: N, added_nodes: Vec<N>, removed_nodes: Vec<N>) -> Self {
        Self {
            target: Some(target),
            added_nodes,
            removed_nodes,
        }
    }

    pub fn attributes(target: N) -> Self {
        Self {
            target: Some(target),
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }
}

/// Receives every batch of mutation records delivered by the host
pub type MutationCallback<N> = Rc<dyn Fn(Vec<MutationRecord<N>>)>;

/// Fired on every readiness change
pub type ReadyCallback = Rc<dyn Fn()>;

/// Handle for a registered readiness listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u32);

/// Handle for a pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub i32);

// =============================================================================
// Traits
// =============================================================================

/// Document access needed by the hit counter
///
/// Nodes are cheap handles (`Rc` or JS references). Identity is reference
/// identity, never value equality.
pub trait Dom: 'static {
    type Node: Clone + 'static;
    type Store: HitStore<Self::Node>;

    fn ready_state(&self) -> ReadyState;
    fn add_ready_listener(&self, callback: ReadyCallback) -> ListenerId;
    fn remove_ready_listener(&self, id: ListenerId);

    /// `document.querySelectorAll('*')`, in document order
    fn all_elements(&self) -> Vec<Self::Node>;
    /// `element.querySelectorAll('*')`, in document order
    fn descendants(&self, node: &Self::Node) -> Vec<Self::Node>;
    fn is_element(&self, node: &Self::Node) -> bool;
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    fn same_node(&self, a: &Self::Node, b: &Self::Node) -> bool;

    /// Computed `content` property, `None` when it carries no string
    fn computed_content(&self, node: &Self::Node) -> Option<String>;
    fn local_name(&self, node: &Self::Node) -> String;
    /// Attributes in the element's own enumeration order
    fn attributes(&self, node: &Self::Node) -> Vec<(String, Option<String>)>;

    fn append_child(&self, parent: &Self::Node, child: &Self::Node);
    fn remove(&self, node: &Self::Node);

    /// Subscribe to subtree, child-list and attribute changes of the document
    /// element. Returns false when the host has no change notifications.
    fn observe_mutations(&self, callback: MutationCallback<Self::Node>) -> bool;
    /// Stop delivering records; pending ones are discarded
    fn disconnect_mutations(&self);

    /// Fresh identity-keyed store for the dedup index
    fn new_store(&self) -> Self::Store;
}

/// One-shot timers
pub trait Scheduler: 'static {
    fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerId;
    fn clear_timeout(&self, id: TimerId);
}
