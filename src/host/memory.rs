//! MemoryDom: an in-memory document
//!
//! Small but faithful where the hit counter cares:
//! - `Rc` element tree with weak parent links, identity by pointer
//! - injected style rules resolved into a computed `content` value, only for
//!   elements connected to the document (as `getComputedStyle` behaves)
//! - mutation records queued while observed and delivered on
//!   [`MemoryDom::flush_mutations`], the analogue of a microtask checkpoint
//! - `readystatechange` listeners

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::hits::index::HitStore;
use crate::hits::record::RuleKey;
use crate::host::{
    Dom, ListenerId, MutationCallback, MutationRecord, ReadyCallback, ReadyState,
};

// =============================================================================
// Nodes
// =============================================================================

enum NodeKind {
    Element { local_name: String },
    Text,
}

struct NodeData {
    kind: NodeKind,
    attributes: RefCell<Vec<(String, Option<String>)>>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<MemoryNode>>,
}

/// Handle to a node of a [`MemoryDom`]. Clones refer to the same node.
#[derive(Clone)]
pub struct MemoryNode(Rc<NodeData>);

/// Non-owning handle to a [`MemoryNode`]
#[derive(Clone)]
pub struct WeakMemoryNode(Weak<NodeData>);

impl WeakMemoryNode {
    pub fn upgrade(&self) -> Option<MemoryNode> {
        self.0.upgrade().map(MemoryNode)
    }
}

impl MemoryNode {
    fn new(kind: NodeKind) -> Self {
        Self(Rc::new(NodeData {
            kind,
            attributes: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element { .. })
    }

    /// Tag name, `#text` for text nodes
    pub fn local_name(&self) -> &str {
        match &self.0.kind {
            NodeKind::Element { local_name } => local_name,
            NodeKind::Text => "#text",
        }
    }

    pub fn parent(&self) -> Option<MemoryNode> {
        self.0.parent.borrow().upgrade().map(MemoryNode)
    }

    pub fn children(&self) -> Vec<MemoryNode> {
        self.0.children.borrow().clone()
    }

    /// Attribute value; `None` both when absent and when valueless
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.clone())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn ptr_eq(&self, other: &MemoryNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakMemoryNode {
        WeakMemoryNode(Rc::downgrade(&self.0))
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MemoryNode {}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.local_name())?;
        for (name, value) in self.0.attributes.borrow().iter() {
            write!(f, " {}=\"{}\"", name, value.as_deref().unwrap_or(""))?;
        }
        write!(f, ">")
    }
}

// =============================================================================
// Style rules
// =============================================================================

/// What an injected rule applies to
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Tag(String),
    Class(String),
    Id(String),
    /// `[name]` or `[name="value"]`
    Attribute { name: String, value: Option<String> },
}

impl Selector {
    fn matches(&self, node: &MemoryNode) -> bool {
        match self {
            Selector::Tag(tag) => node.local_name().eq_ignore_ascii_case(tag),
            Selector::Class(class) => node.has_class(class),
            Selector::Id(id) => node.attribute("id").as_deref() == Some(id.as_str()),
            Selector::Attribute { name, value } => {
                let attributes = node.0.attributes.borrow();
                attributes.iter().any(|(n, v)| {
                    n == name && value.as_ref().map_or(true, |want| v.as_ref() == Some(want))
                })
            }
        }
    }
}

/// An injected style rule setting `content`
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector: Selector,
    /// Unquoted `content` string
    pub content: String,
}

impl StyleRule {
    pub fn new(selector: Selector, content: impl Into<String>) -> Self {
        Self {
            selector,
            content: content.into(),
        }
    }

    pub fn tag(tag: &str, content: impl Into<String>) -> Self {
        Self::new(Selector::Tag(tag.to_string()), content)
    }

    pub fn class(class: &str, content: impl Into<String>) -> Self {
        Self::new(Selector::Class(class.to_string()), content)
    }

    pub fn id(id: &str, content: impl Into<String>) -> Self {
        Self::new(Selector::Id(id.to_string()), content)
    }

    pub fn attribute(name: &str, value: Option<&str>, content: impl Into<String>) -> Self {
        Self::new(
            Selector::Attribute {
                name: name.to_string(),
                value: value.map(str::to_string),
            },
            content,
        )
    }
}

// =============================================================================
// MemoryDom
// =============================================================================

struct DomInner {
    document_element: MemoryNode,
    body: MemoryNode,
    ready_state: Cell<ReadyState>,
    rules: RefCell<Vec<StyleRule>>,
    observable: bool,
    observer: RefCell<Option<MutationCallback<MemoryNode>>>,
    pending: RefCell<Vec<MutationRecord<MemoryNode>>>,
    ready_listeners: RefCell<Vec<(ListenerId, ReadyCallback)>>,
    next_listener: Cell<u32>,
}

/// In-memory document with `<html><head></head><body></body></html>`.
/// Clones share the same document.
#[derive(Clone)]
pub struct MemoryDom {
    inner: Rc<DomInner>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Fully loaded document with mutation observation available
    pub fn new() -> Self {
        Self::build(ReadyState::Complete, true)
    }

    /// Document still parsing
    pub fn loading() -> Self {
        Self::build(ReadyState::Loading, true)
    }

    /// Document on a host without change notifications
    pub fn without_observer() -> Self {
        Self::build(ReadyState::Complete, false)
    }

    fn build(ready_state: ReadyState, observable: bool) -> Self {
        let html = MemoryNode::new(NodeKind::Element {
            local_name: "html".into(),
        });
        let head = MemoryNode::new(NodeKind::Element {
            local_name: "head".into(),
        });
        let body = MemoryNode::new(NodeKind::Element {
            local_name: "body".into(),
        });
        for child in [&head, &body] {
            child.0.parent.replace(Rc::downgrade(&html.0));
            html.0.children.borrow_mut().push(child.clone());
        }

        Self {
            inner: Rc::new(DomInner {
                document_element: html,
                body,
                ready_state: Cell::new(ready_state),
                rules: RefCell::new(Vec::new()),
                observable,
                observer: RefCell::new(None),
                pending: RefCell::new(Vec::new()),
                ready_listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
            }),
        }
    }

    pub fn document_element(&self) -> MemoryNode {
        self.inner.document_element.clone()
    }

    pub fn body(&self) -> MemoryNode {
        self.inner.body.clone()
    }

    /// New detached element
    pub fn create_element(&self, tag: &str) -> MemoryNode {
        MemoryNode::new(NodeKind::Element {
            local_name: tag.to_ascii_lowercase(),
        })
    }

    /// New detached text node
    pub fn create_text(&self) -> MemoryNode {
        MemoryNode::new(NodeKind::Text)
    }

    /// Set or replace an attribute, keeping its original position
    pub fn set_attribute(&self, node: &MemoryNode, name: &str, value: Option<&str>) {
        {
            let mut attributes = node.0.attributes.borrow_mut();
            let value = value.map(str::to_string);
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
        self.record(node, || MutationRecord::attributes(node.clone()));
    }

    pub fn is_connected(&self, node: &MemoryNode) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if n.ptr_eq(&self.inner.document_element) {
                return true;
            }
            current = n.parent();
        }
        false
    }

    /// Inject a rule; later rules win, like later stylesheets
    pub fn inject_rule(&self, rule: StyleRule) {
        self.inner.rules.borrow_mut().push(rule);
    }

    pub fn clear_rules(&self) {
        self.inner.rules.borrow_mut().clear();
    }

    /// Change readiness and fire `readystatechange`
    pub fn set_ready_state(&self, state: ReadyState) {
        self.inner.ready_state.set(state);
        let listeners: Vec<ReadyCallback> = self
            .inner
            .ready_listeners
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn ready_listener_count(&self) -> usize {
        self.inner.ready_listeners.borrow().len()
    }

    pub fn is_observed(&self) -> bool {
        self.inner.observer.borrow().is_some()
    }

    pub fn pending_records(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Deliver queued records to the observer as one batch
    pub fn flush_mutations(&self) {
        let records = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if records.is_empty() {
            return;
        }
        let observer = self.inner.observer.borrow().clone();
        if let Some(observer) = observer {
            observer(records);
        }
    }

    fn record(&self, target: &MemoryNode, make: impl FnOnce() -> MutationRecord<MemoryNode>) {
        if self.inner.observer.borrow().is_some() && self.is_connected(target) {
            self.inner.pending.borrow_mut().push(make());
        }
    }

    fn detach(&self, parent: &MemoryNode, child: &MemoryNode) {
        parent.0.children.borrow_mut().retain(|c| !c.ptr_eq(child));
        child.0.parent.replace(Weak::new());
        self.record(parent, || {
            MutationRecord::child_list(parent.clone(), Vec::new(), vec![child.clone()])
        });
    }

    fn collect_elements(node: &MemoryNode, out: &mut Vec<MemoryNode>) {
        for child in node.0.children.borrow().iter() {
            if child.is_element() {
                out.push(child.clone());
            }
            Self::collect_elements(child, out);
        }
    }
}

impl Dom for MemoryDom {
    type Node = MemoryNode;
    type Store = WeakNodeStore;

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state.get()
    }

    fn add_ready_listener(&self, callback: ReadyCallback) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner.ready_listeners.borrow_mut().push((id, callback));
        id
    }

    fn remove_ready_listener(&self, id: ListenerId) {
        self.inner
            .ready_listeners
            .borrow_mut()
            .retain(|(listener, _)| *listener != id);
    }

    fn all_elements(&self) -> Vec<MemoryNode> {
        let mut out = vec![self.document_element()];
        Self::collect_elements(&self.inner.document_element, &mut out);
        out
    }

    fn descendants(&self, node: &MemoryNode) -> Vec<MemoryNode> {
        let mut out = Vec::new();
        Self::collect_elements(node, &mut out);
        out
    }

    fn is_element(&self, node: &MemoryNode) -> bool {
        node.is_element()
    }

    fn parent(&self, node: &MemoryNode) -> Option<MemoryNode> {
        node.parent()
    }

    fn same_node(&self, a: &MemoryNode, b: &MemoryNode) -> bool {
        a.ptr_eq(b)
    }

    fn computed_content(&self, node: &MemoryNode) -> Option<String> {
        if !node.is_element() || !self.is_connected(node) {
            return None;
        }
        let rules = self.inner.rules.borrow();
        rules
            .iter()
            .rev()
            .find(|rule| rule.selector.matches(node))
            .map(|rule| format!("\"{}\"", rule.content))
    }

    fn local_name(&self, node: &MemoryNode) -> String {
        node.local_name().to_string()
    }

    fn attributes(&self, node: &MemoryNode) -> Vec<(String, Option<String>)> {
        node.0.attributes.borrow().clone()
    }

    fn append_child(&self, parent: &MemoryNode, child: &MemoryNode) {
        if let Some(old_parent) = child.parent() {
            self.detach(&old_parent, child);
        }
        child.0.parent.replace(Rc::downgrade(&parent.0));
        parent.0.children.borrow_mut().push(child.clone());
        self.record(parent, || {
            MutationRecord::child_list(parent.clone(), vec![child.clone()], Vec::new())
        });
    }

    fn remove(&self, node: &MemoryNode) {
        if let Some(parent) = node.parent() {
            self.detach(&parent, node);
        }
    }

    fn observe_mutations(&self, callback: MutationCallback<MemoryNode>) -> bool {
        if !self.inner.observable {
            return false;
        }
        self.inner.observer.replace(Some(callback));
        true
    }

    fn disconnect_mutations(&self) {
        self.inner.observer.replace(None);
        self.inner.pending.borrow_mut().clear();
    }

    fn new_store(&self) -> WeakNodeStore {
        WeakNodeStore::default()
    }
}

// =============================================================================
// WeakNodeStore
// =============================================================================

const MIN_SWEEP_THRESHOLD: usize = 64;

/// [`HitStore`] over `Weak` node references keyed by node address.
///
/// A `Weak` pins the allocation, so an address cannot be reused while its
/// entry exists. Dead entries are swept whenever the table doubles.
#[derive(Default)]
pub struct WeakNodeStore {
    entries: HashMap<usize, (Weak<NodeData>, RuleKey)>,
    sweep_at: usize,
}

impl WeakNodeStore {
    /// Entries whose element is still alive
    pub fn live_len(&self) -> usize {
        self.entries
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }

    fn sweep(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_THRESHOLD);
    }
}

impl HitStore<MemoryNode> for WeakNodeStore {
    fn get(&self, node: &MemoryNode) -> Option<RuleKey> {
        let (weak, key) = self.entries.get(&node.address())?;
        (weak.strong_count() > 0).then(|| key.clone())
    }

    fn insert(&mut self, node: &MemoryNode, key: RuleKey) {
        self.entries
            .insert(node.address(), (Rc::downgrade(&node.0), key));
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_tree() {
        let dom = MemoryDom::new();
        let all = dom.all_elements();
        let names: Vec<_> = all.iter().map(|n| n.local_name().to_string()).collect();
        assert_eq!(names, vec!["html", "head", "body"]);
    }

    #[test]
    fn test_append_and_remove() {
        let dom = MemoryDom::new();
        let div = dom.create_element("div");
        dom.append_child(&dom.body(), &div);
        assert!(dom.is_connected(&div));
        assert_eq!(div.parent(), Some(dom.body()));

        dom.remove(&div);
        assert!(!dom.is_connected(&div));
        assert!(div.parent().is_none());
        assert!(dom.body().children().is_empty());
    }

    #[test]
    fn test_append_moves_node() {
        let dom = MemoryDom::new();
        let a = dom.create_element("div");
        let b = dom.create_element("div");
        let child = dom.create_element("span");
        dom.append_child(&dom.body(), &a);
        dom.append_child(&dom.body(), &b);
        dom.append_child(&a, &child);
        dom.append_child(&b, &child);
        assert!(a.children().is_empty());
        assert_eq!(b.children(), vec![child]);
    }

    #[test]
    fn test_descendants_document_order_elements_only() {
        let dom = MemoryDom::new();
        let outer = dom.create_element("div");
        let first = dom.create_element("p");
        let nested = dom.create_element("b");
        let second = dom.create_element("p");
        dom.append_child(&outer, &first);
        dom.append_child(&first, &nested);
        dom.append_child(&first, &dom.create_text());
        dom.append_child(&outer, &second);
        assert_eq!(dom.descendants(&outer), vec![first, nested, second]);
    }

    #[test]
    fn test_computed_content_requires_connection() {
        let dom = MemoryDom::new();
        dom.inject_rule(StyleRule::class("ad", "adguard1;##.ad"));
        let div = dom.create_element("div");
        dom.set_attribute(&div, "class", Some("x ad"));
        assert_eq!(dom.computed_content(&div), None);

        dom.append_child(&dom.body(), &div);
        assert_eq!(dom.computed_content(&div).as_deref(), Some("\"adguard1;##.ad\""));
    }

    #[test]
    fn test_later_rule_wins() {
        let dom = MemoryDom::new();
        dom.inject_rule(StyleRule::tag("div", "adguard1;##div"));
        dom.inject_rule(StyleRule::id("top", "adguard2;###top"));
        let div = dom.create_element("div");
        dom.set_attribute(&div, "id", Some("top"));
        dom.append_child(&dom.body(), &div);
        assert_eq!(dom.computed_content(&div).as_deref(), Some("\"adguard2;###top\""));
    }

    #[test]
    fn test_clear_rules() {
        let dom = MemoryDom::new();
        dom.inject_rule(StyleRule::tag("div", "adguard1;##div"));
        let div = dom.create_element("div");
        dom.append_child(&dom.body(), &div);
        assert!(dom.computed_content(&div).is_some());
        dom.clear_rules();
        assert_eq!(dom.computed_content(&div), None);
    }

    #[test]
    fn test_attribute_selector() {
        let dom = MemoryDom::new();
        dom.inject_rule(StyleRule::attribute("data-ad", None, "adguard1;##[data-ad]"));
        let div = dom.create_element("div");
        dom.append_child(&dom.body(), &div);
        assert_eq!(dom.computed_content(&div), None);
        dom.set_attribute(&div, "data-ad", None);
        assert!(dom.computed_content(&div).is_some());
    }

    #[test]
    fn test_records_only_while_observed_and_connected() {
        let dom = MemoryDom::new();
        let before = dom.create_element("div");
        dom.append_child(&dom.body(), &before);
        assert_eq!(dom.pending_records(), 0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        assert!(dom.observe_mutations(Rc::new(move |records: Vec<MutationRecord<MemoryNode>>| {
            sink.borrow_mut().push(records.len());
        })));

        let wrapper = dom.create_element("div");
        dom.append_child(&wrapper, &dom.create_element("span"));
        assert_eq!(dom.pending_records(), 0);

        dom.append_child(&dom.body(), &wrapper);
        dom.remove(&wrapper);
        assert_eq!(dom.pending_records(), 2);

        dom.flush_mutations();
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(dom.pending_records(), 0);
    }

    #[test]
    fn test_disconnect_discards_pending() {
        let dom = MemoryDom::new();
        dom.observe_mutations(Rc::new(|_: Vec<MutationRecord<MemoryNode>>| {
            panic!("should not be delivered")
        }));
        dom.append_child(&dom.body(), &dom.create_element("div"));
        dom.disconnect_mutations();
        dom.flush_mutations();
        assert!(!dom.is_observed());
    }

    #[test]
    fn test_without_observer() {
        let dom = MemoryDom::without_observer();
        assert!(!dom.observe_mutations(Rc::new(|_: Vec<MutationRecord<MemoryNode>>| {})));
    }

    #[test]
    fn test_ready_listeners() {
        let dom = MemoryDom::loading();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let id = dom.add_ready_listener(Rc::new(move || counter.set(counter.get() + 1)));
        dom.set_ready_state(ReadyState::Interactive);
        dom.remove_ready_listener(id);
        dom.set_ready_state(ReadyState::Complete);
        assert_eq!(fired.get(), 1);
        assert_eq!(dom.ready_listener_count(), 0);
    }

    #[test]
    fn test_weak_store_sweeps_dead_entries() {
        let dom = MemoryDom::new();
        let mut store = dom.new_store();
        let keep = dom.create_element("div");
        store.insert(&keep, RuleKey::new(1, "a"));
        for _ in 0..200 {
            let temp = dom.create_element("span");
            store.insert(&temp, RuleKey::new(1, "b"));
        }
        assert_eq!(store.live_len(), 1);
        assert!(store.entries.len() < 200);
        assert_eq!(store.get(&keep), Some(RuleKey::new(1, "a")));
    }
}
