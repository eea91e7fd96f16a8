//! Browser host over `web-sys`
//!
//! Only meaningful on wasm32 inside a page. On native targets the types still
//! compile, but every call into them would hit the wasm-bindgen stubs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, MutationObserver, MutationObserverInit, Node,
    NodeList, Window,
};

use crate::error::HitsError;
use crate::hits::index::HitStore;
use crate::hits::record::RuleKey;
use crate::host::{
    Dom, ListenerId, MutationCallback, MutationRecord, ReadyCallback, ReadyState, Scheduler,
    TimerId,
};

const READY_STATE_CHANGE: &str = "readystatechange";

fn node_list_to_vec(list: &NodeList) -> Vec<Node> {
    (0..list.length()).filter_map(|i| list.get(i)).collect()
}

// =============================================================================
// WebDom
// =============================================================================

type ObserverClosure = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

struct WebObserver {
    observer: MutationObserver,
    _closure: ObserverClosure,
}

/// The live page document
pub struct WebDom {
    window: Window,
    document: Document,
    observer: RefCell<Option<WebObserver>>,
    callback: Rc<RefCell<Option<MutationCallback<Node>>>>,
    listeners: RefCell<HashMap<ListenerId, Closure<dyn FnMut(Event)>>>,
    next_listener: Cell<u32>,
}

impl WebDom {
    pub fn new() -> Result<Self, HitsError> {
        let window = web_sys::window().ok_or(HitsError::NoDocument)?;
        let document = window.document().ok_or(HitsError::NoDocument)?;
        Ok(Self {
            window,
            document,
            observer: RefCell::new(None),
            callback: Rc::new(RefCell::new(None)),
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn has_mutation_observer(&self) -> bool {
        js_sys::Reflect::has(&self.window, &JsValue::from_str("MutationObserver")).unwrap_or(false)
    }

    fn ensure_observer(&self) -> Result<(), JsValue> {
        if self.observer.borrow().is_some() {
            return Ok(());
        }
        let slot = self.callback.clone();
        let closure: ObserverClosure = Closure::wrap(Box::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                let Some(callback) = slot.borrow().clone() else {
                    return;
                };
                callback(records.iter().map(convert_record).collect());
            },
        ) as Box<dyn FnMut(js_sys::Array, MutationObserver)>);
        let observer = MutationObserver::new(closure.as_ref().unchecked_ref())?;
        self.observer.replace(Some(WebObserver {
            observer,
            _closure: closure,
        }));
        Ok(())
    }
}

fn convert_record(value: JsValue) -> MutationRecord<Node> {
    let record: web_sys::MutationRecord = value.unchecked_into();
    let target = js_sys::Reflect::get(&record, &JsValue::from_str("target"))
        .ok()
        .and_then(|t| t.dyn_into::<Node>().ok());
    MutationRecord {
        target,
        added_nodes: node_list_to_vec(&record.added_nodes()),
        removed_nodes: node_list_to_vec(&record.removed_nodes()),
    }
}

impl Dom for WebDom {
    type Node = Node;
    type Store = JsWeakStore;

    fn ready_state(&self) -> ReadyState {
        match self.document.ready_state().as_str() {
            "interactive" => ReadyState::Interactive,
            "complete" => ReadyState::Complete,
            _ => ReadyState::Loading,
        }
    }

    fn add_ready_listener(&self, callback: ReadyCallback) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        let closure = Closure::wrap(Box::new(move |_event: Event| callback()) as Box<dyn FnMut(Event)>);
        if let Err(e) = self
            .document
            .add_event_listener_with_callback(READY_STATE_CHANGE, closure.as_ref().unchecked_ref())
        {
            console_error!("[CssHits] Failed to listen for readystatechange: {:?}", e);
        }
        self.listeners.borrow_mut().insert(id, closure);
        id
    }

    fn remove_ready_listener(&self, id: ListenerId) {
        let Some(closure) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        if let Err(e) = self
            .document
            .remove_event_listener_with_callback(READY_STATE_CHANGE, closure.as_ref().unchecked_ref())
        {
            console_error!("[CssHits] Failed to remove readystatechange listener: {:?}", e);
        }
    }

    fn all_elements(&self) -> Vec<Node> {
        match self.document.query_selector_all("*") {
            Ok(list) => node_list_to_vec(&list),
            Err(_) => Vec::new(),
        }
    }

    fn descendants(&self, node: &Node) -> Vec<Node> {
        node.dyn_ref::<Element>()
            .and_then(|element| element.query_selector_all("*").ok())
            .map(|list| node_list_to_vec(&list))
            .unwrap_or_default()
    }

    fn is_element(&self, node: &Node) -> bool {
        node.node_type() == Node::ELEMENT_NODE
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn same_node(&self, a: &Node, b: &Node) -> bool {
        a == b
    }

    fn computed_content(&self, node: &Node) -> Option<String> {
        let element = node.dyn_ref::<Element>()?;
        let style = self.window.get_computed_style(element).ok()??;
        style.get_property_value("content").ok()
    }

    fn local_name(&self, node: &Node) -> String {
        node.dyn_ref::<Element>()
            .map(|element| element.local_name())
            .unwrap_or_else(|| node.node_name())
    }

    fn attributes(&self, node: &Node) -> Vec<(String, Option<String>)> {
        let Some(element) = node.dyn_ref::<Element>() else {
            return Vec::new();
        };
        let attributes = element.attributes();
        (0..attributes.length())
            .filter_map(|i| attributes.item(i))
            .map(|attr| (attr.name(), Some(attr.value())))
            .collect()
    }

    fn append_child(&self, parent: &Node, child: &Node) {
        if let Err(e) = parent.append_child(child) {
            console_error!("[CssHits] Failed to re-attach probe element: {:?}", e);
        }
    }

    fn remove(&self, node: &Node) {
        if let Some(element) = node.dyn_ref::<Element>() {
            element.remove();
        } else if let Some(parent) = node.parent_node() {
            if let Err(e) = parent.remove_child(node) {
                console_error!("[CssHits] Failed to detach node: {:?}", e);
            }
        }
    }

    fn observe_mutations(&self, callback: MutationCallback<Node>) -> bool {
        if !self.has_mutation_observer() {
            return false;
        }
        let Some(root) = self.document.document_element() else {
            return false;
        };
        if let Err(e) = self.ensure_observer() {
            console_error!("[CssHits] Failed to create MutationObserver: {:?}", e);
            return false;
        }
        self.callback.replace(Some(callback));

        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        options.set_attributes(true);

        let observer = self.observer.borrow();
        let Some(web_observer) = observer.as_ref() else {
            return false;
        };
        match web_observer.observer.observe_with_options(&root, &options) {
            Ok(()) => true,
            Err(e) => {
                console_error!("[CssHits] MutationObserver.observe failed: {:?}", e);
                false
            }
        }
    }

    fn disconnect_mutations(&self) {
        if let Some(web_observer) = self.observer.borrow().as_ref() {
            web_observer.observer.disconnect();
        }
        self.callback.replace(None);
    }

    fn new_store(&self) -> JsWeakStore {
        JsWeakStore::new()
    }
}

// =============================================================================
// JsWeakStore
// =============================================================================

/// [`HitStore`] over a JS `WeakMap`, keyed by the node object itself
pub struct JsWeakStore {
    map: js_sys::WeakMap,
}

impl JsWeakStore {
    pub fn new() -> Self {
        Self {
            map: js_sys::WeakMap::new(),
        }
    }
}

impl Default for JsWeakStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HitStore<Node> for JsWeakStore {
    fn get(&self, node: &Node) -> Option<RuleKey> {
        self.map
            .get(node.unchecked_ref::<js_sys::Object>())
            .as_string()
            .map(RuleKey::from)
    }

    fn insert(&mut self, node: &Node, key: RuleKey) {
        self.map.set(
            node.unchecked_ref::<js_sys::Object>(),
            &JsValue::from_str(key.as_str()),
        );
    }
}

// =============================================================================
// WebScheduler
// =============================================================================

type TimerClosure = Closure<dyn FnMut()>;

/// `window.setTimeout`. Owns each timer's closure until it fires or is
/// cleared, so cancelled timers free their task.
pub struct WebScheduler {
    window: Window,
    pending: Rc<RefCell<HashMap<TimerId, TimerClosure>>>,
}

impl WebScheduler {
    pub fn new() -> Result<Self, HitsError> {
        Ok(Self {
            window: web_sys::window().ok_or(HitsError::NoDocument)?,
            pending: Rc::new(RefCell::new(HashMap::new())),
        })
    }

    /// Timers scheduled and neither fired nor cleared
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Scheduler for WebScheduler {
    fn set_timeout(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerId {
        let own_id: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));
        let fired_id = own_id.clone();
        let pending = self.pending.clone();
        let closure: TimerClosure = Closure::once(move || {
            // Released once this call returns
            let _finished = fired_id.get().and_then(|id| pending.borrow_mut().remove(&id));
            task();
        });

        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), delay)
        {
            Ok(handle) => {
                let id = TimerId(handle);
                own_id.set(Some(id));
                self.pending.borrow_mut().insert(id, closure);
                id
            }
            Err(e) => {
                console_error!("[CssHits] setTimeout failed: {:?}", e);
                TimerId(0)
            }
        }
    }

    fn clear_timeout(&self, id: TimerId) {
        self.window.clear_timeout_with_handle(id.0);
        self.pending.borrow_mut().remove(&id);
    }
}
