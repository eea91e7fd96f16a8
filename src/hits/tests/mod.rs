//! Scenario suites running the whole engine on `MemoryDom` + `VirtualClock`


use std::cell::RefCell;
use std::rc::Rc;

use crate::config::HitsConfig;
use crate::hits::controller::HitsController;
use crate::hits::record::HitRecord;
use crate::host::{Dom, MemoryDom, MemoryNode, VirtualClock};

pub(super) type Calls = Rc<RefCell<Vec<Vec<HitRecord>>>>;

pub(super) type TestController = HitsController<MemoryDom, VirtualClock>;

/// Controller over `dom` plus the clock driving it
pub(super) fn controller(dom: &MemoryDom, config: HitsConfig) -> (TestController, VirtualClock) {
    let clock = VirtualClock::new();
    let controller = HitsController::new(dom.clone(), clock.clone(), config).unwrap();
    (controller, clock)
}

/// Init `controller` with a callback that records every delivered array
pub(super) fn init_recording(controller: &TestController) -> Calls {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    controller
        .init(move |hits: Vec<HitRecord>| sink.borrow_mut().push(hits))
        .unwrap();
    calls
}

/// Append `<tag class="class">` under `parent`
pub(super) fn append(dom: &MemoryDom, parent: &MemoryNode, tag: &str, class: Option<&str>) -> MemoryNode {
    let node = dom.create_element(tag);
    if let Some(class) = class {
        dom.set_attribute(&node, "class", Some(class));
    }
    dom.append_child(parent, &node);
    node
}

pub(super) fn filter_ids(hits: &[HitRecord]) -> Vec<i64> {
    hits.iter().map(|hit| hit.filter_id).collect()
}
