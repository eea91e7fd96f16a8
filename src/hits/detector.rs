//! HitDetector: decode → dedup → signature for a list of nodes
//!
//! Shared by the full walk and the mutation reactor so both paths count
//! against the same dedup index.

use std::cell::RefCell;
use std::rc::Rc;

use crate::hits::index::HitIndex;
use crate::hits::marker::MarkerCodec;
use crate::hits::record::HitRecord;
use crate::hits::signature::serialize_element;
use crate::host::Dom;

pub struct HitDetector<D: Dom> {
    dom: Rc<D>,
    codec: MarkerCodec,
    index: RefCell<HitIndex<D::Store>>,
}

impl<D: Dom> HitDetector<D> {
    pub fn new(dom: Rc<D>, codec: MarkerCodec) -> Self {
        let index = RefCell::new(HitIndex::new(dom.new_store()));
        Self { dom, codec, index }
    }

    pub fn dom(&self) -> &Rc<D> {
        &self.dom
    }

    pub fn codec(&self) -> &MarkerCodec {
        &self.codec
    }

    /// Total (element, rule) pairs counted so far
    pub fn counted(&self) -> u64 {
        self.index.borrow().marked()
    }

    /// New hits among `nodes`, in the given order. Every returned pair is
    /// marked as counted.
    pub fn detect(&self, nodes: &[D::Node]) -> Vec<HitRecord> {
        nodes.iter().filter_map(|node| self.detect_one(node)).collect()
    }

    fn detect_one(&self, node: &D::Node) -> Option<HitRecord> {
        if !self.dom.is_element(node) {
            return None;
        }
        let content = self.dom.computed_content(node)?;
        let marker = self.codec.decode(&content)?;
        let key = marker.rule_key();

        {
            let mut index = self.index.borrow_mut();
            if index.is_counted(node, &key) {
                return None;
            }
            index.set_counted(node, key);
        }

        Some(HitRecord::new(marker, serialize_element(&*self.dom, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryDom, StyleRule};

    fn setup() -> (MemoryDom, HitDetector<MemoryDom>) {
        let dom = MemoryDom::new();
        let detector = HitDetector::new(Rc::new(dom.clone()), MarkerCodec::default());
        (dom, detector)
    }

    #[test]
    fn test_detects_marked_element() {
        let (dom, detector) = setup();
        dom.inject_rule(StyleRule::class("ad", "adguard2;example.org##.ad"));
        let div = dom.create_element("div");
        dom.set_attribute(&div, "class", Some("ad"));
        dom.append_child(&dom.body(), &div);

        let hits = detector.detect(&[div]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filter_id, 2);
        assert_eq!(hits[0].rule_text, "example.org##.ad");
        assert_eq!(hits[0].element_signature, "<div class=\"ad\">");
    }

    #[test]
    fn test_second_pass_is_deduplicated() {
        let (dom, detector) = setup();
        dom.inject_rule(StyleRule::tag("aside", "adguard1;##aside"));
        let aside = dom.create_element("aside");
        dom.append_child(&dom.body(), &aside);

        assert_eq!(detector.detect(&[aside.clone()]).len(), 1);
        assert!(detector.detect(&[aside]).is_empty());
        assert_eq!(detector.counted(), 1);
    }

    #[test]
    fn test_skips_text_and_unmarked() {
        let (dom, detector) = setup();
        dom.inject_rule(StyleRule::class("other", "\\201C"));
        let text = dom.create_text();
        let plain = dom.create_element("p");
        let foreign = dom.create_element("q");
        dom.set_attribute(&foreign, "class", Some("other"));
        for node in [&text, &plain, &foreign] {
            dom.append_child(&dom.body(), node);
        }
        assert!(detector.detect(&[text, plain, foreign]).is_empty());
    }
}
