//! ElementSignature: `<tag attr="value" ...>` snapshot of an element
//!
//! Used only in reports. Two different elements may share a signature, so it
//! is never used for identity.

use crate::host::Dom;

/// Serialize an element's tag and attributes. `"` inside values is escaped
/// as `\"`, a missing value renders empty.
pub fn serialize_element<D: Dom>(dom: &D, node: &D::Node) -> String {
    let mut out = String::with_capacity(32);
    out.push('<');
    out.push_str(&dom.local_name(node));
    for (name, value) in dom.attributes(node) {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        if let Some(value) = value {
            out.push_str(&value.replace('"', "\\\""));
        }
        out.push('"');
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDom;

    #[test]
    fn test_bare_element() {
        let dom = MemoryDom::new();
        let div = dom.create_element("div");
        assert_eq!(serialize_element(&dom, &div), "<div>");
    }

    #[test]
    fn test_attributes_in_order() {
        let dom = MemoryDom::new();
        let a = dom.create_element("a");
        dom.set_attribute(&a, "id", Some("promo"));
        dom.set_attribute(&a, "class", Some("ad banner"));
        dom.set_attribute(&a, "href", Some("https://example.org/"));
        assert_eq!(
            serialize_element(&dom, &a),
            "<a id=\"promo\" class=\"ad banner\" href=\"https://example.org/\">"
        );
    }

    #[test]
    fn test_quotes_escaped_and_null_empty() {
        let dom = MemoryDom::new();
        let div = dom.create_element("div");
        dom.set_attribute(&div, "title", Some("say \"hi\""));
        dom.set_attribute(&div, "hidden", None);
        assert_eq!(
            serialize_element(&dom, &div),
            "<div title=\"say \\\"hi\\\"\" hidden=\"\">"
        );
    }
}
