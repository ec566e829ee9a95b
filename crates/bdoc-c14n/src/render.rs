#![forbid(unsafe_code)]

//! Start-tag rendering and canonical attribute order.

use std::cmp::Ordering;

use bdoc_xml::Attr;

use crate::escape;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsDecl<'a> {
    /// The prefix ("" for the default namespace).
    pub prefix: &'a str,
    pub uri: &'a str,
}

impl<'a> NsDecl<'a> {
    pub fn of(attr: &'a Attr) -> Self {
        Self {
            prefix: attr.declared_prefix(),
            uri: &attr.value,
        }
    }

    pub fn render(&self, out: &mut String) {
        if self.prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(self.prefix);
            out.push_str("=\"");
        }
        escape::attr(out, self.uri);
        out.push('"');
    }
}

impl Ord for NsDecl<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Default namespace first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(other.prefix),
        }
    }
}

impl PartialOrd for NsDecl<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical order of the attributes of one start tag: namespace
/// declarations come first in [`NsDecl`] order, followed by the remaining
/// attributes sorted by namespace URI and then local name, with
/// unqualified attributes ahead of qualified ones.
pub fn attr_order(a: &Attr, b: &Attr) -> Ordering {
    match (a.is_namespace_decl(), b.is_namespace_decl()) {
        (true, true) => NsDecl::of(a).cmp(&NsDecl::of(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (a.name.space.is_empty(), b.name.space.is_empty()) {
            (true, true) => a.name.local.cmp(&b.name.local),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => a
                .name
                .space
                .cmp(&b.name.space)
                .then_with(|| a.name.local.cmp(&b.name.local)),
        },
    }
}

/// Render a regular attribute under its original prefix.
pub fn render_attr(out: &mut String, attr: &Attr) {
    out.push(' ');
    if !attr.prefix.is_empty() {
        out.push_str(&attr.prefix);
        out.push(':');
    }
    out.push_str(&attr.name.local);
    out.push_str("=\"");
    escape::attr(out, &attr.value);
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdoc_xml::Name;

    fn attr(prefix: &str, space: &str, local: &str) -> Attr {
        Attr {
            prefix: prefix.into(),
            name: Name::new(space, local),
            value: "v".into(),
        }
    }

    #[test]
    fn declarations_sort_before_attributes() {
        let mut attrs = vec![
            attr("b", "ns1", "x"),
            attr("", "", "z"),
            attr("xmlns", "xmlns", "b"),
            attr("a", "ns0", "y"),
            attr("", "", "xmlns"),
            attr("xmlns", "xmlns", "a"),
        ];
        attrs.sort_by(attr_order);
        let order: Vec<_> = attrs
            .iter()
            .map(|a| format!("{}:{}", a.prefix, a.name.local))
            .collect();
        assert_eq!(
            order,
            vec![":xmlns", "xmlns:a", "xmlns:b", ":z", "a:y", "b:x"]
        );
    }

    #[test]
    fn sorts_by_uri_not_prefix() {
        let mut attrs = vec![attr("a", "urn:z", "attr"), attr("z", "urn:a", "attr")];
        attrs.sort_by(attr_order);
        assert_eq!(attrs[0].prefix, "z");
    }
}
