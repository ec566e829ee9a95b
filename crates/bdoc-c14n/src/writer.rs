#![forbid(unsafe_code)]

//! Canonical XML 1.1 writer for parsed element trees.
//!
//! The tree carries no comments or processing instructions, every element
//! keeps its original start tag, and whitespace between children was
//! recorded by the parser. Canonicalizing is therefore a straight walk:
//! render the start tag with attributes in canonical order, emit namespace
//! declarations only when they change the binding in scope, write the
//! content and close explicitly.

use bdoc_xml::schema::{FieldRef, Role};
use bdoc_xml::{Attr, Header, Node};

use crate::escape;
use crate::mapstack::MapStack;
use crate::render::{self, NsDecl};

#[derive(Default)]
pub(crate) struct Writer {
    out: String,
    ns: MapStack,
}

impl Writer {
    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    /// Writes `node` and its subtree. Panics if `node` does not match its
    /// schema or, when `root` is set, is not a canonicalization root.
    pub fn write(&mut self, node: &dyn Node, root: bool) {
        let schema = node.schema();
        let (header, fields) = node.split();
        assert!(
            schema.matches(&header.start.name),
            "schema {schema} does not match start element {}",
            header.start.name
        );
        assert!(
            !root || schema.c14n_root,
            "{schema} is not a canonicalization root"
        );

        self.ns.push();
        self.out.push('<');
        self.qualified(header);
        self.attributes(header, root);
        self.out.push('>');

        let mut whitespace = header.whitespace.iter().map(String::as_str);
        let content: Vec<_> = schema
            .fields
            .iter()
            .zip(fields)
            .filter(|(desc, _)| desc.is_content())
            .collect();
        let chardata = content
            .first()
            .map_or(false, |(desc, _)| desc.role == Role::CharData);
        if !chardata {
            self.out.push_str(whitespace.next().unwrap_or_default());
        }
        for (desc, field) in content {
            match field {
                FieldRef::Text(text) => {
                    assert_eq!(desc.role, Role::CharData, "{schema}: text in element field");
                    escape::text(&mut self.out, text);
                }
                FieldRef::Nodes(children) => {
                    for child in children {
                        self.write(child, false);
                        self.out.push_str(whitespace.next().unwrap_or_default());
                    }
                }
            }
        }

        self.out.push_str("</");
        self.qualified(header);
        self.out.push('>');
        self.ns.pop();
    }

    fn qualified(&mut self, header: &Header) {
        if !header.start.prefix.is_empty() {
            self.out.push_str(&header.start.prefix);
            self.out.push(':');
        }
        self.out.push_str(&header.start.name.local);
    }

    fn attributes(&mut self, header: &Header, root: bool) {
        if root {
            let mut decls: Vec<NsDecl<'_>> = header
                .ns
                .iter()
                .flatten()
                .map(|(prefix, uri)| NsDecl { prefix, uri })
                .collect();
            decls.sort();
            for decl in decls {
                self.ns.set(decl.prefix, decl.uri);
                decl.render(&mut self.out);
            }
        }

        let mut attrs: Vec<&Attr> = header.start.attrs.iter().collect();
        attrs.sort_by(|a, b| render::attr_order(a, b));
        for attr in attrs {
            if !attr.is_namespace_decl() {
                render::render_attr(&mut self.out, attr);
                continue;
            }
            let decl = NsDecl::of(attr);
            if self.ns.get(decl.prefix) == Some(decl.uri) {
                continue;
            }
            assert!(
                !root,
                "namespace map of the root does not include {:?} declared on it",
                decl.prefix
            );
            self.ns.set(decl.prefix, decl.uri);
            decl.render(&mut self.out);
        }
    }
}
