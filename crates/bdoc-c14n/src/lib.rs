#![forbid(unsafe_code)]

//! Canonical XML 1.1 for BDOC signatures.
//!
//! BDOC only allows `http://www.w3.org/2006/12/xml-c14n11` without comments,
//! applied to whole elements of a parsed signature (SignedInfo,
//! SignedProperties and SignatureValue). Those elements are declared as
//! canonicalization roots so that the parser keeps the namespace bindings
//! inherited from their ancestors.

pub mod escape;
mod mapstack;
pub mod render;
mod writer;

use bdoc_core::{algorithm, Error, Result};
use bdoc_xml::Node;

/// Canonicalize `node` with Canonical XML 1.1, omitting comments.
///
/// Panics if `node` is not declared as a canonicalization root or does not
/// match its own schema; both are programming errors.
pub fn canonicalize(node: &dyn Node) -> Vec<u8> {
    let mut writer = writer::Writer::default();
    writer.write(node, true);
    writer.into_bytes()
}

/// Canonicalize `node` with the algorithm named by `uri`.
pub fn canonicalize_with(uri: &str, node: &dyn Node) -> Result<Vec<u8>> {
    if uri != algorithm::C14N11 {
        return Err(Error::UnsupportedCanonicalization {
            algorithm: uri.to_owned(),
        });
    }
    Ok(canonicalize(node))
}
