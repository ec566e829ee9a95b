#![forbid(unsafe_code)]

//! Cryptographic primitives for BDOC signature verification.
//!
//! Digests named by XML URI or OID, signature-value verification for the
//! RSA and ECDSA methods allowed in BDOC, and the base64 handling shared by
//! every binary value embedded in signature XML.

pub mod digest;
pub mod sign;

use base64::Engine;
use bdoc_core::{Error, Result};

pub use digest::DigestAlgorithm;
pub use sign::SignatureMethod;

/// Decode a base64 value from XML, ignoring embedded whitespace.
pub fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    let clean: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(e.to_string()))
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
