#![forbid(unsafe_code)]

//! Certificate handling for BDOC verification.
//!
//! Loads trusted root and intermediate pools from PEM and signer
//! certificates from base64 DER, builds chains at a given instant, and
//! parses the RFC 4514 issuer names found in XAdES signed properties.

pub mod loader;
pub mod rdn;
pub mod x509;

pub use rdn::DistinguishedName;
pub use x509::{verify_chain, Cert};
