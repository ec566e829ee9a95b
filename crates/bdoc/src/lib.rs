#![forbid(unsafe_code)]

//! BDOC container verification.
//!
//! Facade over the workspace crates. Most callers only need
//! [`Opener`], [`Conf`] and [`Container`].

pub use bdoc_asice as asice;
pub use bdoc_c14n as c14n;
pub use bdoc_core as core;
pub use bdoc_crypto as crypto;
pub use bdoc_keys as keys;
pub use bdoc_xades as xades;
pub use bdoc_xml as xml;

pub use bdoc_core::{Error, Result, Stage};
pub use bdoc_xades::{
    unverified_open, Conf, Container, OcspChecker, OcspSettings, Opener, Profile, Services,
    Signature, TspChecker, TspSettings,
};
