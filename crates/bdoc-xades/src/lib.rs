#![forbid(unsafe_code)]

//! XAdES signature verification for BDOC containers.
//!
//! An [`Opener`] built from a validated [`Conf`] reads an ASiC-E archive,
//! parses every signature file against the BDOC subset of XAdES and
//! verifies each signature under the configured [`Profile`]. A container is
//! returned only when all of its signatures are valid.

pub mod container;
pub mod context;
pub mod freshness;
mod verify;
pub mod xades;

pub use container::{unverified_open, Container, Signature};
pub use context::{
    Conf, OcspConf, OcspConnect, OcspSettings, Opener, Profile, Services, TspConf, TspConnect,
    TspSettings,
};
pub use freshness::{check_nonce, OcspChecker, OcspStatus, TspChecker};
