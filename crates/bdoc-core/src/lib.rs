#![forbid(unsafe_code)]

//! Core types shared by the BDOC verification crates.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result, ServiceError, Stage};
