#![forbid(unsafe_code)]

//! ASiC-E container reading.
//!
//! Validates the leading `mimetype` entry against both the local and the
//! central ZIP headers, decompresses members into pooled buffers under size
//! limits and checks the manifest against the data files.

pub mod archive;
pub mod manifest;
pub mod pool;

pub use archive::{is_signature_name, Archive, AsiceFile, Limits};
pub use pool::{BufferPool, PooledBuffer};
