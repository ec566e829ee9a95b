#![forbid(unsafe_code)]

//! Opened BDOC containers.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use bdoc_asice::{Archive, AsiceFile, BufferPool, Limits};
use bdoc_core::{Error, Result};
use bdoc_keys::Cert;
use chrono::{DateTime, Utc};

use crate::context::Opener;
use crate::verify;
use crate::xades::XadesSignatures;

/// Archive and member limit used by [`unverified_open`].
const UNVERIFIED_LIMIT: u64 = 10 * 1024 * 1024;

/// A verified signature.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Value of the `ds:Signature` `Id` attribute.
    pub id: String,
    /// Name of the signature file in the container.
    pub file: String,
    pub signer: Cert,
    /// Certificate that issued `signer`; the signer itself when it is a
    /// trusted root.
    pub issuer: Cert,
    /// Claimed signing time for BES, OCSP `producedAt` for TM and the
    /// timestamp generation time for TS.
    pub signing_time: DateTime<Utc>,
}

/// The data files of a container together with its verified signatures.
///
/// Data files are held in pooled buffers until the container is closed or
/// dropped.
#[derive(Debug)]
pub struct Container {
    signatures: Vec<Signature>,
    parsed: Vec<XadesSignatures>,
    files: BTreeMap<String, AsiceFile>,
    signature_count: usize,
}

impl Container {
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Contents of the data files by name.
    pub fn data(&self) -> BTreeMap<&str, &[u8]> {
        self.files
            .iter()
            .map(|(name, file)| (name.as_str(), &*file.data))
            .collect()
    }

    /// Data files with their manifest media types, in name order.
    pub fn files(&self) -> impl Iterator<Item = &AsiceFile> {
        self.files.values()
    }

    /// Number of signature files in the archive, including unread ones.
    pub fn signature_count(&self) -> usize {
        self.signature_count
    }

    /// Release all buffers. Calling it again has no effect.
    pub fn close(&mut self) {
        self.files.clear();
        self.parsed.clear();
        self.signatures.clear();
    }

    /// The decoded SignatureValue of signature `id`.
    pub fn signature_value(&self, id: &str) -> Result<Vec<u8>> {
        let xml = self.find(id)?;
        bdoc_crypto::decode_base64(&xml.signature.signature_value.value)
    }

    /// Canonical `ds:SignatureValue` element of signature `id`, the data
    /// a signature timestamp is taken over.
    pub fn timestamp_data(&self, id: &str) -> Result<Vec<u8>> {
        let xml = self.find(id)?;
        Ok(bdoc_c14n::canonicalize(&xml.signature.signature_value))
    }

    fn find(&self, id: &str) -> Result<&XadesSignatures> {
        self.parsed
            .iter()
            .find(|xml| xml.signature.id == id)
            .ok_or_else(|| Error::NoSuchSignature { id: id.to_owned() })
    }
}

pub(crate) fn open<R: Read>(opener: &Opener, reader: R, pool: &Arc<BufferPool>) -> Result<Container> {
    let mut archive = Archive::open(reader, opener.limits, true, pool)?;

    let names: Vec<String> = archive.signature_files().map(|f| f.name.clone()).collect();
    let mut parsed = Vec::with_capacity(names.len());
    for name in &names {
        let Some(file) = archive.files.remove(name) else {
            continue;
        };
        let xml: XadesSignatures = bdoc_xml::parse(&file.data).map_err(|e| Error::SignatureXml {
            file: name.clone(),
            source: Box::new(e),
        })?;
        file.data.release();
        parsed.push(xml);
    }

    let mut signatures = Vec::with_capacity(parsed.len());
    for (name, xml) in names.iter().zip(&parsed) {
        signatures.push(verify::verify(opener, name, xml, &archive.files)?);
    }

    log::info!(
        "opened container with {} data files and {} valid {} signatures",
        archive.files.len(),
        signatures.len(),
        opener.profile
    );
    Ok(Container {
        signatures,
        parsed,
        files: archive.files,
        signature_count: archive.signature_count,
    })
}

/// Open a container without reading or verifying its signatures.
///
/// Meant for trusted bootstrap data only. Archive and member sizes are
/// limited to 10 MiB.
pub fn unverified_open<R: Read>(reader: R) -> Result<Container> {
    let limits = Limits {
        archive: UNVERIFIED_LIMIT,
        file: UNVERIFIED_LIMIT,
    };
    let archive = Archive::open(reader, limits, false, &BufferPool::shared())
        .map_err(|e| Error::UnverifiedOpen(Box::new(e)))?;
    log::debug!(
        "opened unverified container with {} data files",
        archive.files.len()
    );
    Ok(Container {
        signatures: Vec::new(),
        parsed: Vec::new(),
        files: archive.files,
        signature_count: archive.signature_count,
    })
}
