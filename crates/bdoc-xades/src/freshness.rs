#![forbid(unsafe_code)]

//! Freshness tokens: OCSP responses and signature timestamps.
//!
//! Parsing and verifying the tokens themselves is left to collaborators
//! implementing [`OcspChecker`] and [`TspChecker`]. This module only owns
//! the BDOC-specific binding between a time-mark OCSP response and the
//! signature it confirms: the response nonce is a DER
//! `SEQUENCE { AlgorithmIdentifier, OCTET STRING }` holding a digest of
//! the raw signature value.

use bdoc_core::{Error, Result, ServiceError};
use bdoc_keys::Cert;
use chrono::{DateTime, Utc};
use der::asn1::OctetString;
use der::{Decode, Reader, SliceReader};
use x509_cert::spki::AlgorithmIdentifierOwned;

/// Outcome of checking an OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspStatus {
    /// `producedAt` of the response.
    pub produced_at: DateTime<Utc>,
    /// Content of the nonce extension, if present.
    pub nonce: Option<Vec<u8>>,
    /// Whether the certificate status is `good`.
    pub good: bool,
    /// Revocation reason reported with a non-good status.
    pub revocation_reason: Option<String>,
}

/// Verifies OCSP responses embedded in TM and TS signatures.
pub trait OcspChecker: Send + Sync {
    /// Verify the DER `response` for `subject` issued by `issuer`.
    ///
    /// Implementations check the responder signature against their
    /// configured responders and, when `expected_nonce` is given, that the
    /// response carries exactly that nonce.
    fn check_full_response(
        &self,
        response: &[u8],
        subject: &Cert,
        issuer: &Cert,
        expected_nonce: Option<&[u8]>,
    ) -> std::result::Result<OcspStatus, ServiceError>;
}

/// Verifies RFC 3161 timestamp tokens embedded in TS signatures.
pub trait TspChecker: Send + Sync {
    /// Verify `token` over `data` and return its generation time.
    fn check(
        &self,
        token: &[u8],
        data: &[u8],
        expected_nonce: Option<&[u8]>,
    ) -> std::result::Result<DateTime<Utc>, ServiceError>;
}

/// Check that `nonce` holds a digest of `signature_value`.
pub fn check_nonce(nonce: &[u8], signature_value: &[u8]) -> Result<()> {
    let mut reader = SliceReader::new(nonce).map_err(|e| Error::NonceDecode(e.to_string()))?;
    let (algorithm, digest) = reader
        .sequence(|seq| {
            let algorithm = AlgorithmIdentifierOwned::decode(seq)?;
            let digest = OctetString::decode(seq)?;
            Ok((algorithm, digest))
        })
        .map_err(|e| Error::NonceDecode(e.to_string()))?;

    let rest = reader.remaining_len();
    if !rest.is_zero() {
        return Err(Error::NonceTrailingData {
            len: u32::from(rest) as usize,
        });
    }

    let oid = algorithm.oid.to_string();
    let calculated = bdoc_crypto::digest::digest_by_oid(&oid, signature_value)?;
    if calculated != digest.as_bytes() {
        log::debug!("nonce digest ({oid}) does not match the signature value");
        return Err(Error::NonceMismatch);
    }
    Ok(())
}
