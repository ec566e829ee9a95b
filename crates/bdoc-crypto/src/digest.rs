#![forbid(unsafe_code)]

//! Digest algorithms.
//!
//! XML signatures name digests by URI; the OCSP nonce names them by OID.
//! The two tables overlap but are not the same: SHA-1 and SHA-224 are only
//! accepted inside the nonce.

use bdoc_core::{algorithm, Error, Result};
use digest::Digest;

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Human-readable name, used in log output.
    fn name(&self) -> &'static str;
}

/// Create a digest algorithm from its XML URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>> {
    match uri {
        algorithm::SHA256 => Ok(Box::new(Sha256Digest::new())),
        algorithm::SHA384 => Ok(Box::new(Sha384Digest::new())),
        algorithm::SHA512 => Ok(Box::new(Sha512Digest::new())),
        _ => Err(Error::UnsupportedDigest {
            algorithm: uri.to_owned(),
        }),
    }
}

/// Create a digest algorithm from its dotted OID.
pub fn from_oid(oid: &str) -> Result<Box<dyn DigestAlgorithm>> {
    match oid {
        algorithm::OID_SHA1 => Ok(Box::new(Sha1Digest::new())),
        algorithm::OID_SHA224 => Ok(Box::new(Sha224Digest::new())),
        algorithm::OID_SHA256 => Ok(Box::new(Sha256Digest::new())),
        algorithm::OID_SHA384 => Ok(Box::new(Sha384Digest::new())),
        algorithm::OID_SHA512 => Ok(Box::new(Sha512Digest::new())),
        _ => Err(Error::UnsupportedNonceDigest {
            oid: oid.to_owned(),
        }),
    }
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// Compute a digest named by OID in one shot.
pub fn digest_by_oid(oid: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = from_oid(oid)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// Digest `data` under `uri` and compare with the base64 `expected` value.
pub fn check(uri: &str, data: &[u8], expected: &str) -> Result<()> {
    let calculated = digest(uri, data)?;
    let wanted = crate::decode_base64(expected)?;
    if calculated != wanted {
        return Err(Error::DigestMismatch {
            expected: expected.trim().to_owned(),
            calculated: crate::encode_base64(&calculated),
        });
    }
    Ok(())
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $label:literal) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn name(&self) -> &'static str {
                $label
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, "SHA-1");
impl_digest!(Sha224Digest, sha2::Sha224, "SHA-224");
impl_digest!(Sha256Digest, sha2::Sha256, "SHA-256");
impl_digest!(Sha384Digest, sha2::Sha384, "SHA-384");
impl_digest!(Sha512Digest, sha2::Sha512, "SHA-512");

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_sha256() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        assert_eq!(
            hex(&result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_lengths() {
        assert_eq!(digest(algorithm::SHA384, b"hello").unwrap().len(), 48);
        assert_eq!(digest(algorithm::SHA512, b"hello").unwrap().len(), 64);
        assert_eq!(digest_by_oid(algorithm::OID_SHA1, b"hello").unwrap().len(), 20);
        assert_eq!(digest_by_oid(algorithm::OID_SHA224, b"hello").unwrap().len(), 28);
    }

    #[test]
    fn sha1_is_nonce_only() {
        let err = digest("http://www.w3.org/2000/09/xmldsig#sha1", b"x").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDigest { .. }));
        let err = digest_by_oid("1.2.3", b"x").unwrap_err();
        assert!(matches!(err, Error::UnsupportedNonceDigest { .. }));
    }

    #[test]
    fn check_compares_base64() {
        // SHA-256("hello")
        let expected = "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=";
        check(algorithm::SHA256, b"hello", expected).unwrap();
        check(algorithm::SHA256, b"hello", &format!(" {expected}\n")).unwrap();
        let err = check(algorithm::SHA256, b"hellO", expected).unwrap_err();
        assert!(matches!(err, Error::DigestMismatch { .. }));
    }
}
