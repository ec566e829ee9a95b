#![forbid(unsafe_code)]

//! Signature-value verification (RSA PKCS#1 v1.5 and ECDSA).

use bdoc_core::{algorithm, Error, Result};
use der::asn1::ObjectIdentifier;
use der::Decode;
use spki::SubjectPublicKeyInfoRef;

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn digest_uri(self) -> &'static str {
        match self {
            HashType::Sha256 => algorithm::SHA256,
            HashType::Sha384 => algorithm::SHA384,
            HashType::Sha512 => algorithm::SHA512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

/// An accepted `SignatureMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMethod {
    pub uri: &'static str,
    pub key: KeyType,
    pub hash: HashType,
}

impl SignatureMethod {
    /// Look up a signature method by URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let (uri, key, hash) = match uri {
            algorithm::RSA_SHA256 => (algorithm::RSA_SHA256, KeyType::Rsa, HashType::Sha256),
            algorithm::RSA_SHA384 => (algorithm::RSA_SHA384, KeyType::Rsa, HashType::Sha384),
            algorithm::RSA_SHA512 => (algorithm::RSA_SHA512, KeyType::Rsa, HashType::Sha512),
            algorithm::ECDSA_SHA256 => (algorithm::ECDSA_SHA256, KeyType::Ecdsa, HashType::Sha256),
            algorithm::ECDSA_SHA384 => (algorithm::ECDSA_SHA384, KeyType::Ecdsa, HashType::Sha384),
            algorithm::ECDSA_SHA512 => (algorithm::ECDSA_SHA512, KeyType::Ecdsa, HashType::Sha512),
            _ => {
                return Err(Error::UnsupportedSignatureMethod {
                    algorithm: uri.to_owned(),
                })
            }
        };
        Ok(Self { uri, key, hash })
    }

    /// Verify `signature` over `data` with the DER-encoded
    /// SubjectPublicKeyInfo of the signer.
    pub fn verify(&self, spki_der: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
        let spki = SubjectPublicKeyInfoRef::from_der(spki_der)
            .map_err(|e| Error::Key(format!("invalid SubjectPublicKeyInfo: {e}")))?;
        match self.key {
            KeyType::Rsa => {
                if spki.algorithm.oid != OID_RSA_ENCRYPTION {
                    return Err(Error::Key(format!(
                        "{} requires an RSA key, got {}",
                        self.uri, spki.algorithm.oid
                    )));
                }
                self.verify_rsa(spki_der, data, signature)
            }
            KeyType::Ecdsa => {
                if spki.algorithm.oid != OID_EC_PUBLIC_KEY {
                    return Err(Error::Key(format!(
                        "{} requires an EC key, got {}",
                        self.uri, spki.algorithm.oid
                    )));
                }
                let curve = spki
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| Error::Key(format!("EC key without named curve: {e}")))?;
                let prehash = crate::digest::digest(self.hash.digest_uri(), data)?;
                if curve == OID_P256 {
                    verify_p256(spki_der, &prehash, signature)
                } else if curve == OID_P384 {
                    verify_p384(spki_der, &prehash, signature)
                } else {
                    Err(Error::Key(format!("unsupported EC curve {curve}")))
                }
            }
        }
    }

    fn verify_rsa(&self, spki_der: &[u8], data: &[u8], sig_bytes: &[u8]) -> Result<()> {
        use rsa::pkcs8::DecodePublicKey;
        use signature::Verifier;

        let public_key = rsa::RsaPublicKey::from_public_key_der(spki_der)
            .map_err(|e| Error::Key(format!("invalid RSA public key: {e}")))?;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                vk.verify(data, &sig)
            }};
        }
        let verified = match self.hash {
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        };
        verified.map_err(|e| Error::SignatureInvalid(format!("{}: {e}", self.uri)))
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

fn verify_p256(spki_der: &[u8], prehash: &[u8], rs: &[u8]) -> Result<()> {
    use p256::pkcs8::DecodePublicKey;
    use signature::hazmat::PrehashVerifier;

    let vk = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Key(format!("invalid P-256 public key: {e}")))?;
    let sig = xmldsig_to_p256(rs)?;
    vk.verify_prehash(prehash, &sig)
        .map_err(|e| Error::SignatureInvalid(format!("ECDSA P-256: {e}")))
}

fn verify_p384(spki_der: &[u8], prehash: &[u8], rs: &[u8]) -> Result<()> {
    use p384::pkcs8::DecodePublicKey;
    use signature::hazmat::PrehashVerifier;

    let vk = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Key(format!("invalid P-384 public key: {e}")))?;
    let sig = xmldsig_to_p384(rs)?;
    vk.verify_prehash(prehash, &sig)
        .map_err(|e| Error::SignatureInvalid(format!("ECDSA P-384: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!(
            "P-384 signature must be 96 bytes, got {}",
            rs.len()
        )));
    }
    let r = p384::FieldBytes::from_slice(&rs[..48]);
    let s = p384::FieldBytes::from_slice(&rs[48..]);
    p384::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}
