#![forbid(unsafe_code)]

//! X.509 certificates and chain validation.
//!
//! Builds a chain from a signer certificate to a trusted root through an
//! optional pool of intermediates. Every certificate on the chain must be
//! valid at the instant the caller supplies, which for signatures is the
//! claimed signing time rather than the current time.

use bdoc_core::{Error, Result};
use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, KeyUsages};
use x509_cert::name::Name;
use x509_cert::Certificate;

const MAX_CHAIN_DEPTH: usize = 10;

const SHA256_RSA: &str = "1.2.840.113549.1.1.11";
const SHA384_RSA: &str = "1.2.840.113549.1.1.12";
const SHA512_RSA: &str = "1.2.840.113549.1.1.13";
const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
const ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";
const ECDSA_SHA512: &str = "1.2.840.10045.4.3.4";
const ID_CE_KEY_USAGE: &str = "2.5.29.15";
const ID_CE_BASIC_CONSTRAINTS: &str = "2.5.29.19";

/// A parsed certificate together with the exact DER it was parsed from.
#[derive(Debug, Clone)]
pub struct Cert {
    raw: Vec<u8>,
    cert: Certificate,
}

impl PartialEq for Cert {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Cert {}

impl Cert {
    /// Parse a DER-encoded certificate.
    pub fn from_der(raw: Vec<u8>) -> Result<Self> {
        let cert = Certificate::from_der(&raw)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        Ok(Self { raw, cert })
    }

    /// The DER bytes the certificate was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn subject(&self) -> &Name {
        &self.cert.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.cert.tbs_certificate.issuer
    }

    /// The serial number in decimal.
    pub fn serial_decimal(&self) -> String {
        decimal_from_be(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn spki_der(&self) -> Result<Vec<u8>> {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))
    }

    /// Raw value of the extension with `oid`, if present.
    fn extension(&self, oid: &str) -> Option<&[u8]> {
        self.cert
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id.to_string() == oid)
            .map(|ext| ext.extn_value.as_bytes())
    }

    fn key_usage(&self) -> Result<Option<KeyUsage>> {
        self.extension(ID_CE_KEY_USAGE)
            .map(|value| {
                KeyUsage::from_der(value)
                    .map_err(|e| Error::Certificate(format!("invalid key usage extension: {e}")))
            })
            .transpose()
    }

    /// Require the content-commitment (non-repudiation) key usage bit.
    pub fn check_non_repudiation(&self) -> Result<()> {
        match self.key_usage()? {
            Some(usage) if usage.0.contains(KeyUsages::NonRepudiation) => Ok(()),
            _ => Err(Error::NotNonRepudiation),
        }
    }

    /// Check that the certificate may issue a chain with `below` CA
    /// certificates between it and the leaf.
    ///
    /// Requires the cA flag of BasicConstraints, keyCertSign when a key
    /// usage extension is present and a pathLenConstraint of at least
    /// `below`.
    pub fn check_issuer(&self, below: usize) -> Result<()> {
        let not_ca = |why: String| Error::Certificate(format!("{} {why}", self.subject()));

        let constraints = match self.extension(ID_CE_BASIC_CONSTRAINTS) {
            Some(value) => BasicConstraints::from_der(value).map_err(|e| {
                Error::Certificate(format!("invalid basic constraints extension: {e}"))
            })?,
            None => return Err(not_ca("has no basic constraints".into())),
        };
        if !constraints.ca {
            return Err(not_ca("is not a CA".into()));
        }
        if let Some(limit) = constraints.path_len_constraint {
            if below > usize::from(limit) {
                return Err(not_ca(format!(
                    "allows {limit} intermediate certificates, chain has {below}"
                )));
            }
        }
        if let Some(usage) = self.key_usage()? {
            if !usage.0.contains(KeyUsages::KeyCertSign) {
                return Err(not_ca("is not allowed to sign certificates".into()));
            }
        }
        Ok(())
    }

    /// Check that the certificate is within its validity period at `at`.
    pub fn check_validity(&self, at: &der::DateTime) -> Result<()> {
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_date_time();
        let not_after = validity.not_after.to_date_time();
        if *at < not_before {
            return Err(Error::Certificate(format!(
                "certificate {} is not yet valid (notBefore: {not_before})",
                self.subject()
            )));
        }
        if *at > not_after {
            return Err(Error::Certificate(format!(
                "certificate {} has expired (notAfter: {not_after})",
                self.subject()
            )));
        }
        Ok(())
    }

    fn is_issued_by(&self, issuer: &Cert) -> Result<bool> {
        Ok(name_der(self.issuer())? == name_der(issuer.subject())?)
    }
}

fn name_der(name: &Name) -> Result<Vec<u8>> {
    name.to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode name: {e}")))
}

/// Convert a big-endian unsigned integer to its decimal representation.
pub fn decimal_from_be(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = Vec::new();
    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
    while !number.is_empty() {
        let mut remainder = 0u32;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let acc = (remainder << 8) | u32::from(byte);
            let q = (acc / 10) as u8;
            remainder = acc % 10;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q);
            }
        }
        digits.push(b'0' + remainder as u8);
        number = quotient;
    }
    if digits.is_empty() {
        return "0".into();
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

fn der_time(at: DateTime<Utc>) -> Result<der::DateTime> {
    let secs = u64::try_from(at.timestamp())
        .map_err(|_| Error::Certificate(format!("verification time {at} precedes the epoch")))?;
    der::DateTime::from_unix_duration(std::time::Duration::from_secs(secs))
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))
}

/// Build and verify a chain from `leaf` to one of `roots` at `at`.
///
/// Returns the chain starting with the leaf and ending with the trusted
/// root. A leaf that is itself a root yields a chain of length one.
pub fn verify_chain(
    leaf: &Cert,
    roots: &[Cert],
    intermediates: &[Cert],
    at: DateTime<Utc>,
) -> Result<Vec<Cert>> {
    if roots.is_empty() {
        return Err(Error::Certificate("no trusted certificates available".into()));
    }
    let verif_time = der_time(at)?;
    leaf.check_validity(&verif_time)?;

    if roots.contains(leaf) {
        log::debug!("certificate {} is a trusted root", leaf.subject());
        return Ok(vec![leaf.clone()]);
    }

    let mut chain = vec![leaf.clone()];
    for _ in 0..MAX_CHAIN_DEPTH {
        let current = &chain[chain.len() - 1];

        if let Some(root) = find_issuer(current, roots, &chain, &verif_time)? {
            chain.push(root);
            log::debug!(
                "built chain of {} certificates for {}",
                chain.len(),
                leaf.subject()
            );
            return Ok(chain);
        }

        match find_issuer(current, intermediates, &chain, &verif_time)? {
            Some(intermediate) => chain.push(intermediate),
            None => {
                return Err(Error::Certificate(format!(
                    "cannot find issuer {} (incomplete chain)",
                    current.issuer()
                )))
            }
        }
    }

    Err(Error::Certificate("certificate chain too long".into()))
}

/// Find a certificate in `pool` that issued `cert`, skipping anything
/// already on the chain.
fn find_issuer(
    cert: &Cert,
    pool: &[Cert],
    chain: &[Cert],
    at: &der::DateTime,
) -> Result<Option<Cert>> {
    // CA certificates already on the chain below the candidate.
    let below = chain.len() - 1;
    for candidate in pool {
        if chain.contains(candidate) || !cert.is_issued_by(candidate)? {
            continue;
        }
        if let Err(e) = candidate
            .check_issuer(below)
            .and_then(|()| candidate.check_validity(at))
            .and_then(|()| verify_cert_signature(cert, candidate))
        {
            log::debug!("skipping issuer candidate: {e}");
            continue;
        }
        return Ok(Some(candidate.clone()));
    }
    Ok(None)
}

/// Verify a certificate's signature using the issuer's public key.
fn verify_cert_signature(cert: &Cert, issuer: &Cert) -> Result<()> {
    let tbs_der = cert
        .cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig_bytes = cert
        .cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
    let spki_der = issuer.spki_der()?;

    let oid = cert.cert.signature_algorithm.oid.to_string();
    match oid.as_str() {
        SHA256_RSA => verify_rsa_signature::<sha2::Sha256>(&spki_der, &tbs_der, sig_bytes),
        SHA384_RSA => verify_rsa_signature::<sha2::Sha384>(&spki_der, &tbs_der, sig_bytes),
        SHA512_RSA => verify_rsa_signature::<sha2::Sha512>(&spki_der, &tbs_der, sig_bytes),
        ECDSA_SHA256 => verify_ecdsa_signature::<sha2::Sha256>(&spki_der, &tbs_der, sig_bytes),
        ECDSA_SHA384 => verify_ecdsa_signature::<sha2::Sha384>(&spki_der, &tbs_der, sig_bytes),
        ECDSA_SHA512 => verify_ecdsa_signature::<sha2::Sha512>(&spki_der, &tbs_der, sig_bytes),
        _ => Err(Error::Certificate(format!(
            "unsupported certificate signature algorithm: {oid}"
        ))),
    }
}

fn verify_rsa_signature<D>(issuer_spki_der: &[u8], tbs_der: &[u8], signature: &[u8]) -> Result<()>
where
    D: digest::Digest + digest::const_oid::AssociatedOid,
    rsa::pkcs1v15::VerifyingKey<D>: signature::Verifier<rsa::pkcs1v15::Signature>,
{
    use signature::Verifier;
    use spki::DecodePublicKey;

    let public_key = rsa::RsaPublicKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}")))?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(public_key);
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| Error::Certificate(format!("invalid RSA signature: {e}")))?;
    verifying_key
        .verify(tbs_der, &sig)
        .map_err(|e| Error::Certificate(format!("certificate signature verification failed: {e}")))
}

/// Verify a DER-encoded ECDSA signature, picking the curve from the key.
fn verify_ecdsa_signature<D: digest::Digest>(
    issuer_spki_der: &[u8],
    tbs_der: &[u8],
    signature: &[u8],
) -> Result<()> {
    use signature::hazmat::PrehashVerifier;
    use spki::DecodePublicKey;

    let prehash = D::digest(tbs_der);
    let failed = |e: signature::Error| {
        Error::Certificate(format!("certificate signature verification failed: {e}"))
    };

    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der) {
        let sig = p256::ecdsa::Signature::from_der(signature).map_err(failed)?;
        return vk.verify_prehash(&prehash, &sig).map_err(failed);
    }
    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der) {
        let sig = p384::ecdsa::Signature::from_der(signature).map_err(failed)?;
        return vk.verify_prehash(&prehash, &sig).map_err(failed);
    }
    Err(Error::Certificate(
        "issuer key is not a supported EC public key".into(),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use rcgen::{
        BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
        SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_RSA_SHA256, PKCS_RSA_SHA384,
        PKCS_RSA_SHA512,
    };

    fn params(cn: &str, usages: Vec<KeyUsagePurpose>) -> CertificateParams {
        let mut params = CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(DnType::CountryName, "EE");
        params.distinguished_name.push(DnType::CommonName, cn);
        params.serial_number = Some(SerialNumber::from(vec![1, 2]));
        params.key_usages = usages;
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(2030, 1, 1);
        params
    }

    /// A self-signed P-256 signer certificate and its PKCS#8 key.
    pub(crate) fn self_signed(cn: &str) -> (Vec<u8>, Vec<u8>) {
        let mut params = params(
            cn,
            vec![
                KeyUsagePurpose::ContentCommitment,
                KeyUsagePurpose::DigitalSignature,
            ],
        );
        params.is_ca = IsCa::NoCa;
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.der().as_ref().to_vec(), key_pair.serialize_der())
    }

    struct Ca {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    /// PKCS#8 RSA-2048 test key.
    const RSA_KEY: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../testdata/rsa-2048.pem"
    ));

    fn authority(
        cn: &str,
        parent: Option<&Ca>,
        is_ca: IsCa,
        usages: Vec<KeyUsagePurpose>,
        key: KeyPair,
    ) -> Ca {
        let mut params = params(cn, usages);
        params.is_ca = is_ca;
        let cert = match parent {
            Some(p) => params.signed_by(&key, &p.cert, &p.key).unwrap(),
            None => params.self_signed(&key).unwrap(),
        };
        Ca { cert, key }
    }

    fn p256_key() -> KeyPair {
        KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap()
    }

    fn ca(cn: &str, parent: Option<&Ca>) -> Ca {
        authority(
            cn,
            parent,
            IsCa::Ca(BasicConstraints::Unconstrained),
            vec![KeyUsagePurpose::KeyCertSign],
            p256_key(),
        )
    }

    fn leaf(issuer: &Ca, usages: Vec<KeyUsagePurpose>) -> Cert {
        let params = params("Leaf", usages);
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
        Cert::from_der(cert.der().to_vec()).unwrap()
    }

    fn cert_of(ca: &Ca) -> Cert {
        Cert::from_der(ca.cert.der().to_vec()).unwrap()
    }

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn self_signed_root() {
        let (der, _) = self_signed("Test Signer");
        let cert = Cert::from_der(der).unwrap();
        let chain = verify_chain(&cert, &[cert.clone()], &[], at(2025)).unwrap();
        assert_eq!(chain, vec![cert]);
    }

    #[test]
    fn self_signed_untrusted() {
        let (a, _) = self_signed("Signer");
        let (b, _) = self_signed("Other");
        let a = Cert::from_der(a).unwrap();
        let b = Cert::from_der(b).unwrap();
        assert!(verify_chain(&a, &[b], &[], at(2025)).is_err());
    }

    #[test]
    fn chain_through_intermediate() {
        let root = ca("Root CA", None);
        let inter = ca("Intermediate CA", Some(&root));
        let signer = leaf(&inter, vec![KeyUsagePurpose::ContentCommitment]);

        let chain = verify_chain(&signer, &[cert_of(&root)], &[cert_of(&inter)], at(2025)).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1], cert_of(&inter));
        assert_eq!(chain[2], cert_of(&root));

        let err = verify_chain(&signer, &[cert_of(&root)], &[], at(2025)).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("incomplete chain")));
    }

    #[test]
    fn direct_issuer() {
        let root = ca("Root CA", None);
        let signer = leaf(&root, vec![KeyUsagePurpose::ContentCommitment]);
        let chain = verify_chain(&signer, &[cert_of(&root)], &[], at(2025)).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1], cert_of(&root));
    }

    #[test]
    fn issuer_must_be_ca() {
        let root = ca("Root CA", None);
        let holder = authority(
            "End Entity",
            Some(&root),
            IsCa::ExplicitNoCa,
            vec![KeyUsagePurpose::ContentCommitment],
            p256_key(),
        );
        let minted = leaf(&holder, vec![KeyUsagePurpose::ContentCommitment]);
        let err = verify_chain(&minted, &[cert_of(&root)], &[cert_of(&holder)], at(2025)).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("incomplete chain")));

        let err = cert_of(&holder).check_issuer(0).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("is not a CA")));

        let (der, _) = self_signed("No Constraints");
        let err = Cert::from_der(der).unwrap().check_issuer(0).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("no basic constraints")));
    }

    #[test]
    fn issuer_must_sign_certificates() {
        let root = ca("Root CA", None);
        let inter = authority(
            "Intermediate CA",
            Some(&root),
            IsCa::Ca(BasicConstraints::Unconstrained),
            vec![KeyUsagePurpose::DigitalSignature],
            p256_key(),
        );
        let signer = leaf(&inter, vec![KeyUsagePurpose::ContentCommitment]);
        assert!(verify_chain(&signer, &[cert_of(&root)], &[cert_of(&inter)], at(2025)).is_err());
    }

    #[test]
    fn path_length_constraint() {
        for (limit, ok) in [(0, false), (1, true)] {
            let root = authority(
                "Root CA",
                None,
                IsCa::Ca(BasicConstraints::Constrained(limit)),
                vec![KeyUsagePurpose::KeyCertSign],
                p256_key(),
            );
            let inter = ca("Intermediate CA", Some(&root));
            let signer = leaf(&inter, vec![KeyUsagePurpose::ContentCommitment]);
            let result = verify_chain(&signer, &[cert_of(&root)], &[cert_of(&inter)], at(2025));
            assert_eq!(result.is_ok(), ok, "pathLenConstraint {limit}");

            // A leaf issued directly by the root needs no intermediates.
            let direct = leaf(&root, vec![KeyUsagePurpose::ContentCommitment]);
            verify_chain(&direct, &[cert_of(&root)], &[], at(2025)).unwrap();
        }
    }

    #[test]
    fn expired_issuer_candidate_is_skipped() {
        let root = ca("Root CA", None);
        let key = p256_key();

        let mut expired = params("Intermediate CA", vec![KeyUsagePurpose::KeyCertSign]);
        expired.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        expired.not_after = rcgen::date_time_ymd(2022, 1, 1);
        let expired = expired.signed_by(&key, &root.cert, &root.key).unwrap();

        let mut current = params("Intermediate CA", vec![KeyUsagePurpose::KeyCertSign]);
        current.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let current = current.signed_by(&key, &root.cert, &root.key).unwrap();

        let signer = params("Leaf", vec![KeyUsagePurpose::ContentCommitment])
            .signed_by(&p256_key(), &current, &key)
            .unwrap();
        let signer = Cert::from_der(signer.der().to_vec()).unwrap();
        let expired = Cert::from_der(expired.der().to_vec()).unwrap();
        let current = Cert::from_der(current.der().to_vec()).unwrap();

        let chain = verify_chain(
            &signer,
            &[cert_of(&root)],
            &[expired.clone(), current.clone()],
            at(2025),
        )
        .unwrap();
        assert_eq!(chain[1], current);

        assert!(verify_chain(&signer, &[cert_of(&root)], &[expired], at(2025)).is_err());
    }

    fn rsa_key(alg: &'static SignatureAlgorithm) -> KeyPair {
        KeyPair::from_pem_and_sign_algo(RSA_KEY, alg).unwrap()
    }

    #[test]
    fn rsa_issuer() {
        for alg in [&PKCS_RSA_SHA256, &PKCS_RSA_SHA384, &PKCS_RSA_SHA512] {
            let root = authority(
                "RSA Root CA",
                None,
                IsCa::Ca(BasicConstraints::Unconstrained),
                vec![KeyUsagePurpose::KeyCertSign],
                rsa_key(alg),
            );
            let signer = leaf(&root, vec![KeyUsagePurpose::ContentCommitment]);
            let chain = verify_chain(&signer, &[cert_of(&root)], &[], at(2025)).unwrap();
            assert_eq!(chain.len(), 2);

            // Flip a bit in the signature, which is last in the DER.
            let mut der = signer.raw().to_vec();
            let last = der.len() - 1;
            der[last] ^= 1;
            let forged = Cert::from_der(der).unwrap();
            assert!(verify_chain(&forged, &[cert_of(&root)], &[], at(2025)).is_err());
        }
    }

    #[test]
    fn validity_at_instant() {
        let (der, _) = self_signed("Test Signer");
        let cert = Cert::from_der(der).unwrap();
        let roots = [cert.clone()];
        let err = verify_chain(&cert, &roots, &[], at(2019)).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("not yet valid")));
        let err = verify_chain(&cert, &roots, &[], at(2031)).unwrap_err();
        assert!(matches!(err, Error::Certificate(msg) if msg.contains("expired")));
    }

    #[test]
    fn non_repudiation() {
        let root = ca("Root CA", None);
        leaf(&root, vec![KeyUsagePurpose::ContentCommitment])
            .check_non_repudiation()
            .unwrap();
        let err = leaf(&root, vec![KeyUsagePurpose::DigitalSignature])
            .check_non_repudiation()
            .unwrap_err();
        assert!(matches!(err, Error::NotNonRepudiation));
        let err = leaf(&root, vec![]).check_non_repudiation().unwrap_err();
        assert!(matches!(err, Error::NotNonRepudiation));
    }

    #[test]
    fn serial_in_decimal() {
        let (der, _) = self_signed("Test Signer");
        assert_eq!(Cert::from_der(der).unwrap().serial_decimal(), "258");
        assert_eq!(decimal_from_be(&[]), "0");
        assert_eq!(decimal_from_be(&[0, 0]), "0");
        assert_eq!(decimal_from_be(&[0x00, 0xff]), "255");
        assert_eq!(
            decimal_from_be(&[1, 0, 0, 0, 0, 0, 0, 0, 0]),
            "18446744073709551616"
        );
    }
}
