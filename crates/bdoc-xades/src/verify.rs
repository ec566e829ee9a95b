#![forbid(unsafe_code)]

//! XAdES signature verification.
//!
//! Processing order for one signature:
//! 1. Algorithm gate: c14n11 and a known signature method
//! 2. References: SignedProperties and every data file
//! 3. Signer certificate: key usage and chain at the claimed signing time
//! 4. SignatureValue over canonical SignedInfo
//! 5. Signed properties: target, signing certificate binding and policy
//! 6. Profile freshness: OCSP for TM and TS, plus a timestamp for TS
//!
//! The first failure is returned, wrapped with the stage it occurred in.

use std::collections::{BTreeMap, HashSet};

use bdoc_asice::AsiceFile;
use bdoc_core::{algorithm, Error, Result, Stage};
use bdoc_crypto::{digest, SignatureMethod};
use bdoc_keys::{loader, rdn, verify_chain, Cert};
use chrono::{DateTime, Utc};

use crate::container::Signature;
use crate::context::{Opener, Profile};
use crate::freshness;
use crate::xades::{self, Reference, SignedProperties, XadesSignatures};

/// Policies accepted for TM signatures, with the SHA-256 digest of each
/// policy document.
pub(crate) const POLICIES: &[(&str, &str)] = &[
    (
        "urn:oid:1.3.6.1.4.1.10015.1000.3.2.1",
        "3Tl1oILSvOAWomdI9VeWV6IA/32eSXRUri9kPEz1IVs=",
    ),
    (
        "urn:oid:1.3.6.1.4.1.10015.1000.3.2.3",
        "ep8Ng0NXo+hG58oWow1XVPcs191tlphvqYFU13tkb6Y=",
    ),
];

/// Verify the signature in `file` against the data files in `files`.
pub(crate) fn verify(
    opener: &Opener,
    file: &str,
    xml: &XadesSignatures,
    files: &BTreeMap<String, AsiceFile>,
) -> Result<Signature> {
    let sig = &xml.signature;
    let id = sig.id.as_str();
    let fail = |stage: Stage| {
        move |e: Error| {
            log::warn!("signature {id:?} in {file} rejected at {stage}: {e}");
            e.at_stage(file, id, stage)
        }
    };

    let signer = loader::load_base64_der(&sig.key_info.x509_data.x509_certificate.value).map_err(
        |e| Error::SignerCertificateParse {
            file: file.to_owned(),
            id: id.to_owned(),
            source: Box::new(e),
        },
    )?;
    log::debug!(
        "verifying signature {id:?} in {file} by {} (serial {})",
        signer.subject(),
        signer.serial_decimal()
    );

    // 1. Algorithms
    let method = check_algorithms(xml).map_err(fail(Stage::Algorithm))?;

    // 2. References
    check_references(xml, files).map_err(fail(Stage::References))?;
    log::debug!("references of {id:?} match {} data files", files.len());

    // 3. Signer certificate
    let (claimed_time, issuer) = check_key_info(opener, xml, &signer).map_err(fail(Stage::Certificate))?;

    // 4. SignatureValue
    let signature_value = check_signature_value(xml, &signer, &method)
        .map_err(fail(Stage::SignatureValue))?;

    // 5. Signed properties
    check_signed_properties(opener.profile, xml, &signer).map_err(fail(Stage::SignedProperties))?;

    // 6. Freshness
    let signing_time = match opener.profile {
        Profile::Bes => claimed_time,
        Profile::Tm => check_ocsp(opener, xml, &signer, &issuer, Some(&signature_value))
            .map_err(fail(Stage::Ocsp))?,
        Profile::Ts => {
            check_ocsp(opener, xml, &signer, &issuer, None).map_err(fail(Stage::Ocsp))?;
            check_timestamp(opener, xml).map_err(fail(Stage::Timestamp))?
        }
    };

    log::debug!("signature {id:?} in {file} is valid {} ({signing_time})", opener.profile);
    Ok(Signature {
        id: id.to_owned(),
        file: file.to_owned(),
        signer,
        issuer,
        signing_time,
    })
}

fn check_algorithms(xml: &XadesSignatures) -> Result<SignatureMethod> {
    let signed_info = &xml.signature.signed_info;
    let c14n = signed_info.canonicalization_method.algorithm.as_str();
    if c14n != algorithm::C14N11 {
        return Err(Error::UnsupportedCanonicalization {
            algorithm: c14n.to_owned(),
        });
    }
    SignatureMethod::from_uri(&signed_info.signature_method.algorithm)
}

// ── References ───────────────────────────────────────────────────────

fn check_references(xml: &XadesSignatures, files: &BTreeMap<String, AsiceFile>) -> Result<()> {
    let references = &xml.signature.signed_info.references;
    let props = xml.signed_properties();

    check_signed_properties_reference(references, props)?;

    let formats = &props.signed_data_object_properties.data_object_formats;
    let mut ids = HashSet::new();
    for file in files.values() {
        let name = file.name.as_str();
        let reference = find_reference(references, name)?;
        if !reference.ty.is_empty() {
            return Err(Error::FileReferenceType {
                uri: name.to_owned(),
                ty: reference.ty.clone(),
            });
        }
        if reference.transforms.is_some() {
            return Err(Error::FileReferenceTransforms {
                uri: name.to_owned(),
            });
        }
        digest::check(
            &reference.digest_method.algorithm,
            &file.data,
            &reference.digest_value.value,
        )
        .map_err(|e| Error::FileReferenceDigest {
            uri: name.to_owned(),
            source: Box::new(e),
        })?;

        if reference.id.is_empty() {
            return Err(Error::NoFileReferenceId {
                uri: name.to_owned(),
            });
        }
        if !ids.insert(reference.id.as_str()) {
            return Err(Error::DuplicateReferenceId {
                id: reference.id.clone(),
            });
        }

        let object_reference = format!("#{}", reference.id);
        let format = formats
            .iter()
            .find(|f| f.object_reference == object_reference)
            .ok_or_else(|| Error::NoDataObjectFormat {
                reference: object_reference.clone(),
            })?;
        if format.mime_type.value != file.mimetype {
            return Err(Error::DataObjectFormatMimeMismatch {
                uri: name.to_owned(),
                manifest: file.mimetype.clone(),
                data_object_format: format.mime_type.value.clone(),
            });
        }
    }

    // One reference per data file plus SignedProperties.
    if references.len() > files.len() + 1 {
        return Err(Error::ExtraReferences {
            count: references.len(),
            expected: files.len() + 1,
        });
    }
    if formats.len() > files.len() {
        return Err(Error::ExtraDataObjectFormats {
            count: formats.len(),
            expected: files.len(),
        });
    }
    Ok(())
}

fn check_signed_properties_reference(references: &[Reference], props: &SignedProperties) -> Result<()> {
    if props.id.is_empty() {
        return Err(Error::NoSignedPropertiesId);
    }
    let reference = find_reference(references, &format!("#{}", props.id))?;
    if reference.ty != algorithm::SIGNED_PROPERTIES_TYPE {
        return Err(Error::SignedPropertiesReferenceType {
            ty: reference.ty.clone(),
        });
    }
    if let Some(transforms) = &reference.transforms {
        if let Some(t) = transforms
            .transforms
            .iter()
            .find(|t| t.algorithm != algorithm::C14N11)
        {
            return Err(Error::SignedPropertiesTransform {
                algorithm: t.algorithm.clone(),
            });
        }
    }
    let canonical = bdoc_c14n::canonicalize(props);
    digest::check(
        &reference.digest_method.algorithm,
        &canonical,
        &reference.digest_value.value,
    )
    .map_err(|e| Error::SignedPropertiesDigest(Box::new(e)))
}

/// Find the reference whose unescaped URI equals `uri`.
fn find_reference<'a>(references: &'a [Reference], uri: &str) -> Result<&'a Reference> {
    for reference in references {
        let unescaped = query_unescape(&reference.uri).ok_or_else(|| Error::ReferenceUriUnescape {
            uri: reference.uri.clone(),
        })?;
        if unescaped == uri {
            return Ok(reference);
        }
    }
    Err(Error::NoReference { uri: uri.to_owned() })
}

/// Decode a URI in `application/x-www-form-urlencoded` style: `+` is a
/// space and `%XX` is a byte. Returns `None` for malformed escapes or a
/// result that is not UTF-8.
fn query_unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

// ── Certificate ──────────────────────────────────────────────────────

fn parse_signing_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::SigningTime {
            value: value.to_owned(),
        })
}

/// Returns the claimed signing time and the issuer of the signer.
fn check_key_info(opener: &Opener, xml: &XadesSignatures, signer: &Cert) -> Result<(DateTime<Utc>, Cert)> {
    signer.check_non_repudiation()?;

    let claimed = &xml
        .signed_properties()
        .signed_signature_properties
        .signing_time
        .value;
    let signing_time = parse_signing_time(claimed)?;

    let chain = verify_chain(signer, &opener.roots, &opener.intermediates, signing_time).map_err(|e| {
        Error::SignerCertificateVerification {
            signing_time: signing_time.to_rfc3339(),
            source: Box::new(e),
        }
    })?;
    let issuer = chain.get(1).unwrap_or(signer).clone();
    log::debug!("signer issued by {}", issuer.subject());
    Ok((signing_time, issuer))
}

// ── SignatureValue ───────────────────────────────────────────────────

/// Returns the decoded signature value.
fn check_signature_value(xml: &XadesSignatures, signer: &Cert, method: &SignatureMethod) -> Result<Vec<u8>> {
    let signature_value = bdoc_crypto::decode_base64(&xml.signature.signature_value.value)?;
    let canonical = bdoc_c14n::canonicalize(&xml.signature.signed_info);
    method.verify(&signer.spki_der()?, &canonical, &signature_value)?;
    Ok(signature_value)
}

// ── Signed properties ────────────────────────────────────────────────

fn check_signed_properties(profile: Profile, xml: &XadesSignatures, signer: &Cert) -> Result<()> {
    let sig = &xml.signature;
    if sig.id.is_empty() {
        return Err(Error::NoSignatureId);
    }
    let target = &sig.object.qualifying_properties.target;
    if *target != format!("#{}", sig.id) {
        return Err(Error::QualifyingPropertiesTarget {
            target: target.clone(),
        });
    }

    let props = &xml.signed_properties().signed_signature_properties;
    check_signing_certificate(&props.signing_certificate, signer)?;

    match (&props.signature_policy_identifier, profile) {
        (Some(policy), Profile::Tm) => check_policy(policy),
        (None, Profile::Tm) => Err(Error::MissingPolicy),
        (Some(_), Profile::Bes | Profile::Ts) => Err(Error::PolicyNotAllowed),
        (None, Profile::Bes | Profile::Ts) => Ok(()),
    }
}

fn check_signing_certificate(signing_certificate: &xades::SigningCertificate, signer: &Cert) -> Result<()> {
    let cert = &signing_certificate.cert;
    digest::check(
        &cert.cert_digest.digest_method.algorithm,
        signer.raw(),
        &cert.cert_digest.digest_value.value,
    )
    .map_err(|e| Error::SigningCertificateDigest(Box::new(e)))?;

    let serial = cert.issuer_serial.x509_serial_number.value.trim();
    let expected = signer.serial_decimal();
    if serial != expected {
        return Err(Error::SigningCertificateSerial {
            key_info: expected,
            signing_certificate: serial.to_owned(),
        });
    }

    let issuer = &cert.issuer_serial.x509_issuer_name.value;
    let name = rdn::parse(issuer).map_err(|e| Error::SigningCertificateIssuerParse {
        issuer: issuer.clone(),
        source: Box::new(e),
    })?;
    if !name.matches(signer.issuer()) {
        return Err(Error::SigningCertificateIssuer {
            key_info: signer.issuer().to_string(),
            signing_certificate: issuer.clone(),
        });
    }
    Ok(())
}

fn check_policy(policy: &xades::SignaturePolicyIdentifier) -> Result<()> {
    let policy = &policy.signature_policy_id;
    let identifier = &policy.sig_policy_id.identifier;
    if identifier.qualifier != algorithm::OID_AS_URN {
        return Err(Error::SigPolicyQualifier {
            qualifier: identifier.qualifier.clone(),
        });
    }
    let value = identifier.value.trim();
    let (_, expected) = POLICIES
        .iter()
        .find(|(oid, _)| *oid == value)
        .ok_or_else(|| Error::SigPolicyId {
            value: value.to_owned(),
        })?;

    let hash = &policy.sig_policy_hash;
    if hash.digest_method.algorithm != algorithm::SHA256 {
        return Err(Error::SigPolicyHashMethod {
            algorithm: hash.digest_method.algorithm.clone(),
        });
    }
    let digest = hash.digest_value.value.trim();
    if digest != *expected {
        return Err(Error::SigPolicyHashValue {
            value: digest.to_owned(),
            expected: (*expected).to_owned(),
        });
    }
    Ok(())
}

// ── Freshness ────────────────────────────────────────────────────────

/// Check the embedded OCSP response and return its `producedAt`. With a
/// `signature_value` the response nonce must bind to it.
fn check_ocsp(
    opener: &Opener,
    xml: &XadesSignatures,
    signer: &Cert,
    issuer: &Cert,
    signature_value: Option<&[u8]>,
) -> Result<DateTime<Utc>> {
    let checker = opener.ocsp.as_ref().ok_or_else(|| Error::UnconfiguredOcsp {
        profile: opener.profile.to_string(),
    })?;
    let encoded = xml.ocsp_value().ok_or(Error::MissingOcsp)?;
    let response = bdoc_crypto::decode_base64(encoded)?;

    let status = checker
        .check_full_response(&response, signer, issuer, None)
        .map_err(Error::OcspVerification)?;
    if !status.good {
        return Err(Error::OcspStatusNotGood {
            reason: status.revocation_reason,
        });
    }
    log::debug!("OCSP response produced at {}", status.produced_at);

    if let Some(signature_value) = signature_value {
        let nonce = status
            .nonce
            .as_deref()
            .ok_or_else(|| Error::NonceDecode("OCSP response has no nonce".into()))?;
        freshness::check_nonce(nonce, signature_value)?;
    }
    Ok(status.produced_at)
}

/// Check the signature timestamp and return its generation time.
fn check_timestamp(opener: &Opener, xml: &XadesSignatures) -> Result<DateTime<Utc>> {
    let checker = opener.tsp.as_ref().ok_or_else(|| Error::UnconfiguredTsp {
        profile: opener.profile.to_string(),
    })?;
    let encoded = xml.timestamp_value().ok_or(Error::MissingTimestamp)?;
    let token = bdoc_crypto::decode_base64(encoded)?;
    let data = bdoc_c14n::canonicalize(&xml.signature.signature_value);

    let generated = checker
        .check(&token, &data, None)
        .map_err(Error::TimestampVerification)?;
    log::debug!("timestamp generated at {generated}");
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape() {
        assert_eq!(query_unescape("test.txt").as_deref(), Some("test.txt"));
        assert_eq!(query_unescape("my+file%20x.txt").as_deref(), Some("my file x.txt"));
        assert_eq!(query_unescape("%C3%B5un.txt").as_deref(), Some("õun.txt"));
        assert_eq!(query_unescape("%41%4a").as_deref(), Some("AJ"));
        assert!(query_unescape("bad%2").is_none());
        assert!(query_unescape("bad%zz").is_none());
        assert!(query_unescape("bad%+1").is_none());
        assert!(query_unescape("%FF").is_none());
    }

    #[test]
    fn signing_time() {
        let t = parse_signing_time(" 2024-03-01T12:00:00+02:00 ").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(matches!(
            parse_signing_time("yesterday"),
            Err(Error::SigningTime { .. })
        ));
    }

    fn policy(qualifier: &str, oid: &str, method: &str, digest: &str) -> xades::SignaturePolicyIdentifier {
        let mut p = xades::SignaturePolicyIdentifier::default();
        let id = &mut p.signature_policy_id;
        id.sig_policy_id.identifier.qualifier = qualifier.into();
        id.sig_policy_id.identifier.value = oid.into();
        id.sig_policy_hash.digest_method.algorithm = method.into();
        id.sig_policy_hash.digest_value.value = digest.into();
        p
    }

    #[test]
    fn pinned_policies() {
        let (oid, digest) = POLICIES[1];
        check_policy(&policy("OIDAsURN", &format!(" {oid}\n"), algorithm::SHA256, digest)).unwrap();

        let err = check_policy(&policy("OIDAsURI", oid, algorithm::SHA256, digest)).unwrap_err();
        assert!(matches!(err, Error::SigPolicyQualifier { .. }));

        let err = check_policy(&policy("OIDAsURN", "urn:oid:1.2.3", algorithm::SHA256, digest)).unwrap_err();
        assert!(matches!(err, Error::SigPolicyId { value } if value == "urn:oid:1.2.3"));

        let err = check_policy(&policy("OIDAsURN", oid, algorithm::SHA512, digest)).unwrap_err();
        assert!(matches!(err, Error::SigPolicyHashMethod { .. }));

        let (_, other) = POLICIES[0];
        let err = check_policy(&policy("OIDAsURN", oid, algorithm::SHA256, other)).unwrap_err();
        assert!(matches!(err, Error::SigPolicyHashValue { .. }));
    }
}
