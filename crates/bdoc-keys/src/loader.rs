#![forbid(unsafe_code)]

//! Certificate loading from PEM pools and base64 DER.

use crate::x509::Cert;
use bdoc_core::{Error, Result};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";

/// Load a certificate from DER bytes.
pub fn load_der(data: &[u8]) -> Result<Cert> {
    Cert::from_der(data.to_vec())
}

/// Load a single PEM-encoded certificate.
pub fn load_pem(pem: &str) -> Result<Cert> {
    // Trim trailing whitespace, some PEM files have extra newlines
    let (label, der_bytes) = pem_rfc7468::decode_vec(pem.trim().as_bytes())
        .map_err(|e| Error::Pem(format!("failed to decode certificate PEM: {e}")))?;
    if label != CERTIFICATE_LABEL {
        return Err(Error::Pem(format!(
            "expected {CERTIFICATE_LABEL} PEM label, got: {label}"
        )));
    }
    Cert::from_der(der_bytes)
}

/// Load every certificate from a string of concatenated PEM blocks.
///
/// Text between blocks is ignored. A string without any block is an error,
/// so an empty pool cannot be configured by accident.
pub fn load_pem_bundle(pems: &str) -> Result<Vec<Cert>> {
    let mut certs = Vec::new();
    let mut rest = pems;
    while let Some(start) = rest.find(BEGIN) {
        let block = &rest[start..];
        let end = block
            .find(END)
            .ok_or_else(|| Error::Pem("unterminated PEM block".into()))?;
        // The encapsulation boundary ends with the second run of dashes.
        let tail = &block[end + END.len()..];
        let close = tail
            .find("-----")
            .ok_or_else(|| Error::Pem("unterminated PEM boundary".into()))?;
        let len = end + END.len() + close + "-----".len();
        certs.push(load_pem(&block[..len])?);
        rest = &block[len..];
    }
    if certs.is_empty() {
        return Err(Error::Pem("no certificates found".into()));
    }
    Ok(certs)
}

/// Load a pool of certificates from a list of PEM strings.
///
/// Each string may hold one or more PEM blocks.
pub fn load_pem_pool<S: AsRef<str>>(pems: &[S]) -> Result<Vec<Cert>> {
    let mut pool = Vec::new();
    for pem in pems {
        pool.extend(load_pem_bundle(pem.as_ref())?);
    }
    Ok(pool)
}

/// Load a certificate from base64-encoded DER, as embedded in XML.
pub fn load_base64_der(encoded: &str) -> Result<Cert> {
    use base64::Engine;

    let clean: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let der_bytes = base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(e.to_string()))?;
    load_der(&der_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::tests::self_signed;
    use base64::Engine;

    fn to_pem(der: &[u8]) -> String {
        pem_rfc7468::encode_string(CERTIFICATE_LABEL, pem_rfc7468::LineEnding::LF, der).unwrap()
    }

    #[test]
    fn pem_roundtrip() {
        let (der, _) = self_signed("Test Signer");
        let cert = load_pem(&format!("{}\n\n", to_pem(&der))).unwrap();
        assert_eq!(cert.raw(), der.as_slice());
    }

    #[test]
    fn bundle_with_noise() {
        let (a, _) = self_signed("First");
        let (b, _) = self_signed("Second");
        let bundle = format!("# roots\n{}\nsome text\n{}", to_pem(&a), to_pem(&b));
        let certs = load_pem_bundle(&bundle).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].raw(), a.as_slice());
        assert_eq!(certs[1].raw(), b.as_slice());

        let pool = load_pem_pool(&[to_pem(&a), bundle]).unwrap();
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn empty_bundle_is_rejected() {
        assert!(matches!(load_pem_bundle(""), Err(Error::Pem(_))));
        assert!(matches!(load_pem_bundle("not a pem"), Err(Error::Pem(_))));
    }

    #[test]
    fn wrong_label() {
        let pem = pem_rfc7468::encode_string("PUBLIC KEY", pem_rfc7468::LineEnding::LF, &[0x30, 0x00])
            .unwrap();
        let err = load_pem(&pem).unwrap_err();
        assert!(matches!(err, Error::Pem(msg) if msg.contains("PUBLIC KEY")));
    }

    #[test]
    fn base64_with_line_breaks() {
        let (der, _) = self_signed("Embedded");
        let b64 = base64::engine::general_purpose::STANDARD.encode(&der);
        let wrapped: Vec<String> = b64
            .as_bytes()
            .chunks(64)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let cert = load_base64_der(&format!("\n{}\n", wrapped.join("\n"))).unwrap();
        assert_eq!(cert.raw(), der.as_slice());

        assert!(matches!(load_base64_der("!!!"), Err(Error::Base64(_))));
        assert!(matches!(load_base64_der("AAAA"), Err(Error::Certificate(_))));
    }
}
