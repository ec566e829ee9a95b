#![forbid(unsafe_code)]

//! Algorithm identifiers accepted in BDOC signatures.
//!
//! URIs appear in `Algorithm` attributes of the signature XML; OIDs appear
//! in the DER-encoded OCSP nonce.

// ── Canonicalization ─────────────────────────────────────────────────

pub const C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";

// ── Digest algorithms ────────────────────────────────────────────────

pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

// ── Signature algorithms ─────────────────────────────────────────────

pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
pub const ECDSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384";
pub const ECDSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha512";

// ── XAdES ────────────────────────────────────────────────────────────

/// `Type` of the Reference covering SignedProperties.
pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Qualifier of a SigPolicyId identifier given as a URN.
pub const OID_AS_URN: &str = "OIDAsURN";

// ── Container ────────────────────────────────────────────────────────

/// Content of the mandatory `mimetype` entry of an ASiC-E archive.
pub const ASICE_MIMETYPE: &str = "application/vnd.etsi.asic-e+zip";

// ── Digest OIDs (OCSP nonce) ─────────────────────────────────────────

pub const OID_SHA1: &str = "1.3.14.3.2.26";
pub const OID_SHA224: &str = "2.16.840.1.101.3.4.2.4";
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";
