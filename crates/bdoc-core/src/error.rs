#![forbid(unsafe_code)]

use std::fmt;

/// Boxed error returned by the OCSP and TSP collaborators.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Verification stage of a single signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Algorithm,
    References,
    Certificate,
    SignatureValue,
    SignedProperties,
    Ocsp,
    Timestamp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Algorithm => "algorithm",
            Stage::References => "references",
            Stage::Certificate => "certificate",
            Stage::SignatureValue => "signature value",
            Stage::SignedProperties => "signed properties",
            Stage::Ocsp => "ocsp",
            Stage::Timestamp => "timestamp",
        })
    }
}

/// Errors produced while opening and verifying BDOC containers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Archive ──────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive exceeds the size limit of {limit} bytes")]
    ArchiveTooLarge { limit: u64 },

    #[error("not an ASiC-E container")]
    NotAsice(#[source] Box<Error>),

    #[error("archive too short for the mimetype header: {len} bytes")]
    ReadMagicFileHeader { len: usize },

    #[error("missing ZIP local file header magic")]
    NoZipMagic,

    #[error("first entry name length is {len}, expected 8")]
    MagicLength { len: u16 },

    #[error("first entry is {name:?}, expected \"mimetype\"")]
    NotAsicMagic { name: String },

    #[error("mimetype entry uses compression method {method}")]
    CompressedMimetype { method: u16 },

    #[error("mimetype entry has an extra field of {len} bytes")]
    MimetypeExtraField { len: u16 },

    #[error("mimetype entry declares {len} bytes")]
    MimetypeLength { len: u32 },

    #[error("mimetype content is {mimetype:?}")]
    NotAsiceMimetype { mimetype: String },

    #[error("ZIP error: {0}")]
    Zip(String),

    #[error("central directory names first entry {name:?}")]
    MimetypeCentralName { name: String },

    #[error("central directory places mimetype data at offset {offset}")]
    MimetypeCentralOffset { offset: u64 },

    #[error("central directory declares mimetype compression {method}")]
    MimetypeCentralMethod { method: String },

    #[error("central directory declares mimetype size {size}")]
    MimetypeCentralSize { size: u64 },

    #[error("central directory declares a mimetype extra field of {len} bytes")]
    MimetypeCentralExtra { len: usize },

    #[error("duplicate file name {name:?}")]
    DuplicateFileName { name: String },

    #[error("unknown file in META-INF: {name:?}")]
    UnknownMetaInfFile { name: String },

    #[error("data file {name:?} is in a subfolder")]
    FileInSubfolder { name: String },

    #[error("file {name:?} exceeds the size limit of {limit} bytes")]
    FileTooLarge { name: String, limit: u64 },

    #[error("file {name:?} declares {declared} uncompressed bytes but has {actual}")]
    UncompressedSize { name: String, declared: u64, actual: u64 },

    #[error("failed to decompress {name:?}")]
    Decompress {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing META-INF/manifest.xml")]
    MissingManifest,

    #[error("container has no signature files")]
    NoSignatures,

    #[error("container has no data files")]
    NoDataFiles,

    #[error("invalid manifest")]
    Manifest(#[source] Box<Error>),

    #[error("duplicate manifest entry {path:?}")]
    DuplicateManifestEntry { path: String },

    #[error("manifest root entry has media type {mimetype:?}")]
    ManifestRootMimetype { mimetype: String },

    #[error("manifest entry {path:?} has no matching file")]
    ExtraManifestEntry { path: String },

    #[error("signature file {path:?} listed in manifest")]
    SignatureInManifest { path: String },

    #[error("file {name:?} missing from manifest")]
    MissingManifestEntry { name: String },

    // ── XML lexical ──────────────────────────────────────────────────
    #[error("XML syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("XML is not valid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("document type declarations are not allowed")]
    Doctype,

    #[error("undeclared namespace prefix {prefix:?} in {element}")]
    UndeclaredNamespacePrefix { element: String, prefix: String },

    #[error("empty namespace prefix declared in {element}")]
    EmptyNamespacePrefix { element: String },

    #[error("xmlns prefix redeclared in {element}")]
    RedeclareXmlnsPrefix { element: String },

    #[error("namespace {prefix:?} undeclared in {element}")]
    UndeclaringNamespace { element: String, prefix: String },

    #[error("duplicate attribute {attribute} in {element}")]
    DuplicateAttribute { element: String, attribute: String },

    #[error("empty attribute {attribute} in {element}")]
    EmptyAttribute { element: String, attribute: String },

    #[error("start element {start} closed by {end}")]
    MismatchingTags { start: String, end: String },

    #[error("unexpected end element {name}")]
    UnexpectedEndElement { name: String },

    #[error("unexpected end of input, {unclosed} is not closed")]
    UnexpectedEof { unclosed: String },

    // ── XML schema ───────────────────────────────────────────────────
    #[error("failed to read start of {element}")]
    StartToken {
        element: String,
        #[source]
        source: Box<Error>,
    },

    #[error("expected {element}, found {found}")]
    NotStartElement { element: String, found: String },

    #[error("expected {element}, found element {found}")]
    UnexpectedElement { element: String, found: String },

    #[error("{element} is missing attribute {attribute}")]
    MissingAttribute { element: String, attribute: String },

    #[error("{element} has unexpected attribute {attribute}")]
    ExtraAttribute { element: String, attribute: String },

    #[error("{element} attribute {attribute} repeats value {value:?}")]
    NonUniqueAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("failed to read character data of {element}")]
    CharData {
        element: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid sub-element of {element}")]
    SubStruct {
        element: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid sub-element {index} of {element}")]
    SubSlice {
        element: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to read end of {element}")]
    EndToken {
        element: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{element} has trailing element {found}")]
    ElementTrailingElement { element: String, found: String },

    #[error("{element} has trailing {found}")]
    ElementTrailingToken { element: String, found: String },

    #[error("trailing {found} after document element")]
    TrailingToken { found: String },

    #[error("malformed input after document element")]
    Trailing(#[source] Box<Error>),

    // ── Cryptographic ────────────────────────────────────────────────
    #[error("unsupported canonicalization algorithm {algorithm:?}")]
    UnsupportedCanonicalization { algorithm: String },

    #[error("unsupported signature algorithm {algorithm:?}")]
    UnsupportedSignatureMethod { algorithm: String },

    #[error("unsupported digest algorithm {algorithm:?}")]
    UnsupportedDigest { algorithm: String },

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("digest mismatch: expected {expected}, calculated {calculated}")]
    DigestMismatch { expected: String, calculated: String },

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("PEM error: {0}")]
    Pem(String),

    #[error("signer certificate lacks the non-repudiation key usage")]
    NotNonRepudiation,

    #[error("signer certificate does not verify at {signing_time}")]
    SignerCertificateVerification {
        signing_time: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid signing time {value:?}")]
    SigningTime { value: String },

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    // ── XAdES semantic ───────────────────────────────────────────────
    #[error("failed to parse signature file {file:?}")]
    SignatureXml {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to parse signer certificate of {id:?} in {file:?}")]
    SignerCertificateParse {
        file: String,
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("signature {id:?} in {file:?} failed at {stage}")]
    Signature {
        file: String,
        id: String,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("SignedProperties has no Id")]
    NoSignedPropertiesId,

    #[error("no Reference with URI {uri:?}")]
    NoReference { uri: String },

    #[error("cannot unescape Reference URI {uri:?}")]
    ReferenceUriUnescape { uri: String },

    #[error("SignedProperties Reference has type {ty:?}")]
    SignedPropertiesReferenceType { ty: String },

    #[error("unsupported SignedProperties transform {algorithm:?}")]
    SignedPropertiesTransform { algorithm: String },

    #[error("SignedProperties digest check failed")]
    SignedPropertiesDigest(#[source] Box<Error>),

    #[error("Reference to {uri:?} has type {ty:?}")]
    FileReferenceType { uri: String, ty: String },

    #[error("Reference to {uri:?} has transforms")]
    FileReferenceTransforms { uri: String },

    #[error("digest check of {uri:?} failed")]
    FileReferenceDigest {
        uri: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Reference to {uri:?} has no Id")]
    NoFileReferenceId { uri: String },

    #[error("duplicate Reference Id {id:?}")]
    DuplicateReferenceId { id: String },

    #[error("no DataObjectFormat for {reference:?}")]
    NoDataObjectFormat { reference: String },

    #[error("{uri:?} has MIME type {manifest:?} in manifest but {data_object_format:?} in DataObjectFormat")]
    DataObjectFormatMimeMismatch {
        uri: String,
        manifest: String,
        data_object_format: String,
    },

    #[error("{count} References, expected at most {expected}")]
    ExtraReferences { count: usize, expected: usize },

    #[error("{count} DataObjectFormats, expected at most {expected}")]
    ExtraDataObjectFormats { count: usize, expected: usize },

    #[error("Signature has no Id")]
    NoSignatureId,

    #[error("QualifyingProperties targets {target:?}")]
    QualifyingPropertiesTarget { target: String },

    #[error("SigningCertificate digest check failed")]
    SigningCertificateDigest(#[source] Box<Error>),

    #[error("SigningCertificate serial {signing_certificate:?} does not match {key_info}")]
    SigningCertificateSerial {
        key_info: String,
        signing_certificate: String,
    },

    #[error("cannot parse SigningCertificate issuer {issuer:?}")]
    SigningCertificateIssuerParse {
        issuer: String,
        #[source]
        source: Box<Error>,
    },

    #[error("SigningCertificate issuer {signing_certificate:?} does not match {key_info}")]
    SigningCertificateIssuer {
        key_info: String,
        signing_certificate: String,
    },

    #[error("invalid distinguished name {input:?}: {reason}")]
    DistinguishedName { input: String, reason: String },

    #[error("SigPolicyId qualifier {qualifier:?}")]
    SigPolicyQualifier { qualifier: String },

    #[error("unknown signature policy {value:?}")]
    SigPolicyId { value: String },

    #[error("signature policy hash method {algorithm:?}")]
    SigPolicyHashMethod { algorithm: String },

    #[error("signature policy hash {value:?}, expected {expected:?}")]
    SigPolicyHashValue { value: String, expected: String },

    #[error("SignaturePolicyIdentifier is not allowed for this profile")]
    PolicyNotAllowed,

    #[error("SignaturePolicyIdentifier is required for this profile")]
    MissingPolicy,

    // ── Freshness ────────────────────────────────────────────────────
    #[error("missing OCSP response")]
    MissingOcsp,

    #[error("OCSP response verification failed")]
    OcspVerification(#[source] ServiceError),

    #[error("OCSP status is not good (revocation reason {reason:?})")]
    OcspStatusNotGood { reason: Option<String> },

    #[error("OCSP nonce is malformed: {0}")]
    NonceDecode(String),

    #[error("OCSP nonce has {len} bytes of trailing data")]
    NonceTrailingData { len: usize },

    #[error("unsupported nonce digest algorithm {oid}")]
    UnsupportedNonceDigest { oid: String },

    #[error("OCSP nonce does not match the signature value")]
    NonceMismatch,

    #[error("missing signature timestamp")]
    MissingTimestamp,

    #[error("timestamp verification failed")]
    TimestampVerification(#[source] ServiceError),

    // ── Configuration and container ──────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unconfigured BDOC size limit")]
    UnconfiguredBdocSize,

    #[error("unconfigured file size limit")]
    UnconfiguredFileSize,

    #[error("no trusted roots configured")]
    UnconfiguredRoots,

    #[error("failed to parse trusted roots")]
    RootsParse(#[source] Box<Error>),

    #[error("failed to parse intermediates")]
    IntermediatesParse(#[source] Box<Error>),

    #[error("profile {profile} requires an OCSP service")]
    UnconfiguredOcsp { profile: String },

    #[error("profile {profile} requires a TSP service")]
    UnconfiguredTsp { profile: String },

    #[error("failed to parse OCSP responders")]
    ResponderParse(#[source] Box<Error>),

    #[error("failed to parse TSP signers")]
    TspSignerParse(#[source] Box<Error>),

    #[error("failed to set up the OCSP client")]
    OcspConnect(#[source] ServiceError),

    #[error("failed to set up the TSP client")]
    TspConnect(#[source] ServiceError),

    #[error("unverified open failed")]
    UnverifiedOpen(#[source] Box<Error>),

    #[error("no signature with Id {id:?}")]
    NoSuchSignature { id: String },
}

impl Error {
    /// Wraps `self` as the failure of `stage` for signature `id` in `file`.
    pub fn at_stage(self, file: &str, id: &str, stage: Stage) -> Error {
        Error::Signature {
            file: file.to_owned(),
            id: id.to_owned(),
            stage,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, following boxed sources of this crate.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(next) = current.inner() {
            current = next;
        }
        current
    }

    fn inner(&self) -> Option<&Error> {
        match self {
            Error::NotAsice(e)
            | Error::Manifest(e)
            | Error::Trailing(e)
            | Error::SignedPropertiesDigest(e)
            | Error::SigningCertificateDigest(e)
            | Error::RootsParse(e)
            | Error::IntermediatesParse(e)
            | Error::ResponderParse(e)
            | Error::TspSignerParse(e)
            | Error::UnverifiedOpen(e) => Some(e),
            Error::StartToken { source, .. }
            | Error::CharData { source, .. }
            | Error::SubStruct { source, .. }
            | Error::SubSlice { source, .. }
            | Error::EndToken { source, .. }
            | Error::SignerCertificateVerification { source, .. }
            | Error::SignatureXml { source, .. }
            | Error::SignerCertificateParse { source, .. }
            | Error::Signature { source, .. }
            | Error::FileReferenceDigest { source, .. }
            | Error::SigningCertificateIssuerParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_follows_boxed_sources() {
        let err = Error::NonceMismatch.at_stage("META-INF/signatures0.xml", "S0", Stage::Ocsp);
        assert!(matches!(err.root_cause(), Error::NonceMismatch));
        assert_eq!(
            err.to_string(),
            "signature \"S0\" in \"META-INF/signatures0.xml\" failed at ocsp"
        );
    }

    #[test]
    fn leaf_is_its_own_root_cause() {
        let err = Error::MissingManifest;
        assert!(matches!(err.root_cause(), Error::MissingManifest));
    }
}
