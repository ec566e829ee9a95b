#![forbid(unsafe_code)]

//! XML namespace constants used by BDOC signature and manifest files.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES 1.3.2 namespace
pub const XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// ASiC namespace of the XAdESSignatures document element
pub const ASIC: &str = "http://uri.etsi.org/02918/v1.2.1#";

/// OpenDocument manifest namespace
pub const MANIFEST: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// XML namespace, bound to the reserved `xml` prefix
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Reserved prefix used for namespace declarations
pub const XMLNS_PREFIX: &str = "xmlns";

/// Reserved prefix bound to [`XML`]
pub const XML_PREFIX: &str = "xml";
