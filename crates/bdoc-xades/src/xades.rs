#![forbid(unsafe_code)]

//! Element tree of a BDOC signature file.
//!
//! A signature file holds exactly one `ds:Signature` inside
//! `asic:XAdESSignatures`. Only the subset of XAdES used by BDOC 2.1 is
//! accepted: anything else makes parsing fail. `Id` attributes must be
//! unique across the file.

use bdoc_core::ns;
use bdoc_xml::{xml_element, Field};

xml_element! {
    pub struct XadesSignatures(ns::ASIC, "XAdESSignatures") {
        signature: Signature = Field::element(),
    }
}

xml_element! {
    pub struct Signature(ns::DSIG, "Signature") {
        id: String = Field::attr("Id").unique(),
        signed_info: SignedInfo = Field::element(),
        signature_value: SignatureValue = Field::element(),
        key_info: KeyInfo = Field::element(),
        object: Object = Field::element(),
    }
}

// ── SignedInfo ───────────────────────────────────────────────────────

xml_element! {
    pub struct SignedInfo(ns::DSIG, "SignedInfo", c14n_root) {
        id: String = Field::attr("Id").optional().unique(),
        canonicalization_method: CanonicalizationMethod = Field::element(),
        signature_method: SignatureMethod = Field::element(),
        references: Vec<Reference> = Field::repeated(),
    }
}

xml_element! {
    pub struct CanonicalizationMethod(ns::DSIG, "CanonicalizationMethod") {
        algorithm: String = Field::attr("Algorithm"),
    }
}

xml_element! {
    pub struct SignatureMethod(ns::DSIG, "SignatureMethod") {
        algorithm: String = Field::attr("Algorithm"),
    }
}

xml_element! {
    pub struct Reference(ns::DSIG, "Reference") {
        id: String = Field::attr("Id").unique(),
        uri: String = Field::attr("URI"),
        ty: String = Field::attr("Type").optional(),
        transforms: Option<Transforms> = Field::element().optional(),
        digest_method: DigestMethod = Field::element(),
        digest_value: DigestValue = Field::element(),
    }
}

xml_element! {
    pub struct Transforms(ns::DSIG, "Transforms") {
        transforms: Vec<Transform> = Field::repeated(),
    }
}

xml_element! {
    pub struct Transform(ns::DSIG, "Transform") {
        algorithm: String = Field::attr("Algorithm"),
    }
}

xml_element! {
    pub struct DigestMethod(ns::DSIG, "DigestMethod") {
        algorithm: String = Field::attr("Algorithm"),
    }
}

xml_element! {
    pub struct DigestValue(ns::DSIG, "DigestValue") {
        value: String = Field::chardata(),
    }
}

// ── SignatureValue and KeyInfo ───────────────────────────────────────

xml_element! {
    pub struct SignatureValue(ns::DSIG, "SignatureValue", c14n_root) {
        id: String = Field::attr("Id").optional().unique(),
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct KeyInfo(ns::DSIG, "KeyInfo") {
        id: String = Field::attr("Id").optional().unique(),
        x509_data: X509Data = Field::element(),
    }
}

xml_element! {
    pub struct X509Data(ns::DSIG, "X509Data") {
        x509_certificate: X509Certificate = Field::element(),
    }
}

xml_element! {
    pub struct X509Certificate(ns::DSIG, "X509Certificate") {
        value: String = Field::chardata(),
    }
}

// ── QualifyingProperties ─────────────────────────────────────────────

xml_element! {
    pub struct Object(ns::DSIG, "Object") {
        id: String = Field::attr("Id").optional().unique(),
        qualifying_properties: QualifyingProperties = Field::element(),
    }
}

xml_element! {
    pub struct QualifyingProperties(ns::XADES, "QualifyingProperties") {
        id: String = Field::attr("Id").optional().unique(),
        target: String = Field::attr("Target"),
        signed_properties: SignedProperties = Field::element(),
        unsigned_properties: Option<UnsignedProperties> = Field::element().optional(),
    }
}

xml_element! {
    pub struct SignedProperties(ns::XADES, "SignedProperties", c14n_root) {
        id: String = Field::attr("Id").unique(),
        signed_signature_properties: SignedSignatureProperties = Field::element(),
        signed_data_object_properties: SignedDataObjectProperties = Field::element(),
    }
}

xml_element! {
    pub struct SignedSignatureProperties(ns::XADES, "SignedSignatureProperties") {
        id: String = Field::attr("Id").optional().unique(),
        signing_time: SigningTime = Field::element(),
        signing_certificate: SigningCertificate = Field::element(),
        signature_policy_identifier: Option<SignaturePolicyIdentifier> = Field::element().optional(),
        signature_production_place: Option<SignatureProductionPlace> = Field::element().optional(),
        signer_role: Option<SignerRole> = Field::element().optional(),
    }
}

xml_element! {
    pub struct SigningTime(ns::XADES, "SigningTime") {
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct SigningCertificate(ns::XADES, "SigningCertificate") {
        cert: Cert = Field::element(),
    }
}

xml_element! {
    pub struct Cert(ns::XADES, "Cert") {
        cert_digest: CertDigest = Field::element(),
        issuer_serial: IssuerSerial = Field::element(),
    }
}

xml_element! {
    pub struct CertDigest(ns::XADES, "CertDigest") {
        digest_method: DigestMethod = Field::element(),
        digest_value: DigestValue = Field::element(),
    }
}

xml_element! {
    pub struct IssuerSerial(ns::XADES, "IssuerSerial") {
        x509_issuer_name: X509IssuerName = Field::element(),
        x509_serial_number: X509SerialNumber = Field::element(),
    }
}

xml_element! {
    pub struct X509IssuerName(ns::DSIG, "X509IssuerName") {
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct X509SerialNumber(ns::DSIG, "X509SerialNumber") {
        value: String = Field::chardata(),
    }
}

// ── Signature policy ─────────────────────────────────────────────────

xml_element! {
    pub struct SignaturePolicyIdentifier(ns::XADES, "SignaturePolicyIdentifier") {
        signature_policy_id: SignaturePolicyId = Field::element(),
    }
}

xml_element! {
    pub struct SignaturePolicyId(ns::XADES, "SignaturePolicyId") {
        sig_policy_id: SigPolicyId = Field::element(),
        sig_policy_hash: SigPolicyHash = Field::element(),
        sig_policy_qualifiers: SigPolicyQualifiers = Field::element(),
    }
}

xml_element! {
    pub struct SigPolicyId(ns::XADES, "SigPolicyId") {
        identifier: Identifier = Field::element(),
        description: Option<Description> = Field::element().optional(),
    }
}

xml_element! {
    pub struct Identifier(ns::XADES, "Identifier") {
        qualifier: String = Field::attr("Qualifier"),
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct Description(ns::XADES, "Description") {
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct SigPolicyHash(ns::XADES, "SigPolicyHash") {
        digest_method: DigestMethod = Field::element(),
        digest_value: DigestValue = Field::element(),
    }
}

xml_element! {
    pub struct SigPolicyQualifiers(ns::XADES, "SigPolicyQualifiers") {
        sig_policy_qualifier: SigPolicyQualifier = Field::element(),
    }
}

xml_element! {
    pub struct SigPolicyQualifier(ns::XADES, "SigPolicyQualifier") {
        spuri: Spuri = Field::element(),
    }
}

xml_element! {
    pub struct Spuri(ns::XADES, "SPURI") {
        value: String = Field::chardata(),
    }
}

// ── Production place and role ────────────────────────────────────────

xml_element! {
    pub struct SignatureProductionPlace(ns::XADES, "SignatureProductionPlace") {
        city: Option<City> = Field::element().optional(),
        state_or_province: Option<StateOrProvince> = Field::element().optional(),
        postal_code: Option<PostalCode> = Field::element().optional(),
        country_name: Option<CountryName> = Field::element().optional(),
    }
}

xml_element! {
    pub struct City(ns::XADES, "City") {}
}

xml_element! {
    pub struct StateOrProvince(ns::XADES, "StateOrProvince") {}
}

xml_element! {
    pub struct PostalCode(ns::XADES, "PostalCode") {}
}

xml_element! {
    pub struct CountryName(ns::XADES, "CountryName") {}
}

xml_element! {
    pub struct SignerRole(ns::XADES, "SignerRole") {
        claimed_roles: Option<ClaimedRoles> = Field::element().optional(),
    }
}

xml_element! {
    pub struct ClaimedRoles(ns::XADES, "ClaimedRoles") {
        claimed_roles: Vec<ClaimedRole> = Field::repeated(),
    }
}

xml_element! {
    pub struct ClaimedRole(ns::XADES, "ClaimedRole") {}
}

// ── Data object formats ──────────────────────────────────────────────

xml_element! {
    pub struct SignedDataObjectProperties(ns::XADES, "SignedDataObjectProperties") {
        id: String = Field::attr("Id").optional().unique(),
        data_object_formats: Vec<DataObjectFormat> = Field::repeated(),
    }
}

xml_element! {
    pub struct DataObjectFormat(ns::XADES, "DataObjectFormat") {
        object_reference: String = Field::attr("ObjectReference"),
        mime_type: MimeType = Field::element(),
    }
}

xml_element! {
    pub struct MimeType(ns::XADES, "MimeType") {
        value: String = Field::chardata(),
    }
}

// ── Unsigned properties ──────────────────────────────────────────────

xml_element! {
    pub struct UnsignedProperties(ns::XADES, "UnsignedProperties") {
        id: String = Field::attr("Id").optional().unique(),
        unsigned_signature_properties: UnsignedSignatureProperties = Field::element(),
    }
}

xml_element! {
    pub struct UnsignedSignatureProperties(ns::XADES, "UnsignedSignatureProperties") {
        id: String = Field::attr("Id").optional().unique(),
        signature_time_stamp: Option<SignatureTimeStamp> = Field::element().optional(),
        certificate_values: CertificateValues = Field::element(),
        revocation_values: RevocationValues = Field::element(),
    }
}

xml_element! {
    pub struct SignatureTimeStamp(ns::XADES, "SignatureTimeStamp") {
        id: String = Field::attr("Id").unique(),
        canonicalization_method: Option<CanonicalizationMethod> = Field::element().optional(),
        encapsulated_time_stamp: EncapsulatedTimeStamp = Field::element(),
    }
}

xml_element! {
    pub struct EncapsulatedTimeStamp(ns::XADES, "EncapsulatedTimeStamp") {
        id: String = Field::attr("Id").optional().unique(),
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct CertificateValues(ns::XADES, "CertificateValues") {
        id: String = Field::attr("Id").optional().unique(),
        encapsulated_x509_certificates: Vec<EncapsulatedX509Certificate> = Field::repeated(),
    }
}

xml_element! {
    pub struct EncapsulatedX509Certificate(ns::XADES, "EncapsulatedX509Certificate") {
        id: String = Field::attr("Id").optional().unique(),
        value: String = Field::chardata(),
    }
}

xml_element! {
    pub struct RevocationValues(ns::XADES, "RevocationValues") {
        id: String = Field::attr("Id").optional().unique(),
        ocsp_values: OcspValues = Field::element(),
    }
}

xml_element! {
    pub struct OcspValues(ns::XADES, "OCSPValues") {
        encapsulated_ocsp_value: EncapsulatedOcspValue = Field::element(),
    }
}

xml_element! {
    pub struct EncapsulatedOcspValue(ns::XADES, "EncapsulatedOCSPValue") {
        id: String = Field::attr("Id").optional().unique(),
        value: String = Field::chardata(),
    }
}

impl XadesSignatures {
    /// The encapsulated OCSP response, if any.
    pub fn ocsp_value(&self) -> Option<&str> {
        let unsigned = self
            .signature
            .object
            .qualifying_properties
            .unsigned_properties
            .as_ref()?;
        let value = unsigned
            .unsigned_signature_properties
            .revocation_values
            .ocsp_values
            .encapsulated_ocsp_value
            .value
            .as_str();
        (!value.trim().is_empty()).then_some(value)
    }

    /// The encapsulated signature timestamp token, if any.
    pub fn timestamp_value(&self) -> Option<&str> {
        let value = self
            .signature
            .object
            .qualifying_properties
            .unsigned_properties
            .as_ref()?
            .unsigned_signature_properties
            .signature_time_stamp
            .as_ref()?
            .encapsulated_time_stamp
            .value
            .as_str();
        (!value.trim().is_empty()).then_some(value)
    }

    pub fn signed_properties(&self) -> &SignedProperties {
        &self.signature.object.qualifying_properties.signed_properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdoc_core::Error;
    use bdoc_xml::Element;

    const MINIMAL: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<asic:XAdESSignatures xmlns:asic="http://uri.etsi.org/02918/v1.2.1#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:xades="http://uri.etsi.org/01903/v1.3.2#">
<ds:Signature Id="S0">
<ds:SignedInfo>
<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2006/12/xml-c14n11"/>
<ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/>
<ds:Reference Id="S0-RefId0" URI="test.txt">
<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
<ds:DigestValue>AAAA</ds:DigestValue>
</ds:Reference>
<ds:Reference Id="S0-RefId1" Type="http://uri.etsi.org/01903#SignedProperties" URI="#S0-SignedProperties">
<ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2006/12/xml-c14n11"/></ds:Transforms>
<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
<ds:DigestValue>AAAA</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>
<ds:SignatureValue Id="S0-SIG">AAAA</ds:SignatureValue>
<ds:KeyInfo><ds:X509Data><ds:X509Certificate>AAAA</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
<ds:Object><xades:QualifyingProperties Target="#S0">
<xades:SignedProperties Id="S0-SignedProperties">
<xades:SignedSignatureProperties>
<xades:SigningTime>2024-03-01T10:00:00Z</xades:SigningTime>
<xades:SigningCertificate><xades:Cert>
<xades:CertDigest><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>AAAA</ds:DigestValue></xades:CertDigest>
<xades:IssuerSerial><ds:X509IssuerName>CN=Test</ds:X509IssuerName><ds:X509SerialNumber>258</ds:X509SerialNumber></xades:IssuerSerial>
</xades:Cert></xades:SigningCertificate>
<xades:SignatureProductionPlace><xades:City/><xades:CountryName/></xades:SignatureProductionPlace>
<xades:SignerRole><xades:ClaimedRoles><xades:ClaimedRole/></xades:ClaimedRoles></xades:SignerRole>
</xades:SignedSignatureProperties>
<xades:SignedDataObjectProperties>
<xades:DataObjectFormat ObjectReference="#S0-RefId0"><xades:MimeType>text/plain</xades:MimeType></xades:DataObjectFormat>
</xades:SignedDataObjectProperties>
</xades:SignedProperties>
</xades:QualifyingProperties></ds:Object>
</ds:Signature>
</asic:XAdESSignatures>"##;

    #[test]
    fn schemas_are_valid() {
        XadesSignatures::descriptor().check();
        Signature::descriptor().check();
        SignedInfo::descriptor().check();
        Reference::descriptor().check();
        QualifyingProperties::descriptor().check();
        SignedSignatureProperties::descriptor().check();
        UnsignedSignatureProperties::descriptor().check();
        SignaturePolicyId::descriptor().check();
    }

    #[test]
    fn parses_minimal_bes_signature() {
        let xml: XadesSignatures = bdoc_xml::parse(MINIMAL.as_bytes()).unwrap();
        let sig = &xml.signature;
        assert_eq!(sig.id, "S0");
        assert_eq!(sig.signed_info.references.len(), 2);
        assert_eq!(sig.signed_info.references[0].uri, "test.txt");
        assert!(sig.signed_info.references[0].ty.is_empty());
        assert!(sig.signed_info.references[0].transforms.is_none());
        assert_eq!(
            sig.signed_info.references[1].transforms.as_ref().unwrap().transforms.len(),
            1
        );
        let props = xml.signed_properties();
        assert_eq!(props.id, "S0-SignedProperties");
        assert_eq!(
            props
                .signed_signature_properties
                .signing_certificate
                .cert
                .issuer_serial
                .x509_serial_number
                .value,
            "258"
        );
        assert!(props.signed_signature_properties.signature_policy_identifier.is_none());
        assert_eq!(
            props.signed_data_object_properties.data_object_formats[0].mime_type.value,
            "text/plain"
        );
        assert!(xml.ocsp_value().is_none());
        assert!(xml.timestamp_value().is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let xml = MINIMAL.replace("Id=\"S0-SIG\"", "Id=\"S0-RefId0\"");
        let err = bdoc_xml::parse::<XadesSignatures>(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            Error::NonUniqueAttribute { value, .. } if value == "S0-RefId0"
        ));
    }

    #[test]
    fn reference_requires_id() {
        let xml = MINIMAL.replace("<ds:Reference Id=\"S0-RefId1\" ", "<ds:Reference ");
        let err = bdoc_xml::parse::<XadesSignatures>(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            Error::MissingAttribute { attribute, .. } if attribute == "Id"
        ));
    }

    #[test]
    fn certificate_values_need_a_certificate() {
        let unsigned = "<xades:UnsignedProperties><xades:UnsignedSignatureProperties>\
            <xades:CertificateValues>{certs}</xades:CertificateValues>\
            <xades:RevocationValues><xades:OCSPValues>\
            <xades:EncapsulatedOCSPValue>AAAA</xades:EncapsulatedOCSPValue>\
            </xades:OCSPValues></xades:RevocationValues>\
            </xades:UnsignedSignatureProperties></xades:UnsignedProperties>";
        let with = |certs: &str| {
            MINIMAL.replace(
                "</xades:SignedProperties>\n",
                &format!("</xades:SignedProperties>\n{}", unsigned.replace("{certs}", certs)),
            )
        };

        let xml = with("<xades:EncapsulatedX509Certificate>AAAA</xades:EncapsulatedX509Certificate>");
        let parsed: XadesSignatures = bdoc_xml::parse(xml.as_bytes()).unwrap();
        assert_eq!(parsed.ocsp_value(), Some("AAAA"));

        assert!(bdoc_xml::parse::<XadesSignatures>(with("").as_bytes()).is_err());
    }

    #[test]
    fn unknown_elements_are_rejected() {
        let xml = MINIMAL.replace("<xades:City/>", "<xades:Street/>");
        assert!(bdoc_xml::parse::<XadesSignatures>(xml.as_bytes()).is_err());
    }

    #[test]
    fn signature_value_keeps_inherited_namespaces() {
        let xml: XadesSignatures = bdoc_xml::parse(MINIMAL.as_bytes()).unwrap();
        let c14n = bdoc_c14n::canonicalize(&xml.signature.signature_value);
        assert_eq!(
            String::from_utf8(c14n).unwrap(),
            concat!(
                r#"<ds:SignatureValue xmlns:asic="http://uri.etsi.org/02918/v1.2.1#" "#,
                r#"xmlns:ds="http://www.w3.org/2000/09/xmldsig#" "#,
                r#"xmlns:xades="http://uri.etsi.org/01903/v1.3.2#" Id="S0-SIG">AAAA</ds:SignatureValue>"#
            )
        );
    }
}
