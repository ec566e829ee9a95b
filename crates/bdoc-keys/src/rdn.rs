#![forbid(unsafe_code)]

//! RFC 4514 distinguished names.
//!
//! XAdES carries the signing certificate issuer as a string. It is parsed
//! here into ASN.1 order and compared with the certificate's own issuer.

use bdoc_core::{Error, Result};
use der::asn1::ObjectIdentifier;
use der::{Any, Decode, Encode, Tag, Tagged};
use std::fmt;
use std::str::FromStr;
use x509_cert::name::Name;

/// Short names accepted as attribute types, matched case-insensitively.
const SHORT_NAMES: &[(&str, &str)] = &[
    ("emailAddress", "1.2.840.113549.1.9.1"),
    ("CN", "2.5.4.3"),
    ("SN", "2.5.4.4"),
    ("serialNumber", "2.5.4.5"),
    ("C", "2.5.4.6"),
    ("L", "2.5.4.7"),
    ("ST", "2.5.4.8"),
    ("O", "2.5.4.10"),
    ("OU", "2.5.4.11"),
    ("GN", "2.5.4.42"),
    ("organizationIdentifier", "2.5.4.97"),
];

/// Characters that may follow a backslash verbatim.
const ESCAPABLE: &str = " \"#+,;<=>\\";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// A string value, whatever its ASN.1 string type.
    Text(String),
    /// DER of a value that is not a string.
    Der(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTypeAndValue {
    pub oid: ObjectIdentifier,
    pub value: AttributeValue,
}

/// A distinguished name in ASN.1 order: the most significant RDN first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistinguishedName {
    pub rdns: Vec<Vec<AttributeTypeAndValue>>,
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            for (j, atv) in rdn.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{}=", atv.oid)?;
                match &atv.value {
                    AttributeValue::Text(s) => f.write_str(s)?,
                    AttributeValue::Der(der) => {
                        f.write_str("#")?;
                        for b in der {
                            write!(f, "{b:02x}")?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl DistinguishedName {
    /// Whether this name equals a certificate name.
    ///
    /// RDNs must appear in the same order; attributes inside one RDN are
    /// compared as sets of (type, value).
    pub fn matches(&self, name: &Name) -> bool {
        if self.rdns.len() != name.0.len() {
            return false;
        }
        self.rdns
            .iter()
            .zip(name.0.iter())
            .all(|(ours, theirs)| {
                let mut remaining: Vec<AttributeTypeAndValue> =
                    match theirs.0.iter().map(convert).collect::<Option<Vec<_>>>() {
                        Some(v) => v,
                        None => return false,
                    };
                if ours.len() != remaining.len() {
                    return false;
                }
                ours.iter().all(|atv| match remaining.iter().position(|r| r == atv) {
                    Some(i) => {
                        remaining.swap_remove(i);
                        true
                    }
                    None => false,
                })
            })
    }
}

fn convert(atv: &x509_cert::attr::AttributeTypeAndValue) -> Option<AttributeTypeAndValue> {
    Some(AttributeTypeAndValue {
        oid: atv.oid,
        value: value_of(&atv.value)?,
    })
}

/// Classify an ASN.1 value as a string or opaque DER.
fn value_of(any: &Any) -> Option<AttributeValue> {
    let text = match any.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString
        | Tag::NumericString => std::str::from_utf8(any.value()).ok()?.to_owned(),
        Tag::BmpString => {
            let units: Vec<u16> = any
                .value()
                .chunks(2)
                .map(|c| match c {
                    [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
                    _ => None,
                })
                .collect::<Option<_>>()?;
            String::from_utf16(&units).ok()?
        }
        _ => return Some(AttributeValue::Der(any.to_der().ok()?)),
    };
    Some(AttributeValue::Text(text))
}

fn invalid(input: &str, reason: impl Into<String>) -> Error {
    Error::DistinguishedName {
        input: input.to_owned(),
        reason: reason.into(),
    }
}

/// Parse an RFC 4514 string into ASN.1 order.
pub fn parse(input: &str) -> Result<DistinguishedName> {
    let mut rdns = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        if !rdns.is_empty() {
            rest = rest
                .strip_prefix(',')
                .ok_or_else(|| invalid(input, format!("missing RDN separator before {rest:?}")))?;
            if rest.is_empty() {
                return Err(invalid(input, "empty RDN"));
            }
        }

        let mut rdn = Vec::new();
        while !rest.is_empty() {
            if !rdn.is_empty() {
                match rest.strip_prefix('+') {
                    Some(r) if r.is_empty() => return Err(invalid(input, "empty attribute")),
                    Some(r) => rest = r,
                    None => break,
                }
            }
            let (atv, r) = parse_atv(input, rest)?;
            rdn.push(atv);
            rest = r;
        }
        rdns.push(rdn);
    }
    rdns.reverse();
    Ok(DistinguishedName { rdns })
}

fn attribute_type(input: &str, name: &str) -> Result<ObjectIdentifier> {
    let oid = SHORT_NAMES
        .iter()
        .find(|(short, _)| short.eq_ignore_ascii_case(name))
        .map_or(name, |(_, oid)| *oid);
    if !oid.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(invalid(input, format!("unknown attribute type {name:?}")));
    }
    ObjectIdentifier::new(oid).map_err(|e| invalid(input, format!("attribute type {name:?}: {e}")))
}

fn parse_atv<'a>(input: &str, encoded: &'a str) -> Result<(AttributeTypeAndValue, &'a str)> {
    let eq = encoded
        .find('=')
        .ok_or_else(|| invalid(input, format!("missing '=' in {encoded:?}")))?;
    let oid = attribute_type(input, &encoded[..eq])?;
    let encoded = &encoded[eq + 1..];
    let (value, rest) = match encoded.strip_prefix('#') {
        Some(hex) => parse_hex_value(input, hex)?,
        None => {
            let (s, rest) = parse_escaped(input, encoded)?;
            (AttributeValue::Text(s), rest)
        }
    };
    Ok((AttributeTypeAndValue { oid, value }, rest))
}

fn parse_hex_value<'a>(input: &str, encoded: &'a str) -> Result<(AttributeValue, &'a str)> {
    let end = encoded.find([',', '+']).unwrap_or(encoded.len());
    let (hex, rest) = encoded.split_at(end);
    if hex.is_empty() {
        return Err(invalid(input, "empty hexstring value"));
    }
    let der = decode_hex(hex).ok_or_else(|| invalid(input, format!("invalid hexstring {hex:?}")))?;
    // from_der rejects trailing data after the value.
    let any = Any::from_der(&der).map_err(|e| invalid(input, format!("invalid DER value: {e}")))?;
    let value = value_of(&any).ok_or_else(|| invalid(input, "undecodable string value"))?;
    Ok((value, rest))
}

fn parse_escaped<'a>(input: &str, encoded: &'a str) -> Result<(String, &'a str)> {
    let mut out: Vec<u8> = Vec::new();
    let bytes = encoded.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let next = *bytes
                    .get(i + 1)
                    .ok_or_else(|| invalid(input, "trailing backslash"))?;
                if ESCAPABLE.as_bytes().contains(&next) {
                    out.push(next);
                    i += 2;
                    continue;
                }
                let pair = encoded
                    .get(i + 1..i + 3)
                    .ok_or_else(|| invalid(input, format!("bad escape at byte {i}")))?;
                let b = decode_hex(pair)
                    .and_then(|v| v.first().copied())
                    .ok_or_else(|| invalid(input, format!("bad hex pair {pair:?}")))?;
                out.push(b);
                i += 3;
            }
            b'+' | b',' => break,
            c @ (0 | b'"' | b';' | b'<' | b'>') => {
                return Err(invalid(
                    input,
                    format!("unescaped special character {:?}", c as char),
                ));
            }
            b' ' => {
                if i == 0 {
                    return Err(invalid(input, "unescaped leading space"));
                }
                if matches!(bytes.get(i + 1), None | Some(b',') | Some(b'+')) {
                    return Err(invalid(input, "unescaped trailing space"));
                }
                out.push(b' ');
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    let value = String::from_utf8(out).map_err(|_| invalid(input, "value is not valid UTF-8"))?;
    Ok((value, &encoded[i..]))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::{tests::self_signed, Cert};

    fn text(oid: &str, s: &str) -> AttributeTypeAndValue {
        AttributeTypeAndValue {
            oid: ObjectIdentifier::new_unwrap(oid),
            value: AttributeValue::Text(s.into()),
        }
    }

    #[test]
    fn reversed_into_asn1_order() {
        let dn = parse("serialNumber=1234,CN=foobar").unwrap();
        assert_eq!(
            dn.rdns,
            vec![vec![text("2.5.4.3", "foobar")], vec![text("2.5.4.5", "1234")]]
        );
    }

    #[test]
    fn multi_valued_and_case_insensitive() {
        let dn = parse("gn=foo+sn=bar").unwrap();
        assert_eq!(
            dn.rdns,
            vec![vec![text("2.5.4.42", "foo"), text("2.5.4.4", "bar")]]
        );
    }

    #[test]
    fn escapes() {
        let dn = parse(r#"CN=\#\"\+\,\;\<\=\>\\\00\ "#).unwrap();
        assert_eq!(dn.rdns, vec![vec![text("2.5.4.3", "#\"+,;<=>\\\0 ")]]);
        let dn = parse(r"CN=\  \ ").unwrap();
        assert_eq!(dn.rdns, vec![vec![text("2.5.4.3", "   ")]]);
        let dn = parse(r"CN=J\C3\BCri").unwrap();
        assert_eq!(dn.rdns, vec![vec![text("2.5.4.3", "Jüri")]]);
    }

    #[test]
    fn hex_values() {
        // PrintableString "foobar" under a dotted type.
        let dn = parse("1.2.3=#1306666f6f626172").unwrap();
        assert_eq!(dn.rdns, vec![vec![text("1.2.3", "foobar")]]);
        // INTEGER 1 stays opaque.
        let dn = parse("CN=#020101").unwrap();
        assert_eq!(
            dn.rdns[0][0].value,
            AttributeValue::Der(vec![0x02, 0x01, 0x01])
        );
    }

    #[test]
    fn empty_name() {
        assert!(parse("").unwrap().rdns.is_empty());
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "CN",
            "CN=a,",
            "CN=a+",
            "CN= a",
            "CN=a ",
            "CN=a ,O=b",
            "CN=a;b",
            "CN=a\"b",
            "CN=a<b",
            "CN=a>b",
            "CN=a\\",
            "CN=a\\zz",
            "XX=a",
            "1=a",
            "CN=#",
            "CN=#0201",
            "CN=#02010100",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::DistinguishedName { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn matches_certificate_issuer() {
        let (der, _) = self_signed("Test Signer");
        let cert = Cert::from_der(der).unwrap();
        assert!(parse("CN=Test Signer,C=EE").unwrap().matches(cert.issuer()));
        assert!(parse("cn=Test Signer,c=EE").unwrap().matches(cert.issuer()));
        assert!(!parse("C=EE,CN=Test Signer").unwrap().matches(cert.issuer()));
        assert!(!parse("CN=Test Signer").unwrap().matches(cert.issuer()));
        assert!(!parse("CN=Other,C=EE").unwrap().matches(cert.issuer()));
    }

    #[test]
    fn set_comparison_within_rdn() {
        let a = parse("GN=foo+SN=bar").unwrap();
        let b = parse("SN=bar+GN=foo").unwrap();
        let name = Name::from_der(&name_der(&b)).unwrap();
        assert!(a.matches(&name));
        assert!(!parse("GN=foo").unwrap().matches(&name));
        assert!(!parse("GN=foo+SN=baz").unwrap().matches(&name));
    }

    /// Encode a parsed name with UTF8String values.
    fn name_der(dn: &DistinguishedName) -> Vec<u8> {
        use x509_cert::attr::AttributeTypeAndValue as Atv;
        use der::asn1::SetOfVec;
        use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

        let rdns = dn
            .rdns
            .iter()
            .map(|rdn| {
                let atvs: Vec<Atv> = rdn
                    .iter()
                    .map(|atv| {
                        let AttributeValue::Text(s) = &atv.value else {
                            panic!("text only");
                        };
                        Atv {
                            oid: atv.oid,
                            value: Any::new(Tag::Utf8String, s.as_bytes()).unwrap(),
                        }
                    })
                    .collect();
                RelativeDistinguishedName(SetOfVec::try_from(atvs).unwrap())
            })
            .collect();
        RdnSequence(rdns).to_der().unwrap()
    }
}
