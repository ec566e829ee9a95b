#![forbid(unsafe_code)]

//! Schema-driven parser.
//!
//! Walks the token stream and fills an [`Element`] tree according to its
//! schema. The document must match the schema exactly: unknown attributes,
//! unexpected children and non-whitespace text between children are all
//! errors. Comments are ignored and a leading XML declaration is allowed.

use std::collections::HashSet;

use bdoc_core::{Error, Result};
use log::trace;

use crate::schema::{Cardinality, Element, FieldMut, Role, Slot};
use crate::token::{Token, Tokenizer};

/// Parses `data` into a `T` rooted at its schema element.
pub fn parse<T: Element>(data: &[u8]) -> Result<T> {
    let mut parser = Parser::new(data)?;
    parser.skip_declaration()?;
    parser.read_whitespace()?;

    let mut root = T::default();
    parser.parse_slot(&mut root, false)?;

    parser.read_whitespace()?;
    match parser.read_token() {
        Ok(None) => Ok(root),
        Ok(Some(token)) => Err(Error::TrailingToken {
            found: token.to_string(),
        }),
        Err(e) => Err(Error::Trailing(Box::new(e))),
    }
}

struct Parser<'a> {
    tokens: Tokenizer<'a>,
    lookahead: Option<Result<Option<Token>>>,
    unique: HashSet<String>,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            tokens: Tokenizer::new(data)?,
            lookahead: None,
            unique: HashSet::new(),
        })
    }

    fn read_token(&mut self) -> Result<Option<Token>> {
        match self.lookahead.take() {
            Some(token) => token,
            None => self.tokens.token(),
        }
    }

    fn unread(&mut self, token: Result<Option<Token>>) {
        assert!(self.lookahead.is_none(), "double unread");
        self.lookahead = Some(token);
    }

    fn skip_declaration(&mut self) -> Result<()> {
        let token = self.read_token();
        if !matches!(&token, Ok(Some(Token::ProcInst { target, .. })) if target == "xml") {
            self.unread(token);
        }
        Ok(())
    }

    fn read_character_data(&mut self) -> Result<String> {
        let mut data = String::new();
        loop {
            match self.read_token() {
                Ok(Some(Token::CharData(text))) => data.push_str(&text),
                other => {
                    self.unread(other);
                    return Ok(data);
                }
            }
        }
    }

    /// Consumes a run of whitespace-only character data.
    fn read_whitespace(&mut self) -> Result<String> {
        let mut ws = String::new();
        loop {
            match self.read_token() {
                Ok(Some(Token::CharData(text)))
                    if text.chars().all(|c| matches!(c, ' ' | '\t' | '\n')) =>
                {
                    ws.push_str(&text)
                }
                other => {
                    self.unread(other);
                    return Ok(ws);
                }
            }
        }
    }

    /// Parses the next element into `slot`. Returns `false` without
    /// consuming anything if `optional` is set and the next token is not a
    /// matching start element.
    fn parse_slot(&mut self, slot: &mut dyn Slot, optional: bool) -> Result<bool> {
        let schema = slot.element_schema();
        schema.check();

        let token = match self.read_token() {
            Ok(token) => token,
            Err(e) if optional => {
                self.unread(Err(e));
                return Ok(false);
            }
            Err(e) => {
                return Err(Error::StartToken {
                    element: schema.to_string(),
                    source: Box::new(e),
                })
            }
        };
        let start = match token {
            Some(Token::Start { element, .. }) if schema.matches(&element.name) => element,
            other if optional => {
                self.unread(Ok(other));
                return Ok(false);
            }
            Some(Token::Start { element, .. }) => {
                return Err(Error::UnexpectedElement {
                    element: schema.to_string(),
                    found: element.name.to_string(),
                })
            }
            other => {
                return Err(Error::NotStartElement {
                    element: schema.to_string(),
                    found: other.map_or_else(|| "end of input".to_owned(), |t| t.to_string()),
                })
            }
        };
        trace!("parsing {schema}");

        let node = slot.fill();
        let (header, fields) = node.split_mut();
        if schema.c14n_root {
            header.ns = Some(self.tokens.bindings());
        }

        let mut attrs: Vec<_> = start
            .attrs
            .iter()
            .filter(|a| !a.is_namespace_decl())
            .map(|a| (a, false))
            .collect();
        let mut content = Vec::new();
        for (desc, field) in schema.fields.iter().zip(fields) {
            if desc.role != Role::Attribute {
                content.push((desc, field));
                continue;
            }
            let FieldMut::Text(value) = field else {
                panic!("{schema}: attribute {} is not a string field", desc.local);
            };
            let found = attrs
                .iter_mut()
                .find(|(a, _)| a.name.space == desc.namespace && a.name.local == desc.local);
            let Some((attr, used)) = found else {
                if desc.optional {
                    continue;
                }
                return Err(Error::MissingAttribute {
                    element: schema.to_string(),
                    attribute: desc.local.to_owned(),
                });
            };
            *used = true;
            if desc.unique && !self.unique.insert(attr.value.clone()) {
                return Err(Error::NonUniqueAttribute {
                    element: schema.to_string(),
                    attribute: attr.name.to_string(),
                    value: attr.value.clone(),
                });
            }
            *value = attr.value.clone();
        }
        if let Some((extra, _)) = attrs.iter().find(|(_, used)| !used) {
            return Err(Error::ExtraAttribute {
                element: schema.to_string(),
                attribute: extra.name.to_string(),
            });
        }
        header.start = start;

        let chardata = content.first().map_or(false, |(d, _)| d.role == Role::CharData);
        if !chardata {
            header.whitespace.push(self.read_whitespace()?);
        }
        for (desc, field) in content {
            match (desc.role, field) {
                (Role::CharData, FieldMut::Text(text)) => {
                    *text = self.read_character_data().map_err(|e| Error::CharData {
                        element: schema.to_string(),
                        source: Box::new(e),
                    })?;
                }
                (Role::Element, FieldMut::Slot(child)) => {
                    let expected = if desc.optional {
                        Cardinality::Optional
                    } else {
                        Cardinality::One
                    };
                    assert_eq!(
                        child.cardinality(),
                        expected,
                        "{schema}: element field type does not match its optionality"
                    );
                    let matched = self.parse_slot(&mut *child, desc.optional).map_err(|e| {
                        Error::SubStruct {
                            element: schema.to_string(),
                            source: Box::new(e),
                        }
                    })?;
                    if matched {
                        header.whitespace.push(self.read_whitespace()?);
                    }
                }
                (Role::Repeated, FieldMut::Slot(child)) => {
                    assert_eq!(
                        child.cardinality(),
                        Cardinality::Many,
                        "{schema}: repeated field is not a vector"
                    );
                    let mut index = 0;
                    loop {
                        let optional = index > 0 || desc.optional;
                        let matched = self.parse_slot(&mut *child, optional).map_err(|e| {
                            Error::SubSlice {
                                element: schema.to_string(),
                                index,
                                source: Box::new(e),
                            }
                        })?;
                        if !matched {
                            break;
                        }
                        header.whitespace.push(self.read_whitespace()?);
                        index += 1;
                    }
                }
                (role, _) => panic!("{schema}: field storage does not match role {role:?}"),
            }
        }

        match self.read_token() {
            Ok(Some(Token::End(_))) => Ok(true),
            Ok(Some(Token::Start { element, .. })) => Err(Error::ElementTrailingElement {
                element: schema.to_string(),
                found: element.name.to_string(),
            }),
            Ok(Some(other)) => Err(Error::ElementTrailingToken {
                element: schema.to_string(),
                found: other.to_string(),
            }),
            Ok(None) => Err(Error::ElementTrailingToken {
                element: schema.to_string(),
                found: "end of input".to_owned(),
            }),
            Err(e) => Err(Error::EndToken {
                element: schema.to_string(),
                source: Box::new(e),
            }),
        }
    }
}
