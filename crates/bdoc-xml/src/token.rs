#![forbid(unsafe_code)]

//! Namespace-aware token stream.
//!
//! Wraps the raw scanner, tracks `xmlns` bindings per element scope and
//! resolves every element and attribute prefix to its namespace URI.
//! Self-closing elements are reported as a start token followed by an end
//! token so that consumers see balanced markup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bdoc_core::{ns, Error, Result};

use crate::lex::{Lexer, Raw, RawAttr, RawName};

/// Namespace-qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    pub space: String,
    pub local: String,
}

impl Name {
    pub fn new(space: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.space.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.space, self.local)
        }
    }
}

/// Attribute with its original prefix and resolved name.
///
/// Namespace declarations keep the convention used by most XML tokenizers:
/// `xmlns:p="uri"` has name `{xmlns}p` and `xmlns="uri"` has the bare
/// local name `xmlns`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attr {
    pub prefix: String,
    pub name: Name,
    pub value: String,
}

impl Attr {
    pub fn is_namespace_decl(&self) -> bool {
        self.prefix == ns::XMLNS_PREFIX
            || (self.prefix.is_empty() && self.name.local == ns::XMLNS_PREFIX)
    }

    /// Prefix bound by a namespace declaration, empty for the default one.
    pub fn declared_prefix(&self) -> &str {
        if self.prefix == ns::XMLNS_PREFIX {
            &self.name.local
        } else {
            ""
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartElement {
    pub prefix: String,
    pub name: Name,
    pub attrs: Vec<Attr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Start {
        element: StartElement,
        self_closing: bool,
    },
    End(Name),
    CharData(String),
    ProcInst {
        target: String,
        content: String,
    },
}

impl Token {
    pub fn kind(&self) -> &'static str {
        match self {
            Token::Start { .. } => "start element",
            Token::End(_) => "end element",
            Token::CharData(_) => "character data",
            Token::ProcInst { .. } => "processing instruction",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Start { element, .. } => write!(f, "start element {}", element.name),
            Token::End(name) => write!(f, "end element {name}"),
            Token::CharData(data) => write!(f, "character data {data:?}"),
            Token::ProcInst { target, .. } => write!(f, "processing instruction {target}"),
        }
    }
}

struct Scope {
    name: Name,
    saved: Vec<(String, Option<String>)>,
}

pub struct Tokenizer<'a> {
    lexer: Lexer<'a>,
    bindings: HashMap<String, String>,
    scopes: Vec<Scope>,
    pending_end: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let src = std::str::from_utf8(data).map_err(|e| Error::InvalidUtf8 {
            offset: e.valid_up_to(),
        })?;
        Ok(Self {
            lexer: Lexer::new(src)?,
            bindings: HashMap::new(),
            scopes: Vec::new(),
            pending_end: false,
        })
    }

    /// Namespace bindings in scope at the last returned token.
    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Next token, or `None` at the end of a well-formed document.
    pub fn token(&mut self) -> Result<Option<Token>> {
        if self.pending_end {
            self.pending_end = false;
            let name = self.pop(None)?;
            return Ok(Some(Token::End(name)));
        }
        let Some(raw) = self.lexer.next_raw()? else {
            if let Some(open) = self.scopes.last() {
                return Err(Error::UnexpectedEof {
                    unclosed: open.name.to_string(),
                });
            }
            return Ok(None);
        };
        match raw {
            Raw::Start { name, attrs, empty } => {
                let element = self.start(name, attrs)?;
                self.pending_end = empty;
                Ok(Some(Token::Start {
                    element,
                    self_closing: empty,
                }))
            }
            Raw::End(raw) => {
                let name = self.resolve_lenient(&raw);
                let name = self.pop(Some(name))?;
                Ok(Some(Token::End(name)))
            }
            Raw::Text(text) => Ok(Some(Token::CharData(text))),
            Raw::ProcInst { target, content } => Ok(Some(Token::ProcInst { target, content })),
        }
    }

    fn start(&mut self, raw: RawName, raw_attrs: Vec<RawAttr>) -> Result<StartElement> {
        let qualified = raw.qualified();
        let mut saved = Vec::new();
        for attr in &raw_attrs {
            let declared = if attr.name.prefix == ns::XMLNS_PREFIX {
                if attr.name.local.is_empty() {
                    return Err(Error::EmptyNamespacePrefix { element: qualified });
                }
                if attr.name.local == ns::XMLNS_PREFIX {
                    return Err(Error::RedeclareXmlnsPrefix { element: qualified });
                }
                attr.name.local.clone()
            } else if attr.name.prefix.is_empty() && attr.name.local == ns::XMLNS_PREFIX {
                String::new()
            } else {
                continue;
            };
            if attr.value.is_empty() {
                return Err(Error::UndeclaringNamespace {
                    element: qualified,
                    prefix: declared,
                });
            }
            let previous = self.bindings.insert(declared.clone(), attr.value.clone());
            saved.push((declared, previous));
        }

        let space = match raw.prefix.as_str() {
            "" => self.bindings.get("").cloned().unwrap_or_default(),
            ns::XML_PREFIX => ns::XML.to_owned(),
            prefix => match self.bindings.get(prefix) {
                Some(uri) => uri.clone(),
                None => {
                    self.restore(saved);
                    return Err(Error::UndeclaredNamespacePrefix {
                        element: qualified,
                        prefix: prefix.to_owned(),
                    });
                }
            },
        };
        let name = Name::new(space, raw.local.clone());
        self.scopes.push(Scope {
            name: name.clone(),
            saved,
        });

        let mut attrs: Vec<Attr> = Vec::with_capacity(raw_attrs.len());
        for attr in raw_attrs {
            let resolved = self.resolve_attr(&qualified, attr)?;
            if !resolved.is_namespace_decl() {
                if let Some(dup) = attrs.iter().find(|a| a.name == resolved.name) {
                    return Err(Error::DuplicateAttribute {
                        element: qualified,
                        attribute: dup.name.to_string(),
                    });
                }
                if resolved.value.is_empty() {
                    return Err(Error::EmptyAttribute {
                        element: qualified,
                        attribute: resolved.name.to_string(),
                    });
                }
            }
            attrs.push(resolved);
        }

        Ok(StartElement {
            prefix: raw.prefix,
            name,
            attrs,
        })
    }

    fn resolve_attr(&self, element: &str, attr: RawAttr) -> Result<Attr> {
        let RawAttr { name, value } = attr;
        let space = match name.prefix.as_str() {
            "" => String::new(),
            ns::XMLNS_PREFIX => ns::XMLNS_PREFIX.to_owned(),
            ns::XML_PREFIX => ns::XML.to_owned(),
            prefix => self
                .bindings
                .get(prefix)
                .cloned()
                .ok_or_else(|| Error::UndeclaredNamespacePrefix {
                    element: element.to_owned(),
                    prefix: prefix.to_owned(),
                })?,
        };
        Ok(Attr {
            prefix: name.prefix,
            name: Name::new(space, name.local),
            value,
        })
    }

    fn resolve_lenient(&self, raw: &RawName) -> Name {
        let space = match raw.prefix.as_str() {
            "" => self.bindings.get("").cloned().unwrap_or_default(),
            ns::XML_PREFIX => ns::XML.to_owned(),
            prefix => self
                .bindings
                .get(prefix)
                .cloned()
                .unwrap_or_else(|| prefix.to_owned()),
        };
        Name::new(space, raw.local.clone())
    }

    fn pop(&mut self, end: Option<Name>) -> Result<Name> {
        let Some(scope) = self.scopes.pop() else {
            let name = end.map(|n| n.to_string()).unwrap_or_default();
            return Err(Error::UnexpectedEndElement { name });
        };
        if let Some(end) = end {
            if end != scope.name {
                return Err(Error::MismatchingTags {
                    start: scope.name.to_string(),
                    end: end.to_string(),
                });
            }
        }
        self.restore(scope.saved);
        Ok(scope.name)
    }

    fn restore(&mut self, saved: Vec<(String, Option<String>)>) {
        for (prefix, previous) in saved.into_iter().rev() {
            match previous {
                Some(uri) => self.bindings.insert(prefix, uri),
                None => self.bindings.remove(&prefix),
            };
        }
    }
}
