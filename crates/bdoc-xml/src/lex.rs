#![forbid(unsafe_code)]

//! Raw markup scanner.
//!
//! Produces start tags, end tags, text and processing instructions with
//! names split at the prefix colon but not yet resolved against namespace
//! bindings. Comments are dropped, CDATA sections become text and entity
//! references are limited to the five predefined ones plus character
//! references. Any markup declaration, `<!DOCTYPE` included, is rejected.

use bdoc_core::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawName {
    pub prefix: String,
    pub local: String,
}

impl RawName {
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawAttr {
    pub name: RawName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Raw {
    Start {
        name: RawName,
        attrs: Vec<RawAttr>,
        empty: bool,
    },
    End(RawName),
    Text(String),
    ProcInst {
        target: String,
        content: String,
    },
}

pub(crate) struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Result<Self> {
        if let Some((offset, c)) = src.char_indices().find(|&(_, c)| !is_xml_char(c)) {
            return Err(syntax(offset, format!("illegal character {c:?}")));
        }
        Ok(Self { src, pos: 0 })
    }

    pub fn next_raw(&mut self) -> Result<Option<Raw>> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(None);
            }
            if !rest.starts_with('<') {
                return self.text().map(Some);
            }
            if rest.starts_with("<!--") {
                self.comment()?;
                continue;
            }
            if rest.starts_with("<![CDATA[") {
                return self.cdata().map(Some);
            }
            if rest.starts_with("<!DOCTYPE") {
                return Err(Error::Doctype);
            }
            if rest.starts_with("<!") {
                return Err(self.error("unsupported markup declaration"));
            }
            if rest.starts_with("<?") {
                return self.proc_inst().map(Some);
            }
            if rest.starts_with("</") {
                return self.end_tag().map(Some);
            }
            return self.start_tag().map(Some);
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: &str) -> Error {
        syntax(self.pos, message.to_owned())
    }

    fn text(&mut self) -> Result<Raw> {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        let start = self.pos;
        self.pos += end;
        unescape(&rest[..end], start).map(Raw::Text)
    }

    fn comment(&mut self) -> Result<()> {
        let Some(end) = self.rest()[4..].find("-->") else {
            return Err(self.error("unterminated comment"));
        };
        self.pos += 4 + end + 3;
        Ok(())
    }

    fn cdata(&mut self) -> Result<Raw> {
        const OPEN: usize = "<![CDATA[".len();
        let Some(end) = self.rest()[OPEN..].find("]]>") else {
            return Err(self.error("unterminated CDATA section"));
        };
        let content = normalize_newlines(&self.rest()[OPEN..OPEN + end]);
        self.pos += OPEN + end + 3;
        Ok(Raw::Text(content))
    }

    fn proc_inst(&mut self) -> Result<Raw> {
        self.pos += 2;
        let target = self.name()?.qualified();
        let Some(end) = self.rest().find("?>") else {
            return Err(self.error("unterminated processing instruction"));
        };
        let content = self.rest()[..end].trim_start().to_owned();
        self.pos += end + 2;
        Ok(Raw::ProcInst { target, content })
    }

    fn end_tag(&mut self) -> Result<Raw> {
        self.pos += 2;
        let name = self.name()?;
        self.skip_space();
        self.expect('>')?;
        Ok(Raw::End(name))
    }

    fn start_tag(&mut self) -> Result<Raw> {
        self.pos += 1;
        let name = self.name()?;
        let mut attrs = Vec::new();
        loop {
            let spaced = self.skip_space();
            let rest = self.rest();
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(Raw::Start { name, attrs, empty: false });
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(Raw::Start { name, attrs, empty: true });
            }
            if rest.is_empty() {
                return Err(self.error("unexpected end of input in start tag"));
            }
            if !spaced {
                return Err(self.error("expected whitespace before attribute"));
            }
            let attr = self.name()?;
            self.skip_space();
            self.expect('=')?;
            self.skip_space();
            let value = self.attr_value()?;
            attrs.push(RawAttr { name: attr, value });
        }
    }

    fn attr_value(&mut self) -> Result<String> {
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected quoted attribute value")),
        };
        self.pos += 1;
        let start = self.pos;
        let Some(end) = self.rest().find(quote) else {
            return Err(self.error("unterminated attribute value"));
        };
        let raw = &self.rest()[..end];
        if let Some(lt) = raw.find('<') {
            return Err(syntax(start + lt, "'<' in attribute value".to_owned()));
        }
        self.pos += end + 1;
        unescape(raw, start)
    }

    fn name(&mut self) -> Result<RawName> {
        let start = self.pos;
        let rest = self.rest();
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let valid = if i == 0 { is_name_start(c) } else { is_name_char(c) };
            if !valid {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return Err(self.error("expected a name"));
        }
        let qualified = &rest[..end];
        self.pos += end;
        split_name(qualified)
            .ok_or_else(|| syntax(start, format!("malformed name {qualified:?}")))
    }

    fn skip_space(&mut self) -> bool {
        let skipped = self
            .rest()
            .bytes()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .count();
        self.pos += skipped;
        skipped > 0
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(syntax(self.pos, format!("expected {c:?}")))
        }
    }
}

fn syntax(offset: usize, message: String) -> Error {
    Error::Syntax { offset, message }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-' || c == '.'
}

/// Splits `prefix:local`. A trailing colon is kept only for `xmlns:` so the
/// tokenizer can report the empty namespace prefix precisely.
fn split_name(qualified: &str) -> Option<RawName> {
    match qualified.split_once(':') {
        None => Some(RawName {
            prefix: String::new(),
            local: qualified.to_owned(),
        }),
        Some((prefix, local)) => {
            if prefix.is_empty() || local.contains(':') {
                return None;
            }
            if local.is_empty() && prefix != "xmlns" {
                return None;
            }
            Some(RawName {
                prefix: prefix.to_owned(),
                local: local.to_owned(),
            })
        }
    }
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Resolves entity and character references and normalizes line endings.
fn unescape(raw: &str, offset: usize) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut consumed = 0;
    while let Some(i) = rest.find(['&', '\r']) {
        out.push_str(&rest[..i]);
        if rest.as_bytes()[i] == b'\r' {
            out.push('\n');
            let skip = if rest[i + 1..].starts_with('\n') { 2 } else { 1 };
            rest = &rest[i + skip..];
            consumed += i + skip;
            continue;
        }
        let Some(semi) = rest[i..].find(';') else {
            return Err(syntax(offset + consumed + i, "unterminated entity reference".to_owned()));
        };
        let entity = &rest[i + 1..i + semi];
        let decoded = decode_entity(entity).ok_or_else(|| {
            syntax(offset + consumed + i, format!("unsupported entity reference &{entity};"))
        })?;
        out.push(decoded);
        rest = &rest[i + semi + 1..];
        consumed += i + semi + 1;
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => {
            let digits = entity.strip_prefix('#')?;
            let code = match digits.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code).filter(|&c| is_xml_char(c))
        }
    }
}
