#![forbid(unsafe_code)]

//! Namespace-strict XML for BDOC signature files.
//!
//! The tokenizer resolves namespace prefixes and rejects document type
//! declarations, undeclared prefixes and empty attributes. On top of it,
//! [`parse`] fills types declared with [`xml_element!`] while keeping the
//! source details needed to canonicalize any subtree afterwards.

mod lex;
pub mod parser;
pub mod schema;
pub mod token;

pub use parser::parse;
pub use schema::{Element, Field, FieldRef, Header, Node};
pub use token::{Attr, Name, StartElement, Token, Tokenizer};
