//! Namespace-aware XML document type for OpenADR payloads: parse, query
//! by path, and mutate exactly one text node while leaving the rest of
//! the byte stream untouched. No network or storage dependency — a leaf
//! crate, like `oadr-schedule`.

mod document;
mod namespace;

pub use document::{OadrDocument, PathStep, Span};
pub use namespace::{NamespaceMap, Profile, NS_A, NS_B};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml parse error: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("path not found: {path}")]
    NotFound { path: String },
}
