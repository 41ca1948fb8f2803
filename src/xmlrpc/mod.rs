//! Minimal XML-RPC codec.
//!
//! Decodes `methodCall` documents into [`MethodCall`] and encodes
//! [`MethodResponse`] back into a `methodResponse` document. Tokenizing is
//! delegated to `quick-xml`; this module only knows the XML-RPC value grammar.

mod decode;
mod encode;

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed xml-rpc document: {0}")]
    Malformed(&'static str),
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
    #[error("unknown value type <{0}>")]
    UnknownType(String),
    #[error("invalid {kind} value: {text:?}")]
    InvalidScalar { kind: &'static str, text: String },
}

/// An XML-RPC value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i32),
    Boolean(bool),
    Double(f64),
    DateTime(String),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Looks up a struct member. Returns `None` for non-struct values.
    #[must_use]
    pub fn get(&self, member: &str) -> Option<&Value> {
        self.as_struct().and_then(|members| members.get(member))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Struct(value)
    }
}

/// A decoded `methodCall`.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    /// Decode a `methodCall` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not well-formed XML or does not follow
    /// the XML-RPC call grammar.
    pub fn from_xml(body: &str) -> Result<Self, Error> {
        decode::method_call(body)
    }

    /// Serialize as a `methodCall` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        encode::method_call(self)
    }

    /// First positional parameter, where login-style calls carry their struct.
    #[must_use]
    pub fn first_param(&self) -> Option<&Value> {
        self.params.first()
    }
}

/// A successful `methodResponse` carrying a single value.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodResponse {
    pub value: Value,
}

impl MethodResponse {
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Decode a `methodResponse` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a well-formed response.
    pub fn from_xml(body: &str) -> Result<Self, Error> {
        decode::method_response(body)
    }

    /// Serialize as a `methodResponse` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        encode::method_response(self)
    }
}
