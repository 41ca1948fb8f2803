//! Request classification by declared content type.

use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};

pub const TEXT_XML: &str = "text/xml";
pub const APPLICATION_XML: &str = "application/xml";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const TEXT_HTML: &str = "text/html";

static UTF16_LABEL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new("(?i)utf-16").ok());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    XmlRpc,
    /// Structured XML. Reserved; always answered with an empty body.
    Llsd,
    Rest,
    Unhandled,
}

impl Protocol {
    /// Exact match on the declared content type; an absent header is REST.
    #[must_use]
    pub fn classify(content_type: Option<&str>) -> Self {
        match content_type {
            Some(TEXT_XML) => Self::XmlRpc,
            Some(APPLICATION_XML) => Self::Llsd,
            Some(FORM_URLENCODED) | None => Self::Rest,
            Some(_) => Self::Unhandled,
        }
    }

    #[must_use]
    pub const fn response_content_type(self) -> Option<&'static str> {
        match self {
            Self::XmlRpc => Some(TEXT_XML),
            Self::Llsd => Some(APPLICATION_XML),
            Self::Rest => Some(TEXT_HTML),
            Self::Unhandled => None,
        }
    }
}

/// First non-empty `/`-delimited segment of a request path.
#[must_use]
pub fn rest_key(path: &str) -> Option<&str> {
    path.split('/').find(|segment| !segment.is_empty())
}

/// Rewrite any `utf-16` label in a serialized body to `utf-8`, matching the
/// charset the response actually goes out in.
#[must_use]
pub fn normalize_declared_encoding(body: &str) -> Cow<'_, str> {
    match UTF16_LABEL.as_ref() {
        Some(re) => re.replace_all(body, "utf-8"),
        None => Cow::Borrowed(body),
    }
}
