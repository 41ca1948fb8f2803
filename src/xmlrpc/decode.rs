use super::{Error, MethodCall, MethodResponse, Value};
use base64ct::{Base64, Encoding};
use quick_xml::{events::Event, Reader};
use std::collections::BTreeMap;

/// Deepest element nesting accepted. Decoding recurses per level.
const MAX_DEPTH: usize = 64;

/// Element tree built from the token stream. XML-RPC never uses attributes or
/// mixed content, so text and child elements are all we keep.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

pub(super) fn method_call(body: &str) -> Result<MethodCall, Error> {
    let root = parse_tree(body)?;
    if root.name != "methodCall" {
        return Err(Error::UnexpectedRoot(root.name));
    }

    let method_name = root
        .child("methodName")
        .map(|name| name.text.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or(Error::Malformed("missing methodName"))?;

    let params = match root.child("params") {
        Some(params) => params
            .children_named("param")
            .map(|param| {
                param
                    .child("value")
                    .ok_or(Error::Malformed("param without value"))
                    .and_then(value)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(MethodCall {
        method_name,
        params,
    })
}

/// Accepts both `params` and `fault` bodies; a fault's struct becomes the value.
pub(super) fn method_response(body: &str) -> Result<MethodResponse, Error> {
    let root = parse_tree(body)?;
    if root.name != "methodResponse" {
        return Err(Error::UnexpectedRoot(root.name));
    }

    let holder = match (root.child("params"), root.child("fault")) {
        (Some(params), _) => params
            .child("param")
            .ok_or(Error::Malformed("response without param"))?,
        (None, Some(fault)) => fault,
        (None, None) => return Err(Error::Malformed("response without params or fault")),
    };

    let value = holder
        .child("value")
        .ok_or(Error::Malformed("param without value"))
        .and_then(value)?;

    Ok(MethodResponse { value })
}

fn parse_tree(body: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(body);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(Error::Malformed("document nested too deeply"));
                }
                stack.push(Element::named(start.local_name().as_ref()));
            }
            Event::Empty(start) => {
                attach(&mut stack, &mut root, Element::named(start.local_name().as_ref()))?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(Error::Malformed("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(quick_xml::Error::from)?;
                    // indentation between child elements is not content
                    if current.children.is_empty() || !unescaped.trim().is_empty() {
                        current.text.push_str(&unescaped);
                    }
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Malformed("unexpected end of document"));
    }

    root.ok_or(Error::Malformed("empty document"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), Error> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }

    if root.is_some() {
        return Err(Error::Malformed("multiple root elements"));
    }

    *root = Some(element);
    Ok(())
}

fn value(element: &Element) -> Result<Value, Error> {
    // <value>text</value> without a type element is a string
    let Some(typed) = element.children.first() else {
        return Ok(Value::String(element.text.clone()));
    };

    match typed.name.as_str() {
        "string" => Ok(Value::String(typed.text.clone())),
        "int" | "i4" => scalar(typed, "int").map(Value::Int),
        "double" => scalar(typed, "double").map(Value::Double),
        "boolean" => match typed.text.trim() {
            "1" => Ok(Value::Boolean(true)),
            "0" => Ok(Value::Boolean(false)),
            other => Err(Error::InvalidScalar {
                kind: "boolean",
                text: other.to_string(),
            }),
        },
        "dateTime.iso8601" => Ok(Value::DateTime(typed.text.trim().to_string())),
        "base64" => {
            let compact: String = typed.text.split_whitespace().collect();
            Base64::decode_vec(&compact)
                .map(Value::Base64)
                .map_err(|_| Error::InvalidScalar {
                    kind: "base64",
                    text: compact,
                })
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member
                    .child("name")
                    .ok_or(Error::Malformed("struct member without name"))?;
                let member_value = member
                    .child("value")
                    .ok_or(Error::Malformed("struct member without value"))?;
                members.insert(name.text.trim().to_string(), value(member_value)?);
            }
            Ok(Value::Struct(members))
        }
        "array" => {
            let values = match typed.child("data") {
                Some(data) => data
                    .children_named("value")
                    .map(value)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "nil" => Ok(Value::Nil),
        other => Err(Error::UnknownType(other.to_string())),
    }
}

fn scalar<T: std::str::FromStr>(element: &Element, kind: &'static str) -> Result<T, Error> {
    let text = element.text.trim();
    text.parse().map_err(|_| Error::InvalidScalar {
        kind,
        text: text.to_string(),
    })
}
