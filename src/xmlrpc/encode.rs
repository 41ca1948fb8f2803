use super::{MethodCall, MethodResponse, Value};
use base64ct::{Base64, Encoding};
use quick_xml::escape::escape;
use std::fmt::Write;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

pub(super) fn method_response(response: &MethodResponse) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(DECLARATION);
    out.push_str("<methodResponse><params><param>");
    value(&mut out, &response.value);
    out.push_str("</param></params></methodResponse>");
    out
}

pub(super) fn method_call(call: &MethodCall) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(DECLARATION);
    let _ = write!(
        out,
        "<methodCall><methodName>{}</methodName><params>",
        escape(call.method_name.as_str())
    );
    for param in &call.params {
        out.push_str("<param>");
        value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::String(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Int(i) => {
            let _ = write!(out, "<i4>{i}</i4>");
        }
        Value::Boolean(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{d}</double>");
        }
        Value::DateTime(dt) => {
            let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", escape(dt.as_str()));
        }
        Value::Base64(bytes) => {
            let _ = write!(out, "<base64>{}</base64>", Base64::encode_string(bytes));
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
                self::value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(values) => {
            out.push_str("<array><data>");
            for item in values {
                self::value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_struct_response() {
        let mut members = BTreeMap::new();
        members.insert("login".to_string(), Value::from("false"));
        members.insert("circuit_code".to_string(), Value::from(7));
        let xml = method_response(&MethodResponse::new(members));

        assert!(xml.starts_with(DECLARATION));
        assert!(xml.contains(
            "<member><name>circuit_code</name><value><i4>7</i4></value></member>"
        ));
        assert!(xml.contains(
            "<member><name>login</name><value><string>false</string></value></member>"
        ));
        assert!(xml.ends_with("</methodResponse>"));
    }

    #[test]
    fn escapes_markup_in_strings() {
        let xml = method_response(&MethodResponse::new("<b>hi</b> & bye"));
        assert!(xml.contains("<string>&lt;b&gt;hi&lt;/b&gt; &amp; bye</string>"));
    }

    #[test]
    fn encodes_scalars_and_arrays() {
        let xml = method_response(&MethodResponse::new(Value::Array(vec![
            Value::Boolean(true),
            Value::Double(2.5),
            Value::Base64(b"hello".to_vec()),
            Value::Nil,
        ])));

        assert!(xml.contains(
            "<array><data><value><boolean>1</boolean></value>\
             <value><double>2.5</double></value>\
             <value><base64>aGVsbG8=</base64></value>\
             <value><nil/></value></data></array>"
        ));
    }
}
