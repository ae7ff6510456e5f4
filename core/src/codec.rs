//! JSON payload codec.
//!
//! One encoding path serves every verb: a request value becomes a JSON
//! object keyed by its declared field names, defaults included. The
//! dispatcher decides afterwards whether that object travels as a body or as
//! query parameters.
//!
//! Decoding is lenient about shape drift: members the target type does not
//! know are ignored, members it expects but does not find keep their
//! defaults, and an absent or blank body yields the all-default value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::BridgeError;

/// Serialize `request` into the JSON object sent for `operation`.
pub fn encode<T: Serialize + ?Sized>(operation: &str, request: &T) -> Result<Map<String, Value>, BridgeError> {
    match serde_json::to_value(request) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BridgeError::encoding(
            operation,
            format!("request must encode to a JSON object, got {}", kind(&other)),
        )),
        Err(e) => Err(BridgeError::encoding(operation, e.to_string())),
    }
}

/// Parse a response body into a JSON value. `None` means "no document".
pub fn parse_body(body: Option<&str>) -> Result<Option<Value>, BridgeError> {
    match body.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| BridgeError::Decode(e.to_string())),
    }
}

/// Build the response value from an already parsed document.
pub fn from_document<T: DeserializeOwned + Default>(doc: Option<Value>) -> Result<T, BridgeError> {
    match doc {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string())),
    }
}

/// Decode a response body into `T`.
pub fn decode<T: DeserializeOwned + Default>(body: Option<&str>) -> Result<T, BridgeError> {
    from_document(parse_body(body)?)
}

/// Render an encoded request as query parameters, in key order.
///
/// Null members and empty strings are omitted. Strings go as-is, numbers
/// and booleans in canonical form, arrays and objects as compact JSON.
pub fn query_pairs(payload: &Map<String, Value>) -> Vec<(String, String)> {
    payload
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) if s.is_empty() => return None,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Person {
        id: i64,
        name: String,
        is_disabled: bool,
        group_ids: Vec<i64>,
        home_folder_id: Option<String>,
    }

    #[test]
    fn encode_keeps_declared_names_and_defaults() {
        let map = encode("person", &Person::default()).unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["group_ids", "home_folder_id", "id", "is_disabled", "name"]
        );
        assert_eq!(map["id"], json!(0));
        assert_eq!(map["home_folder_id"], Value::Null);
    }

    #[test]
    fn encode_rejects_non_object_requests() {
        let err = encode("ids", &vec![1, 2, 3]).unwrap_err();
        assert!(err.is_local());
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let person = Person {
            id: 7,
            name: "Ada".to_string(),
            is_disabled: true,
            group_ids: vec![1, 2],
            home_folder_id: Some("42".to_string()),
        };
        let text = Value::Object(encode("person", &person).unwrap()).to_string();
        let back: Person = decode(Some(&text)).unwrap();
        assert_eq!(back, person);
    }

    #[test]
    fn unknown_members_are_ignored() {
        let with: Person = decode(Some(r#"{"id":7,"name":"Ada","new_field":"ignored"}"#)).unwrap();
        let without: Person = decode(Some(r#"{"id":7,"name":"Ada"}"#)).unwrap();
        assert_eq!(with, without);
        assert_eq!(with.id, 7);
        assert_eq!(with.name, "Ada");
    }

    #[test]
    fn missing_members_keep_defaults() {
        let p: Person = decode(Some(r#"{"name":"Grace"}"#)).unwrap();
        assert_eq!(p.id, 0);
        assert!(p.group_ids.is_empty());
        assert_eq!(p.home_folder_id, None);
    }

    #[test]
    fn absent_or_blank_body_yields_default() {
        assert_eq!(decode::<Person>(None).unwrap(), Person::default());
        assert_eq!(decode::<Person>(Some("")).unwrap(), Person::default());
        assert_eq!(decode::<Person>(Some("  \n")).unwrap(), Person::default());
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        let err = decode::<Person>(Some("<html>oops</html>")).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
        assert!(!err.is_local());
    }

    #[test]
    fn query_pairs_skip_null_and_empty_and_json_encode_structures() {
        let map = encode(
            "search",
            &json!({
                "fields": "id,name",
                "limit": 10,
                "is_disabled": false,
                "email": "",
                "sorts": null,
                "id": [1, 2],
            }),
        )
        .unwrap();
        let pairs = query_pairs(&map);
        assert_eq!(
            pairs,
            vec![
                ("fields".to_string(), "id,name".to_string()),
                ("id".to_string(), "[1,2]".to_string()),
                ("is_disabled".to_string(), "false".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }
}
