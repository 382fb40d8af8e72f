//! EIP-712 typed data argument checks.

use serde_json::Value;

use crate::error::JsonRpcError;

const REQUIRED_PROPERTIES: [&str; 4] = ["types", "domain", "primaryType", "message"];

/// Parse typed data given as a JSON string or object and check it targets
/// `chain_id`.
///
/// A `domain.chainId` given as a decimal or `0x` hex string is normalized to
/// a number in the returned value.
pub fn parse_and_validate_typed_data(
    typed_data: Option<&Value>,
    chain_id: u64,
) -> Result<Value, JsonRpcError> {
    let mut data = match typed_data {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).map_err(|e| {
            JsonRpcError::invalid_params(format!("Failed to parse typed data JSON: {e}"))
        })?,
        Some(value @ Value::Object(_)) => value.clone(),
        other => {
            let shown = other.map(Value::to_string).unwrap_or_else(|| "undefined".into());
            return Err(JsonRpcError::invalid_params(format!(
                "Invalid typed data argument: {shown}"
            )));
        }
    };

    let Some(object) = data.as_object_mut() else {
        return Err(missing_properties());
    };
    if !REQUIRED_PROPERTIES.iter().all(|key| object.contains_key(*key)) {
        return Err(missing_properties());
    }

    let Some(domain_chain) = object
        .get_mut("domain")
        .and_then(Value::as_object_mut)
        .and_then(|domain| domain.get_mut("chainId"))
    else {
        return Ok(data);
    };

    // Absent or empty values skip the check.
    let provided = match &*domain_chain {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::Number(number) => Some(number.as_u64()),
        Value::String(text) => Some(parse_chain_id(text)),
        _ => Some(None),
    };

    match provided {
        None => {}
        Some(Some(provided)) if provided == chain_id => *domain_chain = Value::from(provided),
        Some(_) => {
            return Err(JsonRpcError::invalid_params(format!(
                "Invalid chainId, expected {chain_id}"
            )));
        }
    }

    Ok(data)
}

fn parse_chain_id(text: &str) -> Option<u64> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn missing_properties() -> JsonRpcError {
    JsonRpcError::invalid_params(format!(
        "Invalid typed data argument. The following properties are required: {}",
        REQUIRED_PROPERTIES.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn typed_data(chain_id: Value) -> Value {
        json!({
            "types": { "EIP712Domain": [], "Mail": [{ "name": "contents", "type": "string" }] },
            "domain": { "name": "Beam", "chainId": chain_id },
            "primaryType": "Mail",
            "message": { "contents": "hi" }
        })
    }

    #[test]
    fn test_accepts_matching_chain_forms() {
        for chain_id in [json!(13337), json!("13337"), json!("0x3419")] {
            let data = parse_and_validate_typed_data(Some(&typed_data(chain_id)), 13337).unwrap();
            assert_eq!(data["domain"]["chainId"], json!(13337));
        }
    }

    #[test]
    fn test_accepts_json_string() {
        let raw = typed_data(json!(4337)).to_string();

        let data = parse_and_validate_typed_data(Some(&Value::String(raw)), 4337).unwrap();

        assert_eq!(data["primaryType"], "Mail");
    }

    #[test]
    fn test_rejects_other_chain() {
        let error = parse_and_validate_typed_data(Some(&typed_data(json!("0x10f1"))), 13337)
            .unwrap_err();

        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "Invalid chainId, expected 13337");
    }

    #[test]
    fn test_missing_domain_chain_is_allowed() {
        let mut data = typed_data(json!(null));
        data["domain"].as_object_mut().unwrap().remove("chainId");

        assert!(parse_and_validate_typed_data(Some(&data), 13337).is_ok());
    }

    #[test]
    fn test_requires_all_properties() {
        let mut data = typed_data(json!(13337));
        data.as_object_mut().unwrap().remove("primaryType");

        let error = parse_and_validate_typed_data(Some(&data), 13337).unwrap_err();

        assert!(error.message.contains("types, domain, primaryType, message"));
    }

    #[test]
    fn test_rejects_bad_json_and_non_objects() {
        let bad = parse_and_validate_typed_data(Some(&json!("{not json")), 1).unwrap_err();
        assert!(bad.message.starts_with("Failed to parse typed data JSON"));

        let number = parse_and_validate_typed_data(Some(&json!(5)), 1).unwrap_err();
        assert_eq!(number.message, "Invalid typed data argument: 5");

        assert!(parse_and_validate_typed_data(None, 1).is_err());
    }
}
