use serde_json::{json, Map, Value as JsonValue};

use crate::error::{ProcessingError, Result};
use crate::peaks::PeakSet;

/// Existing record metadata as a JSON object.
///
/// Accepts an object, a string holding a JSON object, or nothing at all.
pub fn existing_object(metadata: Option<&JsonValue>) -> Result<Map<String, JsonValue>> {
    match metadata {
        None | Some(JsonValue::Null) => Ok(Map::new()),
        Some(JsonValue::Object(map)) => Ok(map.clone()),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(Map::new()),
        Some(JsonValue::String(s)) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(ProcessingError::Metadata(format!(
                "expected a JSON object, found {}",
                kind(&other)
            ))),
            Err(e) => Err(ProcessingError::Metadata(format!("metadata is not JSON: {e}"))),
        },
        Some(other) => Err(ProcessingError::Metadata(format!(
            "expected a JSON object, found {}",
            kind(other)
        ))),
    }
}

/// Existing metadata with `peaks` set to `[{"position": x}, ...]`.
pub fn merge_peaks(metadata: Option<&JsonValue>, peaks: &PeakSet) -> Result<JsonValue> {
    let mut merged = existing_object(metadata)?;
    let positions = peaks.positions.iter().map(|x| json!({ "position": x })).collect();
    merged.insert("peaks".to_string(), JsonValue::Array(positions));
    Ok(JsonValue::Object(merged))
}

/// Sample thickness from the record, or a numeric `thickness` metadata key.
pub fn thickness(declared: Option<f64>, metadata: Option<&JsonValue>) -> Option<f64> {
    declared.or_else(|| {
        let map = existing_object(metadata).ok()?;
        match map.get("thickness")? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    })
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks(positions: &[f64]) -> PeakSet {
        PeakSet {
            positions: positions.to_vec(),
        }
    }

    #[test]
    fn merges_into_object() {
        let existing = json!({"operator": "Alice", "peaks": "stale"});
        let merged = merge_peaks(Some(&existing), &peaks(&[1650.5, 2900.0])).unwrap();
        assert_eq!(
            merged,
            json!({"operator": "Alice", "peaks": [{"position": 1650.5}, {"position": 2900.0}]})
        );
    }

    #[test]
    fn merges_into_json_string() {
        let existing = JsonValue::String(r#"{"laser": "785nm"}"#.into());
        let merged = merge_peaks(Some(&existing), &peaks(&[])).unwrap();
        assert_eq!(merged, json!({"laser": "785nm", "peaks": []}));
    }

    #[test]
    fn missing_metadata_starts_empty() {
        assert_eq!(
            merge_peaks(None, &peaks(&[3.0])).unwrap(),
            json!({"peaks": [{"position": 3.0}]})
        );
    }

    #[test]
    fn non_object_metadata_is_rejected() {
        assert!(matches!(
            merge_peaks(Some(&json!([1, 2])), &peaks(&[])),
            Err(ProcessingError::Metadata(_))
        ));
        let garbage = JsonValue::String("{not json".into());
        assert!(merge_peaks(Some(&garbage), &peaks(&[])).is_err());
    }

    #[test]
    fn thickness_prefers_declared_value() {
        let metadata = json!({"thickness": 0.5});
        assert_eq!(thickness(Some(1.5), Some(&metadata)), Some(1.5));
        assert_eq!(thickness(None, Some(&metadata)), Some(0.5));
        assert_eq!(thickness(None, Some(&json!({"thickness": "2.25"}))), Some(2.25));
        assert_eq!(thickness(None, None), None);
    }
}
