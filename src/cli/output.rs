use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::decompose::{Extraction, UnitFailure};
use crate::models::store::CourseFields;

/// JSON shape of an extraction run.
#[derive(Debug, Serialize)]
pub struct ExtractionOutput {
    pub courses: BTreeMap<String, CourseFields>,
    pub failures: Vec<FailureOutput>,
}

/// One failed unit.
#[derive(Debug, Serialize)]
pub struct FailureOutput {
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    pub error: String,
}

impl From<&UnitFailure> for FailureOutput {
    fn from(f: &UnitFailure) -> Self {
        Self {
            unit: f.label.clone(),
            course: f.course_id.clone(),
            error: f.error.to_string(),
        }
    }
}

impl From<&Extraction> for ExtractionOutput {
    fn from(e: &Extraction) -> Self {
        Self {
            courses: e.store.snapshot(),
            failures: e.failures.iter().map(FailureOutput::from).collect(),
        }
    }
}

/// Format a result as minified JSON.
pub fn format_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Format a result as indented JSON.
pub fn format_json_pretty<T: Serialize>(result: &T) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Format an error as JSON.
pub fn format_error(err: &dyn std::fmt::Display) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ExtractError;
    use crate::models::store::ResultStore;

    #[derive(Serialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn format_json_minified() {
        let data = TestData {
            name: "test".into(),
            value: 42,
        };
        let json = format_json(&data);
        assert!(!json.contains('\n'));
        assert!(json.contains("\"name\":\"test\""));
        assert!(format_json_pretty(&data).contains('\n'));
    }

    #[test]
    fn format_error_produces_json() {
        let err = "something \"quoted\" went wrong";
        let json = format_error(&err);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"], "something \"quoted\" went wrong");
    }

    #[test]
    fn extraction_output_shape() {
        let store = ResultStore::new();
        let mut fields = CourseFields::new();
        fields.insert("id".into(), "CS101".into());
        store.insert("CS101", fields).unwrap();
        let extraction = Extraction {
            store: Arc::new(store),
            failures: vec![UnitFailure {
                label: "course #1".into(),
                course_id: None,
                error: ExtractError::Config("bad".into()),
            }],
        };

        let json = format_json(&ExtractionOutput::from(&extraction));
        assert_eq!(
            json,
            r#"{"courses":{"CS101":{"id":"CS101"}},"failures":[{"unit":"course #1","error":"config error: bad"}]}"#
        );
    }
}
