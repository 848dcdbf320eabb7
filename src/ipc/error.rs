use crate::error::{GradeError, StoreError};
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn grade_err(id: &str, e: &GradeError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), Some(e.details()))
}

/// Engine and store errors keep their own codes; anything else is reported
/// under `fallback_code` (e.g. `db_query_failed`).
pub fn anyhow_err(id: &str, e: &anyhow::Error, fallback_code: &str) -> serde_json::Value {
    if let Some(g) = e.downcast_ref::<GradeError>() {
        return grade_err(id, g);
    }
    if let Some(s) = e.downcast_ref::<StoreError>() {
        return err(id, s.code(), s.to_string(), s.details());
    }
    err(id, fallback_code, format!("{:#}", e), None)
}
