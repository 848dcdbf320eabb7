use crate::calc::GradeCategory;
use crate::ipc::error::{anyhow_err, err};
use crate::ipc::types::{AppState, Request};
use crate::{registry, setup};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    let s = req
        .param(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if s.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(s)
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be string or null", key),
                    None,
                )
            }),
    }
}

pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", key),
                Some(json!({ "param": key, "value": v })),
            )
        }),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, Value> {
    optional_f64(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be boolean", key),
                None,
            )
        }),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be integer", key),
                None,
            )
        }),
    }
}

/// Deserializes a structured param (`categories`, `subjectGrades`, ...).
pub fn parse_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Option<T>, Value> {
    let Some(raw) = req.param(key) else {
        return Ok(None);
    };
    serde_json::from_value(raw.clone())
        .map(Some)
        .map_err(|e| err(&req.id, "bad_params", format!("{}: {}", key, e), None))
}

pub fn load_setup(conn: &Connection, req: &Request) -> Result<setup::GradingSetup, Value> {
    setup::load(conn).map_err(|e| anyhow_err(&req.id, &e, "db_query_failed"))
}

/// `params.tenantId`, else the workspace's configured default tenant.
pub fn tenant_id(conn: &Connection, req: &Request) -> Result<String, Value> {
    if let Some(t) = optional_str(req, "tenantId")? {
        if !t.is_empty() {
            return Ok(t);
        }
    }
    Ok(load_setup(conn, req)?.default_tenant_id)
}

/// The tenant's live band set, seeding the default scale first when the
/// workspace opted into `autoSeedDefaults` and the tenant has none.
pub fn load_scale(conn: &Connection, req: &Request, tenant_id: &str) -> Result<Vec<GradeCategory>, Value> {
    let categories = registry::list_categories(conn, tenant_id)
        .map_err(|e| anyhow_err(&req.id, &e, "db_query_failed"))?;
    if !categories.is_empty() || !load_setup(conn, req)?.auto_seed_defaults {
        return Ok(categories);
    }
    registry::seed_defaults(conn, tenant_id)
        .map(|outcome| outcome.categories)
        .map_err(|e| anyhow_err(&req.id, &e, "db_insert_failed"))
}
