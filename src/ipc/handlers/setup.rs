use crate::ipc::error::{anyhow_err, err, ok};
use crate::ipc::helpers::{db_conn, load_setup};
use crate::ipc::types::{AppState, Request};
use crate::setup;
use serde_json::json;

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match load_setup(conn, req) {
        Ok(s) => ok(&req.id, json!({ "grading": s })),
        Err(e) => e,
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.param("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let current = match load_setup(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let next = match setup::apply_patch(&current, patch) {
        Ok(s) => s,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };
    if let Err(e) = setup::save(conn, &next) {
        return anyhow_err(&req.id, &e, "db_update_failed");
    }
    ok(&req.id, json!({ "grading": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
