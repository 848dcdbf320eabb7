use crate::ipc::error::{anyhow_err, err, ok};
use crate::ipc::helpers::{
    db_conn, optional_bool, optional_f64, optional_i64, optional_str, required_f64, required_str,
    tenant_id,
};
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, CategoryDraft, CategoryPatch};
use serde_json::json;

fn handle_categories_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "categories": [] }));
    };
    let tenant = match tenant_id(conn, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    match registry::list_categories(conn, &tenant) {
        Ok(categories) => ok(&req.id, json!({ "tenantId": tenant, "categories": categories })),
        Err(e) => anyhow_err(&req.id, &e, "db_query_failed"),
    }
}

fn parse_draft(req: &Request) -> Result<CategoryDraft, serde_json::Value> {
    Ok(CategoryDraft {
        name: required_str(req, "name")?,
        min_percentage: required_f64(req, "minPercentage")?,
        max_percentage: required_f64(req, "maxPercentage")?,
        grade_point: required_f64(req, "gradePoint")?,
        is_passing: optional_bool(req, "isPassing")?.unwrap_or(true),
        order: optional_i64(req, "order")?
            .ok_or_else(|| err(&req.id, "bad_params", "missing order", None))?,
    })
}

fn parse_patch(req: &Request) -> Result<CategoryPatch, serde_json::Value> {
    Ok(CategoryPatch {
        name: optional_str(req, "name")?,
        min_percentage: optional_f64(req, "minPercentage")?,
        max_percentage: optional_f64(req, "maxPercentage")?,
        grade_point: optional_f64(req, "gradePoint")?,
        is_passing: optional_bool(req, "isPassing")?,
        order: optional_i64(req, "order")?,
    })
}

fn handle_categories_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (tenant, draft) = match tenant_id(conn, req).and_then(|t| Ok((t, parse_draft(req)?))) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match registry::create_category(conn, &tenant, draft) {
        Ok(category) => ok(&req.id, json!({ "category": category })),
        Err(e) => anyhow_err(&req.id, &e, "db_insert_failed"),
    }
}

fn handle_categories_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parsed = tenant_id(conn, req)
        .and_then(|t| Ok((t, required_str(req, "categoryId")?, parse_patch(req)?)));
    let (tenant, category_id, patch) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    if patch.is_empty() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }
    match registry::update_category(conn, &tenant, &category_id, &patch) {
        Ok(category) => ok(&req.id, json!({ "category": category })),
        Err(e) => anyhow_err(&req.id, &e, "db_update_failed"),
    }
}

fn handle_categories_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parsed = tenant_id(conn, req).and_then(|t| Ok((t, required_str(req, "categoryId")?)));
    let (tenant, category_id) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match registry::delete_category(conn, &tenant, &category_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true, "categoryId": category_id })),
        Err(e) => anyhow_err(&req.id, &e, "db_delete_failed"),
    }
}

fn handle_categories_seed_defaults(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let tenant = match tenant_id(conn, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    match registry::seed_defaults(conn, &tenant) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "seeded": outcome.seeded,
                "tenantId": tenant,
                "categories": outcome.categories,
            }),
        ),
        Err(e) => anyhow_err(&req.id, &e, "db_insert_failed"),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "categories.list" => Some(handle_categories_list(state, req)),
        "categories.create" => Some(handle_categories_create(state, req)),
        "categories.update" => Some(handle_categories_update(state, req)),
        "categories.delete" => Some(handle_categories_delete(state, req)),
        "categories.seedDefaults" => Some(handle_categories_seed_defaults(state, req)),
        _ => None,
    }
}
