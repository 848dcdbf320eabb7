//! The four pure engine operations, callable with explicit inputs.
//!
//! `categories` may be passed inline; when omitted the tenant's stored scale is
//! used, which needs an open workspace. Results are returned at full precision.

use crate::calc::{self, ExamSummary, GradeCategory, SubjectGradeResult};
use crate::ipc::error::{err, grade_err, ok};
use crate::ipc::helpers::{db_conn, load_scale, parse_param, required_f64, tenant_id};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn categories_for(state: &AppState, req: &Request) -> Result<Vec<GradeCategory>, serde_json::Value> {
    if let Some(inline) = parse_param::<Vec<GradeCategory>>(req, "categories")? {
        return Ok(inline);
    }
    let conn = db_conn(state, req)?;
    let tenant = tenant_id(conn, req)?;
    load_scale(conn, req, &tenant)
}

fn handle_resolve_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let parsed = required_f64(req, "percentage").and_then(|p| Ok((p, categories_for(state, req)?)));
    let (percentage, categories) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match calc::resolve_category(percentage, &categories) {
        Ok(category) => ok(&req.id, json!({ "category": category })),
        Err(e) => grade_err(&req.id, &e),
    }
}

fn handle_subject_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let parsed = required_f64(req, "marksObtained").and_then(|m| {
        Ok((
            m,
            required_f64(req, "maxMarks")?,
            categories_for(state, req)?,
        ))
    });
    let (marks_obtained, max_marks, categories) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match calc::compute_subject_grade(marks_obtained, max_marks, &categories) {
        Ok(grade) => ok(&req.id, json!({ "subjectGrade": grade })),
        Err(e) => grade_err(&req.id, &e),
    }
}

fn handle_summarize_exam(state: &mut AppState, req: &Request) -> serde_json::Value {
    let subject_grades = match parse_param::<Vec<SubjectGradeResult>>(req, "subjectGrades") {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", "missing subjectGrades", None),
        Err(e) => return e,
    };
    // An empty exam never reaches the resolver, so it needs no scale.
    let categories = if subject_grades.is_empty() {
        Vec::new()
    } else {
        match categories_for(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        }
    };
    match calc::summarize_exam(&subject_grades, &categories) {
        Ok(summary) => ok(&req.id, json!({ "summary": summary })),
        Err(e) => grade_err(&req.id, &e),
    }
}

fn handle_report_card(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match parse_param::<Vec<ExamSummary>>(req, "examSummaries") {
        Ok(Some(summaries)) => ok(
            &req.id,
            json!({ "reportCard": calc::build_report_card(&summaries) }),
        ),
        Ok(None) => err(&req.id, "bad_params", "missing examSummaries", None),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.resolveCategory" => Some(handle_resolve_category(state, req)),
        "calc.subjectGrade" => Some(handle_subject_grade(state, req)),
        "calc.summarizeExam" => Some(handle_summarize_exam(state, req)),
        "calc.reportCard" => Some(handle_report_card(state, req)),
        _ => None,
    }
}
