use crate::grades::{self, GradeFilter, GradePatch, NewGradeEntry};
use crate::ipc::error::{anyhow_err, err, grade_err, ok};
use crate::ipc::helpers::{
    db_conn, load_scale, optional_f64, optional_str, required_f64, required_str, tenant_id,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const IDENTITY_FIELDS: [&str; 5] = ["studentId", "examId", "subjectId", "classId", "academicYear"];

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parsed = tenant_id(conn, req).and_then(|t| {
        Ok((
            t,
            required_str(req, "name")?,
            required_str(req, "academicYear")?,
            optional_str(req, "examDate")?,
        ))
    });
    let (tenant, name, academic_year, exam_date) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match grades::create_exam(conn, &tenant, &name, &academic_year, exam_date.as_deref()) {
        Ok(exam) => ok(&req.id, json!({ "exam": exam })),
        Err(e) => anyhow_err(&req.id, &e, "db_insert_failed"),
    }
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "exams": [] }));
    };
    let parsed = tenant_id(conn, req).and_then(|t| Ok((t, optional_str(req, "academicYear")?)));
    let (tenant, academic_year) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match grades::list_exams(conn, &tenant, academic_year.as_deref()) {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => anyhow_err(&req.id, &e, "db_query_failed"),
    }
}

fn handle_grades_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parsed = tenant_id(conn, req).and_then(|t| {
        let new = NewGradeEntry {
            student_id: required_str(req, "studentId")?,
            exam_id: required_str(req, "examId")?,
            subject_id: required_str(req, "subjectId")?,
            class_id: required_str(req, "classId")?,
            academic_year: optional_str(req, "academicYear")?.filter(|s| !s.is_empty()),
            marks_obtained: required_f64(req, "marksObtained")?,
            max_marks: required_f64(req, "maxMarks")?,
            remarks: optional_str(req, "remarks")?,
        };
        let scale = load_scale(conn, req, &t)?;
        Ok((t, new, scale))
    });
    let (tenant, new, scale) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };

    let entry = match grades::record_grade(conn, &tenant, new, &scale) {
        Ok(v) => v,
        Err(e) => return anyhow_err(&req.id, &e, "db_insert_failed"),
    };
    match entry.grade(&scale) {
        Ok(grade) => ok(&req.id, json!({ "grade": entry, "computed": grade })),
        Err(e) => grade_err(&req.id, &e),
    }
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Some(field) = IDENTITY_FIELDS.iter().find(|f| req.param(f).is_some()) {
        return err(
            &req.id,
            "bad_params",
            format!("{} cannot change after a grade is recorded", field),
            Some(json!({ "field": field })),
        );
    }
    let parsed = tenant_id(conn, req).and_then(|t| {
        let patch = GradePatch {
            marks_obtained: optional_f64(req, "marksObtained")?,
            max_marks: optional_f64(req, "maxMarks")?,
            // Present-but-null clears the remark.
            remarks: match req.params.get("remarks") {
                Some(_) => Some(optional_str(req, "remarks")?),
                None => None,
            },
        };
        let scale = load_scale(conn, req, &t)?;
        Ok((t, required_str(req, "gradeId")?, patch, scale))
    });
    let (tenant, grade_id, patch, scale) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    if patch == GradePatch::default() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    let entry = match grades::update_grade(conn, &tenant, &grade_id, patch, &scale) {
        Ok(v) => v,
        Err(e) => return anyhow_err(&req.id, &e, "db_update_failed"),
    };
    match entry.grade(&scale) {
        Ok(grade) => ok(&req.id, json!({ "grade": entry, "computed": grade })),
        Err(e) => grade_err(&req.id, &e),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parsed = tenant_id(conn, req).and_then(|t| Ok((t, required_str(req, "gradeId")?)));
    let (tenant, grade_id) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match grades::delete_grade(conn, &tenant, &grade_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true, "gradeId": grade_id })),
        Err(e) => anyhow_err(&req.id, &e, "db_delete_failed"),
    }
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "grades": [] }));
    };
    let parsed = tenant_id(conn, req).and_then(|t| {
        let filter = GradeFilter {
            student_id: optional_str(req, "studentId")?,
            exam_id: optional_str(req, "examId")?,
            class_id: optional_str(req, "classId")?,
            academic_year: optional_str(req, "academicYear")?,
        };
        Ok((t, filter))
    });
    let (tenant, filter) = match parsed {
        Ok(v) => v,
        Err(e) => return e,
    };
    match grades::list_grades(conn, &tenant, &filter) {
        Ok(rows) => ok(&req.id, json!({ "grades": rows })),
        Err(e) => anyhow_err(&req.id, &e, "db_query_failed"),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        "grades.record" => Some(handle_grades_record(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        _ => None,
    }
}
