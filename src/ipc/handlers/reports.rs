use crate::calc::{self, ExamResult, ExamSummary, GradeCategory};
use crate::grades::{self, GradeEntry, GradeFilter};
use crate::ipc::error::{anyhow_err, grade_err, ok};
use crate::ipc::helpers::{db_conn, load_scale, load_setup, required_str, tenant_id};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeMap;

struct ReportScope<'a> {
    conn: &'a Connection,
    tenant: String,
    categories: Vec<GradeCategory>,
    decimals: u32,
}

fn report_scope<'a>(state: &'a AppState, req: &Request) -> Result<ReportScope<'a>, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let tenant = tenant_id(conn, req)?;
    let categories = load_scale(conn, req, &tenant)?;
    let decimals = load_setup(conn, req)?.display_decimals;
    Ok(ReportScope {
        conn,
        tenant,
        categories,
        decimals,
    })
}

fn fetch_entries(
    scope: &ReportScope<'_>,
    req: &Request,
    filter: GradeFilter,
) -> Result<Vec<GradeEntry>, serde_json::Value> {
    grades::list_grades(scope.conn, &scope.tenant, &filter)
        .map_err(|e| anyhow_err(&req.id, &e, "db_query_failed"))
}

/// Recomputes one (student, exam) summary from the given rows and the live scale.
fn summarize_rows(
    scope: &ReportScope<'_>,
    req: &Request,
    exam_id: &str,
    rows: &[GradeEntry],
) -> Result<ExamSummary, serde_json::Value> {
    let subject_grades = rows
        .iter()
        .map(|r| r.grade(&scope.categories))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| grade_err(&req.id, &e))?;
    let summary =
        calc::summarize_exam(&subject_grades, &scope.categories).map_err(|e| grade_err(&req.id, &e))?;
    let exam = grades::get_exam(scope.conn, &scope.tenant, exam_id)
        .map_err(|e| anyhow_err(&req.id, &e, "db_query_failed"))?;
    let (name, date) = match exam {
        Some(e) => (Some(e.name), e.exam_date),
        None => (None, None),
    };
    Ok(summary.with_exam(exam_id, name, date))
}

fn exam_summary(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let scope = report_scope(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let exam_id = required_str(req, "examId")?;
    let rows = fetch_entries(
        &scope,
        req,
        GradeFilter {
            student_id: Some(student_id.clone()),
            exam_id: Some(exam_id.clone()),
            ..Default::default()
        },
    )?;
    let summary = summarize_rows(&scope, req, &exam_id, &rows)?;
    Ok(ok(
        &req.id,
        json!({
            "studentId": student_id,
            "examId": exam_id,
            "summary": summary.rounded(scope.decimals),
        }),
    ))
}

fn report_card(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let scope = report_scope(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let academic_year = required_str(req, "academicYear")?;
    let rows = fetch_entries(
        &scope,
        req,
        GradeFilter {
            student_id: Some(student_id.clone()),
            academic_year: Some(academic_year.clone()),
            ..Default::default()
        },
    )?;

    let mut by_exam: BTreeMap<String, Vec<GradeEntry>> = BTreeMap::new();
    for r in rows {
        by_exam.entry(r.exam_id.clone()).or_default().push(r);
    }
    let mut summaries = Vec::with_capacity(by_exam.len());
    for (exam_id, exam_rows) in &by_exam {
        summaries.push(summarize_rows(&scope, req, exam_id, exam_rows)?);
    }

    let card = calc::build_report_card(&summaries);
    Ok(ok(
        &req.id,
        json!({
            "studentId": student_id,
            "academicYear": academic_year,
            "reportCard": card.rounded(scope.decimals),
        }),
    ))
}

/// Competition ranking (1, 1, 3) by overall percentage; ties list by student id.
fn rank_students(results: &mut [(String, ExamSummary)]) -> Vec<usize> {
    results.sort_by(|a, b| {
        b.1.overall_percentage
            .partial_cmp(&a.1.overall_percentage)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    let mut ranks = Vec::with_capacity(results.len());
    for i in 0..results.len() {
        let rank = if i > 0 && results[i].1.overall_percentage == results[i - 1].1.overall_percentage {
            ranks[i - 1]
        } else {
            i + 1
        };
        ranks.push(rank);
    }
    ranks
}

fn exam_class_results(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let scope = report_scope(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let class_id = required_str(req, "classId")?;
    let rows = fetch_entries(
        &scope,
        req,
        GradeFilter {
            exam_id: Some(exam_id.clone()),
            class_id: Some(class_id.clone()),
            ..Default::default()
        },
    )?;

    let mut by_student: BTreeMap<String, Vec<GradeEntry>> = BTreeMap::new();
    for r in rows {
        by_student.entry(r.student_id.clone()).or_default().push(r);
    }
    let mut results = Vec::with_capacity(by_student.len());
    for (student_id, student_rows) in by_student {
        let summary = summarize_rows(&scope, req, &exam_id, &student_rows)?;
        results.push((student_id, summary));
    }

    let ranks = rank_students(&mut results);
    let student_count = results.len();
    let pass_count = results
        .iter()
        .filter(|(_, s)| s.result == Some(ExamResult::Pass))
        .count();
    let class_average = if student_count > 0 {
        results.iter().map(|(_, s)| s.overall_percentage).sum::<f64>() / (student_count as f64)
    } else {
        0.0
    };

    let students: Vec<serde_json::Value> = results
        .iter()
        .zip(ranks)
        .map(|((student_id, summary), rank)| {
            json!({
                "rank": rank,
                "studentId": student_id,
                "summary": summary.rounded(scope.decimals),
            })
        })
        .collect();

    Ok(ok(
        &req.id,
        json!({
            "examId": exam_id,
            "classId": class_id,
            "studentCount": student_count,
            "passCount": pass_count,
            "classAveragePercentage": calc::round_off(class_average, scope.decimals),
            "students": students,
        }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.examSummary" => Some(exam_summary(state, req).unwrap_or_else(|e| e)),
        "reports.reportCard" => Some(report_card(state, req).unwrap_or_else(|e| e)),
        "reports.examClassResults" => Some(exam_class_results(state, req).unwrap_or_else(|e| e)),
        _ => None,
    }
}
