use crate::calc::{self, GradeCategory, SubjectGradeResult};
use crate::db::now_rfc3339;
use crate::error::{GradeError, StoreError};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub academic_year: String,
    pub exam_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub academic_year: String,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub remarks: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl GradeEntry {
    /// Resolves this entry against the current band set.
    pub fn grade(&self, categories: &[GradeCategory]) -> Result<SubjectGradeResult, GradeError> {
        let mut g = calc::compute_subject_grade(self.marks_obtained, self.max_marks, categories)?;
        g.subject_id = Some(self.subject_id.clone());
        Ok(g)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGradeEntry {
    pub student_id: String,
    pub exam_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub academic_year: Option<String>,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradePatch {
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
    /// `Some(None)` clears the remark.
    pub remarks: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeFilter {
    pub student_id: Option<String>,
    pub exam_id: Option<String>,
    pub class_id: Option<String>,
    pub academic_year: Option<String>,
}

pub fn create_exam(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    academic_year: &str,
    exam_date: Option<&str>,
) -> anyhow::Result<Exam> {
    if let Some(d) = exam_date {
        if chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() {
            return Err(StoreError::BadInput("examDate must be YYYY-MM-DD".into()).into());
        }
    }
    let exam = Exam {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        academic_year: academic_year.to_string(),
        exam_date: exam_date.map(|d| d.to_string()),
    };
    conn.execute(
        "INSERT INTO exams(id, tenant_id, name, academic_year, exam_date) VALUES(?, ?, ?, ?, ?)",
        (&exam.id, tenant_id, &exam.name, &exam.academic_year, &exam.exam_date),
    )?;
    info!(tenant_id, id = %exam.id, "exam created");
    Ok(exam)
}

fn exam_from_row(r: &Row<'_>) -> rusqlite::Result<Exam> {
    Ok(Exam {
        id: r.get(0)?,
        name: r.get(1)?,
        academic_year: r.get(2)?,
        exam_date: r.get(3)?,
    })
}

pub fn get_exam(conn: &Connection, tenant_id: &str, exam_id: &str) -> anyhow::Result<Option<Exam>> {
    Ok(conn
        .query_row(
            "SELECT id, name, academic_year, exam_date FROM exams WHERE tenant_id = ? AND id = ?",
            (tenant_id, exam_id),
            exam_from_row,
        )
        .optional()?)
}

/// Exams ordered by date (undated last), then id.
pub fn list_exams(
    conn: &Connection,
    tenant_id: &str,
    academic_year: Option<&str>,
) -> anyhow::Result<Vec<Exam>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, academic_year, exam_date
         FROM exams
         WHERE tenant_id = ?1 AND (?2 IS NULL OR academic_year = ?2)
         ORDER BY exam_date IS NULL, exam_date, id",
    )?;
    let rows = stmt
        .query_map((tenant_id, academic_year), exam_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const ENTRY_COLUMNS: &str = "id, student_id, exam_id, subject_id, class_id, academic_year,
    marks_obtained, max_marks, remarks, created_at, updated_at";

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<GradeEntry> {
    Ok(GradeEntry {
        id: r.get(0)?,
        student_id: r.get(1)?,
        exam_id: r.get(2)?,
        subject_id: r.get(3)?,
        class_id: r.get(4)?,
        academic_year: r.get(5)?,
        marks_obtained: r.get(6)?,
        max_marks: r.get(7)?,
        remarks: r.get(8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

pub fn get_grade(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<GradeEntry> {
    let sql = format!(
        "SELECT {} FROM grade_entries WHERE tenant_id = ? AND id = ?",
        ENTRY_COLUMNS
    );
    conn.query_row(&sql, (tenant_id, id), entry_from_row)
        .optional()?
        .ok_or_else(|| {
            StoreError::NotFound {
                what: "grade",
                id: id.to_string(),
            }
            .into()
        })
}

pub fn list_grades(
    conn: &Connection,
    tenant_id: &str,
    filter: &GradeFilter,
) -> anyhow::Result<Vec<GradeEntry>> {
    let mut sql = format!(
        "SELECT {} FROM grade_entries WHERE tenant_id = ?",
        ENTRY_COLUMNS
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(tenant_id.to_string())];
    for (column, value) in [
        ("student_id", &filter.student_id),
        ("exam_id", &filter.exam_id),
        ("class_id", &filter.class_id),
        ("academic_year", &filter.academic_year),
    ] {
        if let Some(v) = value {
            sql.push_str(&format!(" AND {} = ?", column));
            bind_values.push(Value::Text(v.clone()));
        }
    }
    sql.push_str(" ORDER BY student_id, exam_id, subject_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records a mark for a (student, exam, subject) key.
///
/// The mark is validated against the current band set before it is stored, so
/// the engine's errors (bad bounds, a gap in the scale) surface here unchanged.
pub fn record_grade(
    conn: &Connection,
    tenant_id: &str,
    new: NewGradeEntry,
    categories: &[GradeCategory],
) -> anyhow::Result<GradeEntry> {
    calc::compute_subject_grade(new.marks_obtained, new.max_marks, categories)?;

    let exam = get_exam(conn, tenant_id, &new.exam_id)?;
    let academic_year = match (new.academic_year, exam) {
        (Some(y), Some(e)) if y != e.academic_year => {
            return Err(StoreError::BadInput(format!(
                "academicYear {} does not match exam year {}",
                y, e.academic_year
            ))
            .into());
        }
        (Some(y), _) => y,
        (None, Some(e)) => e.academic_year,
        (None, None) => {
            return Err(StoreError::BadInput(
                "academicYear is required for an exam that is not registered".into(),
            )
            .into())
        }
    };

    let tx = conn.unchecked_transaction()?;
    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM grade_entries
             WHERE tenant_id = ? AND student_id = ? AND exam_id = ? AND subject_id = ?",
            (tenant_id, &new.student_id, &new.exam_id, &new.subject_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing_id) = existing {
        return Err(StoreError::DuplicateGrade {
            student_id: new.student_id,
            exam_id: new.exam_id,
            subject_id: new.subject_id,
            existing_id,
        }
        .into());
    }

    let now = now_rfc3339();
    let entry = GradeEntry {
        id: Uuid::new_v4().to_string(),
        student_id: new.student_id,
        exam_id: new.exam_id,
        subject_id: new.subject_id,
        class_id: new.class_id,
        academic_year,
        marks_obtained: new.marks_obtained,
        max_marks: new.max_marks,
        remarks: new.remarks,
        created_at: now.clone(),
        updated_at: now,
    };
    tx.execute(
        "INSERT INTO grade_entries(
            id, tenant_id, student_id, exam_id, subject_id, class_id, academic_year,
            marks_obtained, max_marks, remarks, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.id,
            tenant_id,
            &entry.student_id,
            &entry.exam_id,
            &entry.subject_id,
            &entry.class_id,
            &entry.academic_year,
            entry.marks_obtained,
            entry.max_marks,
            &entry.remarks,
            &entry.created_at,
            &entry.updated_at,
        ),
    )?;
    tx.commit()?;

    info!(tenant_id, id = %entry.id, student_id = %entry.student_id, exam_id = %entry.exam_id, "grade recorded");
    Ok(entry)
}

pub fn update_grade(
    conn: &Connection,
    tenant_id: &str,
    id: &str,
    patch: GradePatch,
    categories: &[GradeCategory],
) -> anyhow::Result<GradeEntry> {
    let tx = conn.unchecked_transaction()?;
    let mut entry = get_grade(&tx, tenant_id, id)?;
    if let Some(v) = patch.marks_obtained {
        entry.marks_obtained = v;
    }
    if let Some(v) = patch.max_marks {
        entry.max_marks = v;
    }
    if let Some(v) = patch.remarks {
        entry.remarks = v;
    }
    calc::compute_subject_grade(entry.marks_obtained, entry.max_marks, categories)?;

    entry.updated_at = now_rfc3339();
    tx.execute(
        "UPDATE grade_entries
         SET marks_obtained = ?, max_marks = ?, remarks = ?, updated_at = ?
         WHERE tenant_id = ? AND id = ?",
        (
            entry.marks_obtained,
            entry.max_marks,
            &entry.remarks,
            &entry.updated_at,
            tenant_id,
            id,
        ),
    )?;
    tx.commit()?;

    info!(tenant_id, id, "grade updated");
    Ok(entry)
}

pub fn delete_grade(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<()> {
    let changed = conn.execute(
        "DELETE FROM grade_entries WHERE tenant_id = ? AND id = ?",
        (tenant_id, id),
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            what: "grade",
            id: id.to_string(),
        }
        .into());
    }
    info!(tenant_id, id, "grade deleted");
    Ok(())
}
