use crate::error::GradeError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Half-up rounding to `decimals` places, VB6 style:
/// `Int(10^d * x + 0.5) / 10^d`.
///
/// Only used when presenting values; aggregation always runs on full precision.
pub fn round_off(x: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    ((scale * x) + 0.5).floor() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCategory {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub grade_point: f64,
    pub is_passing: bool,
    /// Resolution priority; increases with rank (F lowest, A+ highest).
    pub order: i64,
}

impl GradeCategory {
    pub fn contains(&self, percentage: f64) -> bool {
        self.min_percentage <= percentage && percentage <= self.max_percentage
    }

    /// True interval overlap. Bands that only touch at a shared boundary do not overlap.
    pub fn overlaps(&self, other: &GradeCategory) -> bool {
        self.min_percentage < other.max_percentage && other.min_percentage < self.max_percentage
    }
}

/// Canonical A+..F scale used by `categories.seedDefaults`.
///
/// Adjacent bands share their boundary so fractional percentages (89.5) never
/// fall into a gap; the shared point goes to the higher band via `order`.
/// Bands therefore report `maxPercentage: 90` for A where a printed scale says
/// 80-89. Whole-number percentages get the same letter under both readings.
pub fn default_scale() -> Vec<GradeCategory> {
    let rows: [(&str, f64, f64, f64, bool, i64); 7] = [
        ("A+", 90.0, 100.0, 4.3, true, 7),
        ("A", 80.0, 90.0, 4.0, true, 6),
        ("B+", 70.0, 80.0, 3.3, true, 5),
        ("B", 60.0, 70.0, 3.0, true, 4),
        ("C", 50.0, 60.0, 2.0, true, 3),
        ("D", 40.0, 50.0, 1.0, true, 2),
        ("F", 0.0, 40.0, 0.0, false, 1),
    ];
    rows.iter()
        .map(|(name, min, max, gp, passing, order)| GradeCategory {
            id: String::new(),
            name: name.to_string(),
            min_percentage: *min,
            max_percentage: *max,
            grade_point: *gp,
            is_passing: *passing,
            order: *order,
        })
        .collect()
}

/// Checks the band's own bounds: `0 <= min <= max <= 100`, non-negative grade point.
pub fn validate_band(band: &GradeCategory) -> Result<(), GradeError> {
    let invalid = |reason: &str| GradeError::InvalidRange {
        name: band.name.clone(),
        reason: reason.to_string(),
    };
    if band.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if !band.min_percentage.is_finite() || !band.max_percentage.is_finite() {
        return Err(invalid("bounds must be finite numbers"));
    }
    if band.min_percentage < 0.0 || band.max_percentage > 100.0 {
        return Err(invalid("bounds must lie within 0..=100"));
    }
    if band.min_percentage > band.max_percentage {
        return Err(invalid("minPercentage must not exceed maxPercentage"));
    }
    if !band.grade_point.is_finite() || band.grade_point < 0.0 {
        return Err(invalid("gradePoint must be a non-negative number"));
    }
    Ok(())
}

/// Validates `band` and rejects it if it truly overlaps any *other* category
/// (matched by id) in `existing`.
pub fn check_band_against(band: &GradeCategory, existing: &[GradeCategory]) -> Result<(), GradeError> {
    validate_band(band)?;
    let conflict = existing
        .iter()
        .filter(|c| band.id.is_empty() || c.id != band.id)
        .find(|c| band.overlaps(c));
    if let Some(c) = conflict {
        return Err(GradeError::OverlappingRange {
            name: band.name.clone(),
            conflicting: c.name.clone(),
            conflicting_id: c.id.clone(),
        });
    }
    Ok(())
}

fn rank_cmp(a: &GradeCategory, b: &GradeCategory) -> Ordering {
    a.order.cmp(&b.order).then_with(|| {
        a.min_percentage
            .partial_cmp(&b.min_percentage)
            .unwrap_or(Ordering::Equal)
    })
}

/// Maps a percentage onto the configured band set.
///
/// When several bands contain `percentage` (a shared boundary), the highest
/// `order` wins, then the greater `min_percentage`.
pub fn resolve_category(
    percentage: f64,
    categories: &[GradeCategory],
) -> Result<&GradeCategory, GradeError> {
    if !(0.0..=100.0).contains(&percentage) {
        return Err(GradeError::InvalidPercentage { percentage });
    }
    categories
        .iter()
        .filter(|c| c.contains(percentage))
        .max_by(|a, b| rank_cmp(a, b))
        .ok_or(GradeError::NoMatchingCategory { percentage })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGradeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub percentage: f64,
    pub category: GradeCategory,
    pub grade_point: f64,
    pub passed: bool,
}

pub fn compute_subject_grade(
    marks_obtained: f64,
    max_marks: f64,
    categories: &[GradeCategory],
) -> Result<SubjectGradeResult, GradeError> {
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(GradeError::InvalidMaxMarks { max_marks });
    }
    if !marks_obtained.is_finite() || marks_obtained < 0.0 || marks_obtained > max_marks {
        return Err(GradeError::InvalidMarks {
            marks_obtained,
            max_marks,
        });
    }

    // Divide first: x / x is exactly 1.0, so full marks land on 100.0.
    let percentage = marks_obtained / max_marks * 100.0;
    let category = resolve_category(percentage, categories)?.clone();
    Ok(SubjectGradeResult {
        subject_id: None,
        marks_obtained,
        max_marks,
        percentage,
        grade_point: category.grade_point,
        passed: category.is_passing,
        category,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_date: Option<String>,
    #[serde(default)]
    pub subjects: Vec<SubjectGradeResult>,
    pub total_marks_obtained: f64,
    pub total_max_marks: f64,
    pub overall_percentage: f64,
    pub overall_grade: Option<GradeCategory>,
    pub gpa: f64,
    /// `None` only when there is nothing to judge (`insufficient_data`).
    pub result: Option<ExamResult>,
    #[serde(default)]
    pub insufficient_data: bool,
}

impl ExamSummary {
    fn insufficient(subjects: Vec<SubjectGradeResult>) -> Self {
        Self {
            exam_id: None,
            exam_name: None,
            exam_date: None,
            total_marks_obtained: subjects.iter().map(|s| s.marks_obtained).sum(),
            total_max_marks: 0.0,
            subjects,
            overall_percentage: 0.0,
            overall_grade: None,
            gpa: 0.0,
            result: None,
            insufficient_data: true,
        }
    }

    pub fn with_exam(mut self, id: &str, name: Option<String>, date: Option<String>) -> Self {
        self.exam_id = Some(id.to_string());
        self.exam_name = name;
        self.exam_date = date;
        self
    }

    pub fn rounded(&self, decimals: u32) -> Self {
        let mut out = self.clone();
        out.overall_percentage = round_off(out.overall_percentage, decimals);
        out.gpa = round_off(out.gpa, decimals);
        for s in &mut out.subjects {
            s.percentage = round_off(s.percentage, decimals);
        }
        out
    }
}

/// Rolls one student's subject grades for one exam into a summary.
///
/// The overall percentage is marks-weighted; GPA is the unweighted mean of
/// subject grade points. A single failed subject fails the exam.
pub fn summarize_exam(
    subject_grades: &[SubjectGradeResult],
    categories: &[GradeCategory],
) -> Result<ExamSummary, GradeError> {
    let total_marks_obtained: f64 = subject_grades.iter().map(|s| s.marks_obtained).sum();
    let total_max_marks: f64 = subject_grades.iter().map(|s| s.max_marks).sum();
    if subject_grades.is_empty() || total_max_marks <= 0.0 {
        return Ok(ExamSummary::insufficient(subject_grades.to_vec()));
    }

    let overall_percentage = total_marks_obtained / total_max_marks * 100.0;
    let overall_grade = resolve_category(overall_percentage, categories)?.clone();
    let gpa = subject_grades.iter().map(|s| s.grade_point).sum::<f64>()
        / (subject_grades.len() as f64);

    let all_subjects_passed = subject_grades.iter().all(|s| s.passed);
    let result = if all_subjects_passed && overall_grade.is_passing {
        ExamResult::Pass
    } else {
        ExamResult::Fail
    };

    Ok(ExamSummary {
        exam_id: None,
        exam_name: None,
        exam_date: None,
        subjects: subject_grades.to_vec(),
        total_marks_obtained,
        total_max_marks,
        overall_percentage,
        overall_grade: Some(overall_grade),
        gpa,
        result: Some(result),
        insufficient_data: false,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub exams: Vec<ExamSummary>,
    pub exam_count: usize,
    pub cumulative_gpa: f64,
    pub cumulative_percentage: f64,
    pub overall_result: Option<ExamResult>,
    pub insufficient_data: bool,
}

impl ReportCard {
    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            exams: self.exams.iter().map(|e| e.rounded(decimals)).collect(),
            exam_count: self.exam_count,
            cumulative_gpa: round_off(self.cumulative_gpa, decimals),
            cumulative_percentage: round_off(self.cumulative_percentage, decimals),
            overall_result: self.overall_result,
            insufficient_data: self.insufficient_data,
        }
    }
}

// Dated exams first (ISO dates sort lexically), then by id.
fn exam_order(a: &ExamSummary, b: &ExamSummary) -> Ordering {
    match (&a.exam_date, &b.exam_date) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.exam_id.cmp(&b.exam_id))
}

/// Builds the cumulative view across a year's exam summaries.
///
/// Every judged exam counts equally. Summaries flagged `insufficient_data`
/// stay in the breakdown but take no part in the means or the result.
pub fn build_report_card(exam_summaries: &[ExamSummary]) -> ReportCard {
    let mut exams = exam_summaries.to_vec();
    exams.sort_by(exam_order);

    let judged: Vec<&ExamSummary> = exams.iter().filter(|e| !e.insufficient_data).collect();
    if judged.is_empty() {
        return ReportCard {
            exam_count: exams.len(),
            exams,
            cumulative_gpa: 0.0,
            cumulative_percentage: 0.0,
            overall_result: None,
            insufficient_data: true,
        };
    }

    let n = judged.len() as f64;
    let cumulative_gpa = judged.iter().map(|e| e.gpa).sum::<f64>() / n;
    let cumulative_percentage = judged.iter().map(|e| e.overall_percentage).sum::<f64>() / n;
    let overall_result = if judged.iter().all(|e| e.result == Some(ExamResult::Pass)) {
        ExamResult::Pass
    } else {
        ExamResult::Fail
    };

    ReportCard {
        exam_count: exams.len(),
        exams,
        cumulative_gpa,
        cumulative_percentage,
        overall_result: Some(overall_result),
        insufficient_data: false,
    }
}
