use serde_json::json;
use thiserror::Error;

/// Validation failures raised by the grading engine and the category registry.
///
/// These are never coerced into a default grade: callers surface them as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("max marks must be greater than zero (got {max_marks})")]
    InvalidMaxMarks { max_marks: f64 },

    #[error("marks obtained {marks_obtained} outside 0..={max_marks}")]
    InvalidMarks { marks_obtained: f64, max_marks: f64 },

    #[error("percentage {percentage} outside 0..=100")]
    InvalidPercentage { percentage: f64 },

    #[error("invalid band {name}: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("band {name} overlaps existing category {conflicting}")]
    OverlappingRange {
        name: String,
        conflicting: String,
        conflicting_id: String,
    },

    #[error("no grade category covers {percentage}%")]
    NoMatchingCategory { percentage: f64 },

    #[error("category {category} is the resolved grade of {entries} recorded mark(s)")]
    CategoryInUse { category: String, entries: usize },
}

impl GradeError {
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::InvalidMaxMarks { .. } => "invalid_max_marks",
            GradeError::InvalidMarks { .. } => "invalid_marks",
            GradeError::InvalidPercentage { .. } => "invalid_percentage",
            GradeError::InvalidRange { .. } => "invalid_range",
            GradeError::OverlappingRange { .. } => "overlapping_range",
            GradeError::NoMatchingCategory { .. } => "no_matching_category",
            GradeError::CategoryInUse { .. } => "category_in_use",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            GradeError::InvalidMaxMarks { max_marks } => json!({ "maxMarks": max_marks }),
            GradeError::InvalidMarks {
                marks_obtained,
                max_marks,
            } => json!({ "marksObtained": marks_obtained, "maxMarks": max_marks }),
            GradeError::InvalidPercentage { percentage }
            | GradeError::NoMatchingCategory { percentage } => {
                json!({ "percentage": percentage })
            }
            GradeError::InvalidRange { name, reason } => json!({ "name": name, "reason": reason }),
            GradeError::OverlappingRange {
                name,
                conflicting,
                conflicting_id,
            } => json!({
                "name": name,
                "conflicting": conflicting,
                "conflictingId": conflicting_id,
            }),
            GradeError::CategoryInUse { category, entries } => {
                json!({ "category": category, "entries": entries })
            }
        }
    }
}

/// Storage-level conditions that are not engine validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: &'static str, id: String },

    #[error("a grade is already recorded for student {student_id}, exam {exam_id}, subject {subject_id}")]
    DuplicateGrade {
        student_id: String,
        exam_id: String,
        subject_id: String,
        existing_id: String,
    },

    #[error("{0}")]
    BadInput(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::DuplicateGrade { .. } => "duplicate_grade",
            StoreError::BadInput(_) => "bad_params",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            StoreError::NotFound { id, .. } => Some(json!({ "id": id })),
            StoreError::DuplicateGrade { existing_id, .. } => {
                Some(json!({ "existingGradeId": existing_id }))
            }
            StoreError::BadInput(_) => None,
        }
    }
}
