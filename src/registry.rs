//! Tenant-scoped grade band storage.
//!
//! Every mutation re-validates the band against the tenant's current set inside
//! one transaction, so readers only ever observe a complete band set.

use crate::calc::{self, GradeCategory};
use crate::db::now_rfc3339;
use crate::error::{GradeError, StoreError};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDraft {
    pub name: String,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub grade_point: f64,
    pub is_passing: bool,
    pub order: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub min_percentage: Option<f64>,
    pub max_percentage: Option<f64>,
    pub grade_point: Option<f64>,
    pub is_passing: Option<bool>,
    pub order: Option<i64>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        *self == CategoryPatch::default()
    }

    fn apply(&self, current: &GradeCategory) -> GradeCategory {
        GradeCategory {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            min_percentage: self.min_percentage.unwrap_or(current.min_percentage),
            max_percentage: self.max_percentage.unwrap_or(current.max_percentage),
            grade_point: self.grade_point.unwrap_or(current.grade_point),
            is_passing: self.is_passing.unwrap_or(current.is_passing),
            order: self.order.unwrap_or(current.order),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedOutcome {
    pub seeded: bool,
    pub categories: Vec<GradeCategory>,
}

fn category_from_row(r: &Row<'_>) -> rusqlite::Result<GradeCategory> {
    Ok(GradeCategory {
        id: r.get(0)?,
        name: r.get(1)?,
        min_percentage: r.get(2)?,
        max_percentage: r.get(3)?,
        grade_point: r.get(4)?,
        is_passing: r.get::<_, i64>(5)? != 0,
        order: r.get(6)?,
    })
}

/// Highest-ranked band first.
pub fn list_categories(conn: &Connection, tenant_id: &str) -> anyhow::Result<Vec<GradeCategory>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, min_percentage, max_percentage, grade_point, is_passing, sort_order
         FROM grade_categories
         WHERE tenant_id = ?
         ORDER BY sort_order DESC, min_percentage DESC, id",
    )?;
    let rows = stmt
        .query_map([tenant_id], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn get_category(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<GradeCategory> {
    let row = conn
        .query_row(
            "SELECT id, name, min_percentage, max_percentage, grade_point, is_passing, sort_order
             FROM grade_categories
             WHERE tenant_id = ? AND id = ?",
            (tenant_id, id),
            category_from_row,
        )
        .optional()?;
    row.ok_or_else(|| {
        StoreError::NotFound {
            what: "category",
            id: id.to_string(),
        }
        .into()
    })
}

fn insert_category(conn: &Connection, tenant_id: &str, c: &GradeCategory) -> anyhow::Result<()> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO grade_categories(
            id, tenant_id, name, min_percentage, max_percentage,
            grade_point, is_passing, sort_order, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &c.id,
            tenant_id,
            &c.name,
            c.min_percentage,
            c.max_percentage,
            c.grade_point,
            c.is_passing as i64,
            c.order,
            &now,
            &now,
        ),
    )?;
    Ok(())
}

/// `(marks_obtained, max_marks)` of every recorded entry for the tenant.
fn tenant_marks(conn: &Connection, tenant_id: &str) -> anyhow::Result<Vec<(f64, f64)>> {
    let mut stmt =
        conn.prepare("SELECT marks_obtained, max_marks FROM grade_entries WHERE tenant_id = ?")?;
    let marks = stmt
        .query_map([tenant_id], |r| Ok((r.get::<_, f64>(0)?, r.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(marks)
}

pub fn create_category(
    conn: &Connection,
    tenant_id: &str,
    draft: CategoryDraft,
) -> anyhow::Result<GradeCategory> {
    let candidate = GradeCategory {
        id: Uuid::new_v4().to_string(),
        name: draft.name.trim().to_string(),
        min_percentage: draft.min_percentage,
        max_percentage: draft.max_percentage,
        grade_point: draft.grade_point,
        is_passing: draft.is_passing,
        order: draft.order,
    };

    let tx = conn.unchecked_transaction()?;
    let existing = list_categories(&tx, tenant_id)?;
    if let Err(e) = calc::check_band_against(&candidate, &existing) {
        warn!(tenant_id, name = %candidate.name, error = %e, "category create rejected");
        return Err(e.into());
    }
    insert_category(&tx, tenant_id, &candidate)?;
    tx.commit()?;

    info!(tenant_id, id = %candidate.id, name = %candidate.name, "category created");
    Ok(candidate)
}

pub fn update_category(
    conn: &Connection,
    tenant_id: &str,
    id: &str,
    patch: &CategoryPatch,
) -> anyhow::Result<GradeCategory> {
    let tx = conn.unchecked_transaction()?;
    let current = get_category(&tx, tenant_id, id)?;
    let mut next = patch.apply(&current);
    next.name = next.name.trim().to_string();

    let existing = list_categories(&tx, tenant_id)?;
    if let Err(e) = calc::check_band_against(&next, &existing) {
        warn!(tenant_id, id, error = %e, "category update rejected");
        return Err(e.into());
    }

    // Recorded marks must still resolve once the band moves.
    let proposed: Vec<GradeCategory> = existing
        .into_iter()
        .map(|c| if c.id == next.id { next.clone() } else { c })
        .collect();
    let orphaned = tenant_marks(&tx, tenant_id)?
        .iter()
        .filter(|(obtained, max)| calc::compute_subject_grade(*obtained, *max, &proposed).is_err())
        .count();
    if orphaned > 0 {
        warn!(tenant_id, id, entries = orphaned, "category update would orphan recorded marks");
        return Err(GradeError::CategoryInUse {
            category: current.name,
            entries: orphaned,
        }
        .into());
    }

    tx.execute(
        "UPDATE grade_categories
         SET name = ?, min_percentage = ?, max_percentage = ?, grade_point = ?,
             is_passing = ?, sort_order = ?, updated_at = ?
         WHERE tenant_id = ? AND id = ?",
        (
            &next.name,
            next.min_percentage,
            next.max_percentage,
            next.grade_point,
            next.is_passing as i64,
            next.order,
            now_rfc3339(),
            tenant_id,
            id,
        ),
    )?;
    tx.commit()?;

    info!(tenant_id, id, name = %next.name, "category updated");
    Ok(next)
}

/// Deletes a band unless a recorded mark currently resolves to it.
///
/// Grade labels are always recomputed from the live scale, so removing a band
/// that is still in use would silently regrade (or orphan) those marks.
pub fn delete_category(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let target = get_category(&tx, tenant_id, id)?;
    let categories = list_categories(&tx, tenant_id)?;

    let in_use = tenant_marks(&tx, tenant_id)?
        .iter()
        .filter_map(|(obtained, max)| calc::compute_subject_grade(*obtained, *max, &categories).ok())
        .filter(|g| g.category.id == target.id)
        .count();
    if in_use > 0 {
        warn!(tenant_id, id, entries = in_use, "category delete blocked");
        return Err(GradeError::CategoryInUse {
            category: target.name,
            entries: in_use,
        }
        .into());
    }

    tx.execute(
        "DELETE FROM grade_categories WHERE tenant_id = ? AND id = ?",
        (tenant_id, id),
    )?;
    tx.commit()?;

    info!(tenant_id, id, name = %target.name, "category deleted");
    Ok(())
}

/// Installs the default A+..F scale when the tenant has no bands yet.
pub fn seed_defaults(conn: &Connection, tenant_id: &str) -> anyhow::Result<SeedOutcome> {
    let tx = conn.unchecked_transaction()?;
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM grade_categories WHERE tenant_id = ?",
        [tenant_id],
        |r| r.get(0),
    )?;
    if count > 0 {
        drop(tx);
        info!(tenant_id, existing = count, "seed skipped; categories already configured");
        return Ok(SeedOutcome {
            seeded: false,
            categories: list_categories(conn, tenant_id)?,
        });
    }

    for mut c in calc::default_scale() {
        c.id = Uuid::new_v4().to_string();
        insert_category(&tx, tenant_id, &c)?;
    }
    let categories = list_categories(&tx, tenant_id)?;
    tx.commit()?;

    info!(tenant_id, count = categories.len(), "default grade scale seeded");
    Ok(SeedOutcome {
        seeded: true,
        categories,
    })
}
