use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const GRADING_KEY: &str = "setup.grading";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingSetup {
    pub default_tenant_id: String,
    /// Presentation rounding for report output only.
    pub display_decimals: u32,
    pub auto_seed_defaults: bool,
}

impl Default for GradingSetup {
    fn default() -> Self {
        Self {
            default_tenant_id: "default".to_string(),
            display_decimals: 1,
            auto_seed_defaults: false,
        }
    }
}

/// Stored values merged over defaults; a workspace without settings gets defaults.
pub fn load(conn: &Connection) -> anyhow::Result<GradingSetup> {
    match db::settings_get_json(conn, GRADING_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(GradingSetup::default()),
    }
}

pub fn save(conn: &Connection, setup: &GradingSetup) -> anyhow::Result<()> {
    db::settings_set_json(conn, GRADING_KEY, &serde_json::to_value(setup)?)
}

pub fn apply_patch(current: &GradingSetup, patch: &Map<String, Value>) -> Result<GradingSetup, String> {
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "defaultTenantId" => {
                let s = v
                    .as_str()
                    .map(str::trim)
                    .ok_or_else(|| format!("{} must be string", k))?;
                if s.is_empty() || s.len() > 64 {
                    return Err(format!("{} must be 1..=64 characters", k));
                }
                next.default_tenant_id = s.to_string();
            }
            "displayDecimals" => {
                let n = v
                    .as_u64()
                    .ok_or_else(|| format!("{} must be integer", k))?;
                if n > 3 {
                    return Err(format!("{} must be in 0..=3", k));
                }
                next.display_decimals = n as u32;
            }
            "autoSeedDefaults" => {
                next.auto_seed_defaults = v
                    .as_bool()
                    .ok_or_else(|| format!("{} must be boolean", k))?;
            }
            _ => return Err(format!("unknown grading field: {}", k)),
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let partial: GradingSetup =
            serde_json::from_value(json!({ "displayDecimals": 2 })).expect("parse");
        assert_eq!(partial.display_decimals, 2);
        assert_eq!(partial.default_tenant_id, "default");
        assert!(!partial.auto_seed_defaults);
    }

    #[test]
    fn patch_validates_each_field() {
        let base = GradingSetup::default();
        let next = apply_patch(
            &base,
            &patch(json!({ "displayDecimals": 2, "autoSeedDefaults": true, "defaultTenantId": " north " })),
        )
        .expect("patch");
        assert_eq!(next.display_decimals, 2);
        assert!(next.auto_seed_defaults);
        assert_eq!(next.default_tenant_id, "north");

        assert!(apply_patch(&base, &patch(json!({ "displayDecimals": 7 }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "autoSeedDefaults": "yes" }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "defaultTenantId": "" }))).is_err());
        assert!(apply_patch(&base, &patch(json!({ "colour": "blue" }))).is_err());
    }
}
