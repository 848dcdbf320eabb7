use rusqlite::Connection;
use serde::Deserialize;
use std::path::PathBuf;

/// One line of stdin: `{"id", "method", "params"}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }
}

/// Sidecar state; `db` is `None` until `workspace.select` succeeds.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
