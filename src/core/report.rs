// src/core/report.rs
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::batch::{BatchSummary, InputOutcome};
use crate::error::Result;

/// Machine-readable record of one run, written with `--report`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub inputs: Vec<InputOutcome>,
    pub failures: usize,
    pub exit_code: i32,
}

impl RunReport {
    pub fn from_summary(summary: &BatchSummary) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            inputs: summary.outcomes.clone(),
            failures: summary.failures,
            exit_code: summary.exit_code(),
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Wrote run report to {}", path.display());
        Ok(())
    }
}
