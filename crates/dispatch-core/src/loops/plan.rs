//! Plan file parsing for autonomous loops.
//!
//! A plan is a markdown file with checkbox tasks:
//!
//! ```markdown
//! # Migration plan
//! - [x] Inventory call sites
//! - [ ] Replace the old client
//! - [ ] Delete the shim
//! ```
//!
//! Only `- [ ]` and `- [x]` lines count; everything else is prose.

use std::path::Path;

use serde::Serialize;

use crate::error::DispatchError;

/// Checkbox counts for one reading of a plan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    pub total: usize,
    pub complete: usize,
}

impl PlanStatus {
    pub fn incomplete(&self) -> usize {
        self.total - self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete() == 0
    }
}

/// Count checkbox tasks in plan text.
pub fn count_checkboxes(content: &str) -> PlanStatus {
    let mut total = 0;
    let mut complete = 0;
    for line in content.lines() {
        let line = line.trim_start();
        if line.starts_with("- [ ]") {
            total += 1;
        } else if line.starts_with("- [x]") || line.starts_with("- [X]") {
            total += 1;
            complete += 1;
        }
    }
    PlanStatus { total, complete }
}

/// Read and count a plan file.
pub fn read_status(path: &Path) -> Result<PlanStatus, DispatchError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DispatchError::Config(format!(
            "Failed to read plan file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(count_checkboxes(&content))
}
