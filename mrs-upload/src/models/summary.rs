//! Per-role status summary

use super::BatchRegistry;
use serde::Serialize;
use std::fmt;

/// Label → file count, sorted by label, plus the total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub entries: Vec<(String, usize)>,
    pub total: usize,
}

impl SelectionSummary {
    /// Summarise a registry by batch label; empty batches are omitted
    pub fn from_registry(registry: &BatchRegistry) -> Self {
        let mut entries: Vec<(String, usize)> = registry
            .iter()
            .map(|b| (b.label.clone(), b.files.len()))
            .filter(|(_, n)| *n > 0)
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let total = entries.iter().map(|(_, n)| n).sum();
        Self { entries, total }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for SelectionSummary {
    /// `"<label>: <n> .dcm"` per entry, then `"Total: <n> .dcm"`; empty when
    /// nothing is selected
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return Ok(());
        }
        for (label, n) in &self.entries {
            writeln!(f, "{}: {} .dcm", label, n)?;
        }
        write!(f, "Total: {} .dcm", self.total)
    }
}
