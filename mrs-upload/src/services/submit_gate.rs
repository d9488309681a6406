//! Submit enablement
//!
//! Decides whether the upload may be sent and explains why not. Counts
//! come from the session's flattened lists, falling back to the raw flat
//! selection when a role has no batches.

use crate::models::ProcessingMode;
use serde::Serialize;

/// State of an optional choice group (acquisition type, patient condition)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionState {
    /// The front end does not offer this choice; treated as satisfied
    NotOffered,
    Unselected,
    Selected,
}

impl OptionState {
    fn satisfied(self) -> bool {
        !matches!(self, OptionState::Unselected)
    }
}

/// Everything the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct SubmitContext {
    pub mode: Option<ProcessingMode>,
    pub datatype_options: OptionState,
    pub condition_options: OptionState,
    /// Primary-signal files available for mono mode
    pub mono_count: usize,
    /// Directory files available for multi mode
    pub multi_count: usize,
}

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReadiness {
    pub enabled: bool,
    /// One user-facing line per unmet requirement
    pub hints: Vec<String>,
}

/// Session count if non-zero, otherwise the fallback selection's count
pub fn effective_count(selected: usize, fallback: usize) -> usize {
    if selected > 0 {
        selected
    } else {
        fallback
    }
}

/// Evaluate whether submission is allowed
pub fn evaluate(ctx: &SubmitContext) -> SubmitReadiness {
    let mut hints = Vec::new();

    if !ctx.datatype_options.satisfied() {
        hints.push("Select an MRS DATA option.".to_string());
    }
    if !ctx.condition_options.satisfied() {
        hints.push("Select a PATIENT CONDITION option.".to_string());
    }

    let mode_count = match ctx.mode {
        Some(ProcessingMode::Multi) => {
            if ctx.multi_count == 0 {
                hints.push("MULTI mode: select at least one folder.".to_string());
                if ctx.mono_count > 0 {
                    hints.push(format!(
                        "You currently have MONO input selected ({} .dcm). Switch to MONO mode to run with those.",
                        ctx.mono_count
                    ));
                }
            }
            ctx.multi_count
        }
        Some(ProcessingMode::Mono) => {
            if ctx.mono_count == 0 {
                hints.push("MONO mode: select at least one .dcm file/folder.".to_string());
                if ctx.multi_count > 0 {
                    hints.push(format!(
                        "You currently have MULTI input selected ({} .dcm). Switch to MULTI mode to run with those.",
                        ctx.multi_count
                    ));
                }
            }
            ctx.mono_count
        }
        None => {
            hints.push("Select MONO or MULTI mode.".to_string());
            0
        }
    };

    let enabled = ctx.mode.is_some()
        && ctx.datatype_options.satisfied()
        && ctx.condition_options.satisfied()
        && mode_count > 0;

    tracing::debug!(enabled, hints = hints.len(), "Evaluated submit readiness");

    SubmitReadiness { enabled, hints }
}
