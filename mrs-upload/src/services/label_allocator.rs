//! Unique batch label allocation

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates batch labels that are unique within a registry
///
/// Holds the per-session counter used for synthesized labels, so two blank
/// folder names picked within the same millisecond still differ.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    counter: AtomicU64,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `folder_<unix-millis>_<n>` with a session-monotonic `n` starting at 1
    pub fn synthesize(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("folder_{}_{}", chrono::Utc::now().timestamp_millis(), n)
    }

    /// Return a label for which `is_used` is false
    ///
    /// **Algorithm:**
    /// 1. Trim the desired label; synthesize one if absent or blank
    /// 2. Return it unchanged if unused
    /// 3. Otherwise append `_2`, `_3`, … and return the first unused
    ///
    /// `is_used` is consulted at call time, so callers pass a view of the
    /// registry as it is at the moment of insertion.
    pub fn allocate<F>(&self, desired: Option<&str>, is_used: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let base = match desired.map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => self.synthesize(),
        };
        disambiguate(&base, is_used)
    }

    /// [`allocate`](Self::allocate) against an explicit label set
    pub fn unique_label(&self, desired: Option<&str>, used: &HashSet<String>) -> String {
        self.allocate(desired, |label| used.contains(label))
    }
}

/// Smallest `base`, `base_2`, `base_3`, … not reported as used
pub fn disambiguate<F>(base: &str, is_used: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !is_used(base) {
        return base.to_string();
    }

    let mut i = 2u64;
    loop {
        let candidate = format!("{}_{}", base, i);
        if !is_used(&candidate) {
            return candidate;
        }
        i += 1;
    }
}
