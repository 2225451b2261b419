//! Picks the level a timing event is logged at.

use crate::channel::{EnabledLevels, Level};

/// Elapsed-time thresholds; `None` disables a threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub warn_ms: Option<u64>,
    pub error_ms: Option<u64>,
}

/// Outcome of [`select_severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
    /// Not logged at all.
    Suppressed,
}

impl Severity {
    /// The level to write at, or `None` when suppressed.
    pub fn level(self) -> Option<Level> {
        match self {
            Severity::Error => Some(Level::Error),
            Severity::Warn => Some(Level::Warn),
            Severity::Info => Some(Level::Info),
            Severity::Debug => Some(Level::Debug),
            Severity::Suppressed => None,
        }
    }
}

/// Choose the level for a statement that ran for `exec_ms` milliseconds.
///
/// A channel closed at error is closed entirely. Error and warn are chosen
/// by threshold; below the thresholds the most verbose enabled level of
/// debug and info wins. A channel that accepts error but not warn only
/// ever logs threshold-breaking statements.
pub fn select_severity(exec_ms: u64, thresholds: &Thresholds, enabled: EnabledLevels) -> Severity {
    if !enabled.error {
        return Severity::Suppressed;
    }
    if thresholds.error_ms.is_some_and(|t| exec_ms >= t) {
        return Severity::Error;
    }
    if !enabled.warn {
        return Severity::Suppressed;
    }
    if thresholds.warn_ms.is_some_and(|t| exec_ms >= t) {
        Severity::Warn
    } else if enabled.debug {
        Severity::Debug
    } else if enabled.info {
        Severity::Info
    } else {
        Severity::Suppressed
    }
}
