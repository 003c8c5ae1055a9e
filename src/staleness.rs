//! Decides whether an existing translation may be (re)written.
//!
//! Pure: no I/O, no clock. The planner calls it once per (post, language).

use std::fmt;

use crate::models::Translation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    Missing,
    Forced,
    ManuallyEdited,
    UpToDate,
    SourceChanged,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Missing => "missing",
            DecisionReason::Forced => "forced",
            DecisionReason::ManuallyEdited => "manually edited, preserved",
            DecisionReason::UpToDate => "up to date",
            DecisionReason::SourceChanged => "source changed",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub proceed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn proceed(reason: DecisionReason) -> Self {
        Self {
            proceed: true,
            reason,
        }
    }

    fn hold(reason: DecisionReason) -> Self {
        Self {
            proceed: false,
            reason,
        }
    }
}

/// Classify one (post, target language) pair.
///
/// `source_fingerprint` is the fingerprint of the current default-language
/// content; `existing` is the target-language row, if any.
pub fn should_translate(
    source_fingerprint: &str,
    existing: Option<&Translation>,
    force: bool,
) -> Decision {
    let Some(existing) = existing else {
        return Decision::proceed(DecisionReason::Missing);
    };

    if force {
        return Decision::proceed(DecisionReason::Forced);
    }

    if existing.is_manually_edited {
        return Decision::hold(DecisionReason::ManuallyEdited);
    }

    // Rows without a fingerprint predate tracking and count as stale
    match existing.source_fingerprint.as_deref() {
        Some(previous) if previous == source_fingerprint => {
            Decision::hold(DecisionReason::UpToDate)
        }
        _ => Decision::proceed(DecisionReason::SourceChanged),
    }
}
