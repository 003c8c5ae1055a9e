//! Error taxonomy for translation sync runs.
//!
//! - `ProviderError` comes back from a translation backend and says whether
//!   the failure is worth retrying.
//! - `StoreError` comes back from a content store.
//! - `ItemError` is scoped to one (post, language) pair and never aborts a run.
//! - `PlanningError` is fatal and aborts a run before any work starts.
//! - `JobError` is what the exposed operations return when no summary can be
//!   produced at all.

use thiserror::Error;

/// Longest provider message carried into a reason string.
const MAX_REASON_LEN: usize = 300;

/// Failure reported by a `TranslationProvider`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// Network errors, rate limits and 5xx-equivalents are transient
    pub transient: bool,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

/// Failure reported by a `ContentStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid data: {0}")]
    Invalid(String),
}

/// Failure of a single work item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

impl ItemError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ItemError::Transient(_))
    }

    /// Human-readable reason for the run summary.
    pub fn reason(&self) -> String {
        match self {
            ItemError::Transient(msg) | ItemError::Permanent(msg) => truncate_reason(msg),
        }
    }
}

impl From<ProviderError> for ItemError {
    fn from(error: ProviderError) -> Self {
        if error.transient {
            ItemError::Transient(error.message)
        } else {
            ItemError::Permanent(error.message)
        }
    }
}

impl From<StoreError> for ItemError {
    // A failed write is never retried: the item is reported failed
    fn from(error: StoreError) -> Self {
        ItemError::Permanent(format!("store write failed: {}", error))
    }
}

/// Fatal planning failure; no item of the run was started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("no active languages configured")]
    NoActiveLanguages,

    #[error("no default language configured")]
    NoDefaultLanguage,

    #[error("multiple default languages configured: {0}")]
    MultipleDefaultLanguages(String),

    #[error("no active target languages configured")]
    NoTargetLanguages,

    #[error("post {0} not found")]
    PostNotFound(i64),

    #[error("no language codes given")]
    EmptyLanguageSelection,

    #[error("language '{0}' is unknown or inactive")]
    UnknownLanguage(String),

    #[error("language '{0}' is the default language and cannot be a translation target")]
    DefaultLanguageTarget(String),

    #[error("no default-language content found for any post in scope")]
    NoSourceContent,
}

/// Top-level failure of an exposed operation.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("failed to load content: {0}")]
    Store(#[from] StoreError),
}

/// Cap a message so raw provider bodies never flood the summary.
pub fn truncate_reason(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_REASON_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_REASON_LEN).collect();
    out.push('…');
    out
}
