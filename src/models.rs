//! Content and job data types shared by the planner, workers and stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl FromStr for PostStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            other => Err(StoreError::Invalid(format!("unknown post status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub tags: Vec<String>,
}

/// Fields of a new post; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub slug: String,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub tags: Vec<String>,
}

impl NewPost {
    pub fn draft(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            status: PostStatus::Draft,
            featured_image: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// ISO 639-1 code, unique
    pub code: String,
    pub name: String,
    pub is_active: bool,
    /// The canonical source language; exactly one per store
    pub is_default: bool,
    pub is_rtl: bool,
}

impl Language {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            is_active: true,
            is_default: false,
            is_rtl: false,
        }
    }

    pub fn default_source(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_default: true,
            ..Self::new(code, name)
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn rtl(mut self) -> Self {
        self.is_rtl = true;
        self
    }
}

/// The text fields of a translation, in the order they are translated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatableFields {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl TranslatableFields {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_meta(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.meta_title = Some(title.into());
        self.meta_description = Some(description.into());
        self
    }

    /// A translation is usable as a source only with non-empty content.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub post_id: i64,
    pub language_code: String,
    pub fields: TranslatableFields,
    /// Set when a human edited the row after its last machine translation
    pub is_manually_edited: bool,
    /// Fingerprint of the default-language content this row was translated from
    pub source_fingerprint: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A machine-translated row ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationWrite {
    pub post_id: i64,
    pub language_code: String,
    pub fields: TranslatableFields,
    pub source_fingerprint: String,
}

/// Condition checked against the current row inside the write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuard {
    /// Refuse to overwrite a row a human has edited
    PreserveManualEdits,
    /// Overwrite unconditionally
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The guard refused the write; the row is untouched
    Preserved,
}

/// One (post, target language) unit of translation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub post_id: i64,
    pub source_language: String,
    pub target_language: String,
    pub source: TranslatableFields,
    pub source_fingerprint: String,
    pub force: bool,
    /// Classifier reason that put the item in the plan
    pub reason: String,
}

impl WorkItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.post_id, &self.target_language)
    }

    pub fn write_guard(&self) -> WriteGuard {
        if self.force {
            WriteGuard::Force
        } else {
            WriteGuard::PreserveManualEdits
        }
    }
}

/// `(post_id, language_code)`, the identity of a translation row and a plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub post_id: i64,
    pub language_code: String,
}

impl ItemKey {
    pub fn new(post_id: i64, language_code: &str) -> Self {
        Self {
            post_id,
            language_code: language_code.to_string(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "post {} [{}]", self.post_id, self.language_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one planned entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub post_id: i64,
    pub language_code: String,
    pub outcome: Outcome,
    /// Always set for skipped and failed outcomes
    pub reason: Option<String>,
}

impl ItemResult {
    pub fn created(key: &ItemKey) -> Self {
        Self::with(key, Outcome::Created, None)
    }

    pub fn updated(key: &ItemKey) -> Self {
        Self::with(key, Outcome::Updated, None)
    }

    pub fn skipped(key: &ItemKey, reason: impl Into<String>) -> Self {
        Self::with(key, Outcome::Skipped, Some(reason.into()))
    }

    pub fn failed(key: &ItemKey, reason: impl Into<String>) -> Self {
        Self::with(key, Outcome::Failed, Some(reason.into()))
    }

    fn with(key: &ItemKey, outcome: Outcome, reason: Option<String>) -> Self {
        Self {
            post_id: key.post_id,
            language_code: key.language_code.clone(),
            outcome,
            reason,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.post_id, &self.language_code)
    }
}
