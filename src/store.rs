//! Content store interface and an in-memory implementation.
//!
//! The engine only reads posts, languages and translations, and writes single
//! translation rows. `SqliteStore` in `db.rs` is the persistent
//! implementation; `MemoryStore` backs tests and one-off tooling.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::models::{
    Language, NewPost, Post, TranslatableFields, Translation, TranslationWrite, UpsertOutcome,
    WriteGuard,
};

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError>;

    /// All posts, ascending by id.
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError>;

    /// Languages ascending by code.
    async fn list_languages(&self, active_only: bool) -> Result<Vec<Language>, StoreError>;

    async fn get_translation(
        &self,
        post_id: i64,
        language_code: &str,
    ) -> Result<Option<Translation>, StoreError>;

    /// Every translation of one post, ascending by language code.
    async fn list_translations(&self, post_id: i64) -> Result<Vec<Translation>, StoreError>;

    /// Write one machine-translated row atomically.
    ///
    /// Content and fingerprint change together and `is_manually_edited` is
    /// cleared. With `WriteGuard::PreserveManualEdits` a row that is
    /// currently marked manually edited is left untouched and
    /// `UpsertOutcome::Preserved` is returned.
    async fn upsert_translation(
        &self,
        write: &TranslationWrite,
        guard: WriteGuard,
    ) -> Result<UpsertOutcome, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    next_post_id: i64,
    posts: BTreeMap<i64, Post>,
    languages: BTreeMap<String, Language>,
    translations: BTreeMap<(i64, String), Translation>,
}

/// Mutex-guarded maps; every write is one critical section.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panic while holding the lock cannot leave a half-written row
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a language. Making one default clears the others.
    pub fn upsert_language(&self, language: Language) {
        let mut inner = self.lock();
        if language.is_default {
            for other in inner.languages.values_mut() {
                other.is_default = false;
            }
        }
        inner.languages.insert(language.code.clone(), language);
    }

    pub fn create_post(&self, post: NewPost) -> Post {
        let mut inner = self.lock();
        inner.next_post_id += 1;
        let created = Post {
            id: inner.next_post_id,
            slug: post.slug,
            status: post.status,
            featured_image: post.featured_image,
            tags: post.tags,
        };
        inner.posts.insert(created.id, created.clone());
        created
    }

    /// Delete a post and its translations. Returns false if it did not exist.
    pub fn delete_post(&self, id: i64) -> bool {
        let mut inner = self.lock();
        let existed = inner.posts.remove(&id).is_some();
        inner.translations.retain(|(post_id, _), _| *post_id != id);
        existed
    }

    /// Record a human edit: the row becomes protected from non-forced runs.
    pub fn save_manual_translation(
        &self,
        post_id: i64,
        language_code: &str,
        fields: &TranslatableFields,
    ) -> Result<Translation, StoreError> {
        let mut inner = self.lock();
        ensure_exists(&inner, post_id, language_code)?;

        let key = (post_id, language_code.to_string());
        let source_fingerprint = inner
            .translations
            .get(&key)
            .and_then(|t| t.source_fingerprint.clone());
        let translation = Translation {
            post_id,
            language_code: language_code.to_string(),
            fields: fields.clone(),
            is_manually_edited: true,
            source_fingerprint,
            updated_at: Utc::now(),
        };
        inner.translations.insert(key, translation.clone());
        Ok(translation)
    }
}

fn ensure_exists(inner: &MemoryInner, post_id: i64, language_code: &str) -> Result<(), StoreError> {
    if !inner.posts.contains_key(&post_id) {
        return Err(StoreError::NotFound {
            entity: "post",
            key: post_id.to_string(),
        });
    }
    if !inner.languages.contains_key(language_code) {
        return Err(StoreError::NotFound {
            entity: "language",
            key: language_code.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.lock().posts.get(&id).cloned())
    }

    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        Ok(self.lock().posts.values().cloned().collect())
    }

    async fn list_languages(&self, active_only: bool) -> Result<Vec<Language>, StoreError> {
        Ok(self
            .lock()
            .languages
            .values()
            .filter(|lang| !active_only || lang.is_active)
            .cloned()
            .collect())
    }

    async fn get_translation(
        &self,
        post_id: i64,
        language_code: &str,
    ) -> Result<Option<Translation>, StoreError> {
        Ok(self
            .lock()
            .translations
            .get(&(post_id, language_code.to_string()))
            .cloned())
    }

    async fn list_translations(&self, post_id: i64) -> Result<Vec<Translation>, StoreError> {
        Ok(self
            .lock()
            .translations
            .range((post_id, String::new())..)
            .take_while(|((id, _), _)| *id == post_id)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn upsert_translation(
        &self,
        write: &TranslationWrite,
        guard: WriteGuard,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.lock();
        ensure_exists(&inner, write.post_id, &write.language_code)?;

        let key = (write.post_id, write.language_code.clone());
        let outcome = match inner.translations.get(&key) {
            None => UpsertOutcome::Created,
            Some(existing)
                if existing.is_manually_edited && guard == WriteGuard::PreserveManualEdits =>
            {
                return Ok(UpsertOutcome::Preserved);
            }
            Some(_) => UpsertOutcome::Updated,
        };

        inner.translations.insert(
            key,
            Translation {
                post_id: write.post_id,
                language_code: write.language_code.clone(),
                fields: write.fields.clone(),
                is_manually_edited: false,
                source_fingerprint: Some(write.source_fingerprint.clone()),
                updated_at: Utc::now(),
            },
        );
        Ok(outcome)
    }
}
