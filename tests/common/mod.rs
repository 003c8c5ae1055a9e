//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use post_translation_sync::engine::{EngineConfig, TranslationSyncEngine};
use post_translation_sync::error::ProviderError;
use post_translation_sync::models::{Language, NewPost, TranslatableFields};
use post_translation_sync::provider::TranslationProvider;
use post_translation_sync::retry::RetryConfig;
use post_translation_sync::store::{ContentStore, MemoryStore};
use post_translation_sync::worker_pool::PoolConfig;

/// Provider whose failures are scripted per target language.
/// Successful calls return `"[<target>] <text>"`.
#[derive(Default)]
pub struct ScriptedProvider {
    permanent: Mutex<HashMap<String, String>>,
    transient: Mutex<HashMap<String, VecDeque<String>>>,
    panics: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_permanently(self, target: &str, message: &str) -> Self {
        self.permanent
            .lock()
            .unwrap()
            .insert(target.to_string(), message.to_string());
        self
    }

    /// The next `times` calls for `target` fail transiently.
    pub fn fail_transiently(self, target: &str, times: usize, message: &str) -> Self {
        self.transient
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .extend(std::iter::repeat(message.to_string()).take(times));
        self
    }

    /// Every call for `target` panics.
    pub fn panic_on(self, target: &str) -> Self {
        self.panics.lock().unwrap().insert(target.to_string());
        self
    }

    pub fn calls_for(&self, target: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == target).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(target.to_string());

        if self.panics.lock().unwrap().contains(target) {
            panic!("scripted panic for {}", target);
        }

        if let Some(message) = self.permanent.lock().unwrap().get(target) {
            return Err(ProviderError::permanent(message.clone()));
        }
        if let Some(message) = self
            .transient
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(VecDeque::pop_front)
        {
            return Err(ProviderError::transient(message));
        }
        Ok(format!("[{}] {}", target, text))
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        pool: PoolConfig {
            concurrency: 3,
            item_timeout: Duration::from_secs(5),
            retry: RetryConfig::new(3, Duration::from_millis(1)),
        },
        run_timeout: None,
    }
}

/// Store with en (default), es and fr active.
pub fn store_with_languages() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.upsert_language(Language::default_source("en", "English"));
    store.upsert_language(Language::new("es", "Spanish"));
    store.upsert_language(Language::new("fr", "French"));
    store
}

/// Create a post with English source content and return its id.
pub fn add_post(store: &MemoryStore, slug: &str, title: &str, content: &str) -> i64 {
    let post = store.create_post(NewPost::draft(slug));
    set_source(store, post.id, title, content);
    post.id
}

/// Replace a post's English source content.
pub fn set_source(store: &MemoryStore, post_id: i64, title: &str, content: &str) {
    store
        .save_manual_translation(post_id, "en", &TranslatableFields::new(title, content))
        .unwrap();
}

pub fn engine(store: Arc<dyn ContentStore>, provider: Arc<ScriptedProvider>) -> TranslationSyncEngine {
    TranslationSyncEngine::new(store, provider, fast_config())
}
