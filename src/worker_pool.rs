//! Bounded-concurrency execution of translation work items.
//!
//! `concurrency` workers pull from one shared FIFO queue. Each item's
//! provider calls (all fields, with retries) share one timeout; the store
//! write happens after it, so a timeout never interrupts a write. Results are
//! streamed in completion order.
//!
//! After cancellation no worker dequeues again; items already in flight
//! finish and every item left in the queue is reported skipped.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ItemError, ProviderError};
use crate::models::{
    ItemResult, TranslatableFields, TranslationWrite, UpsertOutcome, WorkItem,
};
use crate::provider::TranslationProvider;
use crate::retry::{with_retry_if, RetryConfig};
use crate::staleness::DecisionReason;
use crate::store::ContentStore;

pub const REASON_TIMEOUT: &str = "timeout";
pub const REASON_CANCELLED: &str = "run cancelled";
pub const REASON_INTERNAL: &str = "internal error";

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on items in flight at once
    pub concurrency: usize,
    /// Budget for all provider calls of one item, retries included
    pub item_timeout: Duration,
    /// Retry policy for each provider call
    pub retry: RetryConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            item_timeout: Duration::from_secs(120),
            retry: RetryConfig::provider_call(),
        }
    }
}

struct PoolInner {
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn ContentStore>,
    config: PoolConfig,
}

type WorkQueue = Arc<Mutex<VecDeque<WorkItem>>>;

#[derive(Clone)]
pub struct TranslationWorkerPool {
    inner: Arc<PoolInner>,
}

impl TranslationWorkerPool {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        store: Arc<dyn ContentStore>,
        config: PoolConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                provider,
                store,
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Execute `items`, yielding one result per item as it completes.
    ///
    /// Must be called within a tokio runtime. Dropping the stream stops the
    /// workers after their current item.
    pub fn execute(&self, items: Vec<WorkItem>, cancel: CancellationToken) -> ReceiverStream<ItemResult> {
        let concurrency = self.inner.config.concurrency.max(1);
        let (tx, rx) = mpsc::channel(concurrency * 2);
        let workers = concurrency.min(items.len());
        let queue: WorkQueue = Arc::new(Mutex::new(VecDeque::from(items)));
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let handles: Vec<_> = (0..workers)
                .map(|worker_id| {
                    tokio::spawn(run_worker(
                        worker_id,
                        Arc::clone(&inner),
                        Arc::clone(&queue),
                        tx.clone(),
                        cancel.clone(),
                    ))
                })
                .collect();

            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Translation worker terminated abnormally: {}", e);
                }
            }

            let remaining: Vec<WorkItem> = lock_queue(&queue).drain(..).collect();
            if !remaining.is_empty() {
                info!("Run cancelled, {} queued items not started", remaining.len());
            }
            for item in remaining {
                if tx
                    .send(ItemResult::skipped(&item.key(), REASON_CANCELLED))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

fn lock_queue(queue: &WorkQueue) -> std::sync::MutexGuard<'_, VecDeque<WorkItem>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_worker(
    worker_id: usize,
    inner: Arc<PoolInner>,
    queue: WorkQueue,
    tx: mpsc::Sender<ItemResult>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Translation worker started");
    loop {
        if cancel.is_cancelled() {
            debug!(worker_id, "Cancellation observed, worker stopping");
            break;
        }

        let next = lock_queue(&queue).pop_front();
        let Some(item) = next else {
            break;
        };

        let result = match AssertUnwindSafe(inner.process(&item)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    worker_id,
                    post_id = item.post_id,
                    lang = %item.target_language,
                    "Item panicked, reporting it failed"
                );
                ItemResult::failed(&item.key(), REASON_INTERNAL)
            }
        };
        if tx.send(result).await.is_err() {
            debug!(worker_id, "Result stream dropped, worker stopping");
            break;
        }
    }
}

impl PoolInner {
    async fn process(&self, item: &WorkItem) -> ItemResult {
        let key = item.key();
        debug!(
            post_id = item.post_id,
            lang = %item.target_language,
            reason = %item.reason,
            "Translating item"
        );

        let translated =
            match tokio::time::timeout(self.config.item_timeout, self.translate_fields(item)).await {
                Err(_) => {
                    warn!(
                        post_id = item.post_id,
                        lang = %item.target_language,
                        "Item timed out after {:?}",
                        self.config.item_timeout
                    );
                    return ItemResult::failed(&key, REASON_TIMEOUT);
                }
                Ok(Err(e)) => {
                    warn!(
                        post_id = item.post_id,
                        lang = %item.target_language,
                        transient = e.is_transient(),
                        "Item failed: {}",
                        e
                    );
                    return ItemResult::failed(&key, e.reason());
                }
                Ok(Ok(fields)) => fields,
            };

        let write = TranslationWrite {
            post_id: item.post_id,
            language_code: item.target_language.clone(),
            fields: translated,
            source_fingerprint: item.source_fingerprint.clone(),
        };

        let result = match self.store.upsert_translation(&write, item.write_guard()).await {
            Ok(UpsertOutcome::Created) => ItemResult::created(&key),
            Ok(UpsertOutcome::Updated) => ItemResult::updated(&key),
            Ok(UpsertOutcome::Preserved) => {
                ItemResult::skipped(&key, DecisionReason::ManuallyEdited.as_str())
            }
            Err(e) => {
                error!(post_id = item.post_id, lang = %item.target_language, "Store write failed: {}", e);
                ItemResult::failed(&key, ItemError::from(e).reason())
            }
        };

        info!(
            post_id = item.post_id,
            lang = %item.target_language,
            outcome = %result.outcome,
            "Item finished"
        );
        result
    }

    async fn translate_fields(&self, item: &WorkItem) -> Result<TranslatableFields, ItemError> {
        let source = &item.source;
        Ok(TranslatableFields {
            title: self.translate_text(item, "title", &source.title).await?,
            content: self.translate_text(item, "content", &source.content).await?,
            excerpt: self.translate_optional(item, "excerpt", &source.excerpt).await?,
            meta_title: self.translate_optional(item, "meta_title", &source.meta_title).await?,
            meta_description: self
                .translate_optional(item, "meta_description", &source.meta_description)
                .await?,
        })
    }

    async fn translate_optional(
        &self,
        item: &WorkItem,
        field: &str,
        text: &Option<String>,
    ) -> Result<Option<String>, ItemError> {
        match text {
            Some(text) => Ok(Some(self.translate_text(item, field, text).await?)),
            None => Ok(None),
        }
    }

    /// Blank text is copied through without a provider call.
    async fn translate_text(&self, item: &WorkItem, field: &str, text: &str) -> Result<String, ItemError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let operation = format!(
            "Translate {} of post {} to {}",
            field, item.post_id, item.target_language
        );
        with_retry_if(
            &self.config.retry,
            &operation,
            || {
                self.provider
                    .translate(text, &item.source_language, &item.target_language)
            },
            |e: &ProviderError| e.transient,
        )
        .await
        .map_err(ItemError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::models::{Language, NewPost, Outcome};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ==================== Test Providers ====================

    /// Prefixes text with the target code, optionally after a delay.
    struct EchoProvider {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl EchoProvider {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranslationProvider for EchoProvider {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("[{}] {}", target, text))
        }
    }

    /// Fails `failures` times with the given error, then echoes.
    struct FlakyProvider {
        failures: usize,
        error: ProviderError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationProvider for FlakyProvider {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(format!("[{}] {}", target, text))
            }
        }
    }

    /// Cancels the run from inside the first call.
    struct CancellingProvider {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl TranslationProvider for CancellingProvider {
        async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String, ProviderError> {
            self.cancel.cancel();
            Ok(text.to_uppercase())
        }
    }

    /// Panics for one target language, echoes for the rest.
    struct PanickingProvider {
        lang: &'static str,
    }

    #[async_trait]
    impl TranslationProvider for PanickingProvider {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, ProviderError> {
            if target == self.lang {
                panic!("provider bug for {}", target);
            }
            Ok(format!("[{}] {}", target, text))
        }
    }

    // ==================== Helper Functions ====================

    fn fast_config(concurrency: usize) -> PoolConfig {
        PoolConfig {
            concurrency,
            item_timeout: Duration::from_secs(5),
            retry: RetryConfig::new(3, Duration::from_millis(1)),
        }
    }

    fn store_with_posts(count: usize) -> (Arc<MemoryStore>, Vec<i64>) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_language(Language::default_source("en", "English"));
        store.upsert_language(Language::new("es", "Spanish"));
        store.upsert_language(Language::new("fr", "French"));
        let ids = (0..count)
            .map(|i| store.create_post(NewPost::draft(format!("post-{}", i))).id)
            .collect();
        (store, ids)
    }

    fn item(post_id: i64, lang: &str) -> WorkItem {
        let source = TranslatableFields::new("Hello", "World").with_excerpt("Short");
        WorkItem {
            post_id,
            source_language: "en".to_string(),
            target_language: lang.to_string(),
            source_fingerprint: fingerprint(&source),
            source,
            force: false,
            reason: "missing".to_string(),
        }
    }

    async fn run(pool: &TranslationWorkerPool, items: Vec<WorkItem>) -> Vec<ItemResult> {
        pool.execute(items, CancellationToken::new()).collect().await
    }

    // ==================== Execution Tests ====================

    #[tokio::test]
    async fn test_translates_and_writes_every_field() {
        let (store, ids) = store_with_posts(1);
        let provider = Arc::new(EchoProvider::new(Duration::ZERO));
        let pool = TranslationWorkerPool::new(provider.clone(), store.clone(), fast_config(2));

        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results, vec![ItemResult::created(&item(ids[0], "es").key())]);

        let row = store.get_translation(ids[0], "es").await.unwrap().unwrap();
        assert_eq!(row.fields.title, "[es] Hello");
        assert_eq!(row.fields.content, "[es] World");
        assert_eq!(row.fields.excerpt.as_deref(), Some("[es] Short"));
        assert_eq!(row.fields.meta_title, None);
        assert!(!row.is_manually_edited);
        assert_eq!(
            row.source_fingerprint.as_deref(),
            Some(item(ids[0], "es").source_fingerprint.as_str())
        );
        // title, content, excerpt
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_existing_row_reports_updated() {
        let (store, ids) = store_with_posts(1);
        let pool = TranslationWorkerPool::new(
            Arc::new(EchoProvider::new(Duration::ZERO)),
            store.clone(),
            fast_config(1),
        );

        run(&pool, vec![item(ids[0], "es")]).await;
        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Updated);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (store, ids) = store_with_posts(10);
        let provider = Arc::new(EchoProvider::new(Duration::from_millis(15)));
        let pool = TranslationWorkerPool::new(provider.clone(), store, fast_config(3));

        let items: Vec<_> = ids.iter().map(|&id| item(id, "es")).collect();
        let results = run(&pool, items).await;

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.outcome == Outcome::Created));
        let max = provider.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {} concurrent provider calls", max);
    }

    #[tokio::test]
    async fn test_empty_item_list_completes() {
        let (store, _) = store_with_posts(0);
        let pool = TranslationWorkerPool::new(
            Arc::new(EchoProvider::new(Duration::ZERO)),
            store,
            fast_config(4),
        );
        assert!(run(&pool, Vec::new()).await.is_empty());
    }

    // ==================== Failure Tests ====================

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (store, ids) = store_with_posts(1);
        let provider = Arc::new(FlakyProvider {
            failures: 2,
            error: ProviderError::transient("502 Bad Gateway"),
            calls: AtomicUsize::new(0),
        });
        let pool = TranslationWorkerPool::new(provider.clone(), store, fast_config(1));

        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Created);
        // two failures on title, then title, content, excerpt
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (store, ids) = store_with_posts(1);
        let provider = Arc::new(FlakyProvider {
            failures: usize::MAX,
            error: ProviderError::permanent("unsupported locale: fr"),
            calls: AtomicUsize::new(0),
        });
        let pool = TranslationWorkerPool::new(provider.clone(), store.clone(), fast_config(1));

        let results = run(&pool, vec![item(ids[0], "fr")]).await;
        assert_eq!(
            results,
            vec![ItemResult::failed(&item(ids[0], "fr").key(), "unsupported locale: fr")]
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(store.get_translation(ids[0], "fr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_with_provider_message() {
        let (store, ids) = store_with_posts(1);
        let provider = Arc::new(FlakyProvider {
            failures: usize::MAX,
            error: ProviderError::transient("503 Service Unavailable"),
            calls: AtomicUsize::new(0),
        });
        let pool = TranslationWorkerPool::new(provider.clone(), store, fast_config(1));

        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Failed);
        assert_eq!(results[0].reason.as_deref(), Some("503 Service Unavailable"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let (store, ids) = store_with_posts(1);
        let pool = TranslationWorkerPool::new(
            Arc::new(EchoProvider::new(Duration::from_millis(300))),
            store.clone(),
            PoolConfig {
                item_timeout: Duration::from_millis(30),
                ..fast_config(1)
            },
        );

        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Failed);
        assert_eq!(results[0].reason.as_deref(), Some(REASON_TIMEOUT));
        assert!(store.get_translation(ids[0], "es").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_reported_as_failed() {
        let (store, _) = store_with_posts(0);
        let pool = TranslationWorkerPool::new(
            Arc::new(EchoProvider::new(Duration::ZERO)),
            store,
            fast_config(1),
        );

        // post 77 does not exist, so the write is rejected
        let results = run(&pool, vec![item(77, "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Failed);
        assert!(results[0]
            .reason
            .as_deref()
            .unwrap()
            .starts_with("store write failed"));
    }

    #[tokio::test]
    async fn test_manual_edit_during_run_is_preserved() {
        let (store, ids) = store_with_posts(1);
        store
            .save_manual_translation(ids[0], "es", &TranslatableFields::new("Mío", "humano"))
            .unwrap();
        let pool = TranslationWorkerPool::new(
            Arc::new(EchoProvider::new(Duration::ZERO)),
            store.clone(),
            fast_config(1),
        );

        let results = run(&pool, vec![item(ids[0], "es")]).await;
        assert_eq!(results[0].outcome, Outcome::Skipped);
        assert_eq!(results[0].reason.as_deref(), Some("manually edited, preserved"));
        let row = store.get_translation(ids[0], "es").await.unwrap().unwrap();
        assert_eq!(row.fields.content, "humano");
    }

    #[tokio::test]
    async fn test_panicking_item_fails_and_worker_keeps_going() {
        let (store, ids) = store_with_posts(3);
        let pool = TranslationWorkerPool::new(
            Arc::new(PanickingProvider { lang: "fr" }),
            store.clone(),
            fast_config(1),
        );

        let items = vec![item(ids[0], "fr"), item(ids[1], "fr"), item(ids[2], "es")];
        let results = run(&pool, items).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ItemResult::failed(&item(ids[0], "fr").key(), REASON_INTERNAL));
        assert_eq!(results[1], ItemResult::failed(&item(ids[1], "fr").key(), REASON_INTERNAL));
        // the single worker survived both panics
        assert_eq!(results[2].outcome, Outcome::Created);
        assert!(results.iter().all(|r| r.reason.as_deref() != Some(REASON_CANCELLED)));
        assert!(store.get_translation(ids[0], "fr").await.unwrap().is_none());
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let (store, ids) = store_with_posts(3);
        let provider = Arc::new(EchoProvider::new(Duration::ZERO));
        let pool = TranslationWorkerPool::new(provider.clone(), store, fast_config(2));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let items: Vec<_> = ids.iter().map(|&id| item(id, "es")).collect();
        let results: Vec<_> = pool.execute(items, cancel).collect().await;

        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| r.outcome == Outcome::Skipped && r.reason.as_deref() == Some(REASON_CANCELLED)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_in_flight_item_completes_after_cancel() {
        let (store, ids) = store_with_posts(4);
        let cancel = CancellationToken::new();
        let provider = Arc::new(CancellingProvider {
            cancel: cancel.clone(),
        });
        let pool = TranslationWorkerPool::new(provider, store.clone(), fast_config(1));

        let items: Vec<_> = ids.iter().map(|&id| item(id, "fr")).collect();
        let results: Vec<_> = pool.execute(items, cancel).collect().await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].outcome, Outcome::Created);
        assert_eq!(results[0].post_id, ids[0]);
        assert!(results[1..]
            .iter()
            .all(|r| r.reason.as_deref() == Some(REASON_CANCELLED)));
        assert!(store.get_translation(ids[0], "fr").await.unwrap().is_some());
        assert!(store.get_translation(ids[1], "fr").await.unwrap().is_none());
    }
}
