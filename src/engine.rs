//! Run orchestration: snapshot, plan, execute, summarize.
//!
//! Every run owns a `RunContext`. Concurrent runs share nothing but the store,
//! which serializes writes per row.

use chrono::Utc;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::models::ItemResult;
use crate::planner::{self, StoreSnapshot, TranslationRequest};
use crate::provider::TranslationProvider;
use crate::reporter::{Reporter, RunSummary};
use crate::store::ContentStore;
use crate::worker_pool::{PoolConfig, TranslationWorkerPool};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    /// Cancel a run that is still executing after this long
    pub run_timeout: Option<Duration>,
}

/// Identity and cancellation scope of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    cancel: CancellationToken,
    run_timeout: Option<Duration>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            run_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Request cancellation: no new items start, in-flight items finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Executing,
    Summarizing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Planning => "planning",
            RunState::Executing => "executing",
            RunState::Summarizing => "summarizing",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

fn advance(ctx: &RunContext, state: &mut RunState, next: RunState) {
    debug!(run_id = %ctx.run_id, "Run state {} -> {}", state, next);
    *state = next;
}

pub struct TranslationSyncEngine {
    store: Arc<dyn ContentStore>,
    pool: TranslationWorkerPool,
    config: EngineConfig,
}

impl TranslationSyncEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn TranslationProvider>,
        config: EngineConfig,
    ) -> Self {
        let pool = TranslationWorkerPool::new(provider, Arc::clone(&store), config.pool.clone());
        Self {
            store,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh context carrying the configured run timeout.
    pub fn context(&self) -> RunContext {
        RunContext::new().with_timeout(self.config.run_timeout)
    }

    /// Translate one post into every active target language.
    pub async fn auto_translate_post(&self, post_id: i64, force: bool) -> Result<RunSummary, JobError> {
        self.run(&TranslationRequest::SinglePost { post_id, force }, &self.context())
            .await
    }

    /// Translate every post into every active target language.
    pub async fn auto_translate_all_posts(&self, force: bool) -> Result<RunSummary, JobError> {
        self.run(&TranslationRequest::AllPosts { force }, &self.context())
            .await
    }

    /// Fill in translations that do not exist yet; existing rows are never touched.
    pub async fn translate_missing_languages(&self) -> Result<RunSummary, JobError> {
        self.run(&TranslationRequest::MissingOnly, &self.context()).await
    }

    /// Re-translate the given languages, overwriting manual edits.
    pub async fn force_translate_languages(
        &self,
        post_ids: Option<Vec<i64>>,
        language_codes: Vec<String>,
    ) -> Result<RunSummary, JobError> {
        let request = TranslationRequest::ExplicitLanguages {
            language_codes,
            post_ids,
        };
        self.run(&request, &self.context()).await
    }

    pub async fn run(&self, request: &TranslationRequest, ctx: &RunContext) -> Result<RunSummary, JobError> {
        self.run_with_progress(request, ctx, |_| {}).await
    }

    /// Run `request`, calling `on_result` once per outcome as it becomes known.
    ///
    /// Outcomes settled during planning are reported first, followed by
    /// executed items in completion order.
    pub async fn run_with_progress<F>(
        &self,
        request: &TranslationRequest,
        ctx: &RunContext,
        mut on_result: F,
    ) -> Result<RunSummary, JobError>
    where
        F: FnMut(&ItemResult) + Send,
    {
        let started_at = Utc::now();
        let mut state = RunState::Planning;
        info!(run_id = %ctx.run_id, request = request.label(), "Translation run started");

        let snapshot = StoreSnapshot::load(self.store.as_ref(), request).await?;
        let plan = planner::plan(request, &snapshot).map_err(|e| {
            warn!(run_id = %ctx.run_id, "Planning failed: {}", e);
            e
        })?;

        let mut reporter = Reporter::new(ctx.run_id, started_at, plan.keys());
        let (items, settled) = plan.into_parts();
        info!(
            run_id = %ctx.run_id,
            dispatched = items.len(),
            settled = settled.len(),
            "Plan ready"
        );
        for result in settled {
            on_result(&result);
            reporter.record(result);
        }

        advance(ctx, &mut state, RunState::Executing);
        let run_token = ctx.cancel.child_token();
        let watchdog = ctx.run_timeout.map(|timeout| {
            let token = run_token.clone();
            let run_id = ctx.run_id;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(run_id = %run_id, "Run exceeded {:?}, cancelling", timeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let mut results = self.pool.execute(items, run_token.clone());
        while let Some(result) = results.next().await {
            on_result(&result);
            reporter.record(result);
        }
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        advance(ctx, &mut state, RunState::Summarizing);
        let summary = reporter.finish(run_token.is_cancelled());

        advance(ctx, &mut state, RunState::Done);
        info!(
            run_id = %ctx.run_id,
            total = summary.total,
            created = summary.created_count,
            updated = summary.updated_count,
            skipped = summary.skipped_count,
            failed = summary.failed_count,
            cancelled = summary.cancelled,
            "Translation run finished"
        );
        Ok(summary)
    }
}
