use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::engine::TranslationSyncEngine;

/// Initialize and start the scheduler running a missing-language sweep on
/// `schedule` (6-field cron, UTC).
pub async fn start_scheduler(engine: Arc<TranslationSyncEngine>, schedule: &str) -> Result<JobScheduler> {
    validate_schedule(schedule)?;
    let scheduler = JobScheduler::new().await?;

    info!("Scheduling missing-language sweep (cron: {})", schedule);
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(schedule, move |_uuid, _l| {
        let engine = Arc::clone(&engine);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Some(_guard) = SweepGuard::acquire(&running) else {
                warn!("Previous missing-language sweep still running, skipping this one");
                return;
            };
            info!("Scheduled missing-language sweep triggered");
            run_sweep(&engine).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("Scheduler started");

    Ok(scheduler)
}

/// Holds the overlap flag for one sweep. Dropping it clears the flag, also
/// when the sweep panics.
struct SweepGuard(Arc<AtomicBool>);

impl SweepGuard {
    fn acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        if running.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(Arc::clone(running)))
        }
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run_sweep(engine: &TranslationSyncEngine) {
    match engine.translate_missing_languages().await {
        Ok(summary) => info!(
            run_id = %summary.run_id,
            created = summary.created_count,
            failed = summary.failed_count,
            "Missing-language sweep completed"
        ),
        Err(e) => error!("Missing-language sweep failed: {}", e),
    }
}

/// Cron format: "second minute hour day month day_of_week"
fn validate_schedule(schedule: &str) -> Result<()> {
    let fields = schedule.split_whitespace().count();
    if fields != 6 {
        bail!(
            "Invalid MISSING_SWEEP_SCHEDULE '{}': expected 6 cron fields, got {}",
            schedule,
            fields
        );
    }
    Ok(())
}
