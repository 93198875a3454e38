//! Periodic sync loop for `serve` mode.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;

use crate::runner::{RunOutcome, SyncRunner};

/// When scheduled syncs happen.
#[derive(Debug, Clone)]
pub enum SyncSchedule {
    /// Crontab expression, evaluated in UTC
    Cron(cron::Schedule),
    Every(Duration),
}

/// Sync once immediately, then on every scheduled time. Returns only when a
/// cron schedule has no upcoming time left.
///
/// A slot that lands while an API-triggered run is in flight is skipped.
pub async fn run(runner: Arc<SyncRunner>, schedule: SyncSchedule) {
    match schedule {
        SyncSchedule::Every(every) => {
            tracing::info!(interval_secs = every.as_secs(), "sync scheduler started");
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                scheduled_sync(&runner).await;
            }
        }
        SyncSchedule::Cron(schedule) => {
            tracing::info!(%schedule, "sync scheduler started");
            scheduled_sync(&runner).await;
            while let Some(delay) = delay_until_next(&schedule, Utc::now()) {
                tracing::debug!(delay_secs = delay.as_secs(), "waiting for next scheduled sync");
                tokio::time::sleep(delay).await;
                scheduled_sync(&runner).await;
            }
            tracing::warn!(%schedule, "cron schedule has no upcoming time, scheduler stopping");
        }
    }
}

fn delay_until_next(schedule: &cron::Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

async fn scheduled_sync(runner: &SyncRunner) {
    match runner.try_run().await {
        Some(record) => match record.outcome {
            RunOutcome::Completed(summary) => tracing::debug!(
                updated = summary.updated,
                errors = summary.errors,
                "scheduled sync finished"
            ),
            RunOutcome::Failed(error) => {
                tracing::error!(%error, "scheduled sync failed")
            }
        },
        None => tracing::debug!("scheduled sync skipped, a run is already in progress"),
    }
}
