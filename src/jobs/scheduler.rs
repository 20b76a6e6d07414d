//! Recurring database update
//!
//! The schedule itself lives in the `scheduled_jobs` table so it survives
//! restarts. A tokio-cron-scheduler job polls that table; each poll decides
//! whether the job is due, late within its grace window, or misfired, and
//! moves `next_run_at` past now so missed slots collapse into one decision.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use super::{JobContext, JobKind, run_job};
use crate::config::MAX_SYNC_INTERVAL_MINUTES;
use crate::db::{Database, ScheduledJobRecord};
use crate::error::{SyncError, SyncResult};

pub const DATABASE_UPDATE_JOB: &str = "database_update_job";

/// What a poll should do with a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NotDue,
    Run {
        lateness: Duration,
        next_run_at: DateTime<Utc>,
    },
    SkipMisfire {
        lateness: Duration,
        next_run_at: DateTime<Utc>,
    },
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    NotDue,
    Ran,
    Misfired,
    /// Another poller advanced the job or holds its lease
    Claimed,
    /// The jobs were already running in this process
    Busy,
}

fn effective_interval(interval: Duration) -> Duration {
    interval.max(Duration::minutes(1))
}

/// Decide what to do with `job` at `now`.
///
/// Lateness is measured against the most recent slot that is due, so a
/// process coming back after several missed slots runs once if that slot is
/// still within the grace window.
pub fn decide(job: &ScheduledJobRecord, now: DateTime<Utc>) -> Decision {
    if now < job.next_run_at {
        return Decision::NotDue;
    }

    let interval = effective_interval(job.interval());
    let missed = (now - job.next_run_at).num_milliseconds() / interval.num_milliseconds();
    let latest_due = job.next_run_at + interval * missed as i32;
    let lateness = now - latest_due;
    let next_run_at = latest_due + interval;

    if lateness <= job.misfire_grace() {
        Decision::Run {
            lateness,
            next_run_at,
        }
    } else {
        Decision::SkipMisfire {
            lateness,
            next_run_at,
        }
    }
}

/// Register the recurring job unless it already exists; the persisted
/// interval wins over the configured one. Returns whether it was inserted.
pub async fn register_jobs(
    db: &Database,
    interval_minutes: i64,
    misfire_grace_seconds: i64,
) -> SyncResult<bool> {
    let interval = Some(interval_minutes)
        .filter(|m| (1..=MAX_SYNC_INTERVAL_MINUTES).contains(m))
        .and_then(Duration::try_minutes)
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "sync interval of {} minutes is out of range",
                interval_minutes
            ))
        })?;

    let registered = db.scheduled_jobs().list().await?;
    if let Some(existing) = registered.iter().find(|j| j.name == DATABASE_UPDATE_JOB) {
        info!(
            job = DATABASE_UPDATE_JOB,
            interval_minutes = existing.interval_minutes,
            next_run_at = %existing.next_run_at,
            "Job already registered"
        );
        return Ok(false);
    }

    let first_run_at = Utc::now() + interval;
    let inserted = db
        .scheduled_jobs()
        .register(
            DATABASE_UPDATE_JOB,
            interval_minutes,
            misfire_grace_seconds,
            first_run_at,
        )
        .await?;
    if inserted {
        info!(job = DATABASE_UPDATE_JOB, interval_minutes, "Registered job");
    }
    Ok(inserted)
}

/// Check the registry once and fire the job if it is due
pub async fn poll_once(ctx: &JobContext, name: &str, now: DateTime<Utc>) -> SyncResult<PollOutcome> {
    let jobs = ctx.db.scheduled_jobs();
    let Some(job) = jobs.get(name).await? else {
        warn!(job = name, "Scheduled job is not registered");
        return Ok(PollOutcome::NotDue);
    };

    let (next_run_at, run) = match decide(&job, now) {
        Decision::NotDue => return Ok(PollOutcome::NotDue),
        Decision::Run { next_run_at, lateness } => {
            debug!(job = name, lateness_ms = lateness.num_milliseconds(), "Job is due");
            (next_run_at, true)
        }
        Decision::SkipMisfire { next_run_at, lateness } => {
            warn!(
                job = name,
                late_by_secs = lateness.num_seconds(),
                grace_secs = job.misfire_grace_seconds,
                "Run time of job was missed, skipping"
            );
            (next_run_at, false)
        }
    };

    // Lease outlives a normal run so a slow run cannot be overlapped
    let lease_until = now + effective_interval(job.interval()) * 2;
    if !jobs
        .try_claim(name, job.next_run_at, next_run_at, now, lease_until)
        .await?
    {
        debug!(job = name, "Firing claimed elsewhere");
        return Ok(PollOutcome::Claimed);
    }

    if !run {
        jobs.release(name, None).await?;
        return Ok(PollOutcome::Misfired);
    }

    let outcome = match run_job(ctx, JobKind::DatabaseUpdate).await {
        Ok(_) => PollOutcome::Ran,
        Err(SyncError::AlreadyRunning(kind)) => {
            warn!(job = name, running = kind, "Previous run still in progress, skipping");
            PollOutcome::Busy
        }
        Err(e) => {
            error!(job = name, error = %e, "Job failed");
            PollOutcome::Ran
        }
    };

    let ran_at = (outcome == PollOutcome::Ran).then_some(now);
    jobs.release(name, ran_at).await?;
    info!(job = name, next_run_at = %next_run_at, "Next run scheduled");
    Ok(outcome)
}

/// Start the poller. The returned scheduler must be kept and shut down by
/// the caller.
pub async fn start_scheduler(
    ctx: Arc<JobContext>,
    poll_interval: StdDuration,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let poll_ctx = ctx.clone();
    let poll_job = Job::new_repeated_async(poll_interval, move |_uuid, _l| {
        let ctx = poll_ctx.clone();
        Box::pin(async move {
            if let Err(e) = poll_once(&ctx, DATABASE_UPDATE_JOB, Utc::now()).await {
                error!(job = DATABASE_UPDATE_JOB, error = %e, "Scheduler poll failed");
            }
        })
    })?;
    scheduler.add(poll_job).await?;

    scheduler.start().await?;

    info!(poll_secs = poll_interval.as_secs(), "Job scheduler started");
    Ok(scheduler)
}
