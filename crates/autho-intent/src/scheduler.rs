//! Cron scheduling of workflows.
//!
//! [`CronScheduler`] keeps a table of jobs keyed by id.  A background tokio
//! task wakes every second and, for each enabled job that is due, sends a
//! [`CronEvent`] naming the workflow to run.  The scheduler never runs
//! workflows itself; the consumer of the channel loads a fresh workflow for
//! every event so runs never share a context.
//!
//! Cron expressions follow the `cron` crate (6 or 7 fields, seconds first).
//! The common 5-field form is accepted and gets a `0` seconds field.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::{IntentError, Result};

const TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A recurring workflow run.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    /// Expression as supplied by the caller.
    pub expression: String,
    pub schedule: cron::Schedule,
    /// Workflow to run: a file path or a catalogue name.
    pub workflow: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.is_some_and(|next| next <= now)
    }
}

/// Sent when a job fires.
#[derive(Debug, Clone, PartialEq)]
pub struct CronEvent {
    pub job_id: String,
    pub job_name: String,
    pub workflow: String,
    pub fired_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Prefix a 5-field expression with a `0` seconds field.
pub fn normalize_cron_expr(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Parse a cron expression, accepting the 5-field form.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| IntentError::InvalidCronExpression {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

fn next_after(schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

// ---------------------------------------------------------------------------
// CronScheduler
// ---------------------------------------------------------------------------

pub struct CronScheduler {
    jobs: Arc<RwLock<BTreeMap<String, ScheduledJob>>>,
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(BTreeMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Schedule `workflow` under `id`.  An existing job with the same id is
    /// replaced.
    pub async fn add_job(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        expression: &str,
        workflow: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        let name = name.into();
        let schedule = parse_schedule(expression)?;
        let next_run = next_after(&schedule, Utc::now());

        info!(job_id = %id, job_name = %name, cron = %expression, "adding cron job");

        let job = ScheduledJob {
            id: id.clone(),
            name,
            expression: expression.to_string(),
            schedule,
            workflow: workflow.into(),
            enabled: true,
            last_run: None,
            next_run,
        };
        if self.jobs.write().await.insert(id.clone(), job).is_some() {
            warn!(job_id = %id, "replaced existing cron job");
        }
        Ok(())
    }

    pub async fn remove_job(&self, id: &str) -> Result<ScheduledJob> {
        let removed = self.jobs.write().await.remove(id).ok_or_else(|| not_found(id))?;
        info!(job_id = %id, "cron job removed");
        Ok(removed)
    }

    /// Re-enable a job.  The next run is computed from now, so windows
    /// missed while disabled do not fire.
    pub async fn enable_job(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        job.enabled = true;
        job.next_run = next_after(&job.schedule, Utc::now());
        debug!(job_id = %id, "cron job enabled");
        Ok(())
    }

    pub async fn disable_job(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        job.enabled = false;
        debug!(job_id = %id, "cron job disabled");
        Ok(())
    }

    /// Snapshot of every job, ordered by id.
    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Spawn the background loop; due jobs are reported on `events`.
    pub fn start(&mut self, events: mpsc::UnboundedSender<CronEvent>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IntentError::SchedulerRunning);
        }

        let running = Arc::clone(&self.running);
        let jobs = Arc::clone(&self.jobs);

        self.handle = Some(tokio::spawn(async move {
            info!("cron scheduler started");
            while running.load(Ordering::SeqCst) {
                let now = Utc::now();
                for job in jobs.write().await.values_mut().filter(|j| j.is_due(now)) {
                    debug!(job_id = %job.id, workflow = %job.workflow, "cron job fired");
                    let event = CronEvent {
                        job_id: job.id.clone(),
                        job_name: job.name.clone(),
                        workflow: job.workflow.clone(),
                        fired_at: now,
                    };
                    if let Err(e) = events.send(event) {
                        error!(job_id = %job.id, error = %e, "failed to send cron event");
                    }
                    job.last_run = Some(now);
                    job.next_run = next_after(&job.schedule, now);
                }
                tokio::time::sleep(TICK).await;
            }
            info!("cron scheduler stopped");
        }));
        Ok(())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("stop called but scheduler is not running");
            return;
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "scheduler task panicked during shutdown");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> IntentError {
    IntentError::JobNotFound { job_id: id.to_string() }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_fields_get_a_seconds_field() {
        assert_eq!(normalize_cron_expr("30 9 * * 1-5"), "0 30 9 * * 1-5");
        assert_eq!(normalize_cron_expr(" 0 30 9 * * 1-5 "), "0 30 9 * * 1-5");
        assert!(parse_schedule("30 9 * * 1-5").is_ok());
        assert!(parse_schedule("0 30 9 * * 1-5").is_ok());
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        let err = parse_schedule("not a cron").unwrap_err();
        assert!(matches!(err, IntentError::InvalidCronExpression { .. }));
    }

    #[tokio::test]
    async fn jobs_are_keyed_by_id() {
        let scheduler = CronScheduler::new();
        scheduler.add_job("b", "nightly", "0 2 * * *", "nightly.json").await.unwrap();
        scheduler.add_job("a", "hourly", "0 * * * *", "hourly.json").await.unwrap();
        scheduler.add_job("a", "hourly v2", "0 * * * *", "hourly2.json").await.unwrap();

        let jobs = scheduler.list_jobs().await;
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(jobs[0].workflow, "hourly2.json");
        assert!(jobs.iter().all(|j| j.next_run.is_some()));
    }

    #[tokio::test]
    async fn enable_disable_and_remove() {
        let scheduler = CronScheduler::new();
        scheduler.add_job("j", "job", "* * * * *", "wf.json").await.unwrap();

        scheduler.disable_job("j").await.unwrap();
        assert!(!scheduler.list_jobs().await[0].enabled);
        scheduler.enable_job("j").await.unwrap();
        assert!(scheduler.list_jobs().await[0].enabled);

        assert_eq!(scheduler.remove_job("j").await.unwrap().workflow, "wf.json");
        assert!(matches!(
            scheduler.remove_job("j").await,
            Err(IntentError::JobNotFound { .. })
        ));
        assert!(scheduler.disable_job("j").await.is_err());
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = CronScheduler::new();
        scheduler.start(tx.clone()).unwrap();
        assert!(matches!(scheduler.start(tx), Err(IntentError::SchedulerRunning)));
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn due_jobs_emit_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = CronScheduler::new();
        scheduler.add_job("fast", "every second", "* * * * * *", "report.json").await.unwrap();
        scheduler.add_job("off", "disabled", "* * * * * *", "never.json").await.unwrap();
        scheduler.disable_job("off").await.unwrap();
        scheduler.start(tx).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        scheduler.stop().await;

        let event = event.expect("timed out waiting for cron event").expect("channel closed");
        assert_eq!(event.job_id, "fast");
        assert_eq!(event.workflow, "report.json");
        let fast = &scheduler.list_jobs().await[0];
        assert!(fast.last_run.is_some());
    }
}
