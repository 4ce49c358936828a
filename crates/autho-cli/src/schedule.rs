//! Subcommand: `autho schedule` -- run a workflow file on a cron schedule.
//!
//! Each fired event reloads the workflow from disk and runs it on a
//! blocking thread, so runs never share a context.  At most one run is in
//! flight; events that fire while the previous run is still going are
//! skipped with a warning.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use autho_intent::scheduler::parse_schedule;
use autho_intent::{CronEvent, CronScheduler, RunReport, WorkflowExecutor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AuthoConfig;
use crate::helpers::{build_executor, build_registry, load_workflow, pretty};

const JOB_ID: &str = "cli";

pub fn cmd_schedule(config: &AuthoConfig, file: PathBuf, cron: &str) -> Result<ExitCode> {
    // Fail before starting if either input is bad.
    let workflow = load_workflow(&file)?;
    parse_schedule(cron)?;

    // Created outside the runtime; the blocking HTTP client must not be
    // dropped on an async worker.
    let executor = build_executor(config, build_registry(config));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(run_schedule(&executor, &workflow.name, &file, cron))?;
    Ok(ExitCode::SUCCESS)
}

async fn run_schedule(
    executor: &WorkflowExecutor,
    name: &str,
    file: &Path,
    cron: &str,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = CronScheduler::new();
    scheduler
        .add_job(JOB_ID, name, cron, file.display().to_string())
        .await?;
    scheduler.start(tx)?;

    if let Some(job) = scheduler.list_jobs().await.first()
        && let Some(next) = job.next_run
    {
        info!(workflow = %name, cron = %cron, next_run = %next, "scheduler running, press Ctrl-C to stop");
    }

    let guard = RunGuard::default();
    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                dispatch(executor, &guard, event);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("interrupt received, stopping scheduler");
                break;
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Overlap guard
// ---------------------------------------------------------------------------

/// Tracks whether a scheduled run is in flight.
#[derive(Clone, Default)]
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    /// Claim the slot, or `None` if a run already holds it.
    fn try_acquire(&self) -> Option<RunPermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit(Arc::clone(&self.0)))
    }
}

/// Releases the slot when dropped, including when the run panics.
struct RunPermit(Arc<AtomicBool>);

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Start a run for `event` unless one is already in flight.
fn dispatch(executor: &WorkflowExecutor, guard: &RunGuard, event: CronEvent) -> Option<JoinHandle<()>> {
    let Some(permit) = guard.try_acquire() else {
        warn!(
            job_id = %event.job_id,
            workflow = %event.job_name,
            fired_at = %event.fired_at,
            "previous run still in progress, skipping"
        );
        return None;
    };

    info!(
        job_id = %event.job_id,
        workflow = %event.job_name,
        fired_at = %event.fired_at,
        "running scheduled workflow"
    );

    let executor = executor.clone();
    let path = PathBuf::from(&event.workflow);
    Some(tokio::spawn(async move {
        let run = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_once(&executor, &path)
        });
        match run.await {
            Ok(Ok(report)) => {
                println!("{}", pretty(&report));
                if report.is_success() {
                    info!(workflow = %report.workflow, duration = report.duration, "scheduled run completed");
                } else {
                    warn!(
                        workflow = %report.workflow,
                        failed_step = report.failed_step.as_deref().unwrap_or_default(),
                        "scheduled run failed"
                    );
                }
            }
            Ok(Err(e)) => {
                error!(job_id = %event.job_id, error = %e, "scheduled run could not start")
            }
            Err(e) => error!(job_id = %event.job_id, error = %e, "scheduled run panicked"),
        }
    }))
}

/// Load a fresh copy of the workflow and run it.
fn run_once(executor: &WorkflowExecutor, path: &Path) -> Result<RunReport> {
    let mut workflow = load_workflow(path)?;
    Ok(executor.run(&mut workflow))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use autho_kernel::{CapabilityRegistry, Params};
    use serde_json::Value;

    fn event(path: &Path) -> CronEvent {
        CronEvent {
            job_id: JOB_ID.into(),
            job_name: "slow".into(),
            workflow: path.display().to_string(),
            fired_at: Default::default(),
        }
    }

    #[test]
    fn guard_admits_one_holder_at_a_time() {
        let guard = RunGuard::default();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn events_during_a_run_are_skipped() {
        let runs = Arc::new(AtomicU32::new(0));
        let registry = CapabilityRegistry::new();
        let counter = Arc::clone(&runs);
        registry.register_fn("slow", "sleeps then counts", move |_: &Params| {
            std::thread::sleep(Duration::from_millis(100));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let executor = WorkflowExecutor::new(Arc::new(registry));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.json");
        std::fs::write(&path, r#"{"name":"slow","steps":[{"name":"a","type":"slow"}]}"#).unwrap();

        let guard = RunGuard::default();
        let first = dispatch(&executor, &guard, event(&path)).unwrap();
        assert!(dispatch(&executor, &guard, event(&path)).is_none());
        first.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        dispatch(&executor, &guard, event(&path)).unwrap().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
