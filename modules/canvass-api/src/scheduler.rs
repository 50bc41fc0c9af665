//! Interval scheduler for full pipeline runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use canvass_common::types::Trigger;
use canvass_pipeline::{Pipeline, PipelineLock, PipelineOutcome};

/// How often `wait_for_idle` re-checks the lock.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Background task that runs the pipeline every `interval`. The first run
/// happens one interval after start. `running` mirrors the task's liveness
/// for the health endpoint.
pub struct Scheduler {
    task: JoinHandle<()>,
    stop: watch::Sender<bool>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn start(pipeline: Arc<Pipeline>, interval: Duration, running: Arc<AtomicBool>) -> Self {
        running.store(true, Ordering::Relaxed);
        info!(interval_secs = interval.as_secs(), "scheduler_started");

        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // The stop signal is only observed between runs; a run that
                // has started always reaches its terminal status.
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = stopped.changed() => break,
                }
                run_tick(&pipeline).await;
                if *stopped.borrow() {
                    break;
                }
            }
        });

        Self { task, stop, running }
    }

    /// Stop ticking and wait for an in-flight scheduled run to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        self.running.store(false, Ordering::Relaxed);
        info!("scheduler_stopped");
    }
}

/// Resolve once no pipeline run holds the lock. Used at shutdown so manual
/// runs spawned by the HTTP layer finish before the process exits.
pub async fn wait_for_idle(lock: &PipelineLock) {
    if let Some(holder) = lock.current_holder() {
        info!(%holder, "Waiting for in-flight pipeline run to finish");
    }
    while lock.is_running() {
        tokio::time::sleep(IDLE_POLL).await;
    }
}

async fn run_tick(pipeline: &Pipeline) {
    if let Some(holder) = pipeline.lock().current_holder() {
        info!(%holder, "Scheduler tick: pipeline already running, skipping");
        return;
    }

    match pipeline.run_full_pipeline(Trigger::Scheduler).await {
        Ok(PipelineOutcome::Completed(summary)) => {
            info!("Scheduled pipeline run finished. {summary}");
        }
        Ok(PipelineOutcome::Skipped { run_id, holder }) => {
            warn!(%run_id, holder = ?holder, "Scheduled run lost the lock race");
        }
        Err(e) => {
            error!(error = %e, "Scheduled pipeline run could not start");
        }
    }
}
