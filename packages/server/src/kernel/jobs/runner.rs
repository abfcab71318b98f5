//! Job runner: a pool of workers plus the stale-job sweeper.
//!
//! # Architecture
//!
//! ```text
//! JobRunner::start
//!     │
//!     ├─► JobWorker × worker_count   (claim → execute → complete/fail)
//!     └─► sweeper                    (every sweep_interval: fail_stale + retries)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let runner = JobRunner::new(deps, Arc::new(PipelineHandler), RunnerConfig::from_config(&config));
//! let handle = runner.start();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::handler::JobHandler;
use super::retry::RetryPolicy;
use super::worker::{failure_outcome, JobWorker, JobWorkerConfig};
use crate::config::Config;
use crate::kernel::ServerDeps;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub poll_jitter: Duration,
    pub retry_policy: RetryPolicy,
    /// A running job older than this is presumed orphaned
    pub lease_timeout: Duration,
    pub sweep_interval: Duration,
    /// Workers exit once a claim comes back empty
    pub shutdown_when_queue_empty: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval: Duration::from_secs(1),
            poll_jitter: Duration::from_millis(100),
            retry_policy: RetryPolicy::default(),
            lease_timeout: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            shutdown_when_queue_empty: false,
        }
    }
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            poll_interval: config.worker_poll_interval,
            poll_jitter: config.worker_poll_jitter,
            retry_policy: RetryPolicy {
                max_attempts: config.job_max_attempts.max(1),
                base_delay: config.job_retry_base_delay,
                max_delay: config.job_retry_max_delay,
            },
            lease_timeout: config.job_lease_timeout,
            sweep_interval: config.stale_sweep_interval,
            shutdown_when_queue_empty: false,
        }
    }

    fn worker_config(&self, index: usize) -> JobWorkerConfig {
        JobWorkerConfig {
            poll_interval: self.poll_interval,
            jitter: self.poll_jitter,
            retry_policy: self.retry_policy,
            shutdown_when_queue_empty: self.shutdown_when_queue_empty,
            worker_id: format!("worker-{}", index),
        }
    }
}

pub struct JobRunner {
    deps: Arc<ServerDeps>,
    handler: Arc<dyn JobHandler>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(deps: Arc<ServerDeps>, handler: Arc<dyn JobHandler>, config: RunnerConfig) -> Self {
        Self {
            deps,
            handler,
            config,
        }
    }

    /// Spawn the workers and the sweeper onto the current runtime.
    pub fn start(self) -> RunHandle {
        let shutdown = CancellationToken::new();

        info!(
            worker_count = self.config.worker_count,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.retry_policy.max_attempts,
            lease_timeout_secs = self.config.lease_timeout.as_secs(),
            "job runner starting"
        );

        let workers = (0..self.config.worker_count)
            .map(|index| {
                let worker = JobWorker::new(
                    self.deps.clone(),
                    self.handler.clone(),
                    self.config.worker_config(index),
                );
                tokio::spawn(worker.run(shutdown.child_token()))
            })
            .collect();

        let sweeper = Sweeper {
            deps: self.deps,
            handler: self.handler,
            retry_policy: self.config.retry_policy,
            lease_timeout: self.config.lease_timeout,
            interval: self.config.sweep_interval,
        };
        let sweeper = tokio::spawn(sweeper.run(shutdown.child_token()));

        RunHandle {
            shutdown,
            workers,
            sweeper,
        }
    }
}

/// Handle to a started runner.
pub struct RunHandle {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
}

impl RunHandle {
    /// Signal every task to stop and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        join_all(self.workers, "worker").await;
        join_one(self.sweeper, "sweeper").await;
        info!("job runner stopped");
    }

    /// Wait for the workers to exit on their own (queue drained with
    /// `shutdown_when_queue_empty`), then stop the sweeper.
    pub async fn wait_for_shutdown(self) {
        join_all(self.workers, "worker").await;
        self.shutdown.cancel();
        join_one(self.sweeper, "sweeper").await;
        info!("job runner stopped");
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>, task: &str) {
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(task, error = %e, "runner task panicked");
        }
    }
}

async fn join_one(handle: JoinHandle<()>, task: &str) {
    if let Err(e) = handle.await {
        error!(task, error = %e, "runner task panicked");
    }
}

/// Periodically fails orphaned running jobs and feeds them through the same
/// retry path a worker-observed failure takes.
struct Sweeper {
    deps: Arc<ServerDeps>,
    handler: Arc<dyn JobHandler>,
    retry_policy: RetryPolicy,
    lease_timeout: Duration,
    interval: Duration,
}

impl Sweeper {
    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "stale job sweep failed");
                    }
                }
            }
        }
    }

    async fn sweep_once(&self) -> Result<usize> {
        let swept = self
            .deps
            .job_queue
            .fail_stale(self.lease_timeout, &self.retry_policy)
            .await?;
        if swept.is_empty() {
            return Ok(0);
        }

        warn!(count = swept.len(), "failed jobs with expired leases");
        for failed in &swept {
            let outcome = failure_outcome(failed);
            if let Err(e) = self.handler.after_job(&failed.job, &outcome, &self.deps).await {
                error!(job_id = %failed.job.id, error = %e, "post-job hook failed for swept job");
            }
        }
        Ok(swept.len())
    }
}

/// One-shot sweep, for operators and tests. Returns how many jobs were failed.
pub async fn sweep_stale_jobs(
    deps: Arc<ServerDeps>,
    handler: Arc<dyn JobHandler>,
    retry_policy: RetryPolicy,
    lease_timeout: Duration,
) -> Result<usize> {
    Sweeper {
        deps,
        handler,
        retry_policy,
        lease_timeout,
        interval: Duration::from_secs(60),
    }
    .sweep_once()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_configs_share_runner_settings() {
        let config = RunnerConfig {
            poll_interval: Duration::from_millis(250),
            shutdown_when_queue_empty: true,
            ..Default::default()
        };

        let worker = config.worker_config(2);
        assert_eq!(worker.worker_id, "worker-2");
        assert_eq!(worker.poll_interval, Duration::from_millis(250));
        assert!(worker.shutdown_when_queue_empty);
        assert_eq!(worker.retry_policy, config.retry_policy);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RunnerConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.lease_timeout, Duration::from_secs(900));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.retry_policy.max_attempts, 3);
    }
}
