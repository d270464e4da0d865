//! Background job scheduler.
//!
//! Runs the Auto-Check pass on a cron schedule (monthly by default).
//! Requires the `background-jobs` feature to be enabled.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keyward::jobs::{JobScheduler, JobConfig};
//!
//! let scheduler = JobScheduler::new(engine, JobConfig::default()).await?;
//! scheduler.start().await?;
//! ```

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tracing::{error, info};

use crate::engine::LifecycleEngine;

mod auto_check;

pub use auto_check::run_auto_check;

/// Configuration for background jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Cron expression for the Auto-Check pass (default: monthly,
    /// 03:00 on the 1st)
    pub auto_check_cron: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // 03:00 on the first day of every month
            auto_check_cron: "0 0 3 1 * *".to_string(),
        }
    }
}

/// Background job scheduler.
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    engine: Arc<LifecycleEngine>,
    config: JobConfig,
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub async fn new(engine: Arc<LifecycleEngine>, config: JobConfig) -> Result<Self, JobError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        Ok(Self {
            scheduler,
            engine,
            config,
        })
    }

    /// Start the job scheduler with all configured jobs.
    pub async fn start(&self) -> Result<(), JobError> {
        info!("Starting keyward job scheduler");

        self.add_auto_check_job().await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!("Keyward job scheduler started successfully");

        Ok(())
    }

    /// Stop the job scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobError> {
        info!("Shutting down keyward job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        Ok(())
    }

    /// Add the Auto-Check job.
    async fn add_auto_check_job(&self) -> Result<(), JobError> {
        let engine = Arc::clone(&self.engine);

        let job = Job::new_async(self.config.auto_check_cron.as_str(), move |_uuid, _l| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                match run_auto_check(&engine).await {
                    Ok(report) => {
                        info!(
                            examined = report.examined,
                            auto_expired = report.auto_expired,
                            grace_expired = report.grace_expired,
                            inactive_flagged = report.inactive_flagged,
                            errors = report.errors,
                            "Auto-check pass completed"
                        );
                    }
                    Err(e) => {
                        error!("Auto-check pass failed: {e}");
                    }
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added auto-check job (schedule: {})",
            self.config.auto_check_cron
        );

        Ok(())
    }

    /// Run the Auto-Check pass immediately (manual trigger).
    pub async fn run_auto_check_now(&self) -> Result<crate::engine::PassReport, JobError> {
        run_auto_check(&self.engine).await
    }
}

/// Errors that can occur in the job scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Job execution error: {0}")]
    ExecutionError(String),
}

impl From<crate::errors::EngineError> for JobError {
    fn from(err: crate::errors::EngineError) -> Self {
        JobError::ExecutionError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = JobConfig::default();
        assert_eq!(config.auto_check_cron, "0 0 3 1 * *");
    }
}
