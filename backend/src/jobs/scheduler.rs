// Job Scheduler - Drives waiting executions and the timeout watchdog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::workflows::WorkflowEngine;

const MAX_EXECUTION_LOGS: usize = 100;

pub const RESUME_TICK_JOB: &str = "resume_tick";
pub const TIMEOUT_SWEEP_JOB: &str = "timeout_sweep";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Workflow engine error: {0}")]
    EngineError(#[from] AppError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    /// How often waiting executions are checked (seconds)
    pub tick_seconds: u64,
    /// How often the timeout watchdog runs (minutes, 1-59)
    pub timeout_sweep_minutes: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 30,
            timeout_sweep_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

type ExecutionLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<WorkflowEngine>,
    config: JobConfig,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, config: JobConfig) -> JobResult<Self> {
        if config.tick_seconds == 0 {
            return Err(JobError::ConfigError("tick interval must be positive".to_string()));
        }
        if !(1..60).contains(&config.timeout_sweep_minutes) {
            return Err(JobError::ConfigError(format!(
                "timeout sweep interval must be 1-59 minutes, got {}",
                config.timeout_sweep_minutes
            )));
        }

        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting workflow job scheduler");

        self.schedule_resume_tick().await?;
        self.schedule_timeout_sweep().await?;

        self.scheduler.start().await?;

        info!("Workflow job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down workflow job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_resume_tick(&self) -> JobResult<()> {
        let interval = Duration::from_secs(self.config.tick_seconds);
        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                run_resume_tick(&engine, &logs).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled resume tick every {} seconds", self.config.tick_seconds);

        Ok(())
    }

    async fn schedule_timeout_sweep(&self) -> JobResult<()> {
        let interval = self.config.timeout_sweep_minutes;
        let cron_expr = format!("0 */{} * * * *", interval);

        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                run_timeout_sweep(&engine, &logs).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled timeout sweep every {} minutes", interval);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<()> {
        let log = match job_name {
            RESUME_TICK_JOB => run_resume_tick(&self.engine, &self.execution_logs).await,
            TIMEOUT_SWEEP_JOB => run_timeout_sweep(&self.engine, &self.execution_logs).await,
            _ => return Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        };

        match log.errors.first() {
            Some(message) if log.status == JobStatus::Failed => {
                Err(JobError::EngineError(AppError::InternalError(message.clone())))
            }
            _ => Ok(()),
        }
    }
}

async fn run_resume_tick(engine: &WorkflowEngine, logs: &ExecutionLogs) -> JobExecutionLog {
    let started_at = Utc::now();
    let result = engine.tick(started_at).await;

    if let Ok(resumed) = &result {
        if !resumed.is_empty() {
            info!("Resume tick completed: {} executions resumed", resumed.len());
        }
    }

    finish_job("Resume Tick", started_at, result.map(|ids| ids.len()), logs).await
}

async fn run_timeout_sweep(engine: &WorkflowEngine, logs: &ExecutionLogs) -> JobExecutionLog {
    let started_at = Utc::now();
    info!("Running timeout sweep");
    let result = engine.sweep_timeouts(started_at).await;

    finish_job("Timeout Sweep", started_at, result.map(|ids| ids.len()), logs).await
}

async fn finish_job(
    job_name: &str,
    started_at: DateTime<Utc>,
    result: Result<usize, AppError>,
    logs: &ExecutionLogs,
) -> JobExecutionLog {
    let completed_at = Utc::now();

    let (status, items_processed, errors) = match result {
        Ok(count) => (JobStatus::Completed, count as i32, Vec::new()),
        Err(e) => {
            error!("{} failed: {}", job_name, e);
            (JobStatus::Failed, 0, vec![e.to_string()])
        }
    };

    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: job_name.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status,
        items_processed,
        errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    };

    push_log(logs, log.clone()).await;
    log
}

async fn push_log(logs: &ExecutionLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}
