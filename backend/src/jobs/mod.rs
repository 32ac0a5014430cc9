// Background Jobs
//
// Scheduled jobs that keep workflow executions moving: the resume tick picks
// up waiting executions, the timeout sweep stops runs that exceeded their limit.

pub mod scheduler;

pub use scheduler::{JobConfig, JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
