use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    AdapterConfig, ErrorPolicy, Pipeline, PipelineId, TransformationConfig,
};

/// Unique identifier of a [`Job`].
pub type JobId = Uuid;

/// Lifecycle state of a job.
///
/// Legal transitions are `pending → running → {completed | failed}`,
/// `pending → cancelled`, and `running → cancelled`. Everything else is
/// rejected with an invalid transition error by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns `true` when the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns `true` when moving from `self` to `next` follows a legal edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One line of a job's append-only execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// One entry in a job's error list.
///
/// Kept separate from [`LogEntry`] because clients and alerting consume errors
/// independently of the log stream. Appending an error always increments the
/// job's `error_count` but never changes its status by itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            details,
        }
    }
}

/// Frozen copy of the pipeline configuration a job executes against.
///
/// Taken at job creation so edits to the pipeline cannot corrupt a job that is
/// already queued or running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub pipeline_name: String,
    pub source_type: String,
    pub source_config: AdapterConfig,
    pub destination_type: String,
    pub destination_config: AdapterConfig,
    #[serde(default)]
    pub transformation: Option<TransformationConfig>,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl From<&Pipeline> for PipelineSnapshot {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            pipeline_name: pipeline.name.clone(),
            source_type: pipeline.source_type.clone(),
            source_config: pipeline.source_config.clone(),
            destination_type: pipeline.destination_type.clone(),
            destination_config: pipeline.destination_config.clone(),
            transformation: pipeline.transformation.clone(),
            error_policy: pipeline.error_policy,
        }
    }
}

/// One execution attempt of a pipeline.
///
/// Owned by at most one executor worker while running; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub snapshot: PipelineSnapshot,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_record_count: u64,
    #[serde(default)]
    pub destination_record_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub errors: Vec<JobError>,
}

impl Job {
    /// Creates a new pending job for the given pipeline, freezing its configuration.
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            snapshot: PipelineSnapshot::from(pipeline),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            source_record_count: 0,
            destination_record_count: 0,
            error_count: 0,
            logs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Seconds between `started_at` and `completed_at`, when both are set.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_seconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_are_exactly_the_five_edges() {
        use JobStatus::*;

        let all = [Pending, Running, Completed, Failed, Cancelled];
        let legal = [
            (Pending, Running),
            (Pending, Cancelled),
            (Running, Completed),
            (Running, Failed),
            (Running, Cancelled),
        ];

        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn duration_requires_both_timestamps() {
        use crate::types::PipelineStatus;

        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: "p".into(),
            description: None,
            source_type: "memory".into(),
            source_config: AdapterConfig::new(),
            destination_type: "memory".into(),
            destination_config: AdapterConfig::new(),
            transformation: None,
            schedule: None,
            status: PipelineStatus::Active,
            error_policy: ErrorPolicy::Retry,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            job_count: 0,
            success_count: 0,
            last_run_at: None,
        };

        let mut job = Job::new(&pipeline);
        assert_eq!(job.duration_seconds(), None);

        job.started_at = Some(Utc::now());
        assert_eq!(job.duration_seconds(), None);

        job.completed_at = Some(job.started_at.unwrap() + chrono::Duration::seconds(5));
        assert_eq!(job.duration_seconds(), Some(5));
    }
}
