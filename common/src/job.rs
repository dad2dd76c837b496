use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{de_id, de_opt_timestamp, de_progress, de_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Initializing,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Initializing => "initializing",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-side training run. The client only ever holds a polled copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    #[serde(alias = "job_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "training_name")]
    pub name: Option<String>,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "de_progress")]
    pub progress: u8,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
}

impl TrainingJob {
    /// Local placeholder for a job the server just accepted.
    pub fn queued(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Anything whose lifecycle can still change on the server.
pub trait JobLike {
    fn is_active(&self) -> bool;
}

impl JobLike for JobStatus {
    fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl JobLike for TrainingJob {
    fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// True while at least one record is non-terminal.
pub fn any_active<J: JobLike>(jobs: &[J]) -> bool {
    jobs.iter().any(JobLike::is_active)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub name: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartTrainingReply {
    #[serde(alias = "id", deserialize_with = "de_id")]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Metadata for a document uploaded for training. No lifecycle beyond create/delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    #[serde(alias = "file_id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(alias = "filename", alias = "original_filename")]
    pub name: String,
    #[serde(default, alias = "file_size")]
    pub size: u64,
    #[serde(rename = "type", default, alias = "content_type", alias = "file_type")]
    pub file_type: String,
    #[serde(
        default,
        alias = "upload_date",
        alias = "created_at",
        deserialize_with = "de_opt_timestamp"
    )]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        for status in [JobStatus::Queued, JobStatus::Initializing, JobStatus::Running] {
            assert!(!status.is_terminal());
            assert!(status.is_active());
        }
    }

    #[test]
    fn test_any_active() {
        let mut done = TrainingJob::queued("1", "a");
        done.status = JobStatus::Completed;
        let mut failed = TrainingJob::queued("2", "b");
        failed.status = JobStatus::Failed;
        assert!(!any_active(&[done.clone(), failed.clone()]));
        assert!(!any_active::<TrainingJob>(&[]));

        let running = TrainingJob {
            status: JobStatus::Running,
            ..TrainingJob::queued("3", "c")
        };
        assert!(any_active(&[done, running, failed]));
    }

    #[test]
    fn test_job_from_backend_shape() {
        let job: TrainingJob = serde_json::from_str(
            r#"{"job_id": 12, "status": "initializing", "progress": 12.6,
                "created_at": "2024-05-01T10:00:00.5", "completed_at": null}"#,
        )
        .unwrap();
        assert_eq!(job.id, "12");
        assert_eq!(job.status, JobStatus::Initializing);
        assert_eq!(job.progress, 13);
        assert!(job.completed_at.is_none());
        assert_eq!(job.display_name(), "12");
    }

    #[test]
    fn test_job_rejects_bad_progress() {
        let result: Result<TrainingJob, _> = serde_json::from_str(
            r#"{"id": "x", "status": "running", "progress": 140,
                "created_at": "2024-05-01T10:00:00Z"}"#,
        );
        assert!(result.unwrap_err().to_string().contains("progress out of range"));
    }

    #[test]
    fn test_uploaded_file_aliases() {
        let file: UploadedFile = serde_json::from_str(
            r#"{"file_id": "f1", "filename": "manual.pdf", "file_size": 2048,
                "content_type": "application/pdf", "upload_date": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(file.name, "manual.pdf");
        assert_eq!(file.size, 2048);
        assert!(file.file_type.contains("pdf"));
        assert!(file.uploaded_at.is_some());
    }
}
