//! Job and artifact types produced by the orchestrator.

use crate::backend::ArtifactHandle;
use crate::error::FileError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a conversion job.
///
/// `Idle → Running → Succeeded | Failed`. The two terminal states are final
/// for that job; a new `start` creates a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        })
    }
}

/// One converted file.
#[derive(Debug, Clone, Serialize)]
pub struct ResultArtifact {
    /// Position of the source file in the job's snapshot.
    pub source_index: usize,
    pub source_name: String,
    /// `source_name` up to its first dot, plus `.` and the target format.
    pub output_name: String,
    /// Byte size when the backend returned an in-memory artifact.
    pub size_bytes: Option<u64>,
    #[serde(skip)]
    pub handle: ArtifactHandle,
    /// Wall-clock time of the backend call, retries included.
    pub duration_ms: u64,
}

/// Timing and counts for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_files: usize,
    pub converted_files: usize,
    pub failed_files: usize,
    /// Sum of retries across all files.
    pub retries: u32,
    pub total_duration_ms: u64,
}

/// One orchestration run over a batch snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub target_format: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Artifacts in snapshot order; files that failed are absent.
    pub outputs: Vec<ResultArtifact>,
    /// Per-file failures in snapshot order.
    pub failures: Vec<FileError>,
    pub stats: JobStats,
}

impl ConversionJob {
    /// A fresh `Idle` job for `total_files` inputs.
    pub fn new(target_format: impl Into<String>, total_files: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Idle,
            target_format: target_format.into(),
            started_at: None,
            finished_at: None,
            outputs: Vec::new(),
            failures: Vec::new(),
            stats: JobStats {
                total_files,
                ..JobStats::default()
            },
        }
    }

    /// Output names in snapshot order.
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|a| a.output_name.as_str()).collect()
    }

    /// `true` when at least one file failed but others converted.
    pub fn is_partial(&self) -> bool {
        !self.outputs.is_empty() && !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_idle_with_total() {
        let job = ConversionJob::new("png", 3);
        assert_eq!(job.status, JobStatus::Idle);
        assert_eq!(job.stats.total_files, 3);
        assert!(job.started_at.is_none());
        assert!(!job.is_partial());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Idle.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Succeeded).unwrap(), "\"succeeded\"");
        assert_eq!(JobStatus::Running.to_string(), "running");
    }

    #[test]
    fn artifact_json_skips_handle() {
        let a = ResultArtifact {
            source_index: 0,
            source_name: "a.jpg".into(),
            output_name: "a.png".into(),
            size_bytes: Some(3),
            handle: ArtifactHandle::from_bytes(vec![1, 2, 3]),
            duration_ms: 5,
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["output_name"], "a.png");
        assert!(json.get("handle").is_none());
    }
}
