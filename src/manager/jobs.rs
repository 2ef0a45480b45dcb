// src/manager/jobs.rs — Install job state machine
//
// Two job families share this shape: runtime-manager bootstrap and model
// installs. States only move forward; done and failed are terminal.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Downloading,
    Installing,
    Done,
    Failed,
}

impl JobStatus {
    /// Wire code: queued 0, downloading 1, installing 2, done 3, failed -1.
    pub fn code(self) -> i8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 1,
            JobStatus::Installing => 2,
            JobStatus::Done => 3,
            JobStatus::Failed => -1,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 1,
            JobStatus::Installing => 2,
            JobStatus::Done => 3,
            JobStatus::Failed => 4,
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            0 => Ok(JobStatus::Queued),
            1 => Ok(JobStatus::Downloading),
            2 => Ok(JobStatus::Installing),
            3 => Ok(JobStatus::Done),
            -1 => Ok(JobStatus::Failed),
            other => Err(D::Error::custom(format!("unknown job status {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallJob {
    pub model: String,
    #[serde(default)]
    pub parameters: String,
    pub status: JobStatus,
    /// Fraction in [0, 1].
    pub progress: f32,
    /// Human-readable progress notice shown by the UI.
    #[serde(default)]
    pub notice: String,
}

impl InstallJob {
    pub fn queued(model: impl Into<String>, parameters: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parameters: parameters.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            notice: String::new(),
        }
    }

    /// Advance the job. Backward transitions and writes after a terminal
    /// state are ignored, so progress observed by pollers is monotone.
    pub fn advance(&mut self, status: JobStatus, progress: f32, notice: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        if status.rank() < self.status.rank() {
            return;
        }
        self.status = status;
        self.progress = progress.clamp(0.0, 1.0).max(self.progress);
        self.notice = notice.into();
    }
}
