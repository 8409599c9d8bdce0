//! In-process job registry backing `AnalysisService` (`spec.md` §4.5, §4.8).
//!
//! Jobs live only in this process's memory — there is no persistence layer.
//! A job moves `queued -> running -> {completed|failed|cancelled}`; any other
//! transition is dropped with a warning rather than treated as an error,
//! since a late/duplicate status update from a background task racing a
//! cancellation is expected, not exceptional.

mod store;
mod subscription;

pub use store::JobStore;
pub use subscription::JobSubscription;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether `self -> next` is a legal state transition.
    fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub team_id: i32,
    /// `None` until the background task resolves a caller-omitted gameweek;
    /// always `Some` once the job leaves `queued`.
    pub gameweek: Option<i32>,
    pub status: JobStatus,
    pub phase: Option<String>,
    pub progress: Option<f32>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
}

impl Job {
    fn new(id: String, team_id: i32, gameweek: Option<i32>) -> Self {
        Self {
            id,
            team_id,
            gameweek,
            status: JobStatus::Queued,
            phase: None,
            progress: None,
            created_at: now_secs(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}

/// Events pushed to `JobSubscription` consumers, one-to-one with the
/// WebSocket frame kinds in `spec.md` §4.8 (heartbeat is generated by the
/// streaming layer itself, not stored here).
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress { progress: f32, phase: String },
    Complete { result: serde_json::Value },
    Error { code: String, message: String },
    Cancelled,
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn generate_job_id() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_generate_job_id_shape() {
        let id = generate_job_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
