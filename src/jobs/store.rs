use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::subscription::{JobSender, JobSubscription};
use super::{generate_job_id, now_secs, Job, JobError, JobEvent, JobStatus};

struct Entry {
    job: Job,
    subscribers: Vec<JobSender>,
}

/// In-process registry of jobs. Cloned handles share the same underlying
/// state (`Arc`-backed), matching the single-process deployment model in
/// `spec.md` §5: no cross-instance job visibility.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, Entry>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, team_id: i32, gameweek: Option<i32>) -> Job {
        let id = generate_job_id();
        let job = Job::new(id.clone(), team_id, gameweek);
        let snapshot = job.clone();
        self.jobs.write().await.insert(
            id,
            Entry {
                job,
                subscribers: Vec::new(),
            },
        );
        snapshot
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).map(|e| e.job.clone())
    }

    /// Records the gameweek resolved by the background task when the caller
    /// omitted one. Does not touch `status`; safe to call any time before
    /// the job reaches a terminal state.
    pub async fn set_gameweek(&self, id: &str, gameweek: i32) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(id) {
            entry.job.gameweek = Some(gameweek);
        }
    }

    pub async fn mark_running(&self, id: &str) {
        self.transition(id, JobStatus::Running, |job| {
            job.started_at = Some(now_secs());
        })
        .await;
    }

    pub async fn progress(&self, id: &str, progress: f32, phase: &str) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(id) else {
            return;
        };
        if entry.job.status != JobStatus::Running {
            return;
        }
        entry.job.progress = Some(progress);
        entry.job.phase = Some(phase.to_string());
        broadcast(
            entry,
            JobEvent::Progress {
                progress,
                phase: phase.to_string(),
            },
        );
    }

    pub async fn complete(&self, id: &str, result: serde_json::Value) {
        let event = JobEvent::Complete {
            result: result.clone(),
        };
        self.transition_and_broadcast(id, JobStatus::Completed, event, |job| {
            job.result = Some(result);
            job.finished_at = Some(now_secs());
        })
        .await;
    }

    pub async fn fail(&self, id: &str, code: &str, message: &str) {
        let event = JobEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        };
        let code = code.to_string();
        let message = message.to_string();
        self.transition_and_broadcast(id, JobStatus::Failed, event, |job| {
            job.error = Some(JobError { code, message });
            job.finished_at = Some(now_secs());
        })
        .await;
    }

    pub async fn cancel(&self, id: &str) {
        self.transition_and_broadcast(id, JobStatus::Cancelled, JobEvent::Cancelled, |job| {
            job.finished_at = Some(now_secs());
        })
        .await;
    }

    pub async fn subscribe(&self, id: &str) -> Option<JobSubscription> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(id)?;
        let (sender, subscription) = JobSender::new();
        entry.subscribers.push(sender);
        Some(subscription)
    }

    /// Removes terminal jobs whose `finished_at` is older than `retention`.
    /// Run periodically from a background task spawned in `server.rs`.
    pub async fn reap(&self, retention: Duration) {
        let cutoff = now_secs().saturating_sub(retention.as_secs());
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, entry| match entry.job.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
    }

    async fn transition(&self, id: &str, next: JobStatus, mutate: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(id) else {
            return;
        };
        if !entry.job.status.can_transition_to(next) {
            tracing::warn!(job_id = id, from = ?entry.job.status, to = ?next, "dropped illegal job transition");
            return;
        }
        entry.job.status = next;
        mutate(&mut entry.job);
    }

    async fn transition_and_broadcast(
        &self,
        id: &str,
        next: JobStatus,
        event: JobEvent,
        mutate: impl FnOnce(&mut Job),
    ) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(id) else {
            return;
        };
        if !entry.job.status.can_transition_to(next) {
            tracing::warn!(job_id = id, from = ?entry.job.status, to = ?next, "dropped illegal job transition");
            return;
        }
        entry.job.status = next;
        mutate(&mut entry.job);
        broadcast(entry, event);
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn broadcast(entry: &mut Entry, event: JobEvent) {
    for subscriber in &entry.subscribers {
        subscriber.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = JobStore::new();
        let job = store.create(711511, Some(22)).await;
        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.team_id, 711511);
    }

    #[tokio::test]
    async fn test_set_gameweek_resolves_omitted_gameweek() {
        let store = JobStore::new();
        let job = store.create(711511, None).await;
        assert_eq!(job.gameweek, None);
        store.set_gameweek(&job.id, 22).await;
        assert_eq!(store.get(&job.id).await.unwrap().gameweek, Some(22));
    }

    #[tokio::test]
    async fn test_full_lifecycle_to_completed() {
        let store = JobStore::new();
        let job = store.create(1, Some(22)).await;
        store.mark_running(&job.id).await;
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);

        store.progress(&job.id, 0.5, "scoring").await;
        assert_eq!(store.get(&job.id).await.unwrap().progress, Some(0.5));

        store.complete(&job.id, serde_json::json!({"ok": true})).await;
        let finished = store.get(&job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert!(finished.result.is_some());
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_dropped_not_applied() {
        let store = JobStore::new();
        let job = store.create(1, Some(22)).await;
        // queued -> completed is illegal; job stays queued.
        store.complete(&job.id, serde_json::json!({})).await;
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_subscriber_receives_progress_and_completion() {
        let store = JobStore::new();
        let job = store.create(1, Some(22)).await;
        store.mark_running(&job.id).await;
        let mut sub = store.subscribe(&job.id).await.unwrap();

        store.progress(&job.id, 0.3, "fetching").await;
        store.complete(&job.id, serde_json::json!({"done": true})).await;

        match sub.recv().await {
            JobEvent::Progress { progress, .. } => assert_eq!(progress, 0.3),
            other => panic!("unexpected: {other:?}"),
        }
        match sub.recv().await {
            JobEvent::Complete { .. } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reap_removes_old_terminal_jobs_only() {
        let store = JobStore::new();
        let active = store.create(1, Some(22)).await;
        let finished = store.create(2, Some(22)).await;
        store.mark_running(&finished.id).await;
        store.complete(&finished.id, serde_json::json!({})).await;

        {
            let mut jobs = store.jobs.write().await;
            jobs.get_mut(&finished.id).unwrap().job.finished_at = Some(0);
        }

        store.reap(Duration::from_secs(60)).await;

        assert!(store.get(&active.id).await.is_some());
        assert!(store.get(&finished.id).await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_job_returns_none() {
        let store = JobStore::new();
        assert!(store.subscribe("nope").await.is_none());
    }
}
