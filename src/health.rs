//! Component health reporting for `GET /health` (`spec.md` §4.9 ambient
//! stack). Each long-lived collaborator (Redis, upstream FPL, the job
//! reaper) gets a `HealthHandle` and reports healthy on its own cadence; the
//! registry combines them without itself depending on any of them being up.

use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComponentStatus {
    Starting,
    Healthy,
    Unhealthy,
    Stalled,
}

struct HealthMessage {
    component: String,
    healthy: bool,
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthHandle {
    pub async fn report_healthy(&self) {
        let message = HealthMessage {
            component: self.component.clone(),
            healthy: true,
        };
        if let Err(e) = self.sender.send(message).await {
            tracing::warn!(error = %e, component = self.component, "failed to report health status");
        }
    }

    pub async fn report_unhealthy(&self) {
        let message = HealthMessage {
            component: self.component.clone(),
            healthy: false,
        };
        if let Err(e) = self.sender.send(message).await {
            tracing::warn!(error = %e, component = self.component, "failed to report health status");
        }
    }
}

enum ReportedState {
    Starting,
    HealthyUntil(DateTime<Utc>),
    Unhealthy,
}

struct Deadline {
    state: ReportedState,
    deadline: Duration,
}

#[derive(Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, Deadline>>>,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<HealthMessage>(16);
        let components: Arc<RwLock<HashMap<String, Deadline>>> = Arc::new(RwLock::new(HashMap::new()));

        let store = components.clone();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Ok(mut map) = store.write() else {
                    tracing::warn!("poisoned health registry mutex");
                    continue;
                };
                let entry = map.entry(message.component).or_insert(Deadline {
                    state: ReportedState::Starting,
                    deadline: Duration::from_secs(30),
                });
                entry.state = if message.healthy {
                    ReportedState::HealthyUntil(Utc::now().add(entry.deadline))
                } else {
                    ReportedState::Unhealthy
                };
            }
        });

        Self { components, sender }
    }

    pub async fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        if let Ok(mut map) = self.components.write() {
            map.entry(component.to_string()).or_insert(Deadline {
                state: ReportedState::Starting,
                deadline,
            });
        }
        HealthHandle {
            component: component.to_string(),
            deadline,
            sender: self.sender.clone(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        let now = Utc::now();
        let components = self.components.read().expect("health registry poisoned");
        let mut statuses = HashMap::new();
        let mut all_healthy = true;

        for (name, deadline) in components.iter() {
            let status = match &deadline.state {
                ReportedState::HealthyUntil(until) if *until > now => ComponentStatus::Healthy,
                ReportedState::HealthyUntil(_) => ComponentStatus::Stalled,
                ReportedState::Starting => ComponentStatus::Starting,
                ReportedState::Unhealthy => ComponentStatus::Unhealthy,
            };
            if status != ComponentStatus::Healthy && status != ComponentStatus::Starting {
                all_healthy = false;
            }
            statuses.insert(name.clone(), status);
        }

        HealthStatus {
            healthy: all_healthy,
            components: statuses,
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let status_code = if self.healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status_code, axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unregistered_registry_is_healthy_by_default() {
        let registry = HealthRegistry::new();
        assert!(registry.status().healthy);
    }

    #[tokio::test]
    async fn test_reporting_healthy_marks_component_healthy() {
        let registry = HealthRegistry::new();
        let handle = registry.register("redis", Duration::from_secs(30)).await;
        handle.report_healthy().await;
        // Give the background task a chance to process the message.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = registry.status();
        assert!(status.healthy);
        assert_eq!(status.components["redis"], ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_reporting_unhealthy_fails_overall_status() {
        let registry = HealthRegistry::new();
        let handle = registry.register("upstream", Duration::from_secs(30)).await;
        handle.report_unhealthy().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = registry.status();
        assert!(!status.healthy);
    }
}
