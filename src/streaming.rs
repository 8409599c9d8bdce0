//! WebSocket progress frames for `GET /analyze/{id}/stream` (`spec.md` §4.8).
//!
//! One task per connected socket: an initial snapshot, then progress/
//! complete/error frames relayed from the job's `JobSubscription`,
//! interleaved with a heartbeat every two seconds. The route handler in
//! `api` owns the upgrade; this module only drives the socket once open.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;

use crate::jobs::{Job, JobEvent, JobStatus, JobStore};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NOT_FOUND: u16 = 4004;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame<'a> {
    Progress {
        progress: f32,
        phase: &'a str,
    },
    Complete {
        result: &'a serde_json::Value,
    },
    Error {
        code: &'a str,
        message: &'a str,
    },
    Cancelled,
    Heartbeat,
}

pub async fn run_socket(mut socket: WebSocket, job_id: String, jobs: JobStore) {
    let Some(job) = jobs.get(&job_id).await else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_NOT_FOUND,
                reason: "analysis not found".into(),
            })))
            .await;
        return;
    };

    if send_frame(
        &mut socket,
        &Frame::Progress {
            progress: job.progress.unwrap_or(0.0),
            phase: job.phase.as_deref().unwrap_or("queued"),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    if job.status.is_terminal() {
        send_terminal_frame(&mut socket, &job).await;
        close_normal(&mut socket).await;
        return;
    }

    let Some(mut subscription) = jobs.subscribe(&job_id).await else {
        close_normal(&mut socket).await;
        return;
    };

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let terminal = matches!(event, JobEvent::Complete { .. } | JobEvent::Error { .. } | JobEvent::Cancelled);
                if send_event_frame(&mut socket, &event).await.is_err() {
                    return;
                }
                if terminal {
                    close_normal(&mut socket).await;
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if send_frame(&mut socket, &Frame::Heartbeat).await.is_err() {
                    return;
                }
            }
            incoming = socket.next() => {
                match incoming {
                    None | Some(Ok(Message::Close(_))) => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}

async fn send_terminal_frame(socket: &mut WebSocket, job: &Job) {
    match job.status {
        JobStatus::Completed => {
            let result = job.result.clone().unwrap_or(serde_json::Value::Null);
            let _ = send_frame(socket, &Frame::Complete { result: &result }).await;
        }
        JobStatus::Failed => {
            let (code, message) = job
                .error
                .as_ref()
                .map(|e| (e.code.as_str(), e.message.as_str()))
                .unwrap_or(("ENGINE_EXCEPTION", "unknown error"));
            let _ = send_frame(socket, &Frame::Error { code, message }).await;
        }
        JobStatus::Cancelled => {
            let _ = send_frame(socket, &Frame::Cancelled).await;
        }
        _ => {}
    }
}

async fn send_event_frame(socket: &mut WebSocket, event: &JobEvent) -> Result<(), axum::Error> {
    match event {
        JobEvent::Progress { progress, phase } => {
            send_frame(
                socket,
                &Frame::Progress {
                    progress: *progress,
                    phase,
                },
            )
            .await
        }
        JobEvent::Complete { result } => send_frame(socket, &Frame::Complete { result }).await,
        JobEvent::Error { code, message } => send_frame(socket, &Frame::Error { code, message }).await,
        JobEvent::Cancelled => send_frame(socket, &Frame::Cancelled).await,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame<'_>) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("frame always serializable");
    socket.send(Message::Text(text)).await
}

async fn close_normal(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_NORMAL,
            reason: "".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot_uses_progress_frame_shape() {
        let frame = Frame::Progress {
            progress: 0.4,
            phase: "scoring",
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["progress"], 0.4);
        assert_eq!(json["phase"], "scoring");
    }

    #[test]
    fn test_heartbeat_frame_has_no_extra_fields() {
        let json = serde_json::to_value(Frame::Heartbeat).unwrap();
        assert_eq!(json, serde_json::json!({"type": "heartbeat"}));
    }

    #[test]
    fn test_error_frame_carries_code_and_message() {
        let frame = Frame::Error {
            code: "ENGINE_TIMEOUT",
            message: "timed out",
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["code"], "ENGINE_TIMEOUT");
    }
}
