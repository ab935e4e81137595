use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::control::{ControlMessage, ControlReceiver};
use crate::process::Role;

// ============================================================================
// Output Log - what an observer sees of the two processes
// ============================================================================
//
// The bridge drains the surface end of the control channel and keeps the
// most recent captured lines, each with a sequence number so clients can
// poll incrementally. Oldest lines are evicted once capacity is reached.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub seq: u64,
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    /// Highest sequence number assigned so far; pass back as `after`
    pub latest: u64,
    /// True when lines newer than `after` were evicted before being read
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnTestReply {
    pub value: Number,
    pub at: DateTime<Utc>,
}

struct LogState {
    entries: VecDeque<LogEntry>,
    latest: u64,
    last_conn_test: Option<ConnTestReply>,
}

pub struct OutputLog {
    capacity: usize,
    state: Mutex<LogState>,
}

impl OutputLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LogState {
                entries: VecDeque::new(),
                latest: 0,
                last_conn_test: None,
            }),
        }
    }

    pub async fn push(&self, role: Role, text: impl Into<String>) -> u64 {
        let mut state = self.state.lock().await;
        state.latest += 1;
        let seq = state.latest;

        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(LogEntry {
            seq,
            role,
            text: text.into(),
            at: Utc::now(),
        });
        seq
    }

    /// Lines with a sequence number greater than `after`, oldest first
    pub async fn entries_after(&self, after: u64, role: Option<Role>) -> LogPage {
        let state = self.state.lock().await;

        let oldest = state.entries.front().map(|e| e.seq).unwrap_or(state.latest + 1);
        let entries = state
            .entries
            .iter()
            .filter(|e| e.seq > after)
            .filter(|e| role.map_or(true, |r| e.role == r))
            .cloned()
            .collect();

        LogPage {
            entries,
            latest: state.latest,
            truncated: after.saturating_add(1) < oldest,
        }
    }

    pub async fn record_conn_test(&self, value: Number) {
        self.state.lock().await.last_conn_test = Some(ConnTestReply {
            value,
            at: Utc::now(),
        });
    }

    pub async fn last_conn_test(&self) -> Option<ConnTestReply> {
        self.state.lock().await.last_conn_test.clone()
    }
}

/// Drain outbound frames into `log` until the supervisor's end closes.
pub fn spawn_bridge(mut receiver: ControlReceiver, log: Arc<OutputLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            apply_frame(&log, frame).await;
        }
        tracing::debug!("Output bridge finished, supervisor channel closed");
    })
}

async fn apply_frame(log: &OutputLog, frame: Value) {
    match serde_json::from_value::<ControlMessage>(frame) {
        Ok(ControlMessage::LearnerOutput { data }) => {
            log.push(Role::Trainer, data).await;
        }
        Ok(ControlMessage::WorkerOutput { data }) => {
            log.push(Role::Simulator, data).await;
        }
        Ok(ControlMessage::ConnTest { status: Some(_), value }) => {
            tracing::debug!(value = %value, "Control channel answered ConnTest");
            log.record_conn_test(value).await;
        }
        Ok(other) => {
            tracing::debug!(kind = other.kind(), "Ignoring unexpected outbound message");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable outbound frame");
        }
    }
}
