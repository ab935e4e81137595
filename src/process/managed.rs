use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use uuid::Uuid;

use super::{CaptureScope, EntryPoint, LaunchContext, OutputCapture, Role};
use crate::actors::{ComponentHealth, HealthCheckable, HealthStatus};
use crate::rewards::RewardConfig;

// ============================================================================
// Managed Process - one supervised trainer or simulator slot
// ============================================================================
//
// Lifecycle:
//
//   Stopped ──start──▶ Starting ──spawned──▶ Running ──stop──▶ Stopping ──joined──▶ Stopped
//      ▲                  │                                        │
//      └──launch failed───┘                 exit seen by refresh() ┘
//
// The slot is created once and reused for every restart. It is not safe to
// drive from two callers at once; the supervisor owns it exclusively.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ProcessState {
    /// Anything but `Stopped`
    pub fn is_active(&self) -> bool {
        !matches!(self, ProcessState::Stopped)
    }
}

/// How the most recent run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitReport {
    pub status: String,
    pub code: Option<i32>,
    /// False when the process died without a stop request
    pub requested: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Cannot {operation} {role} while {state:?}")]
    InvalidTransition {
        role: Role,
        operation: &'static str,
        state: ProcessState,
    },

    #[error("Failed to launch {role}: {source}")]
    Launch {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare {role} launch environment: {source}")]
    Prepare {
        role: Role,
        #[source]
        source: serde_json::Error,
    },

    #[error("{role} did not exit within {timeout:?} of being killed")]
    StopTimeout { role: Role, timeout: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessTimeouts {
    /// Upper bound on the join after a kill
    pub stop: Duration,
    /// Time allowed for pipe readers to drain after the process exits
    pub output_grace: Duration,
}

impl Default for ProcessTimeouts {
    fn default() -> Self {
        Self {
            stop: Duration::from_secs(10),
            output_grace: Duration::from_millis(500),
        }
    }
}

/// Point-in-time view of a slot, safe to hand to other threads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub role: Role,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit: Option<ExitReport>,
    pub last_error: Option<String>,
}

pub struct ManagedProcess {
    role: Role,
    entry_point: EntryPoint,
    capture: OutputCapture,
    timeouts: ProcessTimeouts,
    state: ProcessState,
    child: Option<Child>,
    scope: Option<CaptureScope>,
    pid: Option<u32>,
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    last_exit: Option<ExitReport>,
    last_error: Option<String>,
}

impl ManagedProcess {
    pub fn new(entry_point: EntryPoint, capture: OutputCapture, timeouts: ProcessTimeouts) -> Self {
        Self {
            role: capture.role(),
            entry_point,
            capture,
            timeouts,
            state: ProcessState::Stopped,
            child: None,
            scope: None,
            pid: None,
            run_id: None,
            started_at: None,
            last_exit: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            role: self.role,
            state: self.state,
            pid: self.pid,
            run_id: self.run_id,
            started_at: self.started_at,
            last_exit: self.last_exit.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Launch the entry point in a new OS process and start capturing its
    /// output. Must be called from within a tokio runtime.
    ///
    /// On failure the slot is left `Stopped` with nothing half-initialised.
    pub fn start(&mut self, run_name: &str, rewards: &RewardConfig) -> Result<(), ProcessError> {
        if self.state != ProcessState::Stopped {
            return Err(ProcessError::InvalidTransition {
                role: self.role,
                operation: "start",
                state: self.state,
            });
        }

        self.state = ProcessState::Starting;

        let run_id = Uuid::now_v7();
        let launch = LaunchContext {
            role: self.role,
            run_name,
            run_id,
            rewards,
        };

        let spawned = self
            .entry_point
            .command(&launch)
            .map_err(|source| ProcessError::Prepare { role: self.role, source })
            .and_then(|mut cmd| {
                cmd.spawn()
                    .map_err(|source| ProcessError::Launch { role: self.role, source })
            });

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.state = ProcessState::Stopped;
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut scope = self.capture.activate();
        if let Some(stdout) = child.stdout.take() {
            scope.attach(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            scope.attach(stderr);
        }

        self.pid = child.id();
        self.run_id = Some(run_id);
        self.started_at = Some(Utc::now());
        self.last_error = None;
        self.child = Some(child);
        self.scope = Some(scope);
        self.state = ProcessState::Running;

        tracing::info!(
            role = %self.role,
            pid = ?self.pid,
            run_id = %run_id,
            program = %self.entry_point.program(),
            "Process started"
        );

        Ok(())
    }

    /// Forcefully terminate and wait, at most `timeouts.stop`, for the exit.
    ///
    /// If the join times out the slot stays `Stopping`; `refresh` finishes
    /// the transition once the exit is observed.
    pub async fn stop(&mut self) -> Result<ExitReport, ProcessError> {
        if !matches!(self.state, ProcessState::Starting | ProcessState::Running) {
            return Err(ProcessError::InvalidTransition {
                role: self.role,
                operation: "stop",
                state: self.state,
            });
        }

        self.state = ProcessState::Stopping;
        tracing::info!(role = %self.role, pid = ?self.pid, "Interrupting process");

        let Some(child) = self.child.as_mut() else {
            return Ok(self.finish(None, true).await);
        };

        if let Err(e) = child.start_kill() {
            tracing::debug!(role = %self.role, error = %e, "Kill failed, process already gone");
        }

        let joined = tokio::time::timeout(self.timeouts.stop, child.wait()).await;
        match joined {
            Ok(Ok(status)) => Ok(self.finish(Some(status), true).await),
            Ok(Err(e)) => {
                tracing::warn!(role = %self.role, error = %e, "Failed to collect exit status");
                Ok(self.finish(None, true).await)
            }
            Err(_) => {
                tracing::error!(
                    role = %self.role,
                    pid = ?self.pid,
                    timeout_ms = self.timeouts.stop.as_millis() as u64,
                    "Process did not exit after kill"
                );
                Err(ProcessError::StopTimeout {
                    role: self.role,
                    timeout: self.timeouts.stop,
                })
            }
        }
    }

    /// Non-blocking liveness check. Does not change the lifecycle state.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Reconcile the lifecycle state with the OS. Returns a report when the
    /// process is found to have exited since the last check.
    pub async fn refresh(&mut self) -> Option<ExitReport> {
        if !self.state.is_active() {
            return None;
        }

        let status = match self.child.as_mut()?.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(role = %self.role, error = %e, "Liveness check failed");
                return None;
            }
        };

        let requested = self.state == ProcessState::Stopping;
        let report = self.finish(Some(status), requested).await;

        if !requested {
            tracing::warn!(
                role = %self.role,
                status = %report.status,
                "Process exited unexpectedly"
            );
        }

        Some(report)
    }

    async fn finish(&mut self, status: Option<ExitStatus>, requested: bool) -> ExitReport {
        self.child = None;
        if let Some(scope) = self.scope.take() {
            scope.close(self.timeouts.output_grace).await;
        }

        let report = ExitReport {
            status: status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            code: status.and_then(|s| s.code()),
            requested,
            at: Utc::now(),
        };

        tracing::info!(
            role = %self.role,
            pid = ?self.pid,
            status = %report.status,
            requested,
            "Process stopped"
        );

        self.pid = None;
        self.state = ProcessState::Stopped;
        self.last_exit = Some(report.clone());
        report
    }
}

impl HealthCheckable for ManagedProcess {
    fn check_health(&self) -> ComponentHealth {
        let status = match (self.state, &self.last_exit, &self.last_error) {
            (ProcessState::Running, _, _) => HealthStatus::Healthy,
            (ProcessState::Starting, _, _) => HealthStatus::Degraded("starting".to_string()),
            (ProcessState::Stopping, _, _) => HealthStatus::Degraded("stopping".to_string()),
            (ProcessState::Stopped, _, Some(error)) => HealthStatus::Unhealthy(error.clone()),
            (ProcessState::Stopped, Some(exit), None) if !exit.requested => {
                HealthStatus::Unhealthy(format!("exited unexpectedly ({})", exit.status))
            }
            (ProcessState::Stopped, _, None) => HealthStatus::Degraded("stopped".to_string()),
        };

        let health = ComponentHealth::new(self.role.as_str(), status);
        match self.pid {
            Some(pid) => health.with_details(format!("pid {}", pid)),
            None => health,
        }
    }
}
