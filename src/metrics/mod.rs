use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::process::{ProcessState, Role};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Control messages received and rejected
// - Trainer/simulator lifecycle (starts, launch failures, stops, crashes)
// - Captured output volume
// - Reward configuration changes
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the orchestration core
pub struct Metrics {
    registry: Registry,

    // Control Plane Metrics
    pub control_messages: IntCounterVec,
    pub control_rejected: IntCounterVec,

    // Process Lifecycle Metrics
    pub process_starts: IntCounterVec,
    pub process_launch_failures: IntCounterVec,
    pub process_stops: IntCounterVec,
    pub process_unexpected_exits: IntCounterVec,
    pub process_state: IntGaugeVec,

    // Output Metrics
    pub output_lines: IntCounterVec,

    // Reward Metrics
    pub reward_changes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Control Plane Metrics
        let control_messages = IntCounterVec::new(
            Opts::new("astra_control_messages_total", "Inbound control messages dispatched"),
            &["kind"],
        )?;
        registry.register(Box::new(control_messages.clone()))?;

        let control_rejected = IntCounterVec::new(
            Opts::new("astra_control_rejected_total", "Inbound control frames dropped"),
            &["reason"],
        )?;
        registry.register(Box::new(control_rejected.clone()))?;

        // Process Lifecycle Metrics
        let process_starts = IntCounterVec::new(
            Opts::new("astra_process_starts_total", "Successful process launches"),
            &["role"],
        )?;
        registry.register(Box::new(process_starts.clone()))?;

        let process_launch_failures = IntCounterVec::new(
            Opts::new("astra_process_launch_failures_total", "Process launches that failed"),
            &["role"],
        )?;
        registry.register(Box::new(process_launch_failures.clone()))?;

        let process_stops = IntCounterVec::new(
            Opts::new("astra_process_stops_total", "Requested process stops that completed"),
            &["role"],
        )?;
        registry.register(Box::new(process_stops.clone()))?;

        let process_unexpected_exits = IntCounterVec::new(
            Opts::new("astra_process_unexpected_exits_total", "Processes that exited without a stop request"),
            &["role"],
        )?;
        registry.register(Box::new(process_unexpected_exits.clone()))?;

        let process_state = IntGaugeVec::new(
            Opts::new("astra_process_state", "Process state (0=Stopped, 1=Starting, 2=Running, 3=Stopping)"),
            &["role"],
        )?;
        registry.register(Box::new(process_state.clone()))?;

        // Output Metrics
        let output_lines = IntCounterVec::new(
            Opts::new("astra_output_lines_total", "Captured output lines forwarded"),
            &["role"],
        )?;
        registry.register(Box::new(output_lines.clone()))?;

        // Reward Metrics
        let reward_changes = IntCounterVec::new(
            Opts::new("astra_reward_changes_total", "Reward change requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reward_changes.clone()))?;

        Ok(Self {
            registry,
            control_messages,
            control_rejected,
            process_starts,
            process_launch_failures,
            process_stops,
            process_unexpected_exits,
            process_state,
            output_lines,
            reward_changes,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_control_message(&self, kind: &str) {
        self.control_messages.with_label_values(&[kind]).inc();
    }

    pub fn record_rejected(&self, reason: &str) {
        self.control_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_start(&self, role: Role, success: bool) {
        if success {
            self.process_starts.with_label_values(&[role.as_str()]).inc();
        } else {
            self.process_launch_failures.with_label_values(&[role.as_str()]).inc();
        }
    }

    pub fn record_stop(&self, role: Role) {
        self.process_stops.with_label_values(&[role.as_str()]).inc();
    }

    pub fn record_unexpected_exit(&self, role: Role) {
        self.process_unexpected_exits.with_label_values(&[role.as_str()]).inc();
    }

    pub fn update_process_state(&self, role: Role, state: ProcessState) {
        let value = match state {
            ProcessState::Stopped => 0,
            ProcessState::Starting => 1,
            ProcessState::Running => 2,
            ProcessState::Stopping => 3,
        };
        self.process_state.with_label_values(&[role.as_str()]).set(value);
    }

    pub fn record_output_line(&self, role: Role) {
        self.output_lines.with_label_values(&[role.as_str()]).inc();
    }

    pub fn record_reward_change(&self, outcome: &str) {
        self.reward_changes.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_control_message("Start");
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_start_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_start(Role::Trainer, true);
        metrics.record_start(Role::Trainer, true);
        metrics.record_start(Role::Simulator, false);

        assert_eq!(metrics.process_starts.with_label_values(&["trainer"]).get(), 2);
        assert_eq!(metrics.process_launch_failures.with_label_values(&["simulator"]).get(), 1);
        assert_eq!(metrics.process_launch_failures.with_label_values(&["trainer"]).get(), 0);
    }

    #[test]
    fn test_process_state_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_process_state(Role::Simulator, ProcessState::Running);
        assert_eq!(metrics.process_state.with_label_values(&["simulator"]).get(), 2);

        metrics.update_process_state(Role::Simulator, ProcessState::Stopped);
        assert_eq!(metrics.process_state.with_label_values(&["simulator"]).get(), 0);
    }

    #[test]
    fn test_output_and_reward_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_output_line(Role::Trainer);
        metrics.record_reward_change("accepted");
        metrics.record_reward_change("rejected");
        metrics.record_reward_change("rejected");

        assert_eq!(metrics.output_lines.with_label_values(&["trainer"]).get(), 1);
        assert_eq!(metrics.reward_changes.with_label_values(&["rejected"]).get(), 2);
    }
}
