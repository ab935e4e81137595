use kameo::actor::ActorRef;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthCheckable;
use crate::control::{ChannelError, ControlChannel, ControlMessage, ControlSender};
use crate::metrics::Metrics;
use crate::process::{
    EntryPoint, ManagedProcess, OutputCapture, OutputSink, ProcessState, ProcessStatus,
    ProcessTimeouts, Role,
};
use crate::rewards::{RewardConfig, RewardStore};

// ============================================================================
// Supervisor - owns the trainer, the simulator and the reward weights
// ============================================================================
//
// Responsibilities:
// - Consume inbound control frames and dispatch lifecycle/config actions
// - Start and stop the two managed processes
// - Validate, persist and adopt reward changes
// - Watch both processes so an unexpected exit never leaves stale state
// - Report every transition to the health monitor and metrics
//
// The run loop is the only code that mutates a ManagedProcess or the active
// RewardConfig. Commands are applied strictly in arrival order. Everyone
// else observes through `SupervisorHandle`.
//
//   control surface ──frames──▶ Supervisor::run ──▶ ManagedProcess (trainer)
//                                     │         └──▶ ManagedProcess (simulator)
//                                     ├──▶ RewardStore
//                                     └──▶ HealthMonitorActor / Metrics
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub run_name: String,
    pub trainer: EntryPoint,
    pub simulator: EntryPoint,
    /// Pause between launching the trainer and the simulator on `Start`
    pub settle_delay: Duration,
    /// Liveness watcher period
    pub health_interval: Duration,
    pub timeouts: ProcessTimeouts,
}

/// Snapshot published after every command and every observed exit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorStatus {
    pub trainer: ProcessStatus,
    pub simulator: ProcessStatus,
    pub rewards: RewardConfig,
}

pub struct Supervisor {
    config: SupervisorConfig,
    channel: ControlChannel,
    trainer: ManagedProcess,
    simulator: ManagedProcess,
    rewards: RewardConfig,
    store: RewardStore,
    metrics: Arc<Metrics>,
    health: ActorRef<HealthMonitorActor>,
    status_tx: watch::Sender<SupervisorStatus>,
    shutdown: Arc<Notify>,
}

impl Supervisor {
    /// `channel` is the supervisor's end of the control channel. Captured
    /// output of both processes is sent through it as well.
    pub fn new(
        config: SupervisorConfig,
        channel: ControlChannel,
        store: RewardStore,
        rewards: RewardConfig,
        metrics: Arc<Metrics>,
        health: ActorRef<HealthMonitorActor>,
    ) -> Self {
        let sink = OutputSink::new(channel.sender()).with_metrics(metrics.clone());

        let trainer = ManagedProcess::new(
            config.trainer.clone(),
            OutputCapture::new(Role::Trainer, sink.clone()),
            config.timeouts,
        );
        let simulator = ManagedProcess::new(
            config.simulator.clone(),
            OutputCapture::new(Role::Simulator, sink),
            config.timeouts,
        );

        let (status_tx, _) = watch::channel(SupervisorStatus {
            trainer: trainer.status(),
            simulator: simulator.status(),
            rewards: rewards.clone(),
        });

        Self {
            config,
            channel,
            trainer,
            simulator,
            rewards,
            store,
            metrics,
            health,
            status_tx,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for a control surface. `commands` must be the sending half of
    /// the peer end of the supervisor's channel.
    pub fn handle(&self, commands: ControlSender) -> SupervisorHandle {
        SupervisorHandle {
            commands,
            status: self.status_tx.subscribe(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Listener loop. Ends on shutdown or when every peer sender is gone,
    /// stopping both processes on the way out.
    pub async fn run(mut self) {
        tracing::info!(
            run_name = %self.config.run_name,
            settle_delay_ms = self.config.settle_delay.as_millis() as u64,
            rewards = self.rewards.len(),
            "Supervisor started"
        );

        for role in Role::ALL {
            self.report(role).await;
        }

        let mut liveness = tokio::time::interval(self.config.health_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("Supervisor shutdown requested");
                    break;
                }
                frame = self.channel.recv() => match frame {
                    Some(frame) => self.dispatch(frame).await,
                    None => {
                        tracing::info!("Control surface disconnected");
                        break;
                    }
                },
                _ = liveness.tick() => self.check_liveness().await,
            }
        }

        self.stop_role(Role::Trainer).await;
        self.stop_role(Role::Simulator).await;
        self.publish();

        let mut discarded = 0usize;
        while let Ok(Some(_)) = self.channel.try_recv() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::warn!(discarded, "Discarding commands that arrived during shutdown");
        }

        tracing::info!("Supervisor stopped");
    }

    async fn dispatch(&mut self, frame: Value) {
        let message = match ControlMessage::decode_inbound(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(reason = e.reason(), error = %e, "Dropping control frame");
                self.metrics.record_rejected(e.reason());
                return;
            }
        };

        let kind = message.kind();
        tracing::debug!(kind, "Dispatching control message");
        self.metrics.record_control_message(kind);

        match message {
            ControlMessage::ConnTest { value, .. } => {
                if let Err(e) = self.channel.send(&ControlMessage::conn_test_reply(value)) {
                    tracing::warn!(error = %e, "Failed to answer ConnTest");
                }
            }
            ControlMessage::Start => self.start_both().await,
            ControlMessage::StartTrainer => {
                self.start_role(Role::Trainer).await;
            }
            ControlMessage::StartSimulator => {
                self.start_role(Role::Simulator).await;
            }
            ControlMessage::Stop => {
                self.stop_role(Role::Trainer).await;
                self.stop_role(Role::Simulator).await;
            }
            ControlMessage::StopTrainer => self.stop_role(Role::Trainer).await,
            ControlMessage::StopSimulator => self.stop_role(Role::Simulator).await,
            ControlMessage::RewardChange { rewards, weights } => {
                self.change_rewards(rewards.unwrap_or_default(), weights.unwrap_or_default());
            }
            ControlMessage::LearnerOutput { .. } | ControlMessage::WorkerOutput { .. } => {}
        }

        self.publish();
    }

    async fn start_both(&mut self) {
        if self.trainer.state().is_active() && self.simulator.state().is_active() {
            tracing::debug!("Start ignored, trainer and simulator already active");
            return;
        }

        if self.start_role(Role::Trainer).await {
            tracing::info!(
                delay_ms = self.config.settle_delay.as_millis() as u64,
                "Waiting for trainer to settle"
            );
            tokio::time::sleep(self.config.settle_delay).await;
        }

        // A trainer that is still being torn down, or already dead but not yet
        // reconciled, cannot serve the simulator.
        if self.trainer.state() != ProcessState::Running || !self.trainer.is_alive() {
            tracing::warn!(state = ?self.trainer.state(), "Trainer is not running, simulator not started");
            return;
        }

        self.start_role(Role::Simulator).await;
    }

    /// Returns true when a new process was launched.
    async fn start_role(&mut self, role: Role) -> bool {
        let process = match role {
            Role::Trainer => &mut self.trainer,
            Role::Simulator => &mut self.simulator,
        };

        if process.state() != ProcessState::Stopped {
            tracing::debug!(role = %role, state = ?process.state(), "Start ignored, process active");
            return false;
        }

        let launched = match process.start(&self.config.run_name, &self.rewards) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(role = %role, error = %e, "Launch failed, process left stopped");
                false
            }
        };

        self.metrics.record_start(role, launched);
        self.report(role).await;
        launched
    }

    async fn stop_role(&mut self, role: Role) {
        let process = self.process_mut(role);

        if !matches!(process.state(), ProcessState::Starting | ProcessState::Running) {
            tracing::debug!(role = %role, state = ?process.state(), "Stop ignored, process not running");
            return;
        }

        match process.stop().await {
            Ok(report) => {
                tracing::debug!(role = %role, status = %report.status, "Stop completed");
                self.metrics.record_stop(role);
            }
            Err(e) => {
                tracing::error!(role = %role, error = %e, "Stop did not complete");
            }
        }

        self.report(role).await;
    }

    /// Validate, persist, then adopt. A write failure keeps the previous
    /// weights active.
    fn change_rewards(&mut self, rewards: Vec<String>, weights: Vec<f64>) {
        let config = match RewardConfig::from_parts(rewards, weights) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting reward change");
                self.metrics.record_reward_change("rejected");
                return;
            }
        };

        if let Err(e) = self.store.save(&config) {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist reward change, keeping previous weights"
            );
            self.metrics.record_reward_change("persist_failed");
            return;
        }

        tracing::info!(
            rewards = config.len(),
            path = %self.store.path().display(),
            "Reward weights updated"
        );
        self.rewards = config;
        self.metrics.record_reward_change("accepted");
    }

    async fn check_liveness(&mut self) {
        let mut changed = false;

        for role in Role::ALL {
            let Some(report) = self.process_mut(role).refresh().await else {
                continue;
            };

            if !report.requested {
                self.metrics.record_unexpected_exit(role);
            }
            self.report(role).await;
            changed = true;
        }

        if changed {
            self.publish();
        }
    }

    fn process_mut(&mut self, role: Role) -> &mut ManagedProcess {
        match role {
            Role::Trainer => &mut self.trainer,
            Role::Simulator => &mut self.simulator,
        }
    }

    async fn report(&mut self, role: Role) {
        let process = self.process_mut(role);
        let state = process.state();
        let update = UpdateHealth::from(process.check_health());

        self.metrics.update_process_state(role, state);
        if self.health.tell(update).send().await.is_err() {
            tracing::debug!(role = %role, "Health monitor unavailable");
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(SupervisorStatus {
            trainer: self.trainer.status(),
            simulator: self.simulator.status(),
            rewards: self.rewards.clone(),
        });
    }
}

// ============================================================================
// Supervisor Handle
// ============================================================================

/// What a control surface holds: a way to send commands, a read-only view of
/// the latest state and a shutdown switch. It never touches a process.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: ControlSender,
    status: watch::Receiver<SupervisorStatus>,
    shutdown: Arc<Notify>,
}

impl SupervisorHandle {
    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// False once the supervisor loop has exited and released its end of
    /// the channel.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, message: &ControlMessage) -> Result<(), ChannelError> {
        self.commands.send(message)
    }

    /// Forward a raw frame; validation happens in the supervisor.
    pub fn send_frame(&self, frame: Value) -> Result<(), ChannelError> {
        self.commands.send_frame(frame)
    }

    /// Same path as an inbound `Start`
    pub fn start_both(&self) -> Result<(), ChannelError> {
        self.send(&ControlMessage::Start)
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
