use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;
use std::collections::BTreeMap;
use chrono::Utc;
use crate::actors::core::{HealthStatus, ComponentHealth};

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Responsibilities:
// - Track the latest health report of the trainer and simulator slots
// - Aggregate system-wide health for the control surface
//
// Reports arrive from the supervisor on every lifecycle transition and on
// every liveness tick that observes an exit.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl From<ComponentHealth> for UpdateHealth {
    fn from(health: ComponentHealth) -> Self {
        Self {
            component: health.name,
            status: health.status,
            details: health.details,
        }
    }
}

pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

#[derive(Default)]
pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the monitor on the current tokio runtime
    pub fn spawn_default() -> ActorRef<Self> {
        use kameo::prelude::*;
        HealthMonitorActor::spawn(HealthMonitorActor::new())
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        _actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");
        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let health = ComponentHealth {
            name: msg.component.clone(),
            status: msg.status.clone(),
            last_check: Utc::now(),
            details: msg.details,
        };

        if msg.status.is_healthy() {
            tracing::debug!(component = %msg.component, "Component healthy");
        } else if msg.status.is_degraded() {
            tracing::info!(component = %msg.component, status = ?msg.status, "Component degraded");
        } else {
            tracing::warn!(component = %msg.component, status = ?msg.status, "Component unhealthy");
        }

        self.components.insert(msg.component, health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let overall_status = self.compute_overall_status();

        SystemHealth {
            overall_status,
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
