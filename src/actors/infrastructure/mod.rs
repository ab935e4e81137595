// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Long-lived runtime components:
// - Supervision of the trainer and simulator processes
// - Health monitoring
//
// ============================================================================

mod health_monitor;
mod supervisor;

pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorHandle, SupervisorStatus};
