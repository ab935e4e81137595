// ============================================================================
// Actors Module
// ============================================================================
//
// Long-running concurrent components of the orchestration core.
//
// Structure:
// - core/           - Health types shared across components (HealthCheckable)
// - infrastructure/ - The supervisor loop and the kameo health monitor
//
// Note: The supervisor is a plain task with a single consumer loop, not an
//       actor. It must block on child joins without blocking a mailbox that
//       other components depend on.
//
// ============================================================================

mod core;
mod infrastructure;

pub use infrastructure::{
    GetSystemHealth,
    HealthMonitorActor,
    Supervisor,
    SupervisorConfig,
    SupervisorHandle,
    SupervisorStatus,
    SystemHealth,
    UpdateHealth,
};

pub(crate) use core::{ComponentHealth, HealthCheckable, HealthStatus};
