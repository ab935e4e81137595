// ============================================================================
// Control Surface
// ============================================================================
//
// - output_log.rs  - bounded, sequence-numbered log fed by the outbound bridge
// - server.rs      - actix-web endpoints for commands, logs, status and health
//
// ============================================================================

mod output_log;
mod server;

pub use output_log::{spawn_bridge, ConnTestReply, LogEntry, LogPage, OutputLog};
pub use server::{routes, start_surface_server, SurfaceState};
