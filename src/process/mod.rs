// ============================================================================
// Process Module
// ============================================================================
//
// Supervised OS processes for the trainer and simulator:
// - role.rs         - which collaborator a slot hosts
// - entry_point.rs  - how a collaborator is launched
// - capture.rs      - line-by-line output forwarding
// - managed.rs      - lifecycle state machine around one child process
//
// ============================================================================

mod capture;
mod entry_point;
mod managed;
mod role;

pub use capture::{CaptureScope, CapturedLine, OutputCapture, OutputSink};
pub use entry_point::{EntryPoint, LaunchContext};
pub use managed::{ExitReport, ManagedProcess, ProcessError, ProcessState, ProcessStatus, ProcessTimeouts};
pub use role::Role;
