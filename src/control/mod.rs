// ============================================================================
// Control Plane
// ============================================================================
//
// The duplex channel between the supervisor and an external control
// surface, and the typed messages carried on it.
//
// ============================================================================

mod channel;
mod errors;
mod message;

pub use channel::{duplex, ControlChannel, ControlReceiver, ControlSender};
pub use errors::{ChannelError, ProtocolError};
pub use message::{ConnStatus, ControlMessage};
