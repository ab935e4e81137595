// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Generic health types shared by the supervisor and the health monitor.
//
// ============================================================================

pub mod health;

pub use health::*;
