// ============================================================================
// Rewards Module
// ============================================================================
//
// The runtime-mutable reward weighting and its durable record.
//
// ============================================================================

mod config;
mod store;

pub use config::{RewardConfig, RewardConfigError};
pub use store::{RewardStore, StoreError};
