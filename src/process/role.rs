use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Process Roles
// ============================================================================

/// Which of the two long-lived collaborators a process slot hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs the policy-optimization loop
    Trainer,
    /// Runs environment rollouts and reports them to the trainer
    Simulator,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Trainer, Role::Simulator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainer => "trainer",
            Role::Simulator => "simulator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
