use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use super::Role;
use crate::rewards::RewardConfig;

// ============================================================================
// Entry Point - how a trainer or simulator is launched
// ============================================================================
//
// The trainer and simulator are external programs. The core only needs to
// start one in a fresh OS process; it never looks inside. Launch context is
// handed over through the environment:
//
//   ASTRA_ROLE      trainer | simulator
//   ASTRA_RUN_NAME  shared run name
//   ASTRA_RUN_ID    fresh id for this launch
//   ASTRA_REWARDS   active reward weights, ordered JSON object
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

/// Everything a child needs to know about the launch it belongs to
pub struct LaunchContext<'a> {
    pub role: Role,
    pub run_name: &'a str,
    pub run_id: Uuid,
    pub rewards: &'a RewardConfig,
}

impl EntryPoint {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Parse a whitespace-separated command line. `None` when blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command for one launch. Output is piped so it can be
    /// captured; the child is killed if its handle is dropped.
    pub fn command(&self, launch: &LaunchContext<'_>) -> serde_json::Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("ASTRA_ROLE", launch.role.as_str())
            .env("ASTRA_RUN_NAME", launch.run_name)
            .env("ASTRA_RUN_ID", launch.run_id.to_string())
            .env("ASTRA_REWARDS", launch.rewards.to_json()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        let entry = EntryPoint::parse("  python3 -u learner.py ").unwrap();
        assert_eq!(entry, EntryPoint::new("python3").args(["-u", "learner.py"]));
        assert_eq!(entry.program(), "python3");

        assert!(EntryPoint::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_receives_launch_environment() {
        let entry = EntryPoint::new("sh").args([
            "-c",
            "printf '%s|%s|%s|%s' \"$ASTRA_ROLE\" \"$ASTRA_RUN_NAME\" \"$ASTRA_REWARDS\" \"$ASTRA_RUN_ID\"",
        ]);

        let rewards = RewardConfig::new(vec![("a", 0.5), ("b", 1.5)]).unwrap();
        let run_id = Uuid::now_v7();
        let launch = LaunchContext {
            role: Role::Simulator,
            run_name: "test-run",
            run_id,
            rewards: &rewards,
        };

        let output = entry.command(&launch).unwrap().output().await.unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert_eq!(stdout, format!(r#"simulator|test-run|{{"a":0.5,"b":1.5}}|{}"#, run_id));
    }
}
