//! Launching detached delay and realtime units

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};

/// Subcommand the stock binary runs units under
pub const UNIT_SUBCOMMAND: &str = "unit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// One delay scheduler pass
    Delay,
    /// A budgeted worker draining group queues
    Realtime,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Delay => "delay",
            UnitKind::Realtime => "realtime",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delay" => Ok(UnitKind::Delay),
            "realtime" => Ok(UnitKind::Realtime),
            other => Err(QueueError::Config(format!("unknown unit type: {other}"))),
        }
    }
}

/// Starts units without waiting for them
pub trait Spawner: Send + Sync {
    fn spawn(&self, kind: UnitKind) -> QueueResult<()>;
}

/// Re-launches a program as `<program> <base args..> unit --type <kind>`.
///
/// Children run with null stdio and are reaped in the background.
/// Settings that must stay off the command line (credentials) travel in
/// the child's environment instead.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    base_args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            envs: Vec::new(),
        }
    }

    /// Set an environment variable on every launched unit
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Spawner for the running executable
    pub fn current(base_args: Vec<String>) -> QueueResult<Self> {
        let program = std::env::current_exe().map_err(|e| {
            QueueError::Environment(format!("cannot resolve current executable: {e}"))
        })?;
        Ok(Self::new(program, base_args))
    }

    pub fn command_line(&self, kind: UnitKind) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            UNIT_SUBCOMMAND.to_string(),
            "--type".to_string(),
            kind.as_str().to_string(),
        ]);
        args
    }

    fn command(&self, kind: UnitKind) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.command_line(kind))
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, kind: UnitKind) -> QueueResult<()> {
        let mut child = self.command(kind).spawn()?;

        debug!(unit = %kind, pid = ?child.id(), "Unit launched");

        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!(error = %e, "Failed to reap unit");
            }
        });
        Ok(())
    }
}
