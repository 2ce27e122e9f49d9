//! Job definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::Route;
use crate::error::QueueError;

/// Group used when a producer does not name one
pub const DEFAULT_GROUP: &str = "main";

/// Delivery semantics for an enqueued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Immediately eligible for dequeue
    #[default]
    Realtime,
    /// Deduplicated by token for `delay` seconds
    Unique,
    /// Eligible once `delay` seconds have passed
    Delay,
}

impl std::str::FromStr for JobKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "unique" => Ok(Self::Unique),
            "delay" | "delayed" => Ok(Self::Delay),
            other => Err(QueueError::Config(format!("unknown job kind: {other}"))),
        }
    }
}

/// A unit of work: a `group-method` command plus its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub cmd: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<String>,
}

impl Job {
    /// Build a job; a `unique` field inside `data` becomes the dedup suffix.
    pub fn new(cmd: impl Into<String>, data: Map<String, Value>) -> Self {
        let unique = data.get("unique").and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });
        Self {
            cmd: cmd.into(),
            data,
            unique,
        }
    }

    /// Dedup token: `cmd`, or `cmd:unique` when a unique field is present
    pub fn dedup_token(&self) -> String {
        match &self.unique {
            Some(unique) => format!("{}:{}", self.cmd, unique),
            None => self.cmd.clone(),
        }
    }

    /// Canonical (RFC 8785) JSON text stored in the queue
    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_jcs::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw)
            .map_err(|e| QueueError::MalformedJob(format!("undecodable payload: {e}")))
    }

    /// Routing group and method named by `cmd`
    pub fn route(&self) -> Result<Route, QueueError> {
        Route::parse(&self.cmd)
    }
}

/// A delayed job waiting in its per-second list, remembering its origin group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayEntry {
    pub group: String,
    /// Encoded [`Job`]
    pub job: String,
}

impl DelayEntry {
    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_jcs::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw)
            .map_err(|e| QueueError::MalformedJob(format!("undecodable delay entry: {e}")))
    }
}

/// One entry of the failure ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The payload exactly as it was popped
    pub data: String,
    /// Error message, or the JSON text of an unexpected result
    #[serde(rename = "return")]
    pub reason: String,
}

/// Result of [`crate::QueueManager::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Pushed onto its group queue, which now holds `len` jobs
    Queued { len: i64 },
    /// A unique job whose lock is still held; nothing was enqueued
    Duplicate,
    /// Parked until `due_at`, alongside `pending` jobs due the same second
    Delayed { due_at: i64, pending: i64 },
}

impl EnqueueOutcome {
    /// Integer form: queue length on success, `-1` for a duplicate.
    /// Store failures surface as errors (reported as `0` by the CLI).
    pub fn code(&self) -> i64 {
        match self {
            Self::Queued { len } => *len,
            Self::Duplicate => -1,
            Self::Delayed { pending, .. } => *pending,
        }
    }
}
