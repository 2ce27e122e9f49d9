//! Dispatcher that runs jobs as handler executables.
//!
//! Group `orders`, method `create` runs `<handlers_dir>/orders create` with
//! the job data as JSON on stdin. Trimmed stdout is the result: empty means
//! `null`, JSON is parsed, anything else becomes a string. A non-zero exit
//! is a failure carrying stderr.
//!
//! Routes listed one per line in `<handlers_dir>/<group>.deps` run before
//! every method of that group.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use rq_queue::{DispatchError, Dispatcher, Route};

const DEPS_EXTENSION: &str = "deps";

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    handlers_dir: PathBuf,
}

impl CommandDispatcher {
    pub fn new(handlers_dir: impl Into<PathBuf>) -> Self {
        Self {
            handlers_dir: handlers_dir.into(),
        }
    }

    fn handler_path(&self, group: &str) -> Result<PathBuf, DispatchError> {
        if !is_plain_name(group) {
            return Err(DispatchError::UnknownGroup(group.to_string()));
        }
        let path = self.handlers_dir.join(group);
        if path.is_file() {
            Ok(path)
        } else {
            Err(DispatchError::UnknownGroup(group.to_string()))
        }
    }
}

/// A single path component without traversal
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).components().count() == 1
}

/// Methods starting with `_` are private to the handler
fn is_exposed(method: &str) -> bool {
    !method.is_empty() && !method.starts_with('_')
}

fn parse_output(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl Dispatcher for CommandDispatcher {
    async fn dependencies(&self, group: &str) -> Result<Vec<Route>, DispatchError> {
        if !is_plain_name(group) {
            return Ok(Vec::new());
        }
        let path = self.handlers_dir.join(format!("{group}.{DEPS_EXTENSION}"));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DispatchError::Failed(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                Route::parse(line).map_err(|e| {
                    DispatchError::Failed(format!("{}: {e}", path.display()))
                })
            })
            .collect()
    }

    async fn execute(&self, route: &Route, data: &Map<String, Value>) -> Result<Value, DispatchError> {
        if !is_exposed(&route.method) {
            return Err(DispatchError::Forbidden(route.to_string()));
        }
        let program = self.handler_path(&route.group)?;
        let input = serde_json::to_vec(data).map_err(|e| DispatchError::Failed(e.to_string()))?;

        let mut child = Command::new(&program)
            .arg(&route.method)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::Failed(format!("cannot start {}: {e}", program.display())))?;

        // Input is fed while output drains; a handler may write before it
        // has read everything, or exit without reading at all.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(route = %route, error = %e, "Handler closed stdin early");
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| DispatchError::Failed(format!("{route}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::Failed(format!(
                "{route} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_output(&output.stdout))
    }
}
