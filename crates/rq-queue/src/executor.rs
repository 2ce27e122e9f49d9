//! Job execution: decode, route, dispatch, record failures

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::QueueResult;
use crate::job::Job;
use crate::ledger::FailureLedger;

/// Outcome of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed,
    /// Recorded in the failure ledger with this reason
    Failed(String),
}

#[derive(Clone)]
pub struct JobExecutor {
    dispatcher: Arc<dyn Dispatcher>,
    ledger: FailureLedger,
}

impl JobExecutor {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, ledger: FailureLedger) -> Self {
        Self { dispatcher, ledger }
    }

    /// Run one popped payload to completion.
    ///
    /// Job failures are written to the ledger and reported as
    /// [`Execution::Failed`]; only a failing ledger write is an error.
    pub async fn execute(&self, payload: &str) -> QueueResult<Execution> {
        match self.run(payload).await {
            Ok(()) => Ok(Execution::Completed),
            Err(reason) => {
                warn!(reason = %reason, "Job failed");
                self.ledger.record(payload, reason.clone()).await?;
                Ok(Execution::Failed(reason))
            }
        }
    }

    async fn run(&self, payload: &str) -> Result<(), String> {
        let job = Job::decode(payload).map_err(|e| e.to_string())?;
        let route = job.route().map_err(|e| e.to_string())?;

        let mut steps = self
            .dispatcher
            .dependencies(&route.group)
            .await
            .map_err(|e| e.to_string())?;
        steps.push(route);

        for step in &steps {
            debug!(route = %step, "Dispatching");
            match self.dispatcher.execute(step, &job.data).await {
                Ok(Value::Null) | Ok(Value::Bool(true)) => {}
                Ok(other) => return Err(other.to_string()),
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(())
    }
}
