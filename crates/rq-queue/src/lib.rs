//! # rq Queue
//!
//! Store-coordinated job queue for fleets of uncoordinated processes.
//!
//! Features:
//! - Realtime, unique (deduplicated) and delayed jobs per routing group
//! - Per-host master that scales budgeted worker processes to queue depth
//! - Crash recovery through TTL'd identity keys, no central coordinator
//! - Failure ledger for jobs that error or return an unexpected result
//! - Pluggable dispatch (`Dispatcher`) and process launching (`Spawner`)

pub mod config;
pub mod delay;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod job;
pub mod keys;
pub mod ledger;
pub mod manager;
pub mod master;
pub mod shutdown;
pub mod spawn;
pub mod worker;

pub use crate::config::QueueConfig;
pub use delay::DelayScheduler;
pub use dispatch::{DispatchError, Dispatcher, GroupHandler, HandlerRegistry, Route};
pub use error::{QueueError, QueueResult};
pub use executor::{Execution, JobExecutor};
pub use job::{EnqueueOutcome, FailureRecord, Job, JobKind, DEFAULT_GROUP};
pub use keys::KeySpace;
pub use ledger::{FailureLedger, FailureList};
pub use manager::QueueManager;
pub use master::{plan_spawn, Master, MasterExit};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use spawn::{ProcessSpawner, Spawner, UnitKind};
pub use worker::{Worker, WorkerExit};
