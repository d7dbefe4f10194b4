//! Background task execution.
//!
//! Heavy file transformations run on a small, fixed set of OS threads per
//! task family so that callers stay responsive. The module is organized
//! around:
//!
//! - `request`: the closed set of task families and their requests
//! - `result`: what a finished task hands back
//! - `queue`: tasks and the per-family FIFO queue
//! - `retry`: backoff policy between attempts
//! - `pool`: slots, dispatch, timeouts and stale-result discard
//! - `manager`: one pool per family behind an explicit context object
//!
//! ## Example
//!
//! ```rust,ignore
//! use slixtools::worker::{TaskManager, TaskOptions, TaskRequest};
//! use slixtools::tasks::{ImageRequest, ResizeOptions};
//!
//! let manager = TaskManager::builder().with_default_handlers().build();
//! let request = TaskRequest::Image(ImageRequest::Resize {
//!     data: bytes,
//!     options: ResizeOptions::new(100, 100),
//! });
//! let result = manager.execute(request, TaskOptions::default()).await?;
//! ```

mod manager;
mod pool;
mod queue;
mod request;
mod result;
mod retry;


use std::time::Duration;

pub use manager::{TaskManager, TaskManagerBuilder, TaskOptions};
pub use pool::{PoolConfig, PoolStats, WorkerId, WorkerPool, default_pool_size};
pub use queue::{Task, TaskId, TaskPriority, TaskQueue};
pub use request::{TaskFamily, TaskRequest};
pub use result::{Artifact, TaskOutput, TaskResult};
pub use retry::RetryPolicy;

/// Errors raised by the pool itself.
///
/// Failures of the operation running inside a slot are not pool errors: they
/// come back as a [`TaskResult`] with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The caller asked for a family that is not registered
    #[error("unknown task family: {name}")]
    UnknownFamily {
        /// Name as given by the caller.
        name: String,
    },

    /// The request could not be turned into a typed operation
    #[error("invalid {family} request: {reason}")]
    InvalidRequest {
        /// Family the request was addressed to.
        family: TaskFamily,
        /// What was wrong with it.
        reason: String,
    },

    /// No result arrived before the per-task timer fired
    #[error("task {id} timed out after {timeout:?}")]
    TaskTimeout {
        /// Task that timed out.
        id: TaskId,
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// The channel to or from a slot failed
    #[error("worker transport error: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// The pool was shut down before the task produced an outcome
    #[error("{family} pool terminated")]
    PoolTerminated {
        /// Family whose pool was terminated.
        family: TaskFamily,
    },
}

impl PoolError {
    /// Returns true if resubmitting the same task may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TaskTimeout { .. } | Self::Transport { .. })
    }
}

/// Pool result type
pub type PoolResult<T> = Result<T, PoolError>;
