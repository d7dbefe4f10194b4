//! Tasks and the per-family FIFO queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{PoolResult, TaskFamily, TaskRequest, TaskResult};

/// Default per-task timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Unique task identifier, stable across retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generates a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Task priority levels.
///
/// Stored with every task but not used for ordering: the queue is strictly
/// FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// High priority
    High,
    /// Medium priority
    #[default]
    Medium,
    /// Low priority
    Low,
}

/// A unit of work addressed to one family
#[derive(Debug, Clone)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Typed request
    pub request: TaskRequest,
    /// Advisory priority
    pub priority: TaskPriority,
    /// Budget measured from dispatch
    pub timeout: Duration,
    /// Zero for the first attempt
    pub attempt: u32,
    /// Submission time of the first attempt
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a first-attempt task with the default timeout
    #[must_use]
    pub fn new(request: TaskRequest) -> Self {
        Self {
            id: TaskId::new(),
            request,
            priority: TaskPriority::default(),
            timeout: DEFAULT_TIMEOUT,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    /// Family that executes this task
    #[must_use]
    pub fn family(&self) -> TaskFamily {
        self.request.family()
    }

    /// Sets the priority
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A queued task together with the channel its outcome goes to
#[derive(Debug)]
pub(crate) struct PendingTask {
    pub task: Task,
    pub reply: oneshot::Sender<PoolResult<TaskResult>>,
}

/// FIFO queue of not-yet-dispatched tasks
#[derive(Debug)]
pub struct TaskQueue<T> {
    entries: VecDeque<T>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Creates an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Appends an entry at the tail
    pub fn enqueue(&mut self, entry: T) {
        self.entries.push_back(entry);
    }

    /// Removes the head entry
    pub fn dequeue(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    /// Returns the number of queued entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry in queue order
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..)
    }
}
