//! Explicit context object owning one pool per registered family.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    PoolConfig, PoolError, PoolResult, PoolStats, RetryPolicy, Task, TaskFamily, TaskId,
    TaskPriority, TaskRequest, TaskResult, WorkerPool,
};
use crate::infrastructure::Config;
use crate::tasks::{self, SharedHandler};

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Advisory priority
    pub priority: TaskPriority,
    /// Overrides the pool's default timeout
    pub timeout: Option<Duration>,
    /// Overrides the manager's retry policy
    pub retry: Option<RetryPolicy>,
}

impl TaskOptions {
    /// Sets the priority
    #[must_use]
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Builder for [`TaskManager`]
#[derive(Default)]
pub struct TaskManagerBuilder {
    config: PoolConfig,
    retry: RetryPolicy,
    handlers: AHashMap<TaskFamily, SharedHandler>,
}

impl TaskManagerBuilder {
    /// Sets the pool configuration used for every family
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default retry policy
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registers the handler for its family, replacing any previous one
    #[must_use]
    pub fn register(mut self, handler: SharedHandler) -> Self {
        self.handlers.insert(handler.family(), handler);
        self
    }

    /// Registers the built-in image, GIF and PDF handlers
    #[must_use]
    pub fn with_default_handlers(mut self) -> Self {
        for handler in tasks::default_handlers() {
            self = self.register(handler);
        }
        self
    }

    /// Builds the manager. No pool is started until first use.
    #[must_use]
    pub fn build(self) -> TaskManager {
        TaskManager {
            config: self.config,
            retry: self.retry,
            handlers: self.handlers,
            pools: Mutex::new(AHashMap::new()),
        }
    }
}

/// Owns the pools of every registered family.
///
/// Pools are created lazily on the first task for their family and live until
/// terminated or until the manager is dropped.
pub struct TaskManager {
    config: PoolConfig,
    retry: RetryPolicy,
    handlers: AHashMap<TaskFamily, SharedHandler>,
    pools: Mutex<AHashMap<TaskFamily, Arc<WorkerPool>>>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<_> = self.handlers.keys().copied().collect();
        families.sort();
        f.debug_struct("TaskManager")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("families", &families)
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    /// Starts a builder with no families registered
    #[must_use]
    pub fn builder() -> TaskManagerBuilder {
        TaskManagerBuilder::default()
    }

    /// Manager with the built-in handlers, configured from `config`
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .pool_config(config.pool_config())
            .retry_policy(config.retry_policy())
            .with_default_handlers()
            .build()
    }

    /// Returns true if a handler is registered for `family`
    #[must_use]
    pub fn is_registered(&self, family: TaskFamily) -> bool {
        self.handlers.contains_key(&family)
    }

    /// Runs a request on its family's pool, retrying per policy.
    ///
    /// Failures of the operation itself come back as a [`TaskResult`] with
    /// `success == false` once retries are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownFamily`] when no handler is registered for
    /// the request's family, and the last pool error (timeout, transport,
    /// termination) when retries are exhausted.
    pub async fn execute(&self, request: TaskRequest, options: TaskOptions) -> PoolResult<TaskResult> {
        let family = request.family();
        let retry = options.retry.unwrap_or(self.retry);
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let id = TaskId::new();
        let created_at = chrono::Utc::now();

        let mut attempt = 0;
        loop {
            let pool = self.pool(family)?;
            let task = Task {
                id,
                request: request.clone(),
                priority: options.priority,
                timeout,
                attempt,
                created_at,
            };
            let outcome = pool.submit(task).await;

            let reason = match &outcome {
                Ok(result) if !result.success => result.error.clone(),
                Err(err) if err.is_retryable() => Some(err.to_string()),
                _ => None,
            };
            let Some(reason) = reason else {
                return outcome;
            };
            if attempt >= retry.max_retries {
                return outcome;
            }

            attempt += 1;
            let delay = retry.delay_for(attempt);
            warn!(
                %family,
                task_id = %id,
                attempt,
                max_retries = retry.max_retries,
                ?delay,
                %reason,
                "task failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// String-keyed entry point: resolves the family and operation, then
    /// behaves like [`execute`](Self::execute).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownFamily`] for an unregistered family and
    /// [`PoolError::InvalidRequest`] for an unknown operation or malformed
    /// payload, both before any slot is touched.
    pub async fn execute_named(
        &self,
        family: &str,
        operation: &str,
        payload: serde_json::Value,
        options: TaskOptions,
    ) -> PoolResult<TaskResult> {
        let parsed: TaskFamily = family.parse()?;
        if !self.is_registered(parsed) {
            return Err(PoolError::UnknownFamily {
                name: family.to_string(),
            });
        }
        let request = TaskRequest::from_named(parsed, operation, payload)?;
        self.execute(request, options).await
    }

    /// Counters for a family's pool, if it has been started
    #[must_use]
    pub fn pool_stats(&self, family: TaskFamily) -> Option<PoolStats> {
        self.pools.lock().get(&family).map(|pool| pool.stats())
    }

    /// Stops one family's pool, settling its tasks with
    /// [`PoolError::PoolTerminated`]. The next task starts a fresh pool.
    pub fn terminate_pool(&self, family: TaskFamily) {
        let pool = self.pools.lock().remove(&family);
        if let Some(pool) = pool {
            pool.terminate();
        }
    }

    /// Stops every pool
    pub fn terminate_all(&self) {
        let pools: Vec<_> = self.pools.lock().drain().map(|(_, pool)| pool).collect();
        let count = pools.len();
        for pool in pools {
            pool.terminate();
        }
        if count > 0 {
            info!("terminated {} worker pools", count);
        }
    }

    fn pool(&self, family: TaskFamily) -> PoolResult<Arc<WorkerPool>> {
        let handler = self
            .handlers
            .get(&family)
            .ok_or_else(|| PoolError::UnknownFamily {
                name: family.to_string(),
            })?;

        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(&family) {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(WorkerPool::new(
            family,
            self.config.clone(),
            Arc::clone(handler),
        )?);
        pools.insert(family, Arc::clone(&pool));
        Ok(pool)
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.terminate_all();
    }
}
