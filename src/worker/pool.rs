//! Worker pool management.
//!
//! A pool owns a fixed number of slots for one family. Each slot is a
//! dedicated OS thread fed through a channel; completions come back on a
//! tokio channel and are applied by the pool's event loop. All bookkeeping
//! (slot availability, generations, queue, in-flight tasks) sits behind one
//! mutex and is only held for short, non-blocking sections.
//!
//! Every dispatch bumps the slot's generation and so does a timeout. A
//! completion is accepted only if its generation still matches, which is
//! how late results from timed-out work are recognized and dropped.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use super::queue::{DEFAULT_TIMEOUT, PendingTask};
use super::{
    PoolError, PoolResult, Task, TaskFamily, TaskId, TaskOutput, TaskQueue, TaskRequest,
    TaskResult,
};
use crate::tasks::{ExecutionError, SharedHandler};

/// Upper bound for the default pool size
const MAX_DEFAULT_WORKERS: usize = 4;

/// Default pool size: hardware concurrency, capped at four
#[must_use]
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_DEFAULT_WORKERS)
}

/// Slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of slots per family
    pub max_workers: usize,
    /// Timeout applied when a task does not carry its own
    pub default_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_pool_size(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Sets the number of slots, at least one
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the default timeout
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Slots in the pool
    pub total_workers: usize,
    /// Slots currently idle
    pub available_workers: usize,
    /// Tasks waiting for a slot
    pub queued_tasks: usize,
    /// Tasks dispatched and not yet settled
    pub active_tasks: usize,
}

enum SlotCommand {
    Run {
        task_id: TaskId,
        generation: u64,
        request: TaskRequest,
    },
    Stop,
}

struct SlotEvent {
    slot: usize,
    generation: u64,
    task_id: TaskId,
    outcome: Result<TaskOutput, ExecutionError>,
    elapsed: Duration,
}

struct InFlight {
    slot: usize,
    generation: u64,
    reply: oneshot::Sender<PoolResult<TaskResult>>,
    timer: AbortHandle,
}

struct PoolState {
    available: Vec<bool>,
    generations: Vec<u64>,
    queue: TaskQueue<PendingTask>,
    in_flight: AHashMap<TaskId, InFlight>,
    dead_slots: usize,
    terminated: bool,
}

struct Shared {
    family: TaskFamily,
    commands: Vec<std_mpsc::Sender<SlotCommand>>,
    state: Mutex<PoolState>,
    runtime: Handle,
}

impl Shared {
    /// Hands queued tasks to idle slots, lowest index first
    fn drain(self: &Arc<Self>, state: &mut PoolState) {
        loop {
            if state.dead_slots == state.available.len() {
                let stranded: Vec<_> = state.queue.drain().collect();
                for pending in stranded {
                    let _ = pending.reply.send(Err(PoolError::Transport {
                        reason: format!("every {} slot is gone", self.family),
                    }));
                }
                return;
            }
            let Some(slot) = state.available.iter().position(|idle| *idle) else {
                return;
            };
            let Some(PendingTask { task, reply }) = state.queue.dequeue() else {
                return;
            };

            state.generations[slot] += 1;
            let generation = state.generations[slot];
            let task_id = task.id;
            let timeout = task.timeout;

            let command = SlotCommand::Run {
                task_id,
                generation,
                request: task.request,
            };
            if self.commands[slot].send(command).is_err() {
                error!(family = %self.family, slot, %task_id, "slot channel closed");
                // Retired for good: never picked as idle again.
                state.available[slot] = false;
                state.dead_slots += 1;
                let _ = reply.send(Err(PoolError::Transport {
                    reason: format!("{} {} is gone", self.family, WorkerId(slot)),
                }));
                continue;
            }

            state.available[slot] = false;
            debug!(
                family = %self.family,
                worker = %WorkerId(slot),
                %task_id,
                attempt = task.attempt,
                priority = ?task.priority,
                "dispatched task"
            );

            let shared = Arc::clone(self);
            let timer = self.runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                shared.expire(task_id, generation, timeout);
            });

            state.in_flight.insert(
                task_id,
                InFlight {
                    slot,
                    generation,
                    reply,
                    timer: timer.abort_handle(),
                },
            );
        }
    }

    fn complete(self: &Arc<Self>, event: SlotEvent) {
        let mut state = self.state.lock();

        let current = state.generations.get(event.slot).copied();
        let matches = state
            .in_flight
            .get(&event.task_id)
            .is_some_and(|f| f.slot == event.slot && f.generation == event.generation);
        if current != Some(event.generation) || !matches {
            debug!(
                family = %self.family,
                worker = %WorkerId(event.slot),
                task_id = %event.task_id,
                "discarding stale result"
            );
            return;
        }

        let Some(flight) = state.in_flight.remove(&event.task_id) else {
            return;
        };
        flight.timer.abort();
        state.available[event.slot] = true;

        let result = match event.outcome {
            Ok(output) => TaskResult::succeeded(output, event.elapsed),
            Err(err) => {
                warn!(family = %self.family, task_id = %event.task_id, error = %err, "task failed");
                TaskResult::failed(err.to_string(), event.elapsed)
            }
        };
        let _ = flight.reply.send(Ok(result));

        self.drain(&mut state);
    }

    fn expire(self: &Arc<Self>, task_id: TaskId, generation: u64, timeout: Duration) {
        let mut state = self.state.lock();

        let still_running = state
            .in_flight
            .get(&task_id)
            .is_some_and(|f| f.generation == generation);
        if !still_running {
            return;
        }
        let Some(flight) = state.in_flight.remove(&task_id) else {
            return;
        };

        // The thread keeps running; the new generation makes its result stale.
        state.generations[flight.slot] += 1;
        state.available[flight.slot] = true;
        warn!(
            family = %self.family,
            worker = %WorkerId(flight.slot),
            %task_id,
            ?timeout,
            "task timed out"
        );
        let _ = flight
            .reply
            .send(Err(PoolError::TaskTimeout { id: task_id, timeout }));

        self.drain(&mut state);
    }
}

/// Fixed-size pool of slots for one task family
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<Shared>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    events: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("family", &self.shared.family)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerPool {
    /// Starts a pool with `config.max_workers` slots running `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Transport`] when called outside a tokio runtime or
    /// when a slot thread cannot be spawned.
    pub fn new(
        family: TaskFamily,
        config: PoolConfig,
        handler: SharedHandler,
    ) -> PoolResult<Self> {
        let runtime = Handle::try_current().map_err(|e| PoolError::Transport {
            reason: format!("no async runtime: {e}"),
        })?;
        let size = config.max_workers.max(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut commands = Vec::with_capacity(size);
        let mut threads = Vec::with_capacity(size);
        for slot in 0..size {
            let (tx, rx) = std_mpsc::channel();
            let handler = Arc::clone(&handler);
            let events = event_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{family}-{}", WorkerId(slot)))
                .spawn(move || run_slot(slot, &handler, &rx, &events))
                .map_err(|e| PoolError::Transport {
                    reason: format!("failed to spawn {family} {}: {e}", WorkerId(slot)),
                })?;
            commands.push(tx);
            threads.push(handle);
        }
        drop(event_tx);

        let shared = Arc::new(Shared {
            family,
            commands,
            state: Mutex::new(PoolState {
                available: vec![true; size],
                generations: vec![0; size],
                queue: TaskQueue::new(),
                in_flight: AHashMap::new(),
                dead_slots: 0,
                terminated: false,
            }),
            runtime: runtime.clone(),
        });

        let events = runtime.spawn(run_events(Arc::clone(&shared), event_rx));
        info!("{} pool started with {} workers", family, size);

        Ok(Self {
            config,
            shared,
            threads: Mutex::new(threads),
            events: Mutex::new(Some(events)),
        })
    }

    /// Family served by this pool
    #[must_use]
    pub fn family(&self) -> TaskFamily {
        self.shared.family
    }

    /// Configuration the pool was started with
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Queues a task and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TaskTimeout`] when no result arrives within the
    /// task's timeout, [`PoolError::PoolTerminated`] when the pool is shut down
    /// first, and [`PoolError::InvalidRequest`] when the task belongs to
    /// another family.
    pub async fn submit(&self, task: Task) -> PoolResult<TaskResult> {
        let family = self.shared.family;
        if task.family() != family {
            return Err(PoolError::InvalidRequest {
                family,
                reason: format!("{} task sent to the {} pool", task.family(), family),
            });
        }

        let (reply, outcome) = oneshot::channel();
        {
            let mut state = self.shared.state.lock();
            if state.terminated {
                return Err(PoolError::PoolTerminated { family });
            }
            state.queue.enqueue(PendingTask { task, reply });
            self.shared.drain(&mut state);
        }

        outcome.await.unwrap_or_else(|_| {
            Err(PoolError::Transport {
                reason: "result channel closed".to_string(),
            })
        })
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            total_workers: state.available.len(),
            available_workers: state.available.iter().filter(|idle| **idle).count(),
            queued_tasks: state.queue.len(),
            active_tasks: state.in_flight.len(),
        }
    }

    /// Returns true once [`terminate`](Self::terminate) has run
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Settles every queued and in-flight task with
    /// [`PoolError::PoolTerminated`] and stops the slots.
    ///
    /// Slot threads finish the operation they are running, then exit.
    pub fn terminate(&self) {
        let family = self.shared.family;
        let (queued, in_flight) = {
            let mut state = self.shared.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.available.iter_mut().for_each(|idle| *idle = true);
            let queued: Vec<_> = state.queue.drain().collect();
            let in_flight: Vec<_> = state.in_flight.drain().map(|(_, f)| f).collect();
            (queued, in_flight)
        };

        let settled = queued.len() + in_flight.len();
        for pending in queued {
            let _ = pending.reply.send(Err(PoolError::PoolTerminated { family }));
        }
        for flight in in_flight {
            flight.timer.abort();
            let _ = flight.reply.send(Err(PoolError::PoolTerminated { family }));
        }

        for commands in &self.shared.commands {
            let _ = commands.send(SlotCommand::Stop);
        }
        if let Some(events) = self.events.lock().take() {
            events.abort();
        }
        // Threads are detached: one may still be inside a long operation.
        self.threads.lock().clear();

        info!("{} pool terminated, {} pending tasks settled", family, settled);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run_slot(
    slot: usize,
    handler: &SharedHandler,
    commands: &std_mpsc::Receiver<SlotCommand>,
    events: &mpsc::UnboundedSender<SlotEvent>,
) {
    debug!(worker = %WorkerId(slot), family = %handler.family(), "slot started");

    while let Ok(command) = commands.recv() {
        match command {
            SlotCommand::Run {
                task_id,
                generation,
                request,
            } => {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.execute(request)))
                    .unwrap_or_else(|payload| Err(ExecutionError::from_panic(payload.as_ref())));
                let event = SlotEvent {
                    slot,
                    generation,
                    task_id,
                    outcome,
                    elapsed: started.elapsed(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            SlotCommand::Stop => break,
        }
    }

    debug!(worker = %WorkerId(slot), family = %handler.family(), "slot stopped");
}

async fn run_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<SlotEvent>) {
    while let Some(event) = events.recv().await {
        shared.complete(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert!(config.max_workers >= 1);
        assert!(config.max_workers <= MAX_DEFAULT_WORKERS);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_pool_config_at_least_one_worker() {
        let config = PoolConfig::default().with_max_workers(0);
        assert_eq!(config.max_workers, 1);
    }

    fn shared_with(commands: Vec<std_mpsc::Sender<SlotCommand>>) -> Arc<Shared> {
        let size = commands.len();
        Arc::new(Shared {
            family: TaskFamily::Pdf,
            commands,
            state: Mutex::new(PoolState {
                available: vec![true; size],
                generations: vec![0; size],
                queue: TaskQueue::new(),
                in_flight: AHashMap::new(),
                dead_slots: 0,
                terminated: false,
            }),
            runtime: Handle::current(),
        })
    }

    fn pending() -> (PendingTask, oneshot::Receiver<PoolResult<TaskResult>>) {
        let (reply, outcome) = oneshot::channel();
        let request = TaskRequest::Pdf(crate::tasks::PdfRequest::Info { data: Vec::new() });
        (
            PendingTask {
                task: Task::new(request),
                reply,
            },
            outcome,
        )
    }

    #[tokio::test]
    async fn test_closed_slot_is_retired() {
        let (dead_tx, dead_rx) = std_mpsc::channel();
        drop(dead_rx);
        let (live_tx, live_rx) = std_mpsc::channel();
        let shared = shared_with(vec![dead_tx, live_tx]);

        let (first, mut first_outcome) = pending();
        let (second, mut second_outcome) = pending();
        {
            let mut state = shared.state.lock();
            state.queue.enqueue(first);
            state.queue.enqueue(second);
            shared.drain(&mut state);

            assert_eq!(state.available, vec![false, false]);
            assert_eq!(state.dead_slots, 1);
            assert_eq!(state.in_flight.len(), 1);
            assert!(state.queue.is_empty());
        }

        assert!(matches!(
            first_outcome.try_recv(),
            Ok(Err(PoolError::Transport { .. }))
        ));
        assert!(second_outcome.try_recv().is_err());
        assert!(matches!(live_rx.try_recv(), Ok(SlotCommand::Run { .. })));
    }

    #[tokio::test]
    async fn test_queue_fails_when_every_slot_is_gone() {
        let (dead_tx, dead_rx) = std_mpsc::channel();
        drop(dead_rx);
        let shared = shared_with(vec![dead_tx]);

        let (first, mut first_outcome) = pending();
        let (second, mut second_outcome) = pending();
        let mut state = shared.state.lock();
        state.queue.enqueue(first);
        state.queue.enqueue(second);
        shared.drain(&mut state);

        assert!(state.queue.is_empty());
        assert!(matches!(
            first_outcome.try_recv(),
            Ok(Err(PoolError::Transport { .. }))
        ));
        assert!(matches!(
            second_outcome.try_recv(),
            Ok(Err(PoolError::Transport { reason })) if reason == "every pdf slot is gone"
        ));
    }

    #[test]
    fn test_worker_id_display() {
        let id = WorkerId(1);
        assert_eq!(id.to_string(), "worker-1");
    }
}
