//! Async task pool
//!
//! Submitted calls run on the blocking thread pool, gated by a
//! semaphore sized to the configured concurrency. Results are written
//! back into a shared table keyed by task id and retained until the
//! finished-task cap evicts the oldest. A settled task never changes
//! state again.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::executor::{execute, PreparedCall};
use crate::metrics::{CallLog, ExecutionCounters};
use crate::types::ExecResponse;

// ─────────────────────────────────────────────────────────────────
// Task state
// ─────────────────────────────────────────────────────────────────

/// Point-in-time state of one submitted task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Working,
    Ready(ExecResponse),
    /// The task never produced a response: its thread panicked or the
    /// pool went down underneath it
    Failed(String),
}

struct TaskTable {
    entries: HashMap<Uuid, TaskState>,
    /// Settled task ids in settlement order, oldest first
    finished: VecDeque<Uuid>,
}

// ─────────────────────────────────────────────────────────────────
// Task manager
// ─────────────────────────────────────────────────────────────────

/// Owns the async task table and the execution slots
pub struct TaskManager {
    tasks: Arc<RwLock<TaskTable>>,
    semaphore: Arc<Semaphore>,
    counters: Arc<ExecutionCounters>,
    calls: Arc<CallLog>,
    max_finished: usize,
}

impl TaskManager {
    pub fn new(
        max_concurrent: usize,
        max_finished: usize,
        counters: Arc<ExecutionCounters>,
        calls: Arc<CallLog>,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(TaskTable {
                entries: HashMap::new(),
                finished: VecDeque::new(),
            })),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters,
            calls,
            max_finished,
        }
    }

    /// Submit a call for background execution and return its task id
    ///
    /// The task is visible as WORKING immediately, even while it waits
    /// for an execution slot.
    pub fn submit(&self, call: PreparedCall, app_req_id: Option<i64>) -> Uuid {
        let id = Uuid::new_v4();
        self.tasks.write().entries.insert(id, TaskState::Working);
        info!(task_id = %id, language = %call.language(), "Task submitted");

        let tasks = self.tasks.clone();
        let semaphore = self.semaphore.clone();
        let counters = self.counters.clone();
        let calls = self.calls.clone();
        let max_finished = self.max_finished;

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(task_id = %id, "Pool closed before task could run");
                    settle(
                        &tasks,
                        id,
                        TaskState::Failed("executor pool is shut down".into()),
                        max_finished,
                    );
                    return;
                }
            };
            debug!(task_id = %id, "Task acquired execution slot");

            let outcome =
                tokio::task::spawn_blocking(move || execute(&call, &counters, &calls, app_req_id))
                    .await;

            match outcome {
                Ok(response) => settle(&tasks, id, TaskState::Ready(response), max_finished),
                Err(e) => {
                    error!(task_id = %id, error = %e, "Execution task aborted");
                    settle(
                        &tasks,
                        id,
                        TaskState::Failed(format!("execution aborted: {}", e)),
                        max_finished,
                    );
                }
            }
        });

        id
    }

    /// Look up a task without blocking on running work
    pub fn status(&self, id: Uuid) -> Option<TaskState> {
        self.tasks.read().entries.get(&id).cloned()
    }

    /// Tasks currently tracked, settled or not
    pub fn tracked_count(&self) -> usize {
        self.tasks.read().entries.len()
    }
}

/// Write a terminal state back, first writer wins
fn settle(tasks: &Arc<RwLock<TaskTable>>, id: Uuid, state: TaskState, max_finished: usize) {
    let mut table = tasks.write();
    match table.entries.get(&id) {
        Some(TaskState::Working) => {}
        // Already settled or evicted
        _ => return,
    }
    table.entries.insert(id, state);
    table.finished.push_back(id);
    while table.finished.len() > max_finished {
        if let Some(oldest) = table.finished.pop_front() {
            table.entries.remove(&oldest);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
