use std::collections::{HashMap, VecDeque};

use tessera_model::{CorrelationIds, Task, TaskId, TaskKind, TaskStatus};

use super::waiters::WaiterRegistry;

/// Queue slot referencing a task in the status map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) url: String,
}

/// Snapshot of a task handed to a worker slot.
#[derive(Debug, Clone)]
pub(crate) struct RunningTask {
    pub(crate) id: TaskId,
    pub(crate) url: String,
    pub(crate) kind: TaskKind,
    pub(crate) correlation: CorrelationIds,
}

/// All mutable scheduler state. Lives behind one mutex that is never held
/// across an await point.
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub(crate) tasks: HashMap<String, Task>,
    pub(crate) queue: VecDeque<QueuedTask>,
    pub(crate) waiters: WaiterRegistry,
    pub(crate) active: usize,
    next_id: u64,
}

impl SchedulerState {
    pub(crate) fn next_task_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    /// Whether `id` is still the status-map entry for `url`.
    pub(crate) fn is_current(&self, url: &str, id: TaskId) -> bool {
        self.tasks.get(url).is_some_and(|task| task.id == id)
    }

    pub(crate) fn current_mut(
        &mut self,
        url: &str,
        id: TaskId,
    ) -> Option<&mut Task> {
        self.tasks.get_mut(url).filter(|task| task.id == id)
    }

    /// Pop the next task that still owns its status entry and mark it
    /// downloading. Superseded entries are dropped on the way.
    pub(crate) fn pop_runnable(&mut self) -> Option<RunningTask> {
        while let Some(queued) = self.queue.pop_front() {
            let Some(task) = self.current_mut(&queued.url, queued.id) else {
                continue;
            };
            task.status = TaskStatus::Downloading;
            return Some(RunningTask {
                id: task.id,
                url: task.url.clone(),
                kind: task.kind,
                correlation: task.correlation.clone(),
            });
        }
        None
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.active == 0 && self.queue.is_empty()
    }

    pub(crate) fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }
}
