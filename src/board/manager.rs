//! Board state manager.
//!
//! Owns the lane partition and the pending form, applies drags optimistically
//! and pushes them to the [`TaskStore`] in the background.
//!
//! Ordering between overlapping calls is resolved with a sequence number:
//! every load and every local relocation takes the next value, and a load
//! response is applied only if no newer state has been applied meanwhile.
//! Relocation persists are tracked by correlation id; a failed persist marks
//! the task out-of-sync until the next applied load.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::TaskStore;
use super::partition::{Board, Relocation};
use crate::errors::{RelocateError, StoreError};
use crate::models::{Lane, NewTask, TaskId, TaskPatch, TaskStatus};

/// Editable fields of the task form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    /// Only sent when editing; a create always starts in "To Do".
    pub status: Option<TaskStatus>,
}

impl TaskDraft {
    fn to_new_task(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            assigned_to: self.assigned_to.clone(),
        }
    }

    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            assigned_to: Some(self.assigned_to.clone()),
            status: self.status,
            position: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    pub draft: TaskDraft,
    pub editing: Option<TaskId>,
}

/// User-visible notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    Loaded { tasks: usize },
    LoadFailed { message: String },
    Relocated { correlation: u64, task_id: TaskId, to: Lane, index: usize },
    Persisted { correlation: u64, task_id: TaskId },
    PersistFailed { correlation: u64, task_id: TaskId, message: String },
    FormFailed { message: String },
    DeleteFailed { task_id: TaskId, message: String },
}

/// Result of a `load` that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { tasks: usize },
    /// A newer state was applied while this load was in flight.
    Discarded,
}

/// Background persist of one relocation.
#[derive(Debug)]
pub struct PersistTicket {
    pub correlation: u64,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Clone)]
struct PendingMove {
    task_id: TaskId,
    lane: Lane,
    index: usize,
}

#[derive(Debug, Default)]
struct BoardState {
    board: Board,
    form: FormState,
    next_seq: u64,
    applied_seq: u64,
    next_correlation: u64,
    in_flight: BTreeMap<u64, PendingMove>,
    out_of_sync: HashSet<TaskId>,
}

impl BoardState {
    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BoardManager {
    store: Arc<dyn TaskStore>,
    state: Arc<Mutex<BoardState>>,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardManager {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self {
            store,
            state: Arc::new(Mutex::new(BoardState::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current partition.
    pub fn board(&self) -> Board {
        self.lock().board.clone()
    }

    pub fn form(&self) -> FormState {
        self.lock().form.clone()
    }

    pub fn is_out_of_sync(&self, id: &TaskId) -> bool {
        self.lock().out_of_sync.contains(id)
    }

    pub fn out_of_sync(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().out_of_sync.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Replace the partition with the store's current task list.
    pub async fn load(&self) -> Result<LoadOutcome, StoreError> {
        let seq = self.lock().take_seq();
        debug!(seq, "loading tasks");

        let values = match self.store.list_tasks().await {
            Ok(values) => values,
            Err(e) => {
                warn!(seq, "failed to load tasks: {}", e);
                self.emit(BoardEvent::LoadFailed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let tasks = {
            let mut state = self.lock();
            if seq <= state.applied_seq {
                debug!(seq, applied = state.applied_seq, "discarding stale load");
                return Ok(LoadOutcome::Discarded);
            }
            state.applied_seq = seq;

            let mut board = Board::from_json(values);
            for pending in state.in_flight.values() {
                board.place(&pending.task_id, pending.lane, pending.index);
            }
            state.board = board;
            state.out_of_sync.clear();
            state.board.len()
        };

        info!(tasks, "board loaded");
        self.emit(BoardEvent::Loaded { tasks });
        Ok(LoadOutcome::Applied { tasks })
    }

    /// Apply a drag locally and persist it in the background.
    ///
    /// Returns `Ok(None)` for a drop on the original slot. Must be called
    /// from within a tokio runtime.
    pub fn relocate(
        &self,
        from: Lane,
        index_from: usize,
        to: Lane,
        index_to: usize,
    ) -> Result<Option<PersistTicket>, RelocateError> {
        let (correlation, relocation) = {
            let mut state = self.lock();
            let Some(relocation) = state.board.relocate(from, index_from, to, index_to)? else {
                return Ok(None);
            };
            let seq = state.take_seq();
            state.applied_seq = seq;
            state.next_correlation += 1;
            let correlation = state.next_correlation;
            state.in_flight.insert(
                correlation,
                PendingMove {
                    task_id: relocation.task.id.clone(),
                    lane: relocation.to,
                    index: relocation.index_to,
                },
            );
            (correlation, relocation)
        };

        let Relocation {
            task, to, index_to, ..
        } = relocation;
        debug!(
            correlation,
            task_id = %task.id,
            from = %from,
            to = %to,
            index = index_to,
            "relocated task"
        );
        self.emit(BoardEvent::Relocated {
            correlation,
            task_id: task.id.clone(),
            to,
            index: index_to,
        });

        let mut patch = TaskPatch::from_task(&task);
        patch.position = i64::try_from(index_to).ok();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let result = manager.store.update_task(&task.id, &patch).await;
            manager.finish_persist(correlation, &task.id, result.map(|_| ()));
        });

        Ok(Some(PersistTicket {
            correlation,
            handle,
        }))
    }

    fn finish_persist(&self, correlation: u64, task_id: &TaskId, result: Result<(), StoreError>) {
        match result {
            Ok(()) => {
                {
                    // Loads issued before this point may predate the write.
                    let mut state = self.lock();
                    state.in_flight.remove(&correlation);
                    let seq = state.take_seq();
                    state.applied_seq = seq;
                }
                debug!(correlation, task_id = %task_id, "relocation persisted");
                self.emit(BoardEvent::Persisted {
                    correlation,
                    task_id: task_id.clone(),
                });
            }
            Err(e) => {
                {
                    let mut state = self.lock();
                    state.in_flight.remove(&correlation);
                    state.out_of_sync.insert(task_id.clone());
                }
                warn!(correlation, task_id = %task_id, "failed to persist relocation: {}", e);
                self.emit(BoardEvent::PersistFailed {
                    correlation,
                    task_id: task_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Fill the form from a task on the board for editing.
    pub fn edit_task(&self, id: &TaskId) -> Option<TaskDraft> {
        let mut state = self.lock();
        let task = state.board.get(id)?;
        let draft = TaskDraft {
            title: task.title.clone(),
            description: task.description.clone(),
            assigned_to: task.assigned_to.clone(),
            status: Some(task.status),
        };
        state.form = FormState {
            draft: draft.clone(),
            editing: Some(id.clone()),
        };
        Some(draft)
    }

    pub fn reset_form(&self) {
        self.lock().form = FormState::default();
    }

    /// Create (no `editing`) or update (`editing` set) from the draft, then
    /// reload. On failure the draft stays in the form.
    pub async fn submit_form(
        &self,
        draft: TaskDraft,
        editing: Option<TaskId>,
    ) -> Result<(), StoreError> {
        self.lock().form = FormState {
            draft: draft.clone(),
            editing: editing.clone(),
        };

        let result = match &editing {
            Some(id) => self.store.update_task(id, &draft.to_patch()).await,
            None => self.store.create_task(&draft.to_new_task()).await,
        };

        match result {
            Ok(task) => {
                info!(task_id = %task.id, editing = editing.is_some(), "task saved");
                self.reset_form();
                self.reload().await;
                Ok(())
            }
            Err(e) => {
                warn!("failed to save task: {}", e);
                self.emit(BoardEvent::FormFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Delete a task, then reload. On failure the board is left as is.
    pub async fn remove_task(&self, id: &TaskId) -> Result<(), StoreError> {
        match self.store.delete_task(id).await {
            Ok(()) => {
                info!(task_id = %id, "task deleted");
                self.reload().await;
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %id, "failed to delete task: {}", e);
                self.emit(BoardEvent::DeleteFailed {
                    task_id: id.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // load() logs and notifies its own failures
    async fn reload(&self) {
        if let Err(e) = self.load().await {
            debug!("reload after write failed: {}", e);
        }
    }

    fn emit(&self, event: BoardEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
