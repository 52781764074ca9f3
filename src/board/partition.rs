//! Three-lane partition of the task list.

use serde::Deserialize;
use tracing::warn;

use crate::errors::RelocateError;
use crate::models::{Lane, Task, TaskId};

/// Tasks split into lanes, each in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    lanes: [Vec<Task>; 3],
}

/// What a non-trivial relocation did.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    pub task: Task,
    pub from: Lane,
    pub index_from: usize,
    pub to: Lane,
    /// Destination index after clamping.
    pub index_to: usize,
}

impl Board {
    /// Partition `tasks` by status, keeping their relative order.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Self::default();
        for task in tasks {
            let lane = task.status.lane();
            board.lanes[lane.index()].push(task);
        }
        board
    }

    /// Partition raw JSON task objects, dropping any that do not decode,
    /// including tasks whose status is not one of the three known values.
    pub fn from_json(values: Vec<serde_json::Value>) -> Self {
        let tasks = values.into_iter().filter_map(|value| {
            match Task::deserialize(&value) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(
                        task_id = value.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
                        status = value.get("status").and_then(|v| v.as_str()).unwrap_or("?"),
                        "dropping task that does not fit a lane: {}",
                        e
                    );
                    None
                }
            }
        });
        Self::from_tasks(tasks)
    }

    pub fn lane(&self, lane: Lane) -> &[Task] {
        &self.lanes[lane.index()]
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.lanes.iter().flatten()
    }

    /// Locate a task by id.
    pub fn find(&self, id: &TaskId) -> Option<(Lane, usize)> {
        Lane::ALL.into_iter().find_map(|lane| {
            self.lane(lane)
                .iter()
                .position(|t| &t.id == id)
                .map(|index| (lane, index))
        })
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.find(id).map(|(lane, index)| &self.lane(lane)[index])
    }

    /// Apply one drag gesture.
    ///
    /// Returns `Ok(None)` when source and destination are the same slot.
    /// A cross-lane move rewrites the task's status to the destination
    /// lane's status; `index_to` is clamped to the destination length.
    pub fn relocate(
        &mut self,
        from: Lane,
        index_from: usize,
        to: Lane,
        index_to: usize,
    ) -> Result<Option<Relocation>, RelocateError> {
        let len = self.lane(from).len();
        if index_from >= len {
            return Err(RelocateError::IndexOutOfRange {
                lane: from,
                index: index_from,
                len,
            });
        }
        if from == to && index_from == index_to {
            return Ok(None);
        }

        let mut task = self.lanes[from.index()].remove(index_from);
        if from != to {
            task.status = to.status();
        }
        let dest = &mut self.lanes[to.index()];
        let index_to = index_to.min(dest.len());
        dest.insert(index_to, task.clone());

        Ok(Some(Relocation {
            task,
            from,
            index_from,
            to,
            index_to,
        }))
    }

    /// Put `id` at `index` of `lane` with the lane's status, wherever it is
    /// now. Used to re-apply pending moves over a fresh server snapshot.
    pub(crate) fn place(&mut self, id: &TaskId, lane: Lane, index: usize) -> bool {
        let Some((current, at)) = self.find(id) else {
            return false;
        };
        let mut task = self.lanes[current.index()].remove(at);
        task.status = lane.status();
        let dest = &mut self.lanes[lane.index()];
        let index = index.min(dest.len());
        dest.insert(index, task);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: TaskId::new(id),
            title: format!("Task {}", id),
            description: "desc".into(),
            assigned_to: "alice".into(),
            status,
            created_by: "u1".into(),
            position: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn ids(board: &Board, lane: Lane) -> Vec<&str> {
        board.lane(lane).iter().map(|t| t.id.as_str()).collect()
    }

    fn sample() -> Board {
        Board::from_tasks(vec![
            task("a", TaskStatus::ToDo),
            task("b", TaskStatus::InProgress),
            task("c", TaskStatus::ToDo),
            task("d", TaskStatus::Completed),
            task("e", TaskStatus::ToDo),
        ])
    }

    #[test]
    fn test_from_tasks_partitions_by_status_in_order() {
        let board = sample();
        assert_eq!(ids(&board, Lane::Todo), vec!["a", "c", "e"]);
        assert_eq!(ids(&board, Lane::InProgress), vec!["b"]);
        assert_eq!(ids(&board, Lane::Done), vec!["d"]);
        assert_eq!(board.len(), 5);
    }

    #[test]
    fn test_from_json_drops_unknown_status() {
        let values = vec![
            serde_json::to_value(task("a", TaskStatus::ToDo)).unwrap(),
            serde_json::json!({
                "id": "x", "title": "Blocked", "description": "d",
                "assignedTo": "", "status": "Blocked", "createdBy": "u1"
            }),
            serde_json::to_value(task("b", TaskStatus::Completed)).unwrap(),
        ];
        let board = Board::from_json(values);
        assert_eq!(board.len(), 2);
        assert!(board.find(&TaskId::new("x")).is_none());
    }

    #[test]
    fn test_from_json_decodes_in_place_and_skips_malformed() {
        let mut wide = serde_json::to_value(task("b", TaskStatus::InProgress)).unwrap();
        wide["extra"] = serde_json::json!({"nested": [1, 2, 3]});
        let values = vec![
            serde_json::to_value(task("a", TaskStatus::ToDo)).unwrap(),
            serde_json::json!("not an object"),
            serde_json::json!({"id": "y", "status": "To Do"}),
            wide,
            serde_json::to_value(task("c", TaskStatus::ToDo)).unwrap(),
        ];
        let board = Board::from_json(values);
        assert_eq!(ids(&board, Lane::Todo), vec!["a", "c"]);
        assert_eq!(ids(&board, Lane::InProgress), vec!["b"]);
        assert_eq!(board.lane(Lane::Todo)[1], task("c", TaskStatus::ToDo));
    }

    #[test]
    fn test_relocate_across_lanes_rewrites_status() {
        let mut board = Board::from_tasks(vec![task("a", TaskStatus::ToDo)]);
        let moved = board.relocate(Lane::Todo, 0, Lane::Done, 0).unwrap().unwrap();

        assert!(board.lane(Lane::Todo).is_empty());
        assert!(board.lane(Lane::InProgress).is_empty());
        assert_eq!(ids(&board, Lane::Done), vec!["a"]);
        assert_eq!(board.lane(Lane::Done)[0].status, TaskStatus::Completed);
        assert_eq!(moved.task.status, TaskStatus::Completed);
        assert_eq!(moved.index_to, 0);
    }

    #[test]
    fn test_relocate_same_slot_is_noop() {
        let mut board = sample();
        let before = board.clone();
        assert_eq!(board.relocate(Lane::Todo, 1, Lane::Todo, 1).unwrap(), None);
        assert_eq!(board, before);
    }

    #[test]
    fn test_relocate_within_lane_keeps_status() {
        let mut board = sample();
        let moved = board.relocate(Lane::Todo, 0, Lane::Todo, 2).unwrap().unwrap();
        assert_eq!(ids(&board, Lane::Todo), vec!["c", "e", "a"]);
        assert_eq!(moved.task.status, TaskStatus::ToDo);
    }

    #[test]
    fn test_relocate_clamps_destination_index() {
        let mut board = sample();
        let moved = board
            .relocate(Lane::Todo, 1, Lane::InProgress, 99)
            .unwrap()
            .unwrap();
        assert_eq!(moved.index_to, 1);
        assert_eq!(ids(&board, Lane::InProgress), vec!["b", "c"]);
    }

    #[test]
    fn test_relocate_rejects_bad_source_index() {
        let mut board = sample();
        let before = board.clone();
        let err = board.relocate(Lane::Done, 3, Lane::Todo, 0).unwrap_err();
        assert_eq!(
            err,
            RelocateError::IndexOutOfRange {
                lane: Lane::Done,
                index: 3,
                len: 1
            }
        );
        assert_eq!(board, before);
    }

    #[test]
    fn test_relocate_preserves_total_count_for_every_move() {
        let base = sample();
        for from in Lane::ALL {
            for index_from in 0..base.lane(from).len() {
                for to in Lane::ALL {
                    for index_to in 0..=base.lane(to).len() {
                        let mut board = base.clone();
                        let from_len = board.lane(from).len();
                        let to_len = board.lane(to).len();
                        board.relocate(from, index_from, to, index_to).unwrap();

                        assert_eq!(board.len(), base.len());
                        if from != to {
                            assert_eq!(board.lane(from).len(), from_len - 1);
                            assert_eq!(board.lane(to).len(), to_len + 1);
                            assert!(board.lane(to).iter().all(|t| t.status == to.status()));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_place_moves_task_and_sets_status() {
        let mut board = sample();
        assert!(board.place(&TaskId::new("d"), Lane::Todo, 1));
        assert_eq!(ids(&board, Lane::Todo), vec!["a", "d", "c", "e"]);
        assert_eq!(board.get(&TaskId::new("d")).unwrap().status, TaskStatus::ToDo);
        assert!(!board.place(&TaskId::new("zz"), Lane::Todo, 0));
    }
}
