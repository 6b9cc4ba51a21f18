//! In-memory state of one open board and the drag-and-drop transitions on it.
//!
//! The session owns the column and task sequences. Sequence order is display
//! order; the `position` fields are only rewritten when an order is persisted,
//! at which point every entity gets its zero-based sequence index.

use crate::model::{Board, BoardError, Column, ColumnPosition, Task, TaskPosition};
use crate::service::{DataService, ServiceError, ServiceResult};
use tracing::{debug, error, info};

/// Typed payload of a draggable card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragItem {
    Column(String),
    Task(String),
}

/// Snapshot of the entity being dragged, kept for the overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveDrag {
    Column(Column),
    Task(Task),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Ignored,
    ColumnsReordered { persisted: bool },
    TasksSaved { persisted: bool },
}

#[derive(Debug)]
pub struct BoardSession {
    board: Board,
    columns: Vec<Column>,
    tasks: Vec<Task>,
    active: Option<ActiveDrag>,
    task_dialog_column: Option<String>,
    persist_column_order: bool,
}

impl DragItem {
    pub fn id(&self) -> &str {
        match self {
            DragItem::Column(id) | DragItem::Task(id) => id,
        }
    }
}

impl BoardSession {
    pub fn new(board: Board, columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        BoardSession {
            board,
            columns,
            tasks,
            active: None,
            task_dialog_column: None,
            persist_column_order: true,
        }
    }

    /// Fetches the board, its columns by position, and their tasks by position.
    pub fn load(service: &dyn DataService, board_id: &str) -> ServiceResult<Self> {
        let (board, columns, tasks) = fetch(service, board_id)?;
        debug!(
            board = %board.id,
            columns = columns.len(),
            tasks = tasks.len(),
            "board loaded"
        );
        Ok(BoardSession::new(board, columns, tasks))
    }

    pub fn with_column_persistence(mut self, enabled: bool) -> Self {
        self.persist_column_order = enabled;
        self
    }

    /// Refetches everything from the service and replaces the session state.
    pub fn reload(&mut self, service: &dyn DataService) -> ServiceResult<()> {
        let (board, columns, tasks) = fetch(service, &self.board.id)?;
        self.board = board;
        self.columns = columns;
        self.tasks = tasks;
        self.active = None;
        Ok(())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        self.active.as_ref()
    }

    pub fn tasks_in<'a>(&'a self, column_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.column_id == column_id)
    }

    pub fn task_dialog_column(&self) -> Option<&str> {
        self.task_dialog_column.as_deref()
    }

    pub fn open_task_dialog(&mut self, column_id: &str) -> Result<(), BoardError> {
        self.column_index(column_id)?;
        self.task_dialog_column = Some(column_id.to_string());
        Ok(())
    }

    pub fn close_task_dialog(&mut self) {
        self.task_dialog_column = None;
    }

    pub fn begin_drag(&mut self, item: &DragItem) -> Result<(), BoardError> {
        let active = match item {
            DragItem::Column(id) => ActiveDrag::Column(self.columns[self.column_index(id)?].clone()),
            DragItem::Task(id) => ActiveDrag::Task(self.tasks[self.task_index(id)?].clone()),
        };
        self.active = Some(active);
        Ok(())
    }

    /// Handles the pointer passing over `over` while `active` is dragged.
    /// Only task drags change state; returns whether anything changed.
    pub fn drag_over(&mut self, active: &DragItem, over: Option<&DragItem>) -> bool {
        let (task_id, over) = match (active, over) {
            (DragItem::Task(id), Some(over)) => (id, over),
            _ => return false,
        };
        if task_id == over.id() {
            return false;
        }
        match over {
            DragItem::Task(over_id) => {
                let (from, to) = match (self.task_index(task_id), self.task_index(over_id)) {
                    (Ok(from), Ok(to)) => (from, to),
                    _ => return false,
                };
                let target_column = self.tasks[to].column_id.clone();
                let moved = self.reassign_task(task_id, &target_column).unwrap_or(false);
                moved | self.reposition_task(from, to)
            }
            DragItem::Column(column_id) => self.reassign_task(task_id, column_id).unwrap_or(false),
        }
    }

    /// Finishes a drag. The active drag is always cleared; column drops
    /// reorder columns, task drops persist the whole task order. Persistence
    /// failures are logged and never roll back the in-memory order.
    pub fn end_drag(
        &mut self,
        service: &dyn DataService,
        active: &DragItem,
        over: Option<&DragItem>,
    ) -> DropOutcome {
        self.active = None;
        let over = match over {
            Some(over) if over.id() != active.id() => over,
            _ => return DropOutcome::Ignored,
        };
        match (active, over) {
            (DragItem::Column(from_id), DragItem::Column(to_id)) => {
                let (from, to) = match (self.column_index(from_id), self.column_index(to_id)) {
                    (Ok(from), Ok(to)) => (from, to),
                    _ => return DropOutcome::Ignored,
                };
                array_move(&mut self.columns, from, to);
                if !self.persist_column_order {
                    return DropOutcome::ColumnsReordered { persisted: false };
                }
                let persisted = match self.persist_column_order(service) {
                    Ok(_) => true,
                    Err(err) => {
                        error!(board = %self.board.id, error = %err, "saving column order failed");
                        false
                    }
                };
                DropOutcome::ColumnsReordered { persisted }
            }
            (DragItem::Column(_), DragItem::Task(_)) => DropOutcome::Ignored,
            (DragItem::Task(_), _) => {
                let persisted = match self.persist_task_order(service) {
                    Ok(_) => true,
                    Err(err) => {
                        error!(board = %self.board.id, error = %err, "saving task order failed");
                        false
                    }
                };
                DropOutcome::TasksSaved { persisted }
            }
        }
    }

    /// One row per in-memory task, positioned by its sequence index.
    pub fn task_positions(&self) -> Vec<TaskPosition> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| TaskPosition {
                id: task.id.clone(),
                position: idx as i32,
                column_id: task.column_id.clone(),
            })
            .collect()
    }

    pub fn column_positions(&self) -> Vec<ColumnPosition> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| ColumnPosition {
                id: column.id.clone(),
                board_id: column.board_id.clone(),
                position: idx as i32,
            })
            .collect()
    }

    /// Writes every task's current sequence index in one bulk upsert.
    pub fn persist_task_order(&self, service: &dyn DataService) -> Result<usize, ServiceError> {
        let updates = self.task_positions();
        service.upsert_task_positions(&updates)?;
        info!(board = %self.board.id, tasks = updates.len(), "task order saved");
        Ok(updates.len())
    }

    pub fn persist_column_order(&self, service: &dyn DataService) -> Result<usize, ServiceError> {
        let updates = self.column_positions();
        service.upsert_column_positions(&updates)?;
        info!(board = %self.board.id, columns = updates.len(), "column order saved");
        Ok(updates.len())
    }

    /// Moves a task under another column without touching its sequence slot.
    pub fn reassign_task(&mut self, task_id: &str, column_id: &str) -> Result<bool, BoardError> {
        self.column_index(column_id)?;
        let idx = self.task_index(task_id)?;
        if self.tasks[idx].column_id == column_id {
            return Ok(false);
        }
        self.tasks[idx].column_id = column_id.to_string();
        Ok(true)
    }

    /// Moves the task at `from` to sequence index `to`.
    pub fn reposition_task(&mut self, from: usize, to: usize) -> bool {
        array_move(&mut self.tasks, from, to)
    }

    fn column_index(&self, id: &str) -> Result<usize, BoardError> {
        self.columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| BoardError::ColumnNotFound(id.to_string()))
    }

    fn task_index(&self, id: &str) -> Result<usize, BoardError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| BoardError::TaskNotFound(id.to_string()))
    }
}

fn fetch(
    service: &dyn DataService,
    board_id: &str,
) -> ServiceResult<(Board, Vec<Column>, Vec<Task>)> {
    let board = service
        .get_board(board_id)?
        .ok_or_else(|| ServiceError::not_found("board", board_id))?;
    let columns = service.list_columns(board_id)?;
    let column_ids: Vec<String> = columns.iter().map(|c| c.id.clone()).collect();
    let tasks = service.list_tasks(&column_ids)?;
    Ok((board, columns, tasks))
}

/// Removes the element at `from` and reinserts it at `to`. Out-of-range
/// indices and `from == to` leave the slice untouched.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    true
}
