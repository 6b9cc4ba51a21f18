//! In-memory `DataService` used by the unit tests.

use crate::model::{
    Board, Column, ColumnPosition, NewBoard, NewColumn, NewTask, Task, TaskPosition,
};
use crate::service::{AuthUser, DataService, ServiceError, ServiceResult};
use chrono::{Duration as ChronoDuration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::cell::{Cell, RefCell};

#[derive(Default)]
pub struct MemoryService {
    user: RefCell<Option<AuthUser>>,
    state: RefCell<Tables>,
    pub fail: Failures,
    upserts: Cell<usize>,
    sent_tasks: RefCell<Vec<TaskPosition>>,
    sent_columns: RefCell<Vec<ColumnPosition>>,
}

#[derive(Default)]
struct Tables {
    boards: Vec<Board>,
    columns: Vec<Column>,
    tasks: Vec<Task>,
}

/// Switches that make the matching write fail with a `Rejected` error.
#[derive(Default)]
pub struct Failures {
    pub board_insert: Cell<bool>,
    pub column_insert: Cell<bool>,
    pub task_insert: Cell<bool>,
    pub task_upsert: Cell<bool>,
    pub column_upsert: Cell<bool>,
}

impl MemoryService {
    pub fn signed_in(user_id: &str) -> Self {
        let service = MemoryService::default();
        *service.user.borrow_mut() = Some(AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
        });
        service
    }

    pub fn seed_board(&self, user_id: &str, title: &str) -> Board {
        let board = Board {
            id: generate_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now() - ChronoDuration::minutes(self.board_count() as i64),
        };
        self.state.borrow_mut().boards.push(board.clone());
        board
    }

    pub fn seed_column(&self, board_id: &str, title: &str, position: i32) -> Column {
        let column = Column {
            id: generate_id(),
            board_id: board_id.to_string(),
            title: title.to_string(),
            position,
        };
        self.state.borrow_mut().columns.push(column.clone());
        column
    }

    pub fn seed_task(&self, column_id: &str, title: &str, position: i32) -> Task {
        let task = Task {
            id: generate_id(),
            column_id: column_id.to_string(),
            title: title.to_string(),
            description: None,
            priority: Default::default(),
            position,
        };
        self.state.borrow_mut().tasks.push(task.clone());
        task
    }

    pub fn board_count(&self) -> usize {
        self.state.borrow().boards.len()
    }

    pub fn columns_of(&self, board_id: &str) -> Vec<Column> {
        self.list_columns(board_id).unwrap_or_default()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.state
            .borrow()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.get()
    }

    /// Rows passed to the most recent task-order upsert.
    pub fn sent_task_positions(&self) -> Vec<TaskPosition> {
        self.sent_tasks.borrow().clone()
    }

    pub fn sent_column_positions(&self) -> Vec<ColumnPosition> {
        self.sent_columns.borrow().clone()
    }
}

fn rejected(what: &str) -> ServiceError {
    ServiceError::Rejected {
        status: 400,
        message: format!("{} rejected", what),
    }
}

impl DataService for MemoryService {
    fn current_user(&self) -> ServiceResult<Option<AuthUser>> {
        Ok(self.user.borrow().clone())
    }

    fn list_boards(&self, user_id: &str) -> ServiceResult<Vec<Board>> {
        let mut boards: Vec<Board> = self
            .state
            .borrow()
            .boards
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        boards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(boards)
    }

    fn get_board(&self, board_id: &str) -> ServiceResult<Option<Board>> {
        Ok(self
            .state
            .borrow()
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .cloned())
    }

    fn list_columns(&self, board_id: &str) -> ServiceResult<Vec<Column>> {
        let mut columns: Vec<Column> = self
            .state
            .borrow()
            .columns
            .iter()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    fn list_tasks(&self, column_ids: &[String]) -> ServiceResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .state
            .borrow()
            .tasks
            .iter()
            .filter(|t| column_ids.contains(&t.column_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.position);
        Ok(tasks)
    }

    fn max_task_position(&self, column_id: &str) -> ServiceResult<Option<i32>> {
        Ok(self
            .state
            .borrow()
            .tasks
            .iter()
            .filter(|t| t.column_id == column_id)
            .map(|t| t.position)
            .max())
    }

    fn insert_board(&self, board: &NewBoard) -> ServiceResult<Board> {
        if self.fail.board_insert.get() {
            return Err(rejected("board insert"));
        }
        let created = Board {
            id: generate_id(),
            user_id: board.user_id.clone(),
            title: board.title.clone(),
            created_at: Utc::now(),
        };
        self.state.borrow_mut().boards.push(created.clone());
        Ok(created)
    }

    fn insert_columns(&self, columns: &[NewColumn]) -> ServiceResult<Vec<Column>> {
        if self.fail.column_insert.get() {
            return Err(rejected("column insert"));
        }
        let created: Vec<Column> = columns
            .iter()
            .map(|c| Column {
                id: generate_id(),
                board_id: c.board_id.clone(),
                title: c.title.clone(),
                position: c.position,
            })
            .collect();
        self.state.borrow_mut().columns.extend(created.iter().cloned());
        Ok(created)
    }

    fn insert_task(&self, task: &NewTask) -> ServiceResult<Task> {
        if self.fail.task_insert.get() {
            return Err(rejected("task insert"));
        }
        let created = Task {
            id: generate_id(),
            column_id: task.column_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            position: task.position,
        };
        self.state.borrow_mut().tasks.push(created.clone());
        Ok(created)
    }

    fn upsert_task_positions(&self, updates: &[TaskPosition]) -> ServiceResult<()> {
        self.upserts.set(self.upserts.get() + 1);
        *self.sent_tasks.borrow_mut() = updates.to_vec();
        if self.fail.task_upsert.get() {
            return Err(rejected("task upsert"));
        }
        let mut state = self.state.borrow_mut();
        for update in updates {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == update.id) {
                task.position = update.position;
                task.column_id = update.column_id.clone();
            }
        }
        Ok(())
    }

    fn upsert_column_positions(&self, updates: &[ColumnPosition]) -> ServiceResult<()> {
        self.upserts.set(self.upserts.get() + 1);
        *self.sent_columns.borrow_mut() = updates.to_vec();
        if self.fail.column_upsert.get() {
            return Err(rejected("column upsert"));
        }
        let mut state = self.state.borrow_mut();
        for update in updates {
            if let Some(column) = state.columns.iter_mut().find(|c| c.id == update.id) {
                column.position = update.position;
            }
        }
        Ok(())
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
