use crate::model::{Board, Column, NewBoard, NewColumn, NewTask, Priority, Task};
use crate::service::{DataService, ServiceError};
use tracing::{error, info};

#[derive(thiserror::Error, Debug)]
pub enum DialogError {
    #[error("title is required")]
    TitleRequired,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardDraft {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
}

/// A created board together with whatever default columns made it in.
#[derive(Debug)]
pub struct CreatedBoard {
    pub board: Board,
    pub columns: Vec<Column>,
}

impl BoardDraft {
    pub fn new(title: &str) -> Self {
        BoardDraft {
            title: title.to_string(),
        }
    }
}

impl TaskDraft {
    pub fn new(title: &str, description: &str, priority: Priority) -> Self {
        let description = if description.trim().is_empty() {
            None
        } else {
            Some(description.to_string())
        };
        TaskDraft {
            title: title.to_string(),
            description,
            priority,
        }
    }
}

/// Inserts the board, then its three default columns. The two writes are
/// independent: if the column insert fails the board stays without columns.
pub fn create_board(
    service: &dyn DataService,
    draft: &BoardDraft,
) -> Result<CreatedBoard, DialogError> {
    let result = try_create_board(service, draft);
    if let Err(err) = &result {
        error!(error = %err, "creating board failed");
    }
    result
}

fn try_create_board(
    service: &dyn DataService,
    draft: &BoardDraft,
) -> Result<CreatedBoard, DialogError> {
    let title = required_title(&draft.title)?;
    let user = service.current_user()?.ok_or(DialogError::UserNotFound)?;
    let board = service.insert_board(&NewBoard {
        user_id: user.id,
        title,
    })?;
    info!(board = %board.id, "board created");
    let columns = service.insert_columns(&NewColumn::defaults_for(&board.id))?;
    Ok(CreatedBoard { board, columns })
}

/// Position for a new task: one past the column's highest, or 0 when empty.
pub fn next_task_position(service: &dyn DataService, column_id: &str) -> Result<i32, ServiceError> {
    Ok(service
        .max_task_position(column_id)?
        .map(|max| max + 1)
        .unwrap_or(0))
}

pub fn create_task(
    service: &dyn DataService,
    column_id: &str,
    draft: &TaskDraft,
) -> Result<Task, DialogError> {
    let result = try_create_task(service, column_id, draft);
    if let Err(err) = &result {
        error!(column = %column_id, error = %err, "creating task failed");
    }
    result
}

fn try_create_task(
    service: &dyn DataService,
    column_id: &str,
    draft: &TaskDraft,
) -> Result<Task, DialogError> {
    let title = required_title(&draft.title)?;
    let position = next_task_position(service, column_id)?;
    let task = service.insert_task(&NewTask {
        column_id: column_id.to_string(),
        title,
        description: draft.description.clone(),
        priority: draft.priority,
        position,
    })?;
    info!(task = %task.id, column = %column_id, position, "task created");
    Ok(task)
}

fn required_title(raw: &str) -> Result<String, DialogError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DialogError::TitleRequired);
    }
    Ok(title.to_string())
}
