use crate::model::{
    Board, Column, ColumnPosition, NewBoard, NewColumn, NewTask, Task, TaskPosition,
};
use serde::{Deserialize, Serialize};

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("not signed in")]
    Unauthenticated,
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("service returned no {0} row")]
    EmptyResponse(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Everything the backend hands out for a signed-in user.
pub trait DataService {
    fn current_user(&self) -> ServiceResult<Option<AuthUser>>;

    /// Boards owned by `user_id`, newest first.
    fn list_boards(&self, user_id: &str) -> ServiceResult<Vec<Board>>;
    fn get_board(&self, board_id: &str) -> ServiceResult<Option<Board>>;
    /// Columns of a board ordered by position.
    fn list_columns(&self, board_id: &str) -> ServiceResult<Vec<Column>>;
    /// Tasks belonging to any of `column_ids`, ordered by position.
    fn list_tasks(&self, column_ids: &[String]) -> ServiceResult<Vec<Task>>;
    fn max_task_position(&self, column_id: &str) -> ServiceResult<Option<i32>>;

    fn insert_board(&self, board: &NewBoard) -> ServiceResult<Board>;
    fn insert_columns(&self, columns: &[NewColumn]) -> ServiceResult<Vec<Column>>;
    fn insert_task(&self, task: &NewTask) -> ServiceResult<Task>;
    fn upsert_task_positions(&self, updates: &[TaskPosition]) -> ServiceResult<()>;
    fn upsert_column_positions(&self, updates: &[ColumnPosition]) -> ServiceResult<()>;
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.into(),
        }
    }
}
