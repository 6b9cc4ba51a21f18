use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type BoardId = String;
pub type ColumnId = String;
pub type TaskId = String;

/// Titles of the columns every new board starts with, left to right.
pub const DEFAULT_COLUMN_TITLES: [&str; 3] = ["未着手", "進行中", "完了"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Board {
    pub id: BoardId,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Column {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub position: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewBoard {
    pub user_id: String,
    pub title: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewColumn {
    pub board_id: BoardId,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewTask {
    pub column_id: ColumnId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub position: i32,
}

/// Row written by the bulk task-order upsert.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskPosition {
    pub id: TaskId,
    pub position: i32,
    pub column_id: ColumnId,
}

/// Row written by the bulk column-order upsert.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnPosition {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub position: i32,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BoardError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High => Priority::Low,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Priority::Low => Priority::High,
            Priority::Medium => Priority::Low,
            Priority::High => Priority::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "invalid priority '{}' (expected low, medium or high)",
                other
            )),
        }
    }
}

impl NewColumn {
    /// The three default columns for a freshly inserted board.
    pub fn defaults_for(board_id: &str) -> Vec<NewColumn> {
        DEFAULT_COLUMN_TITLES
            .iter()
            .enumerate()
            .map(|(idx, title)| NewColumn {
                board_id: board_id.to_string(),
                title: (*title).to_string(),
                position: idx as i32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_deserializes_from_service_row() {
        let row = r#"{
            "id": "t1",
            "column_id": "c1",
            "title": "Write docs",
            "description": null,
            "priority": "high",
            "position": 4,
            "created_at": "2024-05-01T10:00:00+00:00"
        }"#;
        let task: Task = serde_json::from_str(row).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, None);
        assert_eq!(task.position, 4);
    }

    #[test]
    fn missing_priority_defaults_to_medium() {
        let row = r#"{"id": "t1", "column_id": "c1", "title": "x", "position": 0}"#;
        let task: Task = serde_json::from_str(row).unwrap();
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn board_accepts_offset_timestamps() {
        let row = r#"{
            "id": "b1",
            "user_id": "u1",
            "title": "Roadmap",
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        }"#;
        let board: Board = serde_json::from_str(row).unwrap();
        assert_eq!(board.title, "Roadmap");
    }

    #[test]
    fn priority_parses_and_cycles() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::High.next(), Priority::Low);
        assert_eq!(Priority::Low.prev(), Priority::High);
        assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "\"low\"");
    }

    #[test]
    fn default_columns_are_ranked_from_zero() {
        let columns = NewColumn::defaults_for("b1");
        assert_eq!(columns.len(), 3);
        for (idx, column) in columns.iter().enumerate() {
            assert_eq!(column.position, idx as i32);
            assert_eq!(column.title, DEFAULT_COLUMN_TITLES[idx]);
            assert_eq!(column.board_id, "b1");
        }
    }
}
