use crate::model::Priority;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pinboard", version, about = "Terminal kanban client for a hosted board service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Point pinboard at a data service
    Configure {
        /// Base URL of the service (e.g. https://xyz.supabase.co)
        #[arg(long)]
        url: Option<String>,
        /// Public anon key of the service
        #[arg(long)]
        anon_key: Option<String>,
        /// Keep column reorders local to the board session instead of saving them
        #[arg(long, conflicts_with = "persist_columns")]
        session_only_columns: bool,
        /// Save column reorders back to the service (the default)
        #[arg(long)]
        persist_columns: bool,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PINBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PINBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List your boards, newest first
    Boards,
    /// Create a board with the default columns
    CreateBoard {
        /// Board title
        title: String,
    },
    /// Print a board's columns and tasks
    Show {
        /// Board id or /dashboard/{boardId} path
        board: String,
    },
    /// Add a task to a column
    AddTask {
        /// Column id
        column: String,
        /// Task title
        title: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// low, medium or high
        #[arg(long, default_value_t = Priority::Medium)]
        priority: Priority,
    },
    /// Drag a task over another task or a column and drop it there
    MoveTask {
        /// Board id or /dashboard/{boardId} path
        board: String,
        /// Task to drag
        task: String,
        /// Task or column id to drop on
        over: String,
    },
    /// Drag a column over another column and drop it there
    MoveColumn {
        /// Board id or /dashboard/{boardId} path
        board: String,
        /// Column to drag
        column: String,
        /// Column id to drop on
        over: String,
    },
    /// Launch the interactive TUI
    Tui {
        /// Open this board directly (id or /dashboard/{boardId} path)
        board: Option<String>,
    },
}

/// Collapses the paired column flags; `None` leaves the stored setting alone.
pub fn column_persistence(persist_columns: bool, session_only_columns: bool) -> Option<bool> {
    match (persist_columns, session_only_columns) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
