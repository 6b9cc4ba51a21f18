mod cli;
mod commands;
mod dialogs;
mod logging;
#[cfg(test)]
mod memory;
mod model;
mod orchestrator;
mod rest;
mod service;
mod storage;
mod ui;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let paths = storage::Paths::discover()?;
    let config = storage::load_config(&paths)?;
    let _log_guard = logging::init(&paths, &config)?;
    let env = commands::Env { paths, config };

    let command = args.command.unwrap_or(cli::Command::Tui { board: None });
    match command {
        cli::Command::Configure {
            url,
            anon_key,
            session_only_columns,
            persist_columns,
        } => commands::configure(
            &env,
            url,
            anon_key,
            cli::column_persistence(persist_columns, session_only_columns),
        ),
        cli::Command::Signup { email, password } => commands::signup(&env, email, password),
        cli::Command::Login { email, password } => commands::login(&env, email, password),
        cli::Command::Logout => commands::logout(&env),
        cli::Command::Whoami => commands::whoami(&env),
        cli::Command::Boards => commands::boards(&env),
        cli::Command::CreateBoard { title } => commands::create_board(&env, title),
        cli::Command::Show { board } => commands::show(&env, board),
        cli::Command::AddTask {
            column,
            title,
            description,
            priority,
        } => commands::add_task(&env, column, title, description, priority),
        cli::Command::MoveTask { board, task, over } => {
            commands::move_task(&env, board, task, over)
        }
        cli::Command::MoveColumn {
            board,
            column,
            over,
        } => commands::move_column(&env, board, column, over),
        cli::Command::Tui { board } => commands::tui(&env, board),
    }
}
