use crate::dialogs::{self, BoardDraft, TaskDraft};
use crate::model::{Priority, Task};
use crate::orchestrator::{BoardSession, DragItem, DropOutcome};
use crate::rest::RestService;
use crate::service::{AuthUser, DataService};
use crate::storage::{
    clear_session, load_session, read_config_file, save_config, save_session, Config, Paths,
};
use crate::ui;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

pub const NOT_SIGNED_IN: &str = "not signed in; sign in with `pinboard login`";
const DASHBOARD_PREFIX: &str = "/dashboard/";

pub struct Env {
    pub paths: Paths,
    pub config: Config,
}

pub fn configure(
    env: &Env,
    url: Option<String>,
    anon_key: Option<String>,
    persist_column_order: Option<bool>,
) -> Result<()> {
    let mut config = read_config_file(&env.paths.config_file)?;
    if let Some(url) = url {
        config.url = Some(url);
    }
    if let Some(key) = anon_key {
        config.anon_key = Some(key);
    }
    if let Some(persist) = persist_column_order {
        config.persist_column_order = persist;
    }
    save_config(&env.paths, &config)?;
    println!("Saved configuration to {}", env.paths.config_file.display());
    Ok(())
}

pub fn signup(env: &Env, email: String, password: String) -> Result<()> {
    let service = anonymous_service(env)?;
    match service.sign_up(&email, &password).context("signing up")? {
        Some(session) => {
            save_session(&env.paths, &session)?;
            println!("Signed up and signed in as {}", email);
        }
        None => println!("Check {} for a confirmation link, then run `pinboard login`", email),
    }
    Ok(())
}

pub fn login(env: &Env, email: String, password: String) -> Result<()> {
    let service = anonymous_service(env)?;
    let session = service.sign_in(&email, &password).context("signing in")?;
    save_session(&env.paths, &session)?;
    println!("Signed in as {}", display_user(&session.user));
    Ok(())
}

pub fn logout(env: &Env) -> Result<()> {
    if let Some(session) = load_session(&env.paths)? {
        match anonymous_service(env) {
            Ok(service) => {
                let service = service.with_access_token(session.access_token);
                if let Err(err) = service.sign_out() {
                    warn!(error = %err, "remote sign-out failed");
                }
            }
            Err(err) => warn!(error = %err, "skipping remote sign-out"),
        }
    }
    if clear_session(&env.paths)? {
        println!("Signed out");
    } else {
        println!("No stored session");
    }
    Ok(())
}

pub fn whoami(env: &Env) -> Result<()> {
    let (_, user) = signed_in(env)?;
    println!("{} ({})", display_user(&user), user.id);
    Ok(())
}

pub fn boards(env: &Env) -> Result<()> {
    let (service, user) = signed_in(env)?;
    let boards = service.list_boards(&user.id).context("listing boards")?;
    if boards.is_empty() {
        println!("No boards created. Start with `pinboard create-board <title>`.");
        return Ok(());
    }
    let now = Utc::now();
    for board in boards {
        println!(
            "{}  {}  (created {})",
            board.id,
            board.title,
            format_age(board.created_at, now)
        );
    }
    Ok(())
}

pub fn create_board(env: &Env, title: String) -> Result<()> {
    let (service, _) = signed_in(env)?;
    let created = dialogs::create_board(&service, &BoardDraft::new(&title))
        .map_err(|err| anyhow!("Error creating board: {}", err))?;
    println!(
        "Created board {} ({}) with {} columns",
        created.board.title,
        created.board.id,
        created.columns.len()
    );
    Ok(())
}

pub fn show(env: &Env, board: String) -> Result<()> {
    let (service, _) = signed_in(env)?;
    let session = load_board(env, &service, &board)?;
    println!("Board: {} ({})", session.board().title, session.board().id);
    for column in session.columns() {
        println!("{} [{}]", column.title, column.id);
        let mut empty = true;
        for task in session.tasks_in(&column.id) {
            print_task(task);
            empty = false;
        }
        if empty {
            println!("  (empty)");
        }
        println!();
    }
    Ok(())
}

pub fn add_task(
    env: &Env,
    column: String,
    title: String,
    description: Option<String>,
    priority: Priority,
) -> Result<()> {
    let (service, _) = signed_in(env)?;
    let draft = TaskDraft::new(&title, description.as_deref().unwrap_or_default(), priority);
    let task = dialogs::create_task(&service, &column, &draft)
        .with_context(|| format!("adding task to column {}", column))?;
    println!("Added task {} to {} at position {}", task.id, column, task.position);
    Ok(())
}

pub fn move_task(env: &Env, board: String, task: String, over: String) -> Result<()> {
    let (service, _) = signed_in(env)?;
    let mut session = load_board(env, &service, &board)?;
    let active = DragItem::Task(task.clone());
    session
        .begin_drag(&active)
        .with_context(|| format!("picking up task {}", task))?;
    let target = resolve_target(&session, &over)?;
    session.drag_over(&active, Some(&target));
    let outcome = session.end_drag(&service, &active, Some(&target));
    report(outcome);
    Ok(())
}

pub fn move_column(env: &Env, board: String, column: String, over: String) -> Result<()> {
    let (service, _) = signed_in(env)?;
    let mut session = load_board(env, &service, &board)?;
    let active = DragItem::Column(column.clone());
    session
        .begin_drag(&active)
        .with_context(|| format!("picking up column {}", column))?;
    let target = DragItem::Column(over);
    session.drag_over(&active, Some(&target));
    let outcome = session.end_drag(&service, &active, Some(&target));
    report(outcome);
    Ok(())
}

pub fn tui(env: &Env, board: Option<String>) -> Result<()> {
    let (service, user) = signed_in(env)?;
    let board_id = board.as_deref().map(parse_board_ref).transpose()?;
    ui::run(&service, user, &env.config, board_id)
}

/// Accepts either a bare board id or a `/dashboard/{boardId}` route.
pub fn parse_board_ref(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    let id = trimmed.strip_prefix(DASHBOARD_PREFIX).unwrap_or(trimmed);
    if id.is_empty() || id.contains('/') {
        bail!("invalid board reference: {}", input);
    }
    Ok(id.to_string())
}

/// Relative age in the style of "3 days ago".
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let minutes = secs / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    match secs {
        s if s < 45 => "less than a minute ago".to_string(),
        s if s < 90 => "1 minute ago".to_string(),
        _ if minutes < 45 => format!("{} minutes ago", minutes),
        _ if minutes < 90 => "about 1 hour ago".to_string(),
        _ if hours < 24 => format!("about {} hours ago", hours),
        _ if hours < 48 => "1 day ago".to_string(),
        _ if days < 30 => format!("{} days ago", days),
        _ if days < 60 => "about 1 month ago".to_string(),
        _ if days < 365 => format!("{} months ago", days / 30),
        _ if days < 730 => "about 1 year ago".to_string(),
        _ => format!("{} years ago", days / 365),
    }
}

fn anonymous_service(env: &Env) -> Result<RestService> {
    let config = env.config.service()?;
    RestService::new(&config.url, &config.anon_key).context("building HTTP client")
}

/// A service carrying the stored session, refreshed if it expired. Without a
/// usable session the caller is sent to `pinboard login`.
fn signed_in(env: &Env) -> Result<(RestService, AuthUser)> {
    let base = anonymous_service(env)?;
    let mut session = load_session(&env.paths)?.ok_or_else(|| anyhow!(NOT_SIGNED_IN))?;
    if session.is_expired(Utc::now()) {
        session = match base.refresh(&session.refresh_token) {
            Ok(fresh) => {
                save_session(&env.paths, &fresh)?;
                fresh
            }
            Err(err) => {
                warn!(error = %err, "session refresh failed");
                clear_session(&env.paths)?;
                bail!(NOT_SIGNED_IN);
            }
        };
    }
    let service = base.with_access_token(session.access_token);
    let user = service
        .current_user()
        .context("checking session")?
        .ok_or_else(|| anyhow!(NOT_SIGNED_IN))?;
    Ok((service, user))
}

fn load_board(env: &Env, service: &dyn DataService, board: &str) -> Result<BoardSession> {
    let board_id = parse_board_ref(board)?;
    let session = BoardSession::load(service, &board_id)
        .with_context(|| format!("loading board {}", board_id))?;
    Ok(session.with_column_persistence(env.config.persist_column_order))
}

fn resolve_target(session: &BoardSession, id: &str) -> Result<DragItem> {
    if session.tasks().iter().any(|t| t.id == id) {
        return Ok(DragItem::Task(id.to_string()));
    }
    if session.columns().iter().any(|c| c.id == id) {
        return Ok(DragItem::Column(id.to_string()));
    }
    bail!("{} is neither a task nor a column on this board", id)
}

fn report(outcome: DropOutcome) {
    match outcome {
        DropOutcome::Ignored => println!("Nothing to move"),
        DropOutcome::ColumnsReordered { persisted: true } => println!("Column order saved"),
        DropOutcome::ColumnsReordered { persisted: false } => {
            println!("Column order changed for this session only")
        }
        DropOutcome::TasksSaved { persisted: true } => println!("Task order saved"),
        DropOutcome::TasksSaved { persisted: false } => println!("Task moved"),
    }
}

fn display_user(user: &AuthUser) -> &str {
    user.email.as_deref().unwrap_or(&user.id)
}

fn print_task(task: &Task) {
    println!("  - {}: {} [{}]", task.id, task.title, task.priority);
    if let Some(description) = &task.description {
        println!("    {}", description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::column_persistence;
    use crate::storage::StoredSession;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn env_in(dir: &TempDir) -> Env {
        Env {
            paths: Paths::in_dir(dir.path()),
            config: Config::default(),
        }
    }

    #[test]
    fn board_refs_accept_ids_and_dashboard_paths() {
        assert_eq!(parse_board_ref("abc").unwrap(), "abc");
        assert_eq!(parse_board_ref("/dashboard/abc").unwrap(), "abc");
        assert_eq!(parse_board_ref(" /dashboard/abc/ ").unwrap(), "abc");
        assert!(parse_board_ref("/dashboard/").is_err());
        assert!(parse_board_ref("/settings/abc").is_err());
    }

    #[test]
    fn ages_read_like_relative_times() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "less than a minute ago");
        assert_eq!(format_age(now - ChronoDuration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_age(now - ChronoDuration::hours(3), now), "about 3 hours ago");
        assert_eq!(format_age(now - ChronoDuration::hours(30), now), "1 day ago");
        assert_eq!(format_age(now - ChronoDuration::days(12), now), "12 days ago");
        assert_eq!(format_age(now - ChronoDuration::days(800), now), "2 years ago");
        assert_eq!(format_age(now + ChronoDuration::hours(1), now), "less than a minute ago");
    }

    #[test]
    fn drop_targets_resolve_against_the_session() {
        let service = crate::memory::MemoryService::signed_in("u1");
        let board = service.seed_board("u1", "b");
        let column = service.seed_column(&board.id, "todo", 0);
        let task = service.seed_task(&column.id, "a", 0);
        let session = BoardSession::load(&service, &board.id).unwrap();

        assert_eq!(resolve_target(&session, &task.id).unwrap(), DragItem::Task(task.id.clone()));
        assert_eq!(
            resolve_target(&session, &column.id).unwrap(),
            DragItem::Column(column.id.clone())
        );
        assert!(resolve_target(&session, "ghost").is_err());
    }

    #[test]
    fn configure_keeps_column_setting_unless_a_flag_is_given() {
        let dir = TempDir::new().unwrap();
        let env = env_in(&dir);

        configure(
            &env,
            Some("https://db.example".into()),
            Some("k1".into()),
            column_persistence(false, true),
        )
        .unwrap();
        configure(&env, None, Some("k2".into()), column_persistence(false, false)).unwrap();

        let stored = read_config_file(&env.paths.config_file).unwrap();
        assert_eq!(stored.anon_key.as_deref(), Some("k2"));
        assert_eq!(stored.url.as_deref(), Some("https://db.example"));
        assert!(!stored.persist_column_order);

        configure(&env, None, None, column_persistence(true, false)).unwrap();
        assert!(read_config_file(&env.paths.config_file).unwrap().persist_column_order);
    }

    #[test]
    fn logout_clears_the_session_without_a_configured_service() {
        let dir = TempDir::new().unwrap();
        let env = env_in(&dir);
        let session = StoredSession {
            access_token: "jwt".into(),
            refresh_token: "r1".into(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            user: AuthUser {
                id: "u1".into(),
                email: None,
            },
        };
        save_session(&env.paths, &session).unwrap();

        logout(&env).unwrap();
        assert!(load_session(&env.paths).unwrap().is_none());
    }
}
