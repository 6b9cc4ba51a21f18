use crate::commands::{format_age, NOT_SIGNED_IN};
use crate::dialogs::{self, BoardDraft, DialogError, TaskDraft};
use crate::model::{Board, Priority, Task};
use crate::orchestrator::{ActiveDrag, BoardSession, DragItem, DropOutcome};
use crate::service::{AuthUser, DataService, ServiceError};
use crate::storage::Config;
use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::ListState;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

pub fn run(
    service: &dyn DataService,
    user: AuthUser,
    config: &Config,
    board_id: Option<String>,
) -> Result<()> {
    let mut app = App::new(service, user, config.persist_column_order);
    app.refresh_dashboard();
    if let Some(id) = board_id {
        app.open_board(&id);
    }
    let mut terminal = setup_terminal()?;
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

struct App<'a> {
    service: &'a dyn DataService,
    user: AuthUser,
    persist_column_order: bool,
    boards: Vec<Board>,
    selected_board: usize,
    board_offset: usize,
    screen: Screen,
    mode: Mode,
    status: String,
    last_sync: Instant,
}

enum Screen {
    Dashboard,
    Board(BoardView),
}

enum Mode {
    Normal,
    CreatingBoard(BoardForm),
    CreatingTask(TaskForm),
    Alert {
        title: String,
        message: String,
        resume: Option<Box<Mode>>,
    },
}

struct BoardView {
    session: BoardSession,
    selected_column: usize,
    selected_task: usize,
    scroll_offsets: Vec<usize>,
    drag: Option<DragState>,
}

/// Keyboard pointer of an in-flight drag.
struct DragState {
    item: DragItem,
    column: usize,
    row: usize,
    last_over: Option<DragItem>,
}

struct BoardForm {
    title: FieldValue,
    loading: bool,
}

struct TaskForm {
    title: FieldValue,
    description: FieldValue,
    priority: Priority,
    field: TaskField,
    loading: bool,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum TaskField {
    Title,
    Description,
    Priority,
}

#[derive(Clone)]
struct FieldValue {
    value: String,
    cursor: usize,
}

impl FieldValue {
    fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    fn move_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor = prev_grapheme(self.cursor, &self.value);
    }

    fn move_right(&mut self) {
        if self.cursor >= self.value.len() {
            return;
        }
        self.cursor = next_grapheme(self.cursor, &self.value);
    }

    fn move_up(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx == 0 {
            return;
        }
        let target_start = line_starts[line_idx - 1];
        self.cursor = index_at_col(&self.value, target_start, col);
    }

    fn move_down(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx + 1 >= line_starts.len() {
            return;
        }
        let target_start = line_starts[line_idx + 1];
        self.cursor = index_at_col(&self.value, target_start, col);
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_grapheme(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }
}

impl BoardForm {
    fn new() -> Self {
        BoardForm {
            title: FieldValue::new(""),
            loading: false,
        }
    }
}

impl TaskForm {
    fn new() -> Self {
        TaskForm {
            title: FieldValue::new(""),
            description: FieldValue::new(""),
            priority: Priority::default(),
            field: TaskField::Title,
            loading: false,
        }
    }

    fn draft(&self) -> TaskDraft {
        TaskDraft::new(&self.title.value, &self.description.value, self.priority)
    }

    fn next_field(&mut self) {
        self.field = match self.field {
            TaskField::Title => TaskField::Description,
            TaskField::Description => TaskField::Priority,
            TaskField::Priority => TaskField::Title,
        };
    }

    fn prev_field(&mut self) {
        self.field = match self.field {
            TaskField::Title => TaskField::Priority,
            TaskField::Description => TaskField::Title,
            TaskField::Priority => TaskField::Description,
        };
    }

    fn active_text_mut(&mut self) -> Option<&mut FieldValue> {
        match self.field {
            TaskField::Title => Some(&mut self.title),
            TaskField::Description => Some(&mut self.description),
            TaskField::Priority => None,
        }
    }
}

impl BoardView {
    fn new(session: BoardSession) -> Self {
        let column_count = session.columns().len();
        BoardView {
            session,
            selected_column: 0,
            selected_task: 0,
            scroll_offsets: vec![0; column_count],
            drag: None,
        }
    }

    fn column_len(&self, idx: usize) -> usize {
        self.session
            .columns()
            .get(idx)
            .map(|c| self.session.tasks_in(&c.id).count())
            .unwrap_or(0)
    }

    fn prev_column(&mut self) {
        if self.selected_column > 0 {
            self.selected_column -= 1;
            self.selected_task = 0;
        }
    }

    fn next_column(&mut self) {
        if self.selected_column + 1 < self.session.columns().len() {
            self.selected_column += 1;
            self.selected_task = 0;
        }
    }

    fn prev_task(&mut self) {
        if self.selected_task > 0 {
            self.selected_task -= 1;
        }
    }

    fn next_task(&mut self) {
        if self.selected_task + 1 < self.column_len(self.selected_column) {
            self.selected_task += 1;
        }
    }

    fn clamp_selection(&mut self) {
        let columns = self.session.columns().len();
        self.selected_column = self.selected_column.min(columns.saturating_sub(1));
        self.selected_task = self
            .selected_task
            .min(self.column_len(self.selected_column).saturating_sub(1));
        if self.scroll_offsets.len() != columns {
            self.scroll_offsets.resize(columns, 0);
        }
    }

    fn selected_task(&self) -> Option<&Task> {
        let column = self.session.columns().get(self.selected_column)?;
        self.session.tasks_in(&column.id).nth(self.selected_task)
    }

    fn select_task(&mut self, task_id: &str) {
        if let Some((column, row)) = self.locate_task(task_id) {
            self.selected_column = column;
            self.selected_task = row;
        }
        self.clamp_selection();
    }

    fn locate_task(&self, task_id: &str) -> Option<(usize, usize)> {
        self.session
            .columns()
            .iter()
            .enumerate()
            .find_map(|(c_idx, column)| {
                self.session
                    .tasks_in(&column.id)
                    .position(|t| t.id == task_id)
                    .map(|row| (c_idx, row))
            })
    }

    /// What sits under the pointer for the given drag. Column drags only
    /// ever target columns; task drags target the task in the slot, or the
    /// column itself when the slot is empty.
    fn target_at(&self, item: &DragItem, column: usize, row: usize) -> Option<DragItem> {
        let col = self.session.columns().get(column)?;
        let target = match item {
            DragItem::Column(_) => DragItem::Column(col.id.clone()),
            DragItem::Task(_) => self
                .session
                .tasks_in(&col.id)
                .nth(row)
                .map(|t| DragItem::Task(t.id.clone()))
                .unwrap_or_else(|| DragItem::Column(col.id.clone())),
        };
        Some(target)
    }

    fn start_drag(&mut self, item: DragItem) -> Result<(), crate::model::BoardError> {
        self.session.begin_drag(&item)?;
        self.drag = Some(DragState {
            item,
            column: self.selected_column,
            row: self.selected_task,
            last_over: None,
        });
        Ok(())
    }

    fn move_pointer(&mut self, dx: isize, dy: isize) {
        let (item, column, row) = match &self.drag {
            Some(drag) => (drag.item.clone(), drag.column, drag.row),
            None => return,
        };
        let count = self.session.columns().len();
        if count == 0 {
            return;
        }
        let column = (column as isize + dx).clamp(0, count as isize - 1) as usize;
        let row = match item {
            DragItem::Column(_) => 0,
            DragItem::Task(_) => {
                let len = self.column_len(column);
                (row as isize + dy).clamp(0, len.saturating_sub(1) as isize) as usize
            }
        };
        let target = self.target_at(&item, column, row);
        self.session.drag_over(&item, target.as_ref());
        if let Some(drag) = self.drag.as_mut() {
            drag.column = column;
            drag.row = row;
            if let Some(target) = target.filter(|t| t.id() != item.id()) {
                drag.last_over = Some(target);
            }
        }
    }

    /// Ends the drag. Task drags drop on the last item they passed over
    /// since the dragged card follows the pointer; column drags drop on the
    /// column under the pointer.
    fn finish_drag(&mut self, service: &dyn DataService, cancel: bool) -> Option<DropOutcome> {
        let drag = self.drag.take()?;
        let over = if cancel {
            None
        } else {
            match &drag.item {
                DragItem::Task(_) => drag.last_over.clone(),
                DragItem::Column(_) => self.target_at(&drag.item, drag.column, 0),
            }
        };
        let outcome = self.session.end_drag(service, &drag.item, over.as_ref());
        match &drag.item {
            DragItem::Task(id) => self.select_task(id),
            DragItem::Column(id) => {
                if let Some(idx) = self.session.columns().iter().position(|c| &c.id == id) {
                    self.selected_column = idx;
                    self.selected_task = 0;
                }
                self.clamp_selection();
            }
        }
        Some(outcome)
    }

    fn is_dragged(&self, id: &str) -> bool {
        self.drag
            .as_ref()
            .map(|d| d.item.id() == id)
            .unwrap_or(false)
    }
}

impl<'a> App<'a> {
    fn new(service: &'a dyn DataService, user: AuthUser, persist_column_order: bool) -> Self {
        App {
            service,
            user,
            persist_column_order,
            boards: Vec::new(),
            selected_board: 0,
            board_offset: 0,
            screen: Screen::Dashboard,
            mode: Mode::Normal,
            status: "Enter opens a board, n creates one".into(),
            last_sync: Instant::now(),
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|f| self.draw(f))?;
            if self.submit_pending() {
                continue;
            }
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::CreatingBoard(_) | Mode::CreatingTask(_) => {
                self.handle_form_key(key);
                false
            }
            Mode::Alert { .. } => {
                self.handle_alert_key(key);
                false
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        let dragging = match &self.screen {
            Screen::Dashboard => None,
            Screen::Board(view) => Some(view.drag.is_some()),
        };
        match dragging {
            None => self.handle_dashboard_key(key),
            Some(true) => {
                self.handle_drag_key(key);
                false
            }
            Some(false) => self.handle_board_key(key),
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected_board > 0 {
                    self.selected_board -= 1;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_board + 1 < self.boards.len() {
                    self.selected_board += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(board) = self.boards.get(self.selected_board) {
                    let id = board.id.clone();
                    self.open_board(&id);
                }
            }
            KeyCode::Char('n') => {
                self.mode = Mode::CreatingBoard(BoardForm::new());
                self.status = "Creating board (Enter create, Esc cancel)".into();
            }
            KeyCode::Char('r') => {
                self.refresh_dashboard();
                self.status = "Refreshed".into();
            }
            _ => {}
        }
        false
    }

    fn handle_board_key(&mut self, key: KeyEvent) -> bool {
        let view = match &mut self.screen {
            Screen::Board(view) => view,
            Screen::Dashboard => return false,
        };
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Backspace => {
                self.screen = Screen::Dashboard;
                self.refresh_dashboard();
                self.status = "Back to dashboard".into();
            }
            KeyCode::Left | KeyCode::Char('h') => view.prev_column(),
            KeyCode::Right | KeyCode::Char('l') => view.next_column(),
            KeyCode::Up | KeyCode::Char('k') => view.prev_task(),
            KeyCode::Down | KeyCode::Char('j') => view.next_task(),
            KeyCode::Char('a') => self.open_task_dialog(),
            KeyCode::Char(' ') => self.begin_drag(false),
            KeyCode::Char('C') => self.begin_drag(true),
            KeyCode::Char('r') => self.reload_board(),
            _ => {}
        }
        false
    }

    fn handle_drag_key(&mut self, key: KeyEvent) {
        let (dx, dy) = match key.code {
            KeyCode::Left | KeyCode::Char('h') => (-1, 0),
            KeyCode::Right | KeyCode::Char('l') => (1, 0),
            KeyCode::Up | KeyCode::Char('k') => (0, -1),
            KeyCode::Down | KeyCode::Char('j') => (0, 1),
            KeyCode::Enter | KeyCode::Char(' ') => {
                self.finish_drag(false);
                return;
            }
            KeyCode::Esc => {
                self.finish_drag(true);
                return;
            }
            _ => return,
        };
        if let Screen::Board(view) = &mut self.screen {
            view.move_pointer(dx, dy);
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let close_form = match &mut mode {
            Mode::CreatingBoard(form) => self.process_board_form_key(form, key),
            Mode::CreatingTask(form) => self.process_task_form_key(form, key),
            _ => false,
        };
        if !close_form {
            self.mode = mode;
            return;
        }
        if let (Mode::CreatingTask(_), Screen::Board(view)) = (&mode, &mut self.screen) {
            view.session.close_task_dialog();
        }
    }

    fn handle_alert_key(&mut self, key: KeyEvent) {
        if !matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            return;
        }
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        if let Mode::Alert {
            resume: Some(resume),
            ..
        } = mode
        {
            self.mode = *resume;
        }
    }

    fn process_board_form_key(&mut self, form: &mut BoardForm, key: KeyEvent) -> bool {
        if form.loading {
            return false;
        }
        match key.code {
            KeyCode::Esc => {
                self.status = "Canceled".into();
                return true;
            }
            KeyCode::Enter => {
                form.loading = true;
                self.status = "Creating...".into();
            }
            KeyCode::Left => form.title.move_left(),
            KeyCode::Right => form.title.move_right(),
            KeyCode::Backspace => form.title.backspace(),
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    form.title.insert_char(c);
                }
            }
            _ => {}
        }
        false
    }

    fn process_task_form_key(&mut self, form: &mut TaskForm, key: KeyEvent) -> bool {
        if form.loading {
            return false;
        }
        match key.code {
            KeyCode::Esc => {
                self.status = "Canceled".into();
                return true;
            }
            KeyCode::Tab => form.next_field(),
            KeyCode::BackTab => form.prev_field(),
            KeyCode::Enter => {
                let control = key.modifiers.contains(KeyModifiers::CONTROL);
                if form.field == TaskField::Description && !control {
                    form.description.insert_char('\n');
                } else {
                    form.loading = true;
                    self.status = "Creating...".into();
                }
            }
            KeyCode::Left => match form.active_text_mut() {
                Some(field) => field.move_left(),
                None => form.priority = form.priority.prev(),
            },
            KeyCode::Right => match form.active_text_mut() {
                Some(field) => field.move_right(),
                None => form.priority = form.priority.next(),
            },
            KeyCode::Up => {
                if let Some(field) = form.active_text_mut() {
                    field.move_up();
                }
            }
            KeyCode::Down => {
                if let Some(field) = form.active_text_mut() {
                    field.move_down();
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = form.active_text_mut() {
                    field.backspace();
                }
            }
            KeyCode::Char(c) => {
                if key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    return false;
                }
                match form.active_text_mut() {
                    Some(field) => field.insert_char(c),
                    None if c == ' ' => form.priority = form.priority.next(),
                    None => {
                        if let Some(p) = priority_for_key(c) {
                            form.priority = p;
                        }
                    }
                }
            }
            _ => {}
        }
        false
    }

    /// Runs a dialog submission flagged on the previous key press, after the
    /// "Creating..." frame has been drawn.
    fn submit_pending(&mut self) -> bool {
        let pending = match &self.mode {
            Mode::CreatingBoard(form) => form.loading,
            Mode::CreatingTask(form) => form.loading,
            _ => false,
        };
        if !pending {
            return false;
        }
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        self.mode = match mode {
            Mode::CreatingBoard(form) => self.submit_board(form),
            Mode::CreatingTask(form) => self.submit_task(form),
            other => other,
        };
        true
    }

    fn submit_board(&mut self, mut form: BoardForm) -> Mode {
        form.loading = false;
        match dialogs::create_board(self.service, &BoardDraft::new(&form.title.value)) {
            Ok(created) => {
                self.refresh_dashboard();
                if let Some(idx) = self.boards.iter().position(|b| b.id == created.board.id) {
                    self.selected_board = idx;
                }
                self.status = format!("Created board {}", created.board.title);
                Mode::Normal
            }
            Err(DialogError::TitleRequired) => {
                self.status = "Title is required".into();
                Mode::CreatingBoard(form)
            }
            Err(err) => Mode::Alert {
                title: "Error creating board".into(),
                message: format!("Error creating board: {}", err),
                resume: Some(Box::new(Mode::CreatingBoard(form))),
            },
        }
    }

    fn submit_task(&mut self, mut form: TaskForm) -> Mode {
        form.loading = false;
        let service = self.service;
        let view = match &mut self.screen {
            Screen::Board(view) => view,
            Screen::Dashboard => return Mode::Normal,
        };
        let column_id = match view.session.task_dialog_column() {
            Some(id) => id.to_string(),
            None => return Mode::Normal,
        };
        match dialogs::create_task(service, &column_id, &form.draft()) {
            Ok(task) => {
                view.session.close_task_dialog();
                match view.session.reload(service) {
                    Ok(()) => {
                        view.select_task(&task.id);
                        self.last_sync = Instant::now();
                        self.status = format!("Created task {}", task.title);
                    }
                    Err(err) => self.status = format!("Reload failed: {}", err),
                }
                Mode::Normal
            }
            Err(DialogError::TitleRequired) => {
                self.status = "Title is required".into();
                Mode::CreatingTask(form)
            }
            // Already logged; the dialog just stays open.
            Err(_) => Mode::CreatingTask(form),
        }
    }

    fn open_board(&mut self, board_id: &str) {
        match BoardSession::load(self.service, board_id) {
            Ok(session) => {
                let session = session.with_column_persistence(self.persist_column_order);
                self.status = format!("Opened {}", session.board().title);
                self.screen = Screen::Board(BoardView::new(session));
                self.last_sync = Instant::now();
            }
            Err(err) => self.show_error(err),
        }
    }

    fn refresh_dashboard(&mut self) {
        match self.service.list_boards(&self.user.id) {
            Ok(boards) => {
                self.boards = boards;
                self.selected_board = self
                    .selected_board
                    .min(self.boards.len().saturating_sub(1));
                self.last_sync = Instant::now();
            }
            Err(err) => self.show_error(err),
        }
    }

    fn reload_board(&mut self) {
        let service = self.service;
        let result = match &mut self.screen {
            Screen::Board(view) => {
                let result = view.session.reload(service);
                view.clamp_selection();
                result
            }
            Screen::Dashboard => return,
        };
        match result {
            Ok(()) => {
                self.last_sync = Instant::now();
                self.status = "Reloaded".into();
            }
            Err(err) => self.show_error(err),
        }
    }

    fn open_task_dialog(&mut self) {
        let view = match &mut self.screen {
            Screen::Board(view) => view,
            Screen::Dashboard => return,
        };
        let column_id = match view.session.columns().get(view.selected_column) {
            Some(column) => column.id.clone(),
            None => {
                self.status = "No column to add a task to".into();
                return;
            }
        };
        match view.session.open_task_dialog(&column_id) {
            Ok(()) => {
                self.mode = Mode::CreatingTask(TaskForm::new());
                self.status =
                    "New task (Tab/Shift-Tab move, Ctrl+Enter create, Esc cancel)".into();
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn begin_drag(&mut self, column: bool) {
        let view = match &mut self.screen {
            Screen::Board(view) => view,
            Screen::Dashboard => return,
        };
        let item = if column {
            view.session
                .columns()
                .get(view.selected_column)
                .map(|c| DragItem::Column(c.id.clone()))
        } else {
            view.selected_task().map(|t| DragItem::Task(t.id.clone()))
        };
        let item = match item {
            Some(item) => item,
            None => {
                self.status = "Nothing selected to drag".into();
                return;
            }
        };
        match view.start_drag(item) {
            Ok(()) => {
                let label = view.session.active().map(active_label).unwrap_or_default();
                self.status = format!("Dragging {} (arrows move, Enter drop, Esc cancel)", label);
            }
            Err(err) => self.status = format!("Cannot drag: {}", err),
        }
    }

    fn finish_drag(&mut self, cancel: bool) {
        let service = self.service;
        let outcome = match &mut self.screen {
            Screen::Board(view) => view.finish_drag(service, cancel),
            Screen::Dashboard => None,
        };
        let outcome = match outcome {
            Some(outcome) => outcome,
            None => return,
        };
        self.status = if cancel {
            "Drag canceled".into()
        } else {
            match outcome {
                DropOutcome::Ignored => "Dropped in place".into(),
                DropOutcome::ColumnsReordered { persisted: true }
                | DropOutcome::TasksSaved { persisted: true } => {
                    self.last_sync = Instant::now();
                    "Order saved".into()
                }
                DropOutcome::ColumnsReordered { persisted: false } => "Columns reordered".into(),
                DropOutcome::TasksSaved { persisted: false } => "Task moved".into(),
            }
        };
    }

    fn show_error(&mut self, err: ServiceError) {
        let (title, message) = match &err {
            ServiceError::NotFound { .. } => ("Not found".to_string(), err.to_string()),
            ServiceError::Unauthenticated => ("Signed out".to_string(), NOT_SIGNED_IN.to_string()),
            _ => ("Request failed".to_string(), err.to_string()),
        };
        self.mode = Mode::Alert {
            title,
            message,
            resume: None,
        };
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        if matches!(self.screen, Screen::Dashboard) {
            self.draw_dashboard(f, layout[1]);
        } else {
            self.draw_board(f, layout[1]);
        }
        self.draw_footer(f, layout[2]);

        match &self.mode {
            Mode::CreatingBoard(form) => draw_board_form(f, form),
            Mode::CreatingTask(form) => draw_task_form(f, form),
            Mode::Alert { title, message, .. } => draw_alert(f, title, message),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let location = match &self.screen {
            Screen::Dashboard => "Dashboard".to_string(),
            Screen::Board(view) => format!("/dashboard/{}", view.session.board().id),
        };
        let title_text = match &self.screen {
            Screen::Dashboard => "Your boards".to_string(),
            Screen::Board(view) => view.session.board().title.clone(),
        };
        let who = self.user.email.clone().unwrap_or_else(|| self.user.id.clone());
        let title = Line::from(vec![
            Span::styled(
                "pinboard ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(title_text, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  •  "),
            Span::styled(location, Style::default().fg(Color::DarkGray)),
            Span::raw("  •  "),
            Span::styled(who, Style::default().fg(Color::Green)),
            Span::raw("  •  "),
            Span::styled(
                format!("synced {}", format_elapsed(self.last_sync)),
                Style::default().fg(Color::Gray),
            ),
        ]);

        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_dashboard(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default()
            .title(Span::styled(
                "Dashboard",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .style(Style::default().bg(Color::Rgb(16, 18, 24)));

        if self.boards.is_empty() {
            let body = vec![
                Line::from(Span::styled(
                    "No boards created",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from("You haven't created any boards yet. Press n to create one."),
            ];
            let msg = Paragraph::new(body)
                .alignment(Alignment::Center)
                .block(block);
            f.render_widget(msg, area);
            return;
        }

        let now = Utc::now();
        let items = self
            .boards
            .iter()
            .enumerate()
            .map(|(idx, board)| board_item(board, idx == self.selected_board, now))
            .collect::<Vec<_>>();
        let viewport = (area.height.saturating_sub(2) / 2) as usize;
        self.board_offset = adjust_offset(
            self.selected_board,
            self.board_offset,
            viewport,
            1,
            items.len(),
        );
        let mut state = ListState::default();
        state.select(Some(self.selected_board));
        *state.offset_mut() = self.board_offset;
        f.render_stateful_widget(List::new(items).block(block), area, &mut state);
    }

    fn draw_board(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let view = match &mut self.screen {
            Screen::Board(view) => view,
            Screen::Dashboard => return,
        };
        let columns = view.session.columns();
        if columns.is_empty() {
            let msg = Paragraph::new("This board has no columns")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("pinboard"));
            f.render_widget(Clear, area);
            f.render_widget(msg, area);
            return;
        }

        if view.scroll_offsets.len() < columns.len() {
            view.scroll_offsets.resize(columns.len(), 0);
        }

        let chunk_constraints = columns
            .iter()
            .map(|_| Constraint::Percentage((100 / columns.len() as u16).max(1)))
            .collect::<Vec<_>>();
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(chunk_constraints)
            .split(area);

        let pointer = view.drag.as_ref().map(|d| (d.column, d.row));
        for (idx, column) in columns.iter().enumerate() {
            let accent = color_for_index(idx);
            let card_width = chunks[idx].width.saturating_sub(2);
            let focused_column = pointer.map(|(c, _)| c).unwrap_or(view.selected_column);
            let tasks = view.session.tasks_in(&column.id).collect::<Vec<_>>();
            let items = tasks
                .iter()
                .enumerate()
                .map(|(t_idx, task)| {
                    let selected =
                        pointer.is_none() && idx == view.selected_column && t_idx == view.selected_task;
                    task_card(task, card_width, selected, view.is_dragged(&task.id))
                })
                .collect::<Vec<_>>();

            let mut state = ListState::default();
            let mut offset = *view.scroll_offsets.get(idx).unwrap_or(&0);
            let viewport = (chunks[idx].height.saturating_sub(2) / 5) as usize;
            let selected = match pointer {
                Some((c, r)) if c == idx => Some(r),
                None if idx == view.selected_column => Some(view.selected_task),
                _ => None,
            };
            if let Some(sel) = selected {
                offset = adjust_offset(sel, offset, viewport, 1, items.len());
                view.scroll_offsets[idx] = offset;
                state.select(Some(sel).filter(|_| !items.is_empty()));
                *state.offset_mut() = offset;
            } else {
                *state.offset_mut() = offset.min(items.len().saturating_sub(1));
            }

            let column_dragged = view.is_dragged(&column.id);
            let title = if column_dragged {
                format!("{} (moving)", column.title)
            } else {
                format!("{} ({})", column.title, tasks.len())
            };
            let border = if column_dragged { Color::DarkGray } else { accent };
            let block = Block::default()
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(border)
                        .add_modifier(if idx == focused_column {
                            Modifier::BOLD | Modifier::UNDERLINED
                        } else {
                            Modifier::BOLD
                        }),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .style(Style::default().bg(Color::Rgb(16, 18, 24)));

            let list = List::new(items).block(block);
            f.render_stateful_widget(list, chunks[idx], &mut state);
        }

        if let Some(active) = view.session.active() {
            draw_overlay(f, area, active, &view.session);
        }
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let help_bar = Paragraph::new(self.footer_help_line())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(help_bar, rows[0]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, bottom[0]);

        let detail = Paragraph::new(self.detail_line())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray))
                    .title("Details"),
            );
        f.render_widget(detail, bottom[1]);
    }

    fn footer_help_line(&self) -> Line<'static> {
        let key = |k: &'static str, color: Color| Span::styled(k, Style::default().fg(color));
        let spans = match &self.screen {
            Screen::Dashboard => vec![
                key("↑↓ / j k", Color::LightCyan),
                Span::raw(" select  "),
                key("Enter", Color::LightYellow),
                Span::raw(" open  "),
                key("n", Color::LightMagenta),
                Span::raw(" new board  "),
                key("r", Color::LightGreen),
                Span::raw(" refresh  "),
                key("q", Color::LightRed),
                Span::raw(" quit"),
            ],
            Screen::Board(view) if view.drag.is_some() => vec![
                key("←↑↓→ / h j k l", Color::LightCyan),
                Span::raw(" move  "),
                key("Enter/Space", Color::LightGreen),
                Span::raw(" drop  "),
                key("Esc", Color::LightRed),
                Span::raw(" cancel"),
            ],
            Screen::Board(_) => vec![
                key("←↑↓→ / h j k l", Color::LightCyan),
                Span::raw(" select  "),
                key("Space", Color::LightGreen),
                Span::raw(" drag task  "),
                key("C", Color::LightGreen),
                Span::raw(" drag column  "),
                key("a", Color::LightMagenta),
                Span::raw(" add task  "),
                key("r", Color::LightYellow),
                Span::raw(" reload  "),
                key("Esc", Color::LightCyan),
                Span::raw(" dashboard  "),
                key("q", Color::LightRed),
                Span::raw(" quit"),
            ],
        };
        Line::from(spans)
    }

    fn detail_line(&self) -> Line<'static> {
        match &self.screen {
            Screen::Dashboard => match self.boards.get(self.selected_board) {
                Some(board) => Line::from(vec![
                    Span::styled(
                        board.title.clone(),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(board.id.clone(), Style::default().fg(Color::DarkGray)),
                ]),
                None => Line::from("No board selected"),
            },
            Screen::Board(view) => match view.selected_task() {
                Some(task) => selected_task_detail(task),
                None => Line::from("No task selected"),
            },
        }
    }
}

fn priority_for_key(c: char) -> Option<Priority> {
    Priority::ALL
        .into_iter()
        .find(|p| p.label().starts_with(c.to_ascii_lowercase()))
}

fn draw_board_form(f: &mut ratatui::Frame<'_>, form: &BoardForm) {
    let area = centered_rect(50, 30, f.size());
    let mut lines = field_lines("Title", &form.title, !form.loading);
    lines.push(Line::from(""));
    lines.push(submit_line(form.loading));
    lines.push(Line::from(Span::styled(
        "Enter to create • Esc to cancel",
        Style::default().fg(Color::Gray),
    )));
    draw_dialog(f, area, "Create Board", "Add a new board to organize your tasks.", lines);
}

fn draw_task_form(f: &mut ratatui::Frame<'_>, form: &TaskForm) {
    let area = centered_rect(60, 50, f.size());
    let mut lines = Vec::new();
    lines.extend(field_lines(
        "Title",
        &form.title,
        !form.loading && form.field == TaskField::Title,
    ));
    lines.extend(field_lines(
        "Description",
        &form.description,
        !form.loading && form.field == TaskField::Description,
    ));
    lines.push(priority_line(form.priority, form.field == TaskField::Priority));
    lines.push(Line::from(""));
    lines.push(submit_line(form.loading));
    lines.push(Line::from(Span::styled(
        "Ctrl+Enter to create • Esc to cancel • Tab/Shift-Tab to move • ←→ change priority",
        Style::default().fg(Color::Gray),
    )));
    draw_dialog(f, area, "Create Task", "Add a new task to the column.", lines);
}

fn draw_dialog(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    description: &str,
    body: Vec<Line<'static>>,
) {
    let mut lines = vec![
        Line::from(Span::styled(
            description.to_string(),
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        )),
        Line::from(""),
    ];
    lines.extend(body);
    let dialog = Paragraph::new(lines)
        .block(
            Block::default()
                .title(Span::styled(
                    title.to_string(),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn draw_alert(f: &mut ratatui::Frame<'_>, title: &str, message: &str) {
    let area = centered_rect(50, 30, f.size());
    let body = vec![
        Line::from(Span::styled(
            message.to_string(),
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Press Enter to dismiss"),
    ];
    let dialog = Paragraph::new(body)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(Span::styled(
                    title.to_string(),
                    Style::default()
                        .fg(Color::LightRed)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightRed)),
        );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

/// Floating preview of the dragged card in the board's lower right corner.
fn draw_overlay(f: &mut ratatui::Frame<'_>, area: Rect, active: &ActiveDrag, session: &BoardSession) {
    let width = area.width.min(36);
    let height = area.height.min(7);
    let rect = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + area.height.saturating_sub(height + 1),
        width,
        height,
    };
    let inner = width.saturating_sub(4) as usize;
    let lines = match active {
        ActiveDrag::Task(task) => {
            let mut lines = vec![Line::from(Span::styled(
                truncate_text(&task.title, inner),
                Style::default().add_modifier(Modifier::BOLD),
            ))];
            if let Some(description) = &task.description {
                lines.push(Line::from(Span::styled(
                    truncate_text(description, inner),
                    Style::default().fg(Color::Gray),
                )));
            }
            lines.push(Line::from(priority_badge(task.priority)));
            lines
        }
        ActiveDrag::Column(column) => vec![
            Line::from(Span::styled(
                truncate_text(&column.title, inner),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("{} tasks", session.tasks_in(&column.id).count())),
        ],
    };
    let overlay = Paragraph::new(lines).block(
        Block::default()
            .title("Dragging")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Rgb(252, 214, 112)))
            .style(Style::default().bg(Color::Rgb(22, 24, 30))),
    );
    f.render_widget(Clear, rect);
    f.render_widget(overlay, rect);
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn color_for_index(idx: usize) -> Color {
    let palette = [
        Color::Cyan,
        Color::LightGreen,
        Color::LightMagenta,
        Color::LightBlue,
        Color::LightYellow,
        Color::LightRed,
    ];
    palette[idx % palette.len()]
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::LightRed,
        Priority::Medium => Color::LightYellow,
        Priority::Low => Color::Gray,
    }
}

fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1));
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

fn prev_grapheme(cursor: usize, text: &str) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut prev = 0;
    for (idx, _) in text.char_indices() {
        if idx >= cursor {
            break;
        }
        prev = idx;
    }
    prev
}

fn next_grapheme(cursor: usize, text: &str) -> usize {
    for (idx, ch) in text.char_indices() {
        if idx > cursor {
            return idx;
        }
        if idx == cursor {
            return cursor + ch.len_utf8();
        }
    }
    text.len()
}

fn line_state(text: &str, cursor: usize) -> (Vec<usize>, usize, usize) {
    let mut starts = vec![0];
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            starts.push(idx + 1);
        }
    }
    let line_idx = starts
        .iter()
        .rposition(|start| *start <= cursor)
        .unwrap_or(0);
    let col = text[starts[line_idx]..cursor].chars().count();
    (starts, line_idx, col)
}

fn index_at_col(text: &str, start: usize, target_col: usize) -> usize {
    let slice = &text[start..];
    let limit = slice.find('\n').unwrap_or(slice.len());
    slice[..limit]
        .char_indices()
        .nth(target_col)
        .map(|(idx, _)| start + idx)
        .unwrap_or(start + limit)
}

fn truncate_text(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"...".chars().take(max - keep).collect::<String>());
    out
}

fn board_item(board: &Board, selected: bool, now: chrono::DateTime<Utc>) -> ListItem<'static> {
    let lines = vec![
        Line::from(Span::styled(
            board.title.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("  Created {}", format_age(board.created_at, now)),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let mut item = ListItem::new(lines);
    if selected {
        item = item.style(
            Style::default()
                .bg(Color::Rgb(40, 44, 56))
                .add_modifier(Modifier::BOLD),
        );
    }
    item
}

fn task_card(task: &Task, width: u16, selected: bool, dragged: bool) -> ListItem<'static> {
    let inner_width = width.saturating_sub(4).max(10) as usize;
    if dragged {
        let placeholder = ".".repeat(inner_width + 2);
        let lines = (0..5).map(|_| Line::raw(placeholder.clone())).collect::<Vec<_>>();
        return ListItem::new(lines).style(Style::default().fg(Color::DarkGray));
    }
    let border_char = if selected { "=" } else { "-" };
    let top = format!("+{}+", border_char.repeat(inner_width));
    let title = truncate_text(&task.title, inner_width.saturating_sub(2));
    let description = truncate_text(
        task.description.as_deref().unwrap_or_default(),
        inner_width.saturating_sub(2),
    );
    let badge = format!("[{}]", task.priority);
    let lines = vec![
        Line::raw(top.clone()),
        Line::raw(format!("| {:width$} |", title, width = inner_width)),
        Line::raw(format!("| {:width$} |", description, width = inner_width)),
        Line::from(vec![
            Span::raw("| "),
            Span::styled(
                format!("{:width$}", badge, width = inner_width),
                Style::default().fg(priority_color(task.priority)),
            ),
            Span::raw(" |"),
        ]),
        Line::raw(top),
    ];
    let base = Style::default().bg(Color::Rgb(22, 24, 30)).fg(Color::Gray);
    let mut item = ListItem::new(lines).style(base);
    if selected {
        item = item.style(
            Style::default()
                .bg(Color::Rgb(252, 214, 112))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    }
    item
}

fn priority_badge(priority: Priority) -> Span<'static> {
    Span::styled(
        format!("[{}]", priority),
        Style::default()
            .fg(priority_color(priority))
            .add_modifier(Modifier::BOLD),
    )
}

fn priority_line(current: Priority, active: bool) -> Line<'static> {
    let label_style = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let mut spans = vec![Span::styled("Priority: ", label_style)];
    for priority in Priority::ALL {
        let mut style = Style::default().fg(priority_color(priority));
        if priority == current {
            style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
            if active {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
        }
        spans.push(Span::styled(format!(" {} ", priority), style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn submit_line(loading: bool) -> Line<'static> {
    let label = if loading { "[ Creating... ]" } else { "[ Create ]" };
    Line::from(Span::styled(
        label,
        Style::default()
            .fg(if loading { Color::DarkGray } else { Color::LightGreen })
            .add_modifier(Modifier::BOLD),
    ))
}

fn field_lines(label: &str, field: &FieldValue, active: bool) -> Vec<Line<'static>> {
    let label_style = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let value_style = Style::default().fg(if active { Color::Cyan } else { Color::White });
    let prefix = format!("{}: ", label);
    let spacer = " ".repeat(prefix.chars().count());
    let text = if active {
        field.with_caret()
    } else {
        field.value.clone()
    };
    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            Line::from(vec![
                Span::styled(
                    if idx == 0 {
                        prefix.clone()
                    } else {
                        spacer.clone()
                    },
                    label_style,
                ),
                Span::styled(line.to_string(), value_style),
            ])
        })
        .collect()
}

fn selected_task_detail(task: &Task) -> Line<'static> {
    let mut spans = vec![
        Span::styled(
            task.title.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        priority_badge(task.priority),
    ];
    if let Some(description) = &task.description {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            description.to_string(),
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        ));
    }
    Line::from(spans)
}

fn active_label(active: &ActiveDrag) -> String {
    match active {
        ActiveDrag::Column(column) => format!("column {}", column.title),
        ActiveDrag::Task(task) => format!("task {}", task.title),
    }
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
