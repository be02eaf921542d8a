use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{prelude::*, widgets::*};
use std::{
    io,
    time::{Duration, Instant},
};
use tracing::debug;

use crate::app::models::Priority;
use crate::app::sync::StoreHandle;
use crate::app::{task_edit::*, task_list::*};

pub struct App {
    pub items: TaskList,
    pub task_edit_dialog_state: TaskEditDialogState,
}

impl App {
    pub fn new(store: StoreHandle, user_id: &str) -> App {
        App {
            items: TaskList::mount(store, user_id),
            task_edit_dialog_state: TaskEditDialogState::default(),
        }
    }

    // Pull in store traffic; create results also go to the dialog
    pub fn tick(&mut self) {
        for outcome in self.items.poll() {
            self.task_edit_dialog_state.on_write_outcome(&outcome);
        }
    }

    // Returns false when the app should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return true;
        }

        if self.task_edit_dialog_state.dialog_active {
            // Handle input for the add task dialog
            let dialog = &mut self.task_edit_dialog_state;
            match key.code {
                KeyCode::Down => dialog.move_cursor_down(),
                KeyCode::Up => dialog.move_cursor_up(),
                KeyCode::Esc => dialog.close(),
                KeyCode::Enter => dialog.submit(&mut self.items),
                KeyCode::Left => dialog.move_cursor_left(),
                KeyCode::Right => dialog.move_cursor_right(),
                KeyCode::Backspace => dialog.delete_char(),
                KeyCode::Char(to_insert) => dialog.input(to_insert),
                _ => {}
            }
        } else if self.items.dragging().is_some() {
            // A task is picked up: only moving and dropping make sense
            match key.code {
                KeyCode::Down => self.items.next(),
                KeyCode::Up => self.items.previous(),
                KeyCode::Enter | KeyCode::Char('m') => self.items.drop_drag(),
                KeyCode::Esc => self.items.cancel_drag(),
                KeyCode::Char('q') => return false,
                _ => {}
            }
        } else {
            // Handle input for the task list navigation and priority changes
            match key.code {
                KeyCode::Char('q') => return false,
                KeyCode::Left => self.items.unselect(),
                KeyCode::Down => self.items.next(),
                KeyCode::Up => self.items.previous(),
                KeyCode::Char('a') => self.task_edit_dialog_state.open(),
                KeyCode::Char('m') => self.items.start_drag(),
                KeyCode::Char('1') => self.items.change_selected_priority(Priority::High),
                KeyCode::Char('2') => self.items.change_selected_priority(Priority::Medium),
                KeyCode::Char('3') => self.items.change_selected_priority(Priority::Low),
                _ => {}
            }
        }
        true
    }

    #[cfg(test)]
    fn settle(&mut self) {
        for outcome in self.items.settle() {
            self.task_edit_dialog_state.on_write_outcome(&outcome);
        }
    }
}

pub fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        app.tick();
        terminal.draw(|f| draw_ui(f, &mut app))?;
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if !app.handle_key(key) {
                    debug!("quitting");
                    app.items.unmount();
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

// Draws the whole user interface
fn draw_ui(f: &mut Frame, app: &mut App) {
    // Create two chunks of screen in 60-40 ratio
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(f.size());

    // DRAW LEFT PART
    let title = if app.items.dragging().is_some() {
        "Tasks (moving: Enter to drop, Esc to cancel)"
    } else {
        "Tasks"
    };
    let task_list = List::new(get_list_items_ui(&app.items))
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    let mut list_state = app.items.state.clone();
    f.render_stateful_widget(task_list, chunks[0], &mut list_state);
    app.items.state = list_state;

    // DRAW RIGHT PART
    if app.task_edit_dialog_state.dialog_active {
        let add_task = Paragraph::new(get_task_edit_ui(app))
            .block(Block::new().title("Add Task").borders(Borders::ALL))
            .style(Style::new().white());

        f.render_widget(add_task, chunks[1]);
    } else {
        // If not editing, display statistics and instructions in vertically split layout
        let right_side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        let instructions = Paragraph::new(get_instructions_ui())
            .block(Block::new().title("Commands").borders(Borders::ALL))
            .style(Style::new().white());

        let statistics = Paragraph::new(get_statistics_ui(app))
            .block(Block::new().title("Statistics").borders(Borders::ALL))
            .style(Style::new().white());

        f.render_widget(instructions, right_side[0]);
        f.render_widget(statistics, right_side[1]);
    }
}
