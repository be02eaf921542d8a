use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::app::models::{Priority, TaskDraft};
use crate::app::sync::{RequestId, WriteOutcome};
use crate::app::task_list::TaskList;

use super::ui::App;

// Input rows of the dialog, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Name,
    Title,
    Description,
    DueDate,
    Priority,
}

impl DraftField {
    const ROWS: [DraftField; 5] = [
        DraftField::Name,
        DraftField::Title,
        DraftField::Description,
        DraftField::DueDate,
        DraftField::Priority,
    ];

    fn from_row(row: usize) -> DraftField {
        Self::ROWS[row.min(Self::ROWS.len() - 1)]
    }

    fn last_row() -> usize {
        Self::ROWS.len() - 1
    }
}

// State object for the add task dialog
// Keeps track of the state of the dialog and the draft being typed
#[derive(Default)]
pub struct TaskEditDialogState {
    pub dialog_active: bool,
    pub draft: TaskDraft,
    error_message: Option<String>,
    cursor_position: Option<(usize, usize)>,
    pending_request: Option<RequestId>,
}

// Byte offset of the char at `char_index`, or the end of the string
fn byte_index(value: &str, char_index: usize) -> usize {
    value
        .char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(value.len())
}

impl TaskEditDialogState {
    // Opens the dialog. The draft is kept from the last time it was open.
    pub fn open(&mut self) {
        self.dialog_active = true;
        self.cursor_position = Some((0, 0));
    }

    pub fn close(&mut self) {
        self.dialog_active = false;
    }

    pub fn is_submitting(&self) -> bool {
        self.pending_request.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    // Replace one field of the draft. No validation: empty text is fine.
    pub fn set_field(&mut self, field: DraftField, value: &str) {
        match field {
            DraftField::Name => self.draft.name = value.to_string(),
            DraftField::Title => self.draft.title = value.to_string(),
            DraftField::Description => self.draft.description = value.to_string(),
            DraftField::DueDate => self.draft.due_date = value.to_string(),
            DraftField::Priority => {
                if let Ok(priority) = value.parse() {
                    self.draft.priority = priority;
                }
            }
        }
    }

    // Think of this as a mapper of vertical cursor position to the field content
    fn content_of_row(&self, row: usize) -> String {
        match DraftField::from_row(row) {
            DraftField::Name => self.draft.name.clone(),
            DraftField::Title => self.draft.title.clone(),
            DraftField::Description => self.draft.description.clone(),
            DraftField::DueDate => self.draft.due_date.clone(),
            DraftField::Priority => self.draft.priority.to_string(),
        }
    }

    fn row_len(&self, row: usize) -> usize {
        self.content_of_row(row).chars().count()
    }

    // Move the cursor one line BELOW the current one.
    // The horizontal cursor position is preserved if possible
    pub fn move_cursor_down(&mut self) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        let next_y = (y + 1).min(DraftField::last_row());
        self.cursor_position = Some((x.min(self.row_len(next_y)), next_y));
    }

    // Move the cursor one line ABOVE the current one.
    pub fn move_cursor_up(&mut self) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        if y > 0 {
            self.cursor_position = Some((x.min(self.row_len(y - 1)), y - 1));
        }
    }

    // One char LEFT; on the priority row this cycles the priority instead
    pub fn move_cursor_left(&mut self) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        if DraftField::from_row(y) == DraftField::Priority {
            self.set_field(DraftField::Priority, self.draft.priority.previous().as_str());
            self.cursor_position = Some((0, y));
        } else if x > 0 {
            self.cursor_position = Some((x - 1, y));
        }
    }

    // One char RIGHT; on the priority row this cycles the priority instead
    pub fn move_cursor_right(&mut self) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        if DraftField::from_row(y) == DraftField::Priority {
            self.set_field(DraftField::Priority, self.draft.priority.next().as_str());
            self.cursor_position = Some((0, y));
        } else {
            self.cursor_position = Some(((x + 1).min(self.row_len(y)), y));
        }
    }

    // Delete the char before the cursor
    pub fn delete_char(&mut self) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        if x == 0 {
            return;
        }
        let field = DraftField::from_row(y);
        if field == DraftField::Priority {
            return;
        }
        let mut text = self.content_of_row(y);
        let at = byte_index(&text, x - 1);
        if at < text.len() {
            text.remove(at);
        }
        self.set_field(field, &text);
        self.cursor_position = Some((x - 1, y));
    }

    // Handles the input of a char by inserting it into the field under the cursor
    pub fn input(&mut self, to_insert: char) {
        let (x, y) = self.cursor_position.unwrap_or((0, 0));
        let field = DraftField::from_row(y);
        if field == DraftField::Priority {
            let priority = match to_insert.to_ascii_lowercase() {
                'h' => Priority::High,
                'm' => Priority::Medium,
                'l' => Priority::Low,
                _ => return,
            };
            self.set_field(field, priority.as_str());
            return;
        }

        let mut text = self.content_of_row(y);
        let at = byte_index(&text, x);
        text.insert(at, to_insert);
        self.set_field(field, &text);
        self.move_cursor_right();
    }

    // Send the draft to the store. Ignored while an earlier submit is in flight.
    pub fn submit(&mut self, items: &mut TaskList) {
        if self.pending_request.is_some() {
            return;
        }
        self.error_message = None;
        self.pending_request = Some(items.create_task(&self.draft));
    }

    // Reset the draft on success; keep it and show the error on failure
    pub fn on_write_outcome(&mut self, outcome: &WriteOutcome) {
        if self.pending_request != Some(outcome.request_id) {
            return;
        }
        self.pending_request = None;

        match &outcome.result {
            Ok(_) => {
                self.draft = TaskDraft::default();
                self.error_message = None;
                self.cursor_position = Some((0, 0));
                self.dialog_active = false;
            }
            Err(e) => {
                self.error_message = Some(format!("Error adding task: {e}"));
            }
        }
    }
}

// Returns the UI content for the add task dialog
pub fn get_task_edit_ui<'a>(app: &'a App) -> Vec<Line<'a>> {
    const GRAY_TEXT: Style = Style::new().fg(Color::Rgb(62, 62, 62));
    const WHITE_TEXT: Style = Style::new().fg(Color::White);
    const BLACK_ON_WHITE: Style = Style::new().fg(Color::Black).bg(Color::White);
    let dialog = &app.task_edit_dialog_state;
    let mut text = Vec::new();

    struct TextDialogInputLine {
        prefix: &'static str,
        placeholder: &'static str,
        value: String,
    }

    // Define the lines (input fields) of the dialog
    let lines = [
        TextDialogInputLine {
            prefix: "Name:        ",
            placeholder: "Groceries",
            value: dialog.draft.name.clone(),
        },
        TextDialogInputLine {
            prefix: "Title:       ",
            placeholder: "Weekly shopping",
            value: dialog.draft.title.clone(),
        },
        TextDialogInputLine {
            prefix: "Description: ",
            placeholder: "Milk, bread, coffee",
            value: dialog.draft.description.clone(),
        },
        TextDialogInputLine {
            prefix: "Due date:    ",
            placeholder: "2024-01-31",
            value: dialog.draft.due_date.clone(),
        },
        TextDialogInputLine {
            prefix: "Priority:    ",
            placeholder: "medium",
            value: format!("< {} >", dialog.draft.priority),
        },
    ];

    let cursor_position = dialog.cursor_position.unwrap_or((0, 0));

    for (i, line) in lines.iter().enumerate() {
        let mut spans = vec![Span::styled(line.prefix, WHITE_TEXT)];
        let selected = cursor_position.1 == i;

        if line.value.is_empty() {
            if selected {
                // First char of the placeholder is highlighted, the rest is gray
                spans.push(Span::styled(
                    line.placeholder.chars().take(1).collect::<String>(),
                    BLACK_ON_WHITE,
                ));
                spans.push(Span::styled(
                    line.placeholder.chars().skip(1).collect::<String>(),
                    GRAY_TEXT,
                ));
            } else {
                spans.push(Span::styled(line.placeholder, GRAY_TEXT));
            }
        } else if selected && DraftField::from_row(i) == DraftField::Priority {
            spans.push(Span::styled(line.value.clone(), BLACK_ON_WHITE));
        } else if selected {
            // All chars are white, except for the one at the cursor position which is highlighted
            let x = cursor_position.0;
            spans.push(Span::styled(
                line.value.chars().take(x).collect::<String>(),
                WHITE_TEXT,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(x).take(1).collect::<String>(),
                BLACK_ON_WHITE,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(x + 1).collect::<String>(),
                WHITE_TEXT,
            ));
            if x >= line.value.chars().count() {
                spans.push(Span::styled(" ", BLACK_ON_WHITE));
            }
        } else {
            spans.push(Span::styled(line.value.clone(), WHITE_TEXT));
        }

        text.push(Line::from(spans));
    }

    text.push(Line::raw(""));

    if dialog.is_submitting() {
        text.push(Line::styled("Saving...", GRAY_TEXT));
        text.push(Line::raw(""));
    }

    // Display the error message if there is one
    if let Some(error_message) = dialog.error_message() {
        text.push(Line::styled(error_message, Style::new().fg(Color::Red)));
        text.push(Line::raw(""));
    }

    text.push(Line::styled(
        "Enter - save, Esc - close, Left/Right - change priority",
        WHITE_TEXT,
    ));

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_dialog() -> TaskEditDialogState {
        let mut dialog = TaskEditDialogState::default();
        dialog.open();
        dialog
    }

    fn type_text(dialog: &mut TaskEditDialogState, text: &str) {
        for c in text.chars() {
            dialog.input(c);
        }
    }

    #[test]
    fn typing_fills_fields_row_by_row() {
        let mut dialog = open_dialog();
        type_text(&mut dialog, "Shop");
        dialog.move_cursor_down();
        type_text(&mut dialog, "Weekly");
        dialog.move_cursor_down();
        dialog.move_cursor_down();
        type_text(&mut dialog, "2024-01-01");

        assert_eq!(dialog.draft.name, "Shop");
        assert_eq!(dialog.draft.title, "Weekly");
        assert_eq!(dialog.draft.description, "");
        assert_eq!(dialog.draft.due_date, "2024-01-01");
    }

    #[test]
    fn editing_handles_multibyte_chars() {
        let mut dialog = open_dialog();
        type_text(&mut dialog, "café");
        dialog.move_cursor_left();
        dialog.input('x');
        assert_eq!(dialog.draft.name, "cafxé");

        dialog.move_cursor_right();
        dialog.delete_char();
        assert_eq!(dialog.draft.name, "cafx");
    }

    #[test]
    fn delete_at_line_start_does_nothing() {
        let mut dialog = open_dialog();
        type_text(&mut dialog, "ab");
        dialog.move_cursor_left();
        dialog.move_cursor_left();
        dialog.delete_char();
        assert_eq!(dialog.draft.name, "ab");
    }

    #[test]
    fn priority_row_cycles_and_accepts_letters() {
        let mut dialog = open_dialog();
        for _ in 0..4 {
            dialog.move_cursor_down();
        }
        assert_eq!(dialog.draft.priority, Priority::Medium);

        dialog.move_cursor_right();
        assert_eq!(dialog.draft.priority, Priority::Low);
        dialog.move_cursor_left();
        dialog.move_cursor_left();
        assert_eq!(dialog.draft.priority, Priority::High);

        dialog.input('l');
        assert_eq!(dialog.draft.priority, Priority::Low);
        dialog.input('z');
        assert_eq!(dialog.draft.priority, Priority::Low);
    }

    #[test]
    fn set_field_accepts_empty_text() {
        let mut dialog = open_dialog();
        dialog.set_field(DraftField::Name, "A");
        dialog.set_field(DraftField::Name, "");
        dialog.set_field(DraftField::Priority, "high");
        dialog.set_field(DraftField::Priority, "bogus");

        assert_eq!(dialog.draft.name, "");
        assert_eq!(dialog.draft.priority, Priority::High);
    }

    #[test]
    fn keystrokes_and_set_field_build_the_same_draft() {
        let mut typed = open_dialog();
        type_text(&mut typed, "Shop");
        typed.move_cursor_down();
        type_text(&mut typed, "Weekly");
        for _ in 0..3 {
            typed.move_cursor_down();
        }
        typed.input('h');

        let mut set = open_dialog();
        set.set_field(DraftField::Name, "Shop");
        set.set_field(DraftField::Title, "Weekly");
        set.set_field(DraftField::Priority, "high");

        assert_eq!(typed.draft, set.draft);
    }

    #[test]
    fn cursor_stays_inside_the_dialog() {
        let mut dialog = open_dialog();
        for _ in 0..10 {
            dialog.move_cursor_down();
        }
        assert_eq!(dialog.cursor_position, Some((0, DraftField::last_row())));
        for _ in 0..10 {
            dialog.move_cursor_up();
        }
        assert_eq!(dialog.cursor_position, Some((0, 0)));
    }
}
