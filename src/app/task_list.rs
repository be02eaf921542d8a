use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{Duration, Utc};
use now::DateTimeNow;
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::*;
use tracing::{error, info};

use crate::app::models::{Priority, Task, TaskDraft};
use crate::app::sync::{
    RequestId, Snapshot, StoreHandle, Subscription, WriteAck, WriteOutcome, WriteRequest,
};

use super::ui::App;

// Where a record stands with respect to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Committed,
    Pending,
    Failed(String),
}

// What an in-flight request was about, so its outcome can be booked against the right records
enum InFlight {
    Create,
    Priority(String),
    Order(Vec<String>),
}

pub struct TaskList {
    pub state: ListState,
    pub items: Vec<Task>,
    store: StoreHandle,
    user_id: String,
    subscription: Option<Subscription>,
    awaiting_first_snapshot: bool,
    outcome_tx: Sender<WriteOutcome>,
    outcome_rx: Receiver<WriteOutcome>,
    next_request_id: RequestId,
    in_flight: HashMap<RequestId, InFlight>,
    // Latest request touching each record and how it went
    sync_status: HashMap<String, (RequestId, SyncStatus)>,
    // Id of the task picked up for moving; its index shifts with every snapshot
    dragging: Option<String>,
}

impl TaskList {
    // Open a live subscription; items arrive with the first snapshot
    pub fn mount(store: StoreHandle, user_id: &str) -> TaskList {
        let (outcome_tx, outcome_rx) = mpsc::channel();
        TaskList {
            state: ListState::default(),
            items: Vec::new(),
            subscription: Some(store.subscribe()),
            awaiting_first_snapshot: true,
            store,
            user_id: user_id.to_string(),
            outcome_tx,
            outcome_rx,
            next_request_id: 1,
            in_flight: HashMap::new(),
            sync_status: HashMap::new(),
            dragging: None,
        }
    }

    // Cancel the subscription. Later snapshots are never applied.
    pub fn unmount(&mut self) {
        self.subscription = None;
        self.awaiting_first_snapshot = false;
        self.dragging = None;
    }

    #[cfg(test)]
    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    // Apply everything the store has sent since the last call. Returns the write outcomes so
    // the caller can route create results to the dialog.
    // Outcomes go first: the snapshot a write produced is queued before its acknowledgement.
    pub fn poll(&mut self) -> Vec<WriteOutcome> {
        let outcomes: Vec<WriteOutcome> = self.outcome_rx.try_iter().collect();
        for outcome in &outcomes {
            self.settle_outcome(outcome);
        }

        let latest = self.subscription.as_ref().and_then(Subscription::latest);
        if let Some(snapshot) = latest {
            self.apply_snapshot(snapshot);
        }

        outcomes
    }

    // Replace the local list wholesale. Any purely local ordering is gone after this.
    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.awaiting_first_snapshot = false;
        self.items = snapshot.tasks;
        let items = &self.items;
        self.sync_status
            .retain(|task_id, _| items.iter().any(|task| &task.id == task_id));

        if let Some(i) = self.state.selected() {
            if self.items.is_empty() {
                self.state.select(None);
            } else if i >= self.items.len() {
                self.state.select(Some(self.items.len() - 1));
            }
        }
        // A picked up task that vanished from the collection cancels the move
        if self.dragging.is_some() && self.drag_source().is_none() {
            self.dragging = None;
        }
    }

    fn settle_outcome(&mut self, outcome: &WriteOutcome) {
        let Some(kind) = self.in_flight.remove(&outcome.request_id) else {
            return;
        };
        let status = match &outcome.result {
            Ok(_) => SyncStatus::Committed,
            Err(e) => SyncStatus::Failed(e.to_string()),
        };

        match kind {
            InFlight::Create => match &outcome.result {
                Ok(WriteAck::Created(task)) => info!("Added task {}", task.id),
                Ok(WriteAck::Updated) => {}
                Err(e) => error!("Error adding task: {}", e),
            },
            InFlight::Priority(task_id) => {
                if let Err(e) = &outcome.result {
                    error!("Error updating task priority: {}", e);
                }
                self.book_status(&task_id, outcome.request_id, status);
            }
            InFlight::Order(task_ids) => {
                if let Err(e) = &outcome.result {
                    error!("Error updating task order: {}", e);
                }
                for task_id in task_ids {
                    self.book_status(&task_id, outcome.request_id, status.clone());
                }
            }
        }
    }

    // Only the newest request for a record decides its status
    fn book_status(&mut self, task_id: &str, request_id: RequestId, status: SyncStatus) {
        let is_latest = matches!(
            self.sync_status.get(task_id),
            Some((latest, _)) if *latest == request_id
        );
        if !is_latest {
            return;
        }
        if status == SyncStatus::Committed {
            self.sync_status.remove(task_id);
        } else {
            self.sync_status
                .insert(task_id.to_string(), (request_id, status));
        }
    }

    fn dispatch(&mut self, request: WriteRequest, kind: InFlight) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        match &kind {
            InFlight::Create => {}
            InFlight::Priority(task_id) => {
                self.sync_status
                    .insert(task_id.clone(), (request_id, SyncStatus::Pending));
            }
            InFlight::Order(task_ids) => {
                for task_id in task_ids {
                    self.sync_status
                        .insert(task_id.clone(), (request_id, SyncStatus::Pending));
                }
            }
        }
        self.in_flight.insert(request_id, kind);

        // A dead worker fails the write right away, through the same path as any other failure
        if let Err(e) = self.store.submit(request_id, request, &self.outcome_tx) {
            let _ = self.outcome_tx.send(WriteOutcome {
                request_id,
                result: Err(e),
            });
        }
        request_id
    }

    // Write a new task built from the draft. Nothing is added locally;
    // the task shows up with the next snapshot.
    pub fn create_task(&mut self, draft: &TaskDraft) -> RequestId {
        let new_task = draft.to_new_task(&self.user_id);
        self.dispatch(WriteRequest::Create(new_task), InFlight::Create)
    }

    // Set the priority locally, then write it. A failed write is not rolled back.
    pub fn change_priority(&mut self, task_id: &str, priority: Priority) {
        match self.items.iter_mut().find(|task| task.id == task_id) {
            Some(task) => task.priority = priority,
            None => return,
        }
        self.dispatch(
            WriteRequest::UpdatePriority {
                task_id: task_id.to_string(),
                priority,
            },
            InFlight::Priority(task_id.to_string()),
        );
    }

    pub fn change_selected_priority(&mut self, priority: Priority) {
        if let Some(task_id) = self.get_selected().map(|task| task.id.clone()) {
            self.change_priority(&task_id, priority);
        }
    }

    // End of a drag gesture. No destination means it was dropped outside the list.
    pub fn on_drag_end(&mut self, source: usize, destination: Option<usize>) {
        let Some(destination) = destination else {
            return;
        };
        if source >= self.items.len() {
            return;
        }
        let destination = destination.min(self.items.len() - 1);
        if source == destination {
            return;
        }

        let moved = self.items.remove(source);
        self.items.insert(destination, moved);
        self.state.select(Some(destination));

        // Every position is rewritten in one atomic update
        let positions: Vec<(String, i64)> = self
            .items
            .iter()
            .enumerate()
            .map(|(index, task)| (task.id.clone(), index as i64))
            .collect();
        let task_ids = positions.iter().map(|(id, _)| id.clone()).collect();
        self.dispatch(WriteRequest::UpdateOrder(positions), InFlight::Order(task_ids));
    }

    // Pick up the selected task for moving
    pub fn start_drag(&mut self) {
        self.dragging = self.get_selected().map(|task| task.id.clone());
    }

    // Current index of the picked up task
    fn drag_source(&self) -> Option<usize> {
        let task_id = self.dragging.as_ref()?;
        self.items.iter().position(|task| &task.id == task_id)
    }

    // Drop the picked up task at the selection
    pub fn drop_drag(&mut self) {
        let source = self.drag_source();
        self.dragging = None;
        if let Some(source) = source {
            let destination = self.state.selected();
            self.on_drag_end(source, destination);
        }
    }

    // Drop outside the list
    pub fn cancel_drag(&mut self) {
        let source = self.drag_source();
        self.dragging = None;
        if let Some(source) = source {
            self.on_drag_end(source, None);
            self.state.select(Some(source));
        }
    }

    pub fn dragging(&self) -> Option<usize> {
        self.drag_source()
    }

    pub fn sync_status(&self, task_id: &str) -> SyncStatus {
        match self.sync_status.get(task_id) {
            Some((_, status)) => status.clone(),
            None => SyncStatus::Committed,
        }
    }

    // Records whose latest write is not confirmed
    pub fn unsynced_count(&self) -> usize {
        self.sync_status.len()
    }

    // Nothing in flight and the subscription has delivered at least once
    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && !self.awaiting_first_snapshot
    }

    // Move the selection to the next item
    // Copied from the ratatui list example
    pub fn next(&mut self) {
        let i = match self.state.selected() {
            Some(i) => {
                if self.items.is_empty() || i >= self.items.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    // Move the selection to the previous item
    // Copied from the ratatui list example
    pub fn previous(&mut self) {
        let i = match self.state.selected() {
            Some(i) => {
                if self.items.is_empty() {
                    0
                } else if i == 0 {
                    self.items.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn unselect(&mut self) {
        self.state.select(None);
    }

    // Get the selected task
    pub fn get_selected(&self) -> Option<&Task> {
        match self.state.selected() {
            Some(i) => self.items.get(i),
            None => None,
        }
    }

    pub fn count_with_priority(&self, priority: Priority) -> usize {
        self.items
            .iter()
            .filter(|task| task.priority == priority)
            .count()
    }

    // Get the tasks due within the next week
    pub fn get_due_next_week(&self) -> Vec<&Task> {
        let today = Utc::now().date_naive();
        let next_week = today + Duration::weeks(1);
        self.items
            .iter()
            .filter(|task| {
                task.parsed_due_date()
                    .is_some_and(|due| due >= today && due < next_week)
            })
            .collect()
    }

    // Get the late tasks
    pub fn get_late(&self) -> Vec<&Task> {
        let today = Utc::now().beginning_of_day().date_naive();
        self.items
            .iter()
            .filter(|task| task.parsed_due_date().is_some_and(|due| due < today))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn settle(&mut self) -> Vec<WriteOutcome> {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut outcomes = Vec::new();
        loop {
            outcomes.extend(self.poll());
            if self.is_idle() || std::time::Instant::now() >= deadline {
                return outcomes;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::White,
    }
}

// Build the UI (list) for task list
pub fn get_list_items_ui<'a>(list: &'a TaskList) -> Vec<ListItem<'a>> {
    list.items
        .iter()
        .map(|task| {
            let marker = match list.sync_status(&task.id) {
                SyncStatus::Committed => "    ",
                SyncStatus::Pending => "[~] ",
                SyncStatus::Failed(_) => "[!] ",
            };
            let grip = if list.dragging.as_deref() == Some(task.id.as_str()) {
                "⇅ "
            } else {
                ""
            };

            let lines = vec![
                Line::from(vec![
                    Span::from(marker),
                    Span::from(grip),
                    Span::from(task.name.as_str()).bold(),
                    Span::from(format!(" - {} ", task.title)),
                    Span::from(format!("({})", task.priority)).fg(priority_color(task.priority)),
                ]),
                Line::from(format!("    {}", task.description)),
                Line::from(format!("    Due Date: {}", task.due_date)),
            ];
            ListItem::new(lines).style(Style::default().fg(Color::White))
        })
        .collect()
}

// Build the UI (lines) for statistics infobox
pub fn get_statistics_ui<'a>(app: &'a App) -> Vec<Line<'a>> {
    let list = &app.items;
    vec![
        Line::from(format!("Total tasks: {}", list.items.len())),
        Line::from(format!(
            "High / medium / low: {} / {} / {}",
            list.count_with_priority(Priority::High),
            list.count_with_priority(Priority::Medium),
            list.count_with_priority(Priority::Low),
        )),
        Line::from(format!("Due next week: {}", list.get_due_next_week().len())),
        Line::from(format!("Late: {}", list.get_late().len())),
        Line::from(format!("Not synced: {}", list.unsynced_count())),
    ]
}

// Build the UI (lines) for instructions infobox
pub fn get_instructions_ui<'a>() -> Vec<Line<'a>> {
    vec![
        "a - add a task".into(),
        "1 / 2 / 3 - high / medium / low priority".into(),
        "m - pick up / drop a task".into(),
        "Enter - drop, Esc - cancel move".into(),
        "q - quit".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::memory_store::MemoryStore;
    use crate::app::storage::StoreError;
    use crate::app::sync;
    use std::sync::atomic::Ordering;

    fn task(id: &str, name: &str) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
            title: format!("{name} title"),
            description: String::new(),
            due_date: "2024-01-01".to_string(),
            priority: Priority::Medium,
            user_id: "user-1".to_string(),
            created_at: Utc::now(),
            order: None,
        }
    }

    fn seeded(names: &[&str]) -> MemoryStore {
        let tasks = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut t = task(&format!("t{i}"), name);
                t.order = Some(i as i64);
                t
            })
            .collect();
        MemoryStore::with_tasks(tasks)
    }

    fn names(list: &TaskList) -> Vec<&str> {
        list.items.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn snapshot_replaces_items_one_per_document() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        assert_eq!(list.items.len(), 3);
        assert_eq!(names(&list), vec!["A", "B", "C"]);
        assert_eq!(list.items[1].id, "t1");
        assert_eq!(list.items[1].title, "B title");
    }

    #[test]
    fn priority_change_is_local_at_once() {
        let handle = sync::spawn(seeded(&["A", "B"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        list.change_priority("t1", Priority::High);
        assert_eq!(list.items[1].priority, Priority::High);
        assert_eq!(list.sync_status("t1"), SyncStatus::Pending);

        list.settle();
        assert_eq!(list.items[1].priority, Priority::High);
        assert_eq!(list.sync_status("t1"), SyncStatus::Committed);
    }

    #[test]
    fn failed_priority_write_keeps_local_value_and_marks_failure() {
        let store = seeded(&["A", "B"]);
        let switch = store.failure_switch();
        let handle = sync::spawn(store);
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        switch.store(true, Ordering::SeqCst);
        list.change_priority("t0", Priority::High);
        assert_eq!(list.items[0].priority, Priority::High);

        list.settle();
        assert_eq!(list.items[0].priority, Priority::High);
        assert!(matches!(list.sync_status("t0"), SyncStatus::Failed(_)));
        assert_eq!(list.unsynced_count(), 1);
    }

    #[test]
    fn priority_change_for_unknown_task_is_ignored() {
        let handle = sync::spawn(seeded(&["A"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        list.change_priority("ghost", Priority::Low);
        assert!(list.is_idle());
        assert_eq!(list.unsynced_count(), 0);
    }

    #[test]
    fn only_latest_priority_write_decides_status() {
        let store = seeded(&["A"]);
        let switch = store.failure_switch();
        let handle = sync::spawn(store);
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        switch.store(true, Ordering::SeqCst);
        list.change_priority("t0", Priority::High);
        list.settle();
        assert!(matches!(list.sync_status("t0"), SyncStatus::Failed(_)));

        switch.store(false, Ordering::SeqCst);
        list.change_priority("t0", Priority::Low);
        list.settle();
        assert_eq!(list.sync_status("t0"), SyncStatus::Committed);
        assert_eq!(list.items[0].priority, Priority::Low);
    }

    #[test]
    fn drag_without_destination_is_a_no_op() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();
        let before = list.items.clone();

        list.on_drag_end(0, None);
        assert_eq!(list.items, before);
        assert!(list.is_idle());
    }

    #[test]
    fn drag_reorders_locally_and_persists() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut list = TaskList::mount(handle.clone(), "user-1");
        list.settle();

        list.on_drag_end(0, Some(2));
        assert_eq!(names(&list), vec!["B", "C", "A"]);
        assert_eq!(list.state.selected(), Some(2));

        list.settle();
        assert_eq!(names(&list), vec!["B", "C", "A"]);
        assert_eq!(list.sync_status("t0"), SyncStatus::Committed);

        // A fresh view sees the stored order too
        let mut other = TaskList::mount(handle, "user-2");
        other.settle();
        assert_eq!(names(&other), vec!["B", "C", "A"]);
    }

    #[test]
    fn out_of_range_source_is_ignored() {
        let handle = sync::spawn(seeded(&["A", "B"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        list.on_drag_end(5, Some(0));
        assert_eq!(names(&list), vec!["A", "B"]);
        assert!(list.is_idle());
    }

    #[test]
    fn keyboard_drag_moves_the_picked_task() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        list.state.select(Some(2));
        list.start_drag();
        assert_eq!(list.dragging(), Some(2));
        list.previous();
        list.previous();
        list.drop_drag();

        assert_eq!(list.dragging(), None);
        assert_eq!(names(&list), vec!["C", "A", "B"]);
    }

    #[test]
    fn drag_follows_task_when_snapshot_reorders_mid_move() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut mover = TaskList::mount(handle.clone(), "user-1");
        let mut other = TaskList::mount(handle, "user-2");
        mover.settle();
        other.settle();

        mover.state.select(Some(0));
        mover.start_drag();

        other.on_drag_end(2, Some(0));
        other.settle();
        assert_eq!(names(&other), vec!["C", "A", "B"]);

        mover.poll();
        assert_eq!(names(&mover), vec!["C", "A", "B"]);
        assert_eq!(mover.dragging(), Some(1));

        mover.state.select(Some(2));
        mover.drop_drag();
        assert_eq!(names(&mover), vec!["C", "B", "A"]);
        assert_eq!(mover.items[2].name, "A");

        mover.settle();
        assert_eq!(names(&mover), vec!["C", "B", "A"]);
    }

    #[test]
    fn failed_reorder_keeps_local_order_and_marks_failure() {
        let store = seeded(&["A", "B", "C"]);
        let switch = store.failure_switch();
        let handle = sync::spawn(store);
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        switch.store(true, Ordering::SeqCst);
        list.on_drag_end(0, Some(2));
        assert_eq!(names(&list), vec!["B", "C", "A"]);

        list.settle();
        assert_eq!(names(&list), vec!["B", "C", "A"]);
        for task_id in ["t0", "t1", "t2"] {
            assert!(matches!(
                list.sync_status(task_id),
                SyncStatus::Failed(message) if message.starts_with("store unavailable")
            ));
        }
        assert_eq!(list.unsynced_count(), 3);
    }

    #[test]
    fn write_to_stopped_worker_fails_at_once() {
        let mut list = TaskList::mount(StoreHandle::disconnected(), "user-1");
        let request_id = list.create_task(&TaskDraft::default());

        let outcomes = list.poll();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].request_id, request_id);
        assert!(matches!(
            outcomes[0].result,
            Err(StoreError::Unavailable(_))
        ));
        assert!(list.items.is_empty());
    }

    #[test]
    fn cancelled_drag_leaves_order_alone() {
        let handle = sync::spawn(seeded(&["A", "B", "C"]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        list.state.select(Some(0));
        list.start_drag();
        list.next();
        list.cancel_drag();

        assert_eq!(names(&list), vec!["A", "B", "C"]);
        assert_eq!(list.state.selected(), Some(0));
        assert!(list.is_idle());
    }

    #[test]
    fn no_snapshots_after_unmount() {
        let handle = sync::spawn(seeded(&["A"]));
        let mut watcher = TaskList::mount(handle.clone(), "user-1");
        let mut writer = TaskList::mount(handle, "user-2");
        watcher.settle();
        writer.settle();

        watcher.unmount();
        assert!(!watcher.is_mounted());
        writer.create_task(&TaskDraft {
            name: "B".into(),
            ..TaskDraft::default()
        });
        writer.settle();
        assert_eq!(writer.items.len(), 2);

        watcher.poll();
        assert_eq!(watcher.items.len(), 1);
    }

    #[test]
    fn created_task_arrives_through_snapshot_with_user() {
        let handle = sync::spawn(MemoryStore::new());
        let mut list = TaskList::mount(handle, "user-9");
        list.settle();

        list.create_task(&TaskDraft {
            name: "A".into(),
            ..TaskDraft::default()
        });
        assert!(list.items.is_empty());

        let outcomes = list.settle();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].user_id, "user-9");
        assert_eq!(list.items[0].priority, Priority::Medium);
    }

    #[test]
    fn late_and_due_soon_use_parsed_dates() {
        let handle = sync::spawn(MemoryStore::with_tasks(vec![
            {
                let mut t = task("late", "L");
                t.due_date = "2000-01-01".into();
                t
            },
            {
                let mut t = task("soon", "S");
                t.due_date = (Utc::now().date_naive() + Duration::days(2))
                    .format("%Y-%m-%d")
                    .to_string();
                t
            },
            {
                let mut t = task("vague", "V");
                t.due_date = "next spring".into();
                t
            },
        ]));
        let mut list = TaskList::mount(handle, "user-1");
        list.settle();

        assert_eq!(list.get_late().len(), 1);
        assert_eq!(list.get_late()[0].id, "late");
        assert_eq!(list.get_due_next_week().len(), 1);
        assert_eq!(list.get_due_next_week()[0].id, "soon");
    }
}
