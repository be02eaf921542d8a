// Volatile task store. Backs `--memory` sessions and the tests.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::app::models::{NewTask, Priority, Task};
use crate::app::storage::{compare_position, new_task_id, Result, StoreError, TaskStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Vec<Task>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        MemoryStore {
            tasks,
            fail_writes: Arc::default(),
        }
    }

    /// Shared flag that makes every write fail while set.
    /// Stays usable after the store has moved onto the worker thread.
    #[cfg(test)]
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are switched off".to_string()));
        }
        Ok(())
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }
}

impl TaskStore for MemoryStore {
    fn create_task(&mut self, task: &NewTask) -> Result<Task> {
        self.check_writable()?;
        let created = Task {
            id: new_task_id(),
            name: task.name.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date.clone(),
            priority: task.priority,
            user_id: task.user_id.clone(),
            created_at: Utc::now(),
            order: None,
        };
        self.tasks.push(created.clone());
        Ok(created)
    }

    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self.tasks.clone();
        tasks.sort_by(compare_position);
        Ok(tasks)
    }

    fn update_priority(&mut self, task_id: &str, priority: Priority) -> Result<()> {
        self.check_writable()?;
        self.task_mut(task_id)?.priority = priority;
        Ok(())
    }

    fn update_order(&mut self, positions: &[(String, i64)]) -> Result<()> {
        self.check_writable()?;
        // Validate everything before touching anything
        if let Some((missing, _)) = positions
            .iter()
            .find(|(id, _)| !self.tasks.iter().any(|task| &task.id == id))
        {
            return Err(StoreError::NotFound(missing.clone()));
        }
        for (task_id, position) in positions {
            self.task_mut(task_id)?.order = Some(*position);
        }
        Ok(())
    }
}
