//! Background store worker
//!
//! The store lives on its own thread so writes never block the UI loop.
//! The UI sends commands over a channel; write acknowledgements come back on a
//! per-caller reply channel and collection snapshots on a per-subscription one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::app::models::{NewTask, Priority, Task};
use crate::app::storage::{StoreError, TaskStore};

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Create(NewTask),
    UpdatePriority { task_id: String, priority: Priority },
    UpdateOrder(Vec<(String, i64)>),
}

#[derive(Debug)]
pub enum WriteAck {
    Created(Task),
    Updated,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub request_id: RequestId,
    pub result: Result<WriteAck, StoreError>,
}

/// Full view of the collection at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
}

enum Command {
    Write {
        request_id: RequestId,
        request: WriteRequest,
        reply: Sender<WriteOutcome>,
    },
    Subscribe {
        subscription_id: u64,
        listener: Sender<Snapshot>,
    },
    Unsubscribe(u64),
}

/// Cheap, cloneable handle to a running store worker
#[derive(Clone)]
pub struct StoreHandle {
    commands: Sender<Command>,
    next_subscription_id: Arc<AtomicU64>,
}

/// Move `store` onto a worker thread. The thread ends once every handle and
/// subscription is dropped.
pub fn spawn<S: TaskStore + Send + 'static>(store: S) -> StoreHandle {
    let (commands, command_rx) = mpsc::channel::<Command>();

    thread::spawn(move || {
        let worker = StoreWorker {
            store,
            listeners: Vec::new(),
        };
        worker.run(command_rx);
    });

    StoreHandle {
        commands,
        next_subscription_id: Arc::new(AtomicU64::new(1)),
    }
}

impl StoreHandle {
    /// Handle to a worker that has already stopped
    #[cfg(test)]
    pub(crate) fn disconnected() -> StoreHandle {
        let (commands, _) = mpsc::channel::<Command>();
        StoreHandle {
            commands,
            next_subscription_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queue a write. The outcome arrives on `reply` tagged with `request_id`.
    pub fn submit(
        &self,
        request_id: RequestId,
        request: WriteRequest,
        reply: &Sender<WriteOutcome>,
    ) -> Result<(), StoreError> {
        self.commands
            .send(Command::Write {
                request_id,
                request,
                reply: reply.clone(),
            })
            .map_err(|_| StoreError::Unavailable("store worker stopped".to_string()))
    }

    /// Open a live subscription. The current snapshot is delivered first,
    /// then a fresh one after every successful write.
    pub fn subscribe(&self) -> Subscription {
        let subscription_id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let (listener, snapshots) = mpsc::channel();
        if self
            .commands
            .send(Command::Subscribe {
                subscription_id,
                listener,
            })
            .is_err()
        {
            warn!("store worker stopped; subscription {} is inert", subscription_id);
        }

        Subscription {
            id: subscription_id,
            snapshots,
            commands: self.commands.clone(),
        }
    }
}

/// Live view of the collection. Dropping it cancels the subscription.
pub struct Subscription {
    id: u64,
    snapshots: Receiver<Snapshot>,
    commands: Sender<Command>,
}

impl Subscription {
    /// Newest queued snapshot, skipping any older ones. Each snapshot is a full
    /// replacement, so intermediate ones carry nothing extra.
    pub fn latest(&self) -> Option<Snapshot> {
        let mut latest = None;
        loop {
            match self.snapshots.try_recv() {
                Ok(snapshot) => latest = Some(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

struct StoreWorker<S> {
    store: S,
    listeners: Vec<(u64, Sender<Snapshot>)>,
}

impl<S: TaskStore> StoreWorker<S> {
    fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Subscribe {
                    subscription_id,
                    listener,
                } => {
                    debug!("subscription {} opened", subscription_id);
                    if let Some(snapshot) = self.snapshot() {
                        if listener.send(snapshot).is_err() {
                            continue;
                        }
                    }
                    self.listeners.push((subscription_id, listener));
                }
                Command::Unsubscribe(subscription_id) => {
                    debug!("subscription {} closed", subscription_id);
                    self.listeners.retain(|(id, _)| *id != subscription_id);
                }
                Command::Write {
                    request_id,
                    request,
                    reply,
                } => {
                    let result = self.apply(request);
                    if result.is_ok() {
                        self.broadcast();
                    }
                    // The caller may have gone away; nothing to do then
                    let _ = reply.send(WriteOutcome { request_id, result });
                }
            }
        }
        debug!("store worker stopped");
    }

    fn apply(&mut self, request: WriteRequest) -> Result<WriteAck, StoreError> {
        match request {
            WriteRequest::Create(task) => self.store.create_task(&task).map(WriteAck::Created),
            WriteRequest::UpdatePriority { task_id, priority } => self
                .store
                .update_priority(&task_id, priority)
                .map(|_| WriteAck::Updated),
            WriteRequest::UpdateOrder(positions) => self
                .store
                .update_order(&positions)
                .map(|_| WriteAck::Updated),
        }
    }

    fn snapshot(&self) -> Option<Snapshot> {
        match self.store.get_all_tasks() {
            Ok(tasks) => Some(Snapshot { tasks }),
            Err(e) => {
                warn!("Failed to read task snapshot: {}", e);
                None
            }
        }
    }

    fn broadcast(&mut self) {
        let Some(snapshot) = self.snapshot() else {
            return;
        };
        self.listeners
            .retain(|(_, listener)| listener.send(snapshot.clone()).is_ok());
    }
}
