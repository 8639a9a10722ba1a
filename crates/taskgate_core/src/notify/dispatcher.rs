//! Notification fan-out.
//!
//! # Responsibility
//! - Deliver one payload per recipient through the injected transport.
//! - Optionally run delivery on a background worker so callers never wait.
//!
//! # Invariants
//! - Delivery failures are logged and swallowed; they never reach the caller
//!   of the task mutation.
//! - Events are only published after the mutation committed.

use crate::model::principal::PrincipalId;
use crate::notify::event::{NotificationPayload, TaskEvent};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "taskgate-notify";

/// Transport that owns channel addressing and delivery mechanics.
pub trait NotificationTransport: Send + Sync {
    fn deliver(
        &self,
        recipient: PrincipalId,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError>;
}

/// Consumer of committed task events.
pub trait EventSink {
    fn publish(&self, event: TaskEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, event: TaskEvent) {
        (**self).publish(event);
    }
}

/// Notification delivery failure. Never propagated to mutation callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Serialize(String),
    Transport(String),
    WorkerUnavailable(String),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(message) => write!(f, "failed to encode notification: {message}"),
            Self::Transport(message) => write!(f, "notification transport failed: {message}"),
            Self::WorkerUnavailable(message) => {
                write!(f, "notification worker unavailable: {message}")
            }
        }
    }
}

impl Error for DispatchError {}

/// Per-recipient fan-out over one transport.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self { transport }
    }

    /// Delivers `event` to each recipient with one transport call apiece.
    pub fn dispatch(&self, event: &TaskEvent) {
        let payload = event.payload();
        let task_id = event.task_id();
        for recipient in event.recipients() {
            match self.transport.deliver(*recipient, &payload) {
                Ok(()) => debug!(
                    "event=notify_dispatch module=notify status=ok kind={} task_id={task_id} recipient={recipient}",
                    event.name()
                ),
                Err(err) => warn!(
                    "event=notify_dispatch module=notify status=error kind={} task_id={task_id} recipient={recipient} error={err}",
                    event.name()
                ),
            }
        }
    }
}

impl EventSink for NotificationDispatcher {
    fn publish(&self, event: TaskEvent) {
        self.dispatch(&event);
    }
}

/// Runs a `NotificationDispatcher` on a dedicated worker thread.
///
/// `publish` only enqueues; `shutdown` drains the queue and joins the worker.
pub struct BackgroundDispatcher {
    sender: Mutex<Option<Sender<TaskEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundDispatcher {
    pub fn spawn(dispatcher: NotificationDispatcher) -> Result<Self, DispatchError> {
        let (sender, receiver) = mpsc::channel::<TaskEvent>();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                for event in receiver {
                    dispatcher.dispatch(&event);
                }
                debug!("event=notify_worker module=notify status=stopped");
            })
            .map_err(|err| DispatchError::WorkerUnavailable(err.to_string()))?;

        info!("event=notify_worker module=notify status=started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stops accepting events, delivers everything queued, joins the worker.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("event=notify_worker module=notify status=error error=worker_panicked");
            }
        }
    }
}

impl EventSink for BackgroundDispatcher {
    fn publish(&self, event: TaskEvent) {
        let task_id = event.task_id();
        let sent = match self.sender.lock() {
            Ok(sender) => sender
                .as_ref()
                .map(|sender| sender.send(event).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        };
        if !sent {
            warn!(
                "event=notify_enqueue module=notify status=error task_id={task_id} error=worker_stopped"
            );
        }
    }
}

impl Drop for BackgroundDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
