//! In-process per-recipient notification transport.
//!
//! Each recipient owns a group (`user_<id>`) holding one subscription per
//! open connection. Delivery to a recipient without live subscriptions is a
//! silent no-op; nothing is queued.

use crate::model::principal::PrincipalId;
use crate::notify::dispatcher::{DispatchError, NotificationTransport};
use crate::notify::event::NotificationPayload;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};

type Groups = HashMap<PrincipalId, Vec<(u64, Sender<String>)>>;

/// Channel registry keyed by recipient identity.
#[derive(Debug, Default)]
pub struct ChannelHub {
    groups: Arc<Mutex<Groups>>,
    next_subscription: AtomicU64,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group name addressing all connections of `recipient`.
    pub fn group_name(recipient: PrincipalId) -> String {
        format!("user_{recipient}")
    }

    /// Opens one subscription for `recipient`.
    ///
    /// Messages are JSON-encoded `NotificationPayload`s. Dropping the
    /// subscription unregisters it from the recipient's group.
    pub fn subscribe(&self, recipient: PrincipalId) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut groups) = self.groups.lock() {
            groups.entry(recipient).or_default().push((id, sender));
        }
        Subscription {
            recipient,
            id,
            receiver,
            groups: Arc::downgrade(&self.groups),
        }
    }

    /// Number of open subscriptions for `recipient`.
    pub fn subscriber_count(&self, recipient: PrincipalId) -> usize {
        self.groups
            .lock()
            .map(|groups| groups.get(&recipient).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

/// One open connection of a recipient. Derefs to the message receiver.
#[derive(Debug)]
pub struct Subscription {
    recipient: PrincipalId,
    id: u64,
    receiver: Receiver<String>,
    groups: Weak<Mutex<Groups>>,
}

impl Subscription {
    pub fn recipient(&self) -> PrincipalId {
        self.recipient
    }
}

impl Deref for Subscription {
    type Target = Receiver<String>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(groups) = self.groups.upgrade() else {
            return;
        };
        let Ok(mut groups) = groups.lock() else {
            return;
        };
        if let Some(subscribers) = groups.get_mut(&self.recipient) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                groups.remove(&self.recipient);
            }
        }
    }
}

impl NotificationTransport for ChannelHub {
    fn deliver(
        &self,
        recipient: PrincipalId,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        let message = serde_json::to_string(payload)
            .map_err(|err| DispatchError::Serialize(err.to_string()))?;
        let mut groups = self
            .groups
            .lock()
            .map_err(|_| DispatchError::Transport("channel registry lock poisoned".to_string()))?;

        let Some(subscribers) = groups.get_mut(&recipient) else {
            return Ok(());
        };
        subscribers.retain(|(_, subscriber)| subscriber.send(message.clone()).is_ok());
        if subscribers.is_empty() {
            groups.remove(&recipient);
        }
        Ok(())
    }
}
