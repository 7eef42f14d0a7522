// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Listener registry and serial delivery.
//!
//! Registration and enqueueing share one lock. Notifications are handed to
//! a single delivery task, so listeners are always called one at a time
//! and in the order the socket produced them.

use std::sync::{Arc, Mutex};

use parley_core::{ChatError, ChatEvent, ConnectedEvent};
use tokio::sync::mpsc;

use super::state::DisconnectCause;

/// Receives socket notifications. All methods default to no-ops.
pub trait SocketListener: Send + Sync {
    fn on_connecting(&self) {}

    fn on_connected(&self, _ack: &ConnectedEvent) {}

    fn on_disconnected(&self, _cause: &DisconnectCause) {}

    fn on_event(&self, _event: &ChatEvent) {}

    fn on_error(&self, _error: &ChatError) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connecting,
    Connected(ConnectedEvent),
    Disconnected(DisconnectCause),
    Event(ChatEvent),
    Error(ChatError),
}

impl Notification {
    fn deliver_to(&self, listener: &dyn SocketListener) {
        match self {
            Notification::Connecting => listener.on_connecting(),
            Notification::Connected(ack) => listener.on_connected(ack),
            Notification::Disconnected(cause) => listener.on_disconnected(cause),
            Notification::Event(event) => listener.on_event(event),
            Notification::Error(error) => listener.on_error(error),
        }
    }
}

/// Token returned by [`ListenerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Delivery = (Arc<dyn SocketListener>, Arc<Notification>);

struct Registered {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn SocketListener>)>,
}

pub struct ListenerRegistry {
    registered: Mutex<Registered>,
    delivery: mpsc::UnboundedSender<Delivery>,
}

impl ListenerRegistry {
    /// Creates the registry and spawns its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Arc<Self> {
        let (delivery, mut queue) = mpsc::unbounded_channel::<Delivery>();
        tokio::spawn(async move {
            while let Some((listener, notification)) = queue.recv().await {
                notification.deliver_to(listener.as_ref());
            }
        });
        Arc::new(ListenerRegistry {
            registered: Mutex::new(Registered {
                next_id: 0,
                listeners: Vec::new(),
            }),
            delivery,
        })
    }

    pub fn add(&self, listener: Arc<dyn SocketListener>) -> ListenerId {
        let mut registered = match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registered.next_id += 1;
        let id = ListenerId(registered.next_id);
        registered.listeners.push((id, listener));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registered = match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = registered.listeners.len();
        registered.listeners.retain(|(lid, _)| *lid != id);
        registered.listeners.len() != before
    }

    /// Queues `notification` for every current listener.
    pub fn notify(&self, notification: Notification) {
        let registered = match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let notification = Arc::new(notification);
        for (_, listener) in &registered.listeners {
            let _ = self
                .delivery
                .send((Arc::clone(listener), Arc::clone(&notification)));
        }
    }
}
