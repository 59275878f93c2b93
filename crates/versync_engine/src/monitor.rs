//! Connectivity and visibility tracking.
//!
//! The host application reports network reachability and foreground state;
//! the monitor keeps the current value and notifies subscribers on
//! transitions only. Repeated reports of the same state are ignored.

use crate::events::{EventBus, SyncEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

/// A connectivity or visibility transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Network became reachable.
    Online,
    /// Network became unreachable.
    Offline,
    /// The application returned to the foreground.
    Foreground,
    /// The application moved to the background.
    Background,
}

#[derive(Debug, Clone, Copy)]
struct State {
    online: bool,
    visible: bool,
}

/// Tracks whether the device is online and the application is visible.
pub struct ConnectivityMonitor {
    state: Mutex<State>,
    subscribers: RwLock<Vec<UnboundedSender<ConnectivityEvent>>>,
    events: Option<Arc<EventBus>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial reachability. The application
    /// starts visible.
    pub fn new(online: bool) -> Self {
        Self {
            state: Mutex::new(State {
                online,
                visible: true,
            }),
            subscribers: RwLock::new(Vec::new()),
            events: None,
        }
    }

    /// Also publishes `Online`/`Offline` on the given event bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns true if the network is reachable.
    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Returns true if the application is in the foreground.
    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// Reports network reachability. Returns true if the state changed.
    ///
    /// Events are sent while the state lock is held, so subscribers see
    /// transitions in the order they were applied.
    pub fn set_online(&self, online: bool) -> bool {
        let mut state = self.state.lock();
        if state.online == online {
            return false;
        }
        state.online = online;

        info!(online, "connectivity changed");
        if online {
            self.notify(ConnectivityEvent::Online);
            self.publish(SyncEvent::Online);
        } else {
            self.notify(ConnectivityEvent::Offline);
            self.publish(SyncEvent::Offline);
        }
        true
    }

    /// Reports foreground state. Returns true if the state changed.
    pub fn set_visible(&self, visible: bool) -> bool {
        let mut state = self.state.lock();
        if state.visible == visible {
            return false;
        }
        state.visible = visible;

        self.notify(if visible {
            ConnectivityEvent::Foreground
        } else {
            ConnectivityEvent::Background
        });
        true
    }

    /// Subscribes to future transitions.
    pub fn subscribe(&self) -> UnboundedReceiver<ConnectivityEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    fn notify(&self, event: ConnectivityEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(event).is_ok());
    }

    fn publish(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("ConnectivityMonitor")
            .field("online", &state.online)
            .field("visible", &state.visible)
            .finish()
    }
}
