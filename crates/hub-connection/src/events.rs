//! In-process event bus for hub lifecycle and message events.
//!
//! Handlers run synchronously on the task that broadcasts, in registration
//! order. Delivery iterates over a snapshot, so a handler may register or
//! deregister handlers (itself included) while an event is being delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::trace;

use fhircast_protocol::FhircastMessage;

/// The fixed set of events the client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    HubSubscribed,
    HubUnsubscribed,
    ChannelClosed,
    TokenAcquired,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::MessageReceived,
        EventKind::HubSubscribed,
        EventKind::HubUnsubscribed,
        EventKind::ChannelClosed,
        EventKind::TokenAcquired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageReceived => "event::fhircastMessage",
            EventKind::HubSubscribed => "event::hubSubscribed",
            EventKind::HubUnsubscribed => "event::hubUnsubscribed",
            EventKind::ChannelClosed => "event::websocketClose",
            EventKind::TokenAcquired => "event::tokenAcquired",
        }
    }
}

/// An event delivered to bus subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A genuine context-change event from the hub (not a heartbeat, not an echo).
    MessageReceived(FhircastMessage),
    HubSubscribed { hub: String },
    HubUnsubscribed { hub: String },
    ChannelClosed { hub: String },
    TokenAcquired { hub: String },
}

impl HubEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HubEvent::MessageReceived(_) => EventKind::MessageReceived,
            HubEvent::HubSubscribed { .. } => EventKind::HubSubscribed,
            HubEvent::HubUnsubscribed { .. } => EventKind::HubUnsubscribed,
            HubEvent::ChannelClosed { .. } => EventKind::ChannelClosed,
            HubEvent::TokenAcquired { .. } => EventKind::TokenAcquired,
        }
    }
}

/// Handler type for bus subscribers.
pub type EventHandler = Arc<dyn Fn(&HubEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

/// Publish/subscribe hub for [`HubEvent`]s. Cloning shares the subscriber set.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// The handler stays registered until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not deregister.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                kind,
                handler: Arc::new(handler),
            });
        Subscription {
            id,
            kind,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every handler registered for its kind.
    pub fn broadcast(&self, event: HubEvent) {
        let kind = event.kind();
        let snapshot: Vec<EventHandler> = self
            .inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.handler.clone())
            .collect();

        trace!(event = kind.as_str(), handlers = snapshot.len(), "broadcasting");
        for handler in snapshot {
            handler(&event);
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

/// Deregistration handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Removes the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut registrations = bus
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = registrations.len();
        registrations.retain(|r| r.id != self.id);
        registrations.len() != before
    }
}
