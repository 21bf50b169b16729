//! Active hub state and the shared context handed to every component.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::channel::EventChannel;
use crate::events::EventBus;
use crate::types::{FhircastConfig, HubConfig};

/// Length of the random suffix of subscriber names.
const SUBSCRIBER_SUFFIX_LEN: usize = 14;

/// Holder for the single active hub and its event channel.
///
/// Cloning shares the state. Locks are never held across network calls.
#[derive(Clone, Default)]
pub struct HubState {
    hub: Arc<RwLock<HubConfig>>,
    connection: Arc<Mutex<ConnectionSlot>>,
    next_channel_id: Arc<AtomicU64>,
}

/// The connection resource. `current_id` is claimed before a channel is
/// opened so a slower, older open can tell it has been superseded.
#[derive(Default)]
struct ConnectionSlot {
    current_id: Option<u64>,
    channel: Option<EventChannel>,
}

/// How a closed channel relates to the connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseDisposition {
    /// The channel was the current one.
    Current,
    /// Torn down locally (unsubscribe, hub switch); no newer channel exists.
    Detached,
    /// A newer channel has replaced it.
    Superseded,
}

impl HubState {
    pub fn new(hub: HubConfig) -> Self {
        Self {
            hub: Arc::new(RwLock::new(hub)),
            ..Self::default()
        }
    }

    /// Returns a copy of the active hub.
    pub async fn snapshot(&self) -> HubConfig {
        self.hub.read().await.clone()
    }

    /// Mutates the active hub under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut HubConfig) -> R) -> R {
        let mut hub = self.hub.write().await;
        f(&mut hub)
    }

    pub async fn name(&self) -> String {
        self.hub.read().await.name.clone()
    }

    /// Whether `id` is the id of our most recent publish.
    pub async fn is_echo(&self, id: &str) -> bool {
        !id.is_empty() && self.hub.read().await.last_published_message_id.as_deref() == Some(id)
    }

    /// Replaces the active hub wholesale, closing any open channel first.
    pub async fn replace_hub(&self, hub: HubConfig) {
        if let Some(channel) = self.take_channel().await {
            channel.close();
        }
        *self.hub.write().await = hub;
    }

    /// Claims a fresh channel id as the current one.
    pub(crate) async fn begin_channel(&self) -> u64 {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        self.connection.lock().await.current_id = Some(id);
        id
    }

    /// Stores an opened channel, closing the one it replaces.
    ///
    /// Returns `false` (and closes `channel`) if a newer channel has been
    /// claimed in the meantime.
    pub(crate) async fn install_channel(&self, channel: EventChannel) -> bool {
        let mut slot = self.connection.lock().await;
        if slot.current_id != Some(channel.id()) {
            drop(slot);
            debug!(channel = channel.id(), "channel superseded before install, closing");
            channel.close();
            return false;
        }
        let previous = slot.channel.replace(channel);
        drop(slot);
        if let Some(previous) = previous {
            debug!(channel = previous.id(), "closing replaced channel");
            previous.close();
        }
        true
    }

    /// Releases a claimed id whose channel never opened.
    ///
    /// Returns `false` if a newer channel was claimed meanwhile.
    pub(crate) async fn abandon_channel(&self, id: u64) -> bool {
        let mut slot = self.connection.lock().await;
        if slot.current_id == Some(id) {
            slot.current_id = None;
            true
        } else {
            false
        }
    }

    /// Detaches the current channel so the caller can close it.
    pub(crate) async fn take_channel(&self) -> Option<EventChannel> {
        let mut slot = self.connection.lock().await;
        slot.current_id = None;
        slot.channel.take()
    }

    /// Records that channel `id` has closed.
    pub(crate) async fn channel_closed(&self, id: u64) -> CloseDisposition {
        let mut slot = self.connection.lock().await;
        match slot.current_id {
            Some(current) if current == id => {
                slot.current_id = None;
                if slot.channel.as_ref().is_some_and(|c| c.id() == id) {
                    slot.channel = None;
                }
                CloseDisposition::Current
            }
            Some(_) => CloseDisposition::Superseded,
            None => CloseDisposition::Detached,
        }
    }

    /// Whether an event channel is currently installed.
    pub async fn has_channel(&self) -> bool {
        self.connection.lock().await.channel.is_some()
    }
}

/// Shared context passed to the components and their background tasks.
#[derive(Clone)]
pub(crate) struct HubContext {
    pub(crate) state: HubState,
    pub(crate) bus: EventBus,
    pub(crate) http: reqwest::Client,
    pub(crate) settings: Arc<FhircastConfig>,
}

impl HubContext {
    /// Sets the topic and derives a fresh subscriber name from it.
    pub(crate) async fn set_topic(&self, topic: &str) {
        let name = subscriber_name(&self.settings.client_name, topic);
        debug!(topic, subscriber = %name, "setting topic");
        self.state
            .update(|hub| {
                hub.topic = Some(topic.to_string());
                hub.subscriber_name = name;
            })
            .await;
    }
}

/// Builds `<prefix>-<topic>-<random suffix>`.
pub(crate) fn subscriber_name(prefix: &str, topic: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUBSCRIBER_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}-{topic}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_name_shape() {
        let name = subscriber_name("viewer", "room1");
        assert!(name.starts_with("viewer-room1-"));
        let suffix = name.trim_start_matches("viewer-room1-");
        assert_eq!(suffix.len(), SUBSCRIBER_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn subscriber_names_differ() {
        assert_ne!(subscriber_name("v", "t"), subscriber_name("v", "t"));
    }

    #[tokio::test]
    async fn echo_requires_matching_nonempty_id() {
        let state = HubState::default();
        assert!(!state.is_echo("").await);
        assert!(!state.is_echo("m-1").await);

        state
            .update(|h| h.last_published_message_id = Some("m-1".into()))
            .await;
        assert!(state.is_echo("m-1").await);
        assert!(!state.is_echo("m-2").await);
        assert!(!state.is_echo("").await);
    }

    #[tokio::test]
    async fn channel_close_dispositions() {
        let state = HubState::default();

        // Nothing claimed: a close is a local teardown.
        assert_eq!(state.channel_closed(7).await, CloseDisposition::Detached);

        let first = state.begin_channel().await;
        assert_eq!(state.channel_closed(first).await, CloseDisposition::Current);
        // The slot was released by the close.
        assert_eq!(state.channel_closed(first).await, CloseDisposition::Detached);

        let older = state.begin_channel().await;
        let newer = state.begin_channel().await;
        assert_ne!(older, newer);
        assert_eq!(state.channel_closed(older).await, CloseDisposition::Superseded);
        assert_eq!(state.channel_closed(newer).await, CloseDisposition::Current);
    }

    #[tokio::test]
    async fn abandon_only_releases_own_claim() {
        let state = HubState::default();
        let older = state.begin_channel().await;
        let newer = state.begin_channel().await;
        assert!(!state.abandon_channel(older).await);
        assert!(state.abandon_channel(newer).await);
        assert!(!state.has_channel().await);
    }

    #[tokio::test]
    async fn replace_hub_swaps_everything() {
        let state = HubState::new(HubConfig {
            name: "A".into(),
            subscribed: true,
            token: "tok".into(),
            ..HubConfig::default()
        });
        state
            .replace_hub(HubConfig {
                name: "B".into(),
                ..HubConfig::default()
            })
            .await;
        let hub = state.snapshot().await;
        assert_eq!(hub.name, "B");
        assert!(!hub.subscribed);
        assert!(hub.token.is_empty());
    }
}
