//! FHIRcast client orchestrating hub selection, tokens, subscriptions,
//! publishing and resubscription.
//!
//! Owns the single active [`HubState`] and the [`EventBus`], and hands a
//! shared context to each component. The reconnect supervisor runs from
//! [`FhircastClient::activate`] until shutdown or drop.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fhircast_protocol::FhircastMessage;

use crate::events::EventBus;
use crate::publisher::Publisher;
use crate::reconnection::ReconnectSupervisor;
use crate::selector::HubSelector;
use crate::state::{HubContext, HubState};
use crate::subscription::{SubscribeOutcome, SubscriptionManager};
use crate::token::TokenManager;
use crate::types::{FhircastConfig, HubConfig, ReconnectConfig};

/// Errors from building the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// FHIRcast hub client.
pub struct FhircastClient {
    ctx: HubContext,
    selector: HubSelector,
    tokens: TokenManager,
    subscriptions: SubscriptionManager,
    publisher: Publisher,
    reconnect_config: ReconnectConfig,
    supervisor_cancel: CancellationToken,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FhircastClient {
    /// Builds the client. No hub is active and no task is started.
    pub fn new(config: FhircastConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fhircast-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let ctx = HubContext {
            state: HubState::default(),
            bus: EventBus::new(),
            http,
            settings: Arc::new(config),
        };

        Ok(Self {
            selector: HubSelector::new(ctx.clone()),
            tokens: TokenManager::new(ctx.clone()),
            subscriptions: SubscriptionManager::new(ctx.clone()),
            publisher: Publisher::new(ctx.clone()),
            ctx,
            reconnect_config: ReconnectConfig::default(),
            supervisor_cancel: CancellationToken::new(),
            supervisor: Mutex::new(None),
        })
    }

    /// Overrides the resubscribe check period.
    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect_config = config;
        self
    }

    /// Builds and activates the client.
    pub async fn start(config: FhircastConfig) -> Result<Self, ClientError> {
        let client = Self::new(config)?;
        client.activate().await;
        Ok(client)
    }

    /// Starts the reconnect supervisor and selects the default hub. With
    /// auto-start configured a token is acquired right away, which in turn
    /// subscribes once the topic is known.
    pub async fn activate(&self) {
        self.spawn_supervisor();

        let Some(default_hub) = self.ctx.settings.default_hub.clone() else {
            debug!("no default hub configured");
            return;
        };
        if !self.selector.select_hub(&default_hub).await {
            return;
        }
        if self.ctx.settings.auto_start {
            self.tokens.acquire_token().await;
        }
    }

    fn spawn_supervisor(&self) {
        let mut slot = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let supervisor = ReconnectSupervisor::new(self.ctx.clone(), self.reconnect_config.clone());
        *slot = Some(supervisor.spawn(self.supervisor_cancel.clone()));
    }

    /// Event bus for collaborators.
    pub fn events(&self) -> &EventBus {
        &self.ctx.bus
    }

    /// Snapshot of the active hub.
    pub async fn hub(&self) -> HubConfig {
        self.ctx.state.snapshot().await
    }

    pub fn hubs(&self) -> &[HubConfig] {
        self.selector.hubs()
    }

    pub async fn topic(&self) -> Option<String> {
        self.ctx.state.snapshot().await.topic
    }

    /// Sets the topic and derives a fresh subscriber name from it.
    pub async fn set_topic(&self, topic: &str) {
        self.ctx.set_topic(topic).await;
    }

    pub async fn is_subscribed(&self) -> bool {
        self.ctx.state.snapshot().await.subscribed
    }

    pub async fn select_hub(&self, name: &str) -> bool {
        self.selector.select_hub(name).await
    }

    pub async fn acquire_token(&self) -> bool {
        self.tokens.acquire_token().await
    }

    pub async fn subscribe(&self) -> SubscribeOutcome {
        self.subscriptions.subscribe().await
    }

    pub async fn unsubscribe(&self) -> bool {
        self.subscriptions.unsubscribe().await
    }

    /// Publishes to `target`. See [`Publisher::publish`].
    pub async fn publish(
        &self,
        message: FhircastMessage,
        target: &HubConfig,
    ) -> Option<reqwest::Response> {
        self.publisher.publish(message, target).await
    }

    /// Publishes to the active hub.
    pub async fn publish_to_active(&self, message: FhircastMessage) -> Option<reqwest::Response> {
        let target = self.ctx.state.snapshot().await;
        self.publisher.publish(message, &target).await
    }

    /// Stops the supervisor and unsubscribes if subscribed.
    pub async fn shutdown(&self) {
        self.supervisor_cancel.cancel();
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if self.is_subscribed().await {
            self.subscriptions.unsubscribe().await;
        }
        info!("fhircast client shut down");
    }
}

impl Drop for FhircastClient {
    fn drop(&mut self) {
        self.supervisor_cancel.cancel();
    }
}
