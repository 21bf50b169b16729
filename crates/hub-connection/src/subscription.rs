//! Subscribe/unsubscribe handshake and the event channel it opens.

use std::fmt;

use tracing::{debug, info, warn};

use fhircast_protocol::constants::{
    HANDSHAKE_TIMEOUT, STATUS_SUBSCRIPTION_ACCEPTED, STATUS_UNAUTHORIZED,
};
use fhircast_protocol::{HubMode, SubscriptionRequest, SubscriptionResponse};

use crate::channel::EventChannel;
use crate::events::HubEvent;
use crate::state::HubContext;
use crate::token::TokenManager;
use crate::types::HubConfig;

/// Result of a subscribe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// No topic is set; nothing was sent.
    TopicNotDefined,
    /// The hub answered with this status.
    Status(u16),
    /// The request failed or timed out.
    Failed,
}

impl SubscribeOutcome {
    pub fn is_accepted(self) -> bool {
        self == SubscribeOutcome::Status(STATUS_SUBSCRIPTION_ACCEPTED)
    }
}

impl fmt::Display for SubscribeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeOutcome::TopicNotDefined => f.write_str("error: topic not defined"),
            SubscribeOutcome::Status(code) => write!(f, "{code}"),
            SubscribeOutcome::Failed => f.write_str("error: request failed"),
        }
    }
}

/// Performs the subscription handshake for the active hub.
#[derive(Clone)]
pub struct SubscriptionManager {
    ctx: HubContext,
}

impl SubscriptionManager {
    pub(crate) fn new(ctx: HubContext) -> Self {
        Self { ctx }
    }

    /// Subscribes to the active hub's topic and opens the event channel.
    ///
    /// A 401 spawns a one-shot token refresh; the subscribe itself is not
    /// retried. Failures never propagate; they come back as the outcome.
    pub async fn subscribe(&self) -> SubscribeOutcome {
        let hub = self.ctx.state.snapshot().await;
        let Some(topic) = hub.active_topic() else {
            warn!(hub = %hub.name, "cannot subscribe: topic not defined");
            return SubscribeOutcome::TopicNotDefined;
        };

        let request = SubscriptionRequest::new(
            HubMode::Subscribe,
            &self.ctx.settings.callback_origin,
            &hub.events,
            topic,
            hub.lease,
            &hub.subscriber_name,
        );
        debug!(hub = %hub.name, topic, "sending subscribe handshake");

        let response = match self.handshake(&hub, &request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(hub = %hub.name, error = %e, "subscribe request failed");
                return SubscribeOutcome::Failed;
            }
        };

        let status = response.status().as_u16();
        match status {
            STATUS_SUBSCRIPTION_ACCEPTED => {
                let body = match response.json::<SubscriptionResponse>().await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(hub = %hub.name, error = %e, "unreadable subscribe response");
                        SubscriptionResponse::default()
                    }
                };
                self.accepted(&hub.name, body).await;
            }
            STATUS_UNAUTHORIZED => {
                warn!(hub = %hub.name, "subscribe unauthorized, refreshing token");
                tokio::spawn(TokenManager::new(self.ctx.clone()).refresh());
            }
            _ => warn!(hub = %hub.name, status, "subscribe rejected"),
        }

        SubscribeOutcome::Status(status)
    }

    /// Ends the subscription. Local teardown always happens; the return
    /// value only says whether the hub accepted the handshake.
    pub async fn unsubscribe(&self) -> bool {
        let hub = self
            .ctx
            .state
            .update(|h| {
                h.subscribed = false;
                h.resubscribe_requested = false;
                h.clone()
            })
            .await;

        let request = SubscriptionRequest::new(
            HubMode::Unsubscribe,
            &self.ctx.settings.callback_origin,
            &hub.events,
            hub.topic.as_deref().unwrap_or_default(),
            hub.lease,
            &hub.subscriber_name,
        );

        let accepted = match self.handshake(&hub, &request).await {
            Ok(r) if r.status().as_u16() == STATUS_SUBSCRIPTION_ACCEPTED => true,
            Ok(r) => {
                warn!(hub = %hub.name, status = r.status().as_u16(), "unsubscribe rejected");
                false
            }
            Err(e) => {
                warn!(hub = %hub.name, error = %e, "unsubscribe request failed");
                false
            }
        };

        if accepted {
            info!(hub = %hub.name, "unsubscribed");
            self.ctx.bus.broadcast(HubEvent::HubUnsubscribed {
                hub: hub.name.clone(),
            });
        }

        if let Some(channel) = self.ctx.state.take_channel().await {
            debug!(channel = channel.id(), "closing event channel");
            channel.close();
        }
        self.ctx.state.update(|h| h.channel_endpoint = None).await;

        accepted
    }

    async fn handshake(
        &self,
        hub: &HubConfig,
        request: &SubscriptionRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.ctx
            .http
            .post(&hub.hub_endpoint)
            .bearer_auth(&hub.token)
            .timeout(HANDSHAKE_TIMEOUT)
            .form(request)
            .send()
            .await
    }

    async fn accepted(&self, hub_name: &str, body: SubscriptionResponse) {
        let endpoint = body.channel_endpoint.filter(|e| !e.is_empty());
        self.ctx
            .state
            .update(|h| {
                h.subscribed = true;
                h.resubscribe_requested = false;
                h.channel_endpoint = endpoint.clone();
            })
            .await;

        let opened = match &endpoint {
            Some(endpoint) => self.open_channel(endpoint).await,
            None => {
                warn!(hub = %hub_name, "accepted subscribe carries no channel endpoint");
                false
            }
        };

        info!(hub = %hub_name, endpoint = ?endpoint, "subscribed");
        self.ctx.bus.broadcast(HubEvent::HubSubscribed {
            hub: hub_name.to_string(),
        });

        if !opened {
            self.ctx
                .state
                .update(|h| h.resubscribe_requested = true)
                .await;
            self.ctx.bus.broadcast(HubEvent::ChannelClosed {
                hub: hub_name.to_string(),
            });
        }
    }

    /// Opens and installs a channel. Returns `false` only when this attempt
    /// failed and no newer one has taken over.
    async fn open_channel(&self, endpoint: &str) -> bool {
        let id = self.ctx.state.begin_channel().await;
        match EventChannel::open(endpoint, id, self.ctx.clone()).await {
            Ok(channel) => {
                self.ctx.state.install_channel(channel).await;
                true
            }
            Err(e) => {
                warn!(endpoint, error = %e, "failed to open event channel");
                !self.ctx.state.abandon_channel(id).await
            }
        }
    }
}
