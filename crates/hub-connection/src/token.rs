//! OAuth2 client-credentials exchange against the active hub.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use fhircast_protocol::constants::STATUS_TOKEN_OK;
use fhircast_protocol::{TokenRequest, TokenResponse};

use crate::events::HubEvent;
use crate::state::HubContext;
use crate::subscription::SubscriptionManager;

/// Whether a successful exchange may chain into a subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoSubscribe {
    Allowed,
    Suppressed,
}

/// Acquires bearer tokens (and possibly the session topic) for the active hub.
#[derive(Clone)]
pub struct TokenManager {
    ctx: HubContext,
}

impl TokenManager {
    pub(crate) fn new(ctx: HubContext) -> Self {
        Self { ctx }
    }

    /// Exchanges the active hub's client credentials for a token.
    ///
    /// Returns `true` when the token endpoint answered 200 with a JSON body.
    /// There is no retry and no timeout. With auto-start configured, a learned topic is
    /// subscribed to straight away.
    pub async fn acquire_token(&self) -> bool {
        self.exchange(AutoSubscribe::Allowed).await
    }

    /// One-shot refresh after the hub rejected our token.
    ///
    /// Returns a boxed future to break the type cycle with
    /// [`SubscriptionManager::subscribe`], which spawns it.
    pub(crate) fn refresh(self) -> Pin<Box<dyn Future<Output = bool> + Send>> {
        Box::pin(async move {
            info!("refreshing hub token");
            self.exchange(AutoSubscribe::Suppressed).await
        })
    }

    async fn exchange(&self, auto: AutoSubscribe) -> bool {
        let hub = self.ctx.state.snapshot().await;
        if hub.token_endpoint.is_empty() {
            warn!(hub = %hub.name, "hub has no token endpoint");
            return false;
        }

        let form = TokenRequest::client_credentials(&hub.client_id, &hub.client_secret);
        let response = match self
            .ctx
            .http
            .post(&hub.token_endpoint)
            .form(&form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(hub = %hub.name, error = %e, "token request failed");
                return false;
            }
        };

        let status = response.status().as_u16();
        if status != STATUS_TOKEN_OK {
            warn!(hub = %hub.name, status, "token request rejected");
            return false;
        }

        let body: TokenResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(hub = %hub.name, error = %e, "unreadable token response");
                return false;
            }
        };

        let got_token = match body.access_token {
            Some(token) => {
                self.ctx.state.update(|h| h.token = token).await;
                true
            }
            None => {
                warn!(hub = %hub.name, "token response carries no access token");
                false
            }
        };

        let topic = if hub.product().reuses_configured_topic() {
            hub.topic.clone()
        } else {
            body.topic
        };
        let topic = topic.filter(|t| !t.is_empty());

        if let Some(topic) = &topic {
            self.ctx.set_topic(topic).await;
        }

        if got_token {
            info!(hub = %hub.name, topic = ?topic, "token acquired");
            self.ctx.bus.broadcast(HubEvent::TokenAcquired {
                hub: hub.name.clone(),
            });
        }

        if topic.is_some() && self.ctx.settings.auto_start && auto == AutoSubscribe::Allowed {
            debug!(hub = %hub.name, "auto-start: subscribing");
            let outcome = SubscriptionManager::new(self.ctx.clone()).subscribe().await;
            debug!(hub = %hub.name, %outcome, "auto-start subscribe finished");
        }

        true
    }
}
