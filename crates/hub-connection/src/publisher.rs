//! Outbound context-change events.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use fhircast_protocol::FhircastMessage;

use crate::state::HubContext;
use crate::types::HubConfig;

/// Stamps and posts events to a hub.
#[derive(Clone)]
pub struct Publisher {
    ctx: HubContext,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl Publisher {
    pub(crate) fn new(ctx: HubContext) -> Self {
        Self {
            ctx,
            last_stamp: Arc::new(Mutex::new(None)),
        }
    }

    /// Publishes `message` to `target`.
    ///
    /// The message gets a fresh id and timestamp and the target's topic. The
    /// id becomes the *active* hub's echo reference and the request carries
    /// the *active* hub's token, even when `target` is another hub. Returns
    /// the raw response, or `None` if the request never completed; the
    /// status is not interpreted.
    pub async fn publish(
        &self,
        mut message: FhircastMessage,
        target: &HubConfig,
    ) -> Option<reqwest::Response> {
        let id = format!("{}-{}", self.ctx.settings.client_name, Uuid::new_v4().simple());
        message.id = id.clone();
        message.timestamp = Some(
            self.next_timestamp()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        message.event.topic = target.topic.clone().unwrap_or_default();

        let token = self
            .ctx
            .state
            .update(|hub| {
                hub.last_published_message_id = Some(id.clone());
                hub.token.clone()
            })
            .await;

        let url = publish_url(target);
        debug!(event = %message.event.event, id = %id, url = %url, "publishing");

        match self
            .ctx
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&message)
            .send()
            .await
        {
            Ok(response) => {
                debug!(id = %id, status = response.status().as_u16(), "published");
                Some(response)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "publish failed");
                None
            }
        }
    }

    /// Current time at microsecond precision, bumped past the previous stamp
    /// when the clock has not advanced.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

/// Where events for `target` are posted.
pub fn publish_url(target: &HubConfig) -> String {
    if target.product().publishes_to_bare_endpoint() {
        target.hub_endpoint.clone()
    } else {
        format!(
            "{}/{}",
            target.hub_endpoint,
            target.topic.as_deref().unwrap_or_default()
        )
    }
}
