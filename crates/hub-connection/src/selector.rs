//! Activation of one configured hub at a time.

use tracing::{debug, info, warn};

use crate::state::{HubContext, subscriber_name};
use crate::subscription::SubscriptionManager;
use crate::types::HubConfig;

/// Switches the active hub among the configured ones.
#[derive(Clone)]
pub struct HubSelector {
    ctx: HubContext,
}

impl HubSelector {
    pub(crate) fn new(ctx: HubContext) -> Self {
        Self { ctx }
    }

    /// Configured hub definitions, if any.
    pub fn hubs(&self) -> &[HubConfig] {
        self.ctx.settings.hubs.as_deref().unwrap_or_default()
    }

    /// Activates the enabled hub called `name`.
    ///
    /// Re-selecting the active hub is a no-op. Switching unsubscribes from
    /// the current hub first. Unknown or disabled names leave everything
    /// untouched and return `false`, as does an empty name.
    pub async fn select_hub(&self, name: &str) -> bool {
        if name.is_empty() {
            warn!("empty hub name");
            return false;
        }
        if self.ctx.state.name().await == name {
            debug!(hub = %name, "hub already active");
            return true;
        }

        let Some(hubs) = self.ctx.settings.hubs.as_deref() else {
            warn!(hub = %name, "no hubs configured");
            return false;
        };

        let Some(config) = hubs.iter().find(|h| h.enabled && h.name == name) else {
            warn!(hub = %name, "hub not found or disabled");
            return false;
        };

        if self.ctx.state.snapshot().await.subscribed {
            debug!("unsubscribing from the current hub before switching");
            SubscriptionManager::new(self.ctx.clone()).unsubscribe().await;
        }

        let mut hub = config.clone();
        hub.subscribed = false;
        hub.resubscribe_requested = false;
        if let Some(name) = hub
            .active_topic()
            .map(|topic| subscriber_name(&self.ctx.settings.client_name, topic))
        {
            hub.subscriber_name = name;
        }
        self.ctx.state.replace_hub(hub).await;

        info!(hub = %name, display = %config.display_name(), "hub selected");
        true
    }
}
