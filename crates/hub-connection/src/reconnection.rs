//! Periodic resubscription after the event channel drops.
//!
//! The supervisor wakes on a fixed period and re-issues the subscribe
//! handshake when the channel closed while the hub was still subscribed.
//! Retries are unbounded with no backoff. A close that follows a deliberate
//! unsubscribe only has its flag cleared.

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::HubContext;
use crate::subscription::{SubscribeOutcome, SubscriptionManager};
use crate::types::ReconnectConfig;

/// What one supervisor check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// Nothing to do, or auto-reconnect is off.
    Idle,
    /// The flag was set without a live subscription and has been cleared.
    Cleared,
    /// A subscribe was attempted.
    Resubscribed(SubscribeOutcome),
}

pub(crate) struct ReconnectSupervisor {
    ctx: HubContext,
    config: ReconnectConfig,
}

impl ReconnectSupervisor {
    pub(crate) fn new(ctx: HubContext, config: ReconnectConfig) -> Self {
        Self { ctx, config }
    }

    /// Runs the check loop until `cancel` fires.
    pub(crate) fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("reconnect supervisor stopped");
                    return;
                }
                _ = interval.tick() => {}
            }
            self.tick().await;
        }
    }

    pub(crate) async fn tick(&self) -> TickAction {
        let (requested, subscribed, hub) = {
            let hub = self.ctx.state.snapshot().await;
            (hub.resubscribe_requested, hub.subscribed, hub.name)
        };

        if !requested {
            return TickAction::Idle;
        }

        if !subscribed {
            debug!(hub = %hub, "channel closed after unsubscribe, not reconnecting");
            self.ctx
                .state
                .update(|h| h.resubscribe_requested = false)
                .await;
            return TickAction::Cleared;
        }

        if !self.ctx.settings.auto_reconnect {
            return TickAction::Idle;
        }

        self.ctx
            .state
            .update(|h| h.resubscribe_requested = false)
            .await;
        info!(hub = %hub, "resubscribing");

        let outcome = SubscriptionManager::new(self.ctx.clone()).subscribe().await;
        if !outcome.is_accepted() {
            warn!(hub = %hub, %outcome, "resubscribe failed, retrying next check");
            self.ctx
                .state
                .update(|h| h.resubscribe_requested = true)
                .await;
        }
        TickAction::Resubscribed(outcome)
    }
}
