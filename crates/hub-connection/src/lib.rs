//! FHIRcast hub client.
//!
//! Selects a hub, exchanges client credentials for a bearer token,
//! subscribes over a websocket channel, filters heartbeats and echoes of
//! our own publishes, and resubscribes after unexpected disconnects.

pub mod channel;
pub mod client;
pub mod commands;
pub mod events;
mod publisher;
mod pumps;
mod reconnection;
mod selector;
pub mod state;
mod subscription;
mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{ChannelError, EventChannel};
pub use client::{ClientError, FhircastClient};
pub use commands::{Command, CommandError, CommandOutput};
pub use events::{EventBus, EventKind, HubEvent, Subscription};
pub use publisher::{Publisher, publish_url};
pub use selector::HubSelector;
pub use state::HubState;
pub use subscription::{SubscribeOutcome, SubscriptionManager};
pub use token::TokenManager;
pub use types::{FhircastConfig, HubConfig, ReconnectConfig};
