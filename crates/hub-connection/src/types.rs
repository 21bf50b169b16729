//! Public types for the FHIRcast hub client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fhircast_protocol::HubProduct;
use fhircast_protocol::constants::{DEFAULT_LEASE_SECS, RECONNECT_CHECK_PERIOD};

/// One hub definition, and the state of the active hub.
///
/// Configuration keys follow the hub definitions already deployed in the
/// field, which mix snake_case endpoints with camelCase display names.
/// Runtime fields are never read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "friendlyName", default)]
    pub friendly_name: String,
    #[serde(rename = "productName", default)]
    pub product_name: String,
    #[serde(default)]
    pub enabled: bool,
    /// Events requested in the subscription handshake.
    #[serde(default)]
    pub events: Vec<String>,
    /// Subscription lease, in seconds.
    #[serde(default = "default_lease")]
    pub lease: u32,
    #[serde(default)]
    pub hub_endpoint: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Session topic. Usually learned from the token response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Bearer token from the last successful exchange.
    #[serde(skip)]
    pub token: String,
    #[serde(skip)]
    pub subscriber_name: String,
    /// Websocket endpoint handed out by the last accepted handshake.
    #[serde(skip)]
    pub channel_endpoint: Option<String>,
    /// Id of our most recent publish, used to drop its echo.
    #[serde(skip)]
    pub last_published_message_id: Option<String>,
    #[serde(skip)]
    pub subscribed: bool,
    #[serde(skip)]
    pub resubscribe_requested: bool,
}

fn default_lease() -> u32 {
    DEFAULT_LEASE_SECS
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            friendly_name: String::new(),
            product_name: String::new(),
            enabled: false,
            events: Vec::new(),
            lease: DEFAULT_LEASE_SECS,
            hub_endpoint: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            topic: None,
            token: String::new(),
            subscriber_name: String::new(),
            channel_endpoint: None,
            last_published_message_id: None,
            subscribed: false,
            resubscribe_requested: false,
        }
    }
}

impl HubConfig {
    pub fn product(&self) -> HubProduct {
        HubProduct::from_name(&self.product_name)
    }

    /// Returns the topic if one is set and non-empty.
    pub fn active_topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.is_empty())
    }

    /// Display name, falling back to the configuration key.
    pub fn display_name(&self) -> &str {
        if self.friendly_name.is_empty() {
            &self.name
        } else {
            &self.friendly_name
        }
    }
}

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhircastConfig {
    /// Hub definitions. `None` means FHIRcast is not configured at all.
    #[serde(default)]
    pub hubs: Option<Vec<HubConfig>>,
    /// Hub activated at startup.
    #[serde(default)]
    pub default_hub: Option<String>,
    /// Acquire a token at startup and subscribe as soon as a topic is known.
    #[serde(default)]
    pub auto_start: bool,
    /// Resubscribe after the event channel closes unexpectedly.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Origin used to build `hub.callback`.
    #[serde(default = "default_callback_origin")]
    pub callback_origin: String,
    /// Prefix for subscriber names and published message ids.
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_callback_origin() -> String {
    "http://localhost:3000".into()
}

fn default_client_name() -> String {
    "fhircast-client".into()
}

impl Default for FhircastConfig {
    fn default() -> Self {
        Self {
            hubs: None,
            default_hub: None,
            auto_start: false,
            auto_reconnect: false,
            callback_origin: default_callback_origin(),
            client_name: default_client_name(),
        }
    }
}

/// Configuration for the resubscribe check.
///
/// Retries are unbounded and fixed-period; there is no backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Time between two resubscribe checks.
    pub check_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            check_interval: RECONNECT_CHECK_PERIOD,
        }
    }
}
