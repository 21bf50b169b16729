//! Form bodies and JSON responses of the HTTP side of FHIRcast: the OAuth2
//! token exchange and the subscribe/unsubscribe handshake.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CALLBACK_PATH, CHANNEL_TYPE_WEBSOCKET, GRANT_CLIENT_CREDENTIALS, HubMode,
};

/// Client-credentials token request, sent form-encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRequest {
    pub grant_type: &'static str,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenRequest {
    pub fn client_credentials(client_id: &str, client_secret: &str) -> Self {
        Self {
            grant_type: GRANT_CLIENT_CREDENTIALS,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

/// Token endpoint response. Some hubs hand out the session topic here too.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Subscribe/unsubscribe handshake, sent form-encoded.
///
/// Field order matches what hubs have been tested against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "hub.mode")]
    pub mode: HubMode,
    #[serde(rename = "hub.channel.type")]
    pub channel_type: &'static str,
    #[serde(rename = "hub.callback")]
    pub callback: String,
    #[serde(rename = "hub.events")]
    pub events: String,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    #[serde(rename = "hub.lease")]
    pub lease: u32,
    #[serde(rename = "subscriber.name")]
    pub subscriber_name: String,
}

impl SubscriptionRequest {
    /// Builds a websocket-channel handshake. `callback_origin` is the scheme
    /// and authority of this client; the callback path is appended.
    pub fn new(
        mode: HubMode,
        callback_origin: &str,
        events: &[String],
        topic: &str,
        lease: u32,
        subscriber_name: &str,
    ) -> Self {
        Self {
            mode,
            channel_type: CHANNEL_TYPE_WEBSOCKET,
            callback: format!("{}{CALLBACK_PATH}", callback_origin.trim_end_matches('/')),
            events: events.join(","),
            topic: topic.to_string(),
            lease,
            subscriber_name: subscriber_name.to_string(),
        }
    }
}

/// Body of an accepted handshake.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionResponse {
    #[serde(rename = "hub.channel.endpoint", default)]
    pub channel_endpoint: Option<String>,
}

/// First frame sent on a freshly opened channel, echoing its endpoint back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAck {
    #[serde(rename = "hub.channel.endpoint")]
    pub channel_endpoint: String,
}
