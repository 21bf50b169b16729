use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout applied to subscribe and unsubscribe handshakes.
///
/// Token acquisition and publishing carry no timeout; their failures surface
/// through their return values instead.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Period of the resubscribe check.
pub const RECONNECT_CHECK_PERIOD: Duration = Duration::from_secs(10);

/// Path appended to the callback origin for `hub.callback`.
pub const CALLBACK_PATH: &str = "/fhircastCallback";

/// The only channel type this client requests.
pub const CHANNEL_TYPE_WEBSOCKET: &str = "websocket";

/// OAuth2 grant used for hub tokens.
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Status returned by the token endpoint on success.
pub const STATUS_TOKEN_OK: u16 = 200;

/// Status returned by the hub when it accepts a (un)subscription.
pub const STATUS_SUBSCRIPTION_ACCEPTED: u16 = 202;

/// Status that triggers a token refresh.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Default subscription lease, in seconds.
pub const DEFAULT_LEASE_SECS: u32 = 999;

/// Maximum inbound frame size accepted on the event channel (4 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Key the hub uses to acknowledge a subscription over the event channel.
pub const FIELD_MODE: &str = "hub.mode";

/// Event type the hub uses for keepalive frames.
pub const EVENT_HEARTBEAT: &str = "heartbeat";

// Well-known context-change events.
pub const EVENT_PATIENT_OPEN: &str = "patient-open";
pub const EVENT_PATIENT_CLOSE: &str = "patient-close";
pub const EVENT_IMAGINGSTUDY_OPEN: &str = "imagingstudy-open";
pub const EVENT_IMAGINGSTUDY_CLOSE: &str = "imagingstudy-close";
pub const EVENT_DIAGNOSTICREPORT_OPEN: &str = "diagnosticreport-open";
pub const EVENT_DIAGNOSTICREPORT_CLOSE: &str = "diagnosticreport-close";
pub const EVENT_DIAGNOSTICREPORT_UPDATE: &str = "diagnosticreport-update";
pub const EVENT_DIAGNOSTICREPORT_SELECT: &str = "diagnosticreport-select";

/// Subscription handshake mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }
}

/// Hub products that need protocol quirks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubProduct {
    /// Token responses carry no topic; the configured topic is reused.
    RadAi,
    /// Events are posted to the bare hub endpoint, not `endpoint/topic`.
    Philips,
    Other(String),
}

impl HubProduct {
    pub fn from_name(name: &str) -> Self {
        match name {
            "RAD-AI" => HubProduct::RadAi,
            "PHILIPS" => HubProduct::Philips,
            other => HubProduct::Other(other.to_string()),
        }
    }

    /// Whether the token exchange should echo back the hub's existing topic.
    pub fn reuses_configured_topic(&self) -> bool {
        matches!(self, HubProduct::RadAi)
    }

    /// Whether publishing targets the bare hub endpoint.
    pub fn publishes_to_bare_endpoint(&self) -> bool {
        matches!(self, HubProduct::Philips)
    }
}
