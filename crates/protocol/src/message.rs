use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A FHIRcast event notification, both published and received.
///
/// `id` and `timestamp` are stamped by the publisher right before sending.
/// Inbound frames are read leniently: missing, null or non-string scalars
/// never reject a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhircastMessage {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    pub event: EventBody,
}

/// The `event` object of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    #[serde(rename = "hub.topic", default, deserialize_with = "lenient_string")]
    pub topic: String,
    #[serde(rename = "hub.event", default, deserialize_with = "lenient_string")]
    pub event: String,
    #[serde(default, deserialize_with = "lenient_context")]
    pub context: Vec<ContextEntry>,
}

/// A keyed resource reference inside an event's context list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,
    #[serde(default)]
    pub resource: Value,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

/// Keeps the entries that are objects; anything else in the list is dropped.
fn lenient_context<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ContextEntry>, D::Error> {
    let Value::Array(items) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl FhircastMessage {
    /// Creates an unstamped message for the given event type.
    ///
    /// The topic is left empty; the publisher fills it from the target hub.
    pub fn new(event: impl Into<String>, context: Vec<ContextEntry>) -> Self {
        Self {
            id: String::new(),
            timestamp: None,
            event: EventBody {
                topic: String::new(),
                event: event.into(),
                context,
            },
        }
    }
}

impl EventBody {
    /// Event type, lowercased. Hubs are not consistent about casing.
    pub fn event_name(&self) -> String {
        self.event.to_lowercase()
    }

    /// Looks up a context resource by key, ignoring case.
    pub fn resource(&self, key: &str) -> Option<&Value> {
        self.context
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(key))
            .map(|entry| &entry.resource)
    }
}

impl ContextEntry {
    pub fn new(key: impl Into<String>, resource: Value) -> Self {
        Self {
            key: key.into(),
            resource,
        }
    }
}
