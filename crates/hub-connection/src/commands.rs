//! Named actions forwarded to the client by the host application.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use fhircast_protocol::FhircastMessage;

use crate::client::FhircastClient;

pub const SEND_FHIRCAST: &str = "sendFhircast";
pub const SEND_PRIOR_TO_REPORT: &str = "sendPriorToReport";

/// Errors from command dispatch.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("invalid payload for {command}: {source}")]
    Payload {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Publish a message to the active hub.
    SendFhircast(FhircastMessage),
    /// Accepted and logged; nothing is published.
    SendPriorToReport { study_uid: Option<String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendFhircastPayload {
    fhircast_message: FhircastMessage,
}

#[derive(Deserialize, Default)]
struct PriorToReportPayload {
    #[serde(rename = "studyUID", default)]
    study_uid: Option<String>,
}

impl Command {
    /// Parses `payload` for the command called `name`.
    ///
    /// `sendFhircast` takes either `{"fhircastMessage": {...}}` or the bare
    /// message.
    pub fn parse(name: &str, payload: Value) -> Result<Self, CommandError> {
        match name {
            SEND_FHIRCAST => {
                let message = if payload.get("fhircastMessage").is_some() {
                    serde_json::from_value::<SendFhircastPayload>(payload)
                        .map(|p| p.fhircast_message)
                } else {
                    serde_json::from_value::<FhircastMessage>(payload)
                }
                .map_err(|source| CommandError::Payload {
                    command: SEND_FHIRCAST,
                    source,
                })?;
                Ok(Command::SendFhircast(message))
            }
            SEND_PRIOR_TO_REPORT => {
                let payload = if payload.is_null() {
                    PriorToReportPayload::default()
                } else {
                    serde_json::from_value(payload).map_err(|source| CommandError::Payload {
                        command: SEND_PRIOR_TO_REPORT,
                        source,
                    })?
                };
                Ok(Command::SendPriorToReport {
                    study_uid: payload.study_uid,
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// What a dispatched command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutput {
    /// The message was posted; carries the hub's status if a response came back.
    Published(Option<u16>),
    Acknowledged,
}

/// Parses and runs a command against `client`.
pub async fn dispatch(
    client: &FhircastClient,
    name: &str,
    payload: Value,
) -> Result<CommandOutput, CommandError> {
    match Command::parse(name, payload)? {
        Command::SendFhircast(message) => {
            info!(event = %message.event.event, "sending fhircast message");
            let status = client
                .publish_to_active(message)
                .await
                .map(|r| r.status().as_u16());
            Ok(CommandOutput::Published(status))
        }
        Command::SendPriorToReport { study_uid } => {
            info!(study = ?study_uid, "prior-to-report requested");
            Ok(CommandOutput::Acknowledged)
        }
    }
}
