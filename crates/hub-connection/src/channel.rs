//! Websocket event channel to a FHIRcast hub.
//!
//! Opened after an accepted subscribe handshake. A read pump classifies
//! inbound frames and forwards genuine events onto the bus; a write pump
//! serialises outbound frames.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fhircast_protocol::ChannelAck;
use fhircast_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::state::HubContext;

/// Errors from the event channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

/// An open websocket channel.
///
/// Owned by [`HubState`](crate::HubState); closing or dropping it stops both
/// pumps. The read pump reports the close back to the hub state.
pub struct EventChannel {
    id: u64,
    endpoint: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl EventChannel {
    /// Connects to `endpoint` and completes the channel handshake by sending
    /// the endpoint back to the hub.
    pub(crate) async fn open(
        endpoint: &str,
        id: u64,
        ctx: HubContext,
    ) -> Result<Self, ChannelError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(endpoint, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(read, id, ctx, write_tx, cancel))
        };

        let channel = Self {
            id,
            endpoint: endpoint.to_string(),
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        };

        let ack = serde_json::to_string(&ChannelAck {
            channel_endpoint: endpoint.to_string(),
        })?;
        channel
            .write_tx
            .send(tungstenite::Message::Text(ack.into()))
            .await
            .map_err(|_| ChannelError::Closed)?;
        debug!(channel = id, endpoint, "event channel connected");

        Ok(channel)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Closes the channel. The write pump sends a close frame on its way out.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.write_tx.is_closed()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        // The read pump is left to observe the cancellation so the close is
        // still reported to the hub state.
        self.cancel.cancel();
    }
}
