//! Event channel read pump: classifies inbound frames.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use fhircast_protocol::constants::WS_MAX_MESSAGE_SIZE;
use fhircast_protocol::{InboundFrame, parse_frame};

use crate::events::HubEvent;
use crate::state::{CloseDisposition, HubContext};

/// What happened to one inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Acknowledged,
    Heartbeat,
    Echo,
    Forwarded,
    Ignored,
    Malformed,
}

/// Reads frames from the hub until the stream ends, fails, or the channel
/// is cancelled, then reports the close.
pub(crate) async fn read_pump<S>(
    mut read: S,
    channel_id: u64,
    ctx: HubContext,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_frame(&text, &ctx).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(channel = channel_id, ?frame, "hub closed the event channel");
                        break;
                    }
                    Some(Ok(_)) => {} // Binary and pong frames carry nothing for us.
                    Some(Err(e)) => {
                        warn!(channel = channel_id, "event channel error: {e}");
                        break;
                    }
                    None => {
                        debug!(channel = channel_id, "event channel stream ended");
                        break;
                    }
                }
            }
        }
    }

    channel_closed(channel_id, &ctx).await;
}

/// Classifies a text frame and forwards genuine events onto the bus.
pub(crate) async fn handle_text_frame(text: &str, ctx: &HubContext) -> FrameOutcome {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return FrameOutcome::Malformed;
    }

    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("event channel processing error: {e}");
            return FrameOutcome::Malformed;
        }
    };

    match frame {
        InboundFrame::Acknowledgment { mode } => {
            debug!(mode = %mode, "subscription acknowledged on the event channel");
            FrameOutcome::Acknowledged
        }
        InboundFrame::Heartbeat => {
            trace!("heartbeat from hub");
            FrameOutcome::Heartbeat
        }
        InboundFrame::Event(message) => {
            if ctx.state.is_echo(&message.id).await {
                debug!(event = %message.event.event, id = %message.id, "dropping echo of our own publish");
                return FrameOutcome::Echo;
            }
            debug!(event = %message.event.event, id = %message.id, "event received");
            ctx.bus.broadcast(HubEvent::MessageReceived(message));
            FrameOutcome::Forwarded
        }
        InboundFrame::Unrecognized => {
            debug!("frame without an event, ignoring");
            FrameOutcome::Ignored
        }
    }
}

/// Marks the hub for resubscription and tells the bus, unless a newer
/// channel has already taken over.
pub(crate) async fn channel_closed(channel_id: u64, ctx: &HubContext) {
    if ctx.state.channel_closed(channel_id).await == CloseDisposition::Superseded {
        debug!(channel = channel_id, "superseded event channel closed");
        return;
    }

    let hub = ctx
        .state
        .update(|hub| {
            hub.resubscribe_requested = true;
            hub.name.clone()
        })
        .await;
    info!(hub = %hub, channel = channel_id, "event channel closed");
    ctx.bus.broadcast(HubEvent::ChannelClosed { hub });
}
