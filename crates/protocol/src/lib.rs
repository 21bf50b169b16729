pub mod constants;
pub mod frame;
pub mod handshake;
pub mod message;

// Re-export primary types for convenience.
pub use constants::{HubMode, HubProduct};
pub use frame::{FrameError, InboundFrame, parse_frame};
pub use handshake::{
    ChannelAck, SubscriptionRequest, SubscriptionResponse, TokenRequest, TokenResponse,
};
pub use message::{ContextEntry, EventBody, FhircastMessage};
