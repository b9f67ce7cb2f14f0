//! Peerlink — peer connection negotiation and channel-management core.
//!
//! Drives the offer/answer/candidate signaling protocol for one
//! peer-to-peer session, manages named data channels with reliability
//! fallback, and surfaces a race-free event stream to the containing
//! room manager. The platform RTC engine (`NativeConnection`) and the
//! signaling transport (fed `PeerEvent::Message`) are abstract
//! collaborators supplied by the embedder.

pub mod channel;
pub mod native;
pub mod peer;
pub mod signal;

pub use channel::{ChannelRecord, ChannelRegistry, ChannelState, ReliabilityMode};
pub use native::{
    Capabilities, ChannelInit, NativeChannelInfo, NativeConnection, NativeError, NativeEvent,
    NativeOp, StreamRef,
};
pub use peer::{
    BroadcastRole, ConnectionKind, Direction, PeerConfig, PeerError, PeerEvent, PeerSession,
    SessionState,
};
pub use signal::SignalMessage;
