//! Abstract seam to the platform RTC engine.
//!
//! The core never talks to ICE/DTLS/codec machinery directly. Commands
//! go down through the [`NativeConnection`] trait; asynchronous
//! completions and notifications come back as [`NativeEvent`]s that the
//! driving loop feeds into `PeerSession::handle_native`. One event is
//! processed at a time, so the session never observes two negotiation
//! operations in flight for itself.
//!
//! Platform capability is an explicit descriptor ([`Capabilities`])
//! injected at session construction: channel fallback behavior is a
//! pure function of it, not a scatter of runtime checks.

use serde_json::Value;

// ── Capability descriptor ───────────────────────────────────

/// What the platform engine can do, declared up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Engine can create data channels at all.
    pub data_channels: bool,
    /// Locally known vendor-capability prefix, if any. Seeds the
    /// session's prefix; an inbound message's `prefix` overwrites it.
    pub prefix: Option<String>,
}

// ── Stream and channel descriptors ──────────────────────────

/// Opaque handle to a media stream owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub id: String,
}

impl StreamRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Options for creating a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInit {
    /// Request ordered, guaranteed delivery.
    pub reliable: bool,
}

impl ChannelInit {
    pub fn reliable() -> Self {
        Self { reliable: true }
    }

    pub fn best_effort() -> Self {
        Self { reliable: false }
    }
}

/// What the engine actually produced for a channel request.
///
/// `reliable` reports the channel's real delivery semantics, which may
/// differ from what was requested — the fallback policy checks this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeChannelInfo {
    pub name: String,
    pub reliable: bool,
}

// ── Errors ──────────────────────────────────────────────────

/// Engine-side failures. All variants are non-panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// The platform lacks the requested capability entirely.
    Unsupported(String),
    /// The engine rejected an otherwise supported operation.
    Rejected(String),
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeError::Unsupported(what) => write!(f, "unsupported by platform: {what}"),
            NativeError::Rejected(detail) => write!(f, "rejected by engine: {detail}"),
        }
    }
}

impl std::error::Error for NativeError {}

// ── Asynchronous operations ─────────────────────────────────

/// Negotiation operations that can fail after being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    CreateOffer,
    CreateAnswer,
    SetRemoteAnswer,
    AddIceCandidate,
}

impl NativeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeOp::CreateOffer => "create_offer",
            NativeOp::CreateAnswer => "create_answer",
            NativeOp::SetRemoteAnswer => "set_remote_answer",
            NativeOp::AddIceCandidate => "add_ice_candidate",
        }
    }
}

/// Completions and notifications from the engine.
///
/// The driving loop delivers these to the owning session in arrival
/// order. Events that arrive after the session closed are discarded by
/// the session, not by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    /// A locally requested offer is ready to send.
    OfferReady(Value),
    /// A locally requested answer is ready to send.
    AnswerReady(Value),
    /// An accepted operation failed asynchronously.
    OperationFailed { op: NativeOp, detail: String },
    /// A local ICE candidate was gathered. `None` is the
    /// end-of-candidates marker.
    IceCandidate(Option<Value>),
    /// The engine wants a fresh offer/answer round.
    NegotiationNeeded,
    /// The remote end attached a media stream.
    StreamAdded(StreamRef),
    /// The remote media stream went away.
    StreamRemoved,
    /// The remote end announced a data channel.
    ChannelAdded(NativeChannelInfo),
    /// A data channel reached the open state.
    ChannelOpen(String),
    /// A data channel closed.
    ChannelClosed(String),
    /// A data channel errored.
    ChannelError { name: String, detail: String },
    /// Application data arrived on a data channel.
    ChannelMessage { name: String, data: Vec<u8> },
}

// ── Engine command surface ──────────────────────────────────

/// Commands the session issues to the engine.
///
/// Offer/answer generation is asynchronous: `Ok(())` means the request
/// was accepted, and the result arrives later as
/// [`NativeEvent::OfferReady`] / [`NativeEvent::AnswerReady`].
/// `create_data_channel` is synchronous, mirroring how engines hand the
/// channel object back immediately while it opens in the background.
pub trait NativeConnection {
    fn create_offer(&mut self) -> Result<(), NativeError>;

    fn create_answer(&mut self, remote_offer: &Value) -> Result<(), NativeError>;

    fn set_remote_answer(&mut self, answer: &Value) -> Result<(), NativeError>;

    fn add_ice_candidate(&mut self, candidate: &Value) -> Result<(), NativeError>;

    fn create_data_channel(
        &mut self,
        name: &str,
        init: &ChannelInit,
    ) -> Result<NativeChannelInfo, NativeError>;

    fn add_media_stream(&mut self, stream: &StreamRef) -> Result<(), NativeError>;

    fn close(&mut self);
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_init_helpers() {
        assert!(ChannelInit::reliable().reliable);
        assert!(!ChannelInit::best_effort().reliable);
    }

    #[test]
    fn native_error_display() {
        assert_eq!(
            NativeError::Unsupported("data channels".to_string()).to_string(),
            "unsupported by platform: data channels"
        );
        assert_eq!(
            NativeError::Rejected("bad sdp".to_string()).to_string(),
            "rejected by engine: bad sdp"
        );
    }

    #[test]
    fn native_op_names() {
        assert_eq!(NativeOp::CreateOffer.as_str(), "create_offer");
        assert_eq!(NativeOp::CreateAnswer.as_str(), "create_answer");
        assert_eq!(NativeOp::SetRemoteAnswer.as_str(), "set_remote_answer");
        assert_eq!(NativeOp::AddIceCandidate.as_str(), "add_ice_candidate");
    }

    #[test]
    fn default_capabilities_deny_channels() {
        let caps = Capabilities::default();
        assert!(!caps.data_channels);
        assert!(caps.prefix.is_none());
    }
}
