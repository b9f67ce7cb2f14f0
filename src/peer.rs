//! Peer session state machine.
//!
//! One `PeerSession` owns one native connection and drives the
//! offer/answer/candidate protocol against a single remote endpoint.
//! Inbound signaling arrives through `handle_inbound`, engine
//! completions through `handle_native`; everything the containing room
//! manager needs to react to comes back out as [`PeerEvent`]s drained
//! via `poll_event` — including outbound signaling messages for the
//! relay.
//!
//! States: `New → Negotiating → Connected → Closed`. `Negotiating` is
//! re-entered when the engine asks for renegotiation; established
//! channels and streams survive that. `Closed` is terminal, reached
//! exactly once from either `end()` or remote-stream removal, and every
//! event arriving afterwards is discarded.
//!
//! Nothing here escalates to a process-level failure: faults are either
//! absorbed locally (logged) or surfaced as `PeerEvent::Error` for the
//! manager to decide policy.

use std::collections::VecDeque;

use serde_json::Value;

use crate::channel::{ChannelRecord, ChannelRegistry, ChannelState};
use crate::native::{
    Capabilities, ChannelInit, NativeConnection, NativeError, NativeEvent, NativeOp, StreamRef,
};
use crate::signal::{self, SignalMessage};

// ── Session parameters ──────────────────────────────────────

/// What kind of traffic this session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    DataOnly,
    AudioVideo,
}

impl ConnectionKind {
    /// `roomType` string echoed on outbound messages.
    pub fn room_type(&self) -> &'static str {
        match self {
            ConnectionKind::DataOnly => "data",
            ConnectionKind::AudioVideo => "video",
        }
    }
}

/// Media flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Bidirectional,
    /// Receive-only viewer side of a broadcast; no local stream is
    /// attached.
    SendOnly,
}

/// Role in a screen-share/broadcast topology, when applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastRole {
    Broadcaster,
    Viewer,
}

/// Construction parameters for one session.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub peer_id: String,
    pub kind: ConnectionKind,
    pub direction: Direction,
    pub broadcast_role: Option<BroadcastRole>,
    pub local_stream: Option<StreamRef>,
}

impl PeerConfig {
    pub fn data_only(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            kind: ConnectionKind::DataOnly,
            direction: Direction::Bidirectional,
            broadcast_role: None,
            local_stream: None,
        }
    }

    pub fn audio_video(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            kind: ConnectionKind::AudioVideo,
            direction: Direction::Bidirectional,
            broadcast_role: None,
            local_stream: None,
        }
    }
}

// ── Session state ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Negotiating,
    Connected,
    Closed,
}

// ── Errors surfaced to the manager ──────────────────────────

/// Session faults reported via `PeerEvent::Error`. The session stays
/// open after every one of these; teardown is always the manager's
/// call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The platform cannot create a requested channel type.
    CapabilityUnavailable(String),
    /// The engine rejected an offer/answer operation. The caller may
    /// retry `initiate()`.
    NegotiationFailure { op: &'static str, detail: String },
}

impl std::fmt::Display for PeerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerError::CapabilityUnavailable(what) => {
                write!(f, "capability unavailable: {what}")
            }
            PeerError::NegotiationFailure { op, detail } => {
                write!(f, "negotiation failure in {op}: {detail}")
            }
        }
    }
}

impl std::error::Error for PeerError {}

// ── Events emitted to the manager ───────────────────────────

/// Everything a session tells its containing manager. The manager
/// drains these with [`PeerSession::poll_event`] after each call into
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A fault the manager may act on (disconnect, retry, notify).
    Error(PeerError),
    /// Outbound signaling message for the relay to deliver.
    Message(SignalMessage),
    /// First remote media stream arrived.
    StreamAdded { peer: String, stream: StreamRef },
    /// Remote media stream went away (or the session ended while one
    /// was attached). Signals the manager to drop this session.
    StreamRemoved { peer: String },
    ChannelOpen { name: String },
    ChannelClosed { name: String },
    ChannelError { name: String, detail: String },
    /// Application data received over a data channel.
    ChannelMessage { name: String, data: Vec<u8> },
    /// Application data relayed over the signaling path (data-only
    /// sessions). The payload is opaque to this core.
    Data { from: String, payload: Value },
    Speaking { peer: String },
    StoppedSpeaking { peer: String },
    /// The engine wants a fresh offer/answer round; call `initiate()`
    /// to run it.
    NegotiationNeeded,
}

// ── Peer session ────────────────────────────────────────────

pub struct PeerSession {
    peer_id: String,
    kind: ConnectionKind,
    direction: Direction,
    broadcast_role: Option<BroadcastRole>,
    local_stream: Option<StreamRef>,
    remote_stream: Option<StreamRef>,
    /// Vendor-capability tag stamped on every outbound message. Learned
    /// locally or from the remote peer; last writer wins.
    prefix: Option<String>,
    caps: Capabilities,
    state: SessionState,
    closed: bool,
    channels: ChannelRegistry,
    native: Box<dyn NativeConnection>,
    events: VecDeque<PeerEvent>,
}

impl PeerSession {
    /// Build a session for the remote endpoint `config.peer_id`.
    ///
    /// Attaches the local media stream (bidirectional audio/video
    /// sessions only) and opens the default reliable/unreliable channel
    /// pair when the platform supports data channels. Both setups are
    /// fail-soft: a fault is logged or reported, never fatal.
    pub fn new(
        config: PeerConfig,
        caps: Capabilities,
        mut native: Box<dyn NativeConnection>,
    ) -> Self {
        let mut events = VecDeque::new();

        if config.kind == ConnectionKind::AudioVideo
            && config.direction == Direction::Bidirectional
        {
            if let Some(stream) = &config.local_stream {
                if let Err(err) = native.add_media_stream(stream) {
                    eprintln!(
                        "[peer {}] failed to attach local stream: {err}",
                        config.peer_id
                    );
                    events.push_back(PeerEvent::Error(PeerError::NegotiationFailure {
                        op: "add_media_stream",
                        detail: err.to_string(),
                    }));
                }
            }
        }

        let mut channels = ChannelRegistry::new();
        channels.open_defaults(&caps, native.as_mut());

        Self {
            peer_id: config.peer_id,
            kind: config.kind,
            direction: config.direction,
            broadcast_role: config.broadcast_role,
            local_stream: config.local_stream,
            remote_stream: None,
            prefix: caps.prefix.clone(),
            caps,
            state: SessionState::New,
            closed: false,
            channels,
            native,
            events,
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_stream(&self) -> Option<&StreamRef> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&StreamRef> {
        self.remote_stream.as_ref()
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Pop the next pending event, oldest first.
    pub fn poll_event(&mut self) -> Option<PeerEvent> {
        self.events.pop_front()
    }

    // ── Negotiation ─────────────────────────────────────────

    /// Kick off (or re-run) the offer/answer exchange.
    ///
    /// Requests an offer from the engine; the offer message goes out
    /// when [`NativeEvent::OfferReady`] comes back. A rejected request
    /// is reported, not retried — the caller decides whether to call
    /// `initiate()` again.
    pub fn initiate(&mut self) {
        if self.closed {
            return;
        }
        self.state = SessionState::Negotiating;
        if let Err(err) = self.native.create_offer() {
            self.report_failure("create_offer", err);
        }
    }

    /// Dispatch one inbound signaling message.
    ///
    /// Never fails: malformed candidates are swallowed, unrecognized
    /// types are dropped for forward compatibility, and engine
    /// rejections surface as `PeerEvent::Error` while the session stays
    /// open.
    pub fn handle_inbound(&mut self, message: &SignalMessage) {
        if self.closed {
            eprintln!(
                "[peer {}] dropping inbound '{}' after close",
                self.peer_id, message.kind
            );
            return;
        }
        eprintln!("[peer {}] getting {}", self.peer_id, message.kind);

        if let Some(prefix) = &message.prefix {
            // Last writer wins; conflicting prefixes over the session's
            // lifetime are not reconciled.
            self.prefix = Some(prefix.clone());
        }

        match message.kind.as_str() {
            signal::OFFER => {
                let Some(payload) = non_null(&message.payload) else {
                    eprintln!("[peer {}] offer without payload, dropping", self.peer_id);
                    return;
                };
                self.state = SessionState::Negotiating;
                if let Err(err) = self.native.create_answer(payload) {
                    self.report_failure("create_answer", err);
                }
            }
            signal::ANSWER => {
                let Some(payload) = non_null(&message.payload) else {
                    eprintln!("[peer {}] answer without payload, dropping", self.peer_id);
                    return;
                };
                match self.native.set_remote_answer(payload) {
                    Ok(()) => self.state = SessionState::Connected,
                    Err(err) => self.report_failure("set_remote_answer", err),
                }
            }
            signal::CANDIDATE => match non_null(&message.payload) {
                Some(candidate) => {
                    // Candidates routinely arrive after the connection
                    // already failed or succeeded; rejection never tears
                    // down the session.
                    if let Err(err) = self.native.add_ice_candidate(candidate) {
                        eprintln!(
                            "[peer {}] discarding rejected candidate: {err}",
                            self.peer_id
                        );
                    }
                }
                None => {
                    eprintln!("[peer {}] end of remote candidates", self.peer_id);
                }
            },
            signal::DATA if self.kind == ConnectionKind::DataOnly => {
                let from = self.originator(message);
                self.events.push_back(PeerEvent::Data {
                    from,
                    payload: message.payload.clone().unwrap_or(Value::Null),
                });
            }
            signal::SPEAKING if self.kind == ConnectionKind::AudioVideo => {
                let peer = self.originator(message);
                self.events.push_back(PeerEvent::Speaking { peer });
            }
            signal::STOPPED_SPEAKING if self.kind == ConnectionKind::AudioVideo => {
                let peer = self.originator(message);
                self.events.push_back(PeerEvent::StoppedSpeaking { peer });
            }
            other => {
                // Forward compatibility: unrecognized types (and types
                // that don't apply to this connection kind) are no-ops.
                eprintln!(
                    "[peer {}] ignoring message type '{other}'",
                    self.peer_id
                );
            }
        }
    }

    /// Dispatch one engine completion/notification.
    ///
    /// In-flight completions that land after `end()` are discarded
    /// without mutating the session.
    pub fn handle_native(&mut self, event: NativeEvent) {
        if self.closed {
            eprintln!(
                "[peer {}] dropping native event after close: {event:?}",
                self.peer_id
            );
            return;
        }

        match event {
            NativeEvent::OfferReady(payload) => {
                self.send(signal::OFFER, payload);
            }
            NativeEvent::AnswerReady(payload) => {
                self.send(signal::ANSWER, payload);
                self.state = SessionState::Connected;
            }
            NativeEvent::OperationFailed { op, detail } => {
                if op == NativeOp::AddIceCandidate {
                    eprintln!(
                        "[peer {}] discarding late candidate failure: {detail}",
                        self.peer_id
                    );
                } else {
                    eprintln!("[peer {}] {} failed: {detail}", self.peer_id, op.as_str());
                    self.events.push_back(PeerEvent::Error(PeerError::NegotiationFailure {
                        op: op.as_str(),
                        detail,
                    }));
                }
            }
            NativeEvent::IceCandidate(Some(candidate)) => {
                self.send(signal::CANDIDATE, candidate);
            }
            NativeEvent::IceCandidate(None) => {
                eprintln!("[peer {}] end of local candidates", self.peer_id);
            }
            NativeEvent::NegotiationNeeded => {
                // Re-enter negotiation without touching established
                // channels or streams.
                self.state = SessionState::Negotiating;
                self.events.push_back(PeerEvent::NegotiationNeeded);
            }
            NativeEvent::StreamAdded(stream) => {
                self.on_remote_stream_added(stream);
            }
            NativeEvent::StreamRemoved => {
                eprintln!("[peer {}] remote stream removed", self.peer_id);
                self.end();
            }
            NativeEvent::ChannelAdded(info) => {
                self.channels.adopt(&info);
            }
            NativeEvent::ChannelOpen(name) => {
                if self.channels.set_state(&name, ChannelState::Open) {
                    self.state = SessionState::Connected;
                    self.events.push_back(PeerEvent::ChannelOpen { name });
                } else {
                    eprintln!(
                        "[peer {}] open event for unknown channel '{name}'",
                        self.peer_id
                    );
                }
            }
            NativeEvent::ChannelClosed(name) => {
                if self.channels.set_state(&name, ChannelState::Closed) {
                    self.events.push_back(PeerEvent::ChannelClosed { name });
                } else {
                    eprintln!(
                        "[peer {}] close event for unknown channel '{name}'",
                        self.peer_id
                    );
                }
            }
            NativeEvent::ChannelError { name, detail } => {
                if self.channels.set_state(&name, ChannelState::Errored) {
                    self.events
                        .push_back(PeerEvent::ChannelError { name, detail });
                } else {
                    eprintln!(
                        "[peer {}] error event for unknown channel '{name}'",
                        self.peer_id
                    );
                }
            }
            NativeEvent::ChannelMessage { name, data } => {
                if self.channels.contains(&name) {
                    self.events
                        .push_back(PeerEvent::ChannelMessage { name, data });
                } else {
                    eprintln!(
                        "[peer {}] message on unknown channel '{name}'",
                        self.peer_id
                    );
                }
            }
        }
    }

    // ── Channels ────────────────────────────────────────────

    /// Fetch or create a data channel by name.
    ///
    /// Idempotent: an existing name returns its record unchanged. A
    /// missing platform capability or an engine rejection is reported
    /// via `PeerEvent::Error` and yields `None` — never a panic, never
    /// a torn-down session.
    pub fn open_channel(&mut self, name: &str, init: &ChannelInit) -> Option<&ChannelRecord> {
        if self.closed {
            return None;
        }
        if let Err(err) = self
            .channels
            .ensure(name, init, &self.caps, self.native.as_mut())
        {
            eprintln!(
                "[peer {}] channel '{name}' unavailable: {err}",
                self.peer_id
            );
            self.events.push_back(PeerEvent::Error(PeerError::CapabilityUnavailable(
                err.to_string(),
            )));
            return None;
        }
        self.channels.get(name)
    }

    // ── Teardown ────────────────────────────────────────────

    /// Tear the session down. Idempotent; safe to call while an
    /// offer/answer exchange is in flight.
    ///
    /// Closes the engine connection, detaches the remote stream (with a
    /// `StreamRemoved` event so the manager drops this session), and
    /// marks every channel closed.
    pub fn end(&mut self) {
        if self.closed {
            return;
        }
        eprintln!("[peer {}] ending session", self.peer_id);
        self.closed = true;
        self.state = SessionState::Closed;
        self.native.close();
        self.channels.close_all();
        if self.remote_stream.take().is_some() {
            self.events.push_back(PeerEvent::StreamRemoved {
                peer: self.peer_id.clone(),
            });
        }
    }

    // ── Internal ────────────────────────────────────────────

    fn on_remote_stream_added(&mut self, stream: StreamRef) {
        if self.kind != ConnectionKind::AudioVideo {
            eprintln!(
                "[peer {}] ignoring remote stream on data-only session",
                self.peer_id
            );
            return;
        }
        if self.remote_stream.is_some() {
            // Duplicate negotiation events can replay the stream; keep
            // the first one.
            eprintln!("[peer {}] duplicate remote stream ignored", self.peer_id);
            return;
        }
        self.remote_stream = Some(stream.clone());
        self.state = SessionState::Connected;
        self.events.push_back(PeerEvent::StreamAdded {
            peer: self.peer_id.clone(),
            stream,
        });
    }

    /// Who a relayed message speaks for: its declared `from`, falling
    /// back to this session's own peer.
    fn originator(&self, message: &SignalMessage) -> String {
        message
            .from
            .clone()
            .unwrap_or_else(|| self.peer_id.clone())
    }

    fn report_failure(&mut self, op: &'static str, err: NativeError) {
        eprintln!("[peer {}] {op} failed: {err}", self.peer_id);
        self.events.push_back(PeerEvent::Error(PeerError::NegotiationFailure {
            op,
            detail: err.to_string(),
        }));
    }

    /// Queue an outbound signaling message addressed to this peer,
    /// stamped with the session's current prefix and room type.
    fn send(&mut self, kind: &str, payload: Value) {
        eprintln!("[peer {}] sending {kind}", self.peer_id);
        let message = SignalMessage {
            to: Some(self.peer_id.clone()),
            from: None,
            kind: kind.to_string(),
            payload: Some(payload),
            prefix: self.prefix.clone(),
            room_type: Some(self.kind.room_type().to_string()),
            broadcaster: match self.broadcast_role {
                Some(BroadcastRole::Broadcaster) => Some(true),
                _ => None,
            },
        };
        self.events.push_back(PeerEvent::Message(message));
    }
}

/// JSON `null` payloads count as absent (end-of-candidates sentinel and
/// defensive parsing both land here).
fn non_null(payload: &Option<Value>) -> Option<&Value> {
    match payload {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

// ── Tests ───────────────────────────────────────────────────
