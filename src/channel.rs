//! Named data channels for one peer session.
//!
//! The registry tracks every channel the session knows about — locally
//! created, remotely announced, or the default reliable/unreliable pair
//! opened at session construction. Channel names are unique per session;
//! asking for an existing name returns the existing record instead of
//! creating a duplicate.
//!
//! Default-pair creation is fail-soft: reliable channels are optional,
//! so a failed or wrong-semantics attempt is logged and the slot left
//! empty. The reliable and unreliable attempts are independent — one
//! failing never blocks the other.

use std::collections::HashMap;

use crate::native::{Capabilities, ChannelInit, NativeChannelInfo, NativeConnection, NativeError};

// ── Default channel labels ──────────────────────────────────

/// Label of the ordered, guaranteed-delivery default channel.
pub const RELIABLE_LABEL: &str = "reliable";

/// Label of the unordered, lossy default channel.
pub const BEST_EFFORT_LABEL: &str = "unreliable";

// ── Channel records ─────────────────────────────────────────

/// Delivery semantics a channel actually provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilityMode {
    Reliable,
    BestEffort,
}

impl ReliabilityMode {
    pub fn from_flag(reliable: bool) -> Self {
        if reliable {
            ReliabilityMode::Reliable
        } else {
            ReliabilityMode::BestEffort
        }
    }
}

/// Lifecycle state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Opening,
    Open,
    Closed,
    Errored,
}

/// One named channel owned by its session. Never shared across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub name: String,
    pub mode: ReliabilityMode,
    pub state: ChannelState,
}

// ── Registry ────────────────────────────────────────────────

/// All channels of one session, keyed by unique name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelRecord>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ChannelRecord> {
        self.channels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelRecord> {
        self.channels.values()
    }

    /// Create the channel `name` if it does not exist yet.
    ///
    /// Returns `Ok(true)` if a channel was created, `Ok(false)` if one
    /// with this name already existed (idempotent — the existing record
    /// is kept unchanged). Fails without touching the registry when the
    /// platform lacks data-channel support or the engine rejects the
    /// request.
    pub fn ensure(
        &mut self,
        name: &str,
        init: &ChannelInit,
        caps: &Capabilities,
        native: &mut dyn NativeConnection,
    ) -> Result<bool, NativeError> {
        if !caps.data_channels {
            return Err(NativeError::Unsupported("data channels".to_string()));
        }
        if self.channels.contains_key(name) {
            return Ok(false);
        }
        let info = native.create_data_channel(name, init)?;
        self.channels.insert(
            name.to_string(),
            ChannelRecord {
                name: name.to_string(),
                mode: ReliabilityMode::from_flag(info.reliable),
                state: ChannelState::Opening,
            },
        );
        Ok(true)
    }

    /// Adopt a channel announced by the remote end.
    ///
    /// An existing record with the same name is kept — names are unique
    /// per session and the first record wins.
    pub fn adopt(&mut self, info: &NativeChannelInfo) {
        self.channels
            .entry(info.name.clone())
            .or_insert_with(|| ChannelRecord {
                name: info.name.clone(),
                mode: ReliabilityMode::from_flag(info.reliable),
                state: ChannelState::Opening,
            });
    }

    /// Move the named channel to `state`. Returns `false` if the name
    /// is unknown (stale engine event — the caller logs and drops it).
    pub fn set_state(&mut self, name: &str, state: ChannelState) -> bool {
        match self.channels.get_mut(name) {
            Some(record) => {
                record.state = state;
                true
            }
            None => false,
        }
    }

    /// Mark every channel closed. Used during session teardown.
    pub fn close_all(&mut self) {
        for record in self.channels.values_mut() {
            record.state = ChannelState::Closed;
        }
    }

    /// Open the default reliable/unreliable channel pair, fail-soft.
    ///
    /// Called once at session construction when the platform supports
    /// data channels. Either attempt may fail or come back with the
    /// wrong delivery semantics; both outcomes leave that slot empty
    /// with a warning. Neither outcome is a session error.
    pub fn open_defaults(&mut self, caps: &Capabilities, native: &mut dyn NativeConnection) {
        if !caps.data_channels {
            return;
        }

        match native.create_data_channel(RELIABLE_LABEL, &ChannelInit::reliable()) {
            Ok(info) if info.reliable => {
                self.channels.insert(
                    RELIABLE_LABEL.to_string(),
                    ChannelRecord {
                        name: RELIABLE_LABEL.to_string(),
                        mode: ReliabilityMode::Reliable,
                        state: ChannelState::Opening,
                    },
                );
            }
            Ok(_) => {
                eprintln!("[channels] '{RELIABLE_LABEL}' came back without reliable semantics, dropping it");
            }
            Err(err) => {
                eprintln!("[channels] failed to create '{RELIABLE_LABEL}' channel: {err}");
            }
        }

        // Independent of the reliable outcome.
        match native.create_data_channel(BEST_EFFORT_LABEL, &ChannelInit::best_effort()) {
            Ok(info) if !info.reliable => {
                self.channels.insert(
                    BEST_EFFORT_LABEL.to_string(),
                    ChannelRecord {
                        name: BEST_EFFORT_LABEL.to_string(),
                        mode: ReliabilityMode::BestEffort,
                        state: ChannelState::Opening,
                    },
                );
            }
            Ok(_) => {
                eprintln!("[channels] '{BEST_EFFORT_LABEL}' came back with reliable semantics, dropping it");
            }
            Err(err) => {
                eprintln!("[channels] failed to create '{BEST_EFFORT_LABEL}' channel: {err}");
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────
