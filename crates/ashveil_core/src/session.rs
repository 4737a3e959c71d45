//! # Session Lifecycle
//!
//! Per-connection state machine. All state changes go through
//! [`Session::transition`], which validates against a fixed table; anything
//! not in the table is rejected with an error record and no state change.
//!
//! Session ids are drawn from a process-wide monotonically increasing
//! counter starting at 1, so they are unique across every coordinator and
//! server instance in the process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use crate::telemetry::Telemetry;

/// Monotonic id generator; lifecycle tied to the process, not any server.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// States in the session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connection accepted, handshake not started.
    Connecting,
    /// Handshake in progress.
    Authenticating,
    /// Fully authenticated and active in a zone.
    InWorld,
    /// Moving between zones.
    Transferring,
    /// Disconnect observed, awaiting reconnect or timeout.
    Disconnecting,
    /// Terminal; resources released.
    Destroyed,
}

impl SessionState {
    /// Telemetry string for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Authenticating => "AUTHENTICATING",
            Self::InWorld => "IN_WORLD",
            Self::Transferring => "TRANSFERRING",
            Self::Disconnecting => "DISCONNECTING",
            Self::Destroyed => "DESTROYED",
        }
    }
}

/// Events that drive session transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake completed.
    AuthenticateSuccess,
    /// Player placed into a zone.
    EnterWorld,
    /// Connection lost or client-initiated disconnect.
    Disconnect,
    /// Zone transfer initiated.
    BeginTransfer,
    /// Arrived in the destination zone.
    TransferComplete,
    /// Client reconnected within the grace window.
    Reconnect,
    /// Reconnection grace period expired.
    Timeout,
}

impl SessionEvent {
    /// Telemetry string for this event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthenticateSuccess => "AUTHENTICATE_SUCCESS",
            Self::EnterWorld => "ENTER_WORLD",
            Self::Disconnect => "DISCONNECT",
            Self::BeginTransfer => "BEGIN_TRANSFER",
            Self::TransferComplete => "TRANSFER_COMPLETE",
            Self::Reconnect => "RECONNECT",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// The ten legal transitions. Linear scan; the table is tiny.
const TRANSITIONS: [(SessionState, SessionEvent, SessionState); 10] = [
    (SessionState::Connecting, SessionEvent::AuthenticateSuccess, SessionState::Authenticating),
    (SessionState::Connecting, SessionEvent::Disconnect, SessionState::Destroyed),
    (SessionState::Authenticating, SessionEvent::EnterWorld, SessionState::InWorld),
    (SessionState::Authenticating, SessionEvent::Disconnect, SessionState::Disconnecting),
    (SessionState::InWorld, SessionEvent::Disconnect, SessionState::Disconnecting),
    (SessionState::InWorld, SessionEvent::BeginTransfer, SessionState::Transferring),
    (SessionState::Transferring, SessionEvent::TransferComplete, SessionState::InWorld),
    (SessionState::Transferring, SessionEvent::Disconnect, SessionState::Disconnecting),
    (SessionState::Disconnecting, SessionEvent::Reconnect, SessionState::Authenticating),
    (SessionState::Disconnecting, SessionEvent::Timeout, SessionState::Destroyed),
];

/// Kind of lifecycle notification pushed from the network threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionNotificationKind {
    /// A session entered the world.
    Connected,
    /// A session left.
    Disconnected,
}

/// Notification drained by the simulation thread at tick start to adjust
/// zone membership. Plain value, trivially copyable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionNotification {
    /// What happened.
    pub kind: SessionNotificationKind,
    /// Which session it happened to.
    pub session_id: u64,
}

/// A player connection's lifecycle, owned by the network layer.
///
/// Not `Clone`: exactly one owner per connection. The simulation thread only
/// ever observes [`SessionNotification`]s.
#[derive(Debug)]
pub struct Session {
    id: u64,
    state: SessionState,
    telemetry: Telemetry,
}

impl Session {
    /// Creates a session in `Connecting` with a fresh process-unique id.
    #[must_use]
    pub fn new(telemetry: &Telemetry) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Connecting,
            telemetry: telemetry.clone(),
        }
    }

    /// This session's unique id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempts a transition.
    ///
    /// A table hit updates the state and emits an event record; a miss
    /// leaves the state unchanged and emits an error record. Returns whether
    /// the transition was legal.
    pub fn transition(&mut self, event: SessionEvent) -> bool {
        for (from, on, to) in TRANSITIONS {
            if from == self.state && on == event {
                let previous = self.state;
                self.state = to;
                self.telemetry.event(
                    "session",
                    "State transition",
                    json!({
                        "session_id": self.id,
                        "from_state": previous.as_str(),
                        "to_state": to.as_str(),
                        "event": event.as_str(),
                    }),
                );
                return true;
            }
        }

        self.telemetry.error(
            "session",
            "Invalid state transition attempted",
            json!({
                "session_id": self.id,
                "current_state": self.state.as_str(),
                "event": event.as_str(),
            }),
        );
        false
    }
}
