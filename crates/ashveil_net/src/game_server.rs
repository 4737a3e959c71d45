//! # Game Server
//!
//! TCP listener for player traffic. Each accepted connection gets a
//! [`Session`] (walked through the simulated handshake straight to
//! `InWorld`) and a reader thread that parses newline-delimited JSON into
//! [`GameEvent`]s.
//!
//! Readers only ever push: events into the shared intake queue, lifecycle
//! notifications into the session queue. The simulation thread drains both
//! at tick start, so no game state is touched here.

use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use ashveil_core::{
    DrainQueue, GameEvent, Session, SessionEvent, SessionNotification, SessionNotificationKind,
    Telemetry,
};

use crate::parser::parse_event;
use crate::NetError;

/// Configuration for the game listener.
#[derive(Clone, Copy, Debug)]
pub struct GameServerConfig {
    /// TCP port; 0 asks the OS for a free port (used in tests).
    pub port: u16,
}

impl Default for GameServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// The game-socket TCP server.
pub struct GameServer {
    events: DrainQueue<GameEvent>,
    notifications: DrainQueue<SessionNotification>,
    running: Arc<AtomicBool>,
    connections: Arc<Mutex<Vec<TcpStream>>>,
    connection_count: Arc<AtomicUsize>,
    accept_thread: Option<JoinHandle<()>>,
    port: u16,
    telemetry: Telemetry,
}

impl GameServer {
    /// Creates an unstarted server that produces into the given queues.
    #[must_use]
    pub fn new(
        events: DrainQueue<GameEvent>,
        notifications: DrainQueue<SessionNotification>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            events,
            notifications,
            running: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(Mutex::new(Vec::new())),
            connection_count: Arc::new(AtomicUsize::new(0)),
            accept_thread: None,
            port: 0,
            telemetry,
        }
    }

    /// Binds the listener and spawns the accept loop.
    pub fn start(&mut self, config: GameServerConfig) -> Result<(), NetError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .map_err(|source| NetError::Bind { port: config.port, source })?;
        listener.set_nonblocking(true).map_err(NetError::Spawn)?;
        self.port = listener.local_addr().map_err(NetError::Spawn)?.port();
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let connections = Arc::clone(&self.connections);
        let connection_count = Arc::clone(&self.connection_count);
        let events = self.events.clone();
        let notifications = self.notifications.clone();
        let telemetry = self.telemetry.clone();

        let handle =
            thread::Builder::new().name("ashveil-game-accept".into()).spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            if let Ok(tracked) = stream.try_clone() {
                                connections.lock().push(tracked);
                            }
                            connection_count.fetch_add(1, Ordering::SeqCst);
                            spawn_client(
                                stream,
                                addr.to_string(),
                                events.clone(),
                                notifications.clone(),
                                Arc::clone(&connection_count),
                                telemetry.clone(),
                            );
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "game accept failed");
                        }
                    }
                }
            })?;
        self.accept_thread = Some(handle);
        Ok(())
    }

    /// Stops accepting, closes every connection, and joins the accept loop.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for stream in self.connections.lock().drain(..) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }

    /// The bound port (useful when configured with port 0).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the accept loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of game clients currently connected.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-connection reader. Owns the [`Session`] and drives its lifecycle:
/// accept → simulated handshake → `InWorld` → notifications on disconnect.
fn spawn_client(
    stream: TcpStream,
    addr: String,
    events: DrainQueue<GameEvent>,
    notifications: DrainQueue<SessionNotification>,
    connection_count: Arc<AtomicUsize>,
    telemetry: Telemetry,
) {
    let _ = thread::Builder::new().name("ashveil-game-client".into()).spawn(move || {
        let mut session = Session::new(&telemetry);
        telemetry.event(
            "session",
            "Connection accepted",
            json!({ "session_id": session.id(), "remote": addr }),
        );

        // There is no real authentication protocol; the handshake is
        // simulated so the state machine still sees every transition.
        session.transition(SessionEvent::AuthenticateSuccess);
        session.transition(SessionEvent::EnterWorld);
        notifications.push(SessionNotification {
            kind: SessionNotificationKind::Connected,
            session_id: session.id(),
        });

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => match parse_event(&value) {
                    Ok(event) => events.push(event),
                    Err(e) => telemetry.error(
                        "game_server",
                        "Unparseable game event dropped",
                        json!({ "session_id": session.id(), "error": e.to_string() }),
                    ),
                },
                Err(e) => telemetry.error(
                    "game_server",
                    "Malformed game payload dropped",
                    json!({ "session_id": session.id(), "error": e.to_string() }),
                ),
            }
        }

        session.transition(SessionEvent::Disconnect);
        // No reconnect grace in the simulator: the timeout fires at once.
        session.transition(SessionEvent::Timeout);
        notifications.push(SessionNotification {
            kind: SessionNotificationKind::Disconnected,
            session_id: session.id(),
        });
        telemetry.event(
            "session",
            "Client disconnected",
            json!({ "session_id": session.id() }),
        );
        connection_count.fetch_sub(1, Ordering::SeqCst);
    });
}
