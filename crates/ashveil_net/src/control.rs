//! # Control Channel
//!
//! Out-of-band TCP channel for operator commands. Accepts newline-delimited
//! JSON requests with a `command` verb, queues them for the simulation
//! thread, and writes the JSON response back on the same connection.
//!
//! Exactly five verbs exist: `activate`, `deactivate`, `deactivate_all`,
//! `status`, `list`. Execution always happens on the simulation thread via
//! [`process_pending_commands`]; the network side only parses and replies.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ashveil_chaos::{FaultConfig, FaultRegistry, FaultStatus};
use ashveil_core::{DrainQueue, Telemetry};

use crate::NetError;

/// A parsed control request plus the callback that delivers its response
/// back to the originating connection.
pub struct ControlCommand {
    /// The parsed JSON request.
    pub request: Value,
    /// Invoked exactly once with the response object.
    pub on_complete: Box<dyn FnOnce(Value) + Send>,
}

/// Queue of pending control commands, drained once per tick.
pub type CommandQueue = DrainQueue<ControlCommand>;

/// Configuration for the control listener.
#[derive(Clone, Copy, Debug)]
pub struct ControlChannelConfig {
    /// TCP port; 0 asks the OS for a free port (used in tests).
    pub port: u16,
}

impl Default for ControlChannelConfig {
    fn default() -> Self {
        Self { port: 8081 }
    }
}

/// The control-channel TCP server.
pub struct ControlChannel {
    commands: CommandQueue,
    running: Arc<AtomicBool>,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    client_count: Arc<AtomicUsize>,
    accept_thread: Option<JoinHandle<()>>,
    port: u16,
    telemetry: Telemetry,
}

impl ControlChannel {
    /// Creates an unstarted channel.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            commands: CommandQueue::new(),
            running: Arc::new(AtomicBool::new(false)),
            clients: Arc::new(Mutex::new(Vec::new())),
            client_count: Arc::new(AtomicUsize::new(0)),
            accept_thread: None,
            port: 0,
            telemetry,
        }
    }

    /// Binds the listener and spawns the accept loop.
    pub fn start(&mut self, config: ControlChannelConfig) -> Result<(), NetError> {
        let listener = TcpListener::bind(("127.0.0.1", config.port))
            .map_err(|source| NetError::Bind { port: config.port, source })?;
        listener.set_nonblocking(true).map_err(NetError::Spawn)?;
        self.port = listener.local_addr().map_err(NetError::Spawn)?.port();
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let clients = Arc::clone(&self.clients);
        let client_count = Arc::clone(&self.client_count);
        let commands = self.commands.clone();
        let telemetry = self.telemetry.clone();

        let handle = thread::Builder::new().name("ashveil-control-accept".into()).spawn(
            move || {
                while running.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            tracing::info!(%addr, "control client connected");
                            if let Ok(tracked) = stream.try_clone() {
                                clients.lock().push(tracked);
                            }
                            client_count.fetch_add(1, Ordering::SeqCst);
                            spawn_client(
                                stream,
                                commands.clone(),
                                Arc::clone(&client_count),
                                telemetry.clone(),
                            );
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "control accept failed");
                        }
                    }
                }
            },
        )?;
        self.accept_thread = Some(handle);
        Ok(())
    }

    /// Stops accepting, closes every client, and joins the accept thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for stream in self.clients.lock().drain(..) {
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

    /// Number of control clients currently connected.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Producer/consumer handle for the command queue.
    #[must_use]
    pub fn command_queue(&self) -> CommandQueue {
        self.commands.clone()
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One connection: a reader loop on this thread, a writer thread fed by a
/// response channel. `on_complete` callbacks capture the response sender, so
/// responses produced on the simulation thread are written back here.
fn spawn_client(
    stream: TcpStream,
    commands: CommandQueue,
    client_count: Arc<AtomicUsize>,
    telemetry: Telemetry,
) {
    let _ = thread::Builder::new().name("ashveil-control-client".into()).spawn(move || {
        let (response_tx, response_rx) = unbounded::<Value>();
        let writer_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to clone control stream");
                client_count.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        };
        let writer = thread::spawn(move || {
            let mut stream = writer_stream;
            while let Ok(response) = response_rx.recv() {
                let line = format!("{response}\n");
                if stream.write_all(line.as_bytes()).is_err() {
                    break;
                }
            }
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
                Ok(request) => {
                    let tx = response_tx.clone();
                    commands.push(ControlCommand {
                        request,
                        on_complete: Box::new(move |response| {
                            let _ = tx.send(response);
                        }),
                    });
                }
                Err(e) => {
                    telemetry.error(
                        "control",
                        "Malformed control request dropped",
                        json!({ "error": e.to_string() }),
                    );
                    let _ = response_tx
                        .send(json!({ "success": false, "error": format!("invalid JSON: {e}") }));
                }
            }
        }

        drop(response_tx);
        let _ = writer.join();
        client_count.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("control client disconnected");
    });
}

/// Drains the queue and executes each command against the registry,
/// invoking response callbacks. Called once per tick on the simulation
/// thread, before fault bookkeeping.
pub fn process_pending_commands(commands: &CommandQueue, registry: &mut FaultRegistry) {
    for command in commands.drain() {
        let response = execute_command(registry, &command.request);
        (command.on_complete)(response);
    }
}

/// Executes one parsed request. Every response carries `success`; failures
/// add a human-readable `error`.
pub fn execute_command(registry: &mut FaultRegistry, request: &Value) -> Value {
    let Some(command) = request.get("command").and_then(Value::as_str) else {
        return json!({ "success": false, "error": "missing 'command' field" });
    };

    match command {
        "activate" => handle_activate(registry, request),
        "deactivate" => handle_deactivate(registry, request),
        "deactivate_all" => {
            registry.deactivate_all();
            json!({ "success": true, "command": "deactivate_all" })
        }
        "status" => handle_status(registry, request),
        "list" => {
            let faults: Vec<Value> = registry.all_status().iter().map(fault_status_to_json).collect();
            json!({ "success": true, "command": "list", "faults": faults })
        }
        other => json!({ "success": false, "error": format!("unknown command '{other}'") }),
    }
}

fn require_fault_id(request: &Value) -> Result<&str, Value> {
    request
        .get("fault_id")
        .and_then(Value::as_str)
        .ok_or_else(|| json!({ "success": false, "error": "missing 'fault_id' field" }))
}

fn handle_activate(registry: &mut FaultRegistry, request: &Value) -> Value {
    let fault_id = match require_fault_id(request) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let mut config = FaultConfig::default();
    if let Some(params) = request.get("params") {
        if !params.is_object() {
            return json!({ "success": false, "error": "'params' must be an object" });
        }
        config.params = params.clone();
    }
    if let Some(target) = request.get("target_zone_id") {
        match target.as_u64().and_then(|v| u32::try_from(v).ok()) {
            Some(zone_id) => config.target_zone_id = zone_id,
            None => {
                return json!({ "success": false, "error": "'target_zone_id' must be a zone id" })
            }
        }
    }
    if let Some(duration) = request.get("duration_ticks") {
        match duration.as_u64() {
            Some(ticks) => config.duration_ticks = ticks,
            None => {
                return json!({ "success": false, "error": "'duration_ticks' must be a tick count" })
            }
        }
    }

    match registry.activate(fault_id, config) {
        Ok(()) => json!({ "success": true, "command": "activate", "fault_id": fault_id }),
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    }
}

fn handle_deactivate(registry: &mut FaultRegistry, request: &Value) -> Value {
    let fault_id = match require_fault_id(request) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match registry.deactivate(fault_id) {
        Ok(()) => json!({ "success": true, "command": "deactivate", "fault_id": fault_id }),
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    }
}

fn handle_status(registry: &mut FaultRegistry, request: &Value) -> Value {
    let fault_id = match require_fault_id(request) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match registry.fault_status(fault_id) {
        Some(status) => json!({
            "success": true,
            "command": "status",
            "fault_id": fault_id,
            "status": fault_status_to_json(&status),
        }),
        None => json!({ "success": false, "error": format!("unknown fault '{fault_id}'") }),
    }
}

/// Renders a status snapshot for the wire.
#[must_use]
pub fn fault_status_to_json(status: &FaultStatus) -> Value {
    json!({
        "id": status.id,
        "mode": status.mode.as_str(),
        "active": status.active,
        "activations": status.activations,
        "ticks_elapsed": status.ticks_elapsed,
        "config": status.config,
        "detail": status.detail,
    })
}
