//! Real-socket round trips against ephemeral ports: the game listener
//! feeding the intake queues, and the control listener answering commands
//! pumped through the command queue the way the tick callback pumps them.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use ashveil_chaos::scenarios::standard_scenarios;
use ashveil_chaos::FaultRegistry;
use ashveil_core::{
    DrainQueue, GameEvent, Position, SessionNotificationKind, Telemetry,
};
use ashveil_net::{
    process_pending_commands, ControlChannel, ControlChannelConfig, GameServer, GameServerConfig,
};

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn game_socket_feeds_the_intake_queues() {
    let events = DrainQueue::new();
    let notifications = DrainQueue::new();
    let mut server =
        GameServer::new(events.clone(), notifications.clone(), Telemetry::disabled());
    server.start(GameServerConfig { port: 0 }).unwrap();
    assert!(server.is_running());

    let mut stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();

    // The connection walks straight into the world.
    wait_for(|| !notifications.is_empty());
    let connected = notifications.drain();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].kind, SessionNotificationKind::Connected);
    let session_id = connected[0].session_id;

    let line = json!({
        "type": "movement",
        "session_id": session_id,
        "position": { "x": 5.0, "y": 10.0, "z": 15.0 },
    });
    stream.write_all(format!("{line}\n").as_bytes()).unwrap();

    wait_for(|| !events.is_empty());
    let batch = events.drain();
    assert_eq!(
        batch,
        vec![GameEvent::Movement { session_id, target: Position::new(5.0, 10.0, 15.0) }]
    );

    // Disconnect produces the matching notification.
    drop(stream);
    wait_for(|| !notifications.is_empty());
    let disconnected = notifications.drain();
    assert_eq!(disconnected[0].kind, SessionNotificationKind::Disconnected);
    assert_eq!(disconnected[0].session_id, session_id);

    server.stop();
    assert!(!server.is_running());
}

#[test]
fn malformed_game_payloads_are_dropped_not_fatal() {
    let (telemetry, buffer) = Telemetry::memory();
    let events = DrainQueue::new();
    let notifications = DrainQueue::new();
    let mut server = GameServer::new(events.clone(), notifications.clone(), telemetry);
    server.start(GameServerConfig { port: 0 }).unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
    wait_for(|| !notifications.is_empty());
    let session_id = notifications.drain()[0].session_id;

    stream.write_all(b"this is not json\n").unwrap();
    stream
        .write_all(format!("{}\n", json!({ "type": "teleport", "session_id": session_id }))
            .as_bytes())
        .unwrap();
    let valid = json!({
        "type": "spell_cast",
        "session_id": session_id,
        "action": "INTERRUPT",
    });
    stream.write_all(format!("{valid}\n").as_bytes()).unwrap();

    // The valid event still arrives; the garbage became error records.
    wait_for(|| !events.is_empty());
    assert_eq!(events.drain().len(), 1);
    wait_for(|| {
        buffer.records().iter().filter(|r| r["type"] == "error").count() >= 2
    });

    server.stop();
}

#[test]
fn control_socket_round_trips_commands() {
    let telemetry = Telemetry::disabled();
    let mut registry = FaultRegistry::new(telemetry.clone());
    for fault in standard_scenarios(&telemetry) {
        registry.register(fault).unwrap();
    }

    let mut channel = ControlChannel::new(telemetry);
    channel.start(ControlChannelConfig { port: 0 }).unwrap();
    let commands = channel.command_queue();

    let mut stream = TcpStream::connect(("127.0.0.1", channel.port())).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let request = json!({
        "command": "activate",
        "fault_id": "latency-spike",
        "params": { "delay_ms": 5 },
        "duration_ticks": 50,
    });
    stream.write_all(format!("{request}\n").as_bytes()).unwrap();

    // Simulate the tick callback's pump.
    wait_for(|| !commands.is_empty());
    process_pending_commands(&commands, &mut registry);
    assert!(registry.is_active("latency-spike"));

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["command"], "activate");
    assert_eq!(response["fault_id"], "latency-spike");

    // A follow-up list on the same connection sees the active fault.
    stream.write_all(format!("{}\n", json!({ "command": "list" })).as_bytes()).unwrap();
    wait_for(|| !commands.is_empty());
    process_pending_commands(&commands, &mut registry);

    line.clear();
    reader.read_line(&mut line).unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();
    let faults = response["faults"].as_array().unwrap();
    assert_eq!(faults.len(), 8);
    let spike = faults.iter().find(|f| f["id"] == "latency-spike").unwrap();
    assert_eq!(spike["active"], true);

    channel.stop();
}

#[test]
fn invalid_control_json_gets_an_immediate_error() {
    let mut channel = ControlChannel::new(Telemetry::disabled());
    channel.start(ControlChannelConfig { port: 0 }).unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", channel.port())).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(b"{{{ not json\n").unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["error"].as_str().unwrap().contains("invalid JSON"));

    channel.stop();
}
