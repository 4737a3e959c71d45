//! # Ashveil Server
//!
//! Wires every subsystem and runs the 20 Hz simulation loop on the main
//! thread: telemetry, seeded zones, the fault registry with all eight
//! scenarios, both TCP listeners, and signal-driven graceful shutdown.
//!
//! ## Usage
//!
//! ```bash
//! ashveil_server --game-port 8080 --control-port 8081 --tick-rate 20
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use ashveil_chaos::scenarios::standard_scenarios;
use ashveil_chaos::{wire_zone_hooks, FaultRegistry};
use ashveil_core::{
    DrainQueue, GameLoop, GameLoopConfig, SessionNotificationKind, Telemetry, TelemetryConfig,
    ZoneManager,
};
use ashveil_net::{
    default_seeds, process_pending_commands, ControlChannel, ControlChannelConfig, GameServer,
    GameServerConfig,
};

/// Emit a per-zone health record every this many ticks (5 s at 20 Hz).
const HEALTH_INTERVAL_TICKS: u64 = 100;

#[derive(Parser, Debug)]
#[command(version, about = "Ashveil world simulator — a fault-injection reliability demo")]
struct Args {
    /// TCP port for game clients.
    #[arg(long, default_value_t = 8080)]
    game_port: u16,

    /// TCP port for operator control commands.
    #[arg(long, default_value_t = 8081)]
    control_port: u16,

    /// Simulation tick rate in Hz.
    #[arg(long, default_value_t = 20.0)]
    tick_rate: f64,

    /// Telemetry JSON-lines output file.
    #[arg(long, default_value = "telemetry.jsonl")]
    telemetry_path: PathBuf,

    /// Mirror telemetry records to stdout.
    #[arg(long)]
    telemetry_stdout: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Telemetry first: a sink that cannot open is fatal before the loop.
    let telemetry = Telemetry::from_config(&TelemetryConfig {
        file_path: Some(args.telemetry_path.clone()),
        stdout: args.telemetry_stdout,
    })?;
    telemetry.event(
        "server",
        "Server starting",
        json!({ "version": env!("CARGO_PKG_VERSION"), "tick_rate_hz": args.tick_rate }),
    );

    // World: seeded zones with their NPC populations.
    let mut manager = ZoneManager::new(telemetry.clone());
    let seeds = default_seeds();
    let zone_ids = ashveil_net::apply_seeds(&mut manager, &seeds);
    telemetry.event("server", "Zones initialized", json!({ "zone_count": manager.zone_count() }));

    // Fault registry with the full scenario catalogue, wired into every
    // zone's pre-tick hook.
    let mut registry = FaultRegistry::new(telemetry.clone());
    for fault in standard_scenarios(&telemetry) {
        registry.register(fault)?;
    }
    let fault_count = registry.fault_count();
    let registry = Arc::new(Mutex::new(registry));
    wire_zone_hooks(&registry, &mut manager);
    telemetry.event("server", "Fault registry initialized", json!({ "fault_count": fault_count }));

    // The three drain queues bridging network threads to this thread.
    let events = DrainQueue::new();
    let notifications = DrainQueue::new();

    let mut control = ControlChannel::new(telemetry.clone());
    control.start(ControlChannelConfig { port: args.control_port })?;
    let commands = control.command_queue();
    telemetry.event("server", "Control channel started", json!({ "port": control.port() }));

    let mut game_server =
        GameServer::new(events.clone(), notifications.clone(), telemetry.clone());
    game_server.start(GameServerConfig { port: args.game_port })?;
    telemetry.event("server", "Game server started", json!({ "port": game_server.port() }));

    // Ctrl+C / SIGTERM flips a flag the tick callback observes.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))?;
    }

    let mut game_loop =
        GameLoop::new(GameLoopConfig { tick_rate_hz: args.tick_rate }, telemetry.clone());
    let loop_handle = game_loop.handle();

    let tick_registry = Arc::clone(&registry);
    let tick_telemetry = telemetry.clone();
    game_loop.on_tick(move |tick| {
        if shutdown.load(Ordering::SeqCst) {
            loop_handle.stop();
            return;
        }

        // 1. Session lifecycle: round-robin placement over the seeded zones.
        for notification in notifications.drain() {
            match notification.kind {
                SessionNotificationKind::Connected => {
                    let index = (notification.session_id.wrapping_sub(1) as usize) % zone_ids.len();
                    if let Err(e) = manager.assign_session(notification.session_id, zone_ids[index])
                    {
                        tracing::warn!(session_id = notification.session_id, error = %e,
                            "failed to place session");
                    }
                }
                SessionNotificationKind::Disconnected => {
                    let _ = manager.remove_session(notification.session_id);
                }
            }
        }

        // 2. Operator commands, 3. fault bookkeeping, 4. event routing.
        {
            let mut registry = tick_registry.lock();
            process_pending_commands(&commands, &mut registry);
            registry.on_tick(tick);
        }
        manager.route_events(events.drain());

        // 5. Advance the world.
        manager.tick_all(tick);

        if tick % HEALTH_INTERVAL_TICKS == 0 {
            for zone in manager.zones() {
                let data = serde_json::to_value(zone.health()).unwrap_or_else(|_| json!({}));
                tick_telemetry.health("zone", "Zone health", data);
            }
        }
    })?;

    println!("ashveil_server v{}", env!("CARGO_PKG_VERSION"));
    println!("Ashveil world simulator — reliability engineering demo");
    println!("  Game server:     port {}", game_server.port());
    println!("  Control channel: port {}", control.port());
    println!("  Tick rate:       {} Hz", args.tick_rate);
    let zone_names: Vec<&str> = seeds.iter().map(|s| s.name).collect();
    println!("  Zones:           {}", zone_names.join(", "));
    println!("  Faults:          {fault_count} scenarios registered");
    println!("  Telemetry:       {}", args.telemetry_path.display());
    println!("Press Ctrl+C to stop.");

    game_loop.run()?;

    telemetry.event("server", "Shutting down", json!({}));
    game_server.stop();
    control.stop();
    registry.lock().deactivate_all();
    telemetry.event("server", "Server stopped", json!({ "total_ticks": game_loop.tick_count() }));
    telemetry.flush();

    println!("Server stopped after {} ticks.", game_loop.tick_count());
    Ok(())
}
