//! mced — Mode Control Entity daemon
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                  D-Bus (outer ring)                             │
//! │                                                                │
//! │  bus::client::BusClient   bus::interface::McuRequestIface      │
//! │  (outbound calls/signals) (inbound com.nokia.mce.request)      │
//! │                                                                │
//! │  ──────────────── single-threaded core ──────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │                  Daemon (pure logic)                   │    │
//! │  │  tklock · inactivity · charging · audio · bootstate    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  heartbeat::HeartbeatDispatcher (timers) · worker::WorkerPool  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use mce_core::bus::interface::McuRequestIface;
use mce_core::bus::{self, BusClient, BusService};
use mce_core::config::Settings;
use mce_core::daemon::{Daemon, Paths};
use mce_core::heartbeat::now_boottime_ms;

/// One main-loop iteration per this many milliseconds (§5: the
/// cooperative loop polls rather than blocking indefinitely, since it
/// also owns periodic bookkeeping — charging evaluation, LED ticking,
/// notification expiry — that isn't driven by any single timer).
const LOOP_INTERVAL_MS: u64 = 200;

/// How long a watched peer may go without a `NameOwnerChanged` before
/// it's considered gone (§4.8).
const PEER_STOP_GRACE_MS: u64 = 5_000;

#[derive(Parser, Debug)]
#[command(name = "mced", version, about = "Mode Control Entity daemon")]
struct Cli {
    /// Path to the settings TOML file. Missing keys fall back to
    /// built-in defaults; unreadable/unparseable paths are an error.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stay attached to the controlling terminal instead of the usual
    /// systemd-unit invocation. Logging behavior is unaffected either
    /// way — this only controls whether `main` would otherwise detach.
    #[arg(short, long)]
    foreground: bool,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.foreground {
        info!("mced {} starting in foreground", env!("CARGO_PKG_VERSION"));
    } else {
        info!("mced {} starting", env!("CARGO_PKG_VERSION"));
    }

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let paths = Paths::default();

    let client = BusClient::connect_system().context("failed to connect to the system bus")?;
    client
        .request_name(bus::interface::SERVICE_NAME)
        .context("failed to acquire the mce well-known bus name")?;
    bus::signals::subscribe(&client).context("failed to register inbound signal match rules")?;
    let signal_conn = client.clone_connection();

    let mut bus_service = BusService::new(client, PEER_STOP_GRACE_MS);
    bus_service.watch(mce_core::daemon::UI_SERVICE_PEER);

    let daemon = Arc::new(Mutex::new(Daemon::new(settings, &paths, bus_service)));

    let iface = McuRequestIface::new(daemon.clone());
    {
        let guard = daemon.lock().unwrap();
        guard
            .bus
            .client()
            .inner()
            .object_server()
            .at(bus::interface::REQUEST_PATH, iface)
            .context("failed to register the request interface on the object server")?;
    }

    info!("mced ready, serving {} at {}", bus::interface::SERVICE_NAME, bus::interface::REQUEST_PATH);

    // ── Signal-receive loop (§6.3) ─────────────────────────────
    //
    // A second thread, since `Connection::receive_message` blocks;
    // the object-server dispatch thread above already shows this
    // daemon is fine with more than one OS thread touching `daemon`
    // as long as each holds the lock only for the duration of one
    // state-machine call.
    {
        let daemon = daemon.clone();
        std::thread::spawn(move || loop {
            match signal_conn.receive_message() {
                Ok(msg) => {
                    if let Some(signal) = bus::signals::parse_message(&msg) {
                        let now_ms = now_boottime_ms();
                        daemon.lock().unwrap().apply_observed_signal(signal, now_ms);
                    }
                }
                Err(e) => warn!("bus: signal receive loop error: {e}"),
            }
        });
    }

    // ── Event loop ─────────────────────────────────────────────
    //
    // The object server dispatches inbound D-Bus calls on its own
    // internal executor thread, locking `daemon` for the duration of
    // each call (see `bus::interface`'s doc comment on that tradeoff).
    // This loop only drives the parts nothing else calls into: timer
    // dispatch and the periodic bookkeeping in `Daemon::tick`.
    loop {
        let now_ms = now_boottime_ms();
        {
            let mut d = daemon.lock().unwrap();
            d.dispatch_heartbeat(now_ms);
            d.tick(now_ms);
        }
        std::thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
    }
}
