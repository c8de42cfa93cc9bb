//! Audio receiver CLI entry point: parses
//! `port`/`jitter_ms`/`transport`/`buffer`, starts one session, and runs
//! until interrupted.

use anyhow::{Context, Result};
use audio_receiver_core::audio::BufferVariant;
use audio_receiver_core::net::Transport;
use audio_receiver_core::session::{SessionConfig, SessionSupervisor};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args
        .get(1)
        .map(|s| s.parse())
        .transpose()
        .context("invalid port")?
        .unwrap_or(48_000);
    let jitter_ms: u32 = args
        .get(2)
        .map(|s| s.parse())
        .transpose()
        .context("invalid jitter_ms")?
        .unwrap_or(40);
    let transport = args
        .get(3)
        .map(|s| Transport::parse(s))
        .unwrap_or(Transport::Udp);
    let buffer_variant = args
        .get(4)
        .map(|s| BufferVariant::parse(s))
        .unwrap_or_default();

    tracing::info!(
        port,
        jitter_ms,
        ?transport,
        ?buffer_variant,
        "starting audio receiver session"
    );

    let supervisor = Arc::new(Mutex::new(SessionSupervisor::new()));

    let ctrlc_supervisor = supervisor.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received interrupt, stopping session");
        ctrlc_supervisor.lock().stop();
    })
    .context("failed to install ctrl-c handler")?;

    supervisor.lock().start(SessionConfig {
        port,
        initial_jitter_ms: jitter_ms,
        transport,
        buffer_variant,
    })?;

    while supervisor.lock().is_running() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    Ok(())
}
