//! Channel binary
//!
//! Usage: channel <chan_port> <slot_time_ms>
//!
//! Arbitrates slots until end of input on stdin (Ctrl+D) or Ctrl+C, then
//! prints one line per station to stderr.

use std::env;
use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

use aloha_simulator::{Channel, ChannelConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing, respects RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match ChannelConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Usage: {}", ChannelConfig::USAGE);
            return Ok(ExitCode::FAILURE);
        }
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to listen on port {}", config.port))?;
    tracing::info!(
        "Channel listening on port {} with {} ms slots",
        config.port,
        config.slot_time.as_millis()
    );

    let shutdown = shutdown_signal();
    let mut channel = Channel::new(listener, &config);
    channel.run(shutdown).await;

    eprint!("{}", channel.report());
    Ok(ExitCode::SUCCESS)
}

/// Flips to `true` on Ctrl+C or once stdin reaches end of input
fn shutdown_signal() -> watch::Receiver<bool> {
    let (eof_tx, eof) = oneshot::channel::<()>();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut sink = [0u8; 256];
        while matches!(stdin.read(&mut sink), Ok(n) if n > 0) {}
        let _ = eof_tx.send(());
    });

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
            _ = eof => tracing::info!("End of input, shutting down"),
        }
        let _ = stop.send(true);
    });
    shutdown
}
