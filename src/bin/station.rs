//! Station binary
//!
//! Usage: station <chan_ip> <chan_port> <file_name> <frame_size> <slot_time_ms> <seed> <timeout_s>
//!
//! Sends the file over the channel and prints the transfer report to
//! stderr. Exits non-zero when the transfer fails.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::time::timeout;

use aloha_simulator::{MacAddr, Station, StationConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match StationConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Usage: {}", StationConfig::USAGE);
            return Ok(ExitCode::FAILURE);
        }
    };

    let data = std::fs::read(&config.file)
        .with_context(|| format!("failed to read {}", config.file.display()))?;

    let target = (config.channel_host.as_str(), config.channel_port);
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(target))
        .await
        .with_context(|| {
            format!(
                "timed out connecting to {}:{}",
                config.channel_host, config.channel_port
            )
        })?
        .with_context(|| {
            format!(
                "failed to connect to {}:{}",
                config.channel_host, config.channel_port
            )
        })?;
    stream.set_nodelay(true)?;

    let local = stream.local_addr()?;
    let mac = MacAddr::station(u32::from(local.port()));
    tracing::info!("Connected to channel from {} as {}", local, mac);

    let name = config.file.display().to_string();
    let mut station = Station::new(stream, mac, &config);
    let report = station.transmit(&name, &data).await;

    eprint!("{report}");
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
