// gimbal console -- CLI tool for exercising the gimbal link against real
// hardware or a mock controller.
//
// Usage:
//   gimbal-console list
//   gimbal-console --port /dev/ttyACM0 send "R1[1]=1"
//   gimbal-console --port /dev/ttyACM0 --baud 230400 query "R1[10];R1[31]"
//   gimbal-console --port /dev/ttyACM0 poll --duration-s 10 --record
//   gimbal-console --mock poll --duration-s 2
//
// Set RUST_LOG (e.g. RUST_LOG=gimbal_link=trace) for wire-level logging.

mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gimbal::registers::extract_keys;
use gimbal::serial::{SerialPortOpener, list_ports};
use gimbal::{GimbalLink, GimbalLinkBuilder, LinkObserver, PollerConfig, TelemetryPoller};
use gimbal_test_harness::{MockPortOpener, MockTransport};

use crate::console::ConsoleObserver;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// gimbal console -- drives a gimbal controller from the command line.
#[derive(Parser)]
#[command(name = "gimbal-console", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyACM0, COM4). Without it the first
    /// USB serial port found is used.
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = gimbal::config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Use a simulated controller instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available serial ports.
    List,

    /// Send a fire-and-forget command.
    Send {
        /// Command text without the trailing carriage return.
        command: String,
    },

    /// Read registers and print the returned pairs.
    Query {
        /// Register read command (e.g. "R1[10];R1[31]").
        command: String,

        /// Attempts before giving up.
        #[arg(long, default_value_t = 3)]
        attempts: usize,

        /// Per-attempt read timeout in milliseconds.
        #[arg(long, default_value_t = 200)]
        timeout_ms: u64,
    },

    /// Poll telemetry and print forwarded samples.
    Poll {
        /// How long to poll, in seconds.
        #[arg(long, default_value_t = 5)]
        duration_s: u64,

        /// Wire polling period in milliseconds.
        #[arg(long, default_value_t = 20)]
        period_ms: u64,

        /// Count every accepted sample as recorded.
        #[arg(long)]
        record: bool,
    },
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// A mock controller that answers telemetry reads with a fixed
/// frame and register reads with zeros.
fn mock_controller(query: Option<&str>) -> MockTransport {
    let mock = MockTransport::new();
    mock.respond_to(b"TLM\r", b"1;1024;-512;0;0;35;40;;");
    if let Some(command) = query {
        let mut response = String::new();
        for key in extract_keys(command) {
            response.push_str(&format!("R1[{key}];0;"));
        }
        response.push(';');
        mock.respond_to(format!("{command}\r").as_bytes(), response.as_bytes());
    }
    mock
}

async fn connect(cli: &Cli, observer: Arc<dyn LinkObserver>) -> Result<GimbalLink> {
    let builder = GimbalLinkBuilder::new()
        .baud_rate(cli.baud)
        .observer(observer);

    let link = if cli.mock {
        let query = match &cli.command {
            Command::Query { command, .. } => Some(command.as_str()),
            _ => None,
        };
        builder
            .build_and_open(MockPortOpener::new(mock_controller(query)))
            .await
    } else {
        let opener = match cli.port.as_deref() {
            Some(port) => SerialPortOpener::with_port(port),
            None => SerialPortOpener::new(),
        };
        builder.build_and_open(opener).await
    };

    let link = link.context("failed to open gimbal link")?;
    if let Some(port) = link.port().await {
        eprintln!("Connected to {port} at {} baud", cli.baud);
    }
    Ok(link)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    let ports = list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    let width = ports.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  Description", "Port");
    println!("{:<width$}  -----------", "-".repeat(width));
    for port in &ports {
        println!(
            "{:<width$}  {}",
            port.name,
            port.description.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_send(link: &GimbalLink, command: &str) -> Result<()> {
    link.send_msg(command)
        .await
        .with_context(|| format!("failed to send {command:?}"))?;
    println!("Sent {command:?}");
    Ok(())
}

async fn cmd_query(link: &GimbalLink, command: &str, attempts: usize, timeout_ms: u64) -> Result<()> {
    if attempts == 0 {
        bail!("--attempts must be at least 1");
    }
    let pairs = link
        .query_registers(command, Duration::from_millis(timeout_ms), attempts)
        .await
        .with_context(|| format!("no matching response to {command:?} after {attempts} attempts"))?;

    for pair in &pairs {
        println!("{:>8}  {}", pair.key.to_string(), pair.value);
    }
    Ok(())
}

async fn cmd_poll(link: &GimbalLink, observer: &ConsoleObserver, duration_s: u64, period_ms: u64) -> Result<()> {
    if period_ms == 0 {
        bail!("--period-ms must be at least 1");
    }

    let config = PollerConfig::new().period(Duration::from_millis(period_ms));
    let mut poller = TelemetryPoller::new(link.clone(), config);
    poller.start().await.context("failed to start polling")?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration_s)) => {}
        _ = tokio::signal::ctrl_c() => eprintln!("Interrupted."),
    }

    poller.stop().await.context("failed to stop polling")?;

    let stats = poller.stats();
    println!(
        "ticks={} skipped={} accepted={} rejected={} forwarded={} recorded={}",
        stats.ticks,
        stats.skipped,
        stats.accepted,
        stats.rejected,
        stats.forwarded,
        observer.recorded()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!(port = ?cli.port, baud = cli.baud, mock = cli.mock, "starting gimbal console");

    if cli.mock && cli.port.is_some() {
        bail!("--port cannot be combined with --mock");
    }

    let record = matches!(cli.command, Command::Poll { record: true, .. });
    let observer = Arc::new(ConsoleObserver::new(record));

    match &cli.command {
        Command::List => cmd_list(),
        Command::Send { command } => {
            let link = connect(&cli, observer.clone()).await?;
            let result = cmd_send(&link, command).await;
            link.close().await;
            result
        }
        Command::Query {
            command,
            attempts,
            timeout_ms,
        } => {
            let link = connect(&cli, observer.clone()).await?;
            let result = cmd_query(&link, command, *attempts, *timeout_ms).await;
            link.close().await;
            result
        }
        Command::Poll {
            duration_s,
            period_ms,
            ..
        } => {
            let link = connect(&cli, observer.clone()).await?;
            let result = cmd_poll(&link, &observer, *duration_s, *period_ms).await;
            link.close().await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_parses_without_port() {
        let cli = Cli::try_parse_from(["gimbal-console", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List));
        assert!(cli.port.is_none());
        assert_eq!(cli.baud, gimbal::config::DEFAULT_BAUD_RATE);
    }

    #[test]
    fn poll_flags_parse() {
        let cli =
            Cli::try_parse_from(["gimbal-console", "--mock", "poll", "--period-ms", "50", "--record"])
                .unwrap();
        assert!(cli.mock);
        assert!(matches!(
            cli.command,
            Command::Poll {
                period_ms: 50,
                record: true,
                ..
            }
        ));
    }
}
