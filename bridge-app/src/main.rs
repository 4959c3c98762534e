// rflink-bridge -- command-line front end for RFLink gateways.
//
// Usage:
//   rflink-bridge run --config config.json
//   rflink-bridge check --config config.json
//   rflink-bridge send --port /dev/ttyACM0 --delay 100 --repeat 2 "10;NewKaku;00cac142;1;ON;"
//   rflink-bridge parse "20;2D;NewKaku;ID=cac142;SWITCH=1;CMD=ON;"
//
// Set RFLINK_DEBUG (any value) or RUST_LOG=debug for routing details.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rflink::{
    protocol, GatewayBuilder, GatewayEvent, InboundPacket, Platform, PlatformConfig,
};
use rflink_transport::DEFAULT_BAUD_RATE;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Bridge an RFLink gateway to virtual devices.
#[derive(Parser)]
#[command(name = "rflink-bridge", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every configured bridge and log events until Ctrl-C.
    Run {
        /// Platform configuration file (JSON).
        #[arg(long, short, env = "RFLINK_CONFIG")]
        config: PathBuf,
    },

    /// Validate a configuration file and print its devices.
    Check {
        /// Platform configuration file (JSON).
        #[arg(long, short, env = "RFLINK_CONFIG")]
        config: PathBuf,
    },

    /// Queue one raw command on a gateway and exit once it is written.
    Send {
        /// Serial port path.
        #[arg(long, default_value = rflink::config::DEFAULT_DEVICE_PATH)]
        port: String,

        #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
        baud: u32,

        /// Milliseconds after every write.
        #[arg(long, default_value_t = 0)]
        delay: u64,

        /// Writes per command.
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Command line, e.g. `10;NewKaku;00cac142;1;ON;`. A trailing
        /// newline is added when missing.
        command: String,
    },

    /// Parse a gateway line offline and print the packet as JSON.
    Parse {
        /// Line as printed by the gateway.
        line: String,
    },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(verbosity: u8) {
    let debug_env = std::env::var_os("RFLINK_DEBUG").is_some();
    let level = match verbosity {
        0 if debug_env => "debug",
        0 => "info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<PlatformConfig> {
    PlatformConfig::from_path(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

async fn cmd_run(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let platform = Platform::start(&config)
        .await
        .context("failed to start bridges")?;

    for (index, bridge) in platform.bridges().iter().enumerate() {
        let mut events = bridge.gateway().subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(index, &event),
                    Err(RecvError::Lagged(n)) => {
                        warn!(bridge = index, missed = n, "event consumer too slow");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    info!(
        bridges = platform.bridges().len(),
        devices = platform.device_count(),
        "running (Ctrl-C to stop)"
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("stopping");
    platform.shutdown().await.context("failed to shut down")?;
    Ok(())
}

fn log_event(bridge: usize, event: &GatewayEvent) {
    match event {
        GatewayEvent::PacketReceived(packet) => info!(
            bridge,
            protocol = %packet.protocol,
            address = %packet.address,
            channel = %packet.channel,
            command = %packet.command,
            "packet"
        ),
        GatewayEvent::OnChanged {
            device,
            channel,
            on,
            source,
        } => info!(bridge, %device, channel, on, ?source, "on/off changed"),
        GatewayEvent::BrightnessChanged {
            device,
            channel,
            brightness,
            source,
        } => info!(bridge, %device, channel, brightness, ?source, "brightness changed"),
        GatewayEvent::OutputStateChanged {
            device,
            channel,
            on,
        } => info!(bridge, %device, channel, on, "output state changed"),
        GatewayEvent::ButtonPressed {
            device,
            channel,
            press,
        } => info!(bridge, %device, channel, %press, "button pressed"),
        GatewayEvent::CommandSent { command, attempt } => {
            tracing::debug!(bridge, command = %command.trim_end(), attempt, "command sent")
        }
        GatewayEvent::CommandFailed { command, error } => {
            warn!(bridge, command = %command.trim_end(), %error, "command failed")
        }
        GatewayEvent::Disconnected => info!(bridge, "gateway disconnected"),
    }
}

fn cmd_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    for (index, bridge) in config.bridges.iter().enumerate() {
        let gw = bridge.gateway_config();
        let specs = bridge
            .device_specs()
            .with_context(|| format!("bridge {index} has an invalid device"))?;

        println!(
            "Bridge {index}: {} @ {} baud, delay {} ms, repeat {}",
            gw.device_path,
            gw.baud_rate,
            gw.delay.as_millis(),
            gw.repeat
        );
        println!(
            "  {:<24} {:<12} {:<12} {:<8} {:<28} {}",
            "NAME", "PROTOCOL", "ADDRESS", "CHANNEL", "TYPE", "DIMRANGE"
        );
        for spec in &specs {
            for channel in &spec.channels {
                println!(
                    "  {:<24} {:<12} {:<12} {:<8} {:<28} {}",
                    channel.name,
                    spec.protocol,
                    spec.address,
                    channel.id.to_string(),
                    channel.kind.name(),
                    channel
                        .dim_range
                        .map_or_else(|| "-".to_string(), |r| r.to_string()),
                );
            }
        }
    }

    println!("Configuration OK.");
    Ok(())
}

async fn cmd_send(port: &str, baud: u32, delay: u64, repeat: u32, command: &str) -> Result<()> {
    let mut line = command.to_string();
    if !line.ends_with(protocol::COMMAND_TERMINATOR) {
        line.push_str(protocol::COMMAND_TERMINATOR);
    }

    let gateway = GatewayBuilder::new()
        .serial_port(port)
        .baud_rate(baud)
        .delay(Duration::from_millis(delay))
        .repeat(repeat)
        .build()
        .await
        .with_context(|| format!("failed to open gateway on {port}"))?;

    let mut events = gateway.subscribe();
    gateway.send_command(line)?;
    let mut transport = gateway.shutdown().await?;
    transport.close().await?;

    let mut sent = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            GatewayEvent::CommandSent { .. } => sent += 1,
            GatewayEvent::CommandFailed { error, .. } => bail!("write failed: {error}"),
            _ => {}
        }
    }
    println!("Sent {sent} time(s).");
    Ok(())
}

fn cmd_parse(line: &str) -> Result<()> {
    let line = line.trim_end_matches(['\r', '\n']);
    match InboundPacket::parse(line) {
        Some(packet) => println!("{}", serde_json::to_string_pretty(&packet)?),
        None => println!("Not a packet (fewer than 6 fields)."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Run { config } => cmd_run(config).await,
        Command::Check { config } => cmd_check(config),
        Command::Send {
            port,
            baud,
            delay,
            repeat,
            command,
        } => cmd_send(port, *baud, *delay, *repeat, command).await,
        Command::Parse { line } => cmd_parse(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_defaults() {
        let cli = Cli::parse_from(["rflink-bridge", "send", "10;PING;"]);
        match cli.command {
            Command::Send {
                port,
                baud,
                delay,
                repeat,
                command,
            } => {
                assert_eq!(port, "/dev/ttyACM0");
                assert_eq!(baud, 57_600);
                assert_eq!(delay, 0);
                assert_eq!(repeat, 1);
                assert_eq!(command, "10;PING;");
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::parse_from(["rflink-bridge", "-vv", "parse", "20;01;OK;"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn parse_command_accepts_short_lines() {
        assert!(cmd_parse("20;01;OK;").is_ok());
        assert!(cmd_parse("20;2D;NewKaku;ID=cac142;SWITCH=1;CMD=ON;\r\n").is_ok());
    }
}
