use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uart_control::config::{Config, ConfigLoader};
use uart_control::{
    logging, ConnectionService, ConnectionState, LogCache, LogFormatter, PortEnumerator,
    ServiceEvent, SystemPorts,
};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Monitor and drive UART devices from the terminal.",
    long_about = "Opens a serial port on a background worker, prints every received line with a timestamp and source label, and sends stdin lines as commands."
)]
struct Args {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports.
    Ports,
    /// Connect to a port and stream traffic.
    Monitor {
        /// Port name or configured alias
        port: String,
        /// Baud rate (defaults to serial.default_baud)
        #[arg(short, long)]
        baud: Option<u32>,
        /// Source label shown on every line
        #[arg(short, long, default_value = "CPU1")]
        label: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(ConfigLoader::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?
            .into_config()),
        None => match ConfigLoader::load() {
            Ok(loader) => Ok(loader.into_config()),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                Ok(ConfigLoader::with_defaults().into_config())
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let _log_guard = logging::init(&config.logging);

    match args.command {
        Command::Ports => list_ports(),
        Command::Monitor { port, baud, label } => monitor(config, port, baud, label).await,
    }
}

fn list_ports() -> Result<()> {
    let ports = SystemPorts
        .list_available_ports()
        .context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

async fn monitor(config: Config, port: String, baud: Option<u32>, label: String) -> Result<()> {
    let cache = Arc::new(LogCache::with_capacity(config.console.max_entries_per_source));
    cache.subscribe(|entry| println!("{}", entry.display_line()));

    let service = Arc::new(ConnectionService::new(
        label,
        config.serial.clone(),
        LogFormatter::from(&config.console),
        Arc::clone(&cache),
    ));
    if let Some(baud) = baud {
        service.set_baud_rate(baud)?;
    }

    let (event_tx, mut events) = mpsc::unbounded_channel();
    service.subscribe(move |event: &ServiceEvent| {
        let _ = event_tx.send(event.clone());
    });

    {
        let service = Arc::clone(&service);
        let port_name = port.clone();
        tokio::task::spawn_blocking(move || service.connect(&port_name))
            .await?
            .with_context(|| format!("connecting to {port}"))?;
    }
    eprintln!("Connected. Type commands, or :filter <q>, :regex <p>, :clear, :export, :stats, :quit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&service, &cache, &line)? {
                    break;
                }
            }
            Some(event) = events.recv() => {
                if let ServiceEvent::StateChanged { to: ConnectionState::Disconnected, .. } = event {
                    warn!(port = %port, "connection lost");
                    anyhow::bail!(
                        "connection lost: {}",
                        service.last_error().unwrap_or_else(|| "unknown error".into())
                    );
                }
            }
            _ = shutdown_signal() => {
                info!("Signal received, disconnecting");
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || service.disconnect()).await??;
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_input(service: &ConnectionService, cache: &LogCache, line: &str) -> Result<bool> {
    let source = service.label();
    let (command, arg) = match line.strip_prefix(':') {
        Some(rest) => rest.split_once(' ').unwrap_or((rest, "")),
        None => {
            if let Err(e) = service.send_command(line) {
                eprintln!("Send failed: {e}");
            }
            return Ok(true);
        }
    };

    match command {
        "quit" | "q" => return Ok(false),
        "filter" => {
            for entry in cache.filter_cache(source, arg) {
                println!("{}", entry.display_line());
            }
        }
        "regex" => match cache.filter_cache_regex(source, arg) {
            Ok(entries) => entries
                .iter()
                .for_each(|entry| println!("{}", entry.display_line())),
            Err(e) => eprintln!("{e}"),
        },
        "clear" => cache.clear_cache(source),
        "export" => println!("{}", cache.export_text(source)),
        "stats" => println!("{}", serde_json::to_string_pretty(&service.counters())?),
        other => eprintln!("Unknown command :{other}"),
    }
    Ok(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
