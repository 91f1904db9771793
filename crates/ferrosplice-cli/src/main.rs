//! ferrosplice - Zero-copy TCP proxy and file sender
//!
//! Relays sockets and streams files into sockets with Linux `splice(2)`, so
//! payload bytes never cross into user space. Other platforms and unsupported
//! sources fall back to a buffered copy.

mod display;
mod json_output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use ferrosplice_config::{Config, ConfigLoader, LoggingConfig};
use ferrosplice_types::TimeoutConfig;
use ferrosplice_zerocopy::{copy_buffered, proxy, Budget, Connection, ProxyReport, SpliceEngine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// ferrosplice - Zero-copy TCP proxy and file sender
#[derive(Parser)]
#[command(
    name = "ferrosplice",
    version = env!("CARGO_PKG_VERSION"),
    about = "Zero-copy TCP proxy and file sender",
    long_about = "ferrosplice moves bytes between files and sockets with Linux splice(2),\n\
                  relaying through a kernel pipe instead of user-space buffers.\n\
                  Unsupported sources and platforms fall back to a buffered copy."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Proxy every accepted client to the upstream address
    Proxy {
        /// Listen address (overrides the configuration)
        #[arg(short, long)]
        listen: Option<String>,
        /// Upstream address (overrides the configuration)
        #[arg(short, long)]
        upstream: Option<String>,
    },
    /// Send a file to a remote address
    Send {
        /// File to send
        file: PathBuf,
        /// Destination address
        #[arg(long)]
        to: String,
        /// Send at most this many bytes
        #[arg(long)]
        limit: Option<i64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the relay pipe capacity against the chunk ceiling
    Probe {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };

    // Initialize logging
    init_logging(&config.logging, cli.debug, cli.quiet, cli.verbose)?;

    info!("ferrosplice v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Proxy { listen, upstream } => {
            proxy_command(config, listen, upstream, cli.quiet).await?;
        }
        Commands::Send {
            file,
            to,
            limit,
            json,
        } => {
            send_command(&config, file, to, limit, json, cli.quiet).await?;
        }
        Commands::Probe { json } => {
            probe_command(&config, json)?;
        }
        Commands::Config { default } => {
            config_command(&config, default)?;
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

async fn proxy_command(
    mut config: Config,
    listen: Option<String>,
    upstream: Option<String>,
    quiet: bool,
) -> Result<()> {
    if let Some(listen) = listen {
        config.proxy.listen = listen;
    }
    if let Some(upstream) = upstream {
        config.proxy.upstream = upstream;
    }

    let engine = SpliceEngine::new(config.splice.clone())?;
    let listener = TcpListener::bind(&config.proxy.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.proxy.listen))?;
    let limiter = Arc::new(Semaphore::new(config.proxy.max_connections));

    info!(
        "Proxy listening on {}, relaying to {}",
        config.proxy.listen, config.proxy.upstream
    );
    if !quiet {
        println!(
            "{} Relaying {} to {}",
            style("⇄").green().bold(),
            style(&config.proxy.listen).cyan(),
            style(&config.proxy.upstream).cyan()
        );
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                        break;
                    };
                    let engine = engine.clone();
                    let upstream = config.proxy.upstream.clone();
                    let timeouts = config.proxy.timeouts.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        match handle_client(&engine, stream, addr, &upstream, &timeouts).await {
                            Ok(report) => debug!(
                                "Client {} done: {} bytes up, {} bytes down",
                                addr, report.a_to_b.bytes, report.b_to_a.bytes
                            ),
                            Err(e) => error!("Error handling client {}: {}", addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    if !quiet {
        display::print_transfer_stats(&engine.stats());
    }
    Ok(())
}

async fn handle_client(
    engine: &SpliceEngine,
    stream: TcpStream,
    addr: SocketAddr,
    upstream: &str,
    timeouts: &TimeoutConfig,
) -> ferrosplice_types::Result<ProxyReport> {
    info!("New client connection from {}", addr);
    stream.set_nodelay(true)?;

    let client = Connection::new(stream).with_timeouts(timeouts);
    let upstream = Connection::connect(upstream, timeouts).await?;

    proxy(engine, Arc::new(client), Arc::new(upstream)).await
}

async fn send_command(
    config: &Config,
    file: PathBuf,
    to: String,
    limit: Option<i64>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    info!("Sending {} to {}", file.display(), to);

    let engine = SpliceEngine::new(config.splice.clone())?;
    let source = std::fs::File::open(&file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let conn = Connection::connect(to.as_str(), &config.proxy.timeouts).await?;

    let start = Instant::now();
    let mut remaining = limit;
    let mut budget = match remaining.as_mut() {
        Some(left) => Budget::Bounded(left),
        None => Budget::Unbounded,
    };

    let outcome = engine.transfer(&source, &conn, budget.reborrow()).await;
    let spliced = outcome.handled;
    let written = if !outcome.should_fall_back() {
        outcome.into_result()?
    } else {
        debug!("Splice declined, falling back to buffered copy");
        let mut reader = tokio::fs::File::from_std(source);
        copy_buffered(&mut reader, &conn, budget, engine.config().max_chunk.get())
            .await
            .into_result()?
    };
    let elapsed = start.elapsed();

    conn.close_write()?;
    conn.close()?;

    let summary = display::SendSummary {
        file,
        destination: to,
        bytes: written,
        spliced,
        remaining,
        elapsed,
    };

    if json {
        let output = json_output::SendResultJson::new(&summary, engine.stats());
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !quiet {
        display::print_send_summary(&summary);
    }

    info!("Send completed: {} bytes", written);
    Ok(())
}

fn probe_command(config: &Config, json: bool) -> Result<()> {
    let result = SpliceEngine::new(config.splice.clone());
    let probe = json_output::ProbeResultJson::new(config, &result);

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
    } else {
        display::print_probe(&probe);
    }

    result?;
    Ok(())
}

fn config_command(config: &Config, default: bool) -> Result<()> {
    let shown = if default {
        Config::default()
    } else {
        config.clone()
    };

    println!(
        "{} {}",
        style("⚙").blue().bold(),
        style(if default {
            "Default configuration"
        } else {
            "Active configuration"
        })
        .bold()
        .underlined()
    );
    println!("{}", ConfigLoader::to_yaml(&shown)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["ferrosplice", "probe"])]
    #[case(&["ferrosplice", "config", "--default"])]
    #[case(&["ferrosplice", "proxy", "--listen", "0.0.0.0:9000"])]
    #[case(&["ferrosplice", "send", "data.bin", "--to", "127.0.0.1:9000", "--limit", "4096"])]
    fn test_cli_parses(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn test_send_requires_destination() {
        assert!(Cli::try_parse_from(["ferrosplice", "send", "data.bin"]).is_err());
    }
}
