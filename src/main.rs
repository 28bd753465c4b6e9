//! Binary entrypoint for the BetLine CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - serve gateway callbacks
//! - `init` - write a starter `config.toml`
//! - `status` - print stored session count and configuration summary
//! - `sweep` - delete expired session records once and exit
//!
//! See the library crate docs for module-level details: `betline::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;

use betline::config::Config;
use betline::services::Services;
use betline::storage::{spawn_sweeper, MemorySessionStore, SessionStore, SledSessionStoreBuilder};
use betline::ussd::{MenuContext, UssdServer};

#[derive(Parser)]
#[command(name = "betline")]
#[command(about = "USSD session gateway for mobile sports betting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the callback server
    Start {
        /// Listen address, overrides server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show stored sessions and configuration summary
    Status,
    /// Delete expired session records and exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if std::path::Path::new(&cli.config).exists() {
                warn!("{} already exists; leaving it untouched", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Start { bind } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting BetLine v{}", env!("CARGO_PKG_VERSION"));
            run_server(config, bind).await?;
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = open_store(&config)?;
            println!("BetLine v{}", env!("CARGO_PKG_VERSION"));
            println!("Listen address: {}{}", config.server.bind, config.server.callback_path);
            println!("Session TTL: {} min", config.session.ttl_minutes);
            println!("Services: {:?} (timeout {}s)", config.services.mode, config.services.timeout_seconds);
            println!("Stored sessions: {}", store.count()?);
        }
        Commands::Sweep => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = open_store(&config)?;
            let removed = store.sweep_expired()?;
            println!("Removed {} expired session(s)", removed);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    if config.storage.in_memory {
        return Ok(Arc::new(MemorySessionStore::new(config.session.ttl())));
    }
    let store = SledSessionStoreBuilder::new(config.storage.sessions_path())
        .ttl(config.session.ttl())
        .open()?;
    Ok(Arc::new(store))
}

async fn run_server(config: Config, bind: Option<String>) -> Result<()> {
    let store = open_store(&config)?;
    let services = Services::from_config(&config).await?;
    let server = Arc::new(UssdServer::new(
        store.clone(),
        MenuContext::from_config(&config, services),
    ));

    if let Some(every) = config.session.sweep_interval() {
        let sweeping = server.clone();
        spawn_sweeper(store, every, move |_| {
            let pruned = sweeping.prune_locks();
            if pruned > 0 {
                log::debug!("pruned {} idle session lock(s)", pruned);
            }
        });
    } else {
        warn!("session sweep disabled; expired records stay on disk until `betline sweep`");
    }

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let app = betline::ussd::http::router(server, &config.server.callback_path);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}{}", addr, config.server.callback_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("BetLine shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.clone()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Under a service manager stdout is not a TTY; the file is the only sink then.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
