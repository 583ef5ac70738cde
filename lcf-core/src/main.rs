//! lcf-core - Live comment feed driver
//!
//! Follows one post, prints every `FeedEvent` as a JSON line on stdout and
//! takes control commands on stdin. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lcf_common::config::{default_config_path, CliOverrides, FeedConfig};
use lcf_common::events::{EventBus, TransportMode};
use lcf_common::model::FeedTarget;
use lcf_core::{FeedController, HttpBackend, Sources, StaticCredential};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Stream,
    Poll,
}

/// Command-line arguments for lcf-core
#[derive(Parser, Debug)]
#[command(name = "lcf-core")]
#[command(about = "Live comment feed for a social-media post")]
#[command(version)]
struct Args {
    /// Page that owns the post
    #[arg(long, env = "LCF_PAGE_ID")]
    page: String,

    /// Post (live video) to follow
    #[arg(long, env = "LCF_POST_ID")]
    post: String,

    /// Transport used to receive comments
    #[arg(long, value_enum, default_value = "stream")]
    mode: ModeArg,

    /// Poll interval in seconds (poll mode)
    #[arg(long)]
    interval: Option<u64>,

    /// Page size (poll mode)
    #[arg(long)]
    page_size: Option<u32>,

    /// Shop proxy base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token for the shop proxy
    #[arg(long)]
    token: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Control commands read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Search(String),
    Clear,
    Page(i64),
    Refresh,
    Mode(TransportModeArg),
    Start,
    Stop,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportModeArg {
    Stream,
    Poll(Option<u64>),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "search" if !rest.is_empty() => Some(Command::Search(rest.to_string())),
            "search" | "clear" => Some(Command::Clear),
            "page" => rest.parse().ok().map(Command::Page),
            "refresh" => Some(Command::Refresh),
            "mode" => {
                let mut parts = rest.split_whitespace();
                match parts.next() {
                    Some("stream") => Some(Command::Mode(TransportModeArg::Stream)),
                    Some("poll") => {
                        let secs = parts.next().and_then(|s| s.parse().ok());
                        Some(Command::Mode(TransportModeArg::Poll(secs)))
                    }
                    _ => None,
                }
            }
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

struct Driver {
    controller: Arc<FeedController>,
    target: FeedTarget,
    mode: TransportMode,
    default_poll: Duration,
}

impl Driver {
    /// Returns `false` when the driver should exit
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Search(term) => self.controller.set_search_term(Some(&term)).await,
            Command::Clear => self.controller.set_search_term(None).await,
            Command::Page(page) => {
                if !self.controller.go_to_page(page).await {
                    info!(page, "Page unchanged or paging unavailable");
                }
            }
            Command::Refresh => match self.controller.refresh_enrichment().await {
                Ok(order_count) => info!(order_count, "Orders refreshed"),
                Err(e) => warn!(error = %e, "Order refresh failed"),
            },
            Command::Mode(mode) => {
                self.mode = match mode {
                    TransportModeArg::Stream => TransportMode::Stream,
                    TransportModeArg::Poll(secs) => TransportMode::poll(
                        secs.map(Duration::from_secs).unwrap_or(self.default_poll),
                    ),
                };
                self.start().await;
            }
            Command::Start => self.start().await,
            Command::Stop => self.controller.stop().await,
            Command::Quit => return false,
        }
        true
    }

    async fn start(&self) {
        if let Err(e) = self.controller.start(self.target.clone(), self.mode).await {
            error!(error = %e, "Failed to start feed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cli = CliOverrides {
        base_url: args.base_url.clone(),
        access_token: args.token.clone(),
        poll_interval_secs: args.interval,
        page_size: args.page_size,
    };
    let config = FeedConfig::resolve(&cli, args.config.as_deref())
        .context("Failed to load configuration")?;

    // Logs on stderr; stdout carries the event stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lcf_core={0},lcf_common={0}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting lcf-core v{}", env!("CARGO_PKG_VERSION"));
    match args.config.clone().or_else(default_config_path) {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file location"),
    }
    info!("Backend: {}", config.base_url);

    let backend = HttpBackend::from_config(&config).context("Failed to build HTTP client")?;
    let sources = Sources::from_backend(
        Arc::new(backend),
        Arc::new(StaticCredential::new(config.access_token.clone())),
    );
    let events = EventBus::new(config.event_capacity);
    let default_poll = config.poll_interval;
    let controller = Arc::new(FeedController::new(config, sources, events));

    let printer = spawn_event_printer(&controller);

    let mode = match args.mode {
        ModeArg::Stream => TransportMode::Stream,
        ModeArg::Poll => TransportMode::poll(default_poll),
    };
    let mut driver = Driver {
        controller: Arc::clone(&controller),
        target: FeedTarget::new(args.page, args.post),
        mode,
        default_poll,
    };
    driver.start().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Command::parse(&line) {
                        Some(command) => {
                            if !driver.handle(command).await {
                                break;
                            }
                        }
                        None => warn!(input = %line.trim(), "Unknown command"),
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }
    }

    controller.stop().await;
    printer.abort();
    info!("Shutdown complete");
    Ok(())
}

/// Print every event as one JSON line
fn spawn_event_printer(controller: &FeedController) -> tokio::task::JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
