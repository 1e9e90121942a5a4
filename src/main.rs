use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use cmdrelay::config::Credentials;
use cmdrelay::dispatch::ProcessRunner;
use cmdrelay::session::{Session, SessionError};
use cmdrelay::twitch::client::{DEFAULT_HOST, DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT};
use cmdrelay::twitch::{Endpoint, TwitchClient};

#[derive(Parser, Debug)]
#[command(name = "cmdrelay")]
#[command(version, about = "Run programs from Twitch chat commands")]
struct Args {
    /// Authentication JSON file with "username" and "password"
    #[arg(long)]
    auth: Option<PathBuf>,

    /// Config JSON file with "channels" and "commands"
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat server hostname
    #[arg(long, default_value = DEFAULT_HOST)]
    server: String,

    /// Chat server port (default 6697, or 6667 with --no-tls)
    #[arg(long)]
    port: Option<u16>,

    /// Connect without TLS
    #[arg(long)]
    no_tls: bool,

    /// Seconds to wait before reconnecting after a lost connection
    #[arg(long, default_value_t = 5)]
    reconnect_delay: u64,

    /// Kill command programs still running after this many seconds
    #[arg(long)]
    exec_timeout: Option<u64>,

    /// Also write logs to <DIR>/cmdrelay.log
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Process exit status per failure class. Clap uses 2 for usage errors.
#[derive(Debug, Clone, Copy)]
enum Exit {
    MissingAuth = 3,
    MissingConfig = 4,
    Credentials = 5,
    Config = 6,
    Disconnect = 7,
    Connect = 8,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(args.log_dir.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(exit) => exit.into(),
    }
}

async fn run(args: Args) -> Result<(), Exit> {
    let Some(auth_path) = args.auth else {
        error!("Authentication file is necessary (--auth)");
        return Err(Exit::MissingAuth);
    };
    let Some(config_path) = args.config else {
        error!("Config file is necessary (--config)");
        return Err(Exit::MissingConfig);
    };

    let credentials = Credentials::load(&auth_path).map_err(|e| {
        error!("Error loading authentication file: {e}");
        Exit::Credentials
    })?;

    let tls = !args.no_tls;
    let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT };
    let endpoint = Endpoint {
        host: args.server,
        port: args.port.unwrap_or(default_port),
        tls,
    };
    let exec_timeout = args.exec_timeout.map(Duration::from_secs);

    info!("🚀 Starting cmdrelay as {} on {}", credentials.username, endpoint);
    info!("Loading commands from {}", config_path.display());
    if let Some(limit) = exec_timeout {
        info!("Command programs are killed after {:?}", limit);
    }

    let session = Session::new(
        config_path,
        move || TwitchClient::new(endpoint.clone(), credentials.clone()),
        move || ProcessRunner::with_timeout(exec_timeout),
    )
    .reconnect_delay(Duration::from_secs(args.reconnect_delay));

    session.run(shutdown_signal()).await.map_err(|e| {
        error!("{e}");
        match e {
            SessionError::Config(_) => Exit::Config,
            SessionError::Disconnect(_) => Exit::Disconnect,
            SessionError::Connect(_) => Exit::Connect,
        }
    })
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stdout logging, plus a plain-text log file when `log_dir` is given.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok();
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("cmdrelay.log"))
            .map_err(|e| eprintln!("Failed to open log file in {}: {e}", dir.display()))
            .ok()
    });

    let (file_layer, guard) = match log_file {
        Some(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter()),
        )
        .with(file_layer)
        .init();

    guard
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
