//! Session controller - connection lifecycle and the reload loop.
//!
//! Each pass through the loop is one epoch: configuration is read fresh, a
//! new dispatcher (and with it an empty cooldown table) is built, and a new
//! transport is connected. Messages are handled strictly one at a time.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::dispatch::{Dispatcher, Outcome, Runner};
use crate::transport::{ChatTransport, TransportError, TransportEvent};

/// Errors that end the session.
#[derive(Debug)]
pub enum SessionError {
    /// The configuration could not be (re)loaded.
    Config(ConfigError),
    /// Disconnecting for a reload failed; the connection state is unknown.
    Disconnect(TransportError),
    /// The server refused the connection in a way retrying cannot fix.
    Connect(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Disconnect(e) => write!(f, "error while disconnecting: {}", e),
            Self::Connect(e) => write!(f, "error on connect: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Disconnect(e) | Self::Connect(e) => Some(e),
        }
    }
}

/// How an epoch ended.
enum EpochEnd {
    Reload,
    Exit,
    ConnectionLost,
}

/// Drives connect → handle → reload/exit for as long as the process runs.
///
/// `connect` builds a fresh transport for every epoch and `runner` builds
/// the process runner handed to each new dispatcher.
pub struct Session<C, M> {
    config_path: PathBuf,
    connect: C,
    runner: M,
    reconnect_delay: Duration,
}

impl<C, M, T, R> Session<C, M>
where
    C: FnMut() -> T,
    M: FnMut() -> R,
    T: ChatTransport,
    R: Runner,
{
    pub fn new(config_path: impl Into<PathBuf>, connect: C, runner: M) -> Self {
        Self {
            config_path: config_path.into(),
            connect,
            runner,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Wait this long before reconnecting after a lost connection.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run until `shutdown` resolves or a fatal error occurs.
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), SessionError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut epoch: u64 = 0;

        loop {
            epoch += 1;
            let config = Config::load(&self.config_path).map_err(SessionError::Config)?;
            info!(
                "Epoch {}: {} channel(s), {} command(s) from {}",
                epoch,
                config.channels.len(),
                config.commands.len(),
                self.config_path.display()
            );

            let mut dispatcher = Dispatcher::new(config.commands, (self.runner)());
            let mut transport = (self.connect)();
            for channel in &config.channels {
                transport.join(channel);
            }
            let mut events = transport.connect();

            // Exit is only noticed between messages; a running program is
            // never interrupted by it.
            let end = loop {
                let event = tokio::select! {
                    biased;
                    _ = &mut shutdown => break EpochEnd::Exit,
                    event = events.recv() => event,
                };
                let Some(event) = event else {
                    break EpochEnd::ConnectionLost;
                };
                if let Some(end) = handle(&mut dispatcher, &transport, event).await? {
                    break end;
                }
            };

            match end {
                EpochEnd::Reload => {
                    info!("Reloading configuration");
                    transport.disconnect().await.map_err(SessionError::Disconnect)?;
                }
                EpochEnd::Exit => {
                    info!("Shutting down");
                    if let Err(e) = transport.disconnect().await {
                        debug!("Disconnect on exit: {e}");
                    }
                    return Ok(());
                }
                EpochEnd::ConnectionLost => {
                    warn!("Connection lost, reconnecting in {:?}", self.reconnect_delay);
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            info!("Shutting down");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }
    }
}

/// Run one transport event through the dispatcher and relay any output.
async fn handle<T, R>(
    dispatcher: &mut Dispatcher<R>,
    transport: &T,
    event: TransportEvent,
) -> Result<Option<EpochEnd>, SessionError>
where
    T: ChatTransport,
    R: Runner,
{
    match event {
        TransportEvent::Message(msg) => match dispatcher.dispatch(&msg, Utc::now()).await {
            Outcome::Reload => return Ok(Some(EpochEnd::Reload)),
            Outcome::Executed { relay: Some(text) } => transport.say(&msg.channel, &text),
            _ => {}
        },
        TransportEvent::Error(e) if e.is_fatal() => {
            error!("{e}");
            return Err(SessionError::Connect(e));
        }
        TransportEvent::Error(e) => warn!("Transport error: {e}"),
    }
    Ok(None)
}
