//! Twitch IRC client implementing [`ChatTransport`].
//!
//! All network I/O happens on a spawned task so the session can tear the
//! connection down without waiting on message handling.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::transport::{ChatTransport, TransportError, TransportEvent};
use crate::twitch::irc::{self, ServerLine};

pub const DEFAULT_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_TLS_PORT: u16 = 6697;
pub const DEFAULT_PLAIN_PORT: u16 = 6667;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_TLS_PORT,
            tls: true,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ircs" } else { "irc" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

enum Outbound {
    Line(String),
    Quit,
}

/// One Twitch chat connection. Create a new client per session epoch.
pub struct TwitchClient {
    endpoint: Endpoint,
    credentials: Credentials,
    channels: Vec<String>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl TwitchClient {
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            channels: Vec::new(),
            outbound: None,
            task: None,
        }
    }

    fn send(&self, line: String) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(Outbound::Line(line)).is_ok(),
            None => false,
        }
    }
}

impl ChatTransport for TwitchClient {
    fn join(&mut self, channel: &str) {
        let channel = irc::channel_name(channel);
        if channel.is_empty() || self.channels.contains(&channel) {
            return;
        }
        if self.outbound.is_some() {
            self.send(irc::join(&channel));
        }
        self.channels.push(channel);
    }

    fn connect(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let endpoint = self.endpoint.clone();
        let credentials = self.credentials.clone();
        let channels = self.channels.clone();

        self.task = Some(tokio::spawn(async move {
            if let Err(e) = run_connection(&endpoint, &credentials, &channels, &event_tx, out_rx).await {
                warn!("Error on connect to {}: {}", endpoint, e);
                let _ = event_tx.send(TransportEvent::Error(e));
            }
        }));
        self.outbound = Some(out_tx);

        event_rx
    }

    fn say(&self, channel: &str, text: &str) {
        for line in irc::message_lines(text) {
            if !self.send(irc::privmsg(channel, line)) {
                warn!("Dropping message for #{}: not connected", channel);
                return;
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let outbound = self.outbound.take().ok_or(TransportError::NotConnected)?;
        let task = self.task.take().ok_or(TransportError::NotConnected)?;

        // A closed queue means the connection task already exited.
        if outbound.send(Outbound::Quit).is_err() {
            let _ = task.await;
            return Err(TransportError::NotConnected);
        }

        task.await.map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        info!("Disconnected from {}", self.endpoint);
        Ok(())
    }
}

async fn run_connection(
    endpoint: &Endpoint,
    credentials: &Credentials,
    channels: &[String],
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), TransportError> {
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(TransportError::Connect)?;

    if endpoint.tls {
        let stream = tls_connect(tcp, &endpoint.host).await?;
        converse(stream, endpoint, credentials, channels, events, outbound).await
    } else {
        converse(tcp, endpoint, credentials, channels, events, outbound).await
    }
}

async fn tls_connect(tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>, TransportError> {
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Failed to load native certificate: {e}");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!("Loaded {} root certificates ({} ignored)", added, ignored);
    if added == 0 {
        return Err(TransportError::Tls("no trusted root certificates found".into()));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server_name = ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|e| TransportError::Tls(format!("invalid server name '{host}': {e}")))?;

    TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(TransportError::Connect)
}

async fn converse<S>(
    stream: S,
    endpoint: &Endpoint,
    credentials: &Credentials,
    channels: &[String],
    events: &mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    write_line(&mut writer, &irc::pass(&credentials.password)).await?;
    write_line(&mut writer, &irc::nick(&credentials.username)).await?;
    for channel in channels {
        write_line(&mut writer, &irc::join(channel)).await?;
    }
    info!("Connected to {} as {}, joining {:?}", endpoint, credentials.username, channels);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(TransportError::Io)? else {
                    return Err(TransportError::Closed);
                };
                match irc::parse_line(&line) {
                    ServerLine::Ping(payload) => write_line(&mut writer, &irc::pong(&payload)).await?,
                    ServerLine::Privmsg(msg) => {
                        if events.send(TransportEvent::Message(msg)).is_err() {
                            debug!("Session stopped listening, closing connection");
                            return Ok(());
                        }
                    }
                    ServerLine::AuthFailed(reason) => return Err(TransportError::AuthenticationFailed(reason)),
                    ServerLine::Reconnect => {
                        info!("Server requested reconnect");
                        return Err(TransportError::Closed);
                    }
                    ServerLine::Other => debug!("< {}", line),
                }
            }
            out = outbound.recv() => match out {
                Some(Outbound::Line(line)) => write_line(&mut writer, &line).await?,
                Some(Outbound::Quit) | None => {
                    // Best effort: the server may already be gone.
                    let _ = write_line(&mut writer, irc::quit()).await;
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), TransportError> {
    writer.write_all(line.as_bytes()).await.map_err(TransportError::Io)?;
    writer.write_all(b"\r\n").await.map_err(TransportError::Io)?;
    writer.flush().await.map_err(TransportError::Io)
}
