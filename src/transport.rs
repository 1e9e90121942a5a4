//! Chat transport boundary used by the session controller.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

use crate::message::IncomingMessage;

/// Something the connection task reports to the session.
#[derive(Debug)]
pub enum TransportEvent {
    Message(IncomingMessage),
    /// The connection failed or broke. The stream ends shortly after.
    Error(TransportError),
}

#[derive(Debug)]
pub enum TransportError {
    /// TCP or TLS connect failed.
    Connect(std::io::Error),
    /// TLS could not be set up.
    Tls(String),
    /// Reading or writing an established connection failed.
    Io(std::io::Error),
    /// The server closed the connection.
    Closed,
    /// The server rejected the login.
    AuthenticationFailed(String),
    /// There is no open connection to act on.
    NotConnected,
}

impl TransportError {
    /// Errors that no amount of reconnecting will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {}", e),
            Self::Tls(msg) => write!(f, "tls setup failed: {}", msg),
            Self::Io(e) => write!(f, "connection error: {}", e),
            Self::Closed => write!(f, "connection closed by server"),
            Self::AuthenticationFailed(reason) => write!(f, "authentication failed: {}", reason),
            Self::NotConnected => write!(f, "connection is not open"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// A chat connection for one session epoch.
pub trait ChatTransport {
    /// Add a channel to join. Channels added before `connect` are joined as
    /// part of the login.
    fn join(&mut self, channel: &str);

    /// Start connecting in the background and return the inbound event
    /// stream. Failures arrive on the stream; it ends when the connection
    /// task exits.
    fn connect(&mut self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Queue `text` for `channel`.
    fn say(&self, channel: &str, text: &str);

    /// Close the connection and wait for the connection task to finish.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
