//! Twitch IRC line parsing and building.

use crate::message::IncomingMessage;

/// A line received from the server, reduced to what the client acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    Ping(String),
    Privmsg(IncomingMessage),
    /// Login rejected, with the server's reason.
    AuthFailed(String),
    /// The server is about to drop us and asks for a reconnect.
    Reconnect,
    Other,
}

/// Normalize a configured channel name to the lowercase form without `#`.
pub fn channel_name(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

pub fn pass(password: &str) -> String {
    format!("PASS {password}")
}

pub fn nick(username: &str) -> String {
    format!("NICK {}", username.to_lowercase())
}

pub fn join(channel: &str) -> String {
    format!("JOIN #{}", channel_name(channel))
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{} :{}", channel_name(channel), text)
}

pub fn pong(payload: &str) -> String {
    format!("PONG :{payload}")
}

pub fn quit() -> &'static str {
    "QUIT"
}

/// Split relayed text into lines that are safe to send as PRIVMSG bodies.
pub fn message_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
}

/// Parse one raw line (without the trailing CRLF).
pub fn parse_line(raw: &str) -> ServerLine {
    // IRCv3 tags are not used.
    let raw = match raw.strip_prefix('@') {
        Some(tagged) => match tagged.split_once(' ') {
            Some((_, rest)) => rest,
            None => return ServerLine::Other,
        },
        None => raw,
    };

    if let Some(payload) = raw.strip_prefix("PING") {
        return ServerLine::Ping(payload.trim().trim_start_matches(':').to_string());
    }

    let Some(prefixed) = raw.strip_prefix(':') else {
        return ServerLine::Other;
    };
    let Some((prefix, rest)) = prefixed.split_once(' ') else {
        return ServerLine::Other;
    };
    let (verb, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match verb {
        "PRIVMSG" => parse_privmsg(prefix, params).map_or(ServerLine::Other, ServerLine::Privmsg),
        "NOTICE" => {
            let text = params.split_once(" :").map(|(_, text)| text).unwrap_or("");
            if text.contains("Login authentication failed") || text.contains("Improperly formatted auth") {
                ServerLine::AuthFailed(text.to_string())
            } else {
                ServerLine::Other
            }
        }
        "RECONNECT" => ServerLine::Reconnect,
        _ => ServerLine::Other,
    }
}

fn parse_privmsg(prefix: &str, params: &str) -> Option<IncomingMessage> {
    let caller = prefix.split('!').next()?;
    let (target, text) = params.split_once(" :")?;
    let channel = target.strip_prefix('#')?;
    if caller.is_empty() || channel.is_empty() {
        return None;
    }

    Some(IncomingMessage {
        caller: caller.to_string(),
        channel: channel.to_string(),
        text: text.to_string(),
    })
}
