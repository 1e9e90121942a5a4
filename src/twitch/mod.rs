//! Twitch chat over IRC.

pub mod client;
pub mod irc;

pub use client::{Endpoint, TwitchClient};
