//! Chat-triggered command runner for Twitch chat.

pub mod config;
pub mod dispatch;
pub mod message;
pub mod session;
pub mod transport;
pub mod twitch;
