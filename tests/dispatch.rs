//! End-to-end dispatch against real child processes.
//!
//! Run with: cargo test --test dispatch
#![cfg(unix)]

use std::io::Write;

use chrono::{Duration, Utc};
use cmdrelay::config::Config;
use cmdrelay::dispatch::{Dispatcher, Outcome, ProcessRunner};
use cmdrelay::message::IncomingMessage;
use tempfile::{NamedTempFile, TempDir};

fn load(json: &str) -> Config {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    Config::load(file.path()).expect("config should load")
}

fn msg(caller: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        caller: caller.into(),
        channel: "somechannel".into(),
        text: text.into(),
    }
}

#[tokio::test]
async fn test_ping_scenario_relays_echo_output() {
    let config = load(r#"{
        "commands": [{ "command": "!ping", "output": true, "executable": "echo", "args": ["pong"] }]
    }"#);
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());

    let outcome = dispatcher.dispatch(&msg("whoever", "!ping"), Utc::now()).await;
    assert_eq!(outcome, Outcome::Executed { relay: Some("pong\n".into()) });
}

#[tokio::test]
async fn test_permission_and_cooldown_limit_spawns() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("runs.log");
    let config = load(&format!(
        r#"{{
            "commands": [{{
                "command": "!log",
                "permissions": ["alice"],
                "executable": "/bin/sh",
                "args": ["-c", "echo \"$0 $1\" >> {}", "$name", "$message"],
                "timeout": 30
            }}]
        }}"#,
        log.display()
    ));
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());
    let now = Utc::now();

    assert_eq!(dispatcher.dispatch(&msg("bob", "!log hi"), now).await, Outcome::Denied);
    assert!(!log.exists());

    assert_eq!(
        dispatcher.dispatch(&msg("Alice", "!log first run"), now).await,
        Outcome::Executed { relay: None }
    );
    assert_eq!(
        dispatcher.dispatch(&msg("alice", "!log again"), now + Duration::seconds(10)).await,
        Outcome::Cooldown
    );
    assert!(matches!(
        dispatcher.dispatch(&msg("alice", "!log later"), now + Duration::seconds(31)).await,
        Outcome::Executed { .. }
    ));

    let runs = std::fs::read_to_string(&log).unwrap();
    assert_eq!(runs, "Alice first run\nalice later\n");
}

#[tokio::test]
async fn test_failing_program_produces_no_output() {
    let config = load(r#"{
        "commands": [{ "command": "!fail", "output": true, "executable": "/bin/sh", "args": ["-c", "echo oops; exit 1"] }]
    }"#);
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());

    assert_eq!(dispatcher.dispatch(&msg("a", "!fail"), Utc::now()).await, Outcome::Failed);
}

#[tokio::test]
async fn test_reload_command_spawns_nothing() {
    let config = load(r#"{
        "commands": [{ "command": "!reload", "reloadConfig": true, "executable": "/bin/false" }]
    }"#);
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());

    assert_eq!(dispatcher.dispatch(&msg("a", "!reload"), Utc::now()).await, Outcome::Reload);
}

#[tokio::test]
async fn test_out_of_range_cooldown_blocks_repeat() {
    let config = load(r#"{
        "commands": [{ "command": "!x", "executable": "true", "timeout": 100000000000000 }]
    }"#);
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());
    let now = Utc::now();

    assert_eq!(dispatcher.dispatch(&msg("a", "!x"), now).await, Outcome::Executed { relay: None });
    assert_eq!(
        dispatcher.dispatch(&msg("a", "!x"), now + Duration::seconds(1)).await,
        Outcome::Cooldown
    );
}

#[tokio::test]
async fn test_command_without_executable_fails_at_spawn() {
    let config = load(r#"{ "commands": [{ "command": "!typo", "output": true }] }"#);
    let mut dispatcher = Dispatcher::new(config.commands, ProcessRunner::new());

    assert_eq!(dispatcher.dispatch(&msg("a", "!typo"), Utc::now()).await, Outcome::Failed);
}
