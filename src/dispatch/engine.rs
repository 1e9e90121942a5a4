//! Dispatcher - runs one incoming message through the command pipeline.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::dispatch::args::build_args;
use crate::dispatch::cooldown::CooldownTracker;
use crate::dispatch::executor::{Invocation, Runner};
use crate::dispatch::permissions::authorized;
use crate::dispatch::resolver::resolve;
use crate::message::IncomingMessage;

/// What happened to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No command matched the first word.
    NoMatch,
    /// The caller is not on the command's permission list.
    Denied,
    /// An authorized caller asked for a configuration reload.
    Reload,
    /// The command ran too recently.
    Cooldown,
    /// The program failed to start or exited unsuccessfully.
    Failed,
    /// The program ran. `relay` holds stdout if the command relays output.
    Executed { relay: Option<String> },
}

/// Command pipeline for one session epoch.
///
/// Owns the command list and the cooldown state, so building a new
/// dispatcher is all a reload needs to start from a clean slate.
pub struct Dispatcher<R> {
    commands: Vec<CommandSpec>,
    cooldowns: CooldownTracker,
    runner: R,
}

impl<R: Runner> Dispatcher<R> {
    pub fn new(commands: Vec<CommandSpec>, runner: R) -> Self {
        Self {
            commands,
            cooldowns: CooldownTracker::new(),
            runner,
        }
    }

    /// Handle `msg` as if it arrived at `now`.
    ///
    /// Rejections are silent: nothing here ever produces chat text except the
    /// captured output of a successful run.
    pub async fn dispatch(&mut self, msg: &IncomingMessage, now: DateTime<Utc>) -> Outcome {
        let Some(resolved) = resolve(&self.commands, &msg.text) else {
            return Outcome::NoMatch;
        };
        let command = resolved.command;

        if !authorized(command, &msg.caller) {
            debug!("{} is not allowed to run {}", msg.caller, command.trigger);
            return Outcome::Denied;
        }

        if command.reload_config {
            info!("Reload requested by {} in #{}", msg.caller, msg.channel);
            return Outcome::Reload;
        }

        if self.cooldowns.in_cooldown(command, now) {
            debug!("{} is cooling down, ignoring {}", command.trigger, msg.caller);
            return Outcome::Cooldown;
        }

        // Recorded before the run so a slow program cannot be started twice
        // inside one window.
        self.cooldowns.record(command, now);

        let invocation = Invocation {
            command: command.trigger.clone(),
            executable: command.executable.clone(),
            args: build_args(&command.args, &msg.caller, &resolved.args),
        };
        info!("{} ran {} in #{}", msg.caller, command.trigger, msg.channel);

        match self.runner.run(&invocation).await {
            Ok(stdout) => Outcome::Executed {
                relay: command.output.then_some(stdout),
            },
            Err(e) => {
                warn!("{e}");
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::executor::ExecutionError;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Mutex};

    /// Records every invocation and answers with a canned result.
    #[derive(Clone, Default)]
    struct RecordingRunner {
        calls: Arc<Mutex<Vec<Invocation>>>,
        fail: bool,
    }

    impl RecordingRunner {
        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Runner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<String, ExecutionError> {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.fail {
                return Err(ExecutionError::Spawn {
                    command: invocation.command.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
            Ok(format!("{}\n", invocation.args.join(" ")))
        }
    }

    fn msg(caller: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            caller: caller.into(),
            channel: "chan".into(),
            text: text.into(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn ping() -> CommandSpec {
        CommandSpec {
            trigger: "!ping".into(),
            executable: "echo".into(),
            args: vec!["pong".into()],
            output: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ping_relays_output() {
        let runner = RecordingRunner::default();
        let mut dispatcher = Dispatcher::new(vec![ping()], runner.clone());

        let outcome = dispatcher.dispatch(&msg("anyone", "!ping"), t0()).await;
        assert_eq!(outcome, Outcome::Executed { relay: Some("pong\n".into()) });
        assert_eq!(
            runner.calls(),
            vec![Invocation {
                command: "!ping".into(),
                executable: "echo".into(),
                args: vec!["pong".into()],
            }]
        );
    }

    #[tokio::test]
    async fn test_silent_command_relays_nothing() {
        let runner = RecordingRunner::default();
        let mut quiet = ping();
        quiet.output = false;
        let mut dispatcher = Dispatcher::new(vec![quiet], runner.clone());

        let outcome = dispatcher.dispatch(&msg("anyone", "!ping"), t0()).await;
        assert_eq!(outcome, Outcome::Executed { relay: None });
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_spawns_nothing() {
        let runner = RecordingRunner::default();
        let mut dispatcher = Dispatcher::new(vec![ping()], runner.clone());

        assert_eq!(dispatcher.dispatch(&msg("a", "hello"), t0()).await, Outcome::NoMatch);
        assert_eq!(dispatcher.dispatch(&msg("a", ""), t0()).await, Outcome::NoMatch);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_caller_spawns_nothing() {
        let runner = RecordingRunner::default();
        let mut restricted = ping();
        restricted.permissions = vec!["alice".into()];
        let mut dispatcher = Dispatcher::new(vec![restricted], runner.clone());

        assert_eq!(dispatcher.dispatch(&msg("bob", "!ping"), t0()).await, Outcome::Denied);
        assert!(runner.calls().is_empty());

        let outcome = dispatcher.dispatch(&msg("Alice", "!ping"), t0()).await;
        assert!(matches!(outcome, Outcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_cooldown_allows_single_run_per_window() {
        let runner = RecordingRunner::default();
        let mut cmd = ping();
        cmd.cooldown_secs = 30;
        let mut dispatcher = Dispatcher::new(vec![cmd], runner.clone());

        assert!(matches!(
            dispatcher.dispatch(&msg("a", "!ping"), t0()).await,
            Outcome::Executed { .. }
        ));
        assert_eq!(
            dispatcher.dispatch(&msg("b", "!ping"), t0() + Duration::seconds(29)).await,
            Outcome::Cooldown
        );
        assert_eq!(runner.calls().len(), 1);

        assert!(matches!(
            dispatcher.dispatch(&msg("a", "!ping"), t0() + Duration::seconds(31)).await,
            Outcome::Executed { .. }
        ));
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_denied_call_does_not_start_cooldown() {
        let runner = RecordingRunner::default();
        let mut cmd = ping();
        cmd.cooldown_secs = 30;
        cmd.permissions = vec!["alice".into()];
        let mut dispatcher = Dispatcher::new(vec![cmd], runner.clone());

        assert_eq!(dispatcher.dispatch(&msg("bob", "!ping"), t0()).await, Outcome::Denied);
        assert!(matches!(
            dispatcher.dispatch(&msg("alice", "!ping"), t0()).await,
            Outcome::Executed { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_run_still_counts_toward_cooldown() {
        let runner = RecordingRunner { fail: true, ..Default::default() };
        let mut cmd = ping();
        cmd.cooldown_secs = 30;
        let mut dispatcher = Dispatcher::new(vec![cmd], runner.clone());

        assert_eq!(dispatcher.dispatch(&msg("a", "!ping"), t0()).await, Outcome::Failed);
        assert_eq!(
            dispatcher.dispatch(&msg("a", "!ping"), t0() + Duration::seconds(1)).await,
            Outcome::Cooldown
        );
    }

    #[tokio::test]
    async fn test_reload_needs_permission_and_spawns_nothing() {
        let runner = RecordingRunner::default();
        let reload = CommandSpec {
            trigger: "!reload".into(),
            reload_config: true,
            permissions: vec!["owner".into()],
            executable: "should-not-run".into(),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(vec![reload], runner.clone());

        assert_eq!(dispatcher.dispatch(&msg("viewer", "!reload"), t0()).await, Outcome::Denied);
        assert_eq!(dispatcher.dispatch(&msg("OWNER", "!reload"), t0()).await, Outcome::Reload);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reload_ignores_cooldown() {
        let reload = CommandSpec {
            trigger: "!reload".into(),
            reload_config: true,
            cooldown_secs: 600,
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(vec![reload], RecordingRunner::default());

        assert_eq!(dispatcher.dispatch(&msg("a", "!reload"), t0()).await, Outcome::Reload);
        assert_eq!(dispatcher.dispatch(&msg("a", "!reload"), t0()).await, Outcome::Reload);
    }

    #[tokio::test]
    async fn test_placeholders_expanded_from_message() {
        let runner = RecordingRunner::default();
        let shout = CommandSpec {
            trigger: "!shout".into(),
            executable: "notify".into(),
            args: vec!["--from".into(), "$name".into(), "$message".into()],
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(vec![shout], runner.clone());

        dispatcher.dispatch(&msg("carol", "!shout hello  world"), t0()).await;
        assert_eq!(runner.calls()[0].args, vec!["--from", "carol", "hello  world"]);
    }

    #[tokio::test]
    async fn test_new_dispatcher_has_no_cooldowns() {
        let mut cmd = ping();
        cmd.cooldown_secs = 60;
        let mut dispatcher = Dispatcher::new(vec![cmd.clone()], RecordingRunner::default());
        dispatcher.dispatch(&msg("a", "!ping"), t0()).await;
        assert_eq!(dispatcher.dispatch(&msg("a", "!ping"), t0()).await, Outcome::Cooldown);

        let mut reloaded = Dispatcher::new(vec![cmd], RecordingRunner::default());
        assert!(matches!(
            reloaded.dispatch(&msg("a", "!ping"), t0()).await,
            Outcome::Executed { .. }
        ));
    }
}
