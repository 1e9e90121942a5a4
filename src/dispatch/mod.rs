//! Command dispatch - turns one chat message into at most one process run.

pub mod args;
pub mod cooldown;
pub mod engine;
pub mod executor;
pub mod permissions;
pub mod resolver;

pub use cooldown::CooldownTracker;
pub use engine::{Dispatcher, Outcome};
pub use executor::{ExecutionError, Invocation, ProcessRunner, Runner};
pub use resolver::{resolve, Resolved};
