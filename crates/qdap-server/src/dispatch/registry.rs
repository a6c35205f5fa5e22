//! Command registry: command name → constructor plus admission policy.

use crate::messages::{self, DapCommand, Message};
use crate::session::SessionPhase;
use qdap_core::{DapError, DapResult, DecodedRequest};
use std::collections::HashMap;
use tracing::warn;

/// Which session phases a command may run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Only before the session is initialized.
    Uninitialized,
    /// Only while the session holds an engine handle.
    Initialized,
    /// Ends the session. Repeating it after termination is acknowledged
    /// without running the handler again.
    Terminating,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Run,
    Acknowledge,
}

impl Admission {
    pub fn check(self, phase: SessionPhase, command: &str) -> DapResult<Gate> {
        use SessionPhase::*;
        match (self, phase) {
            (Admission::Uninitialized, Uninitialized)
            | (Admission::Initialized, Initialized)
            | (Admission::Terminating, Initialized) => Ok(Gate::Run),
            (Admission::Terminating, Terminated) => Ok(Gate::Acknowledge),
            (Admission::Uninitialized, Initialized) => Err(DapError::ProtocolSequence(
                "session is already initialized".into(),
            )),
            (_, Uninitialized) => Err(DapError::ProtocolSequence(format!(
                "`{command}` received before `initialize`"
            ))),
            (_, Terminated) => Err(DapError::ProtocolSequence(format!(
                "`{command}` received after the session terminated"
            ))),
        }
    }
}

type ParseFn = fn(&DecodedRequest) -> DapResult<Message>;

/// Registered constructor for one command.
#[derive(Clone, Copy)]
pub struct CommandEntry {
    pub admission: Admission,
    pub parse: ParseFn,
}

fn parse_as<T: DapCommand>(request: &DecodedRequest) -> DapResult<Message> {
    T::parse(request).map(Into::into)
}

/// Lookup table from command name to [`CommandEntry`].
#[derive(Clone, Default)]
pub struct Registry {
    entries: HashMap<&'static str, CommandEntry>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every command this adapter supports.
    pub fn with_default_commands() -> Self {
        let mut registry = Self::new();
        messages::register_all(&mut registry);
        registry
    }

    pub fn register<T: DapCommand>(&mut self) -> &mut Self {
        let entry = CommandEntry {
            admission: T::ADMISSION,
            parse: parse_as::<T>,
        };
        if self.entries.insert(T::COMMAND, entry).is_some() {
            warn!(command = T::COMMAND, "command registered twice, keeping the latest");
        }
        self
    }

    pub fn lookup(&self, command: &str) -> Option<&CommandEntry> {
        self.entries.get(command)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
