//! Message model: one typed request per DAP command.
//!
//! Each command is a struct implementing [`DapCommand`]; [`Message`] is the
//! closed set of all of them. Adding a command means adding a struct and a
//! line to the `messages!` invocation below.

use crate::dispatch::registry::{Admission, Registry};
use crate::engine::SimulationEngine;
use crate::session::SessionState;
use qdap_core::{DapError, DapResult, DecodedRequest, Event, Response};
use serde::Deserialize;
use serde_json::{json, Value};

/// The only thread the simulation engine exposes.
pub const THREAD_ID: i64 = 1;

/// A request for one command: parse, validate, handle.
pub trait DapCommand: Sized + Into<Message> {
    /// Command name as it appears on the wire.
    const COMMAND: &'static str;
    /// Session phases in which the command is admitted.
    const ADMISSION: Admission;

    /// Extract the command's fields from a decoded request.
    fn parse(request: &DecodedRequest) -> DapResult<Self>;

    fn sequence_number(&self) -> i64;

    /// Check preconditions on the parsed fields. Must not have side effects.
    fn validate(&self) -> DapResult<()> {
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput>;
}

/// What a handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A body to wrap in the default success envelope.
    Body(Value),
    /// A complete response built by the handler.
    Full(Response),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub reply: Reply,
    /// Events to send after the response, in order.
    pub events: Vec<Event>,
}

impl HandlerOutput {
    pub fn body(body: Value) -> Self {
        Self {
            reply: Reply::Body(body),
            events: Vec::new(),
        }
    }

    /// Default success envelope with an empty body.
    pub fn empty() -> Self {
        Self::body(json!({}))
    }

    pub fn full(response: Response) -> Self {
        Self {
            reply: Reply::Full(response),
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }
}

/// Arguments of commands addressed to a thread.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ThreadArguments {
    pub thread_id: i64,
}

impl Default for ThreadArguments {
    fn default() -> Self {
        Self {
            thread_id: THREAD_ID,
        }
    }
}

pub(crate) fn validate_thread(thread_id: i64) -> DapResult<()> {
    if thread_id == THREAD_ID {
        Ok(())
    } else {
        Err(DapError::Validation(format!(
            "unknown thread {thread_id}; the only thread is {THREAD_ID}"
        )))
    }
}

/// A `stopped` event for the single thread.
pub(crate) fn stopped_event(reason: &str, description: Option<&str>) -> Event {
    let mut body = json!({
        "reason": reason,
        "threadId": THREAD_ID,
        "allThreadsStopped": true,
    });
    if let Some(description) = description {
        body["description"] = json!(description);
    }
    Event::new("stopped", Some(body))
}

/// `exited` followed by `terminated`, sent when the program runs to its end.
pub(crate) fn program_end_events(exit_code: i64) -> Vec<Event> {
    vec![
        Event::new("exited", Some(json!({"exitCode": exit_code}))),
        Event::new("terminated", None),
    ]
}

/// Declares a command struct addressed to a thread, with its parse and
/// validate steps. The struct provides `fn run(&self, session)`.
macro_rules! thread_command {
    ($(#[$doc:meta])* $name:ident => $command:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub seq: i64,
            pub thread_id: i64,
        }

        impl $crate::messages::DapCommand for $name {
            const COMMAND: &'static str = $command;
            const ADMISSION: $crate::dispatch::registry::Admission =
                $crate::dispatch::registry::Admission::Initialized;

            fn parse(request: &qdap_core::DecodedRequest) -> qdap_core::DapResult<Self> {
                let args: $crate::messages::ThreadArguments = request.optional_arguments()?;
                Ok(Self {
                    seq: request.seq,
                    thread_id: args.thread_id,
                })
            }

            fn sequence_number(&self) -> i64 {
                self.seq
            }

            fn validate(&self) -> qdap_core::DapResult<()> {
                $crate::messages::validate_thread(self.thread_id)
            }

            fn handle<E: $crate::engine::SimulationEngine>(
                &self,
                session: &mut $crate::session::SessionState<E>,
            ) -> qdap_core::DapResult<$crate::messages::HandlerOutput> {
                self.run(session)
            }
        }
    };
}

mod breakpoints;
mod configuration_done;
mod disconnect;
mod execution;
mod initialize;
mod inspect;
mod launch;
mod terminate;

pub use breakpoints::SetBreakpointsMessage;
pub use configuration_done::ConfigurationDoneMessage;
pub use disconnect::DisconnectMessage;
pub use execution::{
    ContinueMessage, NextMessage, PauseMessage, RestartMessage, ReverseContinueMessage,
    StepBackMessage, StepInMessage, StepOutMessage,
};
pub use initialize::InitializeMessage;
pub use inspect::{ScopesMessage, StackTraceMessage, ThreadsMessage, VariablesMessage};
pub use launch::LaunchMessage;
pub use terminate::TerminateMessage;

macro_rules! messages {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// A parsed request for one of the supported commands.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($variant($ty)),+
        }

        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Message::$variant(m)
                }
            }
        )+

        impl Message {
            pub fn sequence_number(&self) -> i64 {
                match self {
                    $(Message::$variant(m) => m.sequence_number()),+
                }
            }

            pub fn command_name(&self) -> &'static str {
                match self {
                    $(Message::$variant(_) => <$ty as DapCommand>::COMMAND),+
                }
            }

            pub fn validate(&self) -> DapResult<()> {
                match self {
                    $(Message::$variant(m) => m.validate()),+
                }
            }

            pub fn handle<E: SimulationEngine>(
                &self,
                session: &mut SessionState<E>,
            ) -> DapResult<HandlerOutput> {
                match self {
                    $(Message::$variant(m) => m.handle(session)),+
                }
            }
        }

        /// Register every supported command.
        pub(crate) fn register_all(registry: &mut Registry) {
            $(registry.register::<$ty>();)+
        }
    };
}

messages! {
    Initialize(InitializeMessage),
    Launch(LaunchMessage),
    SetBreakpoints(SetBreakpointsMessage),
    ConfigurationDone(ConfigurationDoneMessage),
    Threads(ThreadsMessage),
    StackTrace(StackTraceMessage),
    Scopes(ScopesMessage),
    Variables(VariablesMessage),
    Next(NextMessage),
    StepIn(StepInMessage),
    StepOut(StepOutMessage),
    StepBack(StepBackMessage),
    Continue(ContinueMessage),
    ReverseContinue(ReverseContinueMessage),
    Pause(PauseMessage),
    Restart(RestartMessage),
    Terminate(TerminateMessage),
    Disconnect(DisconnectMessage),
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::TraceEngine;
    use crate::session::{ClientInfo, SequenceCounter};
    use qdap_core::Capabilities;

    pub fn request(seq: i64, command: &str, arguments: Option<Value>) -> DecodedRequest {
        let mut value = json!({"seq": seq, "type": "request", "command": command});
        if let Some(arguments) = arguments {
            value["arguments"] = arguments;
        }
        DecodedRequest::from_value(&value).unwrap()
    }

    /// A session past `initialize`.
    pub fn open_session(client: ClientInfo) -> SessionState<TraceEngine> {
        let mut session = SessionState::new(TraceEngine::new(), SequenceCounter::new());
        session.open(client, Capabilities::default()).unwrap();
        session
    }
}
