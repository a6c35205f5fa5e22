//! Request dispatch: decode, look up, validate, admit, handle, respond.
//!
//! The [`Dispatcher`] owns one connection's [`SessionState`] and turns every
//! inbound payload into exactly one response followed by the handler's events.
//! No error, and no panic inside a handler, escapes it.

pub mod registry;

use crate::engine::SimulationEngine;
use crate::messages::{HandlerOutput, Message, Reply};
use crate::session::{SequenceCounter, SessionState};
use qdap_core::{DapError, DapResult, DecodedRequest, ProtocolMessage, RequestHeader, Response};
use registry::{Gate, Registry};
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Sequential request processor for one session.
pub struct Dispatcher<E: SimulationEngine> {
    registry: Registry,
    session: SessionState<E>,
    last_request_seq: Option<i64>,
}

impl<E: SimulationEngine> Dispatcher<E> {
    /// A dispatcher serving every built-in command.
    pub fn new(engine: E, seq: SequenceCounter) -> Self {
        Self::with_registry(Registry::with_default_commands(), engine, seq)
    }

    pub fn with_registry(registry: Registry, engine: E, seq: SequenceCounter) -> Self {
        debug!(commands = ?registry.commands(), "dispatcher ready");
        Self {
            registry,
            session: SessionState::new(engine, seq),
            last_request_seq: None,
        }
    }

    pub fn session(&self) -> &SessionState<E> {
        &self.session
    }

    /// Dispatch one framed payload.
    pub fn dispatch_raw(&mut self, payload: &[u8]) -> Vec<ProtocolMessage> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => self.dispatch(&value),
            Err(e) => vec![self.fail(
                &RequestHeader::default(),
                DapError::MalformedRequest(format!("invalid JSON: {e}")),
            )],
        }
    }

    /// Dispatch one decoded JSON value. The first returned message is always
    /// the response.
    pub fn dispatch(&mut self, value: &Value) -> Vec<ProtocolMessage> {
        let header = RequestHeader::peek(value);
        match self.process(value) {
            Ok(messages) => messages,
            Err(e) => vec![self.fail(&header, e)],
        }
    }

    fn process(&mut self, value: &Value) -> DapResult<Vec<ProtocolMessage>> {
        let request = DecodedRequest::from_value(value)?;
        self.check_sequence(request.seq)?;

        let entry = *self
            .registry
            .lookup(&request.command)
            .ok_or_else(|| DapError::UnknownCommand(request.command.clone()))?;
        let message = (entry.parse)(&request)?;
        message.validate()?;

        match entry.admission.check(self.session.phase(), &request.command)? {
            Gate::Run => {}
            Gate::Acknowledge => {
                debug!(
                    session_id = %self.session.id(),
                    seq = request.seq,
                    command = %request.command,
                    "session already terminated, acknowledging"
                );
                let response = Response::success(request.seq, &request.command, json!({}));
                return Ok(vec![response.with_seq(self.session.next_seq()).into()]);
            }
        }

        debug!(
            session_id = %self.session.id(),
            seq = request.seq,
            command = %request.command,
            "handling request"
        );
        let output = self.run_handler(&message, &request.command)?;
        Ok(self.emit(&request, output))
    }

    fn check_sequence(&mut self, seq: i64) -> DapResult<()> {
        if let Some(last) = self.last_request_seq {
            if seq <= last {
                return Err(DapError::ProtocolSequence(format!(
                    "request seq {seq} is not greater than previous seq {last}"
                )));
            }
        }
        self.last_request_seq = Some(seq);
        Ok(())
    }

    fn run_handler(
        &mut self,
        message: &Message,
        command: &str,
    ) -> DapResult<HandlerOutput> {
        let session = &mut self.session;
        match panic::catch_unwind(AssertUnwindSafe(|| message.handle(session))) {
            Ok(result) => result,
            Err(_) => {
                error!(session_id = %self.session.id(), command, "handler panicked");
                Err(DapError::HandlerExecution(format!(
                    "internal error while handling `{command}`"
                )))
            }
        }
    }

    /// Stamp the response, then the events, with outbound sequence numbers.
    fn emit(&mut self, request: &DecodedRequest, output: HandlerOutput) -> Vec<ProtocolMessage> {
        let response = match output.reply {
            Reply::Body(body) => Response::success(request.seq, &request.command, body),
            Reply::Full(response) => response,
        };
        let mut messages = Vec::with_capacity(1 + output.events.len());
        messages.push(response.with_seq(self.session.next_seq()).into());
        for event in output.events {
            messages.push(event.with_seq(self.session.next_seq()).into());
        }
        messages
    }

    fn fail(&self, header: &RequestHeader, error: DapError) -> ProtocolMessage {
        warn!(
            session_id = %self.session.id(),
            seq = header.seq,
            command = %header.command,
            kind = ?error.kind(),
            error = %error,
            "request failed"
        );
        Response::failure(header.seq, &header.command, error.to_string())
            .with_seq(self.session.next_seq())
            .into()
    }

    /// Release the engine handle if the client never sent `disconnect`.
    pub fn teardown(&mut self) {
        self.session.teardown();
    }
}
