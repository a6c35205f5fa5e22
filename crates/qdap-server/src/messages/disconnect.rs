//! `disconnect`: destroy the simulation state and end the session.

use super::{DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::SimulationEngine;
use crate::session::SessionState;
use qdap_core::{DapResult, DecodedRequest};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DisconnectArguments {
    restart: bool,
    terminate_debuggee: Option<bool>,
}

/// The `disconnect` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectMessage {
    pub seq: i64,
    pub restart: bool,
    pub terminate_debuggee: Option<bool>,
}

impl DapCommand for DisconnectMessage {
    const COMMAND: &'static str = "disconnect";
    const ADMISSION: Admission = Admission::Terminating;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: DisconnectArguments = request.optional_arguments()?;
        Ok(Self {
            seq: request.seq,
            restart: args.restart,
            terminate_debuggee: args.terminate_debuggee,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        debug!(
            session_id = %session.id(),
            restart = self.restart,
            terminate_debuggee = ?self.terminate_debuggee,
            "disconnect requested"
        );
        session.close()?;
        Ok(HandlerOutput::empty())
    }
}
