//! `terminate`: ask the debuggee to end.

use super::{DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::SimulationEngine;
use crate::session::SessionState;
use qdap_core::{DapResult, DecodedRequest, Event};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TerminateArguments {
    restart: bool,
}

/// The `terminate` request.
///
/// The simulation state stays alive; the client follows up with
/// `disconnect`, which releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateMessage {
    pub seq: i64,
    pub restart: bool,
}

impl DapCommand for TerminateMessage {
    const COMMAND: &'static str = "terminate";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: TerminateArguments = request.optional_arguments()?;
        Ok(Self {
            seq: request.seq,
            restart: args.restart,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        info!(session_id = %session.id(), restart = self.restart, "terminate requested");
        Ok(HandlerOutput::empty().with_event(Event::new("terminated", None)))
    }
}
