//! `configurationDone`: the client has finished sending configuration.

use super::{execution, DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::SimulationEngine;
use crate::session::SessionState;
use qdap_core::{DapResult, DecodedRequest};
use tracing::debug;

/// The `configurationDone` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDoneMessage {
    pub seq: i64,
}

impl DapCommand for ConfigurationDoneMessage {
    const COMMAND: &'static str = "configurationDone";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        Ok(Self { seq: request.seq })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        if session.is_configured() {
            debug!(session_id = %session.id(), "repeated configurationDone ignored");
            return Ok(HandlerOutput::empty());
        }
        session.mark_configured();
        let events = execution::start(session)?;
        Ok(HandlerOutput::empty().with_events(events))
    }
}
