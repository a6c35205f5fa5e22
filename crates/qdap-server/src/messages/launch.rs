//! `launch`: load a program into the simulation state.

use super::breakpoints::{breakpoint_changed, place_all};
use super::{execution, DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::{SimulationEngine, SimulationState};
use crate::session::{Program, SessionState};
use qdap_core::{DapError, DapResult, DecodedRequest};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LaunchArguments {
    program: String,
    stop_on_entry: bool,
    no_debug: bool,
}

/// The `launch` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchMessage {
    pub seq: i64,
    pub program: PathBuf,
    pub stop_on_entry: bool,
    pub no_debug: bool,
}

impl DapCommand for LaunchMessage {
    const COMMAND: &'static str = "launch";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: LaunchArguments = request.require_arguments()?;
        Ok(Self {
            seq: request.seq,
            program: PathBuf::from(args.program),
            stop_on_entry: args.stop_on_entry,
            no_debug: args.no_debug,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn validate(&self) -> DapResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(DapError::Validation("`program` must name a file".into()));
        }
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        if session.program().is_some() {
            return Err(DapError::ProtocolSequence(
                "a program has already been launched".into(),
            ));
        }

        let source = std::fs::read_to_string(&self.program).map_err(|e| {
            DapError::HandlerExecution(format!("cannot read {}: {e}", self.program.display()))
        })?;
        let mut program = Program::new(&self.program, source);
        program.stop_on_entry = self.stop_on_entry;
        program.no_debug = self.no_debug;

        // The program is only recorded once everything below has succeeded,
        // so a failed launch can be retried.
        let session_id = session.id().to_string();
        let client = session.client().clone();
        let pending = session.breakpoints_for(&program.path).to_vec();
        let configured = session.is_configured();
        let state = session.engine_state()?;
        state.load_code(&program.source)?;
        info!(
            session_id = %session_id,
            program = %self.program.display(),
            instructions = state.instruction_count(),
            "program launched"
        );

        // Breakpoints sent ahead of the launch only become placeable now.
        let breakpoint_events: Vec<_> = place_all(&mut *state, &program, &client, &pending)?
            .into_iter()
            .map(breakpoint_changed)
            .collect();
        let events = if configured {
            execution::run_from_start(state, &program, &session_id)?
        } else {
            Vec::new()
        };

        session.set_program(program);
        Ok(HandlerOutput::empty()
            .with_events(breakpoint_events)
            .with_events(events))
    }
}
