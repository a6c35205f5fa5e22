//! `setBreakpoints`: replace the breakpoints of a source file.

use super::{DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::{SimulationEngine, SimulationState};
use crate::session::{Breakpoint, ClientInfo, Program, RequestedBreakpoint, SessionState};
use qdap_core::{DapError, DapResult, DecodedRequest, Event};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SetBreakpointsArguments {
    source: SourceArgument,
    breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Deprecated form carrying only line numbers.
    lines: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceArgument {
    path: String,
}

#[derive(Debug, Deserialize)]
struct SourceBreakpoint {
    line: i64,
    #[serde(default)]
    column: Option<i64>,
}

/// The `setBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBreakpointsMessage {
    pub seq: i64,
    pub source: PathBuf,
    pub breakpoints: Vec<RequestedBreakpoint>,
}

impl DapCommand for SetBreakpointsMessage {
    const COMMAND: &'static str = "setBreakpoints";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: SetBreakpointsArguments = request.require_arguments()?;
        let breakpoints = match (args.breakpoints, args.lines) {
            (Some(list), _) => list
                .into_iter()
                .map(|b| RequestedBreakpoint {
                    line: b.line,
                    column: b.column,
                })
                .collect(),
            (None, Some(lines)) => lines
                .into_iter()
                .map(|line| RequestedBreakpoint { line, column: None })
                .collect(),
            (None, None) => Vec::new(),
        };
        Ok(Self {
            seq: request.seq,
            source: PathBuf::from(args.source.path),
            breakpoints,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn validate(&self) -> DapResult<()> {
        if self.source.as_os_str().is_empty() {
            return Err(DapError::Validation("`source.path` is required".into()));
        }
        if let Some(bp) = self.breakpoints.iter().find(|bp| bp.line < 0) {
            return Err(DapError::Validation(format!(
                "breakpoint line must not be negative, was {}",
                bp.line
            )));
        }
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let stored = session.store_breakpoints(&self.source, &self.breakpoints);

        let launched_here = session.program().map(|p| p.is_source(&self.source));
        let results = match launched_here {
            None => unverified(&stored, "pending until launch"),
            Some(false) => {
                debug!(
                    session_id = %session.id(),
                    source = %self.source.display(),
                    "breakpoints for a file that is not being debugged"
                );
                unverified(&stored, "source is not the launched program")
            }
            Some(true) => {
                let client = session.client().clone();
                let (state, program) = session.launched()?;
                place_all(state, program, &client, &stored)?
            }
        };

        Ok(HandlerOutput::body(json!({ "breakpoints": results })))
    }
}

fn unverified(breakpoints: &[Breakpoint], message: &str) -> Vec<Value> {
    breakpoints
        .iter()
        .map(|bp| {
            json!({
                "id": bp.id,
                "verified": false,
                "line": bp.line,
                "message": message,
            })
        })
        .collect()
}

/// Replace the engine's breakpoints with `breakpoints`, returning one DAP
/// `Breakpoint` per entry in order.
pub(crate) fn place_all<S: SimulationState>(
    state: &mut S,
    program: &Program,
    client: &ClientInfo,
    breakpoints: &[Breakpoint],
) -> DapResult<Vec<Value>> {
    state.clear_breakpoints()?;
    let results = breakpoints
        .iter()
        .map(|bp| match place(&mut *state, program, client, bp) {
            Ok((line, column)) => json!({
                "id": bp.id,
                "verified": true,
                "line": line,
                "column": column,
            }),
            Err(message) => json!({
                "id": bp.id,
                "verified": false,
                "line": bp.line,
                "message": message,
            }),
        })
        .collect();
    Ok(results)
}

/// Place one breakpoint, returning the client line/column it snapped to.
fn place<S: SimulationState>(
    state: &mut S,
    program: &Program,
    client: &ClientInfo,
    bp: &Breakpoint,
) -> Result<(i64, i64), String> {
    let line = client
        .line_from_client(bp.line)
        .ok_or_else(|| format!("line {} is out of range", bp.line))?;
    let column = bp
        .column
        .and_then(|c| client.column_from_client(c))
        .unwrap_or(0);
    let offset = program
        .offset_of(line, column)
        .ok_or_else(|| format!("line {} is past the end of the file", bp.line))?;

    let instruction = state.set_breakpoint(offset).map_err(|e| e.to_string())?;
    let (start, _) = state
        .instruction_position(instruction)
        .map_err(|e| e.to_string())?;
    let (line, column) = program.line_col_of(start);
    Ok((client.line_to_client(line), client.column_to_client(column)))
}

/// A `breakpoint` event announcing a changed breakpoint.
pub(crate) fn breakpoint_changed(breakpoint: Value) -> Event {
    Event::new(
        "breakpoint",
        Some(json!({"reason": "changed", "breakpoint": breakpoint})),
    )
}
