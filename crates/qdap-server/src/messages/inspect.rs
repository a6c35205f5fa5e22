//! State inspection: `threads`, `stackTrace`, `scopes` and `variables`.

use super::{DapCommand, HandlerOutput, THREAD_ID};
use crate::dispatch::registry::Admission;
use crate::engine::{SimulationEngine, SimulationState};
use crate::session::SessionState;
use qdap_core::{DapError, DapResult, DecodedRequest};
use serde::Deserialize;
use serde_json::{json, Value};

/// The `threads` request. The simulation has a single thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadsMessage {
    pub seq: i64,
}

impl DapCommand for ThreadsMessage {
    const COMMAND: &'static str = "threads";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        Ok(Self { seq: request.seq })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn handle<E: SimulationEngine>(&self, _session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        Ok(HandlerOutput::body(json!({
            "threads": [{"id": THREAD_ID, "name": "main"}]
        })))
    }
}

thread_command! {
    /// `stackTrace`: the current instruction, then one frame per active gate
    /// call.
    StackTraceMessage => "stackTrace"
}

impl StackTraceMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let client = session.client().clone();
        let (state, program) = session.launched()?;

        let count = state.instruction_count();
        if count == 0 {
            return Ok(HandlerOutput::body(json!({"stackFrames": [], "totalFrames": 0})));
        }

        let depth = state.stack_depth()?;
        let finished = state.is_finished();
        let mut frames = Vec::with_capacity(depth);
        for (index, &instruction) in state.stack_trace(depth)?.iter().enumerate() {
            // A finished program has no current instruction; show the last one.
            let at_end = index == 0 && finished;
            let shown = if at_end { count - 1 } else { instruction };
            let (start, end) = state.instruction_position(shown)?;
            let (line, column) = program.line_col_of(start);
            let (end_line, end_column) = program.line_col_of(end + 1);
            let name = if at_end {
                "<end of program>".to_string()
            } else {
                program.snippet(start, end).to_string()
            };
            frames.push(json!({
                "id": index + 1,
                "name": name,
                "source": {
                    "name": program.name(),
                    "path": program.path,
                },
                "line": client.line_to_client(line),
                "column": client.column_to_client(column),
                "endLine": client.line_to_client(end_line),
                "endColumn": client.column_to_client(end_column),
            }));
        }

        Ok(HandlerOutput::body(json!({
            "stackFrames": frames,
            "totalFrames": depth,
        })))
    }
}

/// `variablesReference` of the classical bits.
pub const CLASSICAL_VARIABLES: i64 = 1;
/// `variablesReference` of the statevector amplitudes.
pub const QUANTUM_STATE: i64 = 2;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScopesArguments {
    frame_id: i64,
}

/// The `scopes` request. Every frame sees the same global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopesMessage {
    pub seq: i64,
    pub frame_id: i64,
}

impl DapCommand for ScopesMessage {
    const COMMAND: &'static str = "scopes";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: ScopesArguments = request.require_arguments()?;
        Ok(Self {
            seq: request.seq,
            frame_id: args.frame_id,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn validate(&self) -> DapResult<()> {
        if self.frame_id < 1 {
            return Err(DapError::Validation(format!("invalid frame id {}", self.frame_id)));
        }
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        let depth = state.stack_depth()?;
        if self.frame_id as usize > depth {
            return Err(DapError::Validation(format!(
                "unknown frame {}; the stack has {depth} frames",
                self.frame_id
            )));
        }
        Ok(HandlerOutput::body(json!({
            "scopes": [
                {
                    "name": "Classical Variables",
                    "variablesReference": CLASSICAL_VARIABLES,
                    "namedVariables": state.classical_variable_count(),
                    "expensive": false,
                },
                {
                    "name": "Quantum State",
                    "variablesReference": QUANTUM_STATE,
                    "indexedVariables": 1usize << state.num_qubits(),
                    "expensive": false,
                },
            ]
        })))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VariablesArguments {
    variables_reference: i64,
    start: Option<i64>,
    count: Option<i64>,
}

/// The `variables` request: classical bits or statevector amplitudes,
/// optionally paged with `start` and `count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablesMessage {
    pub seq: i64,
    pub variables_reference: i64,
    pub start: i64,
    /// Zero means all remaining entries.
    pub count: i64,
}

impl DapCommand for VariablesMessage {
    const COMMAND: &'static str = "variables";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: VariablesArguments = request.require_arguments()?;
        Ok(Self {
            seq: request.seq,
            variables_reference: args.variables_reference,
            start: args.start.unwrap_or(0),
            count: args.count.unwrap_or(0),
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn validate(&self) -> DapResult<()> {
        if ![CLASSICAL_VARIABLES, QUANTUM_STATE].contains(&self.variables_reference) {
            return Err(DapError::Validation(format!(
                "unknown variables reference {}",
                self.variables_reference
            )));
        }
        if self.start < 0 || self.count < 0 {
            return Err(DapError::Validation("`start` and `count` must not be negative".into()));
        }
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        let total = if self.variables_reference == CLASSICAL_VARIABLES {
            state.classical_variable_count()
        } else {
            1usize << state.num_qubits()
        };
        let start = (self.start as usize).min(total);
        let end = match self.count {
            0 => total,
            count => start.saturating_add(count as usize).min(total),
        };

        let mut variables = Vec::with_capacity(end - start);
        for index in start..end {
            variables.push(if self.variables_reference == CLASSICAL_VARIABLES {
                classical(&*state, index)?
            } else {
                amplitude(&*state, index)?
            });
        }
        Ok(HandlerOutput::body(json!({ "variables": variables })))
    }
}

fn classical<S: SimulationState>(state: &S, index: usize) -> DapResult<Value> {
    let name = state.classical_variable_name(index)?;
    let variable = state.classical_variable(&name)?;
    Ok(json!({
        "name": variable.name,
        "value": if variable.value { "1" } else { "0" },
        "type": "bool",
        "variablesReference": 0,
    }))
}

fn amplitude<S: SimulationState>(state: &S, index: usize) -> DapResult<Value> {
    let width = state.num_qubits();
    Ok(json!({
        "name": format!("|{index:0width$b}>"),
        "value": state.amplitude_index(index)?.to_string(),
        "type": "complex",
        "variablesReference": 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TraceEngine;
    use crate::messages::test_support::{open_session, request};
    use crate::messages::Reply;
    use crate::session::{ClientInfo, Program};

    fn launched(code: &str) -> SessionState<TraceEngine> {
        let mut session = open_session(ClientInfo {
            lines_start_at1: true,
            columns_start_at1: true,
            ..Default::default()
        });
        session.engine_state().unwrap().load_code(code).unwrap();
        session.set_program(Program::new("/work/bell.qasm", code));
        session
    }

    fn body(output: HandlerOutput) -> Value {
        match output.reply {
            Reply::Body(body) => body,
            Reply::Full(_) => panic!("expected a body"),
        }
    }

    fn stack_trace() -> StackTraceMessage {
        StackTraceMessage::parse(&request(4, "stackTrace", Some(json!({"threadId": 1})))).unwrap()
    }

    #[test]
    fn single_thread() {
        let mut session = open_session(ClientInfo::default());
        let output = ThreadsMessage { seq: 1 }.handle(&mut session).unwrap();
        assert_eq!(body(output), json!({"threads": [{"id": 1, "name": "main"}]}));
    }

    #[test]
    fn frame_points_at_current_instruction() {
        let mut session = launched("qreg q[2];\n  h q[0];\n");
        session.engine_state().unwrap().step_forward().unwrap();

        let frames = body(stack_trace().handle(&mut session).unwrap());
        let frame = &frames["stackFrames"][0];
        assert_eq!(frame["name"], "h q[0];");
        assert_eq!(frame["line"], 2);
        assert_eq!(frame["column"], 3);
        assert_eq!(frame["endColumn"], 10);
        assert_eq!(frame["source"]["name"], "bell.qasm");
        assert_eq!(frame["source"]["path"], "/work/bell.qasm");
        assert_eq!(frames["totalFrames"], 1);
    }

    #[test]
    fn finished_program_shows_end_marker() {
        let mut session = launched("qreg q[1];\nh q[0];\n");
        session.engine_state().unwrap().run_simulation().unwrap();
        let frames = body(stack_trace().handle(&mut session).unwrap());
        assert_eq!(frames["stackFrames"][0]["name"], "<end of program>");
        assert_eq!(frames["stackFrames"][0]["line"], 2);
    }

    #[test]
    fn empty_program_has_no_frames() {
        let mut session = launched("// nothing here\n");
        let frames = body(stack_trace().handle(&mut session).unwrap());
        assert_eq!(frames, json!({"stackFrames": [], "totalFrames": 0}));
    }

    #[test]
    fn requires_launch() {
        let mut session = open_session(ClientInfo::default());
        let err = stack_trace().handle(&mut session).unwrap_err();
        assert!(matches!(err, DapError::HandlerExecution(_)));
    }

    const CALLS: &str = "qreg q[2];\ncreg c[2];\ngate flip a {\n  x a;\n}\nflip q[1];\nmeasure q -> c;\n";

    #[test]
    fn gate_calls_add_frames() {
        let mut session = launched(CALLS);
        let state = session.engine_state().unwrap();
        for _ in 0..4 {
            state.step_forward().unwrap();
        }

        let frames = body(stack_trace().handle(&mut session).unwrap());
        assert_eq!(frames["totalFrames"], 2);
        assert_eq!(frames["stackFrames"][0]["name"], "x a;");
        assert_eq!(frames["stackFrames"][0]["line"], 4);
        assert_eq!(frames["stackFrames"][1]["id"], 2);
        assert_eq!(frames["stackFrames"][1]["name"], "flip q[1];");
        assert_eq!(frames["stackFrames"][1]["line"], 6);
    }

    fn scopes(frame_id: i64) -> ScopesMessage {
        ScopesMessage::parse(&request(5, "scopes", Some(json!({"frameId": frame_id})))).unwrap()
    }

    fn variables(arguments: Value) -> VariablesMessage {
        VariablesMessage::parse(&request(6, "variables", Some(arguments))).unwrap()
    }

    #[test]
    fn scopes_describe_bits_and_amplitudes() {
        let mut session = launched(CALLS);
        let output = body(scopes(1).handle(&mut session).unwrap());
        assert_eq!(output["scopes"][0]["name"], "Classical Variables");
        assert_eq!(output["scopes"][0]["namedVariables"], 2);
        assert_eq!(output["scopes"][1]["variablesReference"], QUANTUM_STATE);
        assert_eq!(output["scopes"][1]["indexedVariables"], 4);

        assert!(matches!(scopes(0).validate(), Err(DapError::Validation(_))));
        assert!(matches!(
            scopes(2).handle(&mut session),
            Err(DapError::Validation(_))
        ));
    }

    #[test]
    fn variables_list_bits_and_page_amplitudes() {
        let mut session = launched(CALLS);
        session.engine_state().unwrap().run_simulation().unwrap();

        let bits = body(variables(json!({"variablesReference": 1})).handle(&mut session).unwrap());
        assert_eq!(
            bits["variables"],
            json!([
                {"name": "c[0]", "value": "0", "type": "bool", "variablesReference": 0},
                {"name": "c[1]", "value": "1", "type": "bool", "variablesReference": 0},
            ])
        );

        let page = body(
            variables(json!({"variablesReference": 2, "start": 1, "count": 2}))
                .handle(&mut session)
                .unwrap(),
        );
        let names: Vec<_> = page["variables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["|01>", "|10>"]);
        assert_eq!(page["variables"][1]["value"], "1.0000 + 0.0000i");
        assert_eq!(page["variables"][0]["type"], "complex");

        let past_end = body(
            variables(json!({"variablesReference": 2, "start": 9}))
                .handle(&mut session)
                .unwrap(),
        );
        assert_eq!(past_end["variables"], json!([]));
    }

    #[test]
    fn unknown_variables_reference_is_rejected() {
        assert!(matches!(
            variables(json!({"variablesReference": 7})).validate(),
            Err(DapError::Validation(_))
        ));
        assert!(matches!(
            variables(json!({"variablesReference": 1, "count": -1})).validate(),
            Err(DapError::Validation(_))
        ));
    }
}
