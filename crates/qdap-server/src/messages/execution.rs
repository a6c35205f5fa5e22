//! Execution control: stepping, running, pausing and restarting.

use super::{program_end_events, stopped_event, DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::{SimulationEngine, SimulationState};
use crate::session::{Program, SessionState};
use qdap_core::{DapResult, DecodedRequest, Event};
use serde_json::json;
use tracing::debug;

/// Start the launched program once both `launch` and `configurationDone`
/// have arrived. Returns the events describing where execution stopped, or
/// nothing if the session is not ready yet.
pub(crate) fn start<E: SimulationEngine>(session: &mut SessionState<E>) -> DapResult<Vec<Event>> {
    if !session.is_configured() || session.program().is_none() {
        return Ok(Vec::new());
    }
    let session_id = session.id().to_string();
    let (state, program) = session.launched()?;
    run_from_start(state, program, &session_id)
}

/// Run a freshly loaded program according to its launch options.
pub(crate) fn run_from_start<S: SimulationState>(
    state: &mut S,
    program: &Program,
    session_id: &str,
) -> DapResult<Vec<Event>> {
    if program.no_debug {
        debug!(session_id = %session_id, "running without debugging");
        state.clear_breakpoints()?;
        let failed = state.run_all()?;
        let mut events = Vec::new();
        if failed > 0 {
            events.push(Event::new(
                "output",
                Some(json!({
                    "category": "stderr",
                    "output": format!("{failed} assertion(s) failed\n"),
                })),
            ));
        }
        events.extend(program_end_events(i64::from(failed > 0)));
        return Ok(events);
    }
    if program.stop_on_entry {
        return Ok(vec![stopped_event("entry", None)]);
    }
    state.run_simulation()?;
    Ok(events_after_run(state, true))
}

/// Events describing where a run in the given direction came to rest.
pub(crate) fn events_after_run<S: SimulationState>(state: &S, forward: bool) -> Vec<Event> {
    if state.did_assertion_fail() {
        vec![assertion_failed()]
    } else if state.was_breakpoint_hit() {
        vec![stopped_event("breakpoint", None)]
    } else if forward && state.is_finished() {
        program_end_events(0)
    } else if !forward && !state.can_step_backward() {
        vec![stopped_event("entry", None)]
    } else {
        vec![stopped_event("pause", None)]
    }
}

fn assertion_failed() -> Event {
    stopped_event("exception", Some("assertion failed"))
}

fn after_step<S: SimulationState>(state: &S) -> Event {
    if state.did_assertion_fail() {
        assertion_failed()
    } else if state.is_finished() {
        stopped_event("step", Some("end of program"))
    } else {
        stopped_event("step", None)
    }
}

thread_command! {
    /// `next`: execute one instruction, stepping over compound operations.
    NextMessage => "next"
}

impl NextMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.step_over_forward()?;
        Ok(HandlerOutput::empty().with_event(after_step(state)))
    }
}

thread_command! {
    /// `stepIn`: execute one instruction.
    StepInMessage => "stepIn"
}

impl StepInMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.step_forward()?;
        Ok(HandlerOutput::empty().with_event(after_step(state)))
    }
}

thread_command! {
    /// `stepOut`: run forward out of the current compound operation.
    StepOutMessage => "stepOut"
}

impl StepOutMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.step_out_forward()?;
        Ok(HandlerOutput::empty().with_events(events_after_run(state, true)))
    }
}

thread_command! {
    /// `stepBack`: undo one instruction.
    StepBackMessage => "stepBack"
}

impl StepBackMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.step_over_backward()?;
        Ok(HandlerOutput::empty().with_event(stopped_event("step", None)))
    }
}

thread_command! {
    /// `continue`: run until a breakpoint or the end of the program.
    ContinueMessage => "continue"
}

impl ContinueMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.run_simulation()?;
        Ok(HandlerOutput::body(json!({"allThreadsContinued": true}))
            .with_events(events_after_run(state, true)))
    }
}

thread_command! {
    /// `reverseContinue`: run backward until a breakpoint or the start.
    ReverseContinueMessage => "reverseContinue"
}

impl ReverseContinueMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.run_simulation_backward()?;
        Ok(HandlerOutput::empty().with_events(events_after_run(state, false)))
    }
}

thread_command! {
    /// `pause`: interrupt a run.
    PauseMessage => "pause"
}

impl PauseMessage {
    fn run<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.pause_simulation()?;
        Ok(HandlerOutput::empty().with_event(stopped_event("pause", None)))
    }
}

/// `restart`: rewind the program to its first instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartMessage {
    pub seq: i64,
}

impl DapCommand for RestartMessage {
    const COMMAND: &'static str = "restart";
    const ADMISSION: Admission = Admission::Initialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        Ok(Self { seq: request.seq })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let (state, _) = session.launched()?;
        state.reset_simulation()?;
        Ok(HandlerOutput::empty().with_event(stopped_event("entry", None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TraceEngine;
    use crate::messages::test_support::{open_session, request};
    use crate::session::ClientInfo;
    use qdap_core::DapError;

    const CODE: &str = "qreg q[2];\nh q[0];\ncx q[0], q[1];\n";

    const ASSERTING: &str = "qreg q[2];\nh q[0];\nassert-ent q[0], q[1];\nassert-sup q[1];\n";

    fn launched(stop_on_entry: bool) -> SessionState<TraceEngine> {
        launched_with(CODE, stop_on_entry)
    }

    fn launched_with(code: &str, stop_on_entry: bool) -> SessionState<TraceEngine> {
        let mut session = open_session(ClientInfo::default());
        session.engine_state().unwrap().load_code(code).unwrap();
        let mut program = Program::new("/tmp/bell.qasm", code);
        program.stop_on_entry = stop_on_entry;
        session.set_program(program);
        session
    }

    fn event_names(output: &HandlerOutput) -> Vec<&str> {
        output.events.iter().map(|e| e.event.as_str()).collect()
    }

    fn reason(event: &Event) -> &str {
        event.body.as_ref().unwrap()["reason"].as_str().unwrap()
    }

    #[test]
    fn start_waits_for_configuration_done() {
        let mut session = launched(true);
        assert!(start(&mut session).unwrap().is_empty());

        session.mark_configured();
        let events = start(&mut session).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(reason(&events[0]), "entry");
    }

    #[test]
    fn start_without_stop_on_entry_runs_to_the_end() {
        let mut session = launched(false);
        session.mark_configured();
        let names: Vec<_> = start(&mut session).unwrap().into_iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["exited", "terminated"]);
    }

    #[test]
    fn no_debug_ignores_breakpoints() {
        let mut session = launched(false);
        let pos = CODE.find("cx").unwrap();
        session.engine_state().unwrap().set_breakpoint(pos).unwrap();
        let mut program = session.program().unwrap().clone();
        program.no_debug = true;
        session.set_program(program);
        session.mark_configured();

        let names: Vec<_> = start(&mut session).unwrap().into_iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["exited", "terminated"]);
        assert!(session.engine_state().unwrap().is_finished());
    }

    #[test]
    fn failed_assertion_stops_with_an_exception() {
        let mut session = launched_with(ASSERTING, false);
        session.mark_configured();
        let events = start(&mut session).unwrap();
        assert_eq!(reason(&events[0]), "exception");
        assert_eq!(events[0].body.as_ref().unwrap()["description"], "assertion failed");
        assert_eq!(session.engine_state().unwrap().current_instruction(), 2);

        // Continuing passes the assertion and stops on the next failing one.
        let cont = ContinueMessage::parse(&request(6, "continue", None)).unwrap();
        let output = cont.handle(&mut session).unwrap();
        assert_eq!(reason(&output.events[0]), "exception");
        assert_eq!(session.engine_state().unwrap().current_instruction(), 3);

        let step = StepInMessage::parse(&request(7, "stepIn", None)).unwrap();
        let output = step.handle(&mut session).unwrap();
        assert_eq!(reason(&output.events[0]), "step");
        assert!(session.engine_state().unwrap().is_finished());
    }

    #[test]
    fn no_debug_reports_failed_assertions_in_the_exit_code() {
        let mut session = launched_with(ASSERTING, false);
        let mut program = session.program().unwrap().clone();
        program.no_debug = true;
        session.set_program(program);
        session.mark_configured();

        let events = start(&mut session).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["output", "exited", "terminated"]);
        assert_eq!(events[0].body.as_ref().unwrap()["output"], "2 assertion(s) failed\n");
        assert_eq!(events[1].body.as_ref().unwrap()["exitCode"], 1);
    }

    #[test]
    fn next_emits_step_and_reports_end_of_program() {
        let mut session = launched(true);
        let next = NextMessage::parse(&request(5, "next", None)).unwrap();

        let output = next.handle(&mut session).unwrap();
        assert_eq!(event_names(&output), vec!["stopped"]);
        assert_eq!(reason(&output.events[0]), "step");
        assert_eq!(session.engine_state().unwrap().current_instruction(), 1);

        next.handle(&mut session).unwrap();
        let last = next.handle(&mut session).unwrap();
        assert_eq!(
            last.events[0].body.as_ref().unwrap()["description"],
            "end of program"
        );

        let err = next.handle(&mut session).unwrap_err();
        assert!(matches!(err, DapError::HandlerExecution(_)));
    }

    #[test]
    fn continue_stops_at_breakpoint_then_ends() {
        let mut session = launched(true);
        let pos = CODE.find("cx").unwrap();
        session.engine_state().unwrap().set_breakpoint(pos).unwrap();

        let cont = ContinueMessage::parse(&request(6, "continue", None)).unwrap();
        let output = cont.handle(&mut session).unwrap();
        assert_eq!(output.reply, crate::messages::Reply::Body(json!({"allThreadsContinued": true})));
        assert_eq!(reason(&output.events[0]), "breakpoint");

        let output = cont.handle(&mut session).unwrap();
        assert_eq!(event_names(&output), vec!["exited", "terminated"]);
    }

    #[test]
    fn reverse_continue_returns_to_entry() {
        let mut session = launched(true);
        session.engine_state().unwrap().run_simulation().unwrap();

        let back = StepBackMessage::parse(&request(7, "stepBack", None)).unwrap();
        back.handle(&mut session).unwrap();
        assert_eq!(session.engine_state().unwrap().current_instruction(), 2);

        let rev = ReverseContinueMessage::parse(&request(8, "reverseContinue", None)).unwrap();
        let output = rev.handle(&mut session).unwrap();
        assert_eq!(reason(&output.events[0]), "entry");
        assert_eq!(session.engine_state().unwrap().current_instruction(), 0);
    }

    #[test]
    fn restart_rewinds() {
        let mut session = launched(true);
        session.engine_state().unwrap().step_forward().unwrap();
        let restart = RestartMessage::parse(&request(9, "restart", None)).unwrap();
        let output = restart.handle(&mut session).unwrap();
        assert_eq!(reason(&output.events[0]), "entry");
        assert_eq!(session.engine_state().unwrap().current_instruction(), 0);
    }

    #[test]
    fn pause_reports_stopped() {
        let mut session = launched(true);
        let pause = PauseMessage::parse(&request(10, "pause", None)).unwrap();
        let output = pause.handle(&mut session).unwrap();
        assert_eq!(reason(&output.events[0]), "pause");
    }

    #[test]
    fn stepping_requires_a_launched_program() {
        let mut session = open_session(ClientInfo::default());
        let step = StepInMessage::parse(&request(3, "stepIn", None)).unwrap();
        let err = step.handle(&mut session).unwrap_err();
        assert!(matches!(err, DapError::HandlerExecution(_)));
    }
}
