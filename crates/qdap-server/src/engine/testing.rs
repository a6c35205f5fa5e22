//! Fault-injecting engine wrapper for tests.

use super::trace::TraceState;
use super::{
    Complex, EngineError, EngineResult, SimulationEngine, SimulationState, Statevector,
    TraceEngine, Variable,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    FailCreation,
    FailDestroy,
    PanicOnStep,
    SlowStep(Duration),
}

/// A [`TraceEngine`] whose states misbehave on demand.
#[derive(Debug, Clone)]
pub struct FaultyEngine {
    pub inner: TraceEngine,
    fault: Fault,
}

impl FaultyEngine {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: TraceEngine::new(),
            fault,
        }
    }
}

impl SimulationEngine for FaultyEngine {
    type State = FaultyState;

    fn create_simulation_state(&mut self) -> EngineResult<FaultyState> {
        if self.fault == Fault::FailCreation {
            return Err(EngineError::Creation("simulator unavailable".into()));
        }
        Ok(FaultyState {
            inner: self.inner.create_simulation_state()?,
            fault: self.fault,
        })
    }

    fn destroy_simulation_state(&mut self, state: FaultyState) -> EngineResult<()> {
        let result = self.inner.destroy_simulation_state(state.inner);
        if self.fault == Fault::FailDestroy {
            return Err(EngineError::InvalidHandle);
        }
        result
    }
}

#[derive(Debug)]
pub struct FaultyState {
    inner: TraceState,
    fault: Fault,
}

impl FaultyState {
    fn before_step(&self) {
        match self.fault {
            Fault::PanicOnStep => panic!("injected engine panic"),
            Fault::SlowStep(delay) => std::thread::sleep(delay),
            _ => {}
        }
    }
}

impl SimulationState for FaultyState {
    fn load_code(&mut self, code: &str) -> EngineResult<()> {
        self.inner.load_code(code)
    }
    fn step_forward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_forward()
    }
    fn step_over_forward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_over_forward()
    }
    fn step_out_forward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_out_forward()
    }
    fn step_backward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_backward()
    }
    fn step_over_backward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_over_backward()
    }
    fn step_out_backward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.step_out_backward()
    }
    fn run_all(&mut self) -> EngineResult<usize> {
        self.before_step();
        self.inner.run_all()
    }
    fn run_simulation(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.run_simulation()
    }
    fn run_simulation_backward(&mut self) -> EngineResult<()> {
        self.before_step();
        self.inner.run_simulation_backward()
    }
    fn reset_simulation(&mut self) -> EngineResult<()> {
        self.inner.reset_simulation()
    }
    fn pause_simulation(&mut self) -> EngineResult<()> {
        self.inner.pause_simulation()
    }
    fn can_step_forward(&self) -> bool {
        self.inner.can_step_forward()
    }
    fn can_step_backward(&self) -> bool {
        self.inner.can_step_backward()
    }
    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
    fn did_assertion_fail(&self) -> bool {
        self.inner.did_assertion_fail()
    }
    fn was_breakpoint_hit(&self) -> bool {
        self.inner.was_breakpoint_hit()
    }
    fn current_instruction(&self) -> usize {
        self.inner.current_instruction()
    }
    fn instruction_count(&self) -> usize {
        self.inner.instruction_count()
    }
    fn instruction_position(&self, instruction: usize) -> EngineResult<(usize, usize)> {
        self.inner.instruction_position(instruction)
    }
    fn num_qubits(&self) -> usize {
        self.inner.num_qubits()
    }
    fn amplitude_index(&self, index: usize) -> EngineResult<Complex> {
        self.inner.amplitude_index(index)
    }
    fn amplitude_bitstring(&self, bitstring: &str) -> EngineResult<Complex> {
        self.inner.amplitude_bitstring(bitstring)
    }
    fn classical_variable_count(&self) -> usize {
        self.inner.classical_variable_count()
    }
    fn classical_variable_name(&self, index: usize) -> EngineResult<String> {
        self.inner.classical_variable_name(index)
    }
    fn classical_variable(&self, name: &str) -> EngineResult<Variable> {
        self.inner.classical_variable(name)
    }
    fn state_vector_full(&self) -> EngineResult<Statevector> {
        self.inner.state_vector_full()
    }
    fn state_vector_sub(&self, qubits: &[usize]) -> EngineResult<Statevector> {
        self.inner.state_vector_sub(qubits)
    }
    fn set_breakpoint(&mut self, desired_position: usize) -> EngineResult<usize> {
        self.inner.set_breakpoint(desired_position)
    }
    fn clear_breakpoints(&mut self) -> EngineResult<()> {
        self.inner.clear_breakpoints()
    }
    fn stack_depth(&self) -> EngineResult<usize> {
        self.inner.stack_depth()
    }
    fn stack_trace(&self, max_depth: usize) -> EngineResult<Vec<usize>> {
        self.inner.stack_trace(max_depth)
    }
}
