//! Simulation-engine capability interface.
//!
//! The adapter never simulates anything itself: it drives an engine through a
//! handle created by [`SimulationEngine::create_simulation_state`] and
//! released by [`SimulationEngine::destroy_simulation_state`]. Everything in
//! between goes through [`SimulationState`].

mod circuit;
mod statevector;
pub mod trace;

#[cfg(test)]
pub mod testing;

pub use statevector::{Complex, Statevector};
pub use trace::TraceEngine;

use qdap_core::DapError;
use thiserror::Error;

/// Errors reported by a simulation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create simulation state: {0}")]
    Creation(String),

    #[error("invalid simulation state handle")]
    InvalidHandle,

    #[error("no code has been loaded")]
    NoCode,

    #[error("parse error at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("cannot step {0}")]
    CannotStep(&'static str),

    #[error("no instruction at or after source position {0}")]
    NoInstructionAt(usize),

    #[error("instruction {0} out of range")]
    InstructionOutOfRange(usize),

    #[error("qubit {0} out of range")]
    QubitOutOfRange(usize),

    #[error("unknown classical variable `{0}`")]
    UnknownVariable(String),

    #[error("{0}")]
    Other(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for DapError {
    fn from(e: EngineError) -> Self {
        DapError::HandlerExecution(e.to_string())
    }
}

/// A classical bit as seen by the debugger, e.g. `c[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: bool,
}

/// Factory and destructor for simulation states.
///
/// One connection owns one engine value; each successful `initialize`
/// creates exactly one state and `disconnect` (or teardown) destroys it.
pub trait SimulationEngine: Send + 'static {
    type State: SimulationState;

    fn create_simulation_state(&mut self) -> EngineResult<Self::State>;

    /// Destroy a state previously created by this engine.
    ///
    /// Takes the state by value so a destroyed handle cannot be used again.
    fn destroy_simulation_state(&mut self, state: Self::State) -> EngineResult<()>;
}

/// Stepping and query operations on one simulation state.
///
/// Positions are byte offsets into the loaded source code. Qubit `k` is bit
/// `k` of a basis-state index.
pub trait SimulationState: Send + 'static {
    fn load_code(&mut self, code: &str) -> EngineResult<()>;

    fn step_forward(&mut self) -> EngineResult<()>;
    /// Step forward; a gate call runs until it returns.
    fn step_over_forward(&mut self) -> EngineResult<()>;
    /// Run forward until the current gate call returns.
    fn step_out_forward(&mut self) -> EngineResult<()>;
    fn step_backward(&mut self) -> EngineResult<()>;
    fn step_over_backward(&mut self) -> EngineResult<()>;
    fn step_out_backward(&mut self) -> EngineResult<()>;

    /// Run to the end without stopping, returning how many assertions failed.
    fn run_all(&mut self) -> EngineResult<usize>;
    /// Run forward until a breakpoint, a failed assertion or the end.
    fn run_simulation(&mut self) -> EngineResult<()>;
    /// Run backward until a breakpoint is reached or the start is reached.
    fn run_simulation_backward(&mut self) -> EngineResult<()>;
    fn reset_simulation(&mut self) -> EngineResult<()>;
    fn pause_simulation(&mut self) -> EngineResult<()>;

    fn can_step_forward(&self) -> bool;
    fn can_step_backward(&self) -> bool;
    fn is_finished(&self) -> bool;
    /// Whether execution stopped on an assertion that does not hold.
    fn did_assertion_fail(&self) -> bool;
    fn was_breakpoint_hit(&self) -> bool;

    fn current_instruction(&self) -> usize;
    fn instruction_count(&self) -> usize;
    /// Start and end (inclusive) source positions of an instruction.
    fn instruction_position(&self, instruction: usize) -> EngineResult<(usize, usize)>;

    fn num_qubits(&self) -> usize;
    fn amplitude_index(&self, index: usize) -> EngineResult<Complex>;
    /// Amplitude of a basis state written most significant qubit first.
    fn amplitude_bitstring(&self, bitstring: &str) -> EngineResult<Complex>;

    fn classical_variable_count(&self) -> usize;
    fn classical_variable_name(&self, index: usize) -> EngineResult<String>;
    fn classical_variable(&self, name: &str) -> EngineResult<Variable>;

    fn state_vector_full(&self) -> EngineResult<Statevector>;
    /// Amplitudes restricted to `qubits`; `qubits[j]` becomes bit `j`.
    fn state_vector_sub(&self, qubits: &[usize]) -> EngineResult<Statevector>;

    /// Place a breakpoint on the first instruction ending at or after
    /// `desired_position`, returning that instruction's index.
    fn set_breakpoint(&mut self, desired_position: usize) -> EngineResult<usize>;
    fn clear_breakpoints(&mut self) -> EngineResult<()>;

    /// Number of frames: one plus the number of active gate calls.
    fn stack_depth(&self) -> EngineResult<usize>;
    /// Current instruction followed by the calling instructions, innermost
    /// first, at most `max_depth` entries.
    fn stack_trace(&self, max_depth: usize) -> EngineResult<Vec<usize>>;
}
