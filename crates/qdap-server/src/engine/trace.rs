//! Reference engine: a dense statevector simulator that keeps an execution
//! trace so every unitary step can be undone.
//!
//! Programs are parsed by [`super::circuit`]. Custom gates run as calls with
//! their own frame, so the call stack is observable. Measurements and resets
//! are irreversible and clear the trace. The engine tracks live handles so
//! leaks and double destroys are observable.

use super::circuit::{self, AssertionKind, Circuit, Instruction, Kind, Operand};
use super::statevector::{gates, pair_is_entangled, Op, Statevector};
use super::{Complex, EngineError, EngineResult, SimulationEngine, SimulationState, Variable};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Engine handing out [`TraceState`]s.
///
/// Clones share the handle registry, so a clone given to each connection
/// still reports global counts.
#[derive(Debug, Clone, Default)]
pub struct TraceEngine {
    registry: Arc<HandleRegistry>,
}

#[derive(Debug, Default)]
struct HandleRegistry {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl TraceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of states created and not yet destroyed.
    pub fn live_states(&self) -> usize {
        self.registry.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    /// Total number of states ever created.
    pub fn created_states(&self) -> u64 {
        self.registry.created.load(Ordering::SeqCst)
    }

    /// Total number of states destroyed.
    pub fn destroyed_states(&self) -> u64 {
        self.registry.destroyed.load(Ordering::SeqCst)
    }
}

impl SimulationEngine for TraceEngine {
    type State = TraceState;

    fn create_simulation_state(&mut self) -> EngineResult<TraceState> {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.registry
            .live
            .lock()
            .map_err(|_| EngineError::Creation("handle registry poisoned".into()))?
            .insert(id);
        self.registry.created.fetch_add(1, Ordering::SeqCst);
        debug!(handle = id, "trace state created");
        Ok(TraceState::new(id))
    }

    fn destroy_simulation_state(&mut self, state: TraceState) -> EngineResult<()> {
        let removed = self
            .registry
            .live
            .lock()
            .map_err(|_| EngineError::Other("handle registry poisoned".into()))?
            .remove(&state.id);
        if !removed {
            return Err(EngineError::InvalidHandle);
        }
        self.registry.destroyed.fetch_add(1, Ordering::SeqCst);
        debug!(handle = state.id, "trace state destroyed");
        Ok(())
    }
}

/// An active custom-gate call.
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    /// Index of the calling instruction.
    call: usize,
    /// Formal argument name to absolute qubit.
    bindings: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
enum FrameChange {
    None,
    Pushed,
    Popped(Frame),
}

/// What is needed to undo one forward step.
#[derive(Debug, Clone)]
struct Undo {
    instruction: usize,
    frame: FrameChange,
    ops: Vec<Op>,
}

/// Execution state of a loaded program.
///
/// `current` is the index of the next instruction to execute; it equals the
/// instruction count once the program has finished.
#[derive(Debug)]
pub struct TraceState {
    id: u64,
    circuit: Circuit,
    loaded: bool,
    current: usize,
    state: Statevector,
    bits: Vec<Variable>,
    frames: Vec<Frame>,
    history: Vec<Undo>,
    breakpoints: BTreeSet<usize>,
    breakpoint_hit: bool,
    failed_assertion: Option<usize>,
    paused: bool,
    rng: StdRng,
}

impl TraceState {
    fn new(id: u64) -> Self {
        Self {
            id,
            circuit: Circuit::default(),
            loaded: false,
            current: 0,
            state: Statevector::zero(0),
            bits: Vec::new(),
            frames: Vec::new(),
            history: Vec::new(),
            breakpoints: BTreeSet::new(),
            breakpoint_hit: false,
            failed_assertion: None,
            paused: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Engine-assigned handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Seed the measurement RNG so outcomes are reproducible.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn ensure_loaded(&self) -> EngineResult<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(EngineError::NoCode)
        }
    }

    /// Back to the first instruction with all qubits and bits zeroed.
    fn rewind(&mut self) {
        self.current = 0;
        self.state = Statevector::zero(self.circuit.num_qubits());
        self.bits = self
            .circuit
            .bits
            .iter()
            .flat_map(|r| (0..r.size).map(move |i| format!("{}[{i}]", r.name)))
            .map(|name| Variable { name, value: false })
            .collect();
        self.frames.clear();
        self.history.clear();
        self.breakpoint_hit = false;
        self.failed_assertion = None;
        self.paused = false;
    }

    fn instruction(&self, index: usize) -> EngineResult<&Instruction> {
        self.circuit
            .instructions
            .get(index)
            .ok_or(EngineError::InstructionOutOfRange(index))
    }

    fn is_call(&self, index: usize) -> bool {
        matches!(
            self.circuit.instructions.get(index).map(|i| &i.kind),
            Some(Kind::Call { .. })
        )
    }

    /// Absolute qubits an operand refers to in the current frame.
    fn resolve(&self, operand: &Operand) -> EngineResult<Vec<usize>> {
        if operand.index.is_none() {
            if let Some(&qubit) = self
                .frames
                .last()
                .and_then(|frame| frame.bindings.get(&operand.register))
            {
                return Ok(vec![qubit]);
            }
        }
        let register = self
            .circuit
            .qubit_register(&operand.register)
            .ok_or_else(|| EngineError::Other(format!("unknown qubit `{}`", operand.register)))?;
        Ok(match operand.index {
            Some(index) => vec![register.start + index],
            None => (register.start..register.start + register.size).collect(),
        })
    }

    /// Resolve operands and pair them up, repeating single qubits against
    /// whole registers.
    fn broadcast(&self, operands: &[Operand]) -> EngineResult<Vec<Vec<usize>>> {
        let resolved = operands
            .iter()
            .map(|o| self.resolve(o))
            .collect::<EngineResult<Vec<_>>>()?;
        let width = resolved.iter().map(Vec::len).max().unwrap_or(0);
        Ok((0..width)
            .map(|k| {
                resolved
                    .iter()
                    .map(|qs| if qs.len() == 1 { qs[0] } else { qs[k] })
                    .collect()
            })
            .collect())
    }

    fn bit_indices(&self, operand: &Operand) -> EngineResult<Vec<usize>> {
        let register = self
            .circuit
            .bit_register(&operand.register)
            .ok_or_else(|| EngineError::Other(format!("unknown bit `{}`", operand.register)))?;
        Ok(match operand.index {
            Some(index) => vec![register.start + index],
            None => (register.start..register.start + register.size).collect(),
        })
    }

    fn assertion_holds(&self, kind: AssertionKind, targets: &[Operand]) -> EngineResult<bool> {
        let mut qubits = Vec::new();
        for target in targets {
            qubits.extend(self.resolve(target)?);
        }
        Ok(match kind {
            AssertionKind::Superposition => self.state.project(&qubits).nonzero_count() > 1,
            AssertionKind::Entanglement => qubits.iter().enumerate().all(|(i, &a)| {
                qubits
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| i != j)
                    .all(|(_, &b)| pair_is_entangled(&self.state.project(&[a, b])))
            }),
        })
    }

    /// Execute the current instruction and move to its successor. Returns
    /// the undo record, or `None` if the step cannot be undone.
    fn execute(&mut self) -> EngineResult<Option<Undo>> {
        let index = self.current;
        let kind = self.instruction(index)?.kind.clone();
        let mut undo = Undo {
            instruction: index,
            frame: FrameChange::None,
            ops: Vec::new(),
        };
        let mut next = index + 1;

        match kind {
            Kind::Nop | Kind::Assert { .. } => {}
            Kind::Gate { matrix, operands } => {
                for qubits in self.broadcast(&operands)? {
                    if let Some((&target, controls)) = qubits.split_last() {
                        undo.ops.push(Op {
                            matrix,
                            controls: controls.to_vec(),
                            target,
                        });
                    }
                }
            }
            Kind::Swap { operands } => {
                for pair in self.broadcast(&operands)? {
                    if let [a, b] = pair[..] {
                        for (control, target) in [(a, b), (b, a), (a, b)] {
                            undo.ops.push(Op {
                                matrix: gates::X,
                                controls: vec![control],
                                target,
                            });
                        }
                    }
                }
            }
            Kind::Measure { qubits, bits } => {
                let qubits = self.resolve(&qubits)?;
                let bits = self.bit_indices(&bits)?;
                for (&qubit, &bit) in qubits.iter().zip(&bits) {
                    let outcome = self.state.measure(qubit, &mut self.rng);
                    if let Some(variable) = self.bits.get_mut(bit) {
                        variable.value = outcome;
                    }
                }
                self.current = next;
                return Ok(None);
            }
            Kind::Reset(operand) => {
                for qubit in self.resolve(&operand)? {
                    if self.state.measure(qubit, &mut self.rng) {
                        self.state.apply(&Op {
                            matrix: gates::X,
                            controls: Vec::new(),
                            target: qubit,
                        });
                    }
                }
                self.current = next;
                return Ok(None);
            }
            Kind::Definition { end, .. } => next = end + 1,
            Kind::Call {
                definition,
                arguments,
            } => {
                let formals = match &self.instruction(definition)?.kind {
                    Kind::Definition { formals, .. } => formals.clone(),
                    _ => return Err(EngineError::Other("call target is not a gate".into())),
                };
                let mut bindings = HashMap::new();
                for (formal, argument) in formals.into_iter().zip(&arguments) {
                    let qubit = match self.resolve(argument)?[..] {
                        [qubit] => qubit,
                        _ => {
                            return Err(EngineError::Other(format!(
                                "gate argument `{}` must be a single qubit",
                                argument.register
                            )))
                        }
                    };
                    bindings.insert(formal, qubit);
                }
                self.frames.push(Frame {
                    call: index,
                    bindings,
                });
                undo.frame = FrameChange::Pushed;
                next = definition + 1;
            }
            Kind::Return => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| EngineError::Other("return outside a gate call".into()))?;
                next = frame.call + 1;
                undo.frame = FrameChange::Popped(frame);
            }
        }

        for op in &undo.ops {
            self.state.apply(op);
        }
        self.current = next;
        Ok(Some(undo))
    }

    fn undo(&mut self, undo: Undo) {
        for op in undo.ops.iter().rev() {
            self.state.apply(&op.inverse());
        }
        match undo.frame {
            FrameChange::None => {}
            FrameChange::Pushed => {
                self.frames.pop();
            }
            FrameChange::Popped(frame) => self.frames.push(frame),
        }
        self.current = undo.instruction;
    }

    fn stop_requested(&self) -> bool {
        self.did_assertion_fail() || self.breakpoint_hit
    }
}

impl SimulationState for TraceState {
    fn load_code(&mut self, code: &str) -> EngineResult<()> {
        let circuit = circuit::parse(code)?;
        self.circuit = circuit;
        self.loaded = true;
        self.breakpoints.clear();
        self.rewind();
        debug!(
            handle = self.id,
            instructions = self.circuit.instructions.len(),
            qubits = self.circuit.num_qubits(),
            "code loaded"
        );
        Ok(())
    }

    fn step_forward(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        if !self.can_step_forward() {
            return Err(EngineError::CannotStep("forward: program has finished"));
        }
        let index = self.current;
        let assertion = match &self.instruction(index)?.kind {
            Kind::Assert { kind, targets } => Some(self.assertion_holds(*kind, targets)?),
            _ => None,
        };

        match self.execute()? {
            Some(undo) => self.history.push(undo),
            None => self.history.clear(),
        }
        self.breakpoint_hit = self.breakpoints.contains(&self.current);

        match assertion {
            // Stop on the failing assertion once; stepping again moves past it.
            Some(false) if self.failed_assertion != Some(index) => {
                self.failed_assertion = Some(index);
                if let Some(undo) = self.history.pop() {
                    self.undo(undo);
                }
                self.breakpoint_hit = false;
            }
            Some(_) => {}
            None => self.failed_assertion = None,
        }
        Ok(())
    }

    fn step_over_forward(&mut self) -> EngineResult<()> {
        if !self.is_call(self.current) {
            return self.step_forward();
        }
        let depth = self.frames.len();
        loop {
            self.step_forward()?;
            if self.frames.len() <= depth || self.stop_requested() || self.is_finished() {
                return Ok(());
            }
        }
    }

    fn step_out_forward(&mut self) -> EngineResult<()> {
        let depth = self.frames.len();
        if depth == 0 {
            return self.run_simulation();
        }
        loop {
            self.step_forward()?;
            if self.frames.len() < depth || self.stop_requested() || self.is_finished() {
                return Ok(());
            }
        }
    }

    fn step_backward(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        let undo = self
            .history
            .pop()
            .ok_or(EngineError::CannotStep("backward: nothing left to undo"))?;
        self.undo(undo);
        self.breakpoint_hit = self.breakpoints.contains(&self.current);
        if self.failed_assertion != Some(self.current) {
            self.failed_assertion = None;
        }
        Ok(())
    }

    fn step_over_backward(&mut self) -> EngineResult<()> {
        let returning = matches!(
            self.history
                .last()
                .and_then(|u| self.circuit.instructions.get(u.instruction))
                .map(|i| &i.kind),
            Some(Kind::Return)
        );
        if !returning {
            return self.step_backward();
        }
        let depth = self.frames.len();
        loop {
            self.step_backward()?;
            let back_at_call = self.frames.len() == depth && self.is_call(self.current);
            if back_at_call || self.breakpoint_hit || !self.can_step_backward() {
                return Ok(());
            }
        }
    }

    fn step_out_backward(&mut self) -> EngineResult<()> {
        let depth = self.frames.len();
        if depth == 0 {
            return self.run_simulation_backward();
        }
        loop {
            self.step_backward()?;
            if self.frames.len() < depth || self.breakpoint_hit || !self.can_step_backward() {
                return Ok(());
            }
        }
    }

    fn run_all(&mut self) -> EngineResult<usize> {
        self.ensure_loaded()?;
        let mut failed = 0;
        while !self.is_finished() {
            self.run_simulation()?;
            if self.did_assertion_fail() {
                failed += 1;
            }
        }
        Ok(failed)
    }

    fn run_simulation(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        self.paused = false;
        while self.can_step_forward() {
            self.step_forward()?;
            if self.stop_requested() {
                break;
            }
        }
        Ok(())
    }

    fn run_simulation_backward(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        self.paused = false;
        while self.can_step_backward() {
            self.step_backward()?;
            if self.breakpoint_hit {
                break;
            }
        }
        Ok(())
    }

    fn reset_simulation(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        self.rewind();
        Ok(())
    }

    // Runs complete synchronously, so a pause only marks the state.
    fn pause_simulation(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;
        self.paused = true;
        Ok(())
    }

    fn can_step_forward(&self) -> bool {
        self.loaded && self.current < self.circuit.instructions.len()
    }

    fn can_step_backward(&self) -> bool {
        self.loaded && !self.history.is_empty()
    }

    fn is_finished(&self) -> bool {
        self.loaded && self.current == self.circuit.instructions.len()
    }

    fn did_assertion_fail(&self) -> bool {
        self.failed_assertion == Some(self.current)
    }

    fn was_breakpoint_hit(&self) -> bool {
        self.breakpoint_hit
    }

    fn current_instruction(&self) -> usize {
        self.current
    }

    fn instruction_count(&self) -> usize {
        self.circuit.instructions.len()
    }

    fn instruction_position(&self, instruction: usize) -> EngineResult<(usize, usize)> {
        self.instruction(instruction)
            .map(|i| (i.span.start, i.span.end))
    }

    fn num_qubits(&self) -> usize {
        self.state.num_qubits
    }

    fn amplitude_index(&self, index: usize) -> EngineResult<Complex> {
        self.state
            .amplitudes
            .get(index)
            .copied()
            .ok_or(EngineError::QubitOutOfRange(index))
    }

    fn amplitude_bitstring(&self, bitstring: &str) -> EngineResult<Complex> {
        if bitstring.len() != self.state.num_qubits {
            return Err(EngineError::Other(format!(
                "bitstring `{bitstring}` must have {} digits",
                self.state.num_qubits
            )));
        }
        let index = bitstring.chars().try_fold(0usize, |acc, c| match c {
            '0' => Ok(acc << 1),
            '1' => Ok((acc << 1) | 1),
            _ => Err(EngineError::Other(format!("invalid bitstring `{bitstring}`"))),
        })?;
        self.amplitude_index(index)
    }

    fn classical_variable_count(&self) -> usize {
        self.bits.len()
    }

    fn classical_variable_name(&self, index: usize) -> EngineResult<String> {
        self.bits
            .get(index)
            .map(|v| v.name.clone())
            .ok_or_else(|| EngineError::UnknownVariable(format!("#{index}")))
    }

    fn classical_variable(&self, name: &str) -> EngineResult<Variable> {
        self.bits
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))
    }

    fn state_vector_full(&self) -> EngineResult<Statevector> {
        self.ensure_loaded()?;
        Ok(self.state.clone())
    }

    fn state_vector_sub(&self, qubits: &[usize]) -> EngineResult<Statevector> {
        self.ensure_loaded()?;
        if let Some(&bad) = qubits.iter().find(|&&q| q >= self.state.num_qubits) {
            return Err(EngineError::QubitOutOfRange(bad));
        }
        Ok(self.state.project(qubits))
    }

    fn set_breakpoint(&mut self, desired_position: usize) -> EngineResult<usize> {
        self.ensure_loaded()?;
        let index = self
            .circuit
            .instructions
            .iter()
            .position(|i| i.span.end >= desired_position)
            .ok_or(EngineError::NoInstructionAt(desired_position))?;
        self.breakpoints.insert(index);
        Ok(index)
    }

    fn clear_breakpoints(&mut self) -> EngineResult<()> {
        self.breakpoints.clear();
        Ok(())
    }

    fn stack_depth(&self) -> EngineResult<usize> {
        self.ensure_loaded()?;
        Ok(self.frames.len() + 1)
    }

    fn stack_trace(&self, max_depth: usize) -> EngineResult<Vec<usize>> {
        self.ensure_loaded()?;
        if max_depth == 0 {
            return Err(EngineError::Other("stack trace depth must be positive".into()));
        }
        Ok(std::iter::once(self.current)
            .chain(self.frames.iter().rev().map(|f| f.call))
            .take(max_depth)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    const CODE: &str = "OPENQASM 2.0;\nqreg q[3];\nh q[0];\ncx q[0], q[1];\n// entangle\ncx q[0], q[2];\n";

    const CALLS: &str = "qreg q[2];\ngate flip a {\n  x a;\n}\ngate pair a, b {\n  flip a;\n  cx a, b;\n}\npair q[0], q[1];\nh q[1];\n";

    fn loaded(code: &str) -> (TraceEngine, TraceState) {
        let mut engine = TraceEngine::new();
        let mut state = engine.create_simulation_state().unwrap();
        state.load_code(code).unwrap();
        (engine, state)
    }

    fn close(a: Complex, real: f64) -> bool {
        (a.real - real).abs() < 1e-9 && a.imaginary.abs() < 1e-9
    }

    #[test]
    fn steps_forward_and_backward() {
        let (_engine, mut state) = loaded(CODE);
        assert!(!state.can_step_backward());
        state.step_forward().unwrap();
        state.step_over_forward().unwrap();
        state.step_forward().unwrap();
        assert_eq!(state.current_instruction(), 3);
        assert!(close(state.amplitude_bitstring("001").unwrap(), FRAC_1_SQRT_2));

        state.step_backward().unwrap();
        assert_eq!(state.current_instruction(), 2);
        assert!(close(state.amplitude_index(0).unwrap(), 1.0));
    }

    #[test]
    fn stepping_past_the_end_fails() {
        let (_engine, mut state) = loaded(CODE);
        state.run_simulation().unwrap();
        assert!(state.is_finished());
        assert!(matches!(state.step_forward(), Err(EngineError::CannotStep(_))));
    }

    #[test]
    fn run_stops_at_breakpoints() {
        let (_engine, mut state) = loaded(CODE);
        let pos = CODE.find("cx q[0], q[1]").unwrap();
        assert_eq!(state.set_breakpoint(pos).unwrap(), 3);

        state.run_simulation().unwrap();
        assert_eq!(state.current_instruction(), 3);
        assert!(state.was_breakpoint_hit());

        // Continuing from a breakpoint moves past it.
        state.run_simulation().unwrap();
        assert!(state.is_finished());
        assert!(!state.was_breakpoint_hit());
        let ghz = state.state_vector_full().unwrap();
        assert!(close(ghz.amplitudes[0b111], FRAC_1_SQRT_2));

        state.run_simulation_backward().unwrap();
        assert_eq!(state.current_instruction(), 3);
        state.run_simulation_backward().unwrap();
        assert_eq!(state.current_instruction(), 0);
        assert!(close(state.amplitude_index(0).unwrap(), 1.0));
    }

    #[test]
    fn breakpoint_in_whitespace_snaps_forward() {
        let (_engine, mut state) = loaded(CODE);
        let newline_after_h = CODE.find("h q[0];").unwrap() + "h q[0];".len();
        assert_eq!(state.set_breakpoint(newline_after_h).unwrap(), 3);
        assert!(state.set_breakpoint(CODE.len() + 10).is_err());
    }

    #[test]
    fn failed_assertion_stops_once() {
        let code = "qreg q[2];\nh q[0];\nassert-ent q[0], q[1];\ncx q[0], q[1];\nassert-ent q[0], q[1];\n";
        let (_engine, mut state) = loaded(code);

        state.run_simulation().unwrap();
        assert!(state.did_assertion_fail());
        assert_eq!(state.current_instruction(), 2);

        // The entangled pair passes the second assertion.
        state.run_simulation().unwrap();
        assert!(state.is_finished());
        assert!(!state.did_assertion_fail());

        state.reset_simulation().unwrap();
        assert_eq!(state.run_all().unwrap(), 1);
    }

    #[test]
    fn superposition_assertion() {
        let (_engine, mut state) = loaded("qreg q[1];\nassert-sup q[0];\nh q[0];\nassert-sup q;\n");
        state.step_forward().unwrap();
        state.step_forward().unwrap();
        assert!(state.did_assertion_fail());
        assert_eq!(state.run_all().unwrap(), 0);
    }

    #[test]
    fn measurement_sets_bits_and_cannot_be_undone() {
        let (_engine, mut state) = loaded("qreg q[2];\ncreg c[2];\nx q[1];\nmeasure q -> c;\n");
        state.seed(3);
        state.run_simulation().unwrap();
        assert_eq!(state.classical_variable_count(), 2);
        assert_eq!(state.classical_variable_name(1).unwrap(), "c[1]");
        assert!(!state.classical_variable("c[0]").unwrap().value);
        assert!(state.classical_variable("c[1]").unwrap().value);
        assert!(matches!(
            state.classical_variable("d[0]"),
            Err(EngineError::UnknownVariable(_))
        ));
        assert!(!state.can_step_backward());

        state.reset_simulation().unwrap();
        assert!(!state.classical_variable("c[1]").unwrap().value);
    }

    #[test]
    fn calls_push_frames_and_step_over_skips_them() {
        let (_engine, mut state) = loaded(CALLS);
        let call = 8;
        state.step_forward().unwrap();
        // Definitions are skipped as a whole.
        state.step_forward().unwrap();
        state.step_forward().unwrap();
        assert_eq!(state.current_instruction(), call);
        assert_eq!(state.stack_depth().unwrap(), 1);

        state.step_forward().unwrap();
        assert_eq!(state.stack_depth().unwrap(), 2);
        assert_eq!(state.stack_trace(5).unwrap(), vec![5, call]);

        state.step_forward().unwrap();
        assert_eq!(state.stack_trace(5).unwrap(), vec![2, 5, call]);
        assert_eq!(state.stack_trace(1).unwrap(), vec![2]);

        state.step_out_forward().unwrap();
        assert_eq!(state.current_instruction(), 6);
        assert_eq!(state.stack_depth().unwrap(), 2);

        state.step_out_forward().unwrap();
        assert_eq!(state.current_instruction(), call + 1);
        assert!(close(state.amplitude_bitstring("11").unwrap(), 1.0));

        state.step_over_backward().unwrap();
        assert_eq!(state.current_instruction(), call);
        assert_eq!(state.stack_depth().unwrap(), 1);
        assert!(close(state.amplitude_index(0).unwrap(), 1.0));

        state.step_over_forward().unwrap();
        assert_eq!(state.current_instruction(), call + 1);
        assert_eq!(state.stack_depth().unwrap(), 1);
    }

    #[test]
    fn step_out_backward_returns_to_the_call() {
        let (_engine, mut state) = loaded(CALLS);
        let pos = CALLS.find("cx a, b").unwrap();
        state.set_breakpoint(pos).unwrap();
        state.run_simulation().unwrap();
        assert_eq!(state.current_instruction(), 6);

        state.step_out_backward().unwrap();
        assert_eq!(state.current_instruction(), 8);
        assert_eq!(state.stack_depth().unwrap(), 1);
    }

    #[test]
    fn swap_and_sub_states() {
        let (_engine, mut state) = loaded("qreg q[2];\nx q[0];\nswap q[0], q[1];\n");
        state.run_simulation().unwrap();
        assert!(close(state.amplitude_bitstring("10").unwrap(), 1.0));
        let sub = state.state_vector_sub(&[1]).unwrap();
        assert!(close(sub.amplitudes[1], 1.0));
        assert!(matches!(
            state.state_vector_sub(&[2]),
            Err(EngineError::QubitOutOfRange(2))
        ));
        assert!(state.amplitude_bitstring("1").is_err());
    }

    #[test]
    fn operations_require_code() {
        let mut engine = TraceEngine::new();
        let mut state = engine.create_simulation_state().unwrap();
        assert!(matches!(state.step_forward(), Err(EngineError::NoCode)));
        assert!(matches!(state.stack_depth(), Err(EngineError::NoCode)));
        assert!(!state.is_finished());
        assert!(matches!(
            state.load_code("h q[0];"),
            Err(EngineError::Parse { .. })
        ));
    }

    #[test]
    fn tracks_live_handles() {
        let mut engine = TraceEngine::new();
        let shared = engine.clone();
        let a = engine.create_simulation_state().unwrap();
        let b = engine.create_simulation_state().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(shared.live_states(), 2);

        engine.destroy_simulation_state(a).unwrap();
        assert_eq!(shared.live_states(), 1);
        assert_eq!(shared.created_states(), 2);
        assert_eq!(shared.destroyed_states(), 1);
    }

    #[test]
    fn destroying_a_foreign_handle_fails() {
        let mut engine = TraceEngine::new();
        let mut other = TraceEngine::new();
        let state = other.create_simulation_state().unwrap();
        let foreign_id = state.id();
        // Same id space, but this engine never issued the handle.
        assert_eq!(foreign_id, 1);
        assert!(matches!(
            engine.destroy_simulation_state(state),
            Err(EngineError::InvalidHandle)
        ));
    }
}
