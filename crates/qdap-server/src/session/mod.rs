//! Per-connection session state and the engine-handle lifecycle.
//!
//! A session moves `Uninitialized → Initialized → Terminated`. The engine
//! handle exists exactly while the session is `Initialized`; it is acquired by
//! [`SessionState::open`] and released by [`SessionState::close`], by
//! [`SessionState::teardown`], or on drop.

pub mod program;

pub use program::{Breakpoint, ClientInfo, Program, RequestedBreakpoint};

use crate::engine::SimulationEngine;
use qdap_core::{Capabilities, DapError, DapResult};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initialized,
    Terminated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Initialized => "initialized",
            SessionPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Outbound `seq` source shared by everything that writes to one connection.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter(Arc<AtomicI64>);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number, starting at 1.
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// State shared by all handlers of one client connection.
pub struct SessionState<E: SimulationEngine> {
    id: String,
    engine: E,
    handle: Option<E::State>,
    phase: SessionPhase,
    capabilities: Option<Capabilities>,
    client: ClientInfo,
    program: Option<Program>,
    /// Requested breakpoints per source file, kept across launches.
    breakpoints: HashMap<PathBuf, Vec<Breakpoint>>,
    last_breakpoint_id: i64,
    configured: bool,
    seq: SequenceCounter,
}

impl<E: SimulationEngine> SessionState<E> {
    pub fn new(engine: E, seq: SequenceCounter) -> Self {
        Self {
            id: generate_session_id(),
            engine,
            handle: None,
            phase: SessionPhase::Uninitialized,
            capabilities: None,
            client: ClientInfo::default(),
            program: None,
            breakpoints: HashMap::new(),
            last_breakpoint_id: 0,
            configured: false,
            seq,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Capabilities negotiated by `initialize`, if it has succeeded.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn next_seq(&self) -> i64 {
        self.seq.next()
    }

    pub fn has_engine_state(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquire the engine handle and enter `Initialized`.
    ///
    /// Refuses to overwrite an existing handle. An engine-creation failure is
    /// fatal: the session moves to `Terminated`.
    pub fn open(&mut self, client: ClientInfo, capabilities: Capabilities) -> DapResult<&Capabilities> {
        if self.handle.is_some() {
            return Err(DapError::HandlerExecution(
                "simulation state already exists; refusing to overwrite it".into(),
            ));
        }

        match self.engine.create_simulation_state() {
            Ok(state) => {
                self.handle = Some(state);
                self.phase = SessionPhase::Initialized;
                info!(
                    session_id = %self.id,
                    client_id = %client.client_id,
                    client_name = %client.client_name,
                    path_format = %client.path_format,
                    "session initialized"
                );
                self.client = client;
                Ok(self.capabilities.insert(capabilities))
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "engine creation failed, session terminated");
                self.phase = SessionPhase::Terminated;
                Err(e.into())
            }
        }
    }

    /// Release the engine handle and enter `Terminated`.
    ///
    /// Closing a session that holds no handle is a protocol-usage error.
    pub fn close(&mut self) -> DapResult<()> {
        let state = self.handle.take().ok_or_else(|| {
            DapError::ProtocolSequence("no simulation state to release".into())
        })?;
        self.phase = SessionPhase::Terminated;
        self.program = None;
        self.engine.destroy_simulation_state(state)?;
        info!(session_id = %self.id, "session terminated");
        Ok(())
    }

    /// Release a still-present handle at connection teardown.
    pub fn teardown(&mut self) {
        if self.handle.is_none() {
            debug!(session_id = %self.id, phase = %self.phase, "teardown: nothing to release");
            self.phase = SessionPhase::Terminated;
            return;
        }
        warn!(session_id = %self.id, "connection closed without disconnect, releasing simulation state");
        if let Err(e) = self.close() {
            error!(session_id = %self.id, error = %e, "failed to release simulation state");
        }
    }

    /// The live engine handle.
    pub fn engine_state(&mut self) -> DapResult<&mut E::State> {
        self.handle
            .as_mut()
            .ok_or_else(|| DapError::ProtocolSequence("no simulation state".into()))
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn set_program(&mut self, program: Program) {
        self.program = Some(program);
    }

    /// Engine handle together with the launched program.
    pub fn launched(&mut self) -> DapResult<(&mut E::State, &Program)> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| DapError::HandlerExecution("no program has been launched".into()))?;
        let state = self
            .handle
            .as_mut()
            .ok_or_else(|| DapError::ProtocolSequence("no simulation state".into()))?;
        Ok((state, program))
    }

    /// Replace the breakpoints stored for `source`. Each one gets an id that
    /// is unique within the session.
    pub fn store_breakpoints(
        &mut self,
        source: &Path,
        requested: &[RequestedBreakpoint],
    ) -> Vec<Breakpoint> {
        let stored: Vec<Breakpoint> = requested
            .iter()
            .map(|bp| {
                self.last_breakpoint_id += 1;
                Breakpoint {
                    id: self.last_breakpoint_id,
                    line: bp.line,
                    column: bp.column,
                }
            })
            .collect();
        if stored.is_empty() {
            self.breakpoints.remove(source);
        } else {
            self.breakpoints.insert(source.to_path_buf(), stored.clone());
        }
        stored
    }

    pub fn breakpoints_for(&self, source: &Path) -> &[Breakpoint] {
        self.breakpoints.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `configurationDone` has been received.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn mark_configured(&mut self) {
        self.configured = true;
    }
}

impl<E: SimulationEngine> Drop for SessionState<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Generate a random session ID (hex-encoded, 8 bytes = 16 hex chars).
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Fault, FaultyEngine};
    use crate::engine::TraceEngine;

    fn session() -> SessionState<TraceEngine> {
        SessionState::new(TraceEngine::new(), SequenceCounter::new())
    }

    #[test]
    fn open_then_close_releases_once() {
        let mut s = session();
        assert_eq!(s.phase(), SessionPhase::Uninitialized);
        s.open(ClientInfo::default(), Capabilities::default()).unwrap();
        assert_eq!(s.phase(), SessionPhase::Initialized);
        assert!(s.capabilities().unwrap().supports_step_back);
        assert_eq!(s.engine().live_states(), 1);

        s.close().unwrap();
        assert_eq!(s.phase(), SessionPhase::Terminated);
        assert_eq!(s.engine().live_states(), 0);
        assert_eq!(s.engine().destroyed_states(), 1);
    }

    #[test]
    fn open_refuses_to_overwrite() {
        let mut s = session();
        s.open(ClientInfo::default(), Capabilities::default()).unwrap();
        let err = s.open(ClientInfo::default(), Capabilities::default()).unwrap_err();
        assert!(matches!(err, DapError::HandlerExecution(_)));
        assert_eq!(s.engine().created_states(), 1);
    }

    #[test]
    fn close_without_handle_is_reported() {
        let mut s = session();
        let err = s.close().unwrap_err();
        assert!(matches!(err, DapError::ProtocolSequence(_)));
        assert_eq!(s.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn creation_failure_terminates() {
        let mut s = SessionState::new(FaultyEngine::new(Fault::FailCreation), SequenceCounter::new());
        let err = s.open(ClientInfo::default(), Capabilities::default()).unwrap_err();
        assert!(matches!(err, DapError::HandlerExecution(_)));
        assert_eq!(s.phase(), SessionPhase::Terminated);
        assert!(!s.has_engine_state());
    }

    #[test]
    fn destroy_failure_still_clears_handle() {
        let mut s = SessionState::new(FaultyEngine::new(Fault::FailDestroy), SequenceCounter::new());
        s.open(ClientInfo::default(), Capabilities::default()).unwrap();
        assert!(s.close().is_err());
        assert!(!s.has_engine_state());
        assert_eq!(s.phase(), SessionPhase::Terminated);
    }

    #[test]
    fn drop_releases_leftover_handle() {
        let engine = TraceEngine::new();
        {
            let mut s = SessionState::new(engine.clone(), SequenceCounter::new());
            s.open(ClientInfo::default(), Capabilities::default()).unwrap();
            assert_eq!(engine.live_states(), 1);
        }
        assert_eq!(engine.live_states(), 0);
        assert_eq!(engine.destroyed_states(), 1);
    }

    #[test]
    fn teardown_after_close_does_not_double_release() {
        let mut s = session();
        s.open(ClientInfo::default(), Capabilities::default()).unwrap();
        s.close().unwrap();
        s.teardown();
        assert_eq!(s.engine().destroyed_states(), 1);
    }

    #[test]
    fn breakpoints_are_kept_per_source_with_unique_ids() {
        let mut s = session();
        let a = Path::new("/tmp/a.qasm");
        let b = Path::new("/tmp/b.qasm");
        let line = |line| RequestedBreakpoint { line, column: None };

        let first = s.store_breakpoints(a, &[line(1), line(2)]);
        let second = s.store_breakpoints(b, &[line(3)]);
        assert_eq!(s.breakpoints_for(a), first.as_slice());
        assert_eq!(s.breakpoints_for(b), second.as_slice());

        let replaced = s.store_breakpoints(a, &[line(4)]);
        let ids: Vec<_> = first.iter().chain(&second).chain(&replaced).map(|bp| bp.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(s.breakpoints_for(a), replaced.as_slice());

        s.store_breakpoints(b, &[]);
        assert!(s.breakpoints_for(b).is_empty());
    }

    #[test]
    fn sequence_counter_is_shared() {
        let counter = SequenceCounter::new();
        let s = SessionState::new(TraceEngine::new(), counter.clone());
        assert_eq!(s.next_seq(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(s.next_seq(), 3);
    }
}
