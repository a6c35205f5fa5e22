//! `initialize`: negotiate capabilities and create the simulation state.

use super::{DapCommand, HandlerOutput};
use crate::dispatch::registry::Admission;
use crate::engine::SimulationEngine;
use crate::session::{ClientInfo, SessionState};
use qdap_core::{Capabilities, DapError, DapResult, DecodedRequest, Event, Response, ADAPTER_ID};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InitializeArguments {
    #[serde(rename = "clientID")]
    client_id: String,
    client_name: String,
    #[serde(rename = "adapterID")]
    adapter_id: String,
    path_format: String,
    lines_start_at1: bool,
    columns_start_at1: bool,
}

/// The `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeMessage {
    pub seq: i64,
    pub client_id: String,
    pub client_name: String,
    pub adapter_id: String,
    pub path_format: String,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
}

impl DapCommand for InitializeMessage {
    const COMMAND: &'static str = "initialize";
    const ADMISSION: Admission = Admission::Uninitialized;

    fn parse(request: &DecodedRequest) -> DapResult<Self> {
        let args: InitializeArguments = request.require_arguments()?;
        Ok(Self {
            seq: request.seq,
            client_id: args.client_id,
            client_name: args.client_name,
            adapter_id: args.adapter_id,
            path_format: args.path_format,
            lines_start_at1: args.lines_start_at1,
            columns_start_at1: args.columns_start_at1,
        })
    }

    fn sequence_number(&self) -> i64 {
        self.seq
    }

    fn validate(&self) -> DapResult<()> {
        if self.adapter_id != ADAPTER_ID {
            return Err(DapError::Validation(format!(
                "adapter ID must be `{ADAPTER_ID}`, was `{}`",
                self.adapter_id
            )));
        }
        Ok(())
    }

    fn handle<E: SimulationEngine>(&self, session: &mut SessionState<E>) -> DapResult<HandlerOutput> {
        let client = ClientInfo {
            client_id: self.client_id.clone(),
            client_name: self.client_name.clone(),
            path_format: self.path_format.clone(),
            lines_start_at1: self.lines_start_at1,
            columns_start_at1: self.columns_start_at1,
        };
        let capabilities = session.open(client, Capabilities::adapter_defaults())?;
        let body = serde_json::to_value(capabilities)?;

        Ok(HandlerOutput::full(Response::success(self.seq, Self::COMMAND, body))
            .with_event(Event::new("initialized", None)))
    }
}
