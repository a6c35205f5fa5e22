//! qdap-core: Shared protocol library for the quantum-circuit debug adapter.
//!
//! Provides the DAP wire envelopes, the adapter capability set, the
//! `Content-Length` framing codec and the protocol error taxonomy.

pub mod capabilities;
pub mod codec;
pub mod error;
pub mod protocol;

// Re-export commonly used items at crate root.
pub use capabilities::Capabilities;
pub use codec::{frame_encode, FrameDecoder, MAX_FRAME_LEN};
pub use error::{DapError, DapResult, ErrorKind};
pub use protocol::{
    DecodedRequest, Event, MessageKind, ProtocolMessage, RequestHeader, Response, ADAPTER_ID,
};
