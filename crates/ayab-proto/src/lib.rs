//! AYAB daemon wire contracts.
//!
//! The daemon speaks one JSON object per TCP connection in each direction.
//! This crate owns the request envelope, the reply wrapper, the resource
//! shapes the daemon reports, and the action payloads it accepts.
//! The bridge only needs [`envelope`]; richer shapes are for clients that
//! actually interpret daemon state.

pub mod actions;
pub mod envelope;
pub mod model;

pub use actions::{
    ActionError, CursorAction, DaemonAction, MachineAction, MachineParams, PlatformAction,
    QueueAction, RESOURCE_CURSOR, RESOURCE_MACHINE, RESOURCE_PLATFORM, RESOURCE_QUEUE,
};
pub use envelope::{Envelope, EnvelopeError, METHOD_GET, METHOD_POST, METHOD_PUT, decode_reply};
pub use model::{
    CursorState, DaemonReply, MachineReadiness, MachineStatus, QueueEntry, QueueState, ReplyError,
};
