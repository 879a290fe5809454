//! Client-side state synchronization against the AYAB bridge.
//!
//! [`Synchronizer`] owns the view model of one session and is the only thing
//! that mutates it. Transports plug in through [`BridgeApi`].

pub mod schedule;
pub mod sync;
pub mod transport;
pub mod view;

pub use schedule::PollSchedule;
pub use sync::{DEFAULT_POLL_INTERVAL, SyncCommand, SyncConfig, Synchronizer};
pub use transport::{
    BridgeApi, DEFAULT_BRIDGE_URL, DEFAULT_FETCH_TIMEOUT, HttpBridgeApi, SyncError,
};
pub use view::{ClientViewModel, PendingCursorEdit, RenderedEntry, RenderedQueue, render_queue};
