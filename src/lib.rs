//! Named state stored in the page's URL fragment, with change notifications.
//!
//! Hosts that raise `hashchange` natively get their listeners attached
//! directly. Legacy hosts get a hidden auxiliary frame whose history mirrors
//! the page fragment, plus a fixed-cadence poll that turns fragment
//! divergence into change notifications and surfaces back/forward moves made
//! through the frame's history.
//!
//! The host is abstracted behind [`Environment`]; [`sim::SimBrowser`] is a
//! deterministic in-memory implementation with a model clock.

use thiserror::Error;

mod bridge;
pub mod codec;
mod config;
mod dispatch;
mod env;
mod event;
mod history;
mod poller;
pub mod sim;
mod source;
mod state;
mod value;

pub use bridge::Bridge;
pub use codec::RESERVED_KEY;
pub use config::{Config, DEFAULT_MARKER_DIGITS, DEFAULT_POLL_INTERVAL};
pub use env::{Capabilities, Environment, FrameAttributes, FrameId, TimerId};
pub use event::{ChangeEvent, HASHCHANGE, Listener};
pub use history::HashHistory;
pub use poller::CancelToken;
pub use source::{ChangeSource, Mode, NativeChangeSource, PolledChangeSource};
pub use state::StateAccessor;
pub use value::{Cast, StateMapping, StateValue};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("auxiliary frame unavailable: {0}")]
    FrameUnavailable(String),
    #[error("unknown cast: {0}")]
    UnknownCast(String),
    #[error("environment error: {0}")]
    Environment(String),
}
