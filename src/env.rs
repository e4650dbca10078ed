use std::time::Duration;

use crate::Result;
use crate::event::{ChangeEvent, Listener};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// What the host offers for fragment-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// The window exposes an `onhashchange` hook.
    pub hashchange_event: bool,
    /// Compatibility document mode, when the engine reports one.
    pub document_mode: Option<u32>,
    /// Synthetic events can be constructed and dispatched on the window.
    pub create_event: bool,
}

impl Capabilities {
    pub fn modern() -> Self {
        Self {
            hashchange_event: true,
            document_mode: None,
            create_event: true,
        }
    }

    /// An engine running in IE7-or-older document mode.
    pub fn legacy() -> Self {
        Self {
            hashchange_event: false,
            document_mode: Some(7),
            create_event: false,
        }
    }

    /// Native `hashchange` that can be trusted. A document mode of 7 or
    /// lower exposes the hook but never fires it reliably.
    pub fn native_hashchange(&self) -> bool {
        self.hashchange_event && self.document_mode.is_none_or(|mode| mode > 7)
    }
}

/// Attributes of the hidden auxiliary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAttributes {
    pub id: String,
    pub tab_index: i32,
    pub title: String,
    pub src: String,
    pub hidden: bool,
}

impl Default for FrameAttributes {
    fn default() -> Self {
        Self {
            id: "shistory".to_string(),
            tab_index: -1,
            title: "empty".to_string(),
            src: "javascript:0".to_string(),
            hidden: true,
        }
    }
}

/// The browsing context the engine runs in.
///
/// Methods take `&self` because the host calls back into the engine from
/// timers, frame loads and native listeners while the engine keeps a handle
/// to it. Implementations must not hold internal borrows while invoking a
/// callback.
pub trait Environment {
    fn capabilities(&self) -> Capabilities;

    /// Full address of the page.
    fn location(&self) -> String;

    /// Assigns the full address of the page.
    fn navigate(&self, href: &str);

    /// Assigns only the fragment; a leading `#` is optional.
    fn set_hash(&self, hash: &str);

    fn add_native_listener(&self, listener: Listener);

    /// Synchronously dispatches a synthetic event on the window.
    fn dispatch_native(&self, event: &ChangeEvent);

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    fn clear_timeout(&self, id: TimerId);

    /// Creates a hidden frame appended to the document body. `on_load` runs
    /// once the frame has finished loading, never synchronously.
    fn create_frame(
        &self,
        attributes: &FrameAttributes,
        on_load: Box<dyn FnOnce(FrameId)>,
    ) -> Result<FrameId>;

    fn frame_location(&self, frame: FrameId) -> Result<String>;

    fn frame_open(&self, frame: FrameId) -> Result<()>;

    fn frame_close(&self, frame: FrameId) -> Result<()>;

    fn frame_set_hash(&self, frame: FrameId, hash: &str) -> Result<()>;

    /// Random string of `len` decimal digits.
    fn random_digits(&self, len: usize) -> String;
}
