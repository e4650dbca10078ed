use std::time::Duration;

use crate::env::FrameAttributes;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_MARKER_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Delay between the end of one poll tick and the start of the next.
    pub poll_interval: Duration,
    /// Length of the numeric token written under the reserved key.
    pub marker_digits: usize,
    pub frame: FrameAttributes,
    /// Keep invoking later listeners after one returns an error.
    pub isolate_listener_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            marker_digits: DEFAULT_MARKER_DIGITS,
            frame: FrameAttributes::default(),
            isolate_listener_errors: true,
        }
    }
}

impl Config {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_marker_digits(mut self, digits: usize) -> Self {
        self.marker_digits = digits.max(1);
        self
    }

    pub fn with_frame(mut self, frame: FrameAttributes) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_listener_isolation(mut self, enabled: bool) -> Self {
        self.isolate_listener_errors = enabled;
        self
    }
}
