use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, error};

use crate::codec::RESERVED_KEY;
use crate::config::Config;
use crate::env::Environment;
use crate::event::{ChangeEvent, Listener};
use crate::source::{ChangeSource, Mode, NativeChangeSource, PolledChangeSource};
use crate::state::StateAccessor;
use crate::value::{Cast, StateMapping, StateValue};
use crate::{Error, Result};

/// Fragment state and change notifications for one page.
///
/// Register listeners first, then call [`HashHistory::start`] once so the
/// application sees the current state as its first notification.
pub struct HashHistory {
    state: StateAccessor,
    source: Rc<dyn ChangeSource>,
    polled: Option<Rc<PolledChangeSource>>,
    started: Cell<bool>,
    bootstrapping: Cell<bool>,
}

impl HashHistory {
    pub fn new(env: Rc<dyn Environment>) -> Self {
        Self::with_config(env, Config::default())
    }

    pub fn with_config(env: Rc<dyn Environment>, config: Config) -> Self {
        let capabilities = env.capabilities();
        let state = StateAccessor::new(Rc::clone(&env));
        let (source, polled): (Rc<dyn ChangeSource>, _) = if capabilities.native_hashchange() {
            (Rc::new(NativeChangeSource::new(env, &config)), None)
        } else {
            let polled = Rc::new(PolledChangeSource::new(env, config));
            (Rc::clone(&polled) as Rc<dyn ChangeSource>, Some(polled))
        };
        debug!(mode = ?source.mode(), ?capabilities, "hash history created");
        Self {
            state,
            source,
            polled,
            started: Cell::new(false),
            bootstrapping: Cell::new(false),
        }
    }

    pub fn mode(&self) -> Mode {
        self.source.mode()
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + 'static,
    {
        let listener: Listener = Rc::new(listener);
        self.source.add_listener(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.source.listener_count()
    }

    /// Raises the first notification for the current state. Runs once per
    /// context; later calls do nothing.
    pub fn start(&self) -> Result<()> {
        self.bootstrap(None)
    }

    /// Like [`HashHistory::start`], but when `key` is absent the default is
    /// pushed instead and its detection is the first notification.
    pub fn start_with_default(&self, key: &str, value: impl Into<StateValue>) -> Result<()> {
        self.bootstrap(Some((key, value.into())))
    }

    fn bootstrap(&self, default: Option<(&str, StateValue)>) -> Result<()> {
        // A listener may call `start` from inside the first notification.
        if self.started.get() || self.bootstrapping.replace(true) {
            return Ok(());
        }

        let default = default.filter(|(key, _)| {
            !key.is_empty() && *key != RESERVED_KEY && self.state.get(key, Cast::String).is_none()
        });
        let outcome = match default {
            Some((key, value)) => {
                debug!(key, value = %value, "bootstrapping with default state");
                if let Err(err) = self.source.prepare() {
                    self.detection_lost(&err);
                }
                self.state.set(key, value, true)
            }
            None => {
                debug!("bootstrapping with first notification");
                if let Err(err) = self.source.announce() {
                    self.detection_lost(&err);
                }
                Ok(())
            }
        };

        self.started.set(true);
        outcome
    }

    fn detection_lost(&self, err: &Error) {
        error!(error = %err, "fragment change detection unavailable");
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    /// The change source could not be brought up; no notification will fire.
    pub fn detection_failed(&self) -> bool {
        self.source.failed()
    }

    /// Stops polling. Native delivery is owned by the host and keeps going.
    pub fn stop(&self) {
        self.source.stop();
    }

    /// Fragment held by the auxiliary frame, on polled hosts once it loaded.
    pub fn mirrored_fragment(&self) -> Option<String> {
        self.polled
            .as_ref()
            .and_then(|polled| polled.mirrored_fragment().ok())
    }

    pub fn is_polling(&self) -> bool {
        self.polled.as_ref().is_some_and(|polled| polled.is_polling())
    }

    pub fn state(&self) -> &StateAccessor {
        &self.state
    }

    pub fn get(&self, key: &str, cast: Cast) -> Option<StateValue> {
        self.state.get(key, cast)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.state.get_string(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.state.get_int(key)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.state.get_float(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.state.get_bool(key)
    }

    pub fn set(&self, key: &str, value: impl Into<StateValue>, merge: bool) -> Result<()> {
        self.state.set(key, value, merge)
    }

    pub fn set_all(&self, mapping: &StateMapping, merge: bool) -> Result<()> {
        self.state.set_all(mapping, merge)
    }

    pub fn remove(&self, key: Option<&str>) -> Result<()> {
        self.state.remove(key)
    }
}
