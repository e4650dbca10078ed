use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, error};

use crate::bridge::Bridge;
use crate::codec::{self, RESERVED_KEY};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::env::Environment;
use crate::event::{ChangeEvent, Listener};
use crate::poller::{CancelToken, Poller};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Native,
    Polled,
}

/// Where change notifications come from. Chosen once per context from the
/// host's capabilities.
pub trait ChangeSource {
    fn mode(&self) -> Mode;

    fn add_listener(&self, listener: Listener);

    fn listener_count(&self) -> usize;

    /// Gets detection running so a state push made right after is observed.
    fn prepare(&self) -> Result<()>;

    /// Raises the first notification without waiting for a real change.
    fn announce(&self) -> Result<()>;

    fn stop(&self);

    /// Detection can no longer fire.
    fn failed(&self) -> bool {
        false
    }
}

/// Delegates to the host's own `hashchange`.
pub struct NativeChangeSource {
    env: Rc<dyn Environment>,
    marker_digits: usize,
    registered: Cell<usize>,
}

impl NativeChangeSource {
    pub fn new(env: Rc<dyn Environment>, config: &Config) -> Self {
        Self {
            env,
            marker_digits: config.marker_digits,
            registered: Cell::new(0),
        }
    }

    /// Rewrites the fragment with a fresh reserved marker so the host sees a
    /// new navigation.
    fn bump_marker(&self) {
        let hash = codec::hash_of(&self.env.location());
        let body = hash.strip_prefix('#').unwrap_or(&hash);
        let mut next = codec::strip_markers(body);
        if !next.is_empty() {
            next.push('&');
        }
        let token = self.env.random_digits(self.marker_digits);
        next.push_str(&format!("{RESERVED_KEY}={token}"));
        debug!(hash = %next, "forcing hashchange with marker");
        self.env.set_hash(&format!("#{next}"));
    }
}

impl ChangeSource for NativeChangeSource {
    fn mode(&self) -> Mode {
        Mode::Native
    }

    fn add_listener(&self, listener: Listener) {
        self.registered.set(self.registered.get() + 1);
        self.env.add_native_listener(listener);
    }

    fn listener_count(&self) -> usize {
        self.registered.get()
    }

    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn announce(&self) -> Result<()> {
        if self.env.capabilities().create_event {
            debug!("dispatching synthetic hashchange");
            self.env.dispatch_native(&ChangeEvent::hashchange());
        } else {
            self.bump_marker();
        }
        Ok(())
    }

    fn stop(&self) {}
}

/// Hidden-frame mirror plus fixed-cadence polling.
pub struct PolledChangeSource {
    env: Rc<dyn Environment>,
    config: Config,
    dispatcher: Rc<Dispatcher>,
    poller: Rc<RefCell<Option<Rc<Poller>>>>,
    launched: Cell<bool>,
    failed: Rc<Cell<bool>>,
    token: CancelToken,
}

impl PolledChangeSource {
    pub fn new(env: Rc<dyn Environment>, config: Config) -> Self {
        let dispatcher = Rc::new(Dispatcher::new(config.isolate_listener_errors));
        Self {
            env,
            config,
            dispatcher,
            poller: Rc::new(RefCell::new(None)),
            launched: Cell::new(false),
            failed: Rc::new(Cell::new(false)),
            token: CancelToken::new(),
        }
    }

    /// Builds the bridge and starts polling once it has loaded. With
    /// `announce`, listeners also run once right after the first tick.
    /// Later calls are no-ops.
    fn launch(&self, announce: bool) -> Result<()> {
        if self.launched.replace(true) {
            return Ok(());
        }

        let last_hash = codec::fragment_of(&self.env.location());
        let env = Rc::clone(&self.env);
        let dispatcher = Rc::clone(&self.dispatcher);
        let slot = Rc::clone(&self.poller);
        let failed = Rc::clone(&self.failed);
        let token = self.token.clone();
        let interval = self.config.poll_interval;

        let created = Bridge::initialize(
            Rc::clone(&self.env),
            &self.config.frame,
            move |ready: Result<Bridge>| {
                let bridge = match ready {
                    Ok(bridge) => bridge,
                    Err(err) => {
                        failed.set(true);
                        error!(error = %err, "auxiliary frame failed to load; fragment changes will not be detected");
                        return;
                    }
                };
                if token.is_cancelled() {
                    return;
                }
                let poller = Rc::new(Poller::new(
                    Rc::clone(&env),
                    bridge,
                    Rc::clone(&dispatcher),
                    last_hash,
                    interval,
                    token,
                ));
                *slot.borrow_mut() = Some(Rc::clone(&poller));
                debug!(interval_ms = interval.as_millis() as u64, "polling started");
                poller.tick();
                if announce {
                    let href = env.location();
                    dispatcher.dispatch(&ChangeEvent::with_urls(href.clone(), href));
                }
            },
        );

        if let Err(err) = created {
            self.failed.set(true);
            return Err(err);
        }
        Ok(())
    }

    /// Fragment currently held by the auxiliary frame.
    pub fn mirrored_fragment(&self) -> Result<String> {
        match self.poller.borrow().as_ref() {
            Some(poller) => poller.bridge().mirrored_fragment(),
            None => Err(Error::FrameUnavailable(
                "auxiliary frame has not loaded".to_string(),
            )),
        }
    }

    /// Last page fragment the poller acted on, once polling runs.
    pub fn last_observed(&self) -> Option<String> {
        self.poller.borrow().as_ref().map(|poller| poller.last_hash())
    }

    pub fn is_polling(&self) -> bool {
        self.poller.borrow().is_some() && !self.token.is_cancelled()
    }
}

impl ChangeSource for PolledChangeSource {
    fn mode(&self) -> Mode {
        Mode::Polled
    }

    fn add_listener(&self, listener: Listener) {
        self.dispatcher.add(listener);
    }

    fn listener_count(&self) -> usize {
        self.dispatcher.len()
    }

    fn prepare(&self) -> Result<()> {
        self.launch(false)
    }

    fn announce(&self) -> Result<()> {
        self.launch(true)
    }

    fn stop(&self) {
        self.token.cancel();
        if let Some(poller) = self.poller.borrow().as_ref() {
            poller.stop();
        }
        debug!("polling stopped");
    }

    fn failed(&self) -> bool {
        self.failed.get()
    }
}
