use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::Result;
use crate::bridge::Bridge;
use crate::codec;
use crate::dispatch::Dispatcher;
use crate::env::{Environment, TimerId};
use crate::event::ChangeEvent;

/// Shared stop flag for the poll loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Idle,
    /// The page fragment moved; the mirror followed and listeners ran.
    Forward,
    /// The mirror moved (back/forward through the frame); the page was sent
    /// to the mirrored fragment.
    Restored,
    Cancelled,
}

pub(crate) struct Poller {
    env: Rc<dyn Environment>,
    bridge: Bridge,
    dispatcher: Rc<Dispatcher>,
    last_hash: RefCell<String>,
    interval: Duration,
    token: CancelToken,
    pending: Cell<Option<TimerId>>,
}

impl Poller {
    pub(crate) fn new(
        env: Rc<dyn Environment>,
        bridge: Bridge,
        dispatcher: Rc<Dispatcher>,
        last_hash: String,
        interval: Duration,
        token: CancelToken,
    ) -> Self {
        Self {
            env,
            bridge,
            dispatcher,
            last_hash: RefCell::new(last_hash),
            interval,
            token,
            pending: Cell::new(None),
        }
    }

    /// Runs one reconciliation step, then schedules the next tick. The next
    /// delay starts only after this tick's effects are applied.
    pub(crate) fn tick(self: &Rc<Self>) -> TickOutcome {
        self.pending.set(None);
        if self.token.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        let outcome = self.reconcile().unwrap_or_else(|err| {
            warn!(error = %err, "poll tick could not read the auxiliary frame");
            TickOutcome::Idle
        });
        self.schedule();
        outcome
    }

    fn reconcile(&self) -> Result<TickOutcome> {
        let href = self.env.location();
        let hash = codec::fragment_of(&href);
        let history_hash = self.bridge.mirrored_fragment()?;
        let last = self.last_hash.borrow().clone();

        if hash != last {
            debug!(from = %last, to = %hash, mirror = %history_hash, "page fragment changed");
            self.last_hash.replace(hash.clone());
            if let Err(err) = self.bridge.set_mirrored_fragment(&hash, &history_hash) {
                warn!(error = %err, "failed to mirror page fragment");
            }
            let base = codec::without_fragment(&href);
            let event = ChangeEvent::with_urls(format!("{base}{last}"), href.clone());
            self.dispatcher.dispatch(&event);
            Ok(TickOutcome::Forward)
        } else if history_hash != last {
            debug!(from = %last, to = %history_hash, "frame history moved");
            let base = codec::without_fragment(&href);
            self.env.navigate(&format!("{base}{history_hash}"));
            Ok(TickOutcome::Restored)
        } else {
            trace!(hash = %hash, "poll tick idle");
            Ok(TickOutcome::Idle)
        }
    }

    fn schedule(self: &Rc<Self>) {
        if self.token.is_cancelled() {
            return;
        }
        let this = Rc::clone(self);
        let id = self.env.set_timeout(
            self.interval,
            Box::new(move || {
                this.tick();
            }),
        );
        self.pending.set(Some(id));
    }

    pub(crate) fn stop(&self) {
        self.token.cancel();
        if let Some(id) = self.pending.take() {
            self.env.clear_timeout(id);
        }
    }

    pub(crate) fn last_hash(&self) -> String {
        self.last_hash.borrow().clone()
    }

    pub(crate) fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}
