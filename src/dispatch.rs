use std::cell::RefCell;

use tracing::warn;

use crate::event::{ChangeEvent, Listener};

/// Listener set for hosts without native `hashchange`.
pub(crate) struct Dispatcher {
    listeners: RefCell<Vec<Listener>>,
    isolate_errors: bool,
}

impl Dispatcher {
    pub(crate) fn new(isolate_errors: bool) -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            isolate_errors,
        }
    }

    pub(crate) fn add(&self, listener: Listener) {
        self.listeners.borrow_mut().push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Invokes listeners in registration order and returns how many ran.
    /// Listeners registered during dispatch wait for the next change.
    pub(crate) fn dispatch(&self, event: &ChangeEvent) -> usize {
        let snapshot = self.listeners.borrow().clone();
        let mut invoked = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            invoked += 1;
            if let Err(err) = listener(event) {
                warn!(listener = index, error = %err, event = %event, "hashchange listener failed");
                if !self.isolate_errors {
                    break;
                }
            }
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str, fail: bool) -> Listener {
        let log = Rc::clone(log);
        Rc::new(move |_event: &ChangeEvent| {
            log.borrow_mut().push(name);
            if fail {
                anyhow::bail!("{name} failed");
            }
            Ok(())
        })
    }

    #[test]
    fn failing_listener_does_not_block_later_ones() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dispatcher = Dispatcher::new(true);
        dispatcher.add(recorder(&log, "a", true));
        dispatcher.add(recorder(&log, "b", false));
        assert_eq!(dispatcher.dispatch(&ChangeEvent::hashchange()), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn without_isolation_dispatch_stops_at_first_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dispatcher = Dispatcher::new(false);
        dispatcher.add(recorder(&log, "a", false));
        dispatcher.add(recorder(&log, "b", true));
        dispatcher.add(recorder(&log, "c", false));
        assert_eq!(dispatcher.dispatch(&ChangeEvent::hashchange()), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }
}
