use std::{cell::RefCell, fmt, rc::Rc};

type Release = Box<dyn FnOnce()>;

/// A handle to a registered listener.
///
/// Calling [`dispose`](Self::dispose) detaches the listener from its emitter.
/// The release logic is dropped the first time it runs, so disposing again,
/// disposing after the emitter itself was disposed, or disposing from inside
/// the listener while it is being invoked, are all fine.
///
/// Dropping a `Subscription` does *not* detach the listener. Clones share the
/// same release logic, disposing any of them disposes all of them.
#[derive(Clone, Default)]
pub struct Subscription {
    release: Rc<RefCell<Option<Release>>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Rc::new(RefCell::new(Some(Box::new(release)))),
        }
    }

    /// A subscription that has nothing to release.
    pub fn disposed() -> Self {
        Self::default()
    }

    /// Detach the listener. Only the first call does anything.
    pub fn dispose(&self) {
        // The borrow must end before `release` runs, it can call back into us.
        let release = self.release.borrow_mut().take();
        if let Some(release) = release {
            release()
        }
    }

    /// Whether calling [`dispose`](Self::dispose) would still do something.
    pub fn is_active(&self) -> bool {
        self.release.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use super::Subscription;

    #[test]
    fn release_runs_once() {
        let count = Rc::new(Cell::new(0));
        let subscription = {
            let count = count.clone();
            Subscription::new(move || count.set(count.get() + 1))
        };
        let clone = subscription.clone();
        assert!(subscription.is_active());
        subscription.dispose();
        subscription.dispose();
        clone.dispose();
        assert_eq!(count.get(), 1);
        assert!(!clone.is_active());
    }

    #[test]
    fn release_drops_captures() {
        let captured = Rc::new(());
        let subscription = {
            let captured = captured.clone();
            Subscription::new(move || drop(captured))
        };
        assert_eq!(Rc::strong_count(&captured), 2);
        subscription.dispose();
        // The token is still around, but it no longer keeps anything alive.
        assert_eq!(Rc::strong_count(&captured), 1);
        assert!(!Subscription::disposed().is_active());
    }

    #[test]
    fn release_may_dispose_itself() {
        let slot: Rc<std::cell::RefCell<Option<Subscription>>> = Default::default();
        let subscription = {
            let slot = slot.clone();
            Subscription::new(move || {
                if let Some(subscription) = slot.borrow().as_ref() {
                    subscription.dispose();
                }
            })
        };
        *slot.borrow_mut() = Some(subscription.clone());
        subscription.dispose();
        assert!(!subscription.is_active());
    }
}
