//! A bucket of subscriptions that are released together

use std::cell::{Cell, RefCell};

use ripple_core::{Event, ListenerOutput, Subscription};

/// Collects [`Subscription`]s so they can all be disposed at once.
///
/// Once the store itself has been disposed, anything added to it is disposed
/// right away.
#[derive(Debug, Default)]
pub struct DisposableStore {
    subscriptions: RefCell<Vec<Subscription>>,
    disposed:      Cell<bool>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add `subscription` to the store, returning it back for convenience.
    pub fn add(&self, subscription: Subscription) -> Subscription {
        if self.disposed.get() {
            tracing::trace!("store already disposed, releasing right away");
            subscription.dispose();
        } else {
            self.subscriptions.borrow_mut().push(subscription.clone());
        }
        subscription
    }

    /// Number of subscriptions held.
    pub fn len(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.borrow().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Dispose everything held, but keep accepting new subscriptions.
    pub fn clear(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for subscription in subscriptions {
            subscription.dispose();
        }
    }

    /// Dispose everything held, and everything added from now on.
    pub fn dispose(&self) {
        self.disposed.set(true);
        self.clear();
    }
}

/// Register `f` with `event`, and put the subscription into `store`.
pub fn subscribe_into<T, E, F, R>(event: &E, store: &DisposableStore, f: F) -> Subscription
where
    T: 'static,
    E: Event<T>,
    F: Fn(&T) -> R + 'static,
    R: ListenerOutput,
{
    store.add(event.subscribe(f))
}
