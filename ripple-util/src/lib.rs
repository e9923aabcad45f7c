//! Adapters on top of [`ripple_core`] events
//!
//! Everything here only uses the public [`Event`] interface, so it works with
//! any emitter engine.
//!
//! - [`once`] listens for a single value.
//! - [`to_promise`] and [`to_promise_with_signal`] turn the next value into a
//!   future, the latter racing it against an [`AbortSignal`].
//! - [`DisposableStore`] collects subscriptions to release them together.

use std::{cell::RefCell, future::Future, rc::Rc};

use futures_channel::oneshot;
use ripple_core::{Event, Listener, ListenerOutput, Subscription};

pub mod abort;
pub mod store;

pub use abort::{AbortController, AbortSignal};
pub use store::{subscribe_into, DisposableStore};

/// Register `f` to receive only the next value fired by `event`.
///
/// The registration is detached before `f` runs, so `f` sees exactly one
/// value even if it fires `event` again.
pub fn once<T, E, F, R>(event: &E, f: F) -> Subscription
where
    T: 'static,
    E: Event<T> + ?Sized,
    F: FnOnce(&T) -> R + 'static,
    R: ListenerOutput + 'static,
{
    let pending = Rc::new(RefCell::new(Some(f)));
    let this: Rc<RefCell<Option<Subscription>>> = Default::default();
    let subscription = event.subscribe_listener(Listener::new({
        let pending = pending.clone();
        let this = this.clone();
        move |value: &T| {
            let f = pending.borrow_mut().take()?;
            let this = this.borrow_mut().take();
            if let Some(this) = this {
                this.dispose();
            }
            Some(f(value))
        }
    }));
    if pending.borrow().is_none() {
        // Already fired from one of the emitter's hooks.
        subscription.dispose();
    } else {
        *this.borrow_mut() = Some(subscription.clone());
    }
    subscription
}

/// Detaches everything in the store when the future holding it is dropped.
struct DetachOnDrop(Rc<DisposableStore>);

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

fn settle<T>(sender: &RefCell<Option<oneshot::Sender<T>>>, value: T) {
    if let Some(sender) = sender.borrow_mut().take() {
        // The receiving future might have been dropped already.
        let _ = sender.send(value);
    }
}

/// A future that resolves with the next value fired by `event`.
///
/// If `event` never fires again, for example because its emitter is
/// disposed, the future never resolves. Dropping the future detaches its
/// listener.
pub fn to_promise<T, E>(event: &E) -> impl Future<Output = T> + 'static
where
    T: Clone + 'static,
    E: Event<T> + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    let store = Rc::new(DisposableStore::new());
    store.add(once(event, move |value: &T| {
        // The receiving future might have been dropped already.
        let _ = tx.send(value.clone());
    }));
    let detach = DetachOnDrop(store);
    async move {
        let _detach = detach;
        match rx.await {
            Ok(value) => value,
            Err(oneshot::Canceled) => {
                tracing::trace!("event source is gone, waiting forever");
                futures_util::future::pending().await
            },
        }
    }
}

/// Like [`to_promise`], but resolves with `None` once `signal` is aborted,
/// if that happens before `event` fires.
///
/// Whichever side wins, the other one is detached. An already aborted signal
/// resolves with `None` without registering anything.
pub fn to_promise_with_signal<T, E>(
    event: &E,
    signal: &AbortSignal,
) -> impl Future<Output = Option<T>> + 'static
where
    T: Clone + 'static,
    E: Event<T> + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    let store = Rc::new(DisposableStore::new());
    if signal.is_aborted() {
        let _ = tx.send(None);
    } else {
        let tx = Rc::new(RefCell::new(Some(tx)));
        store.add(once(event, {
            let tx = tx.clone();
            let store = store.clone();
            move |value: &T| {
                store.dispose();
                settle(&*tx, Some(value.clone()));
            }
        }));
        store.add(signal.on_abort({
            let store = store.clone();
            move || {
                store.dispose();
                settle(&*tx, None);
            }
        }));
    }
    let detach = DetachOnDrop(store);
    async move {
        let _detach = detach;
        match rx.await {
            Ok(value) => value,
            Err(oneshot::Canceled) => {
                tracing::trace!("event source and signal are both gone, waiting forever");
                futures_util::future::pending().await
            },
        }
    }
}
