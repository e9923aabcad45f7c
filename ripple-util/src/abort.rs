//! A one shot cancellation signal
//!
//! An [`AbortController`] owns the right to abort, and hands out
//! [`AbortSignal`]s that can be observed by anyone.

use std::{cell::Cell, rc::Rc};

use ripple_core::{cursor, Emitter as _, Event as _, Subscription};

#[derive(Debug, Default)]
struct Inner {
    aborted:  Cell<bool>,
    on_abort: cursor::Emitter<()>,
}

/// The observing side of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    inner: Rc<Inner>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Call `f` when the signal is aborted.
    ///
    /// Registering on a signal that has already been aborted does nothing, so
    /// callers should check [`AbortSignal::is_aborted`] first.
    pub fn on_abort(&self, f: impl Fn() + 'static) -> Subscription {
        self.inner.on_abort.subscribe(move |_: &()| f())
    }
}

#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self {
            inner: Rc::new(Inner::default()),
        }
    }
}

impl AbortController {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Abort the signal, notifying everyone registered with
    /// [`AbortSignal::on_abort`]. Aborting more than once does nothing.
    pub fn abort(&self) {
        let inner = &self.signal.inner;
        if inner.aborted.replace(true) {
            return
        }
        tracing::debug!("aborting");
        inner.on_abort.fire(());
        inner.on_abort.dispose();
    }
}
