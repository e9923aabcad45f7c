//! Listeners and their registrations
//!
//! A [`Listener`] is a callback, optionally bound to a receiver. Registering
//! one with an emitter wraps it in a fresh registration, which is what the
//! emitter (and the [`Subscription`](crate::Subscription) it hands back)
//! identifies it by. Two registrations of the same listener are therefore
//! independent of each other.

use std::{any::Any, cell::Cell, fmt, rc::Rc};

use derive_where::derive_where;

use crate::error::{BoxError, ListenerError};

/// Values a listener callback is allowed to return.
///
/// `()` for listeners that cannot fail, `Result<(), E>` for listeners that
/// can.
pub trait ListenerOutput {
    fn into_result(self) -> Result<(), ListenerError>;
}

impl ListenerOutput for () {
    #[inline]
    fn into_result(self) -> Result<(), ListenerError> {
        Ok(())
    }
}

impl<E: Into<BoxError>> ListenerOutput for Result<(), E> {
    #[inline]
    fn into_result(self) -> Result<(), ListenerError> {
        self.map_err(ListenerError::new)
    }
}

/// `None` means the listener chose not to do anything with this value.
impl<R: ListenerOutput> ListenerOutput for Option<R> {
    #[inline]
    fn into_result(self) -> Result<(), ListenerError> {
        self.map_or(Ok(()), ListenerOutput::into_result)
    }
}

type Callback<T> = dyn Fn(&T) -> Result<(), ListenerError>;

/// A callback that can be registered with an emitter.
///
/// Cloning a listener is cheap, and the clone shares the callback. This is
/// how the same callback gets registered more than once.
#[derive_where(Clone)]
pub struct Listener<T> {
    callback: Rc<Callback<T>>,
    receiver: Option<Rc<dyn Any>>,
}

impl<T: 'static> Listener<T> {
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&T) -> R + 'static,
        R: ListenerOutput,
    {
        Self {
            callback: Rc::new(move |value: &T| f(value).into_result()),
            receiver: None,
        }
    }

    /// Create a listener whose callback is invoked with `receiver` as its
    /// first argument.
    pub fn bound<Recv, F, R>(receiver: Rc<Recv>, f: F) -> Self
    where
        Recv: 'static,
        F: Fn(&Recv, &T) -> R + 'static,
        R: ListenerOutput,
    {
        let bound = receiver.clone();
        Self {
            callback: Rc::new(move |value: &T| f(&bound, value).into_result()),
            receiver: Some(receiver),
        }
    }
}

impl<T> Listener<T> {
    /// The receiver this listener was bound to, if any.
    pub fn receiver(&self) -> Option<&Rc<dyn Any>> {
        self.receiver.as_ref()
    }

    /// Whether `self` and `other` share the same callback.
    ///
    /// This is about the callback, not about registrations: a listener
    /// registered twice is still the same listener.
    pub fn same_callback(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.callback).cast::<()>(),
            Rc::as_ptr(&other.callback).cast::<()>(),
        )
    }

    #[inline]
    pub(crate) fn invoke(&self, value: &T) -> Result<(), ListenerError> {
        (self.callback)(value)
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("callback", &Rc::as_ptr(&self.callback).cast::<()>())
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// One registration of a listener with an emitter.
///
/// Registrations are always handled behind an `Rc`, and are identified by
/// address. A registration goes dead exactly once, when it is removed from
/// its emitter or the emitter is disposed, and never comes back to life.
#[derive(Debug)]
pub(crate) struct Registration<T> {
    pub(crate) listener: Listener<T>,
    live:                Cell<bool>,
}

impl<T> Registration<T> {
    pub(crate) fn new(listener: Listener<T>) -> Self {
        Self {
            listener,
            live: Cell::new(true),
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.live.get()
    }

    /// Mark this registration dead. Returns whether it was live before.
    #[inline]
    pub(crate) fn retire(&self) -> bool {
        self.live.replace(false)
    }
}
