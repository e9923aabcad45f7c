//! Typed, single threaded event emitters
//!
//! An emitter holds a set of listeners, and [`Emitter::fire`] hands a value to
//! every listener that was registered before the call started, in the order
//! they were registered. Listeners are free to do anything to the emitter
//! while they are being invoked: register or detach listeners (including
//! themselves), fire the emitter again, or dispose it.
//!
//! Firing from inside a listener is delivered depth first. The nested `fire`
//! first finishes delivering the outer value to the listeners that have not
//! seen it yet, then delivers its own value to everyone, and only then
//! returns. So every listener always observes values in the order they were
//! fired.
//!
//! Two engines implement this, with identical observable behavior:
//!
//!   - [`cursor::Emitter`] keeps listeners in a vector, and walks it with a
//!     single cursor shared by all nested dispatches.
//!   - [`queue::Emitter`] keeps listeners in a linked list, and pushes
//!     (listener, value) pairs through a FIFO delivery queue.
//!
//! Pick one by type, or at runtime with [`Strategy`].

use std::rc::Rc;

use derive_where::derive_where;

pub mod cursor;
pub mod error;
pub mod listener;
pub mod options;
pub mod queue;
pub mod subscription;

pub use error::{BoxError, ListenerError};
pub use listener::{Listener, ListenerOutput};
pub use options::EmitterOptions;
pub use subscription::Subscription;

/// Something listeners can be registered with.
pub trait Event<T> {
    /// Register `listener`. Each call creates a new registration, even if
    /// `listener` is already registered, and the returned [`Subscription`]
    /// removes exactly that registration.
    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription;

    fn subscribe<F, R>(&self, f: F) -> Subscription
    where
        Self: Sized,
        T: 'static,
        F: Fn(&T) -> R + 'static,
        R: ListenerOutput,
    {
        self.subscribe_listener(Listener::new(f))
    }

    /// Register `f` bound to `receiver`, see [`Listener::bound`].
    fn subscribe_bound<Recv, F, R>(&self, receiver: Rc<Recv>, f: F) -> Subscription
    where
        Self: Sized,
        T: 'static,
        Recv: 'static,
        F: Fn(&Recv, &T) -> R + 'static,
        R: ListenerOutput,
    {
        self.subscribe_listener(Listener::bound(receiver, f))
    }
}

/// The producer side of an event.
pub trait Emitter<T>: Event<T> {
    /// Deliver `value` to every listener registered before this call, that
    /// has not been detached by the time its turn comes.
    ///
    /// # Panics
    ///
    /// If a listener fails and the emitter has no `on_listener_error` hook.
    fn fire(&self, value: T);

    /// Number of listeners currently registered.
    fn size(&self) -> usize;

    fn has_listeners(&self) -> bool {
        self.size() != 0
    }

    fn is_disposed(&self) -> bool;

    /// Drop every listener without invoking them. Afterwards `fire` does
    /// nothing, and new registrations are ignored.
    fn dispose(&self);
}

/// Selects one of the emitter engines at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Cursor,
    Queue,
}

impl Strategy {
    pub fn build<T: 'static>(self, options: EmitterOptions<T>) -> AnyEmitter<T> {
        match self {
            Self::Cursor => AnyEmitter::Cursor(cursor::Emitter::with_options(options)),
            Self::Queue => AnyEmitter::Queue(queue::Emitter::with_options(options)),
        }
    }
}

/// An emitter whose engine was picked with [`Strategy`].
#[derive_where(Clone, Debug)]
pub enum AnyEmitter<T> {
    Cursor(cursor::Emitter<T>),
    Queue(queue::Emitter<T>),
}

impl<T> AnyEmitter<T> {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Cursor(_) => Strategy::Cursor,
            Self::Queue(_) => Strategy::Queue,
        }
    }
}

impl<T: 'static> Event<T> for AnyEmitter<T> {
    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        match self {
            Self::Cursor(emitter) => emitter.subscribe_listener(listener),
            Self::Queue(emitter) => emitter.subscribe_listener(listener),
        }
    }
}

impl<T: 'static> Emitter<T> for AnyEmitter<T> {
    fn fire(&self, value: T) {
        match self {
            Self::Cursor(emitter) => emitter.fire(value),
            Self::Queue(emitter) => emitter.fire(value),
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Cursor(emitter) => emitter.size(),
            Self::Queue(emitter) => emitter.size(),
        }
    }

    fn is_disposed(&self) -> bool {
        match self {
            Self::Cursor(emitter) => emitter.is_disposed(),
            Self::Queue(emitter) => emitter.is_disposed(),
        }
    }

    fn dispose(&self) {
        match self {
            Self::Cursor(emitter) => emitter.dispose(),
            Self::Queue(emitter) => emitter.dispose(),
        }
    }
}
