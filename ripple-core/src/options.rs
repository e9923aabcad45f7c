//! Construction time configuration of an emitter

use std::fmt;

use crate::{error::ListenerError, listener::Listener, Emitter};

type Hook<T> = Box<dyn Fn(&dyn Emitter<T>)>;
type AddHook<T> = Box<dyn Fn(&dyn Emitter<T>, &Listener<T>)>;
type ErrorHook = Box<dyn Fn(ListenerError)>;

/// Hooks called at well defined points of an emitter's life.
///
/// Every hook is optional, and a missing hook costs nothing. Hooks are
/// called with no internal state borrowed, so they are free to call back
/// into the emitter.
pub struct EmitterOptions<T> {
    on_will_add_first_listener:  Option<Hook<T>>,
    on_did_add_first_listener:   Option<Hook<T>>,
    on_did_add_listener:         Option<AddHook<T>>,
    on_will_remove_listener:     Option<Hook<T>>,
    on_did_remove_last_listener: Option<Hook<T>>,
    on_listener_error:           Option<ErrorHook>,
}

impl<T> Default for EmitterOptions<T> {
    fn default() -> Self {
        Self {
            on_will_add_first_listener:  None,
            on_did_add_first_listener:   None,
            on_did_add_listener:         None,
            on_will_remove_listener:     None,
            on_did_remove_last_listener: None,
            on_listener_error:           None,
        }
    }
}

impl<T> EmitterOptions<T> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Called before the first listener is added to an empty emitter.
    pub fn on_will_add_first_listener(mut self, f: impl Fn(&dyn Emitter<T>) + 'static) -> Self {
        self.on_will_add_first_listener = Some(Box::new(f));
        self
    }

    /// Called after the first listener is added to an empty emitter.
    pub fn on_did_add_first_listener(mut self, f: impl Fn(&dyn Emitter<T>) + 'static) -> Self {
        self.on_did_add_first_listener = Some(Box::new(f));
        self
    }

    /// Called after any listener is added, after the "first listener" hooks.
    pub fn on_did_add_listener(
        mut self,
        f: impl Fn(&dyn Emitter<T>, &Listener<T>) + 'static,
    ) -> Self {
        self.on_did_add_listener = Some(Box::new(f));
        self
    }

    /// Called before a listener is detached through its subscription.
    pub fn on_will_remove_listener(mut self, f: impl Fn(&dyn Emitter<T>) + 'static) -> Self {
        self.on_will_remove_listener = Some(Box::new(f));
        self
    }

    /// Called after the last listener is gone, either because it was
    /// detached or because the emitter was disposed.
    pub fn on_did_remove_last_listener(mut self, f: impl Fn(&dyn Emitter<T>) + 'static) -> Self {
        self.on_did_remove_last_listener = Some(Box::new(f));
        self
    }

    /// Route listener failures to `f` instead of panicking.
    pub fn on_listener_error(mut self, f: impl Fn(ListenerError) + 'static) -> Self {
        self.on_listener_error = Some(Box::new(f));
        self
    }

    pub(crate) fn will_add_first_listener(&self, emitter: &dyn Emitter<T>) {
        if let Some(hook) = &self.on_will_add_first_listener {
            hook(emitter)
        }
    }

    pub(crate) fn did_add_first_listener(&self, emitter: &dyn Emitter<T>) {
        if let Some(hook) = &self.on_did_add_first_listener {
            hook(emitter)
        }
    }

    pub(crate) fn did_add_listener(&self, emitter: &dyn Emitter<T>, listener: &Listener<T>) {
        if let Some(hook) = &self.on_did_add_listener {
            hook(emitter, listener)
        }
    }

    pub(crate) fn will_remove_listener(&self, emitter: &dyn Emitter<T>) {
        if let Some(hook) = &self.on_will_remove_listener {
            hook(emitter)
        }
    }

    pub(crate) fn did_remove_last_listener(&self, emitter: &dyn Emitter<T>) {
        if let Some(hook) = &self.on_did_remove_last_listener {
            hook(emitter)
        }
    }

    /// Invoke `listener` with `value`, and deal with its failure.
    ///
    /// # Panics
    ///
    /// If the listener fails and there is no `on_listener_error` hook.
    pub(crate) fn deliver(&self, listener: &Listener<T>, value: &T) {
        let Err(error) = listener.invoke(value) else {
            return
        };
        match &self.on_listener_error {
            Some(hook) => {
                tracing::debug!(%error, "listener failed");
                hook(error)
            },
            None => panic!("unhandled listener error: {error}"),
        }
    }
}

impl<T> fmt::Debug for EmitterOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterOptions")
            .field(
                "on_will_add_first_listener",
                &self.on_will_add_first_listener.is_some(),
            )
            .field(
                "on_did_add_first_listener",
                &self.on_did_add_first_listener.is_some(),
            )
            .field("on_did_add_listener", &self.on_did_add_listener.is_some())
            .field(
                "on_will_remove_listener",
                &self.on_will_remove_listener.is_some(),
            )
            .field(
                "on_did_remove_last_listener",
                &self.on_did_remove_last_listener.is_some(),
            )
            .field("on_listener_error", &self.on_listener_error.is_some())
            .finish()
    }
}
