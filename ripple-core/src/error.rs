use thiserror::Error;

/// The error type listeners are allowed to fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure returned by a listener while it was being invoked.
///
/// When the emitter was configured with an `on_listener_error` hook, the
/// error is handed to that hook and dispatch continues with the remaining
/// listeners. Otherwise `fire` panics with it.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct ListenerError {
    #[source]
    source: BoxError,
}

impl ListenerError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Attempt to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref()
    }

    pub fn into_inner(self) -> BoxError {
        self.source
    }
}
