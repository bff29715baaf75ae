use std::sync::Arc;

/// The failure half of a pull.
///
/// `Error` is cheap to clone: one upstream failure is handed to every waiter
/// that was logically waiting on it, and poisoned components hand the same
/// value out again on every later call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The underlying source or producer reported a failure.
    #[error("upstream failed: {0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),

    /// A transport read failed.
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),

    /// The other side of a handoff went away before delivering a result: a
    /// bridge producer while a pull was outstanding, or an [`Alerting`]
    /// wrapper dropped before its sequence finished.
    ///
    /// [`Alerting`]: crate::Alerting
    #[error("producer closed before the pull was resolved")]
    Closed,

    /// The tail of a `split_when` pair was pulled before the head reached the boundary.
    #[error("split tail pulled before the head was drained past the boundary")]
    SplitOrder,
}

impl Error {
    /// Wraps an arbitrary error as an upstream failure.
    pub fn upstream<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream(Arc::new(error))
    }

    /// Builds an upstream failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Upstream(Arc::new(Message(message.into())))
    }

    /// Returns true if both values came from the same original failure.
    pub fn same_as(&self, other: &Error) -> bool {
        match (self, other) {
            (Self::Upstream(a), Self::Upstream(b)) => Arc::ptr_eq(a, b),
            (Self::Io(a), Self::Io(b)) => Arc::ptr_eq(a, b),
            (Self::Closed, Self::Closed) | (Self::SplitOrder, Self::SplitOrder) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

#[derive(Debug)]
struct Message(String);

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

pub type Result<T, E = Error> = std::result::Result<T, E>;
