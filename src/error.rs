use thiserror::Error;

/// A future was resolved with itself, directly or through a chain of
/// futures that loops back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chaining cycle detected: a future cannot be resolved with itself")]
pub struct ChainingCycle;

/// A general purpose rejection reason.
///
/// Any type can serve as the failure payload of a [`Promise`](crate::Promise)
/// as long as it implements [`Reason`]. This one covers the common case of
/// rejecting with a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Cycle(#[from] ChainingCycle),
    #[error("{0}")]
    Rejected(String),
}

impl Error {
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Rejected(message.into())
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Rejected(message)
    }
}

/// Bound shared by every failure payload.
///
/// The resolution procedure has to produce a [`ChainingCycle`] inside the
/// caller's own reason type, hence the `From` requirement.
pub trait Reason: Clone + From<ChainingCycle> + 'static {}

impl<E> Reason for E where E: Clone + From<ChainingCycle> + 'static {}
