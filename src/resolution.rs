//! The resolution procedure.
//!
//! Whatever a handler produces is a [`Resolution`]: a plain value, one of our
//! own promises, or a foreign [`Thenable`]. The last two are adopted: the
//! target promise settles however they settle, unwrapping nested futures as
//! deep as they go.
//!
//! A thenable is anything that can hand its eventual outcome to a
//! [`Continuation`]:
//!
//! ```
//! use std::rc::Rc;
//!
//! use thenable::{Continuation, Error, Promise, PromiseState, Resolution, TaskQueue, Thenable};
//!
//! struct Ready(u8);
//!
//! impl Thenable<u8, Error> for Ready {
//!     fn then(&self, continuation: Continuation<u8, Error>) -> Result<(), Error> {
//!         continuation.fulfill(self.0);
//!         // a second call is ignored.
//!         continuation.reject(Error::msg("ignored"));
//!         Ok(())
//!     }
//! }
//!
//! let queue = TaskQueue::new();
//! let ready = Resolution::Thenable(Rc::new(Ready(7)));
//! let promise = Promise::<u8, Error>::resolved(&queue.scheduler(), ready);
//! assert_eq!(promise.state(), PromiseState::Fulfilled(7));
//! ```
use std::{cell::Cell, fmt, rc::Rc};

use log::{debug, warn};

use crate::{
    error::{ChainingCycle, Reason},
    promise::Promise,
};

/// What a handler hands back to settle the next promise with.
pub enum Resolution<T, E> {
    Value(T),
    Future(Promise<T, E>),
    Thenable(Rc<dyn Thenable<T, E>>),
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Future(promise)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Future(promise) => f.debug_tuple("Future").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// Result of looking up a thenable's chaining operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThenKind<T> {
    /// Call [`Thenable::then`].
    Callable,
    /// There is nothing to call; the object is a plain value after all.
    NotCallable(T),
}

/// A future-like object from any implementation.
pub trait Thenable<T, E> {
    /// Looks up the chaining operation before it is called. An `Err` here
    /// rejects the adopting promise.
    fn then_kind(&self) -> Result<ThenKind<T>, E> {
        Ok(ThenKind::Callable)
    }

    /// Registers `continuation` to receive the outcome. May call it right
    /// away, later, or more than once; only the first call counts. An `Err`
    /// rejects the adopting promise unless the continuation already fired.
    fn then(&self, continuation: Continuation<T, E>) -> Result<(), E>;

    /// The promise behind this thenable, if it is one of ours. Used to catch
    /// a promise being resolved with itself.
    fn as_promise(&self) -> Option<&Promise<T, E>> {
        None
    }
}

impl<T: Clone + 'static, E: Reason> Thenable<T, E> for Promise<T, E> {
    fn then(&self, continuation: Continuation<T, E>) -> Result<(), E> {
        self.react(move |outcome| {
            match outcome {
                Ok(value) => continuation.fulfill(value),
                Err(reason) => continuation.reject(reason),
            }
            Ok(Resolution::Value(()))
        });
        Ok(())
    }

    fn as_promise(&self) -> Option<&Promise<T, E>> {
        Some(self)
    }
}

/// The success and failure callbacks handed to a [`Thenable`].
///
/// Clones share one guard: the first call through any of them settles the
/// target, everything after is ignored.
pub struct Continuation<T, E> {
    target: Promise<T, E>,
    called: Rc<Cell<bool>>,
}

impl<T, E> Clone for Continuation<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            called: Rc::clone(&self.called),
        }
    }
}

impl<T: Clone + 'static, E: Reason> Continuation<T, E> {
    fn new(target: Promise<T, E>) -> Self {
        Self {
            target,
            called: Rc::new(Cell::new(false)),
        }
    }

    fn claim(&self) -> bool {
        let first = !self.called.replace(true);
        if !first {
            debug!("promise #{}: continuation already called", self.target.id());
        }
        first
    }

    /// Resolves the target with `x`, unwrapping it if it is itself a future.
    pub fn resolve(&self, x: Resolution<T, E>) {
        if self.claim() {
            resolve(&self.target, x);
        }
    }

    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value));
    }

    pub fn reject(&self, reason: E) {
        if self.claim() {
            self.target.reject(reason);
        }
    }

    pub fn is_called(&self) -> bool {
        self.called.get()
    }
}

/// Settles `target` with `x`.
pub(crate) fn resolve<T: Clone + 'static, E: Reason>(target: &Promise<T, E>, x: Resolution<T, E>) {
    match x {
        Resolution::Value(value) => target.fulfill(value),
        Resolution::Future(promise) => adopt(target, &promise),
        Resolution::Thenable(thenable) => adopt(target, &*thenable),
    }
}

fn adopt<T: Clone + 'static, E: Reason>(target: &Promise<T, E>, thenable: &dyn Thenable<T, E>) {
    // identity, however the promise was wrapped.
    if thenable.as_promise().is_some_and(|promise| promise.ptr_eq(target)) {
        warn!("promise #{} resolved with itself", target.id());
        target.reject(E::from(ChainingCycle));
        return;
    }
    match thenable.then_kind() {
        Err(reason) => target.reject(reason),
        Ok(ThenKind::NotCallable(value)) => target.fulfill(value),
        Ok(ThenKind::Callable) => {
            let continuation = Continuation::new(target.clone());
            if let Err(reason) = thenable.then(continuation.clone()) {
                continuation.reject(reason);
            }
        }
    }
}
