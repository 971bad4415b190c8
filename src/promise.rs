use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use std::{
    cell::RefCell,
    mem,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, trace};

use crate::{
    error::Reason,
    resolution::{self, Resolution},
    scheduler::SchedulerRef,
};

/// Where a promise is in its life. Moves away from `Pending` at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseState<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> PromiseState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PromiseState::Rejected(_))
    }

    fn label(&self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }
}

impl<T: Clone, E: Clone> PromiseState<T, E> {
    /// The settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

impl<T, E> fmt::Display for PromiseState<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>)>;

struct Core<T, E> {
    state: PromiseState<T, E>,
    // only populated while pending, drained once on settlement.
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

struct Shared<T, E> {
    id: u64,
    scheduler: SchedulerRef,
    core: RefCell<Core<T, E>>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A value, or a failure, that is not known yet.
///
/// Cloning a `Promise` produces another handle to the same settlement. Every
/// handler attached with [`then`](Promise::then) and friends runs exactly once,
/// as its own task on the promise's scheduler, in the order it was attached.
/// Attaching a handler to a promise that already settled still defers it.
pub struct Promise<T, E> {
    shared: Rc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.shared.core.try_borrow() {
            Ok(core) => core.state.label(),
            Err(_) => "settling",
        };
        f.debug_struct("Promise")
            .field("id", &self.shared.id)
            .field("state", &state)
            .finish()
    }
}

impl<T, E> Promise<T, E> {
    /// Process-unique identifier, used in logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn scheduler(&self) -> &SchedulerRef {
        &self.shared.scheduler
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Clone + 'static, E: Reason> Promise<T, E> {
    /// Creates a promise and runs `init` on it right away.
    ///
    /// `init` receives the promise's [`Resolver`]. Returning `Err` rejects the
    /// promise with that reason, unless `init` already settled it.
    pub fn new<F>(scheduler: &SchedulerRef, init: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending(Rc::clone(scheduler));
        let resolver = Resolver::new(promise.clone());
        if let Err(reason) = init(resolver.clone()) {
            trace!("promise #{} initializer failed", promise.id());
            resolver.reject(reason);
        }
        promise
    }

    pub(crate) fn pending(scheduler: SchedulerRef) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Rc::new(Shared {
                id,
                scheduler,
                core: RefCell::new(Core {
                    state: PromiseState::Pending,
                    reactions: Vec::new(),
                    wakers: Vec::new(),
                }),
            }),
        }
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> PromiseState<T, E> {
        self.shared.core.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.core.borrow().state.is_pending()
    }

    pub(crate) fn fulfill(&self, value: T) {
        self.settle(PromiseState::Fulfilled(value));
    }

    pub(crate) fn reject(&self, reason: E) {
        self.settle(PromiseState::Rejected(reason));
    }

    fn settle(&self, terminal: PromiseState<T, E>) {
        let Some(outcome) = terminal.outcome() else {
            return;
        };
        let (reactions, wakers) = {
            let mut core = self.shared.core.borrow_mut();
            if core.state.is_settled() {
                debug!(
                    "promise #{} already {}, ignoring {} settlement",
                    self.id(),
                    core.state,
                    terminal
                );
                return;
            }
            // the state flips before any reaction runs, so a reaction that
            // tries to settle again sees a settled promise.
            core.state = terminal;
            (mem::take(&mut core.reactions), mem::take(&mut core.wakers))
        };
        trace!(
            "promise #{} {}; {} reaction(s) to schedule",
            self.id(),
            if outcome.is_ok() { "fulfilled" } else { "rejected" },
            reactions.len()
        );
        for waker in wakers {
            waker.wake();
        }
        for reaction in reactions {
            reaction(outcome.clone());
        }
    }

    /// Attaches `handler` to the eventual outcome. The returned promise is
    /// settled by feeding the handler's result through the resolution
    /// procedure.
    pub(crate) fn react<U, H>(&self, handler: H) -> Promise<U, E>
    where
        U: Clone + 'static,
        H: FnOnce(Result<T, E>) -> Result<Resolution<U, E>, E> + 'static,
    {
        let next = Promise::pending(Rc::clone(&self.shared.scheduler));
        let mut core = self.shared.core.borrow_mut();
        match core.state.outcome() {
            None => {
                let scheduler = Rc::clone(&self.shared.scheduler);
                let target = next.clone();
                core.reactions.push(Box::new(move |outcome| {
                    schedule_reaction(&scheduler, target, handler, outcome)
                }));
            }
            Some(outcome) => {
                drop(core);
                schedule_reaction(&self.shared.scheduler, next.clone(), handler, outcome);
            }
        }
        next
    }

    /// The chaining operator.
    ///
    /// Exactly one of the handlers runs, on a later task. An `Err` from it
    /// rejects the returned promise, an `Ok` resolves it, adopting the state
    /// of any future or thenable it carries.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.react(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        })
    }

    /// [`then`](Promise::then) with the rejection passed through.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// [`then`](Promise::then) with the value passed through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// [`then`](Promise::then) with neither handler: the new promise settles
    /// the same way as this one, one task later.
    pub fn relay(&self) -> Promise<T, E> {
        self.then(|value| Ok(Resolution::Value(value)), Err)
    }

    /// Runs `on_settle` once this promise settles, whichever way.
    ///
    /// The returned promise waits for whatever `on_settle` resolves to and
    /// then settles exactly like this one. A failure of `on_settle`, or of
    /// the future it returns, rejects it instead.
    pub fn finally<S, F>(&self, on_settle: F) -> Promise<T, E>
    where
        S: Clone + 'static,
        F: FnOnce() -> Result<Resolution<S, E>, E> + 'static,
    {
        let scheduler = Rc::clone(&self.shared.scheduler);
        self.react(move |outcome| {
            let side_effect = Promise::resolved(&scheduler, on_settle()?);
            let restored = side_effect.and_then(move |_| outcome.map(Resolution::Value));
            Ok(Resolution::Future(restored))
        })
    }

    /// Settles `resolver` the same way this promise settles.
    pub(crate) fn forward(&self, resolver: Resolver<T, E>) {
        self.react(move |outcome| {
            match outcome {
                Ok(value) => resolver.resolve(value),
                Err(reason) => resolver.reject(reason),
            }
            Ok(Resolution::Value(()))
        });
    }
}

fn schedule_reaction<T, U, E, H>(
    scheduler: &SchedulerRef,
    target: Promise<U, E>,
    handler: H,
    outcome: Result<T, E>,
) where
    T: 'static,
    U: Clone + 'static,
    E: Reason,
    H: FnOnce(Result<T, E>) -> Result<Resolution<U, E>, E> + 'static,
{
    trace!("scheduling reaction for promise #{}", target.id());
    scheduler.schedule(Box::new(move || match handler(outcome) {
        Ok(x) => resolution::resolve(&target, x),
        Err(reason) => target.reject(reason),
    }));
}

/// Polling registers interest and never runs handlers.
impl<T: Clone + 'static, E: Reason> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut core = self.shared.core.borrow_mut();
        match core.state.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !core.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    core.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

/// The settlement entry points of one promise.
///
/// Only the first call to [`resolve`](Resolver::resolve) or
/// [`reject`](Resolver::reject) has any effect.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.promise).finish()
    }
}

impl<T: Clone + 'static, E: Reason> Resolver<T, E> {
    pub(crate) fn new(promise: Promise<T, E>) -> Self {
        Self { promise }
    }

    /// Fulfills with `value` as is.
    pub fn resolve(&self, value: T) {
        self.promise.fulfill(value);
    }

    pub fn reject(&self, reason: E) {
        self.promise.reject(reason);
    }

    /// Settles through the resolution procedure, adopting the state of a
    /// future or thenable.
    pub fn resolve_with(&self, x: Resolution<T, E>) {
        resolution::resolve(&self.promise, x);
    }

    pub fn is_settled(&self) -> bool {
        !self.promise.is_pending()
    }
}
