//! Single-threaded promises: values that are not known yet, chained with
//! handlers that always run later, on a scheduler the host provides.
//!
//! ```
//! use thenable::{Error, Promise, PromiseState, Resolution, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let scheduler = queue.scheduler();
//!
//! let answer = Promise::<i32, Error>::resolved(&scheduler, Resolution::Value(20))
//!     .and_then(|n| Ok(Resolution::Value(n + 1)))
//!     .and_then(|n| Ok(Resolution::Value(n * 2)));
//!
//! // nothing runs until the scheduler does.
//! assert!(answer.state().is_pending());
//! queue.run_until_stalled();
//! assert_eq!(answer.state(), PromiseState::Fulfilled(42));
//! ```
//!
//! Handlers return a [`Resolution`]. Returning another promise, or any
//! [`Thenable`], makes the chained promise wait for it and settle the same
//! way. A handler fails by returning `Err`, which rejects the chained promise.
//!
//! Promises are also [`Future`](core::future::Future)s, so async code can
//! await them while something drives the scheduler, for instance
//! [`TaskQueue::run`].

mod combinators;
mod error;
mod promise;
mod resolution;
pub mod scheduler;

pub use combinators::Deferred;
pub use error::{ChainingCycle, Error, Reason};
pub use promise::{Promise, PromiseState, Resolver};
pub use resolution::{Continuation, Resolution, ThenKind, Thenable};
pub use scheduler::{Scheduler, SchedulerRef, Task, TaskQueue};
