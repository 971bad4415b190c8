//! The task-scheduling collaborator.
//!
//! Promise handlers never run inline. Every reaction is handed to a
//! [`Scheduler`] as a [`Task`], and the host decides when to run it. The only
//! requirement is that tasks scheduled through the same scheduler run in the
//! order they were scheduled, after the code that scheduled them returns.
//!
//! [`TaskQueue`] is a plain FIFO implementation of that contract. It is driven
//! by hand, one [`tick`](TaskQueue::tick) at a time, or from async code via
//! [`run`](TaskQueue::run):
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//!
//! use thenable::scheduler::{Scheduler, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//! for n in 0..3 {
//!     let log = Rc::clone(&log);
//!     queue.schedule(Box::new(move || log.borrow_mut().push(n)));
//! }
//! assert!(log.borrow().is_empty());
//! assert_eq!(queue.run_until_stalled(), 3);
//! assert_eq!(*log.borrow(), [0, 1, 2]);
//! ```
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use log::trace;
use pin_project::pin_project;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks at some later point, first in first out.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

/// The handle promises keep to their scheduler.
pub type SchedulerRef = Rc<dyn Scheduler>;

#[derive(Default)]
struct Shared {
    tasks: VecDeque<Task>,
    waker: Option<Waker>,
    executed: u64,
}

/// A single-threaded FIFO task queue.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    shared: Rc<RefCell<Shared>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let shared = Shared {
            tasks: VecDeque::with_capacity(capacity),
            ..Shared::default()
        };
        Self {
            shared: Rc::new(RefCell::new(shared)),
        }
    }

    /// This queue as a type-erased [`SchedulerRef`].
    pub fn scheduler(&self) -> SchedulerRef {
        Rc::new(self.clone())
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.shared.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.borrow().tasks.is_empty()
    }

    /// Number of tasks run over the lifetime of the queue.
    pub fn executed(&self) -> u64 {
        self.shared.borrow().executed
    }

    /// Runs the oldest task. Returns `false` if there was nothing to run.
    pub fn tick(&self) -> bool {
        // the borrow must end before the task runs, tasks schedule more tasks.
        let task = self.shared.borrow_mut().tasks.pop_front();
        match task {
            Some(task) => {
                task();
                self.shared.borrow_mut().executed += 1;
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including the ones scheduled along the way, until the
    /// queue is empty. Returns how many ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.tick() {
            ran += 1;
        }
        trace!("task queue stalled after {ran} task(s)");
        ran
    }

    /// Drives `future` to completion, running queued tasks whenever it is
    /// not ready.
    pub fn run<F: Future>(&self, future: F) -> Run<'_, F> {
        Run {
            queue: self,
            future,
        }
    }

    fn park(&self, waker: &Waker) {
        let mut shared = self.shared.borrow_mut();
        match &mut shared.waker {
            Some(parked) => parked.clone_from(waker),
            slot => *slot = Some(waker.clone()),
        }
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        let waker = {
            let mut shared = self.shared.borrow_mut();
            shared.tasks.push_back(task);
            trace!("task scheduled; {} queued", shared.tasks.len());
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future returned by [`TaskQueue::run`].
#[pin_project]
pub struct Run<'a, F> {
    queue: &'a TaskQueue,
    #[pin]
    future: F,
}

impl<F: Future> Future for Run<'_, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            if let Poll::Ready(output) = this.future.as_mut().poll(cx) {
                return Poll::Ready(output);
            }
            if !this.queue.tick() {
                // nothing left to run here; whoever schedules next wakes us.
                this.queue.park(cx.waker());
                return Poll::Pending;
            }
        }
    }
}
