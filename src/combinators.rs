//! Constructors and aggregations built on [`Promise::new`] and chaining.
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use crate::{
    error::Reason,
    promise::{Promise, Resolver},
    resolution::Resolution,
    scheduler::SchedulerRef,
};

/// A promise together with the means to settle it from outside.
pub struct Deferred<T, E> {
    pub promise: Promise<T, E>,
    pub resolver: Resolver<T, E>,
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static, E: Reason> Promise<T, E> {
    /// A promise settled by `value`. Futures and thenables are adopted
    /// rather than wrapped.
    pub fn resolved(scheduler: &SchedulerRef, value: Resolution<T, E>) -> Self {
        Self::new(scheduler, |resolver| {
            resolver.resolve_with(value);
            Ok(())
        })
    }

    pub fn rejected(scheduler: &SchedulerRef, reason: E) -> Self {
        Self::new(scheduler, |_| Err(reason))
    }

    /// An unsettled promise and its [`Resolver`].
    pub fn deferred(scheduler: &SchedulerRef) -> Deferred<T, E> {
        let promise = Self::pending(scheduler.clone());
        let resolver = Resolver::new(promise.clone());
        Deferred { promise, resolver }
    }

    /// Settles like whichever of `futures` settles first.
    ///
    /// Position in `futures` plays no part. With no futures at all the
    /// result never settles.
    pub fn first_settled<I>(scheduler: &SchedulerRef, futures: I) -> Self
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        Self::new(scheduler, |resolver| {
            for future in futures {
                future.forward(resolver.clone());
            }
            Ok(())
        })
    }

    /// Fulfills with every value of `futures`, in input order, once all of
    /// them have fulfilled. Rejects as soon as any of them rejects.
    pub fn all_settled_values<I>(scheduler: &SchedulerRef, futures: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        let futures: Vec<_> = futures.into_iter().collect();
        Promise::new(scheduler, move |resolver| {
            if futures.is_empty() {
                resolver.resolve(Vec::new());
                return Ok(());
            }

            let slots = Rc::new(RefCell::new(vec![None; futures.len()]));
            let remaining = Rc::new(Cell::new(futures.len()));
            for (index, future) in futures.into_iter().enumerate() {
                let (slots, remaining) = (Rc::clone(&slots), Rc::clone(&remaining));
                let (on_value, on_reason) = (resolver.clone(), resolver.clone());
                future.then(
                    move |value| {
                        slots.borrow_mut()[index] = Some(value);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            let values = slots.take().into_iter().flatten().collect();
                            on_value.resolve(values);
                        }
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        on_reason.reject(reason);
                        Ok(Resolution::Value(()))
                    },
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        promise::PromiseState,
        scheduler::{Scheduler, TaskQueue},
        Error,
    };

    fn setup() -> (TaskQueue, SchedulerRef) {
        let _ = env_logger::builder().is_test(true).try_init();
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        (queue, scheduler)
    }

    /// A promise that fulfills with `value` after `ticks` scheduler turns.
    fn after_ticks(scheduler: &SchedulerRef, ticks: usize, value: i32) -> Promise<i32, Error> {
        let deferred = Promise::deferred(scheduler);
        countdown(scheduler.clone(), ticks, deferred.resolver, value);
        deferred.promise
    }

    fn countdown(scheduler: SchedulerRef, ticks: usize, resolver: Resolver<i32, Error>, value: i32) {
        if ticks == 0 {
            resolver.resolve(value);
            return;
        }
        let next = scheduler.clone();
        scheduler.schedule(Box::new(move || countdown(next, ticks - 1, resolver, value)));
    }

    #[test]
    fn first_settled_follows_settlement_order() {
        let (queue, scheduler) = setup();
        let slow = after_ticks(&scheduler, 10, 1);
        let fast = after_ticks(&scheduler, 5, 2);
        let winner = Promise::first_settled(&scheduler, [slow, fast]);
        queue.run_until_stalled();
        assert_eq!(winner.state(), PromiseState::Fulfilled(2));

        let slow = after_ticks(&scheduler, 10, 1);
        let fast = after_ticks(&scheduler, 5, 2);
        let winner = Promise::first_settled(&scheduler, [fast, slow]);
        queue.run_until_stalled();
        assert_eq!(winner.state(), PromiseState::Fulfilled(2));
    }

    #[test]
    fn first_settled_takes_a_rejection_too() {
        let (queue, scheduler) = setup();
        let failed = Promise::rejected(&scheduler, Error::from("first"));
        let winner = Promise::first_settled(&scheduler, [after_ticks(&scheduler, 3, 1), failed]);
        queue.run_until_stalled();
        assert_eq!(winner.state(), PromiseState::Rejected(Error::msg("first")));
    }

    #[test]
    fn first_settled_of_nothing_stays_pending() {
        let (queue, scheduler) = setup();
        let never = Promise::<i32, Error>::first_settled(&scheduler, []);
        queue.run_until_stalled();
        assert!(never.is_pending());
    }

    #[test]
    fn all_settled_values_keeps_input_order() {
        let (queue, scheduler) = setup();
        let all = Promise::all_settled_values(
            &scheduler,
            [
                after_ticks(&scheduler, 2, 1),
                after_ticks(&scheduler, 9, 2),
                after_ticks(&scheduler, 0, 3),
            ],
        );
        queue.run_until_stalled();
        assert_eq!(all.state(), PromiseState::Fulfilled(vec![1, 2, 3]));
    }

    #[test]
    fn all_settled_values_rejects_without_waiting() {
        let (queue, scheduler) = setup();
        let never = Promise::<i32, Error>::deferred(&scheduler).promise;
        let failed = Promise::rejected(&scheduler, Error::from("boom"));
        let all = Promise::all_settled_values(&scheduler, [never.clone(), failed]);
        queue.run_until_stalled();
        assert!(never.is_pending());
        assert_eq!(all.state(), PromiseState::Rejected(Error::msg("boom")));
    }

    #[test]
    fn all_settled_values_of_nothing_is_empty() {
        let (_queue, scheduler) = setup();
        let all = Promise::<i32, Error>::all_settled_values(&scheduler, Vec::new());
        assert_eq!(all.state(), PromiseState::Fulfilled(Vec::new()));
    }

    #[test]
    fn resolved_rejected_and_deferred() {
        let (_queue, scheduler) = setup();
        assert_eq!(
            Promise::<i32, Error>::resolved(&scheduler, Resolution::Value(1)).state(),
            PromiseState::Fulfilled(1)
        );
        assert_eq!(
            Promise::<i32, Error>::rejected(&scheduler, Error::from("r")).state(),
            PromiseState::Rejected(Error::msg("r"))
        );

        let deferred = Promise::<i32, Error>::deferred(&scheduler);
        assert!(!deferred.resolver.is_settled());
        deferred.resolver.reject(Error::from("out"));
        deferred.resolver.resolve(1);
        assert_eq!(deferred.promise.state(), PromiseState::Rejected(Error::msg("out")));
    }
}
