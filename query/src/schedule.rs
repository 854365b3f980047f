//! Retry policies as composable schedules.
//!
//! A [`Schedule`] is asked for the next delay after every failed fetch
//! attempt. Returning `None` stops retrying and surfaces the error.

use dyn_clone::DynClone;
use std::{marker::PhantomData, rc::Rc, time::Duration};

/// A retry policy: yields the delay before the next attempt, or `None` to
/// give up. The failed attempt's error is available so policies can stop
/// early for errors that will never succeed on retry.
pub trait Schedule: DynClone {
    /// The error type inspected by the schedule.
    type Error;

    /// Delay before the next attempt, or `None` to stop retrying.
    fn next(&mut self, error: &Self::Error) -> Option<Duration>;

    /// Yields the larger delay of both schedules; stops when either stops.
    fn intersect<U>(self, other: U) -> Intersect<Self, U>
    where
        Self: Sized,
        U: Schedule<Error = Self::Error>,
    {
        Intersect { a: self, b: other }
    }

    /// Stop after at most `n` retries.
    fn take(self, n: u32) -> Take<Self>
    where
        Self: Sized,
    {
        Take { n, schedule: self }
    }

    /// Keep retrying only while the predicate holds for the error and the
    /// proposed delay.
    fn take_while<F: 'static>(self, func: F) -> TakeWhile<Self, Rc<F>>
    where
        Self: Sized,
        F: Fn((&Self::Error, Duration)) -> bool,
    {
        TakeWhile {
            schedule: self,
            func: Rc::new(func),
        }
    }

    /// Clamp every delay into `[min, max]`.
    fn clamp(self, min: Duration, max: Duration) -> Clamp<Self>
    where
        Self: Sized,
    {
        Clamp {
            schedule: self,
            max: Some(max),
            min: Some(min),
        }
    }

    /// Clamp every delay to at most `duration`.
    fn clamp_max(self, duration: Duration) -> Clamp<Self>
    where
        Self: Sized,
    {
        Clamp {
            schedule: self,
            max: Some(duration),
            min: None,
        }
    }

    /// Box the schedule for storage in query options.
    fn build(self) -> ScheduleBuilt<Self::Error>
    where
        Self: Sized + 'static,
    {
        ScheduleBuilt(Box::new(self))
    }
}

dyn_clone::clone_trait_object!(<E> Schedule<Error = E>);

/// A boxed, cloneable [`Schedule`].
pub struct ScheduleBuilt<E>(pub(crate) Box<dyn Schedule<Error = E>>);

impl<E> Clone for ScheduleBuilt<E> {
    fn clone(&self) -> Self {
        ScheduleBuilt(self.0.clone())
    }
}

impl<E> ScheduleBuilt<E> {
    pub(crate) fn next(&mut self, error: &E) -> Option<Duration> {
        self.0.next(error)
    }
}

impl<E> std::fmt::Debug for ScheduleBuilt<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScheduleBuilt").finish()
    }
}

/// Retries `n` times with no delay.
pub struct Recur<E> {
    n: u32,
    error_type: PhantomData<E>,
}

impl<E> Clone for Recur<E> {
    fn clone(&self) -> Self {
        Recur {
            n: self.n,
            error_type: self.error_type,
        }
    }
}

impl<E> Schedule for Recur<E> {
    type Error = E;
    fn next(&mut self, _: &Self::Error) -> Option<Duration> {
        if self.n > 0 {
            self.n -= 1;
            Some(Duration::ZERO)
        } else {
            None
        }
    }
}

/// Retries forever with a fixed delay.
pub struct Spaced<E> {
    duration: Duration,
    error_type: PhantomData<E>,
}

impl<E> Clone for Spaced<E> {
    fn clone(&self) -> Self {
        Spaced {
            duration: self.duration,
            error_type: self.error_type,
        }
    }
}

impl<E> Schedule for Spaced<E> {
    type Error = E;
    fn next(&mut self, _: &Self::Error) -> Option<Duration> {
        Some(self.duration)
    }
}

/// Exponentially growing delays: `base * factor^n`.
pub struct Exponential<E> {
    base: Duration,
    n: u32,
    factor: f32,
    error_type: PhantomData<E>,
}

impl<E> Clone for Exponential<E> {
    fn clone(&self) -> Self {
        Exponential {
            base: self.base,
            n: self.n,
            factor: self.factor,
            error_type: self.error_type,
        }
    }
}

impl<E> Schedule for Exponential<E> {
    type Error = E;
    fn next(&mut self, _: &Self::Error) -> Option<Duration> {
        let n = self.n;
        self.n += 1;
        if n == 0 {
            Some(self.base)
        } else {
            let mult = self.factor.powf(n as f32);
            let delay = self.base.mul_f32(mult);
            Some(delay)
        }
    }
}

/// See [`Schedule::intersect`].
pub struct Intersect<A, B> {
    a: A,
    b: B,
}

impl<A, B, E> Clone for Intersect<A, B>
where
    A: Schedule<Error = E>,
    B: Schedule<Error = E>,
{
    fn clone(&self) -> Self {
        Intersect {
            a: dyn_clone::clone(&self.a),
            b: dyn_clone::clone(&self.b),
        }
    }
}

impl<A, B, E> Schedule for Intersect<A, B>
where
    A: Schedule<Error = E>,
    B: Schedule<Error = E>,
{
    type Error = E;

    fn next(&mut self, error: &Self::Error) -> Option<Duration> {
        let a = self.a.next(error);
        let b = self.b.next(error);

        match (a, b) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        }
    }
}

/// See [`Schedule::take`].
pub struct Take<A> {
    schedule: A,
    n: u32,
}

impl<A, E> Schedule for Take<A>
where
    A: Schedule<Error = E>,
{
    type Error = E;

    fn next(&mut self, error: &Self::Error) -> Option<Duration> {
        if self.n > 0 {
            self.n -= 1;
            self.schedule.next(error)
        } else {
            None
        }
    }
}

impl<A, E> Clone for Take<A>
where
    A: Schedule<Error = E>,
{
    fn clone(&self) -> Self {
        Self {
            schedule: dyn_clone::clone(&self.schedule),
            n: self.n,
        }
    }
}

/// See [`Schedule::take_while`].
pub struct TakeWhile<A, F> {
    schedule: A,
    func: F,
}

impl<A, F, E> Clone for TakeWhile<A, Rc<F>>
where
    A: Schedule<Error = E>,
    F: Fn((&E, Duration)) -> bool,
{
    fn clone(&self) -> Self {
        Self {
            schedule: dyn_clone::clone(&self.schedule),
            func: self.func.clone(),
        }
    }
}

impl<A, F, E> Schedule for TakeWhile<A, Rc<F>>
where
    A: Schedule<Error = E>,
    F: Fn((&E, Duration)) -> bool,
{
    type Error = E;

    fn next(&mut self, error: &Self::Error) -> Option<Duration> {
        self.schedule
            .next(error)
            .filter(|d| (self.func)((error, *d)))
    }
}

/// See [`Schedule::clamp`].
pub struct Clamp<A> {
    schedule: A,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl<A, E> Clone for Clamp<A>
where
    A: Schedule<Error = E>,
{
    fn clone(&self) -> Self {
        Self {
            schedule: dyn_clone::clone(&self.schedule),
            min: self.min,
            max: self.max,
        }
    }
}

impl<A, E> Schedule for Clamp<A>
where
    A: Schedule<Error = E>,
{
    type Error = E;

    fn next(&mut self, error: &Self::Error) -> Option<Duration> {
        let next = self.schedule.next(error);
        next.map(|d| {
            let bottom = if let Some(min) = self.min {
                min.max(d)
            } else {
                d
            };

            if let Some(max) = self.max {
                max.min(bottom)
            } else {
                bottom
            }
        })
    }
}

/// Constructors for the base schedules.
pub struct Schedules();

impl Schedules {
    /// Retry `n` times immediately.
    pub fn recur<E>(n: u32) -> impl Schedule<Error = E> {
        Recur {
            n,
            error_type: PhantomData,
        }
    }

    /// Retry with a fixed delay.
    pub fn spaced<E>(d: Duration) -> impl Schedule<Error = E> {
        Spaced {
            duration: d,
            error_type: PhantomData,
        }
    }

    /// Retry with exponentially growing delays.
    pub fn exponential<E>(base: Duration, factor: f32) -> impl Schedule<Error = E> {
        Exponential {
            n: 0,
            base,
            factor,
            error_type: PhantomData,
        }
    }
}
