use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    rc::Rc,
    time::Duration,
};

use crate::instant::Instant;

/// A boxed local future, as accepted by [`Runtime::spawn`].
pub type LocalBoxFuture = Pin<Box<dyn Future<Output = ()> + 'static>>;

/// Clock, timer and task-spawning services for the query machinery.
///
/// Every timer the cache arms (garbage collection, retry backoff) and every
/// task it spawns (query executions) goes through this trait, so an
/// application picks one implementation at startup and tests can substitute
/// [`TestRuntime`] to drive a virtual clock instead of waiting on the wall
/// clock.
pub trait Runtime {
    /// The current time.
    fn now(&self) -> Instant;

    /// Schedule `callback` to run once after `delay`.
    ///
    /// The returned handle cancels the callback when cleared.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimeoutHandle;

    /// Spawn a future onto the current-thread executor.
    fn spawn(&self, fut: LocalBoxFuture);
}

/// Handle for a callback scheduled with [`Runtime::set_timeout`].
#[derive(Clone)]
pub struct TimeoutHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimeoutHandle {
    /// Create a live handle. Runtime implementations hold a clone and check
    /// [`is_cleared`](Self::is_cleared) before invoking the callback.
    pub fn new() -> Self {
        Self {
            cancelled: Rc::new(Cell::new(false)),
        }
    }

    /// Cancel the pending callback.
    pub fn clear(&self) {
        self.cancelled.set(true);
    }

    /// Whether the callback has been cancelled.
    pub fn is_cleared(&self) -> bool {
        self.cancelled.get()
    }
}

impl Default for TimeoutHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Future-based sleep on top of [`Runtime::set_timeout`].
pub(crate) async fn sleep(runtime: &Rc<dyn Runtime>, delay: Duration) {
    let (sender, receiver) = futures_channel::oneshot::channel::<()>();
    let _handle = runtime.set_timeout(
        delay,
        Box::new(move || {
            let _ = sender.send(());
        }),
    );
    let _ = receiver.await;
}

cfg_if::cfg_if! {
    if #[cfg(feature = "tokio")] {
        /// [`Runtime`] backed by a current-thread tokio runtime.
        ///
        /// Queries are `!Send`, so this must run inside a
        /// [`tokio::task::LocalSet`].
        #[derive(Debug, Clone, Copy, Default)]
        pub struct TokioRuntime;

        impl Runtime for TokioRuntime {
            fn now(&self) -> Instant {
                Instant::now()
            }

            fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimeoutHandle {
                let handle = TimeoutHandle::new();
                let guard = handle.clone();
                tokio::task::spawn_local(async move {
                    tokio::time::sleep(delay).await;
                    if !guard.is_cleared() {
                        callback();
                    }
                });
                handle
            }

            fn spawn(&self, fut: LocalBoxFuture) {
                tokio::task::spawn_local(fut);
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "wasm")] {
        /// [`Runtime`] for the browser event loop.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct WasmRuntime;

        impl Runtime for WasmRuntime {
            fn now(&self) -> Instant {
                Instant::now()
            }

            fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimeoutHandle {
                let handle = TimeoutHandle::new();
                let guard = handle.clone();
                let millis = delay.as_millis().min(u128::from(u32::MAX)) as u32;
                gloo_timers::callback::Timeout::new(millis, move || {
                    if !guard.is_cleared() {
                        callback();
                    }
                })
                .forget();
                handle
            }

            fn spawn(&self, fut: LocalBoxFuture) {
                wasm_bindgen_futures::spawn_local(fut);
            }
        }
    }
}

/// Deterministic [`Runtime`] for tests.
///
/// Spawned futures only make progress through [`tick`](Self::tick), and
/// timers only fire through [`advance`](Self::advance), which moves a
/// virtual clock instead of sleeping.
#[derive(Clone)]
pub struct TestRuntime {
    clock: Rc<Cell<Instant>>,
    timers: Rc<RefCell<BTreeMap<(Instant, u64), PendingTimer>>>,
    next_timer_id: Rc<Cell<u64>>,
    pool: Rc<RefCell<futures::executor::LocalPool>>,
    spawner: futures::executor::LocalSpawner,
}

struct PendingTimer {
    handle: TimeoutHandle,
    callback: Box<dyn FnOnce()>,
}

impl TestRuntime {
    /// A fresh runtime with an arbitrary fixed epoch.
    pub fn new() -> Self {
        let pool = futures::executor::LocalPool::new();
        let spawner = pool.spawner();
        Self {
            clock: Rc::new(Cell::new(Instant(Duration::from_secs(1_000_000_000)))),
            timers: Rc::new(RefCell::new(BTreeMap::new())),
            next_timer_id: Rc::new(Cell::new(0)),
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }

    /// Run all spawned tasks until no further progress can be made.
    pub fn tick(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Advance the virtual clock, firing every timer that comes due and
    /// running tasks between firings.
    pub fn advance(&self, delta: Duration) {
        let target = self.clock.get() + delta;
        loop {
            self.tick();
            let due = {
                let mut timers = self.timers.borrow_mut();
                match timers.keys().next().copied() {
                    Some(key) if key.0 <= target => timers.remove_entry(&key),
                    _ => None,
                }
            };
            match due {
                Some(((deadline, _), timer)) => {
                    self.clock.set(deadline);
                    if !timer.handle.is_cleared() {
                        (timer.callback)();
                    }
                }
                None => break,
            }
        }
        self.clock.set(target);
        self.tick();
    }

    /// Number of timers that have been scheduled and not yet fired.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for TestRuntime {
    fn now(&self) -> Instant {
        self.clock.get()
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimeoutHandle {
        let handle = TimeoutHandle::new();
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id + 1);
        let deadline = self.clock.get() + delay;
        self.timers.borrow_mut().insert(
            (deadline, id),
            PendingTimer {
                handle: handle.clone(),
                callback,
            },
        );
        handle
    }

    fn spawn(&self, fut: LocalBoxFuture) {
        use futures::task::LocalSpawnExt;
        self.spawner
            .spawn_local(fut)
            .expect("TestRuntime task pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_deadline_order() {
        let runtime = TestRuntime::new();
        let fired: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let late = fired.clone();
        runtime.set_timeout(
            Duration::from_secs(2),
            Box::new(move || late.borrow_mut().push("late")),
        );
        let early = fired.clone();
        runtime.set_timeout(
            Duration::from_secs(1),
            Box::new(move || early.borrow_mut().push("early")),
        );

        runtime.advance(Duration::from_secs(3));
        assert_eq!(*fired.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn cleared_timers_never_fire() {
        let runtime = TestRuntime::new();
        let fired = Rc::new(Cell::new(false));

        let flag = fired.clone();
        let handle = runtime.set_timeout(Duration::from_secs(1), Box::new(move || flag.set(true)));
        handle.clear();

        runtime.advance(Duration::from_secs(5));
        assert!(!fired.get());
    }

    #[test]
    fn timers_scheduled_by_callbacks_fire_within_the_same_advance() {
        let runtime = TestRuntime::new();
        let fired = Rc::new(Cell::new(false));

        let inner = runtime.clone();
        let flag = fired.clone();
        runtime.set_timeout(
            Duration::from_secs(1),
            Box::new(move || {
                let flag = flag.clone();
                inner.set_timeout(Duration::from_secs(1), Box::new(move || flag.set(true)));
            }),
        );

        runtime.advance(Duration::from_secs(2));
        assert!(fired.get());
    }

    #[test]
    fn advance_moves_the_clock_even_without_timers() {
        let runtime = TestRuntime::new();
        let before = runtime.now();
        runtime.advance(Duration::from_secs(42));
        assert_eq!(runtime.now() - before, Duration::from_secs(42));
    }
}
