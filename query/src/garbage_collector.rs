use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use crate::{
    runtime::{Runtime, TimeoutHandle},
    util::time_until_stale,
    Instant,
};

/// Schedules eviction of a query once it has had no observers for the
/// configured gc window.
pub(crate) struct GarbageCollector {
    runtime: Rc<dyn Runtime>,
    evict: Rc<dyn Fn()>,
    gc_time: Cell<Option<Duration>>,
    updated_at: Cell<Option<Instant>>,
    handle: RefCell<Option<TimeoutHandle>>,
}

impl GarbageCollector {
    pub(crate) fn new(runtime: Rc<dyn Runtime>, evict: Rc<dyn Fn()>) -> Self {
        Self {
            runtime,
            evict,
            gc_time: Cell::new(None),
            updated_at: Cell::new(None),
            handle: RefCell::new(None),
        }
    }

    /// Keep max gc time.
    pub fn update_gc_time(&self, gc_time: Option<Duration>) {
        match (self.gc_time.get(), gc_time) {
            (Some(current), Some(gc_time)) if gc_time > current => {
                self.gc_time.set(Some(gc_time));
            }
            (None, Some(gc_time)) => {
                self.gc_time.set(Some(gc_time));
            }
            _ => {}
        }
    }

    pub fn new_update(&self, updated_at: Instant) {
        self.updated_at.set(Some(updated_at));
        // An armed timer is measured from the previous update; rearm it.
        if self.handle.borrow().is_some() {
            self.disable_gc();
            self.enable_gc();
        }
    }

    pub fn enable_gc(&self) {
        if self.handle.borrow().is_some() {
            return;
        }

        if let (Some(gc_time), Some(updated_at)) = (self.gc_time.get(), self.updated_at.get()) {
            let time_until_gc = time_until_stale(updated_at, gc_time, self.runtime.now());
            let evict = self.evict.clone();
            let new_handle = self
                .runtime
                .set_timeout(time_until_gc, Box::new(move || evict()));
            *self.handle.borrow_mut() = Some(new_handle);
        }
    }

    pub fn disable_gc(&self) {
        if let Some(handle) = self.handle.borrow_mut().take() {
            handle.clear();
        }
    }
}
