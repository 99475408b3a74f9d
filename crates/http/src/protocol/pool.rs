//! Free-list of reusable [`HttpContext`]s.
//!
//! The pool is filled up front with `capacity` contexts. `acquire` pops an idle
//! one or allocates a fresh context when the free-list is empty; `release`
//! resets the context and keeps it only while the free-list is below
//! `capacity`, so repeated acquire/release cycles never grow the number of
//! live contexts past the ceiling.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::protocol::HttpContext;

#[derive(Debug)]
pub struct HttpContextPool {
    idle: Mutex<Vec<HttpContext>>,
    capacity: usize,
    allocated: AtomicUsize,
    acquired: AtomicUsize,
}

impl HttpContextPool {
    pub fn new(capacity: usize) -> Self {
        let idle = (0..capacity).map(|_| HttpContext::new()).collect::<Vec<_>>();
        Self { idle: Mutex::new(idle), capacity, allocated: AtomicUsize::new(capacity), acquired: AtomicUsize::new(0) }
    }

    /// Hands out an idle context, allocating one if none is left.
    pub fn acquire(&self) -> HttpContext {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        if let Some(context) = self.idle().pop() {
            return context;
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        trace!(capacity = self.capacity, "context pool exhausted, allocating");
        HttpContext::new()
    }

    /// Resets `context` and returns it to the free-list.
    pub fn release(&self, mut context: HttpContext) {
        context.reset();
        let mut idle = self.idle();
        if idle.len() < self.capacity {
            idle.push(context);
        } else {
            drop(idle);
            self.allocated.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Acquires a context that goes back to the pool when the guard drops.
    pub fn lease(self: &Arc<Self>) -> PooledContext {
        PooledContext { context: self.acquire(), pool: Arc::clone(self) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    /// Contexts currently alive, idle or leased.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of `acquire` calls since the pool was created.
    pub fn acquired_total(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    fn idle(&self) -> MutexGuard<'_, Vec<HttpContext>> {
        // contexts are reset on release, a poisoned list is still consistent
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A leased [`HttpContext`], released back to its pool on drop.
#[derive(Debug)]
pub struct PooledContext {
    context: HttpContext,
    pool: Arc<HttpContextPool>,
}

impl Deref for PooledContext {
    type Target = HttpContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.context
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.context));
    }
}
