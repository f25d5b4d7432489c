//! Admission control for a batch of async operations.
//!
//! At most `concurrency` operations run at once; the rest wait in a FIFO
//! queue and are admitted strictly in submission order as slots free up.
//! A released slot is handed straight to the oldest live waiter, so the
//! active count never dips below the cap while anyone is queued.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(usize),
}

#[derive(Debug, Default)]
struct State {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Bounded-concurrency limiter with FIFO admission.
///
/// One instance serves one logical batch of work. The queue is unbounded.
#[derive(Debug)]
pub struct Limiter {
    concurrency: usize,
    state: Mutex<State>,
}

/// A held slot. Dropping it releases the slot to the next waiter.
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a Limiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// Queue position of a suspended `acquire`. If the acquiring future is
/// dropped, the position is abandoned; a slot that was already handed to
/// it is passed on instead of leaking.
struct Waiter<'a> {
    limiter: &'a Limiter,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.limiter.release();
            }
        }
    }
}

impl Limiter {
    pub fn new(concurrency: usize) -> Result<Self, LimiterError> {
        if concurrency == 0 {
            return Err(LimiterError::InvalidConcurrency(concurrency));
        }
        Ok(Self {
            concurrency,
            state: Mutex::new(State::default()),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of operations currently admitted.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    /// Number of callers suspended waiting for a slot.
    #[cfg(test)]
    pub fn queued_count(&self) -> usize {
        self.lock().waiters.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Run `operation` once a slot is available and return its output
    /// untouched. The slot is released when the operation settles, whether
    /// it succeeded, failed, or was dropped mid-flight.
    pub async fn submit<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        operation().await
    }

    /// Wait for a slot. Only the calling task is suspended.
    pub async fn acquire(&self) -> Permit<'_> {
        let rx = {
            let mut state = self.lock();
            if state.active < self.concurrency {
                state.active += 1;
                return Permit { limiter: self };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut waiter = Waiter {
            limiter: self,
            rx: Some(rx),
        };
        if let Some(rx) = waiter.rx.as_mut() {
            // Senders live in the queue until they either send or observe a
            // closed receiver, so this only resolves with a handed-over slot.
            let _ = rx.await;
        }
        // The slot now belongs to the permit, not the waiter.
        waiter.rx = None;
        Permit { limiter: self }
    }

    fn release(&self) {
        let mut state = self.lock();
        while let Some(next) = state.waiters.pop_front() {
            if next.send(()).is_ok() {
                // Slot transferred; active count is unchanged.
                return;
            }
        }
        state.active -= 1;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Critical sections never panic midway, so a poisoned lock still
        // holds consistent counters.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
