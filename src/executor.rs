//! Bounded fan-out for independent probes
//!
//! Every diagnostic section that probes a list of targets goes through
//! [`BoundedPool::run_all`]. Each input owns one result slot; slots that never
//! complete before the run budget expires stay `None` and are reported as
//! untested by the caller.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Caller side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and the signal it controls
    pub fn new() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelSignal { receiver })
    }

    /// Ask the run to stop; completed sections are kept
    pub fn cancel(&self) {
        // send_replace never fails, even once every receiver is gone
        self.sender.send_replace(true);
    }
}

/// Observer side of a cancellation signal, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        drop(sender);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle is
    /// dropped without cancelling
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Why a run stopped scheduling work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Deadline => "run budget exhausted",
            StopReason::Cancelled => "cancelled by caller",
        }
    }
}

/// Soft overall deadline plus caller cancellation for one diagnostic run
#[derive(Debug, Clone)]
pub struct RunBudget {
    deadline: Instant,
    cancel: CancelSignal,
}

impl RunBudget {
    pub fn new(budget: Duration, cancel: CancelSignal) -> Self {
        Self {
            deadline: Instant::now() + budget,
            cancel,
        }
    }

    /// Budget that only ends by cancellation, for tests and one-off probes
    pub fn unbounded() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60), CancelSignal::never())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `timeout` shortened to what is left of the budget
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(StopReason::Deadline)
        } else {
            None
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Resolves when the deadline passes or the run is cancelled
    pub async fn expired(&self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

/// Fixed-size concurrency limit for independent probes
#[derive(Debug, Clone, Copy)]
pub struct BoundedPool {
    limit: usize,
}

impl BoundedPool {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` over every input with at most `limit` in flight.
    ///
    /// Results come back in input order. Inputs not started, or still in
    /// flight when `budget` expires, yield `None`.
    pub async fn run_all<I, T, F, Fut>(&self, inputs: Vec<I>, mut task: F, budget: &RunBudget) -> Vec<Option<T>>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut slots: Vec<Option<T>> = inputs.iter().map(|_| None).collect();
        if slots.is_empty() || budget.is_exhausted() {
            return slots;
        }

        let mut in_flight = stream::iter(inputs.into_iter().enumerate())
            .map(|(index, input)| {
                let pending = task(input);
                async move { (index, pending.await) }
            })
            .buffer_unordered(self.limit);

        loop {
            tokio::select! {
                biased;
                _ = budget.expired() => break,
                next = in_flight.next() => match next {
                    Some((index, value)) => slots[index] = Some(value),
                    None => break,
                },
            }
        }

        slots
    }
}
