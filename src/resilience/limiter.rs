//! Process-wide in-flight ceiling for upstream calls.
//!
//! # Responsibilities
//! - Admit at most `max_inflight` executions at once (0 = unlimited)
//! - Queue further callers in FIFO order
//! - Release the slot on completion, failure or cancellation
//! - Bound the queue wait by the caller's deadline
//!
//! # Design Decisions
//! - Tokio's semaphore is fair, which gives the FIFO wait list
//! - The slot is an RAII permit so a dropped future never leaks it

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Admission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    #[error("deadline elapsed while waiting for admission")]
    DeadlineElapsed,

    #[error("limiter closed")]
    Closed,
}

/// Bounds concurrently executing upstream calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    max_inflight: usize,
    in_flight: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Create a limiter. `max_inflight == 0` disables limiting.
    pub fn new(max_inflight: usize) -> Self {
        Self {
            semaphore: (max_inflight > 0).then(|| Arc::new(Semaphore::new(max_inflight))),
            max_inflight,
            in_flight: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.semaphore.is_none()
    }

    /// Number of admitted executions.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of callers queued for admission.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn admit(&self, permit: Option<OwnedSemaphorePermit>) -> InflightPermit {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InflightPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Wait for a slot without a deadline.
    pub async fn acquire(&self) -> Result<InflightPermit, LimiterError> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(self.admit(None));
        };
        let _queued = QueueGuard::enter(&self.waiting);
        let permit = Arc::clone(semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;
        Ok(self.admit(Some(permit)))
    }

    /// Wait for a slot until `deadline`.
    pub async fn acquire_until(&self, deadline: Instant) -> Result<InflightPermit, LimiterError> {
        if self.semaphore.is_none() {
            return self.acquire().await;
        }
        match tokio::time::timeout_at(deadline, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(
                    max_inflight = self.max_inflight,
                    waiting = self.waiting(),
                    "Admission deadline elapsed"
                );
                Err(LimiterError::DeadlineElapsed)
            }
        }
    }

    /// Run `task` inside an admission slot.
    pub async fn run_with_limit<F, T>(&self, task: F) -> Result<T, LimiterError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }
}

/// An admission slot. Dropping it frees the slot and wakes the next waiter.
#[derive(Debug)]
pub struct InflightPermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct QueueGuard<'a>(&'a AtomicUsize);

impl<'a> QueueGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn unlimited_is_pass_through() {
        let limiter = ConcurrencyLimiter::new(0);
        assert!(limiter.is_unlimited());

        let permits: Vec<_> = futures_util::future::join_all((0..50).map(|_| limiter.acquire()))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(limiter.in_flight(), 50);

        drop(permits);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_queue_wait() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = limiter.acquire_until(deadline).await.unwrap_err();
        assert_eq!(err, LimiterError::DeadlineElapsed);
        assert_eq!(limiter.waiting(), 0);

        drop(held);
        let deadline = Instant::now() + Duration::from_millis(100);
        assert!(limiter.acquire_until(deadline).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_admitted_in_fifo_order() {
        let limiter = ConcurrencyLimiter::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = limiter.acquire().await.unwrap();

        let mut tasks = Vec::new();
        for id in 0..4 {
            let limiter = limiter.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                order.lock().unwrap().push(id);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(limiter.waiting(), 4);

        drop(held);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn slot_released_when_task_fails() {
        let limiter = ConcurrencyLimiter::new(1);
        let result: Result<Result<(), &str>, _> = limiter.run_with_limit(async { Err("boom") }).await;
        assert_eq!(result.unwrap(), Err("boom"));
        assert_eq!(limiter.in_flight(), 0);

        let value = limiter.run_with_limit(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_leak() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(limiter.waiting(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(limiter.waiting(), 0);

        drop(held);
        let again = limiter.acquire_until(Instant::now() + Duration::from_millis(10)).await;
        assert!(again.is_ok());
        assert_eq!(limiter.in_flight(), 1);
    }
}
