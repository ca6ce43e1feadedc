//! Bounded request scheduler
//!
//! Caps the number of vendor requests in flight, spaces dispatches at least
//! `min_time` apart and holds at most [`QUEUE_CAPACITY`] jobs waiting for a
//! slot. A job submitted while the queue is full is dropped immediately.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::models::Options;

/// Jobs allowed to wait for dispatch at once
pub const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("This job has been dropped by the scheduler: request queue is full")]
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub min_time: Duration,
    pub queue_capacity: usize,
}

impl SchedulerSettings {
    pub fn from_options(options: &Options) -> Self {
        Self {
            max_concurrent: options.max_concurrent.max(1),
            min_time: Duration::from_millis(options.min_time),
            queue_capacity: QUEUE_CAPACITY,
        }
    }
}

pub struct Scheduler {
    settings: SchedulerSettings,
    permits: Semaphore,
    throttle: Option<DefaultDirectRateLimiter>,
    queued: AtomicUsize,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        let throttle = Quota::with_period(settings.min_time)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self {
            settings,
            permits: Semaphore::new(settings.max_concurrent.max(1)),
            throttle,
            queued: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Jobs currently waiting for dispatch
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run `job` once a concurrency slot is free and the throttle allows it.
    ///
    /// The job is never started when the queue is full. Once started it runs
    /// to completion while holding its slot.
    pub async fn submit<F>(&self, job: F) -> Result<F::Output, SchedulerError>
    where
        F: Future,
    {
        let slot = self.reserve().ok_or_else(|| {
            tracing::debug!(
                capacity = self.settings.queue_capacity,
                "Scheduler queue full, dropping job"
            );
            SchedulerError::Dropped
        })?;

        // The semaphore is never closed; a failed acquire means the job never started
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SchedulerError::Dropped)?;

        if let Some(throttle) = &self.throttle {
            throttle.until_ready().await;
        }
        drop(slot);

        Ok(job.await)
    }

    fn reserve(&self) -> Option<QueueSlot<'_>> {
        let capacity = self.settings.queue_capacity;
        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| QueueSlot(&self.queued))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("queued", &self.queued())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// A reserved place in the wait queue, released on dispatch or cancellation
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Instant;

    fn settings(max_concurrent: usize, min_time_ms: u64) -> SchedulerSettings {
        SchedulerSettings {
            max_concurrent,
            min_time: Duration::from_millis(min_time_ms),
            queue_capacity: QUEUE_CAPACITY,
        }
    }

    #[tokio::test]
    async fn test_concurrency_and_spacing() {
        let scheduler = Scheduler::new(settings(2, 25));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let jobs = (0..6).map(|_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let starts = starts.clone();
            scheduler.submit(async move {
                starts.lock().unwrap().push(Instant::now());
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });

        let results = futures::future::join_all(jobs).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);

        let mut starts = starts.lock().unwrap().clone();
        starts.sort();
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(23), "dispatch gap {:?}", gap);
        }
    }

    #[tokio::test]
    async fn test_overflow_drops_newest() {
        let scheduler = Arc::new(Scheduler::new(SchedulerSettings {
            max_concurrent: 1,
            min_time: Duration::ZERO,
            queue_capacity: 2,
        }));
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let blocker = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(async move {
                        let _ = released.await;
                    })
                    .await
            })
        };
        while scheduler.permits.available_permits() > 0 {
            tokio::task::yield_now().await;
        }

        let waiting: Vec<_> = (0..2)
            .map(|i| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.submit(async move { i }).await })
            })
            .collect();
        while scheduler.queued() < 2 {
            tokio::task::yield_now().await;
        }

        let dropped = scheduler.submit(async { 99 }).await;
        assert_eq!(dropped, Err(SchedulerError::Dropped));

        release.send(()).unwrap();
        tokio_test::assert_ok!(blocker.await.unwrap());
        for (i, handle) in waiting.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Ok(i));
        }
        assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn test_settings_from_options() {
        let options = Options {
            max_concurrent: 0,
            min_time: 5,
            ..Options::default()
        };

        let settings = SchedulerSettings::from_options(&options);
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.min_time, Duration::from_millis(5));
        assert_eq!(settings.queue_capacity, QUEUE_CAPACITY);
    }
}
