//! Bounded worker pool for batch mutations.
//!
//! Up to `N` runner futures are polled together; each runner pulls the next
//! index from a shared counter until the item list is exhausted. Everything
//! runs on the calling task, so "concurrency" here means outstanding I/O,
//! not threads.

use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const MAX_GENERATION_CONCURRENCY: usize = 20;
pub const MAX_BATCH_CONCURRENCY: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency(usize);

impl Concurrency {
    /// Instance creation during generation, clamped to `[1, 20]`.
    pub fn generation(requested: usize) -> Self {
        Self(requested.clamp(1, MAX_GENERATION_CONCURRENCY))
    }

    /// Assignment and confirmation batches, clamped to `[1, 12]`.
    pub fn batch(requested: usize) -> Self {
        Self(requested.clamp(1, MAX_BATCH_CONCURRENCY))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(DEFAULT_CONCURRENCY)
    }
}

#[derive(Debug)]
pub struct PoolOutcome<E> {
    pub completed: usize,
    pub first_error: Option<E>,
}

impl<E> PoolOutcome<E> {
    pub fn into_result(self) -> Result<usize, E> {
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(self.completed),
        }
    }
}

/// Runs `worker` over `items` with at most `concurrency` calls in flight.
///
/// After the first failure no new items are started; calls already in flight
/// are allowed to finish and are counted if they succeed.
pub async fn run_bounded<T, F, Fut, E>(
    items: &[T],
    concurrency: Concurrency,
    worker: F,
) -> PoolOutcome<E>
where
    F: Fn(&T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let next = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let stopped = AtomicBool::new(false);
    let first_error: Mutex<Option<E>> = Mutex::new(None);

    {
        let next = &next;
        let completed = &completed;
        let stopped = &stopped;
        let first_error = &first_error;
        let worker = &worker;

        let runners = (0..concurrency.get().min(items.len())).map(move |_| async move {
            loop {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(index) else {
                    break;
                };

                match worker(item).await {
                    Ok(()) => {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(error) => {
                        stopped.store(true, Ordering::SeqCst);
                        let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.is_none() {
                            *slot = Some(error);
                        }
                        break;
                    }
                }
            }
        });

        join_all(runners).await;
    }

    PoolOutcome {
        completed: completed.into_inner(),
        first_error: first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn concurrency_is_clamped_per_use() {
        assert_eq!(Concurrency::generation(0).get(), 1);
        assert_eq!(Concurrency::generation(50).get(), 20);
        assert_eq!(Concurrency::batch(50).get(), 12);
        assert_eq!(Concurrency::default().get(), 6);
    }

    #[tokio::test]
    async fn never_exceeds_the_cap_while_draining_every_item() {
        let items: Vec<usize> = (0..50).collect();
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (live, peak) = (&live, &peak);

        let outcome = run_bounded(&items, Concurrency::generation(6), move |_| async move {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            live.fetch_sub(1, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .await;

        assert_eq!(outcome.completed, 50);
        assert!(outcome.first_error.is_none());
        assert!(peak.load(Ordering::SeqCst) <= 6);
        assert_eq!(peak.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn stops_scheduling_after_the_first_failure() {
        let items: Vec<usize> = (0..30).collect();
        let started = AtomicUsize::new(0);
        let started_ref = &started;

        let outcome = run_bounded(&items, Concurrency::batch(1), move |item| {
            let item = *item;
            let started = started_ref;
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if item == 3 {
                    Err(format!("write {item} failed"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(outcome.completed, 3);
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.into_result(), Err("write 3 failed".to_owned()));
    }

    #[tokio::test]
    async fn empty_input_runs_nothing() {
        let items: Vec<u8> = Vec::new();
        let outcome = run_bounded(&items, Concurrency::default(), |_| async {
            Ok::<(), String>(())
        })
        .await;
        assert_eq!(outcome.completed, 0);
    }
}
