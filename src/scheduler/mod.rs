//! Per-vehicle worker pool with run-level cancellation and an ordered merge.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Run-level abort flag. Tasks check it before starting; in-flight tasks finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Apply `f` to every item on a pool of `threads` workers (0 = pool default).
/// Results come back in input order; `None` marks items skipped after cancellation.
pub fn run_ordered<T, R, F>(items: &[T], threads: usize, cancel: &CancelToken, f: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let work = || {
        items
            .par_iter()
            .map(|item| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(f(item))
                }
            })
            .collect()
    };
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            tracing::warn!(error = %e, "could not build worker pool; using the global pool");
            work()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_input_order() {
        let items: Vec<u32> = (0..64).collect();
        let out = run_ordered(&items, 4, &CancelToken::new(), |x| x * 2);
        let doubled: Vec<u32> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(doubled, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = run_ordered(&[1, 2, 3], 2, &cancel, |x| *x);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn cancellation_stops_later_tasks() {
        let cancel = CancelToken::new();
        let items: Vec<u32> = (0..32).collect();
        let out = run_ordered(&items, 1, &cancel, |x| {
            if *x == 3 {
                cancel.cancel();
            }
            *x
        });
        assert_eq!(out[3], Some(3));
        assert!(out.iter().filter(|r| r.is_none()).count() > 0);
    }
}
