//! A bounded pool of worker threads for running independent tasks.
//!
//! Workers claim tasks through a shared counter and send results over a channel to the calling
//! thread, which is the only one to see them. Completion order is not deterministic.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// Get the default pool size: the number of CPUs available, or 1 if unknown
pub fn default_pool_size() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Run `work` on every item with at most `pool_size` threads, feeding each result to `reduce`.
///
/// `reduce` is called on the calling thread, one result at a time, in order of completion. It
/// receives the index of the item along with the result.
///
/// After the first error (from `work` or `reduce`) no new items are started; items already
/// running are allowed to finish and their results are discarded. The first error is returned.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn apply_reduce<T, R, E, F, G>(
    items: &[T],
    pool_size: usize,
    work: F,
    mut reduce: G,
) -> Result<(), E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(usize, &T) -> Result<R, E> + Sync,
    G: FnMut(usize, R) -> Result<(), E>,
{
    if items.is_empty() {
        return Ok(());
    }

    let num_workers = pool_size.clamp(1, items.len());
    let next_item = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for _ in 0..num_workers {
            let tx = tx.clone();
            let (work, next_item, abort) = (&work, &next_item, &abort);
            scope.spawn(move || {
                while !abort.load(Ordering::Relaxed) {
                    let index = next_item.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(index) else {
                        break;
                    };

                    let result = work(index, item);
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }

        // The loop below ends once every worker has dropped its sender
        drop(tx);

        let mut first_error = None;
        for (index, result) in rx {
            if first_error.is_some() {
                continue;
            }

            if let Err(err) = result.and_then(|value| reduce(index, value)) {
                abort.store(true, Ordering::Relaxed);
                first_error = Some(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    })
}

/// Apply `work` to every item with at most `pool_size` threads, returning results in input order
pub fn map_collect<T, R, E, F>(items: &[T], pool_size: usize, work: F) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(usize, &T) -> Result<R, E> + Sync,
{
    let mut results: Vec<Option<R>> = items.iter().map(|_| None).collect();
    apply_reduce(items, pool_size, work, |index, value| {
        results[index] = Some(value);
        Ok(())
    })?;

    // Every slot is filled if no error occurred
    Ok(results.into_iter().flatten().collect())
}
