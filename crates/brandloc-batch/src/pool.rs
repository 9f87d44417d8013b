//! Bounded worker pool
//!
//! A fixed number of scoped threads pull slot indices from a channel. Each
//! slot sits behind its own mutex and is only ever locked by the worker that
//! pulled its index, so jobs never contend with each other.

use crossbeam::channel;
use parking_lot::Mutex;

/// Run `work` over every item with at most `workers` threads, returning the
/// items in their original order
pub(crate) fn run_pool<J, F>(items: Vec<J>, workers: usize, work: F) -> Vec<J>
where
    J: Send,
    F: Fn(&mut J) + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers == 0 {
        return items;
    }

    let slots: Vec<Mutex<J>> = items.into_iter().map(Mutex::new).collect();
    let (tx, rx) = channel::unbounded::<usize>();
    for index in 0..slots.len() {
        if tx.send(index).is_err() {
            break;
        }
    }
    drop(tx);

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let rx = rx.clone();
            let slots = &slots;
            let work = &work;
            scope.spawn(move || {
                for index in rx.iter() {
                    let mut item = slots[index].lock();
                    work(&mut *item);
                }
                tracing::trace!(worker, "Worker drained queue");
            });
        }
    });

    slots.into_iter().map(Mutex::into_inner).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_every_item_processed_in_order() {
        let items: Vec<(usize, usize)> = (0..20).map(|i| (i, 0)).collect();
        let out = run_pool(items, 4, |(i, out)| *out = *i * 2);
        assert_eq!(out.len(), 20);
        for (i, (index, doubled)) in out.into_iter().enumerate() {
            assert_eq!(index, i);
            assert_eq!(doubled, i * 2);
        }
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items = vec![(); 12];
        run_pool(items, 3, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_empty_and_zero_workers() {
        let out: Vec<u8> = run_pool(Vec::new(), 4, |_| {});
        assert!(out.is_empty());
        let out = run_pool(vec![1u8, 2], 0, |x| *x += 1);
        assert_eq!(out, vec![2, 3]);
    }
}
