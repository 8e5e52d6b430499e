//! Fanning per-buffer work across a pool of workers.
//!
//! Each buffer is decoded with its own cursor and state, so batches
//! parallelize without locking; results come back in input order.

use std::thread;

use crossbeam_channel::unbounded;

/// Run an operation over each input on a pool of `workers` threads,
/// preserving input order.
pub fn map<T, R, F>(inputs: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = inputs.len();
    let (in_tx, in_rx) = unbounded::<(usize, T)>();
    let (out_tx, out_rx) = unbounded::<(usize, R)>();

    let mut results: Vec<(usize, R)> = thread::scope(|s| {
        for _ in 0..workers.max(1) {
            let in_rx = in_rx.clone();
            let out_tx = out_tx.clone();
            let f = &f;

            s.spawn(move || {
                for (index, input) in in_rx.iter() {
                    let _ = out_tx.send((index, f(input)));
                }
            });
        }
        drop(in_rx);
        drop(out_tx);

        for pair in inputs.into_iter().enumerate() {
            let _ = in_tx.send(pair);
        }
        drop(in_tx);

        out_rx.iter().take(total).collect()
    });

    results.sort_unstable_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
