//! Fork-join helpers for data-parallel array operations
//!
//! The polynomial operators split their operand's island into `T` contiguous
//! chunks of near-equal length, with the remainder folded into the last chunk,
//! and run one rayon task per chunk. Each task writes only inside its own
//! chunk of the destination, so no synchronization is needed between tasks and
//! the call returns only after every chunk has completed.

#![forbid(unsafe_code)]

use std::ops::Range;

use rayon::prelude::*;

/// Below this many iterations per worker, parallelism is not worth the fork.
pub const MIN_ITERS_PER_THREAD: usize = 1 << 4;

/// Number of workers to use for `num_iterations` independent iterations.
///
/// Always at least one; never more than the rayon pool size.
pub fn calculate_num_threads(num_iterations: usize) -> usize {
    let max_threads = rayon::current_num_threads().max(1);
    (num_iterations / MIN_ITERS_PER_THREAD).clamp(1, max_threads)
}

/// Split `0..len` into `num_threads` contiguous ranges.
///
/// Every range has `len / num_threads` elements except the last, which also
/// receives the `len % num_threads` leftovers. The ranges cover `0..len`
/// exactly once.
pub fn chunk_ranges(len: usize, num_threads: usize) -> Vec<Range<usize>> {
    let num_threads = num_threads.max(1);
    let per_thread = len / num_threads;
    let leftovers = len - per_thread * num_threads;
    (0..num_threads)
        .map(|j| {
            let start = j * per_thread;
            let end = if j == num_threads - 1 {
                start + per_thread + leftovers
            } else {
                start + per_thread
            };
            start..end
        })
        .collect()
}

/// Run `f(offset, chunk)` over disjoint chunks of `dst` in parallel.
///
/// `offset` is the index of `chunk[0]` within `dst`. The chunking follows
/// [`chunk_ranges`] with [`calculate_num_threads`] workers.
pub fn parallel_for_chunks<T, Op>(dst: &mut [T], f: Op)
where
    T: Send,
    Op: Fn(usize, &mut [T]) + Sync + Send,
{
    let ranges = chunk_ranges(dst.len(), calculate_num_threads(dst.len()));
    let mut chunks: Vec<(usize, &mut [T])> = Vec::with_capacity(ranges.len());
    let mut rest = dst;
    for range in &ranges {
        let (head, tail) = rest.split_at_mut(range.len());
        chunks.push((range.start, head));
        rest = tail;
    }
    debug_assert!(rest.is_empty());
    chunks.into_par_iter().for_each(|(offset, chunk)| f(offset, chunk));
}

/// Parallel map over `0..n` producing a `Vec` in index order.
pub fn parallel_map_indices<T, Op>(n: usize, f: Op) -> Vec<T>
where
    T: Send + Default + Clone,
    Op: Fn(usize) -> T + Sync + Send,
{
    let mut out = vec![T::default(); n];
    parallel_for_chunks(&mut out, |offset, chunk| {
        for (k, slot) in chunk.iter_mut().enumerate() {
            *slot = f(offset + k);
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_cover_exactly_once() {
        for len in [0usize, 1, 7, 16, 17, 1000] {
            for threads in 1..=9 {
                let ranges = chunk_ranges(len, threads);
                assert_eq!(ranges.len(), threads);
                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next);
                    next = r.end;
                }
                assert_eq!(next, len);
            }
        }
    }

    #[test]
    fn leftovers_go_to_last_chunk() {
        let ranges = chunk_ranges(10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn num_threads_is_bounded() {
        assert_eq!(calculate_num_threads(0), 1);
        assert_eq!(calculate_num_threads(MIN_ITERS_PER_THREAD - 1), 1);
        assert!(calculate_num_threads(1 << 20) <= rayon::current_num_threads().max(1));
    }

    #[test]
    fn parallel_for_chunks_sees_absolute_offsets() {
        let mut v = vec![0usize; 1234];
        parallel_for_chunks(&mut v, |offset, chunk| {
            for (k, x) in chunk.iter_mut().enumerate() {
                *x = offset + k;
            }
        });
        assert!(v.iter().enumerate().all(|(i, &x)| i == x));
    }

    #[test]
    fn parallel_map_keeps_order() {
        let v = parallel_map_indices(100, |i| i * i);
        assert_eq!(v[9], 81);
        assert_eq!(v.len(), 100);
    }
}
