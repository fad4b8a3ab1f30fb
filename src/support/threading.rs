//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Spamsweep.
//
// Spamsweep is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Spamsweep is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Spamsweep. If not, see <http://www.gnu.org/licenses/>.

//! Utilities for working with threads.
//!
//! Threads only exist for the duration of one `WorkerPool::run_all()` call.
//! The sweeper is a short-lived process which alternates between talking to
//! the server (single-threaded) and classifying a batch of messages
//! (multi-threaded), so there is nothing to gain from keeping threads around
//! between batches.

use std::panic;

/// A bounded pool of worker threads for running a function over a batch of
/// inputs.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    pub const DEFAULT_WORKERS: usize = 5;

    /// Create a pool which never runs more than `max_workers` items at once.
    ///
    /// A bound of 0 is treated as 1.
    pub fn new(max_workers: usize) -> Self {
        WorkerPool {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Apply `mapper` to every element of `inputs`, possibly concurrently.
    ///
    /// The result has one element per input, in input order, regardless of
    /// the order in which the workers finish.
    ///
    /// Once this call returns, all the threads it spawned have been joined. If
    /// `mapper` panics, the panic is propagated to the caller after the other
    /// workers have finished.
    pub fn run_all<I: Send, O: Send>(
        &self,
        inputs: Vec<I>,
        mapper: impl Fn(I) -> O + Sync,
    ) -> Vec<O> {
        let count = inputs.len();
        if 0 == count {
            return Vec::new();
        }

        let nthreads = self.max_workers.min(count);
        let (input_send, input_recv) =
            crossbeam::channel::bounded::<(usize, I)>(nthreads);
        let (output_send, output_recv) =
            crossbeam::channel::unbounded::<(usize, O)>();

        let scope_result = crossbeam::scope(|s| {
            for _ in 0..nthreads {
                let input_recv = input_recv.clone();
                let output_send = output_send.clone();
                let mapper = &mapper;
                s.spawn(move |_| {
                    for (ix, input) in input_recv.iter() {
                        // The receiver lives until after the scope
                        let _ = output_send.send((ix, mapper(input)));
                    }
                });
            }

            drop(input_recv);
            drop(output_send);

            for item in inputs.into_iter().enumerate() {
                // Only fails if every worker has died
                if input_send.send(item).is_err() {
                    break;
                }
            }

            drop(input_send);
        });

        if let Err(payload) = scope_result {
            panic::resume_unwind(payload);
        }

        let mut slots: Vec<Option<O>> = (0..count).map(|_| None).collect();
        for (ix, output) in output_recv.iter() {
            slots[ix] = Some(output);
        }

        slots
            .into_iter()
            .map(|o| o.expect("Worker pool lost an output"))
            .collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new(WorkerPool::DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_input() {
        let out: Vec<u32> = WorkerPool::default().run_all(vec![], |x: u32| x);
        assert!(out.is_empty());
    }

    #[test]
    fn zero_bound_is_clamped() {
        assert_eq!(1, WorkerPool::new(0).max_workers());
        assert_eq!(
            vec![2, 4],
            WorkerPool::new(0).run_all(vec![1, 2], |x: u32| x * 2)
        );
    }

    #[test]
    fn concurrency_bound_is_respected() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let out = WorkerPool::new(3).run_all((0..40).collect(), |x: u32| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            x + 1
        });

        assert_eq!((1..41).collect::<Vec<u32>>(), out);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    #[should_panic]
    fn worker_panic_propagates() {
        WorkerPool::new(2).run_all(vec![1, 2, 3], |x: u32| {
            if 2 == x {
                panic!("boom");
            }
            x
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn output_order_matches_input_order(
            delays in prop::collection::vec(0u64..4, 0..24),
            workers in 1usize..8,
        ) {
            let inputs: Vec<(usize, u64)> =
                delays.iter().copied().enumerate().collect();
            let out = WorkerPool::new(workers).run_all(
                inputs,
                |(ix, delay)| {
                    thread::sleep(Duration::from_millis(delay));
                    ix
                },
            );

            prop_assert_eq!((0..delays.len()).collect::<Vec<_>>(), out);
        }
    }
}
