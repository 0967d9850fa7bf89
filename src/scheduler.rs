//! Worker-pool scheduler for per-read alignment tasks.
//!
//! A `Scheduler` is constructed explicitly by the caller and passed where
//! it is needed — there is no process-wide pool. Workers are scoped
//! threads drawing sequence-tagged tasks from bounded channels (one
//! shared queue, or per-worker queues fed round-robin). Every worker
//! owns its scratch state, built once and reused across tasks; results
//! stream back tagged with their input sequence number and the collector
//! reorders them, so output order always matches input order.
//!
//! A task that panics produces the caller's fallback result for that
//! task only; the worker rebuilds its scratch and keeps draining the
//! queue, and sibling workers are unaffected.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

/// How tasks are handed to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Each worker has its own bounded queue, fed cyclically.
    RoundRobin,
    /// All workers draw from one shared bounded queue.
    Shared,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    threads: usize,
    queue_depth: usize,
    policy: DispatchPolicy,
}

impl Scheduler {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            queue_depth: 64,
            policy: DispatchPolicy::RoundRobin,
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` over every task, delivering results to `sink` in input
    /// order. `init` builds one scratch state per worker; `fallback`
    /// supplies the result for a task whose execution panicked.
    pub fn run<T, R, S, I, W, F>(
        &self,
        tasks: impl Iterator<Item = T> + Send,
        init: I,
        work: W,
        fallback: F,
        mut sink: impl FnMut(R),
    ) where
        T: Send,
        R: Send,
        I: Fn() -> S + Sync,
        W: Fn(&mut S, &T) -> R + Sync,
        F: Fn(&T) -> R + Sync,
    {
        let threads = self.threads;
        let (result_tx, result_rx): (Sender<(u64, R)>, Receiver<(u64, R)>) =
            bounded(self.queue_depth * threads);

        // Build the task queues up front so the feeder and workers only
        // see their own endpoints.
        let (feeds, takes): (Vec<Sender<(u64, T)>>, Vec<Receiver<(u64, T)>>) = match self.policy {
            DispatchPolicy::RoundRobin => (0..threads).map(|_| bounded(self.queue_depth)).unzip(),
            DispatchPolicy::Shared => {
                let (tx, rx) = bounded(self.queue_depth * threads);
                (vec![tx], vec![rx; threads])
            }
        };

        thread::scope(|scope| {
            for take in takes {
                let result_tx = result_tx.clone();
                let init = &init;
                let work = &work;
                let fallback = &fallback;
                scope.spawn(move || {
                    let mut scratch = init();
                    for (seq, task) in take.iter() {
                        let outcome =
                            catch_unwind(AssertUnwindSafe(|| work(&mut scratch, &task)));
                        let result = match outcome {
                            Ok(r) => r,
                            Err(_) => {
                                log::error!(
                                    "alignment task {seq} failed; reporting its fallback record"
                                );
                                // The scratch may be mid-update; rebuild it.
                                scratch = init();
                                fallback(&task)
                            }
                        };
                        if result_tx.send((seq, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            scope.spawn(move || {
                for (seq, task) in (0u64..).zip(tasks) {
                    let lane = (seq as usize) % feeds.len();
                    if feeds[lane].send((seq, task)).is_err() {
                        break;
                    }
                }
                // Dropping the senders closes every queue.
            });

            // Reorder by sequence number as results stream in.
            let mut next = 0u64;
            let mut pending: BinaryHeap<Reverse<Pending<R>>> = BinaryHeap::new();
            for (seq, result) in result_rx.iter() {
                pending.push(Reverse(Pending(seq, result)));
                while pending
                    .peek()
                    .is_some_and(|Reverse(Pending(s, _))| *s == next)
                {
                    let Some(Reverse(Pending(_, r))) = pending.pop() else {
                        break;
                    };
                    sink(r);
                    next += 1;
                }
            }
            while let Some(Reverse(Pending(_, r))) = pending.pop() {
                sink(r);
            }
        });
    }
}

/// Heap entry ordered by sequence number only.
struct Pending<R>(u64, R);

impl<R> PartialEq for Pending<R> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<R> Eq for Pending<R> {}

impl<R> PartialOrd for Pending<R> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Pending<R> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_squares(policy: DispatchPolicy, threads: usize, n: u64) -> Vec<u64> {
        let scheduler = Scheduler::new(threads).with_policy(policy).with_queue_depth(4);
        let mut out = Vec::new();
        scheduler.run(
            0..n,
            || 0usize,
            |count, task| {
                *count += 1;
                task * task
            },
            |_| u64::MAX,
            |r| out.push(r),
        );
        out
    }

    #[test]
    fn results_come_back_in_input_order() {
        for policy in [DispatchPolicy::RoundRobin, DispatchPolicy::Shared] {
            for threads in [1, 4] {
                let out = collect_squares(policy, threads, 200);
                let expected: Vec<u64> = (0..200).map(|t| t * t).collect();
                assert_eq!(out, expected, "{policy:?} with {threads} threads");
            }
        }
    }

    #[test]
    fn a_panicking_task_fails_alone() {
        let scheduler = Scheduler::new(4).with_queue_depth(2);
        let mut out = Vec::new();
        scheduler.run(
            0..100u64,
            || (),
            |_, task| {
                assert!(task % 17 != 3, "induced failure");
                *task
            },
            |task| task + 10_000,
            |r| out.push(r),
        );
        assert_eq!(out.len(), 100);
        for (i, &r) in out.iter().enumerate() {
            let i = i as u64;
            if i % 17 == 3 {
                assert_eq!(r, i + 10_000, "failed task keeps its slot");
            } else {
                assert_eq!(r, i);
            }
        }
    }

    #[test]
    fn scratch_is_reused_within_a_worker() {
        let scheduler = Scheduler::new(1).with_policy(DispatchPolicy::Shared);
        let mut out = Vec::new();
        scheduler.run(
            0..10u64,
            || 0u64,
            |seen, _| {
                *seen += 1;
                *seen
            },
            |_| 0,
            |r| out.push(r),
        );
        // A single worker's scratch counts every task.
        assert_eq!(out, (1..=10).collect::<Vec<_>>());
    }
}
