// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Data-partitioned fan-out of query work over worker threads.
//!
//! Inputs below the configured size run on the calling thread. Larger
//! inputs are split into chunks and fed to a thread team through a
//! work-stealing queue; the caller merges chunk results in input order. A
//! deadline bounds the wait: on expiry the executor stops accepting chunk
//! results and reports a timed-out empty result, while in-flight workers
//! finish their current chunk and have their output discarded.

use crate::errors::*;
use crossbeam::channel::{self, RecvTimeoutError};
use crossbeam::deque::{Injector, Steal, Worker};
use serde_derive::{Deserialize, Serialize};
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn default_threads() -> usize {
    (num_cpus::get() - 1).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Worker thread count for parallel runs.
    #[serde(default = "default_threads")]
    pub num_threads: usize,
    /// Inputs smaller than this run sequentially on the calling thread.
    pub min_parallel_size: usize,
    /// Items per chunk handed to one worker at a time.
    pub chunk_size: usize,
    /// Let idle workers steal queued chunks in batches.
    pub work_stealing: bool,
    /// Deadline for one parallel run.
    pub timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorOptions {
            num_threads: default_threads(),
            min_parallel_size: 1024,
            chunk_size: 256,
            work_stealing: true,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ExecutorOptions {
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(
                ErrorKind::InvalidConfiguration("parallel threads must be positive".into()).into(),
            );
        }
        if self.chunk_size == 0 {
            return Err(
                ErrorKind::InvalidConfiguration("parallel chunk size must be positive".into())
                    .into(),
            );
        }
        Ok(())
    }
}

/// What one run did, beyond its results.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub elapsed: Duration,
    pub chunks_processed: usize,
    pub threads_used: usize,
    pub timed_out: bool,
    /// The first worker failure, if any. Worker errors are recorded here
    /// rather than raised.
    pub error: Option<String>,
}

/// Merged results plus the run report. A timed-out or failed run carries
/// empty results.
#[derive(Debug)]
pub struct Execution<R> {
    pub results: Vec<R>,
    pub report: ExecutionReport,
}

impl<R> Execution<R> {
    /// Flattens the report flags into a `Result`, for callers that prefer
    /// errors over inspecting the report.
    pub fn into_result(self) -> Result<Vec<R>> {
        if self.report.timed_out {
            return Err(ErrorKind::Timeout(self.report.elapsed.as_millis() as u64).into());
        }
        if let Some(msg) = self.report.error {
            return Err(ErrorKind::WorkerFailure(msg).into());
        }
        Ok(self.results)
    }
}

#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    options: ExecutorOptions,
}

impl ParallelExecutor {
    pub fn new(options: ExecutorOptions) -> Result<Self> {
        options.validate()?;
        Ok(ParallelExecutor { options })
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Applies `func` to chunks of `items` and merges the outputs in input
    /// order.
    pub fn map_chunks<T, R, F>(&self, items: &[T], func: F) -> Execution<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> Result<Vec<R>> + Sync,
    {
        let start = Instant::now();
        if items.len() < self.options.min_parallel_size || self.options.num_threads == 1 {
            return self.run_sequential(items, &func, start);
        }
        self.run_parallel(items, &func, start)
    }

    fn run_sequential<T, R, F>(&self, items: &[T], func: &F, start: Instant) -> Execution<R>
    where
        F: Fn(&[T]) -> Result<Vec<R>>,
    {
        let mut results = Vec::new();
        let mut chunks_processed = 0;
        for chunk in items.chunks(self.options.chunk_size.max(1)) {
            match func(chunk) {
                Ok(mut rs) => {
                    results.append(&mut rs);
                    chunks_processed += 1;
                }
                Err(e) => {
                    return Execution {
                        results: Vec::new(),
                        report: ExecutionReport {
                            elapsed: start.elapsed(),
                            chunks_processed,
                            threads_used: 1,
                            timed_out: false,
                            error: Some(e.to_string()),
                        },
                    };
                }
            }
        }
        Execution {
            results,
            report: ExecutionReport {
                elapsed: start.elapsed(),
                chunks_processed,
                threads_used: 1,
                timed_out: false,
                error: None,
            },
        }
    }

    fn run_parallel<T, R, F>(&self, items: &[T], func: &F, start: Instant) -> Execution<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> Result<Vec<R>> + Sync,
    {
        let chunks: Vec<&[T]> = items.chunks(self.options.chunk_size).collect();
        let num_chunks = chunks.len();
        let threads = self.options.num_threads.min(num_chunks);
        let deadline = start + self.options.timeout;
        let work_stealing = self.options.work_stealing;

        let jobs = Injector::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            jobs.push((index, chunk));
        }
        let cancelled = AtomicBool::new(false);

        let mut merged: Vec<(usize, Vec<R>)> = Vec::with_capacity(num_chunks);
        let mut timed_out = false;
        let mut error = None;

        crossbeam::scope(|s| {
            let (tx, rx) = channel::unbounded();
            for _ in 0..threads {
                let tx = tx.clone();
                let jobs = &jobs;
                let cancelled = &cancelled;
                s.spawn(move |_| {
                    let worker = Worker::new_fifo();
                    loop {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let job = if work_stealing {
                            worker.pop().or_else(|| {
                                iter::repeat_with(|| jobs.steal_batch_and_pop(&worker))
                                    .find(|task| !task.is_retry())
                                    .and_then(Steal::success)
                            })
                        } else {
                            iter::repeat_with(|| jobs.steal())
                                .find(|task| !task.is_retry())
                                .and_then(Steal::success)
                        };
                        let (index, chunk) = match job {
                            Some(job) => job,
                            None => break,
                        };
                        if tx.send((index, func(chunk))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut received = 0;
            while received < num_chunks {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok((index, Ok(rs))) => {
                        merged.push((index, rs));
                        received += 1;
                    }
                    Ok((_, Err(e))) => {
                        error = Some(e.to_string());
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        timed_out = true;
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // Stop workers from picking up further chunks; anything still
            // in flight completes and is discarded with the channel.
            cancelled.store(true, Ordering::Relaxed);
        })
        .expect("parallel executor worker panicked");

        let chunks_processed = merged.len();
        let results = if timed_out || error.is_some() {
            Vec::new()
        } else {
            merged.sort_by_key(|(index, _)| *index);
            merged.drain(..).flat_map(|(_, rs)| rs).collect()
        };
        Execution {
            results,
            report: ExecutionReport {
                elapsed: start.elapsed(),
                chunks_processed,
                threads_used: threads,
                timed_out,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn options(min_parallel_size: usize) -> ExecutorOptions {
        ExecutorOptions {
            num_threads: 4,
            min_parallel_size,
            chunk_size: 8,
            work_stealing: true,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_small_input_runs_sequentially() {
        let executor = ParallelExecutor::new(options(1000)).unwrap();
        let items: Vec<u64> = (0..100).collect();
        let run = executor.map_chunks(&items, |chunk| Ok(chunk.iter().map(|v| v * 2).collect()));
        assert_eq!(run.report.threads_used, 1);
        assert!(!run.report.timed_out);
        assert_eq!(run.results.len(), 100);
        assert_eq!(run.results[99], 198);
    }

    #[test]
    fn test_parallel_run_merges_in_order() {
        let executor = ParallelExecutor::new(options(1)).unwrap();
        let items: Vec<u64> = (0..1000).collect();
        let run = executor.map_chunks(&items, |chunk| Ok(chunk.iter().map(|v| v + 1).collect()));
        assert!(run.report.threads_used > 1);
        assert_eq!(run.report.chunks_processed, 125);
        let expected: Vec<u64> = (1..=1000).collect();
        assert_eq!(run.results, expected);
    }

    #[test]
    fn test_worker_error_is_recorded_not_raised() {
        let executor = ParallelExecutor::new(options(1)).unwrap();
        let items: Vec<u64> = (0..1000).collect();
        let run: Execution<u64> = executor.map_chunks(&items, |chunk| {
            if chunk.contains(&500) {
                Err(ErrorKind::WorkerFailure("bad chunk".into()).into())
            } else {
                Ok(chunk.to_vec())
            }
        });
        assert!(run.results.is_empty());
        assert!(run.report.error.is_some());
        assert!(!run.report.timed_out);
    }

    #[test]
    fn test_timeout_returns_empty_flagged_result() {
        let mut opts = options(1);
        opts.timeout = Duration::from_millis(50);
        let executor = ParallelExecutor::new(opts).unwrap();
        let items: Vec<u64> = (0..64).collect();
        let run = executor.map_chunks(&items, |chunk| {
            thread::sleep(Duration::from_millis(40));
            Ok(chunk.to_vec())
        });
        assert!(run.report.timed_out);
        assert!(run.results.is_empty());
        assert!(run.report.error.is_none());
    }

    #[test]
    fn test_into_result_maps_flags_to_errors() {
        let mut opts = options(1);
        opts.timeout = Duration::from_millis(10);
        let executor = ParallelExecutor::new(opts).unwrap();
        let items: Vec<u64> = (0..64).collect();
        let run = executor.map_chunks(&items, |chunk| {
            thread::sleep(Duration::from_millis(30));
            Ok(chunk.to_vec())
        });
        match run.into_result().unwrap_err().kind() {
            ErrorKind::Timeout(_) => (),
            other => panic!("expected Timeout, got {:?}", other),
        }

        let executor = ParallelExecutor::new(options(1)).unwrap();
        let run: Execution<u64> =
            executor.map_chunks(&items, |_| Err(ErrorKind::WorkerFailure("boom".into()).into()));
        match run.into_result().unwrap_err().kind() {
            ErrorKind::WorkerFailure(msg) => assert_eq!(msg.as_str(), "boom"),
            other => panic!("expected WorkerFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut opts = options(1);
        opts.num_threads = 0;
        assert!(ParallelExecutor::new(opts).is_err());
    }

    #[test]
    fn test_without_work_stealing() {
        let mut opts = options(1);
        opts.work_stealing = false;
        let executor = ParallelExecutor::new(opts).unwrap();
        let items: Vec<u64> = (0..512).collect();
        let run = executor.map_chunks(&items, |chunk| Ok(vec![chunk.iter().sum::<u64>()]));
        let total: u64 = run.results.iter().sum();
        assert_eq!(total, (0..512).sum());
    }
}
