//! Stress helpers for concurrent pushes.
//!
//! These drive a [`SyncServer`] from several threads and report how the
//! per-entity locks arbitrated between them.

use crate::fixtures::{client, note};
use notesync_core::{ChangeRequest, EntityId, OwnerId};
use notesync_protocol::{PushEntry, PushRequest, PushResponse};
use notesync_server::SyncServer;
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total entries pushed.
    pub total_ops: usize,
    /// Entries applied.
    pub applied: usize,
    /// Entries answered with a conflict.
    pub conflicts: usize,
    /// Entries that failed or batches that were rejected.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
    /// Entries per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Builds a result from counters.
    pub fn new(applied: usize, conflicts: usize, failed: usize, duration: Duration) -> Self {
        let total = applied + conflicts + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            total_ops: total,
            applied,
            conflicts,
            failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total entries: {}", self.total_ops);
        println!("Applied: {}", self.applied);
        println!("Conflicts: {}", self.conflicts);
        println!("Failed: {}", self.failed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} entries/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent client threads.
    pub threads: usize,
    /// Batches pushed by each thread.
    pub batches_per_thread: usize,
    /// Entries in each batch.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            batches_per_thread: 25,
            batch_size: 10,
        }
    }
}

impl StressConfig {
    /// A small configuration for quick test runs.
    pub fn quick() -> Self {
        Self {
            threads: 4,
            batches_per_thread: 5,
            batch_size: 5,
        }
    }
}

/// Outcome of several clients racing on the same entity.
#[derive(Debug, Clone, Default)]
pub struct RaceOutcome {
    /// Client ids whose update was applied.
    pub winners: Vec<String>,
    /// Client ids that received a conflict.
    pub losers: Vec<String>,
    /// Client ids whose entry failed.
    pub failed: Vec<String>,
}

fn tally(response: &PushResponse) -> (usize, usize, usize) {
    (
        response.applied.len(),
        response.conflicts.len(),
        response.failed.len(),
    )
}

/// Seeds note `id` at version 1, then has `threads` clients push an
/// update based on version 1 at the same instant.
pub fn race_same_entity(server: &SyncServer, owner: &OwnerId, id: &str, threads: usize) -> RaceOutcome {
    let seed = client("seed");
    server
        .create(owner, &seed, id, note("contested"))
        .expect("seed contested note");

    let barrier = Barrier::new(threads);
    let outcome = Mutex::new(RaceOutcome::default());

    thread::scope(|scope| {
        for t in 0..threads {
            let barrier = &barrier;
            let outcome = &outcome;
            scope.spawn(move || {
                let name = format!("racer-{t}");
                let entry = PushEntry::from(ChangeRequest::update(
                    id,
                    note(&format!("edit by {name}")),
                    1,
                    name.as_str(),
                ));
                barrier.wait();
                let response = server
                    .push(owner, PushRequest::new(name.as_str(), vec![entry]))
                    .expect("race push");
                let mut outcome = outcome.lock().expect("outcome lock");
                match tally(&response) {
                    (1, 0, 0) => outcome.winners.push(name),
                    (0, 1, 0) => outcome.losers.push(name),
                    _ => outcome.failed.push(name),
                }
            });
        }
    });

    outcome.into_inner().expect("outcome lock")
}

/// Pushes creates of distinct notes from `config.threads` clients.
pub fn stress_distinct_creates(
    server: &SyncServer,
    owner: &OwnerId,
    config: &StressConfig,
) -> StressTestResult {
    let totals = Mutex::new((0usize, 0usize, 0usize));
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let totals = &totals;
            scope.spawn(move || {
                let name = format!("writer-{t}");
                let mut local = (0usize, 0usize, 0usize);
                for b in 0..config.batches_per_thread {
                    let entries = (0..config.batch_size)
                        .map(|i| {
                            let id = EntityId::new(format!("{name}-{b}-{i}"));
                            PushEntry::from(ChangeRequest::create(
                                id,
                                note(&format!("{name} {b} {i}")),
                                name.as_str(),
                            ))
                        })
                        .collect();
                    match server.push(owner, PushRequest::new(name.as_str(), entries)) {
                        Ok(response) => {
                            let (a, c, f) = tally(&response);
                            local.0 += a;
                            local.1 += c;
                            local.2 += f;
                        }
                        Err(_) => local.2 += config.batch_size,
                    }
                }
                let mut totals = totals.lock().expect("totals lock");
                totals.0 += local.0;
                totals.1 += local.1;
                totals.2 += local.2;
            });
        }
    });

    let (applied, conflicts, failed) = totals.into_inner().expect("totals lock");
    StressTestResult::new(applied, conflicts, failed, start.elapsed())
}
