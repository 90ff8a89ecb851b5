//! Load helpers: many writes, and queries racing writes.
//!
//! Each helper returns a [`StressReport`]; tests assert on its failure
//! count and the bag contents afterwards.

use databag_codec::Value;
use databag_core::{BagResult, DataBag, DocumentBag, Field};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Outcome counts and timing of one stress run.
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Calls that returned `Ok`.
    pub ok: usize,
    /// Calls that returned `Err`.
    pub errors: usize,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl StressReport {
    /// Every call made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.ok + self.errors
    }

    /// Calls per second, zero for an instantaneous run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.calls() as f64 / secs
        } else {
            0.0
        }
    }

    /// Emits the report as one `info` event.
    pub fn log(&self, run: &str) {
        info!(
            run,
            calls = self.calls(),
            ok = self.ok,
            errors = self.errors,
            elapsed = ?self.elapsed,
            per_sec = format!("{:.1}", self.throughput()),
            "stress run finished"
        );
    }
}

/// Size knobs for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Calls to make in total, split across workers.
    pub operations: usize,
    /// Worker threads for the concurrent runs.
    pub threads: usize,
    /// Length of each written text value.
    pub value_size: usize,
    /// Distinct keys the sequential run cycles through.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 20_000,
            threads: 8,
            value_size: 512,
            key_count: 2_000,
        }
    }
}

impl StressConfig {
    /// Sizes that keep a unit test under a second.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 400,
            threads: 4,
            value_size: 64,
            key_count: 50,
        }
    }

    fn per_thread(&self) -> usize {
        self.operations / self.threads.max(1)
    }
}

/// Shared ok/error counters.
#[derive(Debug, Default)]
struct Tally {
    ok: AtomicUsize,
    errors: AtomicUsize,
}

impl Tally {
    fn record<T>(&self, outcome: BagResult<T>) {
        let slot = if outcome.is_ok() { &self.ok } else { &self.errors };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, started: Instant) -> StressReport {
        StressReport {
            ok: self.ok.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }
}

fn stress_key(i: usize) -> String {
    format!("s-{i:06}")
}

fn numbered(i: usize) -> Value {
    Value::map([("n", i64::try_from(i).unwrap_or(i64::MAX))])
}

/// Overwrites `key_count` keys round-robin from one thread.
///
/// With a versioned bag most writes rotate history.
pub fn stress_sequential_writes(bag: &DataBag, config: &StressConfig) -> StressReport {
    let payload = Value::from("v".repeat(config.value_size));
    let tally = Tally::default();
    let started = Instant::now();

    for i in 0..config.operations {
        tally.record(bag.set(&stress_key(i % config.key_count), &payload));
    }
    tally.report(started)
}

/// Writes fresh keys from `threads` workers, each owning its own key range.
pub fn stress_concurrent_writes(bag: &DataBag, config: &StressConfig) -> StressReport {
    let per_thread = config.per_thread();
    let tally = Tally::default();
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..config.threads {
            let tally = &tally;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let key = stress_key(worker * per_thread + i);
                    tally.record(bag.set(&key, &Value::from(format!("{worker}/{i}"))));
                }
            });
        }
    });
    tally.report(started)
}

/// Runs range queries from `threads` workers while one writer adds records.
///
/// The bag is seeded with `key_count` records first. A query counts as ok
/// when every match decodes.
pub fn stress_concurrent_queries(bag: &DocumentBag, config: &StressConfig) -> StressReport {
    for i in 0..config.key_count {
        bag.set(&stress_key(i), &numbered(i))
            .expect("seeding the stress bag failed");
    }

    let per_thread = config.per_thread();
    let key_count = config.key_count.max(1);
    let tally = Tally::default();
    let started = Instant::now();

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..per_thread {
                // Writer failures surface through the final record count
                let _ = bag.set(&stress_key(key_count + i), &numbered(i % key_count));
            }
        });
        for worker in 0..config.threads {
            let tally = &tally;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let floor = i64::try_from((worker + i) % key_count).unwrap_or(0);
                    let run = bag
                        .find([Field::new("n").ge(floor)])
                        .and_then(|matches| matches.collect::<BagResult<Vec<_>>>());
                    tally.record(run);
                }
            });
        }
    });
    tally.report(started)
}
