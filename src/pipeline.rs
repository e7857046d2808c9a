//! Bounded producer/consumer pipeline
//!
//! Built only from the `ox-sync` primitives: two counting semaphores track
//! free and filled slots of a ring buffer, a mutex serializes the ring
//! indices, and a condition variable holds every worker at a start gate until
//! the coordinator opens it.
//!
//! A worker that fails or panics aborts the ring: every blocked push and pop
//! wakes up and fails, so `run` can join all threads and report the error.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use thiserror::Error;
use ox_core::config::PipelineConfig;
use ox_core::pipeline_debug;
use ox_sync::{Cond, Mutex, Semaphore};
use tracing::info;

/// Value that tells a consumer to stop
const STOP: u64 = u64::MAX;

/// Returned by workers told to stop because a peer failed
#[derive(Error, Debug)]
#[error("pipeline aborted")]
struct Aborted;

/// Per-item check applied by consumers
type Inspect = fn(u64) -> Result<()>;

/// Worker result: item count and wrapping sum
type Totals = (u64, u64);

/// Totals collected by a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineReport {
    /// Items pushed by producers
    pub produced: u64,
    /// Items popped by consumers
    pub consumed: u64,
    /// Wrapping sum of all consumed values
    pub checksum: u64,
    /// Wrapping sum of all produced values
    pub expected_checksum: u64,
}

impl PipelineReport {
    /// Every produced item was consumed exactly once
    pub fn is_consistent(&self) -> bool {
        self.produced == self.consumed && self.checksum == self.expected_checksum
    }
}

/// Fixed-capacity ring buffer
struct Ring {
    slots: Vec<AtomicU64>,
    /// Next write position, guarded by `lock`
    head: AtomicUsize,
    /// Next read position, guarded by `lock`
    tail: AtomicUsize,
    lock: Mutex,
    free: Semaphore,
    filled: Semaphore,
    aborted: AtomicBool,
}

impl Ring {
    fn new(capacity: usize) -> Result<Self> {
        let count = u32::try_from(capacity).context("ring capacity out of range")?;
        Ok(Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            lock: Mutex::new()?,
            free: Semaphore::with_count(count)?,
            filled: Semaphore::new()?,
            aborted: AtomicBool::new(false),
        })
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Fail every pending and future push and pop
    fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            // One token each; every thread it wakes passes it on before failing.
            let _ = self.free.post();
            let _ = self.filled.post();
        }
    }

    fn push(&self, value: u64) -> Result<()> {
        self.free.wait()?;
        if self.is_aborted() {
            let _ = self.free.post();
            bail!(Aborted);
        }
        {
            let _guard = self.lock.guard()?;
            let head = self.head.load(Ordering::Relaxed);
            self.slots[head % self.slots.len()].store(value, Ordering::Relaxed);
            self.head.store(head.wrapping_add(1), Ordering::Relaxed);
        }
        self.filled.post()?;
        Ok(())
    }

    fn pop(&self) -> Result<u64> {
        self.filled.wait()?;
        if self.is_aborted() {
            let _ = self.filled.post();
            bail!(Aborted);
        }
        let value = {
            let _guard = self.lock.guard()?;
            let tail = self.tail.load(Ordering::Relaxed);
            let value = self.slots[tail % self.slots.len()].load(Ordering::Relaxed);
            self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
            value
        };
        self.free.post()?;
        Ok(value)
    }
}

/// Aborts the ring unless disarmed, including when a worker panics
struct AbortOnExit<'a> {
    ring: &'a Ring,
    armed: bool,
}

impl Drop for AbortOnExit<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ring.abort();
        }
    }
}

/// One-shot gate that releases every waiting thread at once
struct StartGate {
    mutex: Mutex,
    cond: Cond,
    open: AtomicBool,
}

impl StartGate {
    fn new() -> Result<Self> {
        Ok(Self {
            mutex: Mutex::new()?,
            cond: Cond::new()?,
            open: AtomicBool::new(false),
        })
    }

    fn wait(&self) -> ox_sync::Result<()> {
        let mut guard = self.mutex.guard()?;
        while !self.open.load(Ordering::Relaxed) {
            self.cond.wait_guard(&mut guard)?;
        }
        Ok(())
    }

    fn open(&self) -> ox_sync::Result<()> {
        let locked = self.mutex.guard();
        self.open.store(true, Ordering::Relaxed);
        // Broadcast even if the lock failed so no worker stays parked.
        let woken = self.cond.broadcast();
        locked.map(drop).and(woken)
    }
}

/// Value pushed by `producer` as its `index`-th item, never `STOP`
fn item_value(producer: usize, index: usize, per_producer: usize) -> u64 {
    (producer as u64) * (per_producer as u64) + index as u64 + 1
}

/// Spawn a worker that waits at the gate, then runs `body`
fn spawn_worker<F>(
    name: String,
    ring: &Arc<Ring>,
    gate: &Arc<StartGate>,
    body: F,
) -> Result<JoinHandle<Result<Totals>>>
where
    F: FnOnce(&Ring) -> Result<Totals> + Send + 'static,
{
    let ring = Arc::clone(ring);
    let gate = Arc::clone(gate);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let mut exit = AbortOnExit {
                ring: &ring,
                armed: true,
            };
            let result = match gate.wait() {
                Err(e) => Err(e.into()),
                Ok(()) if ring.is_aborted() => Err(Aborted.into()),
                Ok(()) => body(&ring),
            };
            exit.armed = result.is_err();
            result
        })
        .with_context(|| format!("failed to spawn {}", name))
}

/// Join `handles`, summing their totals and keeping the most telling error
fn join_all(
    handles: Vec<JoinHandle<Result<Totals>>>,
    ring: &Ring,
    failure: &mut Option<anyhow::Error>,
) -> Totals {
    let mut totals: Totals = (0, 0);
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        let result = handle
            .join()
            .map_err(|_| anyhow!("{} panicked", name))
            .and_then(|r| r.with_context(|| format!("{} failed", name)));
        match result {
            Ok((count, sum)) => {
                totals.0 += count;
                totals.1 = totals.1.wrapping_add(sum);
            }
            Err(e) => {
                ring.abort();
                record(failure, e);
            }
        }
    }
    totals
}

/// Keep the first root cause over errors of peers that were only aborted
fn record(failure: &mut Option<anyhow::Error>, err: anyhow::Error) {
    let replace = match failure {
        None => true,
        Some(prev) => prev.is::<Aborted>() && !err.is::<Aborted>(),
    };
    if replace {
        *failure = Some(err);
    }
}

/// Run the pipeline to completion
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    run_with(config, |_| Ok(()))
}

/// Run the pipeline, passing every consumed item through `inspect`.
///
/// The first failing worker aborts the run; all threads are joined before
/// its error is returned.
fn run_with(config: &PipelineConfig, inspect: Inspect) -> Result<PipelineReport> {
    if config.capacity == 0 || config.producers == 0 || config.consumers == 0 {
        bail!("pipeline needs at least one slot, producer and consumer");
    }

    let ring = Arc::new(Ring::new(config.capacity)?);
    let gate = Arc::new(StartGate::new()?);
    let per_producer = config.items_per_producer;

    info!(
        "Starting pipeline: {} producers, {} consumers, {} items each, capacity {}",
        config.producers, config.consumers, per_producer, config.capacity
    );

    let mut producers = Vec::with_capacity(config.producers);
    let mut consumers = Vec::with_capacity(config.consumers);
    let mut failure = None;

    for id in 0..config.producers {
        let spawned = spawn_worker(format!("producer-{}", id), &ring, &gate, move |ring| {
            let mut sum = 0u64;
            for index in 0..per_producer {
                let value = item_value(id, index, per_producer);
                ring.push(value)?;
                sum = sum.wrapping_add(value);
            }
            pipeline_debug!("producer {} done", id);
            Ok((per_producer as u64, sum))
        });
        match spawned {
            Ok(handle) => producers.push(handle),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    for id in 0..config.consumers {
        if failure.is_some() {
            break;
        }
        let spawned = spawn_worker(format!("consumer-{}", id), &ring, &gate, move |ring| {
            let mut count = 0u64;
            let mut sum = 0u64;
            loop {
                let value = ring.pop()?;
                if value == STOP {
                    break;
                }
                inspect(value)?;
                count += 1;
                sum = sum.wrapping_add(value);
            }
            pipeline_debug!("consumer {} done after {} items", id, count);
            Ok((count, sum))
        });
        match spawned {
            Ok(handle) => consumers.push(handle),
            Err(e) => failure = Some(e),
        }
    }

    if failure.is_some() {
        ring.abort();
    }
    if let Err(e) = gate.open() {
        ring.abort();
        // Workers the broadcast did not reach cannot be woken; leave them detached.
        return Err(e).context("failed to open start gate");
    }

    let mut report = PipelineReport::default();
    (report.produced, report.expected_checksum) = join_all(producers, &ring, &mut failure);

    // All items are in the ring; queue one stop marker per consumer behind them.
    if failure.is_none() {
        for _ in 0..consumers.len() {
            if let Err(e) = ring.push(STOP) {
                ring.abort();
                record(&mut failure, e);
                break;
            }
        }
    }

    (report.consumed, report.checksum) = join_all(consumers, &ring, &mut failure);

    match failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
