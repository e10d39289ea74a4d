//! # Writer starvation check
//!
//! Not a part of the lock - an outside driver using the public API only.
//!
//! Readers show up one by one, each tries an optimistic read first and falls back to `read_lock`
//! (holding it for a while) if the stamp doesn't validate. A writer comes in the middle of the stream
//! and we measure how long it waits for the write lock.
//!
//! With a reader-preferring lock the writer waits for the whole stream of readers to dry out.
//! With ours it waits only for the readers that were in before it, everyone later lines up behind it.

mod config;

use std::{
    panic::resume_unwind,
    thread::{self, sleep},
    time::{Duration, Instant},
};

pub use config::DemoConfig;

use crate::{
    error::{DemoError, LockError},
    StampedLock,
};

/// Runs the scenario, returns how long the writer waited for its lock.
/// Fails with [DemoError::Starvation] if that's over the configured threshold.
pub fn run_starvation_check(lock: &StampedLock, config: &DemoConfig) -> Result<Duration, DemoError> {
    println!("checking {lock:?}");
    let waited = thread::scope(|s| -> Result<Duration, DemoError> {
        let readers = s.spawn(move || -> Result<(), LockError> {
            println!("going to start readers ...");
            let handles: Vec<_> = (0..config.readers)
                .map(|id| {
                    let handle = s.spawn(move || read(lock, config, id));
                    sleep(config.reader_spawn_interval());
                    handle
                })
                .collect();
            handles
                .into_iter()
                .try_for_each(|h| h.join().unwrap_or_else(|panic| resume_unwind(panic)))
        });

        sleep(config.writer_delay());
        println!("going to try to write now ...");
        let started = Instant::now();
        let stamp = lock.write_lock();
        let waited = started.elapsed();
        println!("time to acquire write lock = {}ms", waited.as_millis());
        println!("writer is writing ...");
        sleep(config.writer_hold());
        lock.unlock_write(stamp)?;
        println!("writer is done");

        readers
            .join()
            .unwrap_or_else(|panic| resume_unwind(panic))?;
        Ok(waited)
    })?;

    if waited > config.threshold() {
        return Err(DemoError::Starvation {
            waited,
            threshold: config.threshold(),
        });
    }
    println!("no writer starvation");
    Ok(waited)
}

/// one reader of the stream: optimistic first, pessimistic if that didn't work out
fn read(lock: &StampedLock, config: &DemoConfig, id: usize) -> Result<(), LockError> {
    if !config.pessimistic {
        let stamp = lock.try_optimistic_read();
        println!("reader {id} reading optimistically");
        if lock.validate(stamp) {
            println!("reader {id} is done");
            return Ok(());
        }
    }
    let stamp = lock.read_lock();
    println!("reader {id} is reading pessimistically ...");
    sleep(config.reader_hold());
    lock.unlock_read(stamp)?;
    println!("reader {id} is done");
    Ok(())
}
