//! # Stamped lock
//!
//! A read-write lock with a third, non-blocking, way to read:
//! - optimistic read - take a stamp, read, then ask [StampedLock::validate] if a writer came by
//! - pessimistic read - shared, blocking, like [RwLock::read](std::sync::RwLock::read)
//! - write - exclusive, blocking
//!
//! A plain counter-based read-write lock lets readers in while _anything_ but a writer
//! holds the lock. A steady flow of short readers keeps the counter above 0 forever and the writer
//! never gets its turn - writer starvation.
//!
//! Here the lock is writer-fair:
//! - a request that can't be granted right away goes to the back of a FIFO [queue](queue)
//! - while the queue isn't empty, the QUEUED bit of the [state](state) is up and nobody takes the
//!   fast path => a reader arriving after a waiting writer lines up behind it
//! - readers already holding the lock (or queued before the writer) are honored first, so the writer
//!   waits for them only, not for the whole stream of readers
//! - releasing hands the lock to the head of the queue, a run of readers at the head is let in together
//!
//! ## Optimistic reads & memory ordering
//!
//! It's the seqlock trick: the version in the state only moves when a writer releases, so "same
//! version, no writer" at validation time means nothing was written in-between.
//! The writer issues a Release fence right after it gets the lock, the validator an Acquire fence
//! right before it re-reads the state. If a speculative read saw anything the writer wrote,
//! the fences pair up and the validator is guaranteed to see the writer's bit or a newer version.
//! The data read speculatively still has to be read through atomics (or copied racily with care),
//! the lock can only tell that it may be garbage.
//!
//! ## Stamps & unlock discipline
//!
//! Every unlock checks the stamp against the state before touching anything and fails with
//! [LockError::IllegalState] otherwise. Write stamps are exact: a write lock is exclusive and its
//! release bumps the version. Read stamps carry a ticket of their own [hold](holds), released exactly
//! once => a second unlock of the same stamp fails even while other readers keep the count up.

mod guard;
mod holds;
mod queue;
mod stamp;
mod state;

use std::{
    fmt,
    sync::{
        atomic::{
            fence, AtomicU64,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

pub use guard::{ReadGuard, WriteGuard};
pub use queue::Interrupt;
pub use stamp::{Mode, Stamp};

use crate::error::LockError;
use holds::ReadHolds;
use queue::{Outcome, WaitQueue, Waiter};
use state::{QUEUED, STAMP_MASK, WRITER};

pub struct StampedLock {
    id: u64,
    /// see [state] for the layout
    state: AtomicU64,
    /// pending requests; QUEUED mirrors `!queue.is_empty()` and only changes under this mutex
    queue: Mutex<WaitQueue>,
    /// tickets of the live read holds
    holds: ReadHolds,
}

/// How long a blocked request is willing to wait.
#[derive(Clone, Copy)]
enum Patience<'a> {
    Forever,
    Until(Instant),
    Interruptible(&'a Interrupt),
}

impl StampedLock {
    pub fn new() -> Self {
        Self {
            id: stamp::next_lock_id(),
            state: AtomicU64::new(0), // unlocked, version 0
            queue: Mutex::new(WaitQueue::default()),
            holds: ReadHolds::new(),
        }
    }

    // ----- optimistic -----

    /// Never blocks, never fails. The stamp is worthless until [StampedLock::validate]-d,
    /// and it won't validate at all if a writer holds the lock right now.
    pub fn try_optimistic_read(&self) -> Stamp {
        // Acquire => everything the last writer did is visible to the speculative read
        let s = self.state.load(Acquire);
        Stamp::new(self.id, s, Mode::OptimisticRead)
    }

    /// `true` if no write lock was taken since `stamp` was issued.
    /// `false` means whatever was read under the stamp must be thrown away.
    ///
    /// Read and write stamps validate for as long as they're held.
    pub fn validate(&self, stamp: Stamp) -> bool {
        if stamp.lock_id() != self.id || (stamp.is_optimistic_read() && stamp.saw_writer()) {
            return false;
        }
        // keeps the speculative loads above from sinking below the state check
        fence(Acquire);
        self.state.load(Relaxed) & STAMP_MASK == stamp.bits()
    }

    // ----- read -----

    /// Takes a read lock if that's possible without waiting: no writer in, nobody queued.
    pub fn try_read_lock(&self) -> Option<Stamp> {
        let mut s = self.state.load(Relaxed);
        while state::can_read_fast(s) {
            match self.state.compare_exchange_weak(s, s + 1, Acquire, Relaxed) {
                Ok(_) => return Some(Stamp::read(self.id, s, self.holds.register())),
                Err(e) => s = e, // another reader or writer got in between, look again
            }
        }
        None
    }

    /// Blocks until a shared lock is granted. Can't be cancelled, see [StampedLock::read_lock_interruptibly].
    pub fn read_lock(&self) -> Stamp {
        self.lock_forever(Mode::Read)
    }

    pub fn read_lock_interruptibly(&self, interrupt: &Interrupt) -> Result<Stamp, LockError> {
        self.lock_interruptibly(Mode::Read, interrupt)
    }

    pub fn read_lock_timeout(&self, timeout: Duration) -> Result<Stamp, LockError> {
        self.lock_timeout(Mode::Read, timeout)
    }

    /// Gives back one read lock. The last reader out hands the lock to whoever waits.
    pub fn unlock_read(&self, stamp: Stamp) -> Result<(), LockError> {
        // the ticket goes first: a released or foreign one stops us before the count moves
        if stamp.lock_id() != self.id
            || !stamp.is_read_lock()
            || !self.holds.release(stamp.ticket())
        {
            return Err(self.reject(stamp, Mode::Read));
        }
        self.release_read_hold();
        Ok(())
    }

    /// Drops one read lock without a stamp, e.g. when the stamp got lost.
    /// The stamp of the dropped hold stops working.
    /// `false` if there was no read hold to drop (a hold still being handed out doesn't count yet).
    pub fn try_unlock_read(&self) -> bool {
        if self.holds.release_any().is_none() {
            return false;
        }
        self.release_read_hold();
        true
    }

    /// The count part of a read unlock, once its ticket is gone.
    fn release_read_hold(&self) {
        // every live ticket is backed by a count => this can't go below 0
        let s = self.state.fetch_sub(1, Release);
        if state::readers(s) == 1 && state::is_queued(s) {
            self.dispatch(&mut self.queue.lock());
        }
    }

    // ----- write -----

    /// Takes the write lock if it's completely free and nobody's queued.
    pub fn try_write_lock(&self) -> Option<Stamp> {
        let mut s = self.state.load(Relaxed);
        while state::can_write_fast(s) {
            match self
                .state
                .compare_exchange_weak(s, s | WRITER, Acquire, Relaxed)
            {
                Ok(_) => {
                    // pairs with the Acquire fence in validate
                    fence(Release);
                    return Some(Stamp::new(self.id, s | WRITER, Mode::Write));
                }
                Err(e) => s = e,
            }
        }
        None
    }

    /// Blocks until the exclusive lock is granted. Can't be cancelled, see [StampedLock::write_lock_interruptibly].
    pub fn write_lock(&self) -> Stamp {
        self.lock_forever(Mode::Write)
    }

    pub fn write_lock_interruptibly(&self, interrupt: &Interrupt) -> Result<Stamp, LockError> {
        self.lock_interruptibly(Mode::Write, interrupt)
    }

    pub fn write_lock_timeout(&self, timeout: Duration) -> Result<Stamp, LockError> {
        self.lock_timeout(Mode::Write, timeout)
    }

    /// Releases the write lock and bumps the version, which invalidates every optimistic stamp
    /// issued before.
    pub fn unlock_write(&self, stamp: Stamp) -> Result<(), LockError> {
        if stamp.lock_id() != self.id || !stamp.is_write_lock() {
            return Err(self.reject(stamp, Mode::Write));
        }
        let mut s = self.state.load(Relaxed);
        loop {
            // the writer bit is part of the write stamp => this also checks the lock is write-held
            if s & STAMP_MASK != stamp.bits() {
                return Err(self.reject(stamp, Mode::Write));
            }
            match self
                .state
                .compare_exchange_weak(s, state::released_write(s), Release, Relaxed)
            {
                Ok(_) => break,
                Err(e) => s = e,
            }
        }
        if state::is_queued(s) {
            self.dispatch(&mut self.queue.lock());
        }
        Ok(())
    }

    /// Drops the write lock without a stamp. `false` if it wasn't write-locked.
    pub fn try_unlock_write(&self) -> bool {
        let mut s = self.state.load(Relaxed);
        loop {
            if !state::is_write_locked(s) {
                return false;
            }
            match self
                .state
                .compare_exchange_weak(s, state::released_write(s), Release, Relaxed)
            {
                Ok(_) => break,
                Err(e) => s = e,
            }
        }
        if state::is_queued(s) {
            self.dispatch(&mut self.queue.lock());
        }
        true
    }

    /// Releases whatever `stamp` holds.
    pub fn unlock(&self, stamp: Stamp) -> Result<(), LockError> {
        match stamp.mode() {
            Mode::Read => self.unlock_read(stamp),
            Mode::Write => self.unlock_write(stamp),
            // there's nothing to give back for an optimistic read
            Mode::OptimisticRead => Err(self.reject(stamp, Mode::OptimisticRead)),
        }
    }

    // ----- guards -----

    /// [StampedLock::read_lock] that unlocks on drop.
    pub fn read(&self) -> ReadGuard<'_> {
        ReadGuard::new(self, self.read_lock())
    }

    /// [StampedLock::write_lock] that unlocks on drop.
    pub fn write(&self) -> WriteGuard<'_> {
        WriteGuard::new(self, self.write_lock())
    }

    // ----- introspection -----

    pub fn is_read_locked(&self) -> bool {
        state::readers(self.state.load(Relaxed)) != 0
    }

    pub fn is_write_locked(&self) -> bool {
        state::is_write_locked(self.state.load(Relaxed))
    }

    pub fn read_lock_count(&self) -> u64 {
        state::readers(self.state.load(Relaxed))
    }

    /// number of write releases so far (modulo 2^38)
    pub fn version(&self) -> u64 {
        state::version(self.state.load(Relaxed))
    }

    pub fn has_queued_waiters(&self) -> bool {
        state::is_queued(self.state.load(Relaxed))
    }

    /// a snapshot - can be stale by the time it's returned
    pub fn queue_length(&self) -> usize {
        self.queue.lock().len()
    }

    // ----- slow path -----

    fn fast_path(&self, mode: Mode) -> Option<Stamp> {
        match mode {
            Mode::Read => self.try_read_lock(),
            Mode::Write => self.try_write_lock(),
            Mode::OptimisticRead => Some(self.try_optimistic_read()),
        }
    }

    fn lock_forever(&self, mode: Mode) -> Stamp {
        if let Some(stamp) = self.fast_path(mode) {
            return stamp;
        }
        loop {
            // a wait without deadline or interrupt can only end with a grant
            if let Ok(stamp) = self.acquire_queued(mode, Patience::Forever) {
                return stamp;
            }
        }
    }

    fn lock_interruptibly(&self, mode: Mode, interrupt: &Interrupt) -> Result<Stamp, LockError> {
        // a raised signal fails the call even if the lock is free
        if interrupt.take() {
            return Err(LockError::Interrupted);
        }
        match self.fast_path(mode) {
            Some(stamp) => Ok(stamp),
            None => self.acquire_queued(mode, Patience::Interruptible(interrupt)),
        }
    }

    fn lock_timeout(&self, mode: Mode, timeout: Duration) -> Result<Stamp, LockError> {
        if let Some(stamp) = self.fast_path(mode) {
            return Ok(stamp);
        }
        if timeout.is_zero() {
            return Err(LockError::Timeout(timeout));
        }
        // an overflowing deadline is as good as none
        let patience = Instant::now()
            .checked_add(timeout)
            .map_or(Patience::Forever, Patience::Until);
        self.acquire_queued(mode, patience).map_err(|e| match e {
            LockError::Timeout(_) => LockError::Timeout(timeout),
            other => other,
        })
    }

    /// Lines up behind everyone who came earlier and parks until granted or given up.
    #[cold]
    fn acquire_queued(&self, mode: Mode, patience: Patience<'_>) -> Result<Stamp, LockError> {
        let waiter = {
            let mut queue = self.queue.lock();
            // the lock may have been freed while we were getting here
            if queue.is_empty() {
                if let Some(stamp) = self.fast_path(mode) {
                    return Ok(stamp);
                }
            }
            let waiter = Waiter::new(mode);
            queue.push_back(Arc::clone(&waiter));
            // from here on fast paths are closed
            self.state.fetch_or(QUEUED, Acquire);
            // everyone could have left between our check and the flag going up =>
            // nobody would dispatch for us
            self.dispatch(&mut queue);
            trace!(lock = self.id, %mode, queued = queue.len(), "request queued");
            waiter
        };

        let deadline = match patience {
            Patience::Until(deadline) => Some(deadline),
            Patience::Forever | Patience::Interruptible(_) => None,
        };
        if let Patience::Interruptible(interrupt) = patience {
            interrupt.attach(&waiter);
        }
        let outcome = waiter.wait(deadline);
        if let Patience::Interruptible(interrupt) = patience {
            interrupt.detach();
        }

        match outcome {
            Outcome::Granted => {
                // the granter already put us into the state, it won't change while we hold the lock
                let s = self.state.load(Acquire);
                if mode == Mode::Write {
                    fence(Release);
                }
                trace!(lock = self.id, %mode, "granted from queue");
                Ok(match mode {
                    Mode::Read => Stamp::read(self.id, s, self.holds.register()),
                    _ => Stamp::new(self.id, s, mode),
                })
            }
            Outcome::TimedOut | Outcome::Interrupted => {
                let mut queue = self.queue.lock();
                queue.remove(&waiter);
                // we may have been the writer holding back the readers behind us
                self.dispatch(&mut queue);
                trace!(lock = self.id, %mode, ?outcome, "request abandoned");
                if outcome == Outcome::Interrupted {
                    if let Patience::Interruptible(interrupt) = patience {
                        interrupt.take();
                    }
                    Err(LockError::Interrupted)
                } else {
                    Err(LockError::Timeout(Duration::ZERO))
                }
            }
        }
    }

    /// Hands the lock to the head of the queue for as long as the state allows it:
    /// either one writer or a run of readers up to the next writer.
    /// Must be called with the queue locked. It's the only place lowering QUEUED.
    fn dispatch(&self, queue: &mut WaitQueue) {
        while let Some(head) = queue.front() {
            let mode = head.mode();
            // with QUEUED up nobody else can take the lock => the state only gets freer from here
            let s = self.state.load(Acquire);
            let free = match mode {
                Mode::Write => !state::is_write_locked(s) && state::readers(s) == 0,
                _ => !state::is_write_locked(s) && state::readers(s) < state::MAX_READERS,
            };
            if !free {
                return;
            }
            let Some(waiter) = queue.pop_front() else {
                break;
            };
            if !waiter.claim() {
                // timed out or interrupted, it'll find itself gone
                continue;
            }
            let taken = if mode == Mode::Write { WRITER } else { 1 };
            self.state.fetch_add(taken, Acquire);
            waiter.grant();
        }
        self.state.fetch_and(!QUEUED, Release);
    }

    #[cold]
    fn reject(&self, stamp: Stamp, expected: Mode) -> LockError {
        debug!(lock = self.id, ?stamp, %expected, "unlock rejected");
        LockError::IllegalState { expected }
    }
}

impl Default for StampedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// `StampedLock { state: Read-locks:2, version: 7, queued: true }`
impl fmt::Debug for StampedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.load(Relaxed);
        let held = if state::is_write_locked(s) {
            "Write-locked".to_string()
        } else if state::readers(s) > 0 {
            format!("Read-locks:{}", state::readers(s))
        } else {
            "Unlocked".to_string()
        };
        write!(
            f,
            "StampedLock {{ state: {held}, version: {}, queued: {} }}",
            state::version(s),
            state::is_queued(s)
        )
    }
}
