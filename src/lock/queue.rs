//! # Fairness queue
//!
//! Requests that can't be granted right away line up here, in arrival order.
//! Each blocked thread owns a [Waiter] and parks on it, the thread releasing the lock
//! hands it over and unparks it with `Thread::unpark`.
//!
//! A waiter moves through a tiny state machine:
//!
//! ```text
//! WAITING ──claim──► CLAIMED ──grant──► GRANTED
//!    │
//!    ├──deadline──► TIMED_OUT
//!    └──interrupt─► INTERRUPTED
//! ```
//!
//! Both ways out of WAITING are a CAS, so a grant and a cancellation racing each other can't both win.
//! CLAIMED exists so the granter can update the lock state _after_ it knows the waiter is still there,
//! but _before_ the waiter is allowed to run.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicBool, AtomicU32,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc,
    },
    thread::{self, Thread},
    time::Instant,
};

use parking_lot::Mutex;

use super::stamp::Mode;

const WAITING: u32 = 0;
const CLAIMED: u32 = 1;
const GRANTED: u32 = 2;
const TIMED_OUT: u32 = 3;
const INTERRUPTED: u32 = 4;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Granted,
    TimedOut,
    Interrupted,
}

/// One pending acquisition.
pub(crate) struct Waiter {
    mode: Mode,
    state: AtomicU32,
    thread: Thread,
}

impl Waiter {
    /// a waiter always belongs to the calling thread
    pub(crate) fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            state: AtomicU32::new(WAITING),
            thread: thread::current(),
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    /// Granter's side: reserve the waiter before touching the lock state.
    /// Fails if the waiter already gave up.
    pub(crate) fn claim(&self) -> bool {
        self.state
            .compare_exchange(WAITING, CLAIMED, Relaxed, Relaxed)
            .is_ok()
    }

    /// Granter's side: the lock state already reflects the grant, let the owner go.
    pub(crate) fn grant(&self) {
        // Release => the state update above happens-before the waiter's return
        self.state.store(GRANTED, Release);
        self.thread.unpark();
    }

    /// Cancels the wait from any thread. Loses to a grant that got there first.
    pub(crate) fn interrupt(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(WAITING, INTERRUPTED, Relaxed, Relaxed)
            .is_ok();
        if cancelled {
            self.thread.unpark();
        }
        cancelled
    }

    fn time_out(&self) -> bool {
        self.state
            .compare_exchange(WAITING, TIMED_OUT, Relaxed, Relaxed)
            .is_ok()
    }

    /// Parks the owning thread until the wait is decided.
    /// Spurious unparks are fine - every round re-checks the state.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Outcome {
        loop {
            match self.state.load(Acquire) {
                GRANTED => return Outcome::Granted,
                TIMED_OUT => return Outcome::TimedOut,
                INTERRUPTED => return Outcome::Interrupted,
                // the grant is on its way, the granter unparks us when done
                CLAIMED => thread::park(),
                _ => match deadline {
                    None => thread::park(),
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            // if this fails, somebody claimed or interrupted us - look again
                            self.time_out();
                        } else {
                            thread::park_timeout(deadline - now);
                        }
                    }
                },
            }
        }
    }
}

/// FIFO of pending requests. Lives behind the lock's queue mutex.
#[derive(Default)]
pub(crate) struct WaitQueue {
    waiters: VecDeque<Arc<Waiter>>,
}

impl WaitQueue {
    pub(crate) fn push_back(&mut self, waiter: Arc<Waiter>) {
        self.waiters.push_back(waiter);
    }

    pub(crate) fn front(&self) -> Option<&Arc<Waiter>> {
        self.waiters.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Arc<Waiter>> {
        self.waiters.pop_front()
    }

    /// drops an abandoned waiter, it may have been skipped by a dispatch already
    pub(crate) fn remove(&mut self, waiter: &Arc<Waiter>) -> bool {
        match self.waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            Some(i) => {
                self.waiters.remove(i);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// A cancellation signal for blocking acquisitions.
///
/// Raising it cancels the acquisition currently blocked on it, or the next one to start.
/// An acquisition that fails with [Interrupted](crate::LockError::Interrupted) consumes the signal,
/// one that got granted first leaves it raised.
///
/// Clones share the signal, so one clone can be handed to the thread that decides to cancel.
/// Only one acquisition at a time should be blocked on a given signal.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

#[derive(Default)]
struct InterruptInner {
    raised: AtomicBool,
    blocked: Mutex<Option<Arc<Waiter>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.inner.raised.store(true, Release);
        if let Some(waiter) = self.inner.blocked.lock().as_ref() {
            waiter.interrupt();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Acquire)
    }

    pub fn clear(&self) {
        self.inner.raised.store(false, Release);
    }

    /// reads and lowers the signal
    pub(crate) fn take(&self) -> bool {
        self.inner.raised.swap(false, Acquire)
    }

    /// From now on [Interrupt::interrupt] cancels `waiter`.
    /// Both sides go through the mutex, so a signal raised in-between isn't lost.
    pub(crate) fn attach(&self, waiter: &Arc<Waiter>) {
        let mut blocked = self.inner.blocked.lock();
        *blocked = Some(Arc::clone(waiter));
        if self.inner.raised.load(Acquire) {
            waiter.interrupt();
        }
    }

    pub(crate) fn detach(&self) {
        self.inner.blocked.lock().take();
    }
}

#[cfg(test)]
mod test {
    use std::{
        thread::{scope, sleep},
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_grant_wakes_parked_waiter() {
        // the waiter has to be made by the thread that parks on it
        let slot: Mutex<Option<Arc<Waiter>>> = Mutex::new(None);
        scope(|s| {
            let t = s.spawn(|| {
                let waiter = Waiter::new(Mode::Read);
                *slot.lock() = Some(Arc::clone(&waiter));
                waiter.wait(None)
            });
            let waiter = loop {
                if let Some(waiter) = slot.lock().clone() {
                    break waiter;
                }
                sleep(Duration::from_millis(5));
            };
            sleep(Duration::from_millis(50));
            assert!(waiter.claim());
            waiter.grant();
            assert_eq!(t.join().unwrap(), Outcome::Granted);
        });
    }

    #[test]
    fn test_claimed_waiter_ignores_interrupt() {
        let waiter = Waiter::new(Mode::Write);
        assert!(waiter.claim());
        assert!(!waiter.interrupt());
        waiter.grant();
        assert_eq!(waiter.wait(None), Outcome::Granted);
    }

    #[test]
    fn test_interrupted_waiter_cannot_be_claimed() {
        let waiter = Waiter::new(Mode::Write);
        assert!(waiter.interrupt());
        assert!(!waiter.claim());
        assert_eq!(waiter.wait(None), Outcome::Interrupted);
    }

    #[test]
    fn test_deadline_times_out() {
        let waiter = Waiter::new(Mode::Read);
        let started = Instant::now();
        let outcome = waiter.wait(Some(started + Duration::from_millis(30)));
        assert_eq!(outcome, Outcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!waiter.claim());
    }

    #[test]
    fn test_interrupt_raised_before_attach_is_not_lost() {
        let signal = Interrupt::new();
        signal.interrupt();
        let waiter = Waiter::new(Mode::Read);
        signal.attach(&waiter);
        assert_eq!(waiter.wait(None), Outcome::Interrupted);
        signal.detach();
        assert!(signal.take());
        assert!(!signal.is_interrupted());
    }

    #[test]
    fn test_queue_remove_by_identity() {
        let mut queue = WaitQueue::default();
        let a = Waiter::new(Mode::Read);
        let b = Waiter::new(Mode::Write);
        queue.push_back(Arc::clone(&a));
        queue.push_back(Arc::clone(&b));
        assert!(queue.remove(&a));
        assert!(!queue.remove(&a));
        assert_eq!(queue.len(), 1);
        assert!(Arc::ptr_eq(queue.front().unwrap(), &b));
        assert!(queue.pop_front().is_some());
        assert!(queue.is_empty());
    }
}
