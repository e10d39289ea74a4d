//! # Stamps
//! A stamp is what the caller keeps between "lock" and "unlock" (or between "optimistic read" and
//! "validate"). It remembers:
//! - which lock issued it, so a stamp can't unlock a neighbour
//! - the version/writer bits of the state at issue time
//! - the mode it was issued for
//! - for read holds, the hold's ticket (see [holds](super::holds)), so two readers never share a stamp
//!
//! Stamps are plain `Copy` values, the lock checks them on every use instead of trusting them.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};

use strum_macros::{Display, EnumIter};

use super::{
    holds::NO_TICKET,
    state::{STAMP_MASK, VERSION_SHIFT, WRITER},
};

/// The kind of access a stamp was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Mode {
    #[strum(to_string = "optimistic read")]
    OptimisticRead,
    #[strum(to_string = "read")]
    Read,
    #[strum(to_string = "write")]
    Write,
}

/// An opaque token returned by every acquisition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stamp {
    lock: u64,
    bits: u64,
    mode: Mode,
    ticket: u64,
}

impl Stamp {
    pub(crate) const fn new(lock: u64, state: u64, mode: Mode) -> Self {
        Self {
            lock,
            bits: state & STAMP_MASK,
            mode,
            ticket: NO_TICKET,
        }
    }

    pub(crate) const fn read(lock: u64, state: u64, ticket: u64) -> Self {
        Self {
            ticket,
            ..Self::new(lock, state, Mode::Read)
        }
    }

    pub(crate) const fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(crate) const fn lock_id(&self) -> u64 {
        self.lock
    }

    /// version (and writer bit) observed when the stamp was issued
    pub(crate) const fn bits(&self) -> u64 {
        self.bits
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_optimistic_read(&self) -> bool {
        self.mode == Mode::OptimisticRead
    }

    pub fn is_read_lock(&self) -> bool {
        self.mode == Mode::Read
    }

    pub fn is_write_lock(&self) -> bool {
        self.mode == Mode::Write
    }

    /// true for stamps that have to be given back through an unlock
    pub fn is_lock(&self) -> bool {
        self.mode != Mode::OptimisticRead
    }

    /// an optimistic stamp taken while a writer was in can never validate
    pub(crate) const fn saw_writer(&self) -> bool {
        self.bits & WRITER != 0
    }
}

impl fmt::Debug for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stamp")
            .field("lock", &self.lock)
            .field("version", &(self.bits >> VERSION_SHIFT))
            .field("mode", &self.mode)
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// every lock gets its own id, 0 is never handed out
static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_lock_id() -> u64 {
    // only uniqueness matters here, no data hangs off the id
    NEXT_LOCK_ID.fetch_add(1, Relaxed)
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::lock::state::VERSION_UNIT;

    #[test]
    fn test_mode_predicates_are_exclusive() {
        for mode in Mode::iter() {
            let stamp = Stamp::new(1, 0, mode);
            let hits = [
                stamp.is_optimistic_read(),
                stamp.is_read_lock(),
                stamp.is_write_lock(),
            ]
            .into_iter()
            .filter(|hit| *hit)
            .count();
            assert_eq!(hits, 1, "{mode}");
            assert_eq!(stamp.is_lock(), mode != Mode::OptimisticRead);
        }
    }

    #[test]
    fn test_stamp_drops_reader_and_queue_bits() {
        let stamp = Stamp::read(1, 3 * VERSION_UNIT + 42, 9);
        assert_eq!(stamp.bits(), 3 * VERSION_UNIT);
        assert!(!stamp.saw_writer());
        assert_eq!(
            format!("{stamp:?}"),
            "Stamp { lock: 1, version: 3, mode: Read, ticket: 9 }"
        );
        // same version, different hold => different stamp
        assert_ne!(stamp, Stamp::read(1, 3 * VERSION_UNIT, 10));
    }

    #[test]
    fn test_lock_ids_are_unique() {
        let a = next_lock_id();
        let b = next_lock_id();
        assert_ne!(a, b);
        assert_ne!(a, 0);
    }
}
