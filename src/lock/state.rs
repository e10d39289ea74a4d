//! # State word
//!
//! Everything the lock knows lives in one `u64`, so a single load answers "is anyone writing
//! and has anyone written since?" for the optimistic path:
//!
//! ```text
//!  63                          26   25      24      23                0
//! ┌─────────────────────────────┬────────┬────────┬──────────────────┐
//! │ version (38 bits)           │ WRITER │ QUEUED │ reader count     │
//! └─────────────────────────────┴────────┴────────┴──────────────────┘
//! ```
//!
//! - reader count - number of held pessimistic read locks
//! - QUEUED - the fairness queue isn't empty => fast paths must not grant anything
//! - WRITER - the write lock is held
//! - version - bumped once per write release, wraps after 2^38 writes
//!
//! QUEUED is only flipped while the queue's mutex is held, the rest is CAS-ed by anyone.

pub(crate) const READER_MASK: u64 = (1 << 24) - 1;
/// readers past this wait in the queue until the lock drains
pub(crate) const MAX_READERS: u64 = READER_MASK;
pub(crate) const QUEUED: u64 = 1 << 24;
pub(crate) const WRITER: u64 = 1 << 25;
pub(crate) const VERSION_SHIFT: u32 = 26;
pub(crate) const VERSION_UNIT: u64 = 1 << VERSION_SHIFT;
pub(crate) const VERSION_MASK: u64 = !(VERSION_UNIT - 1);

/// the part of the state a stamp gets compared against
pub(crate) const STAMP_MASK: u64 = VERSION_MASK | WRITER;

#[inline]
pub(crate) const fn readers(s: u64) -> u64 {
    s & READER_MASK
}

#[inline]
pub(crate) const fn is_write_locked(s: u64) -> bool {
    s & WRITER != 0
}

#[inline]
pub(crate) const fn is_queued(s: u64) -> bool {
    s & QUEUED != 0
}

#[inline]
pub(crate) const fn version(s: u64) -> u64 {
    s >> VERSION_SHIFT
}

/// a reader may barge in only when nobody writes and nobody waits
#[inline]
pub(crate) const fn can_read_fast(s: u64) -> bool {
    s & (WRITER | QUEUED) == 0 && readers(s) < MAX_READERS
}

/// a writer may barge in only when the lock is completely free
#[inline]
pub(crate) const fn can_write_fast(s: u64) -> bool {
    s & (READER_MASK | WRITER | QUEUED) == 0
}

/// clears the WRITER bit and bumps the version, the carry out of the top bit is dropped
#[inline]
pub(crate) const fn released_write(s: u64) -> u64 {
    (s & !WRITER).wrapping_add(VERSION_UNIT)
}
