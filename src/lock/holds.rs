//! # Read holds
//!
//! The reader count alone can't tell readers apart, so every read hold also gets a ticket:
//! a per-lock number that is never handed out twice. The ticket rides in the stamp and
//! stays in this set while the hold lives. Unlocking removes it first - a stamp whose ticket
//! is already gone is a double unlock (or a stale copy) and gets rejected before the count moves.
//!
//! The set is sharded by ticket so concurrent readers mostly hit different mutexes.
//!
//! Invariant: the reader count in the state is >= the number of tickets here
//! (the count goes up before the ticket is added, the ticket goes away before the count goes down).

use std::{
    array,
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};

use parking_lot::Mutex;

const SHARDS: usize = 16;

/// ticket 0 marks stamps that aren't read holds
pub(crate) const NO_TICKET: u64 = 0;

pub(crate) struct ReadHolds {
    next: AtomicU64,
    shards: [Mutex<HashSet<u64>>; SHARDS],
}

impl ReadHolds {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(NO_TICKET + 1),
            shards: array::from_fn(|_| Mutex::new(HashSet::new())),
        }
    }

    fn shard(&self, ticket: u64) -> &Mutex<HashSet<u64>> {
        &self.shards[(ticket % SHARDS as u64) as usize]
    }

    /// Records a new hold. Call only after the reader count already includes it.
    pub(crate) fn register(&self) -> u64 {
        // uniqueness is all we need, 2^64 tickets don't run out
        let ticket = self.next.fetch_add(1, Relaxed);
        self.shard(ticket).lock().insert(ticket);
        ticket
    }

    /// `true` if the hold was live, it's gone afterwards either way.
    pub(crate) fn release(&self, ticket: u64) -> bool {
        ticket != NO_TICKET && self.shard(ticket).lock().remove(&ticket)
    }

    /// Drops some live hold, for unlocks that come without a stamp.
    pub(crate) fn release_any(&self) -> Option<u64> {
        self.shards.iter().find_map(|shard| {
            let mut shard = shard.lock();
            let ticket = shard.iter().next().copied()?;
            shard.remove(&ticket);
            Some(ticket)
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tickets_release_once() {
        let holds = ReadHolds::new();
        let a = holds.register();
        let b = holds.register();
        assert_ne!(a, b);
        assert_eq!(holds.len(), 2);
        assert!(holds.release(a));
        assert!(!holds.release(a));
        assert!(!holds.release(NO_TICKET));
        assert_eq!(holds.len(), 1);
        assert_eq!(holds.release_any(), Some(b));
        assert_eq!(holds.release_any(), None);
    }
}
