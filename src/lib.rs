pub mod demo;
pub mod error;
pub mod lock;

pub use error::{DemoError, LockError};
pub use lock::{Interrupt, Mode, ReadGuard, Stamp, StampedLock, WriteGuard};
