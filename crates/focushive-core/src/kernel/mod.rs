//! Shared vocabulary used by every core: an opaque id, a fakeable clock, a
//! key-value store abstraction with CAS primitives, a repository-shaped
//! store boundary, and a scheduler. No component reaches for a global
//! singleton -- everything here is constructor-injected.

pub mod clock;
pub mod id;
pub mod kv;
pub mod scheduler;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::Identifier;
pub use kv::{InMemoryKvStore, InMemoryTxnalStore, KeyValueStore, KvError, TxnalStore, VersionedValue};
pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
