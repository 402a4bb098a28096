//! In-memory caches for expensive startup resources.
//!
//! - [`LazyResourceCache`]: per-key single-flight memoization of an async factory.
//!   Concurrent callers for a key share one in-flight computation; failures are
//!   handed to the waiters of that computation and never stored.
//! - [`TtlCache`]: the same single-flight mechanism for read-mostly reference
//!   collections, with entries that expire after a caller-supplied TTL measured
//!   on an injectable [`Clock`].
//!
//! Both caches are cheap `Clone` handles over shared state and must be used
//! from within a tokio runtime: each computation is driven by its own task so
//! it completes and publishes even if every waiter gives up.

mod clock;
mod error;
mod lazy;
mod stats;
mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, ComputationError};
pub use lazy::LazyResourceCache;
pub use stats::CacheStats;
pub use ttl::TtlCache;
