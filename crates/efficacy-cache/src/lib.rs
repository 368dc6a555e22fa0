//! efficacy-cache: Shared key/value store with TTL, short-lived locks, and a
//! single-flight compute wrapper.
//!
//! The [`CacheService`] is constructed once per process and handed to every
//! component that needs it; there is no global cache state.

pub mod store;
pub mod envelope;
pub mod single_flight;

pub use envelope::{CacheEnvelope, Cacheable};
pub use single_flight::{CacheService, SingleFlightConfig, SingleFlightStats};
pub use store::{CacheStore, MemoryStore};
