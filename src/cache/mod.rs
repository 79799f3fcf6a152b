// Cache module for contribution histories.
// Persists per-user history in a key-value store and decides when to refetch it.

pub mod history;
#[cfg(test)]
pub mod memory;
pub mod paths;
pub mod store;

pub use history::{ContributionCache, DEFAULT_FRESHNESS_WINDOW};
pub use store::FileStore;
