//! Persistent store access.
//!
//! The engine reads sightings and movement samples through [`SampleStore`].
//! [`MemoryStore`] backs the CLI and tests; [`TimeoutStore`] bounds every
//! query so a slow store degrades to an error instead of a hang.

pub mod memory;
pub mod timeout;

pub use memory::{Dataset, MemoryStore};
pub use timeout::TimeoutStore;

use sl_common::{Identifier, MovementSample, Sighting, TimeWindow};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("store query failed: {0}")]
    Query(String),

    #[error("failed to read dataset: {0}")]
    Io(String),

    #[error("failed to parse dataset: {0}")]
    Parse(String),
}

impl From<StoreError> for sl_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { millis } => sl_common::Error::StoreTimeout { millis },
            StoreError::Io(msg) => sl_common::Error::Io(std::io::Error::other(msg)),
            other => sl_common::Error::Store(other.to_string()),
        }
    }
}

/// Read access to sightings and movement history.
///
/// Implementations must be safe for concurrent reads. Samples returned for
/// an identifier belong to that identifier only; callers still sort them.
pub trait SampleStore: Send + Sync {
    fn samples_for_identifier(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
    ) -> Result<Vec<MovementSample>, StoreError>;

    fn sightings_in_range(&self, window: TimeWindow) -> Result<Vec<Sighting>, StoreError>;

    /// Most recent sighting of the identifier, if any.
    fn sighting_by_identifier(&self, identifier: &Identifier)
        -> Result<Option<Sighting>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_common_categories() {
        let e: sl_common::Error = StoreError::Timeout { millis: 5 }.into();
        assert_eq!(e.code(), 21);
        let e: sl_common::Error = StoreError::Io("gone".into()).into();
        assert_eq!(e.category(), sl_common::ErrorCategory::Io);
        let e: sl_common::Error = StoreError::Query("bad".into()).into();
        assert_eq!(e.code(), 20);
    }
}
