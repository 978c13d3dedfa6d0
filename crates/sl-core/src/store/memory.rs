//! In-memory store loaded from a JSON dataset.
//!
//! ```json
//! {
//!   "sightings": [{"identifier": "AB-12-CD", "captured_at": "...", "confidence": 0.93}],
//!   "samples":   [{"identifier": "AB-12-CD", "latitude": 38.7, "longitude": -9.1, "captured_at": "..."}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use sl_common::{Identifier, MovementSample, Sighting, TimeWindow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{SampleStore, StoreError};

/// On-disk dataset layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub sightings: Vec<Sighting>,
    pub samples: Vec<MovementSample>,
}

#[derive(Debug, Default)]
struct Inner {
    sightings: Vec<Sighting>,
    samples: HashMap<Identifier, Vec<MovementSample>>,
}

/// Thread-safe in-memory [`SampleStore`]. Identifiers are normalised on
/// insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut inner = Inner {
            sightings: dataset.sightings.into_iter().map(normalize_sighting).collect(),
            samples: HashMap::new(),
        };
        for sample in dataset.samples {
            let sample = normalize_sample(sample);
            inner
                .samples
                .entry(sample.identifier.clone())
                .or_default()
                .push(sample);
        }
        MemoryStore {
            inner: RwLock::new(inner),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let dataset: Dataset =
            serde_json::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(Self::from_dataset(dataset))
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn insert_sighting(&self, sighting: Sighting) -> Result<(), StoreError> {
        self.write()?.sightings.push(normalize_sighting(sighting));
        Ok(())
    }

    pub fn insert_sample(&self, sample: MovementSample) -> Result<(), StoreError> {
        let sample = normalize_sample(sample);
        self.write()?
            .samples
            .entry(sample.identifier.clone())
            .or_default()
            .push(sample);
        Ok(())
    }

    /// Every identifier with at least one sighting or sample, sorted.
    pub fn identifiers(&self) -> Result<Vec<Identifier>, StoreError> {
        let inner = self.read()?;
        let mut ids: Vec<Identifier> = inner
            .sightings
            .iter()
            .map(|s| s.identifier.clone())
            .chain(inner.samples.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// (sightings, samples).
    pub fn counts(&self) -> Result<(usize, usize), StoreError> {
        let inner = self.read()?;
        let samples = inner.samples.values().map(Vec::len).sum();
        Ok((inner.sightings.len(), samples))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

fn normalize_sighting(mut sighting: Sighting) -> Sighting {
    sighting.identifier = sighting.identifier.normalized();
    sighting
}

fn normalize_sample(mut sample: MovementSample) -> MovementSample {
    sample.identifier = sample.identifier.normalized();
    sample
}

impl SampleStore for MemoryStore {
    fn samples_for_identifier(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
    ) -> Result<Vec<MovementSample>, StoreError> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        let mut samples: Vec<MovementSample> = inner
            .samples
            .get(&identifier.normalized())
            .map(|all| {
                all.iter()
                    .filter(|s| window.contains(s.captured_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        samples.sort_by_key(|s| s.captured_at);
        Ok(samples)
    }

    fn sightings_in_range(&self, window: TimeWindow) -> Result<Vec<Sighting>, StoreError> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        let mut sightings: Vec<Sighting> = inner
            .sightings
            .iter()
            .filter(|s| window.contains(s.captured_at))
            .cloned()
            .collect();
        sightings.sort_by_key(|s| s.captured_at);
        Ok(sightings)
    }

    fn sighting_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Sighting>, StoreError> {
        let identifier = identifier.normalized();
        let inner = self.read()?;
        Ok(inner
            .sightings
            .iter()
            .filter(|s| s.identifier == identifier)
            .max_by_key(|s| s.captured_at)
            .cloned())
    }
}
