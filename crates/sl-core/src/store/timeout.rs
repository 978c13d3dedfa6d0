//! Bounded-latency store wrapper.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use sl_common::{Identifier, MovementSample, Sighting, TimeWindow};

use super::{SampleStore, StoreError};
use crate::inference::millis;

type Job = Box<dyn FnOnce(&dyn SampleStore) + Send>;

/// Runs queries on one dedicated thread and stops waiting after `timeout`.
///
/// Queries run one at a time in arrival order. A query that outlives its
/// timeout keeps the thread busy until it returns and its result is
/// dropped; queries queued behind it wait their own timeout. At most one
/// thread exists per store, and it exits once every handle is dropped and
/// the queue drains.
pub struct TimeoutStore {
    jobs: mpsc::Sender<Job>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn SampleStore>, timeout: Duration) -> Result<Self, StoreError> {
        let (jobs, queue) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("sl-store-query".to_string())
            .spawn(move || {
                for job in queue {
                    job(inner.as_ref());
                }
            })
            .map_err(|e| StoreError::Unavailable(format!("failed to spawn query thread: {}", e)))?;

        Ok(TimeoutStore { jobs, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SampleStore) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply, answer) = mpsc::channel();
        self.jobs
            .send(Box::new(move |store: &dyn SampleStore| {
                // Receiver gone means the caller timed out.
                let _ = reply.send(query(store));
            }))
            .map_err(|_| StoreError::Unavailable("query thread stopped".into()))?;

        match answer.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(StoreError::Timeout {
                millis: millis(self.timeout),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(StoreError::Query("query thread panicked".into()))
            }
        }
    }
}

impl std::fmt::Debug for TimeoutStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SampleStore for TimeoutStore {
    fn samples_for_identifier(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
    ) -> Result<Vec<MovementSample>, StoreError> {
        let identifier = identifier.clone();
        self.run(move |store| store.samples_for_identifier(&identifier, window))
    }

    fn sightings_in_range(&self, window: TimeWindow) -> Result<Vec<Sighting>, StoreError> {
        self.run(move |store| store.sightings_in_range(window))
    }

    fn sighting_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Sighting>, StoreError> {
        let identifier = identifier.clone();
        self.run(move |store| store.sighting_by_identifier(&identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::thread::ThreadId;

    struct Stalled;

    impl SampleStore for Stalled {
        fn samples_for_identifier(
            &self,
            _identifier: &Identifier,
            _window: TimeWindow,
        ) -> Result<Vec<MovementSample>, StoreError> {
            thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }

        fn sightings_in_range(&self, _window: TimeWindow) -> Result<Vec<Sighting>, StoreError> {
            Err(StoreError::Query("table missing".into()))
        }

        fn sighting_by_identifier(
            &self,
            _identifier: &Identifier,
        ) -> Result<Option<Sighting>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn slow_query_times_out() {
        let store = TimeoutStore::new(Arc::new(Stalled), Duration::from_millis(20)).unwrap();
        let err = store
            .samples_for_identifier(&Identifier::new("AB-12-CD"), TimeWindow::all())
            .unwrap_err();
        assert_eq!(err, StoreError::Timeout { millis: 20 });
    }

    #[test]
    fn inner_errors_pass_through() {
        let store = TimeoutStore::new(Arc::new(Stalled), Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.sightings_in_range(TimeWindow::all()),
            Err(StoreError::Query("table missing".into()))
        );
    }

    #[test]
    fn fast_queries_return_results() {
        let memory = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        memory
            .insert_sighting(Sighting::new("AB-12-CD", at, 0.9))
            .unwrap();
        let store = TimeoutStore::new(Arc::new(memory), Duration::from_secs(5)).unwrap();
        let found = store
            .sighting_by_identifier(&Identifier::new("ab-12-cd"))
            .unwrap();
        assert_eq!(found.map(|s| s.captured_at), Some(at));
    }

    /// Records the thread each query runs on.
    #[derive(Default)]
    struct ThreadRecorder(Mutex<Vec<ThreadId>>);

    impl SampleStore for ThreadRecorder {
        fn samples_for_identifier(
            &self,
            _identifier: &Identifier,
            _window: TimeWindow,
        ) -> Result<Vec<MovementSample>, StoreError> {
            self.0.lock().unwrap().push(thread::current().id());
            thread::sleep(Duration::from_millis(100));
            Ok(Vec::new())
        }

        fn sightings_in_range(&self, _window: TimeWindow) -> Result<Vec<Sighting>, StoreError> {
            self.0.lock().unwrap().push(thread::current().id());
            Ok(Vec::new())
        }

        fn sighting_by_identifier(
            &self,
            _identifier: &Identifier,
        ) -> Result<Option<Sighting>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn timed_out_queries_share_one_thread() {
        let recorder = Arc::new(ThreadRecorder::default());
        let store = TimeoutStore::new(recorder.clone(), Duration::from_millis(10)).unwrap();
        let id = Identifier::new("AB-12-CD");

        for _ in 0..3 {
            assert!(matches!(
                store.samples_for_identifier(&id, TimeWindow::all()),
                Err(StoreError::Timeout { .. })
            ));
        }

        // Queued behind the stalled queries, answered once they drain
        let patient = TimeoutStore {
            jobs: store.jobs.clone(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(patient.sightings_in_range(TimeWindow::all()), Ok(Vec::new()));

        let threads = recorder.0.lock().unwrap();
        assert_eq!(threads.len(), 4);
        assert!(threads.iter().all(|t| *t == threads[0]));
        assert_ne!(threads[0], thread::current().id());
    }
}
