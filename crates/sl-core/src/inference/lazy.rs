//! Load-once backend wrapper.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{InferenceBackend, InferenceError};
use crate::logging::event_names;
use crate::risk::FeatureVector;

type Loader = Box<dyn Fn() -> Result<Arc<dyn InferenceBackend>, InferenceError> + Send + Sync>;

/// Defers model loading to the first scoring call.
///
/// The loader runs at most once even under concurrent first calls. A failed
/// load is remembered: every later call returns
/// [`InferenceError::Unavailable`] without retrying. Calls after a successful
/// load go straight to the loaded backend.
pub struct LazyBackend {
    name: String,
    loader: Loader,
    cell: OnceLock<Result<Arc<dyn InferenceBackend>, String>>,
}

impl LazyBackend {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn InferenceBackend>, InferenceError> + Send + Sync + 'static,
    {
        LazyBackend {
            name: name.into(),
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    fn backend(&self) -> Result<&Arc<dyn InferenceBackend>, InferenceError> {
        let loaded = self.cell.get_or_init(|| match (self.loader)() {
            Ok(backend) => {
                tracing::info!(
                    target: event_names::INFERENCE_MODEL_LOADED,
                    model = %self.name,
                    message = "inference model loaded",
                );
                Ok(backend)
            }
            Err(e) => {
                tracing::warn!(
                    target: event_names::INFERENCE_MODEL_UNAVAILABLE,
                    model = %self.name,
                    error = %e,
                    message = "inference model failed to load",
                );
                Err(e.to_string())
            }
        });
        loaded
            .as_ref()
            .map_err(|msg| InferenceError::Unavailable(msg.clone()))
    }
}

impl std::fmt::Debug for LazyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyBackend")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl InferenceBackend for LazyBackend {
    fn score(&self, features: &FeatureVector, timeout: Duration) -> Result<f64, InferenceError> {
        self.backend()?.score(features, timeout)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
