//! Dedicated scoring thread for models that are not thread-safe.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{millis, InferenceBackend, InferenceError, Model};
use crate::logging::event_names;
use crate::risk::FeatureVector;

struct Request {
    features: FeatureVector,
    reply: mpsc::Sender<Result<f64, InferenceError>>,
}

/// Owns a [`Model`] on its own thread.
///
/// The model is built by the loader on the worker thread when the first
/// request arrives; a load failure is kept and returned to every request.
/// Requests are answered one at a time in arrival order. A caller stops
/// waiting after its timeout; the request still runs but its answer is
/// discarded.
///
/// Dropping the handle closes the queue. The thread finishes queued
/// requests and exits without being joined; use [`InferenceWorker::shutdown`]
/// to wait for it.
pub struct InferenceWorker {
    name: String,
    sender: Option<mpsc::Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    pub fn spawn<F, M>(name: impl Into<String>, loader: F) -> Result<Self, InferenceError>
    where
        F: FnOnce() -> Result<M, InferenceError> + Send + 'static,
        M: Model + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Request>();
        let thread_name = format!("sl-infer-{}", name);
        let log_name = name.clone();

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || serve(&log_name, loader, receiver))
            .map_err(|e| InferenceError::Unavailable(format!("failed to spawn worker: {}", e)))?;

        Ok(InferenceWorker {
            name,
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Close the queue and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve<F, M>(name: &str, loader: F, receiver: mpsc::Receiver<Request>)
where
    F: FnOnce() -> Result<M, InferenceError>,
    M: Model,
{
    let mut loader = Some(loader);
    let mut model: Option<Result<M, String>> = None;

    for request in receiver {
        if model.is_none() {
            let loaded = match loader.take() {
                Some(load) => load(),
                None => Err(InferenceError::Unavailable("loader already consumed".into())),
            };
            match &loaded {
                Ok(_) => tracing::info!(
                    target: event_names::INFERENCE_MODEL_LOADED,
                    model = %name,
                    message = "inference model loaded on worker",
                ),
                Err(e) => tracing::warn!(
                    target: event_names::INFERENCE_MODEL_UNAVAILABLE,
                    model = %name,
                    error = %e,
                    message = "inference model failed to load on worker",
                ),
            }
            model = Some(loaded.map_err(|e| e.to_string()));
        }

        let result = match model.as_mut() {
            Some(Ok(m)) => m.predict(&request.features),
            Some(Err(msg)) => Err(InferenceError::Unavailable(msg.clone())),
            None => Err(InferenceError::Unavailable("model not loaded".into())),
        };
        // Receiver gone means the caller timed out.
        let _ = request.reply.send(result);
    }

    tracing::debug!(
        target: event_names::INFERENCE_WORKER_STOPPED,
        model = %name,
        message = "inference worker stopped",
    );
}

impl InferenceBackend for InferenceWorker {
    fn score(&self, features: &FeatureVector, timeout: Duration) -> Result<f64, InferenceError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| InferenceError::Unavailable("worker stopped".into()))?;
        let (reply, answer) = mpsc::channel();
        sender
            .send(Request {
                features: *features,
                reply,
            })
            .map_err(|_| InferenceError::Unavailable("worker stopped".into()))?;

        match answer.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(InferenceError::Timeout {
                millis: millis(timeout),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(InferenceError::Failed("worker dropped the request".into()))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for InferenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceWorker")
            .field("name", &self.name)
            .field("running", &self.sender.is_some())
            .finish()
    }
}
