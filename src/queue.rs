//! Sequential thumbnail generation queue.
//!
//! A single worker drains the queue, so at most one model is being rendered
//! at any time. A job only completes once any render it left running past
//! its timeout has finished. The id being worked on is observable for status
//! displays.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::catalog::{CatalogError, ModelRecord, ThumbnailState};
use crate::pipeline::ThumbnailOutcome;
use crate::service::ThumbnailService;

type Reply = oneshot::Sender<Result<ThumbnailOutcome, CatalogError>>;

struct Job {
    id: String,
    reply: Option<Reply>,
}

/// Handle to the generation worker.
pub struct GenerationQueue {
    sender: mpsc::UnboundedSender<Job>,
    current: Arc<Mutex<Option<String>>>,
    worker: JoinHandle<()>,
}

impl GenerationQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(service: Arc<ThumbnailService>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let current = Arc::new(Mutex::new(None));
        let worker_current = current.clone();

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                *worker_current.lock() = Some(job.id.clone());
                debug!("generating thumbnail for {}", job.id);
                let result = service.process(&job.id).await;
                service.pipeline().settle().await;
                *worker_current.lock() = None;
                if let Some(reply) = job.reply {
                    // The submitter may have stopped waiting
                    let _ = reply.send(result);
                }
            }
            info!("generation queue drained");
        });

        Self {
            sender,
            current,
            worker,
        }
    }

    /// Queues model `id` and returns a receiver for its outcome.
    ///
    /// If the worker is gone the receiver resolves to an error.
    pub fn submit(&self, id: &str) -> oneshot::Receiver<Result<ThumbnailOutcome, CatalogError>> {
        let (reply, receiver) = oneshot::channel();
        let _ = self.sender.send(Job {
            id: id.to_string(),
            reply: Some(reply),
        });
        receiver
    }

    /// Queues model `id` without waiting for the result.
    ///
    /// Returns `false` if the worker is gone.
    pub fn enqueue(&self, id: &str) -> bool {
        self.sender
            .send(Job {
                id: id.to_string(),
                reply: None,
            })
            .is_ok()
    }

    /// The model currently being generated.
    pub fn generating(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Thumbnail state of `record` as seen by this queue.
    pub fn state_of(&self, record: &ModelRecord) -> ThumbnailState {
        let generating = self.current.lock().as_deref() == Some(record.id.as_str());
        ThumbnailState::of(record, generating)
    }

    /// Stops accepting work and waits for queued jobs to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}
