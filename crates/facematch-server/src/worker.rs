use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::thread;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::{
    compare_face_images, ComparisonSettings, FaceComparisonOutcome, FaceEmbeddingBackend,
};

/// Comparisons that may wait behind the running one before new requests are turned away.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

struct ComparisonJob {
    dni: Vec<u8>,
    selfie: Vec<u8>,
    settings: ComparisonSettings,
    reply: oneshot::Sender<AppResult<FaceComparisonOutcome>>,
}

/// Handle to the thread that owns the face backend.
///
/// The backend never leaves its thread, so it does not have to be `Send`.
/// Jobs run one at a time in arrival order. The queue is bounded so pending
/// uploads cannot pile up in memory.
#[derive(Clone)]
pub struct FaceWorker {
    jobs: mpsc::Sender<ComparisonJob>,
    capacity: usize,
}

impl FaceWorker {
    /// Starts the worker with [`DEFAULT_QUEUE_CAPACITY`].
    pub fn spawn<B, F>(factory: F) -> AppResult<Self>
    where
        B: FaceEmbeddingBackend,
        F: FnOnce() -> AppResult<B> + Send + 'static,
    {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, factory)
    }

    /// Starts the worker and waits until `factory` has built the backend.
    pub fn with_capacity<B, F>(capacity: usize, factory: F) -> AppResult<Self>
    where
        B: FaceEmbeddingBackend,
        F: FnOnce() -> AppResult<B> + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (jobs_tx, mut jobs_rx) = mpsc::channel::<ComparisonJob>(capacity);
        let (ready_tx, ready_rx) = std_mpsc::channel::<AppResult<()>>();

        thread::Builder::new()
            .name("face-worker".into())
            .spawn(move || {
                let backend = match factory() {
                    Ok(backend) => {
                        let _ = ready_tx.send(Ok(()));
                        backend
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                info!("face worker ready");

                while let Some(job) = jobs_rx.blocking_recv() {
                    let ComparisonJob {
                        dni,
                        selfie,
                        settings,
                        reply,
                    } = job;
                    let result = run_guarded(|| {
                        compare_face_images(&backend, &dni, &selfie, &settings)
                    });
                    if reply.send(result).is_err() {
                        debug!("client went away before the comparison finished");
                    }
                }
                info!("face worker stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                jobs: jobs_tx,
                capacity,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AppError::WorkerUnavailable),
        }
    }

    pub async fn compare(
        &self,
        dni: Vec<u8>,
        selfie: Vec<u8>,
        settings: ComparisonSettings,
    ) -> AppResult<FaceComparisonOutcome> {
        let response = self.submit(dni, selfie, settings)?;
        response.await.map_err(|_| AppError::WorkerUnavailable)?
    }

    fn submit(
        &self,
        dni: Vec<u8>,
        selfie: Vec<u8>,
        settings: ComparisonSettings,
    ) -> AppResult<oneshot::Receiver<AppResult<FaceComparisonOutcome>>> {
        let (reply, response) = oneshot::channel();
        let job = ComparisonJob {
            dni,
            selfie,
            settings,
            reply,
        };
        match self.jobs.try_send(job) {
            Ok(()) => Ok(response),
            Err(TrySendError::Full(_)) => {
                warn!(capacity = self.capacity, "face comparison queue is full");
                Err(AppError::WorkerBusy {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(AppError::WorkerUnavailable),
        }
    }
}

fn run_guarded<T>(job: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "face backend panicked");
            Err(AppError::BackendPanic(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
