pub mod handlers;
pub mod router;

pub use handlers::{ApiError, ErrorBody, ReferenceImagesBody};
pub use router::{build_router, cors_layer, AppState};

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::faces::DlibBackend;
use crate::settings::ServerSettings;
use crate::worker::FaceWorker;

/// Loads the dlib models on the worker thread, then serves until Ctrl-C.
pub fn run_server(settings: ServerSettings) -> AppResult<()> {
    let models = settings.models.clone();
    let worker = FaceWorker::spawn(move || DlibBackend::from_config(&models))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_with_worker(settings, worker))
}

pub async fn serve_with_worker(settings: ServerSettings, worker: FaceWorker) -> AppResult<()> {
    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!(
        address = %listener.local_addr()?,
        reference_dir = %settings.reference_dir.display(),
        tolerance = settings.comparison.tolerance,
        "facematch listening"
    );

    let state = AppState::new(worker, &settings);
    let router = build_router(state, &settings)?;
    serve(listener, router).await
}

pub async fn serve(listener: TcpListener, router: Router) -> AppResult<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Server(err.to_string()))?;
    info!("facematch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; serve until the process is killed.
        std::future::pending::<()>().await;
    }
}
