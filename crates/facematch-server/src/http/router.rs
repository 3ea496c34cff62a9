use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::{AppError, AppResult};
use crate::faces::ComparisonSettings;
use crate::http::handlers;
use crate::settings::ServerSettings;
use crate::worker::FaceWorker;

pub struct AppState {
    pub worker: FaceWorker,
    pub reference_dir: PathBuf,
    pub comparison: ComparisonSettings,
}

impl AppState {
    pub fn new(worker: FaceWorker, settings: &ServerSettings) -> Self {
        Self {
            worker,
            reference_dir: settings.reference_dir.clone(),
            comparison: settings.comparison,
        }
    }
}

pub fn build_router(state: AppState, settings: &ServerSettings) -> AppResult<Router> {
    let cors = cors_layer(settings.cors_allow_origins.as_deref())?;

    Ok(Router::new()
        .route("/compare", post(handlers::compare))
        .route("/reference-images", get(handlers::reference_images))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state)))
}

/// Credentials are always allowed, so methods and headers mirror the request instead of `*`.
pub fn cors_layer(origins: Option<&[String]>) -> AppResult<CorsLayer> {
    let Some(origins) = origins.filter(|list| !list.iter().any(|origin| origin == "*")) else {
        return Ok(CorsLayer::very_permissive());
    };

    let values = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|err| AppError::ConfigValue {
                key: "cors_allow_origins",
                message: format!("'{origin}' is not a valid origin: {err}"),
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
