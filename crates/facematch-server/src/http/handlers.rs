use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::faces::{list_reference_images, FaceComparison, ImageRole};
use crate::http::router::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceImagesBody {
    pub images: Vec<String>,
}

/// Error reply: `{"error": ...}` with 200 for processing failures.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_multipart(err: MultipartError) -> Self {
        let status = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        Self {
            status,
            message: AppError::InvalidUpload(err.body_text()).to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::OK
        };
        Self {
            status,
            message: err.human_message(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::InvalidUpload(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

struct Uploads {
    dni: Vec<u8>,
    selfie: Vec<u8>,
}

async fn read_uploads(mut multipart: Multipart) -> Result<Uploads, ApiError> {
    let mut dni = None;
    let mut selfie = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        let slot = match field.name() {
            Some(name) if name == ImageRole::Dni.field_name() => &mut dni,
            Some(name) if name == ImageRole::Selfie.field_name() => &mut selfie,
            _ => continue,
        };
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
        *slot = Some(bytes.to_vec());
    }

    Ok(Uploads {
        dni: dni.ok_or(AppError::MissingUpload { field: "dni" })?,
        selfie: selfie.ok_or(AppError::MissingUpload { field: "selfie" })?,
    })
}

pub async fn compare(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FaceComparison>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("compare", %request_id);

    async move {
        let uploads = read_uploads(multipart?).await?;
        info!(
            dni_bytes = uploads.dni.len(),
            selfie_bytes = uploads.selfie.len(),
            "comparison requested"
        );

        match state
            .worker
            .compare(uploads.dni, uploads.selfie, state.comparison)
            .await
        {
            Ok(outcome) => {
                info!(
                    matched = outcome.comparison.matched,
                    distance = outcome.comparison.distance,
                    "comparison finished"
                );
                Ok(Json(outcome.comparison))
            }
            Err(err) => {
                warn!(error = %err, "comparison failed");
                Err(ApiError::from(err))
            }
        }
    }
    .instrument(span)
    .await
}

pub async fn reference_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReferenceImagesBody>, ApiError> {
    let dir = state.reference_dir.clone();
    let listing = tokio::task::spawn_blocking(move || list_reference_images(&dir))
        .await
        .map_err(|err| AppError::Server(format!("reference listing task failed: {err}")))?;

    match listing {
        Ok(images) => Ok(Json(ReferenceImagesBody {
            images: images.into_iter().map(|image| image.file_name).collect(),
        })),
        Err(err) => {
            warn!(error = %err, "reference listing failed");
            Err(ApiError::from(err))
        }
    }
}
