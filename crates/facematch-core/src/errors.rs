use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use facematch_config::ConfigError;
use image::ImageError;
use thiserror::Error;

use crate::faces::ImageRole;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not decode the {role} image: {source}")]
    ImageDecode {
        role: ImageRole,
        #[source]
        source: ImageError,
    },

    #[error("no face detected in the {role} image")]
    NoFaceDetected { role: ImageRole },

    #[error("embedding length mismatch: {dni} values for the DNI face, {selfie} for the selfie")]
    EmbeddingMismatch { dni: usize, selfie: usize },

    #[error("missing {kind} model; provide {flag} or set ${env}")]
    MissingModel {
        kind: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("failed to read reference image directory {path}: {source}")]
    ReferenceDirRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read image file {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing multipart field '{field}'")]
    MissingUpload { field: &'static str },

    #[error("invalid multipart upload: {0}")]
    InvalidUpload(String),

    #[error("face comparison worker is not running")]
    WorkerUnavailable,

    #[error("face comparison queue is full ({capacity} pending); retry later")]
    WorkerBusy { capacity: usize },

    #[error("face recognition backend panicked: {0}")]
    BackendPanic(String),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid configuration value for {key}: {message}")]
    ConfigValue { key: &'static str, message: String },

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::ImageDecode { .. } => ExitCode::from(2),
            AppError::ImageRead { .. } => ExitCode::from(2),
            AppError::NoFaceDetected { .. } => ExitCode::from(3),
            AppError::EmbeddingMismatch { .. } => ExitCode::from(3),
            AppError::MissingModel { .. } => ExitCode::from(2),
            AppError::ModelLoad { .. } => ExitCode::from(2),
            AppError::ReferenceDirRead { .. } => ExitCode::from(2),
            AppError::MissingUpload { .. } => ExitCode::from(2),
            AppError::InvalidUpload(_) => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::ConfigValue { .. } => ExitCode::from(2),
            _ => ExitCode::from(1),
        }
    }

    /// Request-shape problems the client has to fix before the models ever run.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingUpload { .. } | AppError::InvalidUpload(_)
        )
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
            ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
            ConfigError::Value { key, message } => AppError::ConfigValue { key, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_face_message_names_the_image() {
        let err = AppError::NoFaceDetected {
            role: ImageRole::Selfie,
        };
        assert_eq!(err.to_string(), "no face detected in the selfie image");
        assert_eq!(err.exit_code(), ExitCode::from(3));
    }

    #[test]
    fn upload_errors_are_client_errors() {
        assert!(AppError::MissingUpload { field: "dni" }.is_client_error());
        assert!(AppError::InvalidUpload("bad boundary".into()).is_client_error());
        assert!(!AppError::WorkerUnavailable.is_client_error());
        assert!(!AppError::WorkerBusy { capacity: 4 }.is_client_error());
    }
}
