use std::path::{Path, PathBuf};

use facematch_config::{
    load_resolved_config, validate_tolerance, validate_upsample, ResolvedConfig,
};
use tracing::info;

use crate::cli::{ModelArgs, ServeArgs};
use crate::errors::AppResult;
use crate::faces::{reference_dir, ComparisonSettings, FaceModelConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub reference_dir: PathBuf,
    pub comparison: ComparisonSettings,
    pub models: FaceModelConfig,
    pub max_upload_bytes: usize,
    pub cors_allow_origins: Option<Vec<String>>,
}

pub fn load_config(explicit: Option<&Path>) -> AppResult<ResolvedConfig> {
    let loaded = load_resolved_config(explicit)?;
    match &loaded.source {
        Some(path) => info!(
            target: "config",
            "Loaded configuration from {}",
            path.display()
        ),
        None => info!(
            target: "config",
            "No configuration file found; using built-in defaults"
        ),
    }
    Ok(loaded.resolved)
}

/// CLI flag first, then config file. Flag values are validated here.
pub fn comparison_settings(
    tolerance: Option<f64>,
    models: &ModelArgs,
    config: &ResolvedConfig,
) -> AppResult<ComparisonSettings> {
    let tolerance = tolerance.unwrap_or(config.tolerance);
    validate_tolerance(tolerance)?;
    let upsample = models.upsample.unwrap_or(config.upsample);
    validate_upsample(upsample)?;
    Ok(ComparisonSettings {
        tolerance,
        jitters: models.jitters.unwrap_or(config.jitters).max(1),
        upsample,
    })
}

pub fn model_config(args: &ModelArgs, config: &ResolvedConfig) -> FaceModelConfig {
    FaceModelConfig {
        landmark_model: args
            .landmark_model
            .clone()
            .or_else(|| config.landmark_model.clone()),
        encoder_model: args
            .encoder_model
            .clone()
            .or_else(|| config.encoder_model.clone()),
    }
}

pub fn resolve_reference_dir(cli_value: Option<&Path>, config: &ResolvedConfig) -> PathBuf {
    reference_dir(cli_value.or(config.reference_dir.as_deref()))
}

pub fn build_server_settings(
    args: &ServeArgs,
    config: &ResolvedConfig,
) -> AppResult<ServerSettings> {
    Ok(ServerSettings {
        host: args.host.clone().unwrap_or_else(|| config.host.clone()),
        port: args.port.unwrap_or(config.port),
        reference_dir: resolve_reference_dir(args.reference_dir.as_deref(), config),
        comparison: comparison_settings(args.tolerance, &args.models, config)?,
        models: model_config(&args.models, config),
        max_upload_bytes: config.max_upload_bytes,
        cors_allow_origins: config.cors_allow_origins.clone(),
    })
}
