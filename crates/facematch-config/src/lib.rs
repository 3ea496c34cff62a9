use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facematch/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facematch/config.toml";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TOLERANCE: f64 = 0.6;
pub const DEFAULT_JITTERS: u32 = 1;
pub const DEFAULT_UPSAMPLE: u32 = 1;
pub const MAX_UPSAMPLE: u32 = 3;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reference_dir: Option<PathBuf>,
    pub tolerance: Option<f64>,
    pub jitters: Option<u32>,
    pub upsample: Option<u32>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub cors_allow_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub host: String,
    pub port: u16,
    /// `None` defers to `$FACEMATCH_REFERENCE_DIR` and then the built-in directory.
    pub reference_dir: Option<PathBuf>,
    pub tolerance: f64,
    pub jitters: u32,
    /// Times the image is doubled in size before face detection.
    pub upsample: u32,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// `None` allows every origin.
    pub cors_allow_origins: Option<Vec<String>>,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Result<Self, ConfigError> {
        let tolerance = raw.tolerance.unwrap_or(DEFAULT_TOLERANCE);
        validate_tolerance(tolerance)?;
        let upsample = raw.upsample.unwrap_or(DEFAULT_UPSAMPLE);
        validate_upsample(upsample)?;

        let max_upload_bytes = raw.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(ConfigError::Value {
                key: "max_upload_bytes",
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            reference_dir: raw.reference_dir,
            tolerance,
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS).max(1),
            upsample,
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            max_upload_bytes,
            cors_allow_origins: raw.cors_allow_origins,
        })
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reference_dir: None,
            tolerance: DEFAULT_TOLERANCE,
            jitters: DEFAULT_JITTERS,
            upsample: DEFAULT_UPSAMPLE,
            landmark_model: None,
            encoder_model: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_allow_origins: None,
        }
    }
}

/// Tolerance is a Euclidean distance bound, so it has to be a positive finite number.
pub fn validate_tolerance(tolerance: f64) -> Result<(), ConfigError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Value {
            key: "tolerance",
            message: format!("expected a positive number, found {tolerance}"),
        })
    }
}

pub fn validate_upsample(upsample: u32) -> Result<(), ConfigError> {
    if upsample <= MAX_UPSAMPLE {
        Ok(())
    } else {
        Err(ConfigError::Value {
            key: "upsample",
            message: format!("expected at most {MAX_UPSAMPLE}, found {upsample}"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {key}: {message}")]
    Value { key: &'static str, message: String },
}

pub fn default_config_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

/// Loads the explicit file when one is given, otherwise the first system file found.
pub fn load_resolved_config(
    explicit: Option<&Path>,
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match explicit {
        Some(path) => {
            let loaded = load_file(path)?;
            Ok(ResolvedConfigWithSource {
                resolved: ResolvedConfig::from_raw(loaded.contents)?,
                source: Some(loaded.source),
            })
        }
        None => load_resolved_from_paths(&default_config_paths()),
    }
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match load_file(path) {
            Ok(loaded) => return Ok(Some(loaded)),
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                continue
            }
            Err(err) => return Err(err),
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(entry.contents)?,
            source: Some(entry.source),
        }),
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}

fn load_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(LoadedConfig::new(parsed, path.to_path_buf()))
}
