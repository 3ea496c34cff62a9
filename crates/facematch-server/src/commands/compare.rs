use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use facematch_config::ResolvedConfig;

use crate::cli::{CompareArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::{AppError, AppResult};
use crate::faces::{
    compare_face_images, ComparisonSettings, DlibBackend, FaceComparisonOutcome, FaceModelConfig,
};
use crate::output::render_compare;
use crate::settings;

type ConfigLoader = dyn Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync;
type CompareRunner = dyn Fn(&CompareRequest) -> AppResult<FaceComparisonOutcome> + Send + Sync;
type CompareRenderer = dyn Fn(&FaceComparisonOutcome, OutputMode) -> AppResult<()> + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct CompareRequest {
    pub dni: PathBuf,
    pub selfie: PathBuf,
    pub settings: ComparisonSettings,
    pub models: FaceModelConfig,
}

pub fn run_offline_comparison(request: &CompareRequest) -> AppResult<FaceComparisonOutcome> {
    let dni = read_image_file(&request.dni)?;
    let selfie = read_image_file(&request.selfie)?;
    let backend = DlibBackend::from_config(&request.models)?;
    compare_face_images(&backend, &dni, &selfie, &request.settings)
}

fn read_image_file(path: &Path) -> AppResult<Vec<u8>> {
    fs::read(path).map_err(|source| AppError::ImageRead {
        path: path.to_path_buf(),
        source,
    })
}

pub struct CompareHandler {
    args: CompareArgs,
    load_config: Box<ConfigLoader>,
    compare: Box<CompareRunner>,
    render: Box<CompareRenderer>,
}

impl CompareHandler {
    pub fn new(args: CompareArgs) -> Self {
        Self::with_dependencies(
            args,
            settings::load_config,
            run_offline_comparison,
            render_compare,
        )
    }

    pub fn with_dependencies(
        args: CompareArgs,
        load_config: impl Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync + 'static,
        compare: impl Fn(&CompareRequest) -> AppResult<FaceComparisonOutcome> + Send + Sync + 'static,
        render: impl Fn(&FaceComparisonOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            load_config: Box::new(load_config),
            compare: Box::new(compare),
            render: Box::new(render),
        }
    }

    fn build_request(&self, config: &ResolvedConfig) -> AppResult<CompareRequest> {
        Ok(CompareRequest {
            dni: self.args.dni.clone(),
            selfie: self.args.selfie.clone(),
            settings: settings::comparison_settings(
                self.args.tolerance,
                &self.args.models,
                config,
            )?,
            models: settings::model_config(&self.args.models, config),
        })
    }
}

impl CommandHandler for CompareHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let config = (self.load_config)(self.args.config.config.as_deref())?;
        let request = self.build_request(&config)?;
        let outcome = (self.compare)(&request)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
