use std::any::Any;
use std::path::Path;
use std::process::ExitCode;

use facematch_config::ResolvedConfig;

use crate::cli::{OutputMode, ReferencesArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::faces::{
    list_reference_images, load_reference_encodings, ComparisonSettings, DlibBackend,
    FaceModelConfig, ReferenceEncodingReport, ReferenceImage,
};
use crate::output::{render_reference_encodings, render_references};
use crate::settings;

pub struct ReferencesHandler {
    args: ReferencesArgs,
    deps: ReferencesHandlerDeps,
}

pub struct ReferencesHandlerDeps {
    pub load_config: Box<dyn Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync>,
    pub list: Box<dyn Fn(&Path) -> AppResult<Vec<ReferenceImage>> + Send + Sync>,
    pub encode: Box<
        dyn Fn(&Path, &FaceModelConfig, &ComparisonSettings) -> AppResult<ReferenceEncodingReport>
            + Send
            + Sync,
    >,
    pub render_list: Box<dyn Fn(&[ReferenceImage], OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_encodings:
        Box<dyn Fn(&ReferenceEncodingReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl ReferencesHandlerDeps {
    pub fn new(
        load_config: impl Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync + 'static,
        list: impl Fn(&Path) -> AppResult<Vec<ReferenceImage>> + Send + Sync + 'static,
        encode: impl Fn(
                &Path,
                &FaceModelConfig,
                &ComparisonSettings,
            ) -> AppResult<ReferenceEncodingReport>
            + Send
            + Sync
            + 'static,
        render_list: impl Fn(&[ReferenceImage], OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_encodings: impl Fn(&ReferenceEncodingReport, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            load_config: Box::new(load_config),
            list: Box::new(list),
            encode: Box::new(encode),
            render_list: Box::new(render_list),
            render_encodings: Box::new(render_encodings),
        }
    }
}

impl Default for ReferencesHandlerDeps {
    fn default() -> Self {
        Self::new(
            settings::load_config,
            list_reference_images,
            encode_references,
            render_references,
            render_reference_encodings,
        )
    }
}

pub fn encode_references(
    dir: &Path,
    models: &FaceModelConfig,
    settings: &ComparisonSettings,
) -> AppResult<ReferenceEncodingReport> {
    let backend = DlibBackend::from_config(models)?;
    load_reference_encodings(&backend, dir, settings)
}

impl ReferencesHandler {
    pub fn new(args: ReferencesArgs) -> Self {
        Self {
            args,
            deps: ReferencesHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(args: ReferencesArgs, deps: ReferencesHandlerDeps) -> Self {
        Self { args, deps }
    }
}

impl CommandHandler for ReferencesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let config = (self.deps.load_config)(self.args.config.config.as_deref())?;
        let dir = settings::resolve_reference_dir(self.args.reference_dir.as_deref(), &config);

        if self.args.encode {
            let models = settings::model_config(&self.args.models, &config);
            let detection = settings::comparison_settings(None, &self.args.models, &config)?;
            let report = (self.deps.encode)(&dir, &models, &detection)?;
            (self.deps.render_encodings)(&report, mode)?;
        } else {
            let images = (self.deps.list)(&dir)?;
            (self.deps.render_list)(&images, mode)?;
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
