use std::any::Any;
use std::path::Path;
use std::process::ExitCode;

use facematch_config::ResolvedConfig;

use crate::cli::{OutputMode, ServeArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::http;
use crate::settings::{self, ServerSettings};

type ConfigLoader = dyn Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync;
type ServerRunner = dyn Fn(ServerSettings) -> AppResult<()> + Send + Sync;

pub struct ServeHandler {
    args: ServeArgs,
    load_config: Box<ConfigLoader>,
    run_server: Box<ServerRunner>,
}

impl ServeHandler {
    pub fn new(args: ServeArgs) -> Self {
        Self::with_dependencies(args, settings::load_config, http::run_server)
    }

    pub fn with_dependencies(
        args: ServeArgs,
        load_config: impl Fn(Option<&Path>) -> AppResult<ResolvedConfig> + Send + Sync + 'static,
        run_server: impl Fn(ServerSettings) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            load_config: Box::new(load_config),
            run_server: Box::new(run_server),
        }
    }
}

impl CommandHandler for ServeHandler {
    fn execute(&self, _mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let config = (self.load_config)(self.args.config.config.as_deref())?;
        let settings = settings::build_server_settings(&self.args, &config)?;
        log_serve_defaults(&self.args, &config);
        (self.run_server)(settings)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn log_serve_defaults(args: &ServeArgs, config: &ResolvedConfig) {
    if args.reference_dir.is_none() && config.reference_dir.is_none() {
        tracing::info!(
            target: "serve.defaults",
            "No --reference-dir flag or config reference_dir found; using $FACEMATCH_REFERENCE_DIR or the built-in directory"
        );
    }
    if args.models.landmark_model.is_none() && config.landmark_model.is_none() {
        tracing::debug!(
            target: "serve.defaults",
            "Landmark model path will be read from $DLIB_LANDMARK_MODEL"
        );
    }
    if args.models.encoder_model.is_none() && config.encoder_model.is_none() {
        tracing::debug!(
            target: "serve.defaults",
            "Encoder model path will be read from $DLIB_ENCODER_MODEL"
        );
    }
}
