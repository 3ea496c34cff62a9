use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod compare;
mod references;
mod serve;

pub use compare::{run_offline_comparison, CompareHandler, CompareRequest};
pub use references::{encode_references, ReferencesHandler, ReferencesHandlerDeps};
pub use serve::ServeHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Serve(args) => Box::new(ServeHandler::new(args)),
            Commands::Compare(args) => Box::new(CompareHandler::new(args)),
            Commands::References(args) => Box::new(ReferencesHandler::new(args)),
        }
    }
}
