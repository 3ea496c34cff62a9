use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facematch",
    about = "Compare identity-document photos against selfies",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP service (POST /compare, GET /reference-images)
    Serve(ServeArgs),
    /// Compare a DNI photo against a selfie without starting the service
    Compare(CompareArgs),
    /// List the reference image directory
    References(ReferencesArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file to use instead of /etc/facematch/config.toml
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ModelArgs {
    /// Path to a dlib shape predictor: the 5-point model (shape_predictor_5_face_landmarks.dat)
    /// or the 68-point one (falls back to config, then $DLIB_LANDMARK_MODEL)
    #[arg(long)]
    pub landmark_model: Option<PathBuf>,

    /// Path to the dlib face recognition network (falls back to config, then $DLIB_ENCODER_MODEL)
    #[arg(long)]
    pub encoder_model: Option<PathBuf>,

    /// Number of image jitters to run before encoding
    #[arg(long)]
    pub jitters: Option<u32>,

    /// Times to double the image size before face detection (0 to 3, defaults to 1)
    #[arg(long)]
    pub upsample: Option<u32>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub models: ModelArgs,

    /// Address to bind (defaults to 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (defaults to 8000)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory of authorized-person photos served by /reference-images
    #[arg(long)]
    pub reference_dir: Option<PathBuf>,

    /// Largest face distance still reported as a match (defaults to 0.6)
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub models: ModelArgs,

    /// Photo of the identity document
    #[arg(long)]
    pub dni: PathBuf,

    /// Live selfie to compare against the document
    #[arg(long)]
    pub selfie: PathBuf,

    /// Largest face distance still reported as a match (defaults to 0.6)
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ReferencesArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub models: ModelArgs,

    /// Directory of authorized-person photos
    #[arg(long)]
    pub reference_dir: Option<PathBuf>,

    /// Also run face detection on every reference image
    #[arg(long)]
    pub encode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
