use std::env;
use std::fmt;
use std::path::PathBuf;

use dlib_face_recognition::{
    FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
    LandmarkPredictor, LandmarkPredictorTrait, Rectangle,
};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};

const LANDMARK_ENV: &str = "DLIB_LANDMARK_MODEL";
const ENCODER_ENV: &str = "DLIB_ENCODER_MODEL";

/// Which upload an image came from; used for error text and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Dni,
    Selfie,
    Reference,
}

impl ImageRole {
    pub fn field_name(self) -> &'static str {
        match self {
            ImageRole::Dni => "dni",
            ImageRole::Selfie => "selfie",
            ImageRole::Reference => "reference",
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Dni => f.write_str("DNI"),
            ImageRole::Selfie => f.write_str("selfie"),
            ImageRole::Reference => f.write_str("reference"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceModelConfig {
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

pub trait ModelPathResolver {
    fn resolve(&self, config: &FaceModelConfig) -> AppResult<FaceModelPaths>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModelPathResolver;

impl ModelPathResolver for EnvModelPathResolver {
    fn resolve(&self, config: &FaceModelConfig) -> AppResult<FaceModelPaths> {
        let landmark = config
            .landmark_model
            .clone()
            .or_else(|| env::var(LANDMARK_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "landmark predictor",
                flag: "--landmark-model",
                env: LANDMARK_ENV,
            })?;

        let encoder = config
            .encoder_model
            .clone()
            .or_else(|| env::var(ENCODER_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "face encoding network",
                flag: "--encoder-model",
                env: ENCODER_ENV,
            })?;

        Ok(FaceModelPaths { landmark, encoder })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceEmbeddingRecord {
    pub bounding_box: BoundingBox,
    pub embedding: Vec<f64>,
}

/// Decodes uploaded bytes into an 8-bit RGB buffer whatever the source depth or layout.
pub fn decode_image(role: ImageRole, bytes: &[u8]) -> AppResult<RgbImage> {
    let image =
        image::load_from_memory(bytes).map_err(|source| AppError::ImageDecode { role, source })?;
    let rgb = image.to_rgb8();
    debug!(
        role = role.field_name(),
        width = rgb.width(),
        height = rgb.height(),
        "decoded image"
    );
    Ok(rgb)
}

/// Embedding of the first face the detector reports; any further faces are ignored.
pub fn first_face_embedding<B: FaceEmbeddingBackend + ?Sized>(
    backend: &B,
    role: ImageRole,
    image: &RgbImage,
    jitters: u32,
    upsample: u32,
) -> AppResult<(FaceEmbeddingRecord, usize)> {
    let faces = backend.extract(image, jitters, upsample)?;
    let detected = faces.len();
    debug!(role = role.field_name(), faces = detected, "face detection finished");
    faces
        .into_iter()
        .next()
        .map(|face| (face, detected))
        .ok_or(AppError::NoFaceDetected { role })
}

pub trait FaceEmbeddingBackend {
    /// Bounding boxes are in `image` coordinates whatever `upsample` is.
    fn extract(
        &self,
        image: &RgbImage,
        num_jitters: u32,
        upsample: u32,
    ) -> AppResult<Vec<FaceEmbeddingRecord>>;
}

/// Runs `detect` on `image` doubled `upsample` times and maps the boxes back.
///
/// The HOG detector only finds faces of about 80x80 pixels or larger, so small
/// portraits such as the photo on an ID card need a larger canvas.
pub fn detect_upsampled<F>(image: &RgbImage, upsample: u32, detect: F) -> Vec<BoundingBox>
where
    F: FnOnce(&RgbImage) -> Vec<BoundingBox>,
{
    if upsample == 0 {
        return detect(image);
    }

    let factor = 2_u32.saturating_pow(upsample);
    let enlarged = imageops::resize(
        image,
        image.width().saturating_mul(factor),
        image.height().saturating_mul(factor),
        FilterType::Triangle,
    );
    let factor = i64::from(factor);
    detect(&enlarged)
        .into_iter()
        .map(|found| BoundingBox {
            left: found.left / factor,
            top: found.top / factor,
            right: found.right / factor,
            bottom: found.bottom / factor,
        })
        .collect()
}

pub struct DlibBackend {
    detector: FaceDetector,
    predictor: LandmarkPredictor,
    encoder: FaceEncoderNetwork,
}

impl DlibBackend {
    pub fn new(models: &FaceModelPaths) -> AppResult<Self> {
        debug!(path = %models.landmark.display(), "loading landmark model");
        let predictor =
            LandmarkPredictor::open(&models.landmark).map_err(|message| AppError::ModelLoad {
                path: models.landmark.clone(),
                message,
            })?;
        debug!(path = %models.encoder.display(), "loading encoder model");
        let encoder =
            FaceEncoderNetwork::open(&models.encoder).map_err(|message| AppError::ModelLoad {
                path: models.encoder.clone(),
                message,
            })?;
        let detector = FaceDetector::new();

        Ok(Self {
            detector,
            predictor,
            encoder,
        })
    }

    pub fn from_config(config: &FaceModelConfig) -> AppResult<Self> {
        let models = EnvModelPathResolver.resolve(config)?;
        Self::new(&models)
    }
}

impl FaceEmbeddingBackend for DlibBackend {
    fn extract(
        &self,
        image: &RgbImage,
        num_jitters: u32,
        upsample: u32,
    ) -> AppResult<Vec<FaceEmbeddingRecord>> {
        let locations = detect_upsampled(image, upsample, |canvas| {
            let matrix = ImageMatrix::from_image(canvas);
            self.detector
                .face_locations(&matrix)
                .iter()
                .map(|rect| BoundingBox {
                    left: rect.left,
                    top: rect.top,
                    right: rect.right,
                    bottom: rect.bottom,
                })
                .collect()
        });

        // Landmarks and encodings run on the original pixels.
        let matrix = ImageMatrix::from_image(image);
        let landmarks: Vec<_> = locations
            .iter()
            .map(|found| {
                let rect = Rectangle {
                    left: found.left,
                    top: found.top,
                    right: found.right,
                    bottom: found.bottom,
                };
                self.predictor.face_landmarks(&matrix, &rect)
            })
            .collect();

        let encodings = self
            .encoder
            .get_face_encodings(&matrix, &landmarks, num_jitters);

        let records = locations
            .into_iter()
            .zip(encodings.iter())
            .map(|(bounding_box, encoding)| FaceEmbeddingRecord {
                bounding_box,
                embedding: encoding.as_ref().to_vec(),
            })
            .collect();

        Ok(records)
    }
}
