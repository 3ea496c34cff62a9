use facematch_config::{DEFAULT_JITTERS, DEFAULT_TOLERANCE, DEFAULT_UPSAMPLE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::extractor::{
    decode_image, first_face_embedding, BoundingBox, FaceEmbeddingBackend, ImageRole,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonSettings {
    /// Largest distance still reported as a match.
    pub tolerance: f64,
    pub jitters: u32,
    /// Times each image is doubled before detection.
    pub upsample: u32,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            jitters: DEFAULT_JITTERS,
            upsample: DEFAULT_UPSAMPLE,
        }
    }
}

/// Wire shape of a successful comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceComparison {
    #[serde(rename = "match")]
    pub matched: bool,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct FaceComparisonOutcome {
    pub comparison: FaceComparison,
    pub dni_face: BoundingBox,
    pub selfie_face: BoundingBox,
    pub dni_faces_detected: usize,
    pub selfie_faces_detected: usize,
    pub logs: Vec<String>,
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}

pub fn compare_embeddings(
    dni: &[f64],
    selfie: &[f64],
    tolerance: f64,
) -> AppResult<FaceComparison> {
    if dni.len() != selfie.len() || dni.is_empty() {
        return Err(AppError::EmbeddingMismatch {
            dni: dni.len(),
            selfie: selfie.len(),
        });
    }

    let distance = euclidean_distance(dni, selfie);
    Ok(FaceComparison {
        matched: distance <= tolerance,
        distance,
    })
}

/// Decodes both uploads, encodes the first face of each and compares them.
///
/// Steps run DNI-first and stop at the first failure, so a broken DNI image is
/// reported even when the selfie is broken too.
pub fn compare_face_images<B: FaceEmbeddingBackend + ?Sized>(
    backend: &B,
    dni_bytes: &[u8],
    selfie_bytes: &[u8],
    settings: &ComparisonSettings,
) -> AppResult<FaceComparisonOutcome> {
    let mut logs = Vec::new();

    let dni_image = decode_image(ImageRole::Dni, dni_bytes)?;
    logs.push(format!(
        "Decoded DNI image ({}x{})",
        dni_image.width(),
        dni_image.height()
    ));
    let selfie_image = decode_image(ImageRole::Selfie, selfie_bytes)?;
    logs.push(format!(
        "Decoded selfie image ({}x{})",
        selfie_image.width(),
        selfie_image.height()
    ));

    let (dni_face, dni_faces_detected) = first_face_embedding(
        backend,
        ImageRole::Dni,
        &dni_image,
        settings.jitters,
        settings.upsample,
    )?;
    logs.push(format!("Detected {dni_faces_detected} face(s) in the DNI image"));
    let (selfie_face, selfie_faces_detected) = first_face_embedding(
        backend,
        ImageRole::Selfie,
        &selfie_image,
        settings.jitters,
        settings.upsample,
    )?;
    logs.push(format!("Detected {selfie_faces_detected} face(s) in the selfie"));

    let comparison = compare_embeddings(
        &dni_face.embedding,
        &selfie_face.embedding,
        settings.tolerance,
    )?;
    logs.push(format!(
        "Euclidean distance {:.4} (tolerance {:.2}) => {}",
        comparison.distance,
        settings.tolerance,
        if comparison.matched { "match" } else { "no match" }
    ));
    debug!(
        distance = comparison.distance,
        matched = comparison.matched,
        "comparison finished"
    );

    Ok(FaceComparisonOutcome {
        comparison,
        dni_face: dni_face.bounding_box,
        selfie_face: selfie_face.bounding_box,
        dni_faces_detected,
        selfie_faces_detected,
        logs,
    })
}
