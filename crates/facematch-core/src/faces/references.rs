use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::comparer::ComparisonSettings;
use crate::faces::extractor::{
    decode_image, first_face_embedding, FaceEmbeddingBackend, ImageRole,
};

pub const DEFAULT_REFERENCE_DIR: &str = "Personas_Autorizadas";
const REFERENCE_DIR_ENV: &str = "FACEMATCH_REFERENCE_DIR";
const REFERENCE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

pub trait ReferenceDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvReferenceDirResolver;

impl ReferenceDirResolver for EnvReferenceDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(env_value) = env::var(REFERENCE_DIR_ENV) {
            PathBuf::from(env_value)
        } else {
            PathBuf::from(DEFAULT_REFERENCE_DIR)
        }
    }
}

pub fn reference_dir(override_dir: Option<&Path>) -> PathBuf {
    EnvReferenceDirResolver.resolve(override_dir)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceEncoding {
    pub file_name: String,
    pub embedding: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedReference {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceEncodingReport {
    pub directory: PathBuf,
    pub encodings: Vec<ReferenceEncoding>,
    pub skipped: Vec<SkippedReference>,
}

/// Suffix match is case-sensitive: `photo.JPG` is not listed.
pub fn is_reference_image(file_name: &str) -> bool {
    REFERENCE_EXTENSIONS
        .iter()
        .any(|extension| file_name.ends_with(extension))
}

/// Image files directly inside `dir`, sorted by name. Read fresh on every call.
pub fn list_reference_images(dir: &Path) -> AppResult<Vec<ReferenceImage>> {
    let entries = fs::read_dir(dir).map_err(|source| AppError::ReferenceDirRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| AppError::ReferenceDirRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            debug!(path = %path.display(), "skipping non UTF-8 file name");
            continue;
        };
        if !is_reference_image(&file_name) || !path.is_file() {
            continue;
        }
        images.push(ReferenceImage { file_name, path });
    }

    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(images)
}

/// Encodes the first face of every reference image; unusable files are skipped and reported.
///
/// Only `jitters` and `upsample` of `settings` apply here.
pub fn load_reference_encodings<B: FaceEmbeddingBackend + ?Sized>(
    backend: &B,
    dir: &Path,
    settings: &ComparisonSettings,
) -> AppResult<ReferenceEncodingReport> {
    let mut report = ReferenceEncodingReport {
        directory: dir.to_path_buf(),
        ..ReferenceEncodingReport::default()
    };

    for image in list_reference_images(dir)? {
        match encode_reference(backend, &image, settings) {
            Ok(embedding) => report.encodings.push(ReferenceEncoding {
                file_name: image.file_name,
                embedding,
            }),
            Err(err) => {
                warn!(file = %image.file_name, error = %err, "skipping reference image");
                report.skipped.push(SkippedReference {
                    file_name: image.file_name,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}

fn encode_reference<B: FaceEmbeddingBackend + ?Sized>(
    backend: &B,
    image: &ReferenceImage,
    settings: &ComparisonSettings,
) -> AppResult<Vec<f64>> {
    let bytes = fs::read(&image.path).map_err(|source| AppError::ImageRead {
        path: image.path.clone(),
        source,
    })?;
    let rgb = decode_image(ImageRole::Reference, &bytes)?;
    let (face, _) = first_face_embedding(
        backend,
        ImageRole::Reference,
        &rgb,
        settings.jitters,
        settings.upsample,
    )?;
    Ok(face.embedding)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::faces::extractor::{BoundingBox, FaceEmbeddingRecord};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    struct BrightnessBackend;

    impl FaceEmbeddingBackend for BrightnessBackend {
        fn extract(
            &self,
            image: &RgbImage,
            _num_jitters: u32,
            _upsample: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            let Rgb([r, _, _]) = *image.get_pixel(0, 0);
            if r == 0 {
                return Ok(Vec::new());
            }
            Ok(vec![FaceEmbeddingRecord {
                bounding_box: BoundingBox {
                    left: 0,
                    top: 0,
                    right: 1,
                    bottom: 1,
                },
                embedding: vec![f64::from(r) / 255.0],
            }])
        }
    }

    fn write_png(path: &Path, red: u8) {
        let image = RgbImage::from_pixel(2, 2, Rgb([red, 0, 0]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        fs::write(path, bytes.into_inner()).unwrap();
    }

    #[test]
    fn lists_only_image_files_sorted() {
        let tmp = TempDir::new().unwrap();
        for name in ["zoe.png", "ana.jpg", "luis.jpeg", "notes.txt", "SHOUT.JPG"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(tmp.path().join("folder.png")).unwrap();

        let names: Vec<String> = list_reference_images(tmp.path())
            .unwrap()
            .into_iter()
            .map(|image| image.file_name)
            .collect();
        assert_eq!(names, vec!["ana.jpg", "luis.jpeg", "zoe.png"]);
    }

    #[test]
    fn empty_directory_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(list_reference_images(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("Personas_Autorizadas");

        let err = list_reference_images(&missing).unwrap_err();
        match err {
            AppError::ReferenceDirRead { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn override_dir_wins() {
        let dir = reference_dir(Some(Path::new("/srv/references")));
        assert_eq!(dir, PathBuf::from("/srv/references"));
    }

    #[test]
    fn encodings_skip_unusable_references() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("ana.png"), 255);
        write_png(&tmp.path().join("blank.png"), 0);
        fs::write(tmp.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let settings = ComparisonSettings::default();
        let report = load_reference_encodings(&BrightnessBackend, tmp.path(), &settings).unwrap();
        assert_eq!(report.encodings.len(), 1);
        assert_eq!(report.encodings[0].file_name, "ana.png");
        assert_eq!(report.encodings[0].embedding, vec![1.0]);

        let skipped: Vec<&str> = report
            .skipped
            .iter()
            .map(|entry| entry.file_name.as_str())
            .collect();
        assert_eq!(skipped, vec!["blank.png", "broken.jpg"]);
        assert!(report.skipped[0].reason.contains("no face"));
    }
}
