pub mod comparer;
pub mod extractor;
pub mod references;

pub use comparer::{
    compare_embeddings, compare_face_images, euclidean_distance, ComparisonSettings,
    FaceComparison, FaceComparisonOutcome,
};

pub use extractor::{
    decode_image, detect_upsampled, first_face_embedding, BoundingBox, DlibBackend, EnvModelPathResolver,
    FaceEmbeddingBackend, FaceEmbeddingRecord, FaceModelConfig, FaceModelPaths, ImageRole,
    ModelPathResolver,
};

pub use references::{
    is_reference_image, list_reference_images, load_reference_encodings, reference_dir,
    EnvReferenceDirResolver, ReferenceDirResolver, ReferenceEncoding, ReferenceEncodingReport,
    ReferenceImage, SkippedReference, DEFAULT_REFERENCE_DIR,
};
