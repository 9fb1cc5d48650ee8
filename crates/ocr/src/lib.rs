pub mod extract;
pub mod geometry;
pub mod pipeline;
pub mod recognizer;
pub mod report;

pub use extract::{extract_identifier, extract_status};
pub use geometry::{
    composite, crop_by_ratio, crop_cols, crop_rows, fetch_image, is_image, optimal_size, resize,
    GeometryError, OutputFormat,
};
pub use pipeline::{BatchRunner, PipelineError};
pub use recognizer::{CloudVisionRecognizer, MockRecognizer, OcrBackend, OcrError};
pub use report::{BatchResult, PageOutcome, PageRecord};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
