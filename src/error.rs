//! Failure taxonomy for the OCR request pipeline.
//!
//! Each stage returns its own error type so a stage can only fail in the ways
//! it owns. [`PipelineError`] is what the request boundary sees.

use thiserror::Error;

/// File Acquisition failures.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Invalid URL: {0}. Please provide a valid http:// or https:// link")]
    InvalidUrl(String),

    #[error("Unsupported file type ({0}). Please send a PDF or image file (jpg, jpeg, png)")]
    UnsupportedFileType(String),

    #[error("File download failed: {0}")]
    DownloadFailed(String),
}

/// OCR Submission failures (upload, signed URL, OCR call).
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    OcrRequestFailed(String),
}

/// The provider answered, but not with a shape we understand.
#[derive(Debug, Error)]
#[error("Could not read OCR result: {0}")]
pub struct NormalizationError(pub String);

/// Talking back to the chat failed.
#[derive(Debug, Error)]
#[error("Could not deliver result: {0}")]
pub struct DeliveryError(pub String);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
