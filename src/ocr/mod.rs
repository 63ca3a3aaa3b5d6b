//! OCR provider abstraction and the provider-neutral document model.
//!
//! Providers hand back an [`OcrDocument`] whose pages are already sorted into
//! one of the shapes in [`OcrPage`]; normalization never inspects raw JSON.

pub mod mistral;

use crate::error::{NormalizationError, OcrError};
use serde::Deserialize;

/// An image embedded in a page, referenced from the page markdown by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: String,
    pub image_base64: String,
}

/// One page of OCR output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrPage {
    Paragraphs(Vec<String>),
    Markdown(String),
    Illustrated {
        markdown: String,
        images: Vec<EmbeddedImage>,
    },
    /// Neither paragraphs nor markdown.
    Blank,
}

/// Ordered pages from a single OCR request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrDocument {
    pub pages: Vec<OcrPage>,
}

/// What gets submitted to the provider.
pub enum OcrInput {
    /// Raw bytes that must be uploaded and signed before OCR.
    Upload { file_name: String, bytes: Vec<u8> },
    /// An image the provider can fetch directly.
    ImageUrl(String),
}

impl OcrInput {
    pub fn describe(&self) -> String {
        match self {
            OcrInput::Upload { file_name, bytes } => {
                format!("{} ({} bytes)", file_name, bytes.len())
            }
            OcrInput::ImageUrl(_) => "direct image URL".to_string(),
        }
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, input: OcrInput) -> Result<OcrDocument, ProviderError>;
}

/// A provider either fails to talk to its API or returns something unreadable.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Request(#[from] OcrError),
    #[error(transparent)]
    Shape(#[from] NormalizationError),
}

// ── Wire shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RawOcrResponse {
    pages: Vec<RawPage>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    paragraphs: Option<Vec<RawParagraph>>,
    #[serde(default)]
    images: Option<Vec<RawImage>>,
}

#[derive(Debug, Deserialize)]
struct RawParagraph {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    id: String,
    #[serde(default)]
    image_base64: Option<String>,
}

impl OcrDocument {
    /// Parse a provider response body.
    pub fn from_json(body: &str) -> Result<Self, NormalizationError> {
        let raw: RawOcrResponse = serde_json::from_str(body)
            .map_err(|e| NormalizationError(format!("unexpected OCR response: {}", e)))?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawOcrResponse> for OcrDocument {
    type Error = NormalizationError;

    fn try_from(raw: RawOcrResponse) -> Result<Self, Self::Error> {
        let pages = raw
            .pages
            .into_iter()
            .enumerate()
            .map(|(position, page)| {
                let page_num = page.index.map(|i| i as usize).unwrap_or(position) + 1;
                OcrPage::from_raw(page, page_num)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pages })
    }
}

impl OcrPage {
    fn from_raw(page: RawPage, page_num: usize) -> Result<Self, NormalizationError> {
        let images = page.images.unwrap_or_default();

        match (page.paragraphs, page.markdown) {
            (Some(_), Some(_)) => Err(NormalizationError(format!(
                "page {} carries both paragraphs and markdown",
                page_num
            ))),
            (Some(_), None) if !images.is_empty() => Err(NormalizationError(format!(
                "page {} has images but no markdown to place them in",
                page_num
            ))),
            (Some(paragraphs), None) => Ok(OcrPage::Paragraphs(
                paragraphs.into_iter().map(|p| p.text).collect(),
            )),
            (None, Some(markdown)) if images.is_empty() => Ok(OcrPage::Markdown(markdown)),
            (None, Some(markdown)) => {
                let images = images
                    .into_iter()
                    .map(|img| match img.image_base64 {
                        Some(image_base64) => Ok(EmbeddedImage { id: img.id, image_base64 }),
                        None => Err(NormalizationError(format!(
                            "image {} on page {} has no base64 data",
                            img.id, page_num
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(OcrPage::Illustrated { markdown, images })
            }
            (None, None) if !images.is_empty() => Err(NormalizationError(format!(
                "page {} has images but no markdown to place them in",
                page_num
            ))),
            (None, None) => Ok(OcrPage::Blank),
        }
    }
}
