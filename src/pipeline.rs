//! One OCR request, start to finish.
//!
//! status message → acquire → OCR → normalize → preview → remember.
//! Any stage error ends the request with the status message showing it.

use crate::delivery::{self, ChatSurface};
use crate::error::PipelineError;
use crate::normalize::normalize;
use crate::ocr::{OcrInput, OcrProvider, ProviderError};
use crate::session::Session;
use std::future::Future;
use tracing::{error, info};

/// Where the file came from; decides the wording shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    Photo,
    Link,
}

impl RequestKind {
    pub fn status_text(self) -> &'static str {
        match self {
            RequestKind::Document => "⏳ Processing your document. This may take a moment...",
            RequestKind::Photo => "⏳ Processing your image. This may take a moment...",
            RequestKind::Link => {
                "⏳ Downloading and processing the file from the URL. This may take a moment..."
            }
        }
    }

    fn failure_context(self) -> &'static str {
        match self {
            RequestKind::Document => "Error processing document",
            RequestKind::Photo => "Error processing photo",
            RequestKind::Link => "Error processing file from URL",
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Request(e) => e.into(),
            ProviderError::Shape(e) => e.into(),
        }
    }
}

/// Run a request whose input is produced by `acquire` once the status
/// message is up. Errors are logged and shown; nothing propagates.
pub async fn run<F, Fut>(
    kind: RequestKind,
    surface: &dyn ChatSurface,
    provider: &dyn OcrProvider,
    session: &Session,
    acquire: F,
) where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<OcrInput, PipelineError>>,
{
    let status = match surface.send_text(kind.status_text()).await {
        Ok(status) => status,
        Err(e) => {
            error!("Chat {}: could not send status message: {}", session.chat_id(), e);
            return;
        }
    };

    let outcome = async {
        let input = acquire().await?;
        info!(
            "Chat {}: submitting {} to {}",
            session.chat_id(),
            input.describe(),
            provider.name()
        );
        let document = provider.process(input).await?;
        let result = normalize(&document);
        delivery::present(surface, session, status, result).await?;
        Ok::<(), PipelineError>(())
    }
    .await;

    if let Err(e) = outcome {
        error!("Chat {}: {}: {}", session.chat_id(), kind.failure_context(), e);
        let text = format!("❌ {}: {}", kind.failure_context(), e);
        if let Err(edit_err) = surface.edit_text(status, &text).await {
            error!("Chat {}: could not report failure: {}", session.chat_id(), edit_err);
        }
    }
}
