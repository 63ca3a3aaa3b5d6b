//! File Acquisition: get raw bytes, a file name and a validated extension for
//! whatever the user sent.

use crate::error::AcquireError;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

/// Extensions the OCR provider accepts, lowercase with leading dot.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [".pdf", ".jpg", ".jpeg", ".png"];

/// A file ready for OCR submission.
#[derive(Debug, Clone)]
pub struct AcquiredFile {
    pub file_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Lowercase `extension` (with or without a leading dot) and check it against
/// [`SUPPORTED_EXTENSIONS`].
pub fn validate_extension(extension: &str) -> Result<String, AcquireError> {
    let ext = format!(".{}", extension.trim_start_matches('.').to_lowercase());
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(AcquireError::UnsupportedFileType(extension.to_string()))
    }
}

/// Extension of a path or file name, with leading dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
}

/// Accept only absolute URLs with both a scheme and a host.
pub fn parse_link(raw: &str) -> Result<Url, AcquireError> {
    let url = Url::parse(raw.trim()).map_err(|_| AcquireError::InvalidUrl(raw.to_string()))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(AcquireError::InvalidUrl(raw.to_string())),
    }
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)filename\*?=(?:UTF-8'[^']*')?["']?([^"';]+)["']?"#)
            .expect("static regex is valid")
    })
}

/// File name from a `Content-Disposition` header value. Percent-escapes
/// (as used by `filename*=UTF-8''...`) are decoded.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    filename_pattern()
        .captures(disposition)
        .and_then(|c| c.get(1))
        .map(|m| {
            let raw = m.as_str().trim();
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .filter(|name| !name.is_empty())
}

/// Last path segment of a URL, or `download` when the path is empty.
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|tail| !tail.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Pick an extension for a remote file: Content-Type first, then the file
/// name, then a guess from whether the content type mentions images.
pub fn resolve_extension(content_type: &str, file_name: &str) -> String {
    let mime = content_type.split(';').next().unwrap_or("").trim();

    let from_mime = mime_guess::get_mime_extensions_str(mime).and_then(|exts| {
        exts.iter()
            .find(|e| SUPPORTED_EXTENSIONS.contains(&format!(".{}", e).as_str()))
            .or_else(|| exts.first())
            .map(|e| format!(".{}", e))
    });

    from_mime
        .or_else(|| extension_of(file_name))
        .unwrap_or_else(|| {
            if content_type.contains("image") {
                ".jpg".to_string()
            } else {
                ".pdf".to_string()
            }
        })
}

/// Download the file behind a `/link` URL.
pub async fn fetch_url(client: &reqwest::Client, url: &Url) -> Result<AcquiredFile, AcquireError> {
    info!("Downloading {}", url);

    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| AcquireError::DownloadFailed(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AcquireError::DownloadFailed(format!("status code {}", status)));
    }

    let headers = resp.headers();
    let file_name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| filename_from_url(url));
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let extension = validate_extension(&resolve_extension(&content_type, &file_name))?;
    debug!(
        "Resolved {} as {} (content-type {:?})",
        url, extension, content_type
    );

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| AcquireError::DownloadFailed(e.to_string()))?
        .to_vec();

    info!("Downloaded {} ({} bytes)", file_name, bytes.len());
    Ok(AcquiredFile {
        file_name,
        extension,
        bytes,
    })
}

/// Temporary file that is removed when dropped, on every exit path.
pub struct ScratchFile {
    inner: tempfile::NamedTempFile,
}

impl ScratchFile {
    pub fn create(extension: &str) -> Result<Self, AcquireError> {
        let inner = tempfile::Builder::new()
            .prefix("ocr-bot-")
            .suffix(extension)
            .tempfile()
            .map_err(|e| AcquireError::DownloadFailed(format!("temp file: {}", e)))?;
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// A tokio handle for writing into the scratch file.
    pub fn writer(&self) -> Result<tokio::fs::File, AcquireError> {
        let file = self
            .inner
            .reopen()
            .map_err(|e| AcquireError::DownloadFailed(format!("temp file: {}", e)))?;
        Ok(tokio::fs::File::from_std(file))
    }

    /// Read everything back, consuming (and deleting) the file.
    pub fn into_bytes(self) -> Result<Vec<u8>, AcquireError> {
        let mut bytes = Vec::new();
        self.inner
            .reopen()
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| AcquireError::DownloadFailed(format!("temp file: {}", e)))?;
        Ok(bytes)
    }
}
