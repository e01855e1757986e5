#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Routes submitted content to the right text-extraction capability.

use std::{fmt::Display, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::error::GradingError;

/// Image encodings the optical capability accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// `.jpg` / `.jpeg`
    Jpeg,
    /// `.png`
    Png,
}

/// Declared media kind of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// A photo or scan of the work.
    Image(ImageFormat),
    /// A PDF document.
    Pdf,
    /// A `.doc` / `.docx` document.
    WordDocument,
    /// Already plain text, nothing to extract.
    PlainText,
    /// Anything else, carrying the declared extension.
    Other(String),
}

impl ContentKind {
    /// Classifies content by the extension of its file name.
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "jpg" | "jpeg" => ContentKind::Image(ImageFormat::Jpeg),
            "png" => ContentKind::Image(ImageFormat::Png),
            "pdf" => ContentKind::Pdf,
            "doc" | "docx" => ContentKind::WordDocument,
            "txt" | "md" => ContentKind::PlainText,
            _ => ContentKind::Other(extension),
        }
    }

    /// Picks the extraction route for this kind, failing fast on kinds no
    /// capability handles.
    pub fn route(&self) -> Result<Route, GradingError> {
        match self {
            ContentKind::Image(_) => Ok(Route::Optical),
            ContentKind::Pdf | ContentKind::WordDocument => Ok(Route::Document),
            ContentKind::PlainText => Ok(Route::Bypass),
            ContentKind::Other(ext) => Err(GradingError::UnsupportedContentType(ext.clone())),
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Image(ImageFormat::Jpeg) => write!(f, "image/jpeg"),
            ContentKind::Image(ImageFormat::Png) => write!(f, "image/png"),
            ContentKind::Pdf => write!(f, "pdf"),
            ContentKind::WordDocument => write!(f, "word document"),
            ContentKind::PlainText => write!(f, "plain text"),
            ContentKind::Other(ext) => write!(f, "unsupported ({ext})"),
        }
    }
}

/// Which capability handles a given content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Optical extraction (images).
    Optical,
    /// Document extraction (PDF, word-processor documents).
    Document,
    /// No extraction needed.
    Bypass,
}

/// Submitted bytes tagged with their declared kind.
#[derive(Debug, Clone)]
pub struct ContentDescriptor {
    /// Original file name, used for the staged copy's suffix and for logs.
    pub file_name: String,
    /// Declared media kind.
    pub kind:      ContentKind,
    /// Raw content.
    pub bytes:     Vec<u8>,
}

impl ContentDescriptor {
    /// Wraps text that needs no extraction.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            file_name: "submission.txt".to_string(),
            kind:      ContentKind::PlainText,
            bytes:     text.into().into_bytes(),
        }
    }

    /// Wraps an upload, deriving its kind from the file name.
    pub fn upload(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            kind: ContentKind::from_file_name(&file_name),
            file_name,
            bytes,
        }
    }

    /// Reads a file from disk as an upload.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::upload(file_name, bytes))
    }

    /// Decodes plain-text content.
    pub fn as_text(&self) -> Result<ExtractedText, GradingError> {
        let text = std::str::from_utf8(&self.bytes).map_err(|_| {
            GradingError::InvalidRequest(format!("{} is not valid UTF-8 text", self.file_name))
        })?;
        Ok(ExtractedText::from_plain(text))
    }
}

/// One recovered line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    /// The line's text.
    pub text:       String,
    /// Recognition confidence in `[0, 1]`, when the capability reports one.
    pub confidence: Option<f64>,
    /// 1-based page the line was found on.
    pub page:       u32,
}

/// Text recovered from a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// All lines joined with newlines.
    pub full_text:  String,
    /// Lines in reading order.
    pub lines:      Vec<TextLine>,
    /// Number of pages seen.
    pub page_count: u32,
}

impl ExtractedText {
    /// Builds the result from lines in reading order.
    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        let full_text = lines.iter().map(|line| line.text.as_str()).collect::<Vec<_>>().join("\n");
        let page_count = lines.iter().map(|line| line.page).max().unwrap_or(0);
        Self {
            full_text,
            lines,
            page_count,
        }
    }

    /// Treats already-plain text as a single page.
    pub fn from_plain(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| TextLine {
                text:       line.to_string(),
                confidence: None,
                page:       1,
            })
            .collect();
        Self {
            full_text: text.to_string(),
            lines,
            page_count: 1,
        }
    }

    /// Returns true when no usable text was recovered.
    pub fn is_blank(&self) -> bool {
        self.full_text.trim().is_empty()
    }

    /// Mean line confidence, over lines that report one.
    pub fn average_confidence(&self) -> Option<f64> {
        let values: Vec<f64> = self.lines.iter().filter_map(|line| line.confidence).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Result of a dispatch: the text, or the reason no text could be had.
///
/// An `Ok` with blank text is still `Ok`; rejecting it is the caller's call.
pub type ExtractionOutcome = Result<ExtractedText, GradingError>;

/// Reads text out of images.
#[async_trait]
pub trait OpticalExtractor: Send + Sync {
    /// Extracts the text of an encoded image.
    async fn extract_from_image(&self, image: &[u8]) -> Result<ExtractedText>;
}

/// Reads text out of PDFs and word-processor documents.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extracts the text of the document stored at `document`.
    async fn extract_from_document(&self, document: &Path) -> Result<ExtractedText>;
}

/// Chooses and invokes the extraction capability for a submission.
#[derive(Clone)]
pub struct ExtractionDispatcher {
    /// Capability for image content.
    optical:  Arc<dyn OpticalExtractor>,
    /// Capability for document content.
    document: Arc<dyn DocumentExtractor>,
    /// Upper bound on a single capability call.
    deadline: Duration,
}

impl ExtractionDispatcher {
    /// Creates a dispatcher over the two extraction capabilities.
    pub fn new(
        optical: Arc<dyn OpticalExtractor>,
        document: Arc<dyn DocumentExtractor>,
        deadline: Duration,
    ) -> Self {
        Self {
            optical,
            document,
            deadline,
        }
    }

    /// Extracts the text of `content` using the capability its kind routes to.
    ///
    /// Unsupported kinds fail before any capability is invoked. Plain text is
    /// decoded in place.
    pub async fn dispatch(&self, content: &ContentDescriptor) -> ExtractionOutcome {
        let route = content.kind.route()?;
        tracing::debug!("Extracting {} as {}", content.file_name, content.kind);

        let extracted = match route {
            Route::Bypass => return content.as_text(),
            Route::Optical => {
                timeout(self.deadline, self.optical.extract_from_image(&content.bytes))
                    .await
                    .context("Optical extraction timed out")
                    .and_then(|res| res)
            }
            Route::Document => self.extract_staged_document(content).await,
        };

        extracted.map_err(|err| GradingError::extraction(&err))
    }

    /// Stages the document in a temporary file for the duration of the call.
    ///
    /// The staged copy is removed when this future completes or is dropped.
    async fn extract_staged_document(&self, content: &ContentDescriptor) -> Result<ExtractedText> {
        let suffix = Path::new(&content.file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let staged = tempfile::Builder::new()
            .prefix("gradewise-")
            .suffix(&suffix)
            .tempfile()
            .context("Could not stage uploaded document")?;
        tokio::fs::write(staged.path(), &content.bytes)
            .await
            .with_context(|| format!("Could not write staged copy of {}", content.file_name))?;

        timeout(self.deadline, self.document.extract_from_document(staged.path()))
            .await
            .context("Document extraction timed out")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_extensions() {
        assert_eq!(ContentKind::from_file_name("scan.JPG"), ContentKind::Image(ImageFormat::Jpeg));
        assert_eq!(ContentKind::from_file_name("scan.jpeg"), ContentKind::Image(ImageFormat::Jpeg));
        assert_eq!(ContentKind::from_file_name("scan.png"), ContentKind::Image(ImageFormat::Png));
        assert_eq!(ContentKind::from_file_name("essay.pdf"), ContentKind::Pdf);
        assert_eq!(ContentKind::from_file_name("essay.docx"), ContentKind::WordDocument);
        assert_eq!(ContentKind::from_file_name("essay.doc"), ContentKind::WordDocument);
        assert_eq!(ContentKind::from_file_name("essay.txt"), ContentKind::PlainText);
        assert_eq!(ContentKind::from_file_name("essay.odt"), ContentKind::Other("odt".into()));
        assert_eq!(ContentKind::from_file_name("README"), ContentKind::Other(String::new()));
    }

    #[test]
    fn routes_follow_policy() {
        assert_eq!(ContentKind::Image(ImageFormat::Png).route(), Ok(Route::Optical));
        assert_eq!(ContentKind::Pdf.route(), Ok(Route::Document));
        assert_eq!(ContentKind::WordDocument.route(), Ok(Route::Document));
        assert_eq!(ContentKind::PlainText.route(), Ok(Route::Bypass));
        assert_eq!(
            ContentKind::Other("gif".into()).route(),
            Err(GradingError::UnsupportedContentType("gif".into()))
        );
    }

    #[test]
    fn lines_join_into_full_text() {
        let extracted = ExtractedText::from_lines(vec![
            TextLine {
                text:       "first".into(),
                confidence: Some(0.5),
                page:       1,
            },
            TextLine {
                text:       "second".into(),
                confidence: None,
                page:       2,
            },
        ]);
        assert_eq!(extracted.full_text, "first\nsecond");
        assert_eq!(extracted.page_count, 2);
        assert_eq!(extracted.average_confidence(), Some(0.5));
        assert!(!extracted.is_blank());
        assert!(ExtractedText::from_lines(vec![]).is_blank());
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let content = ContentDescriptor {
            file_name: "essay.txt".into(),
            kind:      ContentKind::PlainText,
            bytes:     vec![0xff, 0xfe],
        };
        assert!(matches!(content.as_text(), Err(GradingError::InvalidRequest(_))));
    }
}
