use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for template loading.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors raised while building the template library.
///
/// These never escape the library: a failing file is logged and skipped.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Failed to read template directory {path:?}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read template {path:?}: {source}")]
    TemplateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode template {path:?}: {source}")]
    TemplateDecode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Template {path:?} is empty or fully transparent")]
    EmptyTemplate { path: PathBuf },
}
