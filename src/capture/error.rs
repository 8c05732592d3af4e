use thiserror::Error;

use super::Region;

/// A specialized `Result` type for screen capture.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// The error type for the capture primitive.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Region {region:?} has zero size")]
    EmptyRegion { region: Region },

    #[error("No monitor contains point ({x},{y}): {description}")]
    MonitorNotFound { x: i32, y: i32, description: String },

    #[error("Region {region:?} lies outside its monitor")]
    OutOfBounds { region: Region },

    #[error("Screen capture failed: {description}")]
    CaptureFailed { description: String },

    #[error("Captured buffer does not match {width}x{height}")]
    BufferMismatch { width: u32, height: u32 },
}
