// Screen capture module
// A single capture primitive: grab one rectangular region of the physical
// screen as an RGB frame. Everything above this layer only sees `RgbImage`.

pub mod error;
pub mod region;
pub mod xcap_impl;

pub use error::{CaptureError, CaptureResult};
pub use region::Region;
pub use xcap_impl::XcapScreen;

use image::RgbImage;

/// Anything that can produce a frame for a screen region.
///
/// The decision loop owns one of these behind an `Arc` and calls it from its
/// worker thread only.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, region: Region) -> CaptureResult<RgbImage>;
}
