use image::{DynamicImage, RgbImage, RgbaImage};

use super::{CaptureError, CaptureResult, Region, ScreenCapture};

/// Desktop capture through `xcap`.
///
/// The monitor is picked by the region origin; a region spilling over the
/// monitor edge is clipped to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    fn monitor_bounds(monitor: &xcap::Monitor) -> CaptureResult<Region> {
        let failed = |e: xcap::XCapError| CaptureError::CaptureFailed {
            description: e.to_string(),
        };
        Ok(Region::new(
            monitor.x().map_err(failed)?,
            monitor.y().map_err(failed)?,
            monitor.width().map_err(failed)?,
            monitor.height().map_err(failed)?,
        ))
    }
}

impl ScreenCapture for XcapScreen {
    fn capture(&self, region: Region) -> CaptureResult<RgbImage> {
        if !region.is_valid() {
            return Err(CaptureError::EmptyRegion { region });
        }

        let monitor = xcap::Monitor::from_point(region.x, region.y).map_err(|e| {
            CaptureError::MonitorNotFound {
                x: region.x,
                y: region.y,
                description: e.to_string(),
            }
        })?;
        let bounds = Self::monitor_bounds(&monitor)?;
        let clipped = region
            .clip_to(bounds)
            .ok_or(CaptureError::OutOfBounds { region })?;

        let captured = monitor
            .capture_region(
                (clipped.x - bounds.x) as u32,
                (clipped.y - bounds.y) as u32,
                clipped.width,
                clipped.height,
            )
            .map_err(|e| CaptureError::CaptureFailed {
                description: e.to_string(),
            })?;

        // Rebuild through raw bytes so the frame does not depend on the
        // `image` version xcap was built against.
        let (width, height) = (captured.width(), captured.height());
        let rgba = RgbaImage::from_raw(width, height, captured.into_raw())
            .ok_or(CaptureError::BufferMismatch { width, height })?;

        log::trace!("📸 Captured {}x{} at ({},{})", width, height, clipped.x, clipped.y);
        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}
