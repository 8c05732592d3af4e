//! Screen regions in physical pixel coordinates

use serde::{Deserialize, Serialize};

/// A rectangle on the screen, persisted as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A region with no area is treated the same as an unset one.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Clip this region to a bounding rectangle, `None` when nothing is left.
    pub fn clip_to(&self, bounds: Region) -> Option<Region> {
        let x1 = self.x.max(bounds.x);
        let y1 = self.y.max(bounds.y);
        let x2 = (self.x + self.width as i32).min(bounds.x + bounds.width as i32);
        let y2 = (self.y + self.height as i32).min(bounds.y + bounds.height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

impl From<[i32; 4]> for Region {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self::new(x, y, width.max(0) as u32, height.max(0) as u32)
    }
}

impl From<Region> for [i32; 4] {
    fn from(region: Region) -> Self {
        [
            region.x,
            region.y,
            region.width.min(i32::MAX as u32) as i32,
            region.height.min(i32::MAX as u32) as i32,
        ]
    }
}
