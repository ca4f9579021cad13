use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in frame pixel coordinates.
///
/// Coordinates may extend past the frame edges; use [`Region::clip`]
/// before touching pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from corner coordinates, rounding outward.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let left = x1.floor() as i32;
        let top = y1.floor() as i32;
        Self {
            x: left,
            y: top,
            width: (x2.ceil() as i32 - left).max(0),
            height: (y2.ceil() as i32 - top).max(0),
        }
    }

    /// Intersection with the `frame_w` x `frame_h` frame, or `None` if empty.
    pub fn clip(&self, frame_w: u32, frame_h: u32) -> Option<Region> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = (self.x + self.width).min(frame_w as i32);
        let y2 = (self.y + self.height).min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region::new(x1, y1, x2 - x1, y2 - y1))
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }
}

/// A detected face plus its positional slot within one frame's detection pass.
///
/// Slot 0 is the first face the locator reported. Slots are not identities:
/// if detection order shifts between frames, the same person may land in a
/// different slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub slot: usize,
    pub region: Region,
}

impl FaceRegion {
    /// Assigns slots in detection order.
    pub fn from_detections(regions: Vec<Region>) -> Vec<FaceRegion> {
        regions
            .into_iter()
            .enumerate()
            .map(|(slot, region)| FaceRegion { slot, region })
            .collect()
    }
}
