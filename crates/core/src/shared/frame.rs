use ndarray::ArrayView3;

use crate::shared::region::Region;

/// A single captured or pushed frame: contiguous RGB bytes in row-major order.
///
/// Frames are transient. They live for one scheduling cycle and are dropped
/// once the scheduler has decided what to do with them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    timestamp: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            timestamp: 0.0,
        }
    }

    /// Wraps a decoded RGB image.
    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Sets the capture time in seconds since the Unix epoch.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels under `region` into a new frame.
    ///
    /// The region is clipped to the frame bounds first; `None` means nothing
    /// of it is left inside the frame.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let clipped = region.clip(self.width, self.height)?;
        let channels = self.channels as usize;
        let row_len = clipped.width as usize * channels;
        let stride = self.width as usize * channels;

        let mut data = Vec::with_capacity(row_len * clipped.height as usize);
        for row in clipped.y as usize..(clipped.y + clipped.height) as usize {
            let start = row * stride + clipped.x as usize * channels;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Some(
            Frame::new(
                data,
                clipped.width as u32,
                clipped.height as u32,
                self.channels,
                self.index,
            )
            .with_timestamp(self.timestamp),
        )
    }

    /// Converts to an `image` buffer. Only three-channel frames convert.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
