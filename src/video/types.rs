use image::{imageops, ImageBuffer, Rgb, RgbImage};

use crate::composition::layout::Rect;

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer that provides
/// the drawing operations the compositors need.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        let buffer = ImageBuffer::new(width, height);
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }

    /// Raw RGB24 bytes, row-major, as the encoder expects them on stdin
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Copy `source` onto this frame with its top-left corner at `(x, y)`
    ///
    /// Offsets may be negative; whatever falls outside the frame is clipped.
    pub fn blit(&mut self, source: &RgbImage, x: i64, y: i64) {
        imageops::replace(&mut self.buffer, source, x, y);
    }

    /// Fill `rect` with `color`, clipped to the frame
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 3]) {
        let x0 = rect.x.clamp(0, self.width() as i64) as u32;
        let y0 = rect.y.clamp(0, self.height() as i64) as u32;
        let x1 = (rect.x + rect.width as i64).clamp(0, self.width() as i64) as u32;
        let y1 = (rect.y + rect.height as i64).clamp(0, self.height() as i64) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                self.buffer.put_pixel(x, y, Rgb(color));
            }
        }
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_clips_negative_offsets() {
        let mut frame = Frame::new_black(4, 4);
        let patch = RgbImage::from_pixel(3, 3, Rgb([255, 0, 0]));

        frame.blit(&patch, -1, -1);

        assert_eq!(frame.get_pixel(0, 0), [255, 0, 0]);
        assert_eq!(frame.get_pixel(1, 1), [255, 0, 0]);
        assert_eq!(frame.get_pixel(2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_fill_rect_clips_to_frame() {
        let mut frame = Frame::new_black(4, 4);
        frame.fill_rect(Rect::new(2, 2, 10, 10), [1, 2, 3]);

        assert_eq!(frame.get_pixel(3, 3), [1, 2, 3]);
        assert_eq!(frame.get_pixel(1, 1), [0, 0, 0]);
    }

    #[test]
    fn test_rgb_bytes_roundtrip_size() {
        let frame = Frame::new_filled(2, 3, [9, 9, 9]);
        assert_eq!(frame.as_rgb_bytes().len(), 2 * 3 * 3);
        let back = Frame::from_rgb_bytes(2, 3, frame.as_rgb_bytes().to_vec()).unwrap();
        assert_eq!(back, frame);
    }
}
