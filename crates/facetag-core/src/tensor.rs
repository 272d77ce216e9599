//! Decoded pixel tensors.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use ndarray::{Array3, ArrayView3};

const CHANNELS: usize = 3;

/// Decoded RGB image stored as an `(height, width, 3)` array of `i32`.
///
/// Tensors are never modified in place; every transformation returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array3<i32>,
}

impl ImageTensor {
    /// Build a tensor from an 8-bit RGB image.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let data = Array3::from_shape_fn((h as usize, w as usize, CHANNELS), |(y, x, c)| {
            img.get_pixel(x as u32, y as u32)[c] as i32
        });
        Self { data }
    }

    /// Convert back to an 8-bit RGB image, clamping out-of-range values.
    pub fn to_rgb(&self) -> RgbImage {
        let (h, w, _) = self.data.dim();
        RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let px = |c: usize| self.data[[y as usize, x as usize, c]].clamp(0, 255) as u8;
            Rgb([px(0), px(1), px(2)])
        })
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, i32> {
        self.data.view()
    }

    /// Encode as JPEG at the given quality (1–100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        self.to_rgb().write_with_encoder(encoder)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_is_height_width_channels() {
        let img = RgbImage::new(4, 2);
        let tensor = ImageTensor::from_rgb(&img);
        assert_eq!(tensor.shape(), (2, 4, 3));
        assert_eq!(tensor.width(), 4);
        assert_eq!(tensor.height(), 2);
    }

    #[test]
    fn test_pixel_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([10, 20, 30]));
        let tensor = ImageTensor::from_rgb(&img);
        let view = tensor.view();
        assert_eq!(view[[1, 2, 0]], 10);
        assert_eq!(view[[1, 2, 1]], 20);
        assert_eq!(view[[1, 2, 2]], 30);
        assert_eq!(tensor.to_rgb(), img);
    }

    #[test]
    fn test_encode_jpeg_produces_decodable_bytes() {
        let img = RgbImage::from_pixel(16, 8, Rgb([120, 80, 40]));
        let bytes = ImageTensor::from_rgb(&img).encode_jpeg(90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }
}
