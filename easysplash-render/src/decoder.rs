//! Frame image decoding

use crate::{Error, Result};
use image::{ImageFormat, RgbaImage};

/// Decoded pixels of a frame
///
/// Pixels are 32-bit RGBA, `stride` bytes per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Creates a fully transparent image with tightly packed rows
    pub fn blank(width: u32, height: u32) -> Self {
        let stride = width * 4;
        Self {
            width,
            height,
            stride,
            pixels: vec![0; stride as usize * height as usize],
        }
    }

    /// Checks the image has pixels and a buffer large enough for them
    pub fn is_valid(&self) -> bool {
        self.width != 0
            && self.height != 0
            && self.stride >= self.width * 4
            && self.pixels.len() >= self.stride as usize * self.height as usize
    }

    /// Returns the pixel at (`x`, `y`), which must be inside the image
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = self.offset(x, y);
        let mut pixel = [0u8; 4];
        pixel.copy_from_slice(&self.pixels[offset..offset + 4]);
        pixel
    }

    /// Overwrites the pixel at (`x`, `y`), which must be inside the image
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: [u8; 4]) {
        let offset = self.offset(x, y);
        self.pixels[offset..offset + 4].copy_from_slice(&pixel);
    }

    /// Copies the pixels into an `image` buffer, e.g. for saving to disk
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let row_len = self.width as usize * 4;
        let mut packed = Vec::with_capacity(row_len * self.height as usize);
        for row in self.pixels.chunks(self.stride as usize).take(self.height as usize) {
            packed.extend_from_slice(row.get(..row_len)?);
        }
        RgbaImage::from_raw(self.width, self.height, packed)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride as usize + x as usize * 4
    }
}

impl From<RgbaImage> for Image {
    fn from(rgba: RgbaImage) -> Self {
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            stride: width * 4,
            pixels: rgba.into_raw(),
        }
    }
}

/// Turns the bytes of an archive entry into pixels
pub trait ImageDecoder {
    fn decode(&self, data: &[u8]) -> Result<Image>;
}

/// Decodes PNG frames
#[derive(Debug, Clone, Copy, Default)]
pub struct PngDecoder;

impl ImageDecoder for PngDecoder {
    fn decode(&self, data: &[u8]) -> Result<Image> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Png)?;

        // Convert to RGBA8
        let image = Image::from(img.to_rgba8());
        if !image.is_valid() {
            return Err(Error::InvalidImage(format!(
                "decoded PNG is {}x{}",
                image.width, image.height
            )));
        }
        Ok(image)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    /// Encodes a solid color PNG
    pub(crate) fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png() {
        let image = PngDecoder.decode(&png(3, 2, [10, 20, 30, 255])).unwrap();

        assert_eq!((image.width, image.height, image.stride), (3, 2, 12));
        assert!(image.is_valid());
        assert_eq!(image.pixel(2, 1), [10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(PngDecoder.decode(b"definitely not a png").is_err());
        assert!(PngDecoder.decode(&[]).is_err());
    }

    #[test]
    fn test_validity() {
        assert!(!Image::default().is_valid());
        assert!(Image::blank(2, 2).is_valid());

        let mut short = Image::blank(2, 2);
        short.pixels.truncate(8);
        assert!(!short.is_valid());
    }

    #[test]
    fn test_padded_rows_convert() {
        let mut image = Image {
            width: 1,
            height: 2,
            stride: 8,
            pixels: vec![0; 16],
        };
        image.set_pixel(0, 1, [1, 2, 3, 4]);

        let rgba = image.to_rgba_image().unwrap();
        assert_eq!(rgba.get_pixel(0, 1).0, [1, 2, 3, 4]);
        assert_eq!(rgba.as_raw().len(), 8);
    }
}
