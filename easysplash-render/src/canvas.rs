//! Software drawing surface shared by the CPU backed displays

use crate::{Error, Image, ImageHandle, Rect, Result};
use log::trace;
use std::collections::HashMap;

/// RGBA surface plus the images loaded for drawing onto it
pub struct Canvas {
    surface: Image,
    images: HashMap<ImageHandle, Image>,
    last_handle: u64,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: Image::blank(width, height),
            images: HashMap::new(),
            last_handle: 0,
        }
    }

    pub fn surface(&self) -> &Image {
        &self.surface
    }

    /// Number of images currently loaded
    pub fn loaded(&self) -> usize {
        self.images.len()
    }

    pub fn load(&mut self, image: Image) -> Result<ImageHandle> {
        if !image.is_valid() {
            return Err(Error::InvalidImage(format!(
                "{}x{} with stride {} and {} bytes",
                image.width,
                image.height,
                image.stride,
                image.pixels.len()
            )));
        }

        self.last_handle += 1;
        let handle = ImageHandle::new(self.last_handle)
            .ok_or_else(|| Error::InvalidImage("handle space exhausted".into()))?;
        trace!("loaded {}x{} image as {}", image.width, image.height, handle);
        self.images.insert(handle, image);
        Ok(handle)
    }

    pub fn unload(&mut self, handle: ImageHandle) {
        if self.images.remove(&handle).is_some() {
            trace!("unloaded image {}", handle);
        }
    }

    /// Copies an image into `rect` with nearest neighbour scaling, clipped to
    /// the surface
    pub fn draw(&mut self, handle: ImageHandle, rect: Rect) -> Result<()> {
        let source = self.images.get(&handle).ok_or(Error::UnknownHandle(handle))?;
        let surface = &mut self.surface;

        let (draw_w, draw_h) = (rect.width(), rect.height());
        if draw_w <= 0 || draw_h <= 0 {
            return Ok(());
        }

        let y_start = rect.y1.max(0);
        let y_end = rect.y2.min(i64::from(surface.height) - 1);
        let x_start = rect.x1.max(0);
        let x_end = rect.x2.min(i64::from(surface.width) - 1);

        for dest_y in y_start..=y_end {
            let src_y = (dest_y - rect.y1) * i64::from(source.height) / draw_h;
            for dest_x in x_start..=x_end {
                let src_x = (dest_x - rect.x1) * i64::from(source.width) / draw_w;
                let pixel = source.pixel(src_x as u32, src_y as u32);
                surface.set_pixel(dest_x as u32, dest_y as u32, pixel);
            }
        }

        Ok(())
    }
}
