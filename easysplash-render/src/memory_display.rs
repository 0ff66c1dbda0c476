//! Headless display drawing into memory

use crate::canvas::Canvas;
use crate::{Display, Image, ImageHandle, Rect, Result};
use log::debug;
use std::cell::{Cell, RefCell};

/// Display backed by an in-memory RGBA canvas
///
/// Used when no screen is available and by tests. Every `present` snapshots
/// the canvas so the last shown frame can be inspected or saved.
pub struct MemoryDisplay {
    width: u32,
    height: u32,
    canvas: RefCell<Canvas>,
    presented: RefCell<Option<Image>>,
    present_count: Cell<usize>,
    draw_count: Cell<usize>,
}

impl MemoryDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        debug!("created {}x{} memory display", width, height);
        Self {
            width,
            height,
            canvas: RefCell::new(Canvas::new(width, height)),
            presented: RefCell::new(None),
            present_count: Cell::new(0),
            draw_count: Cell::new(0),
        }
    }

    /// How many times `present` was called
    pub fn present_count(&self) -> usize {
        self.present_count.get()
    }

    /// How many draws succeeded
    pub fn draw_count(&self) -> usize {
        self.draw_count.get()
    }

    /// Number of images currently resident
    pub fn loaded_count(&self) -> usize {
        self.canvas.borrow().loaded()
    }

    /// The canvas as of the last `present`
    pub fn last_presented(&self) -> Option<Image> {
        self.presented.borrow().clone()
    }
}

impl Display for MemoryDisplay {
    fn is_ready(&self) -> bool {
        self.width != 0 && self.height != 0
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn load(&self, image: Image) -> Result<ImageHandle> {
        self.canvas.borrow_mut().load(image)
    }

    fn unload(&self, handle: ImageHandle) {
        self.canvas.borrow_mut().unload(handle);
    }

    fn draw(&self, handle: ImageHandle, rect: Rect) -> Result<()> {
        self.canvas.borrow_mut().draw(handle, rect)?;
        self.draw_count.set(self.draw_count.get() + 1);
        Ok(())
    }

    fn present(&self) -> Result<()> {
        *self.presented.borrow_mut() = Some(self.canvas.borrow().surface().clone());
        self.present_count.set(self.present_count.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_snapshots_canvas() {
        let display = MemoryDisplay::new(4, 4);
        assert!(display.is_ready());
        assert!(display.last_presented().is_none());

        let mut image = Image::blank(1, 1);
        image.set_pixel(0, 0, [7, 7, 7, 255]);
        let handle = display.load(image).unwrap();
        display.draw(handle, Rect::centered(4, 4, 2, 2)).unwrap();
        display.present().unwrap();

        let shown = display.last_presented().unwrap();
        assert_eq!(shown.pixel(1, 1), [7, 7, 7, 255]);
        assert_eq!(shown.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!((display.draw_count(), display.present_count()), (1, 1));
    }

    #[test]
    fn test_empty_display_is_not_ready() {
        assert!(!MemoryDisplay::new(0, 10).is_ready());
    }
}
