//! Display backend capability
//!
//! A display has a size in pixels and can load, unload and draw images.
//! Loading hands the pixels to the backend, which keeps them in whatever
//! form it draws from and returns a handle. `present` brings everything
//! drawn since the previous call to the screen.
//!
//! Displays are shared between the frame loader, which loads and unloads
//! images, and the player, which draws them; both only hold `&self`.

use crate::{Image, Result};
use std::fmt;
use std::num::NonZeroU64;

/// Refers to an image resident in a display backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(NonZeroU64);

impl ImageHandle {
    /// Wraps a raw backend id; 0 is never a valid handle
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive pixel rectangle on the display
///
/// Coordinates may lie outside the display; drawing clips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Rect {
    /// Centers an `width` x `height` area on a display
    pub fn centered(display_width: u32, display_height: u32, width: u32, height: u32) -> Self {
        let x1 = (i64::from(display_width) - i64::from(width)) / 2;
        let y1 = (i64::from(display_height) - i64::from(height)) / 2;
        Self {
            x1,
            y1,
            x2: x1 + i64::from(width) - 1,
            y2: y1 + i64::from(height) - 1,
        }
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1 + 1
    }
}

pub trait Display {
    /// Whether the backend initialized and can draw
    fn is_ready(&self) -> bool;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Makes an image resident, failing if the backend cannot take it
    fn load(&self, image: Image) -> Result<ImageHandle>;

    /// Releases a loaded image; unknown handles are ignored
    fn unload(&self, handle: ImageHandle);

    /// Draws a loaded image scaled to fill `rect`
    fn draw(&self, handle: ImageHandle, rect: Rect) -> Result<()>;

    /// Shows what was drawn
    fn present(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect() {
        let rect = Rect::centered(1920, 1080, 640, 480);
        assert_eq!(rect, Rect { x1: 640, y1: 300, x2: 1279, y2: 779 });
        assert_eq!((rect.width(), rect.height()), (640, 480));
    }

    #[test]
    fn test_centered_rect_larger_than_display() {
        let rect = Rect::centered(100, 100, 200, 100);
        assert_eq!(rect.x1, -50);
        assert_eq!(rect.x2, 149);
        assert_eq!(rect.y1, 0);
    }

    #[test]
    fn test_zero_is_not_a_handle() {
        assert!(ImageHandle::new(0).is_none());
        assert_eq!(ImageHandle::new(7).unwrap().get(), 7);
    }
}
