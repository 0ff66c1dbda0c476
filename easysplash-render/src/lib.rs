//! EasySplash Render Library
//!
//! This library turns animation frames into pixels on screen: it decodes the
//! frame images stored in the archive, keeps a bounded set of them resident
//! in the display backend, and provides the backends themselves.

pub mod canvas;
pub mod decoder;
pub mod display;
pub mod frame_cache;
pub mod frame_loader;
pub mod memory_display;

#[cfg(target_os = "linux")]
mod fb_bindings;
#[cfg(target_os = "linux")]
pub mod framebuffer;

pub use display::{Display, ImageHandle, Rect};
pub use frame_cache::FrameCache;
pub use frame_loader::FrameLoader;
pub use decoder::{Image, ImageDecoder, PngDecoder};
pub use memory_display::MemoryDisplay;

#[cfg(target_os = "linux")]
pub use framebuffer::FramebufferDisplay;

/// Result type for easysplash-render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for easysplash-render operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("EasySplash core error: {0}")]
    Core(#[from] easysplash_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unknown image handle: {0}")]
    UnknownHandle(ImageHandle),

    #[error("Unsupported framebuffer: {0}")]
    UnsupportedFramebuffer(String),
}
