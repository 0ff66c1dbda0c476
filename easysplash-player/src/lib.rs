//! EasySplash Player Library
//!
//! This library runs the boot animation: it owns the playback position,
//! advances it by wall-clock time or by reported boot progress, and stops
//! when asked to through the control channel or by a cancellation token.

pub mod cancel;
pub mod control;
pub mod event_loop;

pub use cancel::{CancelToken, CancelTrigger};
pub use control::ControlChannel;
pub use event_loop::{EventLoop, StopReason};

use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Default location of the control FIFO
pub const DEFAULT_FIFO_PATH: &str = "/tmp/easysplash_fifo";

/// Default number of frames kept resident in the display
pub const DEFAULT_CACHE_FRAMES: usize = 16;

/// Result type for easysplash-player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for easysplash-player operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("EasySplash core error: {0}")]
    Core(#[from] easysplash_core::Error),

    #[error("EasySplash render error: {0}")]
    Render(#[from] easysplash_render::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not create control FIFO {path}: {source}")]
    Fifo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Control channel closed")]
    ControlClosed,

    #[error("Display is not ready")]
    DisplayNotReady,
}

/// How the animation advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// One frame per frame period, as given by the animation's fps
    #[default]
    Realtime,
    /// Only when boot progress is reported through the control channel
    NonRealtime,
}

/// Player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub mode: PlaybackMode,
    /// Maximum number of frames resident in the display
    pub cache_capacity: NonZeroUsize,
    /// Where the control FIFO is created
    pub fifo_path: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::default(),
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_FRAMES).unwrap_or(NonZeroUsize::MIN),
            fifo_path: PathBuf::from(DEFAULT_FIFO_PATH),
        }
    }
}
