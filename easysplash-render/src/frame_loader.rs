//! Resolves playback positions to images resident in the display

use crate::{Display, FrameCache, ImageDecoder, ImageHandle, Result};
use easysplash_core::{Animation, Archive, EntryId, Position};
use log::{error, trace};
use std::io::{Read, Seek};
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Loads frames on demand and keeps the most recently used ones resident
///
/// On a cache miss the frame is extracted from the archive, decoded and
/// loaded into the display. When the cache is full the least recently used
/// frame is unloaded from the display again.
pub struct FrameLoader<R> {
    archive: Archive<R>,
    decoder: Box<dyn ImageDecoder>,
    display: Rc<dyn Display>,
    cache: FrameCache<Position, ImageHandle>,
}

impl<R: Read + Seek> FrameLoader<R> {
    /// Creates a frame loader keeping at most `capacity` frames resident
    pub fn new(
        archive: Archive<R>,
        decoder: Box<dyn ImageDecoder>,
        display: Rc<dyn Display>,
        capacity: NonZeroUsize,
    ) -> Self {
        let unload_display = Rc::clone(&display);
        let cache = FrameCache::with_eviction(capacity, move |position: &Position, handle: ImageHandle| {
            trace!("unloading frame at {:?}", position);
            unload_display.unload(handle);
        });

        Self {
            archive,
            decoder,
            display,
            cache,
        }
    }

    /// Returns the image for a position, loading it if needed
    ///
    /// `None` means the frame is unavailable (out of range, or it failed to
    /// extract, decode or load); the reason is logged and the caller skips
    /// drawing it.
    pub fn get_image(&mut self, position: Position, animation: &Animation) -> Option<ImageHandle> {
        let entry = animation.frame_at(&position)?;

        if let Some(handle) = self.cache.get(&position) {
            return Some(*handle);
        }

        match self.load_frame(entry) {
            Ok(handle) => {
                trace!("loaded frame at {:?} as {}", position, handle);
                Some(*self.cache.put(position, handle))
            }
            Err(e) => {
                let name = self
                    .archive
                    .entry(entry)
                    .map(|archive_entry| archive_entry.name.as_str())
                    .unwrap_or("<unknown>");
                error!("could not load frame \"{}\": {}", name, e);
                None
            }
        }
    }

    fn load_frame(&mut self, entry: EntryId) -> Result<ImageHandle> {
        let data = self.archive.uncompress(entry)?;
        let image = self.decoder.decode(&data)?;
        self.display.load(image)
    }
}

impl<R> FrameLoader<R> {
    /// Number of frames currently resident
    pub fn cached_frames(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::png;
    use crate::{MemoryDisplay, PngDecoder};
    use easysplash_core::testutil::ZipBuilder;
    use std::io::Cursor;

    fn setup(
        capacity: usize,
    ) -> (FrameLoader<Cursor<Vec<u8>>>, Animation, Rc<MemoryDisplay>) {
        let bytes = ZipBuilder::new()
            .stored("desc.txt", b"4 4 10\nc 1 0 part0\n")
            .deflated("part0/0001.png", &png(2, 2, [255, 0, 0, 255]))
            .deflated("part0/0002.png", b"not a png")
            .deflated("part0/0003.png", &png(2, 2, [0, 255, 0, 255]))
            .stored("part0/0004.png", &png(2, 2, [0, 0, 255, 255]))
            .finish();

        let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
        let animation = Animation::load(&mut archive).unwrap();
        let display = Rc::new(MemoryDisplay::new(4, 4));
        let loader = FrameLoader::new(
            archive,
            Box::new(PngDecoder),
            display.clone(),
            NonZeroUsize::new(capacity).unwrap(),
        );
        (loader, animation, display)
    }

    #[test]
    fn test_hit_returns_same_handle() {
        let (mut loader, animation, display) = setup(4);
        let pos = Position::new(0, 0, 0);

        let first = loader.get_image(pos, &animation).unwrap();
        let second = loader.get_image(pos, &animation).unwrap();

        assert_eq!(first, second);
        assert_eq!(display.loaded_count(), 1);
    }

    #[test]
    fn test_eviction_unloads_from_display() {
        let (mut loader, animation, display) = setup(2);

        loader.get_image(Position::new(0, 0, 0), &animation).unwrap();
        loader.get_image(Position::new(0, 0, 2), &animation).unwrap();
        loader.get_image(Position::new(0, 0, 3), &animation).unwrap();

        assert_eq!(loader.cached_frames(), 2);
        assert_eq!(display.loaded_count(), 2);

        drop(loader);
        assert_eq!(display.loaded_count(), 0);
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let (mut loader, animation, display) = setup(4);

        assert!(loader.get_image(Position::new(0, 0, 1), &animation).is_none());
        assert_eq!(display.loaded_count(), 0);
        assert_eq!(loader.cached_frames(), 0);
    }

    #[test]
    fn test_out_of_range_position() {
        let (mut loader, animation, _) = setup(4);

        assert!(loader.get_image(Position::new(0, 0, 4), &animation).is_none());
        assert!(loader.get_image(Position::new(3, 0, 0), &animation).is_none());
    }
}
