//! Animation description (`desc.txt`) and the parts/frames it refers to
//!
//! The description has a header line `<width> <height> <fps>` followed by
//! one line per part: `<type> <repeat_count> <pause> <path>`. A type of `p`
//! marks a part that has to play until complete before a stop request takes
//! effect; any other type makes the part skippable. The frames of a part are
//! the archive entries below `<path>/`, in filename order.

use crate::archive::{Archive, EntryId};
use crate::{Error, Position, Result};
use log::{debug, error, info, warn};
use std::io::{Read, Seek};

/// Name of the description entry inside the archive
pub const DESCRIPTION_FILE: &str = "desc.txt";

/// One section of the animation, played `repeat_count` times in a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Directory of the part inside the archive
    pub path: String,
    /// Frame images, in playback order
    pub frames: Vec<EntryId>,
    /// Whether a stop request waits for this part to finish
    pub play_until_complete: bool,
    /// How many times the part is played, at least 1
    pub repeat_count: u32,
}

impl Part {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// A validated animation, ready for playback
///
/// The last part loops forever during realtime playback and is never treated
/// as play-until-complete, so the animation can always be stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    fps: u32,
    output_width: u32,
    output_height: u32,
    parts: Vec<Part>,
    total_frames: usize,
}

impl Animation {
    /// Creates an animation, rejecting one that could never be played
    pub fn new(fps: u32, output_width: u32, output_height: u32, parts: Vec<Part>) -> Result<Self> {
        if fps == 0 {
            return Err(Error::InvalidAnimation("frame rate is zero".into()));
        }
        if output_width == 0 || output_height == 0 {
            return Err(Error::InvalidAnimation(format!(
                "output size {}x{} is empty",
                output_width, output_height
            )));
        }
        if parts.is_empty() {
            return Err(Error::InvalidAnimation("no parts".into()));
        }
        if let Some(part) = parts.iter().find(|p| p.frames.is_empty()) {
            return Err(Error::InvalidAnimation(format!("part '{}' has no frames", part.path)));
        }

        let total_frames = parts
            .iter()
            .map(|p| p.frame_count() * p.repeat_count as usize)
            .sum();

        Ok(Self {
            fps,
            output_width,
            output_height,
            parts,
            total_frames,
        })
    }

    /// Reads `desc.txt` and enumerates the frames of every part
    ///
    /// Malformed part lines and parts without frames are logged and left
    /// out; a missing or unusable description makes the animation invalid.
    pub fn load<R: Read + Seek>(archive: &mut Archive<R>) -> Result<Self> {
        let Some((desc_id, _)) = archive.find_entry_by_name(DESCRIPTION_FILE) else {
            error!("invalid animation: archive has no {}", DESCRIPTION_FILE);
            return Err(Error::MissingDescription);
        };

        let text = archive.uncompress(desc_id)?;
        let description = Description::parse(&String::from_utf8_lossy(&text))?;

        let mut parts = Vec::with_capacity(description.parts.len());
        for part in description.parts {
            let prefix = format!("{}/", part.path);
            let frames: Vec<EntryId> = archive
                .find_entries_with_path(&prefix)
                .map(|(id, _)| id)
                .collect();

            if frames.is_empty() {
                error!("part \"{}\" has no frames - skipping it", part.path);
                continue;
            }

            debug!(
                "part \"{}\": {} frames, repeated {} times{}",
                part.path,
                frames.len(),
                part.repeat_count,
                if part.play_until_complete { ", play until complete" } else { "" }
            );

            parts.push(Part {
                path: part.path,
                frames,
                play_until_complete: part.play_until_complete,
                repeat_count: part.repeat_count,
            });
        }

        let animation = Self::new(description.fps, description.width, description.height, parts)
            .inspect_err(|e| error!("{}", e))?;

        info!(
            "loaded animation: {}x{} @ {} fps, {} parts, {} frames",
            animation.output_width,
            animation.output_height,
            animation.fps,
            animation.parts.len(),
            animation.total_frames
        );

        Ok(animation)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Width of the rectangle frames are drawn into
    pub fn output_width(&self) -> u32 {
        self.output_width
    }

    /// Height of the rectangle frames are drawn into
    pub fn output_height(&self) -> u32 {
        self.output_height
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Sum of frame count times repeat count over all parts
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn is_last_part(&self, part_index: usize) -> bool {
        part_index + 1 >= self.parts.len()
    }

    /// Whether a stop request has to wait while playing `part_index`
    ///
    /// Always false for the last part, which loops forever.
    pub fn must_complete(&self, part_index: usize) -> bool {
        !self.is_last_part(part_index)
            && self
                .parts
                .get(part_index)
                .is_some_and(|p| p.play_until_complete)
    }

    /// Looks up the frame image at a position
    ///
    /// Returns `None` with a warning when the position lies outside the
    /// animation.
    pub fn frame_at(&self, position: &Position) -> Option<EntryId> {
        let Some(part) = self.parts.get(position.part) else {
            warn!(
                "part index {} is out of range (animation has {} parts)",
                position.part,
                self.parts.len()
            );
            return None;
        };

        let frame = part.frames.get(position.frame).copied();
        if frame.is_none() {
            warn!(
                "frame index {} is out of range (part {} has {} frames)",
                position.frame,
                position.part,
                part.frames.len()
            );
        }
        frame
    }
}

/// Parsed contents of `desc.txt`, before frames are looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub parts: Vec<PartDescription>,
}

/// One part line of `desc.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescription {
    pub path: String,
    pub play_until_complete: bool,
    pub repeat_count: u32,
}

impl Description {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();

        let header = lines.next().unwrap_or_default();
        let mut fields = header.split_whitespace().map(str::parse::<u32>);
        let (Some(Ok(width)), Some(Ok(height)), Some(Ok(fps))) =
            (fields.next(), fields.next(), fields.next())
        else {
            error!("invalid description header \"{}\"", header);
            return Err(Error::InvalidDescription(format!(
                "expected '<width> <height> <fps>', got '{}'",
                header
            )));
        };

        let parts = lines
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| {
                // line numbers are 1-based and the header is line 1
                PartDescription::parse(line)
                    .inspect_err(|reason| {
                        error!("desc.txt line {}: {} - skipping it", index + 2, reason)
                    })
                    .ok()
            })
            .collect();

        Ok(Self {
            width,
            height,
            fps,
            parts,
        })
    }
}

impl PartDescription {
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut tokens = line.split_whitespace();

        let kind = tokens.next().ok_or("missing part type")?;
        let repeat_count = tokens
            .next()
            .ok_or("missing repeat count")?
            .parse::<u32>()
            .map_err(|e| format!("invalid repeat count: {}", e))?;
        // the pause value is part of the format but playback ignores it
        tokens
            .next()
            .ok_or("missing pause")?
            .parse::<i64>()
            .map_err(|e| format!("invalid pause: {}", e))?;
        let path = tokens.next().ok_or("missing path")?;

        let path = path.strip_prefix("./").unwrap_or(path).trim_end_matches('/');
        if path.is_empty() {
            return Err("empty path".into());
        }

        Ok(Self {
            path: path.to_string(),
            play_until_complete: kind == "p",
            repeat_count: repeat_count.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ZipBuilder;
    use std::io::Cursor;

    fn archive_with(desc: &str, parts: &[(&str, usize)]) -> Archive<Cursor<Vec<u8>>> {
        let mut builder = ZipBuilder::new().stored(DESCRIPTION_FILE, desc.as_bytes());
        for (path, frames) in parts {
            builder = builder.directory(&format!("{}/", path));
            for i in 0..*frames {
                builder = builder.deflated(&format!("{}/{:04}.png", path, i + 1), b"png");
            }
        }
        Archive::open(Cursor::new(builder.finish())).unwrap()
    }

    #[test]
    fn test_parse_description() {
        let desc = Description::parse("800 600 25\np 1 0 part0\n\nc 0 5 ./part1/\n").unwrap();

        assert_eq!((desc.width, desc.height, desc.fps), (800, 600, 25));
        assert_eq!(
            desc.parts,
            vec![
                PartDescription {
                    path: "part0".into(),
                    play_until_complete: true,
                    repeat_count: 1
                },
                PartDescription {
                    path: "part1".into(),
                    play_until_complete: false,
                    repeat_count: 1
                },
            ]
        );
    }

    #[test]
    fn test_malformed_part_lines_are_skipped() {
        let desc = Description::parse("10 10 10\np 1 0\nx y 0 part\np 2 0 good\np 1 z other\n").unwrap();
        assert_eq!(desc.parts.len(), 1);
        assert_eq!(desc.parts[0].path, "good");
        assert_eq!(desc.parts[0].repeat_count, 2);
    }

    #[test]
    fn test_bad_header_is_rejected() {
        assert!(matches!(
            Description::parse("800 600\np 1 0 part0\n"),
            Err(Error::InvalidDescription(_))
        ));
        assert!(Description::parse("").is_err());
    }

    #[test]
    fn test_load_counts_total_frames() {
        let mut archive = archive_with(
            "320 240 30\np 1 0 part0\np 3 0 part1\nc 2 0 part2\n",
            &[("part0", 5), ("part1", 11), ("part2", 6)],
        );

        let animation = Animation::load(&mut archive).unwrap();
        let frame_counts: Vec<usize> = animation.parts().iter().map(Part::frame_count).collect();

        assert_eq!(frame_counts, vec![5, 11, 6]);
        assert_eq!(animation.total_frames(), 5 + 33 + 12);
        assert_eq!(animation.fps(), 30);
        assert!(animation.parts()[0].play_until_complete);
        assert!(!animation.parts()[2].play_until_complete);
    }

    #[test]
    fn test_frames_follow_filename_order() {
        let mut archive = archive_with("10 10 10\nc 1 0 part0\n", &[("part0", 3)]);
        let animation = Animation::load(&mut archive).unwrap();

        let names: Vec<&str> = animation.parts()[0]
            .frames
            .iter()
            .map(|id| archive.entry(*id).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["part0/0001.png", "part0/0002.png", "part0/0003.png"]);
    }

    #[test]
    fn test_part_without_frames_is_dropped() {
        let mut archive = archive_with(
            "10 10 10\nc 1 0 part0\nc 1 0 missing\n",
            &[("part0", 2)],
        );
        let animation = Animation::load(&mut archive).unwrap();
        assert_eq!(animation.parts().len(), 1);
        assert_eq!(animation.parts()[0].path, "part0");
    }

    #[test]
    fn test_invalid_animations() {
        let mut archive = archive_with("10 10 0\nc 1 0 part0\n", &[("part0", 2)]);
        assert!(matches!(
            Animation::load(&mut archive),
            Err(Error::InvalidAnimation(_))
        ));

        let mut archive = archive_with("10 10 10\nc 1 0 missing\n", &[("part0", 2)]);
        assert!(matches!(
            Animation::load(&mut archive),
            Err(Error::InvalidAnimation(_))
        ));

        let bytes = ZipBuilder::new().stored("part0/0001.png", b"png").finish();
        let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            Animation::load(&mut archive),
            Err(Error::MissingDescription)
        ));
    }

    #[test]
    fn test_last_part_never_blocks_stop() {
        let mut archive = archive_with(
            "10 10 10\np 1 0 part0\np 1 0 part1\n",
            &[("part0", 2), ("part1", 2)],
        );
        let animation = Animation::load(&mut archive).unwrap();

        assert!(animation.must_complete(0));
        assert!(!animation.must_complete(1));
        assert!(animation.is_last_part(1));
    }

    #[test]
    fn test_frame_at_out_of_range() {
        let mut archive = archive_with("10 10 10\nc 1 0 part0\n", &[("part0", 2)]);
        let animation = Animation::load(&mut archive).unwrap();

        assert!(animation.frame_at(&Position::new(0, 0, 1)).is_some());
        assert!(animation.frame_at(&Position::new(0, 0, 2)).is_none());
        assert!(animation.frame_at(&Position::new(1, 0, 0)).is_none());
    }
}
