//! Playback position within an animation

use crate::Animation;

/// Where playback currently is: part, repetition of that part, and frame
///
/// Positions order by part first, then repetition, then frame, which is the
/// order playback visits them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Index of the part
    pub part: usize,
    /// Repetition of the part currently playing, starting at 0
    pub loop_index: u32,
    /// Index of the frame within the part
    pub frame: usize,
}

impl Position {
    pub fn new(part: usize, loop_index: u32, frame: usize) -> Self {
        Self {
            part,
            loop_index,
            frame,
        }
    }

    /// Moves forward by `frames` frames
    ///
    /// A part advances to the next once it has been played `repeat_count`
    /// times. The last part wraps around instead, so playback never runs
    /// past the end of the animation.
    pub fn advance(self, animation: &Animation, frames: usize) -> Self {
        let mut position = self;
        position.frame += frames;

        while let Some(part) = animation.parts().get(position.part) {
            let frame_count = part.frame_count();
            if frame_count == 0 || position.frame < frame_count {
                break;
            }

            if animation.is_last_part(position.part) {
                position.frame %= frame_count;
                break;
            }

            position.frame -= frame_count;
            position.loop_index += 1;
            if position.loop_index >= part.repeat_count {
                position.loop_index = 0;
                position.part += 1;
            }
        }

        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use crate::testutil::ZipBuilder;
    use std::io::Cursor;

    /// Parts of (frame count, repeat count)
    fn animation(parts: &[(usize, u32)]) -> Animation {
        let mut desc = String::from("10 10 10\n");
        let mut builder = ZipBuilder::new();
        for (index, (frames, repeat)) in parts.iter().enumerate() {
            desc.push_str(&format!("c {} 0 part{}\n", repeat, index));
            for frame in 0..*frames {
                builder = builder.stored(&format!("part{}/{:04}.png", index, frame), b"x");
            }
        }
        let bytes = builder.stored("desc.txt", desc.as_bytes()).finish();
        let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
        Animation::load(&mut archive).unwrap()
    }

    #[test]
    fn test_ordering() {
        assert!(Position::new(1, 0, 0) > Position::new(0, 5, 9));
        assert!(Position::new(0, 1, 0) > Position::new(0, 0, 9));
        assert!(Position::new(0, 0, 2) > Position::new(0, 0, 1));
        assert_eq!(Position::default(), Position::new(0, 0, 0));
    }

    #[test]
    fn test_advance_within_part() {
        let anim = animation(&[(5, 1), (4, 1)]);
        assert_eq!(Position::default().advance(&anim, 3), Position::new(0, 0, 3));
    }

    #[test]
    fn test_advance_repeats_then_moves_to_next_part() {
        let anim = animation(&[(5, 1), (11, 3), (6, 2)]);

        let pos = Position::default().advance(&anim, 5);
        assert_eq!(pos, Position::new(1, 0, 0));

        let pos = pos.advance(&anim, 12);
        assert_eq!(pos, Position::new(1, 1, 1));

        let pos = pos.advance(&anim, 21);
        assert_eq!(pos, Position::new(2, 0, 0));
    }

    #[test]
    fn test_advance_decomposes() {
        let anim = animation(&[(5, 1), (11, 3), (6, 2)]);
        let start = Position::new(0, 0, 1);

        for (a, b) in [(0, 0), (1, 2), (2, 1), (3, 0)] {
            assert_eq!(
                start.advance(&anim, a + b),
                start.advance(&anim, a).advance(&anim, b)
            );
        }

        // crossing part boundaries and repetitions
        for (a, b) in [(4, 1), (7, 20), (30, 13)] {
            assert_eq!(
                start.advance(&anim, a + b),
                start.advance(&anim, a).advance(&anim, b)
            );
        }
    }

    #[test]
    fn test_last_part_wraps() {
        let anim = animation(&[(2, 1), (4, 1)]);

        let pos = Position::new(1, 0, 3).advance(&anim, 5);
        assert_eq!(pos, Position::new(1, 0, 0));

        // the last part ignores its repeat count and never advances further
        let anim = animation(&[(2, 1), (4, 2)]);
        let pos = Position::new(1, 0, 3).advance(&anim, 1000);
        assert_eq!(pos.part, 1);
        assert_eq!(pos.loop_index, 0);
        assert!(pos.frame < 4);
    }

    #[test]
    fn test_advance_is_monotonic_until_last_part() {
        let anim = animation(&[(3, 2), (2, 2), (5, 1)]);
        let mut pos = Position::default();
        for _ in 0..10 {
            let next = pos.advance(&anim, 1);
            assert!(next > pos);
            pos = next;
        }
        assert_eq!(pos, Position::new(2, 0, 0));
    }
}
