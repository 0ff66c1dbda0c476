//! Playback scheduler
//!
//! The event loop waits on the cancellation token, the control channel and,
//! in realtime mode, the next frame deadline. Whatever wakes it first is
//! handled, cancellation before control messages before the frame timer.
//!
//! In realtime mode the first frame is drawn right away and every following
//! one a frame period after the previous draw started, so a slow draw
//! shortens the next wait instead of delaying the whole animation. In
//! non-realtime mode the animation only moves when progress is reported:
//! progress P selects absolute frame `P * (total_frames - 1) / 100`, and
//! progress that does not move forward is ignored.
//!
//! Progress 100 requests a stop. The loop honors it immediately in
//! non-realtime mode; in realtime mode it first lets a play-until-complete
//! part run to its end.

use crate::{CancelToken, ControlChannel, Error, PlaybackMode, PlayerConfig, Result};
use easysplash_core::{Animation, Archive, Position};
use easysplash_render::{Display, FrameLoader, ImageDecoder, Rect};
use log::{debug, error, info, trace, warn};
use std::io::{self, Read, Seek};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Why the event loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A requested stop took effect
    Completed,
    /// The cancellation token fired
    Cancelled,
    /// The control channel failed or was closed
    ControlLost,
}

pub struct EventLoop<R> {
    animation: Animation,
    frames: FrameLoader<R>,
    display: Rc<dyn Display>,
    control: ControlChannel,
    cancel: CancelToken,
    mode: PlaybackMode,
    rect: Rect,
    frame_period: Duration,
    position: Position,
    /// Absolute frame index reached through progress messages
    reached_frame: usize,
    /// When the next frame is due; `None` waits for control messages only
    next_frame_at: Option<Instant>,
    stop_requested: bool,
    cancelled: bool,
}

impl<R: Read + Seek> EventLoop<R> {
    pub fn new(
        animation: Animation,
        frames: FrameLoader<R>,
        display: Rc<dyn Display>,
        control: ControlChannel,
        cancel: CancelToken,
        mode: PlaybackMode,
    ) -> Result<Self> {
        if !display.is_ready() {
            return Err(Error::DisplayNotReady);
        }

        let rect = Rect::centered(
            display.width(),
            display.height(),
            animation.output_width(),
            animation.output_height(),
        );
        let frame_period = Duration::from_secs(1) / animation.fps();

        let next_frame_at = match mode {
            PlaybackMode::Realtime => Some(Instant::now()),
            PlaybackMode::NonRealtime => None,
        };

        debug!(
            "{:?} playback of {} frames, drawn at {:?}",
            mode,
            animation.total_frames(),
            rect
        );

        Ok(Self {
            animation,
            frames,
            display,
            control,
            cancel,
            mode,
            rect,
            frame_period,
            position: Position::default(),
            reached_frame: 0,
            next_frame_at,
            stop_requested: false,
            cancelled: false,
        })
    }

    /// Loads the animation from `archive` and prepares playback
    ///
    /// Creates the control FIFO configured in `config`. Everything acquired
    /// so far is released again if a later step fails.
    pub fn setup(
        config: &PlayerConfig,
        mut archive: Archive<R>,
        decoder: Box<dyn ImageDecoder>,
        display: Rc<dyn Display>,
        cancel: CancelToken,
    ) -> Result<Self> {
        if !display.is_ready() {
            return Err(Error::DisplayNotReady);
        }

        let animation = Animation::load(&mut archive)?;
        info!(
            "animation {}x{} at {} fps, {} parts, {} frames",
            animation.output_width(),
            animation.output_height(),
            animation.fps(),
            animation.parts().len(),
            animation.total_frames()
        );

        let control = ControlChannel::create_fifo(&config.fifo_path)?;
        let frames = FrameLoader::new(archive, decoder, Rc::clone(&display), config.cache_capacity);

        Self::new(animation, frames, display, control, cancel, config.mode)
    }

    /// Runs until a stop takes effect, cancellation, or loss of the
    /// control channel
    pub fn run(&mut self) -> Result<StopReason> {
        loop {
            if let Some(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Checks the stop conditions, then waits for and handles one event
    pub fn step(&mut self) -> Result<Option<StopReason>> {
        if self.cancelled {
            info!("cancelled, stopping playback");
            return Ok(Some(StopReason::Cancelled));
        }
        if self.should_stop() {
            info!("stop requested, stopping playback at {:?}", self.position);
            return Ok(Some(StopReason::Completed));
        }

        let mut fds = [
            libc::pollfd {
                fd: self.cancel.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.control.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, self.timeout()) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err.into());
        }

        // hang-up or error on the token counts as cancellation too
        if fds[0].revents != 0 {
            self.cancelled = true;
        } else if fds[1].revents != 0 {
            match self.control.read_progress() {
                Ok(Some(progress)) => self.handle_progress(progress),
                Ok(None) => {}
                Err(e) => {
                    error!("could not read from control channel: {}", e);
                    return Ok(Some(StopReason::ControlLost));
                }
            }
        } else if self.frame_due() {
            self.next_frame();
        }

        Ok(None)
    }

    /// Poll timeout in milliseconds, rounded up so frames are never early
    fn timeout(&self) -> libc::c_int {
        match self.next_frame_at {
            None => -1,
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                let millis = wait.as_micros().div_ceil(1000);
                libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
            }
        }
    }

    fn frame_due(&self) -> bool {
        self.next_frame_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn should_stop(&self) -> bool {
        self.stop_requested
            && (self.mode == PlaybackMode::NonRealtime || !self.animation.must_complete(self.position.part))
    }

    fn next_frame(&mut self) {
        let started = Instant::now();
        self.draw();
        let cost = started.elapsed();
        if cost > self.frame_period {
            debug!("drawing took {:?}, longer than a frame", cost);
        }

        self.next_frame_at = Some(started + self.frame_period);
        self.position = self.position.advance(&self.animation, 1);
    }

    fn handle_progress(&mut self, progress: u8) {
        trace!("progress {}", progress);

        if self.mode == PlaybackMode::NonRealtime {
            let total = self.animation.total_frames();
            let target = usize::from(progress) * (total - 1) / 100;
            if target > self.reached_frame {
                self.position = self.position.advance(&self.animation, target - self.reached_frame);
                self.reached_frame = target;
                self.draw();
            } else {
                trace!("frame {} already reached, ignoring progress {}", target, progress);
            }
        }

        if progress == 100 && !self.stop_requested {
            info!("boot complete, stop requested");
            self.stop_requested = true;
        }
    }

    fn draw(&mut self) {
        let Some(handle) = self.frames.get_image(self.position, &self.animation) else {
            return;
        };

        if let Err(e) = self.display.draw(handle, self.rect) {
            warn!("could not draw frame at {:?}: {}", self.position, e);
            return;
        }
        if let Err(e) = self.display.present() {
            warn!("could not present frame at {:?}: {}", self.position, e);
        }
    }
}

impl<R> EventLoop<R> {
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }
}
