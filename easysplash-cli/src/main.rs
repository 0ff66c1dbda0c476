//! EasySplash CLI Tool
//!
//! Command-line interface for playing boot animations and reporting boot
//! progress to a running player.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use easysplash_core::{Animation, Archive};
use easysplash_player::{
    CancelToken, EventLoop, PlaybackMode, PlayerConfig, DEFAULT_CACHE_FRAMES, DEFAULT_FIFO_PATH,
};
use easysplash_render::{Display, MemoryDisplay, PngDecoder};
use log::{debug, info};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Searched in order when no archive is given
const DEFAULT_ARCHIVES: &[&str] = &[
    "/lib/splash/oem/bootanimation.zip",
    "/lib/splash/bootanimation.zip",
];

#[derive(Parser, Debug)]
#[command(name = "easysplash")]
#[command(about = "EasySplash - animated boot splash screens")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a boot animation until boot completes
    Play {
        /// Animation archive (default: first of /lib/splash/oem/bootanimation.zip,
        /// /lib/splash/bootanimation.zip)
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Advance only when boot progress is reported
        #[arg(long)]
        non_realtime: bool,

        /// Control FIFO path
        #[arg(long, default_value = DEFAULT_FIFO_PATH)]
        fifo: PathBuf,

        /// Maximum number of frames kept loaded
        #[arg(long, default_value_t = NonZeroUsize::new(DEFAULT_CACHE_FRAMES).unwrap_or(NonZeroUsize::MIN))]
        cache_frames: NonZeroUsize,

        /// Where frames are shown
        #[arg(long, value_enum, default_value_t = Backend::Fbdev)]
        backend: Backend,

        /// Framebuffer device
        #[arg(long, default_value = "/dev/fb0")]
        fbdev: PathBuf,

        /// Screen size of the headless backend
        #[arg(long, default_value = "640x480", value_parser = parse_size)]
        headless_size: (u32, u32),

        /// Save the last frame shown by the headless backend as PNG
        #[arg(long)]
        save_last: Option<PathBuf>,
    },

    /// Report boot progress to a running player
    Ctl {
        /// Boot progress in percent; 100 stops the animation
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        progress: u8,

        /// Control FIFO path
        #[arg(long, default_value = DEFAULT_FIFO_PATH)]
        fifo: PathBuf,
    },

    /// Show information about an animation archive
    Info {
        /// Animation archive
        archive: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Linux framebuffer device
    Fbdev,
    /// In-memory canvas, nothing is shown
    Headless,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("command-line args: {:?}", cli);

    match cli.command {
        Commands::Play {
            archive,
            non_realtime,
            fifo,
            cache_frames,
            backend,
            fbdev,
            headless_size,
            save_last,
        } => {
            let config = PlayerConfig {
                mode: if non_realtime {
                    PlaybackMode::NonRealtime
                } else {
                    PlaybackMode::Realtime
                },
                cache_capacity: cache_frames,
                fifo_path: fifo,
            };
            play(archive, &config, backend, &fbdev, headless_size, save_last)?
        }

        Commands::Ctl { progress, fifo } => send_progress(progress, &fifo)?,

        Commands::Info { archive, json } => show_info(&archive, json)?,
    }

    Ok(())
}

/// 0 = warn, 1 = info, 2 = debug, 3+ = trace; `RUST_LOG` takes precedence
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = width.parse::<u32>().map_err(|e| format!("invalid width: {}", e))?;
    let height = height.parse::<u32>().map_err(|e| format!("invalid height: {}", e))?;
    if width == 0 || height == 0 {
        return Err("size must not be zero".to_string());
    }
    Ok((width, height))
}

fn find_archive() -> Result<PathBuf> {
    DEFAULT_ARCHIVES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .with_context(|| format!("No animation found, looked for {}", DEFAULT_ARCHIVES.join(", ")))
}

fn open_archive(path: &Path) -> Result<Archive<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Archive::open(BufReader::new(file))
        .with_context(|| format!("Failed to read animation archive {}", path.display()))
}

#[cfg(target_os = "linux")]
fn open_framebuffer(path: &Path) -> Result<Rc<dyn Display>> {
    let display = easysplash_render::FramebufferDisplay::open(path)
        .with_context(|| format!("Failed to open framebuffer {}", path.display()))?;
    Ok(Rc::new(display))
}

#[cfg(not(target_os = "linux"))]
fn open_framebuffer(_path: &Path) -> Result<Rc<dyn Display>> {
    bail!("The framebuffer backend is only available on Linux")
}

fn play(
    archive: Option<PathBuf>,
    config: &PlayerConfig,
    backend: Backend,
    fbdev: &Path,
    headless_size: (u32, u32),
    save_last: Option<PathBuf>,
) -> Result<()> {
    let archive_path = match archive {
        Some(path) => path,
        None => find_archive()?,
    };
    info!("playing {}", archive_path.display());

    let archive = open_archive(&archive_path)?;
    let cancel = CancelToken::sigint().context("Failed to set up SIGINT handling")?;

    let mut headless = None;
    let display: Rc<dyn Display> = match backend {
        Backend::Fbdev => open_framebuffer(fbdev)?,
        Backend::Headless => {
            let display = Rc::new(MemoryDisplay::new(headless_size.0, headless_size.1));
            headless = Some(Rc::clone(&display));
            display
        }
    };

    let mut event_loop = EventLoop::setup(config, archive, Box::new(PngDecoder), display, cancel)
        .context("Failed to start playback")?;
    let reason = event_loop.run().context("Playback failed")?;
    info!("playback stopped: {:?}", reason);
    drop(event_loop);

    if let Some(path) = save_last {
        let Some(display) = headless else {
            bail!("--save-last requires the headless backend");
        };
        let Some(frame) = display.last_presented().and_then(|image| image.to_rgba_image()) else {
            bail!("No frame was shown");
        };
        frame
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!("Saved last frame to {}", path.display());
    }

    Ok(())
}

fn send_progress(progress: u8, fifo: &Path) -> Result<()> {
    // non-blocking open fails instead of hanging when no player is running
    let mut writer = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(fifo)
        .with_context(|| format!("Could not connect to splash FIFO {}", fifo.display()))?;

    writer
        .write_all(&[progress])
        .context("Failed to send progress")?;
    debug!("sent progress {} to {}", progress, fifo.display());

    Ok(())
}

/// What `info --json` prints
#[derive(Serialize, Debug)]
struct AnimationInfo {
    width: u32,
    height: u32,
    fps: u32,
    total_frames: usize,
    parts: Vec<PartInfo>,
}

#[derive(Serialize, Debug)]
struct PartInfo {
    path: String,
    repeat_count: u32,
    play_until_complete: bool,
    frame_count: usize,
    frames: Vec<String>,
}

impl AnimationInfo {
    fn new<R>(animation: &Animation, archive: &Archive<R>) -> Self {
        let parts = animation
            .parts()
            .iter()
            .map(|part| PartInfo {
                path: part.path.clone(),
                repeat_count: part.repeat_count,
                play_until_complete: part.play_until_complete,
                frame_count: part.frame_count(),
                frames: part
                    .frames
                    .iter()
                    .filter_map(|id| archive.entry(*id))
                    .map(|entry| entry.name.clone())
                    .collect(),
            })
            .collect();

        Self {
            width: animation.output_width(),
            height: animation.output_height(),
            fps: animation.fps(),
            total_frames: animation.total_frames(),
            parts,
        }
    }
}

fn show_info(path: &Path, json: bool) -> Result<()> {
    let mut archive = open_archive(path)?;
    let animation = Animation::load(&mut archive).context("Invalid animation")?;

    if json {
        let info = AnimationInfo::new(&animation, &archive);
        let output = serde_json::to_string_pretty(&info).context("Failed to serialize")?;
        println!("{}", output);
        return Ok(());
    }

    println!("Animation: {}", path.display());
    println!(
        "  Output: {}x{} @ {} fps",
        animation.output_width(),
        animation.output_height(),
        animation.fps()
    );
    println!("  Parts:");
    for (i, part) in animation.parts().iter().enumerate() {
        println!(
            "    [{}] {}: {} frames x {}{}",
            i,
            part.path,
            part.frame_count(),
            part.repeat_count,
            if part.play_until_complete {
                ", plays until complete"
            } else {
                ""
            }
        );
    }
    println!("  Total frames: {}", animation.total_frames());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert_eq!(parse_size("800X600"), Ok((800, 600)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from(["easysplash", "-vv", "play", "--non-realtime", "--backend", "headless"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Play {
                non_realtime,
                backend,
                cache_frames,
                ..
            } => {
                assert!(non_realtime);
                assert_eq!(backend, Backend::Headless);
                assert_eq!(cache_frames.get(), DEFAULT_CACHE_FRAMES);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["easysplash", "ctl", "101"]).is_err());
        assert!(Cli::try_parse_from(["easysplash", "ctl", "100"]).is_ok());
    }

    #[test]
    fn test_info_json_lists_frames() {
        let bytes = easysplash_core::testutil::ZipBuilder::new()
            .stored("desc.txt", b"320 240 25\np 2 0 intro\nc 1 0 loop\n")
            .stored("intro/0001.png", b"a")
            .stored("intro/0002.png", b"b")
            .stored("loop/0001.png", b"c")
            .finish();
        let mut archive = Archive::open(std::io::Cursor::new(bytes)).unwrap();
        let animation = Animation::load(&mut archive).unwrap();

        let value = serde_json::to_value(AnimationInfo::new(&animation, &archive)).unwrap();

        assert_eq!(value["total_frames"], 5);
        assert_eq!(value["fps"], 25);
        assert_eq!(value["parts"][0]["path"], "intro");
        assert_eq!(value["parts"][0]["frame_count"], 2);
        assert_eq!(value["parts"][0]["repeat_count"], 2);
        assert_eq!(value["parts"][0]["play_until_complete"], true);
        assert_eq!(value["parts"][0]["frames"][1], "intro/0002.png");
        assert_eq!(value["parts"][1]["frames"][0], "loop/0001.png");
    }

    #[test]
    fn test_ctl_without_player() {
        let dir = tempfile::tempdir().unwrap();
        assert!(send_progress(50, &dir.path().join("missing")).is_err());
    }
}
