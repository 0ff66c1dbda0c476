//! Linux framebuffer display
//!
//! Opens an fbdev device, maps its memory, and draws through a software
//! canvas. `present` converts the canvas to the framebuffer's pixel layout
//! and copies it into the visible area. Only truecolor framebuffers with
//! 16, 24 or 32 bits per pixel are supported.

use crate::canvas::Canvas;
use crate::fb_bindings::*;
use crate::{Display, Error, Image, ImageHandle, Rect, Result};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

/// Default framebuffer device
pub const DEFAULT_DEVICE: &str = "/dev/fb0";

/// Controls the blinking text cursor of the framebuffer console
const CURSOR_BLINK_PATH: &str = "/sys/class/graphics/fbcon/cursor_blink";

/// How RGBA pixels are packed into framebuffer pixels
#[derive(Debug, Clone, Copy)]
struct PixelFormat {
    bytes_per_pixel: usize,
    red: fb_bitfield,
    green: fb_bitfield,
    blue: fb_bitfield,
    transp: fb_bitfield,
}

impl PixelFormat {
    fn from_var(var: &fb_var_screeninfo) -> Result<Self> {
        let bytes_per_pixel = match var.bits_per_pixel {
            16 | 24 | 32 => var.bits_per_pixel as usize / 8,
            bpp => {
                return Err(Error::UnsupportedFramebuffer(format!(
                    "{} bits per pixel",
                    bpp
                )))
            }
        };

        Ok(Self {
            bytes_per_pixel,
            red: var.red,
            green: var.green,
            blue: var.blue,
            transp: var.transp,
        })
    }

    /// Appends one packed pixel in native byte order
    fn write_pixel(&self, [r, g, b, a]: [u8; 4], out: &mut Vec<u8>) {
        let value = channel(r, &self.red)
            | channel(g, &self.green)
            | channel(b, &self.blue)
            | channel(a, &self.transp);

        let bytes = value.to_ne_bytes();
        if cfg!(target_endian = "big") {
            out.extend_from_slice(&bytes[4 - self.bytes_per_pixel..]);
        } else {
            out.extend_from_slice(&bytes[..self.bytes_per_pixel]);
        }
    }
}

/// Scales an 8-bit channel value into a bitfield
fn channel(value: u8, field: &fb_bitfield) -> u32 {
    if field.length == 0 {
        return 0;
    }
    let length = field.length.min(8);
    (u32::from(value) >> (8 - length)) << field.offset
}

pub struct FramebufferDisplay {
    // kept open for as long as the mapping exists
    _device: File,
    map: NonNull<u8>,
    map_len: usize,
    var: fb_var_screeninfo,
    line_length: usize,
    format: PixelFormat,
    canvas: RefCell<Canvas>,
    row: RefCell<Vec<u8>>,
    cursor_blink: Option<String>,
}

impl FramebufferDisplay {
    /// Opens and maps a framebuffer device, e.g. [`DEFAULT_DEVICE`]
    pub fn open(path: &Path) -> Result<Self> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;
        let fd = device.as_raw_fd();

        let mut var = fb_var_screeninfo::default();
        if unsafe { libc::ioctl(fd, FBIOGET_VSCREENINFO as _, &mut var as *mut fb_var_screeninfo) } == -1 {
            return Err(io::Error::last_os_error().into());
        }

        let mut fix = fb_fix_screeninfo::default();
        if unsafe { libc::ioctl(fd, FBIOGET_FSCREENINFO as _, &mut fix as *mut fb_fix_screeninfo) } == -1 {
            return Err(io::Error::last_os_error().into());
        }

        if fix.visual != FB_VISUAL_TRUECOLOR {
            return Err(Error::UnsupportedFramebuffer(format!(
                "visual type {} is not truecolor",
                fix.visual
            )));
        }

        let format = PixelFormat::from_var(&var)?;
        let line_length = fix.line_length as usize;

        let map_len = if fix.smem_len != 0 {
            fix.smem_len as usize
        } else {
            line_length * var.yres_virtual as usize
        };

        let visible_end = (var.yoffset + var.yres) as usize * line_length;
        let row_end = (var.xoffset + var.xres) as usize * format.bytes_per_pixel;
        if var.xres == 0 || var.yres == 0 || visible_end > map_len || row_end > line_length {
            return Err(Error::UnsupportedFramebuffer(format!(
                "{}x{} at offset {},{} does not fit {} bytes with {} bytes per line",
                var.xres, var.yres, var.xoffset, var.yoffset, map_len, line_length
            )));
        }

        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let map = NonNull::new(map.cast::<u8>())
            .ok_or_else(|| Error::UnsupportedFramebuffer("framebuffer mapped at null".into()))?;

        info!(
            "framebuffer {}: {}x{}, {} bits per pixel, {} bytes per line",
            path.display(),
            var.xres,
            var.yres,
            var.bits_per_pixel,
            line_length
        );
        debug!("pixel format: {:?}", format);

        let cursor_blink = set_cursor_blink("0");

        Ok(Self {
            _device: device,
            map,
            map_len,
            var,
            line_length,
            format,
            canvas: RefCell::new(Canvas::new(var.xres, var.yres)),
            row: RefCell::new(Vec::with_capacity(row_end)),
            cursor_blink,
        })
    }
}

/// Writes the console cursor blink setting, returning the previous one
fn set_cursor_blink(value: &str) -> Option<String> {
    let previous = std::fs::read_to_string(CURSOR_BLINK_PATH).ok();
    if let Err(e) = std::fs::write(CURSOR_BLINK_PATH, value) {
        warn!("could not set console cursor blink to {}: {}", value, e);
        return None;
    }
    previous.map(|p| p.trim().to_string())
}

impl Display for FramebufferDisplay {
    fn is_ready(&self) -> bool {
        true
    }

    fn width(&self) -> u32 {
        self.var.xres
    }

    fn height(&self) -> u32 {
        self.var.yres
    }

    fn load(&self, image: Image) -> Result<ImageHandle> {
        self.canvas.borrow_mut().load(image)
    }

    fn unload(&self, handle: ImageHandle) {
        self.canvas.borrow_mut().unload(handle);
    }

    fn draw(&self, handle: ImageHandle, rect: Rect) -> Result<()> {
        self.canvas.borrow_mut().draw(handle, rect)
    }

    fn present(&self) -> Result<()> {
        let canvas = self.canvas.borrow();
        let surface = canvas.surface();
        let mut row = self.row.borrow_mut();

        for y in 0..self.var.yres {
            row.clear();
            for x in 0..self.var.xres {
                self.format.write_pixel(surface.pixel(x, y), &mut row);
            }

            let start = (y + self.var.yoffset) as usize * self.line_length
                + self.var.xoffset as usize * self.format.bytes_per_pixel;
            // the visible area was checked against the mapping in open()
            unsafe {
                ptr::copy_nonoverlapping(row.as_ptr(), self.map.as_ptr().add(start), row.len());
            }
        }

        Ok(())
    }
}

impl Drop for FramebufferDisplay {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map.as_ptr().cast(), self.map_len);
        }
        if let Some(previous) = self.cursor_blink.take() {
            set_cursor_blink(&previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(offset: u32, length: u32) -> fb_bitfield {
        fb_bitfield {
            offset,
            length,
            msb_right: 0,
        }
    }

    #[test]
    fn test_pack_xrgb8888() {
        let format = PixelFormat {
            bytes_per_pixel: 4,
            red: field(16, 8),
            green: field(8, 8),
            blue: field(0, 8),
            transp: field(0, 0),
        };

        let mut out = Vec::new();
        format.write_pixel([0x11, 0x22, 0x33, 0xff], &mut out);
        assert_eq!(u32::from_ne_bytes([out[0], out[1], out[2], out[3]]), 0x0011_2233);
    }

    #[test]
    fn test_pack_rgb565() {
        let format = PixelFormat {
            bytes_per_pixel: 2,
            red: field(11, 5),
            green: field(5, 6),
            blue: field(0, 5),
            transp: field(0, 0),
        };

        let mut out = Vec::new();
        format.write_pixel([0xff, 0xff, 0xff, 0xff], &mut out);
        format.write_pixel([0xff, 0x00, 0x00, 0xff], &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(u16::from_ne_bytes([out[0], out[1]]), 0xffff);
        assert_eq!(u16::from_ne_bytes([out[2], out[3]]), 0xf800);
    }

    #[test]
    fn test_unsupported_depth() {
        let var = fb_var_screeninfo {
            bits_per_pixel: 8,
            ..Default::default()
        };
        assert!(matches!(
            PixelFormat::from_var(&var),
            Err(Error::UnsupportedFramebuffer(_))
        ));
    }

    #[test]
    fn test_regular_file_is_not_a_framebuffer() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(FramebufferDisplay::open(file.path()).is_err());
    }
}
