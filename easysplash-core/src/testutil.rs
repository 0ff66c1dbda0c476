//! In-memory ZIP writer for building test archives

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

/// Compresses `data` into a raw deflate stream
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("deflate into memory");
    encoder.finish().expect("deflate into memory")
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Builds a ZIP archive entry by entry
#[derive(Default)]
pub struct ZipBuilder {
    body: Vec<u8>,
    central_dir: Vec<u8>,
    num_entries: u16,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an uncompressed entry
    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.raw(name, 0, data, crc32(data), data.len() as u32)
    }

    /// Adds a deflate compressed entry
    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.raw(name, 8, &deflate(data), crc32(data), data.len() as u32)
    }

    /// Adds a zero sized directory placeholder
    pub fn directory(self, name: &str) -> Self {
        self.raw(name, 0, &[], 0, 0)
    }

    /// Adds an entry with the payload written as given
    pub fn raw(
        mut self,
        name: &str,
        method: u16,
        payload: &[u8],
        crc32: u32,
        uncompressed_size: u32,
    ) -> Self {
        let offset = self.body.len() as u32;
        let name = name.as_bytes();

        // local file header
        put_u32(&mut self.body, 0x0403_4b50);
        put_u16(&mut self.body, 20);
        put_u16(&mut self.body, 0);
        put_u16(&mut self.body, method);
        put_u16(&mut self.body, 0);
        put_u16(&mut self.body, 0);
        put_u32(&mut self.body, crc32);
        put_u32(&mut self.body, payload.len() as u32);
        put_u32(&mut self.body, uncompressed_size);
        put_u16(&mut self.body, name.len() as u16);
        // an extra field, so the data offset is not simply header + name
        put_u16(&mut self.body, 4);
        self.body.extend_from_slice(name);
        self.body.extend_from_slice(&[0xca, 0xfe, 0x00, 0x00]);
        self.body.extend_from_slice(payload);

        // central directory file header
        let cd = &mut self.central_dir;
        put_u32(cd, 0x0201_4b50);
        put_u16(cd, 20);
        put_u16(cd, 20);
        put_u16(cd, 0);
        put_u16(cd, method);
        put_u16(cd, 0);
        put_u16(cd, 0);
        put_u32(cd, crc32);
        put_u32(cd, payload.len() as u32);
        put_u32(cd, uncompressed_size);
        put_u16(cd, name.len() as u16);
        put_u16(cd, 0);
        put_u16(cd, 0);
        put_u16(cd, 0);
        put_u16(cd, 0);
        put_u32(cd, 0);
        put_u32(cd, offset);
        cd.extend_from_slice(name);

        self.num_entries += 1;
        self
    }

    /// Sets the archive comment written after the end of central directory
    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Returns the complete archive
    pub fn finish(self) -> Vec<u8> {
        let mut out = self.body;
        let central_dir_offset = out.len() as u32;
        out.extend_from_slice(&self.central_dir);

        put_u32(&mut out, 0x0605_4b50);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.num_entries);
        put_u16(&mut out, self.num_entries);
        put_u32(&mut out, self.central_dir.len() as u32);
        put_u32(&mut out, central_dir_offset);
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.write_u16::<LittleEndian>(value).expect("write into memory");
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.write_u32::<LittleEndian>(value).expect("write into memory");
}
