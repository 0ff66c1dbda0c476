//! ZIP archive reader for boot animation packages
//!
//! Only the central directory is parsed when the archive is opened. The data
//! of an entry is located and decompressed on demand, so opening a large
//! animation is cheap and frames are pulled out one at a time.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use log::{debug, error, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Signature of the end of central directory record
const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x0605_4b50;

/// Signature of each central directory file header
const CENTRAL_DIR_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// Signature of each local file header
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Size of the end of central directory record without the trailing comment
const END_OF_CENTRAL_DIR_SIZE: u64 = 22;

/// Largest comment a ZIP file can carry after the end of central directory record
const MAX_COMMENT_SIZE: u64 = 0xffff;

/// How many bytes are read per step while searching backwards for the record
const SEARCH_CHUNK_SIZE: u64 = 0x400;

/// Size of a local file header without its filename and extra field
const LOCAL_HEADER_SIZE: u64 = 30;

/// Compression methods the reader can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Method 0, data is stored verbatim
    Stored,
    /// Method 8, raw deflate stream
    Deflated,
}

impl CompressionMethod {
    /// Maps the numeric method of a ZIP header, `None` if unsupported
    pub fn from_u16(method: u16) -> Option<Self> {
        match method {
            0 => Some(Self::Stored),
            8 => Some(Self::Deflated),
            _ => None,
        }
    }

    /// Returns the numeric method as written in ZIP headers
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }
}

/// A single file recorded in the central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Filename with any leading `./` removed
    pub name: String,
    /// How the entry data is compressed
    pub compression: CompressionMethod,
    /// CRC32 of the uncompressed data
    pub crc32: u32,
    /// Size of the data as stored in the archive
    pub compressed_size: u32,
    /// Size of the data once extracted
    pub uncompressed_size: u32,
    /// Offset of the entry's local file header from the start of the archive
    pub local_header_offset: u32,
}

impl ArchiveEntry {
    /// Zero sized entries are directory placeholders
    pub fn is_directory(&self) -> bool {
        self.compressed_size == 0
    }
}

/// Opaque reference to an entry of an [`Archive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

/// A ZIP archive opened for reading
///
/// Entries are kept sorted by filename. Frame files are named so that this
/// order matches the playback order (`0001.png`, `0002.png`, ...).
pub struct Archive<R> {
    reader: R,
    entries: Vec<ArchiveEntry>,
    /// Offsets of entry data, resolved from the local headers on first use
    data_offsets: HashMap<EntryId, u64>,
}

impl<R: Read + Seek> Archive<R> {
    /// Opens an archive by reading its central directory
    ///
    /// The reader is dropped together with the archive, including when
    /// opening fails.
    pub fn open(mut reader: R) -> Result<Self> {
        let end_of_central_dir = find_end_of_central_directory(&mut reader)?;

        // skip signature, disk number, disk with the central directory start,
        // and the number of entries on this disk
        reader.seek(SeekFrom::Start(end_of_central_dir + 4 + 3 * 2))?;
        let num_entries = reader.read_u16::<LittleEndian>()?;
        let central_dir_size = reader.read_u32::<LittleEndian>()?;
        let central_dir_offset = reader.read_u32::<LittleEndian>()?;

        debug!(
            "central directory: {} entries, {} bytes at offset {}",
            num_entries, central_dir_size, central_dir_offset
        );

        if u64::from(central_dir_offset) + u64::from(central_dir_size) > end_of_central_dir {
            error!("central directory overlaps the end of central directory record");
            return Err(Error::CorruptCentralDirectory(format!(
                "directory at offset {} with size {} extends past offset {}",
                central_dir_offset, central_dir_size, end_of_central_dir
            )));
        }

        let mut central_dir = vec![0u8; central_dir_size as usize];
        reader.seek(SeekFrom::Start(u64::from(central_dir_offset)))?;
        reader.read_exact(&mut central_dir)?;

        let entries = scan_central_directory(&central_dir, num_entries, central_dir_offset)?
            .into_values()
            .collect();

        Ok(Self {
            reader,
            entries,
            data_offsets: HashMap::new(),
        })
    }

    /// Extracts the data of an entry
    ///
    /// Failures to inflate the data are logged and reported as
    /// [`Error::Inflate`] or [`Error::SizeMismatch`]; callers treat them as
    /// the entry being unavailable.
    pub fn uncompress(&mut self, id: EntryId) -> Result<Vec<u8>> {
        let offset = self.data_offset(id)?;
        let Self {
            reader, entries, ..
        } = self;
        let entry = &entries[id.0];

        reader.seek(SeekFrom::Start(offset))?;

        let data = match entry.compression {
            CompressionMethod::Stored => {
                let mut data = vec![0u8; entry.uncompressed_size as usize];
                reader.read_exact(&mut data)?;
                data
            }
            CompressionMethod::Deflated => {
                let mut compressed = vec![0u8; entry.compressed_size as usize];
                reader.read_exact(&mut compressed)?;
                inflate(entry, &compressed)?
            }
        };

        let mut crc = flate2::Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            warn!(
                "CRC32 mismatch for \"{}\": expected {:#010x}, got {:#010x}",
                entry.name,
                entry.crc32,
                crc.sum()
            );
        }

        Ok(data)
    }

    /// Returns the offset of an entry's data, reading its local header once
    fn data_offset(&mut self, id: EntryId) -> Result<u64> {
        if let Some(offset) = self.data_offsets.get(&id) {
            return Ok(*offset);
        }

        let entry = self
            .entries
            .get(id.0)
            .ok_or_else(|| Error::EntryNotFound(format!("#{}", id.0)))?;
        let header_offset = u64::from(entry.local_header_offset);

        self.reader.seek(SeekFrom::Start(header_offset))?;
        let signature = self.reader.read_u32::<LittleEndian>()?;
        if signature != LOCAL_HEADER_SIGNATURE {
            error!("entry \"{}\" has no valid local header", entry.name);
            return Err(Error::CorruptCentralDirectory(format!(
                "bad local header signature {:#010x} for '{}'",
                signature, entry.name
            )));
        }

        // skip required version, bit flag, compression method, last mod time
        // & date, crc32, compressed & uncompressed size; the central directory
        // already has all of this
        self.reader.seek(SeekFrom::Current(5 * 2 + 3 * 4))?;
        let filename_len = self.reader.read_u16::<LittleEndian>()?;
        let extra_field_len = self.reader.read_u16::<LittleEndian>()?;

        let offset =
            header_offset + LOCAL_HEADER_SIZE + u64::from(filename_len) + u64::from(extra_field_len);
        trace!("data of \"{}\" starts at offset {}", entry.name, offset);

        self.data_offsets.insert(id, offset);
        Ok(offset)
    }
}

impl<R> Archive<R> {
    /// All entries, sorted by filename
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Gets an entry by its id
    pub fn entry(&self, id: EntryId) -> Option<&ArchiveEntry> {
        self.entries.get(id.0)
    }

    /// Finds a single entry by filename
    pub fn find_entry_by_name(&self, name: &str) -> Option<(EntryId, &ArchiveEntry)> {
        let name = normalize_path(name);
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|index| (EntryId(index), &self.entries[index]))
    }

    /// Iterates, in filename order, over the non-empty entries whose name
    /// starts with `path`
    pub fn find_entries_with_path<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = (EntryId, &'a ArchiveEntry)> + 'a {
        let path = normalize_path(path);
        // entries sharing a prefix are contiguous in sorted order
        let start = self
            .entries
            .partition_point(|entry| entry.name.as_str() < path);

        self.entries[start..]
            .iter()
            .enumerate()
            .take_while(move |(_, entry)| entry.name.starts_with(path))
            .filter(|(_, entry)| !entry.is_directory())
            .map(move |(index, entry)| (EntryId(start + index), entry))
    }
}

/// Removes a leading `./` from a path
fn normalize_path(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

fn inflate(entry: &ArchiveEntry, compressed: &[u8]) -> Result<Vec<u8>> {
    let expected = u64::from(entry.uncompressed_size);
    let mut data = Vec::with_capacity(entry.uncompressed_size as usize);

    // read one byte past the expected size so oversized streams are noticed
    DeflateDecoder::new(compressed)
        .take(expected + 1)
        .read_to_end(&mut data)
        .map_err(|e| {
            error!("could not inflate \"{}\": {}", entry.name, e);
            Error::Inflate {
                name: entry.name.clone(),
                reason: e.to_string(),
            }
        })?;

    if data.len() as u64 != expected {
        error!(
            "\"{}\" inflated to {} bytes instead of {}",
            entry.name,
            data.len(),
            expected
        );
        return Err(Error::SizeMismatch {
            name: entry.name.clone(),
            expected,
            actual: data.len() as u64,
        });
    }

    Ok(data)
}

/// Searches backwards from the end of the archive for the end of central
/// directory record, returning its offset
///
/// The record can only be followed by a comment of at most 64 KiB, so the
/// search never looks further back than that.
fn find_end_of_central_directory<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < END_OF_CENTRAL_DIR_SIZE {
        error!("zip file is too small ({} bytes)", file_len);
        return Err(Error::ArchiveTooSmall(file_len));
    }

    let window_start = file_len.saturating_sub(MAX_COMMENT_SIZE + END_OF_CENTRAL_DIR_SIZE);
    let mut chunk_end = file_len;
    // first bytes of the previously scanned chunk, so signatures straddling
    // two chunks are still found
    let mut carry: Vec<u8> = Vec::new();

    while chunk_end > window_start {
        let chunk_start = chunk_end.saturating_sub(SEARCH_CHUNK_SIZE).max(window_start);

        let mut chunk = vec![0u8; (chunk_end - chunk_start) as usize];
        reader.seek(SeekFrom::Start(chunk_start))?;
        reader.read_exact(&mut chunk)?;

        let next_carry = chunk[..chunk.len().min(3)].to_vec();
        chunk.extend_from_slice(&carry);

        for (index, window) in chunk.windows(4).enumerate().rev() {
            if LittleEndian::read_u32(window) != END_OF_CENTRAL_DIR_SIGNATURE {
                continue;
            }
            let position = chunk_start + index as u64;
            if position + END_OF_CENTRAL_DIR_SIZE <= file_len {
                trace!("end of central directory found at offset {}", position);
                return Ok(position);
            }
        }

        carry = next_carry;
        chunk_end = chunk_start;
    }

    error!("could not find end of central directory");
    Err(Error::EndOfCentralDirectoryNotFound)
}

/// Parses `num_entries` central directory headers
///
/// Entries with a compression method other than stored or deflate are left
/// out with a warning.
fn scan_central_directory(
    central_dir: &[u8],
    num_entries: u16,
    central_dir_offset: u32,
) -> Result<BTreeMap<String, ArchiveEntry>> {
    let mut cursor = Cursor::new(central_dir);
    let mut entries = BTreeMap::new();

    for index in 0..num_entries {
        let header = read_central_dir_header(&mut cursor).map_err(|e| {
            error!("central directory entry {} is truncated: {}", index, e);
            Error::CorruptCentralDirectory(format!("entry {} is truncated", index))
        })?;

        if header.signature != CENTRAL_DIR_HEADER_SIGNATURE {
            error!("central directory entry {} has a bad signature", index);
            return Err(Error::CorruptCentralDirectory(format!(
                "entry {} has signature {:#010x}",
                index, header.signature
            )));
        }

        let name = normalize_path(&header.filename).to_string();

        // checked after the whole header was consumed, so the cursor is at
        // the next header either way
        let Some(compression) = CompressionMethod::from_u16(header.compression_method) else {
            warn!(
                "zip entry \"{}\" uses unsupported compression method {} - skipping this entry",
                name, header.compression_method
            );
            continue;
        };

        if header.local_header_offset >= central_dir_offset {
            warn!(
                "zip entry \"{}\" points past the central directory - skipping this entry",
                name
            );
            continue;
        }

        trace!("found zip entry \"{}\"", name);
        entries.insert(
            name.clone(),
            ArchiveEntry {
                name,
                compression,
                crc32: header.crc32,
                compressed_size: header.compressed_size,
                uncompressed_size: header.uncompressed_size,
                local_header_offset: header.local_header_offset,
            },
        );
    }

    Ok(entries)
}

/// Raw fields of a central directory file header
struct CentralDirHeader {
    signature: u32,
    compression_method: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
    filename: String,
}

fn read_central_dir_header(cursor: &mut Cursor<&[u8]>) -> io::Result<CentralDirHeader> {
    let signature = cursor.read_u32::<LittleEndian>()?;
    // version made by, version needed, bit flag
    skip(cursor, 3 * 2)?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    // last mod file time & date
    skip(cursor, 2 * 2)?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let filename_len = cursor.read_u16::<LittleEndian>()?;
    let extra_field_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    // disk number start, internal & external file attributes
    skip(cursor, 2 * 2 + 4)?;
    let local_header_offset = cursor.read_u32::<LittleEndian>()?;

    let mut filename = vec![0u8; filename_len as usize];
    cursor.read_exact(&mut filename)?;
    skip(cursor, u64::from(extra_field_len) + u64::from(comment_len))?;

    Ok(CentralDirHeader {
        signature,
        compression_method,
        crc32,
        compressed_size,
        uncompressed_size,
        local_header_offset,
        filename: String::from_utf8_lossy(&filename).into_owned(),
    })
}

/// Advances the cursor, failing if that runs past the end of the buffer
fn skip(cursor: &mut Cursor<&[u8]>, count: u64) -> io::Result<()> {
    let target = cursor.position() + count;
    if target > cursor.get_ref().len() as u64 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    cursor.set_position(target);
    Ok(())
}
