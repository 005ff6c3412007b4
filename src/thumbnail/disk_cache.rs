/// On-disk thumbnail records
///
/// One file per source path, named by the blake3 hash of the normalised path.
/// A record is only valid while the live source's last-write-time matches the
/// stored one; anything else (missing, stale, corrupt) is a miss.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use super::decode::{DecodedImage, PixelFormat};
use crate::content::content_uid;
use crate::error::{GalleryError, Result};
use crate::persist::{last_write_time, write_atomic};

const RECORD_MAGIC: &[u8; 4] = b"GTHB";
const RECORD_VERSION: u32 = 1;

/// A cached thumbnail for one (source path, last-write-time) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailCacheRecord {
    /// Normalised source path
    pub source: String,
    /// Source last-write-time (ns since epoch) when the record was made
    pub source_mtime: i64,
    pub image: DecodedImage,
}

impl ThumbnailCacheRecord {
    pub fn new(source: &Path, source_mtime: i64, image: DecodedImage) -> Self {
        Self {
            source: content_uid(source),
            source_mtime,
            image,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.source.len() + self.image.byte_len());
        // Writing into a Vec can't fail
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.extend_from_slice(RECORD_MAGIC);
        out.write_u32::<LittleEndian>(RECORD_VERSION)?;
        out.write_u32::<LittleEndian>(self.source.len() as u32)?;
        out.extend_from_slice(self.source.as_bytes());
        out.write_i64::<LittleEndian>(self.source_mtime)?;
        out.write_u32::<LittleEndian>(self.image.width)?;
        out.write_u32::<LittleEndian>(self.image.height)?;
        out.write_u8(self.image.format.code())?;
        out.write_u32::<LittleEndian>(self.image.pixels.len() as u32)?;
        out.extend_from_slice(&self.image.pixels);
        Ok(())
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| GalleryError::corrupt(path, reason);
        let mut reader = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != RECORD_MAGIC {
            return Err(corrupt("bad magic"));
        }
        if reader.read_u32::<LittleEndian>()? != RECORD_VERSION {
            return Err(corrupt("unsupported version"));
        }

        let source_len = reader.read_u32::<LittleEndian>()? as usize;
        if source_len > bytes.len() {
            return Err(corrupt("source length out of range"));
        }
        let mut source = vec![0u8; source_len];
        reader.read_exact(&mut source)?;
        let source = String::from_utf8(source).map_err(|_| corrupt("source is not UTF-8"))?;

        let source_mtime = reader.read_i64::<LittleEndian>()?;
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let format = PixelFormat::from_code(reader.read_u8()?)
            .ok_or_else(|| corrupt("unknown pixel format"))?;

        let pixel_len = reader.read_u32::<LittleEndian>()? as usize;
        if pixel_len > bytes.len() {
            return Err(corrupt("pixel length out of range"));
        }
        let mut pixels = vec![0u8; pixel_len];
        reader.read_exact(&mut pixels)?;

        let image = DecodedImage::new(width, height, format, pixels)?;
        Ok(Self {
            source,
            source_mtime,
            image,
        })
    }
}

/// Directory of thumbnail records
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the record for `source` lives (whether or not it exists)
    pub fn record_path(&self, source: &Path) -> PathBuf {
        let hash = blake3::hash(content_uid(source).as_bytes());
        self.dir.join(format!("{}.thumb", hash.to_hex()))
    }

    /// Read the stored record for `source`, if any, without staleness checks
    pub fn read_record(&self, source: &Path) -> Result<Option<ThumbnailCacheRecord>> {
        let path = self.record_path(source);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ThumbnailCacheRecord::decode(&path, &bytes).map(Some)
    }

    /// A valid cached thumbnail for `source`, or `None` on any kind of miss
    pub fn lookup(&self, source: &Path) -> Option<DecodedImage> {
        let live_mtime = last_write_time(source).ok()?;
        let record = match self.read_record(source) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                debug!("Ignoring unreadable thumbnail record for {}: {}", source.display(), e);
                return None;
            }
        };

        if record.source != content_uid(source) || record.source_mtime != live_mtime {
            debug!("Stale thumbnail record for {}", source.display());
            return None;
        }
        Some(record.image)
    }

    /// Atomically write a record (temp file + rename)
    pub fn write(&self, source: &Path, record: &ThumbnailCacheRecord) -> Result<()> {
        write_atomic(&self.record_path(source), &record.encode())
    }

    pub fn remove(&self, source: &Path) {
        let path = self.record_path(source);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove thumbnail record {}: {}", path.display(), e);
            }
        }
    }
}
