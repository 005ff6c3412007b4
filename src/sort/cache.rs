use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, error, info, warn};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use super::engine::{SortContext, SortDirection, SortState, SortType};
use crate::error::{GalleryError, Result};
use crate::persist::write_atomic;

/// The only sort-state file layout this build reads or writes
pub const SORT_CACHE_VERSION: i32 = 1;

/// Longest context key accepted from disk
const MAX_KEY_LEN: u32 = 4096;

/// One persisted `SortState` per context.
///
/// File layout (little-endian): `i32 version`, `i32 count`, then `count`
/// records of `{string key, i32 sort_type, i32 direction}` where a string is
/// a 7-bit variable-length byte count followed by UTF-8 bytes.
///
/// A handful of contexts at most, so every change rewrites the whole file.
pub struct SortStateCache {
    path: PathBuf,
    states: OnceCell<HashMap<String, SortState>>,
    dirty: bool,
}

impl SortStateCache {
    pub const FILE_NAME: &'static str = "sort_state.bin";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            states: OnceCell::new(),
            dirty: false,
        }
    }

    pub fn open(data_dir: &Path) -> Self {
        Self::new(data_dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored state for `context`, or the default if none is stored or the
    /// stored one isn't valid for that context
    pub fn get(&self, context: &SortContext) -> SortState {
        self.states()
            .get(context.key())
            .copied()
            .filter(|s| context.is_valid(s.sort_type))
            .unwrap_or_default()
    }

    /// Store a state; rewrites the file when it changed. Returns true on change.
    pub fn set(&mut self, context: &SortContext, state: SortState) -> bool {
        let key = context.key().to_string();
        let states = self.states_mut();
        if states.get(&key) == Some(&state) {
            return false;
        }
        states.insert(key, state);
        self.dirty = true;
        self.flush();
        true
    }

    /// Forget the stored state for `context`
    pub fn reset(&mut self, context: &SortContext) -> bool {
        let removed = self.states_mut().remove(context.key()).is_some();
        if removed {
            self.dirty = true;
            self.flush();
        }
        removed
    }

    /// Cycle the sort type for `context` and store the result
    pub fn cycle_type(&mut self, context: &SortContext) -> Result<SortState> {
        let next = self.get(context).cycle_type(context)?;
        self.set(context, next);
        Ok(next)
    }

    /// Flip the direction for `context` and store the result
    pub fn toggle_direction(&mut self, context: &SortContext) -> SortState {
        let next = self.get(context).toggle_direction();
        self.set(context, next);
        next
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rewrite the file if a previous write failed or is pending
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        match write_atomic(&self.path, &encode(self.states())) {
            Ok(()) => {
                debug!("Saved sort state to {}", self.path.display());
                self.dirty = false;
            }
            Err(e) => error!("Failed to save sort state {}: {}", self.path.display(), e),
        }
    }

    fn states(&self) -> &HashMap<String, SortState> {
        self.states.get_or_init(|| load(&self.path))
    }

    fn states_mut(&mut self) -> &mut HashMap<String, SortState> {
        if self.states.get().is_none() {
            self.states = OnceCell::from(load(&self.path));
        }
        self.states
            .get_mut()
            .expect("sort states are initialised above")
    }
}

impl std::fmt::Debug for SortStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortStateCache")
            .field("path", &self.path)
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn load(path: &Path) -> HashMap<String, SortState> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("Failed to read sort state {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    match decode(path, &bytes) {
        Ok(Some(states)) => {
            info!("Loaded {} sort states from {}", states.len(), path.display());
            states
        }
        Ok(None) => {
            debug!("Discarding sort state {} (unsupported version)", path.display());
            HashMap::new()
        }
        Err(e) => {
            warn!("Corrupt sort state {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

/// `Ok(None)` means a well-formed header with a version we don't read
fn decode(path: &Path, bytes: &[u8]) -> Result<Option<HashMap<String, SortState>>> {
    let mut reader = Cursor::new(bytes);

    let version = reader.read_i32::<LittleEndian>()?;
    if version != SORT_CACHE_VERSION {
        return Ok(None);
    }

    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(GalleryError::corrupt(path, format!("negative entry count {}", count)));
    }

    let mut states = HashMap::new();
    for _ in 0..count {
        let key = read_string(&mut reader, path)?;
        let sort_type = reader.read_i32::<LittleEndian>()?;
        let direction = reader.read_i32::<LittleEndian>()?;

        match (SortType::from_ordinal(sort_type), SortDirection::from_ordinal(direction)) {
            (Some(t), Some(d)) => {
                states.insert(key, SortState::new(t, d));
            }
            _ => warn!(
                "Skipping sort state '{}' with unknown ordinals ({}, {})",
                key, sort_type, direction
            ),
        }
    }
    Ok(Some(states))
}

fn encode(states: &HashMap<String, SortState>) -> Vec<u8> {
    let mut keys: Vec<&String> = states.keys().collect();
    keys.sort();

    let mut out = Vec::new();
    // Writing into a Vec can't fail
    let _ = write_all_states(&mut out, &keys, states);
    out
}

fn write_all_states<W: Write>(
    out: &mut W,
    keys: &[&String],
    states: &HashMap<String, SortState>,
) -> std::io::Result<()> {
    out.write_i32::<LittleEndian>(SORT_CACHE_VERSION)?;
    out.write_i32::<LittleEndian>(keys.len() as i32)?;
    for key in keys {
        let state = states[*key];
        write_string(out, key)?;
        out.write_i32::<LittleEndian>(state.sort_type.ordinal())?;
        out.write_i32::<LittleEndian>(state.direction.ordinal())?;
    }
    Ok(())
}

fn write_string<W: Write>(out: &mut W, s: &str) -> std::io::Result<()> {
    let bytes = s.as_bytes();
    let mut len = bytes.len() as u32;
    while len >= 0x80 {
        out.write_u8((len as u8) | 0x80)?;
        len >>= 7;
    }
    out.write_u8(len as u8)?;
    out.write_all(bytes)
}

fn read_string<R: Read>(reader: &mut R, path: &Path) -> Result<String> {
    let mut len: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        len |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(GalleryError::corrupt(path, "string length overflow"));
        }
    }
    if len > MAX_KEY_LEN {
        return Err(GalleryError::corrupt(path, format!("key length {} too large", len)));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| GalleryError::corrupt(path, e.to_string()))
}
