/// Durable file helpers shared by every persisted store
///
/// All writes go through `write_atomic`: the bytes land in a unique sibling
/// temp file which is then renamed over the target, so a reader never sees a
/// half-written file even if the process dies mid-write.
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::error::Result;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` atomically (temp file + rename)
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_sibling(path);
    let written = write_and_sync(&tmp, bytes).and_then(|_| fs::rename(&tmp, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Unique per process and per call, so concurrent writers never share a temp file
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
}

/// Source last-write-time in nanoseconds since the Unix epoch
pub fn last_write_time(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(system_time_nanos(modified))
}

pub fn system_time_nanos(time: SystemTime) -> i64 {
    let utc: DateTime<Utc> = time.into();
    utc.timestamp_nanos_opt().unwrap_or(i64::MAX)
}
