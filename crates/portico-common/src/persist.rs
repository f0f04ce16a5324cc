//! JSON state files.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Load a state file. A missing file is an empty store, not an error;
/// unparseable content is reported as `InvalidData` naming the file.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> io::Result<T> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&raw).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display()))
    })
}

/// Replace `path` with pretty JSON. The content is flushed to a sibling
/// `.tmp` file and renamed over the target, so a crash leaves either the
/// old or the new state.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    json.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)
}

/// Fresh scratch directory under the system temp dir, unique per call.
pub fn scratch_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "portico-{prefix}-{}-{}",
        std::process::id(),
        crate::id::generate_short_id()
    ));
    let _ = std::fs::create_dir_all(&dir);
    dir
}
