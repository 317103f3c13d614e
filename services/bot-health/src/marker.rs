//! Readiness marker management.
//!
//! The marker is a sentinel file on an instance-local volume. Writes go
//! through a temp file and rename so a probe never observes a partial
//! marker.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::HealthError;

fn marker_error(path: &Path) -> impl FnOnce(std::io::Error) -> HealthError + '_ {
    move |source| HealthError::Marker {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path(marker: &Path) -> PathBuf {
    let mut name = marker
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ready".into());
    name.push(format!(".tmp-{}", std::process::id()));
    marker.with_file_name(name)
}

/// Write the marker. Idempotent.
pub fn mark_ready(marker: &Path) -> Result<(), HealthError> {
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent).map_err(marker_error(marker))?;
    }

    let tmp = temp_path(marker);
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "ready {}", std::process::id())?;
        file.sync_all()?;
        fs::rename(&tmp, marker)
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(marker_error(marker)(e));
    }

    info!(marker = %marker.display(), "instance marked ready");
    Ok(())
}

/// Remove the marker. Removing a missing marker is not an error.
pub fn clear_ready(marker: &Path) -> Result<(), HealthError> {
    match fs::remove_file(marker) {
        Ok(()) => {
            info!(marker = %marker.display(), "readiness marker cleared");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(marker_error(marker)(e)),
    }
}

pub fn is_ready(marker: &Path) -> bool {
    marker.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mark_and_clear() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("run/bot/ready");

        assert!(!is_ready(&marker));
        mark_ready(&marker).unwrap();
        assert!(is_ready(&marker));
        mark_ready(&marker).unwrap();

        let leftovers: Vec<_> = fs::read_dir(marker.parent().unwrap())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("ready")]);

        clear_ready(&marker).unwrap();
        assert!(!is_ready(&marker));
        clear_ready(&marker).unwrap();
    }

    #[test]
    fn directory_at_marker_path_is_not_ready() {
        let dir = tempdir().unwrap();
        assert!(!is_ready(dir.path()));
    }
}
