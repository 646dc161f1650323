//! A scratch directory per test run, with directory-level snapshots.

use chrono::Local;
use slog::{info, Logger};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Owns a test working directory and a sibling snapshot directory under the
/// OS temporary area. Snapshots are recursive copies of the test directory.
pub struct FilesystemManager {
    name: String,
    log: Logger,
    test_dir: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
}

impl FilesystemManager {
    pub fn new(log: Logger) -> Result<Self, String> {
        let test_dir = tempfile::Builder::new()
            .prefix("drydock-")
            .tempdir()
            .map_err(|e| format!("error creating test dir: {}", e))?
            .into_path();
        info!(log, "Created test dir"; "dir" => test_dir.display().to_string());

        let snapshot_dir = tempfile::Builder::new()
            .prefix("drydock-snapshots-")
            .tempdir()
            .map_err(|e| format!("error creating snapshot dir: {}", e))?
            .into_path();
        info!(log, "Created snapshot dir"; "dir" => snapshot_dir.display().to_string());

        Ok(Self {
            name: "filesystem".to_string(),
            log,
            test_dir: Some(test_dir),
            snapshot_dir: Some(snapshot_dir),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scratch directory tests should write into.
    pub fn test_dir(&self) -> Result<&Path, String> {
        self.test_dir
            .as_deref()
            .ok_or_else(|| "filesystem manager is closed".to_string())
    }

    /// Removes both directories. Tolerates their having gone missing already.
    pub fn close(&mut self) -> Result<(), String> {
        for dir in [self.test_dir.take(), self.snapshot_dir.take()].into_iter().flatten() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(format!("error removing dir [{}]: {}", dir.display(), e)),
            }
        }
        Ok(())
    }

    /// Takes a snapshot under a generated timestamped name.
    pub fn take_snapshot(&mut self) -> Result<String, String> {
        let name = format!("{}_{}", self.name, Local::now().format("%Y%m%d_%H%M%S"));
        self.take_named_snapshot(&name)
    }

    /// Takes a snapshot under the given name, failing if one already exists.
    pub fn take_named_snapshot(&mut self, name: &str) -> Result<String, String> {
        let test_dir = self.test_dir()?.to_path_buf();
        let snapshot_dir = self
            .snapshot_dir
            .as_deref()
            .ok_or_else(|| "filesystem manager is closed".to_string())?;

        let snapshot_path = snapshot_dir.join(name);
        if snapshot_path.exists() {
            return Err(format!("snapshot with name [{}] already exists", name));
        }

        create_dir_0755(&snapshot_path)?;
        copy_directory(&test_dir, &snapshot_path)?;

        info!(
            self.log,
            "Took filesystem snapshot";
            "name" => name,
            "path" => snapshot_path.display().to_string(),
        );
        Ok(name.to_string())
    }

    /// Deletes the test dir, recreates it and restores the named snapshot
    /// into it.
    pub fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        let test_dir = self.test_dir()?.to_path_buf();
        let snapshot_dir = self
            .snapshot_dir
            .as_deref()
            .ok_or_else(|| "filesystem manager is closed".to_string())?;

        let snapshot_path = snapshot_dir.join(name);
        if !snapshot_path.exists() {
            return Err(format!("snapshot with name [{}] doesn't exist", name));
        }

        fs::remove_dir_all(&test_dir)
            .map_err(|e| format!("error removing test dir [{}]: {}", test_dir.display(), e))?;
        create_dir_0755(&test_dir)?;
        copy_directory(&snapshot_path, &test_dir)?;

        info!(self.log, "Reverted to filesystem snapshot"; "name" => name);
        Ok(())
    }
}

fn create_dir_0755(path: &Path) -> Result<(), String> {
    fs::create_dir(path)
        .map_err(|e| format!("error creating dir [{}]: {}", path.display(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| format!("error setting permissions on [{}]: {}", path.display(), e))?;
    }

    Ok(())
}

/// Recursively copies `source` into `target`. Only regular files and
/// directories are supported; `fs::copy` carries the file mode bits across.
fn copy_directory(source: &Path, target: &Path) -> Result<(), String> {
    let entries = fs::read_dir(source)
        .map_err(|e| format!("error reading dir [{}]: {}", source.display(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("error walking [{}]: {}", source.display(), e))?;
        let source_path = entry.path();
        let target_path = target.join(entry.file_name());

        let file_type = entry
            .file_type()
            .map_err(|e| format!("error inspecting [{}]: {}", source_path.display(), e))?;

        if file_type.is_dir() {
            create_dir_0755(&target_path)?;
            copy_directory(&source_path, &target_path)?;
        } else if file_type.is_file() {
            fs::copy(&source_path, &target_path).map_err(|e| {
                format!("error copying file [{}]: {}", source_path.display(), e)
            })?;
        } else {
            return Err(format!(
                "file [{}] is irregular, copying is not supported",
                source_path.display()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manager() -> FilesystemManager {
        FilesystemManager::new(logging::null_logger()).unwrap()
    }

    #[test]
    fn snapshot_and_revert_restore_contents() {
        let mut fs_manager = manager();
        let test_dir = fs_manager.test_dir().unwrap().to_path_buf();

        fs::create_dir(test_dir.join("nested")).unwrap();
        fs::write(test_dir.join("nested/config.json"), b"{\"a\":1}").unwrap();
        fs::write(test_dir.join("keep.txt"), b"original").unwrap();

        let snapshot = fs_manager.take_named_snapshot("clean").unwrap();
        assert_eq!(snapshot, "clean");

        fs::write(test_dir.join("keep.txt"), b"mutated").unwrap();
        fs::write(test_dir.join("extra.txt"), b"junk").unwrap();

        fs_manager.revert_to_snapshot("clean").unwrap();
        assert_eq!(fs::read(test_dir.join("keep.txt")).unwrap(), b"original");
        assert_eq!(
            fs::read(test_dir.join("nested/config.json")).unwrap(),
            b"{\"a\":1}"
        );
        assert!(!test_dir.join("extra.txt").exists());

        // The snapshot is still there for another revert.
        fs::write(test_dir.join("more.txt"), b"junk").unwrap();
        fs_manager.revert_to_snapshot("clean").unwrap();
        assert!(!test_dir.join("more.txt").exists());

        fs_manager.close().unwrap();
    }

    #[test]
    fn duplicate_snapshot_names_are_rejected() {
        let mut fs_manager = manager();
        fs_manager.take_named_snapshot("once").unwrap();
        let err = fs_manager.take_named_snapshot("once").unwrap_err();
        assert!(err.contains("already exists"));
        fs_manager.close().unwrap();
    }

    #[test]
    fn unknown_snapshot_fails_revert() {
        let mut fs_manager = manager();
        let err = fs_manager.revert_to_snapshot("ghost").unwrap_err();
        assert!(err.contains("doesn't exist"));
        fs_manager.close().unwrap();
    }

    #[test]
    fn generated_names_are_timestamped() {
        let mut fs_manager = manager();
        let name = fs_manager.take_snapshot().unwrap();
        assert!(name.starts_with("filesystem_"));
        fs_manager.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn irregular_files_fail_the_snapshot() {
        let mut fs_manager = manager();
        let test_dir = fs_manager.test_dir().unwrap().to_path_buf();

        fs::write(test_dir.join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(test_dir.join("real.txt"), test_dir.join("link.txt")).unwrap();

        let err = fs_manager.take_named_snapshot("with-symlink").unwrap_err();
        assert!(err.contains("irregular"));
        fs_manager.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_modes_survive_the_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let mut fs_manager = manager();
        let test_dir = fs_manager.test_dir().unwrap().to_path_buf();

        let script = test_dir.join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        fs_manager.take_named_snapshot("exec").unwrap();
        fs::remove_file(&script).unwrap();
        fs_manager.revert_to_snapshot("exec").unwrap();

        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        fs_manager.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let mut fs_manager = manager();
        fs_manager.close().unwrap();
        fs_manager.close().unwrap();
        assert!(fs_manager.test_dir().is_err());
    }
}
