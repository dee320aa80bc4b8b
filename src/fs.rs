use crate::errors::CoreError;
use std::ffi::OsString;
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Filesystem abstraction boundary for the trash subsystem.
///
/// Every metadata read and write the registry and the trashinfo codec perform
/// goes through this trait, so alternative backends can stand in for tests.
pub trait FileSystem: Send + Sync {
    /// Reads file metadata, following symlinks.
    fn metadata(&self, path: &Path) -> crate::Result<Metadata>;

    /// Reads metadata of the path itself (lstat).
    fn symlink_metadata(&self, path: &Path) -> crate::Result<Metadata>;

    /// Creates a single directory with the given permission bits.
    fn create_dir(&self, path: &Path, mode: u32) -> crate::Result<()>;

    /// Creates a directory and all missing parent directories.
    fn create_dir_all(&self, path: &Path, mode: u32) -> crate::Result<()>;

    /// Exclusively creates a new file for writing (`O_CREAT | O_EXCL`).
    fn create_new(&self, path: &Path, mode: u32) -> crate::Result<File>;

    /// Reads UTF-8 text.
    fn read_to_string(&self, path: &Path) -> crate::Result<String>;

    /// Removes a file, symlink or empty directory.
    fn remove(&self, path: &Path) -> crate::Result<()>;

    /// Removes a path and, for directories, everything below it.
    fn remove_all(&self, path: &Path) -> crate::Result<()>;

    /// Renames/moves a path on the same device.
    fn rename(&self, from: &Path, to: &Path) -> crate::Result<()>;

    /// Copies a file, symlink or directory tree.
    fn copy_all(&self, from: &Path, to: &Path) -> crate::Result<()>;

    /// Reads the target of a symbolic link.
    fn read_link(&self, path: &Path) -> crate::Result<PathBuf>;

    /// Lists the names of directory children.
    fn list_dir(&self, path: &Path) -> crate::Result<Vec<OsString>>;

    /// Returns true if `path` is a directory without entries (or cannot be read).
    fn is_dir_empty(&self, path: &Path) -> bool {
        self.list_dir(path).map(|names| names.is_empty()).unwrap_or(true)
    }

    /// Moves `from` to `to`, falling back to copy and delete across devices.
    fn move_path(&self, from: &Path, to: &Path) -> crate::Result<()> {
        match self.rename(from, to) {
            Err(CoreError::Io(_, err)) if err.raw_os_error() == Some(libc::EXDEV) => {
                tracing::debug!(?from, ?to, "rename crosses devices, copying instead");
                self.copy_all(from, to)?;
                self.remove_all(from)
            }
            result => result,
        }
    }
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> crate::Result<Metadata> {
        fs::metadata(path).map_err(|err| CoreError::io(path, err))
    }

    fn symlink_metadata(&self, path: &Path) -> crate::Result<Metadata> {
        fs::symlink_metadata(path).map_err(|err| CoreError::io(path, err))
    }

    fn create_dir(&self, path: &Path, mode: u32) -> crate::Result<()> {
        DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(|err| CoreError::io(path, err))
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> crate::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(|err| CoreError::io(path, err))
    }

    fn create_new(&self, path: &Path, mode: u32) -> crate::Result<File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .map_err(|err| CoreError::io(path, err))
    }

    fn read_to_string(&self, path: &Path) -> crate::Result<String> {
        fs::read_to_string(path).map_err(|err| CoreError::io(path, err))
    }

    fn remove(&self, path: &Path) -> crate::Result<()> {
        let metadata = self.symlink_metadata(path)?;
        let result = if metadata.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|err| CoreError::io(path, err))
    }

    fn remove_all(&self, path: &Path) -> crate::Result<()> {
        let metadata = self.symlink_metadata(path)?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|err| CoreError::io(path, err))
    }

    fn rename(&self, from: &Path, to: &Path) -> crate::Result<()> {
        fs::rename(from, to).map_err(|err| CoreError::io(from, err))
    }

    fn copy_all(&self, from: &Path, to: &Path) -> crate::Result<()> {
        let metadata = self.symlink_metadata(from)?;
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            let target = self.read_link(from)?;
            symlink(target, to).map_err(|err| CoreError::io(to, err))
        } else if file_type.is_dir() {
            fs::create_dir(to).map_err(|err| CoreError::io(to, err))?;
            for name in self.list_dir(from)? {
                self.copy_all(&from.join(&name), &to.join(&name))?;
            }
            fs::set_permissions(to, metadata.permissions()).map_err(|err| CoreError::io(to, err))
        } else {
            fs::copy(from, to)
                .map(|_| ())
                .map_err(|err| CoreError::io(from, err))
        }
    }

    fn read_link(&self, path: &Path) -> crate::Result<PathBuf> {
        fs::read_link(path).map_err(|err| CoreError::io(path, err))
    }

    fn list_dir(&self, path: &Path) -> crate::Result<Vec<OsString>> {
        fs::read_dir(path)
            .map_err(|err| CoreError::io(path, err))?
            .map(|entry| entry.map(|v| v.file_name()))
            .collect::<Result<Vec<OsString>, io::Error>>()
            .map_err(|err| CoreError::io(path, err))
    }
}
