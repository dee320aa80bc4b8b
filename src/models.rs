use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::path::VfsPath;

/// Identifier of a trash directory in the registry. `0` is the home trash.
pub type TrashId = u32;

/// The trash-id of the home trash.
pub const HOME_TRASH_ID: TrashId = 0;

/// One registered trash can.
#[derive(Debug, Clone)]
pub struct TrashDirectory {
    /// Toplevel directory of the device (mount point or home directory).
    pub top_dir: PathBuf,
    /// Absolute path of the directory holding `files/` and `info/`.
    pub trash_dir: PathBuf,
    /// Last observed mtime (seconds) of `files/`; `None` until first rescanned.
    pub mtime: Option<i64>,
    pub empty: bool,
}

impl TrashDirectory {
    pub fn new(top_dir: PathBuf, trash_dir: PathBuf) -> Self {
        Self {
            top_dir,
            trash_dir,
            mtime: None,
            empty: true,
        }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.trash_dir.join("files")
    }
}

/// Contents of a `.trashinfo` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashInfo {
    /// Absolute original location (relative `Path=` values already resolved).
    pub original_path: PathBuf,
    /// `DeletionDate=` as written in the file.
    pub deletion_date: String,
}

impl TrashInfo {
    /// Parsed deletion date, if it is well-formed.
    pub fn deleted_at(&self) -> Option<DateTime<Local>> {
        crate::helpers::parse_trash_datetime(&self.deletion_date)
    }
}

/// Kind of change delivered to a [`ChangeSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEventKind {
    Changed,
    Created,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: MonitorEventKind,
    pub path: VfsPath,
}

/// Outbound change notifications.
pub trait ChangeSink: Send + Sync {
    fn feed(&self, kind: MonitorEventKind, path: &VfsPath);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ChangeSink for NullSink {
    fn feed(&self, _kind: MonitorEventKind, _path: &VfsPath) {}
}

impl ChangeSink for crossbeam::channel::Sender<ChangeEvent> {
    fn feed(&self, kind: MonitorEventKind, path: &VfsPath) {
        let event = ChangeEvent {
            kind,
            path: path.clone(),
        };
        if self.send(event).is_err() {
            tracing::trace!(?kind, %path, "change receiver went away, dropping event");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    Symlink,
    Other,
}

/// File information for a path in the trash namespace.
#[derive(Debug, Clone)]
pub struct TrashFileInfo {
    pub path: VfsPath,
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub display_name: String,
    pub custom_icon: Option<String>,
}

impl TrashFileInfo {
    /// Builds the info from lstat data of the resolved local file.
    pub fn from_metadata(path: VfsPath, metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        };
        let display_name = path.name().to_string_lossy().into_owned();

        Self {
            path,
            kind,
            mode: metadata.mode() & 0o7777,
            size: metadata.len(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            atime: metadata.atime(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
            display_name,
            custom_icon: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Per-file metadata that can be queried on trash paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashMetadata {
    OriginalPath,
    DeletionDate,
    LinkTarget,
}

/// Paths found while scanning a directory.
#[derive(Debug, Default, Clone)]
pub struct ScanResult {
    pub paths: Vec<VfsPath>,
    /// Subset of `paths` that are directories (for recursive scans).
    pub directories: Vec<VfsPath>,
}

/// Joins `relative` (if any) below `base`.
pub(crate) fn join_relative(base: &Path, relative: Option<&Path>) -> PathBuf {
    match relative {
        Some(relative) => base.join(relative),
        None => base.to_path_buf(),
    }
}
