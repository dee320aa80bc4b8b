//! Mount table access.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use crate::errors::{CoreError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub device: String,
    pub folder: PathBuf,
    pub read_only: bool,
}

impl MountPoint {
    /// Only writable block devices can carry a trash can.
    pub fn is_trash_candidate(&self) -> bool {
        self.device.starts_with("/dev/") && !self.read_only
    }
}

/// Source of the currently active mounts.
pub trait MountTable: Send + Sync {
    fn active_mounts(&self) -> Result<Vec<MountPoint>>;
}

/// Reads a kernel mount table in `/proc/mounts` format.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    path: PathBuf,
}

impl ProcMounts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MountTable for ProcMounts {
    fn active_mounts(&self) -> Result<Vec<MountPoint>> {
        let content = std::fs::read_to_string(&self.path).map_err(|err| CoreError::io(&self.path, err))?;
        Ok(parse_mounts(&content))
    }
}

/// Parses `/proc/mounts` content; malformed lines are skipped.
pub fn parse_mounts(content: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(folder)) = (fields.next(), fields.next()) else {
            continue;
        };
        let _fstype = fields.next();
        let read_only = fields
            .next()
            .map(|options| options.split(',').any(|option| option == "ro"))
            .unwrap_or(false);

        mounts.push(MountPoint {
            device: String::from_utf8_lossy(&unescape_octal(device)).into_owned(),
            folder: PathBuf::from(OsString::from_vec(unescape_octal(folder))),
            read_only,
        });
    }
    mounts
}

/// Decodes the `\040`-style escapes the kernel uses for blanks in mount fields.
fn unescape_octal(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    decoded.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    decoded
}

/// A fixed list of volume toplevels, each reported as a writable device.
#[derive(Debug, Clone, Default)]
pub struct FixedVolumes {
    volumes: Vec<PathBuf>,
}

impl FixedVolumes {
    pub fn new(volumes: Vec<PathBuf>) -> Self {
        Self { volumes }
    }
}

impl MountTable for FixedVolumes {
    fn active_mounts(&self) -> Result<Vec<MountPoint>> {
        Ok(self
            .volumes
            .iter()
            .enumerate()
            .map(|(i, folder)| MountPoint {
                device: format!("/dev/volume{i}"),
                folder: folder.clone(),
                read_only: false,
            })
            .collect())
    }
}

/// Finds the mount point whose folder lives on device `dev`.
pub fn mount_point_for_device(
    mounts: &dyn MountTable,
    fs: &dyn FileSystem,
    dev: u64,
) -> Result<Option<MountPoint>> {
    use std::os::unix::fs::MetadataExt;

    for mount in mounts.active_mounts()? {
        match fs.metadata(&mount.folder) {
            Ok(metadata) if metadata.dev() == dev => return Ok(Some(mount)),
            Ok(_) => {}
            Err(err) => tracing::trace!(folder = ?mount.folder, %err, "skipping unreadable mount point"),
        }
    }
    Ok(None)
}
