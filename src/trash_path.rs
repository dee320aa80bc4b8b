//! Mapping between `trash:///<id>-<file-id>/<relative>` paths and their parts.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use crate::errors::{CoreError, Result};
use crate::models::{join_relative, TrashId};
use crate::path::{PathInterner, VfsPath};
use crate::registry::TrashRegistry;

/// A decoded trash path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashLocation {
    pub trash_id: TrashId,
    pub file_id: OsString,
    /// Path below the top-level trashed item, `None` for the item itself.
    pub relative: Option<PathBuf>,
}

impl TrashLocation {
    pub fn is_toplevel(&self) -> bool {
        self.relative.is_none()
    }
}

/// Builds `trash:///<trash_id>-<file_id>/<relative>`.
pub fn encode(
    interner: &PathInterner,
    trash_id: TrashId,
    file_id: impl AsRef<OsStr>,
    relative: impl AsRef<OsStr>,
) -> Result<VfsPath> {
    let mut name = OsString::from(format!("{trash_id}-"));
    name.push(file_id.as_ref());
    let item = interner.child(&interner.trash_root(), name)?;
    interner.relative(&item, relative)
}

fn invalid(path: &VfsPath) -> CoreError {
    CoreError::invalid_uri(format!(
        "the URI {:?} does not refer to a valid resource in the trash",
        path.to_uri_string()
    ))
}

/// Splits a trash path into trash-id, file-id and relative part.
pub fn decode(path: &VfsPath) -> Result<TrashLocation> {
    if !path.is_trash() || path.is_root() {
        return Err(invalid(path));
    }

    let components = path.components();
    let (first, rest) = components.split_first().ok_or_else(|| invalid(path))?;
    let digits = first.iter().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || first.get(digits) != Some(&b'-') || first.len() == digits + 1 {
        return Err(invalid(path));
    }
    let trash_id = std::str::from_utf8(&first[..digits])
        .ok()
        .and_then(|digits| digits.parse::<TrashId>().ok())
        .ok_or_else(|| invalid(path))?;
    let file_id = OsString::from_vec(first[digits + 1..].to_vec());

    let relative = (!rest.is_empty()).then(|| {
        let mut joined = Vec::new();
        for (idx, name) in rest.iter().enumerate() {
            if idx > 0 {
                joined.push(b'/');
            }
            joined.extend_from_slice(name);
        }
        PathBuf::from(OsString::from_vec(joined))
    });

    Ok(TrashLocation {
        trash_id,
        file_id,
        relative,
    })
}

/// Absolute local location of the trash resource at `path`.
pub fn resolve(registry: &TrashRegistry, path: &VfsPath) -> Result<PathBuf> {
    let location = decode(path)?;
    let files_dir = registry.get_trash_dir(location.trash_id)?.join("files");
    Ok(join_relative(&files_dir.join(&location.file_id), location.relative.as_deref()))
}
