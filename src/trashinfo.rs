//! Reading and writing `info/<file-id>.trashinfo` records.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::errors::{CoreError, Result};
use crate::helpers::{build_unique_basename, serialize_system_time, TRASHINFO_EXTENSION, TRASHINFO_GROUP};
use crate::models::{join_relative, MonitorEventKind, TrashId, TrashInfo, HOME_TRASH_ID};
use crate::path::{VfsPath, PATH_MAX_STRLEN};
use crate::registry::TrashRegistry;
use crate::uri;

/// Renders a record from an already escaped `Path=` value.
pub fn render_record(path_value: &str, deletion_date: &str) -> String {
    format!("{TRASHINFO_GROUP}\nPath={path_value}\nDeletionDate={deletion_date}\n")
}

/// Extracts the raw `Path=` and `DeletionDate=` values of a record.
pub fn parse_record(text: &str) -> Result<(String, String)> {
    let mut in_group = false;
    let mut path = None;
    let mut deletion_date = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_group = line == TRASHINFO_GROUP;
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "Path" => path = Some(value.trim().to_string()),
                "DeletionDate" => deletion_date = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let missing = |key: &str| CoreError::not_found(format!("key {key:?} missing from {TRASHINFO_GROUP}"));
    Ok((path.ok_or_else(|| missing("Path"))?, deletion_date.ok_or_else(|| missing("DeletionDate"))?))
}

fn info_file_path(trash_dir: &Path, file_id: &OsStr) -> PathBuf {
    let mut name = file_id.to_os_string();
    name.push(TRASHINFO_EXTENSION);
    trash_dir.join("info").join(name)
}

/// `Path=` value for `absolute`: relative to the volume toplevel for volume
/// trashes, absolute for the home trash.
fn path_value(trash_id: TrashId, top_dir: &Path, absolute: &Path) -> String {
    if trash_id != HOME_TRASH_ID {
        if let Ok(relative) = absolute.strip_prefix(top_dir) {
            if !relative.as_os_str().is_empty() {
                return uri::escape(relative.as_os_str().as_bytes());
            }
        }
    }
    uri::escape(absolute.as_os_str().as_bytes())
}

/// Allocates a `.trashinfo` record for the local file `original`.
///
/// Returns the id of the receiving trash and the file-id, which is the
/// record's basename without the extension.
pub fn create_entry(registry: &TrashRegistry, original: &VfsPath) -> Result<(TrashId, OsString)> {
    if !original.is_local() || original.is_root() {
        return Err(CoreError::unsupported(format!("cannot move {original} to the trash")));
    }

    let mut buffer = vec![0u8; PATH_MAX_STRLEN];
    let len = original.to_string_buf(&mut buffer)?;
    let absolute = PathBuf::from(OsStr::from_bytes(&buffer[..len]));

    let trash_id = registry.trash_id_for_file(&absolute);
    let trash_dir = registry.get_trash_dir(trash_id)?;
    let top_dir = registry.get_top_dir(trash_id)?;
    let info_dir = trash_dir.join("info");
    let fs = registry.filesystem();

    let mut attempt = 0;
    let mut created_info_dir = false;
    let (info_file, mut file) = loop {
        let info_file = info_dir.join(build_unique_basename(original.name(), attempt));
        match fs.create_new(&info_file, 0o600) {
            Ok(file) => break (info_file, file),
            Err(err) if err.is_not_found() && !created_info_dir => {
                fs.create_dir_all(&info_dir, 0o700)?;
                created_info_dir = true;
            }
            Err(err) if err.is_already_exists() => attempt += 1,
            Err(err) => return Err(err),
        }
    };

    // The deletion date comes from the file system clock, not ours.
    let written = file
        .metadata()
        .and_then(|metadata| metadata.modified())
        .and_then(|modified| {
            let record = render_record(&path_value(trash_id, &top_dir, &absolute), &serialize_system_time(modified));
            file.write_all(record.as_bytes())
        })
        .map_err(|err| CoreError::io(&info_file, err));
    if let Err(err) = written {
        if let Err(cleanup) = fs.remove(&info_file) {
            tracing::warn!(?info_file, %cleanup, "failed to remove incomplete trash info");
        }
        return Err(err);
    }

    let name = info_file.file_name().map(OsStr::as_bytes).unwrap_or_default();
    let file_id = name.strip_suffix(TRASHINFO_EXTENSION.as_bytes()).unwrap_or(name);
    let file_id = OsString::from_vec(file_id.to_vec());

    tracing::debug!(?absolute, trash_id, ?file_id, "created trash info");
    Ok((trash_id, file_id))
}

/// Reads the record of `file_id`; `relative` is appended to the original path.
pub fn read_entry(
    registry: &TrashRegistry,
    trash_id: TrashId,
    file_id: &OsStr,
    relative: Option<&Path>,
) -> Result<TrashInfo> {
    let info_file = info_file_path(&registry.get_trash_dir(trash_id)?, file_id);
    let text = registry.filesystem().read_to_string(&info_file)?;
    let (path_value, deletion_date) = parse_record(&text)?;

    let original = PathBuf::from(OsString::from_vec(uri::unescape_path(&path_value)?));
    let original = if original.is_absolute() {
        original
    } else {
        registry.get_top_dir(trash_id)?.join(original)
    };

    Ok(TrashInfo {
        original_path: join_relative(&original, relative),
        deletion_date,
    })
}

/// Deletes `files/<file_id>/<relative>`; missing files count as deleted.
///
/// Removing a whole top-level item also drops its record and reports a
/// change on the trash root.
pub fn remove_entry(
    registry: &TrashRegistry,
    trash_id: TrashId,
    file_id: &OsStr,
    relative: Option<&Path>,
) -> Result<()> {
    let trash_dir = registry.get_trash_dir(trash_id)?;
    let fs = registry.filesystem();

    let payload = join_relative(&trash_dir.join("files").join(file_id), relative);
    match fs.remove_all(&payload) {
        Err(err) if !err.is_not_found() => return Err(err),
        _ => {}
    }

    if relative.is_none() {
        let info_file = info_file_path(&trash_dir, file_id);
        if let Err(err) = fs.remove(&info_file) {
            tracing::debug!(?info_file, %err, "failed to remove trash info");
        }
        registry.notify(MonitorEventKind::Changed, &registry.interner().trash_root());
    }

    tracing::debug!(?payload, "removed from trash");
    Ok(())
}
