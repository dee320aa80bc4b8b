//! File operations on the `trash:` namespace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::current_gid;
use crate::errors::{CoreError, Result};
use crate::models::{FileKind, MonitorEventKind, ScanResult, TrashFileInfo, TrashMetadata};
use crate::path::{PathInterner, PathScheme, VfsPath};
use crate::registry::TrashRegistry;
use crate::{trash_path, trashinfo};

/// Lists a local directory as child paths of `path`.
pub trait Scandir: Send + Sync {
    fn scandir(
        &self,
        interner: &PathInterner,
        path: &VfsPath,
        absolute: &Path,
        follow_links: bool,
    ) -> Result<ScanResult>;
}

/// [`Scandir`] backed by `std::fs::read_dir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalScandir;

fn is_scanned_dir(path: &Path, follow_links: bool) -> bool {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            follow_links && fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
        }
        Ok(metadata) => metadata.is_dir(),
        Err(_) => false,
    }
}

impl Scandir for LocalScandir {
    fn scandir(
        &self,
        interner: &PathInterner,
        path: &VfsPath,
        absolute: &Path,
        follow_links: bool,
    ) -> Result<ScanResult> {
        let mut result = ScanResult::default();
        for entry in fs::read_dir(absolute).map_err(|err| CoreError::io(absolute, err))? {
            let entry = entry.map_err(|err| CoreError::io(absolute, err))?;
            let child = interner.child(path, entry.file_name())?;
            if is_scanned_dir(&entry.path(), follow_links) {
                result.directories.push(child.clone());
            }
            result.paths.push(child);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Move,
    Copy,
}

/// Entry point for file operations on trash paths.
pub struct TrashVfs {
    registry: Arc<TrashRegistry>,
    scandir: Box<dyn Scandir>,
}

impl TrashVfs {
    pub fn new(registry: Arc<TrashRegistry>) -> Self {
        Self::with_scandir(registry, Box::new(LocalScandir))
    }

    pub fn with_scandir(registry: Arc<TrashRegistry>, scandir: Box<dyn Scandir>) -> Self {
        Self { registry, scandir }
    }

    pub fn registry(&self) -> &Arc<TrashRegistry> {
        &self.registry
    }

    pub fn interner(&self) -> &PathInterner {
        self.registry.interner()
    }

    /// Absolute local location of a trash item.
    pub fn resolve(&self, path: &VfsPath) -> Result<PathBuf> {
        trash_path::resolve(&self.registry, path)
    }

    /// Maps `path` into `scheme`. Only trash to file is supported.
    pub fn translate(&self, path: &VfsPath, scheme: PathScheme) -> Result<VfsPath> {
        match (path.scheme(), scheme) {
            (from, to) if from == to => Ok(path.clone()),
            (PathScheme::Trash, PathScheme::File) => Ok(self.interner().resolve_path(self.resolve(path)?)),
            _ => Err(CoreError::unsupported(format!("cannot translate {path} to a trash path"))),
        }
    }

    pub fn get_info(&self, path: &VfsPath) -> Result<TrashFileInfo> {
        if !path.is_trash() {
            return Err(CoreError::unsupported(format!("{path} is not in the trash")));
        }
        if path.is_root() {
            return Ok(self.root_info());
        }

        let absolute = self.resolve(path)?;
        let metadata = self.registry.filesystem().symlink_metadata(&absolute)?;
        let mut info = TrashFileInfo::from_metadata(path.clone(), &metadata);

        let location = trash_path::decode(path)?;
        if location.is_toplevel() {
            match trashinfo::read_entry(&self.registry, location.trash_id, &location.file_id, None) {
                Ok(record) => {
                    if let Some(name) = record.original_path.file_name() {
                        info.display_name = name.to_string_lossy().into_owned();
                    }
                }
                Err(err) => tracing::debug!(%path, %err, "no trash info for item"),
            }
        }
        Ok(info)
    }

    fn root_info(&self) -> TrashFileInfo {
        self.registry.scan();
        let (empty, mtime) = self.registry.summary();

        TrashFileInfo {
            path: self.interner().trash_root(),
            kind: FileKind::Directory,
            mode: 0o700,
            size: if empty { 0 } else { 4096 },
            uid: self.registry.config().uid,
            gid: current_gid(),
            atime: mtime,
            mtime,
            ctime: mtime,
            display_name: "Trash".to_string(),
            custom_icon: Some(if empty { "user-trash" } else { "user-trash-full" }.to_string()),
        }
    }

    pub fn get_metadata(&self, path: &VfsPath, metadata: TrashMetadata) -> Result<String> {
        match metadata {
            TrashMetadata::LinkTarget => {
                let local = self.translate(path, PathScheme::File)?;
                let target = self.registry.filesystem().read_link(&local.to_path_buf())?;
                Ok(target.to_string_lossy().into_owned())
            }
            TrashMetadata::OriginalPath => {
                let location = trash_path::decode(path)?;
                let record = trashinfo::read_entry(
                    &self.registry,
                    location.trash_id,
                    &location.file_id,
                    location.relative.as_deref(),
                )?;
                Ok(record.original_path.to_string_lossy().into_owned())
            }
            TrashMetadata::DeletionDate => {
                let location = trash_path::decode(path)?;
                let record = trashinfo::read_entry(&self.registry, location.trash_id, &location.file_id, None)?;
                Ok(record.deletion_date)
            }
        }
    }

    /// Lists the children of a trash folder.
    ///
    /// Listing the trash root first looks for new volume trashes and rescans
    /// every known trash directory.
    pub fn scandir(&self, path: &VfsPath, follow_links: bool) -> Result<ScanResult> {
        if !path.is_trash() {
            return Err(CoreError::unsupported(format!("{path} is not in the trash")));
        }
        if !path.is_root() {
            let absolute = self.resolve(path)?;
            return self.scandir.scandir(self.interner(), path, &absolute, follow_links);
        }

        self.registry.rescan_mounts();
        self.registry.rescan();

        let fs = self.registry.filesystem();
        let mut result = ScanResult::default();
        for (trash_id, trash) in (0u32..).zip(self.registry.trashes()) {
            let files_dir = trash.files_dir();
            let names = match fs.list_dir(&files_dir) {
                Ok(names) => names,
                Err(err) => {
                    tracing::trace!(?files_dir, %err, "skipping unreadable trash");
                    continue;
                }
            };
            for name in names {
                let item = trash_path::encode(self.interner(), trash_id, &name, "")?;
                if is_scanned_dir(&files_dir.join(&name), follow_links) {
                    result.directories.push(item.clone());
                }
                result.paths.push(item);
            }
        }
        Ok(result)
    }

    /// File infos of a folder's children; entries without info are skipped.
    pub fn listdir(&self, path: &VfsPath) -> Result<Vec<TrashFileInfo>> {
        let scanned = self.scandir(path, true)?;
        Ok(scanned
            .paths
            .iter()
            .filter_map(|child| match self.get_info(child) {
                Ok(info) => Some(info),
                Err(err) => {
                    tracing::debug!(%child, %err, "skipping entry without info");
                    None
                }
            })
            .collect())
    }

    /// Deletes a trash item (or a path inside one).
    pub fn remove(&self, path: &VfsPath) -> Result<()> {
        self.remove_item(path)?;
        self.registry.notify(MonitorEventKind::Deleted, path);
        Ok(())
    }

    fn remove_item(&self, path: &VfsPath) -> Result<()> {
        let location = trash_path::decode(path)?;
        trashinfo::remove_entry(
            &self.registry,
            location.trash_id,
            &location.file_id,
            location.relative.as_deref(),
        )
    }

    /// Moves a file into or out of the trash, returning the final target path.
    pub fn move_file(&self, source: &VfsPath, target: &VfsPath) -> Result<VfsPath> {
        self.transfer(source, target, Transfer::Move)
    }

    /// Copies a file into or out of the trash, returning the final target path.
    pub fn copy_file(&self, source: &VfsPath, target: &VfsPath) -> Result<VfsPath> {
        self.transfer(source, target, Transfer::Copy)
    }

    fn transfer(&self, source: &VfsPath, target: &VfsPath, mode: Transfer) -> Result<VfsPath> {
        let target = self.transfer_paths(source, target, mode)?;
        self.registry.notify(MonitorEventKind::Created, &target);
        if mode == Transfer::Move {
            self.registry.notify(MonitorEventKind::Deleted, source);
        }
        Ok(target)
    }

    fn transfer_paths(&self, source: &VfsPath, target: &VfsPath, mode: Transfer) -> Result<VfsPath> {
        if source.is_root() || target.is_root() {
            return Err(CoreError::unsupported("cannot move or copy a root folder"));
        }

        match (source.is_trash(), target.is_trash()) {
            (true, true) => Err(CoreError::unsupported("cannot move or copy files within the trash")),
            (false, false) => Err(CoreError::unsupported(format!("neither {source} nor {target} is in the trash"))),
            (true, false) => {
                let local = self.resolve(source)?;
                self.transfer_local(&local, &target.to_path_buf(), mode)?;
                if mode == Transfer::Move {
                    self.remove_item(source)?;
                }
                Ok(target.clone())
            }
            (false, true) if !target.parent().is_some_and(VfsPath::is_root) => {
                let local = self.resolve(target)?;
                self.transfer_local(&source.to_path_buf(), &local, mode)?;
                Ok(target.clone())
            }
            (false, true) => self.transfer_into_trash(source, mode),
        }
    }

    fn transfer_into_trash(&self, source: &VfsPath, mode: Transfer) -> Result<VfsPath> {
        let (trash_id, file_id) = trashinfo::create_entry(&self.registry, source)?;
        let entry = trash_path::encode(self.interner(), trash_id, &file_id, "")?;

        let result = self.resolve(&entry).and_then(|local| {
            if let Some(files_dir) = local.parent() {
                self.registry.filesystem().create_dir_all(files_dir, 0o700)?;
            }
            self.transfer_local(&source.to_path_buf(), &local, mode)
        });

        match result {
            Ok(()) => {
                self.registry
                    .notify(MonitorEventKind::Changed, &self.interner().trash_root());
                Ok(entry)
            }
            Err(err) => {
                if let Err(cleanup) = self.remove_item(&entry) {
                    tracing::warn!(?file_id, trash_id, %cleanup, "failed to remove stale trash handle");
                }
                Err(err)
            }
        }
    }

    fn transfer_local(&self, from: &Path, to: &Path, mode: Transfer) -> Result<()> {
        let fs = self.registry.filesystem();
        if fs.symlink_metadata(to).is_ok() {
            return Err(CoreError::io(to, io::Error::from(io::ErrorKind::AlreadyExists)));
        }
        match mode {
            Transfer::Move => fs.move_path(from, to),
            Transfer::Copy => fs.copy_all(from, to),
        }
    }

    /// Moves a local file to the trash.
    pub fn trash(&self, source: &VfsPath) -> Result<VfsPath> {
        let target = self.interner().child(&self.interner().trash_root(), source.name())?;
        self.move_file(source, &target)
    }

    /// Moves a trashed item back to its original location.
    pub fn restore(&self, path: &VfsPath) -> Result<VfsPath> {
        let location = trash_path::decode(path)?;
        let record = trashinfo::read_entry(
            &self.registry,
            location.trash_id,
            &location.file_id,
            location.relative.as_deref(),
        )?;

        if let Some(parent) = record.original_path.parent() {
            self.registry.filesystem().create_dir_all(parent, 0o755)?;
        }
        let target = self.interner().resolve_path(&record.original_path);
        self.move_file(path, &target)
    }

    /// Deletes every item in every known trash. Returns the number of items removed.
    pub fn empty_trash(&self) -> Result<usize> {
        let items = self.scandir(&self.interner().trash_root(), false)?;
        for item in &items.paths {
            self.remove(item)?;
        }
        Ok(items.paths.len())
    }
}

impl std::fmt::Debug for TrashVfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashVfs").field("registry", &self.registry).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{fixture, Fixture};
    use std::ffi::OsStr;
    use std::os::unix::fs::symlink;

    fn vfs(fx: &Fixture) -> TrashVfs {
        TrashVfs::new(Arc::clone(&fx.registry))
    }

    fn drain(fx: &Fixture) -> usize {
        fx.events.try_iter().count()
    }

    #[test]
    fn root_info_tracks_fill_state() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let root = vfs.interner().trash_root();

        let info = vfs.get_info(&root).unwrap();
        assert!(info.is_dir());
        assert_eq!(info.size, 0);
        assert_eq!(info.display_name, "Trash");
        assert_eq!(info.custom_icon.as_deref(), Some("user-trash"));

        let source = fx.home().join("a.txt");
        std::fs::write(&source, "x").unwrap();
        vfs.trash(&vfs.interner().resolve_path(&source)).unwrap();
        fx.registry.rescan();

        let info = vfs.get_info(&root).unwrap();
        assert_eq!(info.size, 4096);
        assert_eq!(info.custom_icon.as_deref(), Some("user-trash-full"));
        assert!(info.mtime > 0);
    }

    #[test]
    fn trash_list_and_restore() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let source = fx.home().join("docs").join("report.pdf");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "pdf").unwrap();

        let trashed = vfs.trash(&vfs.interner().resolve_path(&source)).unwrap();
        assert_eq!(trashed.to_uri_string(), "trash:///0-report.pdf");
        assert!(!source.exists());
        assert_eq!(fx.events.try_recv().unwrap().kind, MonitorEventKind::Changed);

        let listing = vfs.listdir(&vfs.interner().trash_root()).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].path, trashed);
        assert_eq!(listing[0].display_name, "report.pdf");
        assert_eq!(listing[0].kind, FileKind::Regular);

        assert_eq!(
            vfs.get_metadata(&trashed, TrashMetadata::OriginalPath).unwrap(),
            source.to_string_lossy()
        );
        assert_eq!(vfs.get_metadata(&trashed, TrashMetadata::DeletionDate).unwrap().len(), 19);

        drain(&fx);
        let restored = vfs.restore(&trashed).unwrap();
        assert_eq!(restored.to_path_buf(), source);
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "pdf");
        assert!(vfs.get_info(&trashed).unwrap_err().is_not_found());
        assert!(vfs.scandir(&vfs.interner().trash_root(), false).unwrap().paths.is_empty());
        assert!(drain(&fx) >= 1);
    }

    #[test]
    fn display_name_comes_from_original_path() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let interner = vfs.interner();
        for dir in ["x", "y"] {
            let source = fx.home().join(dir).join("same");
            std::fs::create_dir_all(source.parent().unwrap()).unwrap();
            std::fs::write(&source, dir).unwrap();
            vfs.trash(&interner.resolve_path(&source)).unwrap();
        }
        let second = interner.resolve("trash:///0-same$1").unwrap();
        let info = vfs.get_info(&second).unwrap();
        assert_eq!(info.display_name, "same");
        assert_eq!(info.path.name(), OsStr::new("0-same$1"));
    }

    #[test]
    fn moving_within_the_trash_is_refused() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let interner = vfs.interner();
        let a = interner.resolve("trash:///0-a").unwrap();
        let b = interner.resolve("trash:///0-b").unwrap();
        assert!(matches!(vfs.move_file(&a, &b), Err(CoreError::Unsupported(_))));
        assert!(matches!(vfs.copy_file(&a, &b), Err(CoreError::Unsupported(_))));
        assert!(vfs.move_file(&interner.trash_root(), &interner.home()).is_err());
        assert!(vfs.move_file(&interner.home(), &interner.root()).is_err());
    }

    #[test]
    fn copy_into_trash_keeps_source() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let source = fx.home().join("keep.txt");
        std::fs::write(&source, "k").unwrap();
        let interner = vfs.interner();
        let target = interner.child(&interner.trash_root(), "keep.txt").unwrap();

        let copied = vfs.copy_file(&interner.resolve_path(&source), &target).unwrap();
        assert!(source.exists());
        assert_eq!(std::fs::read_to_string(vfs.resolve(&copied).unwrap()).unwrap(), "k");

        let back = fx.home().join("copy.txt");
        vfs.copy_file(&copied, &interner.resolve_path(&back)).unwrap();
        assert!(back.exists());
        assert!(vfs.resolve(&copied).unwrap().exists());
    }

    #[test]
    fn subfolders_of_trashed_directories() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let interner = vfs.interner();
        let dir = fx.home().join("project");
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("README"), "r").unwrap();

        let trashed = vfs.trash(&interner.resolve_path(&dir)).unwrap();
        let scanned = vfs.scandir(&trashed, false).unwrap();
        assert_eq!(scanned.paths.len(), 2);
        assert_eq!(scanned.directories.len(), 1);
        assert_eq!(scanned.directories[0].name(), OsStr::new("src"));

        let root_scan = vfs.scandir(&interner.trash_root(), false).unwrap();
        assert_eq!(root_scan.directories, vec![trashed.clone()]);

        // Moving into a subfolder needs no new trash info.
        let extra = fx.home().join("extra");
        std::fs::write(&extra, "e").unwrap();
        let inside = interner.relative(&trashed, "src/extra").unwrap();
        vfs.move_file(&interner.resolve_path(&extra), &inside).unwrap();
        assert!(vfs.resolve(&trashed).unwrap().join("src").join("extra").exists());
        let info_dir = fx.registry.get_trash_dir(0).unwrap().join("info");
        assert_eq!(std::fs::read_dir(info_dir).unwrap().count(), 1);

        assert_eq!(
            vfs.get_metadata(&inside, TrashMetadata::OriginalPath).unwrap(),
            dir.join("src").join("extra").to_string_lossy()
        );

        vfs.remove(&inside).unwrap();
        assert!(!vfs.resolve(&inside).unwrap().exists());
    }

    #[test]
    fn failed_move_drops_the_new_entry() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let missing = vfs.interner().resolve_path(fx.home().join("ghost"));
        assert!(vfs.trash(&missing).unwrap_err().is_not_found());

        let info_dir = fx.registry.get_trash_dir(0).unwrap().join("info");
        assert_eq!(std::fs::read_dir(info_dir).unwrap().count(), 0);
    }

    #[test]
    fn translate_and_link_targets() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let interner = vfs.interner();
        let link = fx.home().join("link");
        symlink("/somewhere/else", &link).unwrap();

        let trashed = vfs.trash(&interner.resolve_path(&link)).unwrap();
        assert_eq!(vfs.get_info(&trashed).unwrap().kind, FileKind::Symlink);
        assert_eq!(vfs.get_metadata(&trashed, TrashMetadata::LinkTarget).unwrap(), "/somewhere/else");

        let local = vfs.translate(&trashed, PathScheme::File).unwrap();
        assert_eq!(local.to_path_buf(), vfs.resolve(&trashed).unwrap());
        assert!(vfs.translate(&local, PathScheme::Trash).is_err());
        assert!(vfs.translate(&trashed, PathScheme::Trash).unwrap().ptr_eq(&trashed));
    }

    #[test]
    fn transfers_report_created_and_deleted_paths() {
        let fx = fixture();
        let vfs = vfs(&fx);
        let source = fx.home().join("gone.txt");
        std::fs::write(&source, "g").unwrap();
        let local = vfs.interner().resolve_path(&source);

        let trashed = vfs.trash(&local).unwrap();
        let events: Vec<_> = fx.events.try_iter().map(|event| (event.kind, event.path)).collect();
        assert_eq!(
            events,
            vec![
                (MonitorEventKind::Changed, vfs.interner().trash_root()),
                (MonitorEventKind::Created, trashed.clone()),
                (MonitorEventKind::Deleted, local.clone()),
            ]
        );

        vfs.remove(&trashed).unwrap();
        let events: Vec<_> = fx.events.try_iter().map(|event| (event.kind, event.path)).collect();
        assert_eq!(
            events,
            vec![
                (MonitorEventKind::Changed, vfs.interner().trash_root()),
                (MonitorEventKind::Deleted, trashed),
            ]
        );

        // A failed move announces nothing but the stale entry cleanup.
        let ghost = vfs.interner().resolve_path(fx.home().join("ghost"));
        assert!(vfs.trash(&ghost).is_err());
        assert!(fx
            .events
            .try_iter()
            .all(|event| event.kind == MonitorEventKind::Changed));
    }

    #[test]
    fn empty_trash_removes_everything() {
        let fx = fixture();
        let vfs = vfs(&fx);
        for name in ["one", "two", "three"] {
            let source = fx.home().join(name);
            std::fs::write(&source, name).unwrap();
            vfs.trash(&vfs.interner().resolve_path(&source)).unwrap();
        }
        assert_eq!(vfs.empty_trash().unwrap(), 3);
        assert!(vfs.listdir(&vfs.interner().trash_root()).unwrap().is_empty());
        assert!(vfs.get_info(&vfs.interner().resolve_path("/tmp")).is_err());
    }
}
