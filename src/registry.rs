//! The table of known trash directories.
//!
//! Entry 0 is always the home trash. Other entries are appended the first
//! time a device's trash directory is discovered and keep their id for the
//! lifetime of the registry, even after the device goes away.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::TrashConfig;
use crate::errors::{CoreError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::models::{ChangeSink, MonitorEventKind, NullSink, TrashDirectory, TrashId, HOME_TRASH_ID};
use crate::mounts::{mount_point_for_device, FixedVolumes, MountTable, ProcMounts};
use crate::path::{PathInterner, VfsPath};
use crate::scheduler::{Scheduler, ThreadScheduler, TimerHandle};

const STICKY_OTHER_WX: u32 = libc::S_ISVTX as u32 | libc::S_IWOTH as u32 | libc::S_IXOTH as u32;

/// Collaborators for a [`TrashRegistry`]; anything left unset gets the real implementation.
pub struct RegistryBuilder {
    config: TrashConfig,
    interner: Option<Arc<PathInterner>>,
    fs: Option<Arc<dyn FileSystem>>,
    mounts: Option<Arc<dyn MountTable>>,
    sink: Option<Arc<dyn ChangeSink>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl RegistryBuilder {
    pub fn interner(mut self, interner: Arc<PathInterner>) -> Self {
        self.interner = Some(interner);
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn mount_table(mut self, mounts: Arc<dyn MountTable>) -> Self {
        self.mounts = Some(mounts);
        self
    }

    pub fn change_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Registers the home trash and returns the ready registry.
    pub fn init(self) -> Arc<TrashRegistry> {
        let RegistryBuilder {
            config,
            interner,
            fs,
            mounts,
            sink,
            scheduler,
        } = self;

        let interner = interner.unwrap_or_else(|| Arc::new(PathInterner::new(&config.home_dir)));
        let fs = fs.unwrap_or_else(|| Arc::new(RealFileSystem));
        let mounts: Arc<dyn MountTable> = match (mounts, &config.volumes) {
            (Some(mounts), _) => mounts,
            (None, Some(volumes)) => Arc::new(FixedVolumes::new(volumes.clone())),
            (None, None) => Arc::new(ProcMounts::new(&config.mounts_file)),
        };
        let sink = sink.unwrap_or_else(|| Arc::new(NullSink));
        let scheduler = scheduler.unwrap_or_else(|| Arc::new(ThreadScheduler));

        let home_dev = match fs.metadata(&config.home_dir) {
            Ok(metadata) => Some(metadata.dev()),
            Err(err) => {
                tracing::warn!(home = ?config.home_dir, %err, "cannot stat home directory");
                None
            }
        };

        let mut home = TrashDirectory::new(config.home_dir.clone(), config.home_trash_dir());
        home.mtime = Some(0);
        tracing::debug!(trash_dir = ?home.trash_dir, "registered home trash");

        Arc::new_cyclic(|this| TrashRegistry {
            config,
            interner,
            fs,
            mounts,
            sink,
            scheduler,
            home_dev,
            state: Mutex::new(RegistryState {
                trashes: vec![home],
                timer: TimerState::Idle,
            }),
            this: this.clone(),
        })
    }
}

enum TimerState {
    Idle,
    /// Claimed by a rescan that is installing the timer.
    Pending,
    Running(TimerHandle),
    ShutDown,
}

struct RegistryState {
    trashes: Vec<TrashDirectory>,
    timer: TimerState,
}

impl RegistryState {
    /// Looks up a mount trash by its directory; 0 if unknown.
    fn resolve_trash_dir_to_id(&self, trash_dir: &Path) -> TrashId {
        self.trashes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, trash)| trash.trash_dir == trash_dir)
            .and_then(|(id, _)| TrashId::try_from(id).ok())
            .unwrap_or(HOME_TRASH_ID)
    }

    fn get(&self, trash_id: TrashId) -> Result<&TrashDirectory> {
        usize::try_from(trash_id)
            .ok()
            .and_then(|idx| self.trashes.get(idx))
            .ok_or_else(|| CoreError::not_found(format!("no trash with id {trash_id}")))
    }
}

/// Registry of trash directories plus the collaborators every trash operation needs.
pub struct TrashRegistry {
    config: TrashConfig,
    interner: Arc<PathInterner>,
    fs: Arc<dyn FileSystem>,
    mounts: Arc<dyn MountTable>,
    sink: Arc<dyn ChangeSink>,
    scheduler: Arc<dyn Scheduler>,
    home_dev: Option<u64>,
    state: Mutex<RegistryState>,
    this: Weak<TrashRegistry>,
}

impl TrashRegistry {
    pub fn builder(config: TrashConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            interner: None,
            fs: None,
            mounts: None,
            sink: None,
            scheduler: None,
        }
    }

    /// Registry with the real filesystem, mount table and timer thread.
    pub fn init(config: TrashConfig) -> Arc<Self> {
        Self::builder(config).init()
    }

    pub fn config(&self) -> &TrashConfig {
        &self.config
    }

    pub fn interner(&self) -> &Arc<PathInterner> {
        &self.interner
    }

    pub fn filesystem(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Device of the home directory, if it could be determined.
    pub fn home_dev(&self) -> Option<u64> {
        self.home_dev
    }

    pub(crate) fn notify(&self, kind: MonitorEventKind, path: &VfsPath) {
        self.sink.feed(kind, path);
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of registered trash directories.
    pub fn len(&self) -> usize {
        self.lock().trashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered trash, indexed by trash-id.
    pub fn trashes(&self) -> Vec<TrashDirectory> {
        self.lock().trashes.clone()
    }

    pub fn get_top_dir(&self, trash_id: TrashId) -> Result<PathBuf> {
        Ok(self.lock().get(trash_id)?.top_dir.clone())
    }

    pub fn get_trash_dir(&self, trash_id: TrashId) -> Result<PathBuf> {
        Ok(self.lock().get(trash_id)?.trash_dir.clone())
    }

    /// Returns `(all_empty, newest_mtime)` over the cached state of every trash.
    pub fn summary(&self) -> (bool, i64) {
        let state = self.lock();
        let empty = state.trashes.iter().all(|trash| trash.empty);
        let mtime = state
            .trashes
            .iter()
            .filter_map(|trash| trash.mtime)
            .max()
            .unwrap_or(0);
        (empty, mtime)
    }

    /// True once the periodic rescan has been set up.
    pub fn is_scanning(&self) -> bool {
        matches!(self.lock().timer, TimerState::Pending | TimerState::Running(_))
    }

    /// Looks for trash directories on newly mounted devices.
    pub fn rescan_mounts(&self) {
        let mut state = self.lock();
        self.rescan_mounts_locked(&mut state);
    }

    fn rescan_mounts_locked(&self, state: &mut RegistryState) {
        let mounts = match self.mounts.active_mounts() {
            Ok(mounts) => mounts,
            Err(err) => {
                tracing::warn!(%err, "failed to list active mount points");
                return;
            }
        };

        for mount in mounts.into_iter().filter(|mount| mount.is_trash_candidate()) {
            let Some(trash_dir) = self.trash_dir_for_mount_point(&mount.folder, false) else {
                continue;
            };
            if state.resolve_trash_dir_to_id(&trash_dir) == HOME_TRASH_ID {
                tracing::info!(top_dir = ?mount.folder, ?trash_dir, id = state.trashes.len(), "registered trash directory");
                state.trashes.push(TrashDirectory::new(mount.folder, trash_dir));
            }
        }
    }

    /// Rescans every known trash and reports a change on the trash root for each
    /// one whose `files/` directory was modified. Returns the number of changed trashes.
    ///
    /// The first call also rescans the mount table and starts the periodic timer.
    pub fn rescan(&self) -> usize {
        let mut install_timer = false;
        let mut changed = 0;
        {
            let mut state = self.lock();
            if matches!(state.timer, TimerState::Idle) {
                self.rescan_mounts_locked(&mut state);
                state.timer = TimerState::Pending;
                install_timer = true;
            }

            for trash in state.trashes.iter_mut() {
                let files_dir = trash.files_dir();
                let mtime = self
                    .fs
                    .symlink_metadata(&files_dir)
                    .map(|metadata| metadata.mtime())
                    .unwrap_or(0);
                if trash.mtime != Some(mtime) {
                    trash.mtime = Some(mtime);
                    trash.empty = self.fs.is_dir_empty(&files_dir);
                    changed += 1;
                    tracing::debug!(trash_dir = ?trash.trash_dir, mtime, empty = trash.empty, "trash changed");
                }
            }
        }

        if install_timer {
            self.install_timer();
        }

        let trash_root = self.interner.trash_root();
        for _ in 0..changed {
            self.notify(MonitorEventKind::Changed, &trash_root);
        }
        changed
    }

    /// Runs the first rescan if none happened yet.
    pub fn scan(&self) {
        if matches!(self.lock().timer, TimerState::Idle) {
            self.rescan();
        }
    }

    fn install_timer(&self) {
        let this = self.this.clone();
        let handle = self.scheduler.schedule_periodic(
            self.config.rescan_interval,
            Box::new(move || match this.upgrade() {
                Some(registry) => {
                    registry.rescan();
                    true
                }
                None => false,
            }),
        );

        let mut state = self.lock();
        if matches!(state.timer, TimerState::Pending) {
            state.timer = TimerState::Running(handle);
        } else {
            drop(state);
            handle.cancel();
        }
    }

    /// Stops the periodic rescan. Registered entries stay valid.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut self.lock().timer, TimerState::ShutDown);
        if let TimerState::Running(handle) = previous {
            handle.cancel();
        }
        tracing::debug!("trash registry shut down");
    }

    /// Checks that `dir` is a directory owned by the user with mode `0700`.
    pub fn validate_trash_dir(&self, dir: &Path) -> Result<()> {
        let metadata = self.fs.symlink_metadata(dir)?;
        self.check_private_dir(dir, &metadata)
    }

    fn check_private_dir(&self, dir: &Path, metadata: &Metadata) -> Result<()> {
        if metadata.uid() == self.config.uid && metadata.is_dir() && metadata.mode() & 0o777 == 0o700 {
            Ok(())
        } else {
            Err(CoreError::SecurityRejected(
                dir.to_path_buf(),
                format!(
                    "expected a directory owned by uid {} with mode 0700, found uid {} mode {:o}",
                    self.config.uid,
                    metadata.uid(),
                    metadata.mode() & 0o7777
                ),
            ))
        }
    }

    fn check_admin_dir(dir: &Path, metadata: &Metadata) -> Result<()> {
        if metadata.uid() == 0 && metadata.is_dir() && metadata.mode() & STICKY_OTHER_WX == STICKY_OTHER_WX {
            Ok(())
        } else {
            Err(CoreError::SecurityRejected(
                dir.to_path_buf(),
                format!(
                    "expected a sticky, world-writable directory owned by root, found uid {} mode {:o}",
                    metadata.uid(),
                    metadata.mode() & 0o7777
                ),
            ))
        }
    }

    /// Locates (and with `create`, creates) the user's trash directory below `top_dir`.
    ///
    /// `<top_dir>/.Trash/<uid>` is preferred when the administrator provided a
    /// valid `.Trash`; otherwise `<top_dir>/.Trash-<uid>` is used. Directories
    /// that exist but fail the ownership checks are logged and never used.
    pub fn trash_dir_for_mount_point(&self, top_dir: &Path, create: bool) -> Option<PathBuf> {
        let uid = self.config.uid;

        let admin_dir = top_dir.join(".Trash");
        if let Ok(metadata) = self.fs.symlink_metadata(&admin_dir) {
            match Self::check_admin_dir(&admin_dir, &metadata) {
                Ok(()) => {
                    let trash_dir = admin_dir.join(uid.to_string());
                    if let Some(found) = self.use_or_create(trash_dir, create) {
                        return Some(found);
                    }
                }
                Err(err) => tracing::warn!(%err, "root trash directory didn't pass the security checks, can't use it"),
            }
        }

        self.use_or_create(top_dir.join(format!(".Trash-{uid}")), create)
    }

    fn use_or_create(&self, trash_dir: PathBuf, create: bool) -> Option<PathBuf> {
        match self.fs.symlink_metadata(&trash_dir) {
            Ok(metadata) => match self.check_private_dir(&trash_dir, &metadata) {
                Ok(()) => Some(trash_dir),
                Err(err) => {
                    tracing::warn!(%err, "trash directory didn't pass the security checks, can't use it");
                    None
                }
            },
            Err(err) if create && err.is_not_found() => {
                self.initialize_trash_dir(&trash_dir).then_some(trash_dir)
            }
            Err(_) => None,
        }
    }

    /// Creates a fresh trash directory with its `info/` and `files/` folders.
    ///
    /// The directory is removed again if it ends up unusable, e.g. on file
    /// systems that mangle the `.Trash-<uid>` name.
    fn initialize_trash_dir(&self, trash_dir: &Path) -> bool {
        if let Err(err) = self.fs.create_dir(trash_dir, 0o700) {
            tracing::debug!(?trash_dir, %err, "cannot create trash directory");
            return false;
        }

        let usable = self.trash_dir_is_usable(trash_dir)
            && self.fs.create_dir(&trash_dir.join("info"), 0o700).is_ok()
            && self.fs.create_dir(&trash_dir.join("files"), 0o700).is_ok();

        if usable {
            tracing::info!(?trash_dir, "created trash directory");
        } else {
            tracing::warn!(?trash_dir, "created trash directory is unusable, removing it");
            if let Err(err) = self.fs.remove(trash_dir) {
                tracing::debug!(?trash_dir, %err, "failed to remove unusable trash directory");
            }
        }
        usable
    }

    fn trash_dir_is_usable(&self, trash_dir: &Path) -> bool {
        if let Err(err) = self.validate_trash_dir(trash_dir) {
            tracing::warn!(%err, "new trash directory failed the security checks");
            return false;
        }

        let (Some(parent), Some(name)) = (trash_dir.parent(), trash_dir.file_name()) else {
            return false;
        };
        self.fs
            .list_dir(parent)
            .map(|names| names.iter().any(|entry| entry == name))
            .unwrap_or(false)
    }

    /// Picks the trash that receives `absolute_path`.
    ///
    /// Files on the home device (or that cannot be stat'ed) go to the home
    /// trash; others go to the trash of their mount point, which is created on
    /// demand.
    pub fn trash_id_for_file(&self, absolute_path: &Path) -> TrashId {
        let dev = match self.fs.symlink_metadata(absolute_path) {
            Ok(metadata) if Some(metadata.dev()) != self.home_dev => metadata.dev(),
            _ => return HOME_TRASH_ID,
        };

        let mut state = self.lock();
        let mount_point = match mount_point_for_device(self.mounts.as_ref(), self.fs.as_ref(), dev) {
            Ok(mount_point) => mount_point,
            Err(err) => {
                tracing::warn!(%err, "failed to determine mount point");
                None
            }
        };
        let Some(trash_dir) = mount_point.and_then(|mount| self.trash_dir_for_mount_point(&mount.folder, true)) else {
            return HOME_TRASH_ID;
        };

        let mut trash_id = state.resolve_trash_dir_to_id(&trash_dir);
        if trash_id == HOME_TRASH_ID {
            self.rescan_mounts_locked(&mut state);
            trash_id = state.resolve_trash_dir_to_id(&trash_dir);
        }
        trash_id
    }
}

impl std::fmt::Debug for TrashRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashRegistry")
            .field("home_dir", &self.config.home_dir)
            .field("trashes", &self.lock().trashes)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ChangeEvent;
    use crate::scheduler::ManualScheduler;
    use crossbeam::channel::Receiver;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub temp: TempDir,
        pub registry: Arc<TrashRegistry>,
        pub events: Receiver<ChangeEvent>,
        pub scheduler: ManualScheduler,
    }

    impl Fixture {
        pub fn home(&self) -> PathBuf {
            self.temp.path().join("home")
        }

        pub fn volume(&self) -> PathBuf {
            self.temp.path().join("volume")
        }
    }

    /// Registry with a home below a temp dir and one fixed volume next to it.
    pub(crate) fn fixture() -> Fixture {
        fixture_with(|config| config)
    }

    pub(crate) fn fixture_with(adjust: impl FnOnce(TrashConfig) -> TrashConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let volume = temp.path().join("volume");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&volume).unwrap();

        let config = adjust(TrashConfig::new(&home).with_rescan_interval(Duration::from_secs(5)));
        let (tx, events) = crossbeam::channel::unbounded();
        let scheduler = ManualScheduler::new();
        let registry = TrashRegistry::builder(config)
            .mount_table(Arc::new(FixedVolumes::new(vec![volume])))
            .change_sink(Arc::new(tx))
            .scheduler(Arc::new(scheduler.clone()))
            .init();

        Fixture {
            temp,
            registry,
            events,
            scheduler,
        }
    }

    #[test]
    fn home_trash_is_entry_zero() {
        let fx = fixture();
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.registry.get_top_dir(0).unwrap(), fx.home());
        assert_eq!(
            fx.registry.get_trash_dir(0).unwrap(),
            fx.home().join(".local").join("share").join("Trash")
        );
        assert!(fx.registry.get_trash_dir(1).unwrap_err().is_not_found());
        assert!(fx.registry.home_dev().is_some());
    }

    #[test]
    fn discovers_existing_volume_trash() {
        let fx = fixture();
        let trash_dir = fx.volume().join(format!(".Trash-{}", fx.registry.config().uid));
        std::fs::create_dir(&trash_dir).unwrap();
        std::fs::set_permissions(&trash_dir, std::fs::Permissions::from_mode(0o700)).unwrap();

        fx.registry.rescan_mounts();
        fx.registry.rescan_mounts();
        assert_eq!(fx.registry.len(), 2);
        assert_eq!(fx.registry.get_trash_dir(1).unwrap(), trash_dir);
        assert_eq!(fx.registry.get_top_dir(1).unwrap(), fx.volume());
    }

    #[test]
    fn rejects_insecure_directories() {
        let fx = fixture();
        let uid = fx.registry.config().uid;
        let trash_dir = fx.volume().join(format!(".Trash-{uid}"));
        std::fs::create_dir(&trash_dir).unwrap();
        std::fs::set_permissions(&trash_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(
            fx.registry.validate_trash_dir(&trash_dir),
            Err(CoreError::SecurityRejected(..))
        ));
        assert_eq!(fx.registry.trash_dir_for_mount_point(&fx.volume(), true), None);
        fx.registry.rescan_mounts();
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn bad_admin_trash_falls_back_to_user_trash() {
        let fx = fixture();
        let admin = fx.volume().join(".Trash");
        std::fs::create_dir(&admin).unwrap();
        std::fs::set_permissions(&admin, std::fs::Permissions::from_mode(0o777)).unwrap();

        let found = fx.registry.trash_dir_for_mount_point(&fx.volume(), true).unwrap();
        let uid = fx.registry.config().uid;
        assert_eq!(found, fx.volume().join(format!(".Trash-{uid}")));
        assert!(found.join("info").is_dir());
        assert!(found.join("files").is_dir());
        assert!(!admin.join(uid.to_string()).exists());
    }

    /// A valid admin `.Trash` must be owned by root, so these only run as root.
    fn admin_trash(fx: &Fixture) -> Option<PathBuf> {
        if crate::config::current_uid() != 0 {
            return None;
        }
        let admin = fx.volume().join(".Trash");
        std::fs::create_dir(&admin).unwrap();
        std::fs::set_permissions(&admin, std::fs::Permissions::from_mode(0o1777)).unwrap();
        Some(admin)
    }

    #[test]
    fn valid_admin_trash_is_preferred() {
        let fx = fixture();
        let Some(admin) = admin_trash(&fx) else {
            return;
        };
        let uid = fx.registry.config().uid;
        let expected = admin.join(uid.to_string());

        assert_eq!(fx.registry.trash_dir_for_mount_point(&fx.volume(), false), None);
        let found = fx.registry.trash_dir_for_mount_point(&fx.volume(), true).unwrap();
        assert_eq!(found, expected);
        assert!(found.join("info").is_dir());
        assert!(found.join("files").is_dir());
        assert!(!fx.volume().join(format!(".Trash-{uid}")).exists());

        assert_eq!(fx.registry.trash_dir_for_mount_point(&fx.volume(), false), Some(expected.clone()));
        fx.registry.rescan_mounts();
        assert_eq!(fx.registry.get_trash_dir(1).unwrap(), expected);
    }

    #[test]
    fn insecure_admin_user_dir_falls_back_to_user_trash() {
        let fx = fixture();
        let Some(admin) = admin_trash(&fx) else {
            return;
        };
        let uid = fx.registry.config().uid;
        let user_dir = admin.join(uid.to_string());
        std::fs::create_dir(&user_dir).unwrap();
        std::fs::set_permissions(&user_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let found = fx.registry.trash_dir_for_mount_point(&fx.volume(), true).unwrap();
        assert_eq!(found, fx.volume().join(format!(".Trash-{uid}")));
        assert!(!user_dir.join("files").exists());
    }

    #[test]
    fn without_create_nothing_is_made() {
        let fx = fixture();
        assert_eq!(fx.registry.trash_dir_for_mount_point(&fx.volume(), false), None);
        assert!(std::fs::read_dir(fx.volume()).unwrap().next().is_none());
    }

    #[test]
    fn second_rescan_without_changes_is_silent() {
        let fx = fixture();
        let files = fx.registry.get_trash_dir(0).unwrap().join("files");
        std::fs::create_dir_all(&files).unwrap();
        std::fs::write(files.join("junk"), "x").unwrap();

        assert_eq!(fx.registry.rescan(), 1);
        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.kind, MonitorEventKind::Changed);
        assert!(event.path.is_root() && event.path.is_trash());
        assert!(!fx.registry.summary().0);

        assert_eq!(fx.registry.rescan(), 0);
        assert!(fx.events.try_recv().is_err());
    }

    #[test]
    fn missing_home_files_dir_is_not_a_change() {
        let fx = fixture();
        assert_eq!(fx.registry.rescan(), 0);
        let (empty, mtime) = fx.registry.summary();
        assert!(empty);
        assert_eq!(mtime, 0);
    }

    #[test]
    fn first_rescan_schedules_the_timer_once() {
        let fx = fixture();
        assert!(!fx.registry.is_scanning());
        fx.registry.scan();
        assert!(fx.registry.is_scanning());
        assert_eq!(fx.scheduler.intervals(), vec![Duration::from_secs(5)]);

        fx.registry.scan();
        fx.registry.rescan();
        assert_eq!(fx.scheduler.active(), 1);
        assert_eq!(fx.scheduler.fire(), 1);

        fx.registry.shutdown();
        assert!(!fx.registry.is_scanning());
        assert_eq!(fx.scheduler.active(), 0);
        fx.registry.rescan();
        assert_eq!(fx.scheduler.active(), 0);
    }

    #[test]
    fn timer_notices_new_trash_contents() {
        let fx = fixture();
        fx.registry.scan();
        while fx.events.try_recv().is_ok() {}

        let files = fx.registry.get_trash_dir(0).unwrap().join("files");
        std::fs::create_dir_all(&files).unwrap();
        fx.scheduler.fire();
        assert_eq!(fx.events.try_recv().unwrap().kind, MonitorEventKind::Changed);
    }

    #[test]
    fn dropped_registry_stops_its_timer() {
        let fx = fixture();
        fx.registry.scan();
        let Fixture { registry, scheduler, .. } = fx;
        drop(registry);
        assert_eq!(scheduler.active(), 0);
    }

    #[test]
    fn files_on_other_devices_get_a_volume_trash() {
        // A home that cannot be stat'ed makes every existing file "foreign".
        let fx = fixture_with(|config| {
            let home = config.home_dir.join("missing");
            TrashConfig { home_dir: home, ..config }
        });
        let victim = fx.volume().join("victim.txt");
        std::fs::write(&victim, "bye").unwrap();

        let id = fx.registry.trash_id_for_file(&victim);
        assert_eq!(id, 1);
        let uid = fx.registry.config().uid;
        assert_eq!(fx.registry.get_trash_dir(1).unwrap(), fx.volume().join(format!(".Trash-{uid}")));
        assert_eq!(fx.registry.trash_id_for_file(&victim), 1);
        assert_eq!(fx.registry.trash_id_for_file(&fx.volume().join("gone")), HOME_TRASH_ID);
    }
}
