//! Runtime configuration of the trash subsystem.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{CoreError, Result};

/// Default period of the automatic trash rescan.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_millis(5000);

/// Default mount table.
pub const DEFAULT_MOUNTS_FILE: &str = "/proc/self/mounts";

#[derive(Debug, Clone)]
pub struct TrashConfig {
    pub home_dir: PathBuf,
    /// User data directory; the home trash lives in `<data_home>/Trash`.
    pub data_home: PathBuf,
    pub uid: u32,
    pub rescan_interval: Duration,
    pub mounts_file: PathBuf,
    /// Fixed set of volume toplevels used instead of the mount table.
    pub volumes: Option<Vec<PathBuf>>,
}

impl TrashConfig {
    /// Configuration for `home_dir` with every other value at its default.
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        let data_home = home_dir.join(".local").join("share");
        Self {
            home_dir,
            data_home,
            uid: current_uid(),
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            mounts_file: PathBuf::from(DEFAULT_MOUNTS_FILE),
            volumes: None,
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let environ: HashMap<String, String> = env::vars().collect();
        Self::from_environ(&environ)
    }

    /// Reads the configuration from an explicit environment map.
    pub fn from_environ(environ: &HashMap<String, String>) -> Result<Self> {
        let home_dir = environ
            .get("HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| CoreError::not_found("HOME is not set"))?;

        let mut config = Self::new(home_dir);
        if let Some(data_home) = environ.get("XDG_DATA_HOME").filter(|v| Path::new(v).is_absolute()) {
            config.data_home = PathBuf::from(data_home);
        }
        if let Some(millis) = environ.get("TRASH_RESCAN_INTERVAL_MS") {
            match millis.parse::<u64>() {
                Ok(millis) if millis > 0 => config.rescan_interval = Duration::from_millis(millis),
                _ => tracing::warn!(value = %millis, "ignoring invalid TRASH_RESCAN_INTERVAL_MS"),
            }
        }
        if let Some(volumes) = environ.get("TRASH_VOLUMES").filter(|v| !v.is_empty()) {
            config.volumes = Some(
                volumes
                    .split(':')
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
                    .collect(),
            );
        }
        Ok(config)
    }

    pub fn with_data_home(mut self, data_home: impl Into<PathBuf>) -> Self {
        self.data_home = data_home.into();
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    pub fn with_mounts_file(mut self, mounts_file: impl Into<PathBuf>) -> Self {
        self.mounts_file = mounts_file.into();
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<PathBuf>) -> Self {
        self.volumes = Some(volumes);
        self
    }

    /// Location of the home trash directory.
    pub fn home_trash_dir(&self) -> PathBuf {
        self.data_home.join("Trash")
    }
}

/// Real user id of the calling process.
pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

/// Real group id of the calling process.
pub fn current_gid() -> u32 {
    // SAFETY: getgid has no preconditions and cannot fail.
    unsafe { libc::getgid() }
}
