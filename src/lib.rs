//! Interned virtual-filesystem paths and a freedesktop.org trash can.
//!
//! [`PathInterner`] turns local paths and `file:` / `trash:` URIs into shared
//! [`VfsPath`] chains. [`TrashRegistry`] keeps track of the home trash and of
//! trash directories on mounted volumes, and [`TrashVfs`] offers file
//! operations on the `trash:///` namespace.

pub mod config;
pub mod errors;
pub mod fs;
pub mod helpers;
pub mod models;
pub mod mounts;
pub mod ops;
pub mod path;
pub mod registry;
pub mod scheduler;
pub mod trash_path;
pub mod trashinfo;
pub mod uri;

pub use config::TrashConfig;
pub use errors::{CoreError, Result};
pub use fs::{FileSystem, RealFileSystem};
pub use helpers::{
    build_unique_basename,
    canonicalize_filename,
    parse_trash_datetime,
    print_size,
    serialize_system_time,
    TRASHINFO_EXTENSION,
    TRASHINFO_TIME_FORMAT,
};
pub use models::{
    ChangeEvent,
    ChangeSink,
    FileKind,
    MonitorEventKind,
    NullSink,
    ScanResult,
    TrashDirectory,
    TrashFileInfo,
    TrashId,
    TrashInfo,
    TrashMetadata,
    HOME_TRASH_ID,
};
pub use mounts::{FixedVolumes, MountPoint, MountTable, ProcMounts};
pub use ops::{LocalScandir, Scandir, TrashVfs};
pub use path::{uri_list_to_string, PathInterner, PathScheme, VfsPath};
pub use registry::{RegistryBuilder, TrashRegistry};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TimerHandle};
pub use trash_path::TrashLocation;

/// Re-export the commonly used API surface.
pub mod prelude {
    pub use crate::{
        config::TrashConfig,
        errors::{CoreError, Result},
        fs::{FileSystem, RealFileSystem},
        models::*,
        ops::TrashVfs,
        path::{PathInterner, PathScheme, VfsPath},
        registry::TrashRegistry,
    };
}
