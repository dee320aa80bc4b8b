use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossbeam::channel;
use tracing_subscriber::EnvFilter;
use trash_vfs_core::prelude::*;
use trash_vfs_core::{helpers, uri_list_to_string};

const UNKNOWN_DELETION_DATE: &str = "????-??-?? ??:??:??";

#[derive(Parser)]
#[command(name = "trash-vfs", version, about = "Browse and manage the freedesktop.org trash")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the trash (or a folder inside it)
    Ls {
        /// trash: URI to list
        #[arg(default_value = "trash:///")]
        uri: String,
        /// Print sizes instead of deletion dates
        #[arg(long)]
        size: bool,
    },
    /// Move files to the trash
    Put {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Move a trashed item back to where it came from
    Restore { uri: String },
    /// Delete items from the trash for good
    Rm {
        #[arg(required = true)]
        uris: Vec<String>,
    },
    /// Delete everything in every trash
    Empty,
    /// Show details about a trash path
    Info { uri: String },
    /// Print the canonical URI of a path
    Uri {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List the known trash directories
    Volumes,
    /// Print change events as the trash is rescanned
    Watch {
        /// Stop after this many events
        #[arg(long)]
        count: Option<usize>,
    },
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn deletion_date(vfs: &TrashVfs, path: &VfsPath) -> String {
    vfs.get_metadata(path, TrashMetadata::DeletionDate)
        .ok()
        .and_then(|date| helpers::parse_trash_datetime(&date))
        .map(|date| date.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| UNKNOWN_DELETION_DATE.to_string())
}

fn run(cli: Cli, out: &mut impl Write) -> Result<bool> {
    let config = TrashConfig::from_env()?;

    if let Commands::Watch { count } = cli.command {
        return watch(config, count, out);
    }

    let registry = TrashRegistry::init(config);
    let vfs = TrashVfs::new(Arc::clone(&registry));
    let interner = Arc::clone(registry.interner());
    let mut ok = true;

    match cli.command {
        Commands::Ls { uri, size } => {
            let folder = interner.resolve(&uri)?;
            let mut entries = vfs.listdir(&folder)?;
            entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
            for entry in entries {
                let attribute = if size {
                    helpers::print_size(entry.size)
                } else {
                    deletion_date(&vfs, &entry.path)
                };
                let original = vfs
                    .get_metadata(&entry.path, TrashMetadata::OriginalPath)
                    .unwrap_or_else(|_| entry.display_name.clone());
                writeln!(out, "{attribute} {original}").map_err(|err| CoreError::io("<stdout>", err))?;
            }
        }
        Commands::Put { files } => {
            for file in files {
                let result = absolute(&file)
                    .map_err(|err| CoreError::io(&file, err))
                    .and_then(|path| vfs.trash(&interner.resolve_path(path)));
                match result {
                    Ok(trashed) => tracing::info!(file = ?file, %trashed, "trashed"),
                    Err(err) => {
                        eprintln!("trash-vfs: cannot trash '{}': {}", file.display(), err);
                        ok = false;
                    }
                }
            }
        }
        Commands::Restore { uri } => {
            let restored = vfs.restore(&interner.resolve(&uri)?)?;
            writeln!(out, "{restored}").map_err(|err| CoreError::io("<stdout>", err))?;
        }
        Commands::Rm { uris } => {
            for uri in uris {
                if let Err(err) = interner.resolve(&uri).and_then(|path| vfs.remove(&path)) {
                    eprintln!("trash-vfs: failed to remove {uri}: {err}");
                    ok = false;
                }
            }
        }
        Commands::Empty => {
            let removed = vfs.empty_trash()?;
            tracing::info!(removed, "emptied trash");
        }
        Commands::Info { uri } => {
            let path = interner.resolve(&uri)?;
            let info = vfs.get_info(&path)?;
            let mut lines = vec![
                format!("uri: {}", path.to_uri_string()),
                format!("name: {}", info.display_name),
                format!("type: {:?}", info.kind),
                format!("size: {}", helpers::print_size(info.size)),
                format!("mode: {:o}", info.mode),
            ];
            if let Some(icon) = &info.custom_icon {
                lines.push(format!("icon: {icon}"));
            }
            if !path.is_root() {
                if let Ok(local) = vfs.resolve(&path) {
                    lines.push(format!("location: {}", local.display()));
                }
                if let Ok(original) = vfs.get_metadata(&path, TrashMetadata::OriginalPath) {
                    lines.push(format!("original: {original}"));
                }
                lines.push(format!("deleted: {}", deletion_date(&vfs, &path)));
            }
            for line in lines {
                writeln!(out, "{line}").map_err(|err| CoreError::io("<stdout>", err))?;
            }
        }
        Commands::Uri { paths } => {
            let resolved = paths
                .iter()
                .map(|path| {
                    if path.contains(':') {
                        interner.resolve(path)
                    } else {
                        absolute(Path::new(path))
                            .map(|absolute| interner.resolve_path(absolute))
                            .map_err(|err| CoreError::io(path, err))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            write!(out, "{}", uri_list_to_string(&resolved)).map_err(|err| CoreError::io("<stdout>", err))?;
        }
        Commands::Volumes => {
            registry.rescan_mounts();
            for (id, trash) in registry.trashes().iter().enumerate() {
                writeln!(out, "{id}\t{}\t{}", trash.top_dir.display(), trash.trash_dir.display())
                    .map_err(|err| CoreError::io("<stdout>", err))?;
            }
        }
        Commands::Watch { .. } => unreachable!("handled above"),
    }

    registry.shutdown();
    Ok(ok)
}

fn watch(config: TrashConfig, count: Option<usize>, out: &mut impl Write) -> Result<bool> {
    let (tx, rx) = channel::unbounded::<ChangeEvent>();
    let registry = TrashRegistry::builder(config).change_sink(Arc::new(tx)).init();
    registry.scan();

    let mut seen = 0;
    for event in rx.iter() {
        writeln!(out, "{:?}\t{}", event.kind, event.path).map_err(|err| CoreError::io("<stdout>", err))?;
        seen += 1;
        if count.is_some_and(|count| seen >= count) {
            break;
        }
    }

    registry.shutdown();
    Ok(true)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match run(cli, &mut out) {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(err) => {
            eprintln!("trash-vfs: {err}");
            exit(1);
        }
    }
}
