//! Overlay composition of the destination tree.
//!
//! Union-mount semantics are emulated with an explicit copy: the winning
//! source for every relative path is computed first (later sources replace
//! earlier ones), then materialized, so each destination file is written
//! exactly once and the result has no remaining linkage to the sources.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Failure while staging a destination tree. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("source {} is not a directory", .0.display())]
    SourceMissing(PathBuf),
    #[error("destination {} already exists and is not empty", .0.display())]
    DestinationNotEmpty(PathBuf),
    #[error("destination {} is not a directory", .0.display())]
    DestinationNotADirectory(PathBuf),
    #[error("walk {}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("stage {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// True when the path's string form contains one of the ignore motifs.
pub fn should_ignore(path: &Path, ignore: &[String]) -> bool {
    let rendered = path.to_string_lossy();
    ignore.iter().any(|motif| rendered.contains(motif.as_str()))
}

/// Compose `sources` into a fresh `destination`, later sources winning on
/// conflicting relative paths.
///
/// The destination must not exist, or must be an empty directory.
#[instrument(skip_all, fields(sources = sources.len(), destination = %destination.display()))]
pub fn compose(
    sources: &[PathBuf],
    destination: &Path,
    ignore: &[String],
) -> Result<(), CompositionError> {
    if destination.exists() {
        if !destination.is_dir() {
            return Err(CompositionError::DestinationNotADirectory(
                destination.to_path_buf(),
            ));
        }
        let mut entries = fs::read_dir(destination).map_err(|err| CompositionError::Io {
            path: destination.to_path_buf(),
            source: err,
        })?;
        if entries.next().is_some() {
            return Err(CompositionError::DestinationNotEmpty(
                destination.to_path_buf(),
            ));
        }
    }
    overlay_into(sources, destination, ignore)
}

/// Merge `sources` into `destination`, which may already hold files.
///
/// Used for the secondary compositions into subdirectories of an already
/// staged destination (`inputs/`, `protocols/`). Same precedence rules as
/// [`compose`].
#[instrument(skip_all, fields(sources = sources.len(), destination = %destination.display()))]
pub fn overlay_into(
    sources: &[PathBuf],
    destination: &Path,
    ignore: &[String],
) -> Result<(), CompositionError> {
    for source in sources {
        if !source.is_dir() {
            return Err(CompositionError::SourceMissing(source.clone()));
        }
    }

    // Relative path -> (winning origin, is_dir). Later sources replace
    // earlier entries, so each destination path is written once.
    let mut winners: BTreeMap<PathBuf, (PathBuf, bool)> = BTreeMap::new();
    for source in sources {
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| CompositionError::Walk {
                path: source.clone(),
                source: err,
            })?;
            if should_ignore(entry.path(), ignore) {
                continue;
            }
            let rel = match entry.path().strip_prefix(source) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            winners.insert(
                rel,
                (entry.path().to_path_buf(), entry.file_type().is_dir()),
            );
        }
    }

    fs::create_dir_all(destination).map_err(|err| CompositionError::Io {
        path: destination.to_path_buf(),
        source: err,
    })?;

    for (rel, (origin, is_dir)) in &winners {
        let target = destination.join(rel);
        if *is_dir {
            fs::create_dir_all(&target).map_err(|err| CompositionError::Io {
                path: target.clone(),
                source: err,
            })?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|err| CompositionError::Io {
                    path: parent.to_path_buf(),
                    source: err,
                })?;
            }
            fs::copy(origin, &target).map_err(|err| CompositionError::Io {
                path: target.clone(),
                source: err,
            })?;
        }
    }

    debug!(entries = winners.len(), "destination staged");
    Ok(())
}
