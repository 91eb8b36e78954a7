//! Per-project cache directory with marker-based freshness.
//!
//! The cache is a hidden `.depscope/` directory next to the root project.
//! It carries two marker files and one staging subdirectory per staged
//! library package (and per staged runtime-support library), named
//! `<id>.<version>`. Freshness is a simple marker comparison: the crate
//! version and the configured exclusion substring must both match what the
//! directory was populated with, otherwise the whole directory is deleted
//! and recreated. No finer-grained invalidation exists.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

const CACHE_DIR_NAME: &str = ".depscope";
const VERSION_MARKER: &str = "version.txt";
const EXCLUDE_MARKER: &str = "exclude.txt";

/// Handle to a prepared per-project cache directory.
#[derive(Debug)]
pub struct PackageCache {
    dir: PathBuf,
    fresh: bool,
}

impl PackageCache {
    /// Prepare the cache directory next to `root_project`.
    ///
    /// A matching version marker and exclusion marker with no force-refresh
    /// leaves the directory untouched (`is_fresh` returns `false`). Any
    /// mismatch, a missing directory, or `force_refresh` deletes and
    /// recreates it and writes the current markers.
    ///
    /// # Errors
    /// Returns [`crate::Error::Configuration`] when `root_project` has no
    /// parent directory, or [`crate::Error::FileError`] on filesystem
    /// failures.
    pub fn prepare(
        root_project: &Path,
        exclusion: Option<&str>,
        force_refresh: bool,
    ) -> Result<Self> {
        let parent = root_project.parent().ok_or_else(|| {
            Error::Configuration(format!(
                "Project '{}' has no parent directory to cache under",
                root_project.display()
            ))
        })?;
        let dir = parent.join(CACHE_DIR_NAME);

        let version = env!("CARGO_PKG_VERSION");
        let exclusion = exclusion.unwrap_or_default();

        if dir.is_dir() && !force_refresh {
            let stored_version = fs::read_to_string(dir.join(VERSION_MARKER)).unwrap_or_default();
            let stored_exclusion = fs::read_to_string(dir.join(EXCLUDE_MARKER)).unwrap_or_default();
            if stored_version.trim() == version && stored_exclusion.trim() == exclusion {
                return Ok(Self { dir, fresh: false });
            }
        }

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(VERSION_MARKER), version)?;
        fs::write(dir.join(EXCLUDE_MARKER), exclusion)?;

        Ok(Self { dir, fresh: true })
    }

    /// Path of the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the directory was (re)populated by this run.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Stage ordered `sources` of one package into `<id>.<version>`.
    ///
    /// Each file is copied under the staging subdirectory at its path
    /// relative to `base`; files outside `base` are staged flat by file
    /// name. Returns the staged paths in input order. A stale cache run
    /// skips copies whose target already exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] when a copy fails.
    pub fn stage(
        &self,
        id: &str,
        version: &str,
        base: &Path,
        sources: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let staging = self.dir.join(format!("{id}.{version}"));
        let mut staged = Vec::with_capacity(sources.len());

        for source in sources {
            let relative = source
                .strip_prefix(base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(source.file_name().unwrap_or_default()));
            let target = staging.join(relative);

            if self.fresh || !target.exists() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(source, &target)?;
            }
            staged.push(target);
        }

        Ok(staged)
    }

    /// Stage every `.fs`/`.fsi` file under `dir` into `<id>.<version>`.
    ///
    /// Used for the runtime-support source override, which is a plain
    /// directory tree rather than a cracked project. Files are collected
    /// recursively and staged in sorted path order.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on filesystem failures.
    pub fn stage_tree(&self, id: &str, version: &str, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut sources = Vec::new();
        collect_sources(dir, &mut sources)?;
        sources.sort();
        self.stage(id, version, dir, &sources)
    }
}

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sources(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "fs" || ext == "fsi") {
            out.push(path);
        }
    }
    Ok(())
}
