//! Project graph cracking and build-plan production.
//!
//! # Architecture
//!
//! Cracking is a depth-first walk over project-to-project references
//! starting at a root project (or a single-file script). Each project is
//! resolved through the injected [`ProjectResolver`], its raw compiler
//! arguments are partitioned into sources, binary references and
//! passthrough flags, and the results are merged into one flattened,
//! deduplicated descriptor list. The main project's binary references are
//! then probed for source-shipping library packages, ordered, staged into
//! the per-project cache directory and merged into the final [`BuildPlan`].
//!
//! # Key Components
//!
//! - [`CrackerOptions`] - run configuration (root path, defines, exclusion,
//!   replacements, refresh/optimize toggles)
//! - [`ProjectGraphCracker`] - the walk itself, memoized per run
//! - [`PackageResolver`] / [`DependencyOrderer`] - package detection and
//!   compile ordering
//! - [`BuildPlanAssembler`] / [`BuildPlan`] - final merge
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use depscope::prelude::*;
//!
//! let options = CrackerOptions::new("src/App.fsproj")?
//!     .with_define("DEBUG")
//!     .with_optimize(false);
//! let plan = ProjectGraphCracker::new(options, resolver, invoker).crack()?;
//! ```

mod cache;
mod invoke;
mod order;
mod package;
mod plan;

pub use cache::PackageCache;
pub use invoke::{BuildInvoker, ProjectResolver, ResolvedProject};
pub use order::DependencyOrderer;
pub use package::{LibraryPackage, PackageResolver};
pub use plan::{BuildPlan, BuildPlanAssembler, BASELINE_FLAGS};

use std::{
    collections::{BTreeMap, HashSet},
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    importer::RUNTIME_SUPPORT_UNIT,
    Error, Result,
};

/// Prefix marking a binary reference in resolver output.
pub(crate) const BINARY_REF_PREFIX: &str = "-r:";

/// Compiler flags forwarded unchanged into the plan.
const PASSTHROUGH_FLAG_PREFIXES: &[&str] = &[
    "--define:",
    "--nowarn:",
    "--warnon:",
    "--warnaserror",
    "--langversion:",
];

/// Host-injected flags stripped during partitioning; optimization and
/// debug settings are owned by this system.
const STRIPPED_FLAG_PREFIXES: &[&str] = &[
    "--optimize",
    "--debug",
    "--deterministic",
    "--embed",
    "--sourcelink",
];

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(250);
const LOCK_RETRY_ATTEMPTS: u32 = 20;

/// Configuration of one cracking run.
///
/// Built in place with `with_*` methods; validated once at construction.
#[derive(Debug, Clone)]
pub struct CrackerOptions {
    root: PathBuf,
    definitions: Vec<String>,
    exclusion: Option<String>,
    replacements: BTreeMap<String, PathBuf>,
    force_refresh: bool,
    optimize: bool,
    runtime_support_source: Option<PathBuf>,
}

impl CrackerOptions {
    /// Options for the project or script at `root`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Configuration`] when the file is missing or
    /// carries an extension other than `.fsproj` or `.fsx`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let extension = root.extension().and_then(|ext| ext.to_str());
        if !matches!(extension, Some("fsproj" | "fsx")) {
            return Err(Error::Configuration(format!(
                "'{}' is not a project (.fsproj) or script (.fsx) file",
                root.display()
            )));
        }
        if !root.is_file() {
            return Err(Error::Configuration(format!(
                "Project file '{}' does not exist",
                root.display()
            )));
        }

        let root = if root.is_absolute() {
            normalize_path(root)
        } else {
            normalize_path(&std::env::current_dir()?.join(root))
        };

        Ok(Self {
            root,
            definitions: Vec::new(),
            exclusion: None,
            replacements: BTreeMap::new(),
            force_refresh: false,
            optimize: true,
            runtime_support_source: None,
        })
    }

    /// Add a preprocessor definition.
    #[must_use]
    pub fn with_define(mut self, definition: impl Into<String>) -> Self {
        self.definitions.push(definition.into());
        self
    }

    /// Set the exclusion substring; matching project references are
    /// degraded to rebuilt binary dependencies.
    #[must_use]
    pub fn with_exclusion(mut self, needle: impl Into<String>) -> Self {
        self.exclusion = Some(needle.into());
        self
    }

    /// Remap a package id to a local library-project file.
    #[must_use]
    pub fn with_replacement(mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.replacements.insert(id.into(), path.into());
        self
    }

    /// Force deletion and repopulation of the cache directory.
    #[must_use]
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Set the `--optimize` toggle emitted into the plan.
    #[must_use]
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Stage runtime-support library sources from `path` instead of the
    /// installed package.
    #[must_use]
    pub fn with_runtime_support_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_support_source = Some(path.into());
        self
    }

    /// Absolute, normalized root project path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the root is a single-file script.
    #[must_use]
    pub fn is_script(&self) -> bool {
        self.root.extension().is_some_and(|ext| ext == "fsx")
    }

    /// Configured preprocessor definitions.
    #[must_use]
    pub fn definitions(&self) -> &[String] {
        &self.definitions
    }

    /// Configured exclusion substring, if any.
    #[must_use]
    pub fn exclusion(&self) -> Option<&str> {
        self.exclusion.as_deref()
    }

    /// Configured id→path replacements.
    #[must_use]
    pub fn replacements(&self) -> &BTreeMap<String, PathBuf> {
        &self.replacements
    }
}

/// One cracked project: partitioned resolver output plus resolved packages.
#[derive(Debug)]
pub struct ProjectDescriptor {
    project_path: PathBuf,
    source_paths: Vec<PathBuf>,
    project_references: Vec<PathBuf>,
    binary_references: Vec<(String, PathBuf)>,
    other_flags: Vec<String>,
}

impl ProjectDescriptor {
    /// A descriptor from already-partitioned parts.
    #[must_use]
    pub fn new(
        project_path: PathBuf,
        source_paths: Vec<PathBuf>,
        project_references: Vec<PathBuf>,
        binary_references: Vec<(String, PathBuf)>,
        other_flags: Vec<String>,
    ) -> Self {
        Self {
            project_path,
            source_paths,
            project_references,
            binary_references,
            other_flags,
        }
    }

    /// Normalized path of the project file.
    #[must_use]
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Ordered absolute source paths, globs expanded.
    #[must_use]
    pub fn source_paths(&self) -> &[PathBuf] {
        &self.source_paths
    }

    /// Surviving project references, normalized to absolute paths.
    #[must_use]
    pub fn project_references(&self) -> &[PathBuf] {
        &self.project_references
    }

    /// Binary references as (assembly short name, path), argument order.
    #[must_use]
    pub fn binary_references(&self) -> &[(String, PathBuf)] {
        &self.binary_references
    }

    /// Passthrough compiler flags.
    #[must_use]
    pub fn other_flags(&self) -> &[String] {
        &self.other_flags
    }
}

/// Depth-first, memoized walk over a project graph.
///
/// One instance is one run: the descriptor memo and the rebuild memo are
/// scoped to the instance and a run is strictly sequential. Independent
/// runs use independent instances.
pub struct ProjectGraphCracker<R: ProjectResolver, B: BuildInvoker> {
    options: CrackerOptions,
    resolver: R,
    invoker: B,
    diagnostics: Arc<Diagnostics>,
    cracked: DashMap<PathBuf, Arc<ProjectDescriptor>>,
    rebuilt: DashMap<PathBuf, ()>,
}

impl<R: ProjectResolver, B: BuildInvoker> ProjectGraphCracker<R, B> {
    /// A cracker for one run over `options`.
    #[must_use]
    pub fn new(options: CrackerOptions, resolver: R, invoker: B) -> Self {
        Self {
            options,
            resolver,
            invoker,
            diagnostics: Arc::new(Diagnostics::new()),
            cracked: DashMap::new(),
            rebuilt: DashMap::new(),
        }
    }

    /// The diagnostics sink collecting non-fatal findings of this run.
    #[must_use]
    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        self.diagnostics.clone()
    }

    /// Crack the whole graph and assemble the final [`BuildPlan`].
    ///
    /// # Errors
    /// Configuration, resolver and invoker failures are fatal; so is lock
    /// contention on the root project file outlasting the retry budget.
    pub fn crack(&self) -> Result<BuildPlan> {
        let root = self.options.root().to_path_buf();
        let cache = PackageCache::prepare(
            &root,
            self.options.exclusion(),
            self.options.force_refresh,
        )?;

        let main = if self.options.is_script() {
            self.crack_script(&root)
        } else {
            wait_until_readable(&root)?;
            if let Some(parent) = root.parent() {
                if !parent.join("obj").exists() {
                    self.diagnostics.info(
                        DiagnosticCategory::Project,
                        format!("Restoring '{}' before cracking", root.display()),
                    );
                    self.invoker.restore(&root)?;
                }
            }
            self.crack_project(&root, true)?
        };

        let mut visited = HashSet::new();
        visited.insert(main.project_path().to_path_buf());
        let mut referenced = Vec::new();
        self.collect_referenced(&main, &mut visited, &mut referenced)?;

        let packages = self.resolve_packages(&main)?;
        let packages = self.stage_packages(&cache, DependencyOrderer::order(packages))?;

        if let Some(override_dir) = &self.options.runtime_support_source {
            let staged = cache.stage_tree(RUNTIME_SUPPORT_UNIT, "local", override_dir)?;
            self.diagnostics.info(
                DiagnosticCategory::Cache,
                format!(
                    "Staged {} runtime-support sources from '{}'",
                    staged.len(),
                    override_dir.display()
                ),
            );
        }

        let assembler = BuildPlanAssembler::new(
            self.options.optimize,
            cache.is_fresh(),
            cache.dir().to_path_buf(),
        );
        Ok(assembler.assemble(&main, &referenced, packages))
    }

    /// A script is its own single source; no resolver involved.
    fn crack_script(&self, script: &Path) -> Arc<ProjectDescriptor> {
        let flags = self
            .options
            .definitions()
            .iter()
            .map(|definition| format!("--define:{definition}"))
            .collect();
        Arc::new(ProjectDescriptor::new(
            script.to_path_buf(),
            vec![script.to_path_buf()],
            Vec::new(),
            Vec::new(),
            flags,
        ))
    }

    /// Crack one project, memoized by normalized path for this run.
    fn crack_project(&self, path: &Path, is_main: bool) -> Result<Arc<ProjectDescriptor>> {
        let normalized = normalize_path(path);
        if let Some(existing) = self.cracked.get(&normalized) {
            return Ok(existing.clone());
        }

        let resolved = self
            .resolver
            .resolve(&normalized, self.options.definitions())?;
        let project_dir = normalized
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let (sources, mut binary_references, mut flags) =
            partition_compiler_args(&resolved.compiler_args, &project_dir);
        let project_references = self.apply_exclusion(
            resolved.project_references,
            &mut binary_references,
            &project_dir,
        )?;

        if is_main {
            for definition in self.options.definitions() {
                let flag = format!("--define:{definition}");
                if !flags.contains(&flag) {
                    flags.push(flag);
                }
            }
        }

        self.diagnostics.info(
            DiagnosticCategory::Project,
            format!(
                "Cracked '{}': {} sources, {} binary references",
                normalized.display(),
                sources.len(),
                binary_references.len()
            ),
        );

        let descriptor = Arc::new(ProjectDescriptor::new(
            normalized.clone(),
            sources,
            project_references,
            binary_references,
            flags,
        ));
        self.cracked.insert(normalized, descriptor.clone());
        Ok(descriptor)
    }

    /// Decide per project reference between direct source compilation and
    /// a rebuilt binary dependency.
    ///
    /// An exclusion match rebuilds the reference's binary (at most once per
    /// binary path for the run) and drops the project reference. Otherwise
    /// the corresponding binary reference is superseded by direct source
    /// compilation and removed, and the project reference is kept.
    fn apply_exclusion(
        &self,
        references: Vec<PathBuf>,
        binary_references: &mut Vec<(String, PathBuf)>,
        project_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut kept = Vec::new();

        for reference in references {
            let absolute = absolutize(project_dir, &reference);
            let stem = absolute
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            let excluded = self
                .options
                .exclusion()
                .is_some_and(|needle| absolute.to_string_lossy().contains(needle));

            if excluded {
                let memo_key = binary_references
                    .iter()
                    .find(|(s, _)| *s == stem)
                    .map_or_else(|| absolute.clone(), |(_, path)| path.clone());
                if self.rebuilt.insert(memo_key, ()).is_none() {
                    self.diagnostics.info(
                        DiagnosticCategory::Project,
                        format!("Rebuilding excluded reference '{}'", absolute.display()),
                    );
                    self.invoker.build(&absolute)?;
                }
            } else {
                binary_references.retain(|(s, _)| *s != stem);
                kept.push(absolute);
            }
        }

        Ok(kept)
    }

    /// Post-order walk so dependencies land before their dependents;
    /// a project seen earlier in the walk is reused, not recracked.
    fn collect_referenced(
        &self,
        descriptor: &Arc<ProjectDescriptor>,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<Arc<ProjectDescriptor>>,
    ) -> Result<()> {
        for reference in descriptor.project_references() {
            let normalized = normalize_path(reference);
            if normalized == descriptor.project_path() {
                return Err(Error::Configuration(format!(
                    "Project '{}' references itself",
                    normalized.display()
                )));
            }
            if !visited.insert(normalized.clone()) {
                continue;
            }
            let child = self.crack_project(&normalized, false)?;
            self.collect_referenced(&child, visited, out)?;
            out.push(child);
        }
        Ok(())
    }

    /// Probe the main project's binary references for library packages.
    ///
    /// Referenced projects never reach this point; their binary references
    /// only decide exclusion handling.
    fn resolve_packages(&self, main: &ProjectDescriptor) -> Result<Vec<LibraryPackage>> {
        let resolver =
            PackageResolver::new(self.options.replacements.clone(), self.diagnostics.clone());
        let mut packages = Vec::new();
        let mut seen = HashSet::new();

        for (stem, path) in main.binary_references() {
            if PackageResolver::is_framework_package(stem) {
                continue;
            }
            if let Some(package) = resolver.try_resolve_library_package(path)? {
                if seen.insert((package.id.clone(), package.version.clone())) {
                    packages.push(package);
                }
            }
        }

        Ok(packages)
    }

    /// Crack each ordered package's library project and stage its sources.
    fn stage_packages(
        &self,
        cache: &PackageCache,
        ordered: Vec<LibraryPackage>,
    ) -> Result<Vec<LibraryPackage>> {
        let mut staged = Vec::with_capacity(ordered.len());

        for mut package in ordered {
            let library = self.crack_project(&package.library_project_path, false)?;
            let base = package
                .library_project_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            package.source_paths =
                cache.stage(&package.id, &package.version, &base, library.source_paths())?;
            staged.push(package);
        }

        Ok(staged)
    }
}

/// Split resolver arguments into sources, binary references and
/// passthrough flags.
///
/// Glob source entries are expanded relative to `project_dir` in sorted
/// order; a pattern matching nothing is kept literally, assumed to be
/// generated later. Binary references are deduplicated by assembly short
/// name, first occurrence wins. Unrecognized and host-injected flags are
/// dropped.
fn partition_compiler_args(
    args: &[String],
    project_dir: &Path,
) -> (Vec<PathBuf>, Vec<(String, PathBuf)>, Vec<String>) {
    let mut sources = Vec::new();
    let mut binary_references: Vec<(String, PathBuf)> = Vec::new();
    let mut flags = Vec::new();

    for arg in args {
        if let Some(reference) = arg.strip_prefix(BINARY_REF_PREFIX) {
            let path = absolutize(project_dir, Path::new(reference));
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !binary_references.iter().any(|(s, _)| *s == stem) {
                binary_references.push((stem, path));
            }
        } else if PASSTHROUGH_FLAG_PREFIXES
            .iter()
            .any(|prefix| arg.starts_with(prefix))
        {
            flags.push(arg.clone());
        } else if is_stripped_flag(arg) || arg.starts_with('-') {
            // host-managed or unknown flag
        } else if arg.contains('*') {
            let expanded = expand_glob(project_dir, arg);
            if expanded.is_empty() {
                sources.push(absolutize(project_dir, Path::new(arg)));
            } else {
                sources.extend(expanded);
            }
        } else {
            sources.push(absolutize(project_dir, Path::new(arg)));
        }
    }

    (sources, binary_references, flags)
}

fn is_stripped_flag(arg: &str) -> bool {
    STRIPPED_FLAG_PREFIXES
        .iter()
        .any(|prefix| arg.starts_with(prefix))
        || matches!(arg, "-g" | "-g+" | "-g-")
}

/// Expand a `*`/`**` pattern relative to `dir`, sorted and deduplicated.
fn expand_glob(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let pattern = pattern.replace('\\', "/");
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();

    let base = if pattern.starts_with('/') {
        PathBuf::from("/")
    } else {
        dir.to_path_buf()
    };

    let mut matches = Vec::new();
    glob_walk(&base, &components, &mut matches);
    matches.sort();
    matches.dedup();
    matches
}

fn glob_walk(base: &Path, components: &[&str], out: &mut Vec<PathBuf>) {
    let Some((component, rest)) = components.split_first() else {
        if base.is_file() {
            out.push(normalize_path(base));
        }
        return;
    };

    if *component == "**" {
        glob_walk(base, rest, out);
        if let Ok(entries) = std::fs::read_dir(base) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    glob_walk(&path, components, out);
                }
            }
        }
    } else if component.contains('*') {
        if let Ok(entries) = std::fs::read_dir(base) {
            for entry in entries.flatten() {
                let path = entry.path();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if wildcard_match(component, name) {
                        glob_walk(&path, rest, out);
                    }
                }
            }
        }
    } else {
        glob_walk(&base.join(component), rest, out);
    }
}

/// Match one path component against a pattern where `*` spans any run of
/// characters within the component.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    if !rest.starts_with(parts[0]) {
        return false;
    }
    rest = &rest[parts[0].len()..];

    let last = parts[parts.len() - 1];
    if !rest.ends_with(last) {
        return false;
    }
    rest = &rest[..rest.len() - last.len()];

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(found) => rest = &rest[found + part.len()..],
            None => return false,
        }
    }
    true
}

/// Lexical path normalization; resolves `.` and `..` without touching the
/// filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Bounded retry against file-lock contention on the root project file.
///
/// Only lock-shaped errors are retried; anything else surfaces
/// immediately.
fn wait_until_readable(path: &Path) -> Result<()> {
    let mut attempts = 0u32;
    loop {
        match std::fs::File::open(path) {
            Ok(_) => return Ok(()),
            Err(error)
                if matches!(
                    error.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::PermissionDenied
                ) =>
            {
                attempts += 1;
                if attempts >= LOCK_RETRY_ATTEMPTS {
                    return Err(Error::TransientIo {
                        path: path.display().to_string(),
                        attempts,
                    });
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(error) => return Err(error.into()),
        }
    }
}
