//! Final build-plan assembly.
//!
//! The assembler merges everything the rest of the cracker produced into
//! one immutable [`BuildPlan`]: package sources first (in dependency
//! order), then referenced-project sources (in walk order), then the main
//! project's own sources, with exact-path dedup and the intermediate-output
//! filter applied across the whole list. Flags follow the same
//! referenced-before-main order, closed off by the baseline flag set, the
//! optimize toggle, and the surviving binary references.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::cracker::{LibraryPackage, ProjectDescriptor, BINARY_REF_PREFIX};

/// Flags appended to every plan.
pub const BASELINE_FLAGS: &[&str] = &["--noframework", "--nocopyfsharpcore"];

/// Binary-reference file stems never emitted into a plan; these are
/// satisfied by imported foreign units instead.
const IGNORED_BINARY_REFS: &[&str] = &["mscorlib", "System.Private.CoreLib", "netstandard"];

/// Framework stem prefixes dropped alongside the fixed ignore list.
const IGNORED_BINARY_REF_PREFIXES: &[&str] = &["System.", "Microsoft."];

/// Directory component marking intermediate build output.
const INTERMEDIATE_OUTPUT_DIR: &str = "obj";

/// The immutable output of a cracking run.
#[derive(Debug)]
pub struct BuildPlan {
    sources: Vec<PathBuf>,
    flags: Vec<String>,
    packages: Vec<LibraryPackage>,
    fresh_cache: bool,
    cache_dir: PathBuf,
}

impl BuildPlan {
    /// Ordered source file list, packages first, main project last.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Ordered compiler flag list.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Resolved library packages in compile order, with staged sources.
    #[must_use]
    pub fn packages(&self) -> &[LibraryPackage] {
        &self.packages
    }

    /// Whether the cache directory was (re)populated by this run.
    #[must_use]
    pub fn fresh_cache(&self) -> bool {
        self.fresh_cache
    }

    /// Path of the per-project cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Merges cracked projects and ordered packages into a [`BuildPlan`].
#[derive(Debug)]
pub struct BuildPlanAssembler {
    optimize: bool,
    fresh_cache: bool,
    cache_dir: PathBuf,
}

impl BuildPlanAssembler {
    /// An assembler carrying the run-level plan inputs.
    #[must_use]
    pub fn new(optimize: bool, fresh_cache: bool, cache_dir: PathBuf) -> Self {
        Self {
            optimize,
            fresh_cache,
            cache_dir,
        }
    }

    /// Merge `packages`, `referenced` projects and the `main` project.
    ///
    /// Source order is packages → referenced → main; the first occurrence
    /// of an exact path wins and paths under an intermediate output
    /// directory are dropped. Flags are referenced-project flags, main
    /// flags, [`BASELINE_FLAGS`], the optimize toggle, then the main
    /// project's binary references minus the ignore list and framework
    /// references.
    #[must_use]
    pub fn assemble(
        &self,
        main: &ProjectDescriptor,
        referenced: &[Arc<ProjectDescriptor>],
        packages: Vec<LibraryPackage>,
    ) -> BuildPlan {
        let mut sources = Vec::new();
        let mut seen = HashSet::new();

        let package_sources = packages.iter().flat_map(|p| p.source_paths.iter());
        let referenced_sources = referenced.iter().flat_map(|r| r.source_paths().iter());
        for source in package_sources
            .chain(referenced_sources)
            .chain(main.source_paths().iter())
        {
            if is_intermediate_output(source) {
                continue;
            }
            if seen.insert(source.clone()) {
                sources.push(source.clone());
            }
        }

        let mut flags = Vec::new();
        let mut seen_flags = HashSet::new();
        for flag in referenced
            .iter()
            .flat_map(|r| r.other_flags().iter())
            .chain(main.other_flags().iter())
        {
            if seen_flags.insert(flag.clone()) {
                flags.push(flag.clone());
            }
        }
        flags.extend(BASELINE_FLAGS.iter().map(ToString::to_string));
        flags.push(if self.optimize {
            "--optimize+".to_string()
        } else {
            "--optimize-".to_string()
        });
        for (stem, path) in main.binary_references() {
            if is_ignored_reference(stem) {
                continue;
            }
            flags.push(format!("{BINARY_REF_PREFIX}{}", path.display()));
        }

        BuildPlan {
            sources,
            flags,
            packages,
            fresh_cache: self.fresh_cache,
            cache_dir: self.cache_dir.clone(),
        }
    }
}

fn is_intermediate_output(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == INTERMEDIATE_OUTPUT_DIR)
}

fn is_ignored_reference(stem: &str) -> bool {
    IGNORED_BINARY_REFS.contains(&stem)
        || IGNORED_BINARY_REF_PREFIXES
            .iter()
            .any(|prefix| stem.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(sources: &[&str], flags: &[&str], refs: &[(&str, &str)]) -> ProjectDescriptor {
        ProjectDescriptor::new(
            PathBuf::from("App.fsproj"),
            sources.iter().map(PathBuf::from).collect(),
            Vec::new(),
            refs.iter()
                .map(|(stem, path)| (stem.to_string(), PathBuf::from(path)))
                .collect(),
            flags.iter().map(ToString::to_string).collect(),
        )
    }

    fn assembler() -> BuildPlanAssembler {
        BuildPlanAssembler::new(false, true, PathBuf::from(".depscope"))
    }

    #[test]
    fn test_dedup_and_intermediate_filter() {
        let main = descriptor(
            &["Foo.fs", "Foo.fs", "obj/Foo.AssemblyInfo.fs"],
            &[],
            &[],
        );
        let plan = assembler().assemble(&main, &[], Vec::new());
        assert_eq!(plan.sources(), [PathBuf::from("Foo.fs")]);
    }

    #[test]
    fn test_source_order_packages_then_referenced_then_main() {
        let mut package = LibraryPackage {
            id: "Lib".into(),
            version: "1.0.0".into(),
            manifest_path: PathBuf::from("Lib.nuspec"),
            library_project_path: PathBuf::from("Lib.fsproj"),
            binary_path: PathBuf::from("Lib.dll"),
            dependencies: Vec::new(),
            source_paths: Vec::new(),
        };
        package.source_paths = vec![PathBuf::from("staged/Lib.fs")];

        let referenced = Arc::new(descriptor(&["Core.fs"], &[], &[]));
        let main = descriptor(&["App.fs"], &[], &[]);

        let plan = assembler().assemble(&main, &[referenced], vec![package]);
        assert_eq!(
            plan.sources(),
            [
                PathBuf::from("staged/Lib.fs"),
                PathBuf::from("Core.fs"),
                PathBuf::from("App.fs"),
            ]
        );
        assert_eq!(plan.packages().len(), 1);
    }

    #[test]
    fn test_flag_assembly_order_and_reference_filter() {
        let referenced = Arc::new(descriptor(&[], &["--nowarn:44"], &[]));
        let main = descriptor(
            &[],
            &["--define:DEBUG", "--nowarn:44"],
            &[
                ("mscorlib", "/fw/mscorlib.dll"),
                ("System.Text.Json", "/fw/System.Text.Json.dll"),
                ("Fancy.Json", "/store/Fancy.Json.dll"),
            ],
        );

        let plan = assembler().assemble(&main, &[referenced], Vec::new());
        assert_eq!(
            plan.flags(),
            [
                "--nowarn:44",
                "--define:DEBUG",
                "--noframework",
                "--nocopyfsharpcore",
                "--optimize-",
                "-r:/store/Fancy.Json.dll",
            ]
        );
    }

    #[test]
    fn test_optimize_toggle() {
        let main = descriptor(&[], &[], &[]);
        let plan = BuildPlanAssembler::new(true, false, PathBuf::from(".depscope"))
            .assemble(&main, &[], Vec::new());
        assert!(plan.flags().iter().any(|f| f == "--optimize+"));
        assert!(!plan.fresh_cache());
    }
}
