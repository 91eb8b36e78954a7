//! Injected external collaborators of the cracking pipeline.
//!
//! Two pieces of host tooling sit outside this crate: the project-description
//! resolver (an MSBuild-equivalent that evaluates a project file into raw
//! compiler arguments) and the build/restore invoker (the host toolchain
//! itself). Both are modeled as traits so cracking logic is testable without
//! spawning real processes.

use std::path::{Path, PathBuf};

use crate::Result;

/// Raw output of the external project-description resolver for one project.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    /// The project's raw compiler argument list, in evaluation order.
    ///
    /// Contains a mix of source paths, binary references (`-r:` prefix) and
    /// compiler flags; [`crate::cracker::ProjectGraphCracker`] partitions
    /// them.
    pub compiler_args: Vec<String>,
    /// Direct project-to-project references, as written in the project file.
    pub project_references: Vec<PathBuf>,
}

/// Evaluates a project-description file into compiler arguments.
///
/// The resolver is a black box: it receives the project path and the active
/// preprocessor definitions and returns whatever argument list the host
/// build system would pass to the compiler.
pub trait ProjectResolver {
    /// Resolve `project` into its raw compiler arguments and references.
    ///
    /// # Errors
    /// Any resolver failure surfaces unchanged; the cracker does not retry
    /// resolution.
    fn resolve(&self, project: &Path, definitions: &[String]) -> Result<ResolvedProject>;
}

/// Synchronous restore/build verbs of the host toolchain.
///
/// Both operations block until the external process finishes. The cracker
/// calls `restore` at most once per run and memoizes `build` per binary
/// path.
pub trait BuildInvoker {
    /// Restore the package assets of `project`.
    ///
    /// # Errors
    /// A failed restore is fatal to the run.
    fn restore(&self, project: &Path) -> Result<()>;

    /// Rebuild `project`, producing its binary output.
    ///
    /// # Errors
    /// A failed build is fatal to the run.
    fn build(&self, project: &Path) -> Result<()>;
}
