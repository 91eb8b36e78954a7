// Copyright 2026 The depscope authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # depscope
//!
//! The import and dependency-resolution layer of a source-to-source F#
//! compiler. `depscope` makes a whole application and all of its upstream
//! dependencies checkable as one program, without requiring every
//! dependency to have been rebuilt by the host toolchain first:
//!
//! - **Compilation-unit import** - reconstructs symbol/type information for
//!   a dependency from its compiled binary artifact alone, including
//!   cross-unit reference resolution over a whole batch of units.
//! - **Project & package cracking** - walks project-to-project references,
//!   tells opaque binary packages apart from library packages that ship
//!   transpile-able source, and produces a deterministic, dependency-ordered
//!   build plan.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use depscope::prelude::*;
//!
//! let options = CrackerOptions::new("src/App.fsproj")?
//!     .with_define("DEBUG")
//!     .with_optimize(false);
//!
//! let cracker = ProjectGraphCracker::new(options, resolver, invoker);
//! let plan = cracker.crack()?;
//!
//! for source in plan.sources() {
//!     println!("{}", source.display());
//! }
//! ```
//!
//! ## Architecture
//!
//! Two pipelines feed the type checker:
//!
//! - [`cracker`] - `ProjectGraphCracker` → `PackageResolver` →
//!   `DependencyOrderer` → `BuildPlanAssembler`, producing the final
//!   [`cracker::BuildPlan`].
//! - [`module`] + [`importer`] - `BinaryModuleCache` →
//!   `CompilationUnitImporter` → `TypeLookupIndex`, bootstrapping the
//!   type-checking context from compiled artifacts.
//!
//! Key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`module`] - Binary artifact container parsing and caching
//! - [`importer`] - Compilation-unit reconstruction and cross-unit fixups
//! - [`cracker`] - Project graph walking, package resolution, build plans
//! - [`diagnostics`] - Non-fatal findings collected during a run
//! - [`Error`] and [`Result`] - Error handling for the whole pipeline
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Expected negative
//! outcomes - a binary reference that is not a library package, a type
//! lookup that finds nothing - are plain values, never errors:
//!
//! ```rust,ignore
//! use depscope::{Error, module::BinaryModule};
//!
//! match BinaryModule::from_file(path) {
//!     Ok(module) => println!("loaded {}", module.name()),
//!     Err(Error::Malformed { message, .. }) => println!("corrupt: {}", message),
//!     Err(e) => println!("error: {}", e),
//! }
//! ```

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;


/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use depscope::prelude::*;
///
/// let cache = BinaryModuleCache::new(path_map);
/// let module = cache.resolve("MyLib")?;
/// ```
pub mod prelude;

/// Non-fatal findings collected while importing units and cracking projects.
///
/// A [`diagnostics::Diagnostics`] value is threaded through the pipeline in
/// place of any global print hook; it is never load-bearing for core logic.
pub mod diagnostics;

/// Binary artifact containers and the name-keyed module cache.
///
/// [`module::BinaryModule`] parses the compact metadata container embedded
/// alongside a compiled dependency; [`module::BinaryModuleCache`] memoizes
/// parsed modules by logical assembly name so no artifact is read twice.
pub mod module;

/// Compilation-unit reconstruction from binary artifacts.
///
/// [`importer::CompilationUnitImporter`] builds one
/// [`importer::CompilationUnit`] per requested assembly name, choosing the
/// native path (embedded signature data) or the foreign path (the binary's
/// own declarations), and resolves cross-unit references in a single batch
/// fixup pass. [`importer::TypeLookupIndex`] searches the imported batch for
/// well-known anchor types.
pub mod importer;

/// Project graph cracking, package resolution and build-plan assembly.
///
/// [`cracker::ProjectGraphCracker`] walks a project and its references into
/// a flattened descriptor list, [`cracker::PackageResolver`] identifies
/// source-shipping library packages, [`cracker::DependencyOrderer`] puts
/// them into a deterministic compile order, and
/// [`cracker::BuildPlanAssembler`] merges everything into the final
/// [`cracker::BuildPlan`].
pub mod cracker;

/// `depscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type
/// is always [`Error`], used for every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `depscope` Error type
///
/// The main error type for all operations in this crate. See [`error`] for
/// the mapping of variants to failure policies.
pub use error::Error;

pub use file::parser::Parser;
