//! # depscope Prelude
//!
//! Convenient glob import for the types most callers touch: the cracker
//! entry points, the importer pipeline, and error handling.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all depscope operations
pub use crate::Error;

/// The result type used throughout depscope
pub use crate::Result;

/// Diagnostics sink threaded through a cracking/import run
pub use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};

// ================================================================================================
// Binary Modules
// ================================================================================================

/// Parsed binary artifact container and its memoizing cache
pub use crate::module::{BinaryModule, BinaryModuleCache, ExportedType};

/// Low-level artifact parsing utilities
pub use crate::Parser;

// ================================================================================================
// Compilation-Unit Import
// ================================================================================================

/// Importer pipeline for reconstructing units from artifacts
pub use crate::importer::{
    CompilationUnit, CompilationUnitImporter, OptimizationData, SignatureData, TypeLookupIndex,
    RUNTIME_SUPPORT_UNIT,
};

// ================================================================================================
// Project and Package Cracking
// ================================================================================================

/// Project graph cracking entry points
pub use crate::cracker::{CrackerOptions, ProjectDescriptor, ProjectGraphCracker};

/// Injected external collaborators
pub use crate::cracker::{BuildInvoker, ProjectResolver, ResolvedProject};

/// Package resolution and ordering
pub use crate::cracker::{DependencyOrderer, LibraryPackage, PackageResolver};

/// Final build plan
pub use crate::cracker::{BuildPlan, BuildPlanAssembler};
