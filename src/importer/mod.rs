//! Compilation-unit reconstruction from binary artifacts.
//!
//! The importer builds one [`CompilationUnit`] per requested assembly name
//! and resolves cross-unit references in a single batch pass:
//!
//! 1. Each requested name is resolved through the [`BinaryModuleCache`].
//! 2. A module carrying a signature-data resource is imported **native**
//!    (rich deserialized metadata); anything else is imported **foreign**
//!    (the artifact's own export table).
//! 3. Once the whole batch is loaded, every native unit's
//!    [`PendingFixup`] is resolved against a name→unit map over the batch.
//!    A dangling reference is fatal.
//!
//! # Ordering Contract
//!
//! The runtime-support unit ([`RUNTIME_SUPPORT_UNIT`]) is always placed
//! first in a batch result; remaining units keep request order. Downstream
//! logic assumes index 0 is the runtime-support unit.
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use depscope::prelude::*;
//! use std::sync::Arc;
//!
//! let cache = Arc::new(BinaryModuleCache::new(path_map));
//! let diagnostics = Arc::new(Diagnostics::new());
//! let importer = CompilationUnitImporter::new(cache, diagnostics);
//!
//! let batch = importer.batch_import(&["MyLib", "FSharp.Core"])?;
//! assert_eq!(batch.units()[0].name(), "FSharp.Core");
//! # Ok::<(), depscope::Error>(())
//! ```

mod fixup;
mod lookup;
mod unit;

pub use fixup::PendingFixup;
pub use lookup::{FoundType, TypeLookupIndex, REQUIRED_ANCHOR_TYPES};
pub use unit::{
    CompilationUnit, InlineHint, OptimizationData, OptimizationSlot, SignatureData, TypeForwarder,
    UnitMetadata, PAYLOAD_VERSION,
};

use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    module::BinaryModuleCache,
    Error, Result,
};

/// Resource-name prefix marking embedded signature data.
///
/// A module carrying a resource with this prefix is imported native.
pub const SIGNATURE_RESOURCE_PREFIX: &str = "FSharpSignatureData.";

/// Resource-name prefix marking embedded optimization data.
pub const OPTIMIZATION_RESOURCE_PREFIX: &str = "FSharpOptimizationData.";

/// Assembly name of the runtime-support unit, always ordered first.
pub const RUNTIME_SUPPORT_UNIT: &str = "FSharp.Core";

/// An imported batch of units with resolved cross-references.
///
/// Owns the strong references to its units (the units themselves hold only
/// weak handles to each other), acting as the arena the fixup pass resolved
/// against.
#[derive(Debug, Default)]
pub struct ImportBatch {
    units: Vec<Arc<CompilationUnit>>,
}

impl ImportBatch {
    /// All units, runtime-support first when present.
    #[must_use]
    pub fn units(&self) -> &[Arc<CompilationUnit>] {
        &self.units
    }

    /// Number of units in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the batch holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Look up a unit by assembly name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&Arc<CompilationUnit>> {
        self.units.iter().find(|unit| unit.name() == name)
    }
}

/// Builds [`CompilationUnit`]s from binary artifacts, one per assembly name.
///
/// Memoized per importer instance: repeated imports of the same name return
/// the identical unit, which is what guarantees "exactly one unit per
/// assembly name per compilation". One importer belongs to one compilation;
/// sharing it across compilations is not supported.
#[derive(Debug)]
pub struct CompilationUnitImporter {
    /// Artifact loader shared with the rest of the run.
    cache: Arc<BinaryModuleCache>,
    /// Non-fatal findings sink.
    diagnostics: Arc<Diagnostics>,
    /// Memoized units by assembly name.
    memo: DashMap<String, Arc<CompilationUnit>>,
}

impl CompilationUnitImporter {
    /// Create an importer over `cache`, reporting into `diagnostics`.
    #[must_use]
    pub fn new(cache: Arc<BinaryModuleCache>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            cache,
            diagnostics,
            memo: DashMap::new(),
        }
    }

    /// Import a single unit by assembly name, memoized.
    ///
    /// The unit's cross-references are not resolved; use
    /// [`batch_import`](Self::batch_import) for a fixed-up batch.
    ///
    /// # Errors
    /// Propagates artifact load failures; returns
    /// [`crate::Error::DuplicateResource`] if the artifact carries more
    /// than one signature-data resource.
    pub fn import(&self, name: &str) -> Result<Arc<CompilationUnit>> {
        if let Some(cached) = self.memo.get(name) {
            return Ok(cached.clone());
        }

        let module = self.cache.resolve(name)?;

        let signature_resources: Vec<String> = module
            .resources_with_prefix(SIGNATURE_RESOURCE_PREFIX)
            .map(|(resource_name, _)| resource_name.to_string())
            .collect();

        let unit = match signature_resources.len() {
            0 => self.import_foreign(&module),
            1 => self.import_native(&module, &signature_resources[0])?,
            _ => return Err(Error::DuplicateResource(name.to_string())),
        };

        let unit = Arc::new(unit);
        self.memo.insert(name.to_string(), unit.clone());
        Ok(unit)
    }

    /// Import all requested names and fix up cross-references in one pass.
    ///
    /// Duplicate names are imported once. The runtime-support unit, when
    /// requested, is placed at index 0; the rest keep request order.
    ///
    /// # Errors
    /// Propagates import failures, and returns
    /// [`crate::Error::UnresolvedReference`] if any unit's payload names an
    /// assembly absent from the batch.
    pub fn batch_import(&self, names: &[&str]) -> Result<ImportBatch> {
        let mut ordered: Vec<&str> = Vec::with_capacity(names.len());
        for name in names {
            if *name == RUNTIME_SUPPORT_UNIT {
                if !ordered.first().is_some_and(|n| *n == RUNTIME_SUPPORT_UNIT) {
                    ordered.insert(0, name);
                }
            } else if !ordered.contains(name) {
                ordered.push(name);
            }
        }

        let mut units = Vec::with_capacity(ordered.len());
        for name in &ordered {
            units.push(self.import(name)?);
        }

        let batch_index: HashMap<String, Arc<CompilationUnit>> = units
            .iter()
            .map(|unit| (unit.name().to_string(), unit.clone()))
            .collect();

        for unit in &units {
            if unit.references_resolved() {
                continue;
            }
            let Some(signature) = unit.signature() else {
                continue;
            };

            let pending = PendingFixup::new(unit.name(), signature.referenced_units.clone());
            let resolved = pending.resolve(&batch_index)?;
            unit.set_resolved_references(resolved);
        }

        Ok(ImportBatch { units })
    }

    fn import_foreign(&self, module: &Arc<crate::module::BinaryModule>) -> CompilationUnit {
        CompilationUnit::new(
            module.clone(),
            UnitMetadata::Foreign {
                declared_types: module.exported_types().to_vec(),
            },
        )
    }

    fn import_native(
        &self,
        module: &Arc<crate::module::BinaryModule>,
        signature_resource: &str,
    ) -> Result<CompilationUnit> {
        let signature_bytes = module.resource(signature_resource).ok_or_else(|| {
            malformed_error!(
                "Signature resource '{}' vanished from {}",
                signature_resource,
                module.path().display()
            )
        })?;
        let signature = SignatureData::parse(signature_bytes)?;

        let optimization_resources: Vec<String> = module
            .resources_with_prefix(OPTIMIZATION_RESOURCE_PREFIX)
            .map(|(resource_name, _)| resource_name.to_string())
            .collect();

        let optimization = match optimization_resources.len() {
            0 => {
                self.diagnostics.info(
                    DiagnosticCategory::Artifact,
                    format!(
                        "Unit '{}' ships no optimization data, cross-module inlining degraded",
                        module.name()
                    ),
                );
                OptimizationSlot::absent()
            }
            1 => OptimizationSlot::for_resource(optimization_resources[0].clone()),
            _ => {
                self.diagnostics.warning(
                    DiagnosticCategory::Artifact,
                    format!(
                        "Unit '{}' carries {} optimization resources, using the first",
                        module.name(),
                        optimization_resources.len()
                    ),
                );
                OptimizationSlot::for_resource(optimization_resources[0].clone())
            }
        };

        Ok(CompilationUnit::new(
            module.clone(),
            UnitMetadata::Native {
                signature,
                optimization,
            },
        ))
    }
}
