//! Cross-unit search for well-known anchor types.
//!
//! The type-checking bootstrap needs a handful of anchor types (`object`,
//! value types, attributes, exceptions) located before anything else can be
//! checked. [`TypeLookupIndex`] performs that search over an imported
//! batch: a linear walk restricted to **foreign** (system) units - native
//! project units are never probed, their types resolve through normal
//! checking instead.
//!
//! A miss is an ordinary outcome reported through diagnostics, except for
//! the [`REQUIRED_ANCHOR_TYPES`], whose absence makes the whole
//! compilation impossible and is therefore fatal.

use std::sync::Arc;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    importer::{CompilationUnit, ImportBatch},
    Error, Result,
};

/// Anchor types whose absence is fatal to the compilation.
pub const REQUIRED_ANCHOR_TYPES: &[&str] = &[
    "System.Object",
    "System.ValueType",
    "System.Attribute",
    "System.Exception",
];

/// A type located by the lookup index.
#[derive(Debug, Clone)]
pub struct FoundType {
    /// The foreign unit declaring the type.
    pub unit: Arc<CompilationUnit>,
    /// Dotted namespace of the type, empty for the global namespace.
    pub namespace: String,
    /// Simple type name.
    pub name: String,
}

impl FoundType {
    /// The dotted full name, `Namespace.Name` or just `Name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Linear cross-unit search over the foreign units of an imported batch.
#[derive(Debug)]
pub struct TypeLookupIndex {
    units: Vec<Arc<CompilationUnit>>,
    diagnostics: Arc<Diagnostics>,
}

impl TypeLookupIndex {
    /// Build an index over the foreign units of `batch`.
    #[must_use]
    pub fn from_batch(batch: &ImportBatch, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            units: batch
                .units()
                .iter()
                .filter(|unit| !unit.is_native())
                .cloned()
                .collect(),
            diagnostics,
        }
    }

    /// Number of foreign units covered by the index.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Search for a type by namespace path and simple name.
    ///
    /// Walks the foreign units in batch order, matching the namespace chain
    /// first and the type name second. A miss is recorded as an
    /// informational diagnostic and returned as `None`, never an error.
    #[must_use]
    pub fn try_find_type(&self, namespace_path: &[&str], type_name: &str) -> Option<FoundType> {
        let namespace = namespace_path.join(".");

        for unit in &self.units {
            for declared in unit.declared_types() {
                if declared.namespace == namespace && declared.name == type_name {
                    return Some(FoundType {
                        unit: unit.clone(),
                        namespace: declared.namespace.clone(),
                        name: declared.name.clone(),
                    });
                }
            }
        }

        self.diagnostics.info(
            DiagnosticCategory::Lookup,
            if namespace.is_empty() {
                format!("Type '{}' not found in any foreign unit", type_name)
            } else {
                format!(
                    "Type '{}.{}' not found in any foreign unit",
                    namespace, type_name
                )
            },
        );
        None
    }

    /// Search for a mandatory anchor type by dotted full name.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] when the type is absent; used
    /// only for types the compilation cannot proceed without.
    pub fn find_required_type(&self, full_name: &str) -> Result<FoundType> {
        let (namespace, name) = match full_name.rsplit_once('.') {
            Some((namespace, name)) => (namespace, name),
            None => ("", full_name),
        };
        let path: Vec<&str> = if namespace.is_empty() {
            Vec::new()
        } else {
            namespace.split('.').collect()
        };

        self.try_find_type(&path, name)
            .ok_or_else(|| Error::TypeNotFound(full_name.to_string()))
    }

    /// Verify that every mandatory anchor type is present.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] for the first missing anchor.
    pub fn verify_anchors(&self) -> Result<()> {
        for anchor in REQUIRED_ANCHOR_TYPES {
            self.find_required_type(anchor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        importer::{CompilationUnitImporter, SIGNATURE_RESOURCE_PREFIX},
        module::BinaryModuleCache,
        test::{ArtifactBuilder, SignaturePayloadBuilder},
    };
    use std::path::Path;

    fn batch_with(dir: &Path, artifacts: &[(&str, Vec<u8>)]) -> (ImportBatch, Arc<Diagnostics>) {
        let mut paths = Vec::new();
        let mut names = Vec::new();
        for (name, bytes) in artifacts {
            let path = dir.join(format!("{name}.dll"));
            std::fs::write(&path, bytes).unwrap();
            paths.push((name.to_string(), path));
            names.push(*name);
        }
        let diagnostics = Arc::new(Diagnostics::new());
        let importer = CompilationUnitImporter::new(
            Arc::new(BinaryModuleCache::new(paths)),
            diagnostics.clone(),
        );
        (importer.batch_import(&names).unwrap(), diagnostics)
    }

    fn corelib() -> Vec<u8> {
        ArtifactBuilder::new("System.Runtime")
            .exported_type("System", "Object")
            .exported_type("System", "ValueType")
            .exported_type("System", "Attribute")
            .exported_type("System", "Exception")
            .exported_type("System", "String")
            .build()
    }

    #[test]
    fn test_find_type_in_foreign_unit() {
        let dir = tempfile::tempdir().unwrap();
        let (batch, diagnostics) = batch_with(dir.path(), &[("System.Runtime", corelib())]);
        let index = TypeLookupIndex::from_batch(&batch, diagnostics);

        let found = index.try_find_type(&["System"], "String").unwrap();
        assert_eq!(found.full_name(), "System.String");
        assert_eq!(found.unit.name(), "System.Runtime");
    }

    #[test]
    fn test_miss_is_absence_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (batch, diagnostics) = batch_with(dir.path(), &[("System.Runtime", corelib())]);
        let index = TypeLookupIndex::from_batch(&batch, diagnostics.clone());

        assert!(index.try_find_type(&["System"], "Missing").is_none());
        assert!(diagnostics.has_any());
    }

    #[test]
    fn test_native_units_never_searched() {
        let dir = tempfile::tempdir().unwrap();
        let native = ArtifactBuilder::new("MyLib")
            .resource(
                &format!("{SIGNATURE_RESOURCE_PREFIX}MyLib"),
                &SignaturePayloadBuilder::new()
                    .declared_type("MyLib", "Hidden")
                    .build(),
            )
            .build();
        let (batch, diagnostics) = batch_with(dir.path(), &[("MyLib", native)]);
        let index = TypeLookupIndex::from_batch(&batch, diagnostics);

        assert_eq!(index.unit_count(), 0);
        assert!(index.try_find_type(&["MyLib"], "Hidden").is_none());
    }

    #[test]
    fn test_missing_anchor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = ArtifactBuilder::new("System.Runtime")
            .exported_type("System", "Object")
            .build();
        let (batch, diagnostics) = batch_with(dir.path(), &[("System.Runtime", incomplete)]);
        let index = TypeLookupIndex::from_batch(&batch, diagnostics);

        assert!(index.find_required_type("System.Object").is_ok());
        assert!(matches!(
            index.verify_anchors(),
            Err(Error::TypeNotFound(name)) if name == "System.ValueType"
        ));
    }

    #[test]
    fn test_all_anchors_present() {
        let dir = tempfile::tempdir().unwrap();
        let (batch, diagnostics) = batch_with(dir.path(), &[("System.Runtime", corelib())]);
        let index = TypeLookupIndex::from_batch(&batch, diagnostics);
        assert!(index.verify_anchors().is_ok());
    }
}
