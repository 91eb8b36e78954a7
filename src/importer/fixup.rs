//! Cross-unit reference resolution over a fully populated batch.
//!
//! A native unit's signature payload may name other units that were not yet
//! loaded when the payload was deserialized. Those names are carried as a
//! [`PendingFixup`] and resolved exactly once, after every unit in the
//! batch has been imported, against a name→unit map over the whole batch.
//! An unresolvable name is a hard failure - a fixup never degrades to an
//! empty or default reference.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use crate::{importer::CompilationUnit, Error, Result};

/// A deserialized payload's unresolved references to other units.
#[derive(Debug)]
pub struct PendingFixup {
    /// Name of the unit whose payload carries the references.
    unit: String,
    /// Referenced assembly names, in payload order.
    referenced_units: Vec<String>,
}

impl PendingFixup {
    /// A fixup for `unit` naming `referenced_units`.
    #[must_use]
    pub fn new(unit: impl Into<String>, referenced_units: Vec<String>) -> Self {
        Self {
            unit: unit.into(),
            referenced_units,
        }
    }

    /// Name of the unit whose payload carries the references.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Referenced assembly names, in payload order.
    #[must_use]
    pub fn referenced_units(&self) -> &[String] {
        &self.referenced_units
    }

    /// Resolve every referenced name against the batch map.
    ///
    /// Returns weak handles in payload order; the batch keeps the strong
    /// references, so mutually referencing units cannot form ownership
    /// cycles.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedReference`] for the first name
    /// with no unit in the batch.
    pub fn resolve(
        &self,
        batch_index: &HashMap<String, Arc<CompilationUnit>>,
    ) -> Result<Vec<Weak<CompilationUnit>>> {
        let mut resolved = Vec::with_capacity(self.referenced_units.len());

        for referenced in &self.referenced_units {
            match batch_index.get(referenced) {
                Some(unit) => resolved.push(Arc::downgrade(unit)),
                None => {
                    return Err(Error::UnresolvedReference {
                        unit: self.unit.clone(),
                        referenced: referenced.clone(),
                    })
                }
            }
        }

        Ok(resolved)
    }
}
