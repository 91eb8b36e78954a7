//! Compilation units and their deserialized metadata payloads.
//!
//! A [`CompilationUnit`] is the type checker's view of one compiled
//! dependency: either **native** metadata deserialized from an embedded
//! signature-data resource, or **foreign** metadata reconstructed from the
//! artifact's own export table. Native units may additionally carry
//! optimization data, which is irrelevant to type checking and therefore
//! materialized only when explicitly requested.
//!
//! # Key Components
//!
//! - [`CompilationUnit`] - One unit, stable identity = assembly name
//! - [`SignatureData`] - Deserialized snapshot of declared types/members
//! - [`OptimizationData`] / [`OptimizationSlot`] - Deferred inlining hints
//! - [`TypeForwarder`] - Redirection of a type to another unit

use std::sync::{Arc, OnceLock, Weak};

use uguid::Guid;

use crate::{
    module::{BinaryModule, ExportedType},
    Parser, Result,
};

/// Version of the signature/optimization payload encoding this crate reads.
pub const PAYLOAD_VERSION: u16 = 1;

/// Redirection of a type's home to another compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeForwarder {
    /// Dotted full name of the forwarded type.
    pub type_name: String,
    /// Assembly name of the unit that actually declares the type.
    pub target_unit: String,
}

/// Deserialized signature-data payload of a native unit.
///
/// The snapshot of a unit's declared types and cross-unit wiring embedded
/// as a resource in its binary artifact. `referenced_units` names units
/// that must be present in the same import batch; they are validated during
/// the batch fixup pass, never lazily.
#[derive(Debug, Clone, Default)]
pub struct SignatureData {
    /// Assembly names of units this unit's payload refers to.
    pub referenced_units: Vec<String>,
    /// Types the unit declares.
    pub declared_types: Vec<ExportedType>,
    /// Module paths opened automatically when the unit is referenced.
    pub auto_opens: Vec<String>,
    /// Assemblies granted access to this unit's internals.
    pub internals_visible_to: Vec<String>,
    /// Types whose declarations live in another unit.
    pub type_forwarders: Vec<TypeForwarder>,
}

impl SignatureData {
    /// Deserialize a signature payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unsupported payload
    /// version or truncated data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);

        let version = parser.read_u16()?;
        if version != PAYLOAD_VERSION {
            return Err(malformed_error!(
                "Unsupported signature payload version {}",
                version
            ));
        }

        let reference_count = parser.read_u32()?;
        let mut referenced_units = Vec::with_capacity(reference_count as usize);
        for _ in 0..reference_count {
            referenced_units.push(parser.read_prefixed_string_utf8()?);
        }

        let type_count = parser.read_u32()?;
        let mut declared_types = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            let namespace = parser.read_prefixed_string_utf8()?;
            let name = parser.read_prefixed_string_utf8()?;
            declared_types.push(ExportedType { namespace, name });
        }

        let auto_open_count = parser.read_u32()?;
        let mut auto_opens = Vec::with_capacity(auto_open_count as usize);
        for _ in 0..auto_open_count {
            auto_opens.push(parser.read_prefixed_string_utf8()?);
        }

        let ivt_count = parser.read_u32()?;
        let mut internals_visible_to = Vec::with_capacity(ivt_count as usize);
        for _ in 0..ivt_count {
            internals_visible_to.push(parser.read_prefixed_string_utf8()?);
        }

        let forwarder_count = parser.read_u32()?;
        let mut type_forwarders = Vec::with_capacity(forwarder_count as usize);
        for _ in 0..forwarder_count {
            let type_name = parser.read_prefixed_string_utf8()?;
            let target_unit = parser.read_prefixed_string_utf8()?;
            type_forwarders.push(TypeForwarder {
                type_name,
                target_unit,
            });
        }

        Ok(SignatureData {
            referenced_units,
            declared_types,
            auto_opens,
            internals_visible_to,
            type_forwarders,
        })
    }
}

/// One cross-module inlining hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineHint {
    /// Dotted path of the member the hint applies to.
    pub member_path: String,
    /// Relative size score used by inlining decisions.
    pub inline_size: u32,
}

/// Deserialized optimization-data payload of a native unit.
///
/// Cross-module inlining hints. Not needed for type checking, so the
/// payload stays unparsed until something asks for it.
#[derive(Debug, Clone, Default)]
pub struct OptimizationData {
    /// All hints carried by the payload.
    pub inline_hints: Vec<InlineHint>,
}

impl OptimizationData {
    /// Deserialize an optimization payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unsupported payload
    /// version or truncated data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);

        let version = parser.read_u16()?;
        if version != PAYLOAD_VERSION {
            return Err(malformed_error!(
                "Unsupported optimization payload version {}",
                version
            ));
        }

        let hint_count = parser.read_u32()?;
        let mut inline_hints = Vec::with_capacity(hint_count as usize);
        for _ in 0..hint_count {
            let member_path = parser.read_prefixed_string_utf8()?;
            let inline_size = parser.read_u32()?;
            inline_hints.push(InlineHint {
                member_path,
                inline_size,
            });
        }

        Ok(OptimizationData { inline_hints })
    }
}

/// Two-state accessor for deferred optimization data.
///
/// Explicitly models "not yet requested" vs "materialized", so tests can
/// assert that optimization data is never computed unless asked for. A unit
/// whose artifact ships no optimization resource stays permanently empty;
/// that is a degraded feature, not an error.
#[derive(Debug, Default)]
pub struct OptimizationSlot {
    /// Name of the optimization resource within the artifact, if any.
    resource_name: Option<String>,
    /// Parsed payload, set on first request.
    loaded: OnceLock<OptimizationData>,
}

impl OptimizationSlot {
    /// A slot bound to the named resource.
    pub(crate) fn for_resource(resource_name: String) -> Self {
        Self {
            resource_name: Some(resource_name),
            loaded: OnceLock::new(),
        }
    }

    /// A slot for a unit that ships no optimization data.
    pub(crate) fn absent() -> Self {
        Self::default()
    }

    /// Returns `true` if the unit's artifact carries optimization data.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.resource_name.is_some()
    }

    /// Returns `true` if the payload has been materialized.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Materialize the payload from `module`, or return the cached value.
    ///
    /// Returns `Ok(None)` when the artifact ships no optimization resource.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the resource is present but
    /// does not deserialize.
    pub fn get_or_load(&self, module: &BinaryModule) -> Result<Option<&OptimizationData>> {
        let Some(resource_name) = &self.resource_name else {
            return Ok(None);
        };

        if let Some(loaded) = self.loaded.get() {
            return Ok(Some(loaded));
        }

        let bytes = module.resource(resource_name).ok_or_else(|| {
            malformed_error!(
                "Optimization resource '{}' vanished from {}",
                resource_name,
                module.path().display()
            )
        })?;

        let parsed = OptimizationData::parse(bytes)?;
        Ok(Some(self.loaded.get_or_init(|| parsed)))
    }
}

/// Unit metadata: rich native signature data or plain binary declarations.
#[derive(Debug)]
pub enum UnitMetadata {
    /// Deserialized from an embedded signature-data resource.
    Native {
        /// The unit's signature snapshot.
        signature: SignatureData,
        /// Deferred optimization data.
        optimization: OptimizationSlot,
    },
    /// Reconstructed from the artifact's own export table.
    Foreign {
        /// Types declared by the artifact.
        declared_types: Vec<ExportedType>,
    },
}

/// One compiled dependency as seen by the type checker.
///
/// Stable identity is the assembly name: within one compilation there is
/// exactly one unit per name, enforced by the importer's memo table. The
/// runtime-support unit is always ordered first in a batch result.
///
/// Cross-unit references are held as [`Weak`] handles set by the batch
/// fixup pass; the batch owns the strong references, so units referencing
/// each other never form ownership cycles.
#[derive(Debug)]
pub struct CompilationUnit {
    /// Assembly name, the unit's stable identity.
    name: String,
    /// Module version identity from the artifact.
    mvid: Guid,
    /// The artifact this unit was reconstructed from.
    module: Arc<BinaryModule>,
    /// Native or foreign metadata.
    metadata: UnitMetadata,
    /// Units named by the signature payload, resolved exactly once.
    resolved_references: OnceLock<Vec<Weak<CompilationUnit>>>,
}

impl CompilationUnit {
    pub(crate) fn new(module: Arc<BinaryModule>, metadata: UnitMetadata) -> Self {
        Self {
            name: module.name().to_string(),
            mvid: module.mvid(),
            module,
            metadata,
            resolved_references: OnceLock::new(),
        }
    }

    /// Assembly name, the unit's stable identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module version identity.
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.mvid
    }

    /// The artifact this unit was reconstructed from.
    #[must_use]
    pub fn module(&self) -> &Arc<BinaryModule> {
        &self.module
    }

    /// Returns `true` if the unit carries native signature metadata.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self.metadata, UnitMetadata::Native { .. })
    }

    /// The signature payload, for native units.
    #[must_use]
    pub fn signature(&self) -> Option<&SignatureData> {
        match &self.metadata {
            UnitMetadata::Native { signature, .. } => Some(signature),
            UnitMetadata::Foreign { .. } => None,
        }
    }

    /// Types the unit declares, regardless of import path.
    #[must_use]
    pub fn declared_types(&self) -> &[ExportedType] {
        match &self.metadata {
            UnitMetadata::Native { signature, .. } => &signature.declared_types,
            UnitMetadata::Foreign { declared_types } => declared_types,
        }
    }

    /// Module paths opened automatically when the unit is referenced.
    #[must_use]
    pub fn auto_opens(&self) -> &[String] {
        match &self.metadata {
            UnitMetadata::Native { signature, .. } => &signature.auto_opens,
            UnitMetadata::Foreign { .. } => &[],
        }
    }

    /// Assemblies granted access to this unit's internals.
    #[must_use]
    pub fn internals_visible_to(&self) -> &[String] {
        match &self.metadata {
            UnitMetadata::Native { signature, .. } => &signature.internals_visible_to,
            UnitMetadata::Foreign { .. } => &[],
        }
    }

    /// Types whose declarations live in another unit.
    #[must_use]
    pub fn type_forwarders(&self) -> &[TypeForwarder] {
        match &self.metadata {
            UnitMetadata::Native { signature, .. } => &signature.type_forwarders,
            UnitMetadata::Foreign { .. } => &[],
        }
    }

    /// Deferred optimization data access.
    ///
    /// Returns `Ok(None)` for foreign units and for native units whose
    /// artifact ships no optimization resource.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the resource exists but does
    /// not deserialize.
    pub fn optimization(&self) -> Result<Option<&OptimizationData>> {
        match &self.metadata {
            UnitMetadata::Native { optimization, .. } => optimization.get_or_load(&self.module),
            UnitMetadata::Foreign { .. } => Ok(None),
        }
    }

    /// Returns `true` if optimization data has been materialized.
    #[must_use]
    pub fn optimization_loaded(&self) -> bool {
        match &self.metadata {
            UnitMetadata::Native { optimization, .. } => optimization.is_loaded(),
            UnitMetadata::Foreign { .. } => false,
        }
    }

    /// Returns `true` if the batch fixup pass has run for this unit.
    #[must_use]
    pub fn references_resolved(&self) -> bool {
        self.resolved_references.get().is_some()
    }

    /// Units this unit's payload references, as resolved by its batch.
    ///
    /// Empty until fixup has run (and always for foreign units). Handles
    /// are upgraded against the owning batch; units outliving their batch
    /// lose navigation, not identity.
    #[must_use]
    pub fn resolved_references(&self) -> Vec<Arc<CompilationUnit>> {
        match self.resolved_references.get() {
            Some(handles) => handles.iter().filter_map(Weak::upgrade).collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn set_resolved_references(&self, references: Vec<Weak<CompilationUnit>>) {
        // Resolution runs exactly once per unit; a repeat batch containing
        // an already-fixed-up unit keeps the first result.
        let _ = self.resolved_references.set(references);
    }
}
