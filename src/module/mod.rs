//! Binary artifact containers and the logical-name-keyed module cache.
//!
//! Compiled dependencies ship a compact metadata container (the `BMDL`
//! format) describing the unit's logical name, identity, exported types and
//! embedded resources. This module parses that container into a
//! [`BinaryModule`] and memoizes parsed modules in a [`BinaryModuleCache`]
//! so the same artifact is never read twice in one run.
//!
//! # Container Format
//!
//! ```text
//! u32   magic "BMDL" (0x4C444D42)
//! u16   format major version (supported: 1)
//! u16   format minor version (ignored)
//! str   logical assembly name          (7-bit-length-prefixed UTF-8)
//! guid  mvid                           (16 bytes)
//! u32   exported type count
//!       { str namespace, str name }    per exported type
//! u32   resource count
//!       { str name, u32 len, bytes }   per resource
//! ```
//!
//! Truncation, a bad magic value or an unsupported major version is fatal;
//! no default module is ever substituted for a broken artifact.
//!
//! # Key Components
//!
//! - [`BinaryModule`] - One parsed artifact, immutable, process-lifetime
//! - [`BinaryModuleCache`] - Name-keyed memoizing loader
//! - [`ExportedType`] - A type declared by the artifact itself
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use depscope::module::BinaryModuleCache;
//!
//! let cache = BinaryModuleCache::new([
//!     ("MyLib".to_string(), "packages/mylib/1.0.0/lib/net6.0/MyLib.dll".into()),
//! ]);
//!
//! let module = cache.resolve("MyLib")?;
//! let again = cache.resolve("MyLib")?;
//! assert!(std::sync::Arc::ptr_eq(&module, &again));
//! # Ok::<(), depscope::Error>(())
//! ```

use dashmap::DashMap;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uguid::Guid;

use crate::{file::Buffer, Parser, Result};

/// Magic value at the start of every artifact container ("BMDL").
pub const CONTAINER_MAGIC: u32 = 0x4C44_4D42;

/// Highest container major version this crate understands.
pub const CONTAINER_VERSION: u16 = 1;

/// A type declared by a binary artifact's own export table.
///
/// Foreign units (no embedded signature data) are reconstructed from these
/// declarations alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedType {
    /// Dotted namespace, empty for the global namespace.
    pub namespace: String,
    /// Simple type name.
    pub name: String,
}

impl ExportedType {
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

/// One embedded resource: name plus the byte range within the artifact.
#[derive(Debug, Clone)]
struct ResourceEntry {
    name: String,
    offset: usize,
    len: usize,
}

/// A parsed binary artifact container.
///
/// Created on first request through [`BinaryModuleCache::resolve`],
/// immutable afterwards, and kept alive for the process lifetime. Resource
/// blobs are exposed as slices into the memory-mapped artifact rather than
/// copied out.
#[derive(Debug)]
pub struct BinaryModule {
    /// Where the artifact was loaded from.
    path: PathBuf,
    /// The memory-mapped artifact bytes; resource slices borrow from this.
    buffer: Buffer,
    /// Logical assembly name carried by the container.
    name: String,
    /// Module version identity.
    mvid: Guid,
    /// Types the artifact declares itself.
    exported_types: Vec<ExportedType>,
    /// Resource table in container order.
    resources: Vec<ResourceEntry>,
}

impl BinaryModule {
    /// Load and parse the artifact at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::Malformed`] for any structural problem: wrong magic,
    /// unsupported major version, truncated tables.
    pub fn from_file(path: &Path) -> Result<Self> {
        let buffer = Buffer::from_file(path)?;
        let (name, mvid, exported_types, resources) = Self::parse(buffer.data(), path)?;

        Ok(BinaryModule {
            path: path.to_path_buf(),
            buffer,
            name,
            mvid,
            exported_types,
            resources,
        })
    }

    fn parse(
        data: &[u8],
        path: &Path,
    ) -> Result<(String, Guid, Vec<ExportedType>, Vec<ResourceEntry>)> {
        let mut parser = Parser::new(data);

        let magic = parser.read_u32()?;
        if magic != CONTAINER_MAGIC {
            return Err(malformed_error!(
                "Bad container magic 0x{:08X} in {}",
                magic,
                path.display()
            ));
        }

        let major = parser.read_u16()?;
        let _minor = parser.read_u16()?;
        if major != CONTAINER_VERSION {
            return Err(malformed_error!(
                "Unsupported container version {} in {}",
                major,
                path.display()
            ));
        }

        let name = parser.read_prefixed_string_utf8()?;
        if name.is_empty() {
            return Err(malformed_error!(
                "Container in {} carries an empty assembly name",
                path.display()
            ));
        }

        let guid_bytes: [u8; 16] = parser
            .read_bytes(16)?
            .try_into()
            .map_err(|_| out_of_bounds_error!())?;
        let mvid = Guid::from_bytes(guid_bytes);

        let type_count = parser.read_u32()?;
        let mut exported_types = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            let namespace = parser.read_prefixed_string_utf8()?;
            let type_name = parser.read_prefixed_string_utf8()?;
            exported_types.push(ExportedType {
                namespace,
                name: type_name,
            });
        }

        let resource_count = parser.read_u32()?;
        let mut resources = Vec::with_capacity(resource_count as usize);
        for _ in 0..resource_count {
            let resource_name = parser.read_prefixed_string_utf8()?;
            let len = parser.read_u32()? as usize;
            let offset = parser.pos();
            parser.advance_by(len)?;
            resources.push(ResourceEntry {
                name: resource_name,
                offset,
                len,
            });
        }

        Ok((name, mvid, exported_types, resources))
    }

    /// Logical assembly name carried by the container.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module version identity.
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.mvid
    }

    /// Location the artifact was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Types the artifact declares itself, in container order.
    #[must_use]
    pub fn exported_types(&self) -> &[ExportedType] {
        &self.exported_types
    }

    /// Number of embedded resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// The raw bytes of the named resource, if present.
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &self.buffer.data()[entry.offset..entry.offset + entry.len])
    }

    /// All resources whose name starts with `prefix`, in container order.
    pub fn resources_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.resources
            .iter()
            .filter(move |entry| entry.name.starts_with(prefix))
            .map(|entry| {
                (
                    entry.name.as_str(),
                    &self.buffer.data()[entry.offset..entry.offset + entry.len],
                )
            })
    }
}

/// Lazily loads and memoizes [`BinaryModule`]s by logical assembly name.
///
/// The name→path mapping comes from the cracked project's binary references
/// plus any explicit registrations. Repeated [`resolve`](Self::resolve)
/// calls for the same name return the identical cached [`Arc`]; a missing
/// mapping, missing file or malformed artifact is fatal - no default module
/// is ever substituted.
#[derive(Debug, Default)]
pub struct BinaryModuleCache {
    /// Logical name → artifact path.
    paths: DashMap<String, PathBuf>,
    /// Memoized parse results.
    modules: DashMap<String, Arc<BinaryModule>>,
}

impl BinaryModuleCache {
    /// Create a cache over the given name→path mapping.
    pub fn new(paths: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            modules: DashMap::new(),
        }
    }

    /// Register an additional logical name → artifact path mapping.
    ///
    /// A later registration for an already-known name replaces the path for
    /// modules not yet loaded; an already-parsed module keeps its identity.
    pub fn register(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    /// Returns `true` if a path is registered for `name`.
    pub fn knows(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    /// Resolve `logical_name` to its parsed module, loading it on first use.
    ///
    /// # Errors
    /// Returns [`crate::Error::Configuration`] if no path is registered for
    /// the name, [`crate::Error::FileError`] if the artifact cannot be read,
    /// and [`crate::Error::Malformed`] if it does not parse or carries a
    /// different assembly name than requested.
    pub fn resolve(&self, logical_name: &str) -> Result<Arc<BinaryModule>> {
        if let Some(cached) = self.modules.get(logical_name) {
            return Ok(cached.clone());
        }

        let path = self
            .paths
            .get(logical_name)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                crate::Error::Configuration(format!(
                    "No artifact path registered for assembly '{}'",
                    logical_name
                ))
            })?;

        let module = Arc::new(BinaryModule::from_file(&path)?);
        if module.name() != logical_name {
            return Err(malformed_error!(
                "Artifact {} declares assembly '{}', expected '{}'",
                path.display(),
                module.name(),
                logical_name
            ));
        }

        self.modules
            .insert(logical_name.to_string(), module.clone());
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ArtifactBuilder;

    #[test]
    fn test_parse_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("MyLib")
            .exported_type("MyLib", "Widget")
            .exported_type("", "Global")
            .resource("FSharpSignatureData.MyLib", &[1, 2, 3])
            .write(dir.path());

        let module = BinaryModule::from_file(&path).unwrap();
        assert_eq!(module.name(), "MyLib");
        assert_eq!(module.exported_types().len(), 2);
        assert_eq!(module.exported_types()[0].full_name(), "MyLib.Widget");
        assert_eq!(module.exported_types()[1].full_name(), "Global");
        assert_eq!(module.resource("FSharpSignatureData.MyLib"), Some(&[1u8, 2, 3][..]));
        assert_eq!(module.resource("missing"), None);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dll");
        std::fs::write(&path, [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x00, 0x00, 0x00]).unwrap();

        assert!(matches!(
            BinaryModule::from_file(&path),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_unsupported_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("MyLib").version(9).write(dir.path());

        assert!(matches!(
            BinaryModule::from_file(&path),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_resource_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("MyLib")
            .resource("FSharpSignatureData.MyLib", &[1, 2, 3])
            .write(dir.path());

        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("truncated.dll");
        std::fs::write(&truncated, &bytes[..bytes.len() - 2]).unwrap();

        assert!(BinaryModule::from_file(&truncated).is_err());
    }

    #[test]
    fn test_cache_memoizes_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("MyLib").write(dir.path());

        let cache = BinaryModuleCache::new([("MyLib".to_string(), path)]);
        let first = cache.resolve("MyLib").unwrap();
        let second = cache.resolve("MyLib").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unregistered_name_is_fatal() {
        let cache = BinaryModuleCache::default();
        assert!(matches!(
            cache.resolve("Nope"),
            Err(crate::Error::Configuration(_))
        ));
    }

    #[test]
    fn test_name_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("Other").write(dir.path());

        let cache = BinaryModuleCache::new([("MyLib".to_string(), path)]);
        assert!(matches!(
            cache.resolve("MyLib"),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_resources_with_prefix_keeps_container_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactBuilder::new("MyLib")
            .resource("FSharpSignatureData.B", &[2])
            .resource("FSharpSignatureData.A", &[1])
            .resource("Other", &[9])
            .write(dir.path());

        let module = BinaryModule::from_file(&path).unwrap();
        let names: Vec<_> = module
            .resources_with_prefix("FSharpSignatureData.")
            .map(|(name, _)| name.to_string())
            .collect();
        assert_eq!(names, ["FSharpSignatureData.B", "FSharpSignatureData.A"]);
    }
}
