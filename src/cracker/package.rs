//! Library-package detection from installed binary references.
//!
//! A binary reference pointing into the package store may belong to a
//! "library package": one that ships transpile-able source next to the
//! compiled binary. Detection is purely convention-driven: the package root
//! is derived from the binary path, and a package qualifies only when it
//! carries exactly one manifest and exactly one library-project file in the
//! known locations. Anything else is an ordinary opaque binary dependency,
//! which is a normal outcome, never an error.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use quick_xml::events::Event;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    Result,
};

/// Subdirectories of a package root that may hold the library-project file.
const LIBRARY_PROJECT_DIRS: &[&str] = &["fable", "src"];

/// Package ids excluded from declared dependency sets by exact name.
const FRAMEWORK_PACKAGE_NAMES: &[&str] = &["FSharp.Core", "NETStandard.Library"];

/// Package id prefixes excluded from declared dependency sets.
const FRAMEWORK_PACKAGE_PREFIXES: &[&str] = &["System.", "Microsoft.", "runtime."];

/// A package that ships source for re-compilation alongside its binary.
#[derive(Debug, Clone)]
pub struct LibraryPackage {
    /// Package id from the manifest.
    pub id: String,
    /// Package version from the manifest.
    pub version: String,
    /// Path of the `.nuspec` manifest in the package root.
    pub manifest_path: PathBuf,
    /// Path of the shipped library-project file.
    pub library_project_path: PathBuf,
    /// Path of the compiled binary the reference pointed at.
    pub binary_path: PathBuf,
    /// Declared dependency ids, framework packages filtered out.
    pub dependencies: Vec<String>,
    /// Ordered staged source paths; empty until the package is ordered and
    /// staged into the cache directory.
    pub source_paths: Vec<PathBuf>,
}

/// Convention-based detector for source-shipping library packages.
#[derive(Debug)]
pub struct PackageResolver {
    replacements: BTreeMap<String, PathBuf>,
    diagnostics: Arc<Diagnostics>,
}

impl PackageResolver {
    /// A resolver honoring `replacements` as id→local-library-project
    /// overrides for local development.
    #[must_use]
    pub fn new(replacements: BTreeMap<String, PathBuf>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            replacements,
            diagnostics,
        }
    }

    /// Whether `id` names a framework package.
    ///
    /// A fixed name/prefix allow-list used to keep framework noise out of
    /// declared dependency sets and to skip pointless store probes. It is a
    /// noise-reduction filter, not a correctness gate.
    #[must_use]
    pub fn is_framework_package(id: &str) -> bool {
        FRAMEWORK_PACKAGE_NAMES.contains(&id)
            || FRAMEWORK_PACKAGE_PREFIXES
                .iter()
                .any(|prefix| id.starts_with(prefix))
    }

    /// Probe whether `binary_path` belongs to a library package.
    ///
    /// The package root is taken three directory levels above the binary
    /// (`<root>/lib/<tfm>/<file>.dll` install convention). `Ok(None)` means
    /// ordinary binary dependency; multiple manifest or library-project
    /// candidates abandon resolution with a warning diagnostic and also
    /// fall back to `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::XmlError`] or [`crate::Error::FileError`]
    /// when a discovered manifest cannot be read or parsed.
    pub fn try_resolve_library_package(
        &self,
        binary_path: &Path,
    ) -> Result<Option<LibraryPackage>> {
        let root = match binary_path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::parent)
        {
            Some(root) if root.is_dir() => root,
            _ => return Ok(None),
        };

        let manifest_path = match self.single_candidate(&files_with_extension(root, "nuspec")) {
            Some(path) => path,
            None => return Ok(None),
        };

        let mut projects = Vec::new();
        for sub in LIBRARY_PROJECT_DIRS {
            projects.extend(files_with_extension(&root.join(sub), "fsproj"));
        }
        let library_project_path = match self.single_candidate(&projects) {
            Some(path) => path,
            None => return Ok(None),
        };

        let manifest = Manifest::parse(&manifest_path)?;
        let library_project_path = self
            .replacements
            .get(&manifest.id)
            .cloned()
            .unwrap_or(library_project_path);

        Ok(Some(LibraryPackage {
            id: manifest.id,
            version: manifest.version,
            manifest_path,
            library_project_path,
            binary_path: binary_path.to_path_buf(),
            dependencies: manifest.dependencies,
            source_paths: Vec::new(),
        }))
    }

    /// Exactly-one rule over discovery candidates.
    fn single_candidate(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        match candidates {
            [single] => Some(single.clone()),
            [] => None,
            [first, ..] => {
                self.diagnostics.warning(
                    DiagnosticCategory::Package,
                    format!(
                        "Ambiguous package layout: {} candidates next to '{}', \
                         treating as ordinary binary dependency",
                        candidates.len(),
                        first.display()
                    ),
                );
                None
            }
        }
    }
}

/// Files directly in `dir` with the given extension, sorted by path.
fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// The subset of a `.nuspec` manifest the resolver consumes.
#[derive(Debug)]
struct Manifest {
    id: String,
    version: String,
    dependencies: Vec<String>,
}

impl Manifest {
    /// Parse `<id>`, `<version>` and `<dependency id=…>` elements out of the
    /// manifest at `path`, dropping framework ids from the dependency set.
    fn parse(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        let mut reader = quick_xml::Reader::from_str(&xml);
        reader.config_mut().trim_text(true);

        let mut id = None;
        let mut version = None;
        let mut dependencies = Vec::new();
        let mut current = None;

        loop {
            match reader.read_event()? {
                Event::Start(element) | Event::Empty(element) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    if name == "dependency" {
                        for attribute in element.attributes() {
                            let attribute = attribute.map_err(quick_xml::Error::from)?;
                            if attribute.key.as_ref() == b"id" {
                                let dep = attribute
                                    .unescape_value()
                                    .map_err(quick_xml::Error::from)?
                                    .into_owned();
                                if !PackageResolver::is_framework_package(&dep)
                                    && !dependencies.contains(&dep)
                                {
                                    dependencies.push(dep);
                                }
                            }
                        }
                    }
                    current = Some(name);
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(quick_xml::Error::from)?;
                    match current.as_deref() {
                        Some("id") if id.is_none() => id = Some(value.into_owned()),
                        Some("version") if version.is_none() => version = Some(value.into_owned()),
                        _ => {}
                    }
                }
                Event::End(_) => current = None,
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            version: version.unwrap_or_default(),
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package>
  <metadata>
    <id>Fancy.Json</id>
    <version>2.1.0</version>
    <dependencies>
      <group targetFramework=".NETStandard2.0">
        <dependency id="FSharp.Core" version="6.0.0" />
        <dependency id="Fancy.Core" version="2.1.0" />
        <dependency id="System.Text.Json" version="7.0.0" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    fn install_package(store: &Path, id: &str, manifest: &str) -> PathBuf {
        let root = store.join(id).join("2.1.0");
        let lib = root.join("lib").join("netstandard2.0");
        let fable = root.join("fable");
        fs::create_dir_all(&lib).unwrap();
        fs::create_dir_all(&fable).unwrap();
        fs::write(root.join(format!("{id}.nuspec")), manifest).unwrap();
        fs::write(fable.join(format!("{id}.fsproj")), "<Project />").unwrap();
        let binary = lib.join(format!("{id}.dll"));
        fs::write(&binary, b"bin").unwrap();
        binary
    }

    fn resolver() -> PackageResolver {
        PackageResolver::new(BTreeMap::new(), Arc::new(Diagnostics::new()))
    }

    #[test]
    fn test_framework_filter() {
        assert!(PackageResolver::is_framework_package("FSharp.Core"));
        assert!(PackageResolver::is_framework_package("NETStandard.Library"));
        assert!(PackageResolver::is_framework_package("System.Text.Json"));
        assert!(PackageResolver::is_framework_package("Microsoft.CSharp"));
        assert!(PackageResolver::is_framework_package("runtime.native.System"));
        assert!(!PackageResolver::is_framework_package("Fancy.Json"));
    }

    #[test]
    fn test_resolves_library_package() {
        let dir = tempfile::tempdir().unwrap();
        let binary = install_package(dir.path(), "Fancy.Json", MANIFEST);

        let package = resolver()
            .try_resolve_library_package(&binary)
            .unwrap()
            .unwrap();
        assert_eq!(package.id, "Fancy.Json");
        assert_eq!(package.version, "2.1.0");
        assert_eq!(package.dependencies, ["Fancy.Core"]);
        assert!(package.library_project_path.ends_with("fable/Fancy.Json.fsproj"));
        assert!(package.source_paths.is_empty());
    }

    #[test]
    fn test_binary_outside_store_is_no_package() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("Plain.dll");
        fs::write(&binary, b"bin").unwrap();

        assert!(resolver()
            .try_resolve_library_package(&binary)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_library_project_is_no_package() {
        let dir = tempfile::tempdir().unwrap();
        let binary = install_package(dir.path(), "Fancy.Json", MANIFEST);
        fs::remove_file(
            binary
                .parent()
                .unwrap()
                .parent()
                .unwrap()
                .parent()
                .unwrap()
                .join("fable")
                .join("Fancy.Json.fsproj"),
        )
        .unwrap();

        assert!(resolver()
            .try_resolve_library_package(&binary)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ambiguous_manifest_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let binary = install_package(dir.path(), "Fancy.Json", MANIFEST);
        let root = binary.parent().unwrap().parent().unwrap().parent().unwrap();
        fs::write(root.join("Second.nuspec"), MANIFEST).unwrap();

        let diagnostics = Arc::new(Diagnostics::new());
        let resolver = PackageResolver::new(BTreeMap::new(), diagnostics.clone());
        assert!(resolver.try_resolve_library_package(&binary).unwrap().is_none());
        assert!(diagnostics.has_warnings());
    }

    #[test]
    fn test_replacement_overrides_library_project() {
        let dir = tempfile::tempdir().unwrap();
        let binary = install_package(dir.path(), "Fancy.Json", MANIFEST);
        let local = dir.path().join("dev").join("Fancy.Json.fsproj");

        let mut replacements = BTreeMap::new();
        replacements.insert("Fancy.Json".to_string(), local.clone());
        let resolver = PackageResolver::new(replacements, Arc::new(Diagnostics::new()));

        let package = resolver
            .try_resolve_library_package(&binary)
            .unwrap()
            .unwrap();
        assert_eq!(package.library_project_path, local);
    }
}
