//! End-to-end batch import over crafted binary artifacts.

use std::{path::PathBuf, sync::Arc};

use depscope::{
    diagnostics::Diagnostics,
    importer::{
        CompilationUnitImporter, TypeLookupIndex, OPTIMIZATION_RESOURCE_PREFIX,
        RUNTIME_SUPPORT_UNIT, SIGNATURE_RESOURCE_PREFIX,
    },
    module::{BinaryModuleCache, CONTAINER_MAGIC, CONTAINER_VERSION},
    Error,
};

fn write_7bit(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn write_string(out: &mut Vec<u8>, text: &str) {
    write_7bit(out, text.len() as u32);
    out.extend_from_slice(text.as_bytes());
}

/// Serialize a BMDL container with the given exported types and resources.
fn artifact(
    name: &str,
    exported_types: &[(&str, &str)],
    resources: &[(String, Vec<u8>)],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&CONTAINER_MAGIC.to_le_bytes());
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    write_string(&mut out, name);
    out.extend_from_slice(&[0x42; 16]);

    out.extend_from_slice(&(exported_types.len() as u32).to_le_bytes());
    for (namespace, type_name) in exported_types {
        write_string(&mut out, namespace);
        write_string(&mut out, type_name);
    }

    out.extend_from_slice(&(resources.len() as u32).to_le_bytes());
    for (resource_name, data) in resources {
        write_string(&mut out, resource_name);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    out
}

/// Serialize a signature payload referencing `references` and declaring
/// `declared_types`.
fn signature_payload(references: &[&str], declared_types: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1u16.to_le_bytes());

    out.extend_from_slice(&(references.len() as u32).to_le_bytes());
    for reference in references {
        write_string(&mut out, reference);
    }

    out.extend_from_slice(&(declared_types.len() as u32).to_le_bytes());
    for (namespace, type_name) in declared_types {
        write_string(&mut out, namespace);
        write_string(&mut out, type_name);
    }

    // auto-opens, internals-visible-to, type forwarders: empty
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    out
}

fn optimization_payload(hints: &[(&str, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(hints.len() as u32).to_le_bytes());
    for (member_path, inline_size) in hints {
        write_string(&mut out, member_path);
        out.extend_from_slice(&inline_size.to_le_bytes());
    }
    out
}

fn native_artifact(name: &str, references: &[&str], with_optimization: bool) -> Vec<u8> {
    let mut resources = vec![(
        format!("{SIGNATURE_RESOURCE_PREFIX}{name}"),
        signature_payload(references, &[(name, "Entry")]),
    )];
    if with_optimization {
        resources.push((
            format!("{OPTIMIZATION_RESOURCE_PREFIX}{name}"),
            optimization_payload(&[("Entry.run", 12)]),
        ));
    }
    artifact(name, &[], &resources)
}

fn foreign_artifact(name: &str, exported_types: &[(&str, &str)]) -> Vec<u8> {
    artifact(name, exported_types, &[])
}

struct Fixture {
    importer: CompilationUnitImporter,
    diagnostics: Arc<Diagnostics>,
    _dir: tempfile::TempDir,
}

fn fixture(artifacts: &[(&str, Vec<u8>)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut paths: Vec<(String, PathBuf)> = Vec::new();
    for (name, bytes) in artifacts {
        let path = dir.path().join(format!("{name}.dll"));
        std::fs::write(&path, bytes).unwrap();
        paths.push((name.to_string(), path));
    }

    let diagnostics = Arc::new(Diagnostics::new());
    let importer = CompilationUnitImporter::new(
        Arc::new(BinaryModuleCache::new(paths)),
        diagnostics.clone(),
    );
    Fixture {
        importer,
        diagnostics,
        _dir: dir,
    }
}

fn runtime_support() -> (&'static str, Vec<u8>) {
    (
        RUNTIME_SUPPORT_UNIT,
        foreign_artifact(
            RUNTIME_SUPPORT_UNIT,
            &[
                ("System", "Object"),
                ("System", "ValueType"),
                ("System", "Attribute"),
                ("System", "Exception"),
                ("Microsoft.FSharp.Core", "FSharpOption`1"),
            ],
        ),
    )
}

#[test]
fn runtime_support_unit_is_always_first() {
    let fx = fixture(&[
        ("AppLib", native_artifact("AppLib", &[RUNTIME_SUPPORT_UNIT], false)),
        runtime_support(),
    ]);

    let batch = fx
        .importer
        .batch_import(&["AppLib", RUNTIME_SUPPORT_UNIT])
        .unwrap();

    assert_eq!(batch.units()[0].name(), RUNTIME_SUPPORT_UNIT);
    assert_eq!(batch.units()[1].name(), "AppLib");
}

#[test]
fn mutual_references_resolve_in_one_pass() {
    let fx = fixture(&[
        ("Alpha", native_artifact("Alpha", &["Beta"], false)),
        ("Beta", native_artifact("Beta", &["Alpha"], false)),
    ]);

    let batch = fx.importer.batch_import(&["Alpha", "Beta"]).unwrap();
    let alpha = batch.unit("Alpha").unwrap();
    let beta = batch.unit("Beta").unwrap();

    let alpha_refs = alpha.resolved_references();
    let beta_refs = beta.resolved_references();
    assert_eq!(alpha_refs.len(), 1);
    assert_eq!(alpha_refs[0].name(), "Beta");
    assert_eq!(beta_refs[0].name(), "Alpha");
}

#[test]
fn dangling_reference_is_fatal() {
    let fx = fixture(&[(
        "AppLib",
        native_artifact("AppLib", &["NotShipped"], false),
    )]);

    assert!(matches!(
        fx.importer.batch_import(&["AppLib"]),
        Err(Error::UnresolvedReference { unit, referenced })
            if unit == "AppLib" && referenced == "NotShipped"
    ));
}

#[test]
fn optimization_data_loaded_only_on_demand() {
    let fx = fixture(&[("AppLib", native_artifact("AppLib", &[], true))]);

    let batch = fx.importer.batch_import(&["AppLib"]).unwrap();
    let unit = batch.unit("AppLib").unwrap();

    assert!(!unit.optimization_loaded());
    let data = unit.optimization().unwrap().unwrap();
    assert_eq!(data.inline_hints.len(), 1);
    assert!(unit.optimization_loaded());
}

#[test]
fn missing_optimization_data_degrades() {
    let fx = fixture(&[("AppLib", native_artifact("AppLib", &[], false))]);

    let batch = fx.importer.batch_import(&["AppLib"]).unwrap();
    let unit = batch.unit("AppLib").unwrap();
    assert!(unit.optimization().unwrap().is_none());
}

#[test]
fn anchor_types_found_in_foreign_units_only() {
    let fx = fixture(&[
        runtime_support(),
        ("AppLib", native_artifact("AppLib", &[RUNTIME_SUPPORT_UNIT], false)),
    ]);

    let batch = fx
        .importer
        .batch_import(&[RUNTIME_SUPPORT_UNIT, "AppLib"])
        .unwrap();
    let index = TypeLookupIndex::from_batch(&batch, fx.diagnostics.clone());

    assert!(index.verify_anchors().is_ok());
    let found = index
        .try_find_type(&["Microsoft", "FSharp", "Core"], "FSharpOption`1")
        .unwrap();
    assert_eq!(found.unit.name(), RUNTIME_SUPPORT_UNIT);
    // native unit declarations are invisible to the index
    assert!(index.try_find_type(&["AppLib"], "Entry").is_none());
}

#[test]
fn duplicate_signature_resource_is_fatal() {
    let payload = signature_payload(&[], &[]);
    let bytes = artifact(
        "AppLib",
        &[],
        &[
            (format!("{SIGNATURE_RESOURCE_PREFIX}AppLib"), payload.clone()),
            (format!("{SIGNATURE_RESOURCE_PREFIX}AppLib.Again"), payload),
        ],
    );
    let fx = fixture(&[("AppLib", bytes)]);

    assert!(matches!(
        fx.importer.batch_import(&["AppLib"]),
        Err(Error::DuplicateResource(_))
    ));
}

#[test]
fn repeated_import_returns_same_unit() {
    let fx = fixture(&[("AppLib", native_artifact("AppLib", &[], false))]);

    let first = fx.importer.import("AppLib").unwrap();
    let second = fx.importer.import("AppLib").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn batch_preserves_request_order_after_runtime_unit() {
    let fx = fixture(&[
        ("Zeta", foreign_artifact("Zeta", &[("Zeta", "Z")])),
        ("Alpha", foreign_artifact("Alpha", &[("Alpha", "A")])),
        runtime_support(),
    ]);

    let batch = fx
        .importer
        .batch_import(&["Zeta", RUNTIME_SUPPORT_UNIT, "Alpha"])
        .unwrap();
    let names: Vec<_> = batch.units().iter().map(|u| u.name().to_string()).collect();
    assert_eq!(names, [RUNTIME_SUPPORT_UNIT, "Zeta", "Alpha"]);
}
