use std::path::PathBuf;

use crate::archive;
use crate::descriptor::DescriptorError;
use crate::postprocess::{annotate_nested_jars, PostProcessError};
use crate::tests::write_jar;

fn nested_files(jar: &std::path::Path) -> Vec<String> {
    let bytes = archive::read_entry(jar, "mod.json")
        .expect("read")
        .expect("descriptor");
    let descriptor: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    descriptor["jars"]
        .as_array()
        .map(|jars| {
            jars.iter()
                .filter_map(|entry| entry["file"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn records_bundled_dependency_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("mod.json", b"{}")]);

    let did = annotate_nested_jars(&jar, &[PathBuf::from("libs/dep.jar")]).expect("annotate");
    assert!(did);
    assert_eq!(nested_files(&jar), vec!["libs/dep.jar".to_string()]);
}

#[test]
fn already_declared_paths_are_not_duplicated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(
        &jar,
        &[("mod.json", br#"{"jars": [{"file": "libs/dep.jar"}]}"#)],
    );

    let did = annotate_nested_jars(&jar, &[PathBuf::from("libs/dep.jar")]).expect("annotate");
    assert!(!did);
    assert_eq!(nested_files(&jar), vec!["libs/dep.jar".to_string()]);
}

#[test]
fn an_empty_dependency_set_is_a_noop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("mod.json", b"{}")]);

    let did = annotate_nested_jars(&jar, &[]).expect("annotate");
    assert!(!did);
}

#[test]
fn a_missing_descriptor_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("data.txt", b"payload")]);

    let error =
        annotate_nested_jars(&jar, &[PathBuf::from("libs/dep.jar")]).expect_err("missing");
    assert!(matches!(
        error,
        PostProcessError::Descriptor(DescriptorError::Missing { .. })
    ));
}
