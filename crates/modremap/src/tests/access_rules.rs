use crate::archive;
use crate::config::AccessRuleMode;
use crate::mapping::{MappingSet, MemberKey};
use crate::postprocess::{process_access_rules, PostProcessError};
use crate::tests::write_jar;

fn mapping() -> MappingSet {
    let mut mapping = MappingSet::new("named", "intermediary");
    mapping.insert_class("a/A", "x/X", false).unwrap();
    mapping
        .insert_method(MemberKey::new("a/A", "run", "()V"), "method_1", false)
        .unwrap();
    mapping
        .insert_field(MemberKey::new("a/A", "count", "I"), "field_1", false)
        .unwrap();
    mapping
}

#[test]
fn obfuscate_translates_rules_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    let rules = "# widen entry points\npublic a/A\npublic a/A run ()V\npublic-f a/A count I\n";
    write_jar(&jar, &[("rules.at", rules.as_bytes())]);

    let did = process_access_rules(&jar, AccessRuleMode::Obfuscate, &mapping()).expect("process");
    assert!(did);

    let translated = archive::read_entry(&jar, "rules.at")
        .expect("read")
        .expect("entry present");
    let translated = String::from_utf8(translated).expect("utf8");
    assert_eq!(
        translated,
        "# widen entry points\npublic x/X\npublic x/X method_1 ()V\npublic-f x/X field_1 I\n"
    );
}

#[test]
fn convert_replaces_the_legacy_resource_with_a_widener() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    let rules = "public a/A\npublic-f a/A run ()V\n";
    write_jar(
        &jar,
        &[("rules.at", rules.as_bytes()), ("mod.json", b"{}")],
    );

    let did = process_access_rules(&jar, AccessRuleMode::Convert, &mapping()).expect("process");
    assert!(did);

    assert!(archive::read_entry(&jar, "rules.at").expect("read").is_none());
    let widener = archive::read_entry(&jar, "rules.accesswidener")
        .expect("read")
        .expect("widener present");
    let widener = String::from_utf8(widener).expect("utf8");
    assert_eq!(
        widener,
        "accessWidener\tv1\tintermediary\n\
         accessible\tclass\tx/X\n\
         accessible\tmethod\tx/X\tmethod_1\t()V\n\
         extendable\tmethod\tx/X\tmethod_1\t()V\n"
    );

    let descriptor = archive::read_entry(&jar, "mod.json")
        .expect("read")
        .expect("descriptor present");
    let descriptor: serde_json::Value = serde_json::from_slice(&descriptor).expect("json");
    assert_eq!(
        descriptor["accessWidener"],
        serde_json::json!("rules.accesswidener")
    );
}

#[test]
fn conversion_survives_a_missing_descriptor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("rules.at", b"public a/A\n")]);

    // No mod.json: the marker step degrades to a warning.
    let did = process_access_rules(&jar, AccessRuleMode::Convert, &mapping()).expect("process");
    assert!(did);
    assert!(archive::read_entry(&jar, "rules.accesswidener")
        .expect("read")
        .is_some());
}

#[test]
fn conversion_survives_a_non_object_descriptor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("rules.at", b"public a/A\n"), ("mod.json", b"[]")]);

    // The marker cannot be recorded in a descriptor that is not an object;
    // the conversion itself still stands.
    let did = process_access_rules(&jar, AccessRuleMode::Convert, &mapping()).expect("process");
    assert!(did);
    assert!(archive::read_entry(&jar, "rules.accesswidener")
        .expect("read")
        .is_some());
    let descriptor = archive::read_entry(&jar, "mod.json")
        .expect("read")
        .expect("descriptor present");
    assert_eq!(descriptor, b"[]");
}

#[test]
fn no_legacy_resource_is_a_noop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("data.txt", b"payload")]);

    let did = process_access_rules(&jar, AccessRuleMode::Obfuscate, &mapping()).expect("process");
    assert!(!did);
}

#[test]
fn malformed_rules_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("rules.at", b"public a/A run\n")]);

    let error =
        process_access_rules(&jar, AccessRuleMode::Obfuscate, &mapping()).expect_err("malformed");
    assert!(matches!(
        error,
        PostProcessError::MalformedRule { line: 1, .. }
    ));
}
