use crate::archive;
use crate::postprocess::relocate_reference_maps;
use crate::tests::write_jar;

fn mixin_config(min_version: &str, refmap: Option<&str>) -> Vec<u8> {
    let mut config = serde_json::json!({
        "minVersion": min_version,
        "package": "a.mixin",
        "mixins": ["AMixin"],
    });
    if let Some(refmap) = refmap {
        config["refmap"] = serde_json::json!(refmap);
    }
    serde_json::to_vec_pretty(&config).expect("serialize")
}

fn read_refmap(jar: &std::path::Path, entry: &str) -> Option<String> {
    let bytes = archive::read_entry(jar, entry).expect("read").expect("entry");
    let config: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    config
        .get("refmap")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

#[test]
fn relocates_supported_configs_to_the_canonical_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(
        &jar,
        &[(
            "a.mixins.json",
            &mixin_config("0.8", Some("stale-refmap.json")),
        )],
    );

    let did = relocate_reference_maps(&jar, "mod-refmap.json").expect("relocate");
    assert!(did);
    assert_eq!(
        read_refmap(&jar, "a.mixins.json").as_deref(),
        Some("mod-refmap.json")
    );
}

#[test]
fn relocation_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(&jar, &[("a.mixins.json", &mixin_config("0.8", None))]);

    assert!(relocate_reference_maps(&jar, "mod-refmap.json").expect("first run"));
    let first = read_refmap(&jar, "a.mixins.json");

    assert!(!relocate_reference_maps(&jar, "mod-refmap.json").expect("second run"));
    assert_eq!(read_refmap(&jar, "a.mixins.json"), first);
}

#[test]
fn unsupported_schema_versions_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(
        &jar,
        &[
            ("old.mixins.json", &mixin_config("0.4", None)),
            ("unversioned.mixins.json", br#"{"package": "a.mixin"}"#),
        ],
    );

    let did = relocate_reference_maps(&jar, "mod-refmap.json").expect("relocate");
    assert!(!did);
    assert_eq!(read_refmap(&jar, "old.mixins.json"), None);
    assert_eq!(read_refmap(&jar, "unversioned.mixins.json"), None);
}

#[test]
fn non_object_configs_are_left_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(
        &jar,
        &[
            ("list.mixins.json", br#"["0.8"]"#.as_slice()),
            ("good.mixins.json", &mixin_config("0.8", None)),
        ],
    );

    let did = relocate_reference_maps(&jar, "mod-refmap.json").expect("relocate");
    assert!(did);
    assert_eq!(
        read_refmap(&jar, "good.mixins.json").as_deref(),
        Some("mod-refmap.json")
    );
    let untouched = archive::read_entry(&jar, "list.mixins.json")
        .expect("read")
        .expect("entry present");
    assert_eq!(untouched, br#"["0.8"]"#);
}

#[test]
fn one_malformed_config_does_not_block_the_rest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("mod.jar");
    write_jar(
        &jar,
        &[
            ("broken.mixins.json", b"{not json".as_slice()),
            ("good.mixins.json", &mixin_config("0.8", None)),
        ],
    );

    let did = relocate_reference_maps(&jar, "mod-refmap.json").expect("relocate");
    assert!(did);
    assert_eq!(
        read_refmap(&jar, "good.mixins.json").as_deref(),
        Some("mod-refmap.json")
    );
}
