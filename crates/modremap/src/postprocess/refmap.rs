use std::collections::BTreeMap;
use std::path::Path;
use serde::Deserialize;
use serde_json::{json, Value};

use super::PostProcessError;
use crate::archive;

const MIXIN_CONFIG_SUFFIX: &str = ".mixins.json";

/// Schema versions from this one onwards support reference maps.
const MIN_SUPPORTED: (u32, u32) = (0, 6);

#[derive(Deserialize)]
struct MixinConfigProbe {
    #[serde(rename = "minVersion")]
    min_version: Option<String>,
}

/// Point every mixin configuration in `jar` at the artifact's canonical
/// reference-map resource. Returns whether any configuration was rewritten.
///
/// A malformed configuration is logged and skipped; it never blocks
/// relocation in the others. Running twice is a no-op the second time.
pub fn relocate_reference_maps(jar: &Path, refmap_name: &str) -> Result<bool, PostProcessError> {
    let mut changes = BTreeMap::new();

    for name in archive::entry_names(jar)? {
        if !name.ends_with(MIXIN_CONFIG_SUFFIX) {
            continue;
        }
        let bytes = archive::read_entry(jar, &name)?.unwrap_or_default();
        let mut config: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(entry = %name, error = %error, "skipping malformed mixin config");
                continue;
            }
        };

        let probe: MixinConfigProbe = match serde_json::from_value(config.clone()) {
            Ok(probe) => probe,
            Err(error) => {
                tracing::warn!(entry = %name, error = %error, "skipping malformed mixin config");
                continue;
            }
        };
        if !supports_refmap(probe.min_version.as_deref()) {
            tracing::debug!(entry = %name, "mixin config schema version does not support refmaps");
            continue;
        }

        if config.get("refmap").and_then(Value::as_str) == Some(refmap_name) {
            continue;
        }
        let Some(object) = config.as_object_mut() else {
            tracing::warn!(entry = %name, "skipping mixin config that is not a JSON object");
            continue;
        };
        object.insert("refmap".to_string(), json!(refmap_name));
        match serde_json::to_vec_pretty(&config) {
            Ok(bytes) => {
                changes.insert(name, Some(bytes));
            }
            Err(error) => {
                tracing::warn!(entry = %name, error = %error, "failed to serialize mixin config");
            }
        }
    }

    if changes.is_empty() {
        return Ok(false);
    }
    archive::patch_entries(jar, changes)?;
    Ok(true)
}

/// Unknown or unparsable versions fail closed: the file is left untouched.
fn supports_refmap(min_version: Option<&str>) -> bool {
    let Some(version) = min_version else {
        return false;
    };
    let mut parts = version.split('.');
    let major: u32 = match parts.next().and_then(|part| part.parse().ok()) {
        Some(value) => value,
        None => return false,
    };
    let minor: u32 = parts
        .next()
        .and_then(|part| part.parse().ok())
        .unwrap_or(0);
    (major, minor) >= MIN_SUPPORTED
}
