use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde_json::{json, Value};
use thiserror::Error;

use crate::archive::{self, ArchiveError};

/// Name of the artifact descriptor consumed by the target runtime.
pub const DESCRIPTOR_ENTRY: &str = "mod.json";

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("artifact {path} has no mod.json descriptor")]
    Missing { path: PathBuf },
    #[error("malformed descriptor in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_descriptor(jar: &Path) -> Result<Value, DescriptorError> {
    let bytes = archive::read_entry(jar, DESCRIPTOR_ENTRY)?.ok_or_else(|| {
        DescriptorError::Missing {
            path: jar.to_path_buf(),
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| DescriptorError::Json {
        path: jar.to_path_buf(),
        source,
    })
}

fn write_descriptor(jar: &Path, value: &Value) -> Result<(), DescriptorError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| DescriptorError::Json {
        path: jar.to_path_buf(),
        source,
    })?;
    let mut changes = BTreeMap::new();
    changes.insert(DESCRIPTOR_ENTRY.to_string(), Some(bytes));
    archive::patch_entries(jar, changes)?;
    Ok(())
}

/// Record the access-widener resource name so the target runtime can
/// discover the converted rules.
pub fn set_access_widener(jar: &Path, resource: &str) -> Result<(), DescriptorError> {
    let mut descriptor = read_descriptor(jar)?;
    let Some(object) = descriptor.as_object_mut() else {
        return Err(not_an_object(jar));
    };
    object.insert("accessWidener".to_string(), json!(resource));
    write_descriptor(jar, &descriptor)
}

fn not_an_object(jar: &Path) -> DescriptorError {
    DescriptorError::Json {
        path: jar.to_path_buf(),
        source: serde_json::Error::io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "descriptor is not a JSON object",
        )),
    }
}

/// Append bundled dependency paths to the descriptor's `jars` list,
/// skipping paths already declared. Returns how many entries were added.
pub fn add_nested_jars(jar: &Path, files: &[String]) -> Result<usize, DescriptorError> {
    let mut descriptor = read_descriptor(jar)?;

    let jars = descriptor
        .as_object_mut()
        .map(|object| {
            object
                .entry("jars")
                .or_insert_with(|| Value::Array(Vec::new()))
        })
        .and_then(Value::as_array_mut);
    let Some(jars) = jars else {
        return Err(DescriptorError::Json {
            path: jar.to_path_buf(),
            source: serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "descriptor 'jars' field is not a list",
            )),
        });
    };

    let declared: HashSet<String> = jars
        .iter()
        .filter_map(|entry| entry.get("file"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    let mut added = 0;
    for file in files {
        if declared.contains(file) {
            continue;
        }
        jars.push(json!({ "file": file }));
        added += 1;
    }

    if added > 0 {
        write_descriptor(jar, &descriptor)?;
    }
    Ok(added)
}
