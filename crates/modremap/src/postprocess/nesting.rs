use std::path::{Path, PathBuf};

use super::PostProcessError;
use crate::descriptor;

/// Record bundled dependency archives in the output descriptor so the
/// target runtime can discover and load them.
///
/// Returns whether any entry was added; an empty dependency set is a valid
/// no-op. A dependency whose artifact-relative path cannot be expressed is
/// skipped with a warning rather than failing the invocation.
pub fn annotate_nested_jars(jar: &Path, nested: &[PathBuf]) -> Result<bool, PostProcessError> {
    let mut files = Vec::with_capacity(nested.len());
    for dependency in nested {
        match dependency.to_str() {
            Some(path) if dependency.file_name().is_some() => files.push(path.to_string()),
            _ => tracing::warn!(
                dependency = %dependency.display(),
                "cannot determine bundled path for dependency, skipping"
            ),
        }
    }

    if files.is_empty() {
        return Ok(false);
    }

    let added = descriptor::add_nested_jars(jar, &files)?;
    Ok(added > 0)
}
