use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A resolved classpath member: exists on disk and is not the input artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    path: PathBuf,
}

impl ClasspathEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Filter the build-time dependency set down to the archives the remap
/// engine may consult for cross-reference resolution.
///
/// Order-preserving, duplicate-free; the input artifact and entries missing
/// from the filesystem are dropped. An empty result is valid and merely
/// starves the engine of cross-archive context.
pub fn resolve_classpath(files: &[PathBuf], input: &Path) -> Vec<ClasspathEntry> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter(|path| path.as_path() != input && path.exists())
        .filter(|path| seen.insert(path.as_path().to_path_buf()))
        .map(|path| ClasspathEntry { path: path.clone() })
        .collect()
}
