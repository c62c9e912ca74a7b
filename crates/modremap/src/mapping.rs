use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::RemapConfig;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("IO error while reading mappings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("missing tiny v1 header in {path}")]
    MissingHeader { path: PathBuf },
    #[error("malformed mapping row at {path}:{line}")]
    MalformedRow { path: PathBuf, line: usize },
    #[error("namespace '{namespace}' not present in {path}")]
    UnknownNamespace { namespace: String, path: PathBuf },
    #[error("mappings in {path} must list the source namespace first (found '{found}')")]
    NamespaceOrder { path: PathBuf, found: String },
    #[error("conflicting mapping for {symbol}: '{existing}' vs '{replacement}'")]
    Conflict {
        symbol: String,
        existing: String,
        replacement: String,
    },
}

/// Identifies a field or method in the source namespace. Internal (slashed)
/// class names, JVM descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Assembled source-to-target symbol mapping. Immutable once handed to the
/// remap engine; the assembly phase is the only writer.
#[derive(Debug, Clone)]
pub struct MappingSet {
    source_namespace: String,
    target_namespace: String,
    classes: HashMap<String, String>,
    fields: HashMap<MemberKey, String>,
    methods: HashMap<MemberKey, String>,
}

impl MappingSet {
    pub fn new(source_namespace: impl Into<String>, target_namespace: impl Into<String>) -> Self {
        Self {
            source_namespace: source_namespace.into(),
            target_namespace: target_namespace.into(),
            classes: HashMap::new(),
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn source_namespace(&self) -> &str {
        &self.source_namespace
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn member_count(&self) -> usize {
        self.fields.len() + self.methods.len()
    }

    pub fn insert_class(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        ignore_conflicts: bool,
    ) -> Result<(), MappingError> {
        let source = source.into();
        let target = target.into();
        if let Some(existing) = self.classes.get(&source) {
            if *existing != target && !ignore_conflicts {
                return Err(MappingError::Conflict {
                    symbol: source,
                    existing: existing.clone(),
                    replacement: target,
                });
            }
        }
        self.classes.insert(source, target);
        Ok(())
    }

    pub fn insert_field(
        &mut self,
        key: MemberKey,
        target: impl Into<String>,
        ignore_conflicts: bool,
    ) -> Result<(), MappingError> {
        let target = target.into();
        if let Some(existing) = self.fields.get(&key) {
            if *existing != target && !ignore_conflicts {
                return Err(MappingError::Conflict {
                    symbol: format!("{}.{}{}", key.owner, key.name, key.descriptor),
                    existing: existing.clone(),
                    replacement: target,
                });
            }
        }
        self.fields.insert(key, target);
        Ok(())
    }

    pub fn insert_method(
        &mut self,
        key: MemberKey,
        target: impl Into<String>,
        ignore_conflicts: bool,
    ) -> Result<(), MappingError> {
        let target = target.into();
        if let Some(existing) = self.methods.get(&key) {
            if *existing != target && !ignore_conflicts {
                return Err(MappingError::Conflict {
                    symbol: format!("{}.{}{}", key.owner, key.name, key.descriptor),
                    existing: existing.clone(),
                    replacement: target,
                });
            }
        }
        self.methods.insert(key, target);
        Ok(())
    }

    /// Merge `other` into this set. In strict mode an overlapping symbol with
    /// a different target is a conflict; otherwise the merged-in entry wins.
    pub fn merge(&mut self, other: MappingSet, ignore_conflicts: bool) -> Result<(), MappingError> {
        for (source, target) in other.classes {
            self.insert_class(source, target, ignore_conflicts)?;
        }
        for (key, target) in other.fields {
            self.insert_field(key, target, ignore_conflicts)?;
        }
        for (key, target) in other.methods {
            self.insert_method(key, target, ignore_conflicts)?;
        }
        Ok(())
    }

    pub fn map_class(&self, source: &str) -> Option<&str> {
        self.classes.get(source).map(String::as_str)
    }

    pub fn map_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.fields
            .get(&MemberKey::new(owner, name, descriptor))
            .map(String::as_str)
    }

    pub fn map_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(&MemberKey::new(owner, name, descriptor))
            .map(String::as_str)
    }

    /// Rewrite every `L<class>;` segment of a field or method descriptor
    /// through the class map. Descriptors are namespace-sensitive, so any
    /// descriptor stored next to a source-namespace symbol must pass through
    /// here before it is written into the output.
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        let bytes = descriptor.as_bytes();
        let mut out = String::with_capacity(descriptor.len());
        let mut pos = 0;
        while pos < bytes.len() {
            let ch = bytes[pos];
            out.push(ch as char);
            pos += 1;
            if ch == b'L' {
                let start = pos;
                while pos < bytes.len() && bytes[pos] != b';' {
                    pos += 1;
                }
                let name = &descriptor[start..pos];
                match self.map_class(name) {
                    Some(target) => out.push_str(target),
                    None => out.push_str(name),
                }
                if pos < bytes.len() {
                    out.push(';');
                    pos += 1;
                }
            }
        }
        out
    }
}

/// Build the effective mapping for one invocation: the mandatory primary
/// source plus, when its backing file exists, the secondary export.
pub fn assemble_mappings(config: &RemapConfig) -> Result<MappingSet, MappingError> {
    let mut mapping = load_tiny_v1(
        &config.primary_mappings,
        &config.source_namespace,
        &config.target_namespace,
        config.ignore_mapping_conflicts,
    )?;

    if let Some(path) = &config.secondary_mappings {
        if path.exists() {
            tracing::debug!(path = %path.display(), "merging secondary mapping export");
            let secondary = load_tiny_v1(
                path,
                &config.source_namespace,
                &config.target_namespace,
                config.ignore_mapping_conflicts,
            )?;
            mapping.merge(secondary, config.ignore_mapping_conflicts)?;
        }
    }

    Ok(mapping)
}

/// Load a tiny v1 mapping file, selecting the requested namespace pair.
///
/// Owner and descriptor columns of member rows are expressed in the first
/// namespace of the file, so the source namespace must be listed first.
pub fn load_tiny_v1(
    path: &Path,
    source_namespace: &str,
    target_namespace: &str,
    ignore_conflicts: bool,
) -> Result<MappingSet, MappingError> {
    let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = content.lines().enumerate();
    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line,
            None => {
                return Err(MappingError::MissingHeader {
                    path: path.to_path_buf(),
                })
            }
        }
    };

    let columns: Vec<&str> = header.split('\t').collect();
    if columns.first() != Some(&"v1") || columns.len() < 3 {
        return Err(MappingError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    let namespaces = &columns[1..];

    let source_index = namespace_index(namespaces, source_namespace, path)?;
    let target_index = namespace_index(namespaces, target_namespace, path)?;
    if source_index != 0 {
        return Err(MappingError::NamespaceOrder {
            path: path.to_path_buf(),
            found: namespaces[0].to_string(),
        });
    }

    let mut mapping = MappingSet::new(source_namespace, target_namespace);

    for (index, line) in lines {
        let line_number = index + 1;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        let malformed = || MappingError::MalformedRow {
            path: path.to_path_buf(),
            line: line_number,
        };

        match cells[0] {
            "CLASS" => {
                // 1 name per namespace
                let names = &cells[1..];
                let source = *names.get(source_index).ok_or_else(malformed)?;
                let target = *names.get(target_index).ok_or_else(malformed)?;
                mapping.insert_class(source, target, ignore_conflicts)?;
            }
            "FIELD" | "METHOD" => {
                // owner, descriptor, then 1 name per namespace
                let owner = *cells.get(1).ok_or_else(malformed)?;
                let descriptor = *cells.get(2).ok_or_else(malformed)?;
                let names = &cells[3..];
                let source = *names.get(source_index).ok_or_else(malformed)?;
                let target = *names.get(target_index).ok_or_else(malformed)?;
                let key = MemberKey::new(owner, source, descriptor);
                if cells[0] == "FIELD" {
                    mapping.insert_field(key, target, ignore_conflicts)?;
                } else {
                    mapping.insert_method(key, target, ignore_conflicts)?;
                }
            }
            _ => return Err(malformed()),
        }
    }

    Ok(mapping)
}

fn namespace_index(
    namespaces: &[&str],
    namespace: &str,
    path: &Path,
) -> Result<usize, MappingError> {
    namespaces
        .iter()
        .position(|candidate| *candidate == namespace)
        .ok_or_else(|| MappingError::UnknownNamespace {
            namespace: namespace.to_string(),
            path: path.to_path_buf(),
        })
}
