pub mod classfile;

pub use classfile::{parse_supers, ClassRewriteError, ClassSupers};

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::classpath::ClasspathEntry;
use crate::mapping::MappingSet;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while reading {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("failed to rewrite class {entry}: {source}")]
    Rewrite {
        entry: String,
        #[source]
        source: ClassRewriteError,
    },
    #[error("no mapping registered before apply")]
    MappingNotRegistered,
    #[error("mapping maps two classes onto '{name}'")]
    DuplicateClass { name: String },
}

impl EngineError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, source: ZipError) -> Self {
        Self::Zip {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Capability boundary around the symbol-rewriting engine. The pipeline only
/// depends on this protocol, never on a concrete engine.
pub trait RemapEngine {
    fn register_mapping(&mut self, mapping: &MappingSet, ignore_conflicts: bool);
    fn register_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<(), EngineError>;
    fn register_input(&mut self, input: &Path) -> Result<(), EngineError>;
    fn apply(&mut self, output: &Path) -> Result<(), EngineError>;
    fn release(&mut self);
}

/// Releases the wrapped engine exactly once, on every exit path.
pub struct EngineScope<'a> {
    engine: &'a mut dyn RemapEngine,
}

impl<'a> EngineScope<'a> {
    pub fn new(engine: &'a mut dyn RemapEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&mut self) -> &mut dyn RemapEngine {
        self.engine
    }
}

impl Drop for EngineScope<'_> {
    fn drop(&mut self) {
        self.engine.release();
    }
}

/// Super-type graph across the input artifact and its classpath, consulted
/// so inherited and overridden member renames propagate to subclasses.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    parents: HashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    pub fn record(&mut self, supers: ClassSupers) {
        let mut parents = Vec::with_capacity(1 + supers.interfaces.len());
        parents.extend(supers.superclass);
        parents.extend(supers.interfaces);
        self.parents.insert(supers.name, parents);
    }

    pub fn resolve_field<'a>(
        &self,
        mapping: &'a MappingSet,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&'a str> {
        self.resolve(owner, |class| mapping.map_field(class, name, descriptor))
    }

    pub fn resolve_method<'a>(
        &self,
        mapping: &'a MappingSet,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&'a str> {
        self.resolve(owner, |class| mapping.map_method(class, name, descriptor))
    }

    fn resolve<'a>(
        &self,
        owner: &str,
        lookup: impl Fn(&str) -> Option<&'a str>,
    ) -> Option<&'a str> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut visited = HashSet::new();
        while let Some(class) = queue.pop_front() {
            if !visited.insert(class.clone()) {
                continue;
            }
            if let Some(target) = lookup(&class) {
                return Some(target);
            }
            if let Some(parents) = self.parents.get(&class) {
                queue.extend(parents.iter().cloned());
            }
        }
        None
    }
}

/// Default engine: constant-pool level rename over the input archive.
///
/// Class entries are rewritten and renamed; every other resource is copied
/// raw, byte-for-byte, in its original order.
#[derive(Default)]
pub struct ClassFileRemapper {
    mapping: Option<MappingSet>,
    ignore_conflicts: bool,
    hierarchy: TypeHierarchy,
    inputs: Vec<PathBuf>,
}

impl ClassFileRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record super-type edges for every class reachable under `path`,
    /// which may be an archive or an exploded directory.
    fn scan(&mut self, path: &Path) -> Result<(), EngineError> {
        if path.is_dir() {
            return self.scan_directory(path);
        }
        if is_archive(path) {
            return self.scan_archive(path);
        }
        Ok(())
    }

    fn scan_directory(&mut self, root: &Path) -> Result<(), EngineError> {
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| EngineError::io(&dir, source))?;
            for entry in entries {
                let entry = entry.map_err(|source| EngineError::io(&dir, source))?;
                let path = entry.path();
                if path.is_dir() {
                    dirs.push(path);
                    continue;
                }
                if path.extension().and_then(OsStr::to_str) == Some("class") {
                    let bytes =
                        fs::read(&path).map_err(|source| EngineError::io(&path, source))?;
                    self.record_class(&bytes, &path.display().to_string());
                }
            }
        }
        Ok(())
    }

    fn scan_archive(&mut self, path: &Path) -> Result<(), EngineError> {
        let file = File::open(path).map_err(|source| EngineError::io(path, source))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|source| EngineError::zip(path, source))?;

        let mut buffer = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|source| EngineError::zip(path, source))?;
            if !entry.is_file() || !entry.name().ends_with(".class") {
                continue;
            }
            let name = entry.name().to_string();
            buffer.clear();
            entry
                .read_to_end(&mut buffer)
                .map_err(|source| EngineError::io(path, source))?;
            self.record_class(&buffer, &name);
        }
        Ok(())
    }

    fn record_class(&mut self, bytes: &[u8], origin: &str) {
        match parse_supers(bytes) {
            Ok(supers) => self.hierarchy.record(supers),
            // Classpath context is auxiliary; a single unreadable class only
            // degrades resolution for its subtree.
            Err(error) => {
                tracing::warn!(entry = %origin, error = %error, "skipping unreadable class")
            }
        }
    }
}

impl RemapEngine for ClassFileRemapper {
    fn register_mapping(&mut self, mapping: &MappingSet, ignore_conflicts: bool) {
        self.mapping = Some(mapping.clone());
        self.ignore_conflicts = ignore_conflicts;
    }

    fn register_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<(), EngineError> {
        for entry in entries {
            self.scan(entry.path())?;
        }
        Ok(())
    }

    fn register_input(&mut self, input: &Path) -> Result<(), EngineError> {
        self.scan(input)?;
        self.inputs.push(input.to_path_buf());
        Ok(())
    }

    fn apply(&mut self, output: &Path) -> Result<(), EngineError> {
        let mapping = self.mapping.as_ref().ok_or(EngineError::MappingNotRegistered)?;

        // Staged next to the output and renamed at the end, so a failed
        // apply never leaves a partial archive at the output path.
        let staging = output.with_extension("apply.tmp");
        let file = File::create(&staging).map_err(|source| EngineError::io(&staging, source))?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default();
        let mut written: HashSet<String> = HashSet::new();

        for input in &self.inputs {
            let source_file =
                File::open(input).map_err(|source| EngineError::io(input, source))?;
            let mut archive = ZipArchive::new(BufReader::new(source_file))
                .map_err(|source| EngineError::zip(input, source))?;

            for index in 0..archive.len() {
                let is_class = {
                    let entry = archive
                        .by_index_raw(index)
                        .map_err(|source| EngineError::zip(input, source))?;
                    entry.is_file()
                        && entry.name().ends_with(".class")
                        && !entry.name().ends_with("module-info.class")
                };

                if is_class {
                    let (entry_name, bytes) = {
                        let mut entry = archive
                            .by_index(index)
                            .map_err(|source| EngineError::zip(input, source))?;
                        let mut bytes = Vec::with_capacity(entry.size() as usize);
                        entry
                            .read_to_end(&mut bytes)
                            .map_err(|source| EngineError::io(input, source))?;
                        (entry.name().to_string(), bytes)
                    };

                    let rewritten =
                        classfile::rewrite_class(&bytes, mapping, &self.hierarchy).map_err(
                            |source| EngineError::Rewrite {
                                entry: entry_name.clone(),
                                source,
                            },
                        )?;
                    let output_name = format!("{}.class", rewritten.name);
                    if !written.insert(output_name.clone()) {
                        if self.ignore_conflicts {
                            tracing::warn!(name = %output_name, "dropping duplicate remapped class");
                            continue;
                        }
                        return Err(EngineError::DuplicateClass {
                            name: rewritten.name,
                        });
                    }
                    writer
                        .start_file(output_name, options)
                        .map_err(|source| EngineError::zip(&staging, source))?;
                    writer
                        .write_all(&rewritten.bytes)
                        .map_err(|source| EngineError::io(&staging, source))?;
                } else {
                    let entry = archive
                        .by_index_raw(index)
                        .map_err(|source| EngineError::zip(input, source))?;
                    if entry.is_file() && !written.insert(entry.name().to_string()) {
                        continue;
                    }
                    writer
                        .raw_copy_file(entry)
                        .map_err(|source| EngineError::zip(&staging, source))?;
                }
            }
        }

        writer
            .finish()
            .map_err(|source| EngineError::zip(&staging, source))?;
        fs::rename(&staging, output).map_err(|source| EngineError::io(output, source))
    }

    fn release(&mut self) {
        self.mapping = None;
        self.hierarchy = TypeHierarchy::default();
        self.inputs.clear();
    }
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            ext.eq_ignore_ascii_case("jar")
                || ext.eq_ignore_ascii_case("zip")
                || ext.eq_ignore_ascii_case("jmod")
        })
        .unwrap_or(false)
}
