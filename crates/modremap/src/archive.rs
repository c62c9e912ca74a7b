use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error while accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while accessing {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

impl ArchiveError {
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

pub fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::io(path, source))?;
    ZipArchive::new(BufReader::new(file)).map_err(|source| ArchiveError::zip(path, source))
}

/// File entry names in archive order.
pub fn entry_names(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut archive = open(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|source| ArchiveError::zip(path, source))?;
        if entry.is_file() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Read a single entry, `None` when absent.
pub fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(ArchiveError::zip(path, source)),
    };
    let mut buffer = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buffer)
        .map_err(|source| ArchiveError::io(path, source))?;
    Ok(Some(buffer))
}

/// Rewrite the archive in place, applying `changes`: `Some(bytes)` replaces
/// or appends the named entry, `None` removes it. Every untouched entry is
/// carried over byte-for-byte in its original position.
pub fn patch_entries(
    path: &Path,
    changes: BTreeMap<String, Option<Vec<u8>>>,
) -> Result<(), ArchiveError> {
    let mut archive = open(path)?;
    let staging = path.with_extension("patch.tmp");

    {
        let file = File::create(&staging).map_err(|source| ArchiveError::io(&staging, source))?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default();
        let mut pending = changes;

        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|source| ArchiveError::zip(path, source))?;
            let name = entry.name().to_string();
            match pending.remove(&name) {
                Some(Some(bytes)) => {
                    writer
                        .start_file(name, options)
                        .map_err(|source| ArchiveError::zip(&staging, source))?;
                    writer
                        .write_all(&bytes)
                        .map_err(|source| ArchiveError::io(&staging, source))?;
                }
                Some(None) => {}
                None => {
                    writer
                        .raw_copy_file(entry)
                        .map_err(|source| ArchiveError::zip(&staging, source))?;
                }
            }
        }

        // Changes naming entries the archive did not contain become appends.
        for (name, change) in pending {
            if let Some(bytes) = change {
                writer
                    .start_file(name, options)
                    .map_err(|source| ArchiveError::zip(&staging, source))?;
                writer
                    .write_all(&bytes)
                    .map_err(|source| ArchiveError::io(&staging, source))?;
            }
        }

        writer
            .finish()
            .map_err(|source| ArchiveError::zip(&staging, source))?;
    }

    fs::rename(&staging, path).map_err(|source| ArchiveError::io(path, source))
}
