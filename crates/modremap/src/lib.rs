// modremap - remaps compiled module archives between symbol namespaces
pub mod archive;
pub mod classpath;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod mapping;
pub mod pipeline;
pub mod postprocess;

pub use classpath::{resolve_classpath, ClasspathEntry};
pub use config::{AccessRuleMode, RemapConfig, RemapRequest};
pub use engine::{ClassFileRemapper, EngineError, RemapEngine};
pub use mapping::{MappingError, MappingSet, MemberKey};
pub use pipeline::{RemapPipeline, RemapSummary};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal errors that abort a remap invocation.
///
/// Post-processing problems are deliberately absent: once the remapped
/// output exists they are reported as [`RemapSummary`] warnings instead.
#[derive(Error, Debug)]
pub enum RemapError {
    #[error("input artifact not found: {path}")]
    MissingInput { path: PathBuf },
    #[error("failed to assemble mappings: {0}")]
    MappingAssembly(#[from] MappingError),
    #[error("failed to remap {input} to {output}: {source}")]
    RemapExecution {
        input: PathBuf,
        output: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("failed to remap {input} to {output}: output file missing")]
    OutputIntegrity { input: PathBuf, output: PathBuf },
}

/// Remap `input` into `output` using the flag surface of the original task.
///
/// `skip_access_rules` wins over `convert_access_rules`; when neither is set
/// the access rules are obfuscated in place.
pub fn remap(
    input: &Path,
    output: &Path,
    nest_dependencies: bool,
    skip_access_rules: bool,
    convert_access_rules: bool,
    config: &RemapConfig,
) -> Result<RemapSummary, RemapError> {
    let access_rules = if skip_access_rules {
        None
    } else if convert_access_rules {
        Some(AccessRuleMode::Convert)
    } else {
        Some(AccessRuleMode::Obfuscate)
    };

    let request = RemapRequest {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        nest_dependencies,
        access_rules,
    };

    RemapPipeline::new(config).run(&request)
}

#[cfg(test)]
mod tests;
