//! Archive post-processing stages. Each runs against the freshly remapped
//! output and reports independently; none of them may invalidate the output
//! already produced by the remap stage.

pub mod access_rules;
pub mod nesting;
pub mod refmap;

pub use access_rules::process_access_rules;
pub use nesting::annotate_nested_jars;
pub use refmap::relocate_reference_maps;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::descriptor::DescriptorError;

#[derive(Error, Debug)]
pub enum PostProcessError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("malformed access rule at {entry}:{line}: '{text}'")]
    MalformedRule {
        entry: String,
        line: usize,
        text: String,
    },
}
