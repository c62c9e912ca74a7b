use std::path::PathBuf;

pub const DEFAULT_SOURCE_NAMESPACE: &str = "named";
pub const DEFAULT_TARGET_NAMESPACE: &str = "intermediary";

/// Everything a remap invocation needs, passed explicitly instead of being
/// looked up from shared build-wide state.
#[derive(Debug, Clone)]
pub struct RemapConfig {
    /// Namespace the input artifact's symbols are expressed in.
    pub source_namespace: String,
    /// Namespace the output artifact's symbols are expressed in.
    pub target_namespace: String,
    /// Tiny v1 file holding the primary symbol mapping.
    pub primary_mappings: PathBuf,
    /// Optional secondary mapping export (e.g. produced by an annotation
    /// processor); merged only when the file exists.
    pub secondary_mappings: Option<PathBuf>,
    /// Resolve overlapping symbol definitions by precedence instead of
    /// failing the assembly.
    pub ignore_mapping_conflicts: bool,
    /// Build-time dependency set consulted for cross-archive symbol
    /// resolution. Filtered by [`crate::resolve_classpath`].
    pub classpath: Vec<PathBuf>,
    /// Canonical reference-map resource name for this artifact. `None` means
    /// the artifact was built without a reference map and relocation is
    /// skipped entirely.
    pub refmap_name: Option<String>,
    /// Artifact-relative paths of bundled dependency archives to record in
    /// the output descriptor.
    pub nested_jars: Vec<PathBuf>,
}

impl RemapConfig {
    pub fn new(primary_mappings: impl Into<PathBuf>) -> Self {
        Self {
            source_namespace: DEFAULT_SOURCE_NAMESPACE.to_string(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            primary_mappings: primary_mappings.into(),
            secondary_mappings: None,
            ignore_mapping_conflicts: false,
            classpath: Vec::new(),
            refmap_name: None,
            nested_jars: Vec::new(),
        }
    }

    pub fn with_namespaces(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_namespace = source.into();
        self.target_namespace = target.into();
        self
    }
}

/// How access rules embedded in the artifact are post-processed.
///
/// The two modes are mutually exclusive by construction; skipping the step
/// altogether is `Option<AccessRuleMode>::None` on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRuleMode {
    /// Translate rule symbols from the source namespace to the target
    /// namespace, keeping the legacy format.
    Obfuscate,
    /// Rewrite the legacy rules into the structured access-widener format
    /// and note the conversion in the artifact descriptor.
    Convert,
}

/// A single unit of work. Carries no state across invocations.
#[derive(Debug, Clone)]
pub struct RemapRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub nest_dependencies: bool,
    pub access_rules: Option<AccessRuleMode>,
}
