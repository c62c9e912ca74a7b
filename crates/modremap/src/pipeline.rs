use tracing::{debug, info};

use crate::classpath::resolve_classpath;
use crate::config::{RemapConfig, RemapRequest};
use crate::engine::{ClassFileRemapper, EngineError, EngineScope, RemapEngine};
use crate::mapping::assemble_mappings;
use crate::postprocess::{annotate_nested_jars, process_access_rules, relocate_reference_maps};
use crate::RemapError;

/// Outcome of a successful invocation: which best-effort stages did work,
/// plus the warnings they raised along the way.
#[derive(Debug, Default)]
pub struct RemapSummary {
    pub access_rules_applied: bool,
    pub reference_maps_relocated: bool,
    pub nested_jars_added: bool,
    pub warnings: Vec<String>,
}

impl RemapSummary {
    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

/// Sequences one remap invocation: validate, resolve, assemble, remap,
/// verify, then the fixed post-processing order. Only the stages up to and
/// including output verification are fatal.
pub struct RemapPipeline<'a> {
    config: &'a RemapConfig,
}

impl<'a> RemapPipeline<'a> {
    pub fn new(config: &'a RemapConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, request: &RemapRequest) -> Result<RemapSummary, RemapError> {
        let mut engine = ClassFileRemapper::new();
        self.run_with_engine(request, &mut engine)
    }

    pub fn run_with_engine(
        &self,
        request: &RemapRequest,
        engine: &mut dyn RemapEngine,
    ) -> Result<RemapSummary, RemapError> {
        if !request.input.exists() {
            return Err(RemapError::MissingInput {
                path: request.input.clone(),
            });
        }

        let classpath = resolve_classpath(&self.config.classpath, &request.input);
        if !classpath.is_empty() {
            let mut listing = String::from("remap classpath:");
            for entry in &classpath {
                listing.push_str("\n - ");
                listing.push_str(&entry.path().display().to_string());
            }
            debug!("{listing}");
        }

        let mapping = assemble_mappings(self.config)?;
        info!(
            input = %request.input.display(),
            classes = mapping.class_count(),
            members = mapping.member_count(),
            "remapping module archive"
        );

        let execution_error = |source: EngineError| RemapError::RemapExecution {
            input: request.input.clone(),
            output: request.output.clone(),
            source,
        };

        {
            // The scope guarantees release whichever register/apply step fails.
            let mut scope = EngineScope::new(engine);
            let engine = scope.engine();
            engine.register_mapping(&mapping, self.config.ignore_mapping_conflicts);
            engine
                .register_classpath(&classpath)
                .map_err(execution_error)?;
            engine
                .register_input(&request.input)
                .map_err(execution_error)?;
            engine.apply(&request.output).map_err(execution_error)?;
        }

        if !request.output.exists() {
            return Err(RemapError::OutputIntegrity {
                input: request.input.clone(),
                output: request.output.clone(),
            });
        }

        let mut summary = RemapSummary::default();

        if let Some(mode) = request.access_rules {
            match process_access_rules(&request.output, mode, &mapping) {
                Ok(true) => {
                    info!("remapped access rules");
                    summary.access_rules_applied = true;
                }
                Ok(false) => debug!("no access rule resource present"),
                Err(error) => summary.warn(format!("access rule processing failed: {error}")),
            }
        } else {
            debug!("access rule processing skipped");
        }

        if let Some(refmap_name) = &self.config.refmap_name {
            match relocate_reference_maps(&request.output, refmap_name) {
                Ok(true) => {
                    debug!("relocated mixin reference maps");
                    summary.reference_maps_relocated = true;
                }
                Ok(false) => debug!("no mixin reference maps to relocate"),
                Err(error) => summary.warn(format!("reference map relocation failed: {error}")),
            }
        }

        if request.nest_dependencies {
            match annotate_nested_jars(&request.output, &self.config.nested_jars) {
                Ok(true) => {
                    debug!("recorded nested jar paths in descriptor");
                    summary.nested_jars_added = true;
                }
                Ok(false) => debug!("no nested jars to record"),
                Err(error) => summary.warn(format!("dependency nesting failed: {error}")),
            }
        } else {
            debug!("dependency nesting not requested");
        }

        Ok(summary)
    }
}
