//! The compilation pipeline
//!
//! Orchestrates namer, typer, and transformer over a surface tree, timing
//! each phase and accumulating diagnostics. The pipeline stops at the
//! first phase whose checkpoint reports errors; internal errors panic out
//! of it instead.

use crate::config::{BackendKind, CompilerConfig};
use crate::context::CompilerContext;
use crate::messages::Message;
use crate::{namer, typer};
use mica_core::{transform, ModuleDecl, TransformError};
use mica_syntax::ModuleTree;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("compilation stopped after {phase}: {errors} error(s)")]
    CheckFailed { phase: &'static str, errors: usize },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-phase wall-clock timings
#[derive(Debug, Default, Clone)]
pub struct Timings {
    pub name: Duration,
    pub check: Duration,
    pub lower: Duration,
}

#[derive(Debug)]
pub struct CompileOutcome {
    pub core: ModuleDecl,
    pub timings: Timings,
}

pub struct Pipeline {
    pub config: CompilerConfig,
}

impl Pipeline {
    pub fn new(config: CompilerConfig) -> Self {
        Pipeline { config }
    }

    /// Run the whole frontend over one module tree
    pub fn compile(
        &self,
        ctx: &mut CompilerContext,
        tree: &ModuleTree,
    ) -> Result<CompileOutcome, PipelineError> {
        let mut timings = Timings::default();

        let start = Instant::now();
        namer::name_module(ctx, tree);
        timings.name = start.elapsed();
        self.checkpoint(ctx, "naming")?;

        let start = Instant::now();
        let committed = typer::type_module(ctx, tree);
        timings.check = start.elapsed();
        if !committed {
            self.checkpoint(ctx, "typing")?;
        }

        let start = Instant::now();
        let lowered = transform(tree, &ctx.db, &mut ctx.symbols, &ctx.builtins).map_err(|e| {
            ctx.messages.report(Message::error(e.to_string(), transform_span(&e)));
            e
        })?;
        timings.lower = start.elapsed();
        for warning in lowered.warnings {
            ctx.messages.warning(warning.message, Some(warning.span));
        }

        info!(
            module = %tree.name,
            declarations = lowered.module.declarations.len(),
            definitions = lowered.module.definitions.len(),
            "lowered module"
        );
        Ok(CompileOutcome { core: lowered.module, timings })
    }

    fn checkpoint(&self, ctx: &CompilerContext, phase: &'static str) -> Result<(), PipelineError> {
        if ctx.messages.has_errors() {
            let errors = ctx
                .messages
                .sorted_deduped()
                .iter()
                .filter(|m| m.severity == crate::messages::Severity::Error)
                .count();
            debug!(phase, errors, "stopping at checkpoint");
            Err(PipelineError::CheckFailed { phase, errors })
        } else {
            Ok(())
        }
    }

    /// Serialize the core artifact for the configured backend and write it
    /// into the output directory, returning its path
    pub fn emit(&self, core: &ModuleDecl) -> Result<PathBuf, PipelineError> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let stem = if core.name.is_empty() { "module".to_string() } else { core.name.qualified() };
        let extension = match self.config.backend {
            BackendKind::Core | BackendKind::Jit => "mcore.json",
            BackendKind::Js => "js",
            BackendKind::Chez => "ss",
            BackendKind::Llvm => "ll",
            BackendKind::Ml => "sml",
        };
        let path = self.config.output_dir.join(format!("{}.{}", stem, extension));
        // The portable artifact is serialized core; target-language text is
        // produced by the external backends from exactly this payload.
        let payload = serde_json::to_string_pretty(core)?;
        std::fs::write(&path, payload)?;
        Ok(path)
    }
}

fn transform_span(error: &TransformError) -> Option<mica_syntax::Span> {
    match error {
        TransformError::EffectfulToplevel { span, .. }
        | TransformError::MutableToplevel { span }
        | TransformError::ConstructorBlockArguments { span }
        | TransformError::PureExternBlockArguments { span, .. }
        | TransformError::BlockRequired { span }
        | TransformError::LocalDeclaration { span } => Some(*span),
    }
}
