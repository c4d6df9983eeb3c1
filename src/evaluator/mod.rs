//! Isolated template evaluation.
//!
//! An [`Evaluator`] turns a template reference and a sample index into a
//! [`CircuitGraph`]. The provided [`SandboxEvaluator`] provisions a fresh,
//! single-use [`EvalSandbox`] per call, so evaluations share no state and
//! may run concurrently.
//!
//! # Example
//!
//! ```rust,ignore
//! use circuit_forge::evaluator::{Evaluator, SandboxConfig, SandboxEvaluator, TemplateCatalog};
//!
//! let catalog = TemplateCatalog::builtin();
//! let template = catalog.resolve("keyboard")?;
//! let evaluator = SandboxEvaluator::new(SandboxConfig::default());
//!
//! let graph = evaluator.evaluate(&template, 1).await?;
//! println!("sample 1 has {} elements", graph.len());
//! ```

pub mod sandbox;
pub mod template;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::circuit::CircuitGraph;
use crate::error::EvaluationError;

pub use sandbox::{EvalSandbox, SandboxConfig, SandboxOutput, SandboxRuntime};
pub use template::{render_entry_script, TemplateCatalog, TemplateRef};

/// Evaluates a circuit template at a given sample index.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Produces the circuit graph for `sample_number`.
    ///
    /// Each call must be independent: implementations may not reuse an
    /// execution context across samples.
    async fn evaluate(
        &self,
        template: &TemplateRef,
        sample_number: u32,
    ) -> Result<CircuitGraph, EvaluationError>;
}

/// Evaluator backed by a disposable [`EvalSandbox`] per invocation.
pub struct SandboxEvaluator {
    config: SandboxConfig,
}

impl SandboxEvaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

#[async_trait]
impl Evaluator for SandboxEvaluator {
    async fn evaluate(
        &self,
        template: &TemplateRef,
        sample_number: u32,
    ) -> Result<CircuitGraph, EvaluationError> {
        let script = render_entry_script(template, sample_number)?;

        let mut sandbox = EvalSandbox::provision(self.config.clone())?;
        info!(
            sandbox = %sandbox.id(),
            template = %template.name,
            sample_number,
            "Evaluating template"
        );

        let result = sandbox.execute(&script, sample_number).await;
        sandbox.teardown().await;

        let output = result?;
        if output.exit_code != 0 {
            return Err(EvaluationError::Execution {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let graph = CircuitGraph::from_json_str(output.stdout.trim())
            .map_err(|e| EvaluationError::InvalidOutput(e.to_string()))?;
        debug!(sample_number, elements = graph.len(), "Template evaluated");
        Ok(graph)
    }
}
