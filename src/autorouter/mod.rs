//! Autorouter orchestration.
//!
//! Each `(sample_id, autorouter_id)` pair runs through a small state machine:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!                   \-> Failed
//! ```
//!
//! A run succeeds only when the service answers with a circuit graph holding
//! at least one non-trace element and at least one `pcb_trace`. The routed
//! graph is written to `outputs/<autorouter_id>_routed_circuit.json` within
//! the sample. Failures stay scoped to their own pair.

pub mod client;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod validation;

pub use client::{AutorouterService, HttpAutorouterClient, DEFAULT_SERVER_URL};
pub use orchestrator::{AutorouterOrchestrator, RunReport};
pub use registry::{AutorouterDescriptor, AutorouterRegistry, Capability};
pub use state::{AutorouterRun, RunState, RunTransitions};
pub use validation::{validate_routed_graph, validate_routed_result};
