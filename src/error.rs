//! Error types for circuit-forge operations.
//!
//! Defines the error taxonomy for every stage of the pipeline:
//! - Sandboxed template evaluation
//! - Format conversion (routing graph, board description, preview)
//! - Artifact materialization
//! - Autorouter runs and routed-result validation
//! - Dataset runs (range validation and the all-or-nothing failure signal)

use thiserror::Error;

/// Errors that can occur while evaluating a circuit template in a sandbox.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Invalid circuit type: \"{0}\"")]
    UnknownTemplate(String),

    #[error("Failed to provision sandbox: {0}")]
    SandboxProvision(String),

    #[error("Template execution failed (exit code {code}): {stderr}")]
    Execution { code: i32, stderr: String },

    #[error("Template evaluation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Sandbox produced invalid circuit output: {0}")]
    InvalidOutput(String),

    #[error("Failed to render sandbox entry script: {0}")]
    Render(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while converting a circuit graph.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Missing geometry: {0}")]
    MissingGeometry(String),

    #[error("Element '{element}' has an invalid '{field}' field")]
    InvalidField { element: String, field: String },

    #[error("Cannot render preview: {0}")]
    UnsupportedPreview(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConversionError {
    /// Whether this error only blocks the preview image.
    ///
    /// Preview failures degrade the sample; every other conversion failure
    /// blocks a required artifact.
    pub fn is_preview_only(&self) -> bool {
        matches!(self, ConversionError::UnsupportedPreview(_))
    }
}

/// Errors that can occur while materializing or reading artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unknown file type: {0}")]
    UnknownMimetype(String),

    #[error("Invalid artifact path '{0}': must be relative and must not contain '..'")]
    InvalidPath(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact store has no dataset scope")]
    Unscoped,

    #[error("Store is scoped to dataset '{expected}', got a sample of '{found}'")]
    DatasetMismatch { expected: String, found: String },

    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural validation failures for a routed circuit graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutedResultValidationError {
    #[error("Routed result is not a circuit element array: {0}")]
    Unparseable(String),

    #[error("Routed result contains no non-trace elements")]
    NoNonTraceElements,

    #[error("Routed result contains no pcb_trace elements")]
    NoTraceElements,
}

/// Errors that can occur during an autorouter run.
#[derive(Debug, Error)]
pub enum AutorouterError {
    #[error("Autorouter '{0}' is not registered")]
    UnknownAutorouter(String),

    #[error("Autorouter service error: {0}")]
    Service(String),

    #[error("Autorouter service returned {status}: {message}")]
    ServiceStatus { status: u16, message: String },

    #[error("Autorouter request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Routed result validation failed: {0}")]
    Validation(#[from] RoutedResultValidationError),

    #[error("Invalid run transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid input circuit '{path}': {reason}")]
    InvalidInput { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AutorouterError {
    /// Whether the failure came from the external service (network, status, timeout).
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            AutorouterError::Service(_)
                | AutorouterError::ServiceStatus { .. }
                | AutorouterError::Timeout { .. }
        )
    }
}

/// Errors that can occur during a dataset run.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid sample range: {0}")]
    InvalidRange(String),

    #[error("Evaluation of sample {sample_number} failed: {source}")]
    Evaluation {
        sample_number: u32,
        #[source]
        source: EvaluationError,
    },

    #[error("Conversion of sample {sample_number} failed: {source}")]
    Conversion {
        sample_number: u32,
        #[source]
        source: ConversionError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dataset '{dataset_id}' failed at sample {sample_number} after {samples_completed} completed samples: {source}")]
    Failed {
        dataset_id: String,
        sample_number: u32,
        samples_completed: usize,
        #[source]
        source: Box<DatasetError>,
    },
}

impl DatasetError {
    /// Sample number the error is attributed to, if any.
    pub fn sample_number(&self) -> Option<u32> {
        match self {
            DatasetError::Evaluation { sample_number, .. }
            | DatasetError::Conversion { sample_number, .. }
            | DatasetError::Failed { sample_number, .. } => Some(*sample_number),
            DatasetError::InvalidRange(_) | DatasetError::Storage(_) => None,
        }
    }
}
