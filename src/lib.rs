//! circuit_forge: dataset sample generation and autorouting for PCB circuits.
//!
//! Evaluates parameterized circuit templates in disposable sandboxes,
//! converts each circuit graph into routing, board and preview formats,
//! materializes the results per sample and runs registered autorouters
//! against them.

pub mod autorouter;
pub mod circuit;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod pipeline;
pub mod sample;
pub mod storage;

pub use error::{
    AutorouterError, ConversionError, DatasetError, EvaluationError,
    RoutedResultValidationError, StorageError,
};
