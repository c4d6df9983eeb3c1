//! Structural validation of routed results.

use serde_json::Value;

use crate::circuit::CircuitGraph;
use crate::error::RoutedResultValidationError;

/// Checks that a routed response is an element array with at least one
/// non-trace element and at least one `pcb_trace`.
pub fn validate_routed_result(value: Value) -> Result<CircuitGraph, RoutedResultValidationError> {
    let graph = CircuitGraph::from_value(value)
        .map_err(|e| RoutedResultValidationError::Unparseable(e.to_string()))?;
    validate_routed_graph(&graph)?;
    Ok(graph)
}

/// Same as [`validate_routed_result`] for an already-parsed graph.
pub fn validate_routed_graph(graph: &CircuitGraph) -> Result<(), RoutedResultValidationError> {
    if graph.non_trace_count() == 0 {
        return Err(RoutedResultValidationError::NoNonTraceElements);
    }
    if graph.trace_count() == 0 {
        return Err(RoutedResultValidationError::NoTraceElements);
    }
    Ok(())
}
