//! Conversion of circuit graphs into downstream representations.
//!
//! Three independent, pure conversions are provided:
//!
//! - [`FormatConverter::to_routing_graph`]: the simplified "simple route" graph
//!   consumed by autorouters
//! - [`FormatConverter::to_board_description`]: a Specctra DSN board file
//! - [`FormatConverter::to_preview_image`]: a PCB preview as SVG
//!
//! None of them touch the network or the filesystem, and none mutate their
//! input. A failed preview is degraded output, not a failed sample.

pub mod dsn;
pub mod geometry;
pub mod simple_route;
pub mod svg;

use serde_json::Value;

use crate::circuit::CircuitGraph;
use crate::error::ConversionError;

pub use simple_route::SimpleRouteJson;

/// Converts circuit graphs into the representations stored per sample.
pub trait FormatConverter: Send + Sync {
    /// Extracts the routing-input graph.
    fn to_routing_graph(&self, graph: &CircuitGraph) -> Result<Value, ConversionError>;

    /// Serializes board geometry to a deterministic textual interchange format.
    fn to_board_description(&self, graph: &CircuitGraph) -> Result<String, ConversionError>;

    /// Renders a vector preview of the board.
    fn to_preview_image(&self, graph: &CircuitGraph) -> Result<String, ConversionError>;
}

/// Built-in converter.
#[derive(Debug, Clone)]
pub struct CircuitConverter {
    /// Board name written into the DSN header.
    pub board_name: String,
}

impl CircuitConverter {
    pub fn new(board_name: impl Into<String>) -> Self {
        Self {
            board_name: board_name.into(),
        }
    }
}

impl Default for CircuitConverter {
    fn default() -> Self {
        Self::new("circuit")
    }
}

impl FormatConverter for CircuitConverter {
    fn to_routing_graph(&self, graph: &CircuitGraph) -> Result<Value, ConversionError> {
        let srj = simple_route::build(graph)?;
        Ok(serde_json::to_value(srj)?)
    }

    fn to_board_description(&self, graph: &CircuitGraph) -> Result<String, ConversionError> {
        dsn::write_dsn(graph, &self.board_name)
    }

    fn to_preview_image(&self, graph: &CircuitGraph) -> Result<String, ConversionError> {
        svg::render_pcb_svg(graph)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_produces_all_representations() {
        let graph = fixtures::two_pad_circuit();
        let before = graph.clone();
        let converter = CircuitConverter::default();

        let routing = converter.to_routing_graph(&graph).unwrap();
        assert_eq!(routing["connections"].as_array().map(Vec::len), Some(1));

        let dsn = converter.to_board_description(&graph).unwrap();
        assert!(dsn.starts_with("(pcb circuit"));

        let svg = converter.to_preview_image(&graph).unwrap();
        assert!(svg.starts_with("<svg"));

        assert_eq!(graph, before);
    }
}
