use serde::Serialize;
use serde_json::Value;

use crate::circuit::CircuitGraph;

/// Raw structured circuit graph.
pub const UNROUTED_CIRCUIT_FILE: &str = "unrouted_circuit.json";
/// Board description (Specctra DSN).
pub const UNROUTED_BOARD_FILE: &str = "unrouted.dsn";
/// PCB preview.
pub const UNROUTED_PREVIEW_FILE: &str = "unrouted_pcb.svg";
/// Routing-input graph.
pub const UNROUTED_SIMPLE_ROUTE_FILE: &str = "unrouted_simple_route.json";

/// Everything produced for one sample number.
#[derive(Debug, Clone, Serialize)]
pub struct SampleBundle {
    pub sample_number: u32,
    pub circuit_graph: CircuitGraph,
    pub routing_graph: Value,
    pub board_description: String,
    /// `None` when the preview could not be rendered.
    pub preview_svg: Option<String>,
}

impl SampleBundle {
    /// Whether the preview was dropped.
    pub fn is_degraded(&self) -> bool {
        self.preview_svg.is_none()
    }

    /// The unrouted artifacts as `(file_path, text_content)` pairs.
    pub fn artifacts(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut files = vec![
            (UNROUTED_CIRCUIT_FILE, self.circuit_graph.to_json_string()?),
            (UNROUTED_BOARD_FILE, self.board_description.clone()),
        ];
        if let Some(svg) = &self.preview_svg {
            files.push((UNROUTED_PREVIEW_FILE, svg.clone()));
        }
        files.push((
            UNROUTED_SIMPLE_ROUTE_FILE,
            serde_json::to_string(&self.routing_graph)?,
        ));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitElement;
    use serde_json::json;

    fn bundle(preview: Option<&str>) -> SampleBundle {
        SampleBundle {
            sample_number: 1,
            circuit_graph: CircuitGraph::new(vec![CircuitElement::new("pcb_board")]),
            routing_graph: json!({"connections": []}),
            board_description: "(pcb x)\n".to_string(),
            preview_svg: preview.map(str::to_string),
        }
    }

    #[test]
    fn test_full_bundle_has_four_artifacts() {
        let files = bundle(Some("<svg/>")).artifacts().unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "unrouted_circuit.json",
                "unrouted.dsn",
                "unrouted_pcb.svg",
                "unrouted_simple_route.json"
            ]
        );
        assert_eq!(files[0].1, r#"[{"type":"pcb_board"}]"#);
    }

    #[test]
    fn test_degraded_bundle_skips_preview() {
        let b = bundle(None);
        assert!(b.is_degraded());
        assert_eq!(b.artifacts().unwrap().len(), 3);
    }
}
