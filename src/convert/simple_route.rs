//! Simple-route graph: the autorouter input representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::geometry::{self, Bounds, Point};
use crate::circuit::CircuitGraph;
use crate::error::ConversionError;

/// Trace width (mm) used when the graph specifies none.
pub const DEFAULT_MIN_TRACE_WIDTH: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleRouteJson {
    pub layer_count: u32,
    pub min_trace_width: f64,
    pub obstacles: Vec<Obstacle>,
    pub connections: Vec<Connection>,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    #[serde(rename = "type")]
    pub obstacle_type: String,
    pub layers: Vec<String>,
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub connected_to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub name: String,
    pub points_to_connect: Vec<ConnectionPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPoint {
    pub x: f64,
    pub y: f64,
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcb_port_id: Option<String>,
}

/// Builds the simple-route graph for a circuit.
pub fn build(graph: &CircuitGraph) -> Result<SimpleRouteJson, ConversionError> {
    let pads = geometry::pads(graph)?;
    let bounds = geometry::routing_bounds(graph, &pads)?;

    let obstacles = pads
        .iter()
        .map(|pad| {
            let (width, height) = pad.shape.extent();
            let mut connected_to = vec![pad.id.clone()];
            connected_to.extend(pad.pcb_port_id.clone());
            Obstacle {
                obstacle_type: "rect".to_string(),
                layers: pad.layers.clone(),
                center: pad.center,
                width,
                height,
                connected_to,
            }
        })
        .collect();

    let mut connections = Vec::new();
    for group in geometry::net_groups(graph) {
        let mut points = Vec::with_capacity(group.source_port_ids.len());
        for source_port_id in &group.source_port_ids {
            let port = geometry::pcb_port_for(graph, source_port_id).ok_or_else(|| {
                ConversionError::MissingGeometry(format!(
                    "source port '{}' in '{}' has no pcb_port",
                    source_port_id, group.name
                ))
            })?;
            let at = geometry::xy(port)?;
            let layer = port
                .get("layers")
                .and_then(Value::as_array)
                .and_then(|l| l.first())
                .and_then(Value::as_str)
                .unwrap_or("top")
                .to_string();
            points.push(ConnectionPoint {
                x: at.x,
                y: at.y,
                layer,
                pcb_port_id: port.get_str("pcb_port_id").map(str::to_string),
            });
        }
        connections.push(Connection {
            name: group.name,
            points_to_connect: points,
        });
    }

    let board = graph.elements_of_type("pcb_board").next();
    let layer_count = board
        .and_then(|b| b.get("num_layers"))
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(2);
    let min_trace_width = graph
        .elements_of_type("pcb_trace_hint")
        .chain(board)
        .find_map(|e| e.get_f64("min_trace_width"))
        .unwrap_or(DEFAULT_MIN_TRACE_WIDTH);

    Ok(SimpleRouteJson {
        layer_count,
        min_trace_width,
        obstacles,
        connections,
        bounds,
    })
}
