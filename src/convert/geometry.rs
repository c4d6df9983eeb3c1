//! Geometry and connectivity shared by the converters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::circuit::{CircuitElement, CircuitGraph};
use crate::error::ConversionError;

/// Margin (mm) added around derived bounds when the graph has no board.
const DERIVED_BOUNDS_MARGIN: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, center: Point, width: f64, height: f64) {
        self.min_x = self.min_x.min(center.x - width / 2.0);
        self.max_x = self.max_x.max(center.x + width / 2.0);
        self.min_y = self.min_y.min(center.y - height / 2.0);
        self.max_y = self.max_y.max(center.y + height / 2.0);
    }

    fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    fn expand(mut self, margin: f64) -> Self {
        self.min_x -= margin;
        self.max_x += margin;
        self.min_y -= margin;
        self.max_y += margin;
        self
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Copper pad shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadShape {
    Rect { width: f64, height: f64 },
    Circle { diameter: f64 },
}

impl PadShape {
    pub fn extent(&self) -> (f64, f64) {
        match *self {
            PadShape::Rect { width, height } => (width, height),
            PadShape::Circle { diameter } => (diameter, diameter),
        }
    }
}

/// A surface-mount pad or plated hole, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    pub id: String,
    pub center: Point,
    pub shape: PadShape,
    pub layers: Vec<String>,
    pub pcb_port_id: Option<String>,
    pub pcb_component_id: Option<String>,
    pub plated: bool,
}

fn invalid(element: &CircuitElement, field: &str) -> ConversionError {
    ConversionError::InvalidField {
        element: element.label(),
        field: field.to_string(),
    }
}

fn required_f64(element: &CircuitElement, field: &str) -> Result<f64, ConversionError> {
    element
        .get_f64(field)
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(element, field))
}

/// Reads a `{x, y}` object stored under `field`.
pub fn point_field(element: &CircuitElement, field: &str) -> Result<Point, ConversionError> {
    let value = element.get(field).ok_or_else(|| invalid(element, field))?;
    let x = value.get("x").and_then(Value::as_f64);
    let y = value.get("y").and_then(Value::as_f64);
    match (x, y) {
        (Some(x), Some(y)) => Ok(Point { x, y }),
        _ => Err(invalid(element, field)),
    }
}

/// Reads top-level `x` / `y` fields.
pub fn xy(element: &CircuitElement) -> Result<Point, ConversionError> {
    Ok(Point {
        x: required_f64(element, "x")?,
        y: required_f64(element, "y")?,
    })
}

fn layers_of(element: &CircuitElement) -> Vec<String> {
    if let Some(layer) = element.get_str("layer") {
        return vec![layer.to_string()];
    }
    element
        .get("layers")
        .and_then(Value::as_array)
        .map(|layers| {
            layers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|layers| !layers.is_empty())
        .unwrap_or_else(|| vec!["top".to_string()])
}

/// All pads and plated holes in graph order.
pub fn pads(graph: &CircuitGraph) -> Result<Vec<Pad>, ConversionError> {
    let mut pads = Vec::new();
    for element in graph.elements() {
        let plated = match element.element_type.as_str() {
            "pcb_smtpad" => false,
            "pcb_plated_hole" => true,
            _ => continue,
        };

        let shape = if plated {
            let diameter = element
                .get_f64("outer_diameter")
                .or_else(|| element.get_f64("hole_diameter"))
                .ok_or_else(|| invalid(element, "outer_diameter"))?;
            PadShape::Circle { diameter }
        } else if element.get_str("shape") == Some("circle") {
            PadShape::Circle {
                diameter: required_f64(element, "radius")? * 2.0,
            }
        } else {
            PadShape::Rect {
                width: required_f64(element, "width")?,
                height: required_f64(element, "height")?,
            }
        };

        let layers = if plated {
            vec!["top".to_string(), "bottom".to_string()]
        } else {
            layers_of(element)
        };

        pads.push(Pad {
            id: element.label(),
            center: xy(element)?,
            shape,
            layers,
            pcb_port_id: element.get_str("pcb_port_id").map(str::to_string),
            pcb_component_id: element.get_str("pcb_component_id").map(str::to_string),
            plated,
        });
    }
    Ok(pads)
}

/// Board outline from the first `pcb_board`, if any.
pub fn board_bounds(graph: &CircuitGraph) -> Result<Option<Bounds>, ConversionError> {
    let Some(board) = graph.elements_of_type("pcb_board").next() else {
        return Ok(None);
    };
    let center = point_field(board, "center")?;
    let mut bounds = Bounds::empty();
    bounds.include(
        center,
        required_f64(board, "width")?,
        required_f64(board, "height")?,
    );
    Ok(Some(bounds))
}

/// Board bounds, or the padded extent of all pads and ports when no board exists.
pub fn routing_bounds(graph: &CircuitGraph, pads: &[Pad]) -> Result<Bounds, ConversionError> {
    if let Some(bounds) = board_bounds(graph)? {
        return Ok(bounds);
    }

    let mut bounds = Bounds::empty();
    for pad in pads {
        let (w, h) = pad.shape.extent();
        bounds.include(pad.center, w, h);
    }
    for port in graph.elements_of_type("pcb_port") {
        bounds.include(xy(port)?, 0.0, 0.0);
    }

    if bounds.is_empty() {
        return Err(ConversionError::MissingGeometry(
            "circuit has no board, pads or ports to bound the routing area".to_string(),
        ));
    }
    Ok(bounds.expand(DERIVED_BOUNDS_MARGIN))
}

/// A set of source ports that must be electrically connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetGroup {
    /// Id of the first source trace that contributed to the group.
    pub name: String,
    /// Connected source port ids, sorted.
    pub source_port_ids: Vec<String>,
}

fn find(parent: &mut BTreeMap<String, String>, key: &str) -> String {
    let mut root = key.to_string();
    while let Some(next) = parent.get(&root) {
        if *next == root {
            break;
        }
        root = next.clone();
    }
    // Path compression.
    let mut node = key.to_string();
    while node != root {
        let next = parent.get(&node).cloned().unwrap_or_else(|| root.clone());
        parent.insert(node, root.clone());
        node = next;
    }
    root
}

fn union(parent: &mut BTreeMap<String, String>, a: &str, b: &str) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Lexicographically smaller root wins so grouping is order-independent.
        let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent.insert(drop, keep);
    }
}

/// Groups source ports joined by `source_trace` elements, directly or through nets.
///
/// Groups with fewer than two ports need no routing and are omitted. The
/// result is sorted by group name.
pub fn net_groups(graph: &CircuitGraph) -> Vec<NetGroup> {
    let mut parent: BTreeMap<String, String> = BTreeMap::new();
    let mut first_trace: BTreeMap<String, String> = BTreeMap::new();

    for (idx, trace) in graph.elements_of_type("source_trace").enumerate() {
        let trace_id = trace
            .get_str("source_trace_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("source_trace_{}", idx));

        let ids = |field: &str| -> Vec<String> {
            trace
                .get(field)
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };
        let members: Vec<String> = ids("connected_source_port_ids")
            .into_iter()
            .map(|p| format!("port:{}", p))
            .chain(
                ids("connected_source_net_ids")
                    .into_iter()
                    .map(|n| format!("net:{}", n)),
            )
            .collect();

        for member in &members {
            parent.entry(member.clone()).or_insert_with(|| member.clone());
            first_trace
                .entry(member.clone())
                .or_insert_with(|| trace_id.clone());
        }
        for pair in members.windows(2) {
            union(&mut parent, &pair[0], &pair[1]);
        }
    }

    let keys: Vec<String> = parent.keys().cloned().collect();
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        let root = find(&mut parent, &key);
        grouped.entry(root).or_default().push(key);
    }

    let mut groups: Vec<NetGroup> = grouped
        .into_values()
        .filter_map(|members| {
            let name = members
                .iter()
                .filter_map(|m| first_trace.get(m))
                .min()
                .cloned()?;
            let ports: Vec<String> = members
                .iter()
                .filter_map(|m| m.strip_prefix("port:"))
                .map(str::to_string)
                .collect();
            (ports.len() >= 2).then_some(NetGroup {
                name,
                source_port_ids: ports,
            })
        })
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

/// Looks up the `pcb_port` placed for a source port.
pub fn pcb_port_for<'a>(graph: &'a CircuitGraph, source_port_id: &str) -> Option<&'a CircuitElement> {
    graph
        .elements_of_type("pcb_port")
        .find(|p| p.get_str("source_port_id") == Some(source_port_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitElement;
    use crate::convert::fixtures::two_pad_circuit;
    use serde_json::json;

    #[test]
    fn test_pads_and_board_bounds() {
        let graph = two_pad_circuit();
        let pads = pads(&graph).unwrap();
        assert_eq!(pads.len(), 2);
        assert_eq!(pads[0].pcb_port_id.as_deref(), Some("pp_1"));

        let bounds = board_bounds(&graph).unwrap().unwrap();
        assert_eq!(bounds.min_x, -10.0);
        assert_eq!(bounds.max_y, 5.0);
    }

    #[test]
    fn test_derived_bounds_without_board() {
        let graph = CircuitGraph::new(vec![CircuitElement::new("pcb_smtpad")
            .with_field("x", 2.0)
            .with_field("y", 3.0)
            .with_field("width", 2.0)
            .with_field("height", 2.0)]);
        let pads = pads(&graph).unwrap();
        let bounds = routing_bounds(&graph, &pads).unwrap();
        assert_eq!(bounds.min_x, 0.0);
        assert_eq!(bounds.max_x, 4.0);
    }

    #[test]
    fn test_no_geometry_is_an_error() {
        let graph = CircuitGraph::new(vec![CircuitElement::new("source_component")]);
        assert!(matches!(
            routing_bounds(&graph, &[]),
            Err(ConversionError::MissingGeometry(_))
        ));
    }

    #[test]
    fn test_net_groups_join_through_nets() {
        let graph = CircuitGraph::new(vec![
            CircuitElement::new("source_trace")
                .with_field("source_trace_id", "st_b")
                .with_field("connected_source_port_ids", json!(["p1"]))
                .with_field("connected_source_net_ids", json!(["gnd"])),
            CircuitElement::new("source_trace")
                .with_field("source_trace_id", "st_a")
                .with_field("connected_source_port_ids", json!(["p2"]))
                .with_field("connected_source_net_ids", json!(["gnd"])),
            CircuitElement::new("source_trace")
                .with_field("source_trace_id", "st_c")
                .with_field("connected_source_port_ids", json!(["p3"])),
        ]);

        let groups = net_groups(&graph);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "st_a");
        assert_eq!(groups[0].source_port_ids, vec!["p1", "p2"]);
    }
}
