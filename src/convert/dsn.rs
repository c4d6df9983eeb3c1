//! Specctra DSN board description writer.
//!
//! Output is byte-for-byte deterministic for a given graph: coordinates are
//! written as whole micrometres, and components, padstacks and nets are
//! emitted in sorted order.

use std::collections::{BTreeMap, BTreeSet};

use super::geometry::{self, Pad, PadShape, Point};
use super::simple_route::DEFAULT_MIN_TRACE_WIDTH;
use crate::circuit::CircuitGraph;
use crate::error::ConversionError;

const VIA_PADSTACK: &str = "Via[0-1]_600:300_um";
const VIA_DIAMETER_UM: i64 = 600;

/// A DSN s-expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Atom(String),
    /// Written verbatim, never quoted.
    Raw(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn atom(s: impl Into<String>) -> Self {
        SExpr::Atom(s.into())
    }

    fn list(head: &str, rest: Vec<SExpr>) -> Self {
        let mut items = Vec::with_capacity(rest.len() + 1);
        items.push(SExpr::atom(head));
        items.extend(rest);
        SExpr::List(items)
    }

    /// Renders with two-space indentation. Nested lists start on their own line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out.push('\n');
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        match self {
            SExpr::Atom(a) => out.push_str(&quote(a)),
            SExpr::Raw(r) => out.push_str(r),
            SExpr::List(items) => {
                out.push('(');
                let mut broke = false;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 && matches!(item, SExpr::List(_)) {
                        out.push('\n');
                        out.push_str(&"  ".repeat(depth + 1));
                        broke = true;
                    } else if idx > 0 {
                        out.push(' ');
                    }
                    item.render_into(out, depth + 1);
                }
                if broke {
                    out.push('\n');
                    out.push_str(&"  ".repeat(depth));
                }
                out.push(')');
            }
        }
    }
}

/// Quotes an identifier when DSN tokenization would otherwise split it.
pub fn quote(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"');
    if needs_quotes {
        format!("\"{}\"", token.replace('"', "'"))
    } else {
        token.to_string()
    }
}

/// Millimetres to whole micrometres.
fn um(mm: f64) -> i64 {
    (mm * 1000.0).round() as i64
}

fn num(mm: f64) -> SExpr {
    SExpr::Atom(um(mm).to_string())
}

fn dsn_layer(layer: &str) -> &'static str {
    match layer {
        "bottom" | "B.Cu" => "B.Cu",
        _ => "F.Cu",
    }
}

fn padstack_name(pad: &Pad) -> String {
    match pad.shape {
        PadShape::Rect { width, height } => format!(
            "Rect[{}]Pad_{}x{}_um",
            if pad.layers.iter().any(|l| l == "bottom") { "B" } else { "T" },
            um(width),
            um(height)
        ),
        PadShape::Circle { diameter } if pad.plated => {
            format!("Round[A]Pad_{}_um", um(diameter))
        }
        PadShape::Circle { diameter } => format!("Round[T]Pad_{}_um", um(diameter)),
    }
}

fn padstack(pad: &Pad) -> SExpr {
    let shapes = pad
        .layers
        .iter()
        .map(|layer| {
            let layer = dsn_layer(layer);
            let shape = match pad.shape {
                PadShape::Rect { width, height } => SExpr::list(
                    "rect",
                    vec![
                        SExpr::atom(layer),
                        num(-width / 2.0),
                        num(-height / 2.0),
                        num(width / 2.0),
                        num(height / 2.0),
                    ],
                ),
                PadShape::Circle { diameter } => {
                    SExpr::list("circle", vec![SExpr::atom(layer), num(diameter)])
                }
            };
            SExpr::list("shape", vec![shape])
        })
        .collect::<Vec<_>>();

    let mut items = vec![SExpr::atom(padstack_name(pad))];
    items.extend(shapes);
    items.push(SExpr::list("attach", vec![SExpr::atom("off")]));
    SExpr::list("padstack", items)
}

struct Component {
    reference: String,
    center: Point,
    side: &'static str,
    pads: Vec<Pad>,
}

/// Groups pads under their placed components, keyed by reference designator.
fn components(
    graph: &CircuitGraph,
    pads: &[Pad],
) -> Result<BTreeMap<String, Component>, ConversionError> {
    let names: BTreeMap<&str, &str> = graph
        .elements_of_type("source_component")
        .filter_map(|c| Some((c.get_str("source_component_id")?, c.get_str("name")?)))
        .collect();

    let mut by_pcb_id: BTreeMap<String, Component> = BTreeMap::new();
    for (idx, element) in graph.elements_of_type("pcb_component").enumerate() {
        let pcb_id = element
            .get_str("pcb_component_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("pcb_component_{}", idx));
        let reference = element
            .get_str("source_component_id")
            .and_then(|id| names.get(id))
            .map(|n| n.to_string())
            .unwrap_or_else(|| pcb_id.clone());
        let side = if element.get_str("layer") == Some("bottom") {
            "back"
        } else {
            "front"
        };
        by_pcb_id.insert(
            pcb_id,
            Component {
                reference,
                center: geometry::point_field(element, "center")?,
                side,
                pads: Vec::new(),
            },
        );
    }

    for pad in pads {
        let Some(component) = pad
            .pcb_component_id
            .as_ref()
            .and_then(|id| by_pcb_id.get_mut(id))
        else {
            continue;
        };
        component.pads.push(pad.clone());
    }

    let mut by_reference = BTreeMap::new();
    for (_, mut component) in by_pcb_id {
        component.pads.sort_by(|a, b| a.id.cmp(&b.id));
        by_reference.insert(component.reference.clone(), component);
    }
    Ok(by_reference)
}

/// Writes the DSN board description for `graph`.
pub fn write_dsn(graph: &CircuitGraph, board_name: &str) -> Result<String, ConversionError> {
    let pads = geometry::pads(graph)?;
    let bounds = geometry::routing_bounds(graph, &pads)?;
    let components = components(graph, &pads)?;
    let trace_width = graph
        .elements_of_type("pcb_board")
        .find_map(|b| b.get_f64("min_trace_width"))
        .unwrap_or(DEFAULT_MIN_TRACE_WIDTH);

    // Pin reference (`R1-1`) for each pcb_port, via the pad that carries it.
    let mut pin_for_port: BTreeMap<String, String> = BTreeMap::new();
    for component in components.values() {
        for (idx, pad) in component.pads.iter().enumerate() {
            if let Some(port) = &pad.pcb_port_id {
                pin_for_port
                    .entry(port.clone())
                    .or_insert_with(|| format!("{}-{}", component.reference, idx + 1));
            }
        }
    }

    let rule = || {
        SExpr::list(
            "rule",
            vec![
                SExpr::list("width", vec![num(trace_width)]),
                SExpr::list("clearance", vec![num(trace_width)]),
            ],
        )
    };

    let boundary = SExpr::list(
        "boundary",
        vec![SExpr::list(
            "path",
            vec![
                SExpr::atom("pcb"),
                SExpr::atom("0"),
                num(bounds.min_x),
                num(bounds.min_y),
                num(bounds.max_x),
                num(bounds.min_y),
                num(bounds.max_x),
                num(bounds.max_y),
                num(bounds.min_x),
                num(bounds.max_y),
                num(bounds.min_x),
                num(bounds.min_y),
            ],
        )],
    );

    let structure = SExpr::list(
        "structure",
        vec![
            SExpr::list(
                "layer",
                vec![
                    SExpr::atom("F.Cu"),
                    SExpr::list("type", vec![SExpr::atom("signal")]),
                    SExpr::list(
                        "property",
                        vec![SExpr::list("index", vec![SExpr::atom("0")])],
                    ),
                ],
            ),
            SExpr::list(
                "layer",
                vec![
                    SExpr::atom("B.Cu"),
                    SExpr::list("type", vec![SExpr::atom("signal")]),
                    SExpr::list(
                        "property",
                        vec![SExpr::list("index", vec![SExpr::atom("1")])],
                    ),
                ],
            ),
            boundary,
            SExpr::list("via", vec![SExpr::atom(VIA_PADSTACK)]),
            rule(),
        ],
    );

    let mut placement = Vec::new();
    let mut images = Vec::new();
    let mut padstacks: BTreeMap<String, SExpr> = BTreeMap::new();
    for component in components.values() {
        let image_id = format!("{}_footprint", component.reference);
        placement.push(SExpr::list(
            "component",
            vec![
                SExpr::atom(image_id.clone()),
                SExpr::list(
                    "place",
                    vec![
                        SExpr::atom(component.reference.clone()),
                        num(component.center.x),
                        num(component.center.y),
                        SExpr::atom(component.side),
                        SExpr::atom("0"),
                    ],
                ),
            ],
        ));

        let mut image = vec![SExpr::atom(image_id)];
        for (idx, pad) in component.pads.iter().enumerate() {
            let name = padstack_name(pad);
            padstacks
                .entry(name.clone())
                .or_insert_with(|| padstack(pad));
            image.push(SExpr::list(
                "pin",
                vec![
                    SExpr::atom(name),
                    SExpr::atom((idx + 1).to_string()),
                    num(pad.center.x - component.center.x),
                    num(pad.center.y - component.center.y),
                ],
            ));
        }
        images.push(SExpr::list("image", image));
    }

    let via_shapes = ["F.Cu", "B.Cu"]
        .iter()
        .map(|layer| {
            SExpr::list(
                "shape",
                vec![SExpr::list(
                    "circle",
                    vec![SExpr::atom(*layer), SExpr::Atom(VIA_DIAMETER_UM.to_string())],
                )],
            )
        })
        .collect::<Vec<_>>();
    let mut via = vec![SExpr::atom(VIA_PADSTACK)];
    via.extend(via_shapes);
    via.push(SExpr::list("attach", vec![SExpr::atom("off")]));

    let mut library = images;
    library.extend(padstacks.into_values());
    library.push(SExpr::list("padstack", via));

    let mut nets = Vec::new();
    let mut net_names = BTreeSet::new();
    for group in geometry::net_groups(graph) {
        let pins: BTreeSet<String> = group
            .source_port_ids
            .iter()
            .filter_map(|sp| geometry::pcb_port_for(graph, sp))
            .filter_map(|port| port.get_str("pcb_port_id"))
            .filter_map(|port_id| pin_for_port.get(port_id).cloned())
            .collect();
        if pins.len() < 2 {
            continue;
        }
        let net_name = format!("Net-({})", group.name);
        net_names.insert(net_name.clone());
        nets.push(SExpr::list(
            "net",
            vec![
                SExpr::atom(net_name),
                SExpr::list("pins", pins.into_iter().map(SExpr::Atom).collect()),
            ],
        ));
    }
    let mut class = vec![SExpr::atom("kicad_default"), SExpr::atom("")];
    class.extend(net_names.into_iter().map(SExpr::Atom));
    class.push(SExpr::list(
        "circuit",
        vec![SExpr::list("use_via", vec![SExpr::atom(VIA_PADSTACK)])],
    ));
    class.push(rule());
    nets.push(SExpr::list("class", class));

    let pcb = SExpr::list(
        "pcb",
        vec![
            SExpr::atom(board_name),
            SExpr::list(
                "parser",
                vec![
                    SExpr::list("string_quote", vec![SExpr::Raw("\"".to_string())]),
                    SExpr::list("space_in_quoted_tokens", vec![SExpr::atom("on")]),
                    SExpr::list("host_cad", vec![SExpr::atom("circuit-forge")]),
                    SExpr::list("host_version", vec![SExpr::atom(env!("CARGO_PKG_VERSION"))]),
                ],
            ),
            SExpr::list("resolution", vec![SExpr::atom("um"), SExpr::atom("10")]),
            SExpr::list("unit", vec![SExpr::atom("um")]),
            structure,
            SExpr::list("placement", placement),
            SExpr::list("library", library),
            SExpr::list("network", nets),
            SExpr::list("wiring", Vec::new()),
        ],
    );

    Ok(pcb.render())
}
