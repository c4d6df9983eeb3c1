//! PCB preview rendering.

use std::fmt::Write as _;

use serde_json::Value;

use super::geometry::{self, Bounds, PadShape};
use crate::circuit::CircuitGraph;
use crate::error::ConversionError;

const CANVAS_WIDTH: f64 = 800.0;
const CANVAS_HEIGHT: f64 = 600.0;
const PADDING: f64 = 1.0;

const BOARD_FILL: &str = "#000";
const BOARD_STROKE: &str = "#fff";
const PAD_COLOR: &str = "#c87533";
const TOP_TRACE_COLOR: &str = "rgb(200, 52, 52)";
const BOTTOM_TRACE_COLOR: &str = "rgb(77, 127, 196)";

fn fmt(v: f64) -> String {
    // Three decimals keeps output stable across platforms; trim the zeros.
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

struct TracePath {
    points: Vec<(f64, f64)>,
    width: f64,
    layer: String,
}

fn trace_paths(graph: &CircuitGraph) -> Vec<TracePath> {
    graph
        .elements_of_type("pcb_trace")
        .filter_map(|trace| {
            let route = trace.get("route")?.as_array()?;
            let points: Vec<(f64, f64)> = route
                .iter()
                .filter_map(|p| Some((p.get("x")?.as_f64()?, p.get("y")?.as_f64()?)))
                .collect();
            if points.len() < 2 {
                return None;
            }
            let first = route.first()?;
            Some(TracePath {
                width: first
                    .get("width")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.15),
                layer: first
                    .get("layer")
                    .and_then(Value::as_str)
                    .unwrap_or("top")
                    .to_string(),
                points,
            })
        })
        .collect()
}

/// Renders a top-down PCB preview.
///
/// Fails with [`ConversionError::UnsupportedPreview`] when the graph has
/// nothing drawable.
pub fn render_pcb_svg(graph: &CircuitGraph) -> Result<String, ConversionError> {
    let pads = geometry::pads(graph)?;
    let traces = trace_paths(graph);
    let board = geometry::board_bounds(graph)?;

    if board.is_none() && pads.is_empty() && traces.is_empty() {
        return Err(ConversionError::UnsupportedPreview(
            "circuit has no board, pads or traces".to_string(),
        ));
    }

    let mut view = match board {
        Some(b) => b,
        None => geometry::routing_bounds(graph, &pads).unwrap_or(Bounds {
            min_x: 0.0,
            max_x: 0.0,
            min_y: 0.0,
            max_y: 0.0,
        }),
    };
    for trace in &traces {
        for &(x, y) in &trace.points {
            view.min_x = view.min_x.min(x);
            view.max_x = view.max_x.max(x);
            view.min_y = view.min_y.min(y);
            view.max_y = view.max_y.max(y);
        }
    }

    // SVG y grows downward; circuit y grows upward.
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="{} {} {} {}">"#,
        fmt(CANVAS_WIDTH),
        fmt(CANVAS_HEIGHT),
        fmt(view.min_x - PADDING),
        fmt(-view.max_y - PADDING),
        fmt(view.width() + 2.0 * PADDING),
        fmt(view.height() + 2.0 * PADDING),
    );
    let _ = writeln!(
        out,
        r#"<rect class="boundary" x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
        fmt(view.min_x - PADDING),
        fmt(-view.max_y - PADDING),
        fmt(view.width() + 2.0 * PADDING),
        fmt(view.height() + 2.0 * PADDING),
        BOARD_FILL,
    );

    if let Some(b) = board {
        let _ = writeln!(
            out,
            r#"<rect class="pcb-board" x="{}" y="{}" width="{}" height="{}" fill="none" stroke="{}" stroke-width="0.1"/>"#,
            fmt(b.min_x),
            fmt(-b.max_y),
            fmt(b.width()),
            fmt(b.height()),
            BOARD_STROKE,
        );
    }

    for trace in &traces {
        let points = trace
            .points
            .iter()
            .map(|&(x, y)| format!("{},{}", fmt(x), fmt(-y)))
            .collect::<Vec<_>>()
            .join(" ");
        let color = if trace.layer == "bottom" {
            BOTTOM_TRACE_COLOR
        } else {
            TOP_TRACE_COLOR
        };
        let _ = writeln!(
            out,
            r#"<polyline class="pcb-trace" points="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/>"#,
            points,
            color,
            fmt(trace.width),
        );
    }

    for pad in &pads {
        match pad.shape {
            PadShape::Rect { width, height } => {
                let _ = writeln!(
                    out,
                    r#"<rect class="pcb-pad" x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                    fmt(pad.center.x - width / 2.0),
                    fmt(-pad.center.y - height / 2.0),
                    fmt(width),
                    fmt(height),
                    PAD_COLOR,
                );
            }
            PadShape::Circle { diameter } => {
                let class = if pad.plated { "pcb-hole" } else { "pcb-pad" };
                let _ = writeln!(
                    out,
                    r#"<circle class="{}" cx="{}" cy="{}" r="{}" fill="{}"/>"#,
                    class,
                    fmt(pad.center.x),
                    fmt(-pad.center.y),
                    fmt(diameter / 2.0),
                    PAD_COLOR,
                );
            }
        }
    }

    out.push_str("</svg>");
    Ok(out)
}
