//! Bridge between the tree model and the builder graph.
//!
//! [`to_graph`] replays a parsed [`Patch`] into a [`Graph`]; [`to_tree`]
//! serializes a graph back into a patch. Connection elements address
//! nodes by declaration index, counting only addressable elements
//! (connect and coords lines are skipped), and that numbering is exactly
//! what the builder's node list reproduces, so a round trip preserves
//! indices as well as content.

use crate::error::{GraphError, PdError};
use crate::graph::{Graph, Node, NodeKind, NodeRef, SubpatchNode};
use crate::layout::Place;
use crate::model::{CanvasProps, Connect, Coords, Element, Patch, Position, Restore, Subpatch};
use std::path::Path;

/// Tolerance policy for [`to_graph_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeConfig {
    /// Fail on connection elements whose node indices do not resolve.
    /// Off by default: patches edited by hand or by other tools sometimes
    /// carry dangling cords, and dropping them recovers the rest.
    pub strict_indices: bool,
}

/// Build a graph from a parsed patch, dropping dangling connections.
pub fn to_graph(patch: &Patch) -> Result<Graph, GraphError> {
    to_graph_with(patch, &BridgeConfig::default())
}

/// Build a graph from a parsed patch with an explicit tolerance policy.
pub fn to_graph_with(patch: &Patch, config: &BridgeConfig) -> Result<Graph, GraphError> {
    build_graph(&patch.elements, config)
}

fn build_graph(elements: &[Element], config: &BridgeConfig) -> Result<Graph, GraphError> {
    let mut graph = Graph::new();
    let mut refs: Vec<NodeRef> = Vec::new();

    for elem in elements {
        let (kind, pos) = match elem {
            Element::Connect(_) | Element::Coords(_) => continue,
            Element::Obj(o) => (NodeKind::Obj(o.clone()), o.position),
            Element::Msg(m) => (NodeKind::Msg(m.clone()), m.position),
            Element::Text(t) => (NodeKind::Comment(t.clone()), t.position),
            Element::FloatAtom(a) => (NodeKind::FloatBox(a.clone()), a.position),
            Element::SymbolAtom(a) => (NodeKind::SymbolBox(a.clone()), a.position),
            Element::Bng(b) => (NodeKind::Bang(b.clone()), b.position),
            Element::Tgl(t) => (NodeKind::Toggle(t.clone()), t.position),
            Element::Nbx(n) => (NodeKind::NumberBox(n.clone()), n.position),
            Element::Vsl(s) => (NodeKind::VSlider(s.clone()), s.position),
            Element::Hsl(s) => (NodeKind::HSlider(s.clone()), s.position),
            Element::Vradio(r) => (NodeKind::VRadio(r.clone()), r.position),
            Element::Hradio(r) => (NodeKind::HRadio(r.clone()), r.position),
            Element::Cnv(c) => (NodeKind::Canvas(c.clone()), c.position),
            Element::Vu(v) => (NodeKind::VuMeter(v.clone()), v.position),
            Element::Array(a) => (NodeKind::Array(a.clone()), Position::new(-1, -1)),
            Element::Subpatch(sp) => {
                let node = subpatch_node(sp, config)?;
                let pos = node.position;
                (NodeKind::Subpatch(node), pos)
            }
        };
        let r = graph.add_node(kind, Place::at(pos.x, pos.y));
        // Negative coordinates are legal in the wire format but read as
        // "not absolute" by placement; restore them directly.
        graph.node_mut(r)?.set_position(pos);
        refs.push(r);
    }

    for elem in elements {
        let Element::Connect(c) = elem else { continue };
        let resolved = usize::try_from(c.source)
            .ok()
            .and_then(|s| refs.get(s).copied())
            .zip(
                usize::try_from(c.sink)
                    .ok()
                    .and_then(|s| refs.get(s).copied()),
            )
            .zip(usize::try_from(c.outlet).ok().zip(usize::try_from(c.inlet).ok()));
        let Some(((source, sink), (outlet, inlet))) = resolved else {
            if config.strict_indices {
                return Err(GraphError::DanglingIndex(
                    i64::from(c.source).max(i64::from(c.sink)),
                ));
            }
            continue;
        };
        graph.link_into(source.outlet(outlet), sink, inlet)?;
    }

    Ok(graph)
}

fn subpatch_node(sp: &Subpatch, config: &BridgeConfig) -> Result<SubpatchNode, GraphError> {
    let inner = build_graph(&sp.elements, config)?;
    let (name, position) = match &sp.restore {
        Some(r) => (r.name.clone(), r.position),
        None => ("subpatch".to_string(), Position::new(0, 0)),
    };
    let mut node = SubpatchNode::new(name, inner);
    node.position = position;
    node.canvas = sp.canvas.clone();
    let gop = sp.elements.iter().find_map(|e| match e {
        Element::Coords(c) if c.graph_on_parent >= 1 => Some(c),
        _ => None,
    });
    if let Some(coords) = gop {
        node.graph_on_parent = true;
        node.hide_name = coords.hide_name != 0;
        node.gop_width = coords.width;
        node.gop_height = coords.height;
    }
    Ok(node)
}

impl Graph {
    /// Render through [`to_tree`] and write the `.pd` text to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PdError> {
        crate::emitter::emit_to_file(&to_tree(self), path)
    }
}

/// Serialize a graph into a patch on a default root canvas: one element
/// per node in declaration order, then one connect line per cord.
pub fn to_tree(graph: &Graph) -> Patch {
    let mut patch = Patch::new(CanvasProps::default());
    for node in graph.nodes() {
        patch.elements.push(node_element(node));
    }
    for conn in graph.connections() {
        patch.elements.push(Element::Connect(Connect {
            source: conn.source as i32,
            outlet: conn.outlet as i32,
            sink: conn.sink as i32,
            inlet: conn.inlet as i32,
        }));
    }
    patch
}

fn node_element(node: &Node) -> Element {
    match &node.kind {
        NodeKind::Obj(o) | NodeKind::Abstraction { obj: o, .. } => Element::Obj(o.clone()),
        NodeKind::Msg(m) => Element::Msg(m.clone()),
        NodeKind::Comment(t) => Element::Text(t.clone()),
        NodeKind::FloatBox(a) => Element::FloatAtom(a.clone()),
        NodeKind::SymbolBox(a) => Element::SymbolAtom(a.clone()),
        NodeKind::Bang(b) => Element::Bng(b.clone()),
        NodeKind::Toggle(t) => Element::Tgl(t.clone()),
        NodeKind::NumberBox(n) => Element::Nbx(n.clone()),
        NodeKind::VSlider(s) => Element::Vsl(s.clone()),
        NodeKind::HSlider(s) => Element::Hsl(s.clone()),
        NodeKind::VRadio(r) => Element::Vradio(r.clone()),
        NodeKind::HRadio(r) => Element::Hradio(r.clone()),
        NodeKind::Canvas(c) => Element::Cnv(c.clone()),
        NodeKind::VuMeter(v) => Element::Vu(v.clone()),
        NodeKind::Array(a) => Element::Array(a.clone()),
        NodeKind::Subpatch(sp) => {
            let mut elements = to_tree(&sp.graph).elements;
            if sp.graph_on_parent {
                elements.push(Element::Coords(Coords {
                    x_from: 0.0,
                    y_from: 1.0,
                    x_to: 1.0,
                    y_to: 0.0,
                    width: sp.gop_width,
                    height: sp.gop_height,
                    graph_on_parent: 1,
                    hide_name: i32::from(sp.hide_name),
                    x_margin: 0,
                    y_margin: 0,
                }));
            }
            Element::Subpatch(Subpatch {
                canvas: sp.canvas.clone(),
                elements,
                restore: Some(Restore {
                    position: sp.position,
                    name: sp.name.clone(),
                }),
            })
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Connection;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    const SINE: &str = "#N canvas 0 50 450 300 10;\n\
        #X obj 50 50 osc~ 440;\n\
        #X obj 50 100 dac~;\n\
        #X connect 0 0 1 0;";

    #[test]
    fn parsed_patch_becomes_a_graph() {
        let patch = parse(SINE).unwrap();
        let graph = to_graph(&patch).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(
            graph.connections(),
            &[Connection { source: 0, outlet: 0, sink: 1, inlet: 0 }]
        );
        let osc = graph.node(graph.node_ref(0).unwrap()).unwrap();
        assert_eq!(osc.position(), Position::new(50, 50));
        // Registry fills in what the wire format does not carry
        assert_eq!(osc.num_inlets, Some(2));
    }

    #[test]
    fn graph_to_tree_to_graph_preserves_everything() {
        let patch = parse(SINE).unwrap();
        let graph = to_graph(&patch).unwrap();
        let back = to_tree(&graph);
        assert_eq!(back.elements, patch.elements);

        let again = to_graph(&back).unwrap();
        assert_eq!(again.node_count(), graph.node_count());
        assert_eq!(again.connections(), graph.connections());
    }

    #[test]
    fn connection_indices_skip_connect_and_coords_lines() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #X obj 10 10 loadbang;\n\
            #X connect 0 0 1 0;\n\
            #X obj 10 40 print;\n\
            #X connect 0 0 1 0;";
        let graph = to_graph(&parse(text).unwrap()).unwrap();
        assert_eq!(graph.node_count(), 2);
        // Both connect lines address the same two nodes
        assert_eq!(graph.connection_count(), 2);
        assert_eq!(graph.connections()[0].sink, 1);
    }

    #[test]
    fn dangling_connections_drop_or_fail_by_policy() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #X obj 10 10 loadbang;\n\
            #X connect 0 0 7 0;";
        let patch = parse(text).unwrap();

        let tolerant = to_graph(&patch).unwrap();
        assert_eq!(tolerant.connection_count(), 0);

        let err = to_graph_with(&patch, &BridgeConfig { strict_indices: true }).unwrap_err();
        assert_eq!(err, GraphError::DanglingIndex(7));
    }

    #[test]
    fn subpatch_round_trips_with_gop_coords() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #N canvas 0 0 300 180 voice 0;\n\
            #X obj 10 10 inlet;\n\
            #X obj 10 60 outlet;\n\
            #X connect 0 0 1 0;\n\
            #X coords 0 1 1 0 85 60 1 0 0 0;\n\
            #X restore 30 80 pd voice;";
        let patch = parse(text).unwrap();
        let graph = to_graph(&patch).unwrap();
        assert_eq!(graph.node_count(), 1);
        let node = graph.node(graph.node_ref(0).unwrap()).unwrap();
        let NodeKind::Subpatch(sp) = &node.kind else {
            panic!("expected a subpatch node");
        };
        assert_eq!(sp.name, "voice");
        assert_eq!(sp.position, Position::new(30, 80));
        assert!(sp.graph_on_parent);
        assert_eq!((sp.gop_width, sp.gop_height), (85, 60));
        assert_eq!(sp.graph.node_count(), 2);
        assert_eq!(sp.graph.connection_count(), 1);

        assert_eq!(to_tree(&graph).elements, patch.elements);
    }

    #[test]
    fn message_content_stays_escaped_across_the_bridge() {
        let text = "#N canvas 0 50 450 300 10;\n#X msg 10 10 start \\; stop;";
        let patch = parse(text).unwrap();
        let graph = to_graph(&patch).unwrap();
        assert_eq!(to_tree(&graph).elements, patch.elements);
    }

    #[test]
    fn out_of_range_io_in_connections_is_an_error() {
        // dac~ has no outlets, so a cord leaving it is invalid in any mode
        let text = "#N canvas 0 50 450 300 10;\n\
            #X obj 10 10 dac~;\n\
            #X obj 10 40 print;\n\
            #X connect 0 0 1 0;";
        let err = to_graph(&parse(text).unwrap()).unwrap_err();
        assert!(matches!(err, GraphError::OutletOutOfRange { .. }));
    }
}
