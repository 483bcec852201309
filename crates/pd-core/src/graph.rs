//! Builder graph: imperative patch construction.
//!
//! A [`Graph`] owns an ordered node list and an ordered connection list,
//! mirroring how the text format addresses nodes by declaration index.
//! Nodes are placed by the graph's [`LayoutStrategy`] unless an absolute
//! position is given. Handles ([`NodeRef`]) are tagged with the graph
//! generation they were issued under; structural rewrites (optimization)
//! bump the generation, so stale handles fail loudly instead of silently
//! pointing at the wrong node.

use crate::error::{GraphError, PdError};
use crate::layout::{LayoutStrategy, Place, RowLayout, ROW_HEIGHT};
use crate::model::{
    ArrayDecl, AtomBox, Bng, CanvasProps, Cnv, Element, MsgBox, Nbx, ObjBox, Position, Radio,
    Slider, TextComment, Tgl, Vu,
};
use crate::registry;
use smallvec::SmallVec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Text escaping ────────────────────────────────────────────────────────

/// Wrap column for display-line computation.
pub const TEXT_WRAP_WIDTH: usize = 60;

// Pixel metrics used to estimate box dimensions for relative placement.
const CHAR_WIDTH: i32 = 6;
const MIN_ELEMENT_WIDTH: i32 = 50;
const ELEMENT_PADDING: i32 = 20;
const LINE_HEIGHT: i32 = 15;
const ELEMENT_BASE_HEIGHT: i32 = 10;
const FLOATATOM_WIDTH: i32 = 50;
const FLOATATOM_HEIGHT: i32 = 25;

/// Default inner canvas size for builder-created sub-graphs.
pub const SUBPATCH_CANVAS_WIDTH: i32 = 300;
pub const SUBPATCH_CANVAS_HEIGHT: i32 = 180;

/// Escape message text for the wire format: backslashes double, `;` and `,`
/// become space-padded escape pairs, and `$` directly before a digit gets a
/// backslash so it is not taken as an argument substitution.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str(" \\; "),
            ',' => out.push_str(" \\, "),
            '$' if chars.peek().is_some_and(|d| d.is_ascii_digit()) => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

/// Invert [`escape`] for display: escaped semicolons become newlines,
/// escaped commas and dollars become their plain characters, and each
/// resulting line is trimmed. Escape pairs are consumed left to right,
/// so the second half of a doubled backslash never starts a new pair.
pub fn unescape(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                '\\' => {
                    out.push_str("\\\\");
                    i += 2;
                }
                sep @ (';' | ',') => {
                    // The wire format pads these with a space on each side.
                    if out.ends_with(' ') {
                        out.pop();
                    }
                    out.push(if sep == ';' { '\n' } else { ',' });
                    i += 2;
                    if chars.get(i) == Some(&' ') {
                        i += 1;
                    }
                }
                '$' => {
                    out.push('$');
                    i += 2;
                }
                other => {
                    out.push('\\');
                    out.push(other);
                    i += 2;
                }
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Unescape text and greedily wrap each line at [`TEXT_WRAP_WIDTH`]
/// columns, breaking at whitespace where possible. Empty pieces vanish.
pub fn display_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for line in unescape(text).split('\n') {
        wrap_line(line, TEXT_WRAP_WIDTH, &mut lines);
    }
    lines
}

fn wrap_line(line: &str, width: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let remaining = chars.len() - i;
        let take = if remaining <= width {
            remaining
        } else {
            // Longest prefix of at most `width` chars followed by a break;
            // no break point means a hard cut.
            (1..=width)
                .rev()
                .find(|&k| chars[i + k].is_whitespace())
                .unwrap_or(width)
        };
        let piece: String = chars[i..i + take].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
        i += take;
        if i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
    }
}

// ─── Handles ──────────────────────────────────────────────────────────────

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

pub(crate) fn fresh_tag() -> u64 {
    NEXT_TAG.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a node in a specific graph generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) tag: u64,
    pub(crate) index: usize,
}

impl NodeRef {
    /// Index into the node list at the time the handle was issued.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reference a specific outlet of this node.
    pub fn outlet(self, index: usize) -> Outlet {
        Outlet { node: self, index }
    }
}

/// (node, outlet index) pair for ergonomic linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outlet {
    pub node: NodeRef,
    pub index: usize,
}

impl From<NodeRef> for Outlet {
    fn from(node: NodeRef) -> Self {
        Outlet { node, index: 0 }
    }
}

/// Patch cord as stored: indices into the owning graph's node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: usize,
    pub outlet: usize,
    pub sink: usize,
    pub inlet: usize,
}

// ─── Nodes ────────────────────────────────────────────────────────────────

/// A nested graph presented as one node in its parent.
///
/// The inner [`Graph`] has its own coordinate system and layout state;
/// `position` is where the box sits in the parent's coordinates.
#[derive(Debug)]
pub struct SubpatchNode {
    pub name: String,
    pub position: Position,
    pub graph: Graph,
    /// Inner canvas properties, carried through the bridge verbatim.
    pub canvas: CanvasProps,
    pub graph_on_parent: bool,
    pub hide_name: bool,
    pub gop_width: i32,
    pub gop_height: i32,
}

impl SubpatchNode {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            position: Position::new(0, 0),
            graph,
            canvas: CanvasProps::subpatch(SUBPATCH_CANVAS_WIDTH, SUBPATCH_CANVAS_HEIGHT),
            graph_on_parent: false,
            hide_name: false,
            gop_width: 85,
            gop_height: 60,
        }
    }
}

/// Concrete node payloads. Widget kinds reuse the tree-model records, so
/// the bridge maps them 1:1 without field shuffling.
#[derive(Debug)]
pub enum NodeKind {
    Obj(ObjBox),
    /// Object backed by an external `.pd` file.
    Abstraction {
        obj: ObjBox,
        source_path: Option<PathBuf>,
    },
    Msg(MsgBox),
    Comment(TextComment),
    FloatBox(AtomBox),
    SymbolBox(AtomBox),
    Bang(Bng),
    Toggle(Tgl),
    NumberBox(Nbx),
    VSlider(Slider),
    HSlider(Slider),
    VRadio(Radio),
    HRadio(Radio),
    Canvas(Cnv),
    VuMeter(Vu),
    Array(ArrayDecl),
    Subpatch(SubpatchNode),
}

impl NodeKind {
    fn position(&self) -> Option<Position> {
        match self {
            NodeKind::Obj(o) | NodeKind::Abstraction { obj: o, .. } => Some(o.position),
            NodeKind::Msg(m) => Some(m.position),
            NodeKind::Comment(t) => Some(t.position),
            NodeKind::FloatBox(a) | NodeKind::SymbolBox(a) => Some(a.position),
            NodeKind::Bang(b) => Some(b.position),
            NodeKind::Toggle(t) => Some(t.position),
            NodeKind::NumberBox(n) => Some(n.position),
            NodeKind::VSlider(s) | NodeKind::HSlider(s) => Some(s.position),
            NodeKind::VRadio(r) | NodeKind::HRadio(r) => Some(r.position),
            NodeKind::Canvas(c) => Some(c.position),
            NodeKind::VuMeter(v) => Some(v.position),
            NodeKind::Array(_) => None,
            NodeKind::Subpatch(sp) => Some(sp.position),
        }
    }

    pub(crate) fn set_position(&mut self, pos: Position) {
        match self {
            NodeKind::Obj(o) | NodeKind::Abstraction { obj: o, .. } => o.position = pos,
            NodeKind::Msg(m) => m.position = pos,
            NodeKind::Comment(t) => t.position = pos,
            NodeKind::FloatBox(a) | NodeKind::SymbolBox(a) => a.position = pos,
            NodeKind::Bang(b) => b.position = pos,
            NodeKind::Toggle(t) => t.position = pos,
            NodeKind::NumberBox(n) => n.position = pos,
            NodeKind::VSlider(s) | NodeKind::HSlider(s) => s.position = pos,
            NodeKind::VRadio(r) | NodeKind::HRadio(r) => r.position = pos,
            NodeKind::Canvas(c) => c.position = pos,
            NodeKind::VuMeter(v) => v.position = pos,
            NodeKind::Array(_) => {}
            NodeKind::Subpatch(sp) => sp.position = pos,
        }
    }
}

/// One node: payload plus declared I/O counts (`None` = unknown, never
/// validated against).
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub num_inlets: Option<u32>,
    pub num_outlets: Option<u32>,
}

impl Node {
    /// Hidden nodes (data arrays) take no part in placement.
    pub fn is_hidden(&self) -> bool {
        matches!(self.kind, NodeKind::Array(_))
    }

    pub fn position(&self) -> Position {
        self.kind.position().unwrap_or(Position::new(-1, -1))
    }

    pub fn set_position(&mut self, pos: Position) {
        self.kind.set_position(pos);
    }

    /// Estimated on-canvas box size, used as the layout advance.
    pub fn dimensions(&self) -> (i32, i32) {
        match &self.kind {
            NodeKind::Obj(o) | NodeKind::Abstraction { obj: o, .. } => {
                text_dimensions(&o.text())
            }
            NodeKind::Msg(m) => text_dimensions(&m.content),
            NodeKind::Comment(_) => (0, 0),
            NodeKind::FloatBox(_) => (FLOATATOM_WIDTH, FLOATATOM_HEIGHT),
            NodeKind::SymbolBox(a) => (a.width * CHAR_WIDTH, ROW_HEIGHT),
            NodeKind::Bang(b) => (b.size, b.size),
            NodeKind::Toggle(t) => (t.size, t.size),
            NodeKind::NumberBox(n) => (n.width * CHAR_WIDTH, n.height),
            NodeKind::VSlider(s) | NodeKind::HSlider(s) => (s.width, s.height),
            NodeKind::VRadio(r) => (r.size, r.size * r.number),
            NodeKind::HRadio(r) => (r.size * r.number, r.size),
            NodeKind::Canvas(c) => (c.width, c.height),
            NodeKind::VuMeter(v) => (v.width, v.height),
            NodeKind::Array(_) => (0, 0),
            NodeKind::Subpatch(sp) => {
                if sp.graph_on_parent {
                    (sp.gop_width, sp.gop_height)
                } else {
                    let label = format!("pd {}", sp.name);
                    let w = MIN_ELEMENT_WIDTH
                        .max(ELEMENT_PADDING + label.chars().count() as i32 * CHAR_WIDTH);
                    (w, ROW_HEIGHT)
                }
            }
        }
    }

    /// Whether a send/receive field is set to something other than the
    /// inactive defaults (`empty`, `-`, empty string).
    pub fn has_active_send_receive(&self) -> bool {
        fn active(v: &str) -> bool {
            !matches!(v, "empty" | "-" | "")
        }
        match &self.kind {
            NodeKind::FloatBox(a) | NodeKind::SymbolBox(a) => {
                active(&a.send) || active(&a.receive)
            }
            NodeKind::Bang(b) => active(&b.send) || active(&b.receive),
            NodeKind::Toggle(t) => active(&t.send) || active(&t.receive),
            NodeKind::NumberBox(n) => active(&n.send) || active(&n.receive),
            NodeKind::VSlider(s) | NodeKind::HSlider(s) => active(&s.send) || active(&s.receive),
            NodeKind::VRadio(r) | NodeKind::HRadio(r) => active(&r.send) || active(&r.receive),
            NodeKind::Canvas(c) => active(&c.send) || active(&c.receive),
            NodeKind::VuMeter(v) => active(&v.receive),
            _ => false,
        }
    }
}

fn text_dimensions(text: &str) -> (i32, i32) {
    let lines = display_lines(text);
    let max_chars = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let w = MIN_ELEMENT_WIDTH.max(ELEMENT_PADDING + max_chars as i32 * CHAR_WIDTH);
    let h = ELEMENT_BASE_HEIGHT + LINE_HEIGHT * lines.len() as i32;
    (w, h)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Obj(o) | NodeKind::Abstraction { obj: o, .. } => {
                write!(f, "[{}]", o.text())
            }
            NodeKind::Msg(m) => write!(f, "[{}(", m.content),
            NodeKind::Comment(_) => f.write_str("comment"),
            NodeKind::FloatBox(_) => f.write_str("floatatom"),
            NodeKind::SymbolBox(_) => f.write_str("symbolatom"),
            NodeKind::Bang(_) => f.write_str("[bng]"),
            NodeKind::Toggle(_) => f.write_str("[tgl]"),
            NodeKind::NumberBox(_) => f.write_str("[nbx]"),
            NodeKind::VSlider(_) => f.write_str("[vsl]"),
            NodeKind::HSlider(_) => f.write_str("[hsl]"),
            NodeKind::VRadio(_) => f.write_str("[vradio]"),
            NodeKind::HRadio(_) => f.write_str("[hradio]"),
            NodeKind::Canvas(_) => f.write_str("[cnv]"),
            NodeKind::VuMeter(_) => f.write_str("[vu]"),
            NodeKind::Array(a) => write!(f, "array {}", a.name),
            NodeKind::Subpatch(sp) => write!(f, "[pd {}]", sp.name),
        }
    }
}

// ─── Graph ────────────────────────────────────────────────────────────────

/// Summary of how connections use the graph, see
/// [`Graph::connection_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub nodes_with_connections: usize,
    pub max_inlet_used: usize,
    pub max_outlet_used: usize,
    /// Percentage of nodes carrying at least one declared I/O count,
    /// rounded to one decimal.
    pub validation_coverage: f64,
}

#[derive(Debug)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) layout: Box<dyn LayoutStrategy>,
    pub(crate) tag: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_layout(Box::new(RowLayout::new()))
    }

    pub fn with_layout(layout: Box<dyn LayoutStrategy>) -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            layout,
            tag: fresh_tag(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Handle for the node at `index` in the current generation.
    pub fn node_ref(&self, index: usize) -> Option<NodeRef> {
        (index < self.nodes.len()).then_some(NodeRef {
            tag: self.tag,
            index,
        })
    }

    pub fn node(&self, node: NodeRef) -> Result<&Node, GraphError> {
        let idx = self.resolve(node, "referenced")?;
        Ok(&self.nodes[idx])
    }

    pub fn node_mut(&mut self, node: NodeRef) -> Result<&mut Node, GraphError> {
        let idx = self.resolve(node, "referenced")?;
        Ok(&mut self.nodes[idx])
    }

    fn resolve(&self, node: NodeRef, role: &'static str) -> Result<usize, GraphError> {
        if node.tag == self.tag && node.index < self.nodes.len() {
            Ok(node.index)
        } else {
            Err(GraphError::NodeNotFound(role))
        }
    }

    // ─── Construction ─────────────────────────────────────────────────

    /// Append a node, placing it via the layout strategy (hidden nodes
    /// skip placement entirely). I/O counts default per kind: plain
    /// objects consult the class registry, widget kinds carry fixed
    /// counts, sub-graphs and unknown classes stay unset.
    pub fn add_node(&mut self, kind: NodeKind, place: Place) -> NodeRef {
        self.add_node_with_io(kind, place, None, None)
    }

    /// Like [`Graph::add_node`], with explicit I/O counts taking
    /// precedence over the per-kind defaults.
    pub fn add_node_with_io(
        &mut self,
        mut kind: NodeKind,
        place: Place,
        num_inlets: Option<u32>,
        num_outlets: Option<u32>,
    ) -> NodeRef {
        let hidden = matches!(kind, NodeKind::Array(_));
        let was_absolute = place.is_absolute();
        if !hidden {
            let pos = self.layout.compute_position(&self.nodes, &place);
            kind.set_position(pos);
        }
        let (auto_in, auto_out) = default_io(&kind);
        let node = Node {
            kind,
            num_inlets: num_inlets.or(auto_in),
            num_outlets: num_outlets.or(auto_out),
        };
        self.nodes.push(node);
        let index = self.nodes.len() - 1;
        if !hidden {
            self.layout.register(index, &place, was_absolute);
        }
        NodeRef {
            tag: self.tag,
            index,
        }
    }

    /// Add a plain object from its box text (`"osc~ 440"`). The text is
    /// escaped here, so `$`-arguments, semicolons, and commas survive
    /// serialization.
    pub fn add_obj(&mut self, text: &str, place: Place) -> NodeRef {
        self.add_node(NodeKind::Obj(obj_from_text(text)), place)
    }

    /// Add a plain object with explicit I/O counts (for classes the
    /// registry does not know, or variadic ones the caller can pin down).
    pub fn add_obj_with_io(
        &mut self,
        text: &str,
        place: Place,
        num_inlets: Option<u32>,
        num_outlets: Option<u32>,
    ) -> NodeRef {
        self.add_node_with_io(
            NodeKind::Obj(obj_from_text(text)),
            place,
            num_inlets,
            num_outlets,
        )
    }

    /// Add an abstraction reference, inferring its arity from the
    /// top-level inlet/outlet objects of the backing file.
    pub fn add_abstraction(
        &mut self,
        text: &str,
        source_path: impl AsRef<Path>,
        place: Place,
    ) -> Result<NodeRef, PdError> {
        let path = source_path.as_ref();
        let (inlets, outlets) = infer_abstraction_io(path)?;
        Ok(self.add_node_with_io(
            NodeKind::Abstraction {
                obj: obj_from_text(text),
                source_path: Some(path.to_path_buf()),
            },
            place,
            Some(inlets),
            Some(outlets),
        ))
    }

    /// Add a message box. Content is escaped here; it reaches the wire
    /// format verbatim afterwards.
    pub fn add_msg(&mut self, content: &str, place: Place) -> NodeRef {
        self.add_node(
            NodeKind::Msg(MsgBox {
                position: Position::new(0, 0),
                content: escape(content),
            }),
            place,
        )
    }

    pub fn add_comment(&mut self, content: &str, place: Place) -> NodeRef {
        self.add_node(
            NodeKind::Comment(TextComment {
                position: Position::new(0, 0),
                content: content.to_string(),
            }),
            place,
        )
    }

    pub fn add_float(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::FloatBox(AtomBox::float(Position::new(0, 0))), place)
    }

    pub fn add_symbol(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::SymbolBox(AtomBox::symbol(Position::new(0, 0))), place)
    }

    pub fn add_bang(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::Bang(Bng::at(0, 0)), place)
    }

    pub fn add_toggle(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::Toggle(Tgl::at(0, 0)), place)
    }

    pub fn add_number_box(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::NumberBox(Nbx::at(0, 0)), place)
    }

    pub fn add_vslider(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::VSlider(Slider::vertical(0, 0)), place)
    }

    pub fn add_hslider(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::HSlider(Slider::horizontal(0, 0)), place)
    }

    pub fn add_vradio(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::VRadio(Radio::at(0, 0)), place)
    }

    pub fn add_hradio(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::HRadio(Radio::at(0, 0)), place)
    }

    pub fn add_canvas(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::Canvas(Cnv::at(0, 0)), place)
    }

    pub fn add_vu(&mut self, place: Place) -> NodeRef {
        self.add_node(NodeKind::VuMeter(Vu::at(0, 0)), place)
    }

    /// Add a hidden data array. Arrays never occupy canvas space.
    pub fn add_array(&mut self, name: impl Into<String>, size: i32) -> NodeRef {
        self.add_node(NodeKind::Array(ArrayDecl::new(name, size)), Place::default())
    }

    /// Wrap an existing graph as a sub-graph node named `pd <name>`.
    /// I/O counts stay unset; use [`Graph::add_node_with_io`] with a
    /// [`SubpatchNode`] to declare them.
    pub fn add_subpatch(&mut self, name: impl Into<String>, inner: Graph, place: Place) -> NodeRef {
        self.add_node(NodeKind::Subpatch(SubpatchNode::new(name, inner)), place)
    }

    // ─── Linking ──────────────────────────────────────────────────────

    /// Connect `source` outlet 0 (or the handle's outlet) to `sink`
    /// inlet 0.
    pub fn link(&mut self, source: impl Into<Outlet>, sink: NodeRef) -> Result<(), GraphError> {
        self.link_into(source, sink, 0)
    }

    /// Connect to a specific sink inlet. Fails if either handle is not
    /// from this graph generation or an index exceeds a declared count;
    /// nothing is appended on failure.
    pub fn link_into(
        &mut self,
        source: impl Into<Outlet>,
        sink: NodeRef,
        inlet: usize,
    ) -> Result<(), GraphError> {
        let outlet = source.into();
        let src = self.resolve(outlet.node, "source")?;
        let snk = self.resolve(sink, "sink")?;

        if let Some(count) = self.nodes[src].num_outlets {
            if outlet.index as u64 >= count as u64 {
                return Err(GraphError::OutletOutOfRange {
                    index: outlet.index,
                    count,
                });
            }
        }
        if let Some(count) = self.nodes[snk].num_inlets {
            if inlet as u64 >= count as u64 {
                return Err(GraphError::InletOutOfRange {
                    index: inlet,
                    count,
                });
            }
        }

        self.connections.push(Connection {
            source: src,
            outlet: outlet.index,
            sink: snk,
            inlet,
        });
        Ok(())
    }

    // ─── Validation ───────────────────────────────────────────────────

    /// Check every connection against the declared I/O counts of its
    /// endpoints. All violations are collected before failing; nodes with
    /// unset counts are never flagged. With `check_cycles`, cycles are
    /// reported as warnings only — feedback loops are a legal shape.
    pub fn validate_connections(&self, check_cycles: bool) -> Result<(), GraphError> {
        let mut errors = Vec::new();

        for conn in &self.connections {
            let (Some(source), Some(sink)) =
                (self.nodes.get(conn.source), self.nodes.get(conn.sink))
            else {
                continue;
            };
            if let Some(count) = source.num_outlets {
                if conn.outlet as u64 >= count as u64 {
                    errors.push(format!(
                        "Invalid outlet index {} on {source} (has {count} outlets)",
                        conn.outlet
                    ));
                }
            }
            if let Some(count) = sink.num_inlets {
                if conn.inlet as u64 >= count as u64 {
                    errors.push(format!(
                        "Invalid inlet index {} on {sink} (has {count} inlets)",
                        conn.inlet
                    ));
                }
            }
        }

        if check_cycles {
            for cycle in self.detect_cycles() {
                let shown: Vec<String> = cycle
                    .iter()
                    .filter_map(|&i| self.nodes.get(i).map(|n| n.to_string()))
                    .collect();
                log::warn!("cycle detected: {}", shown.join(" -> "));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GraphError::InvalidConnections(errors))
        }
    }

    /// Find every cycle in the connection graph. Each result is a node
    /// index path whose last element repeats the first. One cycle is
    /// reported per closing back-edge; neighbor order is sorted, so
    /// output is deterministic.
    pub fn detect_cycles(&self) -> Vec<Vec<usize>> {
        let n = self.nodes.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for conn in &self.connections {
            if conn.source < n && conn.sink < n {
                adjacency[conn.source].push(conn.sink);
            }
        }
        for targets in &mut adjacency {
            targets.sort_unstable();
            targets.dedup();
        }

        let mut cycles = Vec::new();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut path: Vec<usize> = Vec::new();

        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            on_stack[start] = true;
            path.push(start);
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(&mut (node, ref mut next_idx)) = stack.last_mut() {
                if let Some(&neighbor) = adjacency[node].get(*next_idx) {
                    *next_idx += 1;
                    if !visited[neighbor] {
                        visited[neighbor] = true;
                        on_stack[neighbor] = true;
                        path.push(neighbor);
                        stack.push((neighbor, 0));
                    } else if on_stack[neighbor] {
                        if let Some(pos) = path.iter().position(|&p| p == neighbor) {
                            let mut cycle = path[pos..].to_vec();
                            cycle.push(neighbor);
                            cycles.push(cycle);
                        }
                    }
                } else {
                    on_stack[node] = false;
                    path.pop();
                    stack.pop();
                }
            }
        }
        cycles
    }

    /// Aggregate connection usage counters.
    pub fn connection_stats(&self) -> ConnectionStats {
        if self.connections.is_empty() {
            return ConnectionStats::default();
        }
        let mut connected: std::collections::HashSet<usize> = std::collections::HashSet::new();
        let mut max_inlet = 0;
        let mut max_outlet = 0;
        for conn in &self.connections {
            connected.insert(conn.source);
            connected.insert(conn.sink);
            max_inlet = max_inlet.max(conn.inlet);
            max_outlet = max_outlet.max(conn.outlet);
        }
        let with_counts = self
            .nodes
            .iter()
            .filter(|n| n.num_inlets.is_some() || n.num_outlets.is_some())
            .count();
        let coverage = if self.nodes.is_empty() {
            0.0
        } else {
            with_counts as f64 / self.nodes.len() as f64 * 100.0
        };
        ConnectionStats {
            total_connections: self.connections.len(),
            nodes_with_connections: connected.len(),
            max_inlet_used: max_inlet,
            max_outlet_used: max_outlet,
            validation_coverage: (coverage * 10.0).round() / 10.0,
        }
    }
}

fn obj_from_text(text: &str) -> ObjBox {
    // Box text is escaped on entry, like message content; it reaches the
    // wire format verbatim afterwards.
    let escaped = escape(text);
    let mut parts = escaped.split_whitespace();
    let class_name = parts.next().unwrap_or("").to_string();
    let args: SmallVec<[String; 4]> = parts.map(str::to_string).collect();
    ObjBox {
        position: Position::new(0, 0),
        class_name,
        args,
    }
}

fn default_io(kind: &NodeKind) -> (Option<u32>, Option<u32>) {
    match kind {
        NodeKind::Obj(o) => registry::lookup_str(&o.class_name)
            .map(|spec| (spec.inlets, spec.outlets))
            .unwrap_or((None, None)),
        NodeKind::Abstraction { .. } => (None, None),
        NodeKind::Msg(_) => (Some(2), Some(1)),
        NodeKind::Comment(_) => (Some(0), Some(0)),
        NodeKind::FloatBox(_) | NodeKind::SymbolBox(_) => (Some(1), Some(1)),
        NodeKind::Array(_) => (Some(0), Some(0)),
        NodeKind::Bang(_)
        | NodeKind::Toggle(_)
        | NodeKind::NumberBox(_)
        | NodeKind::VSlider(_)
        | NodeKind::HSlider(_)
        | NodeKind::VRadio(_)
        | NodeKind::HRadio(_)
        | NodeKind::Canvas(_) => (Some(1), Some(1)),
        NodeKind::VuMeter(_) => (Some(2), Some(0)),
        NodeKind::Subpatch(_) => (None, None),
    }
}

/// Parse an abstraction's `.pd` file and count its top-level
/// `inlet`/`inlet~` and `outlet`/`outlet~` objects. Nested sub-canvases
/// are not descended into; their ports belong to them.
pub fn infer_abstraction_io(path: impl AsRef<Path>) -> Result<(u32, u32), PdError> {
    let patch = crate::parser::parse_file(path)?;
    let mut inlets = 0;
    let mut outlets = 0;
    for elem in &patch.elements {
        if let Element::Obj(o) = elem {
            match o.class_name.as_str() {
                "inlet" | "inlet~" => inlets += 1,
                "outlet" | "outlet~" => outlets += 1,
                _ => {}
            }
        }
    }
    Ok((inlets, outlets))
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_pads_semicolons_and_unescape_restores_newline() {
        let escaped = escape("start; stop");
        assert_eq!(escaped, "start \\;  stop");
        assert_eq!(unescape(&escaped), "start\nstop");
    }

    #[test]
    fn escape_guards_dollar_before_digit_only() {
        assert_eq!(escape("$1-value"), "\\$1-value");
        assert_eq!(escape("cost in $ dollars"), "cost in $ dollars");
        assert_eq!(unescape("\\$1-value"), "$1-value");
    }

    #[test]
    fn doubled_backslash_never_feeds_the_next_escape_pair() {
        // The leading pair stays an escaped backslash; the `\$` after it
        // still unescapes on its own.
        assert_eq!(unescape("\\\\\\$1"), "\\\\$1");
        assert_eq!(unescape("a \\\\ \\; b"), "a \\\\\nb");
    }

    #[test]
    fn display_lines_wraps_at_whitespace() {
        let text = "a".repeat(50) + " " + &"b".repeat(30);
        let lines = display_lines(&text);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 50);
        assert_eq!(lines[1].len(), 30);
    }

    #[test]
    fn display_lines_hard_cuts_unbreakable_text() {
        let text = "x".repeat(130);
        let lines = display_lines(&text);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 60);
        assert_eq!(lines[2].len(), 10);
    }

    #[test]
    fn add_obj_fills_io_from_registry() {
        let mut g = Graph::new();
        let osc = g.add_obj("osc~ 440", Place::default());
        let node = g.node(osc).expect("node lookup");
        assert_eq!(node.num_inlets, Some(2));
        assert_eq!(node.num_outlets, Some(1));

        let ext = g.add_obj("someexternal 1 2", Place::default());
        let node = g.node(ext).expect("node lookup");
        assert_eq!(node.num_inlets, None);
        assert_eq!(node.num_outlets, None);
    }

    #[test]
    fn add_obj_escapes_reserved_characters() {
        let mut g = Graph::new();
        let float = g.add_obj("f $1", Place::default());
        let NodeKind::Obj(o) = &g.node(float).expect("node lookup").kind else {
            panic!("expected an object box");
        };
        assert_eq!(o.text(), "f \\$1");

        let list = g.add_obj("list 1, 2", Place::default());
        let NodeKind::Obj(o) = &g.node(list).expect("node lookup").kind else {
            panic!("expected an object box");
        };
        assert_eq!(o.text(), "list 1 \\, 2");
    }

    #[test]
    fn link_checks_declared_bounds() {
        let mut g = Graph::new();
        let osc = g.add_obj("osc~ 440", Place::default());
        let dac = g.add_obj("dac~", Place::default());

        g.link(osc, dac).expect("valid link");
        g.link_into(osc, dac, 1).expect("second inlet");
        assert_eq!(g.connection_count(), 2);

        let err = g.link(osc.outlet(3), dac).unwrap_err();
        assert!(matches!(err, GraphError::OutletOutOfRange { index: 3, count: 1 }));
        let err = g.link_into(osc, dac, 5).unwrap_err();
        assert!(matches!(err, GraphError::InletOutOfRange { index: 5, count: 2 }));
        // Failed links append nothing
        assert_eq!(g.connection_count(), 2);
    }

    #[test]
    fn cross_graph_links_are_rejected() {
        let mut a = Graph::new();
        let mut b = Graph::new();
        let osc = a.add_obj("osc~", Place::default());
        let dac = b.add_obj("dac~", Place::default());
        let err = b.link(osc, dac).unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound("source")));
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut g = Graph::new();
        let a = g.add_obj_with_io("thing", Place::default(), Some(1), Some(1));
        let b = g.add_obj_with_io("other", Place::default(), Some(1), Some(1));
        g.link(a, b).expect("valid link");
        // Bypass link's checks to simulate a graph built from raw indices.
        g.connections.push(Connection { source: 0, outlet: 4, sink: 1, inlet: 0 });
        g.connections.push(Connection { source: 0, outlet: 0, sink: 1, inlet: 7 });

        let err = g.validate_connections(false).unwrap_err();
        let GraphError::InvalidConnections(errors) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("outlet index 4"));
        assert!(errors[1].contains("inlet index 7"));
    }

    #[test]
    fn two_node_feedback_is_detected() {
        let mut g = Graph::new();
        let a = g.add_obj_with_io("delread~ d", Place::default(), Some(1), Some(1));
        let b = g.add_obj_with_io("delwrite~ d", Place::default(), Some(1), Some(1));
        g.link(a, b).expect("link");
        g.link(b, a).expect("link");
        let cycles = g.detect_cycles();
        assert!(!cycles.is_empty());
        assert!(cycles[0].contains(&0) && cycles[0].contains(&1));
    }

    #[test]
    fn self_loop_counts_as_cycle() {
        let mut g = Graph::new();
        let f = g.add_obj("float", Place::default());
        g.link(f, f).expect("self link");
        assert_eq!(g.detect_cycles(), vec![vec![0, 0]]);
    }

    #[test]
    fn stats_cover_usage_and_declared_counts() {
        let mut g = Graph::new();
        let osc = g.add_obj("osc~ 440", Place::default());
        let dac = g.add_obj("dac~", Place::default());
        g.add_obj("mystery", Place::default());
        g.link(osc, dac).expect("link");
        g.link_into(osc, dac, 1).expect("link");

        let stats = g.connection_stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.nodes_with_connections, 2);
        assert_eq!(stats.max_inlet_used, 1);
        assert_eq!(stats.max_outlet_used, 0);
        assert_eq!(stats.validation_coverage, 66.7);
    }

    #[test]
    fn empty_graph_stats_are_zero() {
        let g = Graph::new();
        assert_eq!(g.connection_stats(), ConnectionStats::default());
    }

    #[test]
    fn obj_dimensions_grow_with_text() {
        let mut g = Graph::new();
        let short = g.add_obj("f", Place::default());
        let long = g.add_obj("some-very-long-object-name 1 2 3", Place::default());
        let (w1, h1) = g.node(short).expect("node").dimensions();
        let (w2, _) = g.node(long).expect("node").dimensions();
        assert_eq!((w1, h1), (50, 25));
        assert!(w2 > w1);
    }

    #[test]
    fn arrays_are_hidden_and_unplaced() {
        let mut g = Graph::new();
        let arr = g.add_array("buf", 1024);
        let node = g.node(arr).expect("node");
        assert!(node.is_hidden());
        assert_eq!(node.position(), Position::new(-1, -1));
        assert_eq!(node.num_inlets, Some(0));
        assert_eq!(node.num_outlets, Some(0));
    }
}
