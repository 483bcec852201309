//! Tree model for parsed `.pd` patches.
//!
//! A [`Patch`] is a root canvas plus an ordered list of [`Element`]s, some of
//! which are nested [`Subpatch`]es. The model stores exactly what the file
//! says: text fields keep their escaped wire form, connection elements keep
//! their raw indices. Transformations produce new trees; parsing and
//! emitting live in [`crate::parser`] and [`crate::emitter`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ─── Geometry ─────────────────────────────────────────────────────────────

/// Canvas-local integer coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Properties of a canvas open line (`#N canvas …`).
///
/// A root canvas carries a trailing `font_size`; a named sub-canvas carries
/// `name` and `open_on_load` instead. `name.is_some()` is what marks a
/// sub-canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasProps {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub font_size: i32,
    pub name: Option<String>,
    pub open_on_load: i32,
}

impl Default for CanvasProps {
    fn default() -> Self {
        Self {
            x: 0,
            y: 50,
            width: 1000,
            height: 600,
            font_size: 10,
            name: None,
            open_on_load: 0,
        }
    }
}

impl CanvasProps {
    /// Canvas block of a nested sub-patch, as written by the serializer.
    pub fn subpatch(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            font_size: 10,
            name: Some("(subpatch)".to_string()),
            open_on_load: 0,
        }
    }
}

// ─── Plain elements ───────────────────────────────────────────────────────

/// Generic object box (`#X obj x y class args…`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjBox {
    pub position: Position,
    pub class_name: String,
    pub args: SmallVec<[String; 4]>,
}

impl ObjBox {
    pub fn new(position: Position, class_name: impl Into<String>) -> Self {
        Self {
            position,
            class_name: class_name.into(),
            args: SmallVec::new(),
        }
    }

    /// Class name and arguments joined back into object text.
    pub fn text(&self) -> String {
        if self.args.is_empty() {
            self.class_name.clone()
        } else {
            format!("{} {}", self.class_name, self.args.join(" "))
        }
    }
}

/// Message box (`#X msg`). Content keeps its escaped wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgBox {
    pub position: Position,
    pub content: String,
}

/// Number or symbol atom (`#X floatatom` / `#X symbolatom`).
///
/// Both kinds share one field set; they differ only in keyword and default
/// width (5 vs 10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomBox {
    pub position: Position,
    pub width: i32,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub label_pos: i32,
    pub label: String,
    pub receive: String,
    pub send: String,
}

impl AtomBox {
    /// Float atom with Pd defaults.
    pub fn float(position: Position) -> Self {
        Self {
            position,
            width: 5,
            lower_limit: 0.0,
            upper_limit: 0.0,
            label_pos: 0,
            label: "-".to_string(),
            receive: "-".to_string(),
            send: "-".to_string(),
        }
    }

    /// Symbol atom with Pd defaults.
    pub fn symbol(position: Position) -> Self {
        Self {
            width: 10,
            ..Self::float(position)
        }
    }
}

/// Comment (`#X text`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextComment {
    pub position: Position,
    pub content: String,
}

/// Array declaration (`#X array name size dtype save_flag`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDecl {
    pub name: String,
    pub size: i32,
    pub dtype: String,
    pub save_flag: i32,
}

impl ArrayDecl {
    pub fn new(name: impl Into<String>, size: i32) -> Self {
        Self {
            name: name.into(),
            size,
            dtype: "float".to_string(),
            save_flag: 0,
        }
    }
}

/// Patch cord (`#X connect source outlet sink inlet`).
///
/// Indices are canvas-local, counting non-connection, non-directive elements
/// in declaration order. Out-of-range values survive parsing; bounds are a
/// validation concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect {
    pub source: i32,
    pub outlet: i32,
    pub sink: i32,
    pub inlet: i32,
}

/// Graph-on-parent directive (`#X coords`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x_from: f64,
    pub y_from: f64,
    pub x_to: f64,
    pub y_to: f64,
    pub width: i32,
    pub height: i32,
    pub graph_on_parent: i32,
    pub hide_name: i32,
    pub x_margin: i32,
    pub y_margin: i32,
}

/// Sub-canvas close directive (`#X restore x y pd name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restore {
    pub position: Position,
    pub name: String,
}

// ─── IEM GUI widgets ──────────────────────────────────────────────────────

/// Standard IEM colors.
pub const IEM_BG_COLOR: i32 = -262144;
pub const IEM_FG_COLOR: i32 = -1;
pub const IEM_LABEL_COLOR: i32 = -1;

/// Bang button (`bng`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bng {
    pub position: Position,
    pub size: i32,
    pub hold: i32,
    pub interrupt: i32,
    pub init: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub fg_color: i32,
    pub label_color: i32,
}

impl Bng {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            size: 15,
            hold: 250,
            interrupt: 50,
            init: 0,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 17,
            label_y: 7,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            fg_color: IEM_FG_COLOR,
            label_color: IEM_LABEL_COLOR,
        }
    }
}

/// Toggle (`tgl`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tgl {
    pub position: Position,
    pub size: i32,
    pub init: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub fg_color: i32,
    pub label_color: i32,
    pub init_value: i32,
    pub default_value: i32,
}

impl Tgl {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            size: 15,
            init: 0,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 17,
            label_y: 7,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            fg_color: IEM_FG_COLOR,
            label_color: IEM_LABEL_COLOR,
            init_value: 0,
            default_value: 1,
        }
    }
}

/// IEM number box (`nbx`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nbx {
    pub position: Position,
    pub width: i32,
    pub height: i32,
    pub min_val: f64,
    pub max_val: f64,
    pub log_flag: i32,
    pub init: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub fg_color: i32,
    pub label_color: i32,
    pub init_value: f64,
    pub log_height: i32,
}

impl Nbx {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            width: 5,
            height: 14,
            min_val: -1e37,
            max_val: 1e37,
            log_flag: 0,
            init: 0,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 0,
            label_y: -8,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            fg_color: IEM_FG_COLOR,
            label_color: IEM_LABEL_COLOR,
            init_value: 0.0,
            log_height: 256,
        }
    }
}

/// Slider (`vsl` / `hsl`) — one field set, two keywords with different
/// default geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    pub position: Position,
    pub width: i32,
    pub height: i32,
    pub min_val: f64,
    pub max_val: f64,
    pub log_flag: i32,
    pub init: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub fg_color: i32,
    pub label_color: i32,
    pub init_value: f64,
    pub steady: i32,
}

impl Slider {
    /// Vertical slider defaults.
    pub fn vertical(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            width: 15,
            height: 128,
            min_val: 0.0,
            max_val: 127.0,
            log_flag: 0,
            init: 0,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 0,
            label_y: -9,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            fg_color: IEM_FG_COLOR,
            label_color: IEM_LABEL_COLOR,
            init_value: 0.0,
            steady: 1,
        }
    }

    /// Horizontal slider defaults.
    pub fn horizontal(x: i32, y: i32) -> Self {
        Self {
            width: 128,
            height: 15,
            label_x: -2,
            label_y: -8,
            ..Self::vertical(x, y)
        }
    }
}

/// Radio button row (`vradio` / `hradio`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radio {
    pub position: Position,
    pub size: i32,
    pub new_old: i32,
    pub init: i32,
    pub number: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub fg_color: i32,
    pub label_color: i32,
    pub init_value: i32,
}

impl Radio {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            size: 15,
            new_old: 0,
            init: 0,
            number: 8,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 0,
            label_y: -8,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            fg_color: IEM_FG_COLOR,
            label_color: IEM_LABEL_COLOR,
            init_value: 0,
        }
    }
}

/// IEM canvas rectangle (`cnv`) — decorative only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cnv {
    pub position: Position,
    pub size: i32,
    pub width: i32,
    pub height: i32,
    pub send: String,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub label_color: i32,
}

impl Cnv {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            size: 15,
            width: 100,
            height: 60,
            send: "empty".to_string(),
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: 20,
            label_y: 12,
            font: 0,
            font_size: 14,
            bg_color: -233017,
            label_color: IEM_LABEL_COLOR,
        }
    }
}

/// VU meter (`vu`) — RMS on inlet 0, peak on inlet 1, no outlets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vu {
    pub position: Position,
    pub width: i32,
    pub height: i32,
    pub receive: String,
    pub label: String,
    pub label_x: i32,
    pub label_y: i32,
    pub font: i32,
    pub font_size: i32,
    pub bg_color: i32,
    pub label_color: i32,
    pub scale: i32,
}

impl Vu {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            width: 15,
            height: 120,
            receive: "empty".to_string(),
            label: "empty".to_string(),
            label_x: -1,
            label_y: -8,
            font: 0,
            font_size: 10,
            bg_color: IEM_BG_COLOR,
            label_color: IEM_LABEL_COLOR,
            scale: 1,
        }
    }
}

// ─── Element and containers ───────────────────────────────────────────────

/// One statement's worth of patch content.
///
/// Unknown object keywords stay in [`Element::Obj`] with their raw argument
/// tokens, so unrecognized externals round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Obj(ObjBox),
    Msg(MsgBox),
    FloatAtom(AtomBox),
    SymbolAtom(AtomBox),
    Text(TextComment),
    Array(ArrayDecl),
    Connect(Connect),
    Coords(Coords),
    Bng(Bng),
    Tgl(Tgl),
    Nbx(Nbx),
    Vsl(Slider),
    Hsl(Slider),
    Vradio(Radio),
    Hradio(Radio),
    Cnv(Cnv),
    Vu(Vu),
    Subpatch(Subpatch),
}

impl Element {
    /// Whether this element occupies a connection-index slot.
    /// Everything except patch cords and the coords directive does.
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Element::Connect(_) | Element::Coords(_))
    }
}

/// A nested canvas: open line, body, and the restore line that closes it.
/// `restore` is absent only for truncated input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subpatch {
    pub canvas: CanvasProps,
    pub elements: Vec<Element>,
    pub restore: Option<Restore>,
}

/// A complete parsed patch: root canvas plus its elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub canvas: CanvasProps,
    pub elements: Vec<Element>,
}

impl Patch {
    pub fn new(canvas: CanvasProps) -> Self {
        Self {
            canvas,
            elements: Vec::new(),
        }
    }

    /// Connectable boxes, in declaration order. Excludes patch cords, the
    /// coords directive, comments, and arrays.
    pub fn objects(&self) -> Vec<&Element> {
        self.elements
            .iter()
            .filter(|e| {
                e.is_addressable() && !matches!(e, Element::Text(_) | Element::Array(_))
            })
            .collect()
    }

    /// All patch cords at this level.
    pub fn connections(&self) -> Vec<&Connect> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                Element::Connect(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Rewrite every element through `f`, recursing into sub-canvases first.
    /// Returning `None` removes the element. Produces a new tree.
    pub fn transform(&self, f: &mut impl FnMut(Element) -> Option<Element>) -> Patch {
        let mut out = Vec::with_capacity(self.elements.len());
        for elem in &self.elements {
            let candidate = match elem {
                Element::Subpatch(sp) => {
                    let inner = Patch {
                        canvas: sp.canvas.clone(),
                        elements: sp.elements.clone(),
                    }
                    .transform(f);
                    Element::Subpatch(Subpatch {
                        canvas: sp.canvas.clone(),
                        elements: inner.elements,
                        restore: sp.restore.clone(),
                    })
                }
                other => other.clone(),
            };
            if let Some(kept) = f(candidate) {
                out.push(kept);
            }
        }
        Patch {
            canvas: self.canvas.clone(),
            elements: out,
        }
    }

    /// All elements matching `pred`, searching sub-canvases recursively.
    pub fn find_elements<'a>(&'a self, pred: &impl Fn(&Element) -> bool) -> Vec<&'a Element> {
        collect_matching(&self.elements, pred)
    }

    /// Rename a send/receive symbol everywhere it appears: atom label,
    /// receive, and send fields, and the first argument of the
    /// send/receive object family.
    pub fn rename_sends_receives(&self, old_name: &str, new_name: &str) -> Patch {
        self.transform(&mut |elem| {
            Some(match elem {
                Element::FloatAtom(mut atom) => {
                    rename_atom(&mut atom, old_name, new_name);
                    Element::FloatAtom(atom)
                }
                Element::SymbolAtom(mut atom) => {
                    rename_atom(&mut atom, old_name, new_name);
                    Element::SymbolAtom(atom)
                }
                Element::Obj(mut obj) => {
                    let is_wireless = matches!(
                        obj.class_name.as_str(),
                        "send" | "s" | "receive" | "r" | "send~" | "s~" | "receive~" | "r~"
                    );
                    if is_wireless && obj.args.first().is_some_and(|a| a == old_name) {
                        obj.args[0] = new_name.to_string();
                    }
                    Element::Obj(obj)
                }
                other => other,
            })
        })
    }
}

fn rename_atom(atom: &mut AtomBox, old_name: &str, new_name: &str) {
    for field in [&mut atom.label, &mut atom.receive, &mut atom.send] {
        if field == old_name {
            *field = new_name.to_string();
        }
    }
}

fn collect_matching<'a>(
    elements: &'a [Element],
    pred: &impl Fn(&Element) -> bool,
) -> Vec<&'a Element> {
    let mut results = Vec::new();
    for elem in elements {
        if pred(elem) {
            results.push(elem);
        }
        if let Element::Subpatch(sp) = elem {
            results.extend(collect_matching(&sp.elements, pred));
        }
    }
    results
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(x: i32, y: i32, class: &str, args: &[&str]) -> Element {
        let mut o = ObjBox::new(Position::new(x, y), class);
        o.args = args.iter().map(|a| a.to_string()).collect();
        Element::Obj(o)
    }

    #[test]
    fn obj_text_joins_class_and_args() {
        let Element::Obj(o) = obj(0, 0, "osc~", &["440"]) else {
            unreachable!()
        };
        assert_eq!(o.text(), "osc~ 440");
        let bare = ObjBox::new(Position::new(0, 0), "dac~");
        assert_eq!(bare.text(), "dac~");
    }

    #[test]
    fn objects_skips_cords_comments_arrays() {
        let patch = Patch {
            canvas: CanvasProps::default(),
            elements: vec![
                obj(0, 0, "osc~", &["440"]),
                Element::Text(TextComment {
                    position: Position::new(0, 30),
                    content: "hello".into(),
                }),
                Element::Array(ArrayDecl::new("buf", 64)),
                Element::Connect(Connect {
                    source: 0,
                    outlet: 0,
                    sink: 1,
                    inlet: 0,
                }),
            ],
        };
        assert_eq!(patch.objects().len(), 1);
        assert_eq!(patch.connections().len(), 1);
    }

    #[test]
    fn transform_removes_on_none() {
        let patch = Patch {
            canvas: CanvasProps::default(),
            elements: vec![obj(0, 0, "print", &[]), obj(0, 25, "dac~", &[])],
        };
        let pruned = patch.transform(&mut |e| match &e {
            Element::Obj(o) if o.class_name == "print" => None,
            _ => Some(e),
        });
        assert_eq!(pruned.elements.len(), 1);
    }

    #[test]
    fn transform_recurses_into_subpatches() {
        let inner = vec![obj(10, 10, "inlet", &[])];
        let patch = Patch {
            canvas: CanvasProps::default(),
            elements: vec![Element::Subpatch(Subpatch {
                canvas: CanvasProps::subpatch(300, 180),
                elements: inner,
                restore: Some(Restore {
                    position: Position::new(50, 50),
                    name: "gain".into(),
                }),
            })],
        };
        let renamed = patch.transform(&mut |e| match e {
            Element::Obj(mut o) => {
                o.class_name = "inlet~".into();
                Some(Element::Obj(o))
            }
            other => Some(other),
        });
        let Element::Subpatch(sp) = &renamed.elements[0] else {
            panic!("subpatch lost");
        };
        let Element::Obj(o) = &sp.elements[0] else {
            panic!("inner obj lost");
        };
        assert_eq!(o.class_name, "inlet~");
    }

    #[test]
    fn rename_sends_receives_hits_atoms_and_objects() {
        let patch = Patch {
            canvas: CanvasProps::default(),
            elements: vec![
                Element::FloatAtom(AtomBox {
                    receive: "freq".into(),
                    ..AtomBox::float(Position::new(0, 0))
                }),
                obj(0, 25, "r", &["freq"]),
                obj(0, 50, "send", &["other"]),
            ],
        };
        let renamed = patch.rename_sends_receives("freq", "pitch");
        let Element::FloatAtom(atom) = &renamed.elements[0] else {
            panic!()
        };
        assert_eq!(atom.receive, "pitch");
        let Element::Obj(recv) = &renamed.elements[1] else {
            panic!()
        };
        assert_eq!(recv.args[0], "pitch");
        let Element::Obj(send) = &renamed.elements[2] else {
            panic!()
        };
        assert_eq!(send.args[0], "other");
    }

    #[test]
    fn find_elements_searches_nested_canvases() {
        let patch = Patch {
            canvas: CanvasProps::default(),
            elements: vec![
                obj(0, 0, "osc~", &["440"]),
                Element::Subpatch(Subpatch {
                    canvas: CanvasProps::subpatch(300, 180),
                    elements: vec![obj(10, 10, "osc~", &["220"])],
                    restore: None,
                }),
            ],
        };
        let oscs = patch.find_elements(&|e| matches!(e, Element::Obj(o) if o.class_name == "osc~"));
        assert_eq!(oscs.len(), 2);
    }
}
