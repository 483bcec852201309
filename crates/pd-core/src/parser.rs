//! Parser for `.pd` patch text → [`Patch`].
//!
//! Built on `winnow` 0.7. The format is statement-oriented: statements end
//! at an unescaped `;`, tokens split on spaces and tabs, and `\x` escape
//! pairs travel as opaque two-character units through both layers. Nested
//! `#N canvas` … `#X restore` pairs become [`Element::Subpatch`] values via
//! an explicit stack.
//!
//! Error policy: a statement with too few tokens for its keyword is fatal;
//! a numeric field that fails to parse falls back to that field's default.

use crate::error::{ParseError, PdError};
use crate::model::*;
use std::path::Path;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::any;

// ─── Lexical layer ────────────────────────────────────────────────────────

/// One raw statement: everything up to and including the next unescaped
/// `;`, or the remaining input if none follows. Escape pairs are copied
/// as units so `\;` never terminates a statement.
fn statement(input: &mut &str) -> ModalResult<String> {
    if input.is_empty() {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let mut out = String::new();
    while !input.is_empty() {
        let c = any.parse_next(input)?;
        if c == '\\' && !input.is_empty() {
            out.push(c);
            out.push(any.parse_next(input)?);
        } else {
            out.push(c);
            if c == ';' {
                break;
            }
        }
    }
    Ok(out)
}

/// One token: skips leading separators, then accumulates until whitespace
/// or a statement terminator. Statements may span lines, so newlines
/// separate tokens too. Escape pairs are opaque here as well.
fn token(input: &mut &str) -> ModalResult<String> {
    while input.starts_with([' ', '\t', '\n', ';']) {
        *input = &input[1..];
    }
    if input.is_empty() {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let mut out = String::new();
    while !input.is_empty() {
        let c = any.parse_next(input)?;
        if c == '\\' && !input.is_empty() {
            out.push(c);
            out.push(any.parse_next(input)?);
        } else if c == ' ' || c == '\t' || c == '\n' || c == ';' {
            break;
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Normalize line endings and splice line continuations (`\` + newline).
fn preprocess(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\\\n", "")
}

/// Split preprocessed content into trimmed, non-empty statements.
/// Trailing content without a terminator is kept as a final statement.
pub fn split_statements(content: &str) -> Vec<String> {
    let mut rest = content;
    let mut statements = Vec::new();
    while let Ok(stmt) = statement.parse_next(&mut rest) {
        let trimmed = stmt.trim();
        if !trimmed.is_empty() {
            statements.push(trimmed.to_string());
        }
    }
    statements
}

/// Tokenize one statement. The trailing `;` is dropped; a `;` in the middle
/// ends its token and scanning continues.
pub fn tokenize(stmt: &str) -> Vec<String> {
    let mut rest = stmt;
    let mut tokens = Vec::new();
    while let Ok(tok) = token.parse_next(&mut rest) {
        if !tok.is_empty() {
            tokens.push(tok);
        }
    }
    tokens
}

// ─── Field helpers ────────────────────────────────────────────────────────

fn field_i32(tokens: &[String], idx: usize, default: i32) -> i32 {
    tokens
        .get(idx)
        .and_then(|t| t.parse().ok())
        .unwrap_or(default)
}

fn field_f64(tokens: &[String], idx: usize, default: f64) -> f64 {
    tokens
        .get(idx)
        .and_then(|t| t.parse().ok())
        .unwrap_or(default)
}

fn field_str(tokens: &[String], idx: usize, default: &str) -> String {
    tokens
        .get(idx)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn malformed(kind: &'static str, tokens: &[String]) -> ParseError {
    ParseError::Malformed {
        kind,
        stmt: tokens.join(" "),
    }
}

fn position(tokens: &[String]) -> Position {
    Position::new(field_i32(tokens, 2, 0), field_i32(tokens, 3, 0))
}

// ─── Statement parsers ────────────────────────────────────────────────────

/// `#N canvas x y width height [name open_on_load | font_size]`
///
/// The open line is ambiguous: a root canvas carries an optional trailing
/// font size, a sub-canvas carries a name and open-on-load flag. Eight or
/// more tokens means sub-canvas; fewer means root.
fn parse_canvas(tokens: &[String]) -> Result<CanvasProps, ParseError> {
    if tokens.len() < 6 {
        return Err(malformed("canvas", tokens));
    }
    let x = field_i32(tokens, 2, 0);
    let y = field_i32(tokens, 3, 0);
    let width = field_i32(tokens, 4, 0);
    let height = field_i32(tokens, 5, 0);

    if tokens.len() >= 8 {
        Ok(CanvasProps {
            x,
            y,
            width,
            height,
            font_size: 10,
            name: Some(tokens[6].clone()),
            open_on_load: field_i32(tokens, 7, 0),
        })
    } else {
        Ok(CanvasProps {
            x,
            y,
            width,
            height,
            font_size: field_i32(tokens, 6, 10),
            name: None,
            open_on_load: 0,
        })
    }
}

/// `#X obj x y class args…`, with special cases for the IEM GUI classes.
/// A GUI keyword with too few arguments parses as a plain object instead.
fn parse_obj(tokens: &[String]) -> Result<Element, ParseError> {
    if tokens.len() < 5 {
        return Err(malformed("obj", tokens));
    }
    let pos = position(tokens);
    let class_name = tokens[4].as_str();
    let args = &tokens[5..];

    let elem = match class_name {
        "bng" if args.len() >= 14 => Element::Bng(Bng {
            position: pos,
            size: field_i32(args, 0, 15),
            hold: field_i32(args, 1, 250),
            interrupt: field_i32(args, 2, 50),
            init: field_i32(args, 3, 0),
            send: field_str(args, 4, "empty"),
            receive: field_str(args, 5, "empty"),
            label: field_str(args, 6, "empty"),
            label_x: field_i32(args, 7, 17),
            label_y: field_i32(args, 8, 7),
            font: field_i32(args, 9, 0),
            font_size: field_i32(args, 10, 10),
            bg_color: field_i32(args, 11, IEM_BG_COLOR),
            fg_color: field_i32(args, 12, IEM_FG_COLOR),
            label_color: field_i32(args, 13, IEM_LABEL_COLOR),
        }),
        "tgl" if args.len() >= 15 => Element::Tgl(Tgl {
            position: pos,
            size: field_i32(args, 0, 15),
            init: field_i32(args, 1, 0),
            send: field_str(args, 2, "empty"),
            receive: field_str(args, 3, "empty"),
            label: field_str(args, 4, "empty"),
            label_x: field_i32(args, 5, 17),
            label_y: field_i32(args, 6, 7),
            font: field_i32(args, 7, 0),
            font_size: field_i32(args, 8, 10),
            bg_color: field_i32(args, 9, IEM_BG_COLOR),
            fg_color: field_i32(args, 10, IEM_FG_COLOR),
            label_color: field_i32(args, 11, IEM_LABEL_COLOR),
            init_value: field_i32(args, 12, 0),
            default_value: field_i32(args, 13, 0),
        }),
        "nbx" if args.len() >= 18 => Element::Nbx(Nbx {
            position: pos,
            width: field_i32(args, 0, 5),
            height: field_i32(args, 1, 14),
            min_val: field_f64(args, 2, -1e37),
            max_val: field_f64(args, 3, 1e37),
            log_flag: field_i32(args, 4, 0),
            init: field_i32(args, 5, 0),
            send: field_str(args, 6, "empty"),
            receive: field_str(args, 7, "empty"),
            label: field_str(args, 8, "empty"),
            label_x: field_i32(args, 9, 0),
            label_y: field_i32(args, 10, -8),
            font: field_i32(args, 11, 0),
            font_size: field_i32(args, 12, 10),
            bg_color: field_i32(args, 13, IEM_BG_COLOR),
            fg_color: field_i32(args, 14, IEM_FG_COLOR),
            label_color: field_i32(args, 15, IEM_LABEL_COLOR),
            init_value: field_f64(args, 16, 0.0),
            log_height: field_i32(args, 17, 256),
        }),
        "vsl" if args.len() >= 18 => Element::Vsl(parse_slider(pos, args, true)),
        "hsl" if args.len() >= 18 => Element::Hsl(parse_slider(pos, args, false)),
        "vradio" if args.len() >= 15 => Element::Vradio(parse_radio(pos, args)),
        "hradio" if args.len() >= 15 => Element::Hradio(parse_radio(pos, args)),
        "cnv" if args.len() >= 13 => Element::Cnv(Cnv {
            position: pos,
            size: field_i32(args, 0, 15),
            width: field_i32(args, 1, 100),
            height: field_i32(args, 2, 60),
            send: field_str(args, 3, "empty"),
            receive: field_str(args, 4, "empty"),
            label: field_str(args, 5, "empty"),
            label_x: field_i32(args, 6, 20),
            label_y: field_i32(args, 7, 12),
            font: field_i32(args, 8, 0),
            font_size: field_i32(args, 9, 14),
            bg_color: field_i32(args, 10, -233017),
            label_color: field_i32(args, 11, IEM_LABEL_COLOR),
        }),
        "vu" if args.len() >= 12 => Element::Vu(Vu {
            position: pos,
            width: field_i32(args, 0, 15),
            height: field_i32(args, 1, 120),
            receive: field_str(args, 2, "empty"),
            label: field_str(args, 3, "empty"),
            label_x: field_i32(args, 4, -1),
            label_y: field_i32(args, 5, -8),
            font: field_i32(args, 6, 0),
            font_size: field_i32(args, 7, 10),
            bg_color: field_i32(args, 8, IEM_BG_COLOR),
            label_color: field_i32(args, 9, IEM_LABEL_COLOR),
            scale: field_i32(args, 10, 1),
        }),
        _ => Element::Obj(ObjBox {
            position: pos,
            class_name: class_name.to_string(),
            args: args.iter().cloned().collect(),
        }),
    };
    Ok(elem)
}

fn parse_slider(pos: Position, args: &[String], vertical: bool) -> Slider {
    let (dw, dh, dlx, dly) = if vertical {
        (15, 128, 0, -9)
    } else {
        (128, 15, -2, -8)
    };
    Slider {
        position: pos,
        width: field_i32(args, 0, dw),
        height: field_i32(args, 1, dh),
        min_val: field_f64(args, 2, 0.0),
        max_val: field_f64(args, 3, 127.0),
        log_flag: field_i32(args, 4, 0),
        init: field_i32(args, 5, 0),
        send: field_str(args, 6, "empty"),
        receive: field_str(args, 7, "empty"),
        label: field_str(args, 8, "empty"),
        label_x: field_i32(args, 9, dlx),
        label_y: field_i32(args, 10, dly),
        font: field_i32(args, 11, 0),
        font_size: field_i32(args, 12, 10),
        bg_color: field_i32(args, 13, IEM_BG_COLOR),
        fg_color: field_i32(args, 14, IEM_FG_COLOR),
        label_color: field_i32(args, 15, IEM_LABEL_COLOR),
        init_value: field_f64(args, 16, 0.0),
        steady: field_i32(args, 17, 1),
    }
}

fn parse_radio(pos: Position, args: &[String]) -> Radio {
    Radio {
        position: pos,
        size: field_i32(args, 0, 15),
        new_old: field_i32(args, 1, 0),
        init: field_i32(args, 2, 0),
        number: field_i32(args, 3, 8),
        send: field_str(args, 4, "empty"),
        receive: field_str(args, 5, "empty"),
        label: field_str(args, 6, "empty"),
        label_x: field_i32(args, 7, 0),
        label_y: field_i32(args, 8, -8),
        font: field_i32(args, 9, 0),
        font_size: field_i32(args, 10, 10),
        bg_color: field_i32(args, 11, IEM_BG_COLOR),
        fg_color: field_i32(args, 12, IEM_FG_COLOR),
        label_color: field_i32(args, 13, IEM_LABEL_COLOR),
        init_value: field_i32(args, 14, 0),
    }
}

fn parse_msg(tokens: &[String]) -> Result<MsgBox, ParseError> {
    if tokens.len() < 4 {
        return Err(malformed("msg", tokens));
    }
    Ok(MsgBox {
        position: position(tokens),
        content: tokens[4..].join(" "),
    })
}

fn parse_atom(tokens: &[String], kind: &'static str, default_width: i32) -> Result<AtomBox, ParseError> {
    if tokens.len() < 4 {
        return Err(malformed(kind, tokens));
    }
    Ok(AtomBox {
        position: position(tokens),
        width: field_i32(tokens, 4, default_width),
        lower_limit: field_f64(tokens, 5, 0.0),
        upper_limit: field_f64(tokens, 6, 0.0),
        label_pos: field_i32(tokens, 7, 0),
        label: field_str(tokens, 8, "-"),
        receive: field_str(tokens, 9, "-"),
        send: field_str(tokens, 10, "-"),
    })
}

fn parse_text(tokens: &[String]) -> Result<TextComment, ParseError> {
    if tokens.len() < 4 {
        return Err(malformed("text", tokens));
    }
    Ok(TextComment {
        position: position(tokens),
        content: tokens[4..].join(" "),
    })
}

fn parse_array(tokens: &[String]) -> Result<ArrayDecl, ParseError> {
    if tokens.len() < 5 {
        return Err(malformed("array", tokens));
    }
    Ok(ArrayDecl {
        name: tokens[2].clone(),
        size: field_i32(tokens, 3, 0),
        dtype: field_str(tokens, 4, "float"),
        save_flag: field_i32(tokens, 5, 0),
    })
}

fn parse_connect(tokens: &[String]) -> Result<Connect, ParseError> {
    if tokens.len() < 6 {
        return Err(malformed("connect", tokens));
    }
    Ok(Connect {
        source: field_i32(tokens, 2, 0),
        outlet: field_i32(tokens, 3, 0),
        sink: field_i32(tokens, 4, 0),
        inlet: field_i32(tokens, 5, 0),
    })
}

fn parse_coords(tokens: &[String]) -> Result<Coords, ParseError> {
    if tokens.len() < 9 {
        return Err(malformed("coords", tokens));
    }
    Ok(Coords {
        x_from: field_f64(tokens, 2, 0.0),
        y_from: field_f64(tokens, 3, 0.0),
        x_to: field_f64(tokens, 4, 0.0),
        y_to: field_f64(tokens, 5, 0.0),
        width: field_i32(tokens, 6, 0),
        height: field_i32(tokens, 7, 0),
        graph_on_parent: field_i32(tokens, 8, 1),
        hide_name: field_i32(tokens, 9, 0),
        x_margin: field_i32(tokens, 10, 0),
        y_margin: field_i32(tokens, 11, 0),
    })
}

/// `#X restore x y pd name` — the `pd` keyword token is not stored.
fn parse_restore(tokens: &[String]) -> Result<Restore, ParseError> {
    if tokens.len() < 6 {
        return Err(malformed("restore", tokens));
    }
    Ok(Restore {
        position: position(tokens),
        name: tokens[5..].join(" "),
    })
}

// ─── Patch assembly ───────────────────────────────────────────────────────

/// Parse complete `.pd` patch text into a [`Patch`].
///
/// Sub-canvases are matched with their `#X restore` via an explicit stack.
/// If input ends with canvases still open, the innermost open canvas
/// becomes the root and the unclosed outer levels are dropped — truncated
/// files degrade instead of failing.
///
/// # Errors
/// [`ParseError`] on empty input, an element before any canvas, an
/// unmatched restore, a missing canvas, or a statement with too few tokens.
pub fn parse(content: &str) -> Result<Patch, ParseError> {
    let content = preprocess(content);
    let statements = split_statements(&content);
    if statements.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut stack: Vec<(CanvasProps, Vec<Element>)> = Vec::new();
    let mut canvas: Option<CanvasProps> = None;
    let mut elements: Vec<Element> = Vec::new();

    for stmt in &statements {
        let tokens = tokenize(stmt);
        if tokens.is_empty() {
            continue;
        }
        let directive = tokens[0].as_str();
        let cmd = tokens.get(1).map(String::as_str).unwrap_or("");

        if directive == "#N" && cmd == "canvas" {
            let props = parse_canvas(&tokens)?;
            if let Some(open) = canvas.take() {
                stack.push((open, std::mem::take(&mut elements)));
            }
            canvas = Some(props);
        } else if directive == "#X" {
            if canvas.is_none() {
                return Err(ParseError::ElementBeforeCanvas(stmt.clone()));
            }
            match cmd {
                "obj" => elements.push(parse_obj(&tokens)?),
                "msg" => elements.push(Element::Msg(parse_msg(&tokens)?)),
                "floatatom" => {
                    elements.push(Element::FloatAtom(parse_atom(&tokens, "floatatom", 5)?))
                }
                "symbolatom" => {
                    elements.push(Element::SymbolAtom(parse_atom(&tokens, "symbolatom", 10)?))
                }
                "text" => elements.push(Element::Text(parse_text(&tokens)?)),
                "array" => elements.push(Element::Array(parse_array(&tokens)?)),
                "connect" => elements.push(Element::Connect(parse_connect(&tokens)?)),
                "coords" => elements.push(Element::Coords(parse_coords(&tokens)?)),
                "restore" => {
                    let restore = parse_restore(&tokens)?;
                    let Some(open) = canvas.take() else {
                        return Err(ParseError::UnmatchedRestore);
                    };
                    let closed = Subpatch {
                        canvas: open,
                        elements: std::mem::take(&mut elements),
                        restore: Some(restore),
                    };
                    match stack.pop() {
                        Some((parent_canvas, mut parent_elements)) => {
                            parent_elements.push(Element::Subpatch(closed));
                            canvas = Some(parent_canvas);
                            elements = parent_elements;
                        }
                        None => return Err(ParseError::UnmatchedRestore),
                    }
                }
                // Some exporters close the root with `#X pop`.
                "pop" => {}
                _ => {
                    // Unknown command: keep as a generic object if it is at
                    // least positioned, otherwise drop it.
                    if tokens.len() >= 4 {
                        elements.push(Element::Obj(ObjBox {
                            position: position(&tokens),
                            class_name: cmd.to_string(),
                            args: tokens[4..].iter().cloned().collect(),
                        }));
                    } else {
                        log::trace!("dropping short statement: {stmt}");
                    }
                }
            }
        } else {
            // #A array data and the like carry no patch structure.
            log::trace!("ignoring directive: {stmt}");
        }
    }

    match canvas {
        Some(props) => Ok(Patch {
            canvas: props,
            elements,
        }),
        None => Err(ParseError::NoCanvas),
    }
}

/// Read and parse a `.pd` file. Invalid UTF-8 bytes are replaced rather
/// than rejected; old patches are not reliably UTF-8.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Patch, PdError> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(parse(&content)?)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SINE_PATCH: &str = "#N canvas 0 50 450 300 10;\n\
        #X obj 50 50 osc~ 440;\n\
        #X obj 50 100 dac~;\n\
        #X connect 0 0 1 0;\n";

    #[test]
    fn splits_on_unescaped_semicolons_only() {
        let stmts = split_statements("#X msg 10 10 a \\; b;\n#X obj 1 2 bang;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "#X msg 10 10 a \\; b;");
    }

    #[test]
    fn trailing_unterminated_statement_is_kept() {
        let stmts = split_statements("#N canvas 0 50 450 300 10;\n#X obj 1 2 bang");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "#X obj 1 2 bang");
    }

    #[test]
    fn tokenize_keeps_escape_pairs_opaque() {
        let tokens = tokenize("#X msg 10 10 one \\; two;");
        assert_eq!(
            tokens,
            vec!["#X", "msg", "10", "10", "one", "\\;", "two"]
        );
    }

    #[test]
    fn line_continuations_are_spliced() {
        let patch = parse("#N canvas 0 50 450 300 10;\n#X obj 10 \\\n20 metro 500;\n")
            .expect("parse failed");
        assert_eq!(patch.elements.len(), 1);
    }

    #[test]
    fn parses_minimal_sine_patch() {
        let patch = parse(SINE_PATCH).expect("parse failed");
        assert_eq!(patch.canvas.width, 450);
        assert_eq!(patch.canvas.height, 300);
        assert_eq!(patch.canvas.name, None);
        assert_eq!(patch.elements.len(), 3);
        let Element::Obj(osc) = &patch.elements[0] else {
            panic!("expected obj");
        };
        assert_eq!(osc.class_name, "osc~");
        assert_eq!(osc.args.as_slice(), ["440"]);
        let Element::Connect(c) = &patch.elements[2] else {
            panic!("expected connect");
        };
        assert_eq!((c.source, c.outlet, c.sink, c.inlet), (0, 0, 1, 0));
    }

    #[test]
    fn eight_token_canvas_is_a_subcanvas() {
        let props =
            parse_canvas(&tokenize("#N canvas 0 0 300 180 mysub 0;")).expect("parse failed");
        assert_eq!(props.name.as_deref(), Some("mysub"));
        assert_eq!(props.font_size, 10);

        let root = parse_canvas(&tokenize("#N canvas 0 50 450 300 12;")).expect("parse failed");
        assert_eq!(root.name, None);
        assert_eq!(root.font_size, 12);
    }

    #[test]
    fn nested_subpatch_roundtrips_structure() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #X obj 20 20 loadbang;\n\
            #N canvas 0 0 300 180 inner 0;\n\
            #X obj 10 10 inlet;\n\
            #X obj 10 60 outlet;\n\
            #X connect 0 0 1 0;\n\
            #X restore 20 60 pd inner;\n\
            #X connect 0 0 1 0;\n";
        let patch = parse(text).expect("parse failed");
        assert_eq!(patch.elements.len(), 3);
        let Element::Subpatch(sp) = &patch.elements[1] else {
            panic!("expected subpatch");
        };
        assert_eq!(sp.canvas.name.as_deref(), Some("inner"));
        assert_eq!(sp.elements.len(), 3);
        assert_eq!(sp.restore.as_ref().map(|r| r.name.as_str()), Some("inner"));
    }

    #[test]
    fn widget_with_full_args_parses_typed() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #X obj 30 30 bng 15 250 50 0 empty empty empty 17 7 0 10 -262144 -1 -1;\n";
        let patch = parse(text).expect("parse failed");
        assert!(matches!(patch.elements[0], Element::Bng(_)));
    }

    #[test]
    fn widget_with_short_args_stays_generic() {
        let text = "#N canvas 0 50 450 300 10;\n#X obj 30 30 bng 15;\n";
        let patch = parse(text).expect("parse failed");
        let Element::Obj(o) = &patch.elements[0] else {
            panic!("expected generic obj");
        };
        assert_eq!(o.class_name, "bng");
    }

    #[test]
    fn bad_numeric_field_falls_back_to_default() {
        let text = "#N canvas 0 50 450 300 10;\n#X floatatom 10 10 oops 0 0 0 - - -;\n";
        let patch = parse(text).expect("parse failed");
        let Element::FloatAtom(atom) = &patch.elements[0] else {
            panic!("expected floatatom");
        };
        assert_eq!(atom.width, 5);
    }

    #[test]
    fn element_before_canvas_is_fatal() {
        let err = parse("#X obj 10 10 metro 500;").unwrap_err();
        assert!(matches!(err, ParseError::ElementBeforeCanvas(_)));
    }

    #[test]
    fn unmatched_restore_is_fatal() {
        let err = parse("#N canvas 0 50 450 300 10;\n#X restore 5 5 pd ghost;").unwrap_err();
        assert_eq!(err, ParseError::UnmatchedRestore);
    }

    #[test]
    fn empty_and_canvasless_inputs_are_fatal() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyInput);
        assert_eq!(parse("#A 0 1 2 3;").unwrap_err(), ParseError::NoCanvas);
    }

    #[test]
    fn truncated_subpatch_becomes_root() {
        let text = "#N canvas 0 50 450 300 10;\n\
            #N canvas 0 0 300 180 inner 0;\n\
            #X obj 10 10 inlet;\n";
        let patch = parse(text).expect("parse failed");
        assert_eq!(patch.canvas.name.as_deref(), Some("inner"));
        assert_eq!(patch.elements.len(), 1);
    }

    #[test]
    fn unknown_x_command_becomes_generic_obj() {
        let text = "#N canvas 0 50 450 300 10;\n#X scalar 10 20 mytemplate;\n";
        let patch = parse(text).expect("parse failed");
        let Element::Obj(o) = &patch.elements[0] else {
            panic!("expected generic obj");
        };
        assert_eq!(o.class_name, "scalar");
        assert_eq!(o.args.as_slice(), ["mytemplate"]);
    }
}
