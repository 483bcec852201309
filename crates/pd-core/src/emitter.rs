//! Serializer: [`Patch`] → `.pd` text.
//!
//! Emission is the exact inverse of [`crate::parser::parse`] at the element
//! level: every element becomes one statement line (sub-canvases become an
//! open line, their children, and a restore line), joined with `\n`.

use crate::error::PdError;
use crate::model::*;
use std::path::Path;

/// Format a numeric field the way Pd writes it: integral values without a
/// decimal point, huge magnitudes (the ±1e37 range sentinels) in exponent
/// form.
pub(crate) fn format_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else if v.abs() >= 1e15 {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

fn canvas_line(props: &CanvasProps) -> String {
    match &props.name {
        Some(name) => format!(
            "#N canvas {} {} {} {} {} {};",
            props.x, props.y, props.width, props.height, name, props.open_on_load
        ),
        None => format!(
            "#N canvas {} {} {} {} {};",
            props.x, props.y, props.width, props.height, props.font_size
        ),
    }
}

fn atom_line(keyword: &str, a: &AtomBox) -> String {
    format!(
        "#X {} {} {} {} {} {} {} {} {} {};",
        keyword,
        a.position.x,
        a.position.y,
        a.width,
        format_num(a.lower_limit),
        format_num(a.upper_limit),
        a.label_pos,
        a.label,
        a.receive,
        a.send
    )
}

fn slider_line(keyword: &str, s: &Slider) -> String {
    format!(
        "#X obj {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {};",
        s.position.x,
        s.position.y,
        keyword,
        s.width,
        s.height,
        format_num(s.min_val),
        format_num(s.max_val),
        s.log_flag,
        s.init,
        s.send,
        s.receive,
        s.label,
        s.label_x,
        s.label_y,
        s.font,
        s.font_size,
        s.bg_color,
        s.fg_color,
        s.label_color,
        format_num(s.init_value),
        s.steady
    )
}

fn radio_line(keyword: &str, r: &Radio) -> String {
    format!(
        "#X obj {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {};",
        r.position.x,
        r.position.y,
        keyword,
        r.size,
        r.new_old,
        r.init,
        r.number,
        r.send,
        r.receive,
        r.label,
        r.label_x,
        r.label_y,
        r.font,
        r.font_size,
        r.bg_color,
        r.fg_color,
        r.label_color,
        r.init_value
    )
}

fn emit_element(elem: &Element, lines: &mut Vec<String>) {
    match elem {
        Element::Obj(o) => {
            lines.push(format!(
                "#X obj {} {} {};",
                o.position.x,
                o.position.y,
                o.text()
            ));
        }
        Element::Msg(m) => {
            lines.push(format!(
                "#X msg {} {} {};",
                m.position.x, m.position.y, m.content
            ));
        }
        Element::FloatAtom(a) => lines.push(atom_line("floatatom", a)),
        Element::SymbolAtom(a) => lines.push(atom_line("symbolatom", a)),
        Element::Text(t) => {
            lines.push(format!(
                "#X text {} {} {};",
                t.position.x, t.position.y, t.content
            ));
        }
        Element::Array(a) => {
            lines.push(format!(
                "#X array {} {} {} {};",
                a.name, a.size, a.dtype, a.save_flag
            ));
        }
        Element::Connect(c) => {
            lines.push(format!(
                "#X connect {} {} {} {};",
                c.source, c.outlet, c.sink, c.inlet
            ));
        }
        Element::Coords(c) => {
            lines.push(format!(
                "#X coords {} {} {} {} {} {} {} {} {} {};",
                format_num(c.x_from),
                format_num(c.y_from),
                format_num(c.x_to),
                format_num(c.y_to),
                c.width,
                c.height,
                c.graph_on_parent,
                c.hide_name,
                c.x_margin,
                c.y_margin
            ));
        }
        Element::Bng(b) => {
            lines.push(format!(
                "#X obj {} {} bng {} {} {} {} {} {} {} {} {} {} {} {} {} {};",
                b.position.x,
                b.position.y,
                b.size,
                b.hold,
                b.interrupt,
                b.init,
                b.send,
                b.receive,
                b.label,
                b.label_x,
                b.label_y,
                b.font,
                b.font_size,
                b.bg_color,
                b.fg_color,
                b.label_color
            ));
        }
        Element::Tgl(t) => {
            lines.push(format!(
                "#X obj {} {} tgl {} {} {} {} {} {} {} {} {} {} {} {} {} {};",
                t.position.x,
                t.position.y,
                t.size,
                t.init,
                t.send,
                t.receive,
                t.label,
                t.label_x,
                t.label_y,
                t.font,
                t.font_size,
                t.bg_color,
                t.fg_color,
                t.label_color,
                t.init_value,
                t.default_value
            ));
        }
        Element::Nbx(n) => {
            lines.push(format!(
                "#X obj {} {} nbx {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {};",
                n.position.x,
                n.position.y,
                n.width,
                n.height,
                format_num(n.min_val),
                format_num(n.max_val),
                n.log_flag,
                n.init,
                n.send,
                n.receive,
                n.label,
                n.label_x,
                n.label_y,
                n.font,
                n.font_size,
                n.bg_color,
                n.fg_color,
                n.label_color,
                format_num(n.init_value),
                n.log_height
            ));
        }
        Element::Vsl(s) => lines.push(slider_line("vsl", s)),
        Element::Hsl(s) => lines.push(slider_line("hsl", s)),
        Element::Vradio(r) => lines.push(radio_line("vradio", r)),
        Element::Hradio(r) => lines.push(radio_line("hradio", r)),
        Element::Cnv(c) => {
            lines.push(format!(
                "#X obj {} {} cnv {} {} {} {} {} {} {} {} {} {} {} {} 0;",
                c.position.x,
                c.position.y,
                c.size,
                c.width,
                c.height,
                c.send,
                c.receive,
                c.label,
                c.label_x,
                c.label_y,
                c.font,
                c.font_size,
                c.bg_color,
                c.label_color
            ));
        }
        Element::Vu(v) => {
            lines.push(format!(
                "#X obj {} {} vu {} {} {} {} {} {} {} {} {} {} {} 0;",
                v.position.x,
                v.position.y,
                v.width,
                v.height,
                v.receive,
                v.label,
                v.label_x,
                v.label_y,
                v.font,
                v.font_size,
                v.bg_color,
                v.label_color,
                v.scale
            ));
        }
        Element::Subpatch(sp) => {
            lines.push(canvas_line(&sp.canvas));
            for child in &sp.elements {
                emit_element(child, lines);
            }
            if let Some(restore) = &sp.restore {
                lines.push(format!(
                    "#X restore {} {} pd {};",
                    restore.position.x, restore.position.y, restore.name
                ));
            }
        }
    }
}

/// Serialize a patch to `.pd` text, one statement per line.
pub fn emit_patch(patch: &Patch) -> String {
    let mut lines = vec![canvas_line(&patch.canvas)];
    for elem in &patch.elements {
        emit_element(elem, &mut lines);
    }
    lines.join("\n")
}

/// Serialize a patch and write it to `path` as UTF-8.
pub fn emit_to_file(patch: &Patch, path: impl AsRef<Path>) -> Result<(), PdError> {
    std::fs::write(path, emit_patch(patch))?;
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────
