//! Inlet/outlet counts for the vanilla Pd object classes.
//!
//! The registry backs connection validation and pass-through collapsing.
//! `None` means the count depends on creation arguments (`trigger`, `pack`,
//! `route`, …) and cannot be validated statically. Unregistered classes get
//! no counts at all, so validation skips them.

use crate::symbol::Symbol;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Declared I/O shape of an object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoSpec {
    pub inlets: Option<u32>,
    pub outlets: Option<u32>,
}

impl IoSpec {
    pub const fn new(inlets: Option<u32>, outlets: Option<u32>) -> Self {
        Self { inlets, outlets }
    }
}

#[rustfmt::skip]
const TABLE: &[(&str, Option<u32>, Option<u32>)] = &[
    // Audio oscillators and sources
    ("osc~", Some(2), Some(1)),
    ("phasor~", Some(2), Some(1)),
    ("noise~", Some(0), Some(1)),
    ("tabosc4~", Some(2), Some(1)),
    // Audio math
    ("+~", Some(2), Some(1)),
    ("-~", Some(2), Some(1)),
    ("*~", Some(2), Some(1)),
    ("/~", Some(2), Some(1)),
    ("clip~", Some(3), Some(1)),
    ("wrap~", Some(1), Some(1)),
    ("abs~", Some(1), Some(1)),
    ("sqrt~", Some(1), Some(1)),
    // Audio filters
    ("lop~", Some(2), Some(1)),
    ("hip~", Some(2), Some(1)),
    ("bp~", Some(3), Some(1)),
    ("vcf~", Some(3), Some(2)),
    // Audio I/O and envelopes
    ("dac~", Some(2), Some(0)),
    ("adc~", Some(0), Some(2)),
    ("line~", Some(1), Some(1)),
    ("vline~", Some(1), Some(1)),
    ("env~", Some(1), Some(1)),
    ("threshold~", Some(2), Some(2)),
    // Audio delays
    ("delwrite~", Some(1), Some(0)),
    ("delread~", Some(1), Some(1)),
    ("delread4~", Some(1), Some(1)),
    ("vd~", Some(1), Some(1)),
    // Audio tables
    ("tabread~", Some(1), Some(1)),
    ("tabread4~", Some(1), Some(1)),
    ("tabwrite~", Some(2), Some(0)),
    ("tabsend~", Some(1), Some(0)),
    ("tabreceive~", Some(0), Some(1)),
    // Control math
    ("+", Some(2), Some(1)),
    ("-", Some(2), Some(1)),
    ("*", Some(2), Some(1)),
    ("/", Some(2), Some(1)),
    ("mod", Some(2), Some(1)),
    ("div", Some(2), Some(1)),
    ("pow", Some(2), Some(1)),
    ("abs", Some(1), Some(1)),
    ("sqrt", Some(1), Some(1)),
    ("min", Some(2), Some(1)),
    ("max", Some(2), Some(1)),
    ("random", Some(2), Some(1)),
    // Comparison
    ("==", Some(2), Some(1)),
    ("!=", Some(2), Some(1)),
    (">", Some(2), Some(1)),
    ("<", Some(2), Some(1)),
    (">=", Some(2), Some(1)),
    ("<=", Some(2), Some(1)),
    ("&&", Some(2), Some(1)),
    ("||", Some(2), Some(1)),
    // Routing
    ("trigger", Some(1), None),
    ("t", Some(1), None),
    ("pack", None, Some(1)),
    ("unpack", Some(1), None),
    ("route", Some(1), None),
    ("select", Some(1), None),
    ("sel", Some(1), None),
    ("spigot", Some(2), Some(1)),
    ("swap", Some(2), Some(2)),
    ("moses", Some(2), Some(2)),
    // Timing
    ("delay", Some(2), Some(1)),
    ("metro", Some(2), Some(1)),
    ("timer", Some(2), Some(1)),
    ("pipe", None, None),
    ("line", Some(2), Some(1)),
    // Data
    ("float", Some(2), Some(1)),
    ("f", Some(2), Some(1)),
    ("int", Some(2), Some(1)),
    ("i", Some(2), Some(1)),
    ("symbol", Some(2), Some(1)),
    ("list", None, Some(1)),
    ("value", Some(1), Some(1)),
    ("v", Some(1), Some(1)),
    // Wireless and buses
    ("send", Some(1), Some(0)),
    ("s", Some(1), Some(0)),
    ("receive", Some(0), Some(1)),
    ("r", Some(0), Some(1)),
    ("throw~", Some(1), Some(0)),
    ("catch~", Some(0), Some(1)),
    ("send~", Some(1), Some(0)),
    ("s~", Some(1), Some(0)),
    ("receive~", Some(0), Some(1)),
    ("r~", Some(0), Some(1)),
    // Misc control
    ("bang", Some(1), Some(1)),
    ("loadbang", Some(0), Some(1)),
    ("print", Some(1), Some(0)),
    ("inlet", Some(0), Some(1)),
    ("outlet", Some(1), Some(0)),
    ("inlet~", Some(0), Some(1)),
    ("outlet~", Some(1), Some(0)),
    ("change", Some(1), Some(1)),
    ("stripnote", Some(2), Some(2)),
    ("makenote", Some(3), Some(2)),
    ("tabread", Some(1), Some(1)),
    ("tabwrite", Some(2), Some(0)),
    // MIDI
    ("notein", Some(0), Some(3)),
    ("noteout", Some(3), Some(0)),
    ("ctlin", Some(0), Some(3)),
    ("ctlout", Some(3), Some(0)),
    ("bendin", Some(0), Some(2)),
    ("bendout", Some(2), Some(0)),
    ("midiin", Some(0), Some(2)),
    ("midiout", Some(1), Some(0)),
];

static REGISTRY: LazyLock<HashMap<Symbol, IoSpec>> = LazyLock::new(|| {
    TABLE
        .iter()
        .map(|&(name, inlets, outlets)| (Symbol::intern(name), IoSpec::new(inlets, outlets)))
        .collect()
});

/// Look up the I/O shape for a class name.
pub fn lookup(class: Symbol) -> Option<IoSpec> {
    REGISTRY.get(&class).copied()
}

/// Convenience for call sites holding a plain string.
pub fn lookup_str(class: &str) -> Option<IoSpec> {
    lookup(Symbol::intern(class))
}
