//! Core engine for the Pure Data (.pd) patch file format.
//!
//! Two representations, kept in sync by [`bridge`]:
//!
//! - the **tree model** ([`model::Patch`]) — what a `.pd` file literally
//!   says: a root canvas plus an ordered list of typed elements, with
//!   nested sub-canvases as values inside the element list;
//! - the **builder graph** ([`graph::Graph`]) — an imperative construction
//!   API: indexed nodes, indexed inlet/outlet connections, automatic
//!   placement, validation, cycle detection, layout, and optimization.
//!
//! [`parser::parse`] and [`emitter::emit_patch`] are exact inverses at the
//! element level, so parse → edit → emit round-trips patches structurally.

pub mod bridge;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod layout;
pub mod model;
pub mod optimize;
pub mod parser;
pub mod registry;
pub mod symbol;

pub use bridge::{BridgeConfig, to_graph, to_graph_with, to_tree};
pub use emitter::{emit_patch, emit_to_file};
pub use error::{GraphError, ParseError, PdError};
pub use graph::{
    Connection, ConnectionStats, Graph, Node, NodeKind, NodeRef, Outlet, SubpatchNode,
    display_lines, escape, infer_abstraction_io, unescape,
};
pub use layout::{AutoLayoutOptions, GridLayout, LayoutStrategy, Place, RowLayout};
pub use model::{CanvasProps, Element, Patch, Position, Subpatch};
pub use optimize::{OptimizeConfig, OptimizeStats};
pub use parser::{parse, parse_file};
pub use registry::IoSpec;
pub use symbol::Symbol;
