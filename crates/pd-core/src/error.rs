use thiserror::Error;

/// Fatal errors raised while parsing `.pd` text.
///
/// Parsing stops at the first occurrence; malformed *numeric fields* inside
/// an otherwise well-shaped statement are not errors (they fall back to
/// per-field defaults).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Input contained no statements at all.
    #[error("empty patch input")]
    EmptyInput,

    /// Statements were found but none opened a canvas.
    #[error("no canvas found in patch")]
    NoCanvas,

    /// An element statement appeared before any `#N canvas`.
    #[error("element before any canvas: {0}")]
    ElementBeforeCanvas(String),

    /// `#X restore` with no open sub-canvas to close.
    #[error("restore without a matching canvas")]
    UnmatchedRestore,

    /// A statement had fewer tokens than its kind requires.
    #[error("malformed {kind} statement: {stmt}")]
    Malformed { kind: &'static str, stmt: String },
}

/// Errors raised by the builder graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A node handle does not belong to this graph (wrong graph, or the
    /// graph was structurally rewritten since the handle was issued).
    #[error("{0} node not found in this graph")]
    NodeNotFound(&'static str),

    /// Outlet index past the source node's declared outlet count.
    #[error("outlet index {index} out of range (node has {count} outlets)")]
    OutletOutOfRange { index: usize, count: u32 },

    /// Inlet index past the sink node's declared inlet count.
    #[error("inlet index {index} out of range (node has {count} inlets)")]
    InletOutOfRange { index: usize, count: u32 },

    /// Aggregate result of [`crate::graph::Graph::validate_connections`]:
    /// one entry per violation, never just the first.
    #[error("found {} invalid connection(s):\n{}", .0.len(),
            .0.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"))]
    InvalidConnections(Vec<String>),

    /// A connection element referenced a node index that does not exist
    /// (strict-index bridge mode only). Carries the raw wire-format index,
    /// which may be negative.
    #[error("connection references missing node index {0}")]
    DanglingIndex(i64),
}

/// Umbrella error for fallible entry points that touch files.
#[derive(Debug, Error)]
pub enum PdError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_connections_lists_every_violation() {
        let err = GraphError::InvalidConnections(vec![
            "outlet 3 on node 0".into(),
            "inlet 9 on node 1".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 invalid connection(s)"));
        assert!(msg.contains("outlet 3 on node 0"));
        assert!(msg.contains("inlet 9 on node 1"));
    }

    #[test]
    fn outlet_message_names_the_bound() {
        let err = GraphError::OutletOutOfRange { index: 5, count: 2 };
        assert_eq!(err.to_string(), "outlet index 5 out of range (node has 2 outlets)");
    }
}
