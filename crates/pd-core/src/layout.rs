//! Node placement.
//!
//! Two layers: incremental [`LayoutStrategy`] implementations that place
//! nodes one at a time as they are added, and [`Graph::auto_layout`], which
//! repositions an entire graph from its connection topology.

use crate::graph::{Graph, Node};
use crate::model::Position;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

pub(crate) const ROW_HEIGHT: i32 = 25;
const COLUMN_WIDTH: i32 = 50;
const DEFAULT_MARGIN: i32 = 25;

// ─── Placement requests ───────────────────────────────────────────────────

/// Where to put the next node, relative to what came before.
///
/// The default starts a fresh row below the current one. `new_row` and
/// `new_col` are fractional: `Place::row(0.5)` opens half a row of extra
/// vertical gap, `col` shifts right in column-width units. Coordinates
/// set with [`Place::at`] (both non-negative) bypass the strategy
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Place {
    pub new_row: f32,
    pub new_col: f32,
    pub x: i32,
    pub y: i32,
}

impl Default for Place {
    fn default() -> Self {
        Self {
            new_row: 1.0,
            new_col: 0.0,
            x: -1,
            y: -1,
        }
    }
}

impl Place {
    /// Start `rows` new rows below the head of the current row.
    pub fn row(rows: f32) -> Self {
        Self {
            new_row: rows,
            ..Self::default()
        }
    }

    /// Continue the current row, to the right of its last node.
    pub fn same_row() -> Self {
        Self::row(0.0)
    }

    /// Absolute canvas coordinates.
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// Shift right by `cols` column widths.
    pub fn col(mut self, cols: f32) -> Self {
        self.new_col = cols;
        self
    }

    pub fn is_absolute(&self) -> bool {
        self.x >= 0 && self.y >= 0
    }
}

/// Incremental placement policy owned by a [`Graph`].
///
/// `compute_position` is called before the node is appended (so `nodes`
/// does not yet contain it); `register` is called after, with the index
/// the node landed at.
pub trait LayoutStrategy: fmt::Debug + Send {
    fn compute_position(&mut self, nodes: &[Node], place: &Place) -> Position;
    fn register(&mut self, index: usize, place: &Place, was_absolute: bool);
    fn reset(&mut self);
}

// ─── Row layout ───────────────────────────────────────────────────────────

/// Default strategy: nodes flow left to right along a row, new rows open
/// below the current row's head node.
#[derive(Debug)]
pub struct RowLayout {
    margin: i32,
    row_head: Option<usize>,
    row_tail: Option<usize>,
}

impl RowLayout {
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_MARGIN)
    }

    pub fn with_margin(margin: i32) -> Self {
        Self {
            margin,
            row_head: None,
            row_tail: None,
        }
    }
}

impl Default for RowLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutStrategy for RowLayout {
    fn compute_position(&mut self, nodes: &[Node], place: &Place) -> Position {
        if place.is_absolute() {
            return Position::new(place.x, place.y);
        }
        let anchor_index = if place.new_row < 1.0 {
            self.row_tail
        } else {
            self.row_head
        };
        let Some(anchor) = anchor_index.and_then(|i| nodes.get(i)) else {
            return Position::new(self.margin, self.margin);
        };

        let pos = anchor.position();
        let (width, height) = anchor.dimensions();
        let mut x = pos.x;
        let mut y = pos.y;
        let mut cols = place.new_col;
        if place.new_row < 1.0 {
            x += width;
            cols -= 1.0;
        } else {
            y += height + (ROW_HEIGHT as f32 * (place.new_row - 1.0)) as i32;
        }
        x += ((COLUMN_WIDTH as f32 * cols) as i32).max(0);
        Position::new(x, y)
    }

    fn register(&mut self, index: usize, place: &Place, was_absolute: bool) {
        if was_absolute || self.row_head.is_none() || place.new_col > 0.0 || place.new_row >= 1.0 {
            self.row_head = Some(index);
        }
        self.row_tail = Some(index);
    }

    fn reset(&mut self) {
        self.row_head = None;
        self.row_tail = None;
    }
}

// ─── Grid layout ──────────────────────────────────────────────────────────

/// Fixed-cell grid filled left to right, top to bottom. Placement
/// requests' row/column hints are ignored; only absolute coordinates
/// override the grid, and those do not advance the cell cursor.
#[derive(Debug)]
pub struct GridLayout {
    columns: usize,
    cell_width: i32,
    cell_height: i32,
    margin: i32,
    count: usize,
}

impl GridLayout {
    pub fn new() -> Self {
        Self::with_columns(4)
    }

    pub fn with_columns(columns: usize) -> Self {
        Self {
            columns: columns.max(1),
            cell_width: 100,
            cell_height: 40,
            margin: DEFAULT_MARGIN,
            count: 0,
        }
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutStrategy for GridLayout {
    fn compute_position(&mut self, _nodes: &[Node], place: &Place) -> Position {
        if place.is_absolute() {
            return Position::new(place.x, place.y);
        }
        let col = (self.count % self.columns) as i32;
        let row = (self.count / self.columns) as i32;
        Position::new(
            self.margin + col * self.cell_width,
            self.margin + row * self.cell_height,
        )
    }

    fn register(&mut self, _index: usize, _place: &Place, was_absolute: bool) {
        if !was_absolute {
            self.count += 1;
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

// ─── Auto layout ──────────────────────────────────────────────────────────

/// Knobs for [`Graph::auto_layout`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoLayoutOptions {
    pub margin: i32,
    pub row_spacing: i32,
    pub col_spacing: i32,
    /// Order each row by the mean position of its parents in the row
    /// above, so cords run mostly straight down.
    pub align_columns: bool,
}

impl Default for AutoLayoutOptions {
    fn default() -> Self {
        Self {
            margin: 50,
            row_spacing: 40,
            col_spacing: 120,
            align_columns: true,
        }
    }
}

impl Graph {
    /// Reposition every visible node by signal-flow depth: sources in the
    /// top row, each node one row below its deepest parent. Back edges
    /// found by DFS are ignored for depth, so feedback loops terminate.
    /// Hidden nodes are left untouched.
    pub fn auto_layout(&mut self, options: &AutoLayoutOptions) {
        let n = self.nodes.len();
        if n == 0 {
            return;
        }
        let hidden: Vec<bool> = self.nodes.iter().map(Node::is_hidden).collect();

        let mut outgoing: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut incoming: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for conn in &self.connections {
            if conn.source < n && conn.sink < n {
                outgoing[conn.source].insert(conn.sink);
                incoming[conn.sink].insert(conn.source);
            }
        }

        let back_edges = find_back_edges(&outgoing, &hidden);

        let mut dag = DiGraph::<usize, ()>::new();
        let indices: Vec<NodeIndex> = (0..n).map(|i| dag.add_node(i)).collect();
        let mut dag_in_degree = vec![0usize; n];
        for (u, targets) in outgoing.iter().enumerate() {
            for &v in targets {
                if !back_edges.contains(&(u, v)) {
                    dag.add_edge(indices[u], indices[v], ());
                    dag_in_degree[v] += 1;
                }
            }
        }

        let mut sources: Vec<usize> = (0..n)
            .filter(|&i| !hidden[i] && dag_in_degree[i] == 0)
            .collect();
        if sources.is_empty() {
            sources = (0..n).filter(|&i| !hidden[i]).collect();
        }

        // Longest-path depth from the sources. In topological order one
        // relaxation pass is exact; a residual cycle (only possible
        // through hidden nodes, which the back-edge DFS skips) falls back
        // to bounded passes.
        let mut depth: Vec<Option<usize>> = vec![None; n];
        for &s in &sources {
            depth[s] = Some(0);
        }
        let relax = |depth: &mut Vec<Option<usize>>| {
            let mut changed = false;
            for u in 0..n {
                let Some(du) = depth[u] else { continue };
                for &v in &outgoing[u] {
                    if back_edges.contains(&(u, v)) {
                        continue;
                    }
                    if depth[v].map_or(true, |dv| dv < du + 1) {
                        depth[v] = Some(du + 1);
                        changed = true;
                    }
                }
            }
            changed
        };
        match toposort(&dag, None) {
            Ok(order) => {
                for ni in order {
                    let u = dag[ni];
                    let Some(du) = depth[u] else { continue };
                    for &v in &outgoing[u] {
                        if back_edges.contains(&(u, v)) {
                            continue;
                        }
                        if depth[v].map_or(true, |dv| dv < du + 1) {
                            depth[v] = Some(du + 1);
                        }
                    }
                }
            }
            Err(_) => {
                for _ in 0..n {
                    if !relax(&mut depth) {
                        break;
                    }
                }
            }
        }

        // Rows by depth; visible nodes the sources never reach land in
        // the top row.
        let mut rows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..n {
            if !hidden[i] {
                rows.entry(depth[i].unwrap_or(0)).or_default().push(i);
            }
        }
        let mut ordered: Vec<(usize, Vec<usize>)> = rows.into_iter().collect();

        if options.align_columns {
            for r in 1..ordered.len() {
                let prev_pos: HashMap<usize, usize> = ordered[r - 1]
                    .1
                    .iter()
                    .enumerate()
                    .map(|(slot, &node)| (node, slot))
                    .collect();
                let keys: HashMap<usize, f64> = ordered[r]
                    .1
                    .iter()
                    .map(|&node| {
                        let slots: Vec<usize> = incoming[node]
                            .iter()
                            .filter_map(|p| prev_pos.get(p).copied())
                            .collect();
                        let key = if slots.is_empty() {
                            f64::INFINITY
                        } else {
                            slots.iter().sum::<usize>() as f64 / slots.len() as f64
                        };
                        (node, key)
                    })
                    .collect();
                ordered[r].1.sort_by(|a, b| {
                    keys[a].partial_cmp(&keys[b]).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        for (d, row) in &ordered {
            let y = options.margin + *d as i32 * options.row_spacing;
            for (slot, &node) in row.iter().enumerate() {
                let x = options.margin + slot as i32 * options.col_spacing;
                self.nodes[node].set_position(Position::new(x, y));
            }
        }
    }
}

/// Edges that close a cycle under DFS from every visible node, with
/// neighbors taken in ascending index order. Hidden nodes are neither
/// starting points nor traversed through.
fn find_back_edges(outgoing: &[BTreeSet<usize>], hidden: &[bool]) -> HashSet<(usize, usize)> {
    let n = outgoing.len();
    let mut back = HashSet::new();
    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];

    for start in 0..n {
        if hidden[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        on_stack[start] = true;
        let mut stack = vec![(start, outgoing[start].iter())];

        while let Some((node, iter)) = stack.last_mut() {
            let node = *node;
            if let Some(&next) = iter.next() {
                if hidden[next] {
                    continue;
                }
                if !visited[next] {
                    visited[next] = true;
                    on_stack[next] = true;
                    stack.push((next, outgoing[next].iter()));
                } else if on_stack[next] {
                    back.insert((node, next));
                }
            } else {
                on_stack[node] = false;
                stack.pop();
            }
        }
    }
    back
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn row_layout_flows_down_and_right() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~ 440", Place::default());
        let b = g.add_obj("dac~", Place::default());
        let c = g.add_obj("print", Place::same_row());
        assert_eq!(g.node(a).unwrap().position(), Position::new(25, 25));
        assert_eq!(g.node(b).unwrap().position(), Position::new(25, 50));
        // dac~ box is 50 wide, so same-row continues at its right edge
        assert_eq!(g.node(c).unwrap().position(), Position::new(75, 50));
    }

    #[test]
    fn row_layout_honors_absolute_coordinates() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~", Place::at(300, 40));
        assert_eq!(g.node(a).unwrap().position(), Position::new(300, 40));
        // The absolute node becomes the new row anchor
        let b = g.add_obj("dac~", Place::default());
        assert_eq!(g.node(b).unwrap().position(), Position::new(300, 65));
    }

    #[test]
    fn row_layout_col_shifts_right() {
        let mut g = Graph::new();
        g.add_obj("loadbang", Place::default());
        let b = g.add_obj("metro 500", Place::row(1.0).col(2.0));
        assert_eq!(g.node(b).unwrap().position(), Position::new(125, 50));
    }

    #[test]
    fn grid_layout_wraps_after_columns() {
        let mut g = Graph::with_layout(Box::new(GridLayout::with_columns(2)));
        let a = g.add_obj("osc~", Place::default());
        let b = g.add_obj("osc~", Place::default());
        let c = g.add_obj("osc~", Place::default());
        assert_eq!(g.node(a).unwrap().position(), Position::new(25, 25));
        assert_eq!(g.node(b).unwrap().position(), Position::new(125, 25));
        assert_eq!(g.node(c).unwrap().position(), Position::new(25, 65));
    }

    #[test]
    fn grid_layout_absolute_does_not_advance_cursor() {
        let mut g = Graph::with_layout(Box::new(GridLayout::with_columns(2)));
        g.add_obj("osc~", Place::at(500, 500));
        let b = g.add_obj("osc~", Place::default());
        assert_eq!(g.node(b).unwrap().position(), Position::new(25, 25));
    }

    #[test]
    fn auto_layout_stacks_a_chain_by_depth() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~ 440", Place::default());
        let b = g.add_obj("*~ 0.5", Place::default());
        let c = g.add_obj("dac~", Place::default());
        g.link(a, b).unwrap();
        g.link(b, c).unwrap();
        g.auto_layout(&AutoLayoutOptions::default());
        assert_eq!(g.node(a).unwrap().position(), Position::new(50, 50));
        assert_eq!(g.node(b).unwrap().position(), Position::new(50, 90));
        assert_eq!(g.node(c).unwrap().position(), Position::new(50, 130));
    }

    #[test]
    fn auto_layout_terminates_on_a_three_cycle() {
        let mut g = Graph::new();
        let a = g.add_obj_with_io("a", Place::default(), Some(1), Some(1));
        let b = g.add_obj_with_io("b", Place::default(), Some(1), Some(1));
        let c = g.add_obj_with_io("c", Place::default(), Some(1), Some(1));
        g.link(a, b).unwrap();
        g.link(b, c).unwrap();
        g.link(c, a).unwrap();
        g.auto_layout(&AutoLayoutOptions::default());
        for node in g.nodes() {
            let pos = node.position();
            assert!(pos.x >= 0 && pos.y >= 0);
        }
        // The back edge is ignored, so the chain still stacks
        assert_eq!(g.node(a).unwrap().position().y, 50);
        assert_eq!(g.node(c).unwrap().position().y, 130);
    }

    #[test]
    fn align_columns_follows_parents() {
        let mut g = Graph::new();
        let a = g.add_obj_with_io("a", Place::default(), Some(1), Some(1));
        let b = g.add_obj_with_io("b", Place::default(), Some(1), Some(1));
        // Children added in the opposite order of their parents
        let child_of_b = g.add_obj_with_io("cb", Place::default(), Some(1), Some(1));
        let child_of_a = g.add_obj_with_io("ca", Place::default(), Some(1), Some(1));
        g.link(b, child_of_b).unwrap();
        g.link(a, child_of_a).unwrap();
        g.auto_layout(&AutoLayoutOptions::default());
        // Row 0 is [a, b] in index order; row 1 reorders to sit under parents
        assert_eq!(g.node(child_of_a).unwrap().position().x, 50);
        assert_eq!(g.node(child_of_b).unwrap().position().x, 170);
    }

    #[test]
    fn auto_layout_leaves_hidden_nodes_alone() {
        let mut g = Graph::new();
        let arr = g.add_array("buf", 64);
        g.add_obj("tabread buf", Place::default());
        g.auto_layout(&AutoLayoutOptions::default());
        assert_eq!(g.node(arr).unwrap().position(), Position::new(-1, -1));
    }
}
