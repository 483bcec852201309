//! Graph optimization: duplicate cords, pass-through boxes, orphans.
//!
//! Optimization is opt-in and destructive: it rewrites the node list, so
//! every [`crate::graph::NodeRef`] issued before the call goes stale and
//! the incremental layout state is reset.

use crate::graph::{fresh_tag, Connection, Graph, NodeKind};
use crate::symbol::Symbol;
use std::collections::{HashMap, HashSet};

/// What [`Graph::optimize`] is allowed to touch.
#[derive(Debug, Clone, Default)]
pub struct OptimizeConfig {
    /// Also optimize the inner graph of every sub-patch node.
    pub recursive: bool,
    /// Object classes that may be collapsed when they sit as a pure
    /// 1-in/1-out relay with no creation arguments. Empty disables the
    /// collapsing pass entirely.
    pub collapsible: HashSet<Symbol>,
}

/// Counters describing one [`Graph::optimize`] run. With
/// `recursive`, inner-graph counters are folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeStats {
    pub nodes_removed: usize,
    pub connections_removed: usize,
    pub duplicates_removed: usize,
    pub pass_throughs_collapsed: usize,
    pub subpatches_optimized: usize,
}

impl Graph {
    /// Three passes: drop duplicate connections (same endpoint 4-tuple,
    /// first kept), collapse configured pass-through objects, then prune
    /// plain objects with no connections. Everything that is not a plain
    /// object is protected from pruning, as is anything with an active
    /// send/receive name. Returns what was done.
    pub fn optimize(&mut self, config: &OptimizeConfig) -> OptimizeStats {
        let mut stats = OptimizeStats::default();

        if config.recursive {
            for node in &mut self.nodes {
                if let NodeKind::Subpatch(sp) = &mut node.kind {
                    let inner = sp.graph.optimize(config);
                    stats.nodes_removed += inner.nodes_removed;
                    stats.connections_removed += inner.connections_removed;
                    stats.duplicates_removed += inner.duplicates_removed;
                    stats.pass_throughs_collapsed += inner.pass_throughs_collapsed;
                    stats.subpatches_optimized += 1 + inner.subpatches_optimized;
                }
            }
        }

        let initial_nodes = self.nodes.len();
        let initial_connections = self.connections.len();

        // Pass 1: duplicate cords.
        let mut seen: HashSet<Connection> = HashSet::new();
        self.connections.retain(|c| seen.insert(*c));
        stats.duplicates_removed = initial_connections - self.connections.len();

        // Pass 2: pass-through collapsing. Adjacency is indexed once up
        // front; two collapsible nodes wired directly together therefore
        // both collapse against the original lists, and the replacement
        // cord between them is dropped with them.
        let mut removed_nodes: HashSet<usize> = HashSet::new();
        if !config.collapsible.is_empty() {
            let mut incoming: HashMap<usize, Vec<usize>> = HashMap::new();
            let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
            for (ci, c) in self.connections.iter().enumerate() {
                incoming.entry(c.sink).or_default().push(ci);
                outgoing.entry(c.source).or_default().push(ci);
            }

            let mut removed_conns: HashSet<usize> = HashSet::new();
            let mut spliced: Vec<Connection> = Vec::new();
            for (i, node) in self.nodes.iter().enumerate() {
                let NodeKind::Obj(obj) = &node.kind else { continue };
                if !obj.args.is_empty()
                    || !config.collapsible.contains(&Symbol::intern(&obj.class_name))
                    || node.num_inlets != Some(1)
                    || node.num_outlets != Some(1)
                {
                    continue;
                }
                let ins = incoming.get(&i).map_or(&[][..], Vec::as_slice);
                let outs = outgoing.get(&i).map_or(&[][..], Vec::as_slice);
                if ins.len() != 1 || outs.len() != 1 {
                    continue;
                }
                let upstream = self.connections[ins[0]];
                let downstream = self.connections[outs[0]];
                spliced.push(Connection {
                    source: upstream.source,
                    outlet: upstream.outlet,
                    sink: downstream.sink,
                    inlet: downstream.inlet,
                });
                removed_conns.insert(ins[0]);
                removed_conns.insert(outs[0]);
                removed_nodes.insert(i);
                stats.pass_throughs_collapsed += 1;
            }

            if !removed_conns.is_empty() {
                let mut kept: Vec<Connection> = self
                    .connections
                    .iter()
                    .enumerate()
                    .filter(|(ci, _)| !removed_conns.contains(ci))
                    .map(|(_, c)| *c)
                    .collect();
                kept.extend(spliced);
                self.connections = kept;
            }
        }

        // Pass 3: orphaned plain objects. A cord endpoint counts even if
        // the other end is already marked for removal; the remap below
        // settles that.
        let mut connected: HashSet<usize> = HashSet::new();
        for c in &self.connections {
            connected.insert(c.source);
            connected.insert(c.sink);
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if removed_nodes.contains(&i)
                || connected.contains(&i)
                || !matches!(node.kind, NodeKind::Obj(_))
                || node.has_active_send_receive()
            {
                continue;
            }
            removed_nodes.insert(i);
        }

        if !removed_nodes.is_empty() {
            self.remap_after_removal(&removed_nodes);
        }

        stats.nodes_removed += initial_nodes - self.nodes.len();
        stats.connections_removed += initial_connections - self.connections.len();
        if stats != OptimizeStats::default() {
            log::debug!(
                "optimize: -{} nodes, -{} connections ({} duplicate, {} collapsed)",
                stats.nodes_removed,
                stats.connections_removed,
                stats.duplicates_removed,
                stats.pass_throughs_collapsed
            );
        }
        stats
    }

    /// Compact the node list, rewrite connection indices, and drop cords
    /// touching a removed node. Old handles stop resolving and the
    /// incremental layout starts over.
    fn remap_after_removal(&mut self, removed: &HashSet<usize>) {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let mut kept = Vec::with_capacity(self.nodes.len().saturating_sub(removed.len()));
        for (i, node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if removed.contains(&i) {
                continue;
            }
            remap.insert(i, kept.len());
            kept.push(node);
        }
        self.nodes = kept;

        self.connections = self
            .connections
            .iter()
            .filter_map(|c| {
                let source = *remap.get(&c.source)?;
                let sink = *remap.get(&c.sink)?;
                Some(Connection {
                    source,
                    outlet: c.outlet,
                    sink,
                    inlet: c.inlet,
                })
            })
            .collect();

        self.layout.reset();
        self.tag = fresh_tag();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::layout::Place;
    use pretty_assertions::assert_eq;

    fn collapsible(classes: &[&str]) -> OptimizeConfig {
        OptimizeConfig {
            recursive: false,
            collapsible: classes.iter().map(|c| Symbol::intern(c)).collect(),
        }
    }

    #[test]
    fn duplicate_cords_are_deduplicated_once() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~ 440", Place::default());
        let b = g.add_obj("dac~", Place::default());
        g.link(a, b).unwrap();
        g.link(a, b).unwrap();
        g.link_into(a, b, 1).unwrap();

        let stats = g.optimize(&OptimizeConfig::default());
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(g.connection_count(), 2);

        // Idempotent: a second run changes nothing
        let again = g.optimize(&OptimizeConfig::default());
        assert_eq!(again, OptimizeStats::default());
        assert_eq!(g.connection_count(), 2);
    }

    #[test]
    fn pass_through_relay_is_spliced_out() {
        let mut g = Graph::new();
        let a = g.add_obj("metro 500", Place::default());
        let relay = g.add_obj("change", Place::default());
        let c = g.add_obj("print", Place::default());
        g.link(a, relay).unwrap();
        g.link(relay, c).unwrap();

        let stats = g.optimize(&collapsible(&["change"]));
        assert_eq!(stats.pass_throughs_collapsed, 1);
        assert_eq!(stats.nodes_removed, 1);
        assert_eq!(g.node_count(), 2);
        assert_eq!(
            g.connections(),
            &[Connection { source: 0, outlet: 0, sink: 1, inlet: 0 }]
        );
    }

    #[test]
    fn relay_with_creation_args_is_kept() {
        let mut g = Graph::new();
        let a = g.add_obj("metro 500", Place::default());
        let relay = g.add_obj("change 1", Place::default());
        let c = g.add_obj("print", Place::default());
        g.link(a, relay).unwrap();
        g.link(relay, c).unwrap();

        let stats = g.optimize(&collapsible(&["change"]));
        assert_eq!(stats.pass_throughs_collapsed, 0);
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn orphaned_plain_objects_are_pruned_but_widgets_survive() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~ 440", Place::default());
        let b = g.add_obj("dac~", Place::default());
        g.link(a, b).unwrap();
        g.add_obj("print", Place::default());
        g.add_comment("kept", Place::default());
        g.add_bang(Place::default());
        g.add_array("buf", 64);

        let stats = g.optimize(&OptimizeConfig::default());
        assert_eq!(stats.nodes_removed, 1);
        assert_eq!(g.node_count(), 5);
    }

    #[test]
    fn optimization_invalidates_old_handles() {
        let mut g = Graph::new();
        let a = g.add_obj("osc~ 440", Place::default());
        let b = g.add_obj("dac~", Place::default());
        g.link(a, b).unwrap();
        g.add_obj("print", Place::default());

        g.optimize(&OptimizeConfig::default());
        assert!(matches!(
            g.node(a),
            Err(GraphError::NodeNotFound(_))
        ));
        // New handles resolve against the compacted list
        let fresh = g.node_ref(0).unwrap();
        assert!(g.node(fresh).is_ok());
    }

    #[test]
    fn recursive_optimization_reaches_subpatches() {
        let mut inner = Graph::new();
        let x = inner.add_obj("inlet", Place::default());
        let y = inner.add_obj("outlet", Place::default());
        inner.link(x, y).unwrap();
        inner.link(x, y).unwrap();

        let mut g = Graph::new();
        g.add_subpatch("voice", inner, Place::default());

        let shallow = g.optimize(&OptimizeConfig::default());
        assert_eq!(shallow.duplicates_removed, 0);

        let deep = g.optimize(&OptimizeConfig {
            recursive: true,
            ..OptimizeConfig::default()
        });
        assert_eq!(deep.subpatches_optimized, 1);
        assert_eq!(deep.duplicates_removed, 1);
    }

    #[test]
    fn adjacent_relays_collapse_pairwise() {
        let mut g = Graph::new();
        let a = g.add_obj("metro 500", Place::default());
        let r1 = g.add_obj("change", Place::default());
        let r2 = g.add_obj("change", Place::default());
        let d = g.add_obj("print", Place::default());
        g.link(a, r1).unwrap();
        g.link(r1, r2).unwrap();
        g.link(r2, d).unwrap();

        let stats = g.optimize(&collapsible(&["change"]));
        assert_eq!(stats.pass_throughs_collapsed, 2);
        // Both relays go; splices referencing them are dropped in the
        // remap, so the endpoints end up disconnected.
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.connection_count(), 0);
    }
}
