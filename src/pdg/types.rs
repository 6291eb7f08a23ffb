//! Dependence graph type definitions.
//!
//! A [`DependenceGraph`] holds one node per underlying program entity
//! (instruction, block, constant, global, formal argument) plus synthesized
//! actual-argument and phi nodes, connected by data and control edges.
//!
//! Control dependency: "this executes only because that branch went this way".
//! Data dependency: "this uses a value that one produced".
//!
//! Node allocation is memoized: asking for the node of the same entity twice
//! yields the same id. Edge insertion is idempotent: requesting an edge that
//! already exists changes nothing.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ir::{ArgId, BlockId, ConstId, FuncId, GlobalId, InstId, Module, ValueRef};

/// Graph node id. Dense; indexes the arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A basic block; source of control edges to its instructions.
    BasicBlock(BlockId),
    /// An instruction.
    Instruction(InstId),
    /// A constant operand.
    Constant(ConstId),
    /// A global variable.
    GlobalVariable(GlobalId),
    /// A formal argument of some function.
    FormalArgument(ArgId),
    /// An actual argument at a call site, by position.
    ActualArgument { call: InstId, index: u32 },
    /// A synthesized merge of several possible memory values. Never
    /// memoized; each synthesis is a fresh node.
    PhiValue { values: Vec<ValueRef> },
}

/// A node in the dependence graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// Edge flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Value produced there is used here.
    Data,
    /// Execution here is controlled there.
    Control,
}

/// Shape counts for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub data_edges: usize,
    pub control_edges: usize,
    pub phi_nodes: usize,
}

/// Module-wide dependence graph: a memoized node arena plus per-node edge
/// lists.
#[derive(Debug, Clone, Default)]
pub struct DependenceGraph {
    nodes: Vec<Node>,
    memo: FxHashMap<NodeKind, NodeId>,
    out_edges: Vec<Vec<(NodeId, EdgeKind)>>,
    in_edges: Vec<Vec<(NodeId, EdgeKind)>>,
    edge_set: FxHashSet<(NodeId, NodeId, EdgeKind)>,
    data_edges: usize,
    control_edges: usize,
    phi_nodes: usize,
}

impl DependenceGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { id, kind });
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        id
    }

    /// The node for `kind`, allocating it on first request. Phi nodes go
    /// through [`Self::add_phi`] instead.
    pub fn node_of(&mut self, kind: NodeKind) -> NodeId {
        assert!(
            !matches!(kind, NodeKind::PhiValue { .. }),
            "phi nodes are synthesized, not memoized"
        );
        if let Some(&id) = self.memo.get(&kind) {
            return id;
        }
        let id = self.alloc(kind.clone());
        self.memo.insert(kind, id);
        id
    }

    /// Look a node up without allocating.
    pub fn get(&self, kind: &NodeKind) -> Option<NodeId> {
        self.memo.get(kind).copied()
    }

    /// Synthesize a fresh phi node over `values`.
    pub fn add_phi(&mut self, values: Vec<ValueRef>) -> NodeId {
        self.phi_nodes += 1;
        self.alloc(NodeKind::PhiValue { values })
    }

    /// Insert `from -> to`. Returns false if the edge already existed.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> bool {
        if !self.edge_set.insert((from, to, kind)) {
            return false;
        }
        self.out_edges[from.0 as usize].push((to, kind));
        self.in_edges[to.0 as usize].push((from, kind));
        match kind {
            EdgeKind::Data => self.data_edges += 1,
            EdgeKind::Control => self.control_edges += 1,
        }
        true
    }

    /// The node behind `id`. Panics on a stale id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// All nodes, in allocation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Outgoing edges of `id`.
    pub fn out_edges(&self, id: NodeId) -> &[(NodeId, EdgeKind)] {
        &self.out_edges[id.0 as usize]
    }

    /// Incoming edges of `id`.
    pub fn in_edges(&self, id: NodeId) -> &[(NodeId, EdgeKind)] {
        &self.in_edges[id.0 as usize]
    }

    /// Whether some branch controls this node.
    pub fn has_incoming_control(&self, id: NodeId) -> bool {
        self.in_edges[id.0 as usize]
            .iter()
            .any(|(_, kind)| *kind == EdgeKind::Control)
    }

    /// Whether `from -> to` exists with the given kind.
    pub fn has_edge(&self, from: NodeId, to: NodeId, kind: EdgeKind) -> bool {
        self.edge_set.contains(&(from, to, kind))
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_set.len()
    }

    /// Shape counts.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edge_set.len(),
            data_edges: self.data_edges,
            control_edges: self.control_edges,
            phi_nodes: self.phi_nodes,
        }
    }

    /// Stats as a JSON string.
    pub fn stats_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.stats())?)
    }

    /// All nodes anchored in `func`: its blocks, instructions, formal
    /// arguments, and the actual arguments of its call sites.
    pub fn function_nodes(&self, module: &Module, func: FuncId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| match &node.kind {
                NodeKind::BasicBlock(b) => module.block(*b).func == func,
                NodeKind::Instruction(i) => module.inst(*i).func == func,
                NodeKind::FormalArgument(a) => module.argument(*a).func == func,
                NodeKind::ActualArgument { call, .. } => module.inst(*call).func == func,
                NodeKind::Constant(_) | NodeKind::GlobalVariable(_) | NodeKind::PhiValue { .. } => {
                    false
                }
            })
            .map(|node| node.id)
            .collect()
    }
}
