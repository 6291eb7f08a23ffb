//! Dependence graph construction.
//!
//! [`PdgBuilder`] makes one deterministic pass over a module: global nodes
//! first, then every function's formal arguments, blocks, and instructions in
//! layout order. Edge rules per instruction kind:
//!
//! - every used operand contributes a data edge to its user;
//! - a load connects to its defining store via the def-site resolvers
//!   (pointer-class first, then scalar-class), synthesizing a phi node at
//!   memory merge points;
//! - a call site gets one actual-argument node per position, bridged to the
//!   formal-argument node of every resolved callee;
//! - a conditional branch gets control edges to its target blocks, and a
//!   block that is controlled by some branch gets control edges to each of
//!   its instructions.
//!
//! Anything the builder cannot attach (an unresolved indirect call, a def
//! site outside the current function, an operand with no node) is reported
//! with `tracing::debug` and the edge is omitted; construction never fails.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::{Callee, FuncId, InstId, InstKind, Module, ValueRef};
use crate::queries::{DefUseResolver, IndirectCallResolver};

use super::types::{DependenceGraph, EdgeKind, NodeId, NodeKind};

/// Builds a [`DependenceGraph`] over a module.
pub struct PdgBuilder<'a> {
    module: &'a Module,
    pointer_def_use: Option<&'a dyn DefUseResolver>,
    scalar_def_use: Option<&'a dyn DefUseResolver>,
    calls: Option<&'a dyn IndirectCallResolver>,
    graph: DependenceGraph,
    formals_built: FxHashSet<FuncId>,
}

impl<'a> PdgBuilder<'a> {
    /// Builder over `module` with no resolvers wired yet.
    pub fn new(module: &'a Module) -> Self {
        Self {
            module,
            pointer_def_use: None,
            scalar_def_use: None,
            calls: None,
            graph: DependenceGraph::new(),
            formals_built: FxHashSet::default(),
        }
    }

    /// Def-site resolver for pointer-class values, consulted first.
    pub fn with_pointer_def_use(mut self, resolver: &'a dyn DefUseResolver) -> Self {
        self.pointer_def_use = Some(resolver);
        self
    }

    /// Def-site resolver for scalar-class values, the fallback.
    pub fn with_scalar_def_use(mut self, resolver: &'a dyn DefUseResolver) -> Self {
        self.scalar_def_use = Some(resolver);
        self
    }

    /// Resolver for indirect call targets.
    pub fn with_call_resolver(mut self, resolver: &'a dyn IndirectCallResolver) -> Self {
        self.calls = Some(resolver);
        self
    }

    /// Run the pass and hand the graph back.
    pub fn build(mut self) -> DependenceGraph {
        for global in self.module.globals() {
            self.graph.node_of(NodeKind::GlobalVariable(global.id));
        }
        let funcs: Vec<FuncId> = self.module.functions().map(|f| f.id).collect();
        for func in funcs {
            self.build_function(func);
        }
        self.graph
    }

    fn build_function(&mut self, func: FuncId) {
        debug!(func = func.0, "building dependence nodes");
        self.ensure_formals(func);
        let blocks = self.module.function(func).blocks.clone();
        for &block in &blocks {
            self.graph.node_of(NodeKind::BasicBlock(block));
            let insts = self.module.block(block).insts.clone();
            for inst in insts {
                self.build_instruction(func, inst);
            }
        }
        // Branch targets now carry their incoming control edges; fan them
        // out to the controlled instructions.
        for &block in &blocks {
            let bnode = self.graph.node_of(NodeKind::BasicBlock(block));
            if !self.graph.has_incoming_control(bnode) {
                continue;
            }
            let insts = self.module.block(block).insts.clone();
            for inst in insts {
                let inode = self.graph.node_of(NodeKind::Instruction(inst));
                self.graph.add_edge(bnode, inode, EdgeKind::Control);
            }
        }
    }

    /// Formal-argument nodes are built exactly once per function, on demand
    /// for callees that have not been visited yet.
    fn ensure_formals(&mut self, func: FuncId) {
        if !self.formals_built.insert(func) {
            return;
        }
        for &arg in &self.module.function(func).args {
            self.graph.node_of(NodeKind::FormalArgument(arg));
        }
    }

    fn build_instruction(&mut self, func: FuncId, inst: InstId) {
        let inode = self.graph.node_of(NodeKind::Instruction(inst));
        let kind = self.module.inst(inst).kind.clone();
        match kind {
            InstKind::Alloc => {}
            InstKind::Load { ptr, .. } => self.connect_to_def_site(func, ptr, inode),
            InstKind::Store { value, ptr } => {
                self.data_edge_from(func, value, inode);
                self.data_edge_from(func, ptr, inode);
            }
            InstKind::Branch { cond, targets } => {
                let Some(cond) = cond else {
                    return;
                };
                self.data_edge_from(func, cond, inode);
                for target in targets {
                    let tnode = self.graph.node_of(NodeKind::BasicBlock(target));
                    self.graph.add_edge(inode, tnode, EdgeKind::Control);
                }
            }
            InstKind::Return { value } => {
                if let Some(value) = value {
                    self.data_edge_from(func, value, inode);
                }
            }
            InstKind::Compute { operands, .. } => {
                for op in operands {
                    self.data_edge_from(func, op, inode);
                }
            }
            InstKind::Call { callee, args } => self.build_call(func, inst, inode, callee, args),
        }
    }

    fn build_call(
        &mut self,
        func: FuncId,
        call: InstId,
        inode: NodeId,
        callee: Callee,
        args: Vec<ValueRef>,
    ) {
        let callees: Vec<FuncId> = match callee {
            Callee::Direct(f) => vec![f],
            Callee::Indirect(_) => {
                let resolved = self
                    .calls
                    .map(|r| r.callees_of(call))
                    .unwrap_or_default();
                if resolved.is_empty() {
                    debug!(call = call.0, "unresolved indirect call, no formal bridging");
                }
                resolved
            }
        };

        for (index, &actual) in args.iter().enumerate() {
            let anode = self.graph.node_of(NodeKind::ActualArgument {
                call,
                index: index as u32,
            });
            if let Some(vnode) = self.node_for_value(func, actual) {
                self.graph.add_edge(vnode, anode, EdgeKind::Data);
                self.graph.add_edge(vnode, inode, EdgeKind::Data);
            }
            self.graph.add_edge(anode, inode, EdgeKind::Data);

            for &target in &callees {
                self.ensure_formals(target);
                match self.module.function(target).args.get(index) {
                    Some(&formal) => {
                        let fnode = self.graph.node_of(NodeKind::FormalArgument(formal));
                        self.graph.add_edge(anode, fnode, EdgeKind::Data);
                    }
                    None => {
                        debug!(
                            call = call.0,
                            callee = target.0,
                            index,
                            "actual argument without matching formal"
                        );
                    }
                }
            }
        }
    }

    /// Connect a load to whatever defines the memory it reads: a single
    /// defining store, a synthesized phi over a merge point, or the pointer's
    /// own node as a last resort.
    fn connect_to_def_site(&mut self, func: FuncId, ptr: ValueRef, inode: NodeId) {
        for resolver in [self.pointer_def_use, self.scalar_def_use].into_iter().flatten() {
            if let Some(def) = resolver.def_site(ptr) {
                if self.module.inst(def).func != func {
                    debug!(inst = def.0, "def site outside the current function");
                    return;
                }
                let dnode = self.graph.node_of(NodeKind::Instruction(def));
                self.graph.add_edge(dnode, inode, EdgeKind::Data);
                return;
            }
            if let Some(values) = resolver.merged_def_values(ptr) {
                let sources: Vec<NodeId> = values
                    .iter()
                    .filter_map(|&v| self.node_for_value(func, v))
                    .collect();
                let phi = self.graph.add_phi(values);
                for source in sources {
                    self.graph.add_edge(source, phi, EdgeKind::Data);
                }
                self.graph.add_edge(phi, inode, EdgeKind::Data);
                return;
            }
        }
        self.data_edge_from(func, ptr, inode);
    }

    fn data_edge_from(&mut self, func: FuncId, value: ValueRef, to: NodeId) {
        match self.node_for_value(func, value) {
            Some(node) => {
                self.graph.add_edge(node, to, EdgeKind::Data);
            }
            None => debug!(?value, "no node for operand, edge omitted"),
        }
    }

    /// The node standing for `value` in the context of `func`. A formal
    /// argument of another function has no node here.
    fn node_for_value(&mut self, func: FuncId, value: ValueRef) -> Option<NodeId> {
        match value {
            ValueRef::Inst(i) => Some(self.graph.node_of(NodeKind::Instruction(i))),
            ValueRef::Const(c) => Some(self.graph.node_of(NodeKind::Constant(c))),
            ValueRef::Global(g) => Some(self.graph.node_of(NodeKind::GlobalVariable(g))),
            ValueRef::Arg(a) => {
                if self.module.argument(a).func == func {
                    self.ensure_formals(func);
                    Some(self.graph.node_of(NodeKind::FormalArgument(a)))
                } else {
                    debug!(arg = a.0, "argument of another function used as operand");
                    None
                }
            }
        }
    }
}
