//! Module-level analysis driver.
//!
//! [`ModuleAnalysis`] runs the per-block analyzers over every function of a
//! module in one pass and finalizes the results:
//!
//! 1. Functions are visited callees-first (post-order over the direct-call
//!    graph), so a caller sees its callees' provisional summaries. A callee
//!    on a call cycle is still in flight when queried; the getter answers
//!    `None` and the caller goes conservative.
//! 2. Within a function, blocks run in layout order. A block whose
//!    predecessor branches on a dependent condition, or whose predecessor has
//!    not been analyzed yet (a back edge), runs under the non-determinism
//!    decorator.
//! 3. Caller-known argument dependencies are propagated over the recorded
//!    call classifications to a fixed point, then every summary is finalized
//!    against them and against the module-wide global summary.

use fixedbitset::FixedBitSet;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::dep::{DepInfo, DepKind};
use crate::error::{DepflowError, Result};
use crate::ir::{ArgId, BlockId, Callee, FuncId, GlobalId, InstKind, Module, ValueRef};
use crate::queries::{AliasQuery, DefUseResolver, FunctionAnalysisGetter};

use super::block::{BlockAnalysis, BlockOutcome};
use super::reflecting::NonDetBlockAnalysis;
use super::stub::ConservativeSummary;
use super::summary::{FunctionDependencyInfo, FunctionSummary};
use super::DependencyAnalyzer;

enum SummaryEntry {
    Analyzed(FunctionSummary),
    Stub(ConservativeSummary),
}

impl SummaryEntry {
    fn as_info(&self) -> &dyn FunctionDependencyInfo {
        match self {
            SummaryEntry::Analyzed(s) => s,
            SummaryEntry::Stub(s) => s,
        }
    }
}

/// Per-function summaries keyed by function, behind the
/// [`FunctionAnalysisGetter`] contract.
#[derive(Default)]
pub struct SummaryStore {
    map: FxHashMap<FuncId, SummaryEntry>,
}

impl SummaryStore {
    fn insert_analyzed(&mut self, func: FuncId, summary: FunctionSummary) {
        self.map.insert(func, SummaryEntry::Analyzed(summary));
    }

    fn insert_stub(&mut self, func: FuncId, stub: ConservativeSummary) {
        self.map.insert(func, SummaryEntry::Stub(stub));
    }

    /// The full summary of `func`, when the driver analyzed its body.
    pub fn analyzed(&self, func: FuncId) -> Option<&FunctionSummary> {
        match self.map.get(&func) {
            Some(SummaryEntry::Analyzed(s)) => Some(s),
            _ => None,
        }
    }
}

impl FunctionAnalysisGetter for SummaryStore {
    fn summary_of(&self, func: FuncId) -> Option<&dyn FunctionDependencyInfo> {
        self.map.get(&func).map(SummaryEntry::as_info)
    }
}

/// One-pass input-dependency analysis of a whole module.
pub struct ModuleAnalysis<'m> {
    module: &'m Module,
    aliases: &'m dyn AliasQuery,
    def_use: Option<&'m dyn DefUseResolver>,
    store: SummaryStore,
    dependent_args: FxHashMap<FuncId, FxHashSet<ArgId>>,
    global_deps: FxHashMap<GlobalId, DepInfo>,
    ran: bool,
}

impl<'m> ModuleAnalysis<'m> {
    /// Analysis over `module` with the given alias collaborator.
    pub fn new(module: &'m Module, aliases: &'m dyn AliasQuery) -> Self {
        Self {
            module,
            aliases,
            def_use: None,
            store: SummaryStore::default(),
            dependent_args: FxHashMap::default(),
            global_deps: FxHashMap::default(),
            ran: false,
        }
    }

    /// Plug in a def-site collaborator for memory-value resolution.
    pub fn with_def_use(mut self, def_use: &'m dyn DefUseResolver) -> Self {
        self.def_use = Some(def_use);
        self
    }

    /// Run the analysis. Fails on an empty module; runs at most once.
    pub fn run(&mut self) -> Result<()> {
        assert!(!self.ran, "analysis already ran");
        self.ran = true;
        if self.module.function_count() == 0 {
            return Err(DepflowError::InvalidArgument(
                "module has no functions to analyze".into(),
            ));
        }

        for func in self.call_graph_postorder() {
            if self.module.function(func).blocks.is_empty() {
                debug!(func = func.0, "no body, using conservative stub");
                self.store
                    .insert_stub(func, ConservativeSummary::new(self.module, func));
                continue;
            }
            let summary = self.analyze_function(func);
            self.store.insert_analyzed(func, summary);
        }

        self.propagate_dependent_args();
        self.finalize_summaries();
        Ok(())
    }

    /// Summary of `func`, if the analysis produced one.
    pub fn summary(&self, func: FuncId) -> Option<&dyn FunctionDependencyInfo> {
        self.store.summary_of(func)
    }

    /// The finished summary store.
    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    /// Formal arguments of `func` known to receive input-dependent actuals.
    pub fn dependent_args(&self, func: FuncId) -> Option<&FxHashSet<ArgId>> {
        self.dependent_args.get(&func)
    }

    /// Module-wide classification of a global after finalization.
    pub fn global_dep(&self, global: GlobalId) -> DepInfo {
        self.global_deps.get(&global).cloned().unwrap_or_default()
    }

    /// Callees-first visitation order over the direct-call graph.
    fn call_graph_postorder(&self) -> Vec<FuncId> {
        let n = self.module.function_count();
        let mut callees: FxHashMap<FuncId, Vec<FuncId>> = FxHashMap::default();
        for function in self.module.functions() {
            let mut targets = Vec::new();
            for &block in &function.blocks {
                for &inst in &self.module.block(block).insts {
                    if let InstKind::Call {
                        callee: Callee::Direct(f),
                        ..
                    } = &self.module.inst(inst).kind
                    {
                        targets.push(*f);
                    }
                }
            }
            callees.insert(function.id, targets);
        }

        let mut visited = FixedBitSet::with_capacity(n);
        let mut order = Vec::with_capacity(n);
        for function in self.module.functions() {
            // Iterative DFS; the second stack entry marks post-visit.
            let mut stack = vec![(function.id, false)];
            while let Some((f, post)) = stack.pop() {
                if post {
                    order.push(f);
                    continue;
                }
                if visited.contains(f.0 as usize) {
                    continue;
                }
                visited.insert(f.0 as usize);
                stack.push((f, true));
                if let Some(targets) = callees.get(&f) {
                    for &t in targets {
                        if !visited.contains(t.0 as usize) {
                            stack.push((t, false));
                        }
                    }
                }
            }
        }
        order
    }

    /// Targets of back edges in `func`'s control flow, found by a DFS from
    /// the entry block.
    fn back_edge_targets(&self, func: FuncId) -> FxHashSet<BlockId> {
        let mut targets = FxHashSet::default();
        let Some(entry) = self.module.function(func).entry() else {
            return targets;
        };
        let n = self.module.block_count();
        let mut visited = FixedBitSet::with_capacity(n);
        let mut on_stack = FixedBitSet::with_capacity(n);
        visited.insert(entry.0 as usize);
        on_stack.insert(entry.0 as usize);
        let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
        while let Some((block, cursor)) = stack.last_mut() {
            let succs = &self.module.block(*block).succs;
            if *cursor < succs.len() {
                let next = succs[*cursor];
                *cursor += 1;
                if on_stack.contains(next.0 as usize) {
                    targets.insert(next);
                } else if !visited.contains(next.0 as usize) {
                    visited.insert(next.0 as usize);
                    on_stack.insert(next.0 as usize);
                    stack.push((next, 0));
                }
            } else {
                on_stack.set(block.0 as usize, false);
                stack.pop();
            }
        }
        targets
    }

    /// Analyze every block of `func` in layout order, decorating blocks
    /// reached through unpredictable control flow.
    fn analyze_function(&self, func: FuncId) -> FunctionSummary {
        debug!(func = func.0, "analyzing function");
        let function = self.module.function(func);
        let back_targets = self.back_edge_targets(func);
        let mut outcomes: FxHashMap<BlockId, BlockOutcome> = FxHashMap::default();
        let mut summary = FunctionSummary::new(func, function.blocks.len());

        for &block in &function.blocks {
            let mut ambient = DepInfo::default();
            if back_targets.contains(&block) {
                // Loop header: the trip count is not statically known.
                ambient.merge(&DepInfo::input_dep());
            }
            let mut incoming_values: FxHashMap<ValueRef, Vec<DepInfo>> = FxHashMap::default();
            let mut incoming_out: FxHashMap<ArgId, Vec<DepInfo>> = FxHashMap::default();

            for &pred in &self.module.block(block).preds {
                let Some(outcome) = outcomes.get(&pred) else {
                    // Back edge: the loop's trip count is unknown here.
                    ambient.merge(&DepInfo::input_dep());
                    continue;
                };
                // Control taint is transitive: a predecessor analyzed under
                // ambient taint passes it to every successor.
                if let Some(pred_ambient) = &outcome.ambient {
                    ambient.merge(pred_ambient);
                }
                for (value, info) in &outcome.value_deps {
                    incoming_values.entry(*value).or_default().push(info.clone());
                }
                for (arg, info) in &outcome.out_arg_deps {
                    incoming_out.entry(*arg).or_default().push(info.clone());
                }
                if let Some(term) = self.module.terminator(pred) {
                    if let InstKind::Branch { cond: Some(_), .. } = &term.kind {
                        let branch = outcome
                            .inst_deps
                            .get(&term.id)
                            .cloned()
                            .unwrap_or_default();
                        if branch.is_defined() && !branch.is_input_indep() {
                            ambient.merge(&branch);
                        }
                    }
                }
            }

            let inner =
                BlockAnalysis::new(self.module, block, self.aliases, &self.store, self.def_use);
            let mut analyzer: Box<dyn DependencyAnalyzer + '_> =
                if ambient.is_defined() && !ambient.is_input_indep() {
                    debug!(block = block.0, "decorating block with ambient taint");
                    Box::new(NonDetBlockAnalysis::new(inner, ambient))
                } else {
                    Box::new(inner)
                };
            analyzer.set_initial_value_deps(&incoming_values);
            analyzer.set_out_arguments(&incoming_out);
            analyzer.analyze();

            let outcome = analyzer.outcome();
            summary.absorb(&outcome);
            outcomes.insert(block, outcome);
        }
        summary
    }

    /// Propagate input-dependent actuals through the recorded call
    /// classifications to a fixed point. Functions with no recorded caller
    /// are entry points: all their formals receive external input.
    fn propagate_dependent_args(&mut self) {
        let module = self.module;
        let mut called: FxHashSet<FuncId> = FxHashSet::default();
        for function in module.functions() {
            if let Some(summary) = self.store.summary_of(function.id) {
                called.extend(summary.call_sites());
            }
        }
        for function in module.functions() {
            if !called.contains(&function.id) {
                self.dependent_args
                    .insert(function.id, function.args.iter().copied().collect());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for caller in module.functions() {
                let Some(summary) = self.store.summary_of(caller.id) else {
                    continue;
                };
                let caller_deps = self
                    .dependent_args
                    .get(&caller.id)
                    .cloned()
                    .unwrap_or_default();
                for callee in summary.call_sites() {
                    if !summary.has_call_dep_info(callee) {
                        continue;
                    }
                    let formals = &module.function(callee).args;
                    let args = summary.call_dep_info(callee).args();
                    let mut newly_dependent = Vec::new();
                    for (index, info) in args.iter().enumerate() {
                        let dependent = match info.kind() {
                            DepKind::InputDep | DepKind::ValueDep => true,
                            DepKind::ArgumentDep => info.depends_on_any(&caller_deps),
                            _ => false,
                        };
                        if dependent {
                            if let Some(&formal) = formals.get(index) {
                                newly_dependent.push(formal);
                            }
                        }
                    }
                    let entry = self.dependent_args.entry(callee).or_default();
                    for formal in newly_dependent {
                        if entry.insert(formal) {
                            changed = true;
                        }
                    }
                }
            }
        }
    }

    /// Resolve every summary against the propagated argument context and the
    /// module-wide global summary.
    fn finalize_summaries(&mut self) {
        let funcs: Vec<FuncId> = self.module.functions().map(|f| f.id).collect();
        let empty = FxHashSet::default();
        for &func in &funcs {
            let dependent = self.dependent_args.get(&func).cloned();
            if let Some(SummaryEntry::Analyzed(summary)) = self.store.map.get_mut(&func) {
                summary.finalize(dependent.as_ref().unwrap_or(&empty));
            }
        }

        // A global never written anywhere keeps its initializer; otherwise
        // it carries whatever the writers stored, conservatively.
        for global in self.module.globals() {
            let mut merged = DepInfo::default();
            let mut modified = false;
            for &func in &funcs {
                if let Some(summary) = self.store.analyzed(func) {
                    if summary.modified_globals().contains(&global.id) {
                        modified = true;
                        merged.merge(&summary.value_dep(ValueRef::Global(global.id)));
                    }
                }
            }
            let dep = if !modified {
                DepInfo::input_indep()
            } else if merged.is_input_indep() {
                DepInfo::input_indep()
            } else {
                DepInfo::input_dep()
            };
            self.global_deps.insert(global.id, dep);
        }

        for &func in &funcs {
            if let Some(SummaryEntry::Analyzed(summary)) = self.store.map.get_mut(&func) {
                summary.finalize_globals(&self.global_deps);
            }
        }
    }
}

impl FunctionAnalysisGetter for ModuleAnalysis<'_> {
    fn summary_of(&self, func: FuncId) -> Option<&dyn FunctionDependencyInfo> {
        self.store.summary_of(func)
    }
}
