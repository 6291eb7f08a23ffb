//! Intra-block dependency analysis state.
//!
//! [`BlockAnalysis`] owns the per-block tables the classification engine
//! writes into: instruction classifications, the tracked-location value
//! table, out-parameter and return summaries, and the call/global
//! bookkeeping a [`super::FunctionSummary`] absorbs.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dep::{DepInfo, DepKind};
use crate::ir::{ArgId, BlockId, FuncId, GlobalId, InstId, Module, ValueRef};
use crate::queries::{AliasQuery, AliasResult, DefUseResolver, FunctionAnalysisGetter};

use super::summary::{resolve_with_args, resolve_with_globals, CallDepInfo};
use super::DependencyAnalyzer;

/// Everything one analyzed block contributes to its function's summary.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    /// The analyzed block.
    pub block: BlockId,
    /// Dependent (or still provisional) instruction classifications.
    pub inst_deps: FxHashMap<InstId, DepInfo>,
    /// Instructions classified input-independent.
    pub indep_insts: FxHashSet<InstId>,
    /// Instructions fixed input-dependent by finalization.
    pub final_input_dep: FxHashSet<InstId>,
    /// The tracked-location table at block exit.
    pub value_deps: FxHashMap<ValueRef, DepInfo>,
    /// Contribution to the function's return classification.
    pub return_dep: DepInfo,
    /// Out-parameter classifications at block exit.
    pub out_arg_deps: FxHashMap<ArgId, DepInfo>,
    /// Globals read in this block.
    pub referenced_globals: FxHashSet<GlobalId>,
    /// Globals written in this block.
    pub modified_globals: FxHashSet<GlobalId>,
    /// Directly called functions.
    pub called: FxHashSet<FuncId>,
    /// Actual-argument classifications per callee.
    pub call_deps: FxHashMap<FuncId, CallDepInfo>,
    /// All instructions of the block, for ownership checks and counts.
    pub owned_insts: Vec<InstId>,
    /// Whether finalization has run.
    pub finalized: bool,
    /// Ambient classification injected by the non-determinism decorator.
    pub ambient: Option<DepInfo>,
    /// Whether the decorator marked the whole block input-dependent.
    pub input_dep_block: bool,
}

/// The intra-block analyzer: plain storage for the engine in
/// [`DependencyAnalyzer`], with no ambient injection.
pub struct BlockAnalysis<'a> {
    module: &'a Module,
    func: FuncId,
    block: BlockId,
    aliases: &'a dyn AliasQuery,
    getter: &'a dyn FunctionAnalysisGetter,
    def_use: Option<&'a dyn DefUseResolver>,

    inst_deps: FxHashMap<InstId, DepInfo>,
    indep_insts: FxHashSet<InstId>,
    final_input_dep: FxHashSet<InstId>,
    value_deps: FxHashMap<ValueRef, DepInfo>,
    return_dep: DepInfo,
    branch_dep: DepInfo,
    out_arg_deps: FxHashMap<ArgId, DepInfo>,
    referenced_globals: FxHashSet<GlobalId>,
    modified_globals: FxHashSet<GlobalId>,
    called: FxHashSet<FuncId>,
    call_deps: FxHashMap<FuncId, CallDepInfo>,
    finalized: bool,
}

impl<'a> BlockAnalysis<'a> {
    /// Analyzer over `block`, wired to its collaborators.
    pub fn new(
        module: &'a Module,
        block: BlockId,
        aliases: &'a dyn AliasQuery,
        getter: &'a dyn FunctionAnalysisGetter,
        def_use: Option<&'a dyn DefUseResolver>,
    ) -> Self {
        let func = module.block(block).func;
        Self {
            module,
            func,
            block,
            aliases,
            getter,
            def_use,
            inst_deps: FxHashMap::default(),
            indep_insts: FxHashSet::default(),
            final_input_dep: FxHashSet::default(),
            value_deps: FxHashMap::default(),
            return_dep: DepInfo::default(),
            branch_dep: DepInfo::default(),
            out_arg_deps: FxHashMap::default(),
            referenced_globals: FxHashSet::default(),
            modified_globals: FxHashSet::default(),
            called: FxHashSet::default(),
            call_deps: FxHashMap::default(),
            finalized: false,
        }
    }

    /// Resolve every table through `resolve`, reclassifying instructions
    /// between the dependent and independent sets as kinds settle.
    fn resolve_tables(&mut self, resolve: impl Fn(&DepInfo) -> DepInfo) {
        for info in self.value_deps.values_mut() {
            *info = resolve(info);
        }
        for info in self.out_arg_deps.values_mut() {
            *info = resolve(info);
        }
        for call in self.call_deps.values_mut() {
            for info in call.args_mut() {
                *info = resolve(info);
            }
        }
        self.return_dep = resolve(&self.return_dep);
        self.branch_dep = resolve(&self.branch_dep);

        let insts: Vec<InstId> = self.inst_deps.keys().copied().collect();
        for inst in insts {
            let resolved = resolve(&self.inst_deps[&inst]);
            match resolved.kind() {
                DepKind::InputDep => {
                    self.final_input_dep.insert(inst);
                    self.inst_deps.insert(inst, resolved);
                }
                DepKind::InputIndep => {
                    self.inst_deps.remove(&inst);
                    self.indep_insts.insert(inst);
                }
                // Still provisional; the global pass settles it.
                _ => {
                    self.inst_deps.insert(inst, resolved);
                }
            }
        }
    }
}

impl DependencyAnalyzer for BlockAnalysis<'_> {
    fn module(&self) -> &Module {
        self.module
    }

    fn func(&self) -> FuncId {
        self.func
    }

    fn block_id(&self) -> BlockId {
        self.block
    }

    fn alias_query(&self) -> &dyn AliasQuery {
        self.aliases
    }

    fn analysis_getter(&self) -> &dyn FunctionAnalysisGetter {
        self.getter
    }

    fn def_use(&self) -> Option<&dyn DefUseResolver> {
        self.def_use
    }

    fn lookup_instruction_dep(&self, inst: InstId) -> Option<DepInfo> {
        if let Some(info) = self.inst_deps.get(&inst) {
            return Some(info.clone());
        }
        if self.indep_insts.contains(&inst) {
            return Some(DepInfo::input_indep());
        }
        None
    }

    fn instruction_dep(&mut self, inst: InstId) -> DepInfo {
        self.compute_instruction_dep(inst)
    }

    fn value_dep(&self, value: ValueRef) -> DepInfo {
        self.value_deps.get(&value).cloned().unwrap_or_default()
    }

    fn return_dep(&self) -> DepInfo {
        self.return_dep.clone()
    }

    fn update_instruction_dep(&mut self, inst: InstId, info: DepInfo) {
        match info.kind() {
            DepKind::Undefined => panic!("undefined classification for {inst:?}"),
            DepKind::InputIndep => {
                self.indep_insts.insert(inst);
            }
            _ => {
                self.inst_deps.entry(inst).or_default().merge(&info);
            }
        }
    }

    fn update_value_dep(&mut self, value: ValueRef, info: DepInfo) {
        assert!(
            info.is_defined(),
            "undefined classification for location {value:?}"
        );
        self.value_deps.entry(value).or_default().merge(&info);
        // Conservatively taint every other tracked location the target may
        // alias.
        let others: Vec<ValueRef> = self
            .value_deps
            .keys()
            .copied()
            .filter(|v| *v != value)
            .collect();
        for other in others {
            if self.aliases.alias(value, other) != AliasResult::NoAlias {
                self.value_deps.entry(other).or_default().merge(&info);
            }
        }
    }

    fn update_return_dep(&mut self, info: DepInfo) {
        if info.is_defined() {
            self.return_dep.merge(&info);
        }
    }

    fn update_out_arg_dep(&mut self, arg: ArgId, info: DepInfo) {
        if info.is_defined() {
            self.out_arg_deps.entry(arg).or_default().merge(&info);
        }
    }

    fn record_branch_dep(&mut self, info: DepInfo) {
        if info.is_defined() {
            self.branch_dep.merge(&info);
        }
    }

    fn record_call(&mut self, callee: FuncId, args: Vec<DepInfo>) {
        self.called.insert(callee);
        self.call_deps.entry(callee).or_default().merge_site(args);
    }

    fn record_referenced_global(&mut self, global: GlobalId) {
        self.referenced_globals.insert(global);
    }

    fn record_modified_global(&mut self, global: GlobalId) {
        self.modified_globals.insert(global);
    }

    fn value_table(&self) -> &FxHashMap<ValueRef, DepInfo> {
        &self.value_deps
    }

    fn out_arg_table(&self) -> &FxHashMap<ArgId, DepInfo> {
        &self.out_arg_deps
    }

    fn branch_dep(&self) -> DepInfo {
        self.branch_dep.clone()
    }

    fn set_initial_value_deps(&mut self, incoming: &FxHashMap<ValueRef, Vec<DepInfo>>) {
        for (value, deps) in incoming {
            let entry = self.value_deps.entry(*value).or_default();
            for dep in deps {
                // Lower-kind contributions are dropped entirely: the highest
                // incoming kind wins and only peers merge witnesses.
                if dep.kind() >= entry.kind() {
                    entry.merge(dep);
                }
            }
        }
    }

    fn set_out_arguments(&mut self, incoming: &FxHashMap<ArgId, Vec<DepInfo>>) {
        for (arg, deps) in incoming {
            let entry = self.out_arg_deps.entry(*arg).or_default();
            for dep in deps {
                if dep.kind() >= entry.kind() {
                    entry.merge(dep);
                }
            }
        }
    }

    fn finalize(&mut self, dependent_args: &FxHashSet<ArgId>) {
        self.resolve_tables(|info| resolve_with_args(info, dependent_args));
        self.finalized = true;
    }

    fn finalize_globals(&mut self, global_deps: &FxHashMap<GlobalId, DepInfo>) {
        self.resolve_tables(|info| resolve_with_globals(info, global_deps));
    }

    fn is_input_dependent(&self, inst: InstId) -> bool {
        assert_eq!(
            self.module.inst(inst).func,
            self.func,
            "instruction {inst:?} queried through the wrong function"
        );
        if self.finalized {
            self.final_input_dep.contains(&inst)
        } else {
            self.inst_deps.contains_key(&inst)
        }
    }

    fn outcome(&self) -> BlockOutcome {
        BlockOutcome {
            block: self.block,
            inst_deps: self.inst_deps.clone(),
            indep_insts: self.indep_insts.clone(),
            final_input_dep: self.final_input_dep.clone(),
            value_deps: self.value_deps.clone(),
            return_dep: self.return_dep.clone(),
            out_arg_deps: self.out_arg_deps.clone(),
            referenced_globals: self.referenced_globals.clone(),
            modified_globals: self.modified_globals.clone(),
            called: self.called.clone(),
            call_deps: self.call_deps.clone(),
            owned_insts: self.module.block(self.block).insts.clone(),
            finalized: self.finalized,
            ambient: None,
            input_dep_block: false,
        }
    }
}
