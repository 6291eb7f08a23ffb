//! Per-function analysis summaries.
//!
//! [`FunctionSummary`] accumulates the [`BlockOutcome`]s of a function's
//! blocks and answers the [`FunctionDependencyInfo`] query contract. Before
//! finalization it answers from the provisional tables (that is what
//! interprocedural callers see while the module pass is still running);
//! after finalization every classification is terminal and the summary is
//! frozen.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::dep::{DepInfo, DepKind};
use crate::ir::{ArgId, BlockId, FuncId, GlobalId, InstId, ValueRef};

use super::block::BlockOutcome;

/// Resolve one classification against the caller-known dependent arguments.
///
/// The only demotion path in the whole analysis: a provisional ArgumentDep
/// whose witness arguments are all independent becomes InputIndep. ValueDep
/// entries survive (minus settled argument witnesses) for the global pass.
pub(crate) fn resolve_with_args(info: &DepInfo, dependent_args: &FxHashSet<ArgId>) -> DepInfo {
    match info.kind() {
        DepKind::Undefined => info.clone(),
        DepKind::InputIndep => DepInfo::input_indep(),
        DepKind::InputDep => DepInfo::input_dep(),
        DepKind::ArgumentDep => {
            if info.depends_on_any(dependent_args) {
                DepInfo::input_dep()
            } else {
                DepInfo::input_indep()
            }
        }
        DepKind::ValueDep => {
            if info.depends_on_any(dependent_args) {
                DepInfo::input_dep()
            } else {
                DepInfo::value_dep(info.value_deps().iter().copied())
            }
        }
    }
}

/// Resolve one classification against the module-wide global summary.
/// A witness that is not a global, or a global the summary does not know,
/// escalates to InputDep.
pub(crate) fn resolve_with_globals(
    info: &DepInfo,
    global_deps: &FxHashMap<GlobalId, DepInfo>,
) -> DepInfo {
    if !info.is_value_dep() {
        return info.clone();
    }
    let mut out = DepInfo::input_indep();
    for value in info.value_deps() {
        let dependent = match value {
            ValueRef::Global(g) => global_deps.get(g).map_or(true, |d| !d.is_input_indep()),
            _ => true,
        };
        if dependent {
            out = DepInfo::input_dep();
            break;
        }
    }
    out
}

/// Merged actual-argument classifications for one callee, across all call
/// sites in the recording scope.
#[derive(Debug, Clone, Default)]
pub struct CallDepInfo {
    args: Vec<DepInfo>,
    sites: usize,
}

impl CallDepInfo {
    /// Fold one call site's actual-argument classifications in, elementwise.
    pub fn merge_site(&mut self, args: Vec<DepInfo>) {
        if self.args.len() < args.len() {
            self.args.resize(args.len(), DepInfo::default());
        }
        for (slot, info) in self.args.iter_mut().zip(args.iter()) {
            if info.is_defined() {
                slot.merge(info);
            }
        }
        self.sites += 1;
    }

    /// Fold another recording of the same callee in.
    pub fn merge(&mut self, other: &CallDepInfo) {
        if self.args.len() < other.args.len() {
            self.args.resize(other.args.len(), DepInfo::default());
        }
        for (slot, info) in self.args.iter_mut().zip(other.args.iter()) {
            if info.is_defined() {
                slot.merge(info);
            }
        }
        self.sites += other.sites;
    }

    /// Merged classification per formal-argument position.
    #[inline]
    pub fn args(&self) -> &[DepInfo] {
        &self.args
    }

    pub(crate) fn args_mut(&mut self) -> &mut [DepInfo] {
        &mut self.args
    }

    /// Number of call sites folded in.
    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites
    }
}

/// Post-finalization counts for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub input_dep_instructions: usize,
    pub input_indep_instructions: usize,
    pub input_dep_blocks: usize,
    pub input_indep_blocks: usize,
}

/// Query contract of a finished (or in-flight) function analysis. Both the
/// real [`FunctionSummary`] and the conservative stub answer it.
pub trait FunctionDependencyInfo {
    /// The summarized function.
    fn function(&self) -> FuncId;

    /// Whether anything in the function is input-dependent.
    fn is_input_dep_function(&self) -> bool;

    /// Whether `inst` is input-dependent. Panics if the function does not
    /// own `inst`.
    fn is_input_dependent(&self, inst: InstId) -> bool;

    /// Whether `inst` is input-independent. Panics if the function does not
    /// own `inst`.
    fn is_input_independent(&self, inst: InstId) -> bool;

    /// Whether `block` as a whole is input-dependent (reached through
    /// dependent control flow).
    fn is_input_dependent_block(&self, block: BlockId) -> bool;

    /// The function's return-value classification. Provisional kinds are
    /// visible while the module pass is still running; that is what lets
    /// callers map an argument-dependent return through their actuals.
    fn return_dep(&self) -> DepInfo;

    /// Directly called functions, in stable order.
    fn call_sites(&self) -> Vec<FuncId>;

    /// Whether actual-argument classifications were recorded for `callee`.
    fn has_call_dep_info(&self, callee: FuncId) -> bool;

    /// Actual-argument classifications for `callee`. Panics if none were
    /// recorded; guard with [`Self::has_call_dep_info`].
    fn call_dep_info(&self, callee: FuncId) -> &CallDepInfo;

    fn input_dep_instr_count(&self) -> usize;
    fn input_indep_instr_count(&self) -> usize;
    fn input_dep_block_count(&self) -> usize;
    fn input_indep_block_count(&self) -> usize;

    /// Counts, bundled for reporting.
    fn stats(&self) -> SummaryStats {
        SummaryStats {
            input_dep_instructions: self.input_dep_instr_count(),
            input_indep_instructions: self.input_indep_instr_count(),
            input_dep_blocks: self.input_dep_block_count(),
            input_indep_blocks: self.input_indep_block_count(),
        }
    }
}

/// Accumulated analysis result of one function.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    func: FuncId,
    block_count: usize,
    inst_deps: FxHashMap<InstId, DepInfo>,
    indep_insts: FxHashSet<InstId>,
    final_input_dep: FxHashSet<InstId>,
    inst_blocks: FxHashMap<InstId, BlockId>,
    value_deps: FxHashMap<ValueRef, DepInfo>,
    return_dep: DepInfo,
    out_arg_deps: FxHashMap<ArgId, DepInfo>,
    referenced_globals: FxHashSet<GlobalId>,
    modified_globals: FxHashSet<GlobalId>,
    called: FxHashSet<FuncId>,
    call_deps: FxHashMap<FuncId, CallDepInfo>,
    block_ambients: FxHashMap<BlockId, DepInfo>,
    input_dep_blocks: FxHashSet<BlockId>,
    finalized: bool,
}

impl FunctionSummary {
    /// Empty summary for `func`, which has `block_count` blocks.
    pub fn new(func: FuncId, block_count: usize) -> Self {
        Self {
            func,
            block_count,
            inst_deps: FxHashMap::default(),
            indep_insts: FxHashSet::default(),
            final_input_dep: FxHashSet::default(),
            inst_blocks: FxHashMap::default(),
            value_deps: FxHashMap::default(),
            return_dep: DepInfo::default(),
            out_arg_deps: FxHashMap::default(),
            referenced_globals: FxHashSet::default(),
            modified_globals: FxHashSet::default(),
            called: FxHashSet::default(),
            call_deps: FxHashMap::default(),
            block_ambients: FxHashMap::default(),
            input_dep_blocks: FxHashSet::default(),
            finalized: false,
        }
    }

    /// Fold one block's outcome in.
    pub fn absorb(&mut self, outcome: &BlockOutcome) {
        for (inst, info) in &outcome.inst_deps {
            self.inst_deps.entry(*inst).or_default().merge(info);
        }
        self.indep_insts.extend(outcome.indep_insts.iter().copied());
        self.final_input_dep
            .extend(outcome.final_input_dep.iter().copied());
        for inst in &outcome.owned_insts {
            self.inst_blocks.insert(*inst, outcome.block);
        }
        for (value, info) in &outcome.value_deps {
            self.value_deps.entry(*value).or_default().merge(info);
        }
        self.return_dep.merge(&outcome.return_dep);
        for (arg, info) in &outcome.out_arg_deps {
            self.out_arg_deps.entry(*arg).or_default().merge(info);
        }
        self.referenced_globals
            .extend(outcome.referenced_globals.iter().copied());
        self.modified_globals
            .extend(outcome.modified_globals.iter().copied());
        self.called.extend(outcome.called.iter().copied());
        for (callee, call) in &outcome.call_deps {
            self.call_deps.entry(*callee).or_default().merge(call);
        }
        if let Some(ambient) = &outcome.ambient {
            self.block_ambients.insert(outcome.block, ambient.clone());
        }
        if outcome.input_dep_block {
            self.input_dep_blocks.insert(outcome.block);
        }
    }

    /// Resolve provisional argument-dependent entries against the
    /// caller-known dependent arguments.
    pub fn finalize(&mut self, dependent_args: &FxHashSet<ArgId>) {
        assert!(!self.finalized, "summary already finalized");
        self.resolve_tables(|info| resolve_with_args(info, dependent_args));
        let marked: Vec<BlockId> = self
            .block_ambients
            .iter()
            .filter(|(_, ambient)| {
                ambient.is_input_dep() || ambient.depends_on_any(dependent_args)
            })
            .map(|(block, _)| *block)
            .collect();
        self.input_dep_blocks.extend(marked);
    }

    /// Resolve remaining value-dependent entries against the module-wide
    /// global summary and freeze the summary.
    pub fn finalize_globals(&mut self, global_deps: &FxHashMap<GlobalId, DepInfo>) {
        assert!(!self.finalized, "summary already finalized");
        self.resolve_tables(|info| resolve_with_globals(info, global_deps));
        let marked: Vec<BlockId> = self
            .block_ambients
            .iter()
            .filter(|(_, ambient)| {
                ambient.kind() == DepKind::ValueDep
                    && resolve_with_globals(ambient, global_deps).is_input_dep()
            })
            .map(|(block, _)| *block)
            .collect();
        self.input_dep_blocks.extend(marked);
        self.finalized = true;
    }

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
                _ => {
                    self.inst_deps.insert(inst, resolved);
                }
            }
        }
    }

    /// Whether the summary has been frozen.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Classification of a tracked location at function exit.
    pub fn value_dep(&self, value: ValueRef) -> DepInfo {
        self.value_deps.get(&value).cloned().unwrap_or_default()
    }

    /// Out-parameter classifications.
    #[inline]
    pub fn out_arg_deps(&self) -> &FxHashMap<ArgId, DepInfo> {
        &self.out_arg_deps
    }

    /// Globals read anywhere in the function.
    #[inline]
    pub fn referenced_globals(&self) -> &FxHashSet<GlobalId> {
        &self.referenced_globals
    }

    /// Globals written anywhere in the function.
    #[inline]
    pub fn modified_globals(&self) -> &FxHashSet<GlobalId> {
        &self.modified_globals
    }

    fn owning_block(&self, inst: InstId) -> BlockId {
        *self
            .inst_blocks
            .get(&inst)
            .unwrap_or_else(|| panic!("instruction {inst:?} not owned by the summarized function"))
    }
}

impl FunctionDependencyInfo for FunctionSummary {
    fn function(&self) -> FuncId {
        self.func
    }

    fn is_input_dep_function(&self) -> bool {
        !self.final_input_dep.is_empty()
            || !self.input_dep_blocks.is_empty()
            || self.return_dep.is_input_dep()
            || (!self.finalized && !self.inst_deps.is_empty())
    }

    fn is_input_dependent(&self, inst: InstId) -> bool {
        let block = self.owning_block(inst);
        if self.input_dep_blocks.contains(&block) {
            return true;
        }
        if self.finalized {
            self.final_input_dep.contains(&inst)
        } else {
            self.inst_deps.contains_key(&inst)
        }
    }

    fn is_input_independent(&self, inst: InstId) -> bool {
        !self.is_input_dependent(inst)
    }

    fn is_input_dependent_block(&self, block: BlockId) -> bool {
        self.input_dep_blocks.contains(&block)
    }

    fn return_dep(&self) -> DepInfo {
        self.return_dep.clone()
    }

    fn call_sites(&self) -> Vec<FuncId> {
        let mut callees: Vec<FuncId> = self.called.iter().copied().collect();
        callees.sort_unstable();
        callees
    }

    fn has_call_dep_info(&self, callee: FuncId) -> bool {
        self.call_deps.contains_key(&callee)
    }

    fn call_dep_info(&self, callee: FuncId) -> &CallDepInfo {
        self.call_deps
            .get(&callee)
            .unwrap_or_else(|| panic!("no call record for {callee:?}"))
    }

    fn input_dep_instr_count(&self) -> usize {
        self.inst_blocks
            .iter()
            .filter(|(inst, block)| {
                self.final_input_dep.contains(inst) || self.input_dep_blocks.contains(block)
            })
            .count()
    }

    fn input_indep_instr_count(&self) -> usize {
        self.inst_blocks.len() - self.input_dep_instr_count()
    }

    fn input_dep_block_count(&self) -> usize {
        self.input_dep_blocks.len()
    }

    fn input_indep_block_count(&self) -> usize {
        self.block_count - self.input_dep_blocks.len()
    }
}
