//! Input-dependency analysis.
//!
//! Classifies every instruction and tracked memory location of a function by
//! whether its runtime result can vary with external input, producing a
//! [`FunctionSummary`] per function. The analyzer family is a closed set:
//!
//! - [`BlockAnalysis`]: the intra-block analyzer; walks one block's
//!   instructions in program order.
//! - [`NonDetBlockAnalysis`]: a decorator over [`BlockAnalysis`] for blocks
//!   reached through unpredictable control flow; injects an ambient
//!   [`DepInfo`] on every read and write.
//! - [`ConservativeSummary`]: the fallback for functions that are never
//!   analyzed in detail; answers the same query contract with "everything is
//!   input-dependent".
//!
//! The per-instruction classification rules live as default methods on
//! [`DependencyAnalyzer`], so the same engine runs against either analyzer
//! variant and every read/write dispatches through the implementor. That is
//! how the decorator's ambient merge reaches nested lookups.

pub mod block;
pub mod driver;
pub mod reflecting;
pub mod stub;
pub mod summary;

pub use block::{BlockAnalysis, BlockOutcome};
pub use driver::{ModuleAnalysis, SummaryStore};
pub use reflecting::NonDetBlockAnalysis;
pub use stub::ConservativeSummary;
pub use summary::{CallDepInfo, FunctionDependencyInfo, FunctionSummary, SummaryStats};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::dep::{DepInfo, DepKind};
use crate::ir::{ArgId, BlockId, Callee, FuncId, GlobalId, InstId, InstKind, Module, ValueRef};
use crate::queries::{AliasQuery, AliasResult, DefUseResolver, FunctionAnalysisGetter};

/// Returns `info` if it carries a classification, otherwise input-independent.
fn defined_or_indep(info: DepInfo) -> DepInfo {
    if info.is_defined() {
        info
    } else {
        DepInfo::input_indep()
    }
}

/// Capability interface of a per-block dependency analyzer.
///
/// Required methods are the storage and context surface; the per-instruction
/// classification engine is provided as default methods on top of them. A
/// decorator overrides the read/write methods and inherits the engine.
pub trait DependencyAnalyzer {
    // ---- context ----

    /// The module under analysis.
    fn module(&self) -> &Module;

    /// The function owning the analyzed block.
    fn func(&self) -> FuncId;

    /// The analyzed block.
    fn block_id(&self) -> BlockId;

    /// Alias collaborator.
    fn alias_query(&self) -> &dyn AliasQuery;

    /// Interprocedural summary access.
    fn analysis_getter(&self) -> &dyn FunctionAnalysisGetter;

    /// Def-site collaborator for memory-value resolution, when available.
    fn def_use(&self) -> Option<&dyn DefUseResolver>;

    // ---- reads (a decorator merges its ambient DepInfo into these) ----

    /// Memoized classification of an instruction, if one has been recorded.
    /// Raw table lookup; no computation, no ambient merge.
    fn lookup_instruction_dep(&self, inst: InstId) -> Option<DepInfo>;

    /// Classification of an instruction, computing it on demand.
    fn instruction_dep(&mut self, inst: InstId) -> DepInfo;

    /// Classification of a tracked memory location. Undefined when untracked.
    fn value_dep(&self, value: ValueRef) -> DepInfo;

    /// The function's return-value classification so far.
    fn return_dep(&self) -> DepInfo;

    // ---- writes (a decorator pre-merges its ambient DepInfo) ----

    /// Record an instruction classification. Panics on an undefined `info`.
    fn update_instruction_dep(&mut self, inst: InstId, info: DepInfo);

    /// Record a tracked-location classification; also merged onto every
    /// location that may alias `value`. Panics on an undefined `info`.
    fn update_value_dep(&mut self, value: ValueRef, info: DepInfo);

    /// Merge into the return-value classification.
    fn update_return_dep(&mut self, info: DepInfo);

    /// Merge into an out-parameter classification.
    fn update_out_arg_dep(&mut self, arg: ArgId, info: DepInfo);

    /// Merge into the branch-condition classification that seeds successor
    /// tainting.
    fn record_branch_dep(&mut self, info: DepInfo);

    /// Record per-callee actual-argument classifications.
    fn record_call(&mut self, callee: FuncId, args: Vec<DepInfo>);

    // ---- bookkeeping ----

    /// Mark a global as referenced.
    fn record_referenced_global(&mut self, global: GlobalId);

    /// Mark a global as modified.
    fn record_modified_global(&mut self, global: GlobalId);

    // ---- tables, seeding, lifecycle ----

    /// The block's value-dependency table.
    fn value_table(&self) -> &FxHashMap<ValueRef, DepInfo>;

    /// The block's out-parameter table.
    fn out_arg_table(&self) -> &FxHashMap<ArgId, DepInfo>;

    /// The recorded branch-condition classification.
    fn branch_dep(&self) -> DepInfo;

    /// Seed the value table from predecessor blocks. For each value the
    /// highest incoming kind wins, then witness sets are merged.
    fn set_initial_value_deps(&mut self, incoming: &FxHashMap<ValueRef, Vec<DepInfo>>);

    /// Seed the out-parameter table from predecessor blocks.
    fn set_out_arguments(&mut self, incoming: &FxHashMap<ArgId, Vec<DepInfo>>);

    /// Resolve provisional argument-dependent entries against the
    /// caller-known dependent arguments. This is the only demotion path: a
    /// provisional ArgumentDep entry whose witness arguments all turn out
    /// independent becomes InputIndep.
    fn finalize(&mut self, dependent_args: &FxHashSet<ArgId>);

    /// Resolve remaining value-dependent entries against the module-wide
    /// global-dependency summary.
    fn finalize_globals(&mut self, global_deps: &FxHashMap<GlobalId, DepInfo>);

    /// Post-finalization query; before finalization answers from the
    /// provisional table. Panics if `inst` is not owned by the analyzed
    /// function.
    fn is_input_dependent(&self, inst: InstId) -> bool;

    /// Snapshot of everything this block contributes to its function summary.
    fn outcome(&self) -> BlockOutcome;

    // ---- the classification engine (shared across variants) ----

    /// Walk the block's instructions in program order, classifying each.
    fn analyze(&mut self) {
        let insts = self.module().block(self.block_id()).insts.clone();
        for inst in insts {
            debug!(inst = inst.0, "classifying instruction");
            let kind = self.module().inst(inst).kind.clone();
            match kind {
                // Fresh storage; dependency arrives only via later stores.
                InstKind::Alloc => {
                    self.update_value_dep(ValueRef::Inst(inst), DepInfo::input_indep());
                }
                InstKind::Return { value } => self.process_return(inst, value),
                InstKind::Branch { cond, .. } => self.process_branch(inst, cond),
                InstKind::Store { value, ptr } => self.process_store(inst, value, ptr),
                InstKind::Call { callee, args } => self.process_call(inst, callee, args),
                InstKind::Load { .. } | InstKind::Compute { .. } => {
                    let info = defined_or_indep(self.compute_instruction_dep(inst));
                    self.update_instruction_dep(inst, info);
                }
            }
        }
    }

    /// Compute an instruction's classification: the memoized result, the load
    /// resolution chain, or the operand join.
    fn compute_instruction_dep(&mut self, inst: InstId) -> DepInfo {
        let kind = {
            let instr = self.module().inst(inst);
            assert_eq!(
                instr.func,
                self.func(),
                "instruction {inst:?} queried through the wrong function"
            );
            instr.kind.clone()
        };
        if let Some(info) = self.lookup_instruction_dep(inst) {
            return info;
        }
        match kind {
            InstKind::Load { ptr, size } => self.load_dep(inst, ptr, size),
            _ => self.deps_from_operands(inst),
        }
    }

    /// Join over all operand classifications. An operand with no tracked
    /// DepInfo contributes nothing; no dependent operand means
    /// input-independent.
    fn deps_from_operands(&mut self, inst: InstId) -> DepInfo {
        let operands = self.module().inst(inst).operands();
        let mut deps = DepInfo::input_indep();
        for op in operands {
            let info = self.operand_dep(op);
            if info.is_defined() {
                deps.merge(&info);
            }
        }
        deps
    }

    /// Classification of a single operand.
    fn operand_dep(&mut self, value: ValueRef) -> DepInfo {
        match value {
            ValueRef::Inst(i) => self.instruction_dep(i),
            ValueRef::Arg(a) => {
                assert_eq!(
                    self.module().argument(a).func,
                    self.func(),
                    "operand argument {a:?} owned by another function"
                );
                DepInfo::argument_dep([a])
            }
            ValueRef::Global(g) => {
                self.record_referenced_global(g);
                self.value_dep(value)
            }
            ValueRef::Const(_) => DepInfo::input_indep(),
        }
    }

    /// Load resolution. Alias evidence dominates; then the pointer's own
    /// classification; then the last memory value written through it.
    fn load_dep(&mut self, inst: InstId, ptr: ValueRef, size: u32) -> DepInfo {
        let info = self.ref_info(inst, size);
        if info.is_defined() {
            return info;
        }
        let info = match ptr {
            ValueRef::Inst(p) => self.instruction_dep(p),
            _ => self.deps_from_aliases(ptr),
        };
        if info.is_defined() {
            return info;
        }
        if let Some(loaded) = self.memory_value(ptr) {
            let tracked = self.value_dep(loaded);
            if tracked.is_defined() {
                return tracked;
            }
            match loaded {
                ValueRef::Inst(i) => return self.instruction_dep(i),
                ValueRef::Global(g) => {
                    self.record_referenced_global(g);
                    return DepInfo::value_dep([ValueRef::Global(g)]);
                }
                ValueRef::Arg(a) if self.module().argument(a).func == self.func() => {
                    return DepInfo::argument_dep([a]);
                }
                ValueRef::Const(_) => return DepInfo::input_indep(),
                ValueRef::Arg(_) => return DepInfo::input_dep(),
            }
        }
        // Nothing known about the location; classify from the pointer itself.
        match ptr {
            ValueRef::Inst(p) => self.instruction_dep(p),
            ValueRef::Global(g) => {
                self.record_referenced_global(g);
                DepInfo::value_dep([ValueRef::Global(g)])
            }
            ValueRef::Arg(a) if self.module().argument(a).func == self.func() => {
                DepInfo::argument_dep([a])
            }
            _ => DepInfo::input_dep(),
        }
    }

    /// Merge over every tracked location this load may read.
    fn ref_info(&mut self, load: InstId, size: u32) -> DepInfo {
        let tracked: Vec<(ValueRef, DepInfo)> = self
            .value_table()
            .iter()
            .map(|(v, d)| (*v, d.clone()))
            .collect();
        let mut info = DepInfo::default();
        for (location, dep) in tracked {
            if self.alias_query().mod_ref(load, location, size).may_ref() {
                info.merge(&dep);
            }
        }
        info
    }

    /// Merge over every tracked location that may alias `value`.
    fn deps_from_aliases(&mut self, value: ValueRef) -> DepInfo {
        let tracked: Vec<(ValueRef, DepInfo)> = self
            .value_table()
            .iter()
            .map(|(v, d)| (*v, d.clone()))
            .collect();
        let mut info = DepInfo::default();
        for (location, dep) in tracked {
            if self.alias_query().alias(value, location) != AliasResult::NoAlias {
                info.merge(&dep);
            }
        }
        info
    }

    /// The last memory value written through `ptr`, via the def-site
    /// collaborator.
    fn memory_value(&self, ptr: ValueRef) -> Option<ValueRef> {
        let def = self.def_use()?.def_site(ptr)?;
        match &self.module().inst(def).kind {
            InstKind::Store { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Merge the returned value into the function's return summary.
    fn process_return(&mut self, inst: InstId, value: Option<ValueRef>) {
        let info = match value {
            Some(v) => defined_or_indep(self.operand_dep(v)),
            None => DepInfo::input_indep(),
        };
        self.update_return_dep(info.clone());
        self.update_instruction_dep(inst, info);
    }

    /// A conditional branch seeds control-dependency tainting for successors.
    fn process_branch(&mut self, inst: InstId, cond: Option<ValueRef>) {
        let info = match cond {
            Some(c) => {
                let info = defined_or_indep(self.operand_dep(c));
                self.record_branch_dep(info.clone());
                info
            }
            None => DepInfo::input_indep(),
        };
        self.update_instruction_dep(inst, info);
    }

    /// A store taints its target location and, conservatively, every tracked
    /// location that may alias it. A store through a pointer-typed formal
    /// argument is an out-parameter write.
    fn process_store(&mut self, inst: InstId, value: ValueRef, ptr: ValueRef) {
        let info = defined_or_indep(self.operand_dep(value));
        self.update_instruction_dep(inst, info.clone());
        match ptr {
            ValueRef::Arg(a)
                if self.module().argument(a).func == self.func()
                    && self.module().argument(a).is_pointer =>
            {
                self.update_out_arg_dep(a, info.clone());
            }
            ValueRef::Global(g) => self.record_modified_global(g),
            _ => {}
        }
        self.update_value_dep(ptr, info);
    }

    /// A call records its callee and actual-argument classifications for the
    /// interprocedural pass; it does not recurse into the callee.
    fn process_call(&mut self, inst: InstId, callee: Callee, args: Vec<ValueRef>) {
        let arg_infos: Vec<DepInfo> = args
            .iter()
            .map(|&a| defined_or_indep(self.operand_dep(a)))
            .collect();
        match callee {
            Callee::Direct(f) => {
                let ret = self.callee_return_dep(f, &arg_infos);
                self.record_call(f, arg_infos);
                self.update_instruction_dep(inst, ret);
            }
            Callee::Indirect(_) => {
                // Target resolution is deferred to the graph stage; the
                // result is conservatively input-dependent.
                self.update_instruction_dep(inst, DepInfo::input_dep());
            }
        }
    }

    /// Classification of a call's result from the callee's return summary.
    /// An unavailable summary (unanalyzed, or still in flight on a call
    /// cycle) is conservatively input-dependent.
    fn callee_return_dep(&self, callee: FuncId, arg_infos: &[DepInfo]) -> DepInfo {
        let Some(summary) = self.analysis_getter().summary_of(callee) else {
            return DepInfo::input_dep();
        };
        let ret = summary.return_dep();
        match ret.kind() {
            DepKind::Undefined | DepKind::InputIndep => DepInfo::input_indep(),
            DepKind::InputDep | DepKind::ValueDep => DepInfo::input_dep(),
            DepKind::ArgumentDep => {
                let mut info = DepInfo::input_indep();
                for arg in ret.argument_deps() {
                    let index = self.module().argument(*arg).index as usize;
                    match arg_infos.get(index) {
                        Some(actual) => info.merge(actual),
                        // Formal/actual arity mismatch: give up soundly.
                        None => return DepInfo::input_dep(),
                    }
                }
                info
            }
        }
    }
}
