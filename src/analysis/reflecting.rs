//! Ambient non-determinism decorator.
//!
//! A block reached through unpredictable control flow (a branch on a
//! dependent condition, a loop with an unknown trip count) must reflect that
//! uncertainty in everything it computes. [`NonDetBlockAnalysis`] wraps a
//! [`BlockAnalysis`] and injects an ambient [`DepInfo`]: every read merges it
//! in before returning (unless the result is already terminal) and every
//! write pre-merges it before recording. The classification engine runs
//! against the decorator, so nested lookups inside load resolution and
//! operand joins pick up the ambient state too.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dep::{DepInfo, DepKind};
use crate::ir::{ArgId, BlockId, FuncId, GlobalId, InstId, Module, ValueRef};
use crate::queries::{AliasQuery, DefUseResolver, FunctionAnalysisGetter};

use super::block::{BlockAnalysis, BlockOutcome};
use super::summary::resolve_with_globals;
use super::DependencyAnalyzer;

/// Decorator over [`BlockAnalysis`] carrying an ambient classification.
pub struct NonDetBlockAnalysis<'a> {
    inner: BlockAnalysis<'a>,
    ambient: DepInfo,
    block_input_dep: bool,
}

impl<'a> NonDetBlockAnalysis<'a> {
    /// Decorate `inner` with `ambient`. The ambient classification must be
    /// defined; an undefined ambient means the plain analyzer should be used
    /// instead.
    pub fn new(inner: BlockAnalysis<'a>, ambient: DepInfo) -> Self {
        assert!(ambient.is_defined(), "ambient classification undefined");
        Self {
            inner,
            ambient,
            block_input_dep: false,
        }
    }

    /// The ambient classification in force.
    pub fn ambient(&self) -> &DepInfo {
        &self.ambient
    }

    fn add_ambient(&self, mut info: DepInfo) -> DepInfo {
        if !info.is_input_dep() {
            info.merge(&self.ambient);
        }
        info
    }
}

impl DependencyAnalyzer for NonDetBlockAnalysis<'_> {
    fn module(&self) -> &Module {
        self.inner.module()
    }

    fn func(&self) -> FuncId {
        self.inner.func()
    }

    fn block_id(&self) -> BlockId {
        self.inner.block_id()
    }

    fn alias_query(&self) -> &dyn AliasQuery {
        self.inner.alias_query()
    }

    fn analysis_getter(&self) -> &dyn FunctionAnalysisGetter {
        self.inner.analysis_getter()
    }

    fn def_use(&self) -> Option<&dyn DefUseResolver> {
        self.inner.def_use()
    }

    fn lookup_instruction_dep(&self, inst: InstId) -> Option<DepInfo> {
        self.inner.lookup_instruction_dep(inst)
    }

    fn instruction_dep(&mut self, inst: InstId) -> DepInfo {
        let info = self.compute_instruction_dep(inst);
        self.add_ambient(info)
    }

    fn value_dep(&self, value: ValueRef) -> DepInfo {
        let info = self.inner.value_dep(value);
        // An untracked location stays untracked; ambient applies only to
        // classifications that exist.
        if info.is_defined() {
            self.add_ambient(info)
        } else {
            info
        }
    }

    fn return_dep(&self) -> DepInfo {
        let info = self.inner.return_dep();
        if info.is_defined() {
            self.add_ambient(info)
        } else {
            info
        }
    }

    fn update_instruction_dep(&mut self, inst: InstId, info: DepInfo) {
        let info = self.add_ambient(info);
        self.inner.update_instruction_dep(inst, info);
    }

    fn update_value_dep(&mut self, value: ValueRef, info: DepInfo) {
        let info = self.add_ambient(info);
        self.inner.update_value_dep(value, info);
    }

    fn update_return_dep(&mut self, info: DepInfo) {
        let info = self.add_ambient(info);
        self.inner.update_return_dep(info);
    }

    fn update_out_arg_dep(&mut self, arg: ArgId, info: DepInfo) {
        let info = self.add_ambient(info);
        self.inner.update_out_arg_dep(arg, info);
    }

    fn record_branch_dep(&mut self, info: DepInfo) {
        let info = self.add_ambient(info);
        self.inner.record_branch_dep(info);
    }

    fn record_call(&mut self, callee: FuncId, args: Vec<DepInfo>) {
        let args = args.into_iter().map(|a| self.add_ambient(a)).collect();
        self.inner.record_call(callee, args);
    }

    fn record_referenced_global(&mut self, global: GlobalId) {
        self.inner.record_referenced_global(global);
    }

    fn record_modified_global(&mut self, global: GlobalId) {
        self.inner.record_modified_global(global);
    }

    fn value_table(&self) -> &FxHashMap<ValueRef, DepInfo> {
        self.inner.value_table()
    }

    fn out_arg_table(&self) -> &FxHashMap<ArgId, DepInfo> {
        self.inner.out_arg_table()
    }

    fn branch_dep(&self) -> DepInfo {
        self.inner.branch_dep()
    }

    fn set_initial_value_deps(&mut self, incoming: &FxHashMap<ValueRef, Vec<DepInfo>>) {
        self.inner.set_initial_value_deps(incoming);
    }

    fn set_out_arguments(&mut self, incoming: &FxHashMap<ArgId, Vec<DepInfo>>) {
        self.inner.set_out_arguments(incoming);
    }

    fn finalize(&mut self, dependent_args: &FxHashSet<ArgId>) {
        self.inner.finalize(dependent_args);
        // The whole block is input-dependent when the control flow that
        // reaches it is.
        if self.ambient.is_input_dep() || self.ambient.depends_on_any(dependent_args) {
            self.block_input_dep = true;
        }
    }

    fn finalize_globals(&mut self, global_deps: &FxHashMap<GlobalId, DepInfo>) {
        self.inner.finalize_globals(global_deps);
        if self.ambient.kind() == DepKind::ValueDep
            && resolve_with_globals(&self.ambient, global_deps).is_input_dep()
        {
            self.block_input_dep = true;
        }
    }

    fn is_input_dependent(&self, inst: InstId) -> bool {
        self.block_input_dep || self.inner.is_input_dependent(inst)
    }

    fn outcome(&self) -> BlockOutcome {
        let mut outcome = self.inner.outcome();
        outcome.ambient = Some(self.ambient.clone());
        outcome.input_dep_block = self.block_input_dep;
        outcome
    }
}
