//! Conservative fallback summary.
//!
//! Functions that are never analyzed in detail (external declarations,
//! bodies skipped by the host) still have to answer the
//! [`FunctionDependencyInfo`] contract. [`ConservativeSummary`] answers it
//! with the sound over-approximation: everything is input-dependent.

use rustc_hash::FxHashSet;

use crate::dep::DepInfo;
use crate::ir::{BlockId, FuncId, InstId, Module};

use super::summary::{CallDepInfo, FunctionDependencyInfo};

/// Stub summary treating the whole function as input-dependent. Counts come
/// from the function's structure; no instruction is ever reported
/// independent.
#[derive(Debug, Clone)]
pub struct ConservativeSummary {
    func: FuncId,
    blocks: FxHashSet<BlockId>,
    insts: FxHashSet<InstId>,
}

impl ConservativeSummary {
    /// Stub for `func`, capturing its structural counts.
    pub fn new(module: &Module, func: FuncId) -> Self {
        let function = module.function(func);
        let blocks: FxHashSet<BlockId> = function.blocks.iter().copied().collect();
        let insts = blocks
            .iter()
            .flat_map(|b| module.block(*b).insts.iter().copied())
            .collect();
        Self { func, blocks, insts }
    }
}

impl FunctionDependencyInfo for ConservativeSummary {
    fn function(&self) -> FuncId {
        self.func
    }

    fn is_input_dep_function(&self) -> bool {
        true
    }

    fn is_input_dependent(&self, inst: InstId) -> bool {
        assert!(
            self.insts.contains(&inst),
            "instruction {inst:?} not owned by the summarized function"
        );
        true
    }

    fn is_input_independent(&self, inst: InstId) -> bool {
        !self.is_input_dependent(inst)
    }

    fn is_input_dependent_block(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    fn return_dep(&self) -> DepInfo {
        DepInfo::input_dep()
    }

    // No call data: the stub never looks inside the body.
    fn call_sites(&self) -> Vec<FuncId> {
        Vec::new()
    }

    fn has_call_dep_info(&self, _callee: FuncId) -> bool {
        false
    }

    fn call_dep_info(&self, callee: FuncId) -> &CallDepInfo {
        panic!("no call record for {callee:?}")
    }

    fn input_dep_instr_count(&self) -> usize {
        self.insts.len()
    }

    fn input_indep_instr_count(&self) -> usize {
        0
    }

    fn input_dep_block_count(&self) -> usize {
        self.blocks.len()
    }

    fn input_indep_block_count(&self) -> usize {
        0
    }
}
