//! Input-dependency analysis and dependence graph construction.
//!
//! `depflow` classifies every instruction and tracked memory location of a
//! program by whether its runtime result can vary with external input, and
//! builds an explicit program dependence graph (data + control edges) over
//! the same representation. The classification is a sound over-approximation:
//! a value reported input-independent really is; a value reported dependent
//! may be a false positive.
//!
//! # Layers
//!
//! - [`ir`]: the arena-owned program representation the analyses walk.
//! - [`dep`]: the dependency lattice (`Undefined < InputIndep < ArgumentDep
//!   < ValueDep < InputDep`) with join-based merging.
//! - [`queries`]: collaborator contracts (aliasing, def-use, indirect calls,
//!   interprocedural summaries) the host plugs precision into.
//! - [`analysis`]: the per-block analyzers, the ambient non-determinism
//!   decorator, per-function summaries, and the module driver.
//! - [`pdg`]: the dependence graph and its builder.
//!
//! # Example
//!
//! ```
//! use depflow::analysis::{FunctionDependencyInfo, ModuleAnalysis};
//! use depflow::ir::{InstKind, Module, ValueRef};
//! use depflow::queries::ExactAliasOracle;
//!
//! // fn main(argc) { return argc; }
//! let mut m = Module::new();
//! let f = m.add_function("main", &[("argc", false)]);
//! let argc = m.function(f).args[0];
//! let b = m.add_block(f, "entry");
//! let ret = m.push_inst(b, "ret", InstKind::Return { value: Some(ValueRef::Arg(argc)) });
//!
//! let oracle = ExactAliasOracle::new(&m);
//! let mut analysis = ModuleAnalysis::new(&m, &oracle);
//! analysis.run().unwrap();
//!
//! let summary = analysis.summary(f).unwrap();
//! assert!(summary.is_input_dependent(ret));
//! ```

pub mod analysis;
pub mod dep;
pub mod error;
pub mod ir;
pub mod pdg;
pub mod queries;

pub use analysis::{
    BlockAnalysis, ConservativeSummary, DependencyAnalyzer, FunctionDependencyInfo,
    FunctionSummary, ModuleAnalysis, NonDetBlockAnalysis,
};
pub use dep::{DepInfo, DepKind};
pub use error::{DepflowError, Result};
pub use pdg::{DependenceGraph, PdgBuilder};
pub use queries::{
    AliasQuery, AliasResult, DefUseResolver, FunctionAnalysisGetter, IndirectCallResolver,
    ModRefResult,
};
