//! Program dependence graph construction.
//!
//! A dependence graph combines data flow ("this uses a value that one
//! produced") and control flow ("this executes only because that branch went
//! this way") over the whole module, with explicit nodes for blocks,
//! instructions, constants, globals, formal arguments, per-call-site actual
//! arguments, and synthesized memory phi values. Cross-function edges bridge
//! actual arguments to the formal arguments of every resolved callee, so a
//! walk can follow a value through a call.
//!
//! # Example
//!
//! ```
//! use depflow::ir::{InstKind, Module, ValueRef};
//! use depflow::pdg::{EdgeKind, NodeKind, PdgBuilder};
//!
//! let mut m = Module::new();
//! let f = m.add_function("double", &[("x", false)]);
//! let x = m.function(f).args[0];
//! let b = m.add_block(f, "entry");
//! let two = ValueRef::Const(m.add_const("2"));
//! let mul = m.push_inst(
//!     b,
//!     "mul",
//!     InstKind::Compute { op: "mul".into(), operands: vec![ValueRef::Arg(x), two] },
//! );
//!
//! let graph = PdgBuilder::new(&m).build();
//! let mul_node = graph.get(&NodeKind::Instruction(mul)).unwrap();
//! let x_node = graph.get(&NodeKind::FormalArgument(x)).unwrap();
//! assert!(graph.has_edge(x_node, mul_node, EdgeKind::Data));
//! ```

pub mod builder;
pub mod types;

pub use builder::PdgBuilder;
pub use types::{DependenceGraph, EdgeKind, GraphStats, Node, NodeId, NodeKind};
