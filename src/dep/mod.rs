//! The dependency classification lattice.
//!
//! Every tracked value and instruction carries a [`DepInfo`]: a kind plus the
//! argument/value sets that justify it. Kinds form a total order
//!
//! ```text
//! Undefined < InputIndep < ArgumentDep < ValueDep < InputDep
//! ```
//!
//! and [`DepInfo::merge`] is the lattice join: the kind only escalates and the
//! witness sets only grow. `ArgumentDep` and `ValueDep` are provisional states
//! resolved at finalization; `InputDep` is terminal.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::ir::{ArgId, ValueRef};

/// Dependency kind, ordered by severity. The derived `Ord` is the lattice
/// order used for merges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DepKind {
    /// Nothing known yet. First reference to any value starts here.
    #[default]
    Undefined,
    /// Fully determined by constants and code structure.
    InputIndep,
    /// Depends on some of the enclosing function's formal arguments
    /// (provisional until the caller context is known).
    ArgumentDep,
    /// Depends on other tracked values, typically globals
    /// (provisional until the module-wide global summary is known).
    ValueDep,
    /// Can vary with external/unknown input. Terminal.
    InputDep,
}

/// A dependency classification: kind plus the witnesses behind it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepInfo {
    kind: DepKind,
    args: FxHashSet<ArgId>,
    values: FxHashSet<ValueRef>,
}

impl DepInfo {
    /// Input-independent classification.
    pub fn input_indep() -> Self {
        Self {
            kind: DepKind::InputIndep,
            ..Default::default()
        }
    }

    /// Input-dependent classification.
    pub fn input_dep() -> Self {
        Self {
            kind: DepKind::InputDep,
            ..Default::default()
        }
    }

    /// Argument-dependent classification with its witness set.
    pub fn argument_dep(args: impl IntoIterator<Item = ArgId>) -> Self {
        Self {
            kind: DepKind::ArgumentDep,
            args: args.into_iter().collect(),
            values: FxHashSet::default(),
        }
    }

    /// Value-dependent classification with its witness set.
    pub fn value_dep(values: impl IntoIterator<Item = ValueRef>) -> Self {
        Self {
            kind: DepKind::ValueDep,
            args: FxHashSet::default(),
            values: values.into_iter().collect(),
        }
    }

    /// Current kind.
    #[inline]
    pub fn kind(&self) -> DepKind {
        self.kind
    }

    /// Whether any classification has been assigned.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.kind != DepKind::Undefined
    }

    /// Whether this is the terminal input-dependent state.
    #[inline]
    pub fn is_input_dep(&self) -> bool {
        self.kind == DepKind::InputDep
    }

    /// Whether this is the provisional argument-dependent state.
    #[inline]
    pub fn is_argument_dep(&self) -> bool {
        self.kind == DepKind::ArgumentDep
    }

    /// Whether this is the provisional value-dependent state.
    #[inline]
    pub fn is_value_dep(&self) -> bool {
        self.kind == DepKind::ValueDep
    }

    /// Whether this is the input-independent state.
    #[inline]
    pub fn is_input_indep(&self) -> bool {
        self.kind == DepKind::InputIndep
    }

    /// Arguments this classification depends on.
    #[inline]
    pub fn argument_deps(&self) -> &FxHashSet<ArgId> {
        &self.args
    }

    /// Values this classification depends on.
    #[inline]
    pub fn value_deps(&self) -> &FxHashSet<ValueRef> {
        &self.values
    }

    /// Lattice join: kind escalates to the higher of the two, witness sets
    /// union. Commutative, associative, idempotent, monotone.
    pub fn merge(&mut self, other: &DepInfo) {
        if other.kind > self.kind {
            self.kind = other.kind;
        }
        self.args.extend(other.args.iter().copied());
        self.values.extend(other.values.iter().copied());
    }

    /// Raise the kind; never lowers it. Witness sets are untouched.
    pub fn escalate(&mut self, kind: DepKind) {
        if kind > self.kind {
            self.kind = kind;
        }
    }

    /// Whether any witness argument is in `dependent_args`.
    pub fn depends_on_any(&self, dependent_args: &FxHashSet<ArgId>) -> bool {
        self.args.iter().any(|a| dependent_args.contains(a))
    }
}
