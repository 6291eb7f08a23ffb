//! Collaborator contracts the analysis consumes.
//!
//! The dependency analysis and the graph builder never compute aliasing,
//! def-use chains, or indirect-call targets themselves; they ask these traits.
//! Hosts plug in whatever precision they have; the analysis stays sound as
//! long as the answers over-approximate (a possible alias must never be
//! reported as `NoAlias`).
//!
//! [`ExactAliasOracle`], [`MapDefUse`], [`NoIndirectCalls`], and
//! [`NoSummaries`] are baseline implementations: precise only for
//! syntactically identical locations, useful as driver defaults and in tests.

use rustc_hash::FxHashMap;

use crate::analysis::FunctionDependencyInfo;
use crate::ir::{FuncId, InstId, InstKind, Module, ValueRef};

/// Answer to an alias query between two locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    /// The locations never overlap.
    NoAlias,
    /// The locations may overlap.
    MayAlias,
    /// The locations are the same.
    MustAlias,
}

/// Answer to a mod/ref query: how an instruction touches a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModRefResult {
    /// Neither reads nor writes the location.
    NoModRef,
    /// May read the location.
    Ref,
    /// May write the location.
    Mod,
    /// May both read and write the location.
    ModRef,
}

impl ModRefResult {
    /// Whether the instruction may read the location.
    #[inline]
    pub fn may_ref(self) -> bool {
        matches!(self, ModRefResult::Ref | ModRefResult::ModRef)
    }

    /// Whether the instruction may write the location.
    #[inline]
    pub fn may_mod(self) -> bool {
        matches!(self, ModRefResult::Mod | ModRefResult::ModRef)
    }
}

/// Alias information over tracked locations.
pub trait AliasQuery {
    /// Relationship between two locations.
    fn alias(&self, a: ValueRef, b: ValueRef) -> AliasResult;

    /// How `inst` touches `location` within a `size`-byte extent.
    fn mod_ref(&self, inst: InstId, location: ValueRef, size: u32) -> ModRefResult;
}

/// Resolution of indirect call sites to candidate callees.
pub trait IndirectCallResolver {
    /// Candidate callees of `call`. Empty when unresolved.
    fn callees_of(&self, call: InstId) -> Vec<FuncId>;
}

/// Def-site information for connecting uses back to definitions.
pub trait DefUseResolver {
    /// The single defining instruction of `value`, when one exists.
    fn def_site(&self, value: ValueRef) -> Option<InstId>;

    /// When no single definition exists (a memory merge point), the values
    /// contributed by each predecessor. The graph builder synthesizes a phi
    /// node from these.
    fn merged_def_values(&self, value: ValueRef) -> Option<Vec<ValueRef>>;
}

/// Access to finished per-function analysis results for interprocedural
/// queries. Returns `None` while a function's summary is still in flight;
/// callers must treat that conservatively (this is the recursion guard for
/// cyclic call graphs).
pub trait FunctionAnalysisGetter {
    /// Summary of `func`, if one has been completed.
    fn summary_of(&self, func: FuncId) -> Option<&dyn FunctionDependencyInfo>;
}

/// Getter with no summaries at all: every interprocedural query falls back to
/// the conservative path.
#[derive(Debug, Default)]
pub struct NoSummaries;

impl FunctionAnalysisGetter for NoSummaries {
    fn summary_of(&self, _func: FuncId) -> Option<&dyn FunctionDependencyInfo> {
        None
    }
}

/// Baseline alias oracle: identical locations must alias, everything else is
/// independent. Sound only for representations without pointer arithmetic;
/// sufficient for the single-location stores and loads exercised in tests.
pub struct ExactAliasOracle<'m> {
    module: &'m Module,
}

impl<'m> ExactAliasOracle<'m> {
    /// Create an oracle over `module`.
    pub fn new(module: &'m Module) -> Self {
        Self { module }
    }
}

impl AliasQuery for ExactAliasOracle<'_> {
    fn alias(&self, a: ValueRef, b: ValueRef) -> AliasResult {
        if a == b {
            AliasResult::MustAlias
        } else {
            AliasResult::NoAlias
        }
    }

    // The byte extent is irrelevant here: identical locations share extents.
    fn mod_ref(&self, inst: InstId, location: ValueRef, _size: u32) -> ModRefResult {
        match &self.module.inst(inst).kind {
            InstKind::Store { ptr, .. } if *ptr == location => ModRefResult::Mod,
            InstKind::Load { ptr, .. } if *ptr == location => ModRefResult::Ref,
            _ => ModRefResult::NoModRef,
        }
    }
}

/// Indirect-call resolver that knows nothing. Unresolved call sites stay
/// unresolved, which the analysis treats conservatively.
#[derive(Debug, Default)]
pub struct NoIndirectCalls;

impl IndirectCallResolver for NoIndirectCalls {
    fn callees_of(&self, _call: InstId) -> Vec<FuncId> {
        Vec::new()
    }
}

/// Table-backed def-use resolver. Hosts (and tests) record def sites and
/// memory merge points explicitly.
#[derive(Debug, Default)]
pub struct MapDefUse {
    def_sites: FxHashMap<ValueRef, InstId>,
    merged: FxHashMap<ValueRef, Vec<ValueRef>>,
}

impl MapDefUse {
    /// Empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the defining instruction of `value`.
    pub fn record_def(&mut self, value: ValueRef, def: InstId) {
        self.def_sites.insert(value, def);
    }

    /// Record a memory merge point: `value` receives one contribution per
    /// predecessor.
    pub fn record_merge(&mut self, value: ValueRef, incoming: Vec<ValueRef>) {
        self.merged.insert(value, incoming);
    }
}

impl DefUseResolver for MapDefUse {
    fn def_site(&self, value: ValueRef) -> Option<InstId> {
        self.def_sites.get(&value).copied()
    }

    fn merged_def_values(&self, value: ValueRef) -> Option<Vec<ValueRef>> {
        self.merged.get(&value).cloned()
    }
}
