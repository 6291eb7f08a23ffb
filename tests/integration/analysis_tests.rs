//! End-to-end input-dependency analysis tests.
//!
//! Small handwritten modules run through `ModuleAnalysis`, checking the
//! classification scenarios and the soundness properties of the lattice:
//! no false negatives, demotion only through the provisional
//! argument-dependent state, ambient taint never lowered.

use rustc_hash::{FxHashMap, FxHashSet};

use depflow::analysis::{BlockAnalysis, DependencyAnalyzer, ModuleAnalysis};
use depflow::ir::{Callee, InstId, InstKind, Module, ValueRef};
use depflow::queries::{
    AliasQuery, AliasResult, ExactAliasOracle, ModRefResult, NoSummaries,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// fn f(x) { y = x + 1; return y }
fn add_one_module() -> (Module, depflow::ir::FuncId, InstId) {
    let mut m = Module::new();
    let f = m.add_function("f", &[("x", false)]);
    let x = m.function(f).args[0];
    let b = m.add_block(f, "entry");
    let one = ValueRef::Const(m.add_const("1"));
    let y = m.push_inst(
        b,
        "y",
        InstKind::Compute {
            op: "add".into(),
            operands: vec![ValueRef::Arg(x), one],
        },
    );
    m.push_inst(
        b,
        "ret",
        InstKind::Return {
            value: Some(ValueRef::Inst(y)),
        },
    );
    (m, f, y)
}

// Scenario A: y is provisionally argument-dependent; once the caller marks x
// input-dependent, y is input-dependent.
#[test]
fn argument_arithmetic_escalates_with_caller_context() {
    init_tracing();
    let (m, f, y) = add_one_module();
    let x = m.function(f).args[0];

    // Provisional state straight from the block analyzer.
    let b = m.function(f).blocks[0];
    let oracle = ExactAliasOracle::new(&m);
    let mut block = BlockAnalysis::new(&m, b, &oracle, &NoSummaries, None);
    block.analyze();
    let provisional = block.instruction_dep(y);
    assert!(provisional.is_argument_dep());
    assert!(provisional.argument_deps().contains(&x));

    // f has no caller, so it is an entry point and x receives input.
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");
    let summary = analysis.summary(f).expect("summary");
    assert!(summary.is_input_dependent(y));
    assert!(summary.return_dep().is_input_dep());
    assert!(summary.is_input_dep_function());
}

// Scenario B: a = alloca; store 5 -> a; b = load a — the load is
// input-independent.
#[test]
fn constant_through_memory_stays_independent() {
    let mut m = Module::new();
    let f = m.add_function("f", &[]);
    let blk = m.add_block(f, "entry");
    let a = m.push_inst(blk, "a", InstKind::Alloc);
    let five = ValueRef::Const(m.add_const("5"));
    m.push_inst(
        blk,
        "st",
        InstKind::Store {
            value: five,
            ptr: ValueRef::Inst(a),
        },
    );
    let b = m.push_inst(
        blk,
        "b",
        InstKind::Load {
            ptr: ValueRef::Inst(a),
            size: 4,
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");
    let summary = analysis.summary(f).expect("summary");
    assert!(summary.is_input_independent(b));
    assert_eq!(summary.input_dep_block_count(), 0);
}

// Scenario C: a = alloca; store x -> a; b = load a — the load carries x's
// dependency and follows the caller context.
#[test]
fn argument_through_memory_tracks_the_argument() {
    let mut m = Module::new();
    let f = m.add_function("f", &[("x", false)]);
    let x = m.function(f).args[0];
    let blk = m.add_block(f, "entry");
    let a = m.push_inst(blk, "a", InstKind::Alloc);
    m.push_inst(
        blk,
        "st",
        InstKind::Store {
            value: ValueRef::Arg(x),
            ptr: ValueRef::Inst(a),
        },
    );
    let b = m.push_inst(
        blk,
        "b",
        InstKind::Load {
            ptr: ValueRef::Inst(a),
            size: 4,
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut block = BlockAnalysis::new(&m, blk, &oracle, &NoSummaries, None);
    block.analyze();
    let provisional = block.instruction_dep(b);
    assert!(provisional.is_argument_dep());
    assert!(provisional.argument_deps().contains(&x));

    // As an entry function, x is input and so is the load.
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");
    assert!(analysis.summary(f).expect("summary").is_input_dependent(b));
}

/// Oracle that makes two chosen locations may-alias and derives mod/ref from
/// that relation.
struct MayAliasOracle<'m> {
    module: &'m Module,
    left: ValueRef,
    right: ValueRef,
}

impl AliasQuery for MayAliasOracle<'_> {
    fn alias(&self, a: ValueRef, b: ValueRef) -> AliasResult {
        if a == b {
            AliasResult::MustAlias
        } else if (a == self.left && b == self.right) || (a == self.right && b == self.left) {
            AliasResult::MayAlias
        } else {
            AliasResult::NoAlias
        }
    }

    fn mod_ref(&self, inst: InstId, location: ValueRef, _size: u32) -> ModRefResult {
        match &self.module.inst(inst).kind {
            InstKind::Store { ptr, .. } if self.alias(*ptr, location) != AliasResult::NoAlias => {
                ModRefResult::Mod
            }
            InstKind::Load { ptr, .. } if self.alias(*ptr, location) != AliasResult::NoAlias => {
                ModRefResult::Ref
            }
            _ => ModRefResult::NoModRef,
        }
    }
}

// Alias soundness: a dependent store through P taints a load through Q when
// P and Q may alias.
#[test]
fn may_alias_store_taints_load() {
    let mut m = Module::new();
    let f = m.add_function("f", &[("x", false)]);
    let x = m.function(f).args[0];
    let blk = m.add_block(f, "entry");
    let p = m.push_inst(blk, "p", InstKind::Alloc);
    let q = m.push_inst(blk, "q", InstKind::Alloc);
    m.push_inst(
        blk,
        "st",
        InstKind::Store {
            value: ValueRef::Arg(x),
            ptr: ValueRef::Inst(p),
        },
    );
    let ld = m.push_inst(
        blk,
        "ld",
        InstKind::Load {
            ptr: ValueRef::Inst(q),
            size: 4,
        },
    );

    let oracle = MayAliasOracle {
        module: &m,
        left: ValueRef::Inst(p),
        right: ValueRef::Inst(q),
    };
    let mut block = BlockAnalysis::new(&m, blk, &oracle, &NoSummaries, None);
    block.analyze();

    let info = block.instruction_dep(ld);
    assert!(
        info.is_argument_dep() && info.argument_deps().contains(&x),
        "load through a may-alias of a tainted location must carry the taint"
    );
}

// Instructions over constants only are input-independent, and stay so after
// finalization.
#[test]
fn constant_only_operands_are_independent() {
    let mut m = Module::new();
    let f = m.add_function("f", &[]);
    let blk = m.add_block(f, "entry");
    let one = ValueRef::Const(m.add_const("1"));
    let two = ValueRef::Const(m.add_const("2"));
    let sum = m.push_inst(
        blk,
        "sum",
        InstKind::Compute {
            op: "add".into(),
            operands: vec![one, two],
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut block = BlockAnalysis::new(&m, blk, &oracle, &NoSummaries, None);
    block.analyze();
    assert!(block.instruction_dep(sum).is_input_indep());

    block.finalize(&FxHashSet::default());
    block.finalize_globals(&FxHashMap::default());
    assert!(!block.is_input_dependent(sum));
}

// Blocks behind a branch on an input-dependent condition are wholly
// input-dependent, even where they only compute constants.
#[test]
fn dependent_branch_taints_successor_blocks() {
    let mut m = Module::new();
    let f = m.add_function("f", &[("flag", false)]);
    let flag = m.function(f).args[0];
    let entry = m.add_block(f, "entry");
    let then = m.add_block(f, "then");
    let done = m.add_block(f, "done");
    m.add_edge(entry, then);
    m.add_edge(entry, done);
    m.push_inst(
        entry,
        "br",
        InstKind::Branch {
            cond: Some(ValueRef::Arg(flag)),
            targets: vec![then, done],
        },
    );
    let c = ValueRef::Const(m.add_const("7"));
    let shielded = m.push_inst(
        then,
        "shielded",
        InstKind::Compute {
            op: "id".into(),
            operands: vec![c],
        },
    );
    m.push_inst(done, "ret", InstKind::Return { value: None });

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let summary = analysis.summary(f).expect("summary");
    assert!(summary.is_input_dependent_block(then));
    assert!(summary.is_input_dependent(shielded));
    assert!(summary.input_dep_block_count() >= 2);
}

// Control taint is transitive: a block reached from a tainted block through
// an unconditional jump carries the taint too.
#[test]
fn transitive_successor_of_dependent_branch_is_tainted() {
    let mut m = Module::new();
    let f = m.add_function("f", &[("flag", false)]);
    let flag = m.function(f).args[0];
    let entry = m.add_block(f, "entry");
    let then = m.add_block(f, "then");
    let mid = m.add_block(f, "mid");
    let exit = m.add_block(f, "exit");
    m.add_edge(entry, then);
    m.add_edge(entry, exit);
    m.add_edge(then, mid);
    m.push_inst(
        entry,
        "br",
        InstKind::Branch {
            cond: Some(ValueRef::Arg(flag)),
            targets: vec![then, exit],
        },
    );
    m.push_inst(
        then,
        "j",
        InstKind::Branch {
            cond: None,
            targets: vec![mid],
        },
    );
    let c = ValueRef::Const(m.add_const("7"));
    let sunk = m.push_inst(
        mid,
        "sunk",
        InstKind::Compute {
            op: "id".into(),
            operands: vec![c],
        },
    );
    m.push_inst(exit, "ret", InstKind::Return { value: None });

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let summary = analysis.summary(f).expect("summary");
    assert!(
        summary.is_input_dependent_block(mid),
        "a block reached only through a dependent branch carries its taint"
    );
    assert!(summary.is_input_dependent(sunk));
}

// A loop header reached through a back edge runs under ambient taint.
#[test]
fn back_edge_target_is_tainted() {
    init_tracing();
    let mut m = Module::new();
    let f = m.add_function("f", &[]);
    let entry = m.add_block(f, "entry");
    let header = m.add_block(f, "header");
    m.add_edge(entry, header);
    m.add_edge(header, header);
    m.push_inst(
        entry,
        "j",
        InstKind::Branch {
            cond: None,
            targets: vec![header],
        },
    );
    let c = ValueRef::Const(m.add_const("0"));
    let body = m.push_inst(
        header,
        "body",
        InstKind::Compute {
            op: "id".into(),
            operands: vec![c],
        },
    );
    m.push_inst(
        header,
        "loop",
        InstKind::Branch {
            cond: Some(c),
            targets: vec![header],
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let summary = analysis.summary(f).expect("summary");
    assert!(summary.is_input_dependent_block(header));
    assert!(summary.is_input_dependent(body));
}

// A call into a body-less declaration goes through the conservative stub.
#[test]
fn external_callee_is_conservative() {
    let mut m = Module::new();
    let ext = m.add_function("getenv", &[("name", true)]);
    let f = m.add_function("f", &[]);
    let blk = m.add_block(f, "entry");
    let name = ValueRef::Const(m.add_const("\"PATH\""));
    let call = m.push_inst(
        blk,
        "call",
        InstKind::Call {
            callee: Callee::Direct(ext),
            args: vec![name],
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let ext_summary = analysis.summary(ext).expect("stub summary");
    assert!(ext_summary.is_input_dep_function());
    assert!(ext_summary.return_dep().is_input_dep());

    let summary = analysis.summary(f).expect("summary");
    assert!(
        summary.is_input_dependent(call),
        "a call with no analyzable body must be input-dependent"
    );
}

// The demotion path: a callee fed only constants finalizes independent, while
// a confirmed input-dependent instruction never regresses.
#[test]
fn finalization_demotes_only_provisional_state() {
    let mut m = Module::new();
    let callee = m.add_function("callee", &[("x", false)]);
    let x = m.function(callee).args[0];
    let cb = m.add_block(callee, "entry");
    let one = ValueRef::Const(m.add_const("1"));
    let y = m.push_inst(
        cb,
        "y",
        InstKind::Compute {
            op: "add".into(),
            operands: vec![ValueRef::Arg(x), one],
        },
    );
    m.push_inst(
        cb,
        "ret",
        InstKind::Return {
            value: Some(ValueRef::Inst(y)),
        },
    );

    let main = m.add_function("main", &[("argc", false)]);
    let argc = m.function(main).args[0];
    let mb = m.add_block(main, "entry");
    let c = ValueRef::Const(m.add_const("3"));
    m.push_inst(
        mb,
        "call",
        InstKind::Call {
            callee: Callee::Direct(callee),
            args: vec![c],
        },
    );
    let direct = m.push_inst(
        mb,
        "direct",
        InstKind::Compute {
            op: "id".into(),
            operands: vec![ValueRef::Arg(argc)],
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    // callee's x only ever receives the constant 3.
    let callee_summary = analysis.summary(callee).expect("summary");
    assert!(callee_summary.is_input_independent(y));
    assert!(!callee_summary.is_input_dep_function());

    // main's argc is real input; no regression at finalization.
    let main_summary = analysis.summary(main).expect("summary");
    assert!(main_summary.is_input_dependent(direct));
}

// A store through a pointer formal argument is an out-parameter write; a
// store through a non-pointer formal is not.
#[test]
fn store_through_pointer_formal_records_out_arg() {
    let mut m = Module::new();
    let f = m.add_function("f", &[("out", true), ("x", false)]);
    let out = m.function(f).args[0];
    let x = m.function(f).args[1];
    let blk = m.add_block(f, "entry");
    m.push_inst(
        blk,
        "st",
        InstKind::Store {
            value: ValueRef::Arg(x),
            ptr: ValueRef::Arg(out),
        },
    );
    let c = ValueRef::Const(m.add_const("0"));
    m.push_inst(
        blk,
        "st2",
        InstKind::Store {
            value: c,
            ptr: ValueRef::Arg(x),
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let summary = analysis.store().analyzed(f).expect("summary");
    let dep = summary.out_arg_deps().get(&out).expect("out-parameter entry");
    assert!(
        dep.is_input_dep(),
        "entry-function argument stored through the out pointer is input"
    );
    assert!(
        !summary.out_arg_deps().contains_key(&x),
        "a non-pointer formal never becomes an out-parameter"
    );
}

// A dependent value stored to a global in one function escalates a load of
// that global anywhere else in the module.
#[test]
fn dependent_global_store_escalates_remote_load() {
    let mut m = Module::new();
    let tainted = m.add_global("tainted");
    let clean = m.add_global("clean");

    let writer = m.add_function("writer", &[("argc", false)]);
    let argc = m.function(writer).args[0];
    let wb = m.add_block(writer, "entry");
    m.push_inst(
        wb,
        "st_t",
        InstKind::Store {
            value: ValueRef::Arg(argc),
            ptr: ValueRef::Global(tainted),
        },
    );
    let zero = ValueRef::Const(m.add_const("0"));
    m.push_inst(
        wb,
        "st_c",
        InstKind::Store {
            value: zero,
            ptr: ValueRef::Global(clean),
        },
    );

    let reader = m.add_function("reader", &[]);
    let rb = m.add_block(reader, "entry");
    let ld_t = m.push_inst(
        rb,
        "ld_t",
        InstKind::Load {
            ptr: ValueRef::Global(tainted),
            size: 4,
        },
    );
    let ld_c = m.push_inst(
        rb,
        "ld_c",
        InstKind::Load {
            ptr: ValueRef::Global(clean),
            size: 4,
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    assert!(analysis.global_dep(tainted).is_input_dep());
    assert!(analysis.global_dep(clean).is_input_indep());

    let summary = analysis.summary(reader).expect("summary");
    assert!(
        summary.is_input_dependent(ld_t),
        "load of a global written with input must be input-dependent"
    );
    assert!(
        summary.is_input_independent(ld_c),
        "load of a constant-initialized global stays independent"
    );
}

// Call records survive into the summary for downstream consumers.
#[test]
fn call_records_are_queryable() {
    let mut m = Module::new();
    let callee = m.add_function("callee", &[("a", false), ("b", false)]);
    let main = m.add_function("main", &[("argc", false)]);
    let argc = m.function(main).args[0];
    let mb = m.add_block(main, "entry");
    let c = ValueRef::Const(m.add_const("1"));
    m.push_inst(
        mb,
        "call",
        InstKind::Call {
            callee: Callee::Direct(callee),
            args: vec![ValueRef::Arg(argc), c],
        },
    );

    let oracle = ExactAliasOracle::new(&m);
    let mut analysis = ModuleAnalysis::new(&m, &oracle);
    analysis.run().expect("analysis runs");

    let summary = analysis.summary(main).expect("summary");
    assert_eq!(summary.call_sites(), vec![callee]);
    assert!(summary.has_call_dep_info(callee));
    let call = summary.call_dep_info(callee);
    assert_eq!(call.site_count(), 1);
    assert!(call.args()[0].is_input_dep(), "argc actual resolves to input");
    assert!(call.args()[1].is_input_indep(), "constant actual stays clean");

    // And the propagated context reaches the callee's formals.
    let a = m.function(callee).args[0];
    let b = m.function(callee).args[1];
    let dependent = analysis.dependent_args(callee).expect("propagated args");
    assert!(dependent.contains(&a));
    assert!(!dependent.contains(&b));
}
