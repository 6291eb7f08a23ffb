//! Program representation the analysis runs over.
//!
//! A [`Module`] owns flat arenas for functions, basic blocks, instructions,
//! formal arguments, global variables, and constants. Everything else in the
//! crate refers to these entities through small copyable ids; nothing outside
//! the module owns program structure.
//!
//! The representation is deliberately minimal: enough instruction kinds to
//! express allocation, memory traffic, control flow, and calls. Anything the
//! dependency analysis treats uniformly is a [`InstKind::Compute`] with an
//! opaque operator label.

use serde::{Deserialize, Serialize};

/// Unique identifier for a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// Unique identifier for a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Unique identifier for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstId(pub u32);

/// Unique identifier for a formal argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgId(pub u32);

/// Unique identifier for a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// Unique identifier for a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstId(pub u32);

/// Reference to any value the analysis can track.
///
/// This is the closed set of value categories; a `ValueRef` is the unit of
/// identity for dependency tables and graph-node memoization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueRef {
    /// Result of an instruction.
    Inst(InstId),
    /// Formal argument of a function.
    Arg(ArgId),
    /// Module-level global variable.
    Global(GlobalId),
    /// Literal constant.
    Const(ConstId),
}

/// The target of a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    /// Statically known callee.
    Direct(FuncId),
    /// Computed target (function pointer, virtual dispatch).
    Indirect(ValueRef),
}

/// Instruction payload.
#[derive(Debug, Clone)]
pub enum InstKind {
    /// Stack allocation site. Fresh storage; dependency arrives only through
    /// later stores.
    Alloc,
    /// Read `size` bytes through `ptr`.
    Load { ptr: ValueRef, size: u32 },
    /// Write `value` through `ptr`.
    Store { value: ValueRef, ptr: ValueRef },
    /// Block terminator. `cond` is `None` for unconditional jumps.
    Branch {
        cond: Option<ValueRef>,
        targets: Vec<BlockId>,
    },
    /// Function return.
    Return { value: Option<ValueRef> },
    /// Call site. An invoke is a `Call` whose parent block's terminator
    /// carries the normal/unwind successor edges.
    Call { callee: Callee, args: Vec<ValueRef> },
    /// Any other instruction: classified purely from its operands.
    Compute { op: String, operands: Vec<ValueRef> },
}

/// An instruction, positioned in a block.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: InstId,
    pub name: String,
    pub block: BlockId,
    pub func: FuncId,
    pub kind: InstKind,
}

impl Instruction {
    /// All value operands, in order.
    pub fn operands(&self) -> Vec<ValueRef> {
        match &self.kind {
            InstKind::Alloc => Vec::new(),
            InstKind::Load { ptr, .. } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::Branch { cond, .. } => cond.iter().copied().collect(),
            InstKind::Return { value } => value.iter().copied().collect(),
            InstKind::Call { callee, args } => {
                let mut ops = args.clone();
                if let Callee::Indirect(target) = callee {
                    ops.push(*target);
                }
                ops
            }
            InstKind::Compute { operands, .. } => operands.clone(),
        }
    }

    /// Whether this instruction ends its block.
    #[inline]
    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, InstKind::Branch { .. } | InstKind::Return { .. })
    }
}

/// A basic block: instructions in program order plus CFG edges.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub func: FuncId,
    pub insts: Vec<InstId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

/// A formal argument of a function.
#[derive(Debug, Clone)]
pub struct Argument {
    pub id: ArgId,
    pub name: String,
    pub func: FuncId,
    /// Zero-based position in the function's formal argument list.
    pub index: u32,
    /// Pointer-typed arguments can carry out-parameter dependencies.
    pub is_pointer: bool,
}

/// A module-level global variable.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub id: GlobalId,
    pub name: String,
}

/// A literal constant.
#[derive(Debug, Clone)]
pub struct Constant {
    pub id: ConstId,
    pub name: String,
}

/// A function: formal arguments and blocks in layout order.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    pub args: Vec<ArgId>,
    pub blocks: Vec<BlockId>,
}

impl Function {
    /// Entry block, if any block has been added.
    #[inline]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

/// A whole program: arenas for every entity category.
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: Vec<Function>,
    blocks: Vec<BasicBlock>,
    insts: Vec<Instruction>,
    args: Vec<Argument>,
    globals: Vec<GlobalVariable>,
    consts: Vec<Constant>,
}

impl Module {
    /// Create an empty module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function with the given formal arguments.
    ///
    /// Each parameter is `(name, is_pointer)`.
    pub fn add_function(&mut self, name: impl Into<String>, params: &[(&str, bool)]) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let mut arg_ids = Vec::with_capacity(params.len());
        for (index, (pname, is_pointer)) in params.iter().enumerate() {
            let arg_id = ArgId(self.args.len() as u32);
            self.args.push(Argument {
                id: arg_id,
                name: (*pname).to_string(),
                func: id,
                index: index as u32,
                is_pointer: *is_pointer,
            });
            arg_ids.push(arg_id);
        }
        self.functions.push(Function {
            id,
            name: name.into(),
            args: arg_ids,
            blocks: Vec::new(),
        });
        id
    }

    /// Append a block to a function's layout order.
    pub fn add_block(&mut self, func: FuncId, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            name: name.into(),
            func,
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        });
        self.functions[func.0 as usize].blocks.push(id);
        id
    }

    /// Record a CFG edge between two blocks of the same function.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        assert_eq!(
            self.blocks[from.0 as usize].func,
            self.blocks[to.0 as usize].func,
            "CFG edge crosses function boundaries"
        );
        self.blocks[from.0 as usize].succs.push(to);
        self.blocks[to.0 as usize].preds.push(from);
    }

    /// Add a module-level global variable.
    pub fn add_global(&mut self, name: impl Into<String>) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalVariable {
            id,
            name: name.into(),
        });
        id
    }

    /// Add a literal constant.
    pub fn add_const(&mut self, name: impl Into<String>) -> ConstId {
        let id = ConstId(self.consts.len() as u32);
        self.consts.push(Constant {
            id,
            name: name.into(),
        });
        id
    }

    /// Append an instruction to a block.
    pub fn push_inst(&mut self, block: BlockId, name: impl Into<String>, kind: InstKind) -> InstId {
        let id = InstId(self.insts.len() as u32);
        let func = self.blocks[block.0 as usize].func;
        self.insts.push(Instruction {
            id,
            name: name.into(),
            block,
            func,
            kind,
        });
        self.blocks[block.0 as usize].insts.push(id);
        id
    }

    /// Look up a function. Panics on a stale id.
    #[inline]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    /// Look up a block. Panics on a stale id.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    /// Look up an instruction. Panics on a stale id.
    #[inline]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.0 as usize]
    }

    /// Look up a formal argument. Panics on a stale id.
    #[inline]
    pub fn argument(&self, id: ArgId) -> &Argument {
        &self.args[id.0 as usize]
    }

    /// Look up a global variable. Panics on a stale id.
    #[inline]
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.0 as usize]
    }

    /// Look up a constant. Panics on a stale id.
    #[inline]
    pub fn constant(&self, id: ConstId) -> &Constant {
        &self.consts[id.0 as usize]
    }

    /// All functions in module order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    /// All global variables in module order.
    pub fn globals(&self) -> impl Iterator<Item = &GlobalVariable> {
        self.globals.iter()
    }

    /// Number of functions.
    #[inline]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Number of blocks across the module (also the `BlockId` space).
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The terminator of a block, if its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<&Instruction> {
        let inst = self.block(block).insts.last()?;
        let inst = self.inst(*inst);
        inst.is_terminator().then_some(inst)
    }
}
