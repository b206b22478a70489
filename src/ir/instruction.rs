// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use super::{BlockId, DeclId, FuncId, FunctionName, GlobalId, InstId};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operand {
    Local(InstId),
    Param(u32),
    Global(GlobalId),
    Function(FuncId),
    Decl(DeclId),
    Null,
    Undef,
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Local(i) => write!(f, "{}", i),
            Operand::Param(p) => write!(f, "%arg{}", p),
            Operand::Global(g) => write!(f, "{}", g),
            Operand::Function(func) => write!(f, "{}", func),
            Operand::Decl(d) => write!(f, "{}", d),
            Operand::Null => write!(f, "null"),
            Operand::Undef => write!(f, "undef"),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Callee {
    Function(FuncId),
    Decl(DeclId),
    Indirect(Operand),
    Asm,
    /// A callee name that matches nothing in the module.
    Unknown(FunctionName),
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllocKind {
    Stack,
    Heap,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Opcode {
    Alloc {
        kind: AllocKind,
    },
    Load {
        pointer: Operand,
    },
    Store {
        pointer: Operand,
        value: Operand,
    },
    Call {
        callee: Callee,
        args: Vec<Operand>,
    },
    /// Pointer-preserving: bitcasts, field and element addresses.
    Cast {
        operand: Operand,
    },
    Phi {
        incoming: Vec<(BlockId, Operand)>,
    },
    Select {
        true_value: Operand,
        false_value: Operand,
    },
    /// A pointer whose origin cannot be analyzed (integer-to-pointer casts,
    /// inline assembly results, unmodeled intrinsics).
    Opaque,
    Ret {
        value: Option<Operand>,
    },
    Br {
        targets: Vec<BlockId>,
    },
    Unreachable,
    Other,
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        match self {
            Opcode::Ret { .. } => true,
            Opcode::Br { .. } => true,
            Opcode::Unreachable => true,
            // No `_` pattern to ensure this is updated if the type changes
            Opcode::Alloc { .. } => false,
            Opcode::Load { .. } => false,
            Opcode::Store { .. } => false,
            Opcode::Call { .. } => false,
            Opcode::Cast { .. } => false,
            Opcode::Phi { .. } => false,
            Opcode::Select { .. } => false,
            Opcode::Opaque => false,
            Opcode::Other => false,
        }
    }

    /// Operands whose points-to facts flow into this instruction.
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Opcode::Load { pointer } => vec![*pointer],
            Opcode::Store { pointer, value } => vec![*pointer, *value],
            Opcode::Call { callee, args } => {
                let mut os = match callee {
                    Callee::Indirect(op) => vec![*op],
                    Callee::Function(_) => vec![],
                    Callee::Decl(_) => vec![],
                    Callee::Asm => vec![],
                    Callee::Unknown(_) => vec![],
                };
                os.extend(args.iter().copied());
                os
            }
            Opcode::Cast { operand } => vec![*operand],
            Opcode::Phi { incoming } => incoming.iter().map(|(_, op)| *op).collect(),
            Opcode::Select {
                true_value,
                false_value,
            } => vec![*true_value, *false_value],
            Opcode::Ret { value } => value.iter().copied().collect(),
            Opcode::Alloc { .. } => Vec::new(),
            Opcode::Opaque => Vec::new(),
            Opcode::Br { .. } => Vec::new(),
            Opcode::Unreachable => Vec::new(),
            Opcode::Other => Vec::new(),
        }
    }

    pub fn successors(&self) -> &[BlockId] {
        match self {
            Opcode::Br { targets } => targets,
            _ => &[],
        }
    }
}
