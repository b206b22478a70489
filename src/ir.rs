// SPDX-License-Identifier: BSD-3-Clause
//! Representation of a program that is amenable to analysis.
//!
//! Functions, blocks and instructions live in arenas and refer to each other
//! by index, so control-flow cycles never turn into ownership cycles. A
//! [`Module`] is built by lowering the serialized [`syntax::Module`], which
//! resolves every name once up front.

use std::collections::HashMap;
use std::fmt::Display;

pub mod cfg;
mod error;
pub use error::*;
pub mod instruction;
pub use instruction::*;
mod name;
pub use name::*;
pub mod syntax;

macro_rules! id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub(crate) fn from_index(i: usize) -> Self {
                $name(u32::try_from(i).expect("index overflow"))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id!(FuncId, "fn");
id!(DeclId, "decl");
id!(GlobalId, "g");
id!(BlockId, "bb");
id!(InstId, "i");

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Instruction {
    pub name: InstructionName,
    pub block: BlockId,
    pub opcode: Opcode,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Block {
    pub name: BlockName,
    pub instrs: Vec<InstId>,
}

impl Block {
    /// Lowering guarantees blocks are non-empty.
    pub fn terminator(&self) -> InstId {
        self.instrs[self.instrs.len() - 1]
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub pointer: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Function {
    pub name: FunctionName,
    pub params: Vec<Param>,
    pub returns_pointer: bool,
    pub blocks: Vec<Block>,
    pub instrs: Vec<Instruction>,
}

impl Function {
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    #[inline]
    pub fn instruction(&self, i: InstId) -> &Instruction {
        &self.instrs[i.index()]
    }

    #[inline]
    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.index()]
    }

    pub fn inst_ids(&self) -> impl Iterator<Item = InstId> {
        (0..self.instrs.len()).map(InstId::from_index)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::from_index)
    }

    pub fn pointer_params(&self) -> impl Iterator<Item = u32> + '_ {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.pointer)
            .map(|(i, _)| i as u32)
    }

    pub fn find_instruction(&self, name: &str) -> Option<InstId> {
        self.inst_ids()
            .find(|i| matches!(&self.instruction(*i).name, InstructionName::Named(n) if n == name))
    }

    pub(crate) fn new(
        names: &HashMap<&str, Operand>,
        f: &syntax::Function,
    ) -> Result<Self, Error> {
        let fname = || f.name.clone();
        if f.blocks.is_empty() {
            return Err(Error::NoBlocks { function: fname() });
        }

        let mut blocks_by_name = HashMap::with_capacity(f.blocks.len());
        for (i, b) in f.blocks.iter().enumerate() {
            if blocks_by_name
                .insert(b.name.as_str(), BlockId::from_index(i))
                .is_some()
            {
                return Err(Error::Duplicate(format!("{}:{}", f.name, b.name)));
            }
        }

        // Have to name every instruction before lowering any of them, since
        // phis refer to values defined later on.
        let mut locals: HashMap<&str, Operand> = HashMap::new();
        for (i, p) in f.params.iter().enumerate() {
            if locals
                .insert(p.name.as_str(), Operand::Param(i as u32))
                .is_some()
            {
                return Err(Error::Duplicate(format!("{}:%{}", f.name, p.name)));
            }
        }
        let mut next = 0;
        for b in &f.blocks {
            for i in &b.instructions {
                if let Some(n) = &i.name {
                    if locals
                        .insert(n.as_str(), Operand::Local(InstId::from_index(next)))
                        .is_some()
                    {
                        return Err(Error::Duplicate(format!("{}:%{}", f.name, n)));
                    }
                }
                next += 1;
            }
        }

        let operand = |s: &str| -> Result<Operand, Error> {
            let bad = || Error::BadOperand {
                function: f.name.clone(),
                operand: s.to_string(),
            };
            match s {
                "null" => Ok(Operand::Null),
                "undef" => Ok(Operand::Undef),
                _ => {
                    if let Some(local) = s.strip_prefix('%') {
                        locals.get(local).copied().ok_or_else(bad)
                    } else if let Some(global) = s.strip_prefix('@') {
                        names.get(global).copied().ok_or_else(bad)
                    } else {
                        Err(bad())
                    }
                }
            }
        };
        let block = |s: &str| -> Result<BlockId, Error> {
            blocks_by_name
                .get(s)
                .copied()
                .ok_or_else(|| Error::BadBlock {
                    function: f.name.clone(),
                    block: s.to_string(),
                })
        };

        let mut blocks = Vec::with_capacity(f.blocks.len());
        let mut instrs = Vec::with_capacity(next);
        for (bidx, b) in f.blocks.iter().enumerate() {
            let block_name = BlockName::from(b.name.as_str());
            let mut ids = Vec::with_capacity(b.instructions.len());
            for (idx, i) in b.instructions.iter().enumerate() {
                let opcode = match &i.op {
                    syntax::Op::Alloca => Opcode::Alloc {
                        kind: AllocKind::Stack,
                    },
                    syntax::Op::Malloc => Opcode::Alloc {
                        kind: AllocKind::Heap,
                    },
                    syntax::Op::Load { pointer } => Opcode::Load {
                        pointer: operand(pointer.as_str())?,
                    },
                    syntax::Op::Store { pointer, value } => Opcode::Store {
                        pointer: operand(pointer.as_str())?,
                        value: operand(value.as_str())?,
                    },
                    syntax::Op::Call { callee, args } => Opcode::Call {
                        callee: Self::callee(names, &locals, callee),
                        args: args
                            .iter()
                            .map(|a| operand(a.as_str()))
                            .collect::<Result<_, _>>()?,
                    },
                    syntax::Op::Cast { operand: op } => Opcode::Cast {
                        operand: operand(op.as_str())?,
                    },
                    syntax::Op::Phi { incoming } => Opcode::Phi {
                        incoming: incoming
                            .iter()
                            .map(|(b, v)| Ok((block(b.as_str())?, operand(v.as_str())?)))
                            .collect::<Result<_, Error>>()?,
                    },
                    syntax::Op::Select {
                        true_value,
                        false_value,
                    } => Opcode::Select {
                        true_value: operand(true_value.as_str())?,
                        false_value: operand(false_value.as_str())?,
                    },
                    syntax::Op::Opaque => Opcode::Opaque,
                    syntax::Op::Ret { value } => Opcode::Ret {
                        value: value.as_deref().map(operand).transpose()?,
                    },
                    syntax::Op::Br { targets } => Opcode::Br {
                        targets: targets
                            .iter()
                            .map(|t| block(t.as_str()))
                            .collect::<Result<_, _>>()?,
                    },
                    syntax::Op::Unreachable => Opcode::Unreachable,
                    syntax::Op::Other => Opcode::Other,
                };
                let last = idx + 1 == b.instructions.len();
                if opcode.is_terminator() && !last {
                    return Err(Error::EarlyTerminator {
                        function: fname(),
                        block: b.name.clone(),
                    });
                }
                if !opcode.is_terminator() && last {
                    return Err(Error::Unterminated {
                        function: fname(),
                        block: b.name.clone(),
                    });
                }
                let id = InstId::from_index(instrs.len());
                instrs.push(Instruction {
                    name: InstructionName::new(i.name.as_deref(), &block_name, idx),
                    block: BlockId::from_index(bidx),
                    opcode,
                });
                ids.push(id);
            }
            if ids.is_empty() {
                return Err(Error::Unterminated {
                    function: fname(),
                    block: b.name.clone(),
                });
            }
            blocks.push(Block {
                name: block_name,
                instrs: ids,
            });
        }

        Ok(Function {
            name: FunctionName::from(f.name.as_str()),
            params: f
                .params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    pointer: p.pointer,
                })
                .collect(),
            returns_pointer: f.returns_pointer,
            blocks,
            instrs,
        })
    }

    fn callee(names: &HashMap<&str, Operand>, locals: &HashMap<&str, Operand>, s: &str) -> Callee {
        if s == "asm" {
            return Callee::Asm;
        }
        if let Some(local) = s.strip_prefix('%') {
            if let Some(op) = locals.get(local) {
                return Callee::Indirect(*op);
            }
        }
        let name = s.strip_prefix('@').unwrap_or(s);
        match names.get(name) {
            Some(Operand::Function(f)) => Callee::Function(*f),
            Some(Operand::Decl(d)) => Callee::Decl(*d),
            Some(op) => Callee::Indirect(*op),
            None => {
                tracing::debug!("call to unknown function {}", name);
                Callee::Unknown(FunctionName::from(name))
            }
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Decl {
    pub name: FunctionName,
    pub returns_pointer: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Global {
    pub name: GlobalName,
    pub initializer: Option<Operand>,
}

#[derive(Clone, Debug)]
pub struct Module {
    pub decls: Vec<Decl>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}

impl Module {
    pub fn new(m: &syntax::Module) -> Result<Self, Error> {
        let mut names: HashMap<&str, Operand> = HashMap::with_capacity(
            m.functions.len() + m.declarations.len() + m.globals.len(),
        );
        for (i, g) in m.globals.iter().enumerate() {
            if names
                .insert(g.name.as_str(), Operand::Global(GlobalId::from_index(i)))
                .is_some()
            {
                return Err(Error::Duplicate(format!("@{}", g.name)));
            }
        }
        for (i, f) in m.functions.iter().enumerate() {
            if names
                .insert(f.name.as_str(), Operand::Function(FuncId::from_index(i)))
                .is_some()
            {
                return Err(Error::Duplicate(format!("@{}", f.name)));
            }
        }
        for (i, d) in m.declarations.iter().enumerate() {
            if names
                .insert(d.name.as_str(), Operand::Decl(DeclId::from_index(i)))
                .is_some()
            {
                return Err(Error::Duplicate(format!("@{}", d.name)));
            }
        }

        let mut globals = Vec::with_capacity(m.globals.len());
        for g in &m.globals {
            let initializer = match &g.initializer {
                None => None,
                Some(init) => {
                    let name = init.strip_prefix('@').unwrap_or(init);
                    Some(names.get(name).copied().ok_or_else(|| Error::BadOperand {
                        function: format!("@{}", g.name),
                        operand: init.clone(),
                    })?)
                }
            };
            globals.push(Global {
                name: GlobalName::from(g.name.as_str()),
                initializer,
            });
        }

        let mut functions = Vec::with_capacity(m.functions.len());
        for f in &m.functions {
            functions.push(Function::new(&names, f)?);
        }

        let decls = m
            .declarations
            .iter()
            .map(|d| Decl {
                name: FunctionName::from(d.name.as_str()),
                returns_pointer: d.returns_pointer,
            })
            .collect();

        Ok(Module {
            decls,
            functions,
            globals,
        })
    }

    pub fn from_json(s: &str) -> Result<Self, crate::Error> {
        let syntax: syntax::Module = serde_json::from_str(s)?;
        Ok(Module::new(&syntax)?)
    }

    #[inline]
    pub fn function(&self, f: FuncId) -> &Function {
        &self.functions[f.index()]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len()).map(FuncId::from_index)
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> {
        (0..self.globals.len()).map(GlobalId::from_index)
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId::from_index)
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name.get() == name)
            .map(GlobalId::from_index)
    }

    /// Whether a call through this callee produces a pointer.
    pub fn returns_pointer(&self, callee: &Callee) -> bool {
        match callee {
            Callee::Function(f) => self.function(*f).returns_pointer,
            Callee::Decl(d) => self.decls[d.index()].returns_pointer,
            Callee::Indirect(_) => true,
            Callee::Asm => true,
            Callee::Unknown(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(json: &str) -> Result<Module, crate::Error> {
        Module::from_json(json)
    }

    #[test]
    fn resolves_names() {
        let m = lower(
            r#"{
              "globals": [{"name": "g"}],
              "declarations": [{"name": "malloc", "returns_pointer": true}],
              "functions": [{
                "name": "f",
                "params": [{"name": "p"}],
                "blocks": [
                  {"name": "entry", "instructions": [
                    {"name": "x", "op": "load", "pointer": "%p"},
                    {"op": "store", "pointer": "@g", "value": "%x"},
                    {"name": "y", "op": "call", "callee": "@malloc", "args": ["null"]},
                    {"name": "z", "op": "call", "callee": "@nowhere"},
                    {"op": "br", "targets": ["exit"]}
                  ]},
                  {"name": "exit", "instructions": [{"op": "ret", "value": "%y"}]}
                ]
              }]
            }"#,
        )
        .unwrap();
        let f = &m.functions[0];
        assert_eq!(f.instrs.len(), 6);
        assert_eq!(
            f.instruction(InstId(0)).opcode,
            Opcode::Load {
                pointer: Operand::Param(0)
            }
        );
        assert_eq!(
            f.instruction(InstId(1)).opcode,
            Opcode::Store {
                pointer: Operand::Global(GlobalId(0)),
                value: Operand::Local(InstId(0))
            }
        );
        assert!(matches!(
            &f.instruction(InstId(2)).opcode,
            Opcode::Call { callee: Callee::Decl(DeclId(0)), .. }
        ));
        assert!(matches!(
            &f.instruction(InstId(3)).opcode,
            Opcode::Call { callee: Callee::Unknown(_), .. }
        ));
        assert_eq!(f.block(BlockId(0)).terminator(), InstId(4));
        assert_eq!(f.find_instruction("y"), Some(InstId(2)));
    }

    #[test]
    fn rejects_bad_local() {
        let e = lower(
            r#"{"functions": [{"name": "f", "blocks": [
                {"name": "entry", "instructions": [{"op": "ret", "value": "%nope"}]}]}]}"#,
        );
        assert!(matches!(e, Err(crate::Error::Module(Error::BadOperand { .. }))));
    }

    #[test]
    fn rejects_unterminated_block() {
        let e = lower(
            r#"{"functions": [{"name": "f", "blocks": [
                {"name": "entry", "instructions": [{"name": "a", "op": "alloca"}]}]}]}"#,
        );
        assert!(matches!(e, Err(crate::Error::Module(Error::Unterminated { .. }))));
    }
}
