// SPDX-License-Identifier: BSD-3-Clause
//! Serialized form of a [`super::Module`].
//!
//! Operands are strings: `%x` names an instruction result or a parameter,
//! `@x` a global, function or declaration, and `null`/`undef` are constants.

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Module {
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Global {
    pub name: String,
    /// Another global or a function whose address this global holds
    #[serde(default)]
    pub initializer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Declaration {
    pub name: String,
    #[serde(default)]
    pub returns_pointer: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns_pointer: bool,
    pub blocks: Vec<Block>,
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Param {
    pub name: String,
    #[serde(default = "yes")]
    pub pointer: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Block {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Instruction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Op {
    Alloca,
    Malloc,
    Load {
        pointer: String,
    },
    Store {
        pointer: String,
        value: String,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Cast {
        operand: String,
    },
    Phi {
        /// `(block, value)` pairs
        incoming: Vec<(String, String)>,
    },
    Select {
        true_value: String,
        false_value: String,
    },
    Opaque,
    Ret {
        #[serde(default)]
        value: Option<String>,
    },
    Br {
        targets: Vec<String>,
    },
    Unreachable,
    Other,
}
