// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalName(String);

impl From<&str> for GlobalName {
    fn from(s: &str) -> Self {
        GlobalName(s.to_string())
    }
}

impl GlobalName {
    pub(crate) fn get(&self) -> &str {
        &self.0
    }
}

impl Display for GlobalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionName(String);

impl From<&str> for FunctionName {
    fn from(s: &str) -> Self {
        FunctionName(s.to_string())
    }
}

impl From<String> for FunctionName {
    fn from(s: String) -> Self {
        FunctionName(s)
    }
}

impl<T> PartialEq<T> for FunctionName
where
    T: AsRef<str>,
{
    fn eq(&self, other: &T) -> bool {
        self.0.as_str().eq(other.as_ref())
    }
}

impl FunctionName {
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Block names are only unique within their function.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockName(String);

impl From<&str> for BlockName {
    fn from(s: &str) -> Self {
        BlockName(s.to_string())
    }
}

impl Display for BlockName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unnamed instructions (stores, branches, ...) are named after their block
/// and position.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstructionName {
    Named(String),
    Positional { block: BlockName, idx: usize },
}

impl InstructionName {
    pub(crate) fn new(name: Option<&str>, block: &BlockName, idx: usize) -> Self {
        match name {
            Some(n) => InstructionName::Named(n.to_string()),
            None => InstructionName::Positional {
                block: block.clone(),
                idx,
            },
        }
    }
}

impl Display for InstructionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstructionName::Named(n) => write!(f, "%{}", n),
            InstructionName::Positional { block, idx } => write!(f, "{}:{}", block, idx),
        }
    }
}
