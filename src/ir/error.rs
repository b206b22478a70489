// SPDX-License-Identifier: BSD-3-Clause
#[derive(Clone, Debug, Hash, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Malformed module: duplicate definition of {0}")]
    Duplicate(String),
    #[error("Malformed module: bad operand {operand} in {function}")]
    BadOperand { function: String, operand: String },
    #[error("Malformed module: unknown block {block} in {function}")]
    BadBlock { function: String, block: String },
    #[error("Malformed module: {function} has no blocks")]
    NoBlocks { function: String },
    #[error("Malformed module: block {block} in {function} does not end in a terminator")]
    Unterminated { function: String, block: String },
    #[error("Malformed module: terminator in the middle of block {block} in {function}")]
    EarlyTerminator { function: String, block: String },
}
