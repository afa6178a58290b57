//! Symbolic evaluation of R5900 instructions into expression trees, and a linear replay driver
//! that turns a function's instructions into a list of pseudocode statements.

mod config;
pub mod context;
pub mod eval;
pub mod lifter;
pub mod source;
pub mod ssa;
pub mod stmt;

#[cfg(test)]
mod tests;

use r5900_ir::ExprError;
use r5900_isa::DecodeError;

pub use crate::{
    config::Config,
    context::DecompilerContext,
    eval::ToExpression,
    lifter::{Function, FunctionLifter},
    source::{Endianness, Image, InstructionSource},
    ssa::{LocationDef, LocationUse, Phi},
    stmt::Statement,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Decode(DecodeError),

    /// An expression could not be built for the instruction at `address`.
    Expr { address: u64, error: ExprError },

    /// The instruction source has no bytes at `address`.
    Unmapped { address: u64 },

    /// The requested range is empty or not word aligned.
    InvalidRange { start: u64, end: u64 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{e}"),
            Self::Expr { address, error } => write!(f, "{error} at {address:#x}"),
            Self::Unmapped { address } => write!(f, "failed to read instruction at {address:#x}"),
            Self::InvalidRange { start, end } => {
                write!(f, "invalid function range {start:#x}..{end:#x}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Expr { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}
