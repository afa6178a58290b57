//! Instruction decoding for the R5900 (MIPS III/IV derived 64-bit core with 128-bit multimedia
//! extensions, a single precision FPU and a system control coprocessor).

pub mod decoder;
mod display;
pub mod instruction;
pub mod matcher;
pub mod opcodes;
pub mod regs;

#[cfg(test)]
mod tests;

pub use crate::{
    decoder::{decode, simplify, Decoder},
    instruction::{InstFlags, Instruction, Operand},
    opcodes::{Format, Opcode},
    regs::{Lane, Location, Register},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// No entry of the opcode tables matched the instruction word.
    UnknownOpcode { address: u64, word: u32 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode { address, word } => {
                write!(f, "unknown opcode {word:#010x} at {address:#x}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
