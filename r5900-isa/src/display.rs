use std::fmt;

use crate::{
    instruction::{Instruction, Operand},
    opcodes::Opcode,
};

/// Names of the `fmt` field of `pmfhl`/`pmthl`.
const HL_FORMATS: [&str; 5] = ["lw", "uw", "slw", "lh", "sh"];

struct SignedHex(i64);

impl fmt::Display for SignedHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            x if x < 0 => write!(f, "-{:#x}", x.unsigned_abs()),
            x => write!(f, "{x:#x}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => reg.fmt(f),
            Self::Signed(value) if (-9..=9).contains(value) => write!(f, "{value}"),
            Self::Signed(value) => SignedHex(*value).fmt(f),
            Self::Unsigned(value) if *value < 10 => write!(f, "{value}"),
            Self::Unsigned(value) => write!(f, "{value:#x}"),
            Self::Mem { base, offset } => write!(f, "{}({base})", SignedHex(*offset)),
            Self::Target(target) => write!(f, "{target:#x}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut operands = self.operands.as_slice();
        match self.opcode {
            Opcode::Pmfhl | Opcode::Pmthl => {
                let fmt = self.sa() as usize;
                match HL_FORMATS.get(fmt) {
                    Some(name) => write!(f, "{}.{name}", self.opcode.mnemonic())?,
                    None => write!(f, "{}.{fmt}", self.opcode.mnemonic())?,
                }
                operands = &operands[..operands.len().min(1)];
            }
            opcode => f.write_str(opcode.mnemonic())?,
        }

        for (i, operand) in operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            operand.fmt(f)?;
        }
        Ok(())
    }
}
