use std::sync::OnceLock;

use crate::{
    instruction::{Fields, Instruction},
    matcher::Match,
    opcodes::Opcode,
    DecodeError,
};

/// Field positions used by the opcode tables.
mod field {
    pub const OP: (u8, u8) = (26, 6);
    pub const RS: (u8, u8) = (21, 5);
    pub const RT: (u8, u8) = (16, 5);
    pub const SA: (u8, u8) = (6, 5);
    pub const FUNCT: (u8, u8) = (0, 6);
}

fn table((start, len): (u8, u8)) -> Match {
    Match::new(start, len)
}

/// Builds the complete opcode trie for the R5900 integer, multimedia, COP0 and COP1 instruction
/// sets.
pub fn build_table() -> Match {
    use Opcode::*;

    let special = table(field::FUNCT)
        .with(0x00, Sll)
        .with(0x02, Srl)
        .with(0x03, Sra)
        .with(0x04, Sllv)
        .with(0x06, Srlv)
        .with(0x07, Srav)
        .with(0x08, Jr)
        .with(0x09, Jalr)
        .with(0x0a, Movz)
        .with(0x0b, Movn)
        .with(0x0c, Syscall)
        .with(0x0d, Break)
        .with(0x0f, Sync)
        .with(0x10, Mfhi)
        .with(0x11, Mthi)
        .with(0x12, Mflo)
        .with(0x13, Mtlo)
        .with(0x14, Dsllv)
        .with(0x16, Dsrlv)
        .with(0x17, Dsrav)
        .with(0x18, Mult)
        .with(0x19, Multu)
        .with(0x1a, Div)
        .with(0x1b, Divu)
        .with(0x20, Add)
        .with(0x21, Addu)
        .with(0x22, Sub)
        .with(0x23, Subu)
        .with(0x24, And)
        .with(0x25, Or)
        .with(0x26, Xor)
        .with(0x27, Nor)
        .with(0x28, Mfsa)
        .with(0x29, Mtsa)
        .with(0x2a, Slt)
        .with(0x2b, Sltu)
        .with(0x2c, Dadd)
        .with(0x2d, Daddu)
        .with(0x2e, Dsub)
        .with(0x2f, Dsubu)
        .with(0x30, Tge)
        .with(0x31, Tgeu)
        .with(0x32, Tlt)
        .with(0x33, Tltu)
        .with(0x34, Teq)
        .with(0x36, Tne)
        .with(0x38, Dsll)
        .with(0x3a, Dsrl)
        .with(0x3b, Dsra)
        .with(0x3c, Dsll32)
        .with(0x3e, Dsrl32)
        .with(0x3f, Dsra32);

    let regimm = table(field::RT)
        .with(0x00, Bltz)
        .with(0x01, Bgez)
        .with(0x02, Bltzl)
        .with(0x03, Bgezl)
        .with(0x08, Tgei)
        .with(0x09, Tgeiu)
        .with(0x0a, Tlti)
        .with(0x0b, Tltiu)
        .with(0x0c, Teqi)
        .with(0x0e, Tnei)
        .with(0x10, Bltzal)
        .with(0x11, Bgezal)
        .with(0x12, Bltzall)
        .with(0x13, Bgezall)
        .with(0x18, Mtsab)
        .with(0x19, Mtsah);

    let mmi0 = table(field::SA)
        .with(0x00, Paddw)
        .with(0x01, Psubw)
        .with(0x02, Pcgtw)
        .with(0x03, Pmaxw)
        .with(0x04, Paddh)
        .with(0x05, Psubh)
        .with(0x06, Pcgth)
        .with(0x07, Pmaxh)
        .with(0x08, Paddb)
        .with(0x09, Psubb)
        .with(0x0a, Pcgtb)
        .with(0x10, Paddsw)
        .with(0x11, Psubsw)
        .with(0x12, Pextlw)
        .with(0x13, Ppacw)
        .with(0x14, Paddsh)
        .with(0x15, Psubsh)
        .with(0x16, Pextlh)
        .with(0x17, Ppach)
        .with(0x18, Paddsb)
        .with(0x19, Psubsb)
        .with(0x1a, Pextlb)
        .with(0x1b, Ppacb)
        .with(0x1e, Pext5)
        .with(0x1f, Ppac5);

    let mmi1 = table(field::SA)
        .with(0x01, Pabsw)
        .with(0x02, Pceqw)
        .with(0x03, Pminw)
        .with(0x04, Padsbh)
        .with(0x05, Pabsh)
        .with(0x06, Pceqh)
        .with(0x07, Pminh)
        .with(0x0a, Pceqb)
        .with(0x10, Padduw)
        .with(0x11, Psubuw)
        .with(0x12, Pextuw)
        .with(0x14, Padduh)
        .with(0x15, Psubuh)
        .with(0x16, Pextuh)
        .with(0x18, Paddub)
        .with(0x19, Psubub)
        .with(0x1a, Pextub)
        .with(0x1b, Qfsrv);

    let mmi2 = table(field::SA)
        .with(0x00, Pmaddw)
        .with(0x02, Psllvw)
        .with(0x03, Psrlvw)
        .with(0x04, Pmsubw)
        .with(0x08, Pmfhi)
        .with(0x09, Pmflo)
        .with(0x0a, Pinth)
        .with(0x0c, Pmultw)
        .with(0x0d, Pdivw)
        .with(0x0e, Pcpyld)
        .with(0x10, Pmaddh)
        .with(0x11, Phmadh)
        .with(0x12, Pand)
        .with(0x13, Pxor)
        .with(0x14, Pmsubh)
        .with(0x15, Phmsbh)
        .with(0x1a, Pexeh)
        .with(0x1b, Prevh)
        .with(0x1c, Pmulth)
        .with(0x1d, Pdivbw)
        .with(0x1e, Pexew)
        .with(0x1f, Prot3w);

    let mmi3 = table(field::SA)
        .with(0x00, Pmadduw)
        .with(0x03, Psravw)
        .with(0x08, Pmthi)
        .with(0x09, Pmtlo)
        .with(0x0a, Pinteh)
        .with(0x0c, Pmultuw)
        .with(0x0d, Pdivuw)
        .with(0x0e, Pcpyud)
        .with(0x12, Por)
        .with(0x13, Pnor)
        .with(0x1a, Pexch)
        .with(0x1b, Pcpyh)
        .with(0x1e, Pexcw);

    let mmi = table(field::FUNCT)
        .with(0x00, Madd)
        .with(0x01, Maddu)
        .with(0x04, Plzcw)
        .with(0x08, mmi0)
        .with(0x09, mmi2)
        .with(0x10, Mfhi1)
        .with(0x11, Mthi1)
        .with(0x12, Mflo1)
        .with(0x13, Mtlo1)
        .with(0x18, Mult1)
        .with(0x19, Multu1)
        .with(0x1a, Div1)
        .with(0x1b, Divu1)
        .with(0x20, Madd1)
        .with(0x21, Maddu1)
        .with(0x28, mmi1)
        .with(0x29, mmi3)
        .with(0x30, Pmfhl)
        .with(0x31, Pmthl)
        .with(0x34, Psllh)
        .with(0x36, Psrlh)
        .with(0x37, Psrah)
        .with(0x3c, Psllw)
        .with(0x3e, Psrlw)
        .with(0x3f, Psraw);

    let bc0 = table(field::RT).with(0x00, Bc0f).with(0x01, Bc0t).with(0x02, Bc0fl).with(0x03, Bc0tl);
    let c0 = table(field::FUNCT)
        .with(0x01, Tlbr)
        .with(0x02, Tlbwi)
        .with(0x06, Tlbwr)
        .with(0x08, Tlbp)
        .with(0x18, Eret)
        .with(0x38, Ei)
        .with(0x39, Di);
    let cop0 = table(field::RS).with(0x00, Mfc0).with(0x04, Mtc0).with(0x08, bc0).with(0x10, c0);

    let bc1 = table(field::RT).with(0x00, Bc1f).with(0x01, Bc1t).with(0x02, Bc1fl).with(0x03, Bc1tl);
    let fpu_s = table(field::FUNCT)
        .with(0x00, AddS)
        .with(0x01, SubS)
        .with(0x02, MulS)
        .with(0x03, DivS)
        .with(0x04, SqrtS)
        .with(0x05, AbsS)
        .with(0x06, MovS)
        .with(0x07, NegS)
        .with(0x16, RsqrtS)
        .with(0x18, AddaS)
        .with(0x19, SubaS)
        .with(0x1a, MulaS)
        .with(0x1c, MaddS)
        .with(0x1d, MsubS)
        .with(0x1e, MaddaS)
        .with(0x1f, MsubaS)
        .with(0x24, CvtWS)
        .with(0x28, MaxS)
        .with(0x29, MinS)
        .with(0x30, CFS)
        .with(0x32, CEqS)
        .with(0x34, CLtS)
        .with(0x36, CLeS);
    let fpu_w = table(field::FUNCT).with(0x20, CvtSW);
    let cop1 = table(field::RS)
        .with(0x00, Mfc1)
        .with(0x02, Cfc1)
        .with(0x04, Mtc1)
        .with(0x06, Ctc1)
        .with(0x08, bc1)
        .with(0x10, fpu_s)
        .with(0x14, fpu_w);

    table(field::OP)
        .with(0x00, special)
        .with(0x01, regimm)
        .with(0x02, J)
        .with(0x03, Jal)
        .with(0x04, Beq)
        .with(0x05, Bne)
        .with(0x06, Blez)
        // `bgtz` only; `bgtzl` has its own encoding at 0x17.
        .with(0x07, Bgtz)
        .with(0x08, Addi)
        .with(0x09, Addiu)
        .with(0x0a, Slti)
        .with(0x0b, Sltiu)
        .with(0x0c, Andi)
        .with(0x0d, Ori)
        .with(0x0e, Xori)
        .with(0x0f, Lui)
        .with(0x10, cop0)
        .with(0x11, cop1)
        .with(0x14, Beql)
        // The only `bnel` encoding. A second entry for it would be recorded as a conflict.
        .with(0x15, Bnel)
        .with(0x16, Blezl)
        .with(0x17, Bgtzl)
        .with(0x18, Daddi)
        .with(0x19, Daddiu)
        .with(0x1a, Ldl)
        .with(0x1b, Ldr)
        .with(0x1c, mmi)
        .with(0x1e, Lq)
        .with(0x1f, Sq)
        .with(0x20, Lb)
        .with(0x21, Lh)
        .with(0x22, Lwl)
        .with(0x23, Lw)
        .with(0x24, Lbu)
        .with(0x25, Lhu)
        .with(0x26, Lwr)
        .with(0x27, Lwu)
        .with(0x28, Sb)
        .with(0x29, Sh)
        .with(0x2a, Swl)
        .with(0x2b, Sw)
        .with(0x2c, Sdl)
        .with(0x2d, Sdr)
        .with(0x2e, Swr)
        .with(0x2f, Cache)
        .with(0x31, Lwc1)
        .with(0x33, Pref)
        .with(0x37, Ld)
        .with(0x39, Swc1)
        .with(0x3f, Sd)
}

/// Decodes instruction words into [Instruction] records.
pub struct Decoder {
    table: Match,

    /// Controls whether common idioms are rewritten to their pseudo-instruction form.
    pub simplify: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        let table = build_table();
        for conflict in table.conflicts() {
            tracing::error!("ambiguous opcode encoding: {conflict}");
        }
        Self { table, simplify: true }
    }

    pub fn table(&self) -> &Match {
        &self.table
    }

    /// Decodes `word`, located at `address`.
    ///
    /// Decoding is total over the encodings in the opcode tables: any word that does not select an
    /// instruction kind produces [DecodeError::UnknownOpcode].
    pub fn decode(&self, word: u32, address: u64) -> Result<Instruction, DecodeError> {
        if word == 0 {
            return Ok(Instruction::new(Opcode::Nop, word, address));
        }

        let opcode = self.table.lookup(word).ok_or(DecodeError::UnknownOpcode { address, word })?;
        let inst = Instruction::new(opcode, word, address);
        Ok(match self.simplify {
            true => simplify(inst),
            false => inst,
        })
    }
}

/// Decodes `word` using a shared decoder with simplification enabled.
pub fn decode(word: u32, address: u64) -> Result<Instruction, DecodeError> {
    static DECODER: OnceLock<Decoder> = OnceLock::new();
    DECODER.get_or_init(Decoder::new).decode(word, address)
}

/// Rewrites an instruction into its canonical pseudo-instruction form, or returns it unchanged.
///
/// - `beq $zero, $zero, target` becomes `b target`
/// - `or rd, rs, $zero` and `daddu rd, rs, $zero` become `move rd, rs`
/// - `addiu rt, $zero, imm` becomes `li rt, imm`
pub fn simplify(inst: Instruction) -> Instruction {
    let f = Fields(inst.word);
    let replacement = match inst.opcode {
        Opcode::Beq if f.rs() == 0 && f.rt() == 0 => Opcode::B,
        Opcode::Or | Opcode::Daddu if f.rt() == 0 => Opcode::Move,
        Opcode::Addiu if f.rs() == 0 => Opcode::Li,
        _ => return inst,
    };
    Instruction::new(replacement, inst.word, inst.address)
}
