use crate::{
    opcodes::{Format, Opcode},
    regs::{Location, Register},
};

bitflags::bitflags! {
    /// Static properties of an instruction kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstFlags: u16 {
        /// Transfers control and is followed by a delay slot.
        const BRANCH = 1 << 0;
        /// The delay slot is nullified when the branch is not taken.
        const LIKELY = 1 << 1;
        /// Writes a return address.
        const LINK   = 1 << 2;
        /// Unconditional control transfer.
        const JUMP   = 1 << 3;
        const LOAD   = 1 << 4;
        const STORE  = 1 << 5;
        /// Loaded values are sign-extended.
        const SIGNED = 1 << 6;
        const TRAP   = 1 << 7;
        const FPU    = 1 << 8;
        /// Operates on the 128-bit multimedia view of the general purpose registers.
        const MMI    = 1 << 9;
    }
}

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    Signed(i64),
    Unsigned(u64),
    Mem { base: Register, offset: i64 },
    Target(u64),
}

/// Raw bitfields of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields(pub u32);

impl Fields {
    #[inline]
    fn bits(self, start: u32, len: u32) -> u32 {
        (self.0 >> start) & ((1 << len) - 1)
    }

    #[inline]
    pub fn rs(self) -> u8 {
        self.bits(21, 5) as u8
    }

    #[inline]
    pub fn rt(self) -> u8 {
        self.bits(16, 5) as u8
    }

    #[inline]
    pub fn rd(self) -> u8 {
        self.bits(11, 5) as u8
    }

    #[inline]
    pub fn sa(self) -> u8 {
        self.bits(6, 5) as u8
    }

    #[inline]
    pub fn funct(self) -> u8 {
        self.bits(0, 6) as u8
    }

    #[inline]
    pub fn simm16(self) -> i64 {
        self.0 as u16 as i16 as i64
    }

    #[inline]
    pub fn uimm16(self) -> u64 {
        self.0 as u16 as u64
    }

    #[inline]
    pub fn code(self) -> u64 {
        self.bits(6, 20) as u64
    }

    #[inline]
    pub fn jump_index(self) -> u64 {
        self.bits(0, 26) as u64
    }
}

/// Computes the target of a PC-relative branch: a signed 16-bit word offset from the instruction
/// following the branch.
#[inline]
pub fn branch_target(address: u64, offset: i64) -> u64 {
    address.wrapping_add(4).wrapping_add((offset << 2) as u64)
}

/// Computes the target of a `j`/`jal` instruction: the 26-bit word index replaces the low 28 bits
/// of the address of the delay slot.
#[inline]
pub fn jump_target(address: u64, index: u64) -> u64 {
    (address.wrapping_add(4) & !0x0fff_ffff) | (index << 2)
}

/// An immutable record of a single decoded instruction word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub word: u32,
    pub opcode: Opcode,
    pub operands: Vec<Operand>,

    /// Every location read by the instruction, in operand order followed by implicit reads.
    pub reads: Vec<Location>,

    /// Every location written by the instruction, in operand order followed by implicit writes.
    pub writes: Vec<Location>,

    pub flags: InstFlags,

    /// The number of bytes accessed in memory for loads and stores.
    pub access_size: Option<u8>,
}

impl Instruction {
    /// Builds the record for `opcode`, extracting its operands from `word`.
    pub fn new(opcode: Opcode, word: u32, address: u64) -> Self {
        let f = Fields(word);
        let gpr = Register::gpr;
        let fpr = Register::fpr;

        let rs = gpr(f.rs());
        let rt = gpr(f.rt());
        let rd = gpr(f.rd());
        let fs = fpr(f.rd());
        let ft = fpr(f.rt());
        let fd = fpr(f.sa());

        let mut reads: Vec<Location> = vec![];
        let mut writes: Vec<Location> = vec![];
        let operands = match opcode.format() {
            Format::None => vec![],
            Format::Code => vec![Operand::Unsigned(f.code())],
            Format::RdRsRt => {
                reads.extend::<[Location; 2]>([rs.into(), rt.into()]);
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Reg(rs), Operand::Reg(rt)]
            }
            Format::RdRtRs => {
                reads.extend::<[Location; 2]>([rt.into(), rs.into()]);
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Reg(rt), Operand::Reg(rs)]
            }
            Format::RdRtSa => {
                reads.push(rt.into());
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Reg(rt), Operand::Unsigned(f.sa() as u64)]
            }
            Format::RdRs => {
                reads.push(rs.into());
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Reg(rs)]
            }
            Format::RdRt => {
                reads.push(rt.into());
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Reg(rt)]
            }
            Format::RsRt => {
                reads.extend::<[Location; 2]>([rs.into(), rt.into()]);
                vec![Operand::Reg(rs), Operand::Reg(rt)]
            }
            Format::Rd => {
                writes.push(rd.into());
                vec![Operand::Reg(rd)]
            }
            Format::Rs => {
                reads.push(rs.into());
                vec![Operand::Reg(rs)]
            }
            Format::RdFmt => {
                writes.push(rd.into());
                vec![Operand::Reg(rd), Operand::Unsigned(f.sa() as u64)]
            }
            Format::RsFmt => {
                reads.push(rs.into());
                vec![Operand::Reg(rs), Operand::Unsigned(f.sa() as u64)]
            }
            Format::RtRsImm => {
                reads.push(rs.into());
                writes.push(rt.into());
                vec![Operand::Reg(rt), Operand::Reg(rs), Operand::Signed(f.simm16())]
            }
            Format::RtRsUimm => {
                reads.push(rs.into());
                writes.push(rt.into());
                vec![Operand::Reg(rt), Operand::Reg(rs), Operand::Unsigned(f.uimm16())]
            }
            Format::RtUimm => {
                writes.push(rt.into());
                vec![Operand::Reg(rt), Operand::Unsigned(f.uimm16())]
            }
            Format::RtImm => {
                writes.push(rt.into());
                vec![Operand::Reg(rt), Operand::Signed(f.simm16())]
            }
            Format::RsImm => {
                reads.push(rs.into());
                vec![Operand::Reg(rs), Operand::Signed(f.simm16())]
            }
            Format::Mem => {
                reads.push(rs.into());
                if opcode.is_store() {
                    reads.push(rt.into());
                }
                else {
                    writes.push(rt.into());
                }
                vec![Operand::Reg(rt), Operand::Mem { base: rs, offset: f.simm16() }]
            }
            Format::FpuMem => {
                reads.push(rs.into());
                if opcode.is_store() {
                    reads.push(ft.into());
                }
                else {
                    writes.push(ft.into());
                }
                vec![Operand::Reg(ft), Operand::Mem { base: rs, offset: f.simm16() }]
            }
            Format::CacheOp => {
                reads.push(rs.into());
                vec![Operand::Unsigned(f.rt() as u64), Operand::Mem { base: rs, offset: f.simm16() }]
            }
            Format::Branch2 => {
                reads.extend::<[Location; 2]>([rs.into(), rt.into()]);
                let target = branch_target(address, f.simm16());
                vec![Operand::Reg(rs), Operand::Reg(rt), Operand::Target(target)]
            }
            Format::Branch1 => {
                reads.push(rs.into());
                vec![Operand::Reg(rs), Operand::Target(branch_target(address, f.simm16()))]
            }
            Format::Branch0 => vec![Operand::Target(branch_target(address, f.simm16()))],
            Format::Jump => vec![Operand::Target(jump_target(address, f.jump_index()))],
            Format::RtCop0 => {
                let reg = Register::cop0(f.rd());
                match opcode {
                    Opcode::Mtc0 => {
                        reads.push(rt.into());
                        writes.push(reg.into());
                    }
                    _ => {
                        reads.push(reg.into());
                        writes.push(rt.into());
                    }
                }
                vec![Operand::Reg(rt), Operand::Reg(reg)]
            }
            Format::RtFs | Format::RtFcr => {
                let reg = match opcode.format() {
                    Format::RtFcr => Register::fpu_control(f.rd()),
                    _ => fs,
                };
                match opcode {
                    Opcode::Mtc1 | Opcode::Ctc1 => {
                        reads.push(rt.into());
                        writes.push(reg.into());
                    }
                    _ => {
                        reads.push(reg.into());
                        writes.push(rt.into());
                    }
                }
                vec![Operand::Reg(rt), Operand::Reg(reg)]
            }
            Format::FdFsFt => {
                reads.extend::<[Location; 2]>([fs.into(), ft.into()]);
                writes.push(fd.into());
                vec![Operand::Reg(fd), Operand::Reg(fs), Operand::Reg(ft)]
            }
            Format::FdFs => {
                reads.push(fs.into());
                writes.push(fd.into());
                vec![Operand::Reg(fd), Operand::Reg(fs)]
            }
            Format::FdFt => {
                reads.push(ft.into());
                writes.push(fd.into());
                vec![Operand::Reg(fd), Operand::Reg(ft)]
            }
            Format::FsFt => {
                reads.extend::<[Location; 2]>([fs.into(), ft.into()]);
                vec![Operand::Reg(fs), Operand::Reg(ft)]
            }
        };

        add_implicit_locations(opcode, f, &mut reads, &mut writes);

        Self {
            address,
            word,
            opcode,
            operands,
            reads,
            writes,
            flags: opcode.flags(),
            access_size: opcode.access_size(),
        }
    }

    #[inline]
    pub fn fields(&self) -> Fields {
        Fields(self.word)
    }

    pub fn rs(&self) -> Register {
        Register::gpr(self.fields().rs())
    }

    pub fn rt(&self) -> Register {
        Register::gpr(self.fields().rt())
    }

    pub fn rd(&self) -> Register {
        Register::gpr(self.fields().rd())
    }

    pub fn sa(&self) -> u8 {
        self.fields().sa()
    }

    pub fn fs(&self) -> Register {
        Register::fpr(self.fields().rd())
    }

    pub fn ft(&self) -> Register {
        Register::fpr(self.fields().rt())
    }

    pub fn fd(&self) -> Register {
        Register::fpr(self.fields().sa())
    }

    pub fn simm16(&self) -> i64 {
        self.fields().simm16()
    }

    pub fn uimm16(&self) -> u64 {
        self.fields().uimm16()
    }

    /// The control flow target of a branch or direct jump.
    pub fn target(&self) -> Option<u64> {
        self.operands.iter().find_map(|op| match op {
            Operand::Target(target) => Some(*target),
            _ => None,
        })
    }

    /// The base register and offset of a memory operand.
    pub fn memory_operand(&self) -> Option<(Register, i64)> {
        self.operands.iter().find_map(|op| match op {
            Operand::Mem { base, offset } => Some((*base, *offset)),
            _ => None,
        })
    }

    /// The address of the instruction that executes after this one (and its delay slot).
    pub fn fallthrough(&self) -> u64 {
        match self.opcode.has_delay_slot() {
            true => self.address.wrapping_add(8),
            false => self.address.wrapping_add(4),
        }
    }

    pub fn is_branch(&self) -> bool {
        self.flags.contains(InstFlags::BRANCH)
    }

    pub fn is_likely_branch(&self) -> bool {
        self.flags.contains(InstFlags::LIKELY)
    }

    pub fn is_load(&self) -> bool {
        self.flags.contains(InstFlags::LOAD)
    }

    pub fn is_store(&self) -> bool {
        self.flags.contains(InstFlags::STORE)
    }

    pub fn is_call(&self) -> bool {
        self.flags.contains(InstFlags::LINK)
    }
}

fn add_implicit_locations(
    opcode: Opcode,
    f: Fields,
    reads: &mut Vec<Location>,
    writes: &mut Vec<Location>,
) {
    use Opcode::*;

    const HI_LO: [Location; 2] =
        [Location::Register(Register::HI), Location::Register(Register::LO)];
    const HI1_LO1: [Location; 2] =
        [Location::Register(Register::HI1), Location::Register(Register::LO1)];
    const ALL_HI_LO: [Location; 4] = [HI_LO[0], HI_LO[1], HI1_LO1[0], HI1_LO1[1]];

    match opcode {
        Jal | Bltzal | Bgezal | Bltzall | Bgezall => writes.push(Register::RA.into()),
        Movz | Movn => reads.push(Register::gpr(f.rd()).into()),

        Mult | Multu | Div | Divu => writes.extend(HI_LO),
        Mult1 | Multu1 | Div1 | Divu1 => writes.extend(HI1_LO1),
        Madd | Maddu => {
            reads.extend(HI_LO);
            writes.extend(HI_LO);
        }
        Madd1 | Maddu1 => {
            reads.extend(HI1_LO1);
            writes.extend(HI1_LO1);
        }
        Mfhi => reads.push(Register::HI.into()),
        Mflo => reads.push(Register::LO.into()),
        Mthi => writes.push(Register::HI.into()),
        Mtlo => writes.push(Register::LO.into()),
        Mfhi1 => reads.push(Register::HI1.into()),
        Mflo1 => reads.push(Register::LO1.into()),
        Mthi1 => writes.push(Register::HI1.into()),
        Mtlo1 => writes.push(Register::LO1.into()),
        Mfsa => reads.push(Register::SA.into()),
        Mtsa | Mtsab | Mtsah => writes.push(Register::SA.into()),
        Qfsrv => reads.push(Register::SA.into()),

        Pmfhi => reads.extend([Location::Register(Register::HI), Register::HI1.into()]),
        Pmflo => reads.extend([Location::Register(Register::LO), Register::LO1.into()]),
        Pmthi => writes.extend([Location::Register(Register::HI), Register::HI1.into()]),
        Pmtlo => writes.extend([Location::Register(Register::LO), Register::LO1.into()]),
        Pmfhl => reads.extend(ALL_HI_LO),
        Pmthl => writes.extend(ALL_HI_LO),
        Pmaddw | Pmsubw | Pmaddh | Pmsubh | Pmadduw => {
            reads.extend(ALL_HI_LO);
            writes.extend(ALL_HI_LO);
        }
        Pmultw | Pmultuw | Pmulth | Phmadh | Phmsbh | Pdivw | Pdivuw | Pdivbw => {
            writes.extend(ALL_HI_LO)
        }

        Eret => reads.push(Register::cop0(14).into()),
        Bc0f | Bc0t | Bc0fl | Bc0tl => reads.push(Register::COP0_COND.into()),

        Bc1f | Bc1t | Bc1fl | Bc1tl => reads.push(Register::FPU_COND.into()),
        CFS | CEqS | CLtS | CLeS => writes.push(Register::FPU_COND.into()),
        AddS | SubS | MulS | DivS | SqrtS | RsqrtS => writes.push(Register::FPU_FLAGS.into()),
        AddaS | SubaS | MulaS => {
            writes.extend([Location::Register(Register::FPU_ACC), Register::FPU_FLAGS.into()])
        }
        MaddS | MsubS => {
            reads.push(Register::FPU_ACC.into());
            writes.push(Register::FPU_FLAGS.into());
        }
        MaddaS | MsubaS => {
            reads.push(Register::FPU_ACC.into());
            writes.extend([Location::Register(Register::FPU_ACC), Register::FPU_FLAGS.into()]);
        }
        _ => {}
    }
}
