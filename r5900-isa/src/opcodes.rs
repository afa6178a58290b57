//! The set of instruction kinds understood by the decoder.

use crate::InstFlags;

/// Describes how the operands of an instruction are laid out in the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// No operands.
    None,
    /// A 20-bit code field (`syscall`, `break`).
    Code,
    /// `rd, rs, rt`
    RdRsRt,
    /// `rd, rt, rs` (variable shifts).
    RdRtRs,
    /// `rd, rt, sa`
    RdRtSa,
    /// `rd, rs`
    RdRs,
    /// `rd, rt`
    RdRt,
    /// `rs, rt`
    RsRt,
    /// `rd`
    Rd,
    /// `rs`
    Rs,
    /// `rd, fmt` where `fmt` lives in the `sa` field (`pmfhl.*`).
    RdFmt,
    /// `rs, fmt` where `fmt` lives in the `sa` field (`pmthl.*`).
    RsFmt,
    /// `rt, rs, simm16`
    RtRsImm,
    /// `rt, rs, uimm16`
    RtRsUimm,
    /// `rt, uimm16`
    RtUimm,
    /// `rt, simm16` (pseudo `li`).
    RtImm,
    /// `rs, simm16`
    RsImm,
    /// `rt, simm16(base)`
    Mem,
    /// `ft, simm16(base)`
    FpuMem,
    /// `op, simm16(base)`
    CacheOp,
    /// `rs, rt, target`
    Branch2,
    /// `rs, target`
    Branch1,
    /// `target`
    Branch0,
    /// `target` (26-bit region relative jump)
    Jump,
    /// `rt, cop0_rd`
    RtCop0,
    /// `rt, fs`
    RtFs,
    /// `rt, fcr`
    RtFcr,
    /// `fd, fs, ft`
    FdFsFt,
    /// `fd, fs`
    FdFs,
    /// `fd, ft`
    FdFt,
    /// `fs, ft`
    FsFt,
}

macro_rules! size {
    () => {
        None
    };
    ($size:literal) => {
        Some($size)
    };
}

macro_rules! opcodes {
    ($($name:ident => $mnemonic:literal, $format:ident $(| $flag:ident)* $(, $size:literal)?;)*) => {
        /// An instruction kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            /// Every instruction kind, in table order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            pub fn format(self) -> Format {
                match self {
                    $(Self::$name => Format::$format,)*
                }
            }

            pub fn flags(self) -> InstFlags {
                match self {
                    $(Self::$name => InstFlags::empty()$(.union(InstFlags::$flag))*,)*
                }
            }

            /// The number of bytes accessed in memory by load and store instructions.
            pub fn access_size(self) -> Option<u8> {
                match self {
                    $(Self::$name => size!($($size)?),)*
                }
            }
        }
    };
}

opcodes! {
    // Pseudo-instructions produced by the decoder or the canonicalization pass.
    Nop => "nop", None;
    B => "b", Branch0 | BRANCH;
    Move => "move", RdRs;
    Li => "li", RtImm;

    // Primary opcode table.
    J => "j", Jump | BRANCH | JUMP;
    Jal => "jal", Jump | BRANCH | JUMP | LINK;
    Beq => "beq", Branch2 | BRANCH;
    Bne => "bne", Branch2 | BRANCH;
    Blez => "blez", Branch1 | BRANCH;
    Bgtz => "bgtz", Branch1 | BRANCH;
    Addi => "addi", RtRsImm;
    Addiu => "addiu", RtRsImm;
    Slti => "slti", RtRsImm;
    Sltiu => "sltiu", RtRsImm;
    Andi => "andi", RtRsUimm;
    Ori => "ori", RtRsUimm;
    Xori => "xori", RtRsUimm;
    Lui => "lui", RtUimm;
    Beql => "beql", Branch2 | BRANCH | LIKELY;
    Bnel => "bnel", Branch2 | BRANCH | LIKELY;
    Blezl => "blezl", Branch1 | BRANCH | LIKELY;
    Bgtzl => "bgtzl", Branch1 | BRANCH | LIKELY;
    Daddi => "daddi", RtRsImm;
    Daddiu => "daddiu", RtRsImm;
    Ldl => "ldl", Mem | LOAD, 8;
    Ldr => "ldr", Mem | LOAD, 8;
    Lq => "lq", Mem | LOAD, 16;
    Sq => "sq", Mem | STORE, 16;
    Lb => "lb", Mem | LOAD | SIGNED, 1;
    Lh => "lh", Mem | LOAD | SIGNED, 2;
    Lwl => "lwl", Mem | LOAD | SIGNED, 4;
    Lw => "lw", Mem | LOAD | SIGNED, 4;
    Lbu => "lbu", Mem | LOAD, 1;
    Lhu => "lhu", Mem | LOAD, 2;
    Lwr => "lwr", Mem | LOAD | SIGNED, 4;
    Lwu => "lwu", Mem | LOAD, 4;
    Sb => "sb", Mem | STORE, 1;
    Sh => "sh", Mem | STORE, 2;
    Swl => "swl", Mem | STORE, 4;
    Sw => "sw", Mem | STORE, 4;
    Sdl => "sdl", Mem | STORE, 8;
    Sdr => "sdr", Mem | STORE, 8;
    Swr => "swr", Mem | STORE, 4;
    Cache => "cache", CacheOp;
    Lwc1 => "lwc1", FpuMem | LOAD | FPU, 4;
    Pref => "pref", CacheOp;
    Ld => "ld", Mem | LOAD, 8;
    Swc1 => "swc1", FpuMem | STORE | FPU, 4;
    Sd => "sd", Mem | STORE, 8;

    // REGIMM
    Bltz => "bltz", Branch1 | BRANCH;
    Bgez => "bgez", Branch1 | BRANCH;
    Bltzl => "bltzl", Branch1 | BRANCH | LIKELY;
    Bgezl => "bgezl", Branch1 | BRANCH | LIKELY;
    Tgei => "tgei", RsImm | TRAP;
    Tgeiu => "tgeiu", RsImm | TRAP;
    Tlti => "tlti", RsImm | TRAP;
    Tltiu => "tltiu", RsImm | TRAP;
    Teqi => "teqi", RsImm | TRAP;
    Tnei => "tnei", RsImm | TRAP;
    Bltzal => "bltzal", Branch1 | BRANCH | LINK;
    Bgezal => "bgezal", Branch1 | BRANCH | LINK;
    Bltzall => "bltzall", Branch1 | BRANCH | LINK | LIKELY;
    Bgezall => "bgezall", Branch1 | BRANCH | LINK | LIKELY;
    Mtsab => "mtsab", RsImm;
    Mtsah => "mtsah", RsImm;

    // SPECIAL
    Sll => "sll", RdRtSa;
    Srl => "srl", RdRtSa;
    Sra => "sra", RdRtSa;
    Sllv => "sllv", RdRtRs;
    Srlv => "srlv", RdRtRs;
    Srav => "srav", RdRtRs;
    Jr => "jr", Rs | BRANCH | JUMP;
    Jalr => "jalr", RdRs | BRANCH | JUMP | LINK;
    Movz => "movz", RdRsRt;
    Movn => "movn", RdRsRt;
    Syscall => "syscall", Code;
    Break => "break", Code;
    Sync => "sync", None;
    Mfhi => "mfhi", Rd;
    Mthi => "mthi", Rs;
    Mflo => "mflo", Rd;
    Mtlo => "mtlo", Rs;
    Dsllv => "dsllv", RdRtRs;
    Dsrlv => "dsrlv", RdRtRs;
    Dsrav => "dsrav", RdRtRs;
    Mult => "mult", RdRsRt;
    Multu => "multu", RdRsRt;
    Div => "div", RsRt;
    Divu => "divu", RsRt;
    Add => "add", RdRsRt;
    Addu => "addu", RdRsRt;
    Sub => "sub", RdRsRt;
    Subu => "subu", RdRsRt;
    And => "and", RdRsRt;
    Or => "or", RdRsRt;
    Xor => "xor", RdRsRt;
    Nor => "nor", RdRsRt;
    Mfsa => "mfsa", Rd;
    Mtsa => "mtsa", Rs;
    Slt => "slt", RdRsRt;
    Sltu => "sltu", RdRsRt;
    Dadd => "dadd", RdRsRt;
    Daddu => "daddu", RdRsRt;
    Dsub => "dsub", RdRsRt;
    Dsubu => "dsubu", RdRsRt;
    Tge => "tge", RsRt | TRAP;
    Tgeu => "tgeu", RsRt | TRAP;
    Tlt => "tlt", RsRt | TRAP;
    Tltu => "tltu", RsRt | TRAP;
    Teq => "teq", RsRt | TRAP;
    Tne => "tne", RsRt | TRAP;
    Dsll => "dsll", RdRtSa;
    Dsrl => "dsrl", RdRtSa;
    Dsra => "dsra", RdRtSa;
    Dsll32 => "dsll32", RdRtSa;
    Dsrl32 => "dsrl32", RdRtSa;
    Dsra32 => "dsra32", RdRtSa;

    // MMI
    Madd => "madd", RdRsRt;
    Maddu => "maddu", RdRsRt;
    Plzcw => "plzcw", RdRs | MMI;
    Mfhi1 => "mfhi1", Rd;
    Mthi1 => "mthi1", Rs;
    Mflo1 => "mflo1", Rd;
    Mtlo1 => "mtlo1", Rs;
    Mult1 => "mult1", RdRsRt;
    Multu1 => "multu1", RdRsRt;
    Div1 => "div1", RsRt;
    Divu1 => "divu1", RsRt;
    Madd1 => "madd1", RdRsRt;
    Maddu1 => "maddu1", RdRsRt;
    Pmfhl => "pmfhl", RdFmt | MMI;
    Pmthl => "pmthl", RsFmt | MMI;
    Psllh => "psllh", RdRtSa | MMI;
    Psrlh => "psrlh", RdRtSa | MMI;
    Psrah => "psrah", RdRtSa | MMI;
    Psllw => "psllw", RdRtSa | MMI;
    Psrlw => "psrlw", RdRtSa | MMI;
    Psraw => "psraw", RdRtSa | MMI;

    // MMI0
    Paddw => "paddw", RdRsRt | MMI;
    Psubw => "psubw", RdRsRt | MMI;
    Pcgtw => "pcgtw", RdRsRt | MMI;
    Pmaxw => "pmaxw", RdRsRt | MMI;
    Paddh => "paddh", RdRsRt | MMI;
    Psubh => "psubh", RdRsRt | MMI;
    Pcgth => "pcgth", RdRsRt | MMI;
    Pmaxh => "pmaxh", RdRsRt | MMI;
    Paddb => "paddb", RdRsRt | MMI;
    Psubb => "psubb", RdRsRt | MMI;
    Pcgtb => "pcgtb", RdRsRt | MMI;
    Paddsw => "paddsw", RdRsRt | MMI;
    Psubsw => "psubsw", RdRsRt | MMI;
    Pextlw => "pextlw", RdRsRt | MMI;
    Ppacw => "ppacw", RdRsRt | MMI;
    Paddsh => "paddsh", RdRsRt | MMI;
    Psubsh => "psubsh", RdRsRt | MMI;
    Pextlh => "pextlh", RdRsRt | MMI;
    Ppach => "ppach", RdRsRt | MMI;
    Paddsb => "paddsb", RdRsRt | MMI;
    Psubsb => "psubsb", RdRsRt | MMI;
    Pextlb => "pextlb", RdRsRt | MMI;
    Ppacb => "ppacb", RdRsRt | MMI;
    Pext5 => "pext5", RdRt | MMI;
    Ppac5 => "ppac5", RdRt | MMI;

    // MMI1
    Pabsw => "pabsw", RdRt | MMI;
    Pceqw => "pceqw", RdRsRt | MMI;
    Pminw => "pminw", RdRsRt | MMI;
    Padsbh => "padsbh", RdRsRt | MMI;
    Pabsh => "pabsh", RdRt | MMI;
    Pceqh => "pceqh", RdRsRt | MMI;
    Pminh => "pminh", RdRsRt | MMI;
    Pceqb => "pceqb", RdRsRt | MMI;
    Padduw => "padduw", RdRsRt | MMI;
    Psubuw => "psubuw", RdRsRt | MMI;
    Pextuw => "pextuw", RdRsRt | MMI;
    Padduh => "padduh", RdRsRt | MMI;
    Psubuh => "psubuh", RdRsRt | MMI;
    Pextuh => "pextuh", RdRsRt | MMI;
    Paddub => "paddub", RdRsRt | MMI;
    Psubub => "psubub", RdRsRt | MMI;
    Pextub => "pextub", RdRsRt | MMI;
    Qfsrv => "qfsrv", RdRsRt | MMI;

    // MMI2
    Pmaddw => "pmaddw", RdRsRt | MMI;
    Psllvw => "psllvw", RdRtRs | MMI;
    Psrlvw => "psrlvw", RdRtRs | MMI;
    Pmsubw => "pmsubw", RdRsRt | MMI;
    Pmfhi => "pmfhi", Rd | MMI;
    Pmflo => "pmflo", Rd | MMI;
    Pinth => "pinth", RdRsRt | MMI;
    Pmultw => "pmultw", RdRsRt | MMI;
    Pdivw => "pdivw", RsRt | MMI;
    Pcpyld => "pcpyld", RdRsRt | MMI;
    Pmaddh => "pmaddh", RdRsRt | MMI;
    Phmadh => "phmadh", RdRsRt | MMI;
    Pand => "pand", RdRsRt | MMI;
    Pxor => "pxor", RdRsRt | MMI;
    Pmsubh => "pmsubh", RdRsRt | MMI;
    Phmsbh => "phmsbh", RdRsRt | MMI;
    Pexeh => "pexeh", RdRt | MMI;
    Prevh => "prevh", RdRt | MMI;
    Pmulth => "pmulth", RdRsRt | MMI;
    Pdivbw => "pdivbw", RsRt | MMI;
    Pexew => "pexew", RdRt | MMI;
    Prot3w => "prot3w", RdRt | MMI;

    // MMI3
    Pmadduw => "pmadduw", RdRsRt | MMI;
    Psravw => "psravw", RdRtRs | MMI;
    Pmthi => "pmthi", Rs | MMI;
    Pmtlo => "pmtlo", Rs | MMI;
    Pinteh => "pinteh", RdRsRt | MMI;
    Pmultuw => "pmultuw", RdRsRt | MMI;
    Pdivuw => "pdivuw", RsRt | MMI;
    Pcpyud => "pcpyud", RdRsRt | MMI;
    Por => "por", RdRsRt | MMI;
    Pnor => "pnor", RdRsRt | MMI;
    Pexch => "pexch", RdRt | MMI;
    Pcpyh => "pcpyh", RdRt | MMI;
    Pexcw => "pexcw", RdRt | MMI;

    // COP0
    Mfc0 => "mfc0", RtCop0;
    Mtc0 => "mtc0", RtCop0;
    Bc0f => "bc0f", Branch0 | BRANCH;
    Bc0t => "bc0t", Branch0 | BRANCH;
    Bc0fl => "bc0fl", Branch0 | BRANCH | LIKELY;
    Bc0tl => "bc0tl", Branch0 | BRANCH | LIKELY;
    Tlbr => "tlbr", None;
    Tlbwi => "tlbwi", None;
    Tlbwr => "tlbwr", None;
    Tlbp => "tlbp", None;
    Eret => "eret", None | JUMP;
    Ei => "ei", None;
    Di => "di", None;

    // COP1
    Mfc1 => "mfc1", RtFs | FPU;
    Cfc1 => "cfc1", RtFcr | FPU;
    Mtc1 => "mtc1", RtFs | FPU;
    Ctc1 => "ctc1", RtFcr | FPU;
    Bc1f => "bc1f", Branch0 | BRANCH | FPU;
    Bc1t => "bc1t", Branch0 | BRANCH | FPU;
    Bc1fl => "bc1fl", Branch0 | BRANCH | LIKELY | FPU;
    Bc1tl => "bc1tl", Branch0 | BRANCH | LIKELY | FPU;
    AddS => "add.s", FdFsFt | FPU;
    SubS => "sub.s", FdFsFt | FPU;
    MulS => "mul.s", FdFsFt | FPU;
    DivS => "div.s", FdFsFt | FPU;
    SqrtS => "sqrt.s", FdFt | FPU;
    AbsS => "abs.s", FdFs | FPU;
    MovS => "mov.s", FdFs | FPU;
    NegS => "neg.s", FdFs | FPU;
    RsqrtS => "rsqrt.s", FdFsFt | FPU;
    AddaS => "adda.s", FsFt | FPU;
    SubaS => "suba.s", FsFt | FPU;
    MulaS => "mula.s", FsFt | FPU;
    MaddS => "madd.s", FdFsFt | FPU;
    MsubS => "msub.s", FdFsFt | FPU;
    MaddaS => "madda.s", FsFt | FPU;
    MsubaS => "msuba.s", FsFt | FPU;
    CvtWS => "cvt.w.s", FdFs | FPU;
    MaxS => "max.s", FdFsFt | FPU;
    MinS => "min.s", FdFsFt | FPU;
    CFS => "c.f.s", FsFt | FPU;
    CEqS => "c.eq.s", FsFt | FPU;
    CLtS => "c.lt.s", FsFt | FPU;
    CLeS => "c.le.s", FsFt | FPU;
    CvtSW => "cvt.s.w", FdFs | FPU;
}

impl Opcode {
    pub fn is_branch(self) -> bool {
        self.flags().contains(InstFlags::BRANCH)
    }

    pub fn is_likely_branch(self) -> bool {
        self.flags().contains(InstFlags::LIKELY)
    }

    pub fn is_load(self) -> bool {
        self.flags().contains(InstFlags::LOAD)
    }

    pub fn is_store(self) -> bool {
        self.flags().contains(InstFlags::STORE)
    }

    /// Whether the instruction is followed by an architectural delay slot.
    pub fn has_delay_slot(self) -> bool {
        self.is_branch()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
