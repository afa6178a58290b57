//! Register files and the symbolic storage locations built on top of them.

use std::fmt;

/// Selects one 32-bit lane of a vector unit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lane {
    X,
    Y,
    Z,
    W,
}

impl Lane {
    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::W => "w",
        }
    }
}

/// A register in one of the CPU's register files.
///
/// The general purpose file also holds the multiply/divide result registers and the funnel shift
/// amount register, the FPU file holds the accumulator and the control/condition registers. Ids
/// past 31 in those files are not directly encodable in an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Cpu(u8),
    Cop0(u8),
    Cop1(u8),
    Cop2Vector(u8, Lane),
    Cop2Integer(u8),
    Cop2Special(u8),
}

const GPR_NAMES: [&str; 37] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp",
    "ra", "hi", "lo", "hi1", "lo1", "sa",
];

const COP0_NAMES: [&str; 33] = [
    "Index", "Random", "EntryLo0", "EntryLo1", "Context", "PageMask", "Wired", "cop0_7",
    "BadVAddr", "Count", "EntryHi", "Compare", "Status", "Cause", "EPC", "PRId", "Config",
    "cop0_17", "cop0_18", "cop0_19", "cop0_20", "cop0_21", "cop0_22", "BadPAddr", "Debug", "Perf",
    "cop0_26", "cop0_27", "TagLo", "TagHi", "ErrorEPC", "cop0_31", "cop0_cond",
];

const COP1_SPECIAL_NAMES: [&str; 5] = ["acc", "fcr0", "fcr31", "fcc", "fflags"];

impl Register {
    pub const ZERO: Self = Self::Cpu(0);
    pub const AT: Self = Self::Cpu(1);
    pub const V0: Self = Self::Cpu(2);
    pub const V1: Self = Self::Cpu(3);
    pub const A0: Self = Self::Cpu(4);
    pub const A1: Self = Self::Cpu(5);
    pub const A2: Self = Self::Cpu(6);
    pub const A3: Self = Self::Cpu(7);
    pub const T0: Self = Self::Cpu(8);
    pub const T1: Self = Self::Cpu(9);
    pub const T2: Self = Self::Cpu(10);
    pub const S0: Self = Self::Cpu(16);
    pub const GP: Self = Self::Cpu(28);
    pub const SP: Self = Self::Cpu(29);
    pub const FP: Self = Self::Cpu(30);
    pub const RA: Self = Self::Cpu(31);
    pub const HI: Self = Self::Cpu(32);
    pub const LO: Self = Self::Cpu(33);
    pub const HI1: Self = Self::Cpu(34);
    pub const LO1: Self = Self::Cpu(35);
    pub const SA: Self = Self::Cpu(36);

    /// The COP0 condition line sampled by `bc0f`/`bc0t`.
    pub const COP0_COND: Self = Self::Cop0(32);

    /// The FPU accumulator used by the `*a.s` family.
    pub const FPU_ACC: Self = Self::Cop1(32);
    pub const FCR0: Self = Self::Cop1(33);
    pub const FCR31: Self = Self::Cop1(34);
    /// The compare condition bit of FCR31, split out so that flag updates do not clobber it.
    pub const FPU_COND: Self = Self::Cop1(35);
    /// The sticky exception flags of FCR31.
    pub const FPU_FLAGS: Self = Self::Cop1(36);

    #[inline]
    pub const fn gpr(id: u8) -> Self {
        Self::Cpu(id & 0x1f)
    }

    /// Looks up a general purpose register by its ABI name, with or without a leading `$`.
    pub fn gpr_by_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('$').unwrap_or(name);
        GPR_NAMES.iter().position(|n| *n == name).map(|id| Self::Cpu(id as u8))
    }

    #[inline]
    pub const fn fpr(id: u8) -> Self {
        Self::Cop1(id & 0x1f)
    }

    #[inline]
    pub const fn cop0(id: u8) -> Self {
        Self::Cop0(id & 0x1f)
    }

    /// Maps a `cfc1`/`ctc1` control register number to its register.
    pub const fn fpu_control(id: u8) -> Self {
        match id {
            0 => Self::FCR0,
            _ => Self::FCR31,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The id of the register within its file.
    pub fn id(&self) -> u8 {
        match *self {
            Self::Cpu(id)
            | Self::Cop0(id)
            | Self::Cop1(id)
            | Self::Cop2Vector(id, _)
            | Self::Cop2Integer(id)
            | Self::Cop2Special(id) => id,
        }
    }

    /// The natural width of the register in bytes.
    pub fn size(&self) -> u8 {
        match *self {
            Self::Cpu(id) if id < 32 => 16,
            Self::Cpu(id) if id == Self::SA.id() => 4,
            Self::Cpu(_) => 8,
            Self::Cop0(_) => 4,
            Self::Cop1(id) if id == Self::FPU_COND.id() => 1,
            Self::Cop1(_) => 4,
            Self::Cop2Vector(..) => 4,
            Self::Cop2Integer(_) => 2,
            Self::Cop2Special(_) => 4,
        }
    }

    pub fn name(&self) -> std::borrow::Cow<'static, str> {
        use std::borrow::Cow;
        match *self {
            Self::Cpu(id) => match GPR_NAMES.get(id as usize) {
                Some(name) => Cow::Borrowed(name),
                None => Cow::Owned(format!("r{id}")),
            },
            Self::Cop0(id) => match COP0_NAMES.get(id as usize) {
                Some(name) => Cow::Borrowed(name),
                None => Cow::Owned(format!("cop0_{id}")),
            },
            Self::Cop1(id) if id < 32 => Cow::Owned(format!("f{id}")),
            Self::Cop1(id) => match COP1_SPECIAL_NAMES.get(id as usize - 32) {
                Some(name) => Cow::Borrowed(name),
                None => Cow::Owned(format!("fpu_{id}")),
            },
            Self::Cop2Vector(id, lane) => Cow::Owned(format!("vf{id}{}", lane.name())),
            Self::Cop2Integer(id) => Cow::Owned(format!("vi{id}")),
            Self::Cop2Special(id) => Cow::Owned(format!("vu_{id}")),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cop0(_) => f.write_str(&self.name()),
            _ => write!(f, "${}", self.name()),
        }
    }
}

/// A key into the symbolic store: either a register or a byte offset from the stack pointer value
/// at function entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Register(Register),
    Stack(i64),
}

impl Location {
    pub fn as_register(&self) -> Option<Register> {
        match self {
            Self::Register(reg) => Some(*reg),
            Self::Stack(_) => None,
        }
    }

    pub fn as_stack(&self) -> Option<i64> {
        match self {
            Self::Stack(offset) => Some(*offset),
            Self::Register(_) => None,
        }
    }
}

impl From<Register> for Location {
    #[inline(always)]
    fn from(reg: Register) -> Self {
        Self::Register(reg)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg) => reg.fmt(f),
            Self::Stack(offset) if *offset < 0 => write!(f, "stack[-{:#x}]", offset.unsigned_abs()),
            Self::Stack(offset) => write!(f, "stack[{offset:#x}]"),
        }
    }
}
