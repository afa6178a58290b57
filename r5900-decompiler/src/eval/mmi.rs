//! The 128-bit multimedia instructions.
//!
//! Values are split into lanes with `GetBits` and reassembled with `ConcatBits`, so that `reduce`
//! can fold lanes of constants and see through lane shuffles. The multiply-accumulate, divide,
//! funnel shift and 5-bit pack instructions are not modelled and bind placeholders.

use r5900_ir::{BinaryOp, CompareOp, DataType, Expr, ExprError, ExprRef, Imm, Primitive, UnaryOp};
use r5900_isa::{Opcode, Register};

use super::{int, prim, Eval};

fn u128() -> DataType {
    prim(Primitive::U128)
}

fn read128(e: &mut Eval, reg: Register) -> ExprRef {
    e.read_as(reg, &u128())
}

fn lane(e: &Eval, value: &ExprRef, index: u32, width: u32, signed: bool) -> ExprRef {
    e.node(Expr::get_bits(value.clone(), index * width, width, int(width, signed)))
}

fn lanes(e: &Eval, value: &ExprRef, width: u32, signed: bool) -> Vec<ExprRef> {
    (0..128 / width).map(|i| lane(e, value, i, width, signed)).collect()
}

fn pack(e: &Eval, parts: Vec<ExprRef>) -> ExprRef {
    e.node(Expr::concat_bits(parts, u128()))
}

/// Applies `f` to each pair of lanes of `a` and `b`.
fn lanewise(
    e: &Eval,
    a: &ExprRef,
    b: &ExprRef,
    width: u32,
    signed: bool,
    f: impl Fn(&Eval, u32, ExprRef, ExprRef) -> ExprRef,
) -> ExprRef {
    let parts = lanes(e, a, width, signed)
        .into_iter()
        .zip(lanes(e, b, width, signed))
        .enumerate()
        .map(|(i, (x, y))| f(e, i as u32, x, y))
        .collect();
    pack(e, parts)
}

/// `a op b` computed in double the lane width and saturated back to the lane.
fn saturating(e: &Eval, op: BinaryOp, a: ExprRef, b: ExprRef, width: u32, signed: bool) -> ExprRef {
    let wide = int(width * 2, true);
    let a = e.convert(a, &wide);
    let b = e.convert(b, &wide);
    let value = e.binary(op, a, b, wide.clone());

    let (lo, hi): (i64, i64) = match signed {
        true => (-(1 << (width - 1)), (1 << (width - 1)) - 1),
        false => (0, (1 << width) - 1),
    };
    let lo = e.imm(Imm::typed(lo, wide.clone()));
    let hi = e.imm(Imm::typed(hi, wide.clone()));
    let value = e.node(Expr::clamp(value, lo, hi, wide));
    e.convert(value, &int(width, signed))
}

/// `|x|` saturated to the largest signed lane value, so that the minimum value does not wrap.
fn saturating_abs(e: &Eval, x: ExprRef, width: u32) -> ExprRef {
    let wide = int(width * 2, true);
    let x = e.convert(x, &wide);
    let value = e.node(Expr::unary(UnaryOp::Abs, x, wide.clone()));
    let lo = e.imm(Imm::typed(0, wide.clone()));
    let hi = e.imm(Imm::typed((1_i64 << (width - 1)) - 1, wide.clone()));
    let value = e.node(Expr::clamp(value, lo, hi, wide));
    e.convert(value, &int(width, true))
}

/// An all-ones lane where `a op b` holds, zero elsewhere.
fn mask(e: &Eval, op: CompareOp, a: ExprRef, b: ExprRef) -> ExprRef {
    let ty = a.ty.clone();
    let cond = e.node(Expr::compare(op, false, a, b));
    let ones = e.imm(Imm::typed(-1, ty.clone()));
    let zero = e.imm(Imm::typed(0, ty.clone()));
    e.node(Expr::ternary(cond, ones, zero, ty))
}

fn select(e: &Eval, op: CompareOp, a: ExprRef, b: ExprRef) -> ExprRef {
    let ty = a.ty.clone();
    let cond = e.node(Expr::compare(op, false, a.clone(), b.clone()));
    e.node(Expr::ternary(cond, a, b, ty))
}

/// Interleaves the lower (or upper) lanes of `b` and `a`, starting with `b`.
fn interleave(e: &Eval, a: &ExprRef, b: &ExprRef, width: u32, upper: bool) -> ExprRef {
    let half = 64 / width;
    let base = if upper { half } else { 0 };
    let parts = (0..half)
        .flat_map(|i| [lane(e, b, base + i, width, false), lane(e, a, base + i, width, false)])
        .collect();
    pack(e, parts)
}

/// The even lanes of `b` followed by the even lanes of `a`.
fn pack_even(e: &Eval, a: &ExprRef, b: &ExprRef, width: u32) -> ExprRef {
    let count = 128 / width;
    let even = |value: &ExprRef| -> Vec<ExprRef> {
        (0..count).step_by(2).map(|i| lane(e, value, i, width, false)).collect()
    };
    let mut parts = even(b);
    parts.extend(even(a));
    pack(e, parts)
}

/// Reorders the lanes of `value`: lane `i` of the result is lane `order[i]` of the input.
fn permute(e: &Eval, value: &ExprRef, width: u32, order: &[u32]) -> ExprRef {
    let parts = order.iter().map(|i| lane(e, value, *i, width, false)).collect();
    pack(e, parts)
}

fn shift_lanes(e: &Eval, value: &ExprRef, op: BinaryOp, width: u32, signed: bool, amount: u32) -> ExprRef {
    let parts = lanes(e, value, width, signed)
        .into_iter()
        .map(|x| {
            let ty = x.ty.clone();
            let amount = e.imm(Imm::typed(amount & (width - 1), ty.clone()));
            e.binary(op, x, amount, ty)
        })
        .collect();
    pack(e, parts)
}

/// Shifts the low word of each doubleword by the low bits of the matching doubleword of
/// `amounts`, sign-extending the result to 64 bits.
fn shift_doublewords(e: &Eval, value: &ExprRef, amounts: &ExprRef, op: BinaryOp, signed: bool) -> ExprRef {
    let parts = [0, 2]
        .iter()
        .map(|i| {
            let x = lane(e, value, *i, 32, signed);
            let ty = x.ty.clone();
            let amount = lane(e, amounts, *i, 32, signed);
            let bits = e.imm(Imm::typed(31, ty.clone()));
            let amount = e.binary(BinaryOp::And, amount, bits, ty.clone());
            let shifted = e.binary(op, x, amount, ty);
            let shifted = e.convert(shifted, &int(32, true));
            e.convert(shifted, &int(64, true))
        })
        .collect();
    pack(e, parts)
}

/// The low word of each 64-bit register of a HI/LO pair.
fn words(e: &mut Eval, regs: &[Register], index: u32) -> Vec<ExprRef> {
    regs.iter()
        .map(|reg| {
            let value = e.read_as(*reg, &int(64, true));
            lane(e, &value, index, 32, false)
        })
        .collect()
}

fn move_from_hi_lo(e: &mut Eval, format: u64) -> Result<Option<ExprRef>, ExprError> {
    let order = [Register::LO, Register::HI, Register::LO1, Register::HI1];
    let value = match format {
        // lw, uw
        0 | 1 => {
            let parts = words(e, &order, format as u32);
            pack(e, parts)
        }
        // slw
        2 => {
            let lo = words(e, &[Register::LO, Register::LO1], 0);
            let hi = words(e, &[Register::HI, Register::HI1], 0);
            let min = e.imm(Imm::i64(i32::MIN as i64));
            let max = e.imm(Imm::i64(i32::MAX as i64));
            let parts = (0..2)
                .map(|i| {
                    let joined = e.node(Expr::concat_bits(vec![lo[i].clone(), hi[i].clone()], int(64, true)));
                    e.node(Expr::clamp(joined, min.clone(), max.clone(), int(64, true)))
                })
                .collect();
            pack(e, parts)
        }
        // lh
        3 => {
            let mut parts = vec![];
            for reg in order {
                let value = e.read_as(reg, &int(64, true));
                parts.push(lane(e, &value, 0, 16, false));
                parts.push(lane(e, &value, 2, 16, false));
            }
            pack(e, parts)
        }
        // sh
        4 => {
            let mut parts = vec![];
            for reg in order {
                let value = e.read_as(reg, &int(64, true));
                for i in 0..2 {
                    let word = lane(e, &value, i, 32, true);
                    let min = e.imm(Imm::i32(i16::MIN as i32));
                    let max = e.imm(Imm::i32(i16::MAX as i32));
                    let clamped = e.node(Expr::clamp(word, min, max, int(32, true)));
                    parts.push(e.convert(clamped, &int(16, true)));
                }
            }
            pack(e, parts)
        }
        _ => return e.unimplemented(),
    };
    e.write(e.inst.rd(), value)
}

fn move_to_hi_lo(e: &mut Eval, format: u64) -> Result<Option<ExprRef>, ExprError> {
    if format != 0 {
        return e.unimplemented();
    }

    let rs = e.inst.rs();
    let value = read128(e, rs);
    let order = [Register::LO, Register::HI, Register::LO1, Register::HI1];
    for (i, reg) in order.into_iter().enumerate() {
        let old = e.read_as(reg, &int(64, true));
        let low = lane(e, &value, i as u32, 32, false);
        let high = lane(e, &old, 1, 32, false);
        let joined = e.node(Expr::concat_bits(vec![low, high], int(64, true)));
        e.ctx.set_register(reg, joined)?;
    }
    Ok(Some(value))
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let rd = inst.rd();
    let sa = inst.sa() as u32;
    let add = BinaryOp::Add;
    let sub = BinaryOp::Sub;

    let value = match inst.opcode {
        Paddw | Paddh | Paddb | Psubw | Psubh | Psubb => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let op = if matches!(inst.opcode, Paddw | Paddh | Paddb) { add } else { sub };
            let width = match inst.opcode {
                Paddw | Psubw => 32,
                Paddh | Psubh => 16,
                _ => 8,
            };
            lanewise(e, &a, &b, width, true, |e, _, x, y| {
                let ty = x.ty.clone();
                e.binary(op, x, y, ty)
            })
        }
        Paddsw | Paddsh | Paddsb | Psubsw | Psubsh | Psubsb | Padduw | Padduh | Paddub
        | Psubuw | Psubuh | Psubub => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let op = match inst.opcode {
                Paddsw | Paddsh | Paddsb | Padduw | Padduh | Paddub => add,
                _ => sub,
            };
            let signed = matches!(inst.opcode, Paddsw | Paddsh | Paddsb | Psubsw | Psubsh | Psubsb);
            let width = match inst.opcode {
                Paddsw | Psubsw | Padduw | Psubuw => 32,
                Paddsh | Psubsh | Padduh | Psubuh => 16,
                _ => 8,
            };
            lanewise(e, &a, &b, width, signed, |e, _, x, y| saturating(e, op, x, y, width, signed))
        }
        Padsbh => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            lanewise(e, &a, &b, 16, true, |e, i, x, y| {
                let ty = x.ty.clone();
                e.binary(if i < 4 { sub } else { add }, x, y, ty)
            })
        }
        Pcgtw | Pcgth | Pcgtb | Pceqw | Pceqh | Pceqb => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let op = match inst.opcode {
                Pcgtw | Pcgth | Pcgtb => CompareOp::Gt,
                _ => CompareOp::Eq,
            };
            let width = match inst.opcode {
                Pcgtw | Pceqw => 32,
                Pcgth | Pceqh => 16,
                _ => 8,
            };
            lanewise(e, &a, &b, width, true, |e, _, x, y| mask(e, op, x, y))
        }
        Pmaxw | Pmaxh | Pminw | Pminh => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let op = match inst.opcode {
                Pmaxw | Pmaxh => CompareOp::Gt,
                _ => CompareOp::Lt,
            };
            let width = if matches!(inst.opcode, Pmaxw | Pminw) { 32 } else { 16 };
            lanewise(e, &a, &b, width, true, |e, _, x, y| select(e, op, x, y))
        }
        Pabsw | Pabsh => {
            let b = read128(e, inst.rt());
            let width = if inst.opcode == Pabsw { 32 } else { 16 };
            let parts = lanes(e, &b, width, true).into_iter().map(|x| saturating_abs(e, x, width)).collect();
            pack(e, parts)
        }

        Pand | Por | Pxor | Pnor => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let op = match inst.opcode {
                Pand => BinaryOp::And,
                Pxor => BinaryOp::Xor,
                _ => BinaryOp::Or,
            };
            let value = e.binary(op, a, b, u128());
            match inst.opcode {
                Pnor => e.node(Expr::unary(UnaryOp::Not, value, u128())),
                _ => value,
            }
        }

        Pextlw | Pextuw | Pextlh | Pextuh | Pextlb | Pextub => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let width = match inst.opcode {
                Pextlw | Pextuw => 32,
                Pextlh | Pextuh => 16,
                _ => 8,
            };
            interleave(e, &a, &b, width, matches!(inst.opcode, Pextuw | Pextuh | Pextub))
        }
        Ppacw | Ppach | Ppacb => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let width = match inst.opcode {
                Ppacw => 32,
                Ppach => 16,
                _ => 8,
            };
            pack_even(e, &a, &b, width)
        }
        Pcpyld | Pcpyud => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let parts = match inst.opcode {
                Pcpyld => vec![lane(e, &b, 0, 64, false), lane(e, &a, 0, 64, false)],
                _ => vec![lane(e, &a, 1, 64, false), lane(e, &b, 1, 64, false)],
            };
            pack(e, parts)
        }
        Pinth | Pinteh => {
            let (a, b) = (read128(e, inst.rs()), read128(e, inst.rt()));
            let parts = (0..4)
                .flat_map(|i| match inst.opcode {
                    Pinth => [lane(e, &b, i, 16, false), lane(e, &a, i + 4, 16, false)],
                    _ => [lane(e, &b, i * 2, 16, false), lane(e, &a, i * 2, 16, false)],
                })
                .collect();
            pack(e, parts)
        }
        Pcpyh | Pexeh | Prevh | Pexch | Pexew | Pexcw | Prot3w => {
            let b = read128(e, inst.rt());
            match inst.opcode {
                Pcpyh => permute(e, &b, 16, &[0, 0, 0, 0, 4, 4, 4, 4]),
                Pexeh => permute(e, &b, 16, &[2, 1, 0, 3, 6, 5, 4, 7]),
                Prevh => permute(e, &b, 16, &[3, 2, 1, 0, 7, 6, 5, 4]),
                Pexch => permute(e, &b, 16, &[0, 2, 1, 3, 4, 6, 5, 7]),
                Pexew => permute(e, &b, 32, &[2, 1, 0, 3]),
                Pexcw => permute(e, &b, 32, &[0, 2, 1, 3]),
                _ => permute(e, &b, 32, &[1, 2, 0, 3]),
            }
        }

        Psllh | Psrlh | Psrah | Psllw | Psrlw | Psraw => {
            let b = read128(e, inst.rt());
            let (op, signed) = match inst.opcode {
                Psllh | Psllw => (BinaryOp::Shl { sign_preserving: false }, true),
                Psrlh | Psrlw => (BinaryOp::Shr { sign_preserving: false }, false),
                _ => (BinaryOp::Shr { sign_preserving: false }, true),
            };
            let width = if matches!(inst.opcode, Psllh | Psrlh | Psrah) { 16 } else { 32 };
            shift_lanes(e, &b, op, width, signed, sa)
        }
        Psllvw | Psrlvw | Psravw => {
            let value = read128(e, inst.rt());
            let amounts = read128(e, inst.rs());
            let (op, signed) = match inst.opcode {
                Psllvw => (BinaryOp::Shl { sign_preserving: false }, true),
                Psrlvw => (BinaryOp::Shr { sign_preserving: false }, false),
                _ => (BinaryOp::Shr { sign_preserving: false }, true),
            };
            shift_doublewords(e, &value, &amounts, op, signed)
        }
        Plzcw => {
            let a = read128(e, inst.rs());
            let parts = (0..2)
                .map(|i| {
                    let word = lane(e, &a, i, 32, true);
                    // The number of bits after the sign bit that are equal to it.
                    e.node(Expr::intrinsic("redundant_sign_bits", vec![word], int(32, false)))
                })
                .collect();
            e.node(Expr::concat_bits(parts, int(64, false)))
        }

        Pmfhi | Pmflo => {
            let (low, high) = match inst.opcode {
                Pmfhi => (Register::HI, Register::HI1),
                _ => (Register::LO, Register::LO1),
            };
            let low = e.read_as(low, &int(64, true));
            let high = e.read_as(high, &int(64, true));
            pack(e, vec![low, high])
        }
        Pmthi | Pmtlo => {
            let (low, high) = match inst.opcode {
                Pmthi => (Register::HI, Register::HI1),
                _ => (Register::LO, Register::LO1),
            };
            let a = read128(e, inst.rs());
            let first = lane(e, &a, 0, 64, true);
            let second = lane(e, &a, 1, 64, true);
            e.ctx.set_register(low, first)?;
            e.ctx.set_register(high, second)?;
            return Ok(Some(a));
        }
        Pmfhl => return move_from_hi_lo(e, inst.sa() as u64),
        Pmthl => return move_to_hi_lo(e, inst.sa() as u64),

        _ => return e.unimplemented(),
    };

    e.write(rd, value)
}
