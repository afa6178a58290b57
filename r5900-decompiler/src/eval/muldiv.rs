//! Multiply, divide and multiply-accumulate through the HI/LO register pairs.

use r5900_ir::{BinaryOp, Expr, ExprError, ExprRef};
use r5900_isa::{Opcode, Register};

use super::{int, Eval};

/// Writes the low and high halves of a 64-bit result to `lo` and `hi`, and `lo` to `rd`.
fn split(e: &mut Eval, value: ExprRef, lo: Register, hi: Register) -> Result<Option<ExprRef>, ExprError> {
    let low = e.node(Expr::get_bits(value.clone(), 0, 32, int(32, true)));
    let high = e.node(Expr::get_bits(value, 32, 32, int(32, true)));
    e.ctx.set_register(lo, low.clone())?;
    e.ctx.set_register(hi, high)?;
    match e.inst.rd() {
        rd if rd.is_zero() => Ok(Some(low)),
        rd => e.write(rd, low),
    }
}

fn product(e: &mut Eval, signed: bool) -> ExprRef {
    let (narrow, wide) = (int(32, signed), int(64, signed));
    let a = e.read_as(e.inst.rs(), &narrow);
    let a = e.convert(a, &wide);
    let b = e.read_as(e.inst.rt(), &narrow);
    let b = e.convert(b, &wide);
    e.binary(BinaryOp::Mul, a, b, wide)
}

/// The 64-bit value held in the `hi:lo` pair.
fn accumulator(e: &mut Eval, lo: Register, hi: Register, signed: bool) -> ExprRef {
    let narrow = int(32, true);
    let low = e.read_as(lo, &narrow);
    let high = e.read_as(hi, &narrow);
    e.node(Expr::concat_bits(vec![low, high], int(64, signed)))
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let pipe1 = matches!(
        inst.opcode,
        Mult1 | Multu1 | Div1 | Divu1 | Madd1 | Maddu1 | Mfhi1 | Mthi1 | Mflo1 | Mtlo1
    );
    let (lo, hi) = match pipe1 {
        true => (Register::LO1, Register::HI1),
        false => (Register::LO, Register::HI),
    };

    match inst.opcode {
        Mult | Mult1 | Multu | Multu1 => {
            let value = product(e, matches!(inst.opcode, Mult | Mult1));
            split(e, value, lo, hi)
        }
        Madd | Madd1 | Maddu | Maddu1 => {
            let signed = matches!(inst.opcode, Madd | Madd1);
            let acc = accumulator(e, lo, hi, signed);
            let value = product(e, signed);
            let ty = value.ty.clone();
            let sum = e.binary(BinaryOp::Add, acc, value, ty);
            split(e, sum, lo, hi)
        }
        Div | Div1 | Divu | Divu1 => {
            let ty = int(32, matches!(inst.opcode, Div | Div1));
            let a = e.read_as(inst.rs(), &ty);
            let b = e.read_as(inst.rt(), &ty);
            let quotient = e.binary(BinaryOp::Div, a.clone(), b.clone(), ty.clone());
            let remainder = e.binary(BinaryOp::Mod, a, b, ty.clone());
            let narrow = int(32, true);
            let quotient = e.convert(quotient, &narrow);
            let remainder = e.convert(remainder, &narrow);
            e.ctx.set_register(hi, remainder)?;
            e.write(lo, quotient)
        }
        Mfhi | Mfhi1 => {
            let value = e.read(hi);
            e.write(inst.rd(), value)
        }
        Mflo | Mflo1 => {
            let value = e.read(lo);
            e.write(inst.rd(), value)
        }
        Mthi | Mthi1 => {
            let value = e.read(inst.rs());
            e.write(hi, value)
        }
        Mtlo | Mtlo1 => {
            let value = e.read(inst.rs());
            e.write(lo, value)
        }
        _ => e.unimplemented(),
    }
}
