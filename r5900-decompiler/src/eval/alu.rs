//! Integer arithmetic, logic, shifts, comparisons and system instructions.

use r5900_ir::{BinaryOp, CompareOp, Expr, ExprError, ExprRef, Imm, Primitive, UnaryOp};
use r5900_isa::{Instruction, Opcode, Register};

use super::{int, prim, Eval};
use crate::{context::stack_offset, Statement};

/// `lhs op rhs` on 32 or 64-bit integers, keeping pointer and stack address types intact.
fn arith(e: &mut Eval, op: BinaryOp, lhs: ExprRef, rhs: ExprRef, bits: u32) -> ExprRef {
    let is_address = |x: &ExprRef| x.ty.is_pointer() || stack_offset(x).is_some();
    let (lhs, rhs) = match op == BinaryOp::Add && !is_address(&lhs) && is_address(&rhs) {
        true => (rhs, lhs),
        false => (lhs, rhs),
    };
    let ty = match is_address(&lhs) {
        true => lhs.ty.clone(),
        false => int(bits, true),
    };
    let lhs = match is_address(&lhs) {
        true => lhs,
        false => e.convert(lhs, &ty),
    };
    let rhs = match is_address(&rhs) {
        true => rhs,
        false => e.convert(rhs, &int(bits, true)),
    };
    e.binary(op, lhs, rhs, ty)
}

fn shift_imm(e: &mut Eval, op: BinaryOp, bits: u32, signed: bool, amount: u32) -> ExprRef {
    let ty = int(bits, signed);
    let value = e.read_as(e.inst.rt(), &ty);
    let amount = e.imm(Imm::typed(amount, ty.clone()));
    e.binary(op, value, amount, ty)
}

fn shift_var(e: &mut Eval, op: BinaryOp, bits: u32, signed: bool) -> ExprRef {
    let ty = int(bits, signed);
    let value = e.read_as(e.inst.rt(), &ty);
    let amount = e.read_as(e.inst.rs(), &ty);
    let mask = e.imm(Imm::typed(bits - 1, ty.clone()));
    let amount = e.binary(BinaryOp::And, amount, mask, ty.clone());
    e.binary(op, value, amount, ty)
}

/// The width that a bitwise operation on `a` and `b` needs.
fn logic_width(a: &ExprRef, b: &ExprRef) -> u32 {
    match a.ty.bits().max(b.ty.bits()) {
        0..=32 => 32,
        _ => 64,
    }
}

fn logic(e: &mut Eval, op: BinaryOp, a: ExprRef, b: ExprRef) -> ExprRef {
    let ty = int(logic_width(&a, &b), true);
    let a = e.convert(a, &ty);
    let b = e.convert(b, &ty);
    e.binary(op, a, b, ty)
}

fn compare(e: &mut Eval, op: CompareOp, unsigned: bool, a: ExprRef, b: ExprRef) -> ExprRef {
    let ty = prim(Primitive::I64);
    let a = e.convert(a, &ty);
    let b = e.convert(b, &ty);
    e.node(Expr::compare(op, unsigned, a, b))
}

/// A trap taken when `a op b` holds.
fn trap(e: &mut Eval, op: CompareOp, unsigned: bool, b: ExprRef) -> Result<Option<ExprRef>, ExprError> {
    let a = e.read(e.inst.rs());
    let cond = compare(e, op, unsigned, a, b);
    let cond = e.ctx.finish_expr(cond)?;
    let call = e.node(Expr::intrinsic("trap", vec![], prim(Primitive::U32)));
    e.ctx.emit(Statement::Branch {
        address: e.inst.address,
        cond: Some(cond.clone()),
        target: None,
        body: vec![Statement::Expr { address: e.inst.address, expr: call }],
    });
    Ok(Some(cond))
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let (rd, rs, rt) = (inst.rd(), inst.rs(), inst.rt());
    let simm = inst.simm16();
    let uimm = inst.uimm16();
    let sa = inst.sa() as u32;

    let value = match inst.opcode {
        Move => e.read(rs),
        Li => e.imm(Imm::i32(simm as i32)),
        Lui => e.imm(Imm::i32(((uimm as u32) << 16) as i32)),

        Addi | Addiu => {
            let lhs = e.read_int(rs, 32);
            let rhs = e.imm(Imm::i32(simm as i32));
            let value = arith(e, BinaryOp::Add, lhs, rhs, 32);
            return e.write(rt, value);
        }
        Daddi | Daddiu => {
            let lhs = e.read_int(rs, 64);
            let rhs = e.imm(Imm::i64(simm));
            let value = arith(e, BinaryOp::Add, lhs, rhs, 64);
            return e.write(rt, value);
        }
        Slti | Sltiu => {
            let lhs = e.read(rs);
            let rhs = e.imm(Imm::i64(simm));
            let value = compare(e, CompareOp::Lt, inst.opcode == Sltiu, lhs, rhs);
            return e.write(rt, value);
        }
        Andi | Ori | Xori => {
            let op = match inst.opcode {
                Andi => BinaryOp::And,
                Ori => BinaryOp::Or,
                _ => BinaryOp::Xor,
            };
            let lhs = e.read(rs);
            let rhs = e.imm(Imm::i32(uimm as i32));
            let value = logic(e, op, lhs, rhs);
            return e.write(rt, value);
        }

        Add | Addu | Sub | Subu | Dadd | Daddu | Dsub | Dsubu => {
            let (op, bits) = match inst.opcode {
                Add | Addu => (BinaryOp::Add, 32),
                Sub | Subu => (BinaryOp::Sub, 32),
                Dadd | Daddu => (BinaryOp::Add, 64),
                _ => (BinaryOp::Sub, 64),
            };
            let lhs = e.read_int(rs, bits);
            let rhs = e.read_int(rt, bits);
            arith(e, op, lhs, rhs, bits)
        }
        And | Or | Xor | Nor => {
            let a = e.read(rs);
            let b = e.read(rt);
            let op = match inst.opcode {
                And => BinaryOp::And,
                Xor => BinaryOp::Xor,
                _ => BinaryOp::Or,
            };
            let value = logic(e, op, a, b);
            match inst.opcode {
                Nor => {
                    let ty = value.ty.clone();
                    e.node(Expr::unary(UnaryOp::Not, value, ty))
                }
                _ => value,
            }
        }
        Slt | Sltu => {
            let a = e.read(rs);
            let b = e.read(rt);
            compare(e, CompareOp::Lt, inst.opcode == Sltu, a, b)
        }
        Movz | Movn => {
            let op = if inst.opcode == Movz { CompareOp::Eq } else { CompareOp::Ne };
            let test = e.read(rt);
            let zero = e.imm(Imm::i64(0));
            let cond = compare(e, op, false, test, zero);
            let then = e.read(rs);
            let ty = then.ty.clone();
            let otherwise = e.read_as(rd, &ty);
            e.node(Expr::ternary(cond, then, otherwise, ty))
        }

        Sll => shift_imm(e, BinaryOp::Shl { sign_preserving: false }, 32, true, sa),
        Srl => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 32, false, sa),
        Sra => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 32, true, sa),
        Dsll => shift_imm(e, BinaryOp::Shl { sign_preserving: false }, 64, true, sa),
        Dsrl => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 64, false, sa),
        Dsra => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 64, true, sa),
        Dsll32 => shift_imm(e, BinaryOp::Shl { sign_preserving: false }, 64, true, sa + 32),
        Dsrl32 => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 64, false, sa + 32),
        Dsra32 => shift_imm(e, BinaryOp::Shr { sign_preserving: false }, 64, true, sa + 32),
        Sllv => shift_var(e, BinaryOp::Shl { sign_preserving: false }, 32, true),
        Srlv => shift_var(e, BinaryOp::Shr { sign_preserving: false }, 32, false),
        Srav => shift_var(e, BinaryOp::Shr { sign_preserving: false }, 32, true),
        Dsllv => shift_var(e, BinaryOp::Shl { sign_preserving: false }, 64, true),
        Dsrlv => shift_var(e, BinaryOp::Shr { sign_preserving: false }, 64, false),
        Dsrav => shift_var(e, BinaryOp::Shr { sign_preserving: false }, 64, true),

        Mfsa => e.read(Register::SA),
        Mtsa => {
            let value = e.read_as(rs, &prim(Primitive::U32));
            return e.write(Register::SA, value);
        }
        Mtsab | Mtsah => {
            // The funnel shift amount is kept in bytes.
            let u32 = prim(Primitive::U32);
            let (mask, scale) = if inst.opcode == Mtsab { (0xf, 1) } else { (0x7, 2) };
            let value = e.read_as(rs, &u32);
            let lane_mask = e.imm(Imm::u32(mask));
            let value = e.binary(BinaryOp::And, value, lane_mask, u32.clone());
            let imm = e.imm(Imm::u32(uimm as u32 & mask));
            let value = e.binary(BinaryOp::Xor, value, imm, u32.clone());
            let scale = e.imm(Imm::u32(scale));
            let value = e.binary(BinaryOp::Mul, value, scale, u32);
            return e.write(Register::SA, value);
        }

        Syscall | Break => {
            let code = e.imm(Imm::u32(inst.fields().code() as u32));
            let name = if inst.opcode == Syscall { "syscall" } else { "breakpoint" };
            return e.intrinsic(name, vec![code]);
        }
        Tge | Tgeu | Tlt | Tltu | Teq | Tne => {
            let b = e.read(rt);
            return trap_op(e, b);
        }
        Tgei | Tgeiu | Tlti | Tltiu | Teqi | Tnei => {
            let b = e.imm(Imm::i64(simm));
            return trap_op(e, b);
        }

        _ => return e.unimplemented(),
    };

    e.write(rd_or_rt(inst), value)
}

fn trap_op(e: &mut Eval, b: ExprRef) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;
    let (op, unsigned) = match e.inst.opcode {
        Tge | Tgei => (CompareOp::Ge, false),
        Tgeu | Tgeiu => (CompareOp::Ge, true),
        Tlt | Tlti => (CompareOp::Lt, false),
        Tltu | Tltiu => (CompareOp::Lt, true),
        Teq | Teqi => (CompareOp::Eq, false),
        _ => (CompareOp::Ne, false),
    };
    trap(e, op, unsigned, b)
}

/// The destination of instructions that fall through to the common write above.
fn rd_or_rt(inst: &Instruction) -> Register {
    match inst.opcode {
        Opcode::Li | Opcode::Lui => inst.rt(),
        _ => inst.rd(),
    }
}
