//! The single precision FPU (COP1).
//!
//! The exception flags are not modelled: arithmetic writes a placeholder to them.

use r5900_ir::{BinaryOp, CompareOp, DataType, Expr, ExprError, ExprRef, Imm, Primitive, UnaryOp};
use r5900_isa::{Opcode, Register};

use super::{int, prim, Eval};

fn f32() -> DataType {
    prim(Primitive::F32)
}

fn read_f32(e: &mut Eval, reg: Register) -> ExprRef {
    e.read_as(reg, &f32())
}

fn flags(e: &mut Eval) -> Result<(), ExprError> {
    tracing::trace!("{:#x}: fpu exception flags are not computed", e.inst.address);
    let value = e.placeholder("fpu exception flags", prim(Primitive::U32));
    e.ctx.set_register(Register::FPU_FLAGS, value)
}

fn arith(e: &mut Eval, op: BinaryOp, a: ExprRef, b: ExprRef) -> ExprRef {
    e.binary(op, a, b, f32())
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let (fd, fs, ft) = (inst.fd(), inst.fs(), inst.ft());

    match inst.opcode {
        Mfc1 => {
            let value = e.read_as(fs, &int(32, true));
            e.write(inst.rt(), value)
        }
        Mtc1 => {
            let value = e.read_as(inst.rt(), &int(32, true));
            let value = e.convert(value, &f32());
            e.write(fs, value)
        }
        Cfc1 => {
            let reg = Register::fpu_control(inst.fields().rd());
            let value = e.read_as(reg, &int(32, true));
            e.write(inst.rt(), value)
        }
        Ctc1 => {
            let reg = Register::fpu_control(inst.fields().rd());
            let value = e.read_as(inst.rt(), &prim(Primitive::U32));
            e.write(reg, value)
        }

        AddS | SubS | MulS | DivS => {
            let op = match inst.opcode {
                AddS => BinaryOp::Add,
                SubS => BinaryOp::Sub,
                MulS => BinaryOp::Mul,
                _ => BinaryOp::Div,
            };
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let value = arith(e, op, a, b);
            flags(e)?;
            e.write(fd, value)
        }
        SqrtS => {
            let value = read_f32(e, ft);
            let value = e.node(Expr::unary(UnaryOp::Sqrt, value, f32()));
            flags(e)?;
            e.write(fd, value)
        }
        RsqrtS => {
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let root = e.node(Expr::unary(UnaryOp::Sqrt, b, f32()));
            let value = arith(e, BinaryOp::Div, a, root);
            flags(e)?;
            e.write(fd, value)
        }
        AbsS | NegS => {
            let op = if inst.opcode == AbsS { UnaryOp::Abs } else { UnaryOp::Neg };
            let value = read_f32(e, fs);
            let value = e.node(Expr::unary(op, value, f32()));
            e.write(fd, value)
        }
        MovS => {
            let value = read_f32(e, fs);
            e.write(fd, value)
        }

        AddaS | SubaS | MulaS => {
            let op = match inst.opcode {
                AddaS => BinaryOp::Add,
                SubaS => BinaryOp::Sub,
                _ => BinaryOp::Mul,
            };
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let value = arith(e, op, a, b);
            flags(e)?;
            e.write(Register::FPU_ACC, value)
        }
        MaddS | MsubS | MaddaS | MsubaS => {
            let op = match inst.opcode {
                MaddS | MaddaS => BinaryOp::Add,
                _ => BinaryOp::Sub,
            };
            let acc = read_f32(e, Register::FPU_ACC);
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let product = arith(e, BinaryOp::Mul, a, b);
            let value = arith(e, op, acc, product);
            flags(e)?;
            let dest = match inst.opcode {
                MaddS | MsubS => fd,
                _ => Register::FPU_ACC,
            };
            e.write(dest, value)
        }

        MaxS | MinS => {
            let op = if inst.opcode == MaxS { CompareOp::Gt } else { CompareOp::Lt };
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let cond = e.node(Expr::compare(op, false, a.clone(), b.clone()));
            let value = e.node(Expr::ternary(cond, a, b, f32()));
            e.write(fd, value)
        }

        CvtWS => {
            // The integer result stays in the FPU register file.
            let value = read_f32(e, fs);
            let value = e.node(Expr::cast(value, int(32, true)));
            let value = e.node(Expr::bitcast(value, f32()));
            e.write(fd, value)
        }
        CvtSW => {
            let value = read_f32(e, fs);
            let value = e.node(Expr::bitcast(value, int(32, true)));
            let value = e.node(Expr::cast(value, f32()));
            e.write(fd, value)
        }

        CFS => {
            let value = e.imm(Imm::bool(false));
            e.write(Register::FPU_COND, value)
        }
        CEqS | CLtS | CLeS => {
            let op = match inst.opcode {
                CEqS => CompareOp::Eq,
                CLtS => CompareOp::Lt,
                _ => CompareOp::Le,
            };
            let a = read_f32(e, fs);
            let b = read_f32(e, ft);
            let value = e.node(Expr::compare(op, false, a, b));
            e.write(Register::FPU_COND, value)
        }

        _ => e.unimplemented(),
    }
}
