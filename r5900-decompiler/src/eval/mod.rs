//! Evaluation of decoded instructions against a [DecompilerContext].
//!
//! Each instruction reads the values bound to its source locations, builds the expression for its
//! semantics and binds the result to its destination locations. Instructions that only have side
//! effects (stores, calls, system instructions) emit a statement instead.

mod alu;
mod branch;
mod cop0;
mod fpu;
mod memory;
mod mmi;
mod muldiv;

use r5900_ir::{BinaryOp, DataType, Expr, ExprError, ExprRef, Imm, Primitive};
use r5900_isa::{InstFlags, Instruction, Opcode, Register};

use crate::{
    context::{stack_offset, DecompilerContext},
    stmt::Statement,
};

pub trait ToExpression {
    /// Replays the instruction against `ctx`, returning the expression that represents it.
    fn to_expression(&self, ctx: &mut DecompilerContext) -> Result<Option<ExprRef>, ExprError>;
}

impl ToExpression for Instruction {
    fn to_expression(&self, ctx: &mut DecompilerContext) -> Result<Option<ExprRef>, ExprError> {
        ctx.set_address(self.address);
        tracing::trace!("{:#x}: {self}", self.address);

        use Opcode::*;
        let mut e = Eval { ctx, inst: self };
        match self.opcode {
            Nop | Sync | Pref => Ok(None),
            Mult | Multu | Div | Divu | Mult1 | Multu1 | Div1 | Divu1 | Madd | Maddu | Madd1
            | Maddu1 | Mfhi | Mthi | Mflo | Mtlo | Mfhi1 | Mthi1 | Mflo1 | Mtlo1 => {
                muldiv::eval(&mut e)
            }
            Mfc0 | Mtc0 | Tlbr | Tlbwi | Tlbwr | Tlbp | Ei | Di => cop0::eval(&mut e),
            Cache => memory::eval(&mut e),
            _ if self.is_load() || self.is_store() => memory::eval(&mut e),
            _ if self.is_branch() || self.opcode == Eret => branch::eval(&mut e),
            _ if self.flags.contains(InstFlags::MMI) => mmi::eval(&mut e),
            _ if self.flags.contains(InstFlags::FPU) => fpu::eval(&mut e),
            _ => alu::eval(&mut e),
        }
    }
}

pub(crate) fn prim(p: Primitive) -> DataType {
    DataType::primitive(p)
}

/// The signed or unsigned integer type with `bits` bits.
pub(crate) fn int(bits: u32, signed: bool) -> DataType {
    DataType::int(bits, signed).unwrap_or_else(|| prim(Primitive::I64))
}

/// State for evaluating a single instruction.
pub(crate) struct Eval<'c, 'a> {
    pub ctx: &'c mut DecompilerContext<'a>,
    pub inst: &'c Instruction,
}

impl<'c, 'a> Eval<'c, 'a> {
    /// Attributes `expr` to the current instruction.
    pub fn node(&self, expr: Expr) -> ExprRef {
        expr.at(self.inst.address).into_ref()
    }

    pub fn imm(&self, imm: Imm) -> ExprRef {
        self.node(Expr::imm(imm))
    }

    pub fn binary(&self, op: BinaryOp, lhs: ExprRef, rhs: ExprRef, ty: DataType) -> ExprRef {
        self.node(Expr::binary(op, lhs, rhs, ty))
    }

    pub fn read(&mut self, reg: Register) -> ExprRef {
        self.ctx.get_register(reg, None)
    }

    /// Reads `reg` as a value of type `ty`.
    pub fn read_as(&mut self, reg: Register, ty: &DataType) -> ExprRef {
        let value = self.read(reg);
        self.convert(value, ty)
    }

    /// Reads `reg` as an integer operand of address arithmetic. Pointers and stack addresses are
    /// kept as they are.
    pub fn read_int(&mut self, reg: Register, bits: u32) -> ExprRef {
        let value = self.read(reg);
        if value.ty.is_pointer() || stack_offset(&value).is_some() {
            return value;
        }
        self.convert(value, &int(bits, true))
    }

    /// Converts `value` to `ty`. Conversions between integers and floats reinterpret the bits.
    pub fn convert(&self, value: ExprRef, ty: &DataType) -> ExprRef {
        if value.ty == *ty {
            return value;
        }
        if value.ty.is_float() == ty.is_float() {
            return self.node(Expr::cast(value, ty.clone()));
        }

        if ty.is_float() {
            let bits = int(ty.bits(), true);
            let value = match value.ty == bits {
                true => value,
                false => self.node(Expr::cast(value, bits)),
            };
            return self.node(Expr::bitcast(value, ty.clone()));
        }

        let bits = int(value.ty.bits(), true);
        let value = self.node(Expr::bitcast(value, bits.clone()));
        match bits == *ty {
            true => value,
            false => self.node(Expr::cast(value, ty.clone())),
        }
    }

    /// Binds `value` to `reg`, returning it as the representative expression.
    pub fn write(&mut self, reg: Register, value: ExprRef) -> Result<Option<ExprRef>, ExprError> {
        self.ctx.set_register(reg, value.clone())?;
        Ok(Some(value))
    }

    /// Emits an expression that is only evaluated for its side effects.
    pub fn effect(&mut self, expr: ExprRef) -> Result<Option<ExprRef>, ExprError> {
        let expr = self.ctx.finish_expr(expr)?;
        self.ctx.emit(Statement::Expr { address: self.inst.address, expr: expr.clone() });
        Ok(Some(expr))
    }

    /// Emits a call to a named operation with no source equivalent.
    pub fn intrinsic(&mut self, name: &'static str, args: Vec<ExprRef>) -> Result<Option<ExprRef>, ExprError> {
        let expr = self.node(Expr::intrinsic(name, args, prim(Primitive::U32)));
        self.effect(expr)
    }

    /// A value the decompiler does not compute.
    pub fn placeholder(&self, note: &str, ty: DataType) -> ExprRef {
        self.node(Expr::placeholder(note, ty))
    }

    /// Binds placeholders to every location the instruction writes.
    pub fn unimplemented(&mut self) -> Result<Option<ExprRef>, ExprError> {
        tracing::warn!("{:#x}: no semantics for `{}`", self.inst.address, self.inst.opcode);
        let note = self.inst.opcode.mnemonic();
        let mut result = None;
        for location in self.inst.writes.clone() {
            let ty = match location.as_register() {
                Some(reg) if self.inst.flags.contains(InstFlags::MMI) && reg.size() == 16 => {
                    prim(Primitive::U128)
                }
                Some(reg) => crate::context::register_type(reg),
                None => prim(Primitive::I32),
            };
            let value = self.placeholder(note, ty);
            self.ctx.set(location, value.clone())?;
            result.get_or_insert(value);
        }
        if result.is_none() {
            self.ctx.comment(format!("unimplemented: {}", self.inst));
        }
        Ok(result)
    }
}
