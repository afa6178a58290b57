//! Branches, jumps and calls.
//!
//! Branches only produce the expression describing the transfer; turning it into statements is up
//! to the replay driver, which also orders the delay slot. Calls are fully evaluated here since
//! they update the return address and the callee's result location.

use r5900_ir::{
    BranchTarget, CompareOp, Expr, ExprError, ExprKind, ExprRef, Imm, Primitive, UnaryOp,
};
use r5900_isa::{Opcode, Register};

use super::{int, prim, Eval};
use crate::{context::register_type, Statement};

fn conditional(e: &mut Eval, cond: ExprRef, target: u64) -> Result<Option<ExprRef>, ExprError> {
    let likely = e.inst.is_likely_branch();
    let branch = e.node(Expr::new(
        ExprKind::ConditionalBranch { cond, target, likely },
        prim(Primitive::U32),
    ));
    e.ctx.finish_expr(branch).map(Some)
}

/// `rs op rt`.
fn compare_registers(e: &mut Eval, op: CompareOp) -> ExprRef {
    let lhs = e.read(e.inst.rs());
    let rhs = e.read(e.inst.rt());

    // Pointers and flags tested against zero keep their type.
    let rhs_zero = rhs.as_imm().map_or(false, |imm| imm.is_zero());
    if rhs_zero && (lhs.ty.is_pointer() || lhs.ty.is_bool()) {
        let zero = e.imm(Imm::typed(0, lhs.ty.clone()));
        return e.node(Expr::compare(op, false, lhs, zero));
    }

    let ty = match lhs.ty.is_integer() && lhs.ty == rhs.ty {
        true => lhs.ty.clone(),
        false => int(64, true),
    };
    let lhs = e.convert(lhs, &ty);
    let rhs = e.convert(rhs, &ty);
    e.node(Expr::compare(op, false, lhs, rhs))
}

/// `rs op 0`.
fn compare_zero(e: &mut Eval, op: CompareOp) -> ExprRef {
    let ty = int(64, true);
    let lhs = e.read_as(e.inst.rs(), &ty);
    let zero = e.imm(Imm::i64(0));
    e.node(Expr::compare(op, false, lhs, zero))
}

fn coprocessor_condition(e: &mut Eval, reg: Register, when: bool) -> ExprRef {
    let cond = e.read_as(reg, &prim(Primitive::Bool));
    match when {
        true => cond,
        false => e.node(Expr::unary(UnaryOp::LogicalNot, cond, prim(Primitive::Bool))),
    }
}

/// Emits a call to `target`, binding the result to the callee's return location if it is known.
pub(super) fn call(e: &mut Eval, target: u64) -> Result<ExprRef, ExprError> {
    let return_address = e.inst.address.wrapping_add(8);
    let link = e.imm(Imm::i32(return_address as u32 as i32));
    e.ctx.set_register(Register::RA, link)?;

    let callee = e.ctx.resolve_function(target);
    let ty = callee
        .as_ref()
        .and_then(|f| f.return_type.clone())
        .or_else(|| {
            let location = callee.as_ref()?.return_location?;
            Some(match location.as_register() {
                Some(reg) => register_type(reg),
                None => int(32, true),
            })
        })
        .unwrap_or_else(|| int(32, true));
    let call = e.node(Expr::new(ExprKind::Call { target, args: vec![] }, ty));

    match callee.and_then(|f| f.return_location) {
        Some(location) => {
            tracing::trace!("{:#x}: call to {target:#x} returns in {location:?}", e.inst.address);
            e.ctx.set(location, call.clone())?;
        }
        None => e.ctx.emit(Statement::Expr { address: e.inst.address, expr: call.clone() }),
    }
    Ok(call)
}

/// A branch that calls `target` when `cond` holds.
fn conditional_call(e: &mut Eval, cond: ExprRef, target: u64) -> Result<Option<ExprRef>, ExprError> {
    let cond = e.ctx.finish_expr(cond)?;
    if let Some(taken) = cond.as_imm() {
        return match taken.is_zero() {
            true => Ok(None),
            false => call(e, target).map(Some),
        };
    }

    // The callee's result is not bound since it only exists on one path.
    let return_address = e.inst.address.wrapping_add(8);
    let link = e.imm(Imm::i32(return_address as u32 as i32));
    e.ctx.set_register(Register::RA, link)?;
    let call = e.node(Expr::new(ExprKind::Call { target, args: vec![] }, int(32, true)));
    e.ctx.emit(Statement::Branch {
        address: e.inst.address,
        cond: Some(cond),
        target: None,
        body: vec![Statement::Expr { address: e.inst.address, expr: call.clone() }],
    });
    Ok(Some(call))
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let target = inst.target().unwrap_or_else(|| inst.fallthrough());

    let cond = match inst.opcode {
        B | J => {
            let jump = Expr::new(
                ExprKind::UnconditionalBranch(BranchTarget::Direct(target)),
                prim(Primitive::U32),
            );
            return Ok(Some(e.node(jump)));
        }
        Jal => return call(e, target).map(Some),
        Jr | Eret => {
            let reg = match inst.opcode {
                Eret => Register::cop0(14),
                _ => inst.rs(),
            };
            let dest = e.read(reg);
            let jump = Expr::new(
                ExprKind::UnconditionalBranch(BranchTarget::Indirect(dest)),
                prim(Primitive::U32),
            );
            return Ok(Some(e.node(jump)));
        }
        Jalr => {
            let dest = e.read(inst.rs());
            let link = e.imm(Imm::i32(inst.address.wrapping_add(8) as u32 as i32));
            e.ctx.set_register(inst.rd(), link)?;
            let call =
                e.node(Expr::new(ExprKind::IndirectCall { target: dest, args: vec![] }, int(32, true)));
            return e.effect(call);
        }

        Beq | Beql => compare_registers(e, CompareOp::Eq),
        Bne | Bnel => compare_registers(e, CompareOp::Ne),
        Blez | Blezl => compare_zero(e, CompareOp::Le),
        Bgtz | Bgtzl => compare_zero(e, CompareOp::Gt),
        Bltz | Bltzl => compare_zero(e, CompareOp::Lt),
        Bgez | Bgezl => compare_zero(e, CompareOp::Ge),
        Bltzal | Bltzall => {
            let cond = compare_zero(e, CompareOp::Lt);
            return conditional_call(e, cond, target);
        }
        Bgezal | Bgezall => {
            let cond = compare_zero(e, CompareOp::Ge);
            return conditional_call(e, cond, target);
        }

        Bc0f | Bc0fl => coprocessor_condition(e, Register::COP0_COND, false),
        Bc0t | Bc0tl => coprocessor_condition(e, Register::COP0_COND, true),
        Bc1f | Bc1fl => coprocessor_condition(e, Register::FPU_COND, false),
        Bc1t | Bc1tl => coprocessor_condition(e, Register::FPU_COND, true),

        _ => return e.unimplemented(),
    };

    conditional(e, cond, target)
}
