//! Loads and stores.

use r5900_ir::{BinaryOp, DataType, Expr, ExprError, ExprRef, Imm, Primitive};
use r5900_isa::{InstFlags, Opcode, Register};

use super::{int, prim, Eval};

/// The address computed by the memory operand, typed like its base register.
fn address(e: &mut Eval) -> ExprRef {
    let (base, offset) = e.inst.memory_operand().unwrap_or((e.inst.rs(), e.inst.simm16()));
    let base = e.read(base);
    if offset == 0 {
        return base;
    }
    let ty = base.ty.clone();
    let offset = e.imm(Imm::i32(offset as i32));
    e.binary(BinaryOp::Add, base, offset, ty)
}

/// The type of the value loaded by `op`.
fn load_type(op: Opcode, size: u8) -> DataType {
    match op {
        Opcode::Lwc1 => prim(Primitive::F32),
        Opcode::Lq => prim(Primitive::U128),
        _ => int(size as u32 * 8, op.flags().contains(InstFlags::SIGNED) || op == Opcode::Ld),
    }
}

/// The register a load writes or a store reads.
fn data_register(e: &Eval) -> Register {
    match e.inst.opcode {
        Opcode::Lwc1 | Opcode::Swc1 => e.inst.ft(),
        _ => e.inst.rt(),
    }
}

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let size = inst.access_size.unwrap_or(4);
    let reg = data_register(e);

    match inst.opcode {
        Cache => {
            let op = e.imm(Imm::u32(inst.fields().rt() as u32));
            let addr = address(e);
            e.intrinsic("cache", vec![op, addr])
        }

        // Unaligned accesses merge with the previous register value.
        Lwl | Lwr | Ldl | Ldr => {
            let name = match inst.opcode {
                Lwl => "load_word_left",
                Lwr => "load_word_right",
                Ldl => "load_double_left",
                _ => "load_double_right",
            };
            let ty = int(size as u32 * 8, true);
            let addr = address(e);
            let old = e.read_as(reg, &ty);
            let value = e.node(Expr::intrinsic(name, vec![addr, old], ty).with_propagate(false));
            e.write(reg, value)
        }
        Swl | Swr | Sdl | Sdr => {
            let name = match inst.opcode {
                Swl => "store_word_left",
                Swr => "store_word_right",
                Sdl => "store_double_left",
                _ => "store_double_right",
            };
            let addr = address(e);
            let value = e.read_as(reg, &int(size as u32 * 8, true));
            e.intrinsic(name, vec![addr, value])
        }

        _ if inst.is_load() => {
            let ty = load_type(inst.opcode, size);
            let signed = ty.is_signed();
            let addr = address(e);
            let value = e.ctx.load(addr, size, signed, ty)?;
            e.write(reg, value)
        }
        _ if inst.is_store() => {
            let addr = address(e);
            let value = match inst.opcode {
                Sq => e.read_as(reg, &prim(Primitive::U128)),
                Swc1 => e.read_as(reg, &prim(Primitive::F32)),
                Sd => e.read_as(reg, &int(64, true)),
                _ => {
                    let value = e.read(reg);
                    match value.ty.size() < size as u64 {
                        true => e.convert(value, &int(size as u32 * 8, true)),
                        false => value,
                    }
                }
            };
            e.ctx.store(addr, value, size).map(Some)
        }

        _ => e.unimplemented(),
    }
}
