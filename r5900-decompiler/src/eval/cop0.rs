use r5900_ir::{ExprError, ExprRef, Primitive};
use r5900_isa::{Opcode, Register};

use super::{int, prim, Eval};

pub(super) fn eval(e: &mut Eval) -> Result<Option<ExprRef>, ExprError> {
    use Opcode::*;

    let inst = e.inst;
    let cop0 = Register::cop0(inst.fields().rd());
    match inst.opcode {
        Mfc0 => {
            let value = e.read_as(cop0, &int(32, true));
            e.write(inst.rt(), value)
        }
        Mtc0 => {
            let value = e.read_as(inst.rt(), &prim(Primitive::U32));
            e.write(cop0, value)
        }
        Tlbr => e.intrinsic("tlb_read", vec![]),
        Tlbwi => e.intrinsic("tlb_write_indexed", vec![]),
        Tlbwr => e.intrinsic("tlb_write_random", vec![]),
        Tlbp => e.intrinsic("tlb_probe", vec![]),
        Ei => e.intrinsic("enable_interrupts", vec![]),
        Di => e.intrinsic("disable_interrupts", vec![]),
        _ => e.unimplemented(),
    }
}
