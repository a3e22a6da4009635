use crate::types::{DataType, Operand, RegisterBank, RegisterFlags, SWIZZLE_XYZW};

use super::helpers::{decode_dual_swizzle, internal_operand, Fields, RegDecode};
use super::{err, DecodeError, Instruction, InstructionDetail, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unified,
    Internal0,
    Internal1,
    Internal2,
}

use Slot::{Internal0 as I0, Internal1 as I1, Internal2 as I2, Unified as U};

#[derive(Debug, Clone, Copy)]
struct DualOpInfo {
    src_count: u32,
    vector_load: bool,
    vector_store: bool,
}

const OP1_CODES: [Option<Opcode>; 16] = [
    Some(Opcode::Vmad),
    Some(Opcode::Vdp),
    Some(Opcode::Vssq),
    Some(Opcode::Vmul),
    Some(Opcode::Vadd),
    Some(Opcode::Vmov),
    Some(Opcode::Frsq),
    Some(Opcode::Frcp),
    Some(Opcode::Fmad),
    Some(Opcode::Fadd),
    Some(Opcode::Fmul),
    Some(Opcode::Fsubflr),
    Some(Opcode::Fexp),
    Some(Opcode::Flog),
    None,
    None,
];

fn op2_code(index: usize) -> Option<Opcode> {
    // Index 0 would name a second VMAD, which the encoding reserves.
    if index == 0 {
        None
    } else {
        OP1_CODES[index]
    }
}

fn op_info(op: Opcode) -> Option<DualOpInfo> {
    let (src_count, vector_load, vector_store) = match op {
        Opcode::Vmad => (3, true, true),
        Opcode::Vdp => (2, true, false),
        Opcode::Vssq => (1, true, false),
        Opcode::Vmul | Opcode::Vadd => (2, true, true),
        Opcode::Vmov => (1, true, true),
        Opcode::Frsq | Opcode::Frcp | Opcode::Fexp | Opcode::Flog => (1, false, false),
        Opcode::Fmad => (3, false, false),
        Opcode::Fadd | Opcode::Fmul | Opcode::Fsubflr => (2, false, false),
        _ => return None,
    };
    Some(DualOpInfo {
        src_count,
        vector_load,
        vector_store,
    })
}

fn op1_layout(count: u32, config: u32) -> Option<&'static [Slot]> {
    Some(match (count, config) {
        (1, 0) => &[U],
        (1, 1) => &[I0],
        (1, 2) => &[I1],
        (1, 3) => &[I2],
        (2, 0) => &[U, I1],
        (2, 1) => &[I0, U],
        (2, 2) => &[I0, I1],
        (3, 0) => &[U, I1, I2],
        (3, 1) => &[I0, U, I2],
        (3, 2) => &[I0, I1, U],
        (3, 3) => &[I0, I1, I2],
        _ => return None,
    })
}

/// The second op's sources depend on how many slots the first one took.
fn op2_layout(op1_count: u32, op2_count: u32, config: u32) -> Option<&'static [Slot]> {
    Some(match (op1_count, op2_count, config) {
        (1, 1, 0) => &[I0],
        (1, 1, _) => &[U],
        (1, 2, 0) => &[I0, I1],
        (1, 2, 1) => &[U, I1],
        (1, 2, 2) => &[I0, U],
        (1, 2, _) => &[I1, U],
        (1, 3, 0) => &[I0, I1, I2],
        (1, 3, 1) => &[U, I1, I2],
        (1, 3, 2) => &[I0, U, I2],
        (1, 3, _) => &[I0, U, I1],
        (2, 1, 0) => &[I0],
        (2, 1, 1) => &[I1],
        (2, 1, 2) => &[U],
        (2, 2, 0) => &[I0, I2],
        (2, 2, 1) => &[I1, I2],
        (2, 2, 2) => &[I2, U],
        (3, 1, 0) => &[I0],
        (3, 1, 1) => &[I1],
        (3, 1, 2) => &[I2],
        (3, 1, 3) => &[U],
        _ => return None,
    })
}

/// Decodes a dual-issue word into its first op, carrying the second op in the detail.
pub(super) fn vdual(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let vec4 = f.flag('c');
    let ext_or_w = f.flag('d');
    let f16 = f.flag('t');
    let ty = if f16 { DataType::F16 } else { DataType::F32 };
    let prim_ustore = f.flag('r');

    let op1_index = ((!vec4 && ext_or_w) as usize) << 3 | f.u32('a') as usize;
    let op2_index = (f.u32('l') as usize) << 3 | f.u32('o') as usize;
    let op1 = OP1_CODES[op1_index].ok_or_else(|| err(f.word(), "invalid dual op1"))?;
    let op2 = op2_code(op2_index).ok_or_else(|| err(f.word(), "invalid dual op2"))?;
    let info1 = op_info(op1).ok_or_else(|| err(f.word(), "op1 cannot dual issue"))?;
    let info2 = op_info(op2).ok_or_else(|| err(f.word(), "op2 cannot dual issue"))?;

    let unified_vector =
        (prim_ustore && info1.vector_store) || (!prim_ustore && info2.vector_store);
    let mut unified_dest = RegDecode::new(unified_vector, if unified_vector { 8 } else { 7 }, secondary)
        .dest(f.u32('b'), f.u32('m'), false);
    unified_dest.ty = ty;
    let mut internal_dest = internal_operand(f.u32('e'), 3, ty);
    internal_dest.flags = RegisterFlags::empty();

    let config = f.u32('h');
    let layout1 = op1_layout(info1.src_count, config)
        .ok_or_else(|| err(f.word(), "missing dual op1 source layout"))?;
    let layout2 = op2_layout(info1.src_count, info2.src_count, config)
        .ok_or_else(|| err(f.word(), "missing dual op2 source layout"))?;

    let write_mask = |info: &DualOpInfo, internal: bool| -> u32 {
        if internal {
            if vec4 {
                0b1111
            } else {
                0b0111
            }
        } else if info.vector_store {
            if f16 {
                0b1111
            } else {
                0b0011
            }
        } else if f16 {
            0b0011
        } else {
            0b0001
        }
    };
    let fixed_mask = f.u32('y') | ((vec4 && ext_or_w) as u32) << 3;

    let source = |slot: Slot, info: &DualOpInfo, index: u8| -> Operand {
        let mut op = match slot {
            Slot::Unified => {
                let bits = if info.vector_load { 8 } else { 7 };
                let mut op = RegDecode::new(info.vector_load, bits, secondary).src12(
                    f.u32('z'),
                    f.u32('f'),
                    false,
                    index,
                );
                let ext = if info1.src_count >= 2 {
                    false
                } else {
                    f.flag('j')
                };
                op.swizzle = decode_dual_swizzle(f.u32('u'), ext, vec4);
                if info1.src_count <= 2 && f.flag('q') {
                    op.flags |= RegisterFlags::ABSOLUTE;
                }
                if f.flag('n') {
                    op.flags |= RegisterFlags::NEGATIVE;
                }
                op
            }
            Slot::Internal0 => {
                let mut op = internal_operand(f.u32('x'), index, ty);
                op.swizzle = decode_dual_swizzle(f.u32('i'), false, vec4);
                op
            }
            Slot::Internal1 => {
                let mut op = internal_operand(f.u32('v'), index, ty);
                op.swizzle = decode_dual_swizzle(f.u32('w'), f.flag('p'), vec4);
                if f.flag('g') {
                    op.flags |= RegisterFlags::NEGATIVE;
                }
                op
            }
            Slot::Internal2 => {
                let num = if info1.src_count >= 2 {
                    f.u32('j') << 1 | f.u32('q')
                } else {
                    2
                };
                let mut op = internal_operand(num, index, ty);
                op.swizzle = SWIZZLE_XYZW;
                op
            }
        };
        op.ty = ty;
        op.index = index;
        op
    };

    let build = |opcode: Opcode, info: &DualOpInfo, layout: &[Slot], dest: Operand, dest_mask: u32| {
        let mut inst = Instruction::new(opcode);
        inst.skip_invalid = f.flag('k');
        inst.dest = dest;
        inst.dest_mask = dest_mask;
        inst.source_mask = if info.vector_load { dest_mask } else { 0b0001 };
        if info.vector_load && matches!(opcode, Opcode::Vdp | Opcode::Vssq) {
            inst.source_mask = 0b1111 >> (!vec4 as u32);
        }
        let mut srcs = layout.iter().enumerate().map(|(i, &slot)| source(slot, info, i as u8));
        if let Some(op) = srcs.next() {
            inst.src0 = op;
        }
        if let Some(op) = srcs.next() {
            inst.src1 = op;
        }
        if let Some(op) = srcs.next() {
            inst.src2 = op;
        }
        inst
    };

    let (dest1, dest2) = if prim_ustore {
        (unified_dest, internal_dest)
    } else {
        (internal_dest, unified_dest)
    };
    let mask1 = if prim_ustore {
        write_mask(&info1, dest1.bank == RegisterBank::FpInternal)
    } else {
        fixed_mask
    };
    let mask2 = if prim_ustore {
        fixed_mask
    } else {
        write_mask(&info2, dest2.bank == RegisterBank::FpInternal)
    };

    let second = build(op2, &info2, layout2, dest2, mask2);
    let mut first = build(op1, &info1, layout1, dest1, mask1);
    if first.uses_special_bank() || second.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }
    first.detail = InstructionDetail::Dual {
        second: Box::new(second),
    };
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op2_layout_follows_op1_count() {
        assert_eq!(op2_layout(2, 2, 2), Some(&[I2, U][..]));
        assert_eq!(op2_layout(2, 3, 0), None);
        assert_eq!(op1_layout(2, 3), None);
    }

    #[test]
    fn reserved_op2_slot_is_invalid() {
        assert_eq!(op2_code(0), None);
        assert_eq!(op2_code(4), Some(Opcode::Vadd));
        assert_eq!(OP1_CODES[0], Some(Opcode::Vmad));
    }
}
