use crate::types::{
    mask_count, CompareMethod, DataType, ExtPredicate, MoveType, RegisterBank, RegisterFlags,
    RepeatMode, SwizzleChannel, SWIZZLE_XYZW,
};

use super::helpers::{
    decode_modifier, decode_swizzle4, decode_vec34_swizzle, decode_write_mask, internal_operand,
    swizzle_cast, Fields, RegDecode,
};
use super::{err, DecodeError, Instruction, InstructionDetail, Opcode};

use SwizzleChannel::{W, X, Y, Z};

pub(super) fn ext_predicate(bits: u32) -> ExtPredicate {
    ExtPredicate::TABLE[(bits & 0b111) as usize]
}

fn reject_special(inst: &Instruction, word: u64) -> Result<(), DecodeError> {
    if inst.uses_special_bank() {
        return Err(err(word, "special registers are unsupported"));
    }
    Ok(())
}

pub(super) fn vmov(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let move_type = match f.u32('m') {
        0 => MoveType::Unconditional,
        1 => MoveType::Conditional,
        2 => MoveType::ConditionalU8,
        _ => return Err(err(f.word(), "invalid move type")),
    };
    let opcode = match move_type {
        MoveType::Unconditional => Opcode::Vmov,
        MoveType::Conditional => Opcode::Vmovc,
        MoveType::ConditionalU8 => Opcode::Vmovcu8,
    };
    let ty = DataType::MOVE_TYPES[f.u32('o') as usize];
    let double = matches!(ty, DataType::C10 | DataType::F16 | DataType::F32);
    let regs = RegDecode::new(double, if double { 7 } else { 6 }, secondary);
    let conditional = move_type != MoveType::Unconditional;

    let mut inst = Instruction::new(opcode);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = !conditional && f.flag('e');
    inst.repeat_count = f.u32('a');
    inst.repeat_mode = RepeatMode::Slmsi;
    inst.repeat_multiplier = if matches!(ty, DataType::F16 | DataType::F32) {
        [2; 4]
    } else {
        [1; 4]
    };
    inst.dest_mask = f.u32('h');
    inst.source_mask = inst.dest_mask;

    inst.dest = regs.dest(f.u32('j'), f.u32('l'), f.flag('d'));
    inst.src1 = regs.src12(f.u32('u'), f.u32('f'), f.flag('c'), 1);
    inst.src1.swizzle = decode_vec34_swizzle(f.u32('w'), false, 2);
    inst.src1.ty = ty;
    inst.dest.ty = ty;

    let mut compare = CompareMethod::NeZero;
    if conditional {
        compare = CompareMethod::from_bits(f.get('t') << 1 | f.get('i'));
        inst.src0 = regs.src0(f.u32('q'), f.u32('k'), f.flag('e'));
        inst.src2 = regs.src12(f.u32('v'), f.u32('g'), f.flag('b'), 2);
        if f.flag('r') {
            inst.src0.swizzle = inst.src1.swizzle;
        }
        inst.src2.swizzle = inst.src1.swizzle;
        inst.src2.ty = ty;
        inst.src0.ty = if move_type == MoveType::ConditionalU8 {
            DataType::UInt8
        } else {
            ty
        };
    }

    reject_special(&inst, f.word())?;
    inst.detail = InstructionDetail::Move { move_type, compare };
    Ok(inst)
}

/// `vmad` with its two GPI sources: `src0 * src1 + src2`.
pub(super) fn vmad(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let kind = if f.flag('o') { 2 } else { 1 };
    let regs = RegDecode::new(true, 7, secondary);

    let mut inst = Instruction::new(Opcode::Vmad);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.repeat_mode = RepeatMode::from_bits(f.get('i'));
    inst.repeat_count = f.u32('t');
    inst.repeat_multiplier = [2, 2, 2, 4];
    inst.dest_mask = f.u32('w');
    inst.source_mask = inst.dest_mask;

    inst.dest = regs.dest(f.u32('m'), f.u32('k'), f.flag('d'));
    inst.src1 = regs.src12(f.u32('B'), f.u32('j'), f.flag('r'), 1);
    inst.src0 = internal_operand(f.u32('l'), 0, DataType::F32);
    inst.src2 = internal_operand(f.u32('v'), 2, DataType::F32);
    inst.src1.ty = DataType::F32;
    inst.dest.ty = DataType::F32;
    if kind == 1 {
        inst.dest.swizzle[3] = X;
    }

    inst.src1.swizzle = decode_vec34_swizzle(f.u32('A'), f.flag('y'), kind);
    inst.src0.swizzle = decode_vec34_swizzle(f.u32('q'), f.flag('z'), kind);
    inst.src2.swizzle = decode_vec34_swizzle(f.u32('u'), f.flag('g'), kind);

    if f.flag('b') {
        inst.src1.flags |= RegisterFlags::ABSOLUTE;
    }
    if f.flag('c') {
        inst.src1.flags |= RegisterFlags::NEGATIVE;
    }
    if f.flag('a') {
        inst.src0.flags |= RegisterFlags::ABSOLUTE;
    }
    if f.flag('x') {
        inst.src0.flags |= RegisterFlags::NEGATIVE;
    }
    if f.flag('h') {
        inst.src2.flags |= RegisterFlags::ABSOLUTE;
    }
    if f.flag('f') {
        inst.src2.flags |= RegisterFlags::NEGATIVE;
    }

    reject_special(&inst, f.word())?;
    Ok(inst)
}

const VMAD2_SRC0_SWIZZLES: [[SwizzleChannel; 4]; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, X, W],
    [X, Y, W, W],
    [Z, W, X, Y],
];

const VMAD2_SRC1_SWIZZLES: [[SwizzleChannel; 4]; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [X, Y, Y, Z],
    [Y, Y, W, W],
    [W, Y, Z, W],
];

const VMAD2_SRC2_SWIZZLES: [[SwizzleChannel; 4]; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [X, Z, W, W],
    [X, X, Y, Z],
    [X, Y, Z, Z],
];

pub(super) fn vmad2(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let f16 = f.flag('d');
    let ty = if f16 { DataType::F16 } else { DataType::F32 };
    let regs = RegDecode::new(true, 7, secondary);

    let mut inst = Instruction::new(if f16 { Opcode::Vf16Mad } else { Opcode::Vmad });
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');

    inst.dest = regs.dest(f.u32('h'), f.u32('t'), false);
    inst.src0 = regs.src0(f.u32('l'), f.u32('k'), false);
    inst.src1 = regs.src12(f.u32('q'), f.u32('f'), f.flag('b'), 1);
    inst.src2 = regs.src12(f.u32('u'), f.u32('g'), f.flag('a'), 2);
    inst.dest_mask = decode_write_mask(inst.dest.bank, f.u32('e'), f16);
    inst.source_mask = inst.dest_mask;

    for op in [&mut inst.dest, &mut inst.src0, &mut inst.src1, &mut inst.src2] {
        op.ty = ty;
    }

    let src0_swizzle = f.u32('j') | f.u32('r') << 2;
    let src1_swizzle = f.u32('z') | f.u32('i') << 2;
    inst.src0.swizzle = VMAD2_SRC0_SWIZZLES[src0_swizzle as usize];
    inst.src1.swizzle = VMAD2_SRC1_SWIZZLES[src1_swizzle as usize];
    inst.src2.swizzle = VMAD2_SRC2_SWIZZLES[f.u32('w') as usize];

    if f.flag('c') {
        inst.src0.flags |= RegisterFlags::ABSOLUTE;
    }
    inst.src1.flags = decode_modifier(f.u32('m'));
    inst.src2.flags = decode_modifier(f.u32('o'));

    reject_special(&inst, f.word())?;
    Ok(inst)
}

pub(super) fn vnmad(f: Fields, f32_form: bool, secondary: bool) -> Result<Instruction, DecodeError> {
    const F32_OPS: [Opcode; 8] = [
        Opcode::Vmul,
        Opcode::Vadd,
        Opcode::Vfrc,
        Opcode::Vdsx,
        Opcode::Vdsy,
        Opcode::Vmin,
        Opcode::Vmax,
        Opcode::Vdp,
    ];
    const F16_OPS: [Opcode; 8] = [
        Opcode::Vf16Mul,
        Opcode::Vf16Add,
        Opcode::Vf16Frc,
        Opcode::Vf16Dsx,
        Opcode::Vf16Dsy,
        Opcode::Vf16Min,
        Opcode::Vf16Max,
        Opcode::Vf16Dp,
    ];

    let op2 = f.u32('g') as usize;
    let opcode = if f32_form { F32_OPS[op2] } else { F16_OPS[op2] };
    let ty = if f32_form { DataType::F32 } else { DataType::F16 };
    let regs = RegDecode::new(true, 7, secondary);

    let mut inst = Instruction::new(opcode);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.dest = regs.dest(f.u32('f'), f.u32('t'), f.flag('d'));
    inst.src1 = regs.src12(f.u32('h'), f.u32('k'), f.flag('b'), 1);
    inst.src2 = regs.src12(f.u32('j'), f.u32('l'), f.flag('a'), 2);
    inst.src1.flags = decode_modifier(f.u32('m'));
    if f.u32('o') == 1 {
        inst.src2.flags = RegisterFlags::ABSOLUTE;
    }
    inst.dest.ty = ty;
    inst.src1.ty = ty;
    inst.src2.ty = ty;

    let encoded = f.u32('z') | f.u32('i') << 7 | f.u32('c') << 9 | f.u32('r') << 10;
    inst.src1.swizzle = decode_swizzle4(encoded);
    inst.src2.swizzle = decode_vec34_swizzle(f.u32('w'), false, 2);

    inst.dest_mask = f.u32('e');
    inst.source_mask = inst.dest_mask;
    if matches!(opcode, Opcode::Vdp | Opcode::Vf16Dp) {
        // A dot product always reads the full vector.
        inst.source_mask = 0b1111;
        inst.detail = InstructionDetail::Dot { rotate_mask: false };
    }

    reject_special(&inst, f.word())?;
    Ok(inst)
}

const PACK_TYPES: [DataType; 8] = [
    DataType::UInt8,
    DataType::Int8,
    DataType::O8,
    DataType::UInt16,
    DataType::Int16,
    DataType::F16,
    DataType::F32,
    DataType::C10,
];

/// Whether a `vpck` from `src` into `dest` exists.
fn pack_valid(dest: DataType, src: DataType) -> bool {
    match (dest, src) {
        (DataType::C10, s) => matches!(s, DataType::F16 | DataType::F32 | DataType::C10),
        (d, DataType::C10) => d.is_float(),
        _ => true,
    }
}

pub(super) fn vpck(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let dest_ty = PACK_TYPES[f.u32('t') as usize];
    let src_ty = PACK_TYPES[f.u32('f') as usize];
    if !pack_valid(dest_ty, src_ty) {
        return Err(err(
            f.word(),
            format!("invalid pack VPCK{}{}", dest_ty.name(), src_ty.name()),
        ));
    }

    let scale = f.flag('h');
    let dest_mask = f.u32('m');
    let comp0_bit1 = f.u32('v');
    let src2_n = f.u32('w');

    let mut inst = Instruction::new(Opcode::Vpck {
        dest: dest_ty,
        src: src_ty,
    });
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.repeat_count = f.u32('a');
    inst.repeat_mode = RepeatMode::Slmsi;
    inst.repeat_multiplier = if src_ty.is_float() {
        [1, 2, 2, 1]
    } else {
        [1; 4]
    };
    inst.dest_mask = dest_mask;

    inst.dest = RegDecode::new(false, 7, secondary).dest(f.u32('g'), f.u32('b'), f.flag('d'));
    inst.dest.ty = dest_ty;

    let mut src1_n = f.u32('q');
    let src1_double = src_ty.is_float();
    if !src1_double {
        src1_n = comp0_bit1 | (src1_n << 1);
    }
    inst.src1 = RegDecode::new(src1_double, 7, secondary).src12(src1_n, f.u32('k'), f.flag('c'), 1);
    inst.src1.ty = src_ty;

    let comp_sel_0_bit1 = if src_ty == DataType::F32 {
        comp0_bit1 & 1
    } else {
        src2_n & 1
    };
    let comp_sel_0 = f.u32('x') | comp_sel_0_bit1 << 1;
    inst.src1.swizzle = swizzle_cast([comp_sel_0, f.u32('i'), f.u32('j'), f.u32('o')]);

    let first_bit = (0..4).find(|i| dest_mask & (1 << i) != 0).unwrap_or(0);
    let mut src1_mask = dest_mask;
    let mut src2_mask = 0;

    if src_ty == DataType::F32 {
        // Every F32 lane carries one element, so wide packs split between two registers.
        inst.src2 = RegDecode::new(true, 7, secondary).src12(src2_n, f.u32('l'), f.flag('x'), 2);
        inst.src2.ty = src_ty;

        let count = mask_count(dest_mask);
        let src1_handles = (count + 1) >> 1;
        let src2_handles = count - src1_handles;
        let contiguous = inst.src1.bank == inst.src2.bank
            && inst.src1.num + src1_handles == inst.src2.num;

        if !contiguous && src2_handles != 0 && inst.src2.bank != RegisterBank::Immediate {
            const SRC1_LOAD_MASKS: [u32; 3] = [0, 0b1, 0b11];
            const SRC2_LOAD_MASKS: [u32; 3] = [0, 0b10, 0b1100];
            src1_mask =
                ((dest_mask >> first_bit) & SRC1_LOAD_MASKS[src1_handles as usize]) << first_bit;
            src2_mask = (((dest_mask >> first_bit) & SRC2_LOAD_MASKS[src2_handles as usize])
                >> src1_handles)
                << first_bit;

            let start = inst.src2.num.wrapping_sub(inst.src1.num) % 4;
            let mut swizzle = inst.src2.swizzle;
            for i in start..4 {
                swizzle[(i - start) as usize] = inst.src1.swizzle[i as usize];
            }
            inst.src2.swizzle = swizzle;
        }
    } else {
        // An unused src2 keeps its float default, so float sources never cycle.
        let no_cycle = (src_ty.is_float() && inst.src2.ty.is_float())
            || (scale && (src_ty == DataType::UInt8 || dest_ty == DataType::UInt8));
        if !no_cycle {
            let old = inst.src1.swizzle;
            for i in 0..4u32 {
                inst.src1.swizzle[((i + first_bit) % 4) as usize] = old[i as usize];
            }
        }
    }
    inst.source_mask = src1_mask;

    reject_special(&inst, f.word())?;
    inst.detail = InstructionDetail::Pack {
        scale,
        src2_mask,
    };
    Ok(inst)
}

pub(super) fn vcomp(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    const OPS: [Opcode; 4] = [Opcode::Vrcp, Opcode::Vrsq, Opcode::Vlog, Opcode::Vexp];
    const TYPES: [DataType; 4] = [DataType::F32, DataType::F16, DataType::C10, DataType::Unk];

    let regs = RegDecode::new(true, 8, secondary);
    let mut inst = Instruction::new(OPS[f.u32('b') as usize]);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('n');
    inst.repeat_count = f.u32('a');
    inst.repeat_mode = RepeatMode::Slmsi;

    inst.dest = regs.dest(f.u32('g'), f.u32('t'), f.flag('e'));
    inst.src1 = regs.src12(f.u32('h'), f.u32('k'), f.flag('r'), 1);
    inst.src1.flags = decode_modifier(f.u32('m'));
    inst.src1.ty = TYPES[f.u32('c') as usize];
    inst.dest.ty = TYPES[f.u32('d') as usize];
    if inst.src1.ty == DataType::Unk || inst.dest.ty == DataType::Unk {
        return Err(err(f.word(), "unknown complex-op data type"));
    }
    inst.src1.swizzle = SWIZZLE_XYZW;
    inst.dest_mask = f.u32('w');
    // Complex ops work on a single component.
    inst.source_mask = 1 << f.u32('f');

    reject_special(&inst, f.word())?;
    Ok(inst)
}

pub(super) fn vdp(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let vec4 = f.flag('o');
    let kind = if vec4 { 2 } else { 1 };
    let regs = RegDecode::new(true, 7, secondary);

    let mut inst = Instruction::new(Opcode::Vdp);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.repeat_mode = RepeatMode::from_bits(f.get('i'));
    inst.repeat_count = f.u32('a');
    inst.dest_mask = f.u32('w');
    inst.source_mask = if vec4 { 0b1111 } else { 0b0111 };

    inst.src1 = regs.src12(f.u32('u'), f.u32('k'), f.flag('r'), 1);
    inst.dest = regs.dest(f.u32('j'), f.u32('t'), f.flag('d'));
    inst.src2 = internal_operand(f.u32('h'), 2, DataType::F32);
    inst.src2.swizzle = decode_vec34_swizzle(f.u32('z'), false, kind);
    inst.src1.ty = DataType::F32;
    inst.dest.ty = DataType::F32;
    inst.src1.swizzle = swizzle_cast([f.u32('x'), f.u32('y'), f.u32('q'), f.u32('m')]);

    if f.flag('b') {
        inst.src1.flags |= RegisterFlags::NEGATIVE;
    }
    if f.flag('f') {
        inst.src1.flags |= RegisterFlags::ABSOLUTE;
    }
    if f.flag('g') {
        inst.src2.flags |= RegisterFlags::ABSOLUTE;
    }

    reject_special(&inst, f.word())?;
    inst.detail = InstructionDetail::Dot { rotate_mask: true };
    Ok(inst)
}
