use crate::types::{DataType, Operand, RegisterBank, RepeatMode, ShortPredicate, SwizzleChannel, SWIZZLE_XYZW};

use super::helpers::{Fields, RegDecode};
use super::vector::ext_predicate;
use super::{
    err, BlendOp, DecodeError, Instruction, InstructionDetail, Opcode, TestAlu, TestCompare,
};

fn short_predicate(f: &Fields) -> crate::types::ExtPredicate {
    ShortPredicate::from_bits(f.get('p')).into()
}

pub(super) fn sop2(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let regs = RegDecode::new(false, 7, secondary);
    let mut inst = Instruction::new(Opcode::Sop2);
    inst.predicate = short_predicate(&f);
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.repeat_count = f.u32('o');
    inst.repeat_mode = RepeatMode::Slmsi;
    inst.repeat_multiplier = [1; 4];

    inst.src1 = regs.src12(f.u32('z'), f.u32('k'), f.flag('r'), 1);
    inst.src2 = regs.src12(f.u32('A'), f.u32('j'), f.flag('b'), 2);
    inst.dest = regs.dest(f.u32('q'), f.u32('t'), f.flag('d'));
    for op in [&mut inst.src1, &mut inst.src2, &mut inst.dest] {
        op.ty = DataType::UInt8;
    }

    inst.detail = InstructionDetail::Sop2 {
        cop: BlendOp::TABLE[f.u32('v') as usize],
        aop: BlendOp::TABLE[f.u32('w') as usize],
        csel1: f.u32('g'),
        csel2: f.u32('h'),
        asel1: f.u32('a'),
        asel2: f.u32('l'),
        cmod1: f.flag('c'),
        cmod2: f.flag('m'),
        amod1: f.flag('f'),
        amod2: f.flag('i'),
        src1_mod: f.flag('u'),
    };
    Ok(inst)
}

pub(super) fn sop2m(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let regs = RegDecode::new(false, 7, secondary);
    let mut inst = Instruction::new(Opcode::Sop2m);
    inst.predicate = short_predicate(&f);
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');

    inst.src1 = regs.src12(f.u32('z'), f.u32('k'), f.flag('r'), 1);
    inst.src2 = regs.src12(f.u32('A'), f.u32('j'), f.flag('b'), 2);
    inst.dest = regs.dest(f.u32('q'), f.u32('t'), f.flag('d'));
    for op in [&mut inst.src1, &mut inst.src2, &mut inst.dest] {
        op.ty = DataType::UInt8;
    }

    // The encoded mask keeps alpha in its lowest bit.
    let wmask = f.u32('w');
    inst.dest_mask = ((wmask & 0b1110) >> 1) | ((wmask & 1) << 3);
    inst.detail = InstructionDetail::Sop2m {
        cop: BlendOp::TABLE[f.u32('o') as usize],
        aop: BlendOp::TABLE[f.u32('a') as usize],
        sel1: f.u32('g'),
        sel2: f.u32('h'),
        mod1: f.flag('c'),
        mod2: f.flag('m'),
    };
    Ok(inst)
}

pub(super) fn sop3(f: Fields) -> Result<Instruction, DecodeError> {
    let mut inst = Instruction::new(Opcode::Sop3);
    inst.predicate = short_predicate(&f);
    Ok(inst)
}

/// Operation and load type selected by a test's `alu_sel`/`alu_op` pair.
fn decode_test_alu(alu_sel: u32, alu_op: u32, f32_prec: bool) -> Option<(TestAlu, DataType)> {
    use DataType::*;
    use TestAlu::*;

    let float_ty = if f32_prec { F32 } else { F16 };
    Some(match (alu_sel, alu_op) {
        (0, 2) => (Add, float_ty),
        (0, 3) => (Frc, float_ty),
        (0, 4) => (Rcp, float_ty),
        (0, 5) => (Rsq, float_ty),
        (0, 6) => (Log, float_ty),
        (0, 7) => (Exp, float_ty),
        (0, 8) => (Dp, float_ty),
        (0, 9) => (Min, float_ty),
        (0, 10) => (Max, float_ty),
        (0, 11) => (Dsx, float_ty),
        (0, 12) => (Dsy, float_ty),
        (0, 13) => (Mul, float_ty),
        (0, 14) => (Sub, float_ty),

        (1, 6) => (Add, Int16),
        (1, 7) => (Sub, Int16),
        (1, 8) => (Mul, Int16),
        (1, 9) => (Add, UInt16),
        (1, 10) => (Sub, UInt16),
        (1, 11) => (Mul, UInt16),
        (1, 12) => (Add, Int32),
        (1, 13) => (Add, UInt32),
        (1, 14) => (Sub, Int32),
        (1, 15) => (Sub, UInt32),

        // The fixed-point byte forms share the plain byte arithmetic.
        (2, 0) | (2, 2) | (2, 7) => (Add, UInt8),
        (2, 1) | (2, 3) | (2, 8) => (Sub, UInt8),
        (2, 4) | (2, 5) | (2, 6) => (Mul, UInt8),

        (3, 0) => (And, UInt32),
        (3, 1) => (Or, UInt32),
        (3, 2) => (Xor, UInt32),
        (3, 3) => (Shl, UInt32),
        (3, 4) => (Shr, UInt32),
        (3, 5) => (Rol, UInt32),
        (3, 7) => (Asr, UInt32),
        _ => return None,
    })
}

fn decode_test_compare(zero_test: u32, sign_test: u32) -> Option<TestCompare> {
    let include_equal = zero_test == 1;
    Some(match (include_equal, sign_test) {
        (false, 0) => TestCompare::NotEqual,
        (false, 1) => TestCompare::Less,
        (false, 2) => TestCompare::Greater,
        (true, 0) => TestCompare::Equal,
        (true, 1) => TestCompare::LessEqual,
        (true, 2) => TestCompare::GreaterEqual,
        _ => return None,
    })
}

fn xxxx() -> [SwizzleChannel; 4] {
    [SwizzleChannel::X; 4]
}

pub(super) fn vtst(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let alu_sel = f.u32('l');
    let (alu, load_ty) = decode_test_alu(alu_sel, f.u32('u'), f.flag('a'))
        .ok_or_else(|| err(f.word(), "unsupported test operation"))?;
    let compare = decode_test_compare(f.u32('z'), f.u32('i'))
        .ok_or_else(|| err(f.word(), "invalid sign test"))?;

    let chan_cc = f.u32('h');
    if chan_cc >= 4 {
        return Err(err(f.word(), format!("unsupported test channel {chan_cc}")));
    }

    let double = alu_sel == 0;
    let regs = RegDecode::new(double, if double { 8 } else { 7 }, secondary);
    let mut inst = Instruction::new(Opcode::Vtst);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.source_mask = 1 << chan_cc;
    inst.dest_mask = 0b0001;

    inst.src1 = regs.src12(f.u32('j'), f.u32('k'), f.flag('c'), 1);
    inst.src2 = regs.src12(f.u32('q'), f.u32('f'), f.flag('e'), 2);
    inst.src1.ty = load_ty;
    inst.src2.ty = load_ty;
    inst.src1.swizzle = SWIZZLE_XYZW;
    inst.src2.swizzle = if f.flag('v') && alu_sel == 0 {
        xxxx()
    } else {
        SWIZZLE_XYZW
    };
    if f.flag('r') {
        inst.src1.flags |= crate::types::RegisterFlags::NEGATIVE;
    }

    inst.dest = Operand {
        index: 3,
        ..Operand::new(RegisterBank::Predicate, f.u32('n'), DataType::UInt32)
    };
    if inst.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }

    inst.detail = InstructionDetail::Test {
        alu,
        compare,
        mask_type: None,
    };
    Ok(inst)
}

pub(super) fn vtstmsk(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let alu_sel = f.u32('l');
    let (alu, load_ty) = decode_test_alu(alu_sel, f.u32('g'), f.flag('e'))
        .ok_or_else(|| err(f.word(), "unsupported test operation"))?;
    let compare = decode_test_compare(f.u32('z'), f.u32('i'))
        .ok_or_else(|| err(f.word(), "invalid sign test"))?;
    let mask_type = match f.u32('a') {
        0 => DataType::UInt8,
        1 => DataType::F16,
        2 => DataType::F32,
        _ => return Err(err(f.word(), "invalid test mask type")),
    };
    if !f.flag('w') {
        return Err(err(f.word(), "write-disabled mask tests are unsupported"));
    }

    let regs = RegDecode::new(alu_sel == 0, 8, secondary);
    let mut inst = Instruction::new(Opcode::Vtstmsk);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.source_mask = 0b1111;
    inst.dest_mask = 0b1111;

    inst.src1 = regs.src12(f.u32('h'), f.u32('n'), f.flag('r'), 1);
    inst.src2 = regs.src12(f.u32('j'), f.u32('k'), f.flag('c'), 2);
    inst.dest = regs.dest(f.u32('f'), f.u32('b'), f.flag('d'));
    inst.src1.ty = load_ty;
    inst.src2.ty = load_ty;
    inst.dest.ty = mask_type;
    inst.src2.swizzle = if f.flag('v') { xxxx() } else { SWIZZLE_XYZW };
    if f.flag('t') {
        inst.src1.flags |= crate::types::RegisterFlags::NEGATIVE;
    }
    if inst.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }

    inst.detail = InstructionDetail::Test {
        alu,
        compare,
        mask_type: Some(mask_type),
    };
    Ok(inst)
}

pub(super) fn vbw(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let op2 = f.flag('a');
    let opcode = match f.u32('o') {
        0b010 if op2 => Opcode::Or,
        0b010 => Opcode::And,
        0b011 => Opcode::Xor,
        0b100 if op2 => Opcode::Rol,
        0b100 => Opcode::Shl,
        0b101 if op2 => Opcode::Asr,
        0b101 => Opcode::Shr,
        other => return Err(err(f.word(), format!("invalid bitwise op {other:#05b}"))),
    };

    let regs = RegDecode::new(false, 7, secondary);
    let mut inst = Instruction::new(opcode);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.repeat_count = f.u32('m');
    inst.repeat_mode = RepeatMode::Slmsi;
    inst.repeat_multiplier = [1; 4];
    inst.dest_mask = 0b0001;
    inst.source_mask = 0b0001;

    inst.src1 = regs.src12(f.u32('q'), f.u32('f'), f.flag('c'), 1);
    inst.src2 = regs.src12(f.u32('u'), f.u32('g'), f.flag('x'), 2);
    inst.dest = regs.dest(f.u32('j'), f.u32('k'), f.flag('d'));
    for op in [&mut inst.src1, &mut inst.src2, &mut inst.dest] {
        op.ty = DataType::UInt32;
    }
    if inst.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }

    let src2_invert = f.flag('i');
    let immediate = (f.flag('x') && inst.src2.bank == RegisterBank::Immediate).then(|| {
        let value = f.u32('u') | f.u32('l') << 7 | f.u32('h') << 14;
        if src2_invert {
            !value
        } else {
            value
        }
    });

    inst.detail = InstructionDetail::Bitwise {
        src2_invert,
        src2_rot: f.u32('t'),
        immediate,
    };
    Ok(inst)
}

pub(super) fn limm(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let value = f.u32('z') | f.u32('x') << 21 | f.u32('y') << 26;

    let mut inst = Instruction::new(Opcode::Limm);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.end = f.flag('e');
    inst.dest = RegDecode::new(false, 7, secondary).dest(f.u32('t'), f.u32('b'), f.flag('d'));
    inst.dest.ty = DataType::UInt32;
    inst.dest_mask = 0b0001;
    if inst.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }
    inst.detail = InstructionDetail::LoadImmediate { value };
    Ok(inst)
}

pub(super) fn vldst(f: Fields, secondary: bool) -> Result<Instruction, DecodeError> {
    let opcode = match f.u32('o') {
        0b01 => Opcode::Ldr,
        0b10 => Opcode::Str,
        other => return Err(err(f.word(), format!("unsupported load/store op {other}"))),
    };
    let data_type = match f.u32('f') {
        0 => DataType::F32,
        1 => DataType::F16,
        2 => DataType::C10,
        _ => return Err(err(f.word(), "invalid load/store data type")),
    };

    let regs = RegDecode::new(false, 7, secondary);
    let mut inst = Instruction::new(opcode);
    inst.predicate = ext_predicate(f.u32('p'));
    inst.skip_invalid = f.flag('s');
    inst.dest_mask = 0b0001;

    let dest_bank = if secondary {
        RegisterBank::SecAttr
    } else if f.flag('t') {
        RegisterBank::PrimAttr
    } else {
        RegisterBank::Temp
    };
    inst.dest = Operand {
        index: 3,
        ..Operand::new(dest_bank, f.u32('v'), DataType::F32)
    };
    inst.src0 = regs.src0(f.u32('w'), f.u32('h'), f.flag('r'));
    inst.src1 = regs.src12(f.u32('x'), f.u32('q'), f.flag('b'), 1);
    inst.src2 = regs.src12(f.u32('z'), f.u32('u'), f.flag('a'), 2);
    for op in [&mut inst.src0, &mut inst.src1, &mut inst.src2] {
        op.ty = DataType::Int32;
    }
    if inst.uses_special_bank() {
        return Err(err(f.word(), "special registers are unsupported"));
    }

    inst.detail = InstructionDetail::LoadStore {
        data_type,
        count: f.u32('k') + 1,
        moe_expand: f.flag('m'),
    };
    Ok(inst)
}

pub(super) fn smlsi(f: Fields) -> Result<Instruction, DecodeError> {
    let mut inst = Instruction::new(Opcode::Smlsi);
    inst.detail = InstructionDetail::Smlsi {
        inc_modes: [f.flag('d'), f.flag('r'), f.flag('c'), f.flag('i')],
        incs: [
            f.u32('e') as u8,
            f.u32('a') as u8,
            f.u32('b') as u8,
            f.u32('f') as u8,
        ],
        limits: [f.u32('t'), f.u32('p'), f.u32('s')],
    };
    Ok(inst)
}

/// Sampling, kill and branch words. They decode but no translator accepts them.
pub(super) fn control(f: Fields, opcode: Opcode) -> Result<Instruction, DecodeError> {
    let mut inst = Instruction::new(opcode);
    inst.predicate = match opcode {
        Opcode::Kill => short_predicate(&f),
        _ => ext_predicate(f.u32('p')),
    };
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables() {
        assert_eq!(decode_test_alu(0, 14, true), Some((TestAlu::Sub, DataType::F32)));
        assert_eq!(decode_test_alu(0, 2, false), Some((TestAlu::Add, DataType::F16)));
        assert_eq!(decode_test_alu(1, 15, true), Some((TestAlu::Sub, DataType::UInt32)));
        assert_eq!(decode_test_alu(3, 6, true), None);
        assert_eq!(decode_test_compare(1, 2), Some(TestCompare::GreaterEqual));
        assert_eq!(decode_test_compare(0, 3), None);
    }
}
