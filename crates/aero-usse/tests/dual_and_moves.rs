use aero_usse::backend::interp::{Interpreter, Machine};
use aero_usse::decode::{Instruction, InstructionDetail, Opcode};
use aero_usse::program::CmovLowering;
use aero_usse::translate::Translator;
use aero_usse::types::{
    CompareMethod, DataType, ExtPredicate, MoveType, Operand, RegisterBank, SwizzleChannel,
};
use aero_usse::{Backend, ConstantTables, ProgramInfo, ShaderStage, TranslateContext, TranslateError};

fn reg(bank: RegisterBank, num: u32, index: u8) -> Operand {
    let mut op = Operand::new(bank, num, DataType::F32);
    op.index = index;
    op
}

fn temp(num: u32, index: u8) -> Operand {
    reg(RegisterBank::Temp, num, index)
}

/// Runs `inst` on a fresh fragment program, seeding the named registers first.
fn run(inst: &Instruction, lowering: CmovLowering, seeds: &[(&str, [u32; 4])], read: &str) -> Vec<u32> {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut ctx = TranslateContext::new(&info, &tables);
    ctx.options.cmov_lowering = lowering;

    let mut t = Translator::new(Interpreter::new(), ctx);
    t.translate(inst).unwrap();
    let program = t.into_backend().finish();

    let mut m = Machine::new(&program);
    for (name, bits) in seeds {
        m.set_bits(name, bits).unwrap();
    }
    m.run();
    m.get_bits(read).unwrap()
}

fn splat(v: f32) -> [u32; 4] {
    [v.to_bits(); 4]
}

#[test]
fn dual_ops_read_sources_before_either_writes() {
    let mut second = Instruction::new(Opcode::Vadd);
    second.dest = reg(RegisterBank::FpInternal, 0, 3);
    second.src0 = temp(0, 0);
    second.src1 = temp(0, 1);

    let mut inst = Instruction::new(Opcode::Vmov);
    inst.dest = temp(0, 3);
    inst.src0 = temp(4, 0);
    inst.detail = InstructionDetail::Dual {
        second: Box::new(second),
    };

    let seeds = [("r0", splat(1.0)), ("r4", splat(10.0))];
    let internal = run(&inst, CmovLowering::Blend, &seeds, "i0");
    assert_eq!(internal, splat(2.0).to_vec());
    let moved = run(&inst, CmovLowering::Blend, &seeds, "r0");
    assert_eq!(moved, splat(10.0).to_vec());
}

#[test]
fn dual_ops_reject_predicates_and_repeats() {
    let build = |predicate: ExtPredicate, repeat_count: u32| {
        let mut second = Instruction::new(Opcode::Vadd);
        second.dest = reg(RegisterBank::FpInternal, 0, 3);
        second.src0 = temp(0, 0);
        second.src1 = temp(0, 1);
        second.predicate = predicate;

        let mut inst = Instruction::new(Opcode::Vmov);
        inst.dest = temp(0, 3);
        inst.src0 = temp(4, 0);
        inst.repeat_count = repeat_count;
        inst.detail = InstructionDetail::Dual {
            second: Box::new(second),
        };
        inst
    };

    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    for (predicate, repeat_count) in [(ExtPredicate::P0, 0), (ExtPredicate::None, 1)] {
        let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));
        let err = t.translate(&build(predicate, repeat_count)).unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }), "{err}");
    }

    let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));
    t.translate(&build(ExtPredicate::None, 0)).unwrap();
}

#[test]
fn blend_and_select_conditional_moves_agree() {
    let conditions = [-3.0f32, 0.0, 0.5, 7.25];
    let on = [1.5f32, -2.0, 100.0, 0.25];
    let off = [-8.0f32, 4.0, 0.125, 9.0];
    let bits = |v: [f32; 4]| v.map(f32::to_bits);

    for compare in [
        CompareMethod::NeZero,
        CompareMethod::EqZero,
        CompareMethod::LtZero,
        CompareMethod::LteZero,
    ] {
        let mut inst = Instruction::new(Opcode::Vmovc);
        inst.dest = temp(12, 3);
        inst.src0 = temp(0, 0);
        inst.src1 = temp(4, 1);
        inst.src2 = temp(8, 2);
        inst.detail = InstructionDetail::Move {
            move_type: MoveType::Conditional,
            compare,
        };

        let seeds = [("r0", bits(conditions)), ("r4", bits(on)), ("r8", bits(off))];
        let blended = run(&inst, CmovLowering::Blend, &seeds, "r12");
        let selected = run(&inst, CmovLowering::Select, &seeds, "r12");
        assert_eq!(blended, selected, "{compare:?}");

        let expected: Vec<u32> = (0..4)
            .map(|i| {
                let c = conditions[i];
                let take = match compare {
                    CompareMethod::NeZero => c != 0.0,
                    CompareMethod::EqZero => c == 0.0,
                    CompareMethod::LtZero => c < 0.0,
                    CompareMethod::LteZero => c <= 0.0,
                };
                if take { on[i] } else { off[i] }.to_bits()
            })
            .collect();
        assert_eq!(selected, expected, "{compare:?}");
    }
}

#[test]
fn select_lowering_is_exact_for_infinities_and_negative_zero() {
    let conditions = [1.0f32, 0.0, 1.0, 0.0];
    let on = [2.0f32, 3.0, -0.0, 4.0];
    let off = [f32::INFINITY, -0.0, 5.0, f32::NEG_INFINITY];
    let bits = |v: [f32; 4]| v.map(f32::to_bits);

    let mut inst = Instruction::new(Opcode::Vmovc);
    inst.dest = temp(12, 3);
    inst.src0 = temp(0, 0);
    inst.src1 = temp(4, 1);
    inst.src2 = temp(8, 2);
    inst.detail = InstructionDetail::Move {
        move_type: MoveType::Conditional,
        compare: CompareMethod::NeZero,
    };

    let seeds = [("r0", bits(conditions)), ("r4", bits(on)), ("r8", bits(off))];
    let selected = run(&inst, CmovLowering::Select, &seeds, "r12");
    assert_eq!(selected, bits([2.0, -0.0, -0.0, f32::NEG_INFINITY]).to_vec());

    // The blend form multiplies the discarded infinity by zero and drops the sign of a picked -0.0.
    let blended = run(&inst, CmovLowering::Blend, &seeds, "r12");
    assert!(f32::from_bits(blended[0]).is_nan());
    assert_eq!(blended[1], 0.0f32.to_bits());
}

#[test]
fn narrow_integer_pack_alternates_first_two_elements() {
    let mut inst = Instruction::new(Opcode::Vpck {
        dest: DataType::UInt8,
        src: DataType::UInt8,
    });
    inst.dest = Operand::new(RegisterBank::Temp, 4, DataType::UInt8);
    inst.dest.index = 3;
    inst.src1 = Operand::new(RegisterBank::Temp, 0, DataType::UInt8);
    inst.src1.index = 1;
    inst.src1.swizzle = [
        SwizzleChannel::X,
        SwizzleChannel::Y,
        SwizzleChannel::Z,
        SwizzleChannel::W,
    ];
    inst.detail = InstructionDetail::Pack {
        scale: false,
        src2_mask: 0,
    };

    let seeds = [("r0", [u32::from_le_bytes([1, 2, 3, 4]), 0, 0, 0])];
    let packed = run(&inst, CmovLowering::Blend, &seeds, "r4");
    assert_eq!(packed[0].to_le_bytes(), [1, 2, 1, 2]);
}
