use aero_usse::backend::interp::{Interpreter, Machine};
use aero_usse::decode::{BlendOp, Instruction, InstructionDetail, Opcode, TestAlu, TestCompare};
use aero_usse::ir::MemorySpace;
use aero_usse::translate::Translator;
use aero_usse::types::{DataType, ExtPredicate, Operand, RegisterBank, RepeatMode};
use aero_usse::{Backend, ConstantTables, ProgramInfo, ShaderStage, TranslateContext, TranslateError};
use pretty_assertions::assert_eq;

fn reg(bank: RegisterBank, num: u32, index: u8, ty: DataType) -> Operand {
    let mut op = Operand::new(bank, num, ty);
    op.index = index;
    op
}

fn temp(num: u32, index: u8) -> Operand {
    reg(RegisterBank::Temp, num, index, DataType::F32)
}

fn bytes(num: u32, index: u8) -> Operand {
    reg(RegisterBank::Temp, num, index, DataType::UInt8)
}

fn splat(v: f32) -> [u32; 4] {
    [v.to_bits(); 4]
}

fn floats(v: [f32; 4]) -> [u32; 4] {
    v.map(f32::to_bits)
}

/// Translates `insts` for `info`, lets `setup` seed the machine, runs it once and hands the final
/// state to `inspect`.
fn execute<R>(
    info: &ProgramInfo,
    insts: &[Instruction],
    setup: impl FnOnce(&mut Machine<'_>),
    inspect: impl FnOnce(&Machine<'_>) -> R,
) -> R {
    let tables = ConstantTables::default();
    let mut t = Translator::new(Interpreter::new(), TranslateContext::new(info, &tables));
    for inst in insts {
        t.translate(inst).unwrap();
    }
    let program = t.into_backend().finish();

    let mut m = Machine::new(&program);
    setup(&mut m);
    m.run();
    inspect(&m)
}

/// Same as [`execute`] on a default fragment program, seeding registers and reading one back.
fn run(insts: &[Instruction], seeds: &[(&str, [u32; 4])], read: &str) -> Vec<u32> {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    execute(
        &info,
        insts,
        |m| {
            for (name, bits) in seeds {
                m.set_bits(name, bits).unwrap();
            }
        },
        |m| m.get_bits(read).unwrap(),
    )
}

fn translate_err(inst: &Instruction) -> TranslateError {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));
    t.translate(inst).unwrap_err()
}

fn packed(b: [u8; 4]) -> u32 {
    u32::from_le_bytes(b)
}

#[test]
fn sop2_blends_color_and_alpha_separately() {
    let mut inst = Instruction::new(Opcode::Sop2);
    inst.dest = bytes(8, 3);
    inst.src1 = bytes(0, 1);
    inst.src2 = bytes(4, 2);
    // color = src1.rgb * (1 - 0) + src2.rgb * 0, alpha = src1.a * src2.a
    inst.detail = InstructionDetail::Sop2 {
        cop: BlendOp::Add,
        aop: BlendOp::Add,
        csel1: 0,
        csel2: 0,
        asel1: 2,
        asel2: 0,
        cmod1: true,
        cmod2: false,
        amod1: false,
        amod2: false,
        src1_mod: false,
    };

    let seeds = [
        ("r0", [packed([10, 20, 30, 255]), 0, 0, 0]),
        ("r4", [packed([200, 200, 200, 128]), 0, 0, 0]),
    ];
    let out = run(&[inst], &seeds, "r8");
    assert_eq!(out[0].to_le_bytes(), [10, 20, 30, 128]);
}

#[test]
fn sop2m_combines_all_four_channels() {
    let mut inst = Instruction::new(Opcode::Sop2m);
    inst.dest = bytes(8, 3);
    inst.src1 = bytes(0, 1);
    inst.src2 = bytes(4, 2);
    // src1 * src1 + src2 * (1 - 0), alpha takes the minimum of the two products.
    inst.detail = InstructionDetail::Sop2m {
        cop: BlendOp::Add,
        aop: BlendOp::Min,
        sel1: 2,
        sel2: 0,
        mod1: false,
        mod2: true,
    };

    let seeds = [
        ("r0", [packed([255, 0, 255, 255]), 0, 0, 0]),
        ("r4", [packed([0, 51, 0, 0]), 0, 0, 0]),
    ];
    let out = run(&[inst], &seeds, "r8");
    assert_eq!(out[0].to_le_bytes(), [255, 51, 255, 0]);
}

#[test]
fn sop3_is_rejected() {
    let err = translate_err(&Instruction::new(Opcode::Sop3));
    assert!(matches!(err, TranslateError::Unsupported { .. }), "{err}");
}

fn load_store(opcode: Opcode, count: u32, moe_expand: bool) -> Instruction {
    let mut inst = Instruction::new(opcode);
    inst.detail = InstructionDetail::LoadStore {
        data_type: DataType::F32,
        count,
        moe_expand,
    };
    inst
}

fn memory_words(words: &[f32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn register_offsets_drop_the_bias_and_skip_the_header_word() {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.buffer_aliases.scratch = Some(4);

    let mut inst = load_store(Opcode::Ldr, 2, false);
    inst.dest = temp(8, 3);
    inst.src0 = reg(RegisterBank::SecAttr, 4, 0, DataType::UInt32);
    inst.src1 = reg(RegisterBank::Temp, 0, 1, DataType::Int32);
    inst.src2 = reg(RegisterBank::Immediate, 4, 2, DataType::Int32);

    // 0x10008 - 0x10000 + 4 + 4 = 16.
    let memory = memory_words(&[1.0, 2.0, 3.0, 4.0, 7.0, 9.0, 5.0]);
    let out = execute(
        &info,
        &[inst],
        |m| {
            m.set_bits("r0", &[0x10008]).unwrap();
            m.set_f32("r8", &[-1.0; 4]).unwrap();
            m.set_memory(MemorySpace::Scratch, memory);
        },
        |m| m.get_f32("r8").unwrap(),
    );
    assert_eq!(out, vec![7.0, 9.0, -1.0, -1.0]);
}

#[test]
fn expanded_immediate_offsets_scale_by_element_size() {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.buffer_aliases.texture_index = Some(6);

    let mut inst = load_store(Opcode::Ldr, 1, true);
    inst.dest = temp(8, 3);
    inst.src0 = reg(RegisterBank::SecAttr, 6, 0, DataType::UInt32);
    inst.src1 = reg(RegisterBank::Immediate, 2, 1, DataType::Int32);
    inst.src2 = reg(RegisterBank::Immediate, 0, 2, DataType::Int32);

    let memory = memory_words(&[1.0, 2.0, 3.0, 4.0]);
    let out = execute(
        &info,
        &[inst],
        |m| m.set_memory(MemorySpace::TextureIndex, memory),
        |m| m.get_f32("r8").unwrap(),
    );
    assert_eq!(out[0], 3.0);
}

#[test]
fn literal_alias_reads_fold_to_constants() {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.buffer_aliases.literal = Some(2);
    info.literal_buffer = memory_words(&[0.5, 1.5, 2.5, 3.5]);

    let mut inst = load_store(Opcode::Ldr, 2, false);
    inst.dest = temp(4, 3);
    inst.src0 = reg(RegisterBank::SecAttr, 2, 0, DataType::UInt32);
    inst.src1 = reg(RegisterBank::Immediate, 1, 1, DataType::Int32);
    inst.src2 = reg(RegisterBank::Immediate, 0, 2, DataType::Int32);

    // 1 * 4 + 0 + 4 = 8; nothing is fetched at run time.
    let out = execute(&info, &[inst], |_| {}, |m| {
        assert!(m.memory(MemorySpace::Literal).is_empty());
        m.get_f32("r4").unwrap()
    });
    assert_eq!(&out[..2], &[2.5, 3.5]);
}

#[test]
fn stores_write_words_into_the_aliased_buffer() {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.buffer_aliases.scratch = Some(4);

    let mut inst = load_store(Opcode::Str, 2, true);
    inst.dest = temp(0, 3);
    inst.src0 = reg(RegisterBank::SecAttr, 4, 0, DataType::UInt32);
    inst.src1 = reg(RegisterBank::Immediate, 1, 1, DataType::Int32);
    inst.src2 = reg(RegisterBank::Immediate, 0, 2, DataType::Int32);

    let memory = execute(
        &info,
        &[inst.clone()],
        |m| m.set_f32("r0", &[6.0, 8.0, 0.0, 0.0]).unwrap(),
        |m| m.memory(MemorySpace::Scratch).to_vec(),
    );
    assert_eq!(memory, memory_words(&[0.0, 6.0, 8.0]));

    inst.predicate = ExtPredicate::P0;
    let err = translate_err(&inst);
    assert!(matches!(err, TranslateError::Unsupported { .. }), "{err}");
}

fn test_inst(opcode: Opcode, alu: TestAlu, compare: TestCompare, mask_type: Option<DataType>) -> Instruction {
    let mut inst = Instruction::new(opcode);
    inst.src1 = temp(0, 1);
    inst.src2 = temp(4, 2);
    inst.detail = InstructionDetail::Test {
        alu,
        compare,
        mask_type,
    };
    inst
}

#[test]
fn vtst_writes_a_predicate() {
    let mut inst = test_inst(Opcode::Vtst, TestAlu::Sub, TestCompare::Greater, None);
    inst.dest = reg(RegisterBank::Predicate, 0, 3, DataType::F32);
    inst.source_mask = 0b0001;

    let taken = run(&[inst.clone()], &[("r0", splat(3.0)), ("r4", splat(2.0))], "p0");
    assert_eq!(taken, vec![1]);
    let not_taken = run(&[inst], &[("r0", splat(2.0)), ("r4", splat(2.0))], "p0");
    assert_eq!(not_taken, vec![0]);

    // Other ALUs compare their result against zero.
    let mut sum = test_inst(Opcode::Vtst, TestAlu::Add, TestCompare::Equal, None);
    sum.dest = reg(RegisterBank::Predicate, 1, 3, DataType::F32);
    sum.source_mask = 0b0001;
    let zero = run(&[sum], &[("r0", splat(-2.5)), ("r4", splat(2.5))], "p1");
    assert_eq!(zero, vec![1]);
}

#[test]
fn vtstmsk_writes_per_component_masks() {
    let seeds = [
        ("r0", floats([1.0, 5.0, 3.0, 0.0])),
        ("r4", floats([2.0, 2.0, 3.0, 1.0])),
    ];

    let mut inst = test_inst(Opcode::Vtstmsk, TestAlu::Sub, TestCompare::Less, None);
    inst.dest = temp(8, 3);
    let out = run(&[inst], &seeds, "r8");
    assert_eq!(out, floats([1.0, 0.0, 0.0, 1.0]).to_vec());

    let mut inst = test_inst(
        Opcode::Vtstmsk,
        TestAlu::Sub,
        TestCompare::Less,
        Some(DataType::UInt8),
    );
    inst.dest = bytes(8, 3);
    let out = run(&[inst], &seeds, "r8");
    assert_eq!(out[0].to_le_bytes(), [0xFF, 0, 0, 0xFF]);
}

#[test]
fn external_repeats_advance_whole_registers() {
    let mut inst = Instruction::new(Opcode::Vadd);
    inst.dest = temp(16, 3);
    inst.src1 = temp(0, 1);
    inst.src2 = temp(8, 2);
    inst.repeat_count = 1;
    inst.repeat_mode = RepeatMode::External;

    let seeds = [
        ("r0", splat(1.0)),
        ("r4", splat(2.0)),
        ("r8", splat(10.0)),
        ("r12", splat(20.0)),
    ];
    assert_eq!(run(&[inst.clone()], &seeds, "r16"), splat(11.0).to_vec());
    assert_eq!(run(&[inst], &seeds, "r20"), splat(22.0).to_vec());
}

#[test]
fn predicated_moves_keep_old_values_where_false() {
    let mut inst = Instruction::new(Opcode::Vmov);
    inst.dest = temp(0, 3);
    inst.src1 = temp(4, 1);
    inst.predicate = ExtPredicate::P0;

    let info = ProgramInfo::new(ShaderStage::Fragment);
    let with_p0 = |inst: &Instruction, p0: u32| {
        execute(
            &info,
            std::slice::from_ref(inst),
            |m| {
                m.set_f32("r0", &[-1.0; 4]).unwrap();
                m.set_f32("r4", &[5.0; 4]).unwrap();
                m.set_bits("p0", &[p0]).unwrap();
            },
            |m| m.get_f32("r0").unwrap(),
        )
    };

    assert_eq!(with_p0(&inst, 0), vec![-1.0; 4]);
    assert_eq!(with_p0(&inst, 1), vec![5.0; 4]);

    inst.predicate = ExtPredicate::NegP0;
    assert_eq!(with_p0(&inst, 1), vec![-1.0; 4]);
    assert_eq!(with_p0(&inst, 0), vec![5.0; 4]);
}

#[test]
fn unbacked_secondary_attributes_act_as_scratch_registers() {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.secondary_reg_count = 8;

    let mut write = Instruction::new(Opcode::Vmov);
    write.dest = reg(RegisterBank::SecAttr, 8, 3, DataType::F32);
    write.src1 = temp(0, 1);
    let mut read = Instruction::new(Opcode::Vmov);
    read.dest = temp(4, 3);
    read.src1 = reg(RegisterBank::SecAttr, 8, 1, DataType::F32);

    let (shadow, back) = execute(
        &info,
        &[write, read],
        |m| m.set_f32("r0", &[3.0; 4]).unwrap(),
        |m| (m.get_f32("sa8_shadow").unwrap(), m.get_f32("r4").unwrap()),
    );
    assert_eq!(shadow, vec![3.0; 4]);
    assert_eq!(back, vec![3.0; 4]);
}

#[test]
fn dot_products_fill_the_write_mask() {
    let mut inst = Instruction::new(Opcode::Vdp);
    inst.dest = temp(8, 3);
    inst.src1 = temp(0, 1);
    inst.src2 = temp(4, 2);
    inst.dest_mask = 0b0101;

    let seeds = [
        ("r0", floats([1.0, 2.0, 3.0, 4.0])),
        ("r4", splat(1.0)),
        ("r8", splat(-1.0)),
    ];
    let out = run(&[inst.clone()], &seeds, "r8");
    assert_eq!(out, floats([10.0, -1.0, 10.0, -1.0]).to_vec());

    // A rotating mask writes the next channel on each repeat.
    inst.dest_mask = 0b0001;
    inst.repeat_count = 1;
    inst.repeat_mode = RepeatMode::Internal;
    inst.detail = InstructionDetail::Dot { rotate_mask: true };
    let out = run(&[inst], &seeds, "r8");
    assert_eq!(out, floats([10.0, 10.0, -1.0, -1.0]).to_vec());
}
