use aero_usse::backend::glsl::GlslBackend;
use aero_usse::backend::interp::{Interpreter, Machine};
use aero_usse::decode::helpers::encode;
use aero_usse::decode::{decode, layouts, InstructionDetail};
use aero_usse::program::{InputBinding, InputSemantic};
use aero_usse::types::{DataType, RegisterBank};
use aero_usse::{
    translate_program, ConstantTables, ProgramInfo, ShaderStage, TranslateContext, TranslateError,
};
use pretty_assertions::assert_eq;

// LIMM: 32-bit value split over y (bits 26..31), x (21..25) and z (0..20).
fn limm(dest: u64, value: u32) -> u64 {
    let value = u64::from(value);
    encode(
        layouts::LIMM,
        &[
            ('t', dest),
            ('y', value >> 26),
            ('x', (value >> 21) & 0x1F),
            ('z', value & 0x1F_FFFF),
        ],
    )
}

// VMAD, vec4 form: dest = gpi[src0] * src1 + gpi[src2]. `src1` is the raw (halved) register field;
// 61 addresses GPI1 through the internal-register window at the top of the temporaries.
fn vmad_gpi(src0: u64, src1: u64, src2: u64) -> u64 {
    encode(
        layouts::VMAD,
        &[
            ('o', 1),
            ('w', 0b1111),
            ('l', src0),
            ('B', src1),
            ('v', src2),
            // .xyzw on every source.
            ('A', 4),
            ('q', 4),
            ('u', 4),
        ],
    )
}

// VPCK U8 <- F32 with scaling, reading two register pairs starting at temp 4.
fn vpck_u8_f32_scaled() -> u64 {
    encode(
        layouts::VPCK,
        &[
            ('t', 0),
            ('f', 6),
            ('h', 1),
            ('m', 0b1111),
            ('g', 0),
            ('q', 2),
            ('w', 3),
            ('i', 1),
            ('j', 2),
            ('o', 3),
        ],
    )
}

// 0b11010 in the top bits is not assigned to any family.
const UNKNOWN_WORD: u64 = 0b11010 << 59;

fn fragment_program(primary: Vec<u64>) -> ProgramInfo {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.primary = primary;
    info
}

#[test]
fn limm_loads_float_bits_into_temp() {
    let word = limm(0, 0x3F80_0000);
    let inst = decode(word, false).unwrap();
    assert_eq!(inst.dest.bank, RegisterBank::Temp);
    assert_eq!(inst.dest.num, 0);
    assert_eq!(inst.dest_mask, 0b1);
    assert_eq!(
        inst.detail,
        InstructionDetail::LoadImmediate { value: 0x3F80_0000 }
    );

    let info = fragment_program(vec![word]);
    let tables = ConstantTables::default();
    let translated =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap();

    let mut m = Machine::new(&translated.output);
    m.run();
    let r0 = m.get_f32("r0").unwrap();
    assert_eq!(r0[0], 1.0);
}

#[test]
fn vmad_of_internal_registers() {
    let info = fragment_program(vec![vmad_gpi(0, 61, 2)]);
    let tables = ConstantTables::default();
    let translated =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap();

    let mut m = Machine::new(&translated.output);
    m.set_f32("i0", &[1.0; 4]).unwrap();
    m.set_f32("i4", &[2.0; 4]).unwrap();
    m.set_f32("i8", &[3.0; 4]).unwrap();
    m.run();
    assert_eq!(m.get_f32("r0").unwrap(), vec![5.0; 4]);
    // The color epilogue reads pa0, which the program never wrote.
    assert_eq!(m.get_f32("out_color").unwrap(), vec![0.0; 4]);
}

#[test]
fn vpck_scales_floats_into_bytes() {
    let word = vpck_u8_f32_scaled();
    let inst = decode(word, false).unwrap();
    assert_eq!(inst.src1.num, 4);
    assert_eq!(inst.src2.num, 6);
    assert_eq!(inst.dest.ty, DataType::UInt8);

    let info = fragment_program(vec![word]);
    let tables = ConstantTables::default();
    let translated =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap();

    let mut m = Machine::new(&translated.output);
    m.set_f32("r4", &[0.0, 0.2, 0.6, 1.0]).unwrap();
    m.run();
    let packed = m.get_bits("r0").unwrap()[0];
    assert_eq!(packed.to_le_bytes(), [0, 51, 153, 255]);
}

#[test]
fn unknown_word_fails_the_whole_program() {
    let info = fragment_program(vec![limm(0, 0x3F80_0000), UNKNOWN_WORD]);
    let tables = ConstantTables::default();

    let err = translate_program(
        GlslBackend::new(ShaderStage::Fragment),
        TranslateContext::new(&info, &tables),
    )
    .unwrap_err();
    match err {
        TranslateError::Decode(e) => assert_eq!(e.word, UNKNOWN_WORD),
        other => panic!("expected a decode error, got {other}"),
    }

    let err =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap_err();
    assert!(matches!(err, TranslateError::Decode(_)), "{err}");
}

#[test]
fn secondary_program_runs_before_primary() {
    // Secondary-program registers all alias the secondary attributes, so this writes sa0.
    let mut info = fragment_program(vec![limm(0, 0)]);
    info.secondary = vec![limm(0, 0x4040_0000)];
    let tables = ConstantTables::default();
    let translated =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap();
    assert!(translated.output.has_variable("sa0_shadow"));

    let mut m = Machine::new(&translated.output);
    m.run();
    assert_eq!(m.get_f32("sa0_shadow").unwrap()[0], 3.0);
}

#[test]
fn vertex_index_reaches_primary_attributes() {
    let mut info = ProgramInfo::new(ShaderStage::Vertex);
    info.inputs = vec![
        InputBinding {
            location: 0,
            reg: 0,
            components: 4,
            semantic: InputSemantic::Generic,
        },
        InputBinding {
            location: 1,
            reg: 4,
            components: 1,
            semantic: InputSemantic::VertexIndex,
        },
    ];
    let tables = ConstantTables::default();
    let translated =
        translate_program(Interpreter::new(), TranslateContext::new(&info, &tables)).unwrap();

    let mut m = Machine::new(&translated.output);
    m.set_bits("vertex_index", &[7]).unwrap();
    m.set_f32("in0", &[1.0, 2.0, 3.0, 4.0]).unwrap();
    m.run();
    assert_eq!(m.get_bits("pa4_shadow").unwrap()[0], 7);
    // Nothing enabled a position, so it is written as zero.
    assert_eq!(m.get_f32("position").unwrap(), vec![0.0; 4]);
}
