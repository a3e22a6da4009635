use aero_usse::backend::glsl::GlslBackend;
use aero_usse::backend::spirv::SpirvBackend;
use aero_usse::decode::helpers::encode;
use aero_usse::decode::layouts;
use aero_usse::program::{
    InputBinding, InputSemantic, LiteralConstant, SamplerInfo, UniformBuffer, VertexOutputFlags,
};
use aero_usse::{translate_program, ConstantTables, ProgramInfo, ShaderStage, TranslateContext};

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

fn vmad_gpi() -> u64 {
    encode(
        layouts::VMAD,
        &[
            ('o', 1),
            ('w', 0b1111),
            ('l', 0),
            ('B', 61),
            ('v', 2),
            ('A', 4),
            ('q', 4),
            ('u', 4),
        ],
    )
}

fn fragment_program() -> ProgramInfo {
    let mut info = ProgramInfo::new(ShaderStage::Fragment);
    info.primary = vec![limm(0, 0x3F80_0000), vmad_gpi()];
    info.uniform_buffers = vec![UniformBuffer {
        index: 0,
        size: 64,
        reg_start_offset: 16,
        base_register: Some(8),
        base_address: 0x100,
    }];
    info.literals = vec![LiteralConstant { reg: 4, offset: 0 }];
    info.literal_buffer = 2.5f32.to_le_bytes().to_vec();
    info.samplers = vec![SamplerInfo {
        index: 0,
        name: "tex".to_owned(),
        cube: false,
        reg_offset: 12,
    }];
    info
}

fn vertex_program() -> ProgramInfo {
    let mut info = ProgramInfo::new(ShaderStage::Vertex);
    info.inputs = vec![InputBinding {
        location: 0,
        reg: 0,
        components: 4,
        semantic: InputSemantic::Generic,
    }];
    info.vertex_outputs.enabled = VertexOutputFlags::POSITION | VertexOutputFlags::TEXCOORD0;
    info.vertex_outputs.texcoord_components[0] = 2;
    info
}

fn validate_spirv(bytes: &[u8]) {
    let module = naga::front::spv::parse_u8_slice(bytes, &naga::front::spv::Options::default())
        .unwrap_or_else(|e| panic!("SPIR-V did not parse: {e:?}"));
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|e| panic!("SPIR-V did not validate: {e:?}"));
}

#[test]
fn fragment_spirv_parses_and_validates() {
    let info = fragment_program();
    let tables = ConstantTables::default();
    let translated = translate_program(
        SpirvBackend::new(ShaderStage::Fragment),
        TranslateContext::new(&info, &tables),
    )
    .unwrap();
    validate_spirv(translated.bytes());
    assert_eq!(translated.samplers.get(&12).map(|s| s.name.as_str()), Some("tex"));
    assert!(translated.vertex_outputs.is_empty());
}

#[test]
fn vertex_spirv_parses_and_validates() {
    let info = vertex_program();
    let tables = ConstantTables::default();
    let mut ctx = TranslateContext::new(&info, &tables);
    ctx.options.viewport_flip = true;
    let translated = translate_program(SpirvBackend::new(ShaderStage::Vertex), ctx).unwrap();
    validate_spirv(translated.bytes());
    assert_eq!(
        translated.vertex_outputs,
        VertexOutputFlags::POSITION | VertexOutputFlags::TEXCOORD0
    );
}

#[test]
fn glsl_has_entry_and_helper_functions() {
    let info = fragment_program();
    let tables = ConstantTables::default();
    let translated = translate_program(
        GlslBackend::new(ShaderStage::Fragment),
        TranslateContext::new(&info, &tables),
    )
    .unwrap();
    let text = translated.output;
    assert!(text.starts_with("#version 450"), "{text}");
    assert!(text.contains("void main()"), "{text}");
    assert!(text.contains("void init()"), "{text}");
    assert!(text.contains("uniform ubo0_block"), "{text}");
    assert!(text.contains("out_color"), "{text}");
}

#[test]
fn glsl_vertex_writes_position() {
    let info = vertex_program();
    let tables = ConstantTables::default();
    let translated = translate_program(
        GlslBackend::new(ShaderStage::Vertex),
        TranslateContext::new(&info, &tables),
    )
    .unwrap();
    let text = translated.output;
    assert!(text.contains("gl_Position"), "{text}");
    assert!(text.contains("layout(location = 0) in vec4 in0"), "{text}");
}

#[test]
fn hashes_follow_content() {
    let tables = ConstantTables::default();
    let info = fragment_program();
    let hash = |info: &ProgramInfo| {
        translate_program(
            SpirvBackend::new(ShaderStage::Fragment),
            TranslateContext::new(info, &tables),
        )
        .unwrap()
        .hash()
    };

    assert_eq!(hash(&info), hash(&info));

    let mut other = info.clone();
    other.primary[0] = limm(0, 0x4000_0000);
    assert_ne!(hash(&info), hash(&other));
}
