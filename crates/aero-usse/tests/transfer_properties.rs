use aero_usse::backend::interp::{Interpreter, Machine, Program};
use aero_usse::ir::{HalfEncoding, IrType, Scalar, StorageClass};
use aero_usse::resolve::Resolver;
use aero_usse::translate::Translator;
use aero_usse::types::{
    mask_bits, DataType, Operand, RegisterBank, SwizzleChannel, SWIZZLE_XYZW,
};
use aero_usse::{Backend, ConstantTables, ProgramInfo, ShaderStage, TranslateContext};

fn temp(num: u32, ty: DataType) -> Operand {
    Operand::new(RegisterBank::Temp, num, ty)
}

fn finish(t: Translator<'_, Interpreter>) -> Program {
    t.into_backend().finish()
}

#[test]
fn swizzle_bridges_two_attribute_registers() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();

    let mut backend = Interpreter::new();
    let mut resolver = Resolver::new();
    let a = backend.declare("a", IrType::vector(Scalar::F32, 2), StorageClass::Input { location: 0 });
    let b = backend.declare("b", IrType::vector(Scalar::F32, 2), StorageClass::Input { location: 1 });
    resolver.bind(RegisterBank::PrimAttr, 0, a, 2);
    resolver.bind(RegisterBank::PrimAttr, 2, b, 2);

    let mut t = Translator::with_resolver(backend, resolver, TranslateContext::new(&info, &tables));
    let mut src = Operand::new(RegisterBank::PrimAttr, 0, DataType::F32);
    src.swizzle = [
        SwizzleChannel::Y,
        SwizzleChannel::Z,
        SwizzleChannel::Y,
        SwizzleChannel::X,
    ];
    let value = t.emit.load(&src, 0b1111, 0).unwrap();
    t.emit.store(&temp(0, DataType::F32), &value, 0b1111, 0, None).unwrap();

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_f32("a", &[10.0, 20.0]).unwrap();
    m.set_f32("b", &[30.0, 40.0]).unwrap();
    m.run();
    assert_eq!(m.get_f32("r0").unwrap(), vec![20.0, 30.0, 20.0, 10.0]);
}

#[test]
fn identity_bridge_returns_its_input() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));

    let direct = t.emit.load(&temp(0, DataType::F32), 0b1111, 0).unwrap();
    let bridged = t.emit.bridge(&direct, &direct, &SWIZZLE_XYZW, 0, 0b1111);
    assert_eq!(bridged, direct);
}

#[test]
fn every_swizzle_and_mask_moves_the_selected_channels() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let source = [1.0f32, 2.0, 3.0, 4.0];

    for code in 0..256u32 {
        let swizzle = [0, 2, 4, 6].map(|shift| SwizzleChannel::from_index((code >> shift) & 3));
        for mask in 1..16u32 {
            let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));
            let mut src = temp(0, DataType::F32);
            src.swizzle = swizzle;
            let value = t.emit.load(&src, mask, 0).unwrap();
            t.emit.store(&temp(4, DataType::F32), &value, mask, 0, None).unwrap();

            let program = finish(t);
            let mut m = Machine::new(&program);
            m.set_f32("r0", &source).unwrap();
            m.set_f32("r4", &[-1.0; 4]).unwrap();
            m.run();

            let mut expected = [-1.0f32; 4];
            for i in mask_bits(mask) {
                let c = swizzle[i as usize].storage_index().unwrap();
                expected[i as usize] = source[c as usize];
            }
            assert_eq!(
                m.get_f32("r4").unwrap(),
                expected.to_vec(),
                "swizzle {swizzle:?} mask {mask:04b}"
            );
        }
    }
}

#[test]
fn empty_mask_store_writes_nothing() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut t = Translator::new(Interpreter::new(), TranslateContext::new(&info, &tables));

    let value = t.emit.literal(Scalar::F32, 7.0, 4);
    t.emit.store(&temp(4, DataType::F32), &value, 0, 0, None).unwrap();

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_f32("r4", &[-1.0; 4]).unwrap();
    m.run();
    assert_eq!(m.get_f32("r4").unwrap(), vec![-1.0; 4]);
}

fn half_round_trip(encoding: HalfEncoding, input: [f32; 4]) -> Vec<f32> {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut ctx = TranslateContext::new(&info, &tables);
    ctx.options.f16_encoding = encoding;
    let mut t = Translator::new(Interpreter::new(), ctx);

    let src = t.emit.load(&temp(8, DataType::F32), 0b1111, 0).unwrap();
    t.emit.store(&temp(0, DataType::F16), &src, 0b1111, 0, None).unwrap();
    let back = t.emit.load(&temp(0, DataType::F16), 0b1111, 0).unwrap();
    t.emit.store(&temp(4, DataType::F32), &back, 0b1111, 0, None).unwrap();

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_f32("r8", &input).unwrap();
    m.run();
    m.get_f32("r4").unwrap()
}

#[test]
fn unorm16_halves_round_trip_within_one_step() {
    let input = [0.0, 0.25, 0.7, 1.0];
    let output = half_round_trip(HalfEncoding::Unorm16, input);
    for (got, want) in output.iter().zip(input) {
        assert!((got - want).abs() <= 1.0 / 65535.0, "{got} vs {want}");
    }
}

#[test]
fn ieee_halves_round_trip_exactly() {
    let input = [-2.5, 0.125, 1024.0, 3.0];
    assert_eq!(half_round_trip(HalfEncoding::Ieee, input), input.to_vec());
}

#[test]
fn first_attribute_write_creates_one_shadow() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();

    let mut backend = Interpreter::new();
    let mut resolver = Resolver::new();
    let attr = backend.declare("attr", IrType::VEC4, StorageClass::Input { location: 0 });
    resolver.bind(RegisterBank::PrimAttr, 0, attr, 4);
    let mut t = Translator::with_resolver(backend, resolver, TranslateContext::new(&info, &tables));
    let dest = Operand::new(RegisterBank::PrimAttr, 0, DataType::F32);

    let before = t.emit.resolver.shadow_count();
    let nine = t.emit.literal(Scalar::F32, 9.0, 1);
    t.emit.store(&dest, &nine, 0b0001, 0, None).unwrap();
    assert_eq!(t.emit.resolver.shadow_count(), before + 1);

    let emit = &mut t.emit;
    let first = emit
        .resolver
        .resolve(&mut emit.backend, RegisterBank::PrimAttr, 0, 0, true)
        .unwrap();
    assert_ne!(first.reg.place, attr);

    let five = t.emit.literal(Scalar::F32, 5.0, 1);
    t.emit.store(&dest, &five, 0b0010, 0, None).unwrap();
    assert_eq!(t.emit.resolver.shadow_count(), before + 1);
    let emit = &mut t.emit;
    let second = emit
        .resolver
        .resolve(&mut emit.backend, RegisterBank::PrimAttr, 0, 1, false)
        .unwrap();
    assert_eq!(second.reg.place, first.reg.place);
    assert_eq!(second.offset, 1);

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_f32("attr", &[1.0, 2.0, 3.0, 4.0]).unwrap();
    m.run();
    assert_eq!(m.get_f32("attr").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(m.get_f32("pa0_shadow").unwrap(), vec![9.0, 5.0, 3.0, 4.0]);
}

fn ieee_pair(lo: f32, hi: f32) -> u32 {
    let half = |v: f32| u32::from(half::f16::from_f32(v).to_bits());
    half(lo) | (half(hi) << 16)
}

/// Loads r0 as four IEEE halves through `swizzle` and `mask`, landing them in r4 as floats.
fn swizzled_half_load(swizzle: [SwizzleChannel; 4], mask: u32) -> Vec<f32> {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut ctx = TranslateContext::new(&info, &tables);
    ctx.options.f16_encoding = HalfEncoding::Ieee;
    let mut t = Translator::new(Interpreter::new(), ctx);

    let mut src = temp(0, DataType::F16);
    src.swizzle = swizzle;
    let value = t.emit.load(&src, mask, 0).unwrap();
    t.emit.store(&temp(4, DataType::F32), &value, mask, 0, None).unwrap();

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_bits("r0", &[ieee_pair(1.0, 2.0), ieee_pair(3.0, 4.0)]).unwrap();
    m.set_f32("r4", &[-1.0; 4]).unwrap();
    m.run();
    m.get_f32("r4").unwrap()
}

#[test]
fn half_swizzle_crosses_packed_lanes() {
    use SwizzleChannel::{W, X, Y, Z};
    assert_eq!(swizzled_half_load([Y, Z, X, W], 0b1111), vec![2.0, 3.0, 1.0, 4.0]);
}

#[test]
fn half_swizzle_starting_in_the_upper_pair() {
    use SwizzleChannel::{W, X, Z};
    assert_eq!(swizzled_half_load([Z, W, X, X], 0b0011), vec![3.0, 4.0, -1.0, -1.0]);
}

#[test]
fn partial_half_store_keeps_neighbouring_halves() {
    let info = ProgramInfo::new(ShaderStage::Fragment);
    let tables = ConstantTables::default();
    let mut ctx = TranslateContext::new(&info, &tables);
    ctx.options.f16_encoding = HalfEncoding::Ieee;
    let mut t = Translator::new(Interpreter::new(), ctx);

    let value = t.emit.load(&temp(8, DataType::F32), 0b0110, 0).unwrap();
    t.emit.store(&temp(0, DataType::F16), &value, 0b0110, 0, None).unwrap();

    let program = finish(t);
    let mut m = Machine::new(&program);
    m.set_bits("r0", &[ieee_pair(1.0, 2.0), ieee_pair(3.0, 4.0)]).unwrap();
    m.set_f32("r8", &[10.0, 5.0, 6.0, 20.0]).unwrap();
    m.run();

    let packed = m.get_bits("r0").unwrap();
    assert_eq!(packed[0], ieee_pair(1.0, 5.0));
    assert_eq!(packed[1], ieee_pair(6.0, 4.0));
}

#[test]
fn default_half_bits_differ_from_ieee() {
    let stored_bits = |encoding: Option<HalfEncoding>| {
        let info = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let mut ctx = TranslateContext::new(&info, &tables);
        if let Some(encoding) = encoding {
            ctx.options.f16_encoding = encoding;
        }
        let mut t = Translator::new(Interpreter::new(), ctx);
        let one = t.emit.literal(Scalar::F32, 1.0, 2);
        t.emit.store(&temp(0, DataType::F16), &one, 0b0011, 0, None).unwrap();

        let program = finish(t);
        let mut m = Machine::new(&program);
        m.run();
        m.get_bits("r0").unwrap()[0]
    };

    assert_eq!(stored_bits(None), 0xFFFF_FFFF);
    assert_eq!(stored_bits(Some(HalfEncoding::Ieee)), ieee_pair(1.0, 1.0));
}
