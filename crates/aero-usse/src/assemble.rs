//! Program assembler: turns one [`ProgramInfo`] into a finished shader module.
//!
//! The layout of every generated module is the same:
//!
//! * host inputs, uniform blocks and the register files are declared up front;
//! * an `init` function copies builtins, literal constants and buffer base addresses into the
//!   registers that expose them;
//! * the secondary program (uniform setup code) becomes a function of its own, run once before the
//!   primary program;
//! * the entry point calls both, runs the primary program and finally copies the color or vertex
//!   outputs out of the register file.

use std::collections::BTreeMap;

use tracing::{debug, error, info};

use crate::error::TranslateError;
use crate::ir::{
    Backend, BinaryOp, BuiltinVariable, Constant, IrType, Scalar, ShaderStage, StorageClass,
    UnaryOp,
};
use crate::program::{InputSemantic, ProgramInfo, SamplerInfo, TranslateContext, VertexOutputFlags};
use crate::resolve::Resolver;
use crate::translate::Translator;
use crate::types::{DataType, Operand, RegisterBank};

/// A backend artifact that can be hashed and handed to a driver as bytes.
pub trait Artifact {
    fn as_bytes(&self) -> &[u8];
}

impl Artifact for Vec<u32> {
    fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl Artifact for String {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }
}

#[derive(Debug, Clone)]
pub struct TranslatedProgram<O> {
    pub stage: ShaderStage,
    pub output: O,
    /// Samplers keyed by the secondary-attribute offset their state is read from.
    pub samplers: BTreeMap<u32, SamplerInfo>,
    /// Vertex outputs the module writes. Always empty for fragment programs.
    pub vertex_outputs: VertexOutputFlags,
}

impl<O: Artifact> TranslatedProgram<O> {
    pub fn bytes(&self) -> &[u8] {
        self.output.as_bytes()
    }

    /// Content hash of the artifact, suitable as a cache key.
    pub fn hash(&self) -> blake3::Hash {
        blake3::hash(self.bytes())
    }
}

struct VertexOutput {
    flag: VertexOutputFlags,
    name: &'static str,
    /// Output-bank lanes the value occupies.
    lanes: u32,
}

fn vertex_output_table(program: &ProgramInfo) -> Vec<VertexOutput> {
    let mut table = vec![
        VertexOutput {
            flag: VertexOutputFlags::POSITION,
            name: "position",
            lanes: 4,
        },
        VertexOutput {
            flag: VertexOutputFlags::COLOR0,
            name: "v_color0",
            lanes: 4,
        },
        VertexOutput {
            flag: VertexOutputFlags::COLOR1,
            name: "v_color1",
            lanes: 4,
        },
        VertexOutput {
            flag: VertexOutputFlags::FOG,
            name: "v_fog",
            lanes: 2,
        },
    ];
    const TEXCOORD_NAMES: [&str; 10] = [
        "v_texcoord0",
        "v_texcoord1",
        "v_texcoord2",
        "v_texcoord3",
        "v_texcoord4",
        "v_texcoord5",
        "v_texcoord6",
        "v_texcoord7",
        "v_texcoord8",
        "v_texcoord9",
    ];
    for (i, name) in TEXCOORD_NAMES.into_iter().enumerate() {
        let hint = u32::from(program.vertex_outputs.texcoord_components[i]);
        table.push(VertexOutput {
            flag: VertexOutputFlags::from_bits_retain(VertexOutputFlags::TEXCOORD0.bits() << i),
            name,
            lanes: if hint == 0 { 4 } else { hint.min(4) },
        });
    }
    table
}

/// Builtin inputs copied into primary-attribute lanes by `init`.
struct BuiltinCopy<P> {
    place: P,
    reg: u32,
}

/// Translates `ctx.program` with `backend`.
///
/// Fails on the first instruction or metadata entry that cannot be translated; nothing is
/// produced in that case.
pub fn translate_program<B: Backend>(
    mut backend: B,
    ctx: TranslateContext<'_>,
) -> Result<TranslatedProgram<B::Output>, TranslateError> {
    let program = ctx.program;
    info!(
        stage = ?program.stage,
        primary = program.primary.len(),
        secondary = program.secondary.len(),
        "translating USSE program"
    );

    let mut resolver = Resolver::new();
    let builtins = bind_inputs(&mut backend, &mut resolver, program)?;
    bind_uniform_buffers(&mut backend, &mut resolver, program);

    let last_color = (program.stage == ShaderStage::Fragment && ctx.features.direct_fragcolor)
        .then(|| {
            let location = program
                .inputs
                .iter()
                .map(|input| input.location + 1)
                .max()
                .unwrap_or(0);
            backend.declare("last_color", IrType::VEC4, StorageClass::Input { location })
        });

    let mut translator = Translator::with_resolver(backend, resolver, ctx);

    let init = translator.backend_mut().begin_function("init");
    emit_init(&mut translator, &builtins)?;
    translator.backend_mut().end_function();

    let secondary = if program.secondary.is_empty() {
        None
    } else {
        let function = translator.backend_mut().begin_function("secondary");
        translator
            .translate_stream(&program.secondary, true)
            .inspect_err(|err| error!(%err, "secondary program translation failed"))?;
        translator.backend_mut().end_function();
        Some(function)
    };

    translator.backend_mut().begin_entry();
    translator.backend_mut().call_function(&init);
    if let Some(place) = &last_color {
        seed_color(&mut translator, place)?;
    }
    if let Some(function) = &secondary {
        translator.backend_mut().call_function(function);
    }
    translator
        .translate_stream(&program.primary, false)
        .inspect_err(|err| error!(%err, "primary program translation failed"))?;

    let vertex_outputs = match program.stage {
        ShaderStage::Fragment => {
            emit_fragment_epilogue(&mut translator)?;
            VertexOutputFlags::empty()
        }
        ShaderStage::Vertex => emit_vertex_epilogue(&mut translator)?,
    };

    let samplers = program
        .samplers
        .iter()
        .map(|s| (s.reg_offset, s.clone()))
        .collect();
    debug!(shadows = translator.emit.resolver.shadow_count(), "program assembled");

    Ok(TranslatedProgram {
        stage: program.stage,
        output: translator.into_backend().finish(),
        samplers,
        vertex_outputs,
    })
}

fn bind_inputs<B: Backend>(
    backend: &mut B,
    resolver: &mut Resolver<B>,
    program: &ProgramInfo,
) -> Result<Vec<BuiltinCopy<B::Place>>, TranslateError> {
    let mut builtins = Vec::new();
    for input in &program.inputs {
        match input.semantic {
            InputSemantic::Generic => {
                if !(1..=4).contains(&input.components) {
                    return Err(TranslateError::metadata(format!(
                        "input at location {} has {} components",
                        input.location, input.components
                    )));
                }
                let name = format!("in{}", input.location);
                let ty = IrType::vector(Scalar::F32, input.components);
                let place = backend.declare(
                    &name,
                    ty,
                    StorageClass::Input {
                        location: input.location,
                    },
                );
                resolver.bind(RegisterBank::PrimAttr, input.reg, place, input.components);
            }
            InputSemantic::VertexIndex | InputSemantic::InstanceIndex => {
                let (name, builtin) = if input.semantic == InputSemantic::VertexIndex {
                    ("vertex_index", BuiltinVariable::VertexIndex)
                } else {
                    ("instance_index", BuiltinVariable::InstanceIndex)
                };
                let place = backend.declare(name, IrType::I32, StorageClass::BuiltinInput(builtin));
                builtins.push(BuiltinCopy {
                    place,
                    reg: input.reg,
                });
            }
        }
    }
    Ok(builtins)
}

fn bind_uniform_buffers<B: Backend>(backend: &mut B, resolver: &mut Resolver<B>, program: &ProgramInfo) {
    for buffer in &program.uniform_buffers {
        let len = buffer.size.div_ceil(16);
        if len == 0 {
            continue;
        }
        let place = backend.declare(
            &format!("ubo{}", buffer.index),
            IrType::VEC4,
            StorageClass::UniformArray {
                binding: buffer.index,
                len,
            },
        );
        debug!(index = buffer.index, len, start = buffer.reg_start_offset, "aliasing uniform buffer");
        resolver.bind_array(RegisterBank::SecAttr, buffer.reg_start_offset, place, len);
    }
}

fn emit_init<B: Backend>(
    translator: &mut Translator<'_, B>,
    builtins: &[BuiltinCopy<B::Place>],
) -> Result<(), TranslateError> {
    let program = translator.emit.ctx.program;
    for copy in builtins {
        let value = translator.emit.backend.load(&copy.place);
        let dest = Operand::new(RegisterBank::PrimAttr, copy.reg, DataType::Int32);
        translator.emit.store(&dest, &value, 0b0001, 0, None)?;
    }
    for literal in &program.literals {
        let value = program.literal_f32(literal.offset)?;
        let value = translator.emit.backend.f32(value);
        let dest = Operand::new(RegisterBank::SecAttr, literal.reg, DataType::F32);
        translator.emit.store(&dest, &value, 0b0001, 0, None)?;
    }
    for buffer in &program.uniform_buffers {
        if let Some(reg) = buffer.base_register {
            let value = translator.emit.backend.u32(buffer.base_address);
            let dest = Operand::new(RegisterBank::SecAttr, reg, DataType::UInt32);
            translator.emit.store(&dest, &value, 0b0001, 0, None)?;
        }
    }
    Ok(())
}

/// Register holding the fragment color, with its element type.
fn color_register(translator: &Translator<'_, impl Backend>) -> Operand {
    let fragment = translator.emit.ctx.program.fragment;
    let bank = if fragment.native_color {
        RegisterBank::Output
    } else {
        RegisterBank::PrimAttr
    };
    Operand::new(bank, fragment.output_start, fragment.output_type)
}

/// Preloads the color register with the framebuffer contents.
fn seed_color<B: Backend>(translator: &mut Translator<'_, B>, place: &B::Place) -> Result<(), TranslateError> {
    let dest = color_register(translator);
    let color = translator.emit.backend.load(place);
    let color = if dest.ty.is_float() {
        color
    } else {
        translator.emit.to_int(&color, dest.ty, true)
    };
    translator.emit.store(&dest, &color, 0b1111, 0, None)
}

fn emit_fragment_epilogue<B: Backend>(translator: &mut Translator<'_, B>) -> Result<(), TranslateError> {
    let src = color_register(translator);
    let color = translator.emit.load(&src, 0b1111, 0)?;
    let native = translator.emit.ctx.features.native_output_color;
    let color = if src.ty.is_float() || native {
        color
    } else {
        translator.emit.to_float(&color, src.ty, true)
    };
    let ty = translator.emit.type_of(&color);
    let out = translator
        .emit
        .backend
        .declare("out_color", ty, StorageClass::Output { location: 0 });
    translator.emit.backend.store(&out, &color);
    Ok(())
}

/// Applies the host viewport convention to a clip-space position: `y` is mirrored and depth is
/// remapped from `[-w, w]` to `[0, w]`.
fn flip_position<B: Backend>(backend: &mut B, position: &B::Value) -> B::Value {
    let y = backend.extract(position, 1);
    let z = backend.extract(position, 2);
    let w = backend.extract(position, 3);
    let y = backend.unary(UnaryOp::Neg, &y);
    let half = backend.constant(Constant::F32(0.5));
    let z = backend.binary(BinaryOp::Add, &z, &w);
    let z = backend.binary(BinaryOp::Mul, &z, &half);
    let flipped = backend.insert(position, &y, 1);
    backend.insert(&flipped, &z, 2)
}

fn emit_vertex_epilogue<B: Backend>(
    translator: &mut Translator<'_, B>,
) -> Result<VertexOutputFlags, TranslateError> {
    let program = translator.emit.ctx.program;
    let enabled = program.vertex_outputs.enabled;
    let flip = translator.emit.ctx.options.viewport_flip;

    let mut written = VertexOutputFlags::empty();
    let mut lane = 0;
    let mut location = 0;
    for output in vertex_output_table(program) {
        let is_position = output.flag == VertexOutputFlags::POSITION;
        if !enabled.contains(output.flag) {
            if is_position {
                // Vertex modules must always write a position.
                let backend = &mut translator.emit.backend;
                let place = backend.declare(
                    output.name,
                    IrType::VEC4,
                    StorageClass::BuiltinOutput(BuiltinVariable::Position),
                );
                let zero = backend.splat_constant(Constant::F32(0.0), 4);
                backend.store(&place, &zero);
            }
            continue;
        }

        let src = Operand::new(RegisterBank::Output, lane, DataType::F32);
        let value = translator.emit.load(&src, 0b1111, 0)?;
        let backend = &mut translator.emit.backend;
        if is_position {
            let place = backend.declare(
                output.name,
                IrType::VEC4,
                StorageClass::BuiltinOutput(BuiltinVariable::Position),
            );
            let value = if flip {
                flip_position(backend, &value)
            } else {
                value
            };
            backend.store(&place, &value);
        } else {
            let place = backend.declare(output.name, IrType::VEC4, StorageClass::Output { location });
            backend.store(&place, &value);
            location += 1;
        }
        debug!(output = output.name, lane, "vertex output");
        written |= output.flag;
        lane += output.lanes;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::interp::Interpreter;
    use crate::program::ConstantTables;

    #[test]
    fn texcoord_hints_set_lane_stride() {
        let mut info = ProgramInfo::new(ShaderStage::Vertex);
        info.vertex_outputs.texcoord_components[0] = 2;
        let table = vertex_output_table(&info);
        assert_eq!(table.len(), 14);
        assert_eq!(table[4].flag, VertexOutputFlags::TEXCOORD0);
        assert_eq!(table[4].lanes, 2);
        assert_eq!(table[5].lanes, 4);
        assert_eq!(table[13].flag, VertexOutputFlags::TEXCOORD9);
    }

    #[test]
    fn empty_fragment_program_still_writes_color() {
        let info = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let ctx = TranslateContext::new(&info, &tables);
        let translated = translate_program(Interpreter::new(), ctx).unwrap();
        assert!(translated.output.has_variable("out_color"));
        assert!(translated.vertex_outputs.is_empty());
    }
}
