//! Read-only inputs of one translation: program metadata, constant tables, host features and
//! options.

use bitflags::bitflags;
use half::f16;

use crate::error::TranslateError;
use crate::ir::{HalfEncoding, ShaderStage};
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBuffer {
    pub index: u32,
    /// Size in bytes; rounded up to whole `vec4`s when declared.
    pub size: u32,
    /// First secondary-attribute register aliased by the buffer.
    pub reg_start_offset: u32,
    /// Secondary-attribute register that receives the buffer's base address, if any.
    pub base_register: Option<u32>,
    pub base_address: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerInfo {
    pub index: u32,
    pub name: String,
    pub cube: bool,
    /// Secondary-attribute register the sampler state is read from.
    pub reg_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSemantic {
    Generic,
    VertexIndex,
    InstanceIndex,
}

/// Maps a host input onto primary-attribute registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    pub location: u32,
    pub reg: u32,
    pub components: u32,
    pub semantic: InputSemantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralConstant {
    /// Secondary-attribute register receiving the literal.
    pub reg: u32,
    /// Byte offset into [`ProgramInfo::literal_buffer`].
    pub offset: u32,
}

/// Secondary-attribute registers whose value `vldst` treats as the base of a special buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferAliases {
    pub literal: Option<u32>,
    pub texture_index: Option<u32>,
    pub scratch: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutput {
    /// The color lives in the output bank rather than the primary attributes.
    pub native_color: bool,
    pub output_type: DataType,
    pub output_start: u32,
}

impl Default for FragmentOutput {
    fn default() -> Self {
        FragmentOutput {
            native_color: false,
            output_type: DataType::F32,
            output_start: 0,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexOutputFlags: u32 {
        const POSITION = 1 << 0;
        const COLOR0 = 1 << 1;
        const COLOR1 = 1 << 2;
        const FOG = 1 << 3;
        const TEXCOORD0 = 1 << 4;
        const TEXCOORD1 = 1 << 5;
        const TEXCOORD2 = 1 << 6;
        const TEXCOORD3 = 1 << 7;
        const TEXCOORD4 = 1 << 8;
        const TEXCOORD5 = 1 << 9;
        const TEXCOORD6 = 1 << 10;
        const TEXCOORD7 = 1 << 11;
        const TEXCOORD8 = 1 << 12;
        const TEXCOORD9 = 1 << 13;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexOutputs {
    pub enabled: VertexOutputFlags,
    /// Component count per texture coordinate; zero means four.
    pub texcoord_components: [u8; 10],
}

/// Everything the blob parser hands over for one program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInfo {
    pub stage: ShaderStage,
    pub primary: Vec<u64>,
    pub secondary: Vec<u64>,
    /// Register counts, in 32-bit lanes.
    pub temp_count: u32,
    pub primary_reg_count: u32,
    pub secondary_reg_count: u32,
    pub output_count: u32,
    pub uniform_buffers: Vec<UniformBuffer>,
    pub samplers: Vec<SamplerInfo>,
    pub inputs: Vec<InputBinding>,
    pub literals: Vec<LiteralConstant>,
    pub literal_buffer: Vec<u8>,
    pub buffer_aliases: BufferAliases,
    pub fragment: FragmentOutput,
    pub vertex_outputs: VertexOutputs,
}

impl ProgramInfo {
    pub fn new(stage: ShaderStage) -> Self {
        ProgramInfo {
            stage,
            primary: Vec::new(),
            secondary: Vec::new(),
            temp_count: 32,
            primary_reg_count: 32,
            secondary_reg_count: 32,
            output_count: 16,
            uniform_buffers: Vec::new(),
            samplers: Vec::new(),
            inputs: Vec::new(),
            literals: Vec::new(),
            literal_buffer: Vec::new(),
            buffer_aliases: BufferAliases::default(),
            fragment: FragmentOutput::default(),
            vertex_outputs: VertexOutputs::default(),
        }
    }

    /// Reads the little-endian `f32` at `offset` in the literal buffer.
    pub fn literal_f32(&self, offset: u32) -> Result<f32, TranslateError> {
        let start = offset as usize;
        let bytes = self
            .literal_buffer
            .get(start..start + 4)
            .ok_or_else(|| {
                TranslateError::metadata(format!("literal offset {offset} is out of range"))
            })?;
        let bits: u32 = bytemuck::pod_read_unaligned(bytes);
        Ok(f32::from_bits(u32::from_le(bits)))
    }
}

/// Fixed constant banks addressed by `FpConstant` operands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantTables {
    pub f32_banks: [Vec<f32>; 2],
    pub f16_banks: [Vec<f16>; 4],
}

impl ConstantTables {
    pub fn f32(&self, bank: usize, index: u32) -> Option<f32> {
        self.f32_banks.get(bank)?.get(index as usize).copied()
    }

    pub fn f16(&self, bank: usize, index: u32) -> Option<f32> {
        self.f16_banks
            .get(bank)?
            .get(index as usize)
            .map(|v| v.to_f32())
    }
}

/// Host capability bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    /// The host exposes the in-flight framebuffer color to the fragment shader.
    pub direct_fragcolor: bool,
    /// Half-float registers must round-trip their exact bits.
    pub preserve_f16_raw: bool,
    /// The host binds integer color targets, so U8 colors are written unnormalized.
    pub native_output_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CmovLowering {
    /// Float conditional moves become a `step`/`sign` blend.
    #[default]
    Blend,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslateOptions {
    pub cmov_lowering: CmovLowering,
    pub f16_encoding: HalfEncoding,
    pub viewport_flip: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    pub program: &'a ProgramInfo,
    pub constants: &'a ConstantTables,
    pub features: Features,
    pub options: TranslateOptions,
}

impl<'a> TranslateContext<'a> {
    pub fn new(program: &'a ProgramInfo, constants: &'a ConstantTables) -> Self {
        TranslateContext {
            program,
            constants,
            features: Features::default(),
            options: TranslateOptions::default(),
        }
    }

    /// Encoding of half-float register pairs. Defaults to two normalized 16-bit values, which
    /// differs from hardware IEEE binary16 halves; `preserve_f16_raw` or
    /// `f16_encoding: HalfEncoding::Ieee` selects the IEEE form.
    pub fn half_encoding(&self) -> HalfEncoding {
        if self.features.preserve_f16_raw {
            HalfEncoding::Ieee
        } else {
            self.options.f16_encoding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_reads_little_endian() {
        let mut info = ProgramInfo::new(ShaderStage::Fragment);
        info.literal_buffer = vec![0, 0, 0, 0, 0x00, 0x00, 0x80, 0x3F];
        assert_eq!(info.literal_f32(4).unwrap(), 1.0);
        assert!(info.literal_f32(6).is_err());
    }

    #[test]
    fn raw_f16_feature_forces_ieee() {
        let info = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let mut ctx = TranslateContext::new(&info, &tables);
        assert_eq!(ctx.half_encoding(), HalfEncoding::Unorm16);
        ctx.features.preserve_f16_raw = true;
        assert_eq!(ctx.half_encoding(), HalfEncoding::Ieee);
    }

    #[test]
    fn ieee_halves_are_opt_in() {
        let info = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let mut ctx = TranslateContext::new(&info, &tables);
        assert_eq!(ctx.options.f16_encoding, HalfEncoding::Unorm16);
        ctx.options.f16_encoding = HalfEncoding::Ieee;
        assert_eq!(ctx.half_encoding(), HalfEncoding::Ieee);
    }
}
