use tracing::{debug, warn};

use super::Translator;
use crate::decode::{Instruction, InstructionDetail, Opcode};
use crate::error::TranslateError;
use crate::ir::{Backend, BinaryOp, Constant, Conversion, MemorySpace, Scalar};
use crate::transfer::compute_scalar;
use crate::types::{DataType, Operand, RegisterBank};

impl<B: Backend> Translator<'_, B> {
    /// `vpck`: converts between element formats, normalizing when the scale bit is set.
    pub(super) fn pack(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let Opcode::Vpck { dest: dest_ty, src: src_ty } = inst.opcode else {
            return Err(TranslateError::unsupported(format!("{} is not a pack", inst.opcode)));
        };
        let (scale, src2_mask) = match inst.detail {
            InstructionDetail::Pack { scale, src2_mask } => (scale, src2_mask),
            _ => (false, 0),
        };
        let predicate = self.emit.predicate_condition(inst.predicate)?;

        // Full-width integer packs from narrow sources read the first two selected elements
        // alternately.
        let mut src1 = inst.src1;
        if !dest_ty.is_float() && inst.dest_mask == 0b1111 && src_ty != DataType::F32 {
            for i in 0..4 {
                src1.swizzle[i] = inst.src1.swizzle[i % 2];
            }
        }

        for iteration in 0..=inst.repeat_count {
            let offsets = self.offsets(inst, iteration);
            let mut value = self.emit.load(&src1, inst.source_mask, offsets[1])?;
            if src2_mask != 0 {
                let rest = self.emit.load(&inst.src2, src2_mask, offsets[2])?;
                value = self.emit.backend.construct(&[value, rest]);
            }

            let value = match (dest_ty.is_float(), src_ty.is_float()) {
                (true, false) => self.emit.to_float(&value, src_ty, scale),
                (false, true) => self.emit.to_int(&value, dest_ty, scale),
                (true, true) => value,
                (false, false) => {
                    let want = compute_scalar(dest_ty);
                    if self.emit.type_of(&value).scalar == want {
                        value
                    } else {
                        self.emit.backend.convert(Conversion::Bitcast, &value, want)
                    }
                }
            };
            self.emit
                .store(&inst.dest, &value, inst.dest_mask, offsets[3], predicate.as_ref())?;
        }
        Ok(())
    }

    /// `limm`: writes a 32-bit literal.
    pub(super) fn load_immediate(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::LoadImmediate { value } = inst.detail else {
            return Err(TranslateError::unsupported("LIMM without a value"));
        };
        let literal = self.emit.backend.u32(value);
        self.emit.store(&inst.dest, &literal, 0b0001, 0, None)
    }

    /// Buffer an address register names, if it is one of the aliased secondary attributes.
    fn memory_space(&self, base: &Operand) -> MemorySpace {
        if base.bank != RegisterBank::SecAttr {
            return MemorySpace::Global;
        }
        let aliases = &self.emit.ctx.program.buffer_aliases;
        if aliases.literal == Some(base.num) {
            MemorySpace::Literal
        } else if aliases.texture_index == Some(base.num) {
            MemorySpace::TextureIndex
        } else if aliases.scratch == Some(base.num) {
            MemorySpace::Scratch
        } else {
            MemorySpace::Global
        }
    }

    /// Byte offset contributed by src1 and src2, or `None` if either is a register.
    fn constant_offset(&self, inst: &Instruction, size: u32, moe_expand: bool) -> Option<u32> {
        if inst.src1.bank != RegisterBank::Immediate || inst.src2.bank != RegisterBank::Immediate {
            return None;
        }
        let fixed = if moe_expand { 0 } else { 4 };
        Some(inst.src1.num * size + inst.src2.num + fixed)
    }

    /// `ldr`/`str`: moves consecutive 32-bit words between registers and a flat buffer.
    pub(super) fn load_store(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::LoadStore {
            data_type,
            count,
            moe_expand,
        } = inst.detail
        else {
            return Err(TranslateError::unsupported("load/store without a layout"));
        };
        let size = data_type.size();
        let words = (size * count).div_ceil(4);
        let space = self.memory_space(&inst.src0);
        let store = inst.opcode == Opcode::Str;
        let predicate = self.emit.predicate_condition(inst.predicate)?;
        if store && predicate.is_some() {
            warn!("predicated stores to memory are not supported");
            return Err(TranslateError::unsupported("predicated STR"));
        }

        let mut dest = inst.dest;
        dest.ty = DataType::F32;

        if space == MemorySpace::Literal && !store {
            if let Some(start) = self.constant_offset(inst, size, moe_expand) {
                debug!(start, words, "folding literal buffer read");
                for i in 0..words {
                    let literal = self.emit.ctx.program.literal_f32(start + i * 4)?;
                    let value = self.emit.backend.f32(literal);
                    self.emit.store(&dest, &value, 0b0001, 0, predicate.as_ref())?;
                    dest.num += 1;
                }
                return Ok(());
            }
        }

        let offset = if inst.src1.bank == RegisterBank::Immediate {
            self.emit.backend.i32((inst.src1.num * size) as i32)
        } else {
            let reg = self.emit.load(&inst.src1, 0b0001, 0)?;
            let bias = self.emit.backend.i32(0x10000);
            self.emit.backend.binary(BinaryOp::Sub, &reg, &bias)
        };
        let src2 = self.emit.load(&inst.src2, 0b0001, 0)?;
        let mut address = self.emit.backend.binary(BinaryOp::Add, &offset, &src2);
        if space == MemorySpace::Global {
            let base = self.emit.load(&inst.src0, 0b0001, 0)?;
            address = self.emit.backend.binary(BinaryOp::Add, &base, &address);
        }
        if !moe_expand {
            let four = self.emit.backend.i32(4);
            address = self.emit.backend.binary(BinaryOp::Add, &address, &four);
        }
        let address = self
            .emit
            .backend
            .convert(Conversion::Bitcast, &address, Scalar::U32);

        for i in 0..words {
            let step = self.emit.backend.constant(Constant::U32(i * 4));
            let at = self.emit.backend.binary(BinaryOp::Add, &address, &step);
            if store {
                let value = self.emit.load(&dest, 0b0001, 0)?;
                self.emit.backend.store_memory(space, &at, &value);
            } else {
                let value = self.emit.backend.fetch_memory(space, &at);
                self.emit.store(&dest, &value, 0b0001, 0, predicate.as_ref())?;
            }
            dest.num += 1;
        }
        Ok(())
    }
}
