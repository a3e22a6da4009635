use tracing::warn;

use super::Translator;
use crate::decode::{BlendOp, Instruction, InstructionDetail};
use crate::error::TranslateError;
use crate::ir::{Backend, BinaryOp, Constant};
use crate::types::DataType;

/// Byte color operands after normalization to `[0, 1]`.
struct Sources<V> {
    color1: V,
    color2: V,
    alpha1: V,
    alpha2: V,
}

impl<B: Backend> Translator<'_, B> {
    fn blend(&mut self, op: BlendOp, a: &B::Value, b: &B::Value) -> B::Value {
        let op = match op {
            BlendOp::Add => BinaryOp::Add,
            BlendOp::Sub => BinaryOp::Sub,
            BlendOp::Min => BinaryOp::Min,
            BlendOp::Max => BinaryOp::Max,
        };
        self.emit.backend.binary(op, a, b)
    }

    /// `1 - value` when `enabled`.
    fn complement(&mut self, value: B::Value, enabled: bool) -> B::Value {
        if !enabled {
            return value;
        }
        let count = self.emit.type_of(&value).count;
        let one = self.emit.backend.splat_constant(Constant::F32(1.0), count);
        self.emit.backend.binary(BinaryOp::Sub, &one, &value)
    }

    fn zero(&mut self, count: u32) -> B::Value {
        self.emit.backend.splat_constant(Constant::F32(0.0), count)
    }

    fn color_factor(&mut self, sel: u32, src: &Sources<B::Value>) -> Result<B::Value, TranslateError> {
        Ok(match sel {
            0 => self.zero(3),
            1 => src.color1.clone(),
            2 => src.color2.clone(),
            3 => self.emit.backend.splat(&src.alpha1, 3),
            4 => self.emit.backend.splat(&src.alpha2, 3),
            other => {
                warn!(selector = other, "unimplemented color selector");
                return Err(TranslateError::unsupported(format!("SOP2 color selector {other}")));
            }
        })
    }

    fn alpha_factor(&mut self, sel: u32, src: &Sources<B::Value>) -> Result<B::Value, TranslateError> {
        Ok(match sel {
            0 => self.zero(1),
            1 => src.alpha1.clone(),
            2 => src.alpha2.clone(),
            other => {
                warn!(selector = other, "unimplemented alpha selector");
                return Err(TranslateError::unsupported(format!("SOP2 alpha selector {other}")));
            }
        })
    }

    /// Loads `mask` of a byte operand as floats in `[0, 1]`.
    fn load_unorm(
        &mut self,
        op: &crate::types::Operand,
        mask: u32,
        offset: i32,
    ) -> Result<B::Value, TranslateError> {
        let raw = self.emit.load(op, mask, offset)?;
        Ok(self.emit.to_float(&raw, DataType::UInt8, true))
    }

    /// `sop2`: `cop(src1.rgb * f1, src2.rgb * f2)` and `aop(src1.a * g1, src2.a * g2)`, each factor
    /// picked by a selector and optionally complemented.
    pub(super) fn sop2(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::Sop2 {
            cop,
            aop,
            csel1,
            csel2,
            asel1,
            asel2,
            cmod1,
            cmod2,
            amod1,
            amod2,
            src1_mod,
        } = inst.detail
        else {
            return Err(TranslateError::unsupported("SOP2 without blend state"));
        };
        let predicate = self.emit.predicate_condition(inst.predicate)?;

        for iteration in 0..=inst.repeat_count {
            let offsets = self.offsets(inst, iteration);
            let color1 = self.load_unorm(&inst.src1, 0b0111, offsets[1])?;
            let alpha1 = self.load_unorm(&inst.src1, 0b1000, offsets[1])?;
            let color2 = self.load_unorm(&inst.src2, 0b0111, offsets[2])?;
            let alpha2 = self.load_unorm(&inst.src2, 0b1000, offsets[2])?;
            let src = Sources {
                color1: self.complement(color1, src1_mod),
                alpha1: self.complement(alpha1, src1_mod),
                color2,
                alpha2,
            };

            let f1 = self.color_factor(csel1, &src)?;
            let f1 = self.complement(f1, cmod1);
            let f2 = self.color_factor(csel2, &src)?;
            let f2 = self.complement(f2, cmod2);
            let g1 = self.alpha_factor(asel1, &src)?;
            let g1 = self.complement(g1, amod1);
            let g2 = self.alpha_factor(asel2, &src)?;
            let g2 = self.complement(g2, amod2);

            let b = &mut self.emit.backend;
            let lhs = b.binary(BinaryOp::Mul, &f1, &src.color1);
            let rhs = b.binary(BinaryOp::Mul, &f2, &src.color2);
            let alpha_lhs = b.binary(BinaryOp::Mul, &g1, &src.alpha1);
            let alpha_rhs = b.binary(BinaryOp::Mul, &g2, &src.alpha2);

            let color = self.blend(cop, &lhs, &rhs);
            let alpha = self.blend(aop, &alpha_lhs, &alpha_rhs);
            let color = self.emit.to_int(&color, DataType::UInt8, true);
            let alpha = self.emit.to_int(&alpha, DataType::UInt8, true);

            self.emit
                .store(&inst.dest, &color, 0b0111, offsets[3], predicate.as_ref())?;
            self.emit
                .store(&inst.dest, &alpha, 0b1000, offsets[3], predicate.as_ref())?;
        }
        Ok(())
    }

    fn mask_factor(
        &mut self,
        sel: u32,
        src1: &B::Value,
        src2: &B::Value,
    ) -> Result<B::Value, TranslateError> {
        Ok(match sel {
            0 => self.zero(4),
            2 => src1.clone(),
            3 => self.emit.backend.shuffle(src1, src1, &[3, 3, 3, 3]),
            6 => src2.clone(),
            7 => self.emit.backend.shuffle(src2, src2, &[3, 3, 3, 3]),
            other => {
                warn!(selector = other, "unimplemented operation selector");
                return Err(TranslateError::unsupported(format!("SOP2M selector {other}")));
            }
        })
    }

    /// `sop2m`: the four-channel form, with alpha combined separately when written.
    pub(super) fn sop2m(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::Sop2m {
            cop,
            aop,
            sel1,
            sel2,
            mod1,
            mod2,
        } = inst.detail
        else {
            return Err(TranslateError::unsupported("SOP2M without blend state"));
        };
        let predicate = self.emit.predicate_condition(inst.predicate)?;

        let src1 = self.load_unorm(&inst.src1, 0b1111, 0)?;
        let src2 = self.load_unorm(&inst.src2, 0b1111, 0)?;

        let op1 = self.mask_factor(sel1, &src1, &src2)?;
        let op1 = self.complement(op1, mod1);
        let op2 = self.mask_factor(sel2, &src1, &src2)?;
        let op2 = self.complement(op2, mod2);
        let op1 = self.emit.backend.binary(BinaryOp::Mul, &op1, &src1);
        let op2 = self.emit.backend.binary(BinaryOp::Mul, &op2, &src2);

        let mut result = self.blend(cop, &op1, &op2);
        if inst.dest_mask & 0b1000 != 0 {
            let a1 = self.emit.backend.extract(&op1, 3);
            let a2 = self.emit.backend.extract(&op2, 3);
            let alpha = self.blend(aop, &a1, &a2);
            result = self.emit.backend.insert(&result, &alpha, 3);
        }
        let result = self.emit.to_int(&result, DataType::UInt8, true);
        self.emit
            .store(&inst.dest, &result, inst.dest_mask, 0, predicate.as_ref())
    }

    pub(super) fn sop3(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        warn!(op = %inst.opcode, "unimplemented: SOP3");
        Err(TranslateError::unsupported("SOP3"))
    }
}
