use tracing::trace;

use super::Translator;
use crate::decode::{Instruction, InstructionDetail, Opcode};
use crate::error::TranslateError;
use crate::ir::{Backend, BinaryOp, Builtin, CompareOp, Constant, ShaderStage, UnaryOp};
use crate::program::CmovLowering;
use crate::types::{CompareMethod, Operand};

/// Rotates a 4-bit write mask left by one.
fn rotate_mask(mask: u32) -> u32 {
    ((mask << 1) | (mask >> 3)) & 0b1111
}

impl<B: Backend> Translator<'_, B> {
    /// Loads `ops`, each at its own repeat offset.
    pub(super) fn load_sources(
        &mut self,
        ops: &[&Operand],
        mask: u32,
        offsets: &[i32; 4],
    ) -> Result<Vec<B::Value>, TranslateError> {
        ops.iter()
            .map(|op| {
                let offset = offsets[usize::from(op.index).min(3)];
                self.emit.load(op, mask, offset)
            })
            .collect()
    }

    /// Evaluates an arithmetic opcode on loaded sources. `same` tells whether the first two
    /// sources read identical data.
    pub(super) fn compute(
        &mut self,
        opcode: Opcode,
        srcs: &[B::Value],
        same: bool,
    ) -> Result<B::Value, TranslateError> {
        let arg = |i: usize| {
            srcs.get(i).cloned().ok_or_else(|| {
                TranslateError::unsupported(format!("{opcode} is missing source {i}"))
            })
        };
        let b = &mut self.emit.backend;

        let value = match opcode {
            Opcode::Vmov => arg(0)?,
            Opcode::Vmad | Opcode::Vf16Mad | Opcode::Fmad => {
                let product = b.binary(BinaryOp::Mul, &arg(0)?, &arg(1)?);
                b.binary(BinaryOp::Add, &product, &arg(2)?)
            }
            Opcode::Vadd | Opcode::Vf16Add | Opcode::Fadd => {
                b.binary(BinaryOp::Add, &arg(0)?, &arg(1)?)
            }
            Opcode::Vmul | Opcode::Vf16Mul | Opcode::Fmul => {
                b.binary(BinaryOp::Mul, &arg(0)?, &arg(1)?)
            }
            Opcode::Vmin | Opcode::Vf16Min => b.binary(BinaryOp::Min, &arg(0)?, &arg(1)?),
            Opcode::Vmax | Opcode::Vf16Max => b.binary(BinaryOp::Max, &arg(0)?, &arg(1)?),
            Opcode::Vfrc | Opcode::Vf16Frc | Opcode::Fsubflr => {
                let a = arg(0)?;
                if same {
                    b.builtin(Builtin::Fract, &[a])
                } else {
                    let floor = b.builtin(Builtin::Floor, &[arg(1)?]);
                    b.binary(BinaryOp::Sub, &a, &floor)
                }
            }
            Opcode::Vdp | Opcode::Vf16Dp => dot(b, &arg(0)?, &arg(1)?),
            Opcode::Vssq => {
                let a = arg(0)?;
                dot(b, &a, &a)
            }
            Opcode::Vrcp | Opcode::Frcp => {
                let a = arg(0)?;
                let count = b.type_of(&a).count;
                let one = b.splat_constant(Constant::F32(1.0), count);
                b.binary(BinaryOp::Div, &one, &a)
            }
            Opcode::Vrsq | Opcode::Frsq => b.builtin(Builtin::InverseSqrt, &[arg(0)?]),
            Opcode::Vlog | Opcode::Flog => b.builtin(Builtin::Log2, &[arg(0)?]),
            Opcode::Vexp | Opcode::Fexp => b.builtin(Builtin::Exp2, &[arg(0)?]),
            Opcode::Vdsx | Opcode::Vf16Dsx | Opcode::Vdsy | Opcode::Vf16Dsy => {
                let a = arg(0)?;
                if self.emit.ctx.program.stage == ShaderStage::Fragment {
                    let func = if matches!(opcode, Opcode::Vdsx | Opcode::Vf16Dsx) {
                        Builtin::Dfdx
                    } else {
                        Builtin::Dfdy
                    };
                    b.builtin(func, &[a])
                } else {
                    // No derivatives outside fragment shaders.
                    let count = b.type_of(&a).count;
                    b.splat_constant(Constant::F32(0.0), count)
                }
            }
            Opcode::And => b.binary(BinaryOp::And, &arg(0)?, &arg(1)?),
            Opcode::Or => b.binary(BinaryOp::Or, &arg(0)?, &arg(1)?),
            Opcode::Xor => b.binary(BinaryOp::Xor, &arg(0)?, &arg(1)?),
            Opcode::Shl => b.binary(BinaryOp::Shl, &arg(0)?, &arg(1)?),
            Opcode::Shr => b.binary(BinaryOp::Shr, &arg(0)?, &arg(1)?),
            Opcode::Asr => b.binary(BinaryOp::Asr, &arg(0)?, &arg(1)?),
            Opcode::Rol => rotate_left(b, &arg(0)?, &arg(1)?),
            other => {
                return Err(TranslateError::unsupported(format!(
                    "{other} has no arithmetic lowering"
                )))
            }
        };
        Ok(value)
    }

    /// Single-issue vector arithmetic: load every source, compute, store, once per repeat.
    pub(super) fn vector_alu(
        &mut self,
        inst: &Instruction,
        sources: &[&Operand],
    ) -> Result<(), TranslateError> {
        let predicate = self.emit.predicate_condition(inst.predicate)?;
        let rotate = matches!(inst.detail, InstructionDetail::Dot { rotate_mask: true });
        let mut dest_mask = inst.dest_mask;

        for iteration in 0..=inst.repeat_count {
            let offsets = self.offsets(inst, iteration);
            let values = self.load_sources(sources, inst.source_mask, &offsets)?;
            let same = match sources {
                [a, b, ..] => {
                    a.is_same(b, inst.source_mask)
                        && offsets[usize::from(a.index).min(3)] == offsets[usize::from(b.index).min(3)]
                }
                _ => false,
            };
            let result = self.compute(inst.opcode, &values, same)?;
            trace!(
                op = %inst.opcode,
                dest = %inst.dest.describe(dest_mask),
                iteration,
                "vector op"
            );
            self.emit
                .store(&inst.dest, &result, dest_mask, offsets[3], predicate.as_ref())?;
            if rotate {
                dest_mask = rotate_mask(dest_mask);
            }
        }
        Ok(())
    }

    /// `vmovc`: picks src1 where the test on src0 holds, src2 elsewhere.
    pub(super) fn conditional_move(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let compare = match inst.detail {
            InstructionDetail::Move { compare, .. } => compare,
            _ => CompareMethod::NeZero,
        };
        let predicate = self.emit.predicate_condition(inst.predicate)?;
        let blend = self.emit.ctx.options.cmov_lowering == CmovLowering::Blend
            && inst.src1.ty.is_float()
            && inst.src0.ty.is_float()
            && inst.opcode != Opcode::Vmovcu8;

        for iteration in 0..=inst.repeat_count {
            let offsets = self.offsets(inst, iteration);
            let mask = inst.source_mask;
            let cond = self.emit.load(&inst.src0, mask, offsets[0])?;
            let on = self.emit.load(&inst.src1, mask, offsets[1])?;
            let off = self.emit.load(&inst.src2, mask, offsets[2])?;

            let result = if blend {
                blend_move(&mut self.emit.backend, compare, &cond, &on, &off)
            } else {
                let b = &mut self.emit.backend;
                let ty = b.type_of(&cond);
                let zero = b.splat_constant(Constant::of(ty.scalar, 0.0), ty.count);
                let op = match compare {
                    CompareMethod::NeZero => CompareOp::Ne,
                    CompareMethod::EqZero => CompareOp::Eq,
                    CompareMethod::LtZero => CompareOp::Lt,
                    CompareMethod::LteZero => CompareOp::Le,
                };
                let test = b.compare(op, &cond, &zero);
                b.select(&test, &on, &off)
            };
            self.emit
                .store(&inst.dest, &result, inst.dest_mask, offsets[3], predicate.as_ref())?;
        }
        Ok(())
    }
}

/// Dot product; scalars multiply.
pub(super) fn dot<B: Backend>(b: &mut B, x: &B::Value, y: &B::Value) -> B::Value {
    if b.type_of(x).is_scalar() {
        b.binary(BinaryOp::Mul, x, y)
    } else {
        b.builtin(Builtin::Dot, &[x.clone(), y.clone()])
    }
}

/// `(a << b) | (a >> (32 - b))` with both shift amounts kept in range.
pub(super) fn rotate_left<B: Backend>(b: &mut B, a: &B::Value, amount: &B::Value) -> B::Value {
    let ty = b.type_of(amount);
    let lanes = b.splat_constant(Constant::of(ty.scalar, 31.0), ty.count);
    let width = b.splat_constant(Constant::of(ty.scalar, 32.0), ty.count);
    let left_amount = b.binary(BinaryOp::And, amount, &lanes);
    let rest = b.binary(BinaryOp::Sub, &width, &left_amount);
    let right_amount = b.binary(BinaryOp::And, &rest, &lanes);
    let left = b.binary(BinaryOp::Shl, a, &left_amount);
    let right = b.binary(BinaryOp::Shr, a, &right_amount);
    b.binary(BinaryOp::Or, &left, &right)
}

/// Branch-free float select through `step`/`sign` and `mix`.
///
/// Matches a native select only for finite operands other than `-0.0`. `mix` evaluates
/// `a * (1 - t) + b * t`, so an infinite or NaN operand leaks NaN into the result even when it is
/// not the one picked, and a picked `-0.0` comes back as `+0.0`. Use [`CmovLowering::Select`] when
/// those inputs matter.
fn blend_move<B: Backend>(
    b: &mut B,
    compare: CompareMethod,
    cond: &B::Value,
    on: &B::Value,
    off: &B::Value,
) -> B::Value {
    let count = b.type_of(cond).count;
    let zero = b.splat_constant(Constant::F32(0.0), count);
    match compare {
        CompareMethod::LtZero => {
            let t = b.builtin(Builtin::Step, &[zero, cond.clone()]);
            b.builtin(Builtin::Mix, &[on.clone(), off.clone(), t])
        }
        CompareMethod::LteZero => {
            let t = b.builtin(Builtin::Step, &[cond.clone(), zero]);
            b.builtin(Builtin::Mix, &[off.clone(), on.clone(), t])
        }
        CompareMethod::EqZero | CompareMethod::NeZero => {
            let sign = b.builtin(Builtin::Sign, &[cond.clone()]);
            let t = b.unary(UnaryOp::Abs, &sign);
            let (first, second) = if compare == CompareMethod::EqZero {
                (on, off)
            } else {
                (off, on)
            };
            b.builtin(Builtin::Mix, &[first.clone(), second.clone(), t])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::rotate_mask;

    #[test]
    fn mask_rotation_wraps() {
        assert_eq!(rotate_mask(0b0001), 0b0010);
        assert_eq!(rotate_mask(0b1000), 0b0001);
        assert_eq!(rotate_mask(0b1010), 0b0101);
    }
}
