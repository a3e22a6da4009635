use super::Translator;
use crate::decode::{Instruction, InstructionDetail, Opcode, TestAlu, TestCompare};
use crate::error::TranslateError;
use crate::ir::{Backend, CompareOp, Constant};
use crate::types::DataType;

/// Arithmetic a test runs before comparing with zero. Subtraction has none: its sources are
/// compared with each other.
fn alu_opcode(alu: TestAlu) -> Option<Opcode> {
    Some(match alu {
        TestAlu::Sub => return None,
        TestAlu::Add => Opcode::Vadd,
        TestAlu::Mul => Opcode::Vmul,
        TestAlu::Min => Opcode::Vmin,
        TestAlu::Max => Opcode::Vmax,
        TestAlu::Frc => Opcode::Vfrc,
        TestAlu::Rcp => Opcode::Vrcp,
        TestAlu::Rsq => Opcode::Vrsq,
        TestAlu::Log => Opcode::Vlog,
        TestAlu::Exp => Opcode::Vexp,
        TestAlu::Dp => Opcode::Vdp,
        TestAlu::Dsx => Opcode::Vdsx,
        TestAlu::Dsy => Opcode::Vdsy,
        TestAlu::And => Opcode::And,
        TestAlu::Or => Opcode::Or,
        TestAlu::Xor => Opcode::Xor,
        TestAlu::Shl => Opcode::Shl,
        TestAlu::Shr => Opcode::Shr,
        TestAlu::Rol => Opcode::Rol,
        TestAlu::Asr => Opcode::Asr,
    })
}

fn compare_op(compare: TestCompare) -> CompareOp {
    match compare {
        TestCompare::NotEqual => CompareOp::Ne,
        TestCompare::Equal => CompareOp::Eq,
        TestCompare::Less => CompareOp::Lt,
        TestCompare::LessEqual => CompareOp::Le,
        TestCompare::Greater => CompareOp::Gt,
        TestCompare::GreaterEqual => CompareOp::Ge,
    }
}

impl<B: Backend> Translator<'_, B> {
    /// Loads both test sources and evaluates the comparison.
    fn evaluate_test(&mut self, inst: &Instruction) -> Result<B::Value, TranslateError> {
        let InstructionDetail::Test { alu, compare, .. } = inst.detail else {
            return Err(TranslateError::unsupported(format!("{} without a test", inst.opcode)));
        };
        let a = self.emit.load(&inst.src1, inst.source_mask, 0)?;
        let b = self.emit.load(&inst.src2, inst.source_mask, 0)?;
        let op = compare_op(compare);

        let Some(opcode) = alu_opcode(alu) else {
            return Ok(self.emit.backend.compare(op, &a, &b));
        };
        let same = inst.src1.is_same(&inst.src2, inst.source_mask);
        let value = self.compute(opcode, &[a, b], same)?;
        let ty = self.emit.type_of(&value);
        let zero = self
            .emit
            .backend
            .splat_constant(Constant::of(ty.scalar, 0.0), ty.count);
        Ok(self.emit.backend.compare(op, &value, &zero))
    }

    /// `vtst`: writes the outcome of one component's test to a predicate register.
    pub(super) fn test(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let predicate = self.emit.predicate_condition(inst.predicate)?;
        let cond = self.evaluate_test(inst)?;
        self.emit
            .store(&inst.dest, &cond, 0b0001, 0, predicate.as_ref())
    }

    /// `vtstmsk`: writes an all-ones or all-zeros mask per component.
    pub(super) fn test_mask(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let mask_type = match inst.detail {
            InstructionDetail::Test {
                mask_type: Some(ty),
                ..
            } => ty,
            _ => DataType::F32,
        };
        let predicate = self.emit.predicate_condition(inst.predicate)?;
        let cond = self.evaluate_test(inst)?;
        let count = self.emit.type_of(&cond).count;

        let (on, off) = if mask_type == DataType::UInt8 {
            (Constant::U32(0xFF), Constant::U32(0))
        } else {
            (Constant::F32(1.0), Constant::F32(0.0))
        };
        let on = self.emit.backend.splat_constant(on, count);
        let off = self.emit.backend.splat_constant(off, count);
        let value = self.emit.backend.select(&cond, &on, &off);
        self.emit
            .store(&inst.dest, &value, inst.dest_mask, 0, predicate.as_ref())
    }
}
