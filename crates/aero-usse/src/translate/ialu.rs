use super::Translator;
use crate::decode::{Instruction, InstructionDetail};
use crate::error::TranslateError;
use crate::ir::{Backend, UnaryOp};

impl<B: Backend> Translator<'_, B> {
    /// Single-lane 32-bit bitwise ops and shifts.
    pub(super) fn bitwise(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let (invert, rotation, immediate) = match inst.detail {
            InstructionDetail::Bitwise {
                src2_invert,
                src2_rot,
                immediate,
            } => (src2_invert, src2_rot, immediate),
            _ => (false, 0, None),
        };
        if rotation != 0 {
            return Err(TranslateError::unsupported(format!(
                "{} with src2 rotation {rotation}",
                inst.opcode
            )));
        }
        let predicate = self.emit.predicate_condition(inst.predicate)?;

        for iteration in 0..=inst.repeat_count {
            let offsets = self.offsets(inst, iteration);
            let a = self.emit.load(&inst.src1, 0b0001, offsets[1])?;
            let b = match immediate {
                // Already inverted at decode.
                Some(value) => self.emit.backend.u32(value),
                None => {
                    let b = self.emit.load(&inst.src2, 0b0001, offsets[2])?;
                    if invert {
                        self.emit.backend.unary(UnaryOp::Not, &b)
                    } else {
                        b
                    }
                }
            };
            let result = self.compute(inst.opcode, &[a, b], false)?;
            self.emit
                .store(&inst.dest, &result, 0b0001, offsets[3], predicate.as_ref())?;
        }
        Ok(())
    }
}
