use tracing::{trace, warn};

use super::Translator;
use crate::decode::{Instruction, InstructionDetail, Opcode};
use crate::error::TranslateError;
use crate::ir::Backend;
use crate::types::ExtPredicate;

fn source_count(opcode: Opcode) -> usize {
    match opcode {
        Opcode::Vmad | Opcode::Fmad => 3,
        Opcode::Vdp | Opcode::Vmul | Opcode::Vadd | Opcode::Fadd | Opcode::Fmul | Opcode::Fsubflr => 2,
        _ => 1,
    }
}

impl<B: Backend> Translator<'_, B> {
    /// Dual-issue word. Both ops read their sources before either writes, so one op never sees
    /// the other's result.
    pub(super) fn dual(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::Dual { second } = &inst.detail else {
            return Err(TranslateError::unsupported("dual-issue word without a second op"));
        };
        // The dual encoding has no predicate or repeat fields.
        for op in [inst, second.as_ref()] {
            if op.predicate != ExtPredicate::None || op.repeat_count != 0 {
                warn!(op = %op.opcode, "dual-issue op with a predicate or repeat");
                return Err(TranslateError::unsupported(format!(
                    "predicated or repeated {} in a dual-issue word",
                    op.opcode
                )));
            }
        }
        let ops = [inst, second.as_ref()];

        let mut loaded = Vec::with_capacity(2);
        for op in ops {
            let all = [&op.src0, &op.src1, &op.src2];
            let sources = &all[..source_count(op.opcode)];
            let values = self.load_sources(sources, op.source_mask, &[0; 4])?;
            let same = sources.len() >= 2 && sources[0].is_same(sources[1], op.source_mask);
            loaded.push((values, same));
        }

        let mut results = Vec::with_capacity(2);
        for (op, (values, same)) in ops.iter().zip(loaded) {
            results.push(self.compute(op.opcode, &values, same)?);
        }

        for (op, result) in ops.iter().zip(results) {
            trace!(op = %op.opcode, dest = %op.dest.describe(op.dest_mask), "dual op");
            self.emit.store(&op.dest, &result, op.dest_mask, 0, None)?;
        }
        Ok(())
    }
}
