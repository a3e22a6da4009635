//! Instruction-level translation.
//!
//! [`Translator`] walks a decoded instruction stream and emits IR for each instruction through an
//! [`Emitter`]. Repeat handling and SMLSI increment state live here; the per-family logic is split
//! across the submodules.

mod alu;
mod compare;
mod data;
mod dual;
mod ialu;
mod sop;

use tracing::{trace, warn};

use crate::decode::{decode, Instruction, InstructionDetail, Opcode};
use crate::error::TranslateError;
use crate::ir::Backend;
use crate::program::{ProgramInfo, TranslateContext};
use crate::resolve::Resolver;
use crate::transfer::Emitter;
use crate::types::{Operand, RegisterBank, RegisterFlags, RepeatMode};

/// Number of repeat iterations an increment table covers.
const REPEAT_SLOTS: usize = 17;

fn default_increase() -> [[i32; REPEAT_SLOTS]; 4] {
    let mut table = [[0; REPEAT_SLOTS]; 4];
    for row in &mut table {
        for (j, slot) in row.iter_mut().enumerate() {
            *slot = j as i32;
        }
    }
    table
}

/// Declares private storage for every register file lane nothing else binds.
pub fn declare_register_files<B: Backend>(
    backend: &mut B,
    resolver: &mut Resolver<B>,
    program: &ProgramInfo,
) {
    resolver.declare_bank(backend, RegisterBank::Temp, program.temp_count);
    resolver.declare_bank(backend, RegisterBank::Output, program.output_count);
    resolver.declare_bank(backend, RegisterBank::PrimAttr, program.primary_reg_count);
    resolver.declare_bank(backend, RegisterBank::SecAttr, program.secondary_reg_count);
    // Four GPI registers of four lanes each.
    resolver.declare_bank(backend, RegisterBank::FpInternal, 16);
}

pub struct Translator<'a, B: Backend> {
    pub emit: Emitter<'a, B>,
    repeat_increase: [[i32; REPEAT_SLOTS]; 4],
    pc: usize,
}

impl<'a, B: Backend> Translator<'a, B> {
    pub fn new(backend: B, ctx: TranslateContext<'a>) -> Self {
        Self::with_resolver(backend, Resolver::new(), ctx)
    }

    /// Starts from a resolver that already carries host bindings; the rest of each register file
    /// is declared as private storage.
    pub fn with_resolver(mut backend: B, mut resolver: Resolver<B>, ctx: TranslateContext<'a>) -> Self {
        declare_register_files(&mut backend, &mut resolver, ctx.program);
        Translator {
            emit: Emitter::new(backend, resolver, ctx),
            repeat_increase: default_increase(),
            pc: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.emit.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.emit.backend
    }

    pub fn into_backend(self) -> B {
        self.emit.backend
    }

    /// Decodes and translates `words` until the end flag or the end of the slice.
    pub fn translate_stream(&mut self, words: &[u64], secondary: bool) -> Result<(), TranslateError> {
        self.repeat_increase = default_increase();
        for (pc, &word) in words.iter().enumerate() {
            self.pc = pc;
            let inst = decode(word, secondary)?;
            trace!(pc, word = format_args!("{word:#018x}"), op = %inst.opcode, "translating");
            self.translate(&inst)?;
            if inst.end {
                break;
            }
        }
        Ok(())
    }

    /// Emits IR for one decoded instruction.
    pub fn translate(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        if let InstructionDetail::Dual { .. } = inst.detail {
            return self.dual(inst);
        }
        match inst.opcode {
            Opcode::Vmov => self.vector_alu(inst, &[&inst.src1]),
            Opcode::Vmovc | Opcode::Vmovcu8 => self.conditional_move(inst),
            Opcode::Vmad | Opcode::Vf16Mad => self.vector_alu(inst, &[&inst.src0, &inst.src1, &inst.src2]),
            Opcode::Vmul
            | Opcode::Vadd
            | Opcode::Vfrc
            | Opcode::Vdsx
            | Opcode::Vdsy
            | Opcode::Vmin
            | Opcode::Vmax
            | Opcode::Vdp
            | Opcode::Vf16Mul
            | Opcode::Vf16Add
            | Opcode::Vf16Frc
            | Opcode::Vf16Dsx
            | Opcode::Vf16Dsy
            | Opcode::Vf16Min
            | Opcode::Vf16Max
            | Opcode::Vf16Dp => self.vector_alu(inst, &[&inst.src1, &inst.src2]),
            Opcode::Vrcp | Opcode::Vrsq | Opcode::Vlog | Opcode::Vexp => {
                self.vector_alu(inst, &[&inst.src1])
            }
            Opcode::Vssq
            | Opcode::Fmad
            | Opcode::Fadd
            | Opcode::Fmul
            | Opcode::Fsubflr
            | Opcode::Frsq
            | Opcode::Frcp
            | Opcode::Fexp
            | Opcode::Flog => Err(TranslateError::unsupported(format!(
                "{} outside a dual-issue word",
                inst.opcode
            ))),
            Opcode::Vpck { .. } => self.pack(inst),
            Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Rol
            | Opcode::Shr
            | Opcode::Asr => self.bitwise(inst),
            Opcode::Sop2 => self.sop2(inst),
            Opcode::Sop2m => self.sop2m(inst),
            Opcode::Sop3 => self.sop3(inst),
            Opcode::Vtst => self.test(inst),
            Opcode::Vtstmsk => self.test_mask(inst),
            Opcode::Ldr | Opcode::Str => self.load_store(inst),
            Opcode::Limm => self.load_immediate(inst),
            Opcode::Smlsi => self.smlsi(inst),
            Opcode::Nop | Opcode::Phas | Opcode::Spec => Ok(()),
            Opcode::Smp | Opcode::Kill | Opcode::Br => {
                warn!(pc = self.pc, op = %inst.opcode, "instruction has no translation");
                Err(TranslateError::unsupported(inst.opcode.name()))
            }
        }
    }

    /// Lane offset an operand advances by on repeat `iteration`.
    pub(crate) fn repeat_offset(
        &self,
        op: &Operand,
        mode: RepeatMode,
        multiplier: &[u32; 4],
        iteration: u32,
    ) -> i32 {
        let idx = iteration as i32;
        let internal = op.bank == RegisterBank::FpInternal;
        if mode == RepeatMode::Internal && internal {
            return idx;
        }
        if op.flags.contains(RegisterFlags::GPI) {
            return 0;
        }
        match mode {
            RepeatMode::Internal => 0,
            RepeatMode::Both if internal => idx,
            RepeatMode::Both => idx * 4,
            RepeatMode::External if internal => 0,
            RepeatMode::External => idx * 4,
            RepeatMode::Slmsi => {
                let slot = usize::from(op.index).min(3);
                let inc = self.repeat_increase[slot]
                    .get(iteration as usize)
                    .copied()
                    .unwrap_or(idx);
                if op.bank.is_repeatable() {
                    inc * multiplier[slot] as i32
                } else {
                    inc
                }
            }
        }
    }

    /// Repeat offsets of src0, src1, src2 and dest.
    pub(crate) fn offsets(&self, inst: &Instruction, iteration: u32) -> [i32; 4] {
        let at = |op: &Operand| {
            self.repeat_offset(op, inst.repeat_mode, &inst.repeat_multiplier, iteration)
        };
        [at(&inst.src0), at(&inst.src1), at(&inst.src2), at(&inst.dest)]
    }

    fn smlsi(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstructionDetail::Smlsi {
            inc_modes, incs, ..
        } = &inst.detail
        else {
            return Err(TranslateError::unsupported("SMLSI without increments"));
        };
        // Encoded dest first, the table keeps dest last.
        const SLOTS: [usize; 4] = [3, 0, 1, 2];
        for (s, &slot) in SLOTS.iter().enumerate() {
            let row = &mut self.repeat_increase[slot];
            for (j, entry) in row.iter_mut().enumerate() {
                *entry = if inc_modes[s] {
                    j as i32 * i32::from(incs[s] as i8)
                } else if j < 4 {
                    i32::from((incs[s] >> (2 * j)) & 0b11)
                } else {
                    j as i32
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::interp::Interpreter;
    use crate::ir::ShaderStage;
    use crate::program::ConstantTables;
    use crate::types::DataType;

    fn translator<'a>(program: &'a ProgramInfo, tables: &'a ConstantTables) -> Translator<'a, Interpreter> {
        Translator::new(Interpreter::new(), TranslateContext::new(program, tables))
    }

    #[test]
    fn repeat_offsets_follow_mode() {
        let program = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let t = translator(&program, &tables);

        let mut temp = Operand::new(RegisterBank::Temp, 0, DataType::F32);
        temp.index = 1;
        let mut gpi = Operand::new(RegisterBank::FpInternal, 0, DataType::F32);
        gpi.index = 0;
        let mult = [2; 4];

        assert_eq!(t.repeat_offset(&gpi, RepeatMode::Internal, &mult, 3), 3);
        assert_eq!(t.repeat_offset(&temp, RepeatMode::Internal, &mult, 3), 0);
        assert_eq!(t.repeat_offset(&temp, RepeatMode::External, &mult, 2), 8);
        assert_eq!(t.repeat_offset(&gpi, RepeatMode::External, &mult, 2), 0);
        assert_eq!(t.repeat_offset(&gpi, RepeatMode::Both, &mult, 2), 2);
        assert_eq!(t.repeat_offset(&temp, RepeatMode::Slmsi, &mult, 3), 6);

        temp.flags |= RegisterFlags::GPI;
        assert_eq!(t.repeat_offset(&temp, RepeatMode::Both, &mult, 2), 0);
    }

    #[test]
    fn smlsi_rewrites_increments() {
        let program = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let mut t = translator(&program, &tables);

        let mut inst = Instruction::new(Opcode::Smlsi);
        inst.detail = InstructionDetail::Smlsi {
            inc_modes: [true, false, true, true],
            incs: [3, 0b00_01_11_10, (-1i8) as u8, 0],
            limits: [0; 3],
        };
        t.translate(&inst).unwrap();

        let mut dest = Operand::new(RegisterBank::Temp, 0, DataType::F32);
        dest.index = 3;
        let mut src0 = Operand::new(RegisterBank::Temp, 0, DataType::F32);
        src0.index = 0;
        let mut src1 = Operand::new(RegisterBank::FpConstant, 0, DataType::F32);
        src1.index = 1;
        let mult = [1; 4];

        assert_eq!(t.repeat_offset(&dest, RepeatMode::Slmsi, &mult, 2), 6);
        assert_eq!(t.repeat_offset(&src0, RepeatMode::Slmsi, &mult, 2), 1);
        assert_eq!(t.repeat_offset(&src0, RepeatMode::Slmsi, &mult, 3), 0);
        assert_eq!(t.repeat_offset(&src0, RepeatMode::Slmsi, &mult, 5), 5);
        assert_eq!(t.repeat_offset(&src1, RepeatMode::Slmsi, &mult, 4), -4);
    }

    #[test]
    fn control_flow_is_unsupported() {
        let program = ProgramInfo::new(ShaderStage::Fragment);
        let tables = ConstantTables::default();
        let mut t = translator(&program, &tables);
        let err = t.translate(&Instruction::new(Opcode::Br)).unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }), "{err}");
        t.translate(&Instruction::new(Opcode::Nop)).unwrap();
    }
}
