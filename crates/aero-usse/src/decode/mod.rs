//! USSE instruction word decoding.

mod dual;
pub mod helpers;
mod misc;
mod vector;

use crate::types::{
    CompareMethod, DataType, ExtPredicate, MoveType, Operand, RegisterBank, RepeatMode,
};

use helpers::BitPattern;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub word: u64,
    pub message: String,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "USSE decode error for word {:#018x}: {}",
            self.word, self.message
        )
    }
}

impl std::error::Error for DecodeError {}

fn err(word: u64, message: impl Into<String>) -> DecodeError {
    DecodeError {
        word,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Vmov,
    Vmovc,
    Vmovcu8,
    Vmad,
    Vf16Mad,
    Vmul,
    Vadd,
    Vfrc,
    Vdsx,
    Vdsy,
    Vmin,
    Vmax,
    Vdp,
    Vf16Mul,
    Vf16Add,
    Vf16Frc,
    Vf16Dsx,
    Vf16Dsy,
    Vf16Min,
    Vf16Max,
    Vf16Dp,
    Vrcp,
    Vrsq,
    Vlog,
    Vexp,
    Vssq,
    Fmad,
    Fadd,
    Fmul,
    Fsubflr,
    Frsq,
    Frcp,
    Fexp,
    Flog,
    Vpck { dest: DataType, src: DataType },
    And,
    Or,
    Xor,
    Shl,
    Rol,
    Shr,
    Asr,
    Sop2,
    Sop2m,
    Sop3,
    Vtst,
    Vtstmsk,
    Ldr,
    Str,
    Limm,
    Smlsi,
    Nop,
    Phas,
    Spec,
    Smp,
    Kill,
    Br,
}

impl Opcode {
    /// Disassembly mnemonic.
    pub fn name(&self) -> String {
        let s = match self {
            Opcode::Vmov => "VMOV",
            Opcode::Vmovc => "VMOVC",
            Opcode::Vmovcu8 => "VMOVCU8",
            Opcode::Vmad => "VMAD",
            Opcode::Vf16Mad => "VF16MAD",
            Opcode::Vmul => "VMUL",
            Opcode::Vadd => "VADD",
            Opcode::Vfrc => "VFRC",
            Opcode::Vdsx => "VDSX",
            Opcode::Vdsy => "VDSY",
            Opcode::Vmin => "VMIN",
            Opcode::Vmax => "VMAX",
            Opcode::Vdp => "VDP",
            Opcode::Vf16Mul => "VF16MUL",
            Opcode::Vf16Add => "VF16ADD",
            Opcode::Vf16Frc => "VF16FRC",
            Opcode::Vf16Dsx => "VF16DSX",
            Opcode::Vf16Dsy => "VF16DSY",
            Opcode::Vf16Min => "VF16MIN",
            Opcode::Vf16Max => "VF16MAX",
            Opcode::Vf16Dp => "VF16DP",
            Opcode::Vrcp => "VRCP",
            Opcode::Vrsq => "VRSQ",
            Opcode::Vlog => "VLOG",
            Opcode::Vexp => "VEXP",
            Opcode::Vssq => "VSSQ",
            Opcode::Fmad => "FMAD",
            Opcode::Fadd => "FADD",
            Opcode::Fmul => "FMUL",
            Opcode::Fsubflr => "FSUBFLR",
            Opcode::Frsq => "FRSQ",
            Opcode::Frcp => "FRCP",
            Opcode::Fexp => "FEXP",
            Opcode::Flog => "FLOG",
            Opcode::Vpck { dest, src } => return format!("VPCK{}{}", dest.name(), src.name()),
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Shl => "SHL",
            Opcode::Rol => "ROL",
            Opcode::Shr => "SHR",
            Opcode::Asr => "ASR",
            Opcode::Sop2 => "SOP2",
            Opcode::Sop2m => "SOP2M",
            Opcode::Sop3 => "SOP3",
            Opcode::Vtst => "VTST",
            Opcode::Vtstmsk => "VTSTMSK",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Limm => "LIMM",
            Opcode::Smlsi => "SMLSI",
            Opcode::Nop => "NOP",
            Opcode::Phas => "PHAS",
            Opcode::Spec => "SPEC",
            Opcode::Smp => "SMP",
            Opcode::Kill => "KILL",
            Opcode::Br => "BR",
        };
        s.to_string()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Sub,
    Min,
    Max,
}

impl BlendOp {
    pub const TABLE: [BlendOp; 4] = [BlendOp::Add, BlendOp::Sub, BlendOp::Min, BlendOp::Max];
}

/// Operation a test instruction evaluates before comparing against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestAlu {
    Add,
    Sub,
    Mul,
    Min,
    Max,
    Frc,
    Rcp,
    Rsq,
    Log,
    Exp,
    Dp,
    Dsx,
    Dsy,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Rol,
    Asr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCompare {
    NotEqual,
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionDetail {
    None,
    Move {
        move_type: MoveType,
        compare: CompareMethod,
    },
    Pack {
        scale: bool,
        /// Components read from src2 when an F32 source spills into a second, non-adjacent
        /// register. Zero when src1 alone covers the write.
        src2_mask: u32,
    },
    Dot {
        /// Vector dot products rotate their write mask on every repeat.
        rotate_mask: bool,
    },
    Sop2 {
        cop: BlendOp,
        aop: BlendOp,
        csel1: u32,
        csel2: u32,
        asel1: u32,
        asel2: u32,
        cmod1: bool,
        cmod2: bool,
        amod1: bool,
        amod2: bool,
        src1_mod: bool,
    },
    Sop2m {
        cop: BlendOp,
        aop: BlendOp,
        sel1: u32,
        sel2: u32,
        mod1: bool,
        mod2: bool,
    },
    Test {
        alu: TestAlu,
        compare: TestCompare,
        /// Element type written by a mask test; `None` when the result targets a predicate.
        mask_type: Option<DataType>,
    },
    Bitwise {
        src2_invert: bool,
        src2_rot: u32,
        immediate: Option<u32>,
    },
    Dual {
        second: Box<Instruction>,
    },
    LoadStore {
        data_type: DataType,
        count: u32,
        moe_expand: bool,
    },
    LoadImmediate {
        value: u32,
    },
    Smlsi {
        /// Dest, src0, src1, src2.
        inc_modes: [bool; 4],
        incs: [u8; 4],
        limits: [u32; 3],
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Operand,
    pub src0: Operand,
    pub src1: Operand,
    pub src2: Operand,
    pub dest_mask: u32,
    pub source_mask: u32,
    pub predicate: ExtPredicate,
    pub repeat_count: u32,
    pub repeat_mode: RepeatMode,
    /// Lane multiplier applied to SLMSI increments, indexed by operand slot.
    pub repeat_multiplier: [u32; 4],
    pub skip_invalid: bool,
    pub end: bool,
    pub detail: InstructionDetail,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            dest: Operand {
                index: 3,
                ..Default::default()
            },
            src0: Operand {
                index: 0,
                ..Default::default()
            },
            src1: Operand {
                index: 1,
                ..Default::default()
            },
            src2: Operand {
                index: 2,
                ..Default::default()
            },
            dest_mask: 0b1111,
            source_mask: 0b1111,
            predicate: ExtPredicate::None,
            repeat_count: 0,
            repeat_mode: RepeatMode::Slmsi,
            repeat_multiplier: [2; 4],
            skip_invalid: false,
            end: false,
            detail: InstructionDetail::None,
        }
    }

    pub fn operands(&self) -> [&Operand; 4] {
        [&self.src0, &self.src1, &self.src2, &self.dest]
    }

    /// Whether any operand names a bank the translators cannot address.
    pub fn uses_special_bank(&self) -> bool {
        self.operands()
            .iter()
            .any(|op| op.bank == RegisterBank::Special)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Vmov,
    Vmad,
    Vmad2,
    Vnmad32,
    Vnmad16,
    Vpck,
    Sop2,
    Sop2m,
    Sop3,
    Vtst,
    Vtstmsk,
    Vbw,
    Limm,
    Phas,
    Nop,
    Br,
    Smp,
    Smlsi,
    Kill,
    Spec,
    Vcomp,
    Vdp,
    Vdual,
    Vldst,
}

struct Matcher {
    family: Family,
    name: &'static str,
    layout: &'static str,
    pattern: BitPattern,
}

impl Matcher {
    const fn new(family: Family, name: &'static str, layout: &'static str) -> Self {
        Matcher {
            family,
            name,
            layout,
            pattern: BitPattern::parse(layout),
        }
    }
}

/// Bit layouts of every encoding family. Character 0 is bit 63.
pub mod layouts {
    pub const VMOV: &str = "00111pppstrydecbmmaanoooiwwwwkllffgghhhhjjjjjjqqqqqquuuuuuvvvvvv";
    pub const VMAD: &str = "00011pppsg1oderiiattnwwwwcbfhzkkjjllmmmmmmqqqquuuuvvxyAAAABBBBBB";
    pub const VMAD2: &str = "00000dpps-ry-cbawwwineeeemmookttffgghhhhhhzzjjllllllqqqqqquuuuuu";
    pub const VNMAD32: &str = "00001pppsrrydcbawwwwneeeemmoiittkkllffffffzzzzzzzggghhhhhhjjjjjj";
    pub const VNMAD16: &str = "00010pppsrrydcbawwwwneeeemmoiittkkllffffffzzzzzzzggghhhhhhjjjjjj";
    pub const VPCK: &str = "01000pppsnuyderc-aaaffftttmmmmbbkkllgggggggoohiijjqqqqqqvwwwwwwx";
    pub const SOP2: &str = "10000ppcsnaaderbmooofllggghhhittkkjjqqqqqqquvvwwxyzzzzzzzAAAAAAA";
    pub const SOP2M: &str = "10010ppcsnooderbmwwwwaaggghhhttkkjj--------qqqqqqqzzzzzzzAAAAAAA";
    pub const SOP3: &str = "10001pp---------------------------------------------------------";
    pub const VTST: &str = "01001ppps-oydrceavttiizzmhhhnnbbkkffgggggggwlluuuujjjjjjjqqqqqqq";
    pub const VTSTMSK: &str = "01111ppps-oydtrcevuuiizzm-aa--bbnnkkfffffffwllgggghhhhhhhjjjjjjj";
    pub const VBW: &str = "01ooopppsnrydecxmmmmittttthhabkkffggjjjjjjjlllllllqqqqqqquuuuuuu";
    pub const LIMM: &str = "11111snde110yyyyyypppxxxxxbb-tttttttzzzzzzzzzzzzzzzzzzzzz-------";
    pub const PHAS: &str = "11111----100----------------------------------------------------";
    pub const NOP: &str = "11111----000-----------101--------------------------------------";
    pub const BR: &str = "11111ppps000e-----wynba00r----------------iloooooooooooooooooooo";
    pub const SMP: &str = "11100pppsn-ymrceffaaddlltbbggkhhiijjoooooooqqqqqqquuuuuuuvvvvvvv";
    pub const SMLSI: &str = "11111010--01-n--ttttppppssssdrcieeeeeeeeaaaaaaaabbbbbbbbffffffff";
    pub const KILL: &str = "11111001--11000000000pp00000011011110000000000000000000000000000";
    pub const SPEC: &str = "11111----scc----------------------------------------------------";
    pub const VCOMP: &str = "00110pppsddyenr-aaaaobbccmmff-ttkk--ggggggg-------hhhhhhh---wwww";
    pub const VDP: &str = "00011pppsc0oderiigaanwwwwbflllttkkhhjjjjjjzzzzmmmqqqyyyxxxuuuuuu";
    pub const VDUAL: &str = "0010cgsskdtpuuuunaaalriiiiwwwwmmffeebbbbbbbooohhjqvvxxyyyzzzzzzz";
    pub const VLDST: &str = "111oopppsnmycrbakkkkddeetgffihjlqquuvvvvvvvwwwwwwwxxxxxxxzzzzzzz";
}

// First match wins.
const TABLE: &[Matcher] = &[
    Matcher::new(Family::Vmov, "VMOV", layouts::VMOV),
    Matcher::new(Family::Vmad, "VMAD", layouts::VMAD),
    Matcher::new(Family::Vmad2, "VMAD2", layouts::VMAD2),
    Matcher::new(Family::Vnmad32, "VNMAD32", layouts::VNMAD32),
    Matcher::new(Family::Vnmad16, "VNMAD16", layouts::VNMAD16),
    Matcher::new(Family::Vpck, "VPCK", layouts::VPCK),
    Matcher::new(Family::Sop2, "SOP2", layouts::SOP2),
    Matcher::new(Family::Sop2m, "SOP2M", layouts::SOP2M),
    Matcher::new(Family::Sop3, "SOP3", layouts::SOP3),
    Matcher::new(Family::Vtst, "VTST", layouts::VTST),
    Matcher::new(Family::Vtstmsk, "VTSTMSK", layouts::VTSTMSK),
    Matcher::new(Family::Vbw, "VBW", layouts::VBW),
    Matcher::new(Family::Limm, "LIMM", layouts::LIMM),
    Matcher::new(Family::Phas, "PHAS", layouts::PHAS),
    Matcher::new(Family::Nop, "NOP", layouts::NOP),
    Matcher::new(Family::Br, "BR", layouts::BR),
    Matcher::new(Family::Smp, "SMP", layouts::SMP),
    Matcher::new(Family::Smlsi, "SMLSI", layouts::SMLSI),
    Matcher::new(Family::Kill, "KILL", layouts::KILL),
    Matcher::new(Family::Spec, "SPEC", layouts::SPEC),
    Matcher::new(Family::Vcomp, "VCOMP", layouts::VCOMP),
    Matcher::new(Family::Vdp, "VDP", layouts::VDP),
    Matcher::new(Family::Vdual, "VDUAL", layouts::VDUAL),
    Matcher::new(Family::Vldst, "VLDST", layouts::VLDST),
];

/// Name of the encoding family a word belongs to, if any.
pub fn family_name(word: u64) -> Option<&'static str> {
    TABLE
        .iter()
        .find(|m| m.pattern.matches(word))
        .map(|m| m.name)
}

/// Decodes one instruction word.
///
/// `secondary` selects the secondary-program register mapping, where every addressable bank except
/// internal registers, constants and immediates aliases the secondary attributes.
pub fn decode(word: u64, secondary: bool) -> Result<Instruction, DecodeError> {
    let matcher = TABLE
        .iter()
        .find(|m| m.pattern.matches(word))
        .ok_or_else(|| err(word, "instruction unmatched"))?;

    let f = helpers::Fields::new(word, matcher.layout);
    match matcher.family {
        Family::Vmov => vector::vmov(f, secondary),
        Family::Vmad => vector::vmad(f, secondary),
        Family::Vmad2 => vector::vmad2(f, secondary),
        Family::Vnmad32 => vector::vnmad(f, true, secondary),
        Family::Vnmad16 => vector::vnmad(f, false, secondary),
        Family::Vpck => vector::vpck(f, secondary),
        Family::Vcomp => vector::vcomp(f, secondary),
        Family::Vdp => vector::vdp(f, secondary),
        Family::Vdual => dual::vdual(f, secondary),
        Family::Sop2 => misc::sop2(f, secondary),
        Family::Sop2m => misc::sop2m(f, secondary),
        Family::Sop3 => misc::sop3(f),
        Family::Vtst => misc::vtst(f, secondary),
        Family::Vtstmsk => misc::vtstmsk(f, secondary),
        Family::Vbw => misc::vbw(f, secondary),
        Family::Limm => misc::limm(f, secondary),
        Family::Vldst => misc::vldst(f, secondary),
        Family::Smlsi => misc::smlsi(f),
        Family::Phas => Ok(Instruction::new(Opcode::Phas)),
        Family::Nop => Ok(Instruction::new(Opcode::Nop)),
        Family::Spec => Ok(Instruction::new(Opcode::Spec)),
        Family::Br => misc::control(f, Opcode::Br),
        Family::Smp => misc::control(f, Opcode::Smp),
        Family::Kill => misc::control(f, Opcode::Kill),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_64_bits() {
        for m in TABLE {
            assert_eq!(m.layout.len(), 64, "{}", m.name);
        }
    }

    #[test]
    fn vmad_and_vdp_are_told_apart_by_bit_53() {
        let vmad = 0b00011u64 << 59 | 1 << 53;
        let vdp = 0b00011u64 << 59;
        assert_eq!(family_name(vmad), Some("VMAD"));
        assert_eq!(family_name(vdp), Some("VDP"));
    }

    #[test]
    fn limm_wins_over_special_catch_all() {
        let word = 0b11111u64 << 59 | 0b110 << 52;
        assert_eq!(family_name(word), Some("LIMM"));
        let phas = 0b11111u64 << 59 | 0b100 << 52;
        assert_eq!(family_name(phas), Some("PHAS"));
    }

    #[test]
    fn unmatched_word_is_an_error() {
        // 0b11010 is not assigned to any family.
        let word = 0b11010u64 << 59;
        let e = decode(word, false).unwrap_err();
        assert_eq!(e.word, word);
        assert!(e.to_string().contains("unmatched"), "{e}");
    }
}
