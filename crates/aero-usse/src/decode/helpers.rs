use crate::types::{
    to_swizzle4, DataType, Operand, RegisterBank, RegisterFlags, Swizzle3, Swizzle4,
    SwizzleChannel,
};

use SwizzleChannel::{Half as H, One as O, Two as T, Undefined as U, Zero as N, W, X, Y, Z};

/// Field reader over one instruction word, keyed by the letters of its layout string.
///
/// Character 0 of the layout is bit 63. A field is the concatenation, most significant first, of
/// every position labelled with its letter.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
    word: u64,
    layout: &'static str,
}

impl Fields {
    pub fn new(word: u64, layout: &'static str) -> Self {
        Fields { word, layout }
    }

    pub fn word(&self) -> u64 {
        self.word
    }

    pub fn get(&self, letter: char) -> u64 {
        let mut value = 0u64;
        for (pos, c) in self.layout.chars().enumerate() {
            if c == letter {
                let bit = (self.word >> (63 - pos)) & 1;
                value = (value << 1) | bit;
            }
        }
        value
    }

    pub fn u32(&self, letter: char) -> u32 {
        self.get(letter) as u32
    }

    pub fn flag(&self, letter: char) -> bool {
        self.get(letter) != 0
    }
}

/// Bit-string pattern with `0`/`1` fixed positions; every other character is a field or a
/// don't-care.
#[derive(Debug, Clone, Copy)]
pub struct BitPattern {
    pub mask: u64,
    pub expected: u64,
}

impl BitPattern {
    pub const fn parse(layout: &str) -> BitPattern {
        let bytes = layout.as_bytes();
        let mut mask = 0u64;
        let mut expected = 0u64;
        let mut i = 0;
        while i < bytes.len() && i < 64 {
            let bit = 63 - i;
            match bytes[i] {
                b'0' => mask |= 1 << bit,
                b'1' => {
                    mask |= 1 << bit;
                    expected |= 1 << bit;
                }
                _ => {}
            }
            i += 1;
        }
        BitPattern { mask, expected }
    }

    pub fn matches(&self, word: u64) -> bool {
        word & self.mask == self.expected
    }
}

/// Builds a word from `layout`: the fixed `0`/`1` positions come from the layout and each field
/// fills the positions labelled with its letter, most significant first. The inverse of
/// [`Fields::get`].
pub fn encode(layout: &str, fields: &[(char, u64)]) -> u64 {
    let mut word = BitPattern::parse(layout).expected;
    for &(letter, value) in fields {
        let mut remaining = layout.chars().filter(|&c| c == letter).count() as u32;
        for (pos, c) in layout.chars().enumerate() {
            if c == letter {
                remaining -= 1;
                word |= ((value >> remaining) & 1) << (63 - pos);
            }
        }
    }
    word
}

fn dest_bank(bank: u32, ext: bool) -> RegisterBank {
    if bank == 3 {
        return RegisterBank::Indexed1;
    }
    match (ext, bank) {
        (true, 0) => RegisterBank::SecAttr,
        (true, 1) => RegisterBank::Special,
        (true, _) => RegisterBank::Index,
        (false, 0) => RegisterBank::Temp,
        (false, 1) => RegisterBank::Output,
        (false, _) => RegisterBank::PrimAttr,
    }
}

fn src0_bank(bank: u32, ext: bool) -> RegisterBank {
    match (ext, bank) {
        (true, 0) => RegisterBank::Output,
        (true, 1) => RegisterBank::SecAttr,
        (false, 0) => RegisterBank::Temp,
        (false, 1) => RegisterBank::PrimAttr,
        _ => RegisterBank::Invalid,
    }
}

fn src12_bank(bank: u32, ext: bool) -> RegisterBank {
    match (ext, bank & 0b11) {
        (true, 0) => RegisterBank::Indexed1,
        (true, 1) => RegisterBank::Special,
        (true, 2) => RegisterBank::Immediate,
        (true, _) => RegisterBank::Indexed2,
        (false, 0) => RegisterBank::Temp,
        (false, 1) => RegisterBank::Output,
        (false, 2) => RegisterBank::PrimAttr,
        (false, _) => RegisterBank::SecAttr,
    }
}

/// Register-number width and pairing rules shared by every operand decoder.
#[derive(Debug, Clone, Copy)]
pub struct RegDecode {
    pub double_regs: bool,
    pub bits: u32,
    pub secondary: bool,
}

impl RegDecode {
    pub fn new(double_regs: bool, bits: u32, secondary: bool) -> Self {
        RegDecode {
            double_regs,
            bits,
            secondary,
        }
    }

    fn finalize(&self, op: &mut Operand) {
        if self.double_regs && !matches!(op.bank, RegisterBank::Special | RegisterBank::Immediate)
        {
            op.num = (op.num << 1) & 0xFF;
        }

        // The top of the temporary range aliases the internal registers.
        let reserved = if self.double_regs { 8 } else { 4 };
        let limit = (1u32 << self.bits).saturating_sub(reserved);
        if op.bank == RegisterBank::Temp && op.num >= limit {
            op.num -= limit;
            if self.double_regs {
                op.num >>= 1;
            }
            op.bank = RegisterBank::FpInternal;
        }

        if op.bank == RegisterBank::Special {
            if op.num & 0x40 != 0 {
                op.num &= !0x40;
                op.bank = RegisterBank::Global;
            } else {
                op.bank = RegisterBank::FpConstant;
            }
        }

        // The secondary program only sees its own attribute file.
        if self.secondary
            && !matches!(
                op.bank,
                RegisterBank::FpInternal | RegisterBank::FpConstant | RegisterBank::Immediate
            )
        {
            op.bank = RegisterBank::SecAttr;
        }
    }

    pub fn dest(&self, num: u32, bank: u32, ext: bool) -> Operand {
        let mut op = Operand {
            num,
            bank: dest_bank(bank, ext),
            index: 3,
            ..Default::default()
        };
        self.finalize(&mut op);
        op
    }

    pub fn src0(&self, num: u32, bank: u32, ext: bool) -> Operand {
        let mut op = Operand {
            num,
            bank: src0_bank(bank, ext),
            index: 0,
            ..Default::default()
        };
        self.finalize(&mut op);
        op
    }

    pub fn src12(&self, num: u32, bank: u32, ext: bool, slot: u8) -> Operand {
        let mut op = Operand {
            num,
            bank: src12_bank(bank, ext),
            index: slot,
            ..Default::default()
        };
        self.finalize(&mut op);
        op
    }
}

/// A GPI operand addressed directly by an instruction field.
pub fn internal_operand(num: u32, slot: u8, ty: DataType) -> Operand {
    Operand {
        num,
        bank: RegisterBank::FpInternal,
        flags: RegisterFlags::GPI,
        ty,
        index: slot,
        ..Default::default()
    }
}

pub fn decode_write_mask(bank: RegisterBank, mask: u32, f16: bool) -> u32 {
    let wide_bank = matches!(
        bank,
        RegisterBank::PrimAttr
            | RegisterBank::SecAttr
            | RegisterBank::Output
            | RegisterBank::FpInternal
            | RegisterBank::Temp
    );
    if bank == RegisterBank::FpInternal || (f16 && !wide_bank) {
        return mask;
    }

    if f16 {
        let mut out = 0;
        if mask & 0b0001 != 0 {
            out |= 0b0011;
        }
        if mask & 0b0100 != 0 {
            out |= 0b1100;
        }
        out
    } else {
        mask & 0b11
    }
}

pub fn decode_modifier(bits: u32) -> RegisterFlags {
    let mut flags = RegisterFlags::empty();
    if bits & 0b01 != 0 {
        flags |= RegisterFlags::NEGATIVE;
    }
    if bits & 0b10 != 0 {
        flags |= RegisterFlags::ABSOLUTE;
    }
    flags
}

/// Four 3-bit channel selectors, channel `i` at bits `3i..3i+3`.
pub fn decode_swizzle4(encoded: u32) -> Swizzle4 {
    [
        SwizzleChannel::from_index(encoded & 0b111),
        SwizzleChannel::from_index((encoded >> 3) & 0b111),
        SwizzleChannel::from_index((encoded >> 6) & 0b111),
        SwizzleChannel::from_index((encoded >> 9) & 0b111),
    ]
}

pub fn swizzle_cast(sel: [u32; 4]) -> Swizzle4 {
    sel.map(SwizzleChannel::from_index)
}

const UNDEF3: Swizzle3 = [U, U, U];
const UNDEF4: Swizzle4 = [U, U, U, U];

const VEC4_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, W, W],
    [X, Y, Z, Z],
    [X, X, Y, Z],
    [X, Y, X, Y],
    [X, Y, W, Z],
    [Z, X, Y, W],
    [Z, W, Z, W],
    [Y, Z, X, Z],
    [X, X, Y, Y],
    [X, Z, W, W],
    [X, Y, Z, O],
];

const VEC4_EXT: [Swizzle4; 16] = [
    [Y, Z, X, W],
    [Z, W, X, Y],
    [X, Z, W, Y],
    [Y, Y, W, W],
    [W, Y, Z, W],
    [W, Z, W, Z],
    [X, Y, Z, X],
    [Z, Z, W, W],
    [X, W, Z, X],
    [Y, Y, Y, X],
    [Y, Y, Y, Z],
    [X, Z, Y, W],
    [X, X, X, Y],
    [Z, Y, X, W],
    [Y, Y, Z, Z],
    [Z, Z, Z, Y],
];

const VEC3_STD: [Swizzle3; 16] = [
    [X, X, X],
    [Y, Y, Y],
    [Z, Z, Z],
    [W, W, W],
    [X, Y, Z],
    [Y, Z, W],
    [X, X, Y],
    [X, Y, X],
    [Y, Y, X],
    [Y, Y, Z],
    [Z, X, Y],
    [X, Z, Y],
    [Y, Z, X],
    [Z, Y, X],
    [Z, Z, Y],
    [X, Y, O],
];

const VEC3_EXT: [Swizzle3; 16] = [
    [X, Y, Y],
    [Y, X, Y],
    [X, X, Z],
    [Y, X, X],
    [X, Y, N],
    [X, O, N],
    [N, N, N],
    [O, O, O],
    [H, H, H],
    [T, T, T],
    [X, N, N],
    UNDEF3,
    UNDEF3,
    UNDEF3,
    UNDEF3,
    UNDEF3,
];

const SCALAR_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [N, N, N, N],
    [O, O, O, O],
    [T, T, T, T],
    [H, H, H, H],
    UNDEF4,
    UNDEF4,
    UNDEF4,
    UNDEF4,
    UNDEF4,
    UNDEF4,
    UNDEF4,
    UNDEF4,
];

/// Swizzle table lookup for the 4-bit encodings. `kind` is 0 for scalar, 1 for vec3, 2 for vec4.
pub fn decode_vec34_swizzle(swizzle: u32, extended: bool, kind: u32) -> Swizzle4 {
    let idx = (swizzle & 0xF) as usize;
    match (kind, extended) {
        (0, false) => SCALAR_STD[idx],
        (0, true) => UNDEF4,
        (1, false) => to_swizzle4(VEC3_STD[idx]),
        (1, true) => to_swizzle4(VEC3_EXT[idx]),
        (_, false) => VEC4_STD[idx],
        (_, true) => VEC4_EXT[idx],
    }
}

const DUAL_VEC4_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, W, W],
    [X, Y, Z, Z],
    [X, X, Y, Z],
    [X, Y, X, Y],
    [X, Y, W, Z],
    [Z, X, Y, W],
    [Z, W, Z, W],
    [N, N, N, N],
    [H, H, H, H],
    [O, O, O, O],
    [T, T, T, T],
];

const DUAL_VEC4_EXT: [Swizzle4; 16] = [
    [Y, Z, X, W],
    [Z, W, X, Y],
    [X, Z, W, Y],
    [Y, Y, W, W],
    [W, Y, Z, W],
    [W, Z, W, Z],
    [X, Y, Z, X],
    [Z, Z, W, W],
    [X, W, Z, X],
    [Y, Y, Y, X],
    [Y, Y, Y, Z],
    [Z, W, Z, W],
    [Y, Z, X, Z],
    [X, X, Y, Y],
    [X, Z, W, W],
    [X, Y, Z, O],
];

const DUAL_VEC3_STD: [Swizzle3; 16] = [
    [X, X, X],
    [Y, Y, Y],
    [Z, Z, Z],
    [W, W, W],
    [X, Y, Z],
    [Y, Z, W],
    [X, X, Y],
    [X, Y, X],
    [Y, Y, X],
    [Y, Y, Z],
    [Z, X, Y],
    [X, Z, Y],
    [N, N, N],
    [H, H, H],
    [O, O, O],
    [T, T, T],
];

const DUAL_VEC3_EXT: [Swizzle3; 16] = [
    [X, Y, Y],
    [Y, X, Y],
    [X, X, Z],
    [Y, X, X],
    [X, Y, N],
    [X, O, N],
    [X, Z, Y],
    [Y, Z, X],
    [Z, Y, X],
    [Z, Z, Y],
    [X, Y, O],
    UNDEF3,
    UNDEF3,
    UNDEF3,
    UNDEF3,
    UNDEF3,
];

pub fn decode_dual_swizzle(swizzle: u32, extended: bool, vec4: bool) -> Swizzle4 {
    let idx = (swizzle & 0xF) as usize;
    match (vec4, extended) {
        (true, false) => DUAL_VEC4_STD[idx],
        (true, true) => DUAL_VEC4_EXT[idx],
        (false, false) => to_swizzle4(DUAL_VEC3_STD[idx]),
        (false, true) => to_swizzle4(DUAL_VEC3_EXT[idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_follow_layout_letters() {
        let layout = "aaaabbbb--------------------------------------------------------";
        let word = 0xA5u64 << 56;
        let f = Fields::new(word, layout);
        assert_eq!(f.get('a'), 0xA);
        assert_eq!(f.get('b'), 0x5);
    }

    #[test]
    fn encode_inverts_fields() {
        let layout = "11aab-bbcc------------------------------------------------------";
        let word = encode(layout, &[('a', 0b10), ('b', 0b101), ('c', 0b01)]);
        let f = Fields::new(word, layout);
        assert_eq!(f.get('a'), 0b10);
        assert_eq!(f.get('b'), 0b101);
        assert_eq!(f.get('c'), 0b01);
        assert!(BitPattern::parse(layout).matches(word));
    }

    #[test]
    fn pattern_fixed_bits() {
        let p = BitPattern::parse("101-------------------------------------------------------------");
        assert!(p.matches(0b101u64 << 61));
        assert!(p.matches((0b101u64 << 61) | 1));
        assert!(!p.matches(0b100u64 << 61));
    }

    #[test]
    fn high_temps_alias_internal_registers() {
        let single = RegDecode::new(false, 7, false).dest(125, 0, false);
        assert_eq!(single.bank, RegisterBank::FpInternal);
        assert_eq!(single.num, 1);

        // 0x7E doubles to 0xFC, which is GPI 2 once the 8-register window is removed.
        let doubled = RegDecode::new(true, 8, false).src12(0x7E, 0, false, 1);
        assert_eq!(doubled.bank, RegisterBank::FpInternal);
        assert_eq!(doubled.num, 2);
    }

    #[test]
    fn special_bank_splits_into_global_and_constants() {
        let c = RegDecode::new(false, 7, false).src12(0x12, 1, true, 1);
        assert_eq!(c.bank, RegisterBank::FpConstant);
        let g = RegDecode::new(false, 7, false).src12(0x52, 1, true, 1);
        assert_eq!(g.bank, RegisterBank::Global);
        assert_eq!(g.num, 0x12);
    }

    #[test]
    fn secondary_program_maps_registers_to_sa() {
        let op = RegDecode::new(false, 7, true).src12(3, 0, false, 1);
        assert_eq!(op.bank, RegisterBank::SecAttr);
        let imm = RegDecode::new(false, 7, true).src12(3, 2, true, 1);
        assert_eq!(imm.bank, RegisterBank::Immediate);
    }

    #[test]
    fn swizzle_tables() {
        assert_eq!(decode_vec34_swizzle(4, false, 2), [X, Y, Z, W]);
        assert_eq!(decode_vec34_swizzle(15, false, 1), [X, Y, O, X]);
        assert_eq!(decode_vec34_swizzle(7, false, 0), [H, H, H, H]);
        assert_eq!(decode_dual_swizzle(12, false, true), [N, N, N, N]);
        assert_eq!(decode_swizzle4(0b011_010_001_000), [X, Y, Z, W]);
    }

    #[test]
    fn f16_write_masks_widen() {
        assert_eq!(decode_write_mask(RegisterBank::Temp, 0b0101, true), 0b1111);
        assert_eq!(decode_write_mask(RegisterBank::Temp, 0b1111, false), 0b0011);
        assert_eq!(decode_write_mask(RegisterBank::FpInternal, 0b1010, false), 0b1010);
    }
}
