use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegisterFlags: u32 {
        const ABSOLUTE = 0x1000;
        const NEGATIVE = 0x2000;
        /// Operand is a GPI register pinned by the encoding; repeats never advance it.
        const GPI = 0x4000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterBank {
    Temp,
    PrimAttr,
    Output,
    SecAttr,
    FpInternal,
    Special,
    Global,
    FpConstant,
    Immediate,
    Index,
    Indexed1,
    Indexed2,
    Predicate,
    Invalid,
}

impl RegisterBank {
    pub fn short_name(self) -> &'static str {
        match self {
            RegisterBank::Temp => "r",
            RegisterBank::PrimAttr => "pa",
            RegisterBank::Output => "o",
            RegisterBank::SecAttr => "sa",
            RegisterBank::FpInternal => "i",
            RegisterBank::Special => "spec",
            RegisterBank::Global => "g",
            RegisterBank::FpConstant => "c",
            RegisterBank::Immediate => "#",
            RegisterBank::Index => "idx",
            RegisterBank::Indexed1 => "idx1",
            RegisterBank::Indexed2 => "idx2",
            RegisterBank::Predicate => "p",
            RegisterBank::Invalid => "invalid",
        }
    }

    /// Banks that repeats and SMLSI increments advance through.
    pub fn is_repeatable(self) -> bool {
        matches!(
            self,
            RegisterBank::Temp
                | RegisterBank::PrimAttr
                | RegisterBank::Output
                | RegisterBank::SecAttr
                | RegisterBank::Predicate
        )
    }
}

/// Element type of an operand.
///
/// The declaration order is load-bearing: the 3-bit type field of `vmov` indexes it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    C10,
    F16,
    F32,
    UInt8,
    UInt16,
    UInt32,
    O8,
    Unk,
}

impl DataType {
    pub const MOVE_TYPES: [DataType; 8] = [
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::C10,
        DataType::F16,
        DataType::F32,
        DataType::UInt8,
        DataType::UInt16,
    ];

    /// Size of one element in bytes.
    pub fn size(self) -> u32 {
        match self {
            DataType::Int8 | DataType::UInt8 | DataType::O8 | DataType::C10 => 1,
            DataType::Int16 | DataType::UInt16 | DataType::F16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::F32 | DataType::Unk => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::C10 | DataType::F16 | DataType::F32)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::O8
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt16 | DataType::UInt32)
    }

    /// Type a GPI register holds when an operand of this type targets it.
    pub fn promoted(self) -> DataType {
        match self {
            DataType::F16 | DataType::C10 => DataType::F32,
            DataType::Int8 | DataType::Int16 | DataType::O8 => DataType::Int32,
            DataType::UInt8 | DataType::UInt16 => DataType::UInt32,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "S8",
            DataType::Int16 => "S16",
            DataType::Int32 => "S32",
            DataType::C10 => "C10",
            DataType::F16 => "F16",
            DataType::F32 => "F32",
            DataType::UInt8 => "U8",
            DataType::UInt16 => "U16",
            DataType::UInt32 => "U32",
            DataType::O8 => "O8",
            DataType::Unk => "UNK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwizzleChannel {
    X,
    Y,
    Z,
    W,
    Zero,
    One,
    Two,
    Half,
    Undefined,
}

impl SwizzleChannel {
    pub const STORAGE: [SwizzleChannel; 4] = [
        SwizzleChannel::X,
        SwizzleChannel::Y,
        SwizzleChannel::Z,
        SwizzleChannel::W,
    ];

    /// Index of the storage component this channel reads, if any.
    pub fn storage_index(self) -> Option<u32> {
        match self {
            SwizzleChannel::X => Some(0),
            SwizzleChannel::Y => Some(1),
            SwizzleChannel::Z => Some(2),
            SwizzleChannel::W => Some(3),
            _ => None,
        }
    }

    /// Literal selected by a constant channel.
    pub fn constant(self) -> Option<f32> {
        match self {
            SwizzleChannel::Zero => Some(0.0),
            SwizzleChannel::One => Some(1.0),
            SwizzleChannel::Two => Some(2.0),
            SwizzleChannel::Half => Some(0.5),
            _ => None,
        }
    }

    pub fn is_constant(self) -> bool {
        self.constant().is_some()
    }

    pub fn from_index(index: u32) -> SwizzleChannel {
        match index {
            0 => SwizzleChannel::X,
            1 => SwizzleChannel::Y,
            2 => SwizzleChannel::Z,
            3 => SwizzleChannel::W,
            4 => SwizzleChannel::Zero,
            5 => SwizzleChannel::One,
            6 => SwizzleChannel::Two,
            7 => SwizzleChannel::Half,
            _ => SwizzleChannel::Undefined,
        }
    }

    fn letter(self) -> char {
        match self {
            SwizzleChannel::X => 'x',
            SwizzleChannel::Y => 'y',
            SwizzleChannel::Z => 'z',
            SwizzleChannel::W => 'w',
            SwizzleChannel::Zero => '0',
            SwizzleChannel::One => '1',
            SwizzleChannel::Two => '2',
            SwizzleChannel::Half => 'h',
            SwizzleChannel::Undefined => '?',
        }
    }
}

pub type Swizzle4 = [SwizzleChannel; 4];
pub type Swizzle3 = [SwizzleChannel; 3];

pub const SWIZZLE_XYZW: Swizzle4 = SwizzleChannel::STORAGE;

/// Whether the first `len` channels are the identity selection.
pub fn is_default_swizzle(swizzle: &Swizzle4, len: usize) -> bool {
    swizzle
        .iter()
        .take(len.min(4))
        .zip(SwizzleChannel::STORAGE)
        .all(|(&a, b)| a == b)
}

pub fn swizzle_to_string(swizzle: &Swizzle4) -> String {
    swizzle.iter().map(|c| c.letter()).collect()
}

pub fn to_swizzle4(swizzle: Swizzle3) -> Swizzle4 {
    [swizzle[0], swizzle[1], swizzle[2], SwizzleChannel::X]
}

/// Number of set bits in a 4-bit write mask.
pub fn mask_count(mask: u32) -> u32 {
    (mask & 0b1111).count_ones()
}

/// Iterates the set component indices of a 4-bit mask in ascending order.
pub fn mask_bits(mask: u32) -> impl Iterator<Item = u32> {
    (0..4).filter(move |i| mask & (1 << i) != 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub num: u32,
    pub bank: RegisterBank,
    pub flags: RegisterFlags,
    pub swizzle: Swizzle4,
    pub ty: DataType,
    /// Encoding slot the operand was decoded from: 0..=2 for sources, 3 for the destination.
    pub index: u8,
}

impl Default for Operand {
    fn default() -> Self {
        Operand {
            num: 0,
            bank: RegisterBank::Invalid,
            flags: RegisterFlags::empty(),
            swizzle: SWIZZLE_XYZW,
            ty: DataType::F32,
            index: 0,
        }
    }
}

impl Operand {
    pub fn new(bank: RegisterBank, num: u32, ty: DataType) -> Operand {
        Operand {
            bank,
            num,
            ty,
            ..Default::default()
        }
    }

    /// Whether both operands read the same components of the same register under `mask`.
    pub fn is_same(&self, other: &Operand, mask: u32) -> bool {
        if self.bank != other.bank || self.num != other.num || self.flags != other.flags {
            return false;
        }
        mask_bits(mask).all(|i| self.swizzle[i as usize] == other.swizzle[i as usize])
    }

    pub fn describe(&self, mask: u32) -> String {
        let mut out = String::new();
        if self.flags.contains(RegisterFlags::NEGATIVE) {
            out.push('-');
        }
        if self.flags.contains(RegisterFlags::ABSOLUTE) {
            out.push_str("abs(");
        }
        out.push_str(self.bank.short_name());
        out.push_str(&self.num.to_string());
        if mask != 0 {
            out.push('.');
            for i in mask_bits(mask) {
                out.push(self.swizzle[i as usize].letter());
            }
        }
        if self.flags.contains(RegisterFlags::ABSOLUTE) {
            out.push(')');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtPredicate {
    #[default]
    None,
    P0,
    P1,
    P2,
    P3,
    NegP0,
    NegP1,
    Pn,
}

impl ExtPredicate {
    pub const TABLE: [ExtPredicate; 8] = [
        ExtPredicate::None,
        ExtPredicate::P0,
        ExtPredicate::P1,
        ExtPredicate::P2,
        ExtPredicate::P3,
        ExtPredicate::NegP0,
        ExtPredicate::NegP1,
        ExtPredicate::Pn,
    ];

    /// Predicate register index and negation, for predicates that test a register.
    pub fn register(self) -> Option<(u32, bool)> {
        match self {
            ExtPredicate::P0 => Some((0, false)),
            ExtPredicate::P1 => Some((1, false)),
            ExtPredicate::P2 => Some((2, false)),
            ExtPredicate::P3 => Some((3, false)),
            ExtPredicate::NegP0 => Some((0, true)),
            ExtPredicate::NegP1 => Some((1, true)),
            ExtPredicate::None | ExtPredicate::Pn => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortPredicate {
    None,
    P0,
    P1,
    NegP0,
}

impl ShortPredicate {
    pub fn from_bits(bits: u64) -> ShortPredicate {
        match bits & 0b11 {
            0 => ShortPredicate::None,
            1 => ShortPredicate::P0,
            2 => ShortPredicate::P1,
            _ => ShortPredicate::NegP0,
        }
    }
}

impl From<ShortPredicate> for ExtPredicate {
    fn from(value: ShortPredicate) -> Self {
        match value {
            ShortPredicate::None => ExtPredicate::None,
            ShortPredicate::P0 => ExtPredicate::P0,
            ShortPredicate::P1 => ExtPredicate::P1,
            ShortPredicate::NegP0 => ExtPredicate::NegP0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    Unconditional,
    Conditional,
    ConditionalU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMethod {
    NeZero,
    EqZero,
    LtZero,
    LteZero,
}

impl CompareMethod {
    pub fn from_bits(bits: u64) -> CompareMethod {
        match bits & 0b11 {
            0 => CompareMethod::NeZero,
            1 => CompareMethod::EqZero,
            2 => CompareMethod::LtZero,
            _ => CompareMethod::LteZero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    Slmsi,
    #[default]
    Internal,
    External,
    Both,
}

impl RepeatMode {
    pub fn from_bits(bits: u64) -> RepeatMode {
        match bits & 0b11 {
            0 => RepeatMode::Slmsi,
            1 => RepeatMode::Internal,
            2 => RepeatMode::External,
            _ => RepeatMode::Both,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_helpers() {
        assert_eq!(mask_count(0b1011), 3);
        assert_eq!(mask_bits(0b1010).collect::<Vec<_>>(), vec![1, 3]);
        assert!(is_default_swizzle(&SWIZZLE_XYZW, 4));
        let sw = [
            SwizzleChannel::X,
            SwizzleChannel::Y,
            SwizzleChannel::One,
            SwizzleChannel::W,
        ];
        assert!(is_default_swizzle(&sw, 2));
        assert!(!is_default_swizzle(&sw, 3));
    }

    #[test]
    fn move_type_table_follows_declaration_order() {
        assert_eq!(DataType::MOVE_TYPES[4], DataType::F16);
        assert_eq!(DataType::MOVE_TYPES[5], DataType::F32);
        assert_eq!(DataType::F16.size(), 2);
        assert_eq!(DataType::C10.size(), 1);
        assert_eq!(DataType::UInt16.promoted(), DataType::UInt32);
    }

    #[test]
    fn operand_description() {
        let mut op = Operand::new(RegisterBank::PrimAttr, 4, DataType::F32);
        op.flags |= RegisterFlags::NEGATIVE;
        assert_eq!(op.describe(0b0101), "-pa4.xz");
    }
}
