//! Backend contract shared by the SPIR-V, GLSL and interpreter emitters.
//!
//! The front end (resolver, transfer engine and translators) is generic over [`Backend`] and never
//! inspects a value handle; it only asks the backend for the handle's [`IrType`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    F32,
    I32,
    U32,
    Bool,
}

impl Scalar {
    pub fn is_integer(self) -> bool {
        matches!(self, Scalar::I32 | Scalar::U32)
    }
}

/// A scalar (`count == 1`) or vector (`count` in `2..=4`) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrType {
    pub scalar: Scalar,
    pub count: u32,
}

impl IrType {
    pub const F32: IrType = IrType::scalar(Scalar::F32);
    pub const I32: IrType = IrType::scalar(Scalar::I32);
    pub const U32: IrType = IrType::scalar(Scalar::U32);
    pub const BOOL: IrType = IrType::scalar(Scalar::Bool);
    pub const VEC4: IrType = IrType::vector(Scalar::F32, 4);

    pub const fn scalar(scalar: Scalar) -> Self {
        IrType { scalar, count: 1 }
    }

    pub const fn vector(scalar: Scalar, count: u32) -> Self {
        IrType { scalar, count }
    }

    pub fn with_scalar(self, scalar: Scalar) -> Self {
        IrType { scalar, ..self }
    }

    pub fn with_count(self, count: u32) -> Self {
        IrType { count, ..self }
    }

    pub fn is_scalar(self) -> bool {
        self.count == 1
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.scalar {
            Scalar::F32 => "f32",
            Scalar::I32 => "i32",
            Scalar::U32 => "u32",
            Scalar::Bool => "bool",
        };
        if self.count == 1 {
            f.write_str(base)
        } else {
            write!(f, "{base}x{}", self.count)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
}

impl Constant {
    pub fn scalar(self) -> Scalar {
        match self {
            Constant::F32(_) => Scalar::F32,
            Constant::I32(_) => Scalar::I32,
            Constant::U32(_) => Scalar::U32,
            Constant::Bool(_) => Scalar::Bool,
        }
    }

    /// The literal `value` expressed in `scalar`; integer forms truncate.
    pub fn of(scalar: Scalar, value: f32) -> Constant {
        match scalar {
            Scalar::F32 => Constant::F32(value),
            Scalar::I32 => Constant::I32(value as i32),
            Scalar::U32 => Constant::U32(value as u32),
            Scalar::Bool => Constant::Bool(value != 0.0),
        }
    }
}

/// Component-wise binary operations. Operands share one type; the backend picks the float,
/// signed or unsigned instruction from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Asr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    /// Bitwise complement; logical negation on booleans.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Floor,
    Fract,
    Round,
    Sign,
    InverseSqrt,
    Exp2,
    Log2,
    /// `step(edge, x)`.
    Step,
    /// `mix(a, b, t)`.
    Mix,
    /// `clamp(x, lo, hi)`.
    Clamp,
    /// Scalar result.
    Dot,
    Dfdx,
    Dfdy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Reinterpret the bits.
    Bitcast,
    /// Value-preserving numeric conversion (float <-> int truncates toward zero).
    Numeric,
}

/// How a half-float pair maps onto one 32-bit lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HalfEncoding {
    /// Two normalized 16-bit values, as `packUnorm2x16`.
    #[default]
    Unorm16,
    /// Two IEEE binary16 values, as `packHalf2x16`.
    Ieee,
}

/// Conversion helpers emitted once per program and called by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackHelper {
    /// `f32` lane -> `f32x2`.
    UnpackHalf2(HalfEncoding),
    /// `f32x2` -> `f32` lane.
    PackHalf2(HalfEncoding),
}

/// Flat byte-addressed memory a `vldst` may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    Global,
    Literal,
    TextureIndex,
    Scratch,
}

impl MemorySpace {
    pub const ALL: [MemorySpace; 4] = [
        MemorySpace::Global,
        MemorySpace::Literal,
        MemorySpace::TextureIndex,
        MemorySpace::Scratch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MemorySpace::Global => "memory",
            MemorySpace::Literal => "literals",
            MemorySpace::TextureIndex => "texture_indices",
            MemorySpace::Scratch => "scratch",
        }
    }

    pub fn binding(self) -> u32 {
        match self {
            MemorySpace::Global => 0,
            MemorySpace::Literal => 1,
            MemorySpace::TextureIndex => 2,
            MemorySpace::Scratch => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinVariable {
    VertexIndex,
    InstanceIndex,
    Position,
    FragCoord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Per-invocation global, zero-initialized.
    Private,
    Input { location: u32 },
    Output { location: u32 },
    BuiltinInput(BuiltinVariable),
    BuiltinOutput(BuiltinVariable),
    /// A uniform block holding `len` elements of the declared type.
    UniformArray { binding: u32, len: u32 },
}

/// Code generation interface.
///
/// Every operation appends to the function currently open. Operations on values of mismatched
/// types are front-end bugs; backends may assume well-typed input.
pub trait Backend {
    type Value: Clone + fmt::Debug;
    /// A storage location. Two places compare equal only when they name the same storage.
    type Place: Clone + fmt::Debug + PartialEq;
    type Function: Clone + fmt::Debug;
    type Output;

    fn type_of(&self, value: &Self::Value) -> IrType;

    fn constant(&mut self, value: Constant) -> Self::Value;

    /// Concatenates scalars and vectors into one value with the sum of their components. A single
    /// part is returned unchanged.
    fn construct(&mut self, parts: &[Self::Value]) -> Self::Value;

    fn declare(&mut self, name: &str, ty: IrType, storage: StorageClass) -> Self::Place;

    /// Element `index` of a [`StorageClass::UniformArray`] place.
    fn element(&mut self, place: &Self::Place, index: u32) -> Self::Place;

    fn load(&mut self, place: &Self::Place) -> Self::Value;

    fn store(&mut self, place: &Self::Place, value: &Self::Value);

    fn extract(&mut self, value: &Self::Value, index: u32) -> Self::Value;

    fn insert(&mut self, value: &Self::Value, part: &Self::Value, index: u32) -> Self::Value;

    /// Selects components from the concatenation of `a` and `b`. Either may be a scalar; one
    /// index yields a scalar.
    fn shuffle(&mut self, a: &Self::Value, b: &Self::Value, indices: &[u32]) -> Self::Value;

    fn binary(&mut self, op: BinaryOp, a: &Self::Value, b: &Self::Value) -> Self::Value;

    fn unary(&mut self, op: UnaryOp, a: &Self::Value) -> Self::Value;

    /// Component-wise comparison producing a boolean of the operand width.
    fn compare(&mut self, op: CompareOp, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// `cond ? a : b`. A scalar condition applies to every component.
    fn select(&mut self, cond: &Self::Value, a: &Self::Value, b: &Self::Value) -> Self::Value;

    fn builtin(&mut self, func: Builtin, args: &[Self::Value]) -> Self::Value;

    fn convert(&mut self, conversion: Conversion, value: &Self::Value, to: Scalar) -> Self::Value;

    fn call_helper(&mut self, helper: PackHelper, arg: &Self::Value) -> Self::Value;

    /// Reads the 32-bit word at `byte_offset` as an `f32` lane.
    fn fetch_memory(&mut self, space: MemorySpace, byte_offset: &Self::Value) -> Self::Value;

    fn store_memory(&mut self, space: MemorySpace, byte_offset: &Self::Value, value: &Self::Value);

    /// Opens a parameterless function; code emitted until [`Backend::end_function`] lands in it.
    fn begin_function(&mut self, name: &str) -> Self::Function;

    fn end_function(&mut self);

    fn call_function(&mut self, function: &Self::Function);

    /// Marks the start of the entry point. Code emitted outside any function belongs to the
    /// entry point, so this only has to be called once every other function is closed.
    fn begin_entry(&mut self);

    fn finish(self) -> Self::Output;

    fn f32(&mut self, value: f32) -> Self::Value {
        self.constant(Constant::F32(value))
    }

    fn u32(&mut self, value: u32) -> Self::Value {
        self.constant(Constant::U32(value))
    }

    fn i32(&mut self, value: i32) -> Self::Value {
        self.constant(Constant::I32(value))
    }

    /// `value` repeated `count` times.
    fn splat(&mut self, value: &Self::Value, count: u32) -> Self::Value {
        if count <= 1 {
            return value.clone();
        }
        let parts = vec![value.clone(); count as usize];
        self.construct(&parts)
    }

    /// A constant of `scalar` repeated `count` times.
    fn splat_constant(&mut self, value: Constant, count: u32) -> Self::Value {
        let c = self.constant(value);
        self.splat(&c, count)
    }
}
