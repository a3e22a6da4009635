//! Reference evaluator.
//!
//! [`Interpreter`] records the emitted IR as a small op list; [`Machine`] executes it on concrete
//! lane values. Numeric properties of the translator (conversions, swizzles, shadowing, repeat
//! offsets) are checked against it without going through a GPU.

use half::f16;
use hashbrown::HashMap;
use thiserror::Error;

use crate::ir::{
    Backend, BinaryOp, Builtin, CompareOp, Constant, Conversion, HalfEncoding, IrType,
    MemorySpace, PackHelper, Scalar, StorageClass, UnaryOp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Place {
    slot: u32,
    element: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionId(usize);

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    ty: IrType,
    storage: StorageClass,
    len: u32,
}

#[derive(Debug, Clone)]
enum Op {
    Construct { dst: Value, parts: Vec<Value> },
    Load { dst: Value, place: Place },
    Store { place: Place, src: Value },
    Extract { dst: Value, src: Value, index: u32 },
    Insert { dst: Value, src: Value, part: Value, index: u32 },
    Shuffle { dst: Value, a: Value, b: Value, indices: Vec<u32> },
    Binary { dst: Value, op: BinaryOp, a: Value, b: Value },
    Unary { dst: Value, op: UnaryOp, a: Value },
    Compare { dst: Value, op: CompareOp, a: Value, b: Value },
    Select { dst: Value, cond: Value, a: Value, b: Value },
    Builtin { dst: Value, func: Builtin, args: Vec<Value> },
    Convert { dst: Value, conversion: Conversion, src: Value },
    Helper { dst: Value, helper: PackHelper, arg: Value },
    Fetch { dst: Value, space: MemorySpace, offset: Value },
    StoreMemory { space: MemorySpace, offset: Value, value: Value },
    Call(usize),
}

/// Recording backend. Function 0 is the entry point and receives everything emitted outside
/// [`Backend::begin_function`]/[`Backend::end_function`].
#[derive(Debug, Clone)]
pub struct Interpreter {
    types: Vec<IrType>,
    constants: Vec<(Value, [u32; 4])>,
    slots: Vec<Slot>,
    functions: Vec<Vec<Op>>,
    current: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter {
            types: Vec::new(),
            constants: Vec::new(),
            slots: Vec::new(),
            functions: vec![Vec::new()],
            current: 0,
        }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn value(&mut self, ty: IrType) -> Value {
        self.types.push(ty);
        Value(self.types.len() as u32 - 1)
    }

    fn ty(&self, value: Value) -> IrType {
        self.types[value.0 as usize]
    }

    fn push(&mut self, op: Op) {
        self.functions[self.current].push(op);
    }

    fn widest(&self, values: &[Value]) -> IrType {
        let first = self.ty(values[0]);
        let count = values.iter().map(|&v| self.ty(v).count).max().unwrap_or(1);
        first.with_count(count)
    }
}

fn constant_bits(value: Constant) -> u32 {
    match value {
        Constant::F32(v) => v.to_bits(),
        Constant::I32(v) => v as u32,
        Constant::U32(v) => v,
        Constant::Bool(v) => u32::from(v),
    }
}

impl Backend for Interpreter {
    type Value = Value;
    type Place = Place;
    type Function = FunctionId;
    type Output = Program;

    fn type_of(&self, value: &Value) -> IrType {
        self.ty(*value)
    }

    fn constant(&mut self, value: Constant) -> Value {
        let dst = self.value(IrType::scalar(value.scalar()));
        self.constants.push((dst, [constant_bits(value), 0, 0, 0]));
        dst
    }

    fn construct(&mut self, parts: &[Value]) -> Value {
        if let [only] = parts {
            return *only;
        }
        let count = parts.iter().map(|&p| self.ty(p).count).sum::<u32>().min(4);
        let dst = self.value(self.ty(parts[0]).with_count(count));
        self.push(Op::Construct {
            dst,
            parts: parts.to_vec(),
        });
        dst
    }

    fn declare(&mut self, name: &str, ty: IrType, storage: StorageClass) -> Place {
        let len = match storage {
            StorageClass::UniformArray { len, .. } => len.max(1),
            _ => 1,
        };
        self.slots.push(Slot {
            name: name.to_owned(),
            ty,
            storage,
            len,
        });
        Place {
            slot: self.slots.len() as u32 - 1,
            element: None,
        }
    }

    fn element(&mut self, place: &Place, index: u32) -> Place {
        Place {
            slot: place.slot,
            element: Some(index),
        }
    }

    fn load(&mut self, place: &Place) -> Value {
        let dst = self.value(self.slots[place.slot as usize].ty);
        self.push(Op::Load { dst, place: *place });
        dst
    }

    fn store(&mut self, place: &Place, value: &Value) {
        self.push(Op::Store {
            place: *place,
            src: *value,
        });
    }

    fn extract(&mut self, value: &Value, index: u32) -> Value {
        let ty = self.ty(*value);
        if ty.is_scalar() {
            return *value;
        }
        let dst = self.value(ty.with_count(1));
        self.push(Op::Extract {
            dst,
            src: *value,
            index,
        });
        dst
    }

    fn insert(&mut self, value: &Value, part: &Value, index: u32) -> Value {
        let ty = self.ty(*value);
        if ty.is_scalar() {
            return *part;
        }
        let dst = self.value(ty);
        self.push(Op::Insert {
            dst,
            src: *value,
            part: *part,
            index,
        });
        dst
    }

    fn shuffle(&mut self, a: &Value, b: &Value, indices: &[u32]) -> Value {
        let dst = self.value(self.ty(*a).with_count(indices.len() as u32));
        self.push(Op::Shuffle {
            dst,
            a: *a,
            b: *b,
            indices: indices.to_vec(),
        });
        dst
    }

    fn binary(&mut self, op: BinaryOp, a: &Value, b: &Value) -> Value {
        let dst = self.value(self.widest(&[*a, *b]));
        self.push(Op::Binary {
            dst,
            op,
            a: *a,
            b: *b,
        });
        dst
    }

    fn unary(&mut self, op: UnaryOp, a: &Value) -> Value {
        let dst = self.value(self.ty(*a));
        self.push(Op::Unary { dst, op, a: *a });
        dst
    }

    fn compare(&mut self, op: CompareOp, a: &Value, b: &Value) -> Value {
        let dst = self.value(self.widest(&[*a, *b]).with_scalar(Scalar::Bool));
        self.push(Op::Compare {
            dst,
            op,
            a: *a,
            b: *b,
        });
        dst
    }

    fn select(&mut self, cond: &Value, a: &Value, b: &Value) -> Value {
        let dst = self.value(self.widest(&[*a, *b]));
        self.push(Op::Select {
            dst,
            cond: *cond,
            a: *a,
            b: *b,
        });
        dst
    }

    fn builtin(&mut self, func: Builtin, args: &[Value]) -> Value {
        let ty = match func {
            Builtin::Dot => IrType::F32,
            _ => self.widest(args),
        };
        let dst = self.value(ty);
        self.push(Op::Builtin {
            dst,
            func,
            args: args.to_vec(),
        });
        dst
    }

    fn convert(&mut self, conversion: Conversion, value: &Value, to: Scalar) -> Value {
        let dst = self.value(self.ty(*value).with_scalar(to));
        self.push(Op::Convert {
            dst,
            conversion,
            src: *value,
        });
        dst
    }

    fn call_helper(&mut self, helper: PackHelper, arg: &Value) -> Value {
        let ty = match helper {
            PackHelper::UnpackHalf2(_) => IrType::vector(Scalar::F32, 2),
            PackHelper::PackHalf2(_) => IrType::F32,
        };
        let dst = self.value(ty);
        self.push(Op::Helper {
            dst,
            helper,
            arg: *arg,
        });
        dst
    }

    fn fetch_memory(&mut self, space: MemorySpace, byte_offset: &Value) -> Value {
        let dst = self.value(IrType::F32);
        self.push(Op::Fetch {
            dst,
            space,
            offset: *byte_offset,
        });
        dst
    }

    fn store_memory(&mut self, space: MemorySpace, byte_offset: &Value, value: &Value) {
        self.push(Op::StoreMemory {
            space,
            offset: *byte_offset,
            value: *value,
        });
    }

    fn begin_function(&mut self, _name: &str) -> FunctionId {
        self.functions.push(Vec::new());
        self.current = self.functions.len() - 1;
        FunctionId(self.current)
    }

    fn end_function(&mut self) {
        self.current = 0;
    }

    fn call_function(&mut self, function: &FunctionId) {
        self.push(Op::Call(function.0));
    }

    fn begin_entry(&mut self) {
        self.current = 0;
    }

    fn finish(self) -> Program {
        Program {
            types: self.types,
            constants: self.constants,
            slots: self.slots,
            functions: self.functions,
        }
    }
}

/// A finished recording, ready to run on a [`Machine`].
#[derive(Debug, Clone)]
pub struct Program {
    types: Vec<IrType>,
    constants: Vec<(Value, [u32; 4])>,
    slots: Vec<Slot>,
    functions: Vec<Vec<Op>>,
}

impl Program {
    /// Names of every declared variable, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    pub fn storage_of(&self, name: &str) -> Option<StorageClass> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.storage)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn slot(&self, name: &str) -> Result<usize, InterpError> {
        self.slots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| InterpError::UnknownVariable {
                name: name.to_owned(),
            })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpError {
    #[error("no variable named `{name}`")]
    UnknownVariable { name: String },
    #[error("variable `{name}` holds {capacity} lanes, got {got}")]
    TooManyLanes {
        name: String,
        capacity: usize,
        got: usize,
    },
}

/// Execution state for one invocation of a [`Program`].
pub struct Machine<'p> {
    program: &'p Program,
    values: Vec<[u32; 4]>,
    slots: Vec<Vec<[u32; 4]>>,
    memory: HashMap<MemorySpace, Vec<u8>>,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut values = vec![[0; 4]; program.types.len()];
        for (value, bits) in &program.constants {
            values[value.0 as usize] = *bits;
        }
        let slots = program
            .slots
            .iter()
            .map(|s| vec![[0; 4]; s.len as usize])
            .collect();
        Machine {
            program,
            values,
            slots,
            memory: HashMap::new(),
        }
    }

    /// Writes `lanes` into the named variable, four lanes per array element.
    pub fn set_bits(&mut self, name: &str, lanes: &[u32]) -> Result<(), InterpError> {
        let index = self.program.slot(name)?;
        let slot = &self.program.slots[index];
        let width = slot.ty.count as usize;
        let capacity = width * slot.len as usize;
        if lanes.len() > capacity {
            return Err(InterpError::TooManyLanes {
                name: name.to_owned(),
                capacity,
                got: lanes.len(),
            });
        }
        for (i, &bits) in lanes.iter().enumerate() {
            self.slots[index][i / width][i % width] = bits;
        }
        Ok(())
    }

    pub fn set_f32(&mut self, name: &str, lanes: &[f32]) -> Result<(), InterpError> {
        let bits: Vec<u32> = lanes.iter().map(|v| v.to_bits()).collect();
        self.set_bits(name, &bits)
    }

    pub fn get_bits(&self, name: &str) -> Option<Vec<u32>> {
        let index = self.program.slot(name).ok()?;
        let width = self.program.slots[index].ty.count as usize;
        Some(
            self.slots[index]
                .iter()
                .flat_map(|element| element[..width].iter().copied())
                .collect(),
        )
    }

    pub fn get_f32(&self, name: &str) -> Option<Vec<f32>> {
        Some(self.get_bits(name)?.into_iter().map(f32::from_bits).collect())
    }

    pub fn set_memory(&mut self, space: MemorySpace, bytes: Vec<u8>) {
        self.memory.insert(space, bytes);
    }

    pub fn memory(&self, space: MemorySpace) -> &[u8] {
        self.memory.get(&space).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Runs the entry point once.
    pub fn run(&mut self) {
        self.exec(0);
    }

    fn count(&self, value: Value) -> usize {
        self.program.types[value.0 as usize].count as usize
    }

    fn scalar(&self, value: Value) -> Scalar {
        self.program.types[value.0 as usize].scalar
    }

    /// Lane `i` of `value`, broadcasting scalars.
    fn lane(&self, value: Value, i: usize) -> u32 {
        let lanes = &self.values[value.0 as usize];
        if self.count(value) == 1 {
            lanes[0]
        } else {
            lanes[i.min(3)]
        }
    }

    fn set(&mut self, dst: Value, f: impl Fn(&Self, usize) -> u32) {
        let mut out = [0; 4];
        for (i, lane) in out.iter_mut().enumerate().take(self.count(dst)) {
            *lane = f(self, i);
        }
        self.values[dst.0 as usize] = out;
    }

    fn exec(&mut self, function: usize) {
        let program = self.program;
        for op in &program.functions[function] {
            self.step(op);
        }
    }

    fn step(&mut self, op: &Op) {
        match op {
            Op::Construct { dst, parts } => {
                let mut lanes = Vec::with_capacity(4);
                for &part in parts {
                    for i in 0..self.count(part) {
                        lanes.push(self.lane(part, i));
                    }
                }
                self.set(*dst, |_, i| lanes.get(i).copied().unwrap_or(0));
            }
            Op::Load { dst, place } => {
                let slot = &self.slots[place.slot as usize];
                let element = place.element.unwrap_or(0) as usize;
                self.values[dst.0 as usize] = slot.get(element).copied().unwrap_or([0; 4]);
            }
            Op::Store { place, src } => {
                let bits = self.values[src.0 as usize];
                let element = place.element.unwrap_or(0) as usize;
                if let Some(target) = self.slots[place.slot as usize].get_mut(element) {
                    *target = bits;
                }
            }
            Op::Extract { dst, src, index } => {
                let bits = self.lane(*src, *index as usize);
                self.values[dst.0 as usize] = [bits, 0, 0, 0];
            }
            Op::Insert {
                dst,
                src,
                part,
                index,
            } => {
                let mut lanes = self.values[src.0 as usize];
                lanes[*index as usize & 3] = self.lane(*part, 0);
                self.values[dst.0 as usize] = lanes;
            }
            Op::Shuffle { dst, a, b, indices } => {
                let left = self.count(*a);
                let picked: Vec<u32> = indices
                    .iter()
                    .map(|&ix| {
                        let ix = ix as usize;
                        if ix < left {
                            self.lane(*a, ix)
                        } else {
                            self.lane(*b, ix - left)
                        }
                    })
                    .collect();
                self.set(*dst, |_, i| picked[i]);
            }
            Op::Binary { dst, op, a, b } => {
                let scalar = self.scalar(*a);
                self.set(*dst, |m, i| binary(*op, scalar, m.lane(*a, i), m.lane(*b, i)));
            }
            Op::Unary { dst, op, a } => {
                let scalar = self.scalar(*a);
                self.set(*dst, |m, i| unary(*op, scalar, m.lane(*a, i)));
            }
            Op::Compare { dst, op, a, b } => {
                let scalar = self.scalar(*a);
                self.set(*dst, |m, i| {
                    u32::from(compare(*op, scalar, m.lane(*a, i), m.lane(*b, i)))
                });
            }
            Op::Select { dst, cond, a, b } => {
                self.set(*dst, |m, i| {
                    if m.lane(*cond, i) != 0 {
                        m.lane(*a, i)
                    } else {
                        m.lane(*b, i)
                    }
                });
            }
            Op::Builtin { dst, func, args } => {
                if *func == Builtin::Dot {
                    let n = self.count(args[0]);
                    let sum: f32 = (0..n)
                        .map(|i| f(self.lane(args[0], i)) * f(self.lane(args[1], i)))
                        .sum();
                    self.values[dst.0 as usize] = [sum.to_bits(), 0, 0, 0];
                } else {
                    self.set(*dst, |m, i| {
                        let x: Vec<f32> = args.iter().map(|&a| f(m.lane(a, i))).collect();
                        builtin(*func, &x).to_bits()
                    });
                }
            }
            Op::Convert {
                dst,
                conversion,
                src,
            } => {
                let from = self.scalar(*src);
                let to = self.scalar(*dst);
                self.set(*dst, |m, i| convert(*conversion, from, to, m.lane(*src, i)));
            }
            Op::Helper { dst, helper, arg } => {
                self.values[dst.0 as usize] = match helper {
                    PackHelper::UnpackHalf2(encoding) => {
                        let [lo, hi] = unpack_half2(*encoding, self.lane(*arg, 0));
                        [lo.to_bits(), hi.to_bits(), 0, 0]
                    }
                    PackHelper::PackHalf2(encoding) => {
                        let pair = [f(self.lane(*arg, 0)), f(self.lane(*arg, 1))];
                        [pack_half2(*encoding, pair), 0, 0, 0]
                    }
                };
            }
            Op::Fetch { dst, space, offset } => {
                let at = self.lane(*offset, 0) as usize;
                let word = self
                    .memory
                    .get(space)
                    .and_then(|bytes| bytes.get(at..at + 4))
                    .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                self.values[dst.0 as usize] = [word, 0, 0, 0];
            }
            Op::StoreMemory {
                space,
                offset,
                value,
            } => {
                let at = self.lane(*offset, 0) as usize;
                let word = self.lane(*value, 0).to_le_bytes();
                let bytes = self.memory.entry(*space).or_default();
                if bytes.len() < at + 4 {
                    bytes.resize(at + 4, 0);
                }
                bytes[at..at + 4].copy_from_slice(&word);
            }
            Op::Call(function) => self.exec(*function),
        }
    }
}

fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

fn binary(op: BinaryOp, scalar: Scalar, a: u32, b: u32) -> u32 {
    match scalar {
        Scalar::F32 => {
            let (x, y) = (f(a), f(b));
            let r = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                BinaryOp::Min => x.min(y),
                BinaryOp::Max => x.max(y),
                _ => return integer_binary(op, a, b),
            };
            r.to_bits()
        }
        Scalar::I32 => {
            let (x, y) = (a as i32, b as i32);
            match op {
                BinaryOp::Add => x.wrapping_add(y) as u32,
                BinaryOp::Sub => x.wrapping_sub(y) as u32,
                BinaryOp::Mul => x.wrapping_mul(y) as u32,
                BinaryOp::Div => x.checked_div(y).unwrap_or(0) as u32,
                BinaryOp::Min => x.min(y) as u32,
                BinaryOp::Max => x.max(y) as u32,
                _ => integer_binary(op, a, b),
            }
        }
        Scalar::U32 => match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => a.checked_div(b).unwrap_or(0),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            _ => integer_binary(op, a, b),
        },
        Scalar::Bool => match op {
            BinaryOp::And | BinaryOp::Min | BinaryOp::Mul => a & b & 1,
            BinaryOp::Or | BinaryOp::Max | BinaryOp::Add => (a | b) & 1,
            _ => (a ^ b) & 1,
        },
    }
}

fn integer_binary(op: BinaryOp, a: u32, b: u32) -> u32 {
    match op {
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b),
        BinaryOp::Shr => a.wrapping_shr(b),
        BinaryOp::Asr => (a as i32).wrapping_shr(b) as u32,
        _ => 0,
    }
}

fn unary(op: UnaryOp, scalar: Scalar, a: u32) -> u32 {
    match (op, scalar) {
        (UnaryOp::Neg, Scalar::F32) => (-f(a)).to_bits(),
        (UnaryOp::Neg, _) => a.wrapping_neg(),
        (UnaryOp::Abs, Scalar::F32) => f(a).abs().to_bits(),
        (UnaryOp::Abs, Scalar::I32) => (a as i32).wrapping_abs() as u32,
        (UnaryOp::Abs, _) => a,
        (UnaryOp::Not, Scalar::Bool) => u32::from(a == 0),
        (UnaryOp::Not, _) => !a,
    }
}

fn compare(op: CompareOp, scalar: Scalar, a: u32, b: u32) -> bool {
    use std::cmp::Ordering;
    let ordering = match scalar {
        Scalar::F32 => f(a).partial_cmp(&f(b)),
        Scalar::I32 => Some((a as i32).cmp(&(b as i32))),
        Scalar::U32 | Scalar::Bool => Some(a.cmp(&b)),
    };
    let Some(ordering) = ordering else {
        // NaN: only "not equal" holds.
        return op == CompareOp::Ne;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn builtin(func: Builtin, x: &[f32]) -> f32 {
    let arg = |i: usize| x.get(i).copied().unwrap_or(0.0);
    match func {
        Builtin::Floor => arg(0).floor(),
        Builtin::Fract => arg(0) - arg(0).floor(),
        Builtin::Round => arg(0).round(),
        Builtin::Sign => {
            let v = arg(0);
            if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Builtin::InverseSqrt => 1.0 / arg(0).sqrt(),
        Builtin::Exp2 => arg(0).exp2(),
        Builtin::Log2 => arg(0).log2(),
        Builtin::Step => {
            if arg(1) < arg(0) {
                0.0
            } else {
                1.0
            }
        }
        Builtin::Mix => arg(0) * (1.0 - arg(2)) + arg(1) * arg(2),
        Builtin::Clamp => arg(0).max(arg(1)).min(arg(2)),
        Builtin::Dot => arg(0) * arg(1),
        // A single invocation has no neighbours.
        Builtin::Dfdx | Builtin::Dfdy => 0.0,
    }
}

fn convert(conversion: Conversion, from: Scalar, to: Scalar, bits: u32) -> u32 {
    if conversion == Conversion::Bitcast || from == to {
        return bits;
    }
    match (from, to) {
        (_, Scalar::Bool) => u32::from(bits != 0 && !(from == Scalar::F32 && f(bits) == 0.0)),
        (Scalar::Bool, Scalar::F32) => (bits as f32).to_bits(),
        (Scalar::Bool, _) => bits,
        (Scalar::F32, Scalar::I32) => f(bits) as i32 as u32,
        (Scalar::F32, Scalar::U32) => f(bits) as u32,
        (Scalar::I32, Scalar::F32) => (bits as i32 as f32).to_bits(),
        (Scalar::U32, Scalar::F32) => (bits as f32).to_bits(),
        // Between the integer types the bits carry over.
        _ => bits,
    }
}

fn unpack_half2(encoding: HalfEncoding, bits: u32) -> [f32; 2] {
    let halves = [bits & 0xFFFF, bits >> 16];
    halves.map(|h| match encoding {
        HalfEncoding::Unorm16 => h as f32 / 65535.0,
        HalfEncoding::Ieee => f16::from_bits(h as u16).to_f32(),
    })
}

fn pack_half2(encoding: HalfEncoding, pair: [f32; 2]) -> u32 {
    let [lo, hi] = pair.map(|v| match encoding {
        HalfEncoding::Unorm16 => (v.clamp(0.0, 1.0) * 65535.0).round() as u32,
        HalfEncoding::Ieee => u32::from(f16::from_f32(v).to_bits()),
    });
    lo | (hi << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_runs_calls_in_order() {
        let mut b = Interpreter::new();
        let x = b.declare("x", IrType::F32, StorageClass::Private);
        let helper = b.begin_function("double");
        let v = b.load(&x);
        let twice = b.binary(BinaryOp::Add, &v, &v);
        b.store(&x, &twice);
        b.end_function();

        b.begin_entry();
        let three = b.f32(3.0);
        b.store(&x, &three);
        b.call_function(&helper);
        b.call_function(&helper);
        let program = b.finish();

        let mut m = Machine::new(&program);
        m.run();
        assert_eq!(m.get_f32("x"), Some(vec![12.0]));
    }

    #[test]
    fn shuffle_reads_across_operands() {
        let mut b = Interpreter::new();
        let out = b.declare("out", IrType::VEC4, StorageClass::Private);
        let parts: Vec<_> = [1.0, 2.0].iter().map(|&v| b.f32(v)).collect();
        let left = b.construct(&parts);
        let right = b.f32(7.0);
        let mixed = b.shuffle(&left, &right, &[2, 1, 0, 2]);
        b.store(&out, &mixed);
        let program = b.finish();

        let mut m = Machine::new(&program);
        m.run();
        assert_eq!(m.get_f32("out"), Some(vec![7.0, 2.0, 1.0, 7.0]));
    }

    #[test]
    fn half_pairs_survive_both_encodings() {
        for encoding in [HalfEncoding::Unorm16, HalfEncoding::Ieee] {
            let packed = pack_half2(encoding, [0.25, 1.0]);
            let [lo, hi] = unpack_half2(encoding, packed);
            assert!((lo - 0.25).abs() < 1.0 / 65535.0, "{encoding:?}: {lo}");
            assert_eq!(hi, 1.0);
        }
    }

    #[test]
    fn memory_is_little_endian() {
        let mut b = Interpreter::new();
        let out = b.declare("out", IrType::F32, StorageClass::Private);
        let at = b.u32(4);
        let word = b.fetch_memory(MemorySpace::Global, &at);
        b.store(&out, &word);
        let program = b.finish();

        let mut m = Machine::new(&program);
        m.set_memory(MemorySpace::Global, vec![0, 0, 0, 0, 0x00, 0x00, 0x80, 0x3F]);
        m.run();
        assert_eq!(m.get_f32("out"), Some(vec![1.0]));
        assert!(matches!(
            m.set_f32("missing", &[1.0]),
            Err(InterpError::UnknownVariable { .. })
        ));
    }
}
