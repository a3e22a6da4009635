//! Moving operand data between register storage and typed IR values.
//!
//! Registers are arrays of 32-bit lanes. A lane holds one element of a 32-bit type, two of a
//! 16-bit type or four bytes. Loads gather the lanes an operand touches, unpack them into a
//! computation type (`f32`, `i32` or `u32` per element) and apply the swizzle; stores do the
//! reverse with read-modify-write of partially written lanes.

use tracing::{debug, warn};

use crate::error::TranslateError;
use crate::ir::{
    Backend, BinaryOp, Builtin, CompareOp, Constant, Conversion, IrType, PackHelper, Scalar,
    UnaryOp,
};
use crate::program::TranslateContext;
use crate::resolve::{Register, Resolver};
use crate::types::{
    mask_bits, mask_count, DataType, ExtPredicate, Operand, RegisterBank, RegisterFlags, Swizzle4,
};

/// Scalar type operations on `ty` are carried out in.
pub fn compute_scalar(ty: DataType) -> Scalar {
    if ty.is_float() || ty == DataType::Unk {
        Scalar::F32
    } else if ty.is_signed() {
        Scalar::I32
    } else {
        Scalar::U32
    }
}

/// Elements per 32-bit lane.
pub fn lane_ratio(ty: DataType) -> u32 {
    4 / ty.size()
}

/// Largest magnitude a normalized conversion maps 1.0 onto.
pub fn type_max(ty: DataType) -> f32 {
    match ty {
        DataType::UInt8 | DataType::C10 => 255.0,
        DataType::Int8 | DataType::O8 => 127.0,
        DataType::UInt16 => 65535.0,
        DataType::Int16 => 32767.0,
        DataType::UInt32 => 4_294_967_295.0,
        DataType::Int32 => 2_147_483_647.0,
        DataType::F16 | DataType::F32 | DataType::Unk => 1.0,
    }
}

fn storage_type(op: &Operand) -> DataType {
    if op.bank == RegisterBank::FpInternal {
        op.ty.promoted()
    } else {
        op.ty
    }
}

fn load_error(op: &Operand, mask: u32, reason: impl Into<String>) -> TranslateError {
    TranslateError::Load {
        operand: op.describe(mask),
        reason: reason.into(),
    }
}

/// A register value covering `take` lanes starting at `start`.
struct Segment<V> {
    value: V,
    start: u32,
    take: u32,
}

pub struct Emitter<'a, B: Backend> {
    pub backend: B,
    pub resolver: Resolver<B>,
    pub ctx: TranslateContext<'a>,
}

impl<'a, B: Backend> Emitter<'a, B> {
    pub fn new(backend: B, resolver: Resolver<B>, ctx: TranslateContext<'a>) -> Self {
        Emitter {
            backend,
            resolver,
            ctx,
        }
    }

    fn count_of(&self, value: &B::Value) -> u32 {
        self.backend.type_of(value).count
    }

    fn scalar_of(&self, value: &B::Value) -> Scalar {
        self.backend.type_of(value).scalar
    }

    /// Loads the components of `op` selected by `mask`, converted to the operand's computation
    /// type. The result has one component per set mask bit.
    pub fn load(&mut self, op: &Operand, mask: u32, offset: i32) -> Result<B::Value, TranslateError> {
        let mask = mask & 0b1111;
        if mask == 0 {
            return Err(load_error(op, mask, "empty component mask"));
        }

        let value = match op.bank {
            RegisterBank::FpConstant => self.load_constant(op, mask)?,
            RegisterBank::Immediate => self.load_immediate(op, mask),
            RegisterBank::Predicate => {
                let place = self.resolver.predicate(&mut self.backend, op.num as i32 + offset)?;
                return Ok(self.backend.load(&place));
            }
            RegisterBank::Temp
            | RegisterBank::PrimAttr
            | RegisterBank::Output
            | RegisterBank::SecAttr
            | RegisterBank::FpInternal => self.load_register(op, mask, offset)?,
            other => {
                warn!(bank = ?other, "load from unaddressable bank");
                return Err(TranslateError::unsupported(format!(
                    "load from {} bank",
                    other.short_name()
                )));
            }
        };
        Ok(self.apply_modifiers(op.flags, value))
    }

    fn load_constant(&mut self, op: &Operand, mask: u32) -> Result<B::Value, TranslateError> {
        let mut parts = Vec::with_capacity(4);
        for i in mask_bits(mask) {
            let channel = op.swizzle[i as usize];
            let literal = match channel.constant() {
                Some(c) => c,
                None => {
                    let index = op.num + channel.storage_index().unwrap_or(0);
                    let found = if op.ty == DataType::F16 {
                        let bank = if i >= 1 && op.index == 0 { i as usize } else { 0 };
                        self.ctx.constants.f16(bank, index)
                    } else {
                        let bank = usize::from(i == 1 && op.index == 0);
                        self.ctx.constants.f32(bank, index)
                    };
                    found.ok_or_else(|| load_error(op, mask, "constant table index out of range"))?
                }
            };
            parts.push(self.backend.f32(literal));
        }
        let value = self.backend.construct(&parts);
        let scalar = compute_scalar(op.ty);
        Ok(if scalar == Scalar::F32 {
            value
        } else {
            self.backend.convert(Conversion::Numeric, &value, scalar)
        })
    }

    fn load_immediate(&mut self, op: &Operand, mask: u32) -> B::Value {
        let scalar = compute_scalar(op.ty);
        if mask_count(mask) == 1 {
            let first = mask_bits(mask).next().unwrap_or(0);
            if let Some(c) = op.swizzle[first as usize].constant() {
                return self.backend.constant(Constant::of(scalar, c));
            }
        }
        let fill = match scalar {
            Scalar::F32 | Scalar::Bool => Constant::F32(1.0),
            Scalar::I32 => Constant::I32(op.num as i32),
            Scalar::U32 => Constant::U32(op.num),
        };
        let value = self.backend.splat_constant(fill, mask_count(mask));
        self.bridge(&value, &value, &op.swizzle, 0, mask)
    }

    fn load_register(&mut self, op: &Operand, mask: u32, offset: i32) -> Result<B::Value, TranslateError> {
        let ty = storage_type(op);
        let scalar = compute_scalar(ty);
        let ratio = lane_ratio(ty);

        let storage: Vec<u32> = mask_bits(mask)
            .filter_map(|i| op.swizzle[i as usize].storage_index())
            .collect();
        let (Some(&min), Some(&max)) = (storage.iter().min(), storage.iter().max()) else {
            // Only constant channels.
            let parts: Vec<_> = mask_bits(mask)
                .map(|i| {
                    let c = op.swizzle[i as usize].constant().unwrap_or(0.0);
                    self.backend.constant(Constant::of(scalar, c))
                })
                .collect();
            return Ok(self.backend.construct(&parts));
        };
        let lo = min / ratio;
        let hi = max / ratio;

        let segments = self.gather(op.bank, op.num, offset + lo as i32, hi - lo + 1)?;

        if ratio == 1 {
            let (left, right, shift) = match segments.as_slice() {
                [only] => (only.value.clone(), only.value.clone(), only.start as i32),
                [first, second] if second.start == 0 => {
                    (first.value.clone(), second.value.clone(), first.start as i32)
                }
                _ => {
                    let packed = self.compact(&segments);
                    (packed.clone(), packed, 0)
                }
            };
            let (left, right) = if scalar == Scalar::F32 {
                (left, right)
            } else {
                (
                    self.backend.convert(Conversion::Bitcast, &left, scalar),
                    self.backend.convert(Conversion::Bitcast, &right, scalar),
                )
            };
            return Ok(self.bridge(&left, &right, &op.swizzle, shift - lo as i32, mask));
        }

        let packed = self.compact(&segments);
        Ok(self.unpack(&packed, ty, &op.swizzle, mask, -((lo * ratio) as i32)))
    }

    /// Loads the register values covering `count` lanes starting at lane `num + first`. Lanes past
    /// the end of the bank read as zero once at least one lane resolved.
    fn gather(
        &mut self,
        bank: RegisterBank,
        num: u32,
        first: i32,
        count: u32,
    ) -> Result<Vec<Segment<B::Value>>, TranslateError> {
        let mut segments = Vec::new();
        let mut got = 0;
        while got < count {
            match self
                .resolver
                .resolve(&mut self.backend, bank, num, first + got as i32, false)
            {
                Ok(found) => {
                    let take = (found.reg.lanes - found.offset).min(count - got);
                    let value = self.backend.load(&found.reg.place);
                    segments.push(Segment {
                        value,
                        start: found.offset,
                        take,
                    });
                    got += take;
                }
                Err(e) if got == 0 => return Err(e),
                Err(_) => {
                    debug!(bank = bank.short_name(), num, "padding load past end of bank");
                    let zeros = self.backend.splat_constant(Constant::F32(0.0), count - got);
                    segments.push(Segment {
                        value: zeros,
                        start: 0,
                        take: count - got,
                    });
                    got = count;
                }
            }
        }
        Ok(segments)
    }

    /// Concatenates the covered lanes of each segment.
    fn compact(&mut self, segments: &[Segment<B::Value>]) -> B::Value {
        let mut parts = Vec::with_capacity(segments.len());
        for seg in segments {
            let total = self.count_of(&seg.value);
            let part = if seg.start == 0 && seg.take == total {
                seg.value.clone()
            } else if seg.take == 1 {
                self.backend.extract(&seg.value, seg.start)
            } else {
                let indices: Vec<u32> = (seg.start..seg.start + seg.take).collect();
                self.backend.shuffle(&seg.value, &seg.value, &indices)
            };
            parts.push(part);
        }
        self.backend.construct(&parts)
    }

    /// Applies `swizzle` under `mask` to the concatenation of `left` and `right`. Storage channel
    /// `c` reads index `c + shift`; constant channels become literals of the value's scalar type.
    pub fn bridge(
        &mut self,
        left: &B::Value,
        right: &B::Value,
        swizzle: &Swizzle4,
        shift: i32,
        mask: u32,
    ) -> B::Value {
        let scalar = self.scalar_of(left);
        let left_count = self.count_of(left);
        let total = (left_count + self.count_of(right)) as i32;

        let mut indices = Vec::with_capacity(4);
        let mut constants = Vec::new();
        for (slot, i) in mask_bits(mask).enumerate() {
            let channel = swizzle[i as usize];
            match channel.storage_index() {
                Some(c) => indices.push((c as i32 + shift).clamp(0, total - 1) as u32),
                None => {
                    constants.push((slot as u32, channel.constant().unwrap_or(0.0)));
                    indices.push(0);
                }
            }
        }

        if indices.len() == 1 {
            if let [(_, literal)] = constants.as_slice() {
                return self.backend.constant(Constant::of(scalar, *literal));
            }
        }

        let identity = constants.is_empty()
            && indices.len() as u32 == left_count
            && indices.iter().enumerate().all(|(k, &ix)| ix == k as u32);
        let mut result = if identity {
            left.clone()
        } else {
            self.backend.shuffle(left, right, &indices)
        };
        for (slot, literal) in constants {
            let c = self.backend.constant(Constant::of(scalar, literal));
            result = self.backend.insert(&result, &c, slot);
        }
        result
    }

    /// Splits each lane of `packed` into its elements and applies the swizzle over the element
    /// sequence, offset by `shift` elements.
    pub fn unpack(
        &mut self,
        packed: &B::Value,
        ty: DataType,
        swizzle: &Swizzle4,
        mask: u32,
        shift: i32,
    ) -> B::Value {
        let lanes = self.count_of(packed);
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut filled = 0;
        for lane in 0..lanes {
            let bits = if lanes == 1 {
                packed.clone()
            } else {
                self.backend.extract(packed, lane)
            };
            let elements = self.unpack_one(&bits, ty);
            if filled < 4 {
                left.push(elements);
            } else {
                right.push(elements);
            }
            filled += lane_ratio(ty);
        }
        let left = self.backend.construct(&left);
        let right = if right.is_empty() {
            left.clone()
        } else {
            self.backend.construct(&right)
        };
        self.bridge(&left, &right, swizzle, shift, mask)
    }

    /// Splits one `f32` lane into its elements of `ty`, in computation type.
    pub fn unpack_one(&mut self, lane: &B::Value, ty: DataType) -> B::Value {
        match ty {
            DataType::F16 => self
                .backend
                .call_helper(PackHelper::UnpackHalf2(self.ctx.half_encoding()), lane),
            DataType::Int16 | DataType::UInt16 => self.split_bits(lane, 16, ty.is_signed()),
            DataType::Int8 | DataType::UInt8 => self.split_bits(lane, 8, ty == DataType::Int8),
            DataType::O8 => {
                let bytes = self.split_bits(lane, 8, false);
                let bytes = self.backend.convert(Conversion::Bitcast, &bytes, Scalar::I32);
                let bias = self.backend.splat_constant(Constant::I32(128), 4);
                self.backend.binary(BinaryOp::Sub, &bytes, &bias)
            }
            DataType::C10 => {
                let bytes = self.split_bits(lane, 8, false);
                let floats = self.backend.convert(Conversion::Numeric, &bytes, Scalar::F32);
                let scale = self.backend.splat_constant(Constant::F32(1.0 / 255.0), 4);
                self.backend.binary(BinaryOp::Mul, &floats, &scale)
            }
            DataType::F32 | DataType::Int32 | DataType::UInt32 | DataType::Unk => {
                let scalar = compute_scalar(ty);
                if scalar == Scalar::F32 {
                    lane.clone()
                } else {
                    self.backend.convert(Conversion::Bitcast, lane, scalar)
                }
            }
        }
    }

    /// Fields of `width` bits, lowest first: shift each field to the top, then back down.
    fn split_bits(&mut self, lane: &B::Value, width: u32, signed: bool) -> B::Value {
        let count = 32 / width;
        let scalar = if signed { Scalar::I32 } else { Scalar::U32 };
        let bits = self.backend.convert(Conversion::Bitcast, lane, scalar);
        let spread = self.backend.splat(&bits, count);

        let constant = |v: u32| match scalar {
            Scalar::I32 => Constant::I32(v as i32),
            _ => Constant::U32(v),
        };
        let ups: Vec<_> = (0..count)
            .map(|k| self.backend.constant(constant(32 - width * (k + 1))))
            .collect();
        let up = self.backend.construct(&ups);
        let down = self.backend.splat_constant(constant(32 - width), count);

        let raised = self.backend.binary(BinaryOp::Shl, &spread, &up);
        let op = if signed { BinaryOp::Asr } else { BinaryOp::Shr };
        self.backend.binary(op, &raised, &down)
    }

    /// Packs `ratio` elements of `ty` (in computation type) into one `f32` lane.
    pub fn pack_one(&mut self, elements: &B::Value, ty: DataType) -> B::Value {
        match ty {
            DataType::F16 => self
                .backend
                .call_helper(PackHelper::PackHalf2(self.ctx.half_encoding()), elements),
            DataType::Int16 | DataType::UInt16 => {
                let bits = self.as_u32(elements);
                self.join_bits(&bits, 16)
            }
            DataType::Int8 | DataType::UInt8 => {
                let bits = self.as_u32(elements);
                self.join_bits(&bits, 8)
            }
            DataType::O8 => {
                let bias = self.backend.splat_constant(Constant::I32(128), 4);
                let biased = self.backend.binary(BinaryOp::Add, elements, &bias);
                let bits = self.as_u32(&biased);
                self.join_bits(&bits, 8)
            }
            DataType::C10 => {
                let bytes = self.float_to_unorm(elements, 255.0);
                self.join_bits(&bytes, 8)
            }
            DataType::F32 | DataType::Int32 | DataType::UInt32 | DataType::Unk => {
                if self.scalar_of(elements) == Scalar::F32 {
                    elements.clone()
                } else {
                    self.backend.convert(Conversion::Bitcast, elements, Scalar::F32)
                }
            }
        }
    }

    fn as_u32(&mut self, value: &B::Value) -> B::Value {
        if self.scalar_of(value) == Scalar::U32 {
            value.clone()
        } else {
            self.backend.convert(Conversion::Bitcast, value, Scalar::U32)
        }
    }

    /// `round(clamp(x, 0, 1) * max)` as unsigned integers.
    fn float_to_unorm(&mut self, value: &B::Value, max: f32) -> B::Value {
        let count = self.count_of(value);
        let zero = self.backend.splat_constant(Constant::F32(0.0), count);
        let one = self.backend.splat_constant(Constant::F32(1.0), count);
        let scale = self.backend.splat_constant(Constant::F32(max), count);
        let clamped = self.backend.builtin(Builtin::Clamp, &[value.clone(), zero, one]);
        let scaled = self.backend.binary(BinaryOp::Mul, &clamped, &scale);
        let rounded = self.backend.builtin(Builtin::Round, &[scaled]);
        self.backend.convert(Conversion::Numeric, &rounded, Scalar::U32)
    }

    /// Masks each `u32` component to `width` bits and ORs them together, lowest first.
    fn join_bits(&mut self, bits: &B::Value, width: u32) -> B::Value {
        let count = 32 / width;
        let field = self.backend.splat_constant(Constant::U32((1 << width) - 1), count);
        let masked = self.backend.binary(BinaryOp::And, bits, &field);
        let shifts: Vec<_> = (0..count).map(|k| self.backend.u32(k * width)).collect();
        let shifts = self.backend.construct(&shifts);
        let placed = self.backend.binary(BinaryOp::Shl, &masked, &shifts);

        let mut word = self.backend.extract(&placed, 0);
        for k in 1..count {
            let part = self.backend.extract(&placed, k);
            word = self.backend.binary(BinaryOp::Or, &word, &part);
        }
        self.backend.convert(Conversion::Bitcast, &word, Scalar::F32)
    }

    /// Negation and absolute value. Unsigned values negate as `0 - x` and have no absolute
    /// value.
    pub fn apply_modifiers(&mut self, flags: RegisterFlags, value: B::Value) -> B::Value {
        let ty = self.backend.type_of(&value);
        let mut value = value;
        if flags.contains(RegisterFlags::ABSOLUTE) && matches!(ty.scalar, Scalar::F32 | Scalar::I32) {
            value = self.backend.unary(UnaryOp::Abs, &value);
        }
        if flags.contains(RegisterFlags::NEGATIVE) {
            value = match ty.scalar {
                Scalar::F32 | Scalar::I32 => self.backend.unary(UnaryOp::Neg, &value),
                Scalar::U32 => {
                    let zero = self.backend.splat_constant(Constant::U32(0), ty.count);
                    self.backend.binary(BinaryOp::Sub, &zero, &value)
                }
                Scalar::Bool => value,
            };
        }
        value
    }

    /// Converts an integer value of element type `src` to float, normalizing by the type's
    /// maximum when `scale` is set.
    pub fn to_float(&mut self, value: &B::Value, src: DataType, scale: bool) -> B::Value {
        let ty = self.backend.type_of(value);
        let value = if ty.scalar == Scalar::F32 {
            value.clone()
        } else {
            self.backend.convert(Conversion::Numeric, value, Scalar::F32)
        };
        if scale && !src.is_float() {
            let factor = self
                .backend
                .splat_constant(Constant::F32(1.0 / type_max(src)), ty.count);
            self.backend.binary(BinaryOp::Mul, &value, &factor)
        } else {
            value
        }
    }

    /// Converts a float value to the computation type of `dest`, denormalizing by the type's
    /// maximum when `scale` is set.
    pub fn to_int(&mut self, value: &B::Value, dest: DataType, scale: bool) -> B::Value {
        let count = self.count_of(value);
        let value = if scale {
            let lo = if dest.is_signed() { -1.0 } else { 0.0 };
            let lo = self.backend.splat_constant(Constant::F32(lo), count);
            let hi = self.backend.splat_constant(Constant::F32(1.0), count);
            let max = self.backend.splat_constant(Constant::F32(type_max(dest)), count);
            let clamped = self.backend.builtin(Builtin::Clamp, &[value.clone(), lo, hi]);
            let scaled = self.backend.binary(BinaryOp::Mul, &clamped, &max);
            self.backend.builtin(Builtin::Round, &[scaled])
        } else {
            value.clone()
        };
        self.backend
            .convert(Conversion::Numeric, &value, compute_scalar(dest))
    }

    /// Brings `value` to `scalar`. Within 32-bit storage types the bits are kept; otherwise the
    /// number is.
    fn coerce(&mut self, value: &B::Value, scalar: Scalar, keep_bits: bool) -> B::Value {
        let ty = self.backend.type_of(value);
        if ty.scalar == scalar {
            return value.clone();
        }
        if ty.scalar == Scalar::Bool {
            let one = self.backend.splat_constant(Constant::of(scalar, 1.0), ty.count);
            let zero = self.backend.splat_constant(Constant::of(scalar, 0.0), ty.count);
            return self.backend.select(value, &one, &zero);
        }
        let conversion = if keep_bits {
            Conversion::Bitcast
        } else {
            Conversion::Numeric
        };
        self.backend.convert(conversion, value, scalar)
    }

    /// Component of `value` that feeds destination channel `channel`, the `ordinal`-th set bit
    /// of the write mask.
    fn component(&mut self, value: &B::Value, channel: u32, ordinal: u32) -> B::Value {
        let count = self.count_of(value);
        match count {
            1 => value.clone(),
            4 => self.backend.extract(value, channel),
            _ => self.backend.extract(value, ordinal.min(count - 1)),
        }
    }

    /// Evaluates an instruction predicate. `None` means the instruction always executes.
    pub fn predicate_condition(&mut self, predicate: ExtPredicate) -> Result<Option<B::Value>, TranslateError> {
        let Some((n, negate)) = predicate.register() else {
            if predicate == ExtPredicate::Pn {
                warn!("Pn predicate is not supported");
                return Err(TranslateError::unsupported("Pn predicate"));
            }
            return Ok(None);
        };
        let place = self.resolver.predicate(&mut self.backend, n as i32)?;
        let value = self.backend.load(&place);
        Ok(Some(if negate {
            self.backend.unary(UnaryOp::Not, &value)
        } else {
            value
        }))
    }

    /// Writes `value` into the channels of `dest` selected by `mask`.
    ///
    /// A four-component value is indexed by channel, a narrower one supplies the set channels in
    /// ascending order and a scalar is broadcast. When `predicate` is given, only invocations
    /// where it holds observe the write.
    pub fn store(
        &mut self,
        dest: &Operand,
        value: &B::Value,
        mask: u32,
        offset: i32,
        predicate: Option<&B::Value>,
    ) -> Result<(), TranslateError> {
        let mask = mask & 0b1111;
        if mask == 0 {
            return Ok(());
        }
        match dest.bank {
            RegisterBank::Predicate => return self.store_predicate(dest, value, offset, predicate),
            RegisterBank::Temp
            | RegisterBank::PrimAttr
            | RegisterBank::Output
            | RegisterBank::SecAttr
            | RegisterBank::FpInternal => {}
            other => {
                warn!(bank = ?other, "store to unaddressable bank");
                return Err(TranslateError::unsupported(format!(
                    "store to {} bank",
                    other.short_name()
                )));
            }
        }

        let ty = storage_type(dest);
        let scalar = compute_scalar(ty);
        let ratio = lane_ratio(ty);
        let vty = self.backend.type_of(value);

        if ratio == 1 && mask == 0b1111 && vty.count == 4 {
            let found = self
                .resolver
                .resolve(&mut self.backend, dest.bank, dest.num, offset, true)?;
            if found.offset == 0 && found.reg.lanes == 4 {
                let typed = self.coerce(value, scalar, true);
                let bits = self.coerce(&typed, Scalar::F32, true);
                return self.write_register(&found.reg, bits, predicate);
            }
        }

        let mut channels: [Option<B::Value>; 4] = [None, None, None, None];
        for (ordinal, channel) in mask_bits(mask).enumerate() {
            let part = self.component(value, channel, ordinal as u32);
            channels[channel as usize] = Some(self.coerce(&part, scalar, ratio == 1));
        }

        let mut writes = Vec::new();
        if ratio == 1 {
            for (channel, part) in channels.iter().enumerate() {
                if let Some(part) = part {
                    let bits = self.coerce(part, Scalar::F32, true);
                    writes.push((channel as u32, bits));
                }
            }
        } else {
            let lanes = 4 / ratio;
            for lane in 0..lanes {
                let first = lane * ratio;
                let covered = (first..first + ratio).filter(|&e| channels[e as usize].is_some()).count();
                if covered == 0 {
                    continue;
                }
                let old = if covered as u32 == ratio {
                    None
                } else {
                    let found = self.resolver.resolve(
                        &mut self.backend,
                        dest.bank,
                        dest.num,
                        offset + lane as i32,
                        true,
                    )?;
                    let reg_value = self.backend.load(&found.reg.place);
                    let bits = if found.reg.lanes == 1 {
                        reg_value
                    } else {
                        self.backend.extract(&reg_value, found.offset)
                    };
                    Some(self.unpack_one(&bits, ty))
                };
                let mut elements = Vec::with_capacity(ratio as usize);
                for k in 0..ratio {
                    let element = match (&channels[(first + k) as usize], &old) {
                        (Some(new), _) => new.clone(),
                        (None, Some(old)) => self.backend.extract(old, k),
                        (None, None) => self.backend.constant(Constant::of(scalar, 0.0)),
                    };
                    elements.push(element);
                }
                let elements = self.backend.construct(&elements);
                writes.push((lane, self.pack_one(&elements, ty)));
            }
        }

        self.write_lanes(dest.bank, dest.num, offset, writes, predicate)
    }

    fn store_predicate(
        &mut self,
        dest: &Operand,
        value: &B::Value,
        offset: i32,
        predicate: Option<&B::Value>,
    ) -> Result<(), TranslateError> {
        let place = self.resolver.predicate(&mut self.backend, dest.num as i32 + offset)?;
        let ty = self.backend.type_of(value);
        let value = if ty.count > 1 {
            self.backend.extract(value, 0)
        } else {
            value.clone()
        };
        let value = if ty.scalar == Scalar::Bool {
            value
        } else {
            let zero = self.backend.constant(Constant::of(ty.scalar, 0.0));
            self.backend.compare(CompareOp::Ne, &value, &zero)
        };
        let value = match predicate {
            Some(cond) => {
                let old = self.backend.load(&place);
                self.backend.select(cond, &value, &old)
            }
            None => value,
        };
        self.backend.store(&place, &value);
        Ok(())
    }

    /// Writes `f32` lanes, relative to `num + offset`, grouping them by backing register.
    fn write_lanes(
        &mut self,
        bank: RegisterBank,
        num: u32,
        offset: i32,
        writes: Vec<(u32, B::Value)>,
        predicate: Option<&B::Value>,
    ) -> Result<(), TranslateError> {
        let mut groups: Vec<(Register<B::Place>, Vec<(u32, B::Value)>)> = Vec::new();
        for (lane, value) in writes {
            let found = self
                .resolver
                .resolve(&mut self.backend, bank, num, offset + lane as i32, true)?;
            match groups.iter_mut().find(|(reg, _)| *reg == found.reg) {
                Some((_, lanes)) => lanes.push((found.offset, value)),
                None => groups.push((found.reg, vec![(found.offset, value)])),
            }
        }

        for (reg, mut lanes) in groups {
            lanes.sort_by_key(|(index, _)| *index);
            let full = lanes.len() as u32 == reg.lanes;
            let new = if full {
                let parts: Vec<_> = lanes.into_iter().map(|(_, v)| v).collect();
                self.backend.construct(&parts)
            } else {
                let old = self.backend.load(&reg.place);
                if let [(index, part)] = lanes.as_slice() {
                    self.backend.insert(&old, part, *index)
                } else {
                    let written: Vec<_> = lanes.iter().map(|(_, v)| v.clone()).collect();
                    let written = self.backend.construct(&written);
                    let indices: Vec<u32> = (0..reg.lanes)
                        .map(|j| match lanes.iter().position(|(index, _)| *index == j) {
                            Some(k) => reg.lanes + k as u32,
                            None => j,
                        })
                        .collect();
                    self.backend.shuffle(&old, &written, &indices)
                }
            };
            self.write_register(&reg, new, predicate)?;
        }
        Ok(())
    }

    fn write_register(
        &mut self,
        reg: &Register<B::Place>,
        value: B::Value,
        predicate: Option<&B::Value>,
    ) -> Result<(), TranslateError> {
        let value = match predicate {
            Some(cond) => {
                let old = self.backend.load(&reg.place);
                self.backend.select(cond, &value, &old)
            }
            None => value,
        };
        self.backend.store(&reg.place, &value);
        Ok(())
    }

    /// A vector of `count` copies of `value` in `scalar`.
    pub fn literal(&mut self, scalar: Scalar, value: f32, count: u32) -> B::Value {
        self.backend.splat_constant(Constant::of(scalar, value), count)
    }

    pub fn type_of(&self, value: &B::Value) -> IrType {
        self.backend.type_of(value)
    }
}
