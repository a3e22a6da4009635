//! GLSL 4.50 text emitter.
//!
//! Every non-constant value becomes a named temporary (`_vN`), so the output reads as straight-line
//! SSA. Uniform buffers are `std140` blocks of `vec4` arrays and the `vldst` memory spaces are
//! `std430` buffers of `uint` words, matching the SPIR-V backend's bindings.

use std::fmt::Write as _;

use hashbrown::HashSet;

use crate::ir::{
    Backend, BinaryOp, Builtin, BuiltinVariable, CompareOp, Constant, Conversion, HalfEncoding,
    IrType, MemorySpace, PackHelper, Scalar, ShaderStage, StorageClass, UnaryOp,
};

fn type_name(ty: IrType) -> String {
    let (scalar, prefix) = match ty.scalar {
        Scalar::F32 => ("float", ""),
        Scalar::I32 => ("int", "i"),
        Scalar::U32 => ("uint", "u"),
        Scalar::Bool => ("bool", "b"),
    };
    if ty.count == 1 {
        scalar.to_owned()
    } else {
        format!("{prefix}vec{}", ty.count)
    }
}

fn literal(value: Constant) -> String {
    match value {
        Constant::F32(v) if v.is_finite() => format!("{v:?}"),
        Constant::F32(v) => format!("uintBitsToFloat({:#x}u)", v.to_bits()),
        Constant::I32(i32::MIN) => "int(0x80000000u)".to_owned(),
        Constant::I32(v) => v.to_string(),
        Constant::U32(v) => format!("{v}u"),
        Constant::Bool(v) => v.to_string(),
    }
}

fn zero(ty: IrType) -> String {
    let one = literal(Constant::of(ty.scalar, 0.0));
    if ty.count == 1 {
        one
    } else {
        format!("{}({one})", type_name(ty))
    }
}

const LANES: [char; 4] = ['x', 'y', 'z', 'w'];

#[derive(Debug, Clone)]
pub struct Value {
    expr: String,
    ty: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    lvalue: String,
    ty: IrType,
    /// Uniform block instance whose `data` array the place indexes.
    block: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function(String);

pub struct GlslBackend {
    stage: ShaderStage,
    next: u32,
    declarations: String,
    helpers: String,
    functions: String,
    entry: String,
    open: Option<String>,
    emitted_helpers: HashSet<PackHelper>,
    buffers: HashSet<MemorySpace>,
}

impl GlslBackend {
    pub fn new(stage: ShaderStage) -> Self {
        GlslBackend {
            stage,
            next: 0,
            declarations: String::new(),
            helpers: String::new(),
            functions: String::new(),
            entry: String::new(),
            open: None,
            emitted_helpers: HashSet::new(),
            buffers: HashSet::new(),
        }
    }

    fn body(&mut self) -> &mut String {
        match &mut self.open {
            Some(body) => body,
            None => &mut self.entry,
        }
    }

    fn line(&mut self, text: &str) {
        let body = self.body();
        body.push_str("    ");
        body.push_str(text);
        body.push('\n');
    }

    /// Binds `expr` to a fresh temporary of `ty`.
    fn temp(&mut self, ty: IrType, expr: &str) -> Value {
        let name = format!("_v{}", self.next);
        self.next += 1;
        self.line(&format!("{} {name} = {expr};", type_name(ty)));
        Value { expr: name, ty }
    }

    fn broadcast(&mut self, value: &Value, count: u32) -> Value {
        if value.ty.count >= count {
            return value.clone();
        }
        let ty = value.ty.with_count(count);
        if value.ty.is_scalar() {
            return self.temp(ty, &format!("{}({})", type_name(ty), value.expr));
        }
        let last = value.ty.count as usize - 1;
        let swizzle: String = (0..count as usize).map(|i| LANES[i.min(last)]).collect();
        self.temp(ty, &format!("{}.{swizzle}", value.expr))
    }

    fn widen_pair(&mut self, a: &Value, b: &Value) -> (Value, Value) {
        let count = a.ty.count.max(b.ty.count);
        (self.broadcast(a, count), self.broadcast(b, count))
    }

    /// Component `index` of `value` as an expression.
    fn component(value: &Value, index: u32) -> String {
        if value.ty.is_scalar() {
            value.expr.clone()
        } else {
            format!("{}.{}", value.expr, LANES[(index & 3) as usize])
        }
    }

    fn bitcast_expr(expr: &str, from: Scalar, to: Scalar, ty: IrType) -> String {
        match (from, to) {
            (Scalar::F32, Scalar::I32) => format!("floatBitsToInt({expr})"),
            (Scalar::F32, Scalar::U32) => format!("floatBitsToUint({expr})"),
            (Scalar::I32, Scalar::F32) => format!("intBitsToFloat({expr})"),
            (Scalar::U32, Scalar::F32) => format!("uintBitsToFloat({expr})"),
            _ => format!("{}({expr})", type_name(ty)),
        }
    }

    fn helper(&mut self, helper: PackHelper) -> &'static str {
        let (name, text) = match helper {
            PackHelper::UnpackHalf2(HalfEncoding::Unorm16) => (
                "unpack_unorm16x2",
                "vec2 unpack_unorm16x2(float v) {\n    return unpackUnorm2x16(floatBitsToUint(v));\n}\n",
            ),
            PackHelper::UnpackHalf2(HalfEncoding::Ieee) => (
                "unpack_half2",
                "vec2 unpack_half2(float v) {\n    return unpackHalf2x16(floatBitsToUint(v));\n}\n",
            ),
            PackHelper::PackHalf2(HalfEncoding::Unorm16) => (
                "pack_unorm16x2",
                "float pack_unorm16x2(vec2 v) {\n    return uintBitsToFloat(packUnorm2x16(v));\n}\n",
            ),
            PackHelper::PackHalf2(HalfEncoding::Ieee) => (
                "pack_half2",
                "float pack_half2(vec2 v) {\n    return uintBitsToFloat(packHalf2x16(v));\n}\n",
            ),
        };
        if self.emitted_helpers.insert(helper) {
            self.helpers.push_str(text);
        }
        name
    }

    /// `words[offset >> 2]` of the buffer backing `space`.
    fn word(&mut self, space: MemorySpace, byte_offset: &Value) -> String {
        if self.buffers.insert(space) {
            let _ = writeln!(
                self.declarations,
                "layout(std430, set = 1, binding = {}) buffer {}_block {{\n    uint words[];\n}} {};",
                space.binding(),
                space.name(),
                space.name()
            );
        }
        let offset = if byte_offset.ty.scalar == Scalar::U32 {
            byte_offset.expr.clone()
        } else {
            format!("uint({})", byte_offset.expr)
        };
        format!("{}.words[{offset} >> 2u]", space.name())
    }
}

impl Backend for GlslBackend {
    type Value = Value;
    type Place = Place;
    type Function = Function;
    type Output = String;

    fn type_of(&self, value: &Value) -> IrType {
        value.ty
    }

    fn constant(&mut self, value: Constant) -> Value {
        Value {
            expr: literal(value),
            ty: IrType::scalar(value.scalar()),
        }
    }

    fn construct(&mut self, parts: &[Value]) -> Value {
        if let [only] = parts {
            return only.clone();
        }
        let count = parts.iter().map(|p| p.ty.count).sum();
        let ty = parts[0].ty.with_count(count);
        let args: Vec<&str> = parts.iter().map(|p| p.expr.as_str()).collect();
        self.temp(ty, &format!("{}({})", type_name(ty), args.join(", ")))
    }

    fn declare(&mut self, name: &str, ty: IrType, storage: StorageClass) -> Place {
        let decl = &mut self.declarations;
        let lvalue = match storage {
            StorageClass::Private => {
                let _ = writeln!(decl, "{} {name} = {};", type_name(ty), zero(ty));
                name.to_owned()
            }
            StorageClass::Input { location } => {
                let flat = if ty.scalar != Scalar::F32 && self.stage == ShaderStage::Fragment {
                    "flat "
                } else {
                    ""
                };
                let _ = writeln!(
                    decl,
                    "layout(location = {location}) {flat}in {} {name};",
                    type_name(ty)
                );
                name.to_owned()
            }
            StorageClass::Output { location } => {
                let _ = writeln!(decl, "layout(location = {location}) out {} {name};", type_name(ty));
                name.to_owned()
            }
            StorageClass::BuiltinInput(builtin) | StorageClass::BuiltinOutput(builtin) => {
                match builtin {
                    BuiltinVariable::VertexIndex => "gl_VertexIndex",
                    BuiltinVariable::InstanceIndex => "gl_InstanceIndex",
                    BuiltinVariable::Position => "gl_Position",
                    BuiltinVariable::FragCoord => "gl_FragCoord",
                }
                .to_owned()
            }
            StorageClass::UniformArray { binding, len } => {
                let _ = writeln!(
                    decl,
                    "layout(std140, set = 0, binding = {binding}) uniform {name}_block {{\n    {} data[{}];\n}} {name};",
                    type_name(ty),
                    len.max(1)
                );
                return Place {
                    lvalue: format!("{name}.data[0]"),
                    ty,
                    block: Some(name.to_owned()),
                };
            }
        };
        Place {
            lvalue,
            ty,
            block: None,
        }
    }

    fn element(&mut self, place: &Place, index: u32) -> Place {
        let base = place.block.clone().unwrap_or_else(|| place.lvalue.clone());
        Place {
            lvalue: format!("{base}.data[{index}]"),
            ty: place.ty,
            block: place.block.clone(),
        }
    }

    fn load(&mut self, place: &Place) -> Value {
        self.temp(place.ty, &place.lvalue)
    }

    fn store(&mut self, place: &Place, value: &Value) {
        self.line(&format!("{} = {};", place.lvalue, value.expr));
    }

    fn extract(&mut self, value: &Value, index: u32) -> Value {
        if value.ty.is_scalar() {
            return value.clone();
        }
        Value {
            expr: Self::component(value, index),
            ty: value.ty.with_count(1),
        }
    }

    fn insert(&mut self, value: &Value, part: &Value, index: u32) -> Value {
        if value.ty.is_scalar() {
            return part.clone();
        }
        let copy = self.temp(value.ty, &value.expr);
        self.line(&format!("{} = {};", Self::component(&copy, index), part.expr));
        copy
    }

    fn shuffle(&mut self, a: &Value, b: &Value, indices: &[u32]) -> Value {
        let left = a.ty.count;
        let picks: Vec<String> = indices
            .iter()
            .map(|&ix| {
                if ix < left {
                    Self::component(a, ix)
                } else {
                    Self::component(b, ix - left)
                }
            })
            .collect();
        let ty = a.ty.with_count(indices.len() as u32);
        if let [only] = picks.as_slice() {
            return Value {
                expr: only.clone(),
                ty,
            };
        }
        if !a.ty.is_scalar() && indices.iter().all(|&ix| ix < left) {
            let swizzle: String = indices.iter().map(|&ix| LANES[ix as usize]).collect();
            return self.temp(ty, &format!("{}.{swizzle}", a.expr));
        }
        self.temp(ty, &format!("{}({})", type_name(ty), picks.join(", ")))
    }

    fn binary(&mut self, op: BinaryOp, a: &Value, b: &Value) -> Value {
        let (a, b) = self.widen_pair(a, b);
        let ty = a.ty;
        let (x, y) = (&a.expr, &b.expr);
        let expr = match (ty.scalar, op) {
            (_, BinaryOp::Min) => format!("min({x}, {y})"),
            (_, BinaryOp::Max) => format!("max({x}, {y})"),
            (Scalar::Bool, op) => {
                let op = match op {
                    BinaryOp::And | BinaryOp::Mul => "&",
                    BinaryOp::Or | BinaryOp::Add => "|",
                    _ => "^",
                };
                if ty.is_scalar() {
                    format!("bool(uint({x}) {op} uint({y}))")
                } else {
                    let u = type_name(ty.with_scalar(Scalar::U32));
                    format!("{}({u}({x}) {op} {u}({y}))", type_name(ty))
                }
            }
            (_, BinaryOp::Add) => format!("{x} + {y}"),
            (_, BinaryOp::Sub) => format!("{x} - {y}"),
            (_, BinaryOp::Mul) => format!("{x} * {y}"),
            (_, BinaryOp::Div) => format!("{x} / {y}"),
            (Scalar::F32, op) => {
                let ua = Value {
                    expr: format!("floatBitsToUint({x})"),
                    ty: ty.with_scalar(Scalar::U32),
                };
                let ub = Value {
                    expr: format!("floatBitsToUint({y})"),
                    ty: ty.with_scalar(Scalar::U32),
                };
                let bits = self.binary(op, &ua, &ub);
                return self.temp(ty, &format!("uintBitsToFloat({})", bits.expr));
            }
            (_, BinaryOp::And) => format!("{x} & {y}"),
            (_, BinaryOp::Or) => format!("{x} | {y}"),
            (_, BinaryOp::Xor) => format!("{x} ^ {y}"),
            (_, BinaryOp::Shl) => format!("{x} << {y}"),
            (Scalar::U32, BinaryOp::Shr) | (Scalar::I32, BinaryOp::Asr) => format!("{x} >> {y}"),
            (_, BinaryOp::Shr) => {
                let u = type_name(ty.with_scalar(Scalar::U32));
                format!("{}({u}({x}) >> {y})", type_name(ty))
            }
            (_, BinaryOp::Asr) => {
                let i = type_name(ty.with_scalar(Scalar::I32));
                format!("{}({i}({x}) >> {y})", type_name(ty))
            }
        };
        self.temp(ty, &expr)
    }

    fn unary(&mut self, op: UnaryOp, a: &Value) -> Value {
        let x = &a.expr;
        let expr = match (op, a.ty.scalar) {
            (UnaryOp::Neg, Scalar::Bool) | (UnaryOp::Abs, Scalar::U32 | Scalar::Bool) => {
                return a.clone()
            }
            (UnaryOp::Neg, _) => format!("-{x}"),
            (UnaryOp::Abs, _) => format!("abs({x})"),
            (UnaryOp::Not, Scalar::Bool) if a.ty.is_scalar() => format!("!{x}"),
            (UnaryOp::Not, Scalar::Bool) => format!("not({x})"),
            (UnaryOp::Not, Scalar::F32) => format!("uintBitsToFloat(~floatBitsToUint({x}))"),
            (UnaryOp::Not, _) => format!("~{x}"),
        };
        self.temp(a.ty, &expr)
    }

    fn compare(&mut self, op: CompareOp, a: &Value, b: &Value) -> Value {
        let (a, b) = self.widen_pair(a, b);
        let ty = a.ty.with_scalar(Scalar::Bool);
        let (x, y) = (&a.expr, &b.expr);
        let expr = if ty.is_scalar() {
            let op = match op {
                CompareOp::Eq => "==",
                CompareOp::Ne => "!=",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
            };
            format!("{x} {op} {y}")
        } else {
            let func = match op {
                CompareOp::Eq => "equal",
                CompareOp::Ne => "notEqual",
                CompareOp::Lt => "lessThan",
                CompareOp::Le => "lessThanEqual",
                CompareOp::Gt => "greaterThan",
                CompareOp::Ge => "greaterThanEqual",
            };
            format!("{func}({x}, {y})")
        };
        self.temp(ty, &expr)
    }

    fn select(&mut self, cond: &Value, a: &Value, b: &Value) -> Value {
        let count = a.ty.count.max(b.ty.count).max(cond.ty.count);
        let a = self.broadcast(a, count);
        let b = self.broadcast(b, count);
        let expr = if cond.ty.is_scalar() {
            format!("{} ? {} : {}", cond.expr, a.expr, b.expr)
        } else {
            format!("mix({}, {}, {})", b.expr, a.expr, cond.expr)
        };
        self.temp(a.ty, &expr)
    }

    fn builtin(&mut self, func: Builtin, args: &[Value]) -> Value {
        let count = args.iter().map(|a| a.ty.count).max().unwrap_or(1);
        let wide: Vec<Value> = args.iter().map(|a| self.broadcast(a, count)).collect();
        let ty = match func {
            Builtin::Dot => IrType::F32,
            _ => wide[0].ty,
        };
        let name = match func {
            Builtin::Floor => "floor",
            Builtin::Fract => "fract",
            Builtin::Round => "round",
            Builtin::Sign => "sign",
            Builtin::InverseSqrt => "inversesqrt",
            Builtin::Exp2 => "exp2",
            Builtin::Log2 => "log2",
            Builtin::Step => "step",
            Builtin::Mix => "mix",
            Builtin::Clamp => "clamp",
            Builtin::Dot if count == 1 => {
                return self.temp(ty, &format!("{} * {}", wide[0].expr, wide[1].expr));
            }
            Builtin::Dot => "dot",
            Builtin::Dfdx => "dFdx",
            Builtin::Dfdy => "dFdy",
        };
        let args: Vec<&str> = wide.iter().map(|a| a.expr.as_str()).collect();
        self.temp(ty, &format!("{name}({})", args.join(", ")))
    }

    fn convert(&mut self, conversion: Conversion, value: &Value, to: Scalar) -> Value {
        let from = value.ty.scalar;
        if from == to {
            return value.clone();
        }
        let ty = value.ty.with_scalar(to);
        let expr = if conversion == Conversion::Bitcast && from != Scalar::Bool && to != Scalar::Bool {
            Self::bitcast_expr(&value.expr, from, to, ty)
        } else {
            format!("{}({})", type_name(ty), value.expr)
        };
        self.temp(ty, &expr)
    }

    fn call_helper(&mut self, helper: PackHelper, arg: &Value) -> Value {
        let name = self.helper(helper);
        let ty = match helper {
            PackHelper::UnpackHalf2(_) => IrType::vector(Scalar::F32, 2),
            PackHelper::PackHalf2(_) => IrType::F32,
        };
        self.temp(ty, &format!("{name}({})", arg.expr))
    }

    fn fetch_memory(&mut self, space: MemorySpace, byte_offset: &Value) -> Value {
        let word = self.word(space, byte_offset);
        self.temp(IrType::F32, &format!("uintBitsToFloat({word})"))
    }

    fn store_memory(&mut self, space: MemorySpace, byte_offset: &Value, value: &Value) {
        let word = self.word(space, byte_offset);
        let bits = match value.ty.scalar {
            Scalar::F32 => format!("floatBitsToUint({})", value.expr),
            _ => format!("uint({})", value.expr),
        };
        self.line(&format!("{word} = {bits};"));
    }

    fn begin_function(&mut self, name: &str) -> Function {
        self.end_function();
        self.open = Some(format!("void {name}() {{\n"));
        Function(name.to_owned())
    }

    fn end_function(&mut self) {
        if let Some(body) = self.open.take() {
            self.functions.push_str(&body);
            self.functions.push_str("}\n\n");
        }
    }

    fn call_function(&mut self, function: &Function) {
        self.line(&format!("{}();", function.0));
    }

    fn begin_entry(&mut self) {
        self.end_function();
    }

    fn finish(mut self) -> String {
        self.end_function();
        let mut out = String::from("#version 450\n\n");
        out.push_str(&self.declarations);
        out.push('\n');
        out.push_str(&self.helpers);
        if !self.helpers.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.functions);
        out.push_str("void main() {\n");
        out.push_str(&self.entry);
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_typed() {
        assert_eq!(literal(Constant::F32(1.0)), "1.0");
        assert_eq!(literal(Constant::U32(255)), "255u");
        assert_eq!(literal(Constant::I32(-4)), "-4");
        assert_eq!(type_name(IrType::vector(Scalar::U32, 3)), "uvec3");
    }

    #[test]
    fn vector_compare_uses_functions() {
        let mut b = GlslBackend::new(ShaderStage::Fragment);
        let x = b.declare("x", IrType::VEC4, StorageClass::Private);
        let v = b.load(&x);
        let zero = b.splat_constant(Constant::F32(0.0), 4);
        let lt = b.compare(CompareOp::Lt, &v, &zero);
        let picked = b.select(&lt, &zero, &v);
        b.store(&x, &picked);
        let text = b.finish();
        assert!(text.contains("lessThan("), "{text}");
        assert!(text.contains("mix("), "{text}");
        assert!(text.contains("vec4 x = vec4(0.0);"), "{text}");
    }
}
