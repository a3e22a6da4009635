//! SPIR-V word emitter.
//!
//! Produces a Vulkan-flavoured SPIR-V 1.3 module: `Shader` capability, `GLSL.std.450` for the math
//! builtins, register files as `Private` globals, uniform buffers as `vec4` array blocks and the
//! `vldst` memory spaces as storage buffers of `uint` words in descriptor set 1.

use hashbrown::HashMap;

use crate::ir::{
    Backend, BinaryOp, Builtin, BuiltinVariable, CompareOp, Constant, Conversion, HalfEncoding,
    IrType, MemorySpace, PackHelper, Scalar, ShaderStage, StorageClass, UnaryOp,
};

const MAGIC: u32 = 0x0723_0203;
const VERSION_1_3: u32 = 0x0001_0300;
const GENERATOR: u32 = 0;

const OP_NAME: u16 = 5;
const OP_EXT_INST_IMPORT: u16 = 11;
const OP_EXT_INST: u16 = 12;
const OP_MEMORY_MODEL: u16 = 14;
const OP_ENTRY_POINT: u16 = 15;
const OP_EXECUTION_MODE: u16 = 16;
const OP_CAPABILITY: u16 = 17;
const OP_TYPE_VOID: u16 = 19;
const OP_TYPE_BOOL: u16 = 20;
const OP_TYPE_INT: u16 = 21;
const OP_TYPE_FLOAT: u16 = 22;
const OP_TYPE_VECTOR: u16 = 23;
const OP_TYPE_ARRAY: u16 = 28;
const OP_TYPE_RUNTIME_ARRAY: u16 = 29;
const OP_TYPE_STRUCT: u16 = 30;
const OP_TYPE_POINTER: u16 = 32;
const OP_TYPE_FUNCTION: u16 = 33;
const OP_CONSTANT_TRUE: u16 = 41;
const OP_CONSTANT_FALSE: u16 = 42;
const OP_CONSTANT: u16 = 43;
const OP_CONSTANT_NULL: u16 = 46;
const OP_FUNCTION: u16 = 54;
const OP_FUNCTION_PARAMETER: u16 = 55;
const OP_FUNCTION_END: u16 = 56;
const OP_FUNCTION_CALL: u16 = 57;
const OP_VARIABLE: u16 = 59;
const OP_LOAD: u16 = 61;
const OP_STORE: u16 = 62;
const OP_ACCESS_CHAIN: u16 = 65;
const OP_DECORATE: u16 = 71;
const OP_MEMBER_DECORATE: u16 = 72;
const OP_VECTOR_SHUFFLE: u16 = 79;
const OP_COMPOSITE_CONSTRUCT: u16 = 80;
const OP_COMPOSITE_EXTRACT: u16 = 81;
const OP_COMPOSITE_INSERT: u16 = 82;
const OP_CONVERT_F_TO_U: u16 = 109;
const OP_CONVERT_F_TO_S: u16 = 110;
const OP_CONVERT_S_TO_F: u16 = 111;
const OP_CONVERT_U_TO_F: u16 = 112;
const OP_BITCAST: u16 = 124;
const OP_S_NEGATE: u16 = 126;
const OP_F_NEGATE: u16 = 127;
const OP_I_ADD: u16 = 128;
const OP_F_ADD: u16 = 129;
const OP_I_SUB: u16 = 130;
const OP_F_SUB: u16 = 131;
const OP_I_MUL: u16 = 132;
const OP_F_MUL: u16 = 133;
const OP_U_DIV: u16 = 134;
const OP_S_DIV: u16 = 135;
const OP_F_DIV: u16 = 136;
const OP_DOT: u16 = 148;
const OP_LOGICAL_EQUAL: u16 = 164;
const OP_LOGICAL_NOT_EQUAL: u16 = 165;
const OP_LOGICAL_OR: u16 = 166;
const OP_LOGICAL_AND: u16 = 167;
const OP_LOGICAL_NOT: u16 = 168;
const OP_SELECT: u16 = 169;
const OP_I_EQUAL: u16 = 170;
const OP_I_NOT_EQUAL: u16 = 171;
const OP_U_GREATER_THAN: u16 = 172;
const OP_S_GREATER_THAN: u16 = 173;
const OP_U_GREATER_THAN_EQUAL: u16 = 174;
const OP_S_GREATER_THAN_EQUAL: u16 = 175;
const OP_U_LESS_THAN: u16 = 176;
const OP_S_LESS_THAN: u16 = 177;
const OP_U_LESS_THAN_EQUAL: u16 = 178;
const OP_S_LESS_THAN_EQUAL: u16 = 179;
const OP_F_ORD_EQUAL: u16 = 180;
const OP_F_UNORD_NOT_EQUAL: u16 = 183;
const OP_F_ORD_LESS_THAN: u16 = 184;
const OP_F_ORD_GREATER_THAN: u16 = 186;
const OP_F_ORD_LESS_THAN_EQUAL: u16 = 188;
const OP_F_ORD_GREATER_THAN_EQUAL: u16 = 190;
const OP_SHIFT_RIGHT_LOGICAL: u16 = 194;
const OP_SHIFT_RIGHT_ARITHMETIC: u16 = 195;
const OP_SHIFT_LEFT_LOGICAL: u16 = 196;
const OP_BITWISE_OR: u16 = 197;
const OP_BITWISE_XOR: u16 = 198;
const OP_BITWISE_AND: u16 = 199;
const OP_NOT: u16 = 200;
const OP_DPDX: u16 = 207;
const OP_DPDY: u16 = 208;
const OP_LABEL: u16 = 248;
const OP_RETURN: u16 = 253;
const OP_RETURN_VALUE: u16 = 254;

// GLSL.std.450 instruction numbers.
const GLSL_ROUND: u32 = 1;
const GLSL_F_ABS: u32 = 4;
const GLSL_S_ABS: u32 = 5;
const GLSL_F_SIGN: u32 = 6;
const GLSL_FLOOR: u32 = 8;
const GLSL_FRACT: u32 = 10;
const GLSL_EXP2: u32 = 29;
const GLSL_LOG2: u32 = 30;
const GLSL_INVERSE_SQRT: u32 = 32;
const GLSL_F_MIN: u32 = 37;
const GLSL_U_MIN: u32 = 38;
const GLSL_S_MIN: u32 = 39;
const GLSL_F_MAX: u32 = 40;
const GLSL_U_MAX: u32 = 41;
const GLSL_S_MAX: u32 = 42;
const GLSL_F_CLAMP: u32 = 43;
const GLSL_U_CLAMP: u32 = 44;
const GLSL_S_CLAMP: u32 = 45;
const GLSL_F_MIX: u32 = 46;
const GLSL_STEP: u32 = 48;
const GLSL_PACK_UNORM_2X16: u32 = 57;
const GLSL_PACK_HALF_2X16: u32 = 58;
const GLSL_UNPACK_UNORM_2X16: u32 = 61;
const GLSL_UNPACK_HALF_2X16: u32 = 62;

const CAPABILITY_SHADER: u32 = 1;
const ADDRESSING_LOGICAL: u32 = 0;
const MEMORY_MODEL_GLSL450: u32 = 1;
const EXECUTION_MODEL_VERTEX: u32 = 0;
const EXECUTION_MODEL_FRAGMENT: u32 = 4;
const EXECUTION_MODE_ORIGIN_UPPER_LEFT: u32 = 7;

const CLASS_INPUT: u32 = 1;
const CLASS_UNIFORM: u32 = 2;
const CLASS_OUTPUT: u32 = 3;
const CLASS_PRIVATE: u32 = 6;
const CLASS_STORAGE_BUFFER: u32 = 12;

const DECORATION_BLOCK: u32 = 2;
const DECORATION_ARRAY_STRIDE: u32 = 6;
const DECORATION_BUILTIN: u32 = 11;
const DECORATION_LOCATION: u32 = 30;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_OFFSET: u32 = 35;

const BUILTIN_POSITION: u32 = 0;
const BUILTIN_FRAG_COORD: u32 = 15;
const BUILTIN_VERTEX_INDEX: u32 = 42;
const BUILTIN_INSTANCE_INDEX: u32 = 43;

/// Descriptor set holding the `vldst` memory spaces; uniform blocks live in set 0.
const MEMORY_SET: u32 = 1;

fn header(opcode: u16, word_count: usize) -> u32 {
    ((word_count as u32) << 16) | u32::from(opcode)
}

fn push_inst(buf: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
    buf.push(header(opcode, operands.len() + 1));
    buf.extend_from_slice(operands);
}

/// Nul-terminated UTF-8 packed into little-endian words.
fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Value {
    id: u32,
    ty: IrType,
}

impl Value {
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    var: u32,
    ty: IrType,
    class: u32,
    /// Uniform block: the variable is a struct wrapping a `vec4` array.
    block: bool,
    /// Constant ids indexing into `var`.
    chain: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Function(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Void,
    Value(IrType),
    Pointer(u32, u32),
    Function(u32, Vec<u32>),
}

struct OpenFunction {
    code: Vec<u32>,
}

pub struct SpirvBackend {
    stage: ShaderStage,
    bound: u32,
    glsl: u32,
    entry: u32,
    names: Vec<u32>,
    annotations: Vec<u32>,
    globals: Vec<u32>,
    functions: Vec<u32>,
    entry_code: Vec<u32>,
    open: Option<OpenFunction>,
    interface: Vec<u32>,
    types: HashMap<TypeKey, u32>,
    constants: HashMap<(Scalar, u32), u32>,
    helpers: HashMap<PackHelper, u32>,
    buffers: HashMap<MemorySpace, u32>,
}

impl SpirvBackend {
    pub fn new(stage: ShaderStage) -> Self {
        let mut backend = SpirvBackend {
            stage,
            bound: 1,
            glsl: 0,
            entry: 0,
            names: Vec::new(),
            annotations: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            entry_code: Vec::new(),
            open: None,
            interface: Vec::new(),
            types: HashMap::new(),
            constants: HashMap::new(),
            helpers: HashMap::new(),
            buffers: HashMap::new(),
        };
        backend.glsl = backend.id();
        backend.entry = backend.id();
        backend.name(backend.entry, "main");
        backend
    }

    fn id(&mut self) -> u32 {
        let id = self.bound;
        self.bound += 1;
        id
    }

    fn name(&mut self, target: u32, name: &str) {
        let mut operands = vec![target];
        operands.extend(string_words(name));
        push_inst(&mut self.names, OP_NAME, &operands);
    }

    fn decorate(&mut self, target: u32, decoration: u32, extra: &[u32]) {
        let mut operands = vec![target, decoration];
        operands.extend_from_slice(extra);
        push_inst(&mut self.annotations, OP_DECORATE, &operands);
    }

    fn code(&mut self) -> &mut Vec<u32> {
        match &mut self.open {
            Some(function) => &mut function.code,
            None => &mut self.entry_code,
        }
    }

    fn emit(&mut self, opcode: u16, operands: &[u32]) {
        push_inst(self.code(), opcode, operands);
    }

    /// Emits an instruction producing a value of `ty`.
    fn inst(&mut self, opcode: u16, ty: IrType, operands: &[u32]) -> Value {
        let type_id = self.type_id(ty);
        let id = self.id();
        let mut words = vec![type_id, id];
        words.extend_from_slice(operands);
        self.emit(opcode, &words);
        Value { id, ty }
    }

    fn ext(&mut self, ty: IrType, instruction: u32, args: &[u32]) -> Value {
        let mut operands = vec![self.glsl, instruction];
        operands.extend_from_slice(args);
        self.inst(OP_EXT_INST, ty, &operands)
    }

    fn void_type(&mut self) -> u32 {
        if let Some(&id) = self.types.get(&TypeKey::Void) {
            return id;
        }
        let id = self.id();
        push_inst(&mut self.globals, OP_TYPE_VOID, &[id]);
        self.types.insert(TypeKey::Void, id);
        id
    }

    fn type_id(&mut self, ty: IrType) -> u32 {
        let key = TypeKey::Value(ty);
        if let Some(&id) = self.types.get(&key) {
            return id;
        }
        let id = if ty.count > 1 {
            let component = self.type_id(ty.with_count(1));
            let id = self.id();
            push_inst(&mut self.globals, OP_TYPE_VECTOR, &[id, component, ty.count]);
            id
        } else {
            let id = self.id();
            match ty.scalar {
                Scalar::F32 => push_inst(&mut self.globals, OP_TYPE_FLOAT, &[id, 32]),
                Scalar::I32 => push_inst(&mut self.globals, OP_TYPE_INT, &[id, 32, 1]),
                Scalar::U32 => push_inst(&mut self.globals, OP_TYPE_INT, &[id, 32, 0]),
                Scalar::Bool => push_inst(&mut self.globals, OP_TYPE_BOOL, &[id]),
            }
            id
        };
        self.types.insert(key, id);
        id
    }

    fn pointer_type(&mut self, class: u32, pointee: u32) -> u32 {
        let key = TypeKey::Pointer(class, pointee);
        if let Some(&id) = self.types.get(&key) {
            return id;
        }
        let id = self.id();
        push_inst(&mut self.globals, OP_TYPE_POINTER, &[id, class, pointee]);
        self.types.insert(key, id);
        id
    }

    fn function_type(&mut self, ret: u32, params: &[u32]) -> u32 {
        let key = TypeKey::Function(ret, params.to_vec());
        if let Some(&id) = self.types.get(&key) {
            return id;
        }
        let id = self.id();
        let mut operands = vec![id, ret];
        operands.extend_from_slice(params);
        push_inst(&mut self.globals, OP_TYPE_FUNCTION, &operands);
        self.types.insert(key, id);
        id
    }

    fn constant_id(&mut self, scalar: Scalar, bits: u32) -> u32 {
        if let Some(&id) = self.constants.get(&(scalar, bits)) {
            return id;
        }
        let ty = self.type_id(IrType::scalar(scalar));
        let id = self.id();
        match scalar {
            Scalar::Bool if bits != 0 => push_inst(&mut self.globals, OP_CONSTANT_TRUE, &[ty, id]),
            Scalar::Bool => push_inst(&mut self.globals, OP_CONSTANT_FALSE, &[ty, id]),
            _ => push_inst(&mut self.globals, OP_CONSTANT, &[ty, id, bits]),
        }
        self.constants.insert((scalar, bits), id);
        id
    }

    fn index(&mut self, value: u32) -> u32 {
        self.constant_id(Scalar::U32, value)
    }

    /// Repeats a scalar, or widens a vector by repeating its last component.
    fn broadcast(&mut self, value: Value, count: u32) -> Value {
        if value.ty.count >= count {
            return value;
        }
        let ty = value.ty.with_count(count);
        if value.ty.is_scalar() {
            let parts = vec![value.id; count as usize];
            return self.inst(OP_COMPOSITE_CONSTRUCT, ty, &parts);
        }
        let last = value.ty.count - 1;
        let mut operands = vec![value.id, value.id];
        operands.extend((0..count).map(|i| i.min(last)));
        self.inst(OP_VECTOR_SHUFFLE, ty, &operands)
    }

    fn bitcast(&mut self, value: Value, to: Scalar) -> Value {
        if value.ty.scalar == to {
            return value;
        }
        self.inst(OP_BITCAST, value.ty.with_scalar(to), &[value.id])
    }

    /// Pointer to `place`, through an access chain when it indexes into a block.
    fn pointer(&mut self, place: &Place) -> u32 {
        if !place.block && place.chain.is_empty() {
            return place.var;
        }
        let chain = if place.chain.is_empty() {
            let zero = self.index(0);
            vec![zero, zero]
        } else {
            place.chain.clone()
        };
        let pointee = self.type_id(place.ty);
        let ptr_type = self.pointer_type(place.class, pointee);
        let id = self.id();
        let mut operands = vec![ptr_type, id, place.var];
        operands.extend(chain);
        self.emit(OP_ACCESS_CHAIN, &operands);
        id
    }

    fn declare_uniform_array(&mut self, ty: IrType, binding: u32, len: u32) -> u32 {
        let element = self.type_id(ty);
        let length = self.index(len.max(1));
        let array = self.id();
        push_inst(&mut self.globals, OP_TYPE_ARRAY, &[array, element, length]);
        self.decorate(array, DECORATION_ARRAY_STRIDE, &[16]);
        let block = self.id();
        push_inst(&mut self.globals, OP_TYPE_STRUCT, &[block, array]);
        self.decorate(block, DECORATION_BLOCK, &[]);
        push_inst(
            &mut self.annotations,
            OP_MEMBER_DECORATE,
            &[block, 0, DECORATION_OFFSET, 0],
        );
        let ptr = self.pointer_type(CLASS_UNIFORM, block);
        let var = self.id();
        push_inst(&mut self.globals, OP_VARIABLE, &[ptr, var, CLASS_UNIFORM]);
        self.decorate(var, DECORATION_DESCRIPTOR_SET, &[0]);
        self.decorate(var, DECORATION_BINDING, &[binding]);
        var
    }

    /// Storage buffer of `uint` words backing `space`, declared on first use.
    fn buffer(&mut self, space: MemorySpace) -> u32 {
        if let Some(&var) = self.buffers.get(&space) {
            return var;
        }
        let word = self.type_id(IrType::U32);
        let array = self.id();
        push_inst(&mut self.globals, OP_TYPE_RUNTIME_ARRAY, &[array, word]);
        self.decorate(array, DECORATION_ARRAY_STRIDE, &[4]);
        let block = self.id();
        push_inst(&mut self.globals, OP_TYPE_STRUCT, &[block, array]);
        self.decorate(block, DECORATION_BLOCK, &[]);
        push_inst(
            &mut self.annotations,
            OP_MEMBER_DECORATE,
            &[block, 0, DECORATION_OFFSET, 0],
        );
        let ptr = self.pointer_type(CLASS_STORAGE_BUFFER, block);
        let var = self.id();
        push_inst(&mut self.globals, OP_VARIABLE, &[ptr, var, CLASS_STORAGE_BUFFER]);
        self.decorate(var, DECORATION_DESCRIPTOR_SET, &[MEMORY_SET]);
        self.decorate(var, DECORATION_BINDING, &[space.binding()]);
        self.name(var, space.name());
        self.buffers.insert(space, var);
        var
    }

    /// Pointer to the word at `byte_offset` of `space`.
    fn word_pointer(&mut self, space: MemorySpace, byte_offset: &Value) -> u32 {
        let var = self.buffer(space);
        let offset = self.bitcast(*byte_offset, Scalar::U32);
        let two = self.index(2);
        let word = self.inst(OP_SHIFT_RIGHT_LOGICAL, IrType::U32, &[offset.id, two]);
        let uint = self.type_id(IrType::U32);
        let ptr_type = self.pointer_type(CLASS_STORAGE_BUFFER, uint);
        let zero = self.index(0);
        let id = self.id();
        self.emit(OP_ACCESS_CHAIN, &[ptr_type, id, var, zero, word.id]);
        id
    }

    /// Emits the body of a pack helper into the finished-function section.
    fn helper(&mut self, helper: PackHelper) -> u32 {
        if let Some(&id) = self.helpers.get(&helper) {
            return id;
        }
        let float = self.type_id(IrType::F32);
        let vec2 = self.type_id(IrType::vector(Scalar::F32, 2));
        let uint = self.type_id(IrType::U32);
        let (ret, param, name) = match helper {
            PackHelper::UnpackHalf2(HalfEncoding::Unorm16) => (vec2, float, "unpack_unorm16x2"),
            PackHelper::UnpackHalf2(HalfEncoding::Ieee) => (vec2, float, "unpack_half2"),
            PackHelper::PackHalf2(HalfEncoding::Unorm16) => (float, vec2, "pack_unorm16x2"),
            PackHelper::PackHalf2(HalfEncoding::Ieee) => (float, vec2, "pack_half2"),
        };
        let fn_type = self.function_type(ret, &[param]);
        let function = self.id();
        let arg = self.id();
        let label = self.id();
        let converted = self.id();
        let result = self.id();
        self.name(function, name);

        let mut body = Vec::new();
        push_inst(&mut body, OP_FUNCTION, &[ret, function, 0, fn_type]);
        push_inst(&mut body, OP_FUNCTION_PARAMETER, &[param, arg]);
        push_inst(&mut body, OP_LABEL, &[label]);
        match helper {
            PackHelper::UnpackHalf2(encoding) => {
                let unpack = match encoding {
                    HalfEncoding::Unorm16 => GLSL_UNPACK_UNORM_2X16,
                    HalfEncoding::Ieee => GLSL_UNPACK_HALF_2X16,
                };
                push_inst(&mut body, OP_BITCAST, &[uint, converted, arg]);
                push_inst(
                    &mut body,
                    OP_EXT_INST,
                    &[vec2, result, self.glsl, unpack, converted],
                );
            }
            PackHelper::PackHalf2(encoding) => {
                let pack = match encoding {
                    HalfEncoding::Unorm16 => GLSL_PACK_UNORM_2X16,
                    HalfEncoding::Ieee => GLSL_PACK_HALF_2X16,
                };
                push_inst(&mut body, OP_EXT_INST, &[uint, converted, self.glsl, pack, arg]);
                push_inst(&mut body, OP_BITCAST, &[float, result, converted]);
            }
        }
        push_inst(&mut body, OP_RETURN_VALUE, &[result]);
        push_inst(&mut body, OP_FUNCTION_END, &[]);
        self.functions.extend(body);

        self.helpers.insert(helper, function);
        function
    }

    fn widen_pair(&mut self, a: &Value, b: &Value) -> (Value, Value) {
        let count = a.ty.count.max(b.ty.count);
        (self.broadcast(*a, count), self.broadcast(*b, count))
    }
}

impl Backend for SpirvBackend {
    type Value = Value;
    type Place = Place;
    type Function = Function;
    type Output = Vec<u32>;

    fn type_of(&self, value: &Value) -> IrType {
        value.ty
    }

    fn constant(&mut self, value: Constant) -> Value {
        let bits = match value {
            Constant::F32(v) => v.to_bits(),
            Constant::I32(v) => v as u32,
            Constant::U32(v) => v,
            Constant::Bool(v) => u32::from(v),
        };
        let scalar = value.scalar();
        Value {
            id: self.constant_id(scalar, bits),
            ty: IrType::scalar(scalar),
        }
    }

    fn construct(&mut self, parts: &[Value]) -> Value {
        if let [only] = parts {
            return *only;
        }
        let count = parts.iter().map(|p| p.ty.count).sum();
        let ids: Vec<u32> = parts.iter().map(|p| p.id).collect();
        self.inst(OP_COMPOSITE_CONSTRUCT, parts[0].ty.with_count(count), &ids)
    }

    fn declare(&mut self, name: &str, ty: IrType, storage: StorageClass) -> Place {
        if let StorageClass::UniformArray { binding, len } = storage {
            let var = self.declare_uniform_array(ty, binding, len);
            self.name(var, name);
            return Place {
                var,
                ty,
                class: CLASS_UNIFORM,
                block: true,
                chain: Vec::new(),
            };
        }

        let class = match storage {
            StorageClass::Input { .. } | StorageClass::BuiltinInput(_) => CLASS_INPUT,
            StorageClass::Output { .. } | StorageClass::BuiltinOutput(_) => CLASS_OUTPUT,
            _ => CLASS_PRIVATE,
        };
        let pointee = self.type_id(ty);
        let ptr = self.pointer_type(class, pointee);
        let var = self.id();
        if class == CLASS_PRIVATE {
            let null = self.id();
            push_inst(&mut self.globals, OP_CONSTANT_NULL, &[pointee, null]);
            push_inst(&mut self.globals, OP_VARIABLE, &[ptr, var, class, null]);
        } else {
            push_inst(&mut self.globals, OP_VARIABLE, &[ptr, var, class]);
            self.interface.push(var);
        }
        match storage {
            StorageClass::Input { location } | StorageClass::Output { location } => {
                self.decorate(var, DECORATION_LOCATION, &[location]);
            }
            StorageClass::BuiltinInput(builtin) | StorageClass::BuiltinOutput(builtin) => {
                let number = match builtin {
                    BuiltinVariable::VertexIndex => BUILTIN_VERTEX_INDEX,
                    BuiltinVariable::InstanceIndex => BUILTIN_INSTANCE_INDEX,
                    BuiltinVariable::Position => BUILTIN_POSITION,
                    BuiltinVariable::FragCoord => BUILTIN_FRAG_COORD,
                };
                self.decorate(var, DECORATION_BUILTIN, &[number]);
            }
            _ => {}
        }
        self.name(var, name);
        Place {
            var,
            ty,
            class,
            block: false,
            chain: Vec::new(),
        }
    }

    fn element(&mut self, place: &Place, index: u32) -> Place {
        let zero = self.index(0);
        let element = self.index(index);
        Place {
            chain: vec![zero, element],
            ..place.clone()
        }
    }

    fn load(&mut self, place: &Place) -> Value {
        let ptr = self.pointer(place);
        self.inst(OP_LOAD, place.ty, &[ptr])
    }

    fn store(&mut self, place: &Place, value: &Value) {
        let ptr = self.pointer(place);
        self.emit(OP_STORE, &[ptr, value.id]);
    }

    fn extract(&mut self, value: &Value, index: u32) -> Value {
        if value.ty.is_scalar() {
            return *value;
        }
        self.inst(OP_COMPOSITE_EXTRACT, value.ty.with_count(1), &[value.id, index])
    }

    fn insert(&mut self, value: &Value, part: &Value, index: u32) -> Value {
        if value.ty.is_scalar() {
            return *part;
        }
        self.inst(OP_COMPOSITE_INSERT, value.ty, &[part.id, value.id, index])
    }

    fn shuffle(&mut self, a: &Value, b: &Value, indices: &[u32]) -> Value {
        let left = a.ty.count;
        if let [ix] = indices {
            return if *ix < left {
                self.extract(a, *ix)
            } else {
                self.extract(b, ix - left)
            };
        }
        // OpVectorShuffle takes vector operands only.
        let wide_a = self.broadcast(*a, 2);
        let wide_b = self.broadcast(*b, 2);
        let mut operands = vec![wide_a.id, wide_b.id];
        operands.extend(indices.iter().map(|&ix| {
            if ix < left {
                ix
            } else {
                ix - left + wide_a.ty.count
            }
        }));
        let ty = a.ty.with_count(indices.len() as u32);
        self.inst(OP_VECTOR_SHUFFLE, ty, &operands)
    }

    fn binary(&mut self, op: BinaryOp, a: &Value, b: &Value) -> Value {
        let (a, b) = self.widen_pair(a, b);
        let ty = a.ty;
        let args = [a.id, b.id];
        match ty.scalar {
            Scalar::F32 => match op {
                BinaryOp::Add => self.inst(OP_F_ADD, ty, &args),
                BinaryOp::Sub => self.inst(OP_F_SUB, ty, &args),
                BinaryOp::Mul => self.inst(OP_F_MUL, ty, &args),
                BinaryOp::Div => self.inst(OP_F_DIV, ty, &args),
                BinaryOp::Min => self.ext(ty, GLSL_F_MIN, &args),
                BinaryOp::Max => self.ext(ty, GLSL_F_MAX, &args),
                _ => {
                    let ua = self.bitcast(a, Scalar::U32);
                    let ub = self.bitcast(b, Scalar::U32);
                    let bits = self.binary(op, &ua, &ub);
                    self.bitcast(bits, Scalar::F32)
                }
            },
            Scalar::I32 | Scalar::U32 => {
                let signed = ty.scalar == Scalar::I32;
                let opcode = match op {
                    BinaryOp::Add => OP_I_ADD,
                    BinaryOp::Sub => OP_I_SUB,
                    BinaryOp::Mul => OP_I_MUL,
                    BinaryOp::Div if signed => OP_S_DIV,
                    BinaryOp::Div => OP_U_DIV,
                    BinaryOp::And => OP_BITWISE_AND,
                    BinaryOp::Or => OP_BITWISE_OR,
                    BinaryOp::Xor => OP_BITWISE_XOR,
                    BinaryOp::Shl => OP_SHIFT_LEFT_LOGICAL,
                    BinaryOp::Shr => OP_SHIFT_RIGHT_LOGICAL,
                    BinaryOp::Asr => OP_SHIFT_RIGHT_ARITHMETIC,
                    BinaryOp::Min => {
                        let f = if signed { GLSL_S_MIN } else { GLSL_U_MIN };
                        return self.ext(ty, f, &args);
                    }
                    BinaryOp::Max => {
                        let f = if signed { GLSL_S_MAX } else { GLSL_U_MAX };
                        return self.ext(ty, f, &args);
                    }
                };
                self.inst(opcode, ty, &args)
            }
            Scalar::Bool => {
                let opcode = match op {
                    BinaryOp::And | BinaryOp::Mul | BinaryOp::Min => OP_LOGICAL_AND,
                    BinaryOp::Or | BinaryOp::Add | BinaryOp::Max => OP_LOGICAL_OR,
                    _ => OP_LOGICAL_NOT_EQUAL,
                };
                self.inst(opcode, ty, &args)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, a: &Value) -> Value {
        let ty = a.ty;
        match (op, ty.scalar) {
            (UnaryOp::Neg, Scalar::F32) => self.inst(OP_F_NEGATE, ty, &[a.id]),
            (UnaryOp::Neg, Scalar::I32 | Scalar::U32) => self.inst(OP_S_NEGATE, ty, &[a.id]),
            (UnaryOp::Abs, Scalar::F32) => self.ext(ty, GLSL_F_ABS, &[a.id]),
            (UnaryOp::Abs, Scalar::I32) => self.ext(ty, GLSL_S_ABS, &[a.id]),
            (UnaryOp::Not, Scalar::Bool) => self.inst(OP_LOGICAL_NOT, ty, &[a.id]),
            (UnaryOp::Not, Scalar::I32 | Scalar::U32) => self.inst(OP_NOT, ty, &[a.id]),
            (UnaryOp::Not, Scalar::F32) => {
                let bits = self.bitcast(*a, Scalar::U32);
                let flipped = self.inst(OP_NOT, bits.ty, &[bits.id]);
                self.bitcast(flipped, Scalar::F32)
            }
            _ => *a,
        }
    }

    fn compare(&mut self, op: CompareOp, a: &Value, b: &Value) -> Value {
        let (a, b) = self.widen_pair(a, b);
        if a.ty.scalar == Scalar::Bool && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let ua = self.convert(Conversion::Numeric, &a, Scalar::U32);
            let ub = self.convert(Conversion::Numeric, &b, Scalar::U32);
            return self.compare(op, &ua, &ub);
        }
        let opcode = match (a.ty.scalar, op) {
            (Scalar::F32, CompareOp::Eq) => OP_F_ORD_EQUAL,
            (Scalar::F32, CompareOp::Ne) => OP_F_UNORD_NOT_EQUAL,
            (Scalar::F32, CompareOp::Lt) => OP_F_ORD_LESS_THAN,
            (Scalar::F32, CompareOp::Le) => OP_F_ORD_LESS_THAN_EQUAL,
            (Scalar::F32, CompareOp::Gt) => OP_F_ORD_GREATER_THAN,
            (Scalar::F32, CompareOp::Ge) => OP_F_ORD_GREATER_THAN_EQUAL,
            (Scalar::Bool, CompareOp::Eq) => OP_LOGICAL_EQUAL,
            (Scalar::Bool, _) => OP_LOGICAL_NOT_EQUAL,
            (_, CompareOp::Eq) => OP_I_EQUAL,
            (_, CompareOp::Ne) => OP_I_NOT_EQUAL,
            (Scalar::I32, CompareOp::Lt) => OP_S_LESS_THAN,
            (Scalar::I32, CompareOp::Le) => OP_S_LESS_THAN_EQUAL,
            (Scalar::I32, CompareOp::Gt) => OP_S_GREATER_THAN,
            (Scalar::I32, CompareOp::Ge) => OP_S_GREATER_THAN_EQUAL,
            (_, CompareOp::Lt) => OP_U_LESS_THAN,
            (_, CompareOp::Le) => OP_U_LESS_THAN_EQUAL,
            (_, CompareOp::Gt) => OP_U_GREATER_THAN,
            (_, CompareOp::Ge) => OP_U_GREATER_THAN_EQUAL,
        };
        self.inst(opcode, a.ty.with_scalar(Scalar::Bool), &[a.id, b.id])
    }

    fn select(&mut self, cond: &Value, a: &Value, b: &Value) -> Value {
        let (a, b) = self.widen_pair(a, b);
        let cond = self.broadcast(*cond, a.ty.count);
        self.inst(OP_SELECT, a.ty, &[cond.id, a.id, b.id])
    }

    fn builtin(&mut self, func: Builtin, args: &[Value]) -> Value {
        let count = args.iter().map(|a| a.ty.count).max().unwrap_or(1);
        let wide: Vec<Value> = args.iter().map(|&a| self.broadcast(a, count)).collect();
        let ty = wide[0].ty;
        let instruction = match func {
            Builtin::Floor => GLSL_FLOOR,
            Builtin::Fract => GLSL_FRACT,
            Builtin::Round => GLSL_ROUND,
            Builtin::Sign => GLSL_F_SIGN,
            Builtin::InverseSqrt => GLSL_INVERSE_SQRT,
            Builtin::Exp2 => GLSL_EXP2,
            Builtin::Log2 => GLSL_LOG2,
            Builtin::Step => GLSL_STEP,
            Builtin::Mix => GLSL_F_MIX,
            Builtin::Clamp => match ty.scalar {
                Scalar::I32 => GLSL_S_CLAMP,
                Scalar::U32 => GLSL_U_CLAMP,
                _ => GLSL_F_CLAMP,
            },
            Builtin::Dot if ty.is_scalar() => {
                return self.inst(OP_F_MUL, IrType::F32, &[wide[0].id, wide[1].id]);
            }
            Builtin::Dot => return self.inst(OP_DOT, IrType::F32, &[wide[0].id, wide[1].id]),
            Builtin::Dfdx => return self.inst(OP_DPDX, ty, &[wide[0].id]),
            Builtin::Dfdy => return self.inst(OP_DPDY, ty, &[wide[0].id]),
        };
        let ids: Vec<u32> = wide.iter().map(|v| v.id).collect();
        self.ext(ty, instruction, &ids)
    }

    fn convert(&mut self, conversion: Conversion, value: &Value, to: Scalar) -> Value {
        let from = value.ty.scalar;
        if from == to {
            return *value;
        }
        let count = value.ty.count;
        if from == Scalar::Bool {
            let one = self.splat_constant(Constant::of(to, 1.0), count);
            let zero = self.splat_constant(Constant::of(to, 0.0), count);
            return self.select(value, &one, &zero);
        }
        if to == Scalar::Bool {
            let zero = self.splat_constant(Constant::of(from, 0.0), count);
            return self.compare(CompareOp::Ne, value, &zero);
        }
        let ty = value.ty.with_scalar(to);
        let opcode = match (conversion, from, to) {
            (Conversion::Numeric, Scalar::F32, Scalar::I32) => OP_CONVERT_F_TO_S,
            (Conversion::Numeric, Scalar::F32, Scalar::U32) => OP_CONVERT_F_TO_U,
            (Conversion::Numeric, Scalar::I32, Scalar::F32) => OP_CONVERT_S_TO_F,
            (Conversion::Numeric, Scalar::U32, Scalar::F32) => OP_CONVERT_U_TO_F,
            _ => OP_BITCAST,
        };
        self.inst(opcode, ty, &[value.id])
    }

    fn call_helper(&mut self, helper: PackHelper, arg: &Value) -> Value {
        let function = self.helper(helper);
        let ty = match helper {
            PackHelper::UnpackHalf2(_) => IrType::vector(Scalar::F32, 2),
            PackHelper::PackHalf2(_) => IrType::F32,
        };
        self.inst(OP_FUNCTION_CALL, ty, &[function, arg.id])
    }

    fn fetch_memory(&mut self, space: MemorySpace, byte_offset: &Value) -> Value {
        let ptr = self.word_pointer(space, byte_offset);
        let word = self.inst(OP_LOAD, IrType::U32, &[ptr]);
        self.bitcast(word, Scalar::F32)
    }

    fn store_memory(&mut self, space: MemorySpace, byte_offset: &Value, value: &Value) {
        let ptr = self.word_pointer(space, byte_offset);
        let word = if value.ty.scalar == Scalar::Bool {
            self.convert(Conversion::Numeric, value, Scalar::U32)
        } else {
            self.bitcast(*value, Scalar::U32)
        };
        self.emit(OP_STORE, &[ptr, word.id]);
    }

    fn begin_function(&mut self, name: &str) -> Function {
        let void = self.void_type();
        let fn_type = self.function_type(void, &[]);
        let id = self.id();
        let label = self.id();
        self.name(id, name);
        let mut code = Vec::new();
        push_inst(&mut code, OP_FUNCTION, &[void, id, 0, fn_type]);
        push_inst(&mut code, OP_LABEL, &[label]);
        self.open = Some(OpenFunction { code });
        Function(id)
    }

    fn end_function(&mut self) {
        if let Some(mut function) = self.open.take() {
            push_inst(&mut function.code, OP_RETURN, &[]);
            push_inst(&mut function.code, OP_FUNCTION_END, &[]);
            self.functions.extend(function.code);
        }
    }

    fn call_function(&mut self, function: &Function) {
        let void = self.void_type();
        let id = self.id();
        self.emit(OP_FUNCTION_CALL, &[void, id, function.0]);
    }

    fn begin_entry(&mut self) {
        self.end_function();
    }

    fn finish(mut self) -> Vec<u32> {
        self.end_function();
        let void = self.void_type();
        let fn_type = self.function_type(void, &[]);
        let label = self.id();

        let mut words = vec![MAGIC, VERSION_1_3, GENERATOR, self.bound, 0];
        push_inst(&mut words, OP_CAPABILITY, &[CAPABILITY_SHADER]);
        let mut import = vec![self.glsl];
        import.extend(string_words("GLSL.std.450"));
        push_inst(&mut words, OP_EXT_INST_IMPORT, &import);
        push_inst(
            &mut words,
            OP_MEMORY_MODEL,
            &[ADDRESSING_LOGICAL, MEMORY_MODEL_GLSL450],
        );

        let model = match self.stage {
            ShaderStage::Vertex => EXECUTION_MODEL_VERTEX,
            ShaderStage::Fragment => EXECUTION_MODEL_FRAGMENT,
        };
        let mut entry = vec![model, self.entry];
        entry.extend(string_words("main"));
        entry.extend_from_slice(&self.interface);
        push_inst(&mut words, OP_ENTRY_POINT, &entry);
        if self.stage == ShaderStage::Fragment {
            push_inst(
                &mut words,
                OP_EXECUTION_MODE,
                &[self.entry, EXECUTION_MODE_ORIGIN_UPPER_LEFT],
            );
        }

        words.extend_from_slice(&self.names);
        words.extend_from_slice(&self.annotations);
        words.extend_from_slice(&self.globals);
        words.extend_from_slice(&self.functions);

        push_inst(&mut words, OP_FUNCTION, &[void, self.entry, 0, fn_type]);
        push_inst(&mut words, OP_LABEL, &[label]);
        words.extend_from_slice(&self.entry_code);
        push_inst(&mut words, OP_RETURN, &[]);
        push_inst(&mut words, OP_FUNCTION_END, &[]);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_nul_terminated_and_padded() {
        assert_eq!(string_words("main"), vec![0x6E69_616D, 0]);
        assert_eq!(string_words("GLSL.std.450").len(), 4);
    }

    #[test]
    fn module_starts_with_header() {
        let words = SpirvBackend::new(ShaderStage::Fragment).finish();
        assert_eq!(words[0], MAGIC);
        assert_eq!(words[1], VERSION_1_3);
        assert!(words[3] > 1);
    }

    #[test]
    fn constants_and_types_are_shared() {
        let mut b = SpirvBackend::new(ShaderStage::Fragment);
        let one = b.f32(1.0);
        let again = b.f32(1.0);
        assert_eq!(one.id(), again.id());
        let int_one = b.u32(1);
        assert_ne!(one.id(), int_one.id());
    }
}
