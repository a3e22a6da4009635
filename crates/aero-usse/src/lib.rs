//! USSE shader microcode recompiler.
//!
//! Decodes 64-bit USSE instruction words and re-expresses them as host shaders. The front end
//! (decoder, register resolver, operand transfer and per-family translators) is generic over
//! [`ir::Backend`]; [`backend`] provides SPIR-V and GLSL emitters plus an interpreter used to check
//! numeric behavior. [`assemble::translate_program`] drives a whole program through one backend.

#![forbid(unsafe_code)]

pub mod assemble;
pub mod backend;
pub mod decode;
pub mod error;
pub mod ir;
pub mod program;
pub mod resolve;
pub mod transfer;
pub mod translate;
pub mod types;

pub use assemble::{translate_program, Artifact, TranslatedProgram};
pub use decode::{decode, DecodeError, Instruction, Opcode};
pub use error::TranslateError;
pub use ir::{Backend, ShaderStage};
pub use program::{
    ConstantTables, Features, ProgramInfo, TranslateContext, TranslateOptions,
};
