//! [`Backend`](crate::ir::Backend) implementations.

pub mod glsl;
pub mod interp;
pub mod spirv;
