//! Run programs written against the legacy OpenGL ES 2.0/3.0 (WebGL 1/2)
//! API on top of a modern explicit graphics device.
//!
//! The crate has two tightly-coupled halves:
//!
//! - [`translate`]: the GLSL → WGSL translator. Two shader sources lower
//!   to one WGSL module plus the attribute, uniform and sampler tables and
//!   the unified uniform buffer layout.
//! - [`context`]: the legacy command interpreter. [`GlContext`] holds the
//!   global state machine and, at draw time, synthesizes the explicit-API
//!   objects (pipeline, bind group, vertex layouts, render pass) and
//!   submits one command buffer per draw.
//!
//! The host supplies the [`gpu::Device`] and [`gpu::Surface`] the context
//! renders through; everything else (canvas interception, image decoding,
//! demos) lives outside this crate.

pub mod context;
pub mod error;
pub mod gl;
pub mod glsl;
pub mod gpu;
pub mod translate;
pub mod types;

mod draw;
mod uniforms;

pub use context::{
    BufferId, ContextAttributes, GlContext, ImageData, ProgramId, ShaderId, ShaderKind,
    ShaderPrecisionFormat, TextureId, UniformLocation, Value,
};
pub use error::{Error, GlError};
