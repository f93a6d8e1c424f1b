//! Resource objects: thin opaque handles over context-private state.
//!
//! Handles compare by identity (slotmap keys). Deletion flags the state and
//! destroys device resources; the handle itself stays valid for isolated
//! later reads.

use std::sync::Arc;

use glam::UVec2;
use slotmap::new_key_type;

use crate::gl;
use crate::gpu;
use crate::translate::CompiledProgram;
use crate::types::GlslType;
use crate::uniforms::UniformStore;

new_key_type! {
    pub struct ShaderId;
    pub struct ProgramId;
    pub struct BufferId;
    pub struct TextureId;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

#[derive(Debug)]
pub(crate) struct ShaderState {
    pub kind: ShaderKind,
    pub source: Option<String>,
    pub deleted: bool,
}

#[derive(Debug)]
pub(crate) struct ProgramState {
    pub vertex: Option<ShaderId>,
    pub fragment: Option<ShaderId>,
    /// Present iff the last link succeeded; the sole link-status signal.
    pub compiled: Option<Arc<CompiledProgram>>,
    pub info_log: String,
    pub module: Option<Arc<dyn gpu::ShaderModule>>,
    pub uniforms: UniformStore,
    pub deleted: bool,
}

impl ProgramState {
    pub fn new() -> Self {
        Self {
            vertex: None,
            fragment: None,
            compiled: None,
            info_log: String::new(),
            module: None,
            uniforms: UniformStore::new(),
            deleted: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferState {
    pub byte_length: u64,
    /// Host copy of the contents; the source for re-uploads and for the
    /// 8x3→8x4 shadow rewrite.
    pub data: Vec<u8>,
    pub device: Option<Arc<dyn gpu::Buffer>>,
    pub dirty: bool,
    /// Sticky: once bound as an index buffer the device buffer carries
    /// INDEX usage forever.
    pub index_usage: bool,
    /// The 8x4 variant backing `unorm8x3` attributes.
    pub shadow: Option<Arc<dyn gpu::Buffer>>,
    pub shadow_dirty: bool,
    pub imported: bool,
    pub deleted: bool,
}

impl BufferState {
    pub fn new() -> Self {
        Self {
            byte_length: 0,
            data: Vec::new(),
            device: None,
            dirty: false,
            index_usage: false,
            shadow: None,
            shadow_dirty: false,
            imported: false,
            deleted: false,
        }
    }
}

/// Sampler parameters accumulated through `tex_parameter*`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SamplerParams {
    pub min_filter: u32,
    pub mag_filter: u32,
    pub wrap_s: u32,
    pub wrap_t: u32,
    pub wrap_r: u32,
    pub base_level: i32,
    pub max_level: i32,
    pub compare_mode: u32,
    pub compare_func: u32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub max_anisotropy: f32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: gl::NEAREST_MIPMAP_LINEAR,
            mag_filter: gl::LINEAR,
            wrap_s: gl::REPEAT,
            wrap_t: gl::REPEAT,
            wrap_r: gl::REPEAT,
            base_level: 0,
            max_level: 1000,
            compare_mode: 0,
            compare_func: gl::LEQUAL,
            min_lod: -1000.0,
            max_lod: 1000.0,
            max_anisotropy: 1.0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TextureState {
    pub size: UVec2,
    pub params: SamplerParams,
    pub device: Option<Arc<dyn gpu::Texture>>,
    pub sampler: Option<Arc<dyn gpu::Sampler>>,
    pub sampler_dirty: bool,
    pub imported: bool,
    pub deleted: bool,
}

impl TextureState {
    pub fn new() -> Self {
        Self {
            size: UVec2::ZERO,
            params: SamplerParams::default(),
            device: None,
            sampler: None,
            sampler_dirty: true,
            imported: false,
            deleted: false,
        }
    }
}

/// An opaque uniform location: the binding of the enclosing buffer or
/// texture, a byte offset inside that buffer and the type at that offset.
#[derive(Clone, Debug)]
pub struct UniformLocation {
    pub(crate) program: ProgramId,
    pub(crate) binding: u32,
    pub(crate) offset: u32,
    pub(crate) ty: GlslType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderPrecisionFormat {
    pub range_min: i32,
    pub range_max: i32,
    pub precision: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            depth: true,
            stencil: false,
            antialias: false,
            premultiplied_alpha: true,
            preserve_drawing_buffer: false,
        }
    }
}

/// External image data for the non-byte-array `tex_image_2d` overload.
/// Decoding happens outside the core; pixels arrive as tightly packed RGBA.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub size: UVec2,
    pub pixels: Vec<u8>,
}
