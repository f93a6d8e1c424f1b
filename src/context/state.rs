//! The legacy-API state machine: capabilities, bindings, the parameter
//! map, the vertex attribute pointer table and the latches.

use hashbrown::HashSet;

use super::resources::{BufferId, ProgramId, TextureId};
use crate::error::GlError;
use crate::gl;

pub(crate) const MAX_VERTEX_ATTRIBS: usize = 16;
pub(crate) const MAX_TEXTURE_UNITS: usize = 32;

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct VertexAttrib {
    pub enabled: bool,
    pub buffer: Option<BufferId>,
    pub size: i32,
    pub ty: u32,
    pub normalized: bool,
    pub stride: i32,
    pub offset: u64,
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct TextureUnit {
    pub texture_2d: Option<TextureId>,
    pub texture_cube: Option<TextureId>,
}

#[derive(Clone, Debug)]
pub(crate) struct DrawParameters {
    pub cull_face_mode: u32,
    pub front_face: u32,
    pub depth_func: u32,
    pub depth_mask: bool,
    pub depth_range: (f32, f32),
    pub color_mask: [bool; 4],
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: i32,
    pub blend_src_rgb: u32,
    pub blend_dst_rgb: u32,
    pub blend_src_alpha: u32,
    pub blend_dst_alpha: u32,
    pub blend_eq_rgb: u32,
    pub blend_eq_alpha: u32,
    pub viewport: [i32; 4],
    pub scissor: [i32; 4],
    pub stencil_write_mask: u32,
    pub stencil_back_write_mask: u32,
}

impl Default for DrawParameters {
    fn default() -> Self {
        Self {
            cull_face_mode: gl::BACK,
            front_face: gl::CCW,
            depth_func: gl::LESS,
            depth_mask: true,
            depth_range: (0.0, 1.0),
            color_mask: [true; 4],
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            blend_src_rgb: gl::ONE,
            blend_dst_rgb: gl::ZERO,
            blend_src_alpha: gl::ONE,
            blend_dst_alpha: gl::ZERO,
            blend_eq_rgb: gl::FUNC_ADD,
            blend_eq_alpha: gl::FUNC_ADD,
            viewport: [0; 4],
            scissor: [0; 4],
            stencil_write_mask: u32::MAX,
            stencil_back_write_mask: u32::MAX,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ContextState {
    pub capabilities: HashSet<u32>,
    pub params: DrawParameters,
    pub array_buffer: Option<BufferId>,
    pub element_array_buffer: Option<BufferId>,
    /// Zero-based active texture unit.
    pub active_texture: u32,
    pub texture_units: Vec<TextureUnit>,
    pub attribs: Vec<VertexAttrib>,
    pub current_program: Option<ProgramId>,
    /// Buffer bits recorded by `clear`, consumed by the next draw.
    pub clear_mask: u32,
    /// First error wins until read.
    pub error: Option<GlError>,
}

impl ContextState {
    pub fn new() -> Self {
        let mut capabilities = HashSet::new();
        capabilities.insert(gl::DITHER);

        Self {
            capabilities,
            params: DrawParameters::default(),
            array_buffer: None,
            element_array_buffer: None,
            active_texture: 0,
            texture_units: vec![TextureUnit::default(); MAX_TEXTURE_UNITS],
            attribs: vec![VertexAttrib::default(); MAX_VERTEX_ATTRIBS],
            current_program: None,
            clear_mask: 0,
            error: None,
        }
    }

    pub fn latch(&mut self, error: GlError) {
        if self.error.is_none() {
            tracing::debug!("latching GL error {error:?}");
            self.error = Some(error);
        }
    }

    pub fn is_valid_capability(cap: u32) -> bool {
        matches!(
            cap,
            gl::CULL_FACE
                | gl::BLEND
                | gl::DITHER
                | gl::STENCIL_TEST
                | gl::DEPTH_TEST
                | gl::SCISSOR_TEST
                | gl::POLYGON_OFFSET_FILL
                | gl::SAMPLE_ALPHA_TO_COVERAGE
                | gl::SAMPLE_COVERAGE
        )
    }
}
