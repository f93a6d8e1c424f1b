//! The legacy-GL command interpreter: one context per canvas, holding the
//! global state machine and the full entry-point surface.

pub(crate) mod resources;
pub(crate) mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use glam::UVec2;
use slotmap::SlotMap;

pub use resources::{
    BufferId, ContextAttributes, ImageData, ProgramId, ShaderId, ShaderKind,
    ShaderPrecisionFormat, TextureId, UniformLocation,
};
use resources::{BufferState, ProgramState, ShaderState, TextureState};
use state::{ContextState, MAX_TEXTURE_UNITS, MAX_VERTEX_ATTRIBS};

use crate::error::{Error, GlError};
use crate::gl;
use crate::gpu::{self, Device, Surface};
use crate::translate;
use crate::uniforms::UniformPayload;

/// A value returned by the `get_parameter` family. The legacy API returns
/// differently shaped values per parameter name.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    BoolArray([bool; 4]),
    Int(i32),
    Uint(u32),
    Float(f32),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Str(&'static str),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct GlContext {
    pub(crate) device: Arc<dyn Device>,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) shaders: SlotMap<ShaderId, ShaderState>,
    pub(crate) programs: SlotMap<ProgramId, ProgramState>,
    pub(crate) buffers: SlotMap<BufferId, BufferState>,
    pub(crate) textures: SlotMap<TextureId, TextureState>,
    pub(crate) state: ContextState,
    /// Depth target shared across draws, re-created when the surface size
    /// changes.
    pub(crate) depth_texture: Option<(UVec2, Arc<dyn gpu::Texture>)>,
    /// 1x1 stand-ins bound when a texture unit has nothing bound.
    pub(crate) default_texture: Option<Arc<dyn gpu::Texture>>,
    pub(crate) default_sampler: Option<Arc<dyn gpu::Sampler>>,
}

impl GlContext {
    pub fn new(device: Arc<dyn Device>, surface: Arc<dyn Surface>) -> Self {
        let mut state = ContextState::new();
        let size = surface.current_texture().size();
        state.params.viewport = [0, 0, size.x as i32, size.y as i32];
        state.params.scissor = [0, 0, size.x as i32, size.y as i32];

        Self {
            device,
            surface,
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            state,
            depth_texture: None,
            default_texture: None,
            default_sampler: None,
        }
    }

    pub(crate) fn latch(&mut self, error: GlError) {
        self.state.latch(error);
    }

    /// Returns and clears the error latch.
    pub fn get_error(&mut self) -> u32 {
        self.state
            .error
            .take()
            .map_or(gl::NO_ERROR, GlError::code)
    }

    // Shader and program objects

    pub fn create_shader(&mut self, kind: u32) -> Option<ShaderId> {
        let kind = match kind {
            gl::VERTEX_SHADER => ShaderKind::Vertex,
            gl::FRAGMENT_SHADER => ShaderKind::Fragment,
            _ => {
                self.latch(GlError::InvalidEnum);
                return None;
            }
        };
        Some(self.shaders.insert(ShaderState {
            kind,
            source: None,
            deleted: false,
        }))
    }

    pub fn shader_source(&mut self, shader: ShaderId, source: &str) {
        match self.shaders.get_mut(shader) {
            Some(state) => state.source = Some(source.to_owned()),
            None => self.latch(GlError::InvalidOperation),
        }
    }

    /// Translation is deferred to link; compilation is a no-op.
    pub fn compile_shader(&mut self, _shader: ShaderId) {}

    pub fn get_shader_parameter(&mut self, shader: ShaderId, pname: u32) -> Value {
        let Some(state) = self.shaders.get(shader) else {
            self.latch(GlError::InvalidOperation);
            return Value::None;
        };
        match pname {
            gl::COMPILE_STATUS => Value::Bool(true),
            gl::DELETE_STATUS => Value::Bool(state.deleted),
            gl::SHADER_TYPE => Value::Uint(match state.kind {
                ShaderKind::Vertex => gl::VERTEX_SHADER,
                ShaderKind::Fragment => gl::FRAGMENT_SHADER,
            }),
            _ => {
                self.latch(GlError::InvalidEnum);
                Value::None
            }
        }
    }

    /// Compilation never fails up front; failures surface in the program
    /// info log at link time.
    pub fn get_shader_info_log(&self, _shader: ShaderId) -> String {
        String::new()
    }

    pub fn create_program(&mut self) -> ProgramId {
        self.programs.insert(ProgramState::new())
    }

    pub fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        let Some(kind) = self.shaders.get(shader).map(|s| s.kind) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        let Some(state) = self.programs.get_mut(program) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        match kind {
            ShaderKind::Vertex => state.vertex = Some(shader),
            ShaderKind::Fragment => state.fragment = Some(shader),
        }
    }

    pub fn link_program(&mut self, program: ProgramId) {
        let Some(state) = self.programs.get(program) else {
            self.latch(GlError::InvalidOperation);
            return;
        };

        let sources = state
            .vertex
            .zip(state.fragment)
            .and_then(|(vertex, fragment)| {
                let vertex = self.shaders.get(vertex)?.source.clone()?;
                let fragment = self.shaders.get(fragment)?.source.clone()?;
                Some((vertex, fragment))
            });
        let Some((vertex_source, fragment_source)) = sources else {
            let state = self.programs.get_mut(program).unwrap();
            state.compiled = None;
            state.info_log = "link failed: a vertex and a fragment shader with source must both \
                              be attached"
                .to_owned();
            return;
        };

        match translate::translate(&vertex_source, &fragment_source) {
            Ok(compiled) => {
                let layout = compiled.uniform_buffer;
                let state = self.programs.get_mut(program).unwrap();
                state.compiled = Some(Arc::new(compiled));
                state.info_log = String::new();
                state.module = None;
                state.uniforms.configure(layout);
            }
            Err(err) => {
                tracing::warn!("shader translation failed: {err}");
                let state = self.programs.get_mut(program).unwrap();
                state.compiled = None;
                state.module = None;
                state.info_log = err.to_string();
            }
        }
    }

    pub fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(id) = program {
            if !self.programs.contains_key(id) {
                self.latch(GlError::InvalidOperation);
                return;
            }
        }
        self.state.current_program = program;
    }

    pub fn get_attrib_location(&mut self, program: ProgramId, name: &str) -> i32 {
        let Some(compiled) = self.programs.get(program).and_then(|p| p.compiled.as_ref()) else {
            self.latch(GlError::InvalidOperation);
            return -1;
        };
        compiled
            .attribute_location(name)
            .map_or(-1, |location| location as i32)
    }

    pub fn get_uniform_location(
        &mut self,
        program: ProgramId,
        name: &str,
    ) -> Option<UniformLocation> {
        let Some(compiled) = self.programs.get(program).and_then(|p| p.compiled.as_ref()) else {
            self.latch(GlError::InvalidOperation);
            return None;
        };
        let resolved = compiled.resolve_uniform(name)?;
        Some(UniformLocation {
            program,
            binding: resolved.binding,
            offset: resolved.offset,
            ty: resolved.ty,
        })
    }

    pub fn get_program_parameter(&mut self, program: ProgramId, pname: u32) -> Value {
        let Some(state) = self.programs.get(program) else {
            self.latch(GlError::InvalidOperation);
            return Value::None;
        };
        match pname {
            gl::LINK_STATUS => Value::Bool(state.compiled.is_some()),
            gl::DELETE_STATUS => Value::Bool(state.deleted),
            gl::VALIDATE_STATUS => Value::Bool(state.compiled.is_some()),
            gl::ATTACHED_SHADERS => {
                Value::Int(i32::from(state.vertex.is_some()) + i32::from(state.fragment.is_some()))
            }
            gl::ACTIVE_ATTRIBUTES => Value::Int(
                state
                    .compiled
                    .as_ref()
                    .map_or(0, |c| c.attributes.len() as i32),
            ),
            gl::ACTIVE_UNIFORMS => Value::Int(
                state
                    .compiled
                    .as_ref()
                    .map_or(0, |c| c.active_uniform_count() as i32),
            ),
            _ => {
                self.latch(GlError::InvalidEnum);
                Value::None
            }
        }
    }

    pub fn get_program_info_log(&self, program: ProgramId) -> String {
        self.programs
            .get(program)
            .map(|p| p.info_log.clone())
            .unwrap_or_default()
    }

    pub fn get_shader_precision_format(
        &mut self,
        _shader_kind: u32,
        precision_type: u32,
    ) -> ShaderPrecisionFormat {
        match precision_type {
            gl::LOW_FLOAT | gl::MEDIUM_FLOAT | gl::HIGH_FLOAT => ShaderPrecisionFormat {
                range_min: 127,
                range_max: 127,
                precision: 23,
            },
            _ => ShaderPrecisionFormat {
                range_min: 31,
                range_max: 30,
                precision: 0,
            },
        }
    }

    pub fn delete_shader(&mut self, shader: ShaderId) {
        if let Some(state) = self.shaders.get_mut(shader) {
            state.deleted = true;
        }
    }

    pub fn delete_program(&mut self, program: ProgramId) {
        if let Some(state) = self.programs.get_mut(program) {
            state.deleted = true;
        }
        if self.state.current_program == Some(program) {
            self.state.current_program = None;
        }
    }

    pub fn is_shader(&self, shader: ShaderId) -> bool {
        self.shaders.contains_key(shader)
    }

    pub fn is_program(&self, program: ProgramId) -> bool {
        self.programs.contains_key(program)
    }

    // Buffer objects

    pub fn create_buffer(&mut self) -> BufferId {
        self.buffers.insert(BufferState::new())
    }

    pub fn bind_buffer(&mut self, target: u32, buffer: Option<BufferId>) {
        if let Some(id) = buffer {
            if !self.buffers.contains_key(id) {
                self.latch(GlError::InvalidOperation);
                return;
            }
        }
        match target {
            gl::ARRAY_BUFFER => self.state.array_buffer = buffer,
            gl::ELEMENT_ARRAY_BUFFER => {
                self.state.element_array_buffer = buffer;
                if let Some(state) = buffer.and_then(|id| self.buffers.get_mut(id)) {
                    if !state.index_usage {
                        state.index_usage = true;
                        // The device buffer was allocated without INDEX
                        // usage; the next draw re-creates it.
                        if let Some(old) = state.device.take() {
                            if state.imported {
                                tracing::warn!(
                                    "imported buffer bound as an index buffer; it must carry \
                                     INDEX usage already"
                                );
                                state.device = Some(old);
                            } else {
                                old.destroy();
                                state.dirty = true;
                            }
                        }
                    }
                }
            }
            _ => self.latch(GlError::InvalidEnum),
        }
    }

    fn bound_buffer(&mut self, target: u32) -> Option<BufferId> {
        match target {
            gl::ARRAY_BUFFER => self.state.array_buffer,
            gl::ELEMENT_ARRAY_BUFFER => self.state.element_array_buffer,
            _ => {
                self.latch(GlError::InvalidEnum);
                None
            }
        }
    }

    pub fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32) {
        if !matches!(usage, gl::STATIC_DRAW | gl::DYNAMIC_DRAW | gl::STREAM_DRAW) {
            self.latch(GlError::InvalidEnum);
            return;
        }
        let Some(id) = self.bound_buffer(target) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        let state = self.buffers.get_mut(id).unwrap();

        let size_changed = state.byte_length != data.len() as u64;
        state.byte_length = data.len() as u64;
        state.data = data.to_vec();
        state.dirty = true;
        state.shadow_dirty = true;

        if size_changed {
            if state.imported {
                tracing::warn!(
                    "buffer_data resizes an imported device buffer; the device buffer is kept \
                     as-is"
                );
            } else if let Some(old) = state.device.take() {
                old.destroy();
            }
        }
    }

    pub fn buffer_data_size(&mut self, target: u32, size: u64, usage: u32) {
        let zeroes = vec![0u8; size as usize];
        self.buffer_data(target, &zeroes, usage);
    }

    pub fn delete_buffer(&mut self, buffer: BufferId) {
        let Some(state) = self.buffers.get_mut(buffer) else {
            return;
        };
        state.deleted = true;
        if !state.imported {
            if let Some(device_buffer) = state.device.take() {
                device_buffer.destroy();
            }
        }
        if let Some(shadow) = state.shadow.take() {
            shadow.destroy();
        }
        if self.state.array_buffer == Some(buffer) {
            self.state.array_buffer = None;
        }
        if self.state.element_array_buffer == Some(buffer) {
            self.state.element_array_buffer = None;
        }
    }

    pub fn is_buffer(&self, buffer: BufferId) -> bool {
        self.buffers.contains_key(buffer)
    }

    // Vertex attributes

    pub fn enable_vertex_attrib_array(&mut self, index: u32) {
        match self.state.attribs.get_mut(index as usize) {
            Some(attrib) => attrib.enabled = true,
            None => self.latch(GlError::InvalidValue),
        }
    }

    pub fn disable_vertex_attrib_array(&mut self, index: u32) {
        match self.state.attribs.get_mut(index as usize) {
            Some(attrib) => attrib.enabled = false,
            None => self.latch(GlError::InvalidValue),
        }
    }

    pub fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: u64,
    ) {
        if !(1..=4).contains(&size) || stride < 0 {
            self.latch(GlError::InvalidValue);
            return;
        }
        let buffer = self.state.array_buffer;
        match self.state.attribs.get_mut(index as usize) {
            Some(attrib) => {
                attrib.buffer = buffer;
                attrib.size = size;
                attrib.ty = ty;
                attrib.normalized = normalized;
                attrib.stride = stride;
                attrib.offset = offset;
            }
            None => self.latch(GlError::InvalidValue),
        }
    }

    // Textures

    pub fn create_texture(&mut self) -> TextureId {
        self.textures.insert(TextureState::new())
    }

    pub fn active_texture(&mut self, unit: u32) {
        let Some(index) = unit.checked_sub(gl::TEXTURE0) else {
            self.latch(GlError::InvalidEnum);
            return;
        };
        if index as usize >= MAX_TEXTURE_UNITS {
            self.latch(GlError::InvalidEnum);
            return;
        }
        self.state.active_texture = index;
    }

    pub fn bind_texture(&mut self, target: u32, texture: Option<TextureId>) {
        if let Some(id) = texture {
            if !self.textures.contains_key(id) {
                self.latch(GlError::InvalidOperation);
                return;
            }
        }
        let unit = &mut self.state.texture_units[self.state.active_texture as usize];
        match target {
            gl::TEXTURE_2D => unit.texture_2d = texture,
            gl::TEXTURE_CUBE_MAP => unit.texture_cube = texture,
            _ => self.latch(GlError::InvalidEnum),
        }
    }

    fn bound_texture(&mut self, target: u32) -> Option<TextureId> {
        let unit = self.state.texture_units[self.state.active_texture as usize];
        match target {
            gl::TEXTURE_2D => unit.texture_2d,
            gl::TEXTURE_CUBE_MAP => unit.texture_cube,
            _ => {
                self.latch(GlError::InvalidEnum);
                None
            }
        }
    }

    /// The byte-array overload. The device texture format is inferred from
    /// the `format`/`ty` pair; RGB data is expanded to RGBA on upload.
    #[allow(clippy::too_many_arguments)]
    pub fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        _internal_format: u32,
        width: u32,
        height: u32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        if border != 0 {
            self.latch(GlError::InvalidValue);
            return;
        }
        if level != 0 {
            // Explicit mip uploads wait on generate_mipmap support.
            tracing::warn!("tex_image_2d: ignoring upload to mip level {level}");
            return;
        }
        if ty != gl::UNSIGNED_BYTE {
            self.latch(GlError::InvalidEnum);
            return;
        }

        let (device_format, expanded) = match format {
            gl::RGBA => (gpu::TextureFormat::Rgba8Unorm, pixels.map(<[u8]>::to_vec)),
            gl::RGB => (
                gpu::TextureFormat::Rgba8Unorm,
                pixels.map(|data| {
                    let mut rgba = Vec::with_capacity(data.len() / 3 * 4);
                    for rgb in data.chunks_exact(3) {
                        rgba.extend_from_slice(rgb);
                        rgba.push(u8::MAX);
                    }
                    rgba
                }),
            ),
            gl::ALPHA | gl::LUMINANCE => {
                (gpu::TextureFormat::R8Unorm, pixels.map(<[u8]>::to_vec))
            }
            _ => {
                self.latch(GlError::InvalidEnum);
                return;
            }
        };

        self.upload_texture(target, UVec2::new(width, height), device_format, expanded, false);
    }

    /// The external-image overload: decoded RGBA pixels from outside the
    /// core.
    pub fn tex_image_2d_source(&mut self, target: u32, _level: i32, source: &ImageData) {
        self.upload_texture(
            target,
            source.size,
            gpu::TextureFormat::Rgba8Unorm,
            Some(source.pixels.clone()),
            true,
        );
    }

    fn upload_texture(
        &mut self,
        target: u32,
        size: UVec2,
        format: gpu::TextureFormat,
        pixels: Option<Vec<u8>>,
        imported: bool,
    ) {
        let Some(id) = self.bound_texture(target) else {
            self.latch(GlError::InvalidOperation);
            return;
        };

        let device = self.device.clone();
        let state = self.textures.get_mut(id).unwrap();

        let needs_alloc = state.size != size
            || state
                .device
                .as_ref()
                .is_none_or(|t| t.format() != format);
        if needs_alloc {
            if let Some(old) = state.device.take() {
                old.destroy();
            }
            state.device = Some(device.create_texture(&gpu::TextureDescriptor {
                size,
                format,
                usage: gpu::TextureUsage::TEXTURE_BINDING | gpu::TextureUsage::COPY_DST,
                mip_level_count: 1,
            }));
            state.size = size;
        }
        state.imported = imported;

        if let (Some(texture), Some(pixels)) = (state.device.as_ref(), pixels) {
            device.queue().write_texture(
                texture,
                0,
                &pixels,
                gpu::ImageDataLayout {
                    bytes_per_row: size.x * format.bytes_per_texel(),
                    rows_per_image: size.y,
                },
            );
        }
    }

    pub fn tex_parameteri(&mut self, target: u32, pname: u32, value: i32) {
        let Some(id) = self.bound_texture(target) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        let state = self.textures.get_mut(id).unwrap();
        let params = &mut state.params;
        match pname {
            gl::TEXTURE_MIN_FILTER => params.min_filter = value as u32,
            gl::TEXTURE_MAG_FILTER => params.mag_filter = value as u32,
            gl::TEXTURE_WRAP_S => params.wrap_s = value as u32,
            gl::TEXTURE_WRAP_T => params.wrap_t = value as u32,
            gl::TEXTURE_WRAP_R => params.wrap_r = value as u32,
            gl::TEXTURE_BASE_LEVEL => params.base_level = value,
            gl::TEXTURE_MAX_LEVEL => params.max_level = value,
            gl::TEXTURE_COMPARE_MODE => params.compare_mode = value as u32,
            gl::TEXTURE_COMPARE_FUNC => params.compare_func = value as u32,
            _ => {
                self.latch(GlError::InvalidEnum);
                return;
            }
        }
        state.sampler_dirty = true;
    }

    pub fn tex_parameterf(&mut self, target: u32, pname: u32, value: f32) {
        let Some(id) = self.bound_texture(target) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        let state = self.textures.get_mut(id).unwrap();
        match pname {
            gl::TEXTURE_MIN_LOD => state.params.min_lod = value,
            gl::TEXTURE_MAX_LOD => state.params.max_lod = value,
            gl::TEXTURE_MAX_ANISOTROPY_EXT => state.params.max_anisotropy = value,
            _ => {
                self.tex_parameteri(target, pname, value as i32);
                return;
            }
        }
        state.sampler_dirty = true;
    }

    /// Mipmap generation is a named hook; draws sample level 0 only.
    pub fn generate_mipmap(&mut self, _target: u32) {}

    pub fn delete_texture(&mut self, texture: TextureId) {
        let Some(state) = self.textures.get_mut(texture) else {
            return;
        };
        state.deleted = true;
        if let Some(device_texture) = state.device.take() {
            device_texture.destroy();
        }
        state.sampler = None;
        for unit in &mut self.state.texture_units {
            if unit.texture_2d == Some(texture) {
                unit.texture_2d = None;
            }
            if unit.texture_cube == Some(texture) {
                unit.texture_cube = None;
            }
        }
    }

    pub fn is_texture(&self, texture: TextureId) -> bool {
        self.textures.contains_key(texture)
    }

    // Uniforms

    fn uniform_write(&mut self, location: Option<&UniformLocation>, payload: UniformPayload<'_>) {
        // A null location is silently absorbed, mirroring the legacy
        // contract.
        let Some(location) = location else {
            return;
        };
        let Some(current) = self.state.current_program else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        if location.program != current {
            self.latch(GlError::InvalidOperation);
            return;
        }
        let Some(program) = self.programs.get_mut(current) else {
            self.latch(GlError::InvalidOperation);
            return;
        };
        if let Err(err) =
            program
                .uniforms
                .write(&location.ty, location.offset, location.binding, payload)
        {
            self.latch(err);
        }
    }

    pub fn uniform1f(&mut self, location: Option<&UniformLocation>, x: f32) {
        self.uniform1fv(location, &[x]);
    }

    pub fn uniform2f(&mut self, location: Option<&UniformLocation>, x: f32, y: f32) {
        self.uniform2fv(location, &[x, y]);
    }

    pub fn uniform3f(&mut self, location: Option<&UniformLocation>, x: f32, y: f32, z: f32) {
        self.uniform3fv(location, &[x, y, z]);
    }

    pub fn uniform4f(&mut self, location: Option<&UniformLocation>, x: f32, y: f32, z: f32, w: f32) {
        self.uniform4fv(location, &[x, y, z, w]);
    }

    pub fn uniform1fv(&mut self, location: Option<&UniformLocation>, data: &[f32]) {
        self.uniform_write(location, UniformPayload::Floats { components: 1, data });
    }

    pub fn uniform2fv(&mut self, location: Option<&UniformLocation>, data: &[f32]) {
        self.uniform_write(location, UniformPayload::Floats { components: 2, data });
    }

    pub fn uniform3fv(&mut self, location: Option<&UniformLocation>, data: &[f32]) {
        self.uniform_write(location, UniformPayload::Floats { components: 3, data });
    }

    pub fn uniform4fv(&mut self, location: Option<&UniformLocation>, data: &[f32]) {
        self.uniform_write(location, UniformPayload::Floats { components: 4, data });
    }

    pub fn uniform1i(&mut self, location: Option<&UniformLocation>, x: i32) {
        self.uniform1iv(location, &[x]);
    }

    pub fn uniform2i(&mut self, location: Option<&UniformLocation>, x: i32, y: i32) {
        self.uniform2iv(location, &[x, y]);
    }

    pub fn uniform3i(&mut self, location: Option<&UniformLocation>, x: i32, y: i32, z: i32) {
        self.uniform3iv(location, &[x, y, z]);
    }

    pub fn uniform4i(&mut self, location: Option<&UniformLocation>, x: i32, y: i32, z: i32, w: i32) {
        self.uniform4iv(location, &[x, y, z, w]);
    }

    pub fn uniform1iv(&mut self, location: Option<&UniformLocation>, data: &[i32]) {
        self.uniform_write(location, UniformPayload::Ints { components: 1, data });
    }

    pub fn uniform2iv(&mut self, location: Option<&UniformLocation>, data: &[i32]) {
        self.uniform_write(location, UniformPayload::Ints { components: 2, data });
    }

    pub fn uniform3iv(&mut self, location: Option<&UniformLocation>, data: &[i32]) {
        self.uniform_write(location, UniformPayload::Ints { components: 3, data });
    }

    pub fn uniform4iv(&mut self, location: Option<&UniformLocation>, data: &[i32]) {
        self.uniform_write(location, UniformPayload::Ints { components: 4, data });
    }

    pub fn uniform_matrix2fv(
        &mut self,
        location: Option<&UniformLocation>,
        transpose: bool,
        data: &[f32],
    ) {
        self.uniform_write(location, UniformPayload::Matrices { dim: 2, data, transpose });
    }

    pub fn uniform_matrix3fv(
        &mut self,
        location: Option<&UniformLocation>,
        transpose: bool,
        data: &[f32],
    ) {
        self.uniform_write(location, UniformPayload::Matrices { dim: 3, data, transpose });
    }

    pub fn uniform_matrix4fv(
        &mut self,
        location: Option<&UniformLocation>,
        transpose: bool,
        data: &[f32],
    ) {
        self.uniform_write(location, UniformPayload::Matrices { dim: 4, data, transpose });
    }

    // Capabilities and fixed-function parameters

    pub fn enable(&mut self, cap: u32) {
        if ContextState::is_valid_capability(cap) {
            self.state.capabilities.insert(cap);
        } else {
            self.latch(GlError::InvalidEnum);
        }
    }

    pub fn disable(&mut self, cap: u32) {
        if ContextState::is_valid_capability(cap) {
            self.state.capabilities.remove(&cap);
        } else {
            self.latch(GlError::InvalidEnum);
        }
    }

    pub fn is_enabled(&mut self, cap: u32) -> bool {
        if ContextState::is_valid_capability(cap) {
            self.state.capabilities.contains(&cap)
        } else {
            self.latch(GlError::InvalidEnum);
            false
        }
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.state.params.clear_color = [r, g, b, a];
    }

    pub fn clear_depth(&mut self, depth: f32) {
        self.state.params.clear_depth = depth;
    }

    pub fn clear_stencil(&mut self, stencil: i32) {
        self.state.params.clear_stencil = stencil;
    }

    /// Latches the mask; the clear happens as the next draw's load ops.
    pub fn clear(&mut self, mask: u32) {
        const VALID: u32 = gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT;
        if mask & !VALID != 0 {
            self.latch(GlError::InvalidValue);
            return;
        }
        self.state.clear_mask |= mask;
    }

    pub fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.state.params.color_mask = [r, g, b, a];
    }

    pub fn cull_face(&mut self, mode: u32) {
        if matches!(mode, gl::FRONT | gl::BACK | gl::FRONT_AND_BACK) {
            self.state.params.cull_face_mode = mode;
        } else {
            self.latch(GlError::InvalidEnum);
        }
    }

    pub fn front_face(&mut self, mode: u32) {
        if matches!(mode, gl::CW | gl::CCW) {
            self.state.params.front_face = mode;
        } else {
            self.latch(GlError::InvalidEnum);
        }
    }

    pub fn depth_func(&mut self, func: u32) {
        if (gl::NEVER..=gl::ALWAYS).contains(&func) {
            self.state.params.depth_func = func;
        } else {
            self.latch(GlError::InvalidEnum);
        }
    }

    pub fn depth_mask(&mut self, flag: bool) {
        self.state.params.depth_mask = flag;
    }

    pub fn depth_range(&mut self, near: f32, far: f32) {
        self.state.params.depth_range = (near, far);
    }

    pub fn blend_func(&mut self, src: u32, dst: u32) {
        self.blend_func_separate(src, dst, src, dst);
    }

    pub fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        let valid = [src_rgb, dst_rgb, src_alpha, dst_alpha]
            .into_iter()
            .all(is_blend_factor);
        if !valid {
            self.latch(GlError::InvalidEnum);
            return;
        }
        let params = &mut self.state.params;
        params.blend_src_rgb = src_rgb;
        params.blend_dst_rgb = dst_rgb;
        params.blend_src_alpha = src_alpha;
        params.blend_dst_alpha = dst_alpha;
    }

    pub fn blend_equation(&mut self, mode: u32) {
        self.blend_equation_separate(mode, mode);
    }

    pub fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        let valid = [mode_rgb, mode_alpha].into_iter().all(|mode| {
            matches!(
                mode,
                gl::FUNC_ADD | gl::FUNC_SUBTRACT | gl::FUNC_REVERSE_SUBTRACT | gl::MIN | gl::MAX
            )
        });
        if !valid {
            self.latch(GlError::InvalidEnum);
            return;
        }
        self.state.params.blend_eq_rgb = mode_rgb;
        self.state.params.blend_eq_alpha = mode_alpha;
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.state.params.viewport = [x, y, width, height];
    }

    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.state.params.scissor = [x, y, width, height];
    }

    pub fn stencil_mask(&mut self, mask: u32) {
        self.state.params.stencil_write_mask = mask;
        self.state.params.stencil_back_write_mask = mask;
    }

    pub fn stencil_mask_separate(&mut self, face: u32, mask: u32) {
        match face {
            gl::FRONT => self.state.params.stencil_write_mask = mask,
            gl::BACK => self.state.params.stencil_back_write_mask = mask,
            gl::FRONT_AND_BACK => self.stencil_mask(mask),
            _ => self.latch(GlError::InvalidEnum),
        }
    }

    // Introspection

    pub fn get_parameter(&mut self, pname: u32) -> Result<Value, Error> {
        let params = &self.state.params;
        Ok(match pname {
            gl::ACTIVE_TEXTURE => Value::Uint(gl::TEXTURE0 + self.state.active_texture),
            gl::CULL_FACE_MODE => Value::Uint(params.cull_face_mode),
            gl::FRONT_FACE => Value::Uint(params.front_face),
            gl::DEPTH_FUNC => Value::Uint(params.depth_func),
            gl::DEPTH_WRITEMASK => Value::Bool(params.depth_mask),
            gl::DEPTH_RANGE => Value::FloatArray(vec![params.depth_range.0, params.depth_range.1]),
            gl::COLOR_WRITEMASK => Value::BoolArray(params.color_mask),
            gl::COLOR_CLEAR_VALUE => Value::FloatArray(params.clear_color.to_vec()),
            gl::DEPTH_CLEAR_VALUE => Value::Float(params.clear_depth),
            gl::STENCIL_CLEAR_VALUE => Value::Int(params.clear_stencil),
            gl::STENCIL_WRITEMASK => Value::Uint(params.stencil_write_mask),
            gl::STENCIL_BACK_WRITEMASK => Value::Uint(params.stencil_back_write_mask),
            gl::VIEWPORT => Value::IntArray(params.viewport.to_vec()),
            gl::SCISSOR_BOX => Value::IntArray(params.scissor.to_vec()),
            gl::BLEND_SRC_RGB => Value::Uint(params.blend_src_rgb),
            gl::BLEND_DST_RGB => Value::Uint(params.blend_dst_rgb),
            gl::BLEND_SRC_ALPHA => Value::Uint(params.blend_src_alpha),
            gl::BLEND_DST_ALPHA => Value::Uint(params.blend_dst_alpha),
            gl::BLEND_EQUATION_RGB => Value::Uint(params.blend_eq_rgb),
            gl::BLEND_EQUATION_ALPHA => Value::Uint(params.blend_eq_alpha),
            gl::MAX_TEXTURE_SIZE => Value::Int(8192),
            gl::MAX_VERTEX_ATTRIBS => Value::Int(MAX_VERTEX_ATTRIBS as i32),
            gl::VENDOR => Value::Str("byegl"),
            gl::RENDERER => Value::Str("byegl (WebGPU)"),
            gl::VERSION => Value::Str("WebGL 1.0 (byegl)"),
            gl::SHADING_LANGUAGE_VERSION => Value::Str("WebGL GLSL ES 1.0 (byegl)"),
            _ => {
                return Err(Error::not_implemented(
                    "get_parameter: unsupported parameter name",
                ));
            }
        })
    }

    pub fn get_context_attributes(&self) -> ContextAttributes {
        ContextAttributes::default()
    }

    // Host interception boundary

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Wraps an existing device buffer in a buffer handle. The core never
    /// re-allocates an imported buffer.
    pub fn import_device_buffer(&mut self, buffer: Arc<dyn gpu::Buffer>) -> BufferId {
        let mut state = BufferState::new();
        state.byte_length = buffer.size();
        state.device = Some(buffer);
        state.imported = true;
        self.buffers.insert(state)
    }

    pub fn get_device_buffer(&self, buffer: BufferId) -> Option<Arc<dyn gpu::Buffer>> {
        self.buffers.get(buffer)?.device.clone()
    }

    /// The translated WGSL of a linked program, for inspection.
    pub fn wgsl_source(&self, program: ProgramId) -> Option<String> {
        Some(
            self.programs
                .get(program)?
                .compiled
                .as_ref()?
                .wgsl
                .clone(),
        )
    }

    // Named hooks for the out-of-scope surface; programmer errors rather
    // than silent no-ops.

    pub fn read_pixels(&mut self) -> Result<(), Error> {
        Err(Error::not_implemented("read_pixels"))
    }

    pub fn stencil_op(&mut self, _fail: u32, _zfail: u32, _zpass: u32) -> Result<(), Error> {
        Err(Error::not_implemented("stencil_op"))
    }

    pub fn stencil_func(&mut self, _func: u32, _reference: i32, _mask: u32) -> Result<(), Error> {
        Err(Error::not_implemented("stencil_func"))
    }

    pub fn line_width(&mut self, _width: f32) -> Result<(), Error> {
        Err(Error::not_implemented("line_width"))
    }

    pub fn create_framebuffer(&mut self) -> Result<(), Error> {
        Err(Error::not_implemented("framebuffer objects"))
    }
}

fn is_blend_factor(factor: u32) -> bool {
    matches!(
        factor,
        gl::ZERO
            | gl::ONE
            | gl::SRC_COLOR
            | gl::ONE_MINUS_SRC_COLOR
            | gl::SRC_ALPHA
            | gl::ONE_MINUS_SRC_ALPHA
            | gl::DST_ALPHA
            | gl::ONE_MINUS_DST_ALPHA
            | gl::DST_COLOR
            | gl::ONE_MINUS_DST_COLOR
            | gl::SRC_ALPHA_SATURATE
            | gl::CONSTANT_COLOR
            | gl::ONE_MINUS_CONSTANT_COLOR
            | gl::CONSTANT_ALPHA
            | gl::ONE_MINUS_CONSTANT_ALPHA
    )
}
