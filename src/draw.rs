//! The draw synthesizer: on every draw call, compose the render pipeline
//! description, the bind group, vertex buffer bindings and a render pass
//! whose load ops consume the clear latch, then submit exactly one command
//! buffer.

use std::sync::Arc;

use glam::UVec2;

use crate::context::resources::{BufferId, SamplerParams, TextureId};
use crate::context::state::MAX_TEXTURE_UNITS;
use crate::context::GlContext;
use crate::error::{Error, ErrorImpl};
use crate::gl;
use crate::gpu::{
    AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BlendComponent, BlendFactor, BlendOperation,
    BlendState, BufferBinding, BufferDescriptor, BufferUsage, Color, ColorTargetState,
    ColorWrites, CompareFunction, DepthStencilState, Face, FilterMode, FragmentState, FrontFace,
    ImageDataLayout, IndexFormat, LoadOp, PrimitiveState, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, Sampler, SamplerDescriptor, ShaderModuleDescriptor, StoreOp,
    Texture, TextureDescriptor, TextureFormat, TextureSampleType, TextureUsage, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexState,
};
use crate::translate;
use crate::types::SamplerType;

#[derive(Copy, Clone, Debug)]
enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { count: u32, format: IndexFormat, offset: u64 },
}

/// One enabled attribute's share of one vertex buffer.
#[derive(Copy, Clone, Debug)]
struct Segment {
    location: u32,
    buffer: BufferId,
    format: VertexFormat,
    remapped_format: VertexFormat,
    remapped_stride: u64,
    remapped_offset: u64,
}

impl Segment {
    fn needs_shadow(&self) -> bool {
        self.format == VertexFormat::Unorm8x3
    }
}

impl GlContext {
    pub fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) -> Result<(), Error> {
        self.draw(
            mode,
            DrawKind::Arrays {
                first: first.max(0) as u32,
                count: count.max(0) as u32,
            },
        )
    }

    pub fn draw_elements(
        &mut self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: u64,
    ) -> Result<(), Error> {
        let format = match ty {
            gl::UNSIGNED_SHORT => IndexFormat::Uint16,
            gl::UNSIGNED_INT => IndexFormat::Uint32,
            other => return Err(ErrorImpl::UnsupportedIndexType(other).into()),
        };
        self.draw(
            mode,
            DrawKind::Elements {
                count: count.max(0) as u32,
                format,
                offset,
            },
        )
    }

    fn draw(&mut self, mode: u32, kind: DrawKind) -> Result<(), Error> {
        let topology = topology(mode)?;

        let program_id = self
            .state
            .current_program
            .ok_or(ErrorImpl::NoProgramBound)?;
        let compiled = self
            .programs
            .get(program_id)
            .and_then(|p| p.compiled.clone())
            .ok_or(ErrorImpl::ProgramNotLinked)?;

        // Segment table: one entry per enabled attribute, formats remapped
        // where the source format has no native equivalent.
        let mut segments = Vec::new();
        for (index, attrib) in self.state.attribs.iter().enumerate() {
            if !attrib.enabled {
                continue;
            }
            let buffer = attrib
                .buffer
                .ok_or(ErrorImpl::AttributeWithoutBuffer(index as u32))?;
            let format = vertex_format(attrib.ty, attrib.size, attrib.normalized)?;
            let stride = if attrib.stride > 0 {
                attrib.stride as u64
            } else {
                format.size()
            };
            let (remapped_format, remapped_stride, remapped_offset) =
                if format == VertexFormat::Unorm8x3 {
                    (VertexFormat::Unorm8x4, stride * 4 / 3, attrib.offset * 4 / 3)
                } else {
                    (format, stride, attrib.offset)
                };
            segments.push(Segment {
                location: index as u32,
                buffer,
                format,
                remapped_format,
                remapped_stride,
                remapped_offset,
            });
        }

        let index_buffer_id = match kind {
            DrawKind::Elements { .. } => Some(
                self.state
                    .element_array_buffer
                    .ok_or(ErrorImpl::NoIndexBuffer)?,
            ),
            DrawKind::Arrays { .. } => None,
        };

        for segment in &segments {
            self.ensure_buffer(segment.buffer);
            if segment.needs_shadow() {
                self.ensure_shadow(segment.buffer);
            }
        }
        if let Some(id) = index_buffer_id {
            self.ensure_buffer(id);
        }

        let resolved_segments: Vec<(Segment, Arc<dyn crate::gpu::Buffer>)> = segments
            .iter()
            .map(|segment| {
                let state = &self.buffers[segment.buffer];
                let buffer = if segment.needs_shadow() {
                    state.shadow.clone().expect("shadow was just ensured")
                } else {
                    state.device.clone().expect("device buffer was just ensured")
                };
                (*segment, buffer)
            })
            .collect();
        let index_buffer = index_buffer_id.map(|id| {
            self.buffers[id]
                .device
                .clone()
                .expect("index buffer was just ensured")
        });

        // Shader module and uniform buffer.
        let device = self.device.clone();
        let module = {
            let program = self.programs.get_mut(program_id).unwrap();
            if program.module.is_none() {
                program.module = Some(device.create_shader_module(&ShaderModuleDescriptor {
                    source: &compiled.wgsl,
                }));
            }
            program.module.clone().unwrap()
        };
        let uniform_buffer = {
            let program = self.programs.get_mut(program_id).unwrap();
            program.uniforms.prepare(device.as_ref())
        };

        // Texture-unit indirection: the sampler uniform's integer value
        // picks the bound texture of the matching target.
        let mut texture_ids: Vec<(u32, u32, Option<TextureId>)> = Vec::new();
        {
            let program = self.programs.get(program_id).unwrap();
            for info in &compiled.textures {
                let unit = program.uniforms.texture_unit(info.binding);
                let unit = (unit.max(0) as usize).min(MAX_TEXTURE_UNITS - 1);
                let slot = self.state.texture_units[unit];
                let id = match info.sampler {
                    SamplerType::Cube => slot.texture_cube,
                    _ => slot.texture_2d,
                };
                texture_ids.push((info.binding, info.sampler_binding, id));
            }
        }
        let mut texture_bindings: Vec<(u32, u32, Arc<dyn Texture>, Arc<dyn Sampler>)> = Vec::new();
        for (binding, sampler_binding, id) in texture_ids {
            let (texture, sampler) = match id {
                Some(id) => self.ensure_texture(id),
                None => self.default_texture_sampler(),
            };
            texture_bindings.push((binding, sampler_binding, texture, sampler));
        }

        let color_texture = self.surface.current_texture();
        let surface_size = color_texture.size();
        let depth_enabled = self.state.capabilities.contains(&gl::DEPTH_TEST);
        let depth_texture = depth_enabled.then(|| self.ensure_depth_texture(surface_size));

        // Bind-group layout: every binding visible to both stages.
        let mut layout_entries = Vec::new();
        if let Some(layout) = compiled.uniform_buffer {
            layout_entries.push(BindGroupLayoutEntry {
                binding: layout.binding,
                visibility: crate::gpu::ShaderStages::VERTEX | crate::gpu::ShaderStages::FRAGMENT,
                ty: crate::gpu::BindingType::UniformBuffer,
            });
        }
        for info in &compiled.textures {
            let sample_type = if info.sampler.is_unsigned() {
                TextureSampleType::Uint
            } else {
                TextureSampleType::Float
            };
            layout_entries.push(BindGroupLayoutEntry {
                binding: info.binding,
                visibility: crate::gpu::ShaderStages::VERTEX | crate::gpu::ShaderStages::FRAGMENT,
                ty: crate::gpu::BindingType::Texture(sample_type),
            });
            layout_entries.push(BindGroupLayoutEntry {
                binding: info.sampler_binding,
                visibility: crate::gpu::ShaderStages::VERTEX | crate::gpu::ShaderStages::FRAGMENT,
                ty: crate::gpu::BindingType::FilteringSampler,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: &layout_entries,
        });

        // Pipeline description.
        let params = self.state.params.clone();
        let vertex_layouts: Vec<VertexBufferLayout> = resolved_segments
            .iter()
            .map(|(segment, _)| VertexBufferLayout {
                array_stride: segment.remapped_stride,
                attributes: vec![VertexAttribute {
                    format: segment.remapped_format,
                    offset: 0,
                    shader_location: segment.location,
                }],
            })
            .collect();

        let blend = self
            .state
            .capabilities
            .contains(&gl::BLEND)
            .then(|| BlendState {
                color: BlendComponent {
                    src_factor: blend_factor(params.blend_src_rgb),
                    dst_factor: blend_factor(params.blend_dst_rgb),
                    operation: blend_operation(params.blend_eq_rgb),
                },
                alpha: BlendComponent {
                    src_factor: blend_factor(params.blend_src_alpha),
                    dst_factor: blend_factor(params.blend_dst_alpha),
                    operation: blend_operation(params.blend_eq_alpha),
                },
            });

        let cull_mode = self
            .state
            .capabilities
            .contains(&gl::CULL_FACE)
            .then(|| match params.cull_face_mode {
                gl::FRONT => Face::Front,
                _ => Face::Back,
            });

        let targets = [ColorTargetState {
            format: self.surface.format(),
            blend,
            write_mask: color_writes(params.color_mask),
        }];

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            layout: &bind_group_layout,
            vertex: VertexState {
                module: &module,
                entry_point: translate::VERTEX_ENTRY,
                buffers: &vertex_layouts,
            },
            fragment: Some(FragmentState {
                module: &module,
                entry_point: translate::FRAGMENT_ENTRY,
                targets: &targets,
            }),
            primitive: PrimitiveState {
                topology,
                front_face: match params.front_face {
                    gl::CW => FrontFace::Cw,
                    _ => FrontFace::Ccw,
                },
                cull_mode,
            },
            depth_stencil: depth_enabled.then(|| DepthStencilState {
                format: TextureFormat::Depth24Plus,
                depth_write_enabled: true,
                depth_compare: compare_function(params.depth_func),
            }),
        });

        // Bind group, entries in uniform declaration order.
        let mut entries = Vec::new();
        if let (Some(layout), Some(buffer)) = (compiled.uniform_buffer, uniform_buffer.as_ref()) {
            entries.push(BindGroupEntry {
                binding: layout.binding,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer,
                    offset: 0,
                    size: None,
                }),
            });
        }
        for (binding, sampler_binding, texture, sampler) in &texture_bindings {
            entries.push(BindGroupEntry {
                binding: *binding,
                resource: BindingResource::Texture(texture),
            });
            entries.push(BindGroupEntry {
                binding: *sampler_binding,
                resource: BindingResource::Sampler(sampler),
            });
        }
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &entries,
        });

        // Render pass; the clear latch drives the load ops and is consumed.
        let clear_mask = std::mem::take(&mut self.state.clear_mask);
        let color_load = if clear_mask & gl::COLOR_BUFFER_BIT != 0 {
            let [r, g, b, a] = params.clear_color;
            LoadOp::Clear(Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            })
        } else {
            LoadOp::Load
        };
        let depth_load = if clear_mask & gl::DEPTH_BUFFER_BIT != 0 {
            LoadOp::Clear(params.clear_depth)
        } else {
            LoadOp::Load
        };

        let color_attachments = [RenderPassColorAttachment {
            texture: &color_texture,
            load_op: color_load,
            store_op: StoreOp::Store,
        }];
        let depth_attachment = depth_texture
            .as_ref()
            .map(|texture| RenderPassDepthStencilAttachment {
                texture,
                depth_load_op: depth_load,
                depth_store_op: StoreOp::Store,
            });

        let mut encoder = device.create_command_encoder();
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
            });
            pass.set_pipeline(&pipeline);

            let [x, y, w, h] = params.viewport;
            pass.set_viewport(x as f32, y as f32, w.max(0) as f32, h.max(0) as f32);
            if self.state.capabilities.contains(&gl::SCISSOR_TEST) {
                let [x, y, w, h] = params.scissor;
                pass.set_scissor_rect(x.max(0) as u32, y.max(0) as u32, w.max(0) as u32, h.max(0) as u32);
            }

            pass.set_bind_group(0, &bind_group);
            for (slot, (segment, buffer)) in resolved_segments.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer, segment.remapped_offset);
            }

            match kind {
                DrawKind::Arrays { first, count } => {
                    pass.draw(first..first + count, 0..1);
                }
                DrawKind::Elements {
                    count,
                    format,
                    offset,
                } => {
                    let buffer = index_buffer.as_ref().unwrap();
                    pass.set_index_buffer(buffer, format, 0);
                    let first = (offset / index_size(format)) as u32;
                    pass.draw_indexed(first..first + count, 0, 0..1);
                }
            }
        }
        device.queue().submit(encoder.finish());

        Ok(())
    }

    /// Lazily (re-)allocates the device buffer and uploads dirty contents.
    fn ensure_buffer(&mut self, id: BufferId) {
        let device = self.device.clone();
        let state = self.buffers.get_mut(id).unwrap();

        if state.device.is_none() {
            if state.imported {
                // Imported buffers are never allocated by the core.
                return;
            }
            let mut usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
            if state.index_usage {
                usage |= BufferUsage::INDEX;
            }
            state.device = Some(device.create_buffer(&BufferDescriptor {
                size: state.byte_length.max(4),
                usage,
            }));
            state.dirty = true;
        }

        if state.dirty && !state.data.is_empty() {
            let buffer = state.device.as_ref().unwrap();
            device.queue().write_buffer(buffer, 0, &state.data);
        }
        state.dirty = false;
    }

    /// Regenerates the 8x3→8x4 shadow: every RGB triplet becomes RGBA with
    /// the alpha byte zeroed.
    fn ensure_shadow(&mut self, id: BufferId) {
        let device = self.device.clone();
        let state = self.buffers.get_mut(id).unwrap();

        let shadow_size = state.data.len() as u64 / 3 * 4;
        let needs_alloc = state
            .shadow
            .as_ref()
            .is_none_or(|b| b.size() != shadow_size.max(4));
        if needs_alloc {
            if let Some(old) = state.shadow.take() {
                old.destroy();
            }
            state.shadow = Some(device.create_buffer(&BufferDescriptor {
                size: shadow_size.max(4),
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            }));
            state.shadow_dirty = true;
        }

        if state.shadow_dirty {
            let mut rgba = Vec::with_capacity(shadow_size as usize);
            for rgb in state.data.chunks_exact(3) {
                rgba.extend_from_slice(rgb);
                rgba.push(0);
            }
            device
                .queue()
                .write_buffer(state.shadow.as_ref().unwrap(), 0, &rgba);
            state.shadow_dirty = false;
        }
    }

    /// Device texture and sampler for a bound texture, allocating a 1x1
    /// black stand-in when nothing was uploaded yet.
    fn ensure_texture(
        &mut self,
        id: TextureId,
    ) -> (Arc<dyn Texture>, Arc<dyn Sampler>) {
        let device = self.device.clone();
        let state = self.textures.get_mut(id).unwrap();

        let texture = match &state.device {
            Some(texture) => texture.clone(),
            None => {
                let texture = device.create_texture(&TextureDescriptor {
                    size: UVec2::ONE,
                    format: TextureFormat::Rgba8Unorm,
                    usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
                    mip_level_count: 1,
                });
                device.queue().write_texture(
                    &texture,
                    0,
                    &[0, 0, 0, u8::MAX],
                    ImageDataLayout {
                        bytes_per_row: 4,
                        rows_per_image: 1,
                    },
                );
                state.device = Some(texture.clone());
                state.size = UVec2::ONE;
                texture
            }
        };

        if state.sampler_dirty || state.sampler.is_none() {
            state.sampler = Some(device.create_sampler(&sampler_descriptor(&state.params)));
            state.sampler_dirty = false;
        }

        (texture, state.sampler.clone().unwrap())
    }

    fn default_texture_sampler(&mut self) -> (Arc<dyn Texture>, Arc<dyn Sampler>) {
        let device = self.device.clone();
        let texture = match &self.default_texture {
            Some(texture) => texture.clone(),
            None => {
                let texture = device.create_texture(&TextureDescriptor {
                    size: UVec2::ONE,
                    format: TextureFormat::Rgba8Unorm,
                    usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
                    mip_level_count: 1,
                });
                device.queue().write_texture(
                    &texture,
                    0,
                    &[0, 0, 0, u8::MAX],
                    ImageDataLayout {
                        bytes_per_row: 4,
                        rows_per_image: 1,
                    },
                );
                self.default_texture = Some(texture.clone());
                texture
            }
        };
        let sampler = match &self.default_sampler {
            Some(sampler) => sampler.clone(),
            None => {
                let sampler = device.create_sampler(&SamplerDescriptor::default());
                self.default_sampler = Some(sampler.clone());
                sampler
            }
        };
        (texture, sampler)
    }

    /// The cached per-surface depth target, re-created when the color
    /// texture size changes.
    fn ensure_depth_texture(&mut self, size: UVec2) -> Arc<dyn Texture> {
        match &self.depth_texture {
            Some((cached, texture)) if *cached == size => texture.clone(),
            _ => {
                if let Some((_, old)) = self.depth_texture.take() {
                    old.destroy();
                }
                let texture = self.device.create_texture(&TextureDescriptor {
                    size,
                    format: TextureFormat::Depth24Plus,
                    usage: TextureUsage::RENDER_ATTACHMENT,
                    mip_level_count: 1,
                });
                self.depth_texture = Some((size, texture.clone()));
                texture
            }
        }
    }
}

/// `LINE_LOOP` and `TRIANGLE_FAN` wait on index-list synthesis.
fn topology(mode: u32) -> Result<PrimitiveTopology, Error> {
    Ok(match mode {
        gl::POINTS => PrimitiveTopology::PointList,
        gl::LINES => PrimitiveTopology::LineList,
        gl::LINE_STRIP => PrimitiveTopology::LineStrip,
        gl::TRIANGLES => PrimitiveTopology::TriangleList,
        gl::TRIANGLE_STRIP => PrimitiveTopology::TriangleStrip,
        other => return Err(ErrorImpl::UnsupportedTopology(other).into()),
    })
}

fn vertex_format(ty: u32, size: i32, normalized: bool) -> Result<VertexFormat, Error> {
    Ok(match (ty, size, normalized) {
        (gl::FLOAT, 1, _) => VertexFormat::Float32,
        (gl::FLOAT, 2, _) => VertexFormat::Float32x2,
        (gl::FLOAT, 3, _) => VertexFormat::Float32x3,
        (gl::FLOAT, 4, _) => VertexFormat::Float32x4,
        (gl::UNSIGNED_BYTE, 2, false) => VertexFormat::Uint8x2,
        (gl::UNSIGNED_BYTE, 4, false) => VertexFormat::Uint8x4,
        (gl::UNSIGNED_BYTE, 2, true) => VertexFormat::Unorm8x2,
        (gl::UNSIGNED_BYTE, 3, true) => VertexFormat::Unorm8x3,
        (gl::UNSIGNED_BYTE, 4, true) => VertexFormat::Unorm8x4,
        _ => return Err(ErrorImpl::UnsupportedVertexFormat { ty, size }.into()),
    })
}

fn index_size(format: IndexFormat) -> u64 {
    match format {
        IndexFormat::Uint16 => 2,
        IndexFormat::Uint32 => 4,
    }
}

fn compare_function(func: u32) -> CompareFunction {
    match func {
        gl::NEVER => CompareFunction::Never,
        gl::EQUAL => CompareFunction::Equal,
        gl::LEQUAL => CompareFunction::LessEqual,
        gl::GREATER => CompareFunction::Greater,
        gl::NOTEQUAL => CompareFunction::NotEqual,
        gl::GEQUAL => CompareFunction::GreaterEqual,
        gl::ALWAYS => CompareFunction::Always,
        _ => CompareFunction::Less,
    }
}

fn blend_factor(factor: u32) -> BlendFactor {
    match factor {
        gl::ONE => BlendFactor::One,
        gl::SRC_COLOR => BlendFactor::Src,
        gl::ONE_MINUS_SRC_COLOR => BlendFactor::OneMinusSrc,
        gl::SRC_ALPHA => BlendFactor::SrcAlpha,
        gl::ONE_MINUS_SRC_ALPHA => BlendFactor::OneMinusSrcAlpha,
        gl::DST_COLOR => BlendFactor::Dst,
        gl::ONE_MINUS_DST_COLOR => BlendFactor::OneMinusDst,
        gl::DST_ALPHA => BlendFactor::DstAlpha,
        gl::ONE_MINUS_DST_ALPHA => BlendFactor::OneMinusDstAlpha,
        gl::SRC_ALPHA_SATURATE => BlendFactor::SrcAlphaSaturated,
        gl::CONSTANT_COLOR | gl::CONSTANT_ALPHA => BlendFactor::Constant,
        gl::ONE_MINUS_CONSTANT_COLOR | gl::ONE_MINUS_CONSTANT_ALPHA => {
            BlendFactor::OneMinusConstant
        }
        _ => BlendFactor::Zero,
    }
}

fn blend_operation(equation: u32) -> BlendOperation {
    match equation {
        gl::FUNC_SUBTRACT => BlendOperation::Subtract,
        gl::FUNC_REVERSE_SUBTRACT => BlendOperation::ReverseSubtract,
        gl::MIN => BlendOperation::Min,
        gl::MAX => BlendOperation::Max,
        _ => BlendOperation::Add,
    }
}

fn color_writes(mask: [bool; 4]) -> ColorWrites {
    let mut writes = ColorWrites::empty();
    if mask[0] {
        writes |= ColorWrites::RED;
    }
    if mask[1] {
        writes |= ColorWrites::GREEN;
    }
    if mask[2] {
        writes |= ColorWrites::BLUE;
    }
    if mask[3] {
        writes |= ColorWrites::ALPHA;
    }
    writes
}

fn sampler_descriptor(params: &SamplerParams) -> SamplerDescriptor {
    let (min_filter, mipmap_filter) = match params.min_filter {
        gl::NEAREST | gl::NEAREST_MIPMAP_NEAREST => (FilterMode::Nearest, FilterMode::Nearest),
        gl::NEAREST_MIPMAP_LINEAR => (FilterMode::Nearest, FilterMode::Linear),
        gl::LINEAR | gl::LINEAR_MIPMAP_NEAREST => (FilterMode::Linear, FilterMode::Nearest),
        _ => (FilterMode::Linear, FilterMode::Linear),
    };

    SamplerDescriptor {
        min_filter,
        mag_filter: match params.mag_filter {
            gl::NEAREST => FilterMode::Nearest,
            _ => FilterMode::Linear,
        },
        mipmap_filter,
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: address_mode(params.wrap_r),
        compare: (params.compare_mode == gl::COMPARE_REF_TO_TEXTURE)
            .then(|| compare_function(params.compare_func)),
        lod_min_clamp: params.min_lod.max(0.0),
        lod_max_clamp: params.max_lod.clamp(0.0, 32.0),
        anisotropy_clamp: (params.max_anisotropy as u16).max(1),
    }
}

fn address_mode(wrap: u32) -> AddressMode {
    match wrap {
        gl::REPEAT => AddressMode::Repeat,
        gl::MIRRORED_REPEAT => AddressMode::MirrorRepeat,
        _ => AddressMode::ClampToEdge,
    }
}
