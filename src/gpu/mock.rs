//! A recording device for tests: every created resource and submitted
//! command is captured for later assertions. Nothing is rendered.

use std::ops::Range;
use std::sync::Arc;

use glam::UVec2;
use parking_lot::Mutex;

use super::{
    BindGroup, BindGroupDescriptor, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, Buffer, BufferDescriptor, BufferUsage, Color,
    CommandBuffer, CommandEncoder, DepthStencilState, Device, Face, FrontFace, ImageDataLayout,
    IndexFormat, LoadOp, PrimitiveTopology, Queue, RenderPassDescriptor, RenderPassEncoder,
    RenderPipeline, RenderPipelineDescriptor, Sampler, SamplerDescriptor, ShaderModule,
    ShaderModuleDescriptor, Surface, Texture, TextureDescriptor, TextureFormat, TextureUsage,
    VertexBufferLayout,
};

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub buffers: Mutex<Vec<Arc<MockBuffer>>>,
    pub textures: Mutex<Vec<Arc<MockTexture>>>,
    pub samplers: Mutex<Vec<Arc<MockSampler>>>,
    pub shader_modules: Mutex<Vec<Arc<MockShaderModule>>>,
    pub pipelines: Mutex<Vec<Arc<MockPipeline>>>,
    pub bind_groups: Mutex<Vec<Arc<MockBindGroup>>>,
    pub submissions: Mutex<Vec<Submission>>,
}

impl MockState {
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submission(&self, index: usize) -> Submission {
        self.submissions.lock()[index].clone()
    }
}

#[derive(Debug)]
pub(crate) struct MockDevice {
    pub state: Arc<MockState>,
    queue: MockQueue,
}

impl MockDevice {
    pub fn new() -> Self {
        let state = Arc::new(MockState::default());
        Self {
            queue: MockQueue {
                state: state.clone(),
            },
            state,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockBuffer {
    pub size: u64,
    pub usage: BufferUsage,
    pub data: Mutex<Vec<u8>>,
    pub destroyed: Mutex<bool>,
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn destroy(&self) {
        *self.destroyed.lock() = true;
    }
}

#[derive(Debug)]
pub(crate) struct MockTexture {
    pub size: UVec2,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub destroyed: Mutex<bool>,
}

impl Texture for MockTexture {
    fn size(&self) -> UVec2 {
        self.size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn destroy(&self) {
        *self.destroyed.lock() = true;
    }
}

#[derive(Debug)]
pub(crate) struct MockSampler {
    pub descriptor: SamplerDescriptor,
}

impl Sampler for MockSampler {}

#[derive(Debug)]
pub(crate) struct MockShaderModule {
    pub source: String,
}

impl ShaderModule for MockShaderModule {}

#[derive(Debug)]
pub(crate) struct MockBindGroupLayout {
    pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayout for MockBindGroupLayout {}

#[derive(Clone, Debug)]
pub(crate) enum RecordedResource {
    Buffer {
        buffer: Arc<dyn Buffer>,
        offset: u64,
        size: Option<u64>,
    },
    Sampler(Arc<dyn Sampler>),
    Texture(Arc<dyn Texture>),
}

#[derive(Debug)]
pub(crate) struct MockBindGroup {
    pub entries: Vec<(u32, RecordedResource)>,
}

impl BindGroup for MockBindGroup {}

/// An owned snapshot of the pipeline descriptor.
#[derive(Clone, Debug)]
pub(crate) struct RecordedPipeline {
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: Option<Face>,
    pub depth_stencil: Option<DepthStencilState>,
    pub targets: Vec<super::ColorTargetState>,
}

#[derive(Debug)]
pub(crate) struct MockPipeline {
    pub descriptor: RecordedPipeline,
}

impl RenderPipeline for MockPipeline {}

#[derive(Clone, Debug)]
pub(crate) enum RecordedCommand {
    BeginRenderPass {
        color_texture: Arc<dyn Texture>,
        color_load: LoadOp<Color>,
        depth: Option<LoadOp<f32>>,
    },
    SetPipeline(Arc<dyn RenderPipeline>),
    SetBindGroup {
        index: u32,
        bind_group: Arc<dyn BindGroup>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Arc<dyn Buffer>,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: Arc<dyn Buffer>,
        format: IndexFormat,
        offset: u64,
    },
    SetViewport,
    SetScissor,
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
    },
    EndRenderPass,
}

#[derive(Clone, Debug)]
pub(crate) struct Submission {
    pub commands: Vec<RecordedCommand>,
}

impl Device for MockDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Arc<dyn Buffer> {
        let buffer = Arc::new(MockBuffer {
            size: descriptor.size,
            usage: descriptor.usage,
            data: Mutex::new(vec![0; descriptor.size as usize]),
            destroyed: Mutex::new(false),
        });
        self.state.buffers.lock().push(buffer.clone());
        buffer
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Arc<dyn Texture> {
        let texture = Arc::new(MockTexture {
            size: descriptor.size,
            format: descriptor.format,
            usage: descriptor.usage,
            writes: Mutex::new(Vec::new()),
            destroyed: Mutex::new(false),
        });
        self.state.textures.lock().push(texture.clone());
        texture
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Arc<dyn Sampler> {
        let sampler = Arc::new(MockSampler {
            descriptor: descriptor.clone(),
        });
        self.state.samplers.lock().push(sampler.clone());
        sampler
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Arc<dyn ShaderModule> {
        let module = Arc::new(MockShaderModule {
            source: descriptor.source.to_owned(),
        });
        self.state.shader_modules.lock().push(module.clone());
        module
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Arc<dyn BindGroupLayout> {
        Arc::new(MockBindGroupLayout {
            entries: descriptor.entries.to_vec(),
        })
    }

    fn create_bind_group(&self, descriptor: &BindGroupDescriptor<'_>) -> Arc<dyn BindGroup> {
        let entries = descriptor
            .entries
            .iter()
            .map(|entry| {
                let resource = match &entry.resource {
                    BindingResource::Buffer(binding) => RecordedResource::Buffer {
                        buffer: binding.buffer.clone(),
                        offset: binding.offset,
                        size: binding.size,
                    },
                    BindingResource::Sampler(sampler) => {
                        RecordedResource::Sampler((*sampler).clone())
                    }
                    BindingResource::Texture(texture) => {
                        RecordedResource::Texture((*texture).clone())
                    }
                };
                (entry.binding, resource)
            })
            .collect();
        let bind_group = Arc::new(MockBindGroup { entries });
        self.state.bind_groups.lock().push(bind_group.clone());
        bind_group
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Arc<dyn RenderPipeline> {
        let pipeline = Arc::new(MockPipeline {
            descriptor: RecordedPipeline {
                vertex_buffers: descriptor.vertex.buffers.to_vec(),
                topology: descriptor.primitive.topology,
                front_face: descriptor.primitive.front_face,
                cull_mode: descriptor.primitive.cull_mode,
                depth_stencil: descriptor.depth_stencil,
                targets: descriptor
                    .fragment
                    .as_ref()
                    .map(|f| f.targets.to_vec())
                    .unwrap_or_default(),
            },
        });
        self.state.pipelines.lock().push(pipeline.clone());
        pipeline
    }

    fn create_command_encoder(&self) -> Box<dyn CommandEncoder> {
        Box::new(MockCommandEncoder {
            state: self.state.clone(),
            commands: Vec::new(),
        })
    }

    fn queue(&self) -> &dyn Queue {
        &self.queue
    }
}

#[derive(Debug)]
struct MockQueue {
    state: Arc<MockState>,
}

impl Queue for MockQueue {
    fn write_buffer(&self, buffer: &Arc<dyn Buffer>, offset: u64, data: &[u8]) {
        for mock in self.state.buffers.lock().iter() {
            let as_dyn: Arc<dyn Buffer> = mock.clone();
            if Arc::ptr_eq(&as_dyn, buffer) {
                let mut contents = mock.data.lock();
                let offset = offset as usize;
                let end = offset + data.len();
                assert!(
                    end <= contents.len(),
                    "write of {} bytes at {offset} overflows buffer of {}",
                    data.len(),
                    contents.len(),
                );
                contents[offset..end].copy_from_slice(data);
                return;
            }
        }
        panic!("write to a buffer not created by this device");
    }

    fn write_texture(
        &self,
        texture: &Arc<dyn Texture>,
        _mip_level: u32,
        data: &[u8],
        _layout: ImageDataLayout,
    ) {
        for mock in self.state.textures.lock().iter() {
            let as_dyn: Arc<dyn Texture> = mock.clone();
            if Arc::ptr_eq(&as_dyn, texture) {
                mock.writes.lock().push(data.to_vec());
                return;
            }
        }
        panic!("write to a texture not created by this device");
    }

    fn submit(&self, command_buffer: Box<dyn CommandBuffer>) {
        // The command buffer is always one of ours; the commands were
        // stashed at finish time.
        let commands = command_buffer
            .as_any()
            .downcast_ref::<MockCommandBuffer>()
            .expect("submit of a foreign command buffer")
            .commands
            .clone();
        self.state.submissions.lock().push(Submission { commands });
    }
}

struct MockCommandEncoder {
    #[allow(dead_code)]
    state: Arc<MockState>,
    commands: Vec<RecordedCommand>,
}

impl CommandEncoder for MockCommandEncoder {
    fn begin_render_pass<'a>(
        &'a mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPassEncoder + 'a> {
        let color = &descriptor.color_attachments[0];
        self.commands.push(RecordedCommand::BeginRenderPass {
            color_texture: color.texture.clone(),
            color_load: color.load_op,
            depth: descriptor
                .depth_stencil_attachment
                .as_ref()
                .map(|d| d.depth_load_op),
        });
        Box::new(MockRenderPass { encoder: self })
    }

    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer> {
        Box::new(MockCommandBuffer {
            commands: self.commands,
        })
    }
}

struct MockRenderPass<'a> {
    encoder: &'a mut MockCommandEncoder,
}

impl Drop for MockRenderPass<'_> {
    fn drop(&mut self) {
        self.encoder.commands.push(RecordedCommand::EndRenderPass);
    }
}

impl RenderPassEncoder for MockRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: &Arc<dyn RenderPipeline>) {
        self.encoder
            .commands
            .push(RecordedCommand::SetPipeline(pipeline.clone()));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: &Arc<dyn BindGroup>) {
        self.encoder.commands.push(RecordedCommand::SetBindGroup {
            index,
            bind_group: bind_group.clone(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>, offset: u64) {
        self.encoder.commands.push(RecordedCommand::SetVertexBuffer {
            slot,
            buffer: buffer.clone(),
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, format: IndexFormat, offset: u64) {
        self.encoder.commands.push(RecordedCommand::SetIndexBuffer {
            buffer: buffer.clone(),
            format,
            offset,
        });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {
        self.encoder.commands.push(RecordedCommand::SetViewport);
    }

    fn set_scissor_rect(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {
        self.encoder.commands.push(RecordedCommand::SetScissor);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.encoder.commands.push(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, _instances: Range<u32>) {
        self.encoder.commands.push(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
        });
    }
}

#[derive(Debug)]
struct MockCommandBuffer {
    commands: Vec<RecordedCommand>,
}

impl CommandBuffer for MockCommandBuffer {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug)]
pub(crate) struct MockSurface {
    pub texture: Mutex<Arc<MockTexture>>,
    pub format: TextureFormat,
}

impl MockSurface {
    pub fn new(size: UVec2) -> Self {
        Self {
            texture: Mutex::new(Arc::new(MockTexture {
                size,
                format: TextureFormat::Bgra8Unorm,
                usage: TextureUsage::RENDER_ATTACHMENT,
                writes: Mutex::new(Vec::new()),
                destroyed: Mutex::new(false),
            })),
            format: TextureFormat::Bgra8Unorm,
        }
    }

    /// Swaps the backing texture, as a canvas resize would.
    pub fn resize(&self, size: UVec2) {
        *self.texture.lock() = Arc::new(MockTexture {
            size,
            format: self.format,
            usage: TextureUsage::RENDER_ATTACHMENT,
            writes: Mutex::new(Vec::new()),
            destroyed: Mutex::new(false),
        });
    }
}

impl Surface for MockSurface {
    fn current_texture(&self) -> Arc<dyn Texture> {
        self.texture.lock().clone()
    }

    fn format(&self) -> TextureFormat {
        self.format
    }
}
