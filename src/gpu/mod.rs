//! The explicit graphics API the emulation layer runs on.
//!
//! The host supplies a [`Device`] and a [`Surface`]; the core only ever
//! talks to these traits. The descriptor vocabulary is modeled on WebGPU.

#[cfg(test)]
pub(crate) mod mock;

use std::ops::Range;
use std::sync::Arc;

use bitflags::bitflags;
use glam::UVec2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Depth24Plus,
}

impl TextureFormat {
    pub const fn is_depth(&self) -> bool {
        matches!(self, Self::Depth24Plus)
    }

    pub const fn bytes_per_texel(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm | Self::Bgra8UnormSrgb => 4,
            Self::Depth24Plus => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint8x2,
    Uint8x4,
    Unorm8x2,
    /// No native equivalent; draws substitute a `Unorm8x4` shadow buffer.
    Unorm8x3,
    Unorm8x4,
}

impl VertexFormat {
    pub const fn size(&self) -> u64 {
        match self {
            Self::Float32 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint8x2 | Self::Unorm8x2 => 2,
            Self::Unorm8x3 => 3,
            Self::Uint8x4 | Self::Unorm8x4 => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const UNIFORM = 1 << 4;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Clone, Debug)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Clone, Debug)]
pub struct TextureDescriptor {
    pub size: UVec2,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub mip_level_count: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SamplerDescriptor {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub compare: Option<CompareFunction>,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub anisotropy_clamp: u16,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            compare: None,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            anisotropy_clamp: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderModuleDescriptor<'a> {
    pub source: &'a str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    Float,
    Uint,
    Depth,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer,
    FilteringSampler,
    Texture(TextureSampleType),
}

#[derive(Copy, Clone, Debug)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStages,
    pub ty: BindingType,
}

#[derive(Clone, Debug)]
pub struct BindGroupLayoutDescriptor<'a> {
    pub entries: &'a [BindGroupLayoutEntry],
}

#[derive(Clone, Debug)]
pub struct BufferBinding<'a> {
    pub buffer: &'a Arc<dyn Buffer>,
    pub offset: u64,
    pub size: Option<u64>,
}

#[derive(Clone, Debug)]
pub enum BindingResource<'a> {
    Buffer(BufferBinding<'a>),
    Sampler(&'a Arc<dyn Sampler>),
    Texture(&'a Arc<dyn Texture>),
}

#[derive(Clone, Debug)]
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

#[derive(Clone, Debug)]
pub struct BindGroupDescriptor<'a> {
    pub layout: &'a Arc<dyn BindGroupLayout>,
    pub entries: &'a [BindGroupEntry<'a>],
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Debug)]
pub struct VertexState<'a> {
    pub module: &'a Arc<dyn ShaderModule>,
    pub entry_point: &'a str,
    pub buffers: &'a [VertexBufferLayout],
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

#[derive(Clone, Debug)]
pub struct FragmentState<'a> {
    pub module: &'a Arc<dyn ShaderModule>,
    pub entry_point: &'a str,
    pub targets: &'a [ColorTargetState],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: Option<Face>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Clone, Debug)]
pub struct RenderPipelineDescriptor<'a> {
    pub layout: &'a Arc<dyn BindGroupLayout>,
    pub vertex: VertexState<'a>,
    pub fragment: Option<FragmentState<'a>>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
}

#[derive(Clone, Debug)]
pub struct RenderPassColorAttachment<'a> {
    pub texture: &'a Arc<dyn Texture>,
    pub load_op: LoadOp<Color>,
    pub store_op: StoreOp,
}

#[derive(Clone, Debug)]
pub struct RenderPassDepthStencilAttachment<'a> {
    pub texture: &'a Arc<dyn Texture>,
    pub depth_load_op: LoadOp<f32>,
    pub depth_store_op: StoreOp,
}

#[derive(Clone, Debug)]
pub struct RenderPassDescriptor<'a> {
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

#[derive(Copy, Clone, Debug)]
pub struct ImageDataLayout {
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
}

/// Handle to a device buffer. Destruction is explicit; dropping the handle
/// leaves the device resource alive until the device reclaims it.
pub trait Buffer: std::fmt::Debug {
    fn size(&self) -> u64;
    fn destroy(&self);
}

pub trait Texture: std::fmt::Debug {
    fn size(&self) -> UVec2;
    fn format(&self) -> TextureFormat;
    fn destroy(&self);
}

pub trait Sampler: std::fmt::Debug {}

pub trait ShaderModule: std::fmt::Debug {}

pub trait BindGroupLayout: std::fmt::Debug {}

pub trait BindGroup: std::fmt::Debug {}

pub trait RenderPipeline: std::fmt::Debug {}

pub trait CommandBuffer: std::fmt::Debug {
    /// Backends downcast submitted buffers to their own type.
    fn as_any(&self) -> &dyn std::any::Any;
}

pub trait Device: std::fmt::Debug {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Arc<dyn Buffer>;
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Arc<dyn Texture>;
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Arc<dyn Sampler>;
    fn create_shader_module(&self, descriptor: &ShaderModuleDescriptor<'_>)
        -> Arc<dyn ShaderModule>;
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Arc<dyn BindGroupLayout>;
    fn create_bind_group(&self, descriptor: &BindGroupDescriptor<'_>) -> Arc<dyn BindGroup>;
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Arc<dyn RenderPipeline>;
    fn create_command_encoder(&self) -> Box<dyn CommandEncoder>;
    fn queue(&self) -> &dyn Queue;
}

pub trait Queue {
    fn write_buffer(&self, buffer: &Arc<dyn Buffer>, offset: u64, data: &[u8]);
    fn write_texture(
        &self,
        texture: &Arc<dyn Texture>,
        mip_level: u32,
        data: &[u8],
        layout: ImageDataLayout,
    );
    fn submit(&self, command_buffer: Box<dyn CommandBuffer>);
}

/// The current color target of the canvas the context renders to.
pub trait Surface: std::fmt::Debug {
    fn current_texture(&self) -> Arc<dyn Texture>;
    fn format(&self) -> TextureFormat;
}

pub trait CommandEncoder {
    fn begin_render_pass<'a>(
        &'a mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPassEncoder + 'a>;
    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer>;
}

pub trait RenderPassEncoder {
    fn set_pipeline(&mut self, pipeline: &Arc<dyn RenderPipeline>);
    fn set_bind_group(&mut self, index: u32, bind_group: &Arc<dyn BindGroup>);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>, offset: u64);
    fn set_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, format: IndexFormat, offset: u64);
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);
    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32);
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}
