//! Graphics API boundary.
//!
//! Every object creation, binding and draw call in the crate goes through the
//! object-safe [`Gl`] trait, so the ownership layer can be driven either by a
//! real OpenGL context (`backend::glow`) or by the software `backend::headless`
//! implementation used in tests. Handles are plain `u32` names; zero is null.
//!
//! Types:
//!
//! - `Gl` is the backend trait; all methods take `&self` and report driver
//!   failures as `ApiError`.
//! - `BindPoint` names a binding slot (buffer target, texture unit, ...).
//! - `TexImage`, `TexData`, `TexturePixels` describe texture uploads/readback.
//! - `ActiveResource`, `ResourceInterface`, `GlslType`, `UniformValue` carry
//!   program reflection and uniform uploads.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub mod draw_state;
pub mod guard;
pub mod resource;

pub use draw_state::DrawState;
pub use guard::{BindGuard, Bindable, QueryGuard};
pub use resource::{
    Allocator, Buffer, Framebuffer, MultiAllocator, Program, Query, QueryAllocator, Renderbuffer,
    Resource, ResourceKind, Sampler, Shader, ShaderAllocator, SingleAllocator, Texture,
    TextureAllocator, VertexArray,
};

/// Graphics object name. Zero never names a live object.
pub type Handle = u32;

pub type GlResult<T> = Result<T, ApiError>;

/// Object kinds created through the batch `gen_objects` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Framebuffer,
    Query,
    Renderbuffer,
    Sampler,
    Texture,
    VertexArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    #[default]
    Texture2d,
    Texture3d,
    CubeMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    TimeElapsed,
    SamplesPassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    Draw,
    Read,
}

/// A slot that holds at most one object at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Buffer(BufferTarget),
    Framebuffer(FramebufferTarget),
    Renderbuffer,
    Program,
    VertexArray,
    Texture { unit: u32, target: TextureTarget },
    Sampler { unit: u32 },
}

/// Internal storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    R32f,
    Rgba16f,
    #[default]
    Rgba32f,
}

impl TextureFormat {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            TextureFormat::R32f | TextureFormat::Rgba16f | TextureFormat::Rgba32f
        )
    }
}

/// Channel layout of client-side pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelChannels {
    Red,
    Rg,
    Rgb,
    Rgba,
}

impl PixelChannels {
    pub fn count(self) -> usize {
        match self {
            PixelChannels::Red => 1,
            PixelChannels::Rg => 2,
            PixelChannels::Rgb => 3,
            PixelChannels::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TexData<'a> {
    U8(&'a [u8]),
    F32(&'a [f32]),
}

/// Everything needed to define level 0 of a texture.
#[derive(Debug, Clone, Copy)]
pub struct TexImage<'a> {
    pub target: TextureTarget,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub channels: PixelChannels,
    pub data: Option<TexData<'a>>,
}

/// RGBA float readback of a texture, rows bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturePixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[f32; 4]>,
}

impl TexturePixels {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl Filter {
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Filter::Nearest | Filter::Linear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wrap {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swizzle {
    Red,
    Green,
    Blue,
    Alpha,
    Zero,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexParam {
    MinFilter(Filter),
    MagFilter(Filter),
    WrapS(Wrap),
    WrapT(Wrap),
    WrapR(Wrap),
    Swizzle([Swizzle; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderbufferFormat {
    Depth16,
    Depth24Stencil8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceInterface {
    Uniform,
    Input,
    Output,
}

/// GLSL types reported by program reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Bool,
    Mat3,
    Mat4,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Other(u32),
}

impl GlslType {
    pub fn from_glsl(name: &str) -> Option<Self> {
        let ty = match name {
            "float" => GlslType::Float,
            "vec2" => GlslType::Vec2,
            "vec3" => GlslType::Vec3,
            "vec4" => GlslType::Vec4,
            "int" => GlslType::Int,
            "ivec2" => GlslType::IVec2,
            "ivec3" => GlslType::IVec3,
            "ivec4" => GlslType::IVec4,
            "bool" => GlslType::Bool,
            "mat3" => GlslType::Mat3,
            "mat4" => GlslType::Mat4,
            "sampler2D" => GlslType::Sampler2D,
            "sampler3D" => GlslType::Sampler3D,
            "samplerCube" => GlslType::SamplerCube,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            GlslType::Sampler2D | GlslType::Sampler3D | GlslType::SamplerCube
        )
    }
}

/// One active uniform, input or output of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveResource {
    pub name: String,
    pub location: i32,
    pub ty: GlslType,
    pub array_size: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<[f32; 3]>),
}

impl UniformValue {
    /// Whether this value can be uploaded to a uniform declared with `ty`.
    pub fn fits(&self, ty: GlslType) -> bool {
        match self {
            UniformValue::Int(_) => matches!(ty, GlslType::Int | GlslType::Bool) || ty.is_sampler(),
            UniformValue::Float(_) | UniformValue::FloatArray(_) => ty == GlslType::Float,
            UniformValue::Vec2(_) => ty == GlslType::Vec2,
            UniformValue::Vec3(_) | UniformValue::Vec3Array(_) => ty == GlslType::Vec3,
            UniformValue::Vec4(_) => ty == GlslType::Vec4,
        }
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Blend,
    CullFace,
    DepthTest,
    ScissorTest,
    StencilTest,
    FramebufferSrgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearMask {
    pub const NONE: ClearMask = ClearMask {
        color: false,
        depth: false,
        stencil: false,
    };
    pub const COLOR_DEPTH: ClearMask = ClearMask {
        color: true,
        depth: true,
        stencil: false,
    };

    pub fn is_empty(self) -> bool {
        !(self.color || self.depth || self.stencil)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

/// The subset of an immediate-mode graphics API the renderer relies on.
///
/// Implementations must only be used from the thread that owns the
/// underlying context.
pub trait Gl {
    fn gen_objects(&self, kind: ObjectKind, count: usize) -> GlResult<Vec<Handle>>;
    fn delete_objects(&self, kind: ObjectKind, handles: &[Handle]) -> GlResult<()>;
    fn create_textures(&self, target: TextureTarget, count: usize) -> GlResult<Vec<Handle>>;
    fn create_queries(&self, target: QueryTarget, count: usize) -> GlResult<Vec<Handle>>;
    fn create_program(&self) -> GlResult<Handle>;
    fn delete_program(&self, program: Handle) -> GlResult<()>;
    fn create_shader(&self, stage: ShaderStage) -> GlResult<Handle>;
    fn delete_shader(&self, shader: Handle) -> GlResult<()>;

    fn bind(&self, point: BindPoint, handle: Handle) -> GlResult<()>;
    /// Object currently bound at `point`, zero if none.
    fn binding(&self, point: BindPoint) -> GlResult<Handle>;

    fn tex_image_2d(&self, texture: Handle, image: &TexImage<'_>) -> GlResult<()>;
    fn tex_parameter(&self, texture: Handle, param: TexParam) -> GlResult<()>;
    fn sampler_parameter(&self, sampler: Handle, param: TexParam) -> GlResult<()>;
    fn generate_mipmap(&self, texture: Handle) -> GlResult<()>;
    fn texture_size(&self, texture: Handle) -> GlResult<(u32, u32)>;
    fn clear_tex_image(&self, texture: Handle, color: [f32; 4]) -> GlResult<()>;
    fn read_tex_image(&self, texture: Handle) -> GlResult<TexturePixels>;

    fn framebuffer_texture(
        &self,
        framebuffer: Handle,
        attachment: Attachment,
        texture: Handle,
    ) -> GlResult<()>;
    fn framebuffer_renderbuffer(
        &self,
        framebuffer: Handle,
        attachment: Attachment,
        renderbuffer: Handle,
    ) -> GlResult<()>;
    fn check_framebuffer_status(&self, framebuffer: Handle) -> GlResult<()>;
    /// Selects which color attachments fragment outputs are written to.
    fn draw_buffers(&self, framebuffer: Handle, attachments: &[u32]) -> GlResult<()>;
    fn renderbuffer_storage(
        &self,
        renderbuffer: Handle,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> GlResult<()>;

    fn shader_source(&self, shader: Handle, sources: &[&str]) -> GlResult<()>;
    fn compile_shader(&self, shader: Handle) -> GlResult<()>;
    fn shader_compile_status(&self, shader: Handle) -> GlResult<bool>;
    fn shader_info_log(&self, shader: Handle) -> GlResult<String>;
    fn attach_shader(&self, program: Handle, shader: Handle) -> GlResult<()>;
    fn detach_shader(&self, program: Handle, shader: Handle) -> GlResult<()>;
    fn link_program(&self, program: Handle) -> GlResult<()>;
    fn program_link_status(&self, program: Handle) -> GlResult<bool>;
    fn validate_program(&self, program: Handle) -> GlResult<()>;
    fn program_validate_status(&self, program: Handle) -> GlResult<bool>;
    fn program_info_log(&self, program: Handle) -> GlResult<String>;
    fn active_resources(
        &self,
        program: Handle,
        interface: ResourceInterface,
    ) -> GlResult<Vec<ActiveResource>>;
    fn program_uniform(&self, program: Handle, location: i32, value: &UniformValue)
        -> GlResult<()>;

    fn begin_query(&self, target: QueryTarget, query: Handle) -> GlResult<()>;
    fn end_query(&self, target: QueryTarget) -> GlResult<()>;
    /// Query result in the query's native unit (nanoseconds for `TimeElapsed`).
    fn query_result(&self, query: Handle) -> GlResult<u64>;

    fn viewport(&self, viewport: Viewport) -> GlResult<()>;
    fn current_viewport(&self) -> GlResult<Viewport>;
    fn set_capability(&self, capability: Capability, enabled: bool) -> GlResult<()>;
    fn clear_color(&self, color: [f32; 4]) -> GlResult<()>;
    fn clear(&self, mask: ClearMask) -> GlResult<()>;
    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) -> GlResult<()>;
    fn blend_equation(&self, equation: BlendEquation) -> GlResult<()>;
    fn draw_arrays(&self, mode: DrawMode, first: i32, count: i32) -> GlResult<()>;
}
