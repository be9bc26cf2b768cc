//! [`Gl`] over a live OpenGL 3.3+ context through `glow`.
//!
//! glow exposes the bind-to-edit API, so object edits bind the object
//! temporarily and put the previous binding back. Every entry point checks
//! `glGetError` afterwards. Fragment output reflection is not available
//! through glow and reports no outputs; program validation reports the link
//! status.
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU32;

use glow::HasContext;

use crate::error::ApiError;
use crate::gl::{
    ActiveResource, Attachment, BindPoint, BlendEquation, BlendFactor, BufferTarget, Capability,
    ClearMask, DrawMode, Filter, FramebufferTarget, Gl, GlResult, GlslType, Handle, ObjectKind,
    PixelChannels, QueryTarget, RenderbufferFormat, ResourceInterface, ShaderStage, Swizzle,
    TexData, TexImage, TexParam, TexturePixels, TextureFormat, TextureTarget, UniformValue,
    Viewport, Wrap,
};

const CONTEXT_LOST: u32 = 0x0507;

#[derive(Debug, Clone, Copy)]
struct TextureInfo {
    target: TextureTarget,
    width: u32,
    height: u32,
}

/// OpenGL backend. Must only be used while its context is current.
pub struct GlowGl {
    gl: glow::Context,
    textures: RefCell<HashMap<Handle, TextureInfo>>,
}

fn nz(handle: Handle) -> Option<NonZeroU32> {
    NonZeroU32::new(handle)
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2d => glow::TEXTURE_2D,
        TextureTarget::Texture3d => glow::TEXTURE_3D,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
    }
}

fn texture_binding_query(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2d => glow::TEXTURE_BINDING_2D,
        TextureTarget::Texture3d => glow::TEXTURE_BINDING_3D,
        TextureTarget::CubeMap => glow::TEXTURE_BINDING_CUBE_MAP,
    }
}

fn buffer_target(target: BufferTarget) -> (u32, u32) {
    match target {
        BufferTarget::Array => (glow::ARRAY_BUFFER, glow::ARRAY_BUFFER_BINDING),
        BufferTarget::ElementArray => (
            glow::ELEMENT_ARRAY_BUFFER,
            glow::ELEMENT_ARRAY_BUFFER_BINDING,
        ),
        BufferTarget::Uniform => (glow::UNIFORM_BUFFER, glow::UNIFORM_BUFFER_BINDING),
    }
}

fn framebuffer_target(target: FramebufferTarget) -> (u32, u32) {
    match target {
        FramebufferTarget::Draw => (glow::DRAW_FRAMEBUFFER, glow::DRAW_FRAMEBUFFER_BINDING),
        FramebufferTarget::Read => (glow::READ_FRAMEBUFFER, glow::READ_FRAMEBUFFER_BINDING),
    }
}

/// Internal format, client format and client type for allocation.
fn storage_format(format: TextureFormat) -> (u32, u32, u32) {
    match format {
        TextureFormat::R8 => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        TextureFormat::Rg8 => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        TextureFormat::Rgb8 => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
        TextureFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::R32f => (glow::R32F, glow::RED, glow::FLOAT),
        TextureFormat::Rgba16f => (glow::RGBA16F, glow::RGBA, glow::FLOAT),
        TextureFormat::Rgba32f => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
    }
}

fn client_channels(channels: PixelChannels) -> u32 {
    match channels {
        PixelChannels::Red => glow::RED,
        PixelChannels::Rg => glow::RG,
        PixelChannels::Rgb => glow::RGB,
        PixelChannels::Rgba => glow::RGBA,
    }
}

fn filter(filter: Filter) -> i32 {
    (match filter {
        Filter::Nearest => glow::NEAREST,
        Filter::Linear => glow::LINEAR,
        Filter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        Filter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        Filter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        Filter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap(wrap: Wrap) -> i32 {
    (match wrap {
        Wrap::Repeat => glow::REPEAT,
        Wrap::MirroredRepeat => glow::MIRRORED_REPEAT,
        Wrap::ClampToEdge => glow::CLAMP_TO_EDGE,
    }) as i32
}

fn swizzle(swizzle: Swizzle) -> i32 {
    (match swizzle {
        Swizzle::Red => glow::RED,
        Swizzle::Green => glow::GREEN,
        Swizzle::Blue => glow::BLUE,
        Swizzle::Alpha => glow::ALPHA,
        Swizzle::Zero => glow::ZERO,
        Swizzle::One => glow::ONE,
    }) as i32
}

/// Parameter name/value pairs for one `TexParam`.
fn tex_param_values(param: TexParam) -> Vec<(u32, i32)> {
    match param {
        TexParam::MinFilter(value) => vec![(glow::TEXTURE_MIN_FILTER, filter(value))],
        TexParam::MagFilter(value) => vec![(glow::TEXTURE_MAG_FILTER, filter(value))],
        TexParam::WrapS(value) => vec![(glow::TEXTURE_WRAP_S, wrap(value))],
        TexParam::WrapT(value) => vec![(glow::TEXTURE_WRAP_T, wrap(value))],
        TexParam::WrapR(value) => vec![(glow::TEXTURE_WRAP_R, wrap(value))],
        TexParam::Swizzle([r, g, b, a]) => vec![
            (glow::TEXTURE_SWIZZLE_R, swizzle(r)),
            (glow::TEXTURE_SWIZZLE_G, swizzle(g)),
            (glow::TEXTURE_SWIZZLE_B, swizzle(b)),
            (glow::TEXTURE_SWIZZLE_A, swizzle(a)),
        ],
    }
}

fn attachment(attachment: Attachment) -> u32 {
    match attachment {
        Attachment::Color(index) => glow::COLOR_ATTACHMENT0 + index,
        Attachment::Depth => glow::DEPTH_ATTACHMENT,
    }
}

fn capability(capability: Capability) -> u32 {
    match capability {
        Capability::Blend => glow::BLEND,
        Capability::CullFace => glow::CULL_FACE,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::ScissorTest => glow::SCISSOR_TEST,
        Capability::StencilTest => glow::STENCIL_TEST,
        Capability::FramebufferSrgb => glow::FRAMEBUFFER_SRGB,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn glsl_type(ty: u32) -> GlslType {
    match ty {
        glow::FLOAT => GlslType::Float,
        glow::FLOAT_VEC2 => GlslType::Vec2,
        glow::FLOAT_VEC3 => GlslType::Vec3,
        glow::FLOAT_VEC4 => GlslType::Vec4,
        glow::INT => GlslType::Int,
        glow::INT_VEC2 => GlslType::IVec2,
        glow::INT_VEC3 => GlslType::IVec3,
        glow::INT_VEC4 => GlslType::IVec4,
        glow::BOOL => GlslType::Bool,
        glow::FLOAT_MAT3 => GlslType::Mat3,
        glow::FLOAT_MAT4 => GlslType::Mat4,
        glow::SAMPLER_2D => GlslType::Sampler2D,
        glow::SAMPLER_3D => GlslType::Sampler3D,
        glow::SAMPLER_CUBE => GlslType::SamplerCube,
        other => GlslType::Other(other),
    }
}

impl GlowGl {
    /// Wraps a context that is current on the calling thread.
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            textures: RefCell::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn check(&self, operation: &'static str) -> GlResult<()> {
        // SAFETY: the context is current for the lifetime of `self`.
        let code = unsafe { self.gl.get_error() };
        match code {
            glow::NO_ERROR => Ok(()),
            glow::OUT_OF_MEMORY => Err(ApiError::OutOfMemory(operation)),
            CONTEXT_LOST => Err(ApiError::ContextLost),
            code => Err(ApiError::Call { operation, code }),
        }
    }

    fn created<T>(&self, operation: &'static str, created: Result<T, String>) -> GlResult<T> {
        match created {
            Ok(object) => Ok(object),
            Err(message) => {
                self.check(operation)?;
                tracing::warn!(operation, %message, "object creation failed");
                Err(ApiError::Call { operation, code: 0 })
            }
        }
    }

    fn integer(&self, pname: u32) -> i32 {
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.get_parameter_i32(pname) }
    }

    fn texture_info(&self, texture: Handle, operation: &'static str) -> GlResult<TextureInfo> {
        self.textures
            .borrow()
            .get(&texture)
            .copied()
            .ok_or(ApiError::Call {
                operation,
                code: glow::INVALID_VALUE,
            })
    }

    /// Runs `edit` with `texture` bound on the active unit.
    fn with_texture<T>(
        &self,
        texture: Handle,
        operation: &'static str,
        edit: impl FnOnce(u32) -> T,
    ) -> GlResult<T> {
        let info = self.texture_info(texture, operation)?;
        let target = texture_target(info.target);
        let previous = self.integer(texture_binding_query(info.target)) as u32;
        // SAFETY: the context is current for the lifetime of `self`.
        let result = unsafe {
            self.gl
                .bind_texture(target, nz(texture).map(glow::NativeTexture));
            let result = edit(target);
            self.gl
                .bind_texture(target, nz(previous).map(glow::NativeTexture));
            result
        };
        self.check(operation)?;
        Ok(result)
    }

    /// Runs `edit` with `framebuffer` bound as the draw framebuffer.
    fn with_framebuffer<T>(
        &self,
        framebuffer: Handle,
        operation: &'static str,
        edit: impl FnOnce() -> T,
    ) -> GlResult<T> {
        let previous = self.integer(glow::DRAW_FRAMEBUFFER_BINDING) as u32;
        // SAFETY: the context is current for the lifetime of `self`.
        let result = unsafe {
            self.gl.bind_framebuffer(
                glow::DRAW_FRAMEBUFFER,
                nz(framebuffer).map(glow::NativeFramebuffer),
            );
            let result = edit();
            self.gl.bind_framebuffer(
                glow::DRAW_FRAMEBUFFER,
                nz(previous).map(glow::NativeFramebuffer),
            );
            result
        };
        self.check(operation)?;
        Ok(result)
    }

    /// Runs `edit` with `texture` attached to a scratch framebuffer bound
    /// to both draw and read targets.
    fn with_scratch_target<T>(
        &self,
        texture: Handle,
        operation: &'static str,
        edit: impl FnOnce() -> T,
    ) -> GlResult<T> {
        let info = self.texture_info(texture, operation)?;
        // SAFETY: the context is current for the lifetime of `self`.
        let scratch = self.created(operation, unsafe { self.gl.create_framebuffer() })?;
        let previous_draw = self.integer(glow::DRAW_FRAMEBUFFER_BINDING) as u32;
        let previous_read = self.integer(glow::READ_FRAMEBUFFER_BINDING) as u32;
        // SAFETY: as above; the scratch framebuffer is deleted before returning.
        let result = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(scratch));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                texture_target(info.target),
                nz(texture).map(glow::NativeTexture),
                0,
            );
            let result = edit();
            self.gl.bind_framebuffer(
                glow::DRAW_FRAMEBUFFER,
                nz(previous_draw).map(glow::NativeFramebuffer),
            );
            self.gl.bind_framebuffer(
                glow::READ_FRAMEBUFFER,
                nz(previous_read).map(glow::NativeFramebuffer),
            );
            self.gl.delete_framebuffer(scratch);
            result
        };
        self.check(operation)?;
        Ok(result)
    }

    fn with_program<T>(
        &self,
        program: Handle,
        operation: &'static str,
        edit: impl FnOnce() -> T,
    ) -> GlResult<T> {
        let previous = self.integer(glow::CURRENT_PROGRAM) as u32;
        // SAFETY: the context is current for the lifetime of `self`.
        let result = unsafe {
            self.gl.use_program(nz(program).map(glow::NativeProgram));
            let result = edit();
            self.gl.use_program(nz(previous).map(glow::NativeProgram));
            result
        };
        self.check(operation)?;
        Ok(result)
    }
}

impl Gl for GlowGl {
    fn gen_objects(&self, kind: ObjectKind, count: usize) -> GlResult<Vec<Handle>> {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            // SAFETY: the context is current for the lifetime of `self`.
            let handle = unsafe {
                match kind {
                    ObjectKind::Buffer => self
                        .created("gen_objects", self.gl.create_buffer())?
                        .0
                        .get(),
                    ObjectKind::Framebuffer => self
                        .created("gen_objects", self.gl.create_framebuffer())?
                        .0
                        .get(),
                    ObjectKind::Query => self
                        .created("gen_objects", self.gl.create_query())?
                        .0
                        .get(),
                    ObjectKind::Renderbuffer => self
                        .created("gen_objects", self.gl.create_renderbuffer())?
                        .0
                        .get(),
                    ObjectKind::Sampler => self
                        .created("gen_objects", self.gl.create_sampler())?
                        .0
                        .get(),
                    ObjectKind::Texture => {
                        return self.create_textures(TextureTarget::Texture2d, count)
                    }
                    ObjectKind::VertexArray => self
                        .created("gen_objects", self.gl.create_vertex_array())?
                        .0
                        .get(),
                }
            };
            handles.push(handle);
        }
        self.check("gen_objects")?;
        Ok(handles)
    }

    fn delete_objects(&self, kind: ObjectKind, handles: &[Handle]) -> GlResult<()> {
        for &handle in handles {
            let Some(name) = nz(handle) else {
                continue;
            };
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe {
                match kind {
                    ObjectKind::Buffer => self.gl.delete_buffer(glow::NativeBuffer(name)),
                    ObjectKind::Framebuffer => {
                        self.gl.delete_framebuffer(glow::NativeFramebuffer(name))
                    }
                    ObjectKind::Query => self.gl.delete_query(glow::NativeQuery(name)),
                    ObjectKind::Renderbuffer => {
                        self.gl.delete_renderbuffer(glow::NativeRenderbuffer(name))
                    }
                    ObjectKind::Sampler => self.gl.delete_sampler(glow::NativeSampler(name)),
                    ObjectKind::Texture => {
                        self.textures.borrow_mut().remove(&handle);
                        self.gl.delete_texture(glow::NativeTexture(name))
                    }
                    ObjectKind::VertexArray => {
                        self.gl.delete_vertex_array(glow::NativeVertexArray(name))
                    }
                }
            }
        }
        self.check("delete_objects")
    }

    fn create_textures(&self, target: TextureTarget, count: usize) -> GlResult<Vec<Handle>> {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            // SAFETY: the context is current for the lifetime of `self`.
            let texture = self.created("create_textures", unsafe { self.gl.create_texture() })?;
            let handle = texture.0.get();
            self.textures.borrow_mut().insert(
                handle,
                TextureInfo {
                    target,
                    width: 0,
                    height: 0,
                },
            );
            handles.push(handle);
        }
        self.check("create_textures")?;
        Ok(handles)
    }

    fn create_queries(&self, _target: QueryTarget, count: usize) -> GlResult<Vec<Handle>> {
        self.gen_objects(ObjectKind::Query, count)
    }

    fn create_program(&self) -> GlResult<Handle> {
        // SAFETY: the context is current for the lifetime of `self`.
        let program = self.created("create_program", unsafe { self.gl.create_program() })?;
        Ok(program.0.get())
    }

    fn delete_program(&self, program: Handle) -> GlResult<()> {
        if let Some(name) = nz(program) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.delete_program(glow::NativeProgram(name)) };
        }
        self.check("delete_program")
    }

    fn create_shader(&self, stage: ShaderStage) -> GlResult<Handle> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        // SAFETY: the context is current for the lifetime of `self`.
        let shader = self.created("create_shader", unsafe { self.gl.create_shader(kind) })?;
        Ok(shader.0.get())
    }

    fn delete_shader(&self, shader: Handle) -> GlResult<()> {
        if let Some(name) = nz(shader) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.delete_shader(glow::NativeShader(name)) };
        }
        self.check("delete_shader")
    }

    fn bind(&self, point: BindPoint, handle: Handle) -> GlResult<()> {
        let name = nz(handle);
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            match point {
                BindPoint::Buffer(target) => self
                    .gl
                    .bind_buffer(buffer_target(target).0, name.map(glow::NativeBuffer)),
                BindPoint::Framebuffer(target) => self.gl.bind_framebuffer(
                    framebuffer_target(target).0,
                    name.map(glow::NativeFramebuffer),
                ),
                BindPoint::Renderbuffer => self
                    .gl
                    .bind_renderbuffer(glow::RENDERBUFFER, name.map(glow::NativeRenderbuffer)),
                BindPoint::Program => self.gl.use_program(name.map(glow::NativeProgram)),
                BindPoint::VertexArray => self
                    .gl
                    .bind_vertex_array(name.map(glow::NativeVertexArray)),
                BindPoint::Texture { unit, target } => {
                    self.gl.active_texture(glow::TEXTURE0 + unit);
                    self.gl
                        .bind_texture(texture_target(target), name.map(glow::NativeTexture));
                }
                BindPoint::Sampler { unit } => {
                    self.gl.bind_sampler(unit, name.map(glow::NativeSampler))
                }
            }
        }
        self.check("bind")
    }

    fn binding(&self, point: BindPoint) -> GlResult<Handle> {
        let handle = match point {
            BindPoint::Buffer(target) => self.integer(buffer_target(target).1),
            BindPoint::Framebuffer(target) => self.integer(framebuffer_target(target).1),
            BindPoint::Renderbuffer => self.integer(glow::RENDERBUFFER_BINDING),
            BindPoint::Program => self.integer(glow::CURRENT_PROGRAM),
            BindPoint::VertexArray => self.integer(glow::VERTEX_ARRAY_BINDING),
            BindPoint::Texture { unit, target } => {
                // SAFETY: the context is current for the lifetime of `self`.
                unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
                self.integer(texture_binding_query(target))
            }
            BindPoint::Sampler { unit } => {
                // SAFETY: the context is current for the lifetime of `self`.
                unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
                self.integer(glow::SAMPLER_BINDING)
            }
        };
        self.check("binding")?;
        Ok(handle as Handle)
    }

    fn tex_image_2d(&self, texture: Handle, image: &TexImage<'_>) -> GlResult<()> {
        let (internal, storage_channels, storage_type) = storage_format(image.format);
        let (channels, ty, bytes): (u32, u32, Option<&[u8]>) = match image.data {
            Some(TexData::U8(data)) => (
                client_channels(image.channels),
                glow::UNSIGNED_BYTE,
                Some(data),
            ),
            Some(TexData::F32(data)) => (
                client_channels(image.channels),
                glow::FLOAT,
                Some(bytemuck::cast_slice(data)),
            ),
            None => (storage_channels, storage_type, None),
        };
        self.with_texture(texture, "tex_image_2d", |target| {
            // SAFETY: `with_texture` runs with the context current.
            unsafe {
                self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                self.gl.tex_image_2d(
                    target,
                    0,
                    internal as i32,
                    image.width as i32,
                    image.height as i32,
                    0,
                    channels,
                    ty,
                    bytes,
                );
            }
        })?;
        if let Some(info) = self.textures.borrow_mut().get_mut(&texture) {
            info.width = image.width;
            info.height = image.height;
        }
        Ok(())
    }

    fn tex_parameter(&self, texture: Handle, param: TexParam) -> GlResult<()> {
        self.with_texture(texture, "tex_parameter", |target| {
            for (name, value) in tex_param_values(param) {
                // SAFETY: `with_texture` runs with the context current.
                unsafe { self.gl.tex_parameter_i32(target, name, value) };
            }
        })
    }

    fn sampler_parameter(&self, sampler: Handle, param: TexParam) -> GlResult<()> {
        let Some(name) = nz(sampler) else {
            return Err(ApiError::Call {
                operation: "sampler_parameter",
                code: glow::INVALID_VALUE,
            });
        };
        for (pname, value) in tex_param_values(param) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe {
                self.gl
                    .sampler_parameter_i32(glow::NativeSampler(name), pname, value)
            };
        }
        self.check("sampler_parameter")
    }

    fn generate_mipmap(&self, texture: Handle) -> GlResult<()> {
        self.with_texture(texture, "generate_mipmap", |target| {
            // SAFETY: `with_texture` runs with the context current.
            unsafe { self.gl.generate_mipmap(target) }
        })
    }

    fn texture_size(&self, texture: Handle) -> GlResult<(u32, u32)> {
        let info = self.texture_info(texture, "texture_size")?;
        Ok((info.width, info.height))
    }

    fn clear_tex_image(&self, texture: Handle, color: [f32; 4]) -> GlResult<()> {
        self.with_scratch_target(texture, "clear_tex_image", || {
            let [r, g, b, a] = color;
            // SAFETY: runs with the scratch framebuffer bound and the context current.
            unsafe {
                self.gl.clear_buffer_f32_slice(glow::COLOR, 0, &[r, g, b, a]);
            }
        })
    }

    fn read_tex_image(&self, texture: Handle) -> GlResult<TexturePixels> {
        let info = self.texture_info(texture, "read_tex_image")?;
        let mut data = vec![[0.0f32; 4]; (info.width * info.height) as usize];
        self.with_scratch_target(texture, "read_tex_image", || {
            // SAFETY: `data` holds width * height RGBA float texels.
            unsafe {
                self.gl.read_pixels(
                    0,
                    0,
                    info.width as i32,
                    info.height as i32,
                    glow::RGBA,
                    glow::FLOAT,
                    glow::PixelPackData::Slice(bytemuck::cast_slice_mut(&mut data)),
                );
            }
        })?;
        Ok(TexturePixels {
            width: info.width,
            height: info.height,
            data,
        })
    }

    fn framebuffer_texture(
        &self,
        framebuffer: Handle,
        attachment_point: Attachment,
        texture: Handle,
    ) -> GlResult<()> {
        let target = match nz(texture) {
            Some(_) => texture_target(self.texture_info(texture, "framebuffer_texture")?.target),
            None => glow::TEXTURE_2D,
        };
        self.with_framebuffer(framebuffer, "framebuffer_texture", || {
            // SAFETY: `with_framebuffer` runs with the context current.
            unsafe {
                self.gl.framebuffer_texture_2d(
                    glow::DRAW_FRAMEBUFFER,
                    attachment(attachment_point),
                    target,
                    nz(texture).map(glow::NativeTexture),
                    0,
                )
            }
        })
    }

    fn framebuffer_renderbuffer(
        &self,
        framebuffer: Handle,
        attachment_point: Attachment,
        renderbuffer: Handle,
    ) -> GlResult<()> {
        self.with_framebuffer(framebuffer, "framebuffer_renderbuffer", || {
            // SAFETY: `with_framebuffer` runs with the context current.
            unsafe {
                self.gl.framebuffer_renderbuffer(
                    glow::DRAW_FRAMEBUFFER,
                    attachment(attachment_point),
                    glow::RENDERBUFFER,
                    nz(renderbuffer).map(glow::NativeRenderbuffer),
                )
            }
        })
    }

    fn check_framebuffer_status(&self, framebuffer: Handle) -> GlResult<()> {
        let status = self.with_framebuffer(framebuffer, "check_framebuffer_status", || {
            // SAFETY: `with_framebuffer` runs with the context current.
            unsafe { self.gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER) }
        })?;
        if status == glow::FRAMEBUFFER_COMPLETE {
            Ok(())
        } else {
            Err(ApiError::IncompleteFramebuffer { status })
        }
    }

    fn draw_buffers(&self, framebuffer: Handle, attachments: &[u32]) -> GlResult<()> {
        let buffers: Vec<u32> = attachments
            .iter()
            .map(|index| glow::COLOR_ATTACHMENT0 + index)
            .collect();
        self.with_framebuffer(framebuffer, "draw_buffers", || {
            // SAFETY: `with_framebuffer` runs with the context current.
            unsafe { self.gl.draw_buffers(&buffers) }
        })
    }

    fn renderbuffer_storage(
        &self,
        renderbuffer: Handle,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> GlResult<()> {
        let internal = match format {
            RenderbufferFormat::Depth16 => glow::DEPTH_COMPONENT16,
            RenderbufferFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
        };
        let previous = self.integer(glow::RENDERBUFFER_BINDING) as u32;
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            self.gl.bind_renderbuffer(
                glow::RENDERBUFFER,
                nz(renderbuffer).map(glow::NativeRenderbuffer),
            );
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                internal,
                width as i32,
                height as i32,
            );
            self.gl.bind_renderbuffer(
                glow::RENDERBUFFER,
                nz(previous).map(glow::NativeRenderbuffer),
            );
        }
        self.check("renderbuffer_storage")
    }

    fn shader_source(&self, shader: Handle, sources: &[&str]) -> GlResult<()> {
        let Some(name) = nz(shader) else {
            return Err(ApiError::Call {
                operation: "shader_source",
                code: glow::INVALID_VALUE,
            });
        };
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            self.gl
                .shader_source(glow::NativeShader(name), &sources.concat())
        };
        self.check("shader_source")
    }

    fn compile_shader(&self, shader: Handle) -> GlResult<()> {
        if let Some(name) = nz(shader) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.compile_shader(glow::NativeShader(name)) };
        }
        self.check("compile_shader")
    }

    fn shader_compile_status(&self, shader: Handle) -> GlResult<bool> {
        Ok(nz(shader).is_some_and(|name| {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.get_shader_compile_status(glow::NativeShader(name)) }
        }))
    }

    fn shader_info_log(&self, shader: Handle) -> GlResult<String> {
        Ok(nz(shader)
            .map(|name| {
                // SAFETY: the context is current for the lifetime of `self`.
                unsafe { self.gl.get_shader_info_log(glow::NativeShader(name)) }
            })
            .unwrap_or_default())
    }

    fn attach_shader(&self, program: Handle, shader: Handle) -> GlResult<()> {
        if let (Some(program), Some(shader)) = (nz(program), nz(shader)) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe {
                self.gl
                    .attach_shader(glow::NativeProgram(program), glow::NativeShader(shader))
            };
        }
        self.check("attach_shader")
    }

    fn detach_shader(&self, program: Handle, shader: Handle) -> GlResult<()> {
        if let (Some(program), Some(shader)) = (nz(program), nz(shader)) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe {
                self.gl
                    .detach_shader(glow::NativeProgram(program), glow::NativeShader(shader))
            };
        }
        self.check("detach_shader")
    }

    fn link_program(&self, program: Handle) -> GlResult<()> {
        if let Some(name) = nz(program) {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.link_program(glow::NativeProgram(name)) };
        }
        self.check("link_program")
    }

    fn program_link_status(&self, program: Handle) -> GlResult<bool> {
        Ok(nz(program).is_some_and(|name| {
            // SAFETY: the context is current for the lifetime of `self`.
            unsafe { self.gl.get_program_link_status(glow::NativeProgram(name)) }
        }))
    }

    fn validate_program(&self, _program: Handle) -> GlResult<()> {
        self.check("validate_program")
    }

    fn program_validate_status(&self, program: Handle) -> GlResult<bool> {
        self.program_link_status(program)
    }

    fn program_info_log(&self, program: Handle) -> GlResult<String> {
        Ok(nz(program)
            .map(|name| {
                // SAFETY: the context is current for the lifetime of `self`.
                unsafe { self.gl.get_program_info_log(glow::NativeProgram(name)) }
            })
            .unwrap_or_default())
    }

    fn active_resources(
        &self,
        program: Handle,
        interface: ResourceInterface,
    ) -> GlResult<Vec<ActiveResource>> {
        let Some(name) = nz(program) else {
            return Ok(Vec::new());
        };
        let program = glow::NativeProgram(name);
        let mut resources = Vec::new();
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            match interface {
                ResourceInterface::Uniform => {
                    for index in 0..self.gl.get_active_uniforms(program) {
                        let Some(active) = self.gl.get_active_uniform(program, index) else {
                            continue;
                        };
                        let Some(location) = self.gl.get_uniform_location(program, &active.name)
                        else {
                            continue;
                        };
                        resources.push(ActiveResource {
                            name: active.name,
                            location: location.0 as i32,
                            ty: glsl_type(active.utype),
                            array_size: active.size,
                        });
                    }
                }
                ResourceInterface::Input => {
                    for index in 0..self.gl.get_active_attributes(program) {
                        let Some(active) = self.gl.get_active_attribute(program, index) else {
                            continue;
                        };
                        let Some(location) = self.gl.get_attrib_location(program, &active.name)
                        else {
                            continue;
                        };
                        resources.push(ActiveResource {
                            name: active.name,
                            location: location as i32,
                            ty: glsl_type(active.atype),
                            array_size: active.size,
                        });
                    }
                }
                ResourceInterface::Output => {}
            }
        }
        self.check("active_resources")?;
        Ok(resources)
    }

    fn program_uniform(
        &self,
        program: Handle,
        location: i32,
        value: &UniformValue,
    ) -> GlResult<()> {
        let location = glow::NativeUniformLocation(location as u32);
        self.with_program(program, "program_uniform", || {
            let location = Some(&location);
            // SAFETY: `with_program` runs with the context current.
            unsafe {
                match value {
                    UniformValue::Int(v) => self.gl.uniform_1_i32(location, *v),
                    UniformValue::Float(v) => self.gl.uniform_1_f32(location, *v),
                    UniformValue::Vec2([x, y]) => self.gl.uniform_2_f32(location, *x, *y),
                    UniformValue::Vec3([x, y, z]) => self.gl.uniform_3_f32(location, *x, *y, *z),
                    UniformValue::Vec4([x, y, z, w]) => {
                        self.gl.uniform_4_f32(location, *x, *y, *z, *w)
                    }
                    UniformValue::FloatArray(values) => {
                        self.gl.uniform_1_f32_slice(location, values)
                    }
                    UniformValue::Vec3Array(values) => self
                        .gl
                        .uniform_3_f32_slice(location, bytemuck::cast_slice(values)),
                }
            }
        })
    }

    fn begin_query(&self, target: QueryTarget, query: Handle) -> GlResult<()> {
        let Some(name) = nz(query) else {
            return Err(ApiError::Call {
                operation: "begin_query",
                code: glow::INVALID_OPERATION,
            });
        };
        let target = match target {
            QueryTarget::TimeElapsed => glow::TIME_ELAPSED,
            QueryTarget::SamplesPassed => glow::SAMPLES_PASSED,
        };
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.begin_query(target, glow::NativeQuery(name)) };
        self.check("begin_query")
    }

    fn end_query(&self, target: QueryTarget) -> GlResult<()> {
        let target = match target {
            QueryTarget::TimeElapsed => glow::TIME_ELAPSED,
            QueryTarget::SamplesPassed => glow::SAMPLES_PASSED,
        };
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.end_query(target) };
        self.check("end_query")
    }

    fn query_result(&self, query: Handle) -> GlResult<u64> {
        let Some(name) = nz(query) else {
            return Ok(0);
        };
        // SAFETY: the context is current for the lifetime of `self`.
        let result = unsafe {
            self.gl
                .get_query_parameter_u32(glow::NativeQuery(name), glow::QUERY_RESULT)
        };
        self.check("query_result")?;
        Ok(u64::from(result))
    }

    fn viewport(&self, viewport: Viewport) -> GlResult<()> {
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            self.gl.viewport(
                viewport.x,
                viewport.y,
                viewport.width as i32,
                viewport.height as i32,
            )
        };
        self.check("viewport")
    }

    fn current_viewport(&self) -> GlResult<Viewport> {
        let mut values = [0i32; 4];
        // SAFETY: VIEWPORT writes four integers.
        unsafe {
            self.gl
                .get_parameter_i32_slice(glow::VIEWPORT, &mut values)
        };
        self.check("current_viewport")?;
        Ok(Viewport {
            x: values[0],
            y: values[1],
            width: values[2].max(0) as u32,
            height: values[3].max(0) as u32,
        })
    }

    fn set_capability(&self, cap: Capability, enabled: bool) -> GlResult<()> {
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe {
            if enabled {
                self.gl.enable(capability(cap));
            } else {
                self.gl.disable(capability(cap));
            }
        }
        self.check("set_capability")
    }

    fn clear_color(&self, color: [f32; 4]) -> GlResult<()> {
        let [r, g, b, a] = color;
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.clear_color(r, g, b, a) };
        self.check("clear_color")
    }

    fn clear(&self, mask: ClearMask) -> GlResult<()> {
        let mut bits = 0;
        if mask.color {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.depth {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        if mask.stencil {
            bits |= glow::STENCIL_BUFFER_BIT;
        }
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.clear(bits) };
        self.check("clear")
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) -> GlResult<()> {
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) };
        self.check("blend_func")
    }

    fn blend_equation(&self, equation: BlendEquation) -> GlResult<()> {
        let mode = match equation {
            BlendEquation::Add => glow::FUNC_ADD,
            BlendEquation::Subtract => glow::FUNC_SUBTRACT,
            BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
            BlendEquation::Min => glow::MIN,
            BlendEquation::Max => glow::MAX,
        };
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.blend_equation(mode) };
        self.check("blend_equation")
    }

    fn draw_arrays(&self, mode: DrawMode, first: i32, count: i32) -> GlResult<()> {
        let mode = match mode {
            DrawMode::Points => glow::POINTS,
            DrawMode::Lines => glow::LINES,
            DrawMode::Triangles => glow::TRIANGLES,
            DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        };
        // SAFETY: the context is current for the lifetime of `self`.
        unsafe { self.gl.draw_arrays(mode, first, count) };
        self.check("draw_arrays")
    }
}
