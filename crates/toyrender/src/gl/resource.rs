//! Move-only ownership of graphics objects.
//!
//! A [`Resource<K>`] owns at most one handle of kind `K`. The kind decides
//! which [`Allocator`] strategy creates and destroys the handle and which
//! [`ResourceType`] tag is reported when the resource is used while null.
//! The backend is injected at construction, so the same code runs against a
//! live context or the headless backend.
//!
//! Types:
//!
//! - `Allocator` is the create/destroy strategy; `SingleAllocator` is a plain
//!   pair of functions, `MultiAllocator` goes through batch creation, and
//!   `ShaderAllocator`/`TextureAllocator`/`QueryAllocator` take the extra
//!   parameter their creation call needs.
//! - `ResourceKind` binds a kind to its strategy and null-error tag.
//! - `Buffer`, `Framebuffer`, `Program`, `Query`, `Renderbuffer`, `Sampler`,
//!   `Shader`, `Texture` and `VertexArray` are the concrete aliases.
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{NullResourceError, ResourceType, Result, ShaderError};
use crate::gl::{
    ActiveResource, Attachment, Gl, GlResult, Handle, ObjectKind, QueryTarget,
    RenderbufferFormat, ResourceInterface, ShaderStage, TexImage, TexParam, TexturePixels,
    TextureTarget, UniformValue,
};

/// Creation and destruction strategy for one kind of object.
pub trait Allocator {
    type Params: Copy;

    fn create(&self, gl: &dyn Gl, params: Self::Params) -> GlResult<Handle>;
    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()>;
}

/// Creates and destroys one object per call through a pair of functions.
#[derive(Clone, Copy)]
pub struct SingleAllocator {
    create: fn(&dyn Gl) -> GlResult<Handle>,
    destroy: fn(&dyn Gl, Handle) -> GlResult<()>,
}

impl SingleAllocator {
    pub const fn new(
        create: fn(&dyn Gl) -> GlResult<Handle>,
        destroy: fn(&dyn Gl, Handle) -> GlResult<()>,
    ) -> Self {
        Self { create, destroy }
    }
}

impl Allocator for SingleAllocator {
    type Params = ();

    fn create(&self, gl: &dyn Gl, _params: ()) -> GlResult<Handle> {
        (self.create)(gl)
    }

    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()> {
        (self.destroy)(gl, handle)
    }
}

/// Goes through the batch `gen_objects`/`delete_objects` calls with a count of one.
#[derive(Clone, Copy)]
pub struct MultiAllocator {
    kind: ObjectKind,
}

impl MultiAllocator {
    pub const fn new(kind: ObjectKind) -> Self {
        Self { kind }
    }
}

impl Allocator for MultiAllocator {
    type Params = ();

    fn create(&self, gl: &dyn Gl, _params: ()) -> GlResult<Handle> {
        Ok(first_handle(gl.gen_objects(self.kind, 1)?))
    }

    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()> {
        gl.delete_objects(self.kind, &[handle])
    }
}

#[derive(Clone, Copy)]
pub struct ShaderAllocator;

impl Allocator for ShaderAllocator {
    type Params = ShaderStage;

    fn create(&self, gl: &dyn Gl, stage: ShaderStage) -> GlResult<Handle> {
        gl.create_shader(stage)
    }

    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()> {
        gl.delete_shader(handle)
    }
}

#[derive(Clone, Copy)]
pub struct TextureAllocator;

impl Allocator for TextureAllocator {
    type Params = TextureTarget;

    fn create(&self, gl: &dyn Gl, target: TextureTarget) -> GlResult<Handle> {
        Ok(first_handle(gl.create_textures(target, 1)?))
    }

    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()> {
        gl.delete_objects(ObjectKind::Texture, &[handle])
    }
}

#[derive(Clone, Copy)]
pub struct QueryAllocator;

impl Allocator for QueryAllocator {
    type Params = QueryTarget;

    fn create(&self, gl: &dyn Gl, target: QueryTarget) -> GlResult<Handle> {
        Ok(first_handle(gl.create_queries(target, 1)?))
    }

    fn destroy(&self, gl: &dyn Gl, handle: Handle) -> GlResult<()> {
        gl.delete_objects(ObjectKind::Query, &[handle])
    }
}

fn first_handle(handles: Vec<Handle>) -> Handle {
    handles.into_iter().next().unwrap_or(0)
}

/// Associates a resource kind with its allocation strategy and null-error tag.
pub trait ResourceKind: 'static {
    const TYPE: ResourceType;
    type Allocator: Allocator;

    fn allocator() -> Self::Allocator;
}

macro_rules! resource_kind {
    ($(#[$meta:meta])* $kind:ident, $alias:ident, $ty:ident, $alloc:ty, $make:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub enum $kind {}

        impl ResourceKind for $kind {
            const TYPE: ResourceType = ResourceType::$ty;
            type Allocator = $alloc;

            fn allocator() -> Self::Allocator {
                $make
            }
        }

        pub type $alias = Resource<$kind>;
    };
}

resource_kind!(BufferKind, Buffer, Buffer, MultiAllocator, MultiAllocator::new(ObjectKind::Buffer));
resource_kind!(
    FramebufferKind,
    Framebuffer,
    Framebuffer,
    MultiAllocator,
    MultiAllocator::new(ObjectKind::Framebuffer)
);
resource_kind!(
    ProgramKind,
    Program,
    Program,
    SingleAllocator,
    SingleAllocator::new(|gl| gl.create_program(), |gl, handle| gl.delete_program(handle))
);
resource_kind!(QueryKind, Query, Query, QueryAllocator, QueryAllocator);
resource_kind!(
    RenderbufferKind,
    Renderbuffer,
    Renderbuffer,
    MultiAllocator,
    MultiAllocator::new(ObjectKind::Renderbuffer)
);
resource_kind!(SamplerKind, Sampler, Sampler, MultiAllocator, MultiAllocator::new(ObjectKind::Sampler));
resource_kind!(ShaderKind, Shader, Shader, ShaderAllocator, ShaderAllocator);
resource_kind!(TextureKind, Texture, Texture, TextureAllocator, TextureAllocator);
resource_kind!(
    VertexArrayKind,
    VertexArray,
    VertexArray,
    MultiAllocator,
    MultiAllocator::new(ObjectKind::VertexArray)
);

type Params<K> = <<K as ResourceKind>::Allocator as Allocator>::Params;

/// Exclusive owner of one graphics object, or of nothing.
pub struct Resource<K: ResourceKind> {
    gl: Rc<dyn Gl>,
    handle: Handle,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> Resource<K> {
    /// A resource that owns nothing yet.
    pub fn null(gl: &Rc<dyn Gl>) -> Self {
        Self {
            gl: Rc::clone(gl),
            handle: 0,
            _kind: PhantomData,
        }
    }

    /// Creates a resource and immediately acquires a handle for it.
    pub fn new(gl: &Rc<dyn Gl>, params: Params<K>) -> Result<Self> {
        let mut resource = Self::null(gl);
        resource.acquire(params)?;
        Ok(resource)
    }

    /// Obtains a fresh handle, releasing the current one first.
    pub fn acquire(&mut self, params: Params<K>) -> Result<()> {
        self.release()?;
        let handle = K::allocator().create(self.gl.as_ref(), params)?;
        if handle == 0 {
            return Err(NullResourceError::new(K::TYPE).into());
        }
        tracing::trace!(kind = %K::TYPE, handle, "acquired graphics object");
        self.handle = handle;
        Ok(())
    }

    /// Destroys the owned handle, if any. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<()> {
        let handle = std::mem::replace(&mut self.handle, 0);
        if handle != 0 {
            tracing::trace!(kind = %K::TYPE, handle, "releasing graphics object");
            K::allocator().destroy(self.gl.as_ref(), handle)?;
        }
        Ok(())
    }

    /// The owned handle, or the kind's null error.
    pub fn id(&self) -> Result<Handle, NullResourceError> {
        if self.handle == 0 {
            Err(NullResourceError::new(K::TYPE))
        } else {
            Ok(self.handle)
        }
    }

    pub fn is_null(&self) -> bool {
        self.handle == 0
    }

    /// Moves ownership out, leaving `self` null.
    pub fn take(&mut self) -> Self {
        Self {
            gl: Rc::clone(&self.gl),
            handle: std::mem::replace(&mut self.handle, 0),
            _kind: PhantomData,
        }
    }

    pub fn gl(&self) -> &Rc<dyn Gl> {
        &self.gl
    }
}

impl<K: ResourceKind> Drop for Resource<K> {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            tracing::warn!(kind = %K::TYPE, error = %error, "failed to release graphics object");
        }
    }
}

impl<K: ResourceKind> fmt::Debug for Resource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &K::TYPE)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Texture {
    pub fn image_2d(&self, image: &TexImage<'_>) -> Result<()> {
        Ok(self.gl.tex_image_2d(self.id()?, image)?)
    }

    pub fn parameter(&self, param: TexParam) -> Result<()> {
        Ok(self.gl.tex_parameter(self.id()?, param)?)
    }

    pub fn generate_mipmap(&self) -> Result<()> {
        Ok(self.gl.generate_mipmap(self.id()?)?)
    }

    pub fn size(&self) -> Result<(u32, u32)> {
        Ok(self.gl.texture_size(self.id()?)?)
    }

    pub fn clear(&self, color: [f32; 4]) -> Result<()> {
        Ok(self.gl.clear_tex_image(self.id()?, color)?)
    }

    pub fn read_pixels(&self) -> Result<TexturePixels> {
        Ok(self.gl.read_tex_image(self.id()?)?)
    }
}

impl Sampler {
    pub fn parameter(&self, param: TexParam) -> Result<()> {
        Ok(self.gl.sampler_parameter(self.id()?, param)?)
    }
}

impl Framebuffer {
    pub fn attach_texture(&self, attachment: Attachment, texture: &Texture) -> Result<()> {
        Ok(self
            .gl
            .framebuffer_texture(self.id()?, attachment, texture.id()?)?)
    }

    /// Clears whatever texture is attached at `attachment`.
    pub fn detach(&self, attachment: Attachment) -> Result<()> {
        Ok(self.gl.framebuffer_texture(self.id()?, attachment, 0)?)
    }

    pub fn attach_renderbuffer(
        &self,
        attachment: Attachment,
        renderbuffer: &Renderbuffer,
    ) -> Result<()> {
        Ok(self
            .gl
            .framebuffer_renderbuffer(self.id()?, attachment, renderbuffer.id()?)?)
    }

    pub fn check_status(&self) -> Result<()> {
        Ok(self.gl.check_framebuffer_status(self.id()?)?)
    }

    /// Routes fragment outputs to the listed color attachments.
    pub fn draw_buffers(&self, attachments: &[u32]) -> Result<()> {
        Ok(self.gl.draw_buffers(self.id()?, attachments)?)
    }
}

impl Renderbuffer {
    pub fn storage(&self, format: RenderbufferFormat, width: u32, height: u32) -> Result<()> {
        Ok(self
            .gl
            .renderbuffer_storage(self.id()?, format, width, height)?)
    }
}

impl Shader {
    pub fn source(&self, sources: &[&str]) -> Result<()> {
        Ok(self.gl.shader_source(self.id()?, sources)?)
    }

    /// Compiles the shader and reports the compile status.
    pub fn compile(&self) -> Result<bool> {
        let id = self.id()?;
        self.gl.compile_shader(id)?;
        Ok(self.gl.shader_compile_status(id)?)
    }

    pub fn info_log(&self) -> Result<String> {
        Ok(self.gl.shader_info_log(self.id()?)?)
    }
}

impl Program {
    pub fn attach(&self, shader: &Shader) -> Result<()> {
        Ok(self.gl.attach_shader(self.id()?, shader.id()?)?)
    }

    pub fn detach(&self, shader: &Shader) -> Result<()> {
        Ok(self.gl.detach_shader(self.id()?, shader.id()?)?)
    }

    pub fn link(&self) -> Result<()> {
        let id = self.id()?;
        self.gl.link_program(id)?;
        if self.gl.program_link_status(id)? {
            Ok(())
        } else {
            let log = self.gl.program_info_log(id)?;
            Err(ShaderError::Link { log }.into())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let id = self.id()?;
        self.gl.validate_program(id)?;
        if self.gl.program_validate_status(id)? {
            Ok(())
        } else {
            let log = self.gl.program_info_log(id)?;
            Err(ShaderError::Validate { log }.into())
        }
    }

    pub fn info_log(&self) -> Result<String> {
        Ok(self.gl.program_info_log(self.id()?)?)
    }

    pub fn resources(&self, interface: ResourceInterface) -> Result<Vec<ActiveResource>> {
        Ok(self.gl.active_resources(self.id()?, interface)?)
    }

    pub fn set_uniform(&self, location: i32, value: &UniformValue) -> Result<()> {
        Ok(self.gl.program_uniform(self.id()?, location, value)?)
    }
}

impl Query {
    pub fn begin(&self, target: QueryTarget) -> Result<()> {
        Ok(self.gl.begin_query(target, self.id()?)?)
    }

    pub fn end(&self, target: QueryTarget) -> Result<()> {
        self.id()?;
        Ok(self.gl.end_query(target)?)
    }

    pub fn result(&self) -> Result<u64> {
        Ok(self.gl.query_result(self.id()?)?)
    }
}
