//! Software implementation of [`Gl`] for tests and offscreen tooling.
//!
//! Object state lives in a `RefCell`, so the backend can be shared through
//! `Rc<dyn Gl>` like a real context. Shaders are not compiled: the backend
//! honors `#error` directives, scans declarations for reflection, and runs a
//! registered Rust [`Kernel`] for each fragment when a program draws. Kernels
//! are selected by a marker string found in the fragment shader source.
//!
//! Besides implementing `Gl`, `HeadlessGl` exposes bookkeeping used by tests:
//! live object counts, destroy calls per handle, draw counts, the default
//! framebuffer contents and one-shot failure injection.
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Instant;

use crate::backend::glsl::{error_directives, scan_declarations, Declaration, Storage};
use crate::error::{ApiError, ResourceType};
use crate::gl::{
    ActiveResource, Attachment, BindPoint, BlendEquation, BlendFactor, Capability, ClearMask,
    DrawMode, Filter, FramebufferTarget, Gl, GlResult, GlslType, Handle, ObjectKind, PixelChannels,
    QueryTarget, RenderbufferFormat, ResourceInterface, ShaderStage, Swizzle, TexData, TexImage,
    TexParam, TexturePixels, TextureFormat, TextureTarget, UniformValue, Viewport, Wrap,
};
use crate::shaders::{ERROR_PROGRAM_MARKER, SCREEN_BLIT_MARKER};
use crate::size::Rsize;

const INVALID_VALUE: u32 = 0x0501;
const INVALID_OPERATION: u32 = 0x0502;
const INVALID_FRAMEBUFFER_OPERATION: u32 = 0x0506;
const FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT: u32 = 0x8CD7;

/// Fragment program emulation: computes the color of one fragment.
pub type Kernel = Rc<dyn Fn(&Fragment<'_>) -> [f32; 4]>;

/// What a kernel can see while shading one fragment.
pub struct Fragment<'a> {
    coord: [f32; 2],
    output: u32,
    viewport: Viewport,
    state: &'a State,
    linked: &'a LinkedProgram,
    values: &'a HashMap<i32, UniformValue>,
}

impl Fragment<'_> {
    /// Window-space position of the fragment center (`gl_FragCoord.xy`).
    pub fn coord(&self) -> [f32; 2] {
        self.coord
    }

    /// Location of the fragment output being shaded.
    pub fn output(&self) -> u32 {
        self.output
    }

    /// Position within the viewport, from 0 to 1.
    pub fn uv(&self) -> [f32; 2] {
        [
            (self.coord[0] - self.viewport.x as f32) / self.viewport.width.max(1) as f32,
            (self.coord[1] - self.viewport.y as f32) / self.viewport.height.max(1) as f32,
        ]
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        let resource = self
            .linked
            .uniforms
            .iter()
            .find(|u| u.name == name || u.name.strip_suffix("[0]") == Some(name))?;
        self.values.get(&resource.location)
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.uniform(name) {
            Some(UniformValue::Float(value)) => *value,
            Some(UniformValue::FloatArray(values)) => values.first().copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i32 {
        match self.uniform(name) {
            Some(UniformValue::Int(value)) => *value,
            _ => 0,
        }
    }

    pub fn vec3(&self, name: &str) -> [f32; 3] {
        match self.uniform(name) {
            Some(UniformValue::Vec3(value)) => *value,
            Some(UniformValue::Vec3Array(values)) => values.first().copied().unwrap_or([0.0; 3]),
            _ => [0.0; 3],
        }
    }

    pub fn vec4(&self, name: &str) -> [f32; 4] {
        match self.uniform(name) {
            Some(UniformValue::Vec4(value)) => *value,
            _ => [0.0; 4],
        }
    }

    /// Size of the texture behind a sampler uniform, zero when unbound.
    pub fn texture_size(&self, sampler: &str) -> (u32, u32) {
        self.sampler_texture(sampler)
            .map(|(texture, _)| (texture.width, texture.height))
            .unwrap_or((0, 0))
    }

    /// Integer texel fetch with wrapping applied to out-of-range coordinates.
    pub fn texel_fetch(&self, sampler: &str, x: i32, y: i32) -> [f32; 4] {
        match self.sampler_texture(sampler) {
            Some((texture, params)) => texture.fetch(x, y, &params),
            None => [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Nearest-neighbour lookup at normalized coordinates.
    pub fn texture(&self, sampler: &str, uv: [f32; 2]) -> [f32; 4] {
        match self.sampler_texture(sampler) {
            Some((texture, params)) => {
                let x = (uv[0] * texture.width as f32).floor() as i32;
                let y = (uv[1] * texture.height as f32).floor() as i32;
                texture.fetch(x, y, &params)
            }
            None => [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn sampler_texture(&self, sampler: &str) -> Option<(&TextureObject, SamplingParams)> {
        let resource = self
            .linked
            .uniforms
            .iter()
            .find(|u| u.name == sampler && u.ty.is_sampler())?;
        let unit = match self.values.get(&resource.location) {
            Some(UniformValue::Int(unit)) => *unit as u32,
            _ => 0,
        };
        let handle = self.state.bound(BindPoint::Texture {
            unit,
            target: TextureTarget::Texture2d,
        });
        let texture = match self.state.objects.get(&handle) {
            Some(Object::Texture(texture)) if texture.width > 0 => texture,
            _ => return None,
        };
        let mut params = texture.params;
        let sampler_handle = self.state.bound(BindPoint::Sampler { unit });
        if let Some(Object::Sampler(sampler)) = self.state.objects.get(&sampler_handle) {
            params.wrap_s = sampler.wrap_s;
            params.wrap_t = sampler.wrap_t;
            params.min_filter = sampler.min_filter;
            params.mag_filter = sampler.mag_filter;
        }
        Some((texture, params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SamplingParams {
    min_filter: Filter,
    mag_filter: Filter,
    wrap_s: Wrap,
    wrap_t: Wrap,
    swizzle: [Swizzle; 4],
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            min_filter: Filter::NearestMipmapLinear,
            mag_filter: Filter::Linear,
            wrap_s: Wrap::Repeat,
            wrap_t: Wrap::Repeat,
            swizzle: [Swizzle::Red, Swizzle::Green, Swizzle::Blue, Swizzle::Alpha],
        }
    }
}

impl SamplingParams {
    fn apply(&mut self, param: TexParam) {
        match param {
            TexParam::MinFilter(filter) => self.min_filter = filter,
            TexParam::MagFilter(filter) => self.mag_filter = filter,
            TexParam::WrapS(wrap) => self.wrap_s = wrap,
            TexParam::WrapT(wrap) => self.wrap_t = wrap,
            TexParam::WrapR(_) => {}
            TexParam::Swizzle(swizzle) => self.swizzle = swizzle,
        }
    }
}

#[derive(Debug, Clone)]
struct TextureObject {
    width: u32,
    height: u32,
    format: TextureFormat,
    pixels: Vec<[f32; 4]>,
    params: SamplingParams,
    mipmapped: bool,
}

impl TextureObject {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            format: TextureFormat::Rgba8,
            pixels: Vec::new(),
            params: SamplingParams::default(),
            mipmapped: false,
        }
    }

    fn sized(size: Rsize, format: TextureFormat) -> Self {
        Self {
            width: size.width,
            height: size.height,
            format,
            pixels: vec![[0.0; 4]; (size.width * size.height) as usize],
            ..Self::empty()
        }
    }

    fn fetch(&self, x: i32, y: i32, params: &SamplingParams) -> [f32; 4] {
        let x = wrap_coord(x, self.width, params.wrap_s);
        let y = wrap_coord(y, self.height, params.wrap_t);
        let texel = self.pixels[(y * self.width + x) as usize];
        params.swizzle.map(|component| match component {
            Swizzle::Red => texel[0],
            Swizzle::Green => texel[1],
            Swizzle::Blue => texel[2],
            Swizzle::Alpha => texel[3],
            Swizzle::Zero => 0.0,
            Swizzle::One => 1.0,
        })
    }

    fn store(&mut self, x: u32, y: u32, color: [f32; 4]) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = quantize(self.format, color);
        }
    }

    fn fill(&mut self, color: [f32; 4]) {
        let value = quantize(self.format, color);
        self.pixels.iter_mut().for_each(|pixel| *pixel = value);
    }
}

fn wrap_coord(value: i32, extent: u32, wrap: Wrap) -> u32 {
    let extent = extent.max(1) as i32;
    let wrapped = match wrap {
        Wrap::ClampToEdge => value.clamp(0, extent - 1),
        Wrap::Repeat => value.rem_euclid(extent),
        Wrap::MirroredRepeat => {
            let period = value.rem_euclid(extent * 2);
            if period < extent {
                period
            } else {
                extent * 2 - 1 - period
            }
        }
    };
    wrapped as u32
}

/// Rounds a color to what `format` can store.
fn quantize(format: TextureFormat, color: [f32; 4]) -> [f32; 4] {
    let unorm = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() / 255.0;
    match format {
        TextureFormat::R8 => [unorm(color[0]), 0.0, 0.0, 1.0],
        TextureFormat::Rg8 => [unorm(color[0]), unorm(color[1]), 0.0, 1.0],
        TextureFormat::Rgb8 => [unorm(color[0]), unorm(color[1]), unorm(color[2]), 1.0],
        TextureFormat::Rgba8 => color.map(unorm),
        TextureFormat::R32f => [color[0], 0.0, 0.0, 1.0],
        TextureFormat::Rgba16f | TextureFormat::Rgba32f => color,
    }
}

#[derive(Debug, Default)]
struct FramebufferObject {
    colors: BTreeMap<u32, Handle>,
    depth: Option<Handle>,
    draw_buffers: Option<Vec<u32>>,
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Default)]
struct LinkedProgram {
    uniforms: Vec<ActiveResource>,
    inputs: Vec<ActiveResource>,
    outputs: Vec<ActiveResource>,
    kernel: Option<Kernel>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<Handle>,
    linked: Option<LinkedProgram>,
    log: String,
    validated: bool,
    values: HashMap<i32, UniformValue>,
}

#[derive(Debug, Default)]
struct QueryObject {
    started: Option<Instant>,
    result: u64,
}

enum Object {
    Buffer,
    Framebuffer(FramebufferObject),
    Program(ProgramObject),
    Query(QueryObject),
    Renderbuffer(Rsize),
    Sampler(SamplingParams),
    Shader(ShaderObject),
    Texture(TextureObject),
    VertexArray,
}

impl Object {
    fn resource_type(&self) -> ResourceType {
        match self {
            Object::Buffer => ResourceType::Buffer,
            Object::Framebuffer(_) => ResourceType::Framebuffer,
            Object::Program(_) => ResourceType::Program,
            Object::Query(_) => ResourceType::Query,
            Object::Renderbuffer(_) => ResourceType::Renderbuffer,
            Object::Sampler(_) => ResourceType::Sampler,
            Object::Shader(_) => ResourceType::Shader,
            Object::Texture(_) => ResourceType::Texture,
            Object::VertexArray => ResourceType::VertexArray,
        }
    }

    fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Buffer => Object::Buffer,
            ObjectKind::Framebuffer => Object::Framebuffer(FramebufferObject::default()),
            ObjectKind::Query => Object::Query(QueryObject::default()),
            ObjectKind::Renderbuffer => Object::Renderbuffer(Rsize::default()),
            ObjectKind::Sampler => Object::Sampler(SamplingParams::default()),
            ObjectKind::Texture => Object::Texture(TextureObject::empty()),
            ObjectKind::VertexArray => Object::VertexArray,
        }
    }

    fn matches_kind(&self, kind: ObjectKind) -> bool {
        matches!(
            (self, kind),
            (Object::Buffer, ObjectKind::Buffer)
                | (Object::Framebuffer(_), ObjectKind::Framebuffer)
                | (Object::Query(_), ObjectKind::Query)
                | (Object::Renderbuffer(_), ObjectKind::Renderbuffer)
                | (Object::Sampler(_), ObjectKind::Sampler)
                | (Object::Texture(_), ObjectKind::Texture)
                | (Object::VertexArray, ObjectKind::VertexArray)
        )
    }
}

struct State {
    next_handle: Handle,
    objects: HashMap<Handle, Object>,
    destroyed: HashMap<Handle, usize>,
    bindings: HashMap<BindPoint, Handle>,
    viewport: Viewport,
    capabilities: BTreeMap<Capability, bool>,
    clear_color: [f32; 4],
    active_queries: HashMap<QueryTarget, Handle>,
    surface: TextureObject,
    kernels: Vec<(String, Kernel)>,
    failures: Vec<(&'static str, ApiError)>,
    draw_calls: usize,
}

impl State {
    fn bound(&self, point: BindPoint) -> Handle {
        self.bindings.get(&point).copied().unwrap_or(0)
    }

    fn allocate(&mut self, object: Object) -> Handle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn texture_mut(&mut self, handle: Handle, operation: &'static str) -> GlResult<&mut TextureObject> {
        match self.objects.get_mut(&handle) {
            Some(Object::Texture(texture)) => Ok(texture),
            _ => Err(invalid(operation, INVALID_OPERATION)),
        }
    }

    fn shader_mut(&mut self, handle: Handle, operation: &'static str) -> GlResult<&mut ShaderObject> {
        match self.objects.get_mut(&handle) {
            Some(Object::Shader(shader)) => Ok(shader),
            _ => Err(invalid(operation, INVALID_OPERATION)),
        }
    }

    fn program_mut(&mut self, handle: Handle, operation: &'static str) -> GlResult<&mut ProgramObject> {
        match self.objects.get_mut(&handle) {
            Some(Object::Program(program)) => Ok(program),
            _ => Err(invalid(operation, INVALID_OPERATION)),
        }
    }

    fn program(&self, handle: Handle, operation: &'static str) -> GlResult<&ProgramObject> {
        match self.objects.get(&handle) {
            Some(Object::Program(program)) => Ok(program),
            _ => Err(invalid(operation, INVALID_OPERATION)),
        }
    }

    fn framebuffer_mut(&mut self, handle: Handle, operation: &'static str) -> GlResult<&mut FramebufferObject> {
        match self.objects.get_mut(&handle) {
            Some(Object::Framebuffer(framebuffer)) => Ok(framebuffer),
            _ => Err(invalid(operation, INVALID_OPERATION)),
        }
    }

    fn take_failure(&mut self, operation: &'static str) -> GlResult<()> {
        match self.failures.iter().position(|(op, _)| *op == operation) {
            Some(index) => Err(self.failures.remove(index).1),
            None => Ok(()),
        }
    }

    /// Color targets of the draw framebuffer with their output locations:
    /// the surface when zero is bound.
    ///
    /// Without a `draw_buffers` call only attachment 0 is written.
    fn draw_targets(&self) -> GlResult<Vec<(u32, Handle)>> {
        let framebuffer = self.bound(BindPoint::Framebuffer(FramebufferTarget::Draw));
        if framebuffer == 0 {
            return Ok(vec![(0, 0)]);
        }
        let Some(Object::Framebuffer(fbo)) = self.objects.get(&framebuffer) else {
            return Err(invalid("draw", INVALID_FRAMEBUFFER_OPERATION));
        };
        let selected = fbo.draw_buffers.clone().unwrap_or_else(|| vec![0]);
        let targets: Vec<(u32, Handle)> = selected
            .iter()
            .enumerate()
            .filter_map(|(location, attachment)| {
                let handle = fbo.colors.get(attachment)?;
                Some((location as u32, *handle))
            })
            .collect();
        if targets.is_empty() {
            return Err(invalid("draw", INVALID_FRAMEBUFFER_OPERATION));
        }
        Ok(targets)
    }

    fn target_mut(&mut self, handle: Handle) -> Option<&mut TextureObject> {
        if handle == 0 {
            return Some(&mut self.surface);
        }
        match self.objects.get_mut(&handle) {
            Some(Object::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    fn link(&self, program: &ProgramObject) -> Result<LinkedProgram, String> {
        let mut vertex = None;
        let mut fragment = None;
        for handle in &program.attached {
            match self.objects.get(handle) {
                Some(Object::Shader(shader)) if shader.compiled => match shader.stage {
                    ShaderStage::Vertex => vertex = Some(shader.source.as_str()),
                    ShaderStage::Fragment => fragment = Some(shader.source.as_str()),
                },
                Some(Object::Shader(_)) => {
                    return Err("error: linking with uncompiled shader".to_string())
                }
                _ => return Err("error: attached object is not a shader".to_string()),
            }
        }
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            return Err("error: program lacks a vertex or fragment shader".to_string());
        };

        let vertex_decls = scan_declarations(vertex);
        let fragment_decls = scan_declarations(fragment);

        let mut uniform_decls: Vec<&Declaration> = Vec::new();
        for decl in vertex_decls.iter().chain(&fragment_decls) {
            if decl.storage != Storage::Uniform {
                continue;
            }
            match uniform_decls.iter().find(|d| d.name == decl.name) {
                Some(existing) if existing.ty != decl.ty => {
                    return Err(format!(
                        "error: uniform `{}' declared with different types",
                        decl.name
                    ))
                }
                Some(_) => {}
                None => uniform_decls.push(decl),
            }
        }
        uniform_decls.sort_by(|a, b| a.name.cmp(&b.name));
        let mut next_location = 0;
        let uniforms = uniform_decls
            .into_iter()
            .map(|decl| {
                let location = next_location;
                next_location += decl.array_size;
                reflected(decl, location)
            })
            .collect();

        let interface = |decls: &[Declaration], storage: Storage| -> Vec<ActiveResource> {
            decls
                .iter()
                .filter(|d| d.storage == storage)
                .enumerate()
                .map(|(index, d)| reflected(d, d.location.unwrap_or(index as i32)))
                .collect()
        };

        let kernel = self
            .kernels
            .iter()
            .find(|(marker, _)| fragment.contains(marker.as_str()))
            .map(|(_, kernel)| Rc::clone(kernel));

        Ok(LinkedProgram {
            uniforms,
            inputs: interface(&vertex_decls, Storage::In),
            outputs: interface(&fragment_decls, Storage::Out),
            kernel,
        })
    }
}

fn reflected(decl: &Declaration, location: i32) -> ActiveResource {
    let name = if decl.array_size > 1 {
        format!("{}[0]", decl.name)
    } else {
        decl.name.clone()
    };
    ActiveResource {
        name,
        location,
        ty: decl.ty,
        array_size: decl.array_size,
    }
}

fn invalid(operation: &'static str, code: u32) -> ApiError {
    ApiError::Call { operation, code }
}

fn texel_values(image: &TexImage<'_>) -> GlResult<Vec<[f32; 4]>> {
    let count = (image.width * image.height) as usize;
    let channels = image.channels.count();
    let expand = |chunk: &[f32]| -> [f32; 4] {
        match image.channels {
            PixelChannels::Red => [chunk[0], 0.0, 0.0, 1.0],
            PixelChannels::Rg => [chunk[0], chunk[1], 0.0, 1.0],
            PixelChannels::Rgb => [chunk[0], chunk[1], chunk[2], 1.0],
            PixelChannels::Rgba => [chunk[0], chunk[1], chunk[2], chunk[3]],
        }
    };
    let values: Vec<f32> = match image.data {
        None => return Ok(vec![[0.0; 4]; count]),
        Some(TexData::U8(bytes)) => bytes.iter().map(|&b| b as f32 / 255.0).collect(),
        Some(TexData::F32(floats)) => floats.to_vec(),
    };
    if values.len() < count * channels {
        return Err(invalid("tex_image_2d", INVALID_VALUE));
    }
    Ok(values
        .chunks_exact(channels)
        .take(count)
        .map(|chunk| quantize(image.format, expand(chunk)))
        .collect())
}

/// Software graphics backend.
pub struct HeadlessGl {
    state: RefCell<State>,
}

impl HeadlessGl {
    /// A backend whose default framebuffer is `surface` pixels large.
    pub fn new(surface: Rsize) -> Self {
        let backend = Self {
            state: RefCell::new(State {
                next_handle: 1,
                objects: HashMap::new(),
                destroyed: HashMap::new(),
                bindings: HashMap::new(),
                viewport: Viewport::sized(surface.width, surface.height),
                capabilities: BTreeMap::new(),
                clear_color: [0.0; 4],
                active_queries: HashMap::new(),
                surface: TextureObject::sized(surface, TextureFormat::Rgba8),
                kernels: Vec::new(),
                failures: Vec::new(),
                draw_calls: 0,
            }),
        };
        backend.register_kernel(SCREEN_BLIT_MARKER, |fragment| {
            fragment.texture("screenTexture", fragment.uv())
        });
        backend.register_kernel(ERROR_PROGRAM_MARKER, |fragment| {
            let [x, y] = fragment.coord();
            let tile = ((x / 16.0).floor() as i64 + (y / 16.0).floor() as i64) % 2 == 0;
            if tile {
                [1.0, 0.0, 1.0, 1.0]
            } else {
                [0.0, 0.0, 0.0, 1.0]
            }
        });
        backend
    }

    /// Registers the fragment kernel for programs whose fragment source contains `marker`.
    pub fn register_kernel(
        &self,
        marker: impl Into<String>,
        kernel: impl Fn(&Fragment<'_>) -> [f32; 4] + 'static,
    ) {
        let kernel: Kernel = Rc::new(kernel);
        self.state.borrow_mut().kernels.push((marker.into(), kernel));
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.state.borrow_mut().failures.push((operation, error));
    }

    /// Number of objects created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn live_count(&self, kind: ResourceType) -> usize {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|object| object.resource_type() == kind)
            .count()
    }

    /// How many times `handle` was passed to a delete call.
    pub fn destroy_count(&self, handle: Handle) -> usize {
        self.state
            .borrow()
            .destroyed
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    pub fn draw_calls(&self) -> usize {
        self.state.borrow().draw_calls
    }

    pub fn resize_surface(&self, size: Rsize) {
        self.state.borrow_mut().surface = TextureObject::sized(size, TextureFormat::Rgba8);
    }

    pub fn read_surface(&self) -> TexturePixels {
        let state = self.state.borrow();
        TexturePixels {
            width: state.surface.width,
            height: state.surface.height,
            data: state.surface.pixels.clone(),
        }
    }

    /// Whether `handle` names a texture with a mipmap chain.
    pub fn has_mipmaps(&self, handle: Handle) -> bool {
        matches!(
            self.state.borrow().objects.get(&handle),
            Some(Object::Texture(texture)) if texture.mipmapped
        )
    }

    fn delete_object(&self, handle: Handle, accept: impl Fn(&Object) -> bool) {
        let mut state = self.state.borrow_mut();
        *state.destroyed.entry(handle).or_insert(0) += 1;
        if state.objects.get(&handle).map(accept) == Some(true) {
            state.objects.remove(&handle);
            state.bindings.retain(|_, bound| *bound != handle);
            for object in state.objects.values_mut() {
                if let Object::Framebuffer(fbo) = object {
                    fbo.colors.retain(|_, attached| *attached != handle);
                    if fbo.depth == Some(handle) {
                        fbo.depth = None;
                    }
                }
            }
        }
    }
}

impl Default for HeadlessGl {
    fn default() -> Self {
        Self::new(Rsize::new(640, 360))
    }
}

impl Gl for HeadlessGl {
    fn gen_objects(&self, kind: ObjectKind, count: usize) -> GlResult<Vec<Handle>> {
        let mut state = self.state.borrow_mut();
        state.take_failure("gen_objects")?;
        Ok((0..count)
            .map(|_| state.allocate(Object::for_kind(kind)))
            .collect())
    }

    fn delete_objects(&self, kind: ObjectKind, handles: &[Handle]) -> GlResult<()> {
        for &handle in handles {
            self.delete_object(handle, |object| object.matches_kind(kind));
        }
        Ok(())
    }

    fn create_textures(&self, _target: TextureTarget, count: usize) -> GlResult<Vec<Handle>> {
        let mut state = self.state.borrow_mut();
        state.take_failure("create_textures")?;
        Ok((0..count)
            .map(|_| state.allocate(Object::Texture(TextureObject::empty())))
            .collect())
    }

    fn create_queries(&self, _target: QueryTarget, count: usize) -> GlResult<Vec<Handle>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| state.allocate(Object::Query(QueryObject::default())))
            .collect())
    }

    fn create_program(&self) -> GlResult<Handle> {
        let mut state = self.state.borrow_mut();
        state.take_failure("create_program")?;
        Ok(state.allocate(Object::Program(ProgramObject::default())))
    }

    fn delete_program(&self, program: Handle) -> GlResult<()> {
        self.delete_object(program, |object| matches!(object, Object::Program(_)));
        Ok(())
    }

    fn create_shader(&self, stage: ShaderStage) -> GlResult<Handle> {
        let mut state = self.state.borrow_mut();
        Ok(state.allocate(Object::Shader(ShaderObject {
            stage,
            source: String::new(),
            compiled: false,
            log: String::new(),
        })))
    }

    fn delete_shader(&self, shader: Handle) -> GlResult<()> {
        self.delete_object(shader, |object| matches!(object, Object::Shader(_)));
        Ok(())
    }

    fn bind(&self, point: BindPoint, handle: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        if handle != 0 {
            let valid = match (point, state.objects.get(&handle)) {
                (BindPoint::Buffer(_), Some(Object::Buffer)) => true,
                (BindPoint::Framebuffer(_), Some(Object::Framebuffer(_))) => true,
                (BindPoint::Renderbuffer, Some(Object::Renderbuffer(_))) => true,
                (BindPoint::Program, Some(Object::Program(program))) => program.linked.is_some(),
                (BindPoint::VertexArray, Some(Object::VertexArray)) => true,
                (BindPoint::Texture { .. }, Some(Object::Texture(_))) => true,
                (BindPoint::Sampler { .. }, Some(Object::Sampler(_))) => true,
                _ => false,
            };
            if !valid {
                return Err(invalid("bind", INVALID_OPERATION));
            }
            state.bindings.insert(point, handle);
        } else {
            state.bindings.remove(&point);
        }
        Ok(())
    }

    fn binding(&self, point: BindPoint) -> GlResult<Handle> {
        Ok(self.state.borrow().bound(point))
    }

    fn tex_image_2d(&self, texture: Handle, image: &TexImage<'_>) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.take_failure("tex_image_2d")?;
        let pixels = texel_values(image)?;
        let object = state.texture_mut(texture, "tex_image_2d")?;
        object.width = image.width;
        object.height = image.height;
        object.format = image.format;
        object.pixels = pixels;
        object.mipmapped = false;
        Ok(())
    }

    fn tex_parameter(&self, texture: Handle, param: TexParam) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.take_failure("tex_parameter")?;
        state.texture_mut(texture, "tex_parameter")?.params.apply(param);
        Ok(())
    }

    fn sampler_parameter(&self, sampler: Handle, param: TexParam) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        match state.objects.get_mut(&sampler) {
            Some(Object::Sampler(params)) => {
                params.apply(param);
                Ok(())
            }
            _ => Err(invalid("sampler_parameter", INVALID_OPERATION)),
        }
    }

    fn generate_mipmap(&self, texture: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let object = state.texture_mut(texture, "generate_mipmap")?;
        if object.width == 0 {
            return Err(invalid("generate_mipmap", INVALID_OPERATION));
        }
        object.mipmapped = true;
        Ok(())
    }

    fn texture_size(&self, texture: Handle) -> GlResult<(u32, u32)> {
        let mut state = self.state.borrow_mut();
        let object = state.texture_mut(texture, "texture_size")?;
        Ok((object.width, object.height))
    }

    fn clear_tex_image(&self, texture: Handle, color: [f32; 4]) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.texture_mut(texture, "clear_tex_image")?.fill(color);
        Ok(())
    }

    fn read_tex_image(&self, texture: Handle) -> GlResult<TexturePixels> {
        let mut state = self.state.borrow_mut();
        let object = state.texture_mut(texture, "read_tex_image")?;
        Ok(TexturePixels {
            width: object.width,
            height: object.height,
            data: object.pixels.clone(),
        })
    }

    fn framebuffer_texture(
        &self,
        framebuffer: Handle,
        attachment: Attachment,
        texture: Handle,
    ) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        if texture != 0 && !matches!(state.objects.get(&texture), Some(Object::Texture(_))) {
            return Err(invalid("framebuffer_texture", INVALID_OPERATION));
        }
        let fbo = state.framebuffer_mut(framebuffer, "framebuffer_texture")?;
        match (attachment, texture) {
            (Attachment::Color(index), 0) => {
                fbo.colors.remove(&index);
            }
            (Attachment::Color(index), texture) => {
                fbo.colors.insert(index, texture);
            }
            (Attachment::Depth, _) => return Err(invalid("framebuffer_texture", INVALID_OPERATION)),
        }
        Ok(())
    }

    fn framebuffer_renderbuffer(
        &self,
        framebuffer: Handle,
        attachment: Attachment,
        renderbuffer: Handle,
    ) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        if !matches!(state.objects.get(&renderbuffer), Some(Object::Renderbuffer(_))) {
            return Err(invalid("framebuffer_renderbuffer", INVALID_OPERATION));
        }
        let fbo = state.framebuffer_mut(framebuffer, "framebuffer_renderbuffer")?;
        match attachment {
            Attachment::Depth => fbo.depth = Some(renderbuffer),
            Attachment::Color(_) => {
                return Err(invalid("framebuffer_renderbuffer", INVALID_OPERATION))
            }
        }
        Ok(())
    }

    fn check_framebuffer_status(&self, framebuffer: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let fbo = state.framebuffer_mut(framebuffer, "check_framebuffer_status")?;
        if fbo.colors.is_empty() && fbo.depth.is_none() {
            return Err(ApiError::IncompleteFramebuffer {
                status: FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT,
            });
        }
        Ok(())
    }

    fn draw_buffers(&self, framebuffer: Handle, attachments: &[u32]) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.take_failure("draw_buffers")?;
        let fbo = state.framebuffer_mut(framebuffer, "draw_buffers")?;
        fbo.draw_buffers = Some(attachments.to_vec());
        Ok(())
    }

    fn renderbuffer_storage(
        &self,
        renderbuffer: Handle,
        _format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        match state.objects.get_mut(&renderbuffer) {
            Some(Object::Renderbuffer(size)) => {
                *size = Rsize::new(width, height);
                Ok(())
            }
            _ => Err(invalid("renderbuffer_storage", INVALID_OPERATION)),
        }
    }

    fn shader_source(&self, shader: Handle, sources: &[&str]) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.shader_mut(shader, "shader_source")?.source = sources.concat();
        Ok(())
    }

    fn compile_shader(&self, shader: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let object = state.shader_mut(shader, "compile_shader")?;
        let errors = error_directives(&object.source);
        object.compiled = errors.is_empty();
        object.log = errors
            .iter()
            .map(|(line, message)| format!("0:{line}(1): error: {message}\n"))
            .collect();
        Ok(())
    }

    fn shader_compile_status(&self, shader: Handle) -> GlResult<bool> {
        let mut state = self.state.borrow_mut();
        Ok(state.shader_mut(shader, "shader_compile_status")?.compiled)
    }

    fn shader_info_log(&self, shader: Handle) -> GlResult<String> {
        let mut state = self.state.borrow_mut();
        Ok(state.shader_mut(shader, "shader_info_log")?.log.clone())
    }

    fn attach_shader(&self, program: Handle, shader: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.shader_mut(shader, "attach_shader")?;
        let object = state.program_mut(program, "attach_shader")?;
        if object.attached.contains(&shader) {
            return Err(invalid("attach_shader", INVALID_OPERATION));
        }
        object.attached.push(shader);
        Ok(())
    }

    fn detach_shader(&self, program: Handle, shader: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let object = state.program_mut(program, "detach_shader")?;
        let before = object.attached.len();
        object.attached.retain(|attached| *attached != shader);
        if object.attached.len() == before {
            return Err(invalid("detach_shader", INVALID_OPERATION));
        }
        Ok(())
    }

    fn link_program(&self, program: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        state.take_failure("link_program")?;
        let outcome = state.link(state.program(program, "link_program")?);
        let object = state.program_mut(program, "link_program")?;
        object.values.clear();
        object.validated = false;
        match outcome {
            Ok(linked) => {
                object.linked = Some(linked);
                object.log.clear();
            }
            Err(log) => {
                object.linked = None;
                object.log = log;
            }
        }
        Ok(())
    }

    fn program_link_status(&self, program: Handle) -> GlResult<bool> {
        let state = self.state.borrow();
        Ok(state.program(program, "program_link_status")?.linked.is_some())
    }

    fn validate_program(&self, program: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let object = state.program_mut(program, "validate_program")?;
        let Some(linked) = &object.linked else {
            object.validated = false;
            object.log = "error: program is not linked".to_string();
            return Ok(());
        };
        let mut units: HashMap<i32, GlslType> = HashMap::new();
        let mut conflict = None;
        for uniform in linked.uniforms.iter().filter(|u| u.ty.is_sampler()) {
            let unit = match object.values.get(&uniform.location) {
                Some(UniformValue::Int(unit)) => *unit,
                _ => 0,
            };
            match units.get(&unit) {
                Some(ty) if *ty != uniform.ty => conflict = Some(unit),
                _ => {
                    units.insert(unit, uniform.ty);
                }
            }
        }
        object.validated = conflict.is_none();
        object.log = conflict
            .map(|unit| format!("error: samplers of different types use texture unit {unit}"))
            .unwrap_or_default();
        Ok(())
    }

    fn program_validate_status(&self, program: Handle) -> GlResult<bool> {
        let state = self.state.borrow();
        Ok(state.program(program, "program_validate_status")?.validated)
    }

    fn program_info_log(&self, program: Handle) -> GlResult<String> {
        let state = self.state.borrow();
        Ok(state.program(program, "program_info_log")?.log.clone())
    }

    fn active_resources(
        &self,
        program: Handle,
        interface: ResourceInterface,
    ) -> GlResult<Vec<ActiveResource>> {
        let state = self.state.borrow();
        let object = state.program(program, "active_resources")?;
        let Some(linked) = &object.linked else {
            return Err(invalid("active_resources", INVALID_OPERATION));
        };
        Ok(match interface {
            ResourceInterface::Uniform => linked.uniforms.clone(),
            ResourceInterface::Input => linked.inputs.clone(),
            ResourceInterface::Output => linked.outputs.clone(),
        })
    }

    fn program_uniform(
        &self,
        program: Handle,
        location: i32,
        value: &UniformValue,
    ) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let object = state.program_mut(program, "program_uniform")?;
        let known = object.linked.as_ref().is_some_and(|linked| {
            linked
                .uniforms
                .iter()
                .any(|u| location >= u.location && location < u.location + u.array_size)
        });
        if !known {
            return Err(invalid("program_uniform", INVALID_OPERATION));
        }
        object.values.insert(location, value.clone());
        Ok(())
    }

    fn begin_query(&self, target: QueryTarget, query: Handle) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        if state.active_queries.contains_key(&target) {
            return Err(invalid("begin_query", INVALID_OPERATION));
        }
        match state.objects.get_mut(&query) {
            Some(Object::Query(object)) => object.started = Some(Instant::now()),
            _ => return Err(invalid("begin_query", INVALID_OPERATION)),
        }
        state.active_queries.insert(target, query);
        Ok(())
    }

    fn end_query(&self, target: QueryTarget) -> GlResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(query) = state.active_queries.remove(&target) else {
            return Err(invalid("end_query", INVALID_OPERATION));
        };
        if let Some(Object::Query(object)) = state.objects.get_mut(&query) {
            if let Some(started) = object.started.take() {
                object.result = started.elapsed().as_nanos() as u64;
            }
        }
        Ok(())
    }

    fn query_result(&self, query: Handle) -> GlResult<u64> {
        match self.state.borrow().objects.get(&query) {
            Some(Object::Query(object)) => Ok(object.result),
            _ => Err(invalid("query_result", INVALID_OPERATION)),
        }
    }

    fn viewport(&self, viewport: Viewport) -> GlResult<()> {
        self.state.borrow_mut().viewport = viewport;
        Ok(())
    }

    fn current_viewport(&self) -> GlResult<Viewport> {
        Ok(self.state.borrow().viewport)
    }

    fn set_capability(&self, capability: Capability, enabled: bool) -> GlResult<()> {
        self.state
            .borrow_mut()
            .capabilities
            .insert(capability, enabled);
        Ok(())
    }

    fn clear_color(&self, color: [f32; 4]) -> GlResult<()> {
        self.state.borrow_mut().clear_color = color;
        Ok(())
    }

    fn clear(&self, mask: ClearMask) -> GlResult<()> {
        if !mask.color {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        let color = state.clear_color;
        for (_, handle) in state.draw_targets()? {
            if let Some(target) = state.target_mut(handle) {
                target.fill(color);
            }
        }
        Ok(())
    }

    fn blend_func(&self, _src: BlendFactor, _dst: BlendFactor) -> GlResult<()> {
        Ok(())
    }

    fn blend_equation(&self, _equation: BlendEquation) -> GlResult<()> {
        Ok(())
    }

    fn draw_arrays(&self, _mode: DrawMode, _first: i32, _count: i32) -> GlResult<()> {
        let shaded = {
            let mut state = self.state.borrow_mut();
            state.take_failure("draw_arrays")?;
            state.draw_calls += 1;
            drop(state);

            let state = self.state.borrow();
            let program = state.bound(BindPoint::Program);
            let object = state.program(program, "draw_arrays")?;
            let Some(linked) = &object.linked else {
                return Err(invalid("draw_arrays", INVALID_OPERATION));
            };
            let targets = state.draw_targets()?;
            let viewport = state.viewport;
            let mut shaded = Vec::new();
            for &(output, handle) in &targets {
                for y in 0..viewport.height {
                    for x in 0..viewport.width {
                        let px = viewport.x + x as i32;
                        let py = viewport.y + y as i32;
                        if px < 0 || py < 0 {
                            continue;
                        }
                        let fragment = Fragment {
                            coord: [px as f32 + 0.5, py as f32 + 0.5],
                            output,
                            viewport,
                            state: &state,
                            linked,
                            values: &object.values,
                        };
                        let color = match &linked.kernel {
                            Some(kernel) => (kernel.as_ref())(&fragment),
                            None => [0.0, 0.0, 0.0, 1.0],
                        };
                        shaded.push((handle, px as u32, py as u32, color));
                    }
                }
            }
            shaded
        };

        let mut state = self.state.borrow_mut();
        for (handle, x, y, color) in shaded {
            if let Some(target) = state.target_mut(handle) {
                target.store(x, y, color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_live_objects_and_deletes() {
        let gl = HeadlessGl::default();
        let handles = gl.gen_objects(ObjectKind::Buffer, 3).unwrap();
        assert_eq!(gl.live_count(ResourceType::Buffer), 3);
        gl.delete_objects(ObjectKind::Buffer, &handles[..2]).unwrap();
        assert_eq!(gl.live_objects(), 1);
        assert_eq!(gl.destroy_count(handles[0]), 1);
        assert_eq!(gl.destroy_count(handles[2]), 0);
    }

    #[test]
    fn reports_error_directive_in_log() {
        let gl = HeadlessGl::default();
        let shader = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(shader, &["void main() {}\n", "#error nope\n"])
            .unwrap();
        gl.compile_shader(shader).unwrap();
        assert!(!gl.shader_compile_status(shader).unwrap());
        assert_eq!(gl.shader_info_log(shader).unwrap(), "0:2(1): error: nope\n");
    }

    #[test]
    fn quantizes_unorm_formats() {
        assert_eq!(quantize(TextureFormat::Rgba8, [2.0, -1.0, 0.5, 1.0])[0], 1.0);
        assert_eq!(quantize(TextureFormat::Rgba8, [2.0, -1.0, 0.5, 1.0])[1], 0.0);
        assert_eq!(quantize(TextureFormat::Rgba32f, [7.0, 0.0, 0.0, 1.0])[0], 7.0);
        assert_eq!(quantize(TextureFormat::R8, [0.0, 1.0, 1.0, 0.0]), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn wraps_coordinates() {
        assert_eq!(wrap_coord(-1, 4, Wrap::Repeat), 3);
        assert_eq!(wrap_coord(9, 4, Wrap::ClampToEdge), 3);
        assert_eq!(wrap_coord(4, 4, Wrap::MirroredRepeat), 3);
    }

    #[test]
    fn deleting_bound_texture_unbinds_it() {
        let gl = HeadlessGl::default();
        let texture = gl.create_textures(TextureTarget::Texture2d, 1).unwrap()[0];
        let point = BindPoint::Texture {
            unit: 0,
            target: TextureTarget::Texture2d,
        };
        gl.bind(point, texture).unwrap();
        gl.delete_objects(ObjectKind::Texture, &[texture]).unwrap();
        assert_eq!(gl.binding(point).unwrap(), 0);
    }
}
