use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::gl::{
    Attachment, BindGuard, BindPoint, DrawState, Framebuffer, FramebufferTarget, Gl, Query,
    QueryGuard, QueryTarget, Renderbuffer, RenderbufferFormat, Texture, Viewport,
};
use crate::size::Rsize;

/// Framebuffer plumbing shared by every pass.
///
/// The depth renderbuffer follows the render size; storage is only
/// respecified when the size actually changes.
#[derive(Debug)]
pub struct GlBuffer {
    framebuffer: Framebuffer,
    depth: Renderbuffer,
    query: Query,
    depth_size: Rsize,
    attached: RefCell<Vec<u32>>,
}

impl GlBuffer {
    pub fn new(gl: &Rc<dyn Gl>) -> Result<Self> {
        Ok(Self {
            framebuffer: Framebuffer::new(gl, ())?,
            depth: Renderbuffer::new(gl, ())?,
            query: Query::new(gl, QueryTarget::TimeElapsed)?,
            depth_size: Rsize::default(),
            attached: RefCell::new(Vec::new()),
        })
    }

    pub fn size(&self) -> Rsize {
        self.depth_size
    }

    pub fn resize(&mut self, size: Rsize) -> Result<bool> {
        if size == self.depth_size || size.is_empty() {
            return Ok(false);
        }
        let _bound = BindGuard::new(&self.depth, ())?;
        self.depth
            .storage(RenderbufferFormat::Depth16, size.width, size.height)?;
        self.framebuffer
            .attach_renderbuffer(Attachment::Depth, &self.depth)?;
        tracing::debug!(%size, "resized depth renderbuffer");
        self.depth_size = size;
        Ok(true)
    }

    /// Runs `draw` with each `(location, texture)` target attached at color
    /// attachment `location`, or with the default framebuffer bound when
    /// `targets` is empty.
    pub fn render(
        &self,
        targets: &[(u32, Rc<Texture>)],
        size: Rsize,
        state: &DrawState,
        draw: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let gl = self.framebuffer.gl();
        let previous_viewport = gl.current_viewport()?;
        let result = if targets.is_empty() {
            let point = BindPoint::Framebuffer(FramebufferTarget::Draw);
            let previous = gl.binding(point)?;
            gl.bind(point, 0)?;
            let result = self.draw_timed(gl.as_ref(), size, state, draw);
            gl.bind(point, previous)?;
            result
        } else {
            let _fbo = BindGuard::new(&self.framebuffer, FramebufferTarget::Draw)?;
            self.attach(targets)?;
            self.framebuffer.check_status()?;
            self.draw_timed(gl.as_ref(), size, state, draw)
        };
        gl.viewport(previous_viewport)?;
        result
    }

    fn attach(&self, targets: &[(u32, Rc<Texture>)]) -> Result<()> {
        let mut attached = self.attached.borrow_mut();
        for location in attached.iter() {
            if !targets.iter().any(|(target, _)| target == location) {
                self.framebuffer.detach(Attachment::Color(*location))?;
            }
        }
        for (location, texture) in targets {
            self.framebuffer
                .attach_texture(Attachment::Color(*location), texture)?;
        }
        let locations: Vec<u32> = targets.iter().map(|(location, _)| *location).collect();
        if *attached != locations {
            let highest = locations.iter().copied().max().unwrap_or(0);
            self.framebuffer
                .draw_buffers(&(0..=highest).collect::<Vec<_>>())?;
            *attached = locations;
        }
        Ok(())
    }

    fn draw_timed(
        &self,
        gl: &dyn Gl,
        size: Rsize,
        state: &DrawState,
        draw: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        gl.viewport(Viewport::sized(size.width, size.height))?;
        state.apply(gl)?;
        let _timer = QueryGuard::new(&self.query, QueryTarget::TimeElapsed)?;
        draw()
    }

    /// Duration of the last draw in nanoseconds.
    pub fn elapsed_ns(&self) -> Result<u64> {
        self.query.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGl;
    use crate::error::ResourceType;
    use crate::gl::{PixelChannels, TexImage, TextureFormat, TextureTarget};

    #[test]
    fn resize_only_respecifies_on_change() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let mut buffer = GlBuffer::new(&gl).unwrap();
        assert!(buffer.resize(Rsize::new(8, 8)).unwrap());
        assert!(!buffer.resize(Rsize::new(8, 8)).unwrap());
        assert!(!buffer.resize(Rsize::new(0, 8)).unwrap());
        assert_eq!(buffer.size(), Rsize::new(8, 8));
    }

    #[test]
    fn render_restores_bindings_and_viewport() {
        let headless = Rc::new(HeadlessGl::default());
        let gl: Rc<dyn Gl> = headless.clone();
        let buffer = GlBuffer::new(&gl).unwrap();
        let texture = Rc::new(Texture::new(&gl, TextureTarget::Texture2d).unwrap());
        texture
            .image_2d(&TexImage {
                target: TextureTarget::Texture2d,
                width: 4,
                height: 4,
                format: TextureFormat::Rgba8,
                channels: PixelChannels::Rgba,
                data: None,
            })
            .unwrap();
        let before = gl.current_viewport().unwrap();

        let mut drawn = false;
        buffer
            .render(&[(0, texture)], Rsize::new(4, 4), &DrawState::default(), || {
                assert_eq!(gl.current_viewport().unwrap(), Viewport::sized(4, 4));
                drawn = true;
                Ok(())
            })
            .unwrap();

        assert!(drawn);
        assert_eq!(gl.current_viewport().unwrap(), before);
        let point = BindPoint::Framebuffer(FramebufferTarget::Draw);
        assert_eq!(gl.binding(point).unwrap(), 0);
        assert_eq!(headless.live_count(ResourceType::Framebuffer), 1);
    }
}
