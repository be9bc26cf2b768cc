//! Geometry drawn by buffers.
use std::rc::Rc;

use crate::error::Result;
use crate::gl::{BindGuard, DrawMode, Gl, VertexArray};

/// Attribute-less full-screen triangle; positions come from `gl_VertexID`.
#[derive(Debug)]
pub struct ScreenQuad {
    vao: VertexArray,
}

impl ScreenQuad {
    pub fn new(gl: &Rc<dyn Gl>) -> Result<Self> {
        Ok(Self {
            vao: VertexArray::new(gl, ())?,
        })
    }

    pub fn draw(&self) -> Result<()> {
        let _vao = BindGuard::new(&self.vao, ())?;
        self.vao.gl().draw_arrays(DrawMode::Triangles, 0, 3)?;
        Ok(())
    }
}

/// Either the shared screen quad or user-supplied vertex data.
#[derive(Debug)]
pub enum Geometry {
    Screen(ScreenQuad),
    Custom {
        vao: VertexArray,
        mode: DrawMode,
        count: i32,
    },
}

impl Geometry {
    pub fn screen(gl: &Rc<dyn Gl>) -> Result<Self> {
        Ok(Geometry::Screen(ScreenQuad::new(gl)?))
    }

    /// Draws `count` vertices from an already configured vertex array.
    pub fn custom(vao: VertexArray, mode: DrawMode, count: i32) -> Self {
        Geometry::Custom { vao, mode, count }
    }

    pub fn draw(&self) -> Result<()> {
        match self {
            Geometry::Screen(quad) => quad.draw(),
            Geometry::Custom { vao, mode, count } => {
                let _vao = BindGuard::new(vao, ())?;
                vao.gl().draw_arrays(*mode, 0, *count)?;
                Ok(())
            }
        }
    }
}
