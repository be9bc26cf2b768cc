//! Scoped binding of resources.
//!
//! A [`BindGuard`] binds a resource when it is created and, when dropped,
//! puts back whatever was bound at that slot before it. Guards on the same
//! slot therefore unwind in reverse order of creation, and guards on
//! different slots do not interact.
use crate::error::{NullResourceError, Result};
use crate::gl::resource::{
    Buffer, Framebuffer, Program, Query, Renderbuffer, Sampler, Texture, VertexArray,
};
use crate::gl::{
    BindPoint, BufferTarget, FramebufferTarget, Gl, Handle, QueryTarget, TextureTarget,
};

/// A resource that occupies a binding slot.
pub trait Bindable {
    /// Extra argument choosing the slot (target, texture unit, ...).
    type Target: Copy;

    fn bind_point(target: Self::Target) -> BindPoint;
    fn bind_handle(&self) -> Result<Handle, NullResourceError>;
    fn backend(&self) -> &dyn Gl;
}

macro_rules! bindable {
    ($resource:ty, $target:ty, |$arg:pat_param| $point:expr) => {
        impl Bindable for $resource {
            type Target = $target;

            fn bind_point($arg: $target) -> BindPoint {
                $point
            }

            fn bind_handle(&self) -> Result<Handle, NullResourceError> {
                self.id()
            }

            fn backend(&self) -> &dyn Gl {
                self.gl().as_ref()
            }
        }
    };
}

bindable!(Buffer, BufferTarget, |target| BindPoint::Buffer(target));
bindable!(Framebuffer, FramebufferTarget, |target| BindPoint::Framebuffer(target));
bindable!(Renderbuffer, (), |_| BindPoint::Renderbuffer);
bindable!(Program, (), |_| BindPoint::Program);
bindable!(VertexArray, (), |_| BindPoint::VertexArray);
bindable!(Texture, u32, |unit| BindPoint::Texture {
    unit,
    target: TextureTarget::Texture2d,
});
bindable!(Sampler, u32, |unit| BindPoint::Sampler { unit });

/// Keeps a resource bound for the lifetime of the guard.
#[must_use = "the binding is undone as soon as the guard is dropped"]
pub struct BindGuard<'a, R: Bindable> {
    resource: &'a R,
    point: BindPoint,
    previous: Handle,
    restore: bool,
}

impl<'a, R: Bindable> BindGuard<'a, R> {
    pub fn new(resource: &'a R, target: R::Target) -> Result<Self> {
        let handle = resource.bind_handle()?;
        let point = R::bind_point(target);
        let gl = resource.backend();
        let previous = gl.binding(point)?;
        gl.bind(point, handle)?;
        Ok(Self {
            resource,
            point,
            previous,
            restore: true,
        })
    }

    /// Handle that was bound at this slot when the guard was created.
    pub fn previous(&self) -> Handle {
        self.previous
    }

    pub fn point(&self) -> BindPoint {
        self.point
    }

    /// Drops the guard but leaves the resource bound.
    pub fn keep(mut self) {
        self.restore = false;
    }
}

impl<R: Bindable> Drop for BindGuard<'_, R> {
    fn drop(&mut self) {
        if !self.restore {
            return;
        }
        if let Err(error) = self.resource.backend().bind(self.point, self.previous) {
            tracing::warn!(
                point = ?self.point,
                previous = self.previous,
                error = %error,
                "failed to restore previous binding"
            );
        }
    }
}

/// Keeps a query active between `begin` and `end`.
#[must_use = "the query ends as soon as the guard is dropped"]
pub struct QueryGuard<'a> {
    query: &'a Query,
    target: QueryTarget,
}

impl<'a> QueryGuard<'a> {
    pub fn new(query: &'a Query, target: QueryTarget) -> Result<Self> {
        query.begin(target)?;
        Ok(Self { query, target })
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.query.end(self.target) {
            tracing::warn!(error = %error, "failed to end query");
        }
    }
}
