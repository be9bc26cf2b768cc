//! Two-dimensional sizes and the references buffers use to follow them.
//!
//! Buffers do not store their render size; they hold a [`SizeRef`] and
//! resolve it whenever they allocate. Resolving never fails, but a reference
//! backed by shared state only changes when its owner updates it.
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BasicSize<T> {
    pub width: T,
    pub height: T,
}

/// Render size in pixels.
pub type Rsize = BasicSize<u32>;

impl<T> BasicSize<T> {
    pub const fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl Rsize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_vec3(&self) -> [f32; 3] {
        [self.width as f32, self.height as f32, 1.0]
    }
}

impl<T: fmt::Display> fmt::Display for BasicSize<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub trait SizeRefInterface<T>: fmt::Debug {
    fn resolve(&self) -> BasicSize<T>;
}

/// Shared handle to a size reference.
pub type SizeRef = Rc<dyn SizeRefInterface<u32>>;

/// A size fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ExplicitSize<T>(BasicSize<T>);

impl<T> ExplicitSize<T> {
    pub fn new(size: BasicSize<T>) -> Self {
        Self(size)
    }
}

impl<T: Copy + fmt::Debug> SizeRefInterface<T> for ExplicitSize<T> {
    fn resolve(&self) -> BasicSize<T> {
        self.0
    }
}

/// A size owned elsewhere; every clone observes updates made through `set`.
#[derive(Debug, Clone)]
pub struct ExplicitSizeRef<T: Copy>(Rc<Cell<BasicSize<T>>>);

impl<T: Copy> ExplicitSizeRef<T> {
    pub fn new(size: BasicSize<T>) -> Self {
        Self(Rc::new(Cell::new(size)))
    }

    pub fn set(&self, size: BasicSize<T>) {
        self.0.set(size);
    }

    pub fn get(&self) -> BasicSize<T> {
        self.0.get()
    }
}

impl<T: Copy + fmt::Debug> SizeRefInterface<T> for ExplicitSizeRef<T> {
    fn resolve(&self) -> BasicSize<T> {
        self.0.get()
    }
}

/// A size computed on demand by a callback.
pub struct GetterSizeRef<T>(Box<dyn Fn() -> BasicSize<T>>);

impl<T> GetterSizeRef<T> {
    pub fn new(getter: impl Fn() -> BasicSize<T> + 'static) -> Self {
        Self(Box::new(getter))
    }
}

impl<T> SizeRefInterface<T> for GetterSizeRef<T> {
    fn resolve(&self) -> BasicSize<T> {
        (self.0)()
    }
}

impl<T> fmt::Debug for GetterSizeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GetterSizeRef(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ref_clones_share_updates() {
        let owner = ExplicitSizeRef::new(Rsize::new(640, 360));
        let shared: SizeRef = Rc::new(owner.clone());
        owner.set(Rsize::new(1280, 720));
        assert_eq!(shared.resolve(), Rsize::new(1280, 720));
    }

    #[test]
    fn getter_ref_scales_parent() {
        let parent = ExplicitSizeRef::new(Rsize::new(800, 600));
        let watched = parent.clone();
        let half = GetterSizeRef::new(move || {
            let size = watched.get();
            Rsize::new(size.width / 2, size.height / 2)
        });
        assert_eq!(half.resolve(), Rsize::new(400, 300));
        parent.set(Rsize::new(100, 50));
        assert_eq!(half.resolve(), Rsize::new(50, 25));
    }

    #[test]
    fn size_refs_are_debuggable() {
        let size: SizeRef = Rc::new(ExplicitSize::new(Rsize::new(2, 3)));
        assert!(format!("{size:?}").contains("width: 2"));
        let getter: SizeRef = Rc::new(GetterSizeRef::new(|| Rsize::new(1, 1)));
        assert_eq!(format!("{getter:?}"), "GetterSizeRef(..)");
    }

    #[test]
    fn displays_as_dimensions() {
        assert_eq!(Rsize::new(3, 4).to_string(), "3x4");
        assert!(Rsize::new(0, 4).is_empty());
    }
}
