//! Ordered list of members rendered once per frame.
use std::rc::Rc;

use crate::buffers::FrameContext;
use crate::error::{Error, Result};
use crate::gl::{Texture, TextureFormat};
use crate::members::{BufferMember, Member};
use crate::size::Rsize;

/// Members in render order; names are unique.
///
/// Each member draws and swaps before the next one starts, so a later
/// member always samples an earlier member's frame from this render and an
/// earlier member samples a later member's frame from the previous render.
#[derive(Debug, Default)]
pub struct SwapChain {
    members: Vec<Member>,
}

impl SwapChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, member: impl Into<Member>) -> Result<()> {
        let member = member.into();
        if self.member(member.name()).is_some() {
            return Err(Error::DuplicateMember(member.name().to_string()));
        }
        self.members.push(member);
        Ok(())
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.name() == name)
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|member| member.name() == name)
    }

    pub fn buffer(&self, name: &str) -> Option<&BufferMember> {
        self.member(name).and_then(Member::as_buffer)
    }

    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut BufferMember> {
        self.member_mut(name).and_then(Member::as_buffer_mut)
    }

    /// The member rendered just before `name`.
    pub fn before(&self, name: &str) -> Option<&Member> {
        let index = self.members.iter().position(|member| member.name() == name)?;
        index.checked_sub(1).and_then(|index| self.members.get(index))
    }

    /// The last buffer member, the one whose output a frame produces.
    pub fn last_buffer(&self) -> Option<&BufferMember> {
        self.members.iter().rev().find_map(Member::as_buffer)
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        for member in &mut self.members {
            member.init(frame)?;
        }
        tracing::trace!(members = self.members.len(), "initialized swap chain");
        Ok(())
    }

    pub fn allocate(&mut self, size: Rsize, format: TextureFormat) -> Result<()> {
        for member in &mut self.members {
            member.allocate(size, format)?;
        }
        tracing::trace!(%size, ?format, "allocated swap chain");
        Ok(())
    }

    /// Renders every member in order and returns the last buffer's
    /// readable texture.
    pub fn render(&mut self, frame: &FrameContext<'_>) -> Result<Rc<Texture>> {
        for member in &mut self.members {
            member.render(frame)?;
        }
        self.last_buffer()
            .and_then(|member| member.output().borrow().source_texture())
            .ok_or(Error::InvalidState("swap chain has no buffer output"))
    }

    pub fn release(&mut self) {
        for member in &mut self.members {
            member.release();
        }
        self.members.clear();
    }
}
