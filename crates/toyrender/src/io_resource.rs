//! Output textures of a swap chain member.
//!
//! A member writes one texture per fragment output its program declares.
//! With [`SwapPolicy::DoubleBuffer`] every output owns two textures: one is
//! readable (last completed frame), the other is the render target for the
//! current frame. [`IoResource::swap`] flips all outputs at once after the
//! member has drawn, so a buffer reading its own output always sees the
//! previous frame.
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gl::{Gl, PixelChannels, TexImage, TextureFormat, TextureTarget, Texture};
use crate::program::ProgramInterface;
use crate::size::Rsize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPolicy {
    /// One texture, read and written in place.
    SingleBuffer,
    /// Two textures alternating between readable and writable.
    DoubleBuffer,
    /// Renders straight to the default framebuffer; nothing is readable.
    DefaultFramebuffer,
}

/// A fragment output a member renders into.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputSpec {
    /// Reflected output name; `None` for the implicit single output.
    pub name: Option<String>,
    pub location: u32,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, location: u32) -> Self {
        Self {
            name: Some(name.into()),
            location,
        }
    }

    /// Outputs of a linked program ordered by location. A program that
    /// reflects no outputs writes one unnamed output at location 0.
    pub fn from_interface(interface: &ProgramInterface) -> Vec<OutputSpec> {
        let mut specs: Vec<OutputSpec> = interface
            .outputs()
            .iter()
            .map(|output| OutputSpec::new(output.name.clone(), output.location.max(0) as u32))
            .collect();
        specs.sort_by_key(|spec| spec.location);
        specs.dedup_by_key(|spec| spec.location);
        if specs.is_empty() {
            specs.push(OutputSpec::default());
        }
        specs
    }
}

struct OutputSlot {
    spec: OutputSpec,
    textures: Vec<Rc<Texture>>,
}

pub struct IoResource {
    gl: Rc<dyn Gl>,
    policy: SwapPolicy,
    size: Rsize,
    format: TextureFormat,
    outputs: Vec<OutputSlot>,
    specified: bool,
    readable: usize,
}

impl fmt::Debug for IoResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outputs: Vec<_> = self
            .outputs
            .iter()
            .map(|slot| (&slot.spec, &slot.textures))
            .collect();
        f.debug_struct("IoResource")
            .field("policy", &self.policy)
            .field("size", &self.size)
            .field("format", &self.format)
            .field("outputs", &outputs)
            .field("readable", &self.readable)
            .finish()
    }
}

impl IoResource {
    pub fn new(gl: &Rc<dyn Gl>, policy: SwapPolicy) -> Self {
        Self {
            gl: Rc::clone(gl),
            policy,
            size: Rsize::default(),
            format: TextureFormat::default(),
            outputs: vec![OutputSlot {
                spec: OutputSpec::default(),
                textures: Vec::new(),
            }],
            specified: false,
            readable: 0,
        }
    }

    pub fn policy(&self) -> SwapPolicy {
        self.policy
    }

    pub fn size(&self) -> Rsize {
        self.size
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    fn texture_count(policy: SwapPolicy) -> usize {
        match policy {
            SwapPolicy::SingleBuffer => 1,
            SwapPolicy::DoubleBuffer => 2,
            SwapPolicy::DefaultFramebuffer => 0,
        }
    }

    pub fn outputs(&self) -> Vec<OutputSpec> {
        self.outputs.iter().map(|slot| slot.spec.clone()).collect()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Index of the output called `name`.
    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs
            .iter()
            .position(|slot| slot.spec.name.as_deref() == Some(name))
    }

    /// Replaces the output list. Textures are kept by position and storage
    /// is respecified on the next `allocate`. Returns whether anything changed.
    pub fn set_outputs(&mut self, mut specs: Vec<OutputSpec>) -> bool {
        if specs.is_empty() {
            specs.push(OutputSpec::default());
        }
        if self.outputs.len() == specs.len()
            && self.outputs.iter().zip(&specs).all(|(slot, spec)| &slot.spec == spec)
        {
            return false;
        }
        let mut previous = std::mem::take(&mut self.outputs).into_iter();
        self.outputs = specs
            .into_iter()
            .map(|spec| OutputSlot {
                spec,
                textures: previous.next().map(|slot| slot.textures).unwrap_or_default(),
            })
            .collect();
        self.specified = false;
        tracing::debug!(outputs = self.outputs.len(), "member outputs changed");
        true
    }

    /// Specifies storage for `size`/`format`/`policy` on every output.
    ///
    /// Existing textures are reused; nothing happens when all three and the
    /// output list are unchanged. Returns whether storage was (re)specified.
    pub fn allocate(&mut self, size: Rsize, format: TextureFormat, policy: SwapPolicy) -> Result<bool> {
        let count = Self::texture_count(policy);
        if self.specified && self.size == size && self.format == format && self.policy == policy {
            return Ok(false);
        }

        for slot in &mut self.outputs {
            slot.textures.truncate(count);
            while slot.textures.len() < count {
                slot.textures
                    .push(Rc::new(Texture::new(&self.gl, TextureTarget::Texture2d)?));
            }
            for texture in &slot.textures {
                texture.image_2d(&TexImage {
                    target: TextureTarget::Texture2d,
                    width: size.width,
                    height: size.height,
                    format,
                    channels: PixelChannels::Rgba,
                    data: None,
                })?;
                texture.clear([0.0, 0.0, 0.0, 0.0])?;
            }
        }

        tracing::debug!(
            %size,
            ?format,
            ?policy,
            outputs = self.outputs.len(),
            textures = count,
            "allocated member output"
        );
        self.size = size;
        self.format = format;
        self.policy = policy;
        self.specified = true;
        self.readable = if count == 2 { 1 } else { 0 };
        Ok(true)
    }

    fn slots_per_output(&self) -> usize {
        self.outputs.first().map_or(0, |slot| slot.textures.len())
    }

    /// Slot the next draw renders into.
    pub fn current_write(&self) -> usize {
        match self.slots_per_output() {
            2 => 1 - self.readable,
            _ => 0,
        }
    }

    /// Slot holding the last completed frame.
    pub fn readable_slot(&self) -> usize {
        self.readable
    }

    /// Texture holding the last completed frame of the first output.
    pub fn source_texture(&self) -> Option<Rc<Texture>> {
        self.source_texture_at(0)
    }

    /// Texture holding the last completed frame of output `index`.
    pub fn source_texture_at(&self, index: usize) -> Option<Rc<Texture>> {
        self.outputs.get(index)?.textures.get(self.readable).cloned()
    }

    /// Texture the current frame renders into for the first output; `None`
    /// targets the default framebuffer.
    pub fn target_texture(&self) -> Option<Rc<Texture>> {
        self.outputs.first()?.textures.get(self.current_write()).cloned()
    }

    /// Render targets of the current frame with their output locations.
    /// Empty when the member draws to the default framebuffer.
    pub fn targets(&self) -> Vec<(u32, Rc<Texture>)> {
        let write = self.current_write();
        self.outputs
            .iter()
            .filter_map(|slot| Some((slot.spec.location, slot.textures.get(write)?.clone())))
            .collect()
    }

    pub fn swap(&mut self) {
        if self.slots_per_output() == 2 {
            self.readable = 1 - self.readable;
            tracing::trace!(readable = self.readable, "swapped member output");
        }
    }

    /// Fills every render target with `color`.
    pub fn clear_target(&self, color: [f32; 4]) -> Result<()> {
        for (_, texture) in self.targets() {
            texture.clear(color)?;
        }
        Ok(())
    }

    pub fn release(&mut self) {
        for slot in &mut self.outputs {
            slot.textures.clear();
        }
        self.specified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGl;

    #[test]
    fn double_buffer_alternates_slots() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let mut io = IoResource::new(&gl, SwapPolicy::DoubleBuffer);
        io.allocate(Rsize::new(4, 4), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap();
        for renders in 0..5usize {
            assert_eq!(io.current_write(), renders % 2);
            assert_ne!(io.current_write(), io.readable_slot());
            io.swap();
        }
    }

    #[test]
    fn reallocation_reuses_textures() {
        let headless = Rc::new(HeadlessGl::default());
        let gl: Rc<dyn Gl> = headless.clone();
        let mut io = IoResource::new(&gl, SwapPolicy::DoubleBuffer);
        assert!(io
            .allocate(Rsize::new(4, 4), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap());
        let before = headless.live_objects();
        assert!(!io
            .allocate(Rsize::new(4, 4), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap());
        assert!(io
            .allocate(Rsize::new(8, 2), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap());
        assert_eq!(headless.live_objects(), before);
        assert_eq!(io.target_texture().unwrap().size().unwrap(), (8, 2));
    }

    #[test]
    fn every_output_gets_its_own_pair() {
        let headless = Rc::new(HeadlessGl::default());
        let gl: Rc<dyn Gl> = headless.clone();
        let mut io = IoResource::new(&gl, SwapPolicy::DoubleBuffer);
        assert!(io.set_outputs(vec![
            OutputSpec::new("color", 0),
            OutputSpec::new("normal", 1),
        ]));
        io.allocate(Rsize::new(2, 2), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap();
        assert_eq!(headless.live_objects(), 4);
        assert_eq!(io.output_index("normal"), Some(1));
        assert_eq!(io.output_index("depth"), None);

        let targets = io.targets();
        assert_eq!(targets.iter().map(|(l, _)| *l).collect::<Vec<_>>(), vec![0, 1]);
        assert!(!Rc::ptr_eq(&targets[1].1, &io.source_texture_at(1).unwrap()));
        io.swap();
        assert!(Rc::ptr_eq(&targets[1].1, &io.source_texture_at(1).unwrap()));
        drop(targets);

        assert!(!io.set_outputs(vec![
            OutputSpec::new("color", 0),
            OutputSpec::new("normal", 1),
        ]));
        assert!(io.set_outputs(Vec::new()));
        assert!(io
            .allocate(Rsize::new(2, 2), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap());
        assert_eq!(io.outputs(), vec![OutputSpec::default()]);
        assert_eq!(headless.live_objects(), 2);
    }

    #[test]
    fn single_buffer_reads_and_writes_one_slot() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let mut io = IoResource::new(&gl, SwapPolicy::SingleBuffer);
        io.allocate(Rsize::new(2, 2), TextureFormat::Rgba8, SwapPolicy::SingleBuffer)
            .unwrap();
        io.swap();
        assert_eq!(io.current_write(), 0);
        assert_eq!(io.readable_slot(), 0);
        assert!(Rc::ptr_eq(
            &io.source_texture().unwrap(),
            &io.target_texture().unwrap()
        ));
    }
}
