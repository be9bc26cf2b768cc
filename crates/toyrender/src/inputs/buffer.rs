use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::InputError;
use crate::gl::Texture;
use crate::io_resource::IoResource;

/// Which output of a member an input samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSelector {
    Index(usize),
    Name(String),
}

impl Default for OutputSelector {
    fn default() -> Self {
        OutputSelector::Index(0)
    }
}

impl fmt::Display for OutputSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSelector::Index(index) => write!(f, "#{index}"),
            OutputSelector::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Reads whatever another member currently exposes as readable.
///
/// Holds a weak reference: removing the member makes the input fail instead
/// of keeping its textures alive. Samples the member's first output unless
/// another one is selected.
#[derive(Clone)]
pub struct BufferInput {
    name: String,
    output: Weak<RefCell<IoResource>>,
    selector: OutputSelector,
}

impl BufferInput {
    pub fn new(name: impl Into<String>, output: &Rc<RefCell<IoResource>>) -> Self {
        Self {
            name: name.into(),
            output: Rc::downgrade(output),
            selector: OutputSelector::default(),
        }
    }

    /// Samples the output declared as `name` in the member's program.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.selector = OutputSelector::Name(name.into());
        self
    }

    /// Samples the member's output at position `index`, in location order.
    pub fn with_output_index(mut self, index: usize) -> Self {
        self.selector = OutputSelector::Index(index);
        self
    }

    /// Name of the member this input reads.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &OutputSelector {
        &self.selector
    }

    pub fn reads(&self, output: &Rc<RefCell<IoResource>>) -> bool {
        self.output
            .upgrade()
            .is_some_and(|current| Rc::ptr_eq(&current, output))
    }

    pub fn texture(&self) -> Result<Rc<Texture>, InputError> {
        let output = self
            .output
            .upgrade()
            .ok_or_else(|| InputError::BufferUnavailable(self.name.clone()))?;
        let output = output
            .try_borrow()
            .map_err(|_| InputError::BufferUnavailable(self.name.clone()))?;
        let index = match &self.selector {
            OutputSelector::Index(index) => Some(*index).filter(|i| *i < output.output_count()),
            OutputSelector::Name(name) => output.output_index(name),
        }
        .ok_or_else(|| InputError::UnknownOutput {
            buffer: self.name.clone(),
            output: self.selector.to_string(),
        })?;
        output
            .source_texture_at(index)
            .ok_or_else(|| InputError::BufferNotAllocated(self.name.clone()))
    }
}

impl fmt::Debug for BufferInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferInput")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("alive", &(self.output.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGl;
    use crate::gl::{Gl, TextureFormat};
    use crate::io_resource::{OutputSpec, SwapPolicy};
    use crate::size::Rsize;

    #[test]
    fn follows_readable_slot_and_notices_removal() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let output = Rc::new(RefCell::new(IoResource::new(&gl, SwapPolicy::DoubleBuffer)));
        let input = BufferInput::new("a", &output);
        assert!(matches!(
            input.texture(),
            Err(InputError::BufferNotAllocated(_))
        ));

        output
            .borrow_mut()
            .allocate(Rsize::new(2, 2), TextureFormat::Rgba32f, SwapPolicy::DoubleBuffer)
            .unwrap();
        let first = input.texture().unwrap();
        output.borrow_mut().swap();
        let second = input.texture().unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert!(input.reads(&output));

        drop(first);
        drop(second);
        drop(output);
        assert!(matches!(
            input.texture(),
            Err(InputError::BufferUnavailable(_))
        ));
    }

    #[test]
    fn selects_outputs_by_name_or_index() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let output = Rc::new(RefCell::new(IoResource::new(&gl, SwapPolicy::SingleBuffer)));
        output.borrow_mut().set_outputs(vec![
            OutputSpec::new("color", 0),
            OutputSpec::new("velocity", 2),
        ]);
        output
            .borrow_mut()
            .allocate(Rsize::new(2, 2), TextureFormat::Rgba32f, SwapPolicy::SingleBuffer)
            .unwrap();

        let first = BufferInput::new("a", &output).texture().unwrap();
        let by_name = BufferInput::new("a", &output)
            .with_output("velocity")
            .texture()
            .unwrap();
        let by_index = BufferInput::new("a", &output)
            .with_output_index(1)
            .texture()
            .unwrap();
        assert!(Rc::ptr_eq(&by_name, &by_index));
        assert!(!Rc::ptr_eq(&first, &by_name));
        assert!(matches!(
            BufferInput::new("a", &output).with_output("normal").texture(),
            Err(InputError::UnknownOutput { .. })
        ));
        assert!(matches!(
            BufferInput::new("a", &output).with_output_index(2).texture(),
            Err(InputError::UnknownOutput { .. })
        ));
    }
}
