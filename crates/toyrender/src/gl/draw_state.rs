use std::collections::BTreeMap;

use crate::error::Result;
use crate::gl::{BlendEquation, BlendFactor, Capability, ClearMask, Gl};

/// Fixed-function state applied before a buffer draws.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawState {
    capabilities: BTreeMap<Capability, bool>,
    clear_color: [f32; 4],
    clear_mask: ClearMask,
    blend_func: (BlendFactor, BlendFactor),
    blend_equation: BlendEquation,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            capabilities: BTreeMap::new(),
            clear_color: [0.0, 0.0, 0.0, 0.0],
            clear_mask: ClearMask::NONE,
            blend_func: (BlendFactor::One, BlendFactor::Zero),
            blend_equation: BlendEquation::Add,
        }
    }
}

impl DrawState {
    pub fn enable(&mut self, capability: Capability) -> &mut Self {
        self.capabilities.insert(capability, true);
        self
    }

    pub fn disable(&mut self, capability: Capability) -> &mut Self {
        self.capabilities.insert(capability, false);
        self
    }

    pub fn is_enabled(&self, capability: Capability) -> Option<bool> {
        self.capabilities.get(&capability).copied()
    }

    pub fn set_clear(&mut self, color: [f32; 4], mask: ClearMask) -> &mut Self {
        self.clear_color = color;
        self.clear_mask = mask;
        self
    }

    pub fn set_blend(&mut self, src: BlendFactor, dst: BlendFactor, equation: BlendEquation) -> &mut Self {
        self.blend_func = (src, dst);
        self.blend_equation = equation;
        self
    }

    /// Applies capabilities and blending, then clears the bound framebuffer.
    pub fn apply(&self, gl: &dyn Gl) -> Result<()> {
        for (&capability, &enabled) in &self.capabilities {
            gl.set_capability(capability, enabled)?;
        }
        if self.capabilities.get(&Capability::Blend) == Some(&true) {
            gl.blend_func(self.blend_func.0, self.blend_func.1)?;
            gl.blend_equation(self.blend_equation)?;
        }
        if !self.clear_mask.is_empty() {
            gl.clear_color(self.clear_color)?;
            gl.clear(self.clear_mask)?;
        }
        Ok(())
    }
}
