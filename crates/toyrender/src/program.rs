//! Reflection of a linked program's interface.
//!
//! Uniforms and outputs are looked up by name after linking; locations are
//! whatever the driver assigned, never assumed.
use crate::error::{Error, Result};
use crate::gl::{GlslType, Program, ResourceInterface, UniformValue};

/// One active uniform, input or output. Array names drop their `[0]` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramResource {
    pub name: String,
    pub location: i32,
    pub ty: GlslType,
    pub array_size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    uniforms: Vec<ProgramResource>,
    inputs: Vec<ProgramResource>,
    outputs: Vec<ProgramResource>,
}

fn reflect(program: &Program, interface: ResourceInterface) -> Result<Vec<ProgramResource>> {
    Ok(program
        .resources(interface)?
        .into_iter()
        .map(|active| ProgramResource {
            name: active
                .name
                .strip_suffix("[0]")
                .map(str::to_string)
                .unwrap_or(active.name),
            location: active.location,
            ty: active.ty,
            array_size: active.array_size,
        })
        .collect())
}

impl ProgramInterface {
    pub fn reflect(program: &Program) -> Result<Self> {
        Ok(Self {
            uniforms: reflect(program, ResourceInterface::Uniform)?,
            inputs: reflect(program, ResourceInterface::Input)?,
            outputs: reflect(program, ResourceInterface::Output)?,
        })
    }

    pub fn uniforms(&self) -> &[ProgramResource] {
        &self.uniforms
    }

    pub fn inputs(&self) -> &[ProgramResource] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ProgramResource] {
        &self.outputs
    }

    pub fn uniform(&self, name: &str) -> Option<&ProgramResource> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&ProgramResource> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Sets `name` if the program uses it.
    ///
    /// Returns `Ok(false)` for inactive uniforms and fails when the value
    /// does not match the declared type.
    pub fn set_uniform(&self, program: &Program, name: &str, value: UniformValue) -> Result<bool> {
        let Some(uniform) = self.uniform(name) else {
            return Ok(false);
        };
        if !value.fits(uniform.ty) {
            return Err(Error::UniformType {
                name: name.to_string(),
                expected: uniform.ty,
            });
        }
        program.set_uniform(uniform.location, &value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::backend::headless::HeadlessGl;
    use crate::compiler::link_program;
    use crate::gl::{Gl, Shader, ShaderStage};

    fn linked(gl: &Rc<dyn Gl>, fragment: &str) -> Program {
        let vertex = Shader::new(gl, ShaderStage::Vertex).unwrap();
        vertex.source(&[crate::shaders::SCREEN_QUAD_VERTEX]).unwrap();
        assert!(vertex.compile().unwrap());
        let frag = Shader::new(gl, ShaderStage::Fragment).unwrap();
        frag.source(&[fragment]).unwrap();
        assert!(frag.compile().unwrap());
        let program = Program::new(gl, ()).unwrap();
        link_program(&program, &[&vertex, &frag]).unwrap();
        program
    }

    #[test]
    fn reflects_locations_by_name() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let program = linked(
            &gl,
            "uniform float zeta;\nuniform float alpha[3];\nuniform vec3 mid;\nout vec4 color;\n",
        );
        let interface = ProgramInterface::reflect(&program).unwrap();
        assert_eq!(interface.uniform("alpha").unwrap().location, 0);
        assert_eq!(interface.uniform("alpha").unwrap().array_size, 3);
        assert_eq!(interface.uniform("mid").unwrap().location, 3);
        assert_eq!(interface.uniform("zeta").unwrap().location, 4);
        assert_eq!(interface.output("color").unwrap().ty, GlslType::Vec4);
    }

    #[test]
    fn uniform_setter_checks_types() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let program = linked(&gl, "uniform vec3 tint;\nout vec4 color;\n");
        let interface = ProgramInterface::reflect(&program).unwrap();
        assert!(interface
            .set_uniform(&program, "tint", [1.0, 0.5, 0.0].into())
            .unwrap());
        assert!(!interface
            .set_uniform(&program, "unused", 1.0f32.into())
            .unwrap());
        assert!(matches!(
            interface.set_uniform(&program, "tint", 1.0f32.into()),
            Err(Error::UniformType { .. })
        ));
    }
}
