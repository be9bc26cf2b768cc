use std::rc::Rc;

use crate::compiler::part::NamedSource;
use crate::error::{Result, ShaderError};
use crate::gl::{Gl, Program, Shader, ShaderStage};

/// Compiles a list of named sources and maps driver diagnostics back to them.
#[derive(Debug, Clone, Default)]
pub struct ShaderCompiler {
    sources: Vec<NamedSource>,
}

impl ShaderCompiler {
    pub fn new(sources: Vec<NamedSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[NamedSource] {
        &self.sources
    }

    /// Concatenated source text as handed to the driver.
    pub fn source_text(&self) -> String {
        self.sources.iter().map(|s| s.source.as_str()).collect()
    }

    pub fn compile(&self, gl: &Rc<dyn Gl>, stage: ShaderStage) -> Result<Shader> {
        let shader = Shader::new(gl, stage)?;
        let texts: Vec<&str> = self.sources.iter().map(|s| s.source.as_str()).collect();
        shader.source(&texts)?;
        if shader.compile()? {
            return Ok(shader);
        }

        let log = shader.info_log()?;
        let (log, location) = remap_log(&self.sources, &log);
        let (source_name, line) = match location {
            Some((name, line)) => (name, Some(line)),
            None => (
                self.sources
                    .first()
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                None,
            ),
        };
        Err(ShaderError::Compile {
            stage,
            source_name,
            line,
            log,
        }
        .into())
    }
}

/// Rewrites `ID:LINE` and `ID(LINE)` prefixes of a driver log to
/// `<part name><sep><local line>`.
///
/// Also returns the part and local line of the first located message.
pub fn remap_log(sources: &[NamedSource], log: &str) -> (String, Option<(String, u32)>) {
    let mut first = None;
    let mut out = String::with_capacity(log.len());
    for message in log.lines() {
        match locate(sources, message) {
            Some((name, separator, line, rest)) => {
                if first.is_none() {
                    first = Some((name.to_string(), line));
                }
                out.push_str(&format!("{name}{separator}{line}{rest}\n"));
            }
            None => {
                out.push_str(message);
                out.push('\n');
            }
        }
    }
    (out, first)
}

fn locate<'a>(sources: &'a [NamedSource], message: &'a str) -> Option<(&'a str, char, u32, &'a str)> {
    let digits = message.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let separator = message[digits..].chars().next()?;
    if separator != ':' && separator != '(' {
        return None;
    }
    let rest = &message[digits + 1..];
    let line_digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let line: usize = rest[..line_digits].parse().ok()?;

    let mut start = 0;
    for source in sources {
        let count = source.line_count();
        if line > start && line <= start + count {
            return Some((
                &source.name,
                separator,
                (line - start) as u32,
                &rest[line_digits..],
            ));
        }
        start += count;
    }
    None
}

/// Links `program` from `shaders`, detaching them again whatever the outcome.
pub fn link_program(program: &Program, shaders: &[&Shader]) -> Result<()> {
    for (index, shader) in shaders.iter().enumerate() {
        if let Err(error) = program.attach(shader) {
            detach_all(program, &shaders[..index]);
            return Err(error);
        }
    }
    let linked = program.link();
    detach_all(program, shaders);
    linked
}

fn detach_all(program: &Program, shaders: &[&Shader]) {
    for shader in shaders {
        if let Err(error) = program.detach(shader) {
            tracing::warn!(error = %error, "failed to detach shader after link");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<NamedSource> {
        vec![
            NamedSource::new("header", "#version 330 core\nuniform float x;\n"),
            NamedSource::new("buffer:sources", "void a() {}\nvoid b() {}\nvoid c() {}\n"),
        ]
    }

    #[test]
    fn remaps_colon_and_paren_forms() {
        let log = "0:4(1): error: oops\n0(2) : warning: hmm\nplain text";
        let (remapped, first) = remap_log(&sources(), log);
        assert_eq!(
            remapped,
            "buffer:sources:2(1): error: oops\nheader(2) : warning: hmm\nplain text\n"
        );
        assert_eq!(first, Some(("buffer:sources".to_string(), 2)));
    }

    #[test]
    fn failed_attach_detaches_earlier_shaders() {
        use crate::backend::headless::HeadlessGl;
        use crate::shaders::SCREEN_QUAD_VERTEX;

        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let compile = |stage, text: &str| {
            ShaderCompiler::new(vec![NamedSource::new("stage", text)])
                .compile(&gl, stage)
                .unwrap()
        };
        let vertex = compile(ShaderStage::Vertex, SCREEN_QUAD_VERTEX);
        let fragment = compile(
            ShaderStage::Fragment,
            "#version 330 core\nout vec4 color;\nvoid main(void) { color = vec4(1.0); }\n",
        );
        let program = Program::new(&gl, ()).unwrap();

        // Attaching the same shader twice fails on the second attach.
        assert!(link_program(&program, &[&vertex, &vertex]).is_err());
        link_program(&program, &[&vertex, &fragment]).unwrap();
    }

    #[test]
    fn passes_through_lines_past_the_end() {
        let (remapped, first) = remap_log(&sources(), "0:99(1): error: far");
        assert_eq!(remapped, "0:99(1): error: far\n");
        assert_eq!(first, None);
    }
}
