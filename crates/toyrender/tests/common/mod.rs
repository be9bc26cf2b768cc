#![allow(dead_code)]

use std::rc::Rc;
use std::sync::Once;

use toyrender::backend::headless::{Fragment, HeadlessGl};
use toyrender::{BufferSource, ContextConfig, Gl, RenderContext, Rsize, ToyBuffer};

static TRACING: Once = Once::new();

/// Routes crate logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Headless {
    pub backend: Rc<HeadlessGl>,
    pub gl: Rc<dyn Gl>,
}

pub fn headless(size: Rsize) -> Headless {
    init_tracing();
    let backend = Rc::new(HeadlessGl::new(size));
    let gl: Rc<dyn Gl> = backend.clone();
    Headless { backend, gl }
}

impl Headless {
    pub fn kernel(&self, marker: &str, kernel: impl Fn(&Fragment<'_>) -> [f32; 4] + 'static) {
        self.backend.register_kernel(marker, kernel);
    }

    pub fn context(&self, config: ContextConfig) -> RenderContext {
        RenderContext::new(self.gl.clone(), config).expect("valid config")
    }
}

/// A toy buffer whose only source carries `marker`.
pub fn toy(marker: &str) -> ToyBuffer {
    ToyBuffer::new(vec![BufferSource::inline(
        format!("{marker}.glsl"),
        format!(
            "// {marker}\nvoid mainImage(out vec4 fragColor, in vec2 fragCoord) {{\n    fragColor = vec4(0.0);\n}}\n"
        ),
    )])
}

pub fn approx(a: [f32; 4], b: [f32; 4], tolerance: f32) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}
