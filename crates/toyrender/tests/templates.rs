mod common;

use toyrender::compiler::{
    PartOverrides, Part, PreprocessorDefines, ProgramTemplate, ShaderCompiler, ShaderTemplate,
    SHARED_DEFINES,
};
use toyrender::error::{Error, ShaderError};
use toyrender::gl::ShaderStage;
use toyrender::shaders::{BUFFER_DEFINES, BUFFER_INPUTS, BUFFER_SOURCES, FRAGMENT_TEMPLATE};
use toyrender::{ContextConfig, DefineEntry, Rsize};

fn toy_template() -> ProgramTemplate {
    let mut template = ProgramTemplate::new();
    template.set_stage(
        ShaderStage::Fragment,
        ShaderTemplate::parse(FRAGMENT_TEMPLATE, "toy").unwrap(),
    );
    template
}

fn overrides(defines: PreprocessorDefines, body: &str) -> PartOverrides {
    let mut overrides = PartOverrides::new();
    overrides.insert(
        BUFFER_DEFINES.to_string(),
        vec![Part::define(BUFFER_DEFINES, defines)],
    );
    overrides.insert(
        BUFFER_INPUTS.to_string(),
        vec![Part::input(BUFFER_INPUTS, Vec::new())],
    );
    overrides.insert(
        BUFFER_SOURCES.to_string(),
        vec![Part::source("image.glsl", body)],
    );
    overrides
}

fn joined(template: &ProgramTemplate, overrides: &PartOverrides) -> String {
    template
        .sources(ShaderStage::Fragment, overrides)
        .unwrap()
        .into_iter()
        .map(|source| source.source)
        .collect()
}

#[test]
fn same_inputs_produce_identical_sources() {
    let mut template = toy_template();
    template
        .shared_defines_mut(SHARED_DEFINES)
        .define("QUALITY", "2");
    let mut defines = PreprocessorDefines::new();
    defines.define("STEPS", "64").define_flag("FAST");
    let overrides = overrides(defines, "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n");

    let first = template.sources(ShaderStage::Fragment, &overrides).unwrap();
    let second = template.sources(ShaderStage::Fragment, &overrides).unwrap();
    assert_eq!(first, second);
    assert!(first.iter().any(|source| source.name == "image.glsl"));
}

#[test]
fn defines_precede_user_code_in_insertion_order() {
    let mut template = toy_template();
    template
        .shared_defines_mut(SHARED_DEFINES)
        .define("SHARED_B", "1")
        .define("SHARED_A", "1");
    let mut defines = PreprocessorDefines::new();
    defines.define("LOCAL_Z", "1").define("LOCAL_Y", "1");
    let text = joined(&template, &overrides(defines, "// user code\n"));

    let position = |needle: &str| {
        text.find(needle)
            .unwrap_or_else(|| panic!("{needle} missing from:\n{text}"))
    };
    assert!(text.starts_with("#version 330 core\n"));
    assert!(position("#define SHARED_B 1") < position("#define SHARED_A 1"));
    assert!(position("#define SHARED_A 1") < position("#define LOCAL_Z 1"));
    assert!(position("#define LOCAL_Z 1") < position("#define LOCAL_Y 1"));
    assert!(position("#define LOCAL_Y 1") < position("uniform vec3 iResolution;"));
    assert!(position("// user code") < position("void main(void)"));
}

#[test]
fn redefining_a_name_keeps_its_slot() {
    let mut template = toy_template();
    let shared = template.shared_defines_mut(SHARED_DEFINES);
    shared.define("FIRST", "1").define("SECOND", "1").define("FIRST", "9");
    let text = joined(&template, &overrides(PreprocessorDefines::new(), ""));
    assert!(text.find("#define FIRST 9") < text.find("#define SECOND 1"));
    assert!(!text.contains("#define FIRST 1"));
}

#[test]
fn unspecified_slot_cannot_be_serialized() {
    let template = toy_template();
    let result = template.sources(ShaderStage::Fragment, &PartOverrides::new());
    assert!(matches!(result, Err(Error::Template(_))));
}

#[test]
fn config_defines_reach_the_shared_part() {
    let config = ContextConfig {
        defines: vec![
            DefineEntry {
                name: "MODE".to_string(),
                value: Some("3".to_string()),
            },
            DefineEntry {
                name: "DEBUG".to_string(),
                value: None,
            },
        ],
        ..ContextConfig::default()
    };
    let env = common::headless(Rsize::new(4, 4));
    let mut context = env.context(config);
    let defines = context
        .template_mut()
        .shared_defines_mut(SHARED_DEFINES)
        .to_source();
    assert!(defines.contains("#define TOYRENDER 1\n"));
    assert!(defines.find("#define MODE 3\n") < defines.find("#define DEBUG\n"));
}

#[test]
fn compile_errors_name_the_user_source() {
    let env = common::headless(Rsize::new(4, 4));
    let template = toy_template();
    let body = "void mainImage(out vec4 c, in vec2 p) {\n#error missing semicolon\n}\n";
    let sources = template
        .sources(
            ShaderStage::Fragment,
            &overrides(PreprocessorDefines::new(), body),
        )
        .unwrap();

    let error = ShaderCompiler::new(sources)
        .compile(&env.gl, ShaderStage::Fragment)
        .unwrap_err();
    match error {
        Error::Shader(ShaderError::Compile {
            stage,
            source_name,
            line,
            log,
        }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert_eq!(source_name, "image.glsl");
            assert_eq!(line, Some(2));
            assert!(log.contains("missing semicolon"), "{log}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unterminated_user_source_keeps_its_own_lines() {
    let env = common::headless(Rsize::new(4, 4));
    let template = toy_template();
    let overrides = overrides(PreprocessorDefines::new(), "#error boom");
    assert!(joined(&template, &overrides).contains("#error boom\nvoid main(void) {"));

    let sources = template
        .sources(ShaderStage::Fragment, &overrides)
        .unwrap();
    let error = ShaderCompiler::new(sources)
        .compile(&env.gl, ShaderStage::Fragment)
        .unwrap_err();
    match error {
        Error::Shader(ShaderError::Compile {
            source_name, line, ..
        }) => {
            assert_eq!(source_name, "image.glsl");
            assert_eq!(line, Some(1));
        }
        other => panic!("unexpected error: {other}"),
    }
}
