mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{approx, toy};
use toyrender::buffers::Buffer;
use toyrender::error::{Error, ResourceType};
use toyrender::inputs::LoadState;
use toyrender::members::{Member, SCREEN_MEMBER};
use toyrender::shaders::SCREEN_QUAD_VERTEX;
use toyrender::{BufferSource, ContextConfig, GeometryBuffer, Input, Rsize, SwapPolicy};

const CONSTANT: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

fn offscreen() -> ContextConfig {
    ContextConfig {
        present_to_screen: false,
        ..ContextConfig::default()
    }
}

#[test]
fn constant_buffer_reaches_output_and_screen() {
    let env = common::headless(Rsize::new(8, 6));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(ContextConfig::default());
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(8, 6)).unwrap();
    assert!(context.chain().member(SCREEN_MEMBER).is_some());

    let output = context.render_frame().unwrap();
    let pixels = output.read_pixels().unwrap();
    assert_eq!((pixels.width, pixels.height), (8, 6));
    assert!(pixels.data.iter().all(|&texel| texel == CONSTANT));

    let surface = env.backend.read_surface();
    assert!(approx(surface.pixel(3, 2).unwrap(), CONSTANT, 1.0 / 255.0));
}

#[test]
fn resize_reuses_every_object() {
    let env = common::headless(Rsize::new(8, 8));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(ContextConfig::default());
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(8, 8)).unwrap();
    context.render_frame().unwrap();
    let live = env.backend.live_objects();

    env.backend.resize_surface(Rsize::new(16, 4));
    context.resize(Rsize::new(16, 4)).unwrap();
    let output = context.render_frame().unwrap();

    assert_eq!(env.backend.live_objects(), live);
    assert_eq!(output.size().unwrap(), (16, 4));
    assert_eq!(context.uniforms().resolution, [16.0, 4.0, 1.0]);
    assert!(output
        .read_pixels()
        .unwrap()
        .data
        .iter()
        .all(|&texel| texel == CONSTANT));
}

#[test]
fn screen_buffer_copies_upstream_across_resize() {
    let env = common::headless(Rsize::new(6, 6));
    env.kernel("test:constant", |_| CONSTANT);
    env.kernel("test:present", |fragment| {
        fragment.texture("iChannel0", fragment.uv())
    });
    let mut context = env.context(offscreen());
    context.add_toy_buffer("a", toy("test:constant")).unwrap();
    context.add_toy_buffer("screen", toy("test:present")).unwrap();
    let upstream = context.buffer_input("a").unwrap();
    context
        .set_input("screen", "iChannel0", Input::buffer(upstream))
        .unwrap();
    context.initialize(Rsize::new(6, 6)).unwrap();

    let first = context.render_frame().unwrap().read_pixels().unwrap();
    assert!(first.data.iter().all(|&texel| texel == CONSTANT));
    let live = env.backend.live_objects();

    context.resize(Rsize::new(10, 3)).unwrap();
    for _ in 0..2 {
        let pixels = context.render_frame().unwrap().read_pixels().unwrap();
        assert_eq!((pixels.width, pixels.height), (10, 3));
        assert!(pixels.data.iter().all(|&texel| texel == CONSTANT));
    }
    assert_eq!(env.backend.live_objects(), live);
}

#[test]
fn every_reflected_output_gets_its_own_texture() {
    const EXTRA: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:two-outputs", |fragment| match fragment.output() {
        0 => CONSTANT,
        _ => EXTRA,
    });
    env.kernel("test:copy", |fragment| fragment.texel_fetch("iChannel0", 0, 0));
    let mut context = env.context(offscreen());
    let source = BufferSource::inline(
        "gbuffer.glsl",
        "// test:two-outputs\n\
         layout(location = 1) out vec4 extra;\n\
         void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n\
             fragColor = vec4(0.25, 0.5, 0.75, 1.0);\n\
             extra = vec4(0.0, 1.0, 0.0, 1.0);\n\
         }\n",
    );
    context
        .add_toy_buffer("gbuffer", toyrender::ToyBuffer::new(vec![source]))
        .unwrap();
    context.add_toy_buffer("reader", toy("test:copy")).unwrap();
    let extra = context.buffer_input("gbuffer").unwrap().with_output("extra");
    context
        .set_input("reader", "iChannel0", Input::buffer(extra))
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let gbuffer = context.chain().buffer("gbuffer").unwrap();
    let names: Vec<_> = gbuffer
        .output()
        .borrow()
        .outputs()
        .into_iter()
        .map(|spec| (spec.name, spec.location))
        .collect();
    assert_eq!(
        names,
        vec![
            (Some("toy_FragColor".to_string()), 0),
            (Some("extra".to_string()), 1)
        ]
    );

    let output = context.render_frame().unwrap().read_pixels().unwrap();
    assert!(output.data.iter().all(|&texel| texel == EXTRA));
    let gbuffer = context.chain().buffer("gbuffer").unwrap().output().borrow();
    let color = gbuffer.source_texture_at(0).unwrap().read_pixels().unwrap();
    let extra = gbuffer.source_texture_at(1).unwrap().read_pixels().unwrap();
    assert!(color.data.iter().all(|&texel| texel == CONSTANT));
    assert!(extra.data.iter().all(|&texel| texel == EXTRA));
}

#[test]
fn fixed_render_size_ignores_window_resizes() {
    let env = common::headless(Rsize::new(8, 8));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(ContextConfig {
        render_size: Some(Rsize::new(4, 4)),
        ..offscreen()
    });
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(8, 8)).unwrap();
    context.resize(Rsize::new(32, 32)).unwrap();

    assert_eq!(context.render_size(), Rsize::new(4, 4));
    assert_eq!(context.window_size(), Rsize::new(32, 32));
    assert_eq!(context.render_frame().unwrap().size().unwrap(), (4, 4));
}

#[test]
fn feedback_accumulates_one_per_frame() {
    const FRAMES: usize = 5;
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:feedback", |fragment| {
        let [x, y] = fragment.coord();
        let [r, g, b, a] = fragment.texel_fetch("iChannel0", x as i32, y as i32);
        [r + 1.0, g, b, a]
    });
    let mut context = env.context(offscreen());
    context.add_toy_buffer("accum", toy("test:feedback")).unwrap();
    let own = context.buffer_input("accum").unwrap();
    context
        .set_input("accum", "iChannel0", Input::buffer(own))
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let member = context.chain().buffer("accum").unwrap();
    assert_eq!(member.swap_policy(), SwapPolicy::DoubleBuffer);

    let mut output = None;
    for _ in 0..FRAMES {
        output = Some(context.render_frame().unwrap());
    }
    let pixels = output.unwrap().read_pixels().unwrap();
    assert!(pixels
        .data
        .iter()
        .all(|texel| texel[0] == FRAMES as f32), "{:?}", pixels.data);
}

#[test]
fn double_buffer_parity_follows_frame_count() {
    let env = common::headless(Rsize::new(2, 2));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(offscreen());
    context.add_toy_buffer("a", toy("test:constant")).unwrap();
    context
        .set_swap_policy("a", Some(SwapPolicy::DoubleBuffer))
        .unwrap();
    context.initialize(Rsize::new(2, 2)).unwrap();

    for frame in 1..=4 {
        context.render_frame().unwrap();
        let output = context.chain().buffer("a").unwrap().output().borrow();
        assert_eq!(output.current_write(), frame % 2);
        assert_ne!(output.readable_slot(), output.current_write());
    }
    assert_eq!(context.frame(), 4);
}

#[test]
fn later_buffers_see_this_frame_and_earlier_see_the_last() {
    let env = common::headless(Rsize::new(2, 2));
    let counter = Rc::new(Cell::new(0.0f32));
    let tick = Rc::clone(&counter);
    env.kernel("test:counter", move |_| {
        [tick.get(), 0.0, 0.0, 1.0]
    });
    env.kernel("test:copy", |fragment| fragment.texel_fetch("iChannel0", 0, 0));
    let mut context = env.context(offscreen());
    context.add_toy_buffer("reader_before", toy("test:copy")).unwrap();
    context.add_toy_buffer("source", toy("test:counter")).unwrap();
    context.add_toy_buffer("reader_after", toy("test:copy")).unwrap();
    let source = context.buffer_input("source").unwrap();
    context
        .set_input("reader_before", "iChannel0", Input::buffer(source.clone()))
        .unwrap();
    context
        .set_input("reader_after", "iChannel0", Input::buffer(source))
        .unwrap();
    context.initialize(Rsize::new(2, 2)).unwrap();

    let red = |context: &toyrender::RenderContext, name: &str| {
        let output = context.chain().buffer(name).unwrap().output().borrow();
        let texture = output.source_texture().unwrap();
        let pixels = texture.read_pixels().unwrap();
        pixels.pixel(0, 0).unwrap()[0]
    };
    for frame in 1..=3 {
        counter.set(frame as f32);
        context.render_frame().unwrap();
        assert_eq!(red(&context, "reader_after"), frame as f32);
        assert_eq!(red(&context, "reader_before"), (frame - 1) as f32);
    }
}

#[test]
fn failing_input_falls_back_without_affecting_others() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:copy", |fragment| fragment.texel_fetch("iChannel0", 0, 0));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(offscreen());
    context.add_toy_buffer("broken", toy("test:copy")).unwrap();
    context.add_toy_buffer("healthy", toy("test:constant")).unwrap();
    context
        .set_input("broken", "iChannel0", Input::image("/nonexistent/texture.png"))
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let output = context.render_frame().unwrap();
    assert!(output.read_pixels().unwrap().data.iter().all(|&t| t == CONSTANT));

    let expected = context
        .error_texture()
        .unwrap()
        .read_pixels()
        .unwrap()
        .pixel(0, 0)
        .unwrap();
    let broken = context.chain().buffer("broken").unwrap();
    assert!(!broken.failed());
    let rendered = broken.output().borrow().source_texture().unwrap();
    assert_eq!(rendered.read_pixels().unwrap().pixel(1, 1).unwrap(), expected);

    let Buffer::Toy(buffer) = broken.buffer() else {
        panic!("expected a toy buffer");
    };
    let input = buffer.host().input("iChannel0").unwrap();
    assert!(matches!(input.state(), LoadState::Failed(_)));
}

#[test]
fn failing_channel_does_not_disturb_its_neighbour() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:mixed", |fragment| {
        let [x, y] = fragment.coord();
        let fallback = fragment.texel_fetch("iChannel0", x as i32, y as i32);
        let checker = fragment.texel_fetch("iChannel1", x as i32, y as i32);
        [fallback[0], fallback[1], checker[0], 1.0]
    });
    let mut context = env.context(offscreen());
    context.add_toy_buffer("mixed", toy("test:mixed")).unwrap();
    context
        .set_input("mixed", "iChannel0", Input::image("/nonexistent/texture.png"))
        .unwrap();
    context
        .set_input("mixed", "iChannel1", Input::checker(Rsize::new(4, 4), 1))
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let pixels = context.render_frame().unwrap().read_pixels().unwrap();
    let error = context.error_texture().unwrap().read_pixels().unwrap();
    for y in 0..4 {
        for x in 0..4 {
            let fallback = error.pixel(x, y).unwrap();
            let lit = if (x + y) % 2 == 0 { 1.0 } else { 0.0 };
            assert_eq!(
                pixels.pixel(x, y).unwrap(),
                [fallback[0], fallback[1], lit, 1.0],
                "texel ({x}, {y})"
            );
        }
    }

    let member = context.chain().buffer("mixed").unwrap();
    assert!(!member.failed());
    let Buffer::Toy(buffer) = member.buffer() else {
        panic!("expected a toy buffer");
    };
    let host = buffer.host();
    assert!(matches!(
        host.input("iChannel0").unwrap().state(),
        LoadState::Failed(_)
    ));
    assert_eq!(host.input("iChannel1").unwrap().state(), &LoadState::Ready);
}

#[test]
fn broken_program_is_replaced_by_error_program() {
    let env = common::headless(Rsize::new(4, 4));
    let mut context = env.context(offscreen());
    let source = BufferSource::inline(
        "broken.glsl",
        "void mainImage(out vec4 c, in vec2 p) {\n#error does not compile\n}\n",
    );
    context
        .add_toy_buffer("image", toyrender::ToyBuffer::new(vec![source]))
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let Buffer::Toy(buffer) = context.chain().buffer("image").unwrap().buffer() else {
        panic!("expected a toy buffer");
    };
    assert!(buffer.host().is_substituted());

    let output = context.render_frame().unwrap();
    assert_eq!(
        output.read_pixels().unwrap().pixel(0, 0).unwrap(),
        [1.0, 0.0, 1.0, 1.0]
    );
}

fn geometry(marker: &str, body: &str) -> GeometryBuffer {
    GeometryBuffer::new(
        vec![BufferSource::inline("quad.glsl", SCREEN_QUAD_VERTEX)],
        vec![BufferSource::inline(
            "f.glsl",
            format!("#version 330 core\n// {marker}\n{body}"),
        )],
    )
}

#[test]
fn geometry_buffer_draws_its_own_program() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(offscreen());
    context
        .add_geometry_buffer(
            "mesh",
            geometry(
                "test:constant",
                "out vec4 color;\nvoid main(void) { color = vec4(1.0); }\n",
            ),
        )
        .unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let output = context.render_frame().unwrap().read_pixels().unwrap();
    assert!(output.data.iter().all(|&texel| texel == CONSTANT));
}

#[test]
fn broken_geometry_program_keeps_the_graph_running() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(offscreen());
    context
        .add_geometry_buffer("mesh", geometry("test:broken", "#error broken\n"))
        .unwrap();
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let mesh = context.chain().buffer("mesh").unwrap();
    let Buffer::Geometry(buffer) = mesh.buffer() else {
        panic!("expected a geometry buffer");
    };
    assert!(buffer.is_substituted());

    let output = context.render_frame().unwrap().read_pixels().unwrap();
    assert!(output.data.iter().all(|&texel| texel == CONSTANT));
    let mesh = context.chain().buffer("mesh").unwrap();
    assert!(!mesh.failed());
    let substituted = mesh.output().borrow().source_texture().unwrap();
    assert_eq!(
        substituted.read_pixels().unwrap().pixel(0, 0).unwrap(),
        [1.0, 0.0, 1.0, 1.0]
    );
}

#[test]
fn broken_geometry_program_fails_initialize_without_substitution() {
    let env = common::headless(Rsize::new(4, 4));
    let mut context = env.context(ContextConfig {
        substitute_error_program: false,
        ..offscreen()
    });
    context
        .add_geometry_buffer("mesh", geometry("test:broken", "#error broken\n"))
        .unwrap();
    assert!(matches!(
        context.initialize(Rsize::new(4, 4)),
        Err(Error::Shader(_))
    ));
}

#[test]
fn broken_program_fails_initialize_without_substitution() {
    let env = common::headless(Rsize::new(4, 4));
    let mut context = env.context(ContextConfig {
        substitute_error_program: false,
        ..offscreen()
    });
    let source = BufferSource::inline("broken.glsl", "#error nope\n");
    context
        .add_toy_buffer("image", toyrender::ToyBuffer::new(vec![source]))
        .unwrap();
    assert!(matches!(
        context.initialize(Rsize::new(4, 4)),
        Err(Error::Shader(_))
    ));
}

#[test]
fn lost_context_escapes_render_frame() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(offscreen());
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    env.backend
        .fail_next("draw_arrays", toyrender::error::ApiError::ContextLost);
    let error = context.render_frame().unwrap_err();
    assert!(error.is_systemic());
}

#[test]
fn presentation_failure_does_not_fail_the_frame() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(ContextConfig::default());
    context.add_toy_buffer("image", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();

    let failure = toyrender::error::ApiError::Call {
        operation: "draw_arrays",
        code: 0x0502,
    };
    env.backend.fail_next("draw_arrays", failure.clone());
    env.backend.fail_next("draw_arrays", failure);
    context.render_frame().unwrap();
    let screen = |context: &toyrender::RenderContext| match context
        .chain()
        .member(SCREEN_MEMBER)
        .unwrap()
    {
        Member::Screen(screen) => screen.failed(),
        Member::Buffer(_) => panic!("expected the screen member"),
    };
    assert!(context.chain().buffer("image").unwrap().failed());
    assert!(screen(&context));

    context.render_frame().unwrap();
    assert!(!screen(&context));
    let surface = env.backend.read_surface();
    assert!(approx(surface.pixel(1, 1).unwrap(), CONSTANT, 1.0 / 255.0));
}

#[test]
fn unknown_and_duplicate_names_are_rejected() {
    let env = common::headless(Rsize::new(4, 4));
    let mut context = env.context(offscreen());
    context.add_toy_buffer("a", toy("test:constant")).unwrap();
    assert!(matches!(
        context.add_toy_buffer("a", toy("test:constant")),
        Err(Error::DuplicateMember(_))
    ));
    assert!(matches!(
        context.buffer_input("missing"),
        Err(Error::UnknownBuffer(_))
    ));
    assert!(matches!(
        context.render_frame(),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn shutdown_releases_every_object() {
    let env = common::headless(Rsize::new(4, 4));
    env.kernel("test:constant", |_| CONSTANT);
    let mut context = env.context(ContextConfig::default());
    context.add_toy_buffer("a", toy("test:constant")).unwrap();
    context.add_toy_buffer("b", toy("test:constant")).unwrap();
    context.initialize(Rsize::new(4, 4)).unwrap();
    context.render_frame().unwrap();
    assert!(env.backend.live_count(ResourceType::Program) >= 3);

    context.shutdown();
    assert_eq!(env.backend.live_objects(), 0);
}
