//! Built-in GLSL sources.

/// Marker found in the screen blit fragment shader.
pub const SCREEN_BLIT_MARKER: &str = "toyrender:screen-blit";

/// Marker found in the error program's fragment source.
pub const ERROR_PROGRAM_MARKER: &str = "toyrender:error-program";

/// Part names used by [`FRAGMENT_TEMPLATE`].
pub const BUFFER_DEFINES: &str = "buffer:defines";
pub const BUFFER_INPUTS: &str = "buffer:inputs";
pub const BUFFER_SOURCES: &str = "buffer:sources";

/// Full-screen triangle; three vertices, no attributes.
pub const SCREEN_QUAD_VERTEX: &str = r"#version 330 core
out vec2 toy_TexCoord;

void main(void) {
    vec2 corner = vec2(float((gl_VertexID << 1) & 2), float(gl_VertexID & 2));
    toy_TexCoord = corner;
    gl_Position = vec4(corner * 2.0 - 1.0, 0.0, 1.0);
}
";

/// Fragment template wrapping Shadertoy-style `mainImage` code.
pub const FRAGMENT_TEMPLATE: &str = r"#version 330 core
#pragma toyrender part glsl:defines
#pragma toyrender part buffer:defines
uniform vec3 iResolution;
uniform float iTime;
uniform float iTimeDelta;
uniform int iFrame;
uniform float iFrameRate;
uniform float iChannelTime[4];
uniform vec3 iChannelResolution[4];
uniform vec4 iMouse;
uniform vec4 iDate;
uniform float iSampleRate;
uniform sampler2D iChannel0;
uniform sampler2D iChannel1;
uniform sampler2D iChannel2;
uniform sampler2D iChannel3;
#pragma toyrender part buffer:inputs
in vec2 toy_TexCoord;
layout(location = 0) out vec4 toy_FragColor;
#pragma toyrender part buffer:sources
void main(void) {
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, gl_FragCoord.xy);
    toy_FragColor = color;
}
";

/// `mainImage` body compiled in place of a buffer that failed to build.
pub const ERROR_PROGRAM_SOURCE: &str = r"// toyrender:error-program
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 tile = floor(fragCoord / 16.0);
    bool even = mod(tile.x + tile.y, 2.0) < 0.5;
    fragColor = even ? vec4(1.0, 0.0, 1.0, 1.0) : vec4(0.0, 0.0, 0.0, 1.0);
}
";

/// `mainImage` copying the `screenTexture` input to the bound framebuffer.
pub const SCREEN_BLIT_FRAGMENT: &str = r"// toyrender:screen-blit
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    fragColor = texture(screenTexture, fragCoord / iResolution.xy);
}
";

/// Color written to a buffer whose draw failed.
pub const ERROR_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
