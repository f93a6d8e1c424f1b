use std::sync::Arc;

use glam::UVec2;

use super::{GlContext, Value};
use crate::gl;
use crate::gpu::mock::{MockDevice, MockSurface};

fn context() -> GlContext {
    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(MockSurface::new(UVec2::new(640, 480)));
    GlContext::new(device, surface)
}

fn link_simple(ctx: &mut GlContext) -> super::ProgramId {
    let vs = ctx.create_shader(gl::VERTEX_SHADER).unwrap();
    ctx.shader_source(
        vs,
        "uniform float u_time; void main() { gl_Position = vec4(u_time); }",
    );
    let fs = ctx.create_shader(gl::FRAGMENT_SHADER).unwrap();
    ctx.shader_source(
        fs,
        "precision mediump float; uniform vec3 u_color;\
         void main() { gl_FragColor = vec4(u_color, 1.0); }",
    );
    let program = ctx.create_program();
    ctx.attach_shader(program, vs);
    ctx.attach_shader(program, fs);
    ctx.link_program(program);
    program
}

#[test]
fn initial_state_matches_the_legacy_defaults() {
    let mut ctx = context();

    assert!(ctx.is_enabled(gl::DITHER));
    assert!(!ctx.is_enabled(gl::DEPTH_TEST));
    assert!(!ctx.is_enabled(gl::CULL_FACE));
    assert!(!ctx.is_enabled(gl::BLEND));

    assert_eq!(
        ctx.get_parameter(gl::CULL_FACE_MODE).unwrap(),
        Value::Uint(gl::BACK),
    );
    assert_eq!(
        ctx.get_parameter(gl::FRONT_FACE).unwrap(),
        Value::Uint(gl::CCW),
    );
    assert_eq!(
        ctx.get_parameter(gl::DEPTH_FUNC).unwrap(),
        Value::Uint(gl::LESS),
    );
    assert_eq!(
        ctx.get_parameter(gl::COLOR_WRITEMASK).unwrap(),
        Value::BoolArray([true; 4]),
    );
    assert_eq!(
        ctx.get_parameter(gl::COLOR_CLEAR_VALUE).unwrap(),
        Value::FloatArray(vec![0.0; 4]),
    );
    assert_eq!(
        ctx.get_parameter(gl::DEPTH_CLEAR_VALUE).unwrap(),
        Value::Float(1.0),
    );
    assert_eq!(
        ctx.get_parameter(gl::STENCIL_CLEAR_VALUE).unwrap(),
        Value::Int(0),
    );
    assert_eq!(
        ctx.get_parameter(gl::BLEND_SRC_RGB).unwrap(),
        Value::Uint(gl::ONE),
    );
    assert_eq!(
        ctx.get_parameter(gl::BLEND_DST_ALPHA).unwrap(),
        Value::Uint(gl::ZERO),
    );
    assert_eq!(
        ctx.get_parameter(gl::BLEND_EQUATION_RGB).unwrap(),
        Value::Uint(gl::FUNC_ADD),
    );
    // The viewport starts at the surface size.
    assert_eq!(
        ctx.get_parameter(gl::VIEWPORT).unwrap(),
        Value::IntArray(vec![0, 0, 640, 480]),
    );
}

#[test]
fn error_latch_keeps_the_first_error_until_read() {
    let mut ctx = context();

    ctx.enable(0xDEAD);
    ctx.cull_face(0xBEEF);

    assert_eq!(ctx.get_error(), gl::INVALID_ENUM);
    assert_eq!(ctx.get_error(), gl::NO_ERROR);
}

#[test]
fn invalid_shader_kind_returns_null_and_latches() {
    let mut ctx = context();
    assert!(ctx.create_shader(gl::TEXTURE_2D).is_none());
    assert_eq!(ctx.get_error(), gl::INVALID_ENUM);
}

#[test]
fn rebinding_is_idempotent() {
    let mut ctx = context();
    let buffer = ctx.create_buffer();

    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(buffer));
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(buffer));
    assert_eq!(ctx.state.array_buffer, Some(buffer));
    assert_eq!(ctx.get_error(), gl::NO_ERROR);

    ctx.active_texture(gl::TEXTURE0 + 3);
    ctx.active_texture(gl::TEXTURE0 + 3);
    assert_eq!(ctx.state.active_texture, 3);

    let program = link_simple(&mut ctx);
    ctx.use_program(Some(program));
    ctx.use_program(Some(program));
    assert_eq!(ctx.state.current_program, Some(program));
    assert_eq!(ctx.get_error(), gl::NO_ERROR);
}

#[test]
fn link_success_is_signaled_by_the_compiled_artifact() {
    let mut ctx = context();
    let program = link_simple(&mut ctx);

    assert_eq!(
        ctx.get_program_parameter(program, gl::LINK_STATUS),
        Value::Bool(true),
    );
    assert!(ctx.get_program_info_log(program).is_empty());
    assert!(ctx.wgsl_source(program).is_some());
    assert_eq!(
        ctx.get_program_parameter(program, gl::ACTIVE_UNIFORMS),
        Value::Int(2),
    );
    assert_eq!(
        ctx.get_program_parameter(program, gl::ATTACHED_SHADERS),
        Value::Int(2),
    );
}

#[test]
fn link_failure_populates_the_info_log() {
    let mut ctx = context();
    let vs = ctx.create_shader(gl::VERTEX_SHADER).unwrap();
    ctx.shader_source(vs, "void main() { gl_Position = vec4(u_undeclared); }");
    let fs = ctx.create_shader(gl::FRAGMENT_SHADER).unwrap();
    ctx.shader_source(fs, "void main() { gl_FragColor = vec4(1.0); }");
    let program = ctx.create_program();
    ctx.attach_shader(program, vs);
    ctx.attach_shader(program, fs);
    ctx.link_program(program);

    assert_eq!(
        ctx.get_program_parameter(program, gl::LINK_STATUS),
        Value::Bool(false),
    );
    let log = ctx.get_program_info_log(program);
    assert!(log.contains("u_undeclared"), "{log}");
    assert!(ctx.wgsl_source(program).is_none());
}

#[test]
fn link_without_attached_shaders_fails() {
    let mut ctx = context();
    let program = ctx.create_program();
    ctx.link_program(program);
    assert_eq!(
        ctx.get_program_parameter(program, gl::LINK_STATUS),
        Value::Bool(false),
    );
    assert!(!ctx.get_program_info_log(program).is_empty());
}

#[test]
fn shader_compile_status_is_always_true() {
    let mut ctx = context();
    let shader = ctx.create_shader(gl::FRAGMENT_SHADER).unwrap();
    ctx.shader_source(shader, "this is not glsl");
    ctx.compile_shader(shader);
    assert_eq!(
        ctx.get_shader_parameter(shader, gl::COMPILE_STATUS),
        Value::Bool(true),
    );
    assert_eq!(
        ctx.get_shader_parameter(shader, gl::SHADER_TYPE),
        Value::Uint(gl::FRAGMENT_SHADER),
    );
    assert!(ctx.get_shader_info_log(shader).is_empty());
}

#[test]
fn deleting_an_attached_shader_is_a_flag_not_a_free() {
    let mut ctx = context();
    let program = link_simple(&mut ctx);
    let vs = ctx.programs[program].vertex.unwrap();

    ctx.delete_shader(vs);
    assert!(ctx.is_shader(vs));
    assert_eq!(
        ctx.get_shader_parameter(vs, gl::DELETE_STATUS),
        Value::Bool(true),
    );

    // Relinking still works: the source outlives the deletion flag.
    ctx.link_program(program);
    assert_eq!(
        ctx.get_program_parameter(program, gl::LINK_STATUS),
        Value::Bool(true),
    );
}

#[test]
fn uniform_writes_validate_the_payload_shape() {
    let mut ctx = context();
    let program = link_simple(&mut ctx);
    ctx.use_program(Some(program));

    let time = ctx.get_uniform_location(program, "u_time").unwrap();
    ctx.uniform1f(Some(&time), 1.5);
    assert_eq!(ctx.get_error(), gl::NO_ERROR);

    // u_time is a float; a vec3 write is a type mismatch.
    ctx.uniform3f(Some(&time), 1.0, 2.0, 3.0);
    assert_eq!(ctx.get_error(), gl::INVALID_OPERATION);
}

#[test]
fn null_uniform_location_is_silently_absorbed() {
    let mut ctx = context();
    let program = link_simple(&mut ctx);
    ctx.use_program(Some(program));

    ctx.uniform1f(None, 1.0);
    ctx.uniform4fv(None, &[0.0; 4]);
    assert_eq!(ctx.get_error(), gl::NO_ERROR);
}

#[test]
fn uniform_location_is_bound_to_its_program() {
    let mut ctx = context();
    let first = link_simple(&mut ctx);
    let second = link_simple(&mut ctx);

    let location = ctx.get_uniform_location(first, "u_time").unwrap();
    ctx.use_program(Some(second));
    ctx.uniform1f(Some(&location), 1.0);
    assert_eq!(ctx.get_error(), gl::INVALID_OPERATION);
}

#[test]
fn unknown_uniform_names_resolve_to_null() {
    let mut ctx = context();
    let program = link_simple(&mut ctx);
    assert!(ctx.get_uniform_location(program, "u_missing").is_none());
    assert_eq!(ctx.get_error(), gl::NO_ERROR);
}

#[test]
fn get_uniform_location_on_unlinked_program_latches() {
    let mut ctx = context();
    let program = ctx.create_program();
    assert!(ctx.get_uniform_location(program, "u_time").is_none());
    assert_eq!(ctx.get_error(), gl::INVALID_OPERATION);
}

#[test]
fn attrib_locations_come_from_the_artifact() {
    let mut ctx = context();
    let vs = ctx.create_shader(gl::VERTEX_SHADER).unwrap();
    ctx.shader_source(
        vs,
        "attribute vec2 a_pos; attribute vec3 a_color;\
         void main() { gl_Position = vec4(a_pos + a_color.xy, 0.0, 1.0); }",
    );
    let fs = ctx.create_shader(gl::FRAGMENT_SHADER).unwrap();
    ctx.shader_source(
        fs,
        "precision mediump float; void main() { gl_FragColor = vec4(1.0); }",
    );
    let program = ctx.create_program();
    ctx.attach_shader(program, vs);
    ctx.attach_shader(program, fs);
    ctx.link_program(program);

    assert_eq!(ctx.get_attrib_location(program, "a_pos"), 0);
    assert_eq!(ctx.get_attrib_location(program, "a_color"), 1);
    assert_eq!(ctx.get_attrib_location(program, "a_missing"), -1);
    assert_eq!(
        ctx.get_program_parameter(program, gl::ACTIVE_ATTRIBUTES),
        Value::Int(2),
    );
}

#[test]
fn precision_format_constants_are_fixed() {
    let mut ctx = context();
    let float_format = ctx.get_shader_precision_format(gl::FRAGMENT_SHADER, gl::HIGH_FLOAT);
    assert_eq!(
        (float_format.range_min, float_format.range_max, float_format.precision),
        (127, 127, 23),
    );
    let int_format = ctx.get_shader_precision_format(gl::VERTEX_SHADER, gl::MEDIUM_INT);
    assert_eq!(
        (int_format.range_min, int_format.range_max, int_format.precision),
        (31, 30, 0),
    );
}

#[test]
fn unimplemented_entry_points_raise_the_distinguished_error() {
    let mut ctx = context();
    let err = ctx.read_pixels().unwrap_err();
    assert!(err.is_not_implemented());
    assert!(ctx.stencil_op(0, 0, 0).unwrap_err().is_not_implemented());
    assert!(ctx.line_width(2.0).unwrap_err().is_not_implemented());
    assert!(ctx.create_framebuffer().unwrap_err().is_not_implemented());
    let err = ctx.get_parameter(0xFFFF_FFFF).unwrap_err();
    assert!(err.is_not_implemented());
}

#[test]
fn context_attributes_are_fixed() {
    let ctx = context();
    let attributes = ctx.get_context_attributes();
    assert!(attributes.alpha);
    assert!(attributes.depth);
    assert!(!attributes.stencil);
    assert!(!attributes.antialias);
}

#[test]
fn imported_buffers_expose_their_device_handle() {
    let mut ctx = context();
    let device = ctx.device().clone();
    let raw = device.create_buffer(&crate::gpu::BufferDescriptor {
        size: 64,
        usage: crate::gpu::BufferUsage::VERTEX | crate::gpu::BufferUsage::COPY_DST,
    });

    let handle = ctx.import_device_buffer(raw.clone());
    assert!(ctx.is_buffer(handle));
    let back = ctx.get_device_buffer(handle).unwrap();
    assert!(Arc::ptr_eq(&back, &raw));
}

#[test]
fn clear_latch_accumulates_until_a_draw() {
    let mut ctx = context();
    ctx.clear(gl::COLOR_BUFFER_BIT);
    ctx.clear(gl::DEPTH_BUFFER_BIT);
    assert_eq!(
        ctx.state.clear_mask,
        gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT,
    );

    ctx.clear(0xFFFF_FFFF);
    assert_eq!(ctx.get_error(), gl::INVALID_VALUE);
}
