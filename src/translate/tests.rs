use super::translate;
use crate::types::GlslType;

const EMPTY_FRAGMENT: &str = "precision mediump float;\nvoid main() { gl_FragColor = vec4(1.0); }";

fn validate_wgsl(wgsl: &str) {
    let module = naga::front::wgsl::parse_str(wgsl)
        .unwrap_or_else(|err| panic!("emitted invalid WGSL: {err}\n---\n{wgsl}"));
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|err| panic!("emitted non-validating WGSL: {err:?}\n---\n{wgsl}"));
}

#[test]
fn minimal_program_lowering() {
    let program = translate(
        "void main() { gl_Position = vec4(0.0, 0.0, 0.5, 1.0); }",
        EMPTY_FRAGMENT,
    )
    .unwrap();

    assert!(!program.wgsl.contains("_uniforms"));
    assert!(program.wgsl.contains("@vertex"));
    assert!(program.wgsl.contains("_v_main();"));
    assert!(program.wgsl.contains("@builtin(position)"));
    assert!(
        program
            .wgsl
            .contains("out.position.z = out.position.z * 0.5 + 0.5;"),
        "missing depth-range remap:\n{}",
        program.wgsl,
    );
    assert!(program.wgsl.contains("@fragment"));
    assert!(program.wgsl.contains("gl_FragColor = vec4f(1.0)"));

    validate_wgsl(&program.wgsl);
}

#[test]
fn uniform_struct_packing() {
    let program = translate(
        "uniform float u_time;\nvoid main() { gl_Position = vec4(u_time); }",
        "precision mediump float;\nuniform vec3 u_color;\nuniform mat4 u_mvp;\n\
         void main() { gl_FragColor = u_mvp * vec4(u_color, 1.0); }",
    )
    .unwrap();

    let layout = program.uniform_buffer.unwrap();
    assert_eq!(layout.binding, 0);
    assert_eq!(layout.size, 96);

    let offsets: Vec<(&str, u32)> = program
        .uniforms
        .iter()
        .map(|u| (u.name.as_str(), u.offset))
        .collect();
    assert_eq!(
        offsets,
        vec![("u_time", 0), ("u_color", 16), ("u_mvp", 32)],
    );
    assert!(program.uniforms.iter().all(|u| u.binding == 0));

    validate_wgsl(&program.wgsl);
}

#[test]
fn uniform_offsets_divisible_by_alignment() {
    let program = translate(
        "uniform float u_time;\nvoid main() { gl_Position = vec4(u_time); }",
        "precision mediump float;\nuniform vec3 u_color;\nuniform mat4 u_mvp;\n\
         uniform vec2 u_half;\nvoid main() { gl_FragColor = u_mvp * vec4(u_color + vec3(u_half, 0.0), 1.0); }",
    )
    .unwrap();

    for uniform in &program.uniforms {
        let resolved = program.resolve_uniform(&uniform.name).unwrap();
        assert_eq!(
            resolved.offset % uniform.ty.align(),
            0,
            "uniform {} offset {} not aligned to {}",
            uniform.name,
            resolved.offset,
            uniform.ty.align(),
        );
    }
}

#[test]
fn sampler_pairing() {
    let program = translate(
        "attribute vec2 a_pos;\nvarying vec2 v_uv;\n\
         void main() { v_uv = a_pos; gl_Position = vec4(a_pos, 0.0, 1.0); }",
        "precision mediump float;\nvarying vec2 v_uv;\nuniform sampler2D u_tex;\n\
         void main() { gl_FragColor = texture2D(u_tex, v_uv); }",
    )
    .unwrap();

    assert_eq!(program.textures.len(), 1);
    let texture = &program.textures[0];
    assert_eq!(texture.binding, 0);
    assert_eq!(texture.sampler_binding, 1);
    assert_eq!(program.sampler_map().collect::<Vec<_>>(), vec![(1, 0)]);
    assert!(program.uniform_buffer.is_none());

    assert!(program
        .wgsl
        .contains("textureSample(u_tex, u_tex_sampler, v_uv)"));

    validate_wgsl(&program.wgsl);
}

#[test]
fn attribute_locations_skip_explicit_layout() {
    let program = translate(
        "#version 300 es\n\
         in vec2 a_one;\nlayout(location = 2) in vec2 a_pinned;\nin vec2 a_two;\n\
         void main() { gl_Position = vec4(a_one + a_pinned + a_two, 0.0, 1.0); }",
        EMPTY_FRAGMENT,
    )
    .unwrap();

    assert_eq!(program.attribute_location("a_one"), Some(0));
    assert_eq!(program.attribute_location("a_pinned"), Some(2));
    assert_eq!(program.attribute_location("a_two"), Some(1));
}

#[test]
fn attribute_locations_are_source_ordered() {
    let program = translate(
        "attribute vec2 a_position;\nattribute vec3 a_normal;\nattribute vec2 a_uv;\n\
         void main() { gl_Position = vec4(a_position + a_uv + a_normal.xy, 0.0, 1.0); }",
        EMPTY_FRAGMENT,
    )
    .unwrap();

    for (index, attribute) in program.attributes.iter().enumerate() {
        assert_eq!(attribute.location, index as u32);
    }
}

#[test]
fn varyings_match_by_name_across_stages() {
    let program = translate(
        "attribute vec2 a_pos;\nvarying vec2 v_uv;\nvarying vec3 v_color;\n\
         void main() { v_uv = a_pos; v_color = vec3(1.0); gl_Position = vec4(a_pos, 0.0, 1.0); }",
        "precision mediump float;\nvarying vec3 v_color;\nvarying vec2 v_uv;\n\
         void main() { gl_FragColor = vec4(v_color, v_uv.x); }",
    )
    .unwrap();

    let uv = program.varyings.iter().find(|v| v.name == "v_uv").unwrap();
    let color = program
        .varyings
        .iter()
        .find(|v| v.name == "v_color")
        .unwrap();
    // Vertex-stage declaration order drives the locations; the fragment
    // stage declaring them in reverse order changes nothing.
    assert_eq!(uv.location, 0);
    assert_eq!(color.location, 1);

    validate_wgsl(&program.wgsl);
}

#[test]
fn varying_type_mismatch_fails_link() {
    let result = translate(
        "varying vec2 v_uv;\nvoid main() { v_uv = vec2(0.0); gl_Position = vec4(1.0); }",
        "precision mediump float;\nvarying vec3 v_uv;\nvoid main() { gl_FragColor = vec4(v_uv, 1.0); }",
    );
    assert!(result.is_err());
}

#[test]
fn nested_uniform_paths_resolve_offsets() {
    let program = translate(
        "void main() { gl_Position = vec4(1.0); }",
        "precision mediump float;\n\
         struct Light { vec3 dir; float power; };\n\
         uniform Light u_lights[2];\nuniform float u_pad;\n\
         void main() { gl_FragColor = vec4(u_lights[0].dir, u_pad); }",
    )
    .unwrap();

    // Light lays out as dir@0, power@12, sized 16; the uniform-block array
    // stride is max(align, 16)-padded.
    let first = program.resolve_uniform("u_lights[0].power").unwrap();
    assert_eq!(first.offset, 12);
    let second = program.resolve_uniform("u_lights[1].power").unwrap();
    assert_eq!(second.offset, 28);
    assert_eq!(second.ty, GlslType::Float);

    let dir = program.resolve_uniform("u_lights[1].dir").unwrap();
    assert_eq!(dir.offset, 16);
    assert_eq!(dir.ty, GlslType::Vec3);

    let pad = program.resolve_uniform("u_pad").unwrap();
    assert_eq!(pad.offset, 32);

    assert!(program.resolve_uniform("u_lights[2].dir").is_none());
    assert!(program.resolve_uniform("u_lights[0].missing").is_none());
}

#[test]
fn bool_uniform_is_stored_as_u32() {
    let program = translate(
        "void main() { gl_Position = vec4(1.0); }",
        "precision mediump float;\nuniform bool u_invert;\n\
         void main() { if (u_invert) { gl_FragColor = vec4(0.0); } else { gl_FragColor = vec4(1.0); } }",
    )
    .unwrap();

    assert!(program.wgsl.contains("u_invert: u32"));
    assert!(program.wgsl.contains("(_uniforms.u_invert != 0u)"));

    validate_wgsl(&program.wgsl);
}

#[test]
fn out_parameters_lower_to_pointers() {
    let program = translate(
        "void main() { gl_Position = vec4(1.0); }",
        "precision mediump float;\n\
         void split(float x, out float o) { o = x * 0.5; }\n\
         void main() { float half_; split(1.0, half_); gl_FragColor = vec4(half_); }",
    )
    .unwrap();

    assert!(program.wgsl.contains("o: ptr<function, f32>"));
    assert!(program.wgsl.contains("(*o) = "));
    assert!(program.wgsl.contains("_f_split(1.0, &half_)"));

    validate_wgsl(&program.wgsl);
}

#[test]
fn defines_fold_into_expressions() {
    let program = translate(
        "#define SCALE 2.0\nattribute vec2 a_pos;\n\
         void main() { gl_Position = vec4(a_pos * SCALE, 0.0, 1.0); }",
        EMPTY_FRAGMENT,
    )
    .unwrap();

    assert!(program.wgsl.contains("a_pos * 2.0"));
}

#[test]
fn disabled_branches_are_not_translated() {
    let program = translate(
        "attribute vec2 a_pos;\n\
         #ifdef USE_OFFSET\nuniform vec2 u_offset;\n#endif\n\
         void main() { gl_Position = vec4(a_pos, 0.0, 1.0); }",
        EMPTY_FRAGMENT,
    )
    .unwrap();

    assert!(program.uniform_buffer.is_none());
    assert!(!program.wgsl.contains("u_offset"));
}

#[test]
fn unknown_identifier_reports_trace() {
    let err = translate(
        "void main() { gl_Position = vec4(u_missing); }",
        EMPTY_FRAGMENT,
    )
    .unwrap_err();

    let rendered = err.to_string();
    assert!(rendered.contains("u_missing"), "{rendered}");
    assert!(rendered.contains("fn main"), "{rendered}");
}

#[test]
fn textured_program_emits_valid_wgsl() {
    let program = translate(
        "attribute vec2 a_position;\nattribute vec2 a_uv;\nuniform mat4 u_mvp;\nvarying vec2 v_uv;\n\
         void main() {\n    v_uv = a_uv;\n    gl_Position = u_mvp * vec4(a_position, 0.0, 1.0);\n}",
        "precision mediump float;\nvarying vec2 v_uv;\nuniform sampler2D u_tex;\nuniform vec4 u_tint;\n\
         float luma(vec3 c) {\n    return dot(c, vec3(0.299, 0.587, 0.114));\n}\n\
         void main() {\n    vec4 color = texture2D(u_tex, v_uv);\n    float l = luma(color.rgb);\n\
             gl_FragColor = l > 0.5 ? color * u_tint : vec4(0.0);\n}",
    )
    .unwrap();

    // Vertex uniforms precede fragment uniforms, so the struct takes
    // binding 0 and the sampler pair 1/2.
    assert_eq!(program.uniform_buffer.unwrap().binding, 0);
    assert_eq!(program.textures[0].binding, 1);
    assert_eq!(program.textures[0].sampler_binding, 2);
    assert!(program.wgsl.contains("select("));

    validate_wgsl(&program.wgsl);
}

#[test]
fn loops_and_helpers_emit_valid_wgsl() {
    let program = translate(
        "attribute vec2 a_pos;\nuniform mat4 u_model;\nvarying vec3 v_normal;\n\
         void main() {\n    v_normal = mat3(u_model) * vec3(a_pos, 1.0);\n\
             gl_Position = vec4(a_pos, 0.0, 1.0);\n}",
        "precision mediump float;\nvarying vec3 v_normal;\nuniform float u_levels[4];\n\
         void main() {\n    float acc = 0.0;\n    for (int i = 0; i < 4; i++) {\n        acc += u_levels[i];\n    }\n\
             gl_FragColor = vec4(v_normal * mod(acc, 1.0), 1.0);\n}",
    )
    .unwrap();

    assert!(program.wgsl.contains("_mat3_from_mat4"));
    // Scalar uniform arrays pad their elements to a 16-byte stride.
    assert!(program.wgsl.contains("array<_Pad_f32, 4>"));
    assert!(program.wgsl.contains(".el"));

    validate_wgsl(&program.wgsl);
}

#[test]
fn struct_uniform_members_emit_valid_wgsl() {
    let program = translate(
        "void main() { gl_Position = vec4(1.0); }",
        "precision mediump float;\n\
         struct Fog { vec3 color; float density; };\n\
         uniform Fog u_fog;\n\
         void main() { gl_FragColor = vec4(u_fog.color * u_fog.density, 1.0); }",
    )
    .unwrap();

    assert!(program.wgsl.contains("struct _f_Fog"));
    assert!(program.wgsl.contains("_uniforms.u_fog.color"));

    let resolved = program.resolve_uniform("u_fog.density").unwrap();
    assert_eq!(resolved.offset, 12);

    validate_wgsl(&program.wgsl);
}
