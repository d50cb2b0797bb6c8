/// WGSL vertex shader for the textured quad.
pub const QUAD_VERTEX_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> u_model: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_view: mat4x4<f32>;
@group(0) @binding(2) var<uniform> u_proj: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) v_tex: vec2<f32>,
};

@vertex
fn vs_main(@location(0) a_pos: vec3<f32>, @location(1) a_tex: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u_proj * u_view * u_model * vec4<f32>(a_pos, 1.0);
    out.v_tex = a_tex;
    return out;
}
"#;

/// WGSL fragment shader for the textured quad. Texture coordinates are
/// flipped on both axes, matching the image orientation of the quad data.
pub const QUAD_FRAGMENT_SHADER: &str = r#"
@group(1) @binding(0) var u_tex: texture_2d<f32>;
@group(1) @binding(1) var u_sampler: sampler;

@fragment
fn fs_main(@location(0) v_tex: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_tex, u_sampler, 1.0 - v_tex);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{UniformKind, link_program};

    #[test]
    fn quad_program_links() {
        let iface = link_program(QUAD_VERTEX_SHADER, QUAD_FRAGMENT_SHADER).unwrap();
        for name in ["u_model", "u_view", "u_proj"] {
            assert_eq!(iface.uniform(name).unwrap().kind, UniformKind::Buffer { size: 64 });
        }
        assert_eq!(iface.attribute("a_pos").unwrap().components, 3);
        assert_eq!(iface.attribute("a_tex").unwrap().components, 2);
        assert!(iface.uniform("u_tex").unwrap().visibility.fragment);
    }
}
