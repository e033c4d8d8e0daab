//! Shader programs for the compositor.
//!
//! The fixed pipelines (single-texture blit, two-texture alpha overlay) are
//! WGSL. Transition effects are data: community GLSL fragments declaring
//! `vec4 transition(vec2 uv)`, spliced into a fixed scaffold and compiled
//! through the GLSL frontend whenever the rotation installs a new effect.
//! Helpers the effect already defines are detected by a conservative
//! signature scan and suppressed to avoid duplicate definitions.

use regex::Regex;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::template::TransitionEffect;

/// Per-frame uniform state for the transition program. `ratio` is bound
/// once per install; only `progress` changes per frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransitionParams {
    pub progress: f32,
    pub ratio: f32,
    pub _pad: [f32; 2],
}

/// Fullscreen triangle vertex stage shared by every pipeline.
const FULLSCREEN_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;
    let x = f32((vertex_index & 1u) << 2u) - 1.0;
    let y = 1.0 - f32((vertex_index & 2u) << 1u);
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);
    return out;
}
"#;

/// Opaque draw of a single frame texture.
const BLIT_FRAGMENT: &str = r#"
@group(0) @binding(0) var frame_tex: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(textureSample(frame_tex, frame_sampler, uv).rgb, 1.0);
}
"#;

/// Straight-alpha composite of an overlay (border, subtitle) onto a base
/// frame.
const OVERLAY_FRAGMENT: &str = r#"
@group(0) @binding(0) var base_tex: texture_2d<f32>;
@group(0) @binding(1) var overlay_tex: texture_2d<f32>;
@group(0) @binding(2) var overlay_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let base = textureSample(base_tex, overlay_sampler, uv);
    let overlay = textureSample(overlay_tex, overlay_sampler, uv);
    let rgb = base.rgb * (1.0 - overlay.a) + overlay.rgb * overlay.a;
    return vec4<f32>(rgb, 1.0);
}
"#;

const SCAFFOLD_HEADER: &str = r#"#version 450

layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 f_color;

layout(set = 0, binding = 0) uniform texture2D from_image;
layout(set = 0, binding = 1) uniform texture2D to_image;
layout(set = 0, binding = 2) uniform sampler frame_sampler;
layout(set = 0, binding = 3) uniform TransitionParams {
    float progress;
    float ratio;
};
"#;

const SCAFFOLD_MAIN: &str = r#"
void main() {
    if (progress <= 0.0) f_color = getFromColor(v_uv);
    else if (progress >= 1.0) f_color = getToColor(v_uv);
    else f_color = transition(v_uv);
}
"#;

/// Splice an effect body into the transition scaffold.
///
/// Helpers already present in the effect are detected by signature and not
/// emitted a second time.
pub fn assemble_transition_source(effect: &str) -> String {
    let mut helpers = Vec::new();
    if !defines(effect, r"\bvec4\s+getFromColor\s*\(") {
        helpers.push(
            "vec4 getFromColor(vec2 uv) { return texture(sampler2D(from_image, frame_sampler), uv); }",
        );
    }
    if !defines(effect, r"\bvec4\s+getToColor\s*\(") {
        helpers.push(
            "vec4 getToColor(vec2 uv) { return texture(sampler2D(to_image, frame_sampler), uv); }",
        );
    }
    if !defines(effect, r"(?i)\bfloat\s+rand\s*\(") {
        helpers.push(
            "float rand(vec2 co) { return fract(sin(dot(co.xy, vec2(12.9898, 78.233))) * 43758.5453); }",
        );
    }

    format!(
        "{SCAFFOLD_HEADER}\n{}\n\n{effect}\n{SCAFFOLD_MAIN}",
        helpers.join("\n")
    )
}

fn defines(source: &str, signature: &str) -> bool {
    Regex::new(signature)
        .map(|re| re.is_match(source))
        .unwrap_or(false)
}

/// Compiled pipelines and their bind group layouts.
pub struct ShaderRegistry {
    pub blit_layout: wgpu::BindGroupLayout,
    pub overlay_layout: wgpu::BindGroupLayout,
    pub transition_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    overlay_pipeline: wgpu::RenderPipeline,
    transition: Option<(String, wgpu::RenderPipeline)>,
    vertex_module: wgpu::ShaderModule,
    transition_pipeline_layout: wgpu::PipelineLayout,
}

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl ShaderRegistry {
    pub fn new(device: &wgpu::Device) -> RenderResult<Self> {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen vertex"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX.into()),
        });

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
            ],
        });
        let overlay_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                sampler_entry(2),
            ],
        });
        let transition_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("transition layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                sampler_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<TransitionParams>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let blit_fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit fragment"),
            source: wgpu::ShaderSource::Wgsl(BLIT_FRAGMENT.into()),
        });
        let overlay_fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay fragment"),
            source: wgpu::ShaderSource::Wgsl(OVERLAY_FRAGMENT.into()),
        });

        let blit_pipeline = build_pipeline(
            device,
            "blit pipeline",
            &blit_layout,
            &vertex_module,
            &blit_fragment,
            "fs_main",
        );
        let overlay_pipeline = build_pipeline(
            device,
            "overlay pipeline",
            &overlay_layout,
            &vertex_module,
            &overlay_fragment,
            "fs_main",
        );

        let transition_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("transition pipeline layout"),
                bind_group_layouts: &[&transition_layout],
                push_constant_ranges: &[],
            });

        Ok(Self {
            blit_layout,
            overlay_layout,
            transition_layout,
            blit_pipeline,
            overlay_pipeline,
            transition: None,
            vertex_module,
            transition_pipeline_layout,
        })
    }

    pub fn blit_pipeline(&self) -> &wgpu::RenderPipeline {
        &self.blit_pipeline
    }

    pub fn overlay_pipeline(&self) -> &wgpu::RenderPipeline {
        &self.overlay_pipeline
    }

    /// Pipeline of the currently installed transition effect.
    pub fn transition_pipeline(&self) -> RenderResult<&wgpu::RenderPipeline> {
        self.transition
            .as_ref()
            .map(|(_, p)| p)
            .ok_or_else(|| RenderError::gpu("no transition effect installed"))
    }

    /// Compile and install a transition effect; a no-op when the effect is
    /// already active.
    pub fn install_transition(
        &mut self,
        device: &wgpu::Device,
        effect: &TransitionEffect,
    ) -> RenderResult<()> {
        if self
            .transition
            .as_ref()
            .is_some_and(|(name, _)| name == &effect.name)
        {
            return Ok(());
        }

        let source = assemble_transition_source(&effect.source);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("transition fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: source.into(),
                stage: wgpu::naga::ShaderStage::Fragment,
                defines: Default::default(),
            },
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::gpu(format!(
                "transition '{}' failed to compile: {err}",
                effect.name
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("transition pipeline"),
            layout: Some(&self.transition_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::gpu(format!(
                "transition '{}' failed to link: {err}",
                effect.name
            )));
        }

        debug!(effect = %effect.name, "transition installed");
        self.transition = Some((effect.name.clone(), pipeline));
        Ok(())
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    bind_layout: &wgpu::BindGroupLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    fs_entry: &str,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: Default::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: fs_entry,
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE_EFFECT: &str = r#"
vec4 transition(vec2 uv) {
    return mix(getFromColor(uv), getToColor(uv), progress);
}
"#;

    #[test]
    fn scaffold_supplies_missing_helpers() {
        let src = assemble_transition_source(BARE_EFFECT);
        assert_eq!(src.matches("vec4 getFromColor").count(), 1);
        assert_eq!(src.matches("vec4 getToColor").count(), 1);
        assert_eq!(src.matches("float rand").count(), 1);
        assert!(src.contains("if (progress <= 0.0) f_color = getFromColor(v_uv);"));
    }

    #[test]
    fn scaffold_suppresses_helpers_the_effect_defines() {
        let effect = r#"
vec4 getToColor(vec2 uv) { return vec4(uv, 0.0, 1.0); }
float Rand(vec2 co) { return 0.5; }
vec4 transition(vec2 uv) { return getToColor(uv); }
"#;
        let src = assemble_transition_source(effect);
        // only the effect's own definition survives
        assert_eq!(src.matches("vec4 getToColor").count(), 1);
        assert!(src.contains("vec4 getFromColor"));
        // rand detection is case-insensitive, mirroring upstream effects
        assert_eq!(src.matches("float rand(vec2 co)").count(), 0);
    }

    #[test]
    fn scaffold_declares_uniform_interface_once() {
        let src = assemble_transition_source(BARE_EFFECT);
        assert_eq!(src.matches("uniform TransitionParams").count(), 1);
        assert_eq!(src.matches("float progress;").count(), 1);
        assert_eq!(src.matches("float ratio;").count(), 1);
    }

    #[test]
    fn usage_mentions_are_not_definitions() {
        // A call to getFromColor must not suppress the helper definition.
        let src = assemble_transition_source("vec4 transition(vec2 uv) { return getFromColor(uv); }");
        assert!(src.contains("vec4 getFromColor(vec2 uv) { return texture"));
    }
}
