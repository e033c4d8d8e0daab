//! Single-pass GPU frame composition.
//!
//! Every output frame runs the same chain: draw the base frame (blit, or
//! transition blend of two frames), alpha-composite the border, optionally
//! alpha-composite the subtitle, read the result back as packed RGB.

use vlog_models::RenderSettings;

use crate::error::RenderResult;
use crate::gpu::GpuContext;
use crate::shaders::{ShaderRegistry, TransitionParams};
use crate::template::TransitionEffect;

/// Which border overlay a frame composites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
    Cover,
    Video,
}

#[derive(Clone, Copy)]
enum BasePass {
    Blit,
    Transition { progress: f32 },
}

/// GPU blender for one render run.
pub struct Compositor {
    gpu: GpuContext,
    registry: ShaderRegistry,
    ratio: f32,

    from_tex: wgpu::Texture,
    to_tex: wgpu::Texture,
    subtitle_tex: wgpu::Texture,
    border_cover_tex: wgpu::Texture,
    border_video_tex: wgpu::Texture,
    target_a: wgpu::Texture,
    target_b: wgpu::Texture,

    params_buf: wgpu::Buffer,
    blit_bind: wgpu::BindGroup,
    transition_bind: wgpu::BindGroup,
    border_cover_bind: wgpu::BindGroup,
    border_video_bind: wgpu::BindGroup,
    subtitle_bind: wgpu::BindGroup,
}

impl Compositor {
    pub fn new(settings: &RenderSettings) -> RenderResult<Self> {
        let gpu = GpuContext::new(settings.width, settings.height)?;
        let registry = ShaderRegistry::new(gpu.device())?;
        let device = gpu.device();

        let from_tex = gpu.create_source_texture("from frame");
        let to_tex = gpu.create_source_texture("to frame");
        let subtitle_tex = gpu.create_source_texture("subtitle overlay");
        let border_cover_tex = gpu.create_source_texture("cover border");
        let border_video_tex = gpu.create_source_texture("video border");
        let target_a = gpu.create_target_texture("target a");
        let target_b = gpu.create_target_texture("target b");

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("transition params"),
            size: std::mem::size_of::<TransitionParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let view = |t: &wgpu::Texture| t.create_view(&wgpu::TextureViewDescriptor::default());

        let blit_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit bind"),
            layout: &registry.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view(&from_tex)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let transition_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transition bind"),
            layout: &registry.transition_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view(&from_tex)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view(&to_tex)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let overlay_bind = |base: &wgpu::Texture, overlay: &wgpu::Texture, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &registry.overlay_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view(base)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view(overlay)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            })
        };

        // Pass order is fixed: base -> target_a, border -> target_b,
        // subtitle -> target_a.
        let border_cover_bind = overlay_bind(&target_a, &border_cover_tex, "cover border bind");
        let border_video_bind = overlay_bind(&target_a, &border_video_tex, "video border bind");
        let subtitle_bind = overlay_bind(&target_b, &subtitle_tex, "subtitle bind");

        Ok(Self {
            gpu,
            registry,
            ratio: settings.aspect_ratio(),
            from_tex,
            to_tex,
            subtitle_tex,
            border_cover_tex,
            border_video_tex,
            target_a,
            target_b,
            params_buf,
            blit_bind,
            transition_bind,
            border_cover_bind,
            border_video_bind,
            subtitle_bind,
        })
    }

    /// Install a transition effect and bind its static uniforms.
    pub fn install_transition(&mut self, effect: &TransitionEffect) -> RenderResult<()> {
        self.registry.install_transition(self.gpu.device(), effect)?;
        let params = TransitionParams {
            progress: 0.0,
            ratio: self.ratio,
            _pad: [0.0; 2],
        };
        self.gpu
            .queue()
            .write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    pub fn set_cover_border(&self, rgba: &[u8]) {
        self.gpu.upload_rgba(&self.border_cover_tex, rgba);
    }

    pub fn set_video_border(&self, rgba: &[u8]) {
        self.gpu.upload_rgba(&self.border_video_tex, rgba);
    }

    pub fn set_subtitle(&self, rgba: &[u8]) {
        self.gpu.upload_rgba(&self.subtitle_tex, rgba);
    }

    pub fn upload_from(&mut self, rgb: &[u8]) {
        self.gpu.upload_rgb(&self.from_tex, rgb);
    }

    pub fn upload_to(&mut self, rgb: &[u8]) {
        self.gpu.upload_rgb(&self.to_tex, rgb);
    }

    /// Draw one frame through the blit program.
    pub fn compose_solo(&mut self, border: BorderKind, subtitle: bool) -> RenderResult<Vec<u8>> {
        self.compose(BasePass::Blit, border, subtitle)
    }

    /// Draw one frame through the transition program at `progress`.
    pub fn compose_transition(
        &mut self,
        progress: f32,
        border: BorderKind,
        subtitle: bool,
    ) -> RenderResult<Vec<u8>> {
        self.compose(BasePass::Transition { progress }, border, subtitle)
    }

    fn compose(
        &mut self,
        base: BasePass,
        border: BorderKind,
        subtitle: bool,
    ) -> RenderResult<Vec<u8>> {
        if let BasePass::Transition { progress } = base {
            // Only the time-varying half of the uniform block changes.
            self.gpu
                .queue()
                .write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&progress));
        }

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        {
            let view = self
                .target_a
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut pass = begin_pass(&mut encoder, &view, "base pass");
            match base {
                BasePass::Blit => {
                    pass.set_pipeline(self.registry.blit_pipeline());
                    pass.set_bind_group(0, &self.blit_bind, &[]);
                }
                BasePass::Transition { .. } => {
                    pass.set_pipeline(self.registry.transition_pipeline()?);
                    pass.set_bind_group(0, &self.transition_bind, &[]);
                }
            }
            pass.draw(0..3, 0..1);
        }

        {
            let view = self
                .target_b
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut pass = begin_pass(&mut encoder, &view, "border pass");
            pass.set_pipeline(self.registry.overlay_pipeline());
            let bind = match border {
                BorderKind::Cover => &self.border_cover_bind,
                BorderKind::Video => &self.border_video_bind,
            };
            pass.set_bind_group(0, bind, &[]);
            pass.draw(0..3, 0..1);
        }

        let final_target = if subtitle {
            {
                let view = self
                    .target_a
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let mut pass = begin_pass(&mut encoder, &view, "subtitle pass");
                pass.set_pipeline(self.registry.overlay_pipeline());
                pass.set_bind_group(0, &self.subtitle_bind, &[]);
                pass.draw(0..3, 0..1);
            }
            &self.target_a
        } else {
            &self.target_b
        };

        self.gpu.copy_to_readback(&mut encoder, final_target);
        self.gpu.queue().submit(Some(encoder.finish()));
        self.gpu.read_frame_rgb()
    }
}

fn begin_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    view: &'a wgpu::TextureView,
    label: &'a str,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}
