//! Present and cross-fade render passes.
//!
//! Two pipelines only: `present` draws a single texture transformed by a
//! CPU-computed scale/offset pair (the active scaling mode), `blend`
//! cross-fades two independently-transformed textures for the transition
//! engine. Both write into an offscreen render target that the caller reads
//! back to the CPU for presentation through `wl_shm` — there is no live
//! `wgpu::Surface` on a layer-shell surface.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::pipeline_builder::{bind_group_entries, create_pipeline_layout, PipelineBuilder};
use super::texture::GpuTexture;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Transform {
    scale: [f32; 2],
    offset: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlendUniforms {
    old_scale: [f32; 2],
    old_offset: [f32; 2],
    new_scale: [f32; 2],
    new_offset: [f32; 2],
    alpha_old: f32,
    alpha_new: f32,
    _pad0: f32,
    _pad1: f32,
}

/// Owns the GPU context and the two render pipelines used to present
/// wallpaper frames.
pub struct Renderer {
    context: GpuContext,
    sampler: wgpu::Sampler,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    present_bind_group_layout: wgpu::BindGroupLayout,
    blend_bind_group_layout: wgpu::BindGroupLayout,
    present_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let context = pollster::block_on(GpuContext::new())?;
        let device = &context.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("wallpaper sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("texture bind group layout"),
                entries: &[bind_group_entries::texture(0), bind_group_entries::sampler(1)],
            });

        let transform_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let present_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("present bind group layout"),
                entries: &[
                    transform_entry,
                    bind_group_entries::texture(1),
                    bind_group_entries::sampler(2),
                ],
            });

        let blend_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("blend bind group layout"),
                entries: &[
                    bind_group_entries::uniform_buffer(0),
                    bind_group_entries::texture(1),
                    bind_group_entries::texture(2),
                    bind_group_entries::sampler(3),
                ],
            });

        let present_layout =
            create_pipeline_layout(device, "present pipeline layout", &[&present_bind_group_layout]);
        let blend_layout =
            create_pipeline_layout(device, "blend pipeline layout", &[&blend_bind_group_layout]);

        let present_pipeline = PipelineBuilder::new(device, include_str!("shaders/present.wgsl"))
            .with_label("present pipeline")
            .with_layout(&present_layout)
            .build();

        let blend_pipeline = PipelineBuilder::new(device, include_str!("shaders/blend.wgsl"))
            .with_label("blend pipeline")
            .with_layout(&blend_layout)
            .build();

        Ok(Self {
            context,
            sampler,
            texture_bind_group_layout,
            present_bind_group_layout,
            blend_bind_group_layout,
            present_pipeline,
            blend_pipeline,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    pub fn texture_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_bind_group_layout
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn capabilities(&self) -> super::GpuCapabilities {
        self.context.capabilities()
    }

    /// Allocate a fresh offscreen render target of the given dimensions.
    pub fn create_render_target(&self, width: u32, height: u32) -> Result<GpuTexture> {
        GpuTexture::create_render_target(
            &self.context.device,
            &self.texture_bind_group_layout,
            &self.sampler,
            width,
            height,
        )
    }

    /// Draw `source` into `target`, transformed by `scale`/`offset` in
    /// vertex-space. Clears to opaque black first, so a scale below 1.0
    /// (the "original" scaling mode) letterboxes correctly.
    pub fn present(
        &self,
        target: &GpuTexture,
        source: &GpuTexture,
        scale: [f32; 2],
        offset: [f32; 2],
    ) -> Result<()> {
        let transform = Transform { scale, offset };
        let uniform_buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("present transform uniform"),
                contents: bytemuck::bytes_of(&transform),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present bind group"),
            layout: &self.present_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.0,
                            b: 0.0,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Cross-fade `old` and `new`, each transformed independently, into
    /// `target`, weighted by `alpha_old`/`alpha_new`.
    #[allow(clippy::too_many_arguments)]
    pub fn blend(
        &self,
        target: &GpuTexture,
        old: &GpuTexture,
        new: &GpuTexture,
        old_scale: [f32; 2],
        old_offset: [f32; 2],
        new_scale: [f32; 2],
        new_offset: [f32; 2],
        alpha_old: f32,
        alpha_new: f32,
    ) -> Result<()> {
        let uniforms = BlendUniforms {
            old_scale,
            old_offset,
            new_scale,
            new_offset,
            alpha_old,
            alpha_new,
            _pad0: 0.0,
            _pad1: 0.0,
        };
        let uniform_buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("blend uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blend bind group"),
            layout: &self.blend_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&old.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&new.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blend encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blend pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.0,
                            b: 0.0,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blend_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Read `target` back to the CPU as ARGB8, ready for `wl_shm`.
    pub fn read_to_argb(&self, target: &GpuTexture) -> Result<Vec<u8>> {
        target
            .read_to_argb(&self.context.device, &self.context.queue)
            .context("failed to read render target back to the CPU")
    }
}
