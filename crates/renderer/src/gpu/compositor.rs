use bytemuck::{Pod, Zeroable};

use crate::coords::Rect;
use crate::surface::{AlphaMode, SurfaceOutput};

use super::context::GpuContext;
use super::COMPOSITOR_WGSL;

const BACKDROP: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.025,
    b: 0.035,
    a: 1.0,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PlacementUniform {
    rect: [f32; 4],
    opacity: f32,
    _padding: [f32; 3],
}

impl PlacementUniform {
    /// Viewport rectangle to clip space (+y up).
    fn new(rect: Rect, viewport: (f32, f32), opacity: f32) -> Self {
        let (width, height) = (viewport.0.max(1.0), viewport.1.max(1.0));
        Self {
            rect: [
                rect.left / width * 2.0 - 1.0,
                1.0 - rect.top / height * 2.0,
                rect.right() / width * 2.0 - 1.0,
                1.0 - rect.bottom() / height * 2.0,
            ],
            opacity: opacity.clamp(0.0, 1.0),
            _padding: [0.0; 3],
        }
    }
}

/// Draws every surface's canvas onto the swapchain, in order, at its
/// viewport rectangle.
pub struct Compositor {
    layout: wgpu::BindGroupLayout,
    straight: wgpu::RenderPipeline,
    premultiplied: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    placements: Vec<wgpu::Buffer>,
}

impl Compositor {
    pub fn new(ctx: &GpuContext) -> Self {
        let device = &ctx.handles().device;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compositor"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITOR_WGSL.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compositor layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compositor pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |entry_point: &str, blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ctx.format(),
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };
        let straight = build("fs_straight", wgpu::BlendState::ALPHA_BLENDING);
        let premultiplied = build("fs_premultiplied", wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("compositor sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            layout,
            straight,
            premultiplied,
            sampler,
            placements: Vec::new(),
        }
    }

    /// Presents `outputs` back to front over the backdrop. `viewport` is the
    /// window's logical size.
    pub fn present(
        &mut self,
        ctx: &GpuContext,
        viewport: (f32, f32),
        outputs: &[SurfaceOutput<'_>],
    ) -> Result<(), wgpu::SurfaceError> {
        let gpu = ctx.handles();
        let frame = ctx.acquire()?;
        let target = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        while self.placements.len() < outputs.len() {
            self.placements.push(gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("compositor placement"),
                size: std::mem::size_of::<PlacementUniform>() as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }

        let bind_groups: Vec<wgpu::BindGroup> = outputs
            .iter()
            .zip(&self.placements)
            .map(|(output, buffer)| {
                let placement = PlacementUniform::new(output.rect, viewport, output.opacity);
                gpu.queue
                    .write_buffer(buffer, 0, bytemuck::bytes_of(&placement));
                gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("compositor surface"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(output.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                })
            })
            .collect();

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compositor"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("compositor"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(BACKDROP),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            for (output, bind_group) in outputs.iter().zip(&bind_groups) {
                let pipeline = match output.alpha {
                    AlphaMode::Straight => &self.straight,
                    AlphaMode::Premultiplied => &self.premultiplied,
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..4, 0..1);
            }
        }
        gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_covers_viewport() {
        let full = PlacementUniform::new(Rect::new(0.0, 0.0, 800.0, 600.0), (800.0, 600.0), 1.5);
        assert_eq!(full.rect, [-1.0, 1.0, 1.0, -1.0]);
        assert_eq!(full.opacity, 1.0);

        let inset = PlacementUniform::new(Rect::new(200.0, 150.0, 400.0, 300.0), (800.0, 600.0), 0.5);
        assert_eq!(inset.rect, [-0.5, 0.5, 0.5, -0.5]);
    }

    #[test]
    fn compositor_shader_validates() {
        use crate::compile::{compile_stage, Stage};
        compile_stage(COMPOSITOR_WGSL, Stage::Vertex).expect("vertex");
        compile_stage(COMPOSITOR_WGSL, Stage::Fragment).expect("fragment");
    }
}
