use std::borrow::Cow;

use anyhow::Result;
use wgpu::util::DeviceExt;

use crate::compile::{compile_stage, CompiledStage, ShaderError, Stage};
use crate::coords::SurfaceGeometry;
use crate::pixels::ImageSource;
use crate::surface::{
    AlphaMode, FrameContext, RenderSurface, SurfaceOutput, TextureLayer, UniformValue,
};

use super::canvas::{Canvas, CANVAS_FORMAT};
use super::context::GpuHandles;
use super::textures::{LayerTexture, ResourceSlots, TextureTable, TEXTURE_GROUP};
use super::uniforms::{UniformTable, UNIFORM_BINDING};

/// Resolution uniform every layer program may declare.
pub const RESOLUTION_UNIFORM: &str = "u_resolution";

const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

struct LayerProgram {
    pipeline: wgpu::RenderPipeline,
    quad: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
    texture_bind_group: Option<wgpu::BindGroup>,
    sampler: wgpu::Sampler,
    placeholder: LayerTexture,
}

/// One shader program drawing a full-canvas quad into its own canvas.
///
/// Uniform and texture layouts are reflected from the WGSL once at
/// construction. Textures live in an insertion-ordered table: the first bind
/// of a name creates the texture and fixes its unit, later binds only replace
/// the pixels.
pub struct ShaderLayer {
    label: String,
    gpu: GpuHandles,
    canvas: Canvas,
    uniforms: UniformTable,
    slots: ResourceSlots,
    textures: TextureTable<LayerTexture>,
    program: Option<LayerProgram>,
    gate: LayerGate,
    bindings_dirty: bool,
}

/// Lifecycle bookkeeping for a layer, kept apart from its GPU objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerGate {
    live: bool,
    frames_drawn: u64,
}

impl LayerGate {
    fn new() -> Self {
        Self {
            live: true,
            frames_drawn: 0,
        }
    }

    fn can_draw(&self, visible: bool) -> bool {
        self.live && visible
    }

    fn can_bind(&self) -> bool {
        self.live
    }

    /// A layer only exposes its canvas once something has been drawn into it.
    fn has_output(&self, visible: bool) -> bool {
        self.can_draw(visible) && self.frames_drawn > 0
    }

    fn drawn(&mut self) {
        self.frames_drawn += 1;
    }

    /// Returns true only on the first call.
    fn close(&mut self) -> bool {
        std::mem::replace(&mut self.live, false)
    }
}

impl ShaderLayer {
    pub fn new(
        gpu: &GpuHandles,
        label: impl Into<String>,
        geometry: SurfaceGeometry,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let label = label.into();
        let vertex = compile_stage(vertex_source, Stage::Vertex)?;
        let fragment = compile_stage(fragment_source, Stage::Fragment)?;
        let stages = [&vertex, &fragment];
        let uniforms = UniformTable::reflect(&label, &stages)?;
        let slots = ResourceSlots::reflect(&label, &stages)?;

        let program = build_program(
            gpu,
            &label,
            (vertex_source, &vertex),
            (fragment_source, &fragment),
            &uniforms,
            &slots,
        )?;
        tracing::debug!(
            layer = %label,
            uniforms = ?uniforms.names().collect::<Vec<_>>(),
            textures = ?slots.textures.iter().map(|slot| slot.name.as_str()).collect::<Vec<_>>(),
            "shader layer compiled"
        );

        let mut layer = Self {
            canvas: Canvas::new(gpu, label.clone(), geometry),
            label,
            gpu: gpu.clone(),
            uniforms,
            slots,
            textures: TextureTable::default(),
            program: Some(program),
            gate: LayerGate::new(),
            bindings_dirty: true,
        };
        layer.write_resolution();
        Ok(layer)
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.canvas.geometry()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.gate.frames_drawn
    }

    pub fn texture_unit(&self, name: &str) -> Option<usize> {
        self.textures.unit_of(name)
    }

    fn write_resolution(&mut self) {
        let (width, height) = self.canvas.physical_size();
        self.uniforms.set(
            RESOLUTION_UNIFORM,
            UniformValue::Vec2([width as f32, height as f32]),
        );
    }

    fn rebuild_texture_bind_group(&mut self) {
        let Some(program) = self.program.as_mut() else {
            return;
        };
        let Some(layout) = program.texture_layout.as_ref() else {
            return;
        };

        let mut entries = Vec::with_capacity(self.slots.textures.len() + self.slots.samplers.len());
        for slot in &self.slots.textures {
            let view = match self.textures.get(&slot.name) {
                Some(texture) => texture.view(),
                None => program.placeholder.view(),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for &binding in &self.slots.samplers {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(&program.sampler),
            });
        }

        program.texture_bind_group =
            Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} textures", self.label)),
                layout,
                entries: &entries,
            }));
        self.bindings_dirty = false;
    }
}

impl RenderSurface for ShaderLayer {
    fn label(&self) -> &str {
        &self.label
    }

    fn resize(&mut self, geometry: SurfaceGeometry) {
        self.canvas.resize(&self.gpu, geometry);
        self.write_resolution();
    }

    fn render(&mut self, _frame: &FrameContext<'_>) -> Result<()> {
        if !self.gate.can_draw(self.canvas.is_visible()) {
            return Ok(());
        }
        self.write_resolution();
        if self.bindings_dirty {
            self.rebuild_texture_bind_group();
        }
        let Some(program) = self.program.as_ref() else {
            return Ok(());
        };

        self.gpu
            .queue
            .write_buffer(&program.uniform_buffer, 0, self.uniforms.bytes());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.label),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&self.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.canvas.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.uniform_bind_group, &[]);
            if let Some(textures) = program.texture_bind_group.as_ref() {
                pass.set_bind_group(TEXTURE_GROUP, textures, &[]);
            }
            pass.set_vertex_buffer(0, program.quad.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        self.gate.drawn();
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) {
        self.canvas.set_visible(visible);
    }

    fn is_visible(&self) -> bool {
        self.canvas.is_visible()
    }

    fn destroy(&mut self) {
        if self.gate.close() {
            self.program = None;
            tracing::debug!(layer = %self.label, frames = self.gate.frames_drawn, "shader layer destroyed");
        }
    }

    fn is_destroyed(&self) -> bool {
        !self.gate.can_bind()
    }

    fn output(&self) -> Option<SurfaceOutput<'_>> {
        if !self.gate.has_output(self.canvas.is_visible()) {
            return None;
        }
        Some(self.canvas.output(1.0, AlphaMode::Straight))
    }
}

impl TextureLayer for ShaderLayer {
    fn bind_texture(&mut self, name: &str, source: &dyn ImageSource) -> Option<usize> {
        if !self.gate.can_bind() {
            return None;
        }
        let pixels = source.pixels().filter(|view| view.is_well_formed())?;

        let gpu = &self.gpu;
        let label = format!("{} {name}", self.label);
        let mut reallocated = false;
        let (unit, created) = self.textures.upsert(
            name,
            || LayerTexture::new(&gpu.device, &gpu.queue, &label, pixels),
            |texture| reallocated = texture.write(&gpu.device, &gpu.queue, &label, pixels),
        );
        if created || reallocated {
            if created && !self.slots.textures.iter().any(|slot| slot.name == name) {
                tracing::trace!(layer = %self.label, texture = name, "texture not sampled by program");
            }
            self.bindings_dirty = true;
        }
        Some(unit)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.uniforms.set(name, value);
    }
}

fn build_program(
    gpu: &GpuHandles,
    label: &str,
    (vertex_source, vertex): (&str, &CompiledStage),
    (fragment_source, fragment): (&str, &CompiledStage),
    uniforms: &UniformTable,
    slots: &ResourceSlots,
) -> Result<LayerProgram, ShaderError> {
    let device = &gpu.device;
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{label} vertex")),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(vertex_source)),
    });
    let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{label} fragment")),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(fragment_source)),
    });

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("layer uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });
    let texture_layout = (!slots.is_empty()).then(|| {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer texture layout"),
            entries: &slots.layout_entries(),
        })
    });

    let mut layouts = vec![&uniform_layout];
    if let Some(layout) = texture_layout.as_ref() {
        layouts.push(layout);
    }
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} pipeline layout")),
        bind_group_layouts: &layouts,
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some(vertex.entry_point.as_str()),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some(fragment.entry_point.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format: CANVAS_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(ShaderError::Link {
            label: label.to_string(),
            diagnostic: err.to_string(),
        });
    }

    let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("layer quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{label} uniforms")),
        size: uniforms.size(),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} uniform bind group")),
        layout: &uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: UNIFORM_BINDING,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    Ok(LayerProgram {
        pipeline,
        quad,
        uniform_buffer,
        uniform_bind_group,
        texture_layout,
        texture_bind_group: None,
        sampler,
        placeholder: LayerTexture::placeholder(&gpu.device, &gpu.queue),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_layer_draws_but_has_no_output_yet() {
        let mut gate = LayerGate::new();
        assert!(gate.can_draw(true));
        assert!(gate.can_bind());
        assert!(!gate.has_output(true));

        gate.drawn();
        assert!(gate.has_output(true));
        assert!(!gate.has_output(false));
        assert!(!gate.can_draw(false));
    }

    #[test]
    fn destroyed_layer_refuses_all_work() {
        let mut gate = LayerGate::new();
        gate.drawn();
        assert!(gate.close());
        assert!(!gate.close());

        assert!(!gate.can_draw(true));
        assert!(!gate.can_bind());
        assert!(!gate.has_output(true));
        assert_eq!(gate.frames_drawn, 1);
    }
}
