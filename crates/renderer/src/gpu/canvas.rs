use crate::coords::SurfaceGeometry;
use crate::surface::{AlphaMode, SurfaceOutput};

use super::context::GpuHandles;

pub(crate) const CANVAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen target one surface draws into before compositing.
pub struct Canvas {
    label: String,
    geometry: SurfaceGeometry,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    physical: (u32, u32),
    visible: bool,
}

impl Canvas {
    pub fn new(gpu: &GpuHandles, label: impl Into<String>, geometry: SurfaceGeometry) -> Self {
        let label = label.into();
        let physical = geometry.physical_size();
        let (texture, view) = create_target(&gpu.device, &label, physical);
        Self {
            label,
            geometry,
            texture,
            view,
            physical,
            visible: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    pub fn physical_size(&self) -> (u32, u32) {
        self.physical
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Returns `true` when the backing texture was recreated.
    pub fn resize(&mut self, gpu: &GpuHandles, geometry: SurfaceGeometry) -> bool {
        self.geometry = geometry;
        let physical = geometry.physical_size();
        if physical == self.physical {
            return false;
        }
        let (texture, view) = create_target(&gpu.device, &self.label, physical);
        self.texture = texture;
        self.view = view;
        self.physical = physical;
        tracing::debug!(
            canvas = %self.label,
            width = physical.0,
            height = physical.1,
            scale = geometry.scale,
            "canvas resized"
        );
        true
    }

    /// Copies a full-size RGBA8 buffer into the canvas.
    pub fn upload(&self, gpu: &GpuHandles, rgba: &[u8]) {
        let (width, height) = self.physical;
        if rgba.len() != width as usize * height as usize * 4 {
            tracing::warn!(
                canvas = %self.label,
                expected = width as usize * height as usize * 4,
                actual = rgba.len(),
                "skipping canvas upload with mismatched size"
            );
            return;
        }
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn output(&self, opacity: f32, alpha: AlphaMode) -> SurfaceOutput<'_> {
        SurfaceOutput {
            view: &self.view,
            rect: self.geometry.rect,
            opacity,
            alpha,
        }
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    (width, height): (u32, u32),
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: CANVAS_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
