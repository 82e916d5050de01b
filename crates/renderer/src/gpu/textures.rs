use indexmap::map::Entry;
use indexmap::IndexMap;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::compile::{CompiledStage, ShaderError};
use crate::pixels::PixelView;

/// Bind group holding a layer's sampled textures and samplers.
pub(crate) const TEXTURE_GROUP: u32 = 1;

pub(crate) const LAYER_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Textures bound to a layer, keyed by uniform name in first-bind order.
///
/// An entry's position is its texture unit and never changes once assigned.
#[derive(Debug)]
pub(crate) struct TextureTable<T> {
    entries: IndexMap<String, T>,
}

impl<T> Default for TextureTable<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T> TextureTable<T> {
    /// Creates the entry on first use, otherwise updates it in place.
    /// Returns the unit and whether the entry is new.
    pub fn upsert(
        &mut self,
        name: &str,
        create: impl FnOnce() -> T,
        update: impl FnOnce(&mut T),
    ) -> (usize, bool) {
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                update(entry.get_mut());
                (entry.index(), false)
            }
            Entry::Vacant(entry) => {
                let unit = entry.index();
                entry.insert(create());
                (unit, true)
            }
        }
    }

    pub fn unit_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextureSlot {
    pub name: String,
    pub binding: u32,
}

/// Sampled textures and samplers a program declares in its texture group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResourceSlots {
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<u32>,
}

impl ResourceSlots {
    pub fn reflect(label: &str, stages: &[&CompiledStage]) -> Result<Self, ShaderError> {
        let mut slots = ResourceSlots::default();
        for stage in stages {
            let module = &stage.module;
            for (_, var) in module.global_variables.iter() {
                let Some(binding) = var.binding.as_ref() else {
                    continue;
                };
                if binding.group != TEXTURE_GROUP {
                    continue;
                }
                match module.types[var.ty].inner {
                    naga::TypeInner::Image {
                        dim: naga::ImageDimension::D2,
                        arrayed: false,
                        class: naga::ImageClass::Sampled { multi: false, .. },
                    } => {
                        let name = var.name.clone().unwrap_or_default();
                        if !slots.textures.iter().any(|slot| slot.binding == binding.binding) {
                            slots.textures.push(TextureSlot {
                                name,
                                binding: binding.binding,
                            });
                        }
                    }
                    naga::TypeInner::Sampler { comparison: false } => {
                        if !slots.samplers.contains(&binding.binding) {
                            slots.samplers.push(binding.binding);
                        }
                    }
                    _ => {
                        return Err(ShaderError::Link {
                            label: label.to_string(),
                            diagnostic: format!(
                                "@group({TEXTURE_GROUP}) @binding({}) must be a texture_2d<f32> \
                                 or a filtering sampler",
                                binding.binding
                            ),
                        });
                    }
                }
            }
        }
        slots.textures.sort_by_key(|slot| slot.binding);
        slots.samplers.sort_unstable();
        Ok(slots)
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.samplers.is_empty()
    }

    pub fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let textures = self.textures.iter().map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        let samplers = self.samplers.iter().map(|&binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        textures.chain(samplers).collect()
    }
}

/// A texture whose storage is kept across uploads of equal size.
#[derive(Debug)]
pub(crate) struct LayerTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl LayerTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, pixels: PixelView<'_>) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &descriptor(label, pixels.width, pixels.height),
            TextureDataOrder::LayerMajor,
            pixels.rgba,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: pixels.width,
            height: pixels.height,
        }
    }

    /// 1x1 neutral grey used for declared slots nothing was bound to.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::new(
            device,
            queue,
            "placeholder texture",
            PixelView {
                width: 1,
                height: 1,
                rgba: &[128, 128, 128, 255],
            },
        )
    }

    /// Replaces the contents. Returns `true` when the storage had to be
    /// reallocated for a new size, which invalidates bind groups.
    pub fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        pixels: PixelView<'_>,
    ) -> bool {
        if pixels.width != self.width || pixels.height != self.height {
            *self = Self::new(device, queue, label, pixels);
            return true;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * pixels.width),
                rows_per_image: Some(pixels.height),
            },
            wgpu::Extent3d {
                width: pixels.width,
                height: pixels.height,
                depth_or_array_layers: 1,
            },
        );
        false
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn descriptor(label: &str, width: u32, height: u32) -> wgpu::TextureDescriptor<'_> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: LAYER_TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_stage, Stage};

    #[test]
    fn rebinding_keeps_unit_and_updates_in_place() {
        let mut table: TextureTable<Vec<u8>> = TextureTable::default();
        assert_eq!(table.upsert("u_waterMap", || vec![1], |_| {}), (0, true));
        assert_eq!(table.upsert("u_textureBg", || vec![2], |_| {}), (1, true));

        let (unit, created) = table.upsert(
            "u_waterMap",
            || unreachable!("existing entry must not be recreated"),
            |pixels| *pixels = vec![9, 9],
        );
        assert_eq!((unit, created), (0, false));
        assert_eq!(table.get("u_waterMap"), Some(&vec![9, 9]));
        assert_eq!(table.unit_of("u_textureBg"), Some(1));

        let order: Vec<_> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["u_waterMap", "u_textureBg"]);
    }

    #[test]
    fn reflects_texture_group() {
        let source = r"
@group(1) @binding(2) var u_textureBg: texture_2d<f32>;
@group(1) @binding(0) var u_waterMap: texture_2d<f32>;
@group(1) @binding(3) var u_sampler: sampler;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = pos.xy / 100.0;
    return textureSample(u_waterMap, u_sampler, uv) + textureSample(u_textureBg, u_sampler, uv);
}";
        let stage = compile_stage(source, Stage::Fragment).expect("compiles");
        let slots = ResourceSlots::reflect("test", &[&stage]).expect("reflects");
        assert_eq!(
            slots.textures,
            vec![
                TextureSlot {
                    name: "u_waterMap".into(),
                    binding: 0
                },
                TextureSlot {
                    name: "u_textureBg".into(),
                    binding: 2
                },
            ]
        );
        assert_eq!(slots.samplers, vec![3]);
        assert_eq!(slots.layout_entries().len(), 3);
    }

    #[test]
    fn rejects_unsupported_bindings() {
        let source = r"
@group(1) @binding(0) var u_cube: texture_cube<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(f32(textureNumLevels(u_cube)));
}";
        let stage = compile_stage(source, Stage::Fragment).expect("compiles");
        assert!(matches!(
            ResourceSlots::reflect("cube", &[&stage]),
            Err(ShaderError::Link { .. })
        ));
    }
}
