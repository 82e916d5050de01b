use indexmap::IndexMap;

use crate::compile::{CompiledStage, ShaderError};
use crate::surface::UniformValue;

/// Bind group and binding every layer program reads its parameters from.
pub(crate) const UNIFORM_GROUP: u32 = 0;
pub(crate) const UNIFORM_BINDING: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UniformKind {
    Scalar,
    Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

/// CPU mirror of a layer's uniform block, addressed by member name.
///
/// The layout is taken from the compiled modules once; members the program
/// does not declare simply have no slot.
#[derive(Debug, Clone)]
pub(crate) struct UniformTable {
    slots: IndexMap<String, UniformSlot>,
    data: Vec<u8>,
}

impl UniformTable {
    pub fn reflect(label: &str, stages: &[&CompiledStage]) -> Result<Self, ShaderError> {
        let mut found: Option<(IndexMap<String, UniformSlot>, u32)> = None;
        for stage in stages {
            let Some(block) = reflect_block(label, &stage.module)? else {
                continue;
            };
            match &found {
                Some(existing) if *existing != block => {
                    return Err(ShaderError::Link {
                        label: label.to_string(),
                        diagnostic: format!(
                            "uniform block at @group({UNIFORM_GROUP}) @binding({UNIFORM_BINDING}) \
                             differs between stages"
                        ),
                    });
                }
                Some(_) => {}
                None => found = Some(block),
            }
        }

        let (slots, span) = found.unwrap_or_default();
        let size = (span.max(16) as usize).next_multiple_of(16);
        Ok(Self {
            slots,
            data: vec![0; size],
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Writes `value` into the mirror. Returns `false` when the program has no
    /// such member or declares it with another type.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        let Some(slot) = self.slots.get(name) else {
            return false;
        };
        let offset = slot.offset as usize;
        match (slot.kind, value) {
            (UniformKind::Scalar, UniformValue::Scalar(v)) => {
                self.data[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&v));
                true
            }
            (UniformKind::Vec2, UniformValue::Vec2(v)) => {
                self.data[offset..offset + 8].copy_from_slice(bytemuck::cast_slice(&v));
                true
            }
            (kind, value) => {
                tracing::trace!(uniform = name, ?kind, ?value, "uniform type mismatch");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let slot = self.slots.get(name)?;
        let offset = slot.offset as usize;
        let read = |at: usize| -> f32 {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&self.data[at..at + 4]);
            f32::from_ne_bytes(bytes)
        };
        Some(match slot.kind {
            UniformKind::Scalar => UniformValue::Scalar(read(offset)),
            UniformKind::Vec2 => UniformValue::Vec2([read(offset), read(offset + 4)]),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

type Block = (IndexMap<String, UniformSlot>, u32);

fn reflect_block(label: &str, module: &naga::Module) -> Result<Option<Block>, ShaderError> {
    let global = module.global_variables.iter().find(|(_, var)| {
        var.binding.as_ref().is_some_and(|binding| {
            binding.group == UNIFORM_GROUP && binding.binding == UNIFORM_BINDING
        })
    });
    let Some((_, global)) = global else {
        return Ok(None);
    };

    let link_error = |diagnostic: String| ShaderError::Link {
        label: label.to_string(),
        diagnostic,
    };

    if global.space != naga::AddressSpace::Uniform {
        return Err(link_error(format!(
            "@group({UNIFORM_GROUP}) @binding({UNIFORM_BINDING}) must be var<uniform>"
        )));
    }

    let naga::TypeInner::Struct { members, span } = &module.types[global.ty].inner else {
        return Err(link_error("uniform block must be a struct".to_string()));
    };

    let mut slots = IndexMap::new();
    for member in members {
        let Some(name) = member.name.clone() else {
            continue;
        };
        let kind = match module.types[member.ty].inner {
            naga::TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => UniformKind::Scalar,
            naga::TypeInner::Vector {
                size: naga::VectorSize::Bi,
                scalar,
            } if scalar == naga::Scalar::F32 => UniformKind::Vec2,
            _ => {
                tracing::trace!(uniform = %name, "skipping uniform member of unsupported type");
                continue;
            }
        };
        slots.insert(
            name,
            UniformSlot {
                offset: member.offset,
                kind,
            },
        );
    }
    Ok(Some((slots, *span)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_stage, Stage};

    const FRAGMENT: &str = r"
struct Params {
    u_resolution: vec2<f32>,
    u_flash: f32,
    u_color: vec4<f32>,
};
@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.u_color * params.u_flash;
}";

    fn table() -> UniformTable {
        let stage = compile_stage(FRAGMENT, Stage::Fragment).expect("compiles");
        UniformTable::reflect("test", &[&stage]).expect("reflects")
    }

    #[test]
    fn reflects_member_offsets_and_kinds() {
        let table = table();
        let names: Vec<_> = table.names().collect();
        assert_eq!(names, vec!["u_resolution", "u_flash"]);
        assert_eq!(table.size() % 16, 0);
        assert!(table.size() >= 32);
    }

    #[test]
    fn set_writes_known_members_only() {
        let mut table = table();
        assert!(table.set("u_resolution", UniformValue::Vec2([640.0, 480.0])));
        assert!(table.set("u_flash", UniformValue::Scalar(0.5)));
        assert!(!table.set("u_missing", UniformValue::Scalar(1.0)));
        assert!(!table.set("u_flash", UniformValue::Vec2([1.0, 1.0])));
        assert_eq!(
            table.get("u_resolution"),
            Some(UniformValue::Vec2([640.0, 480.0]))
        );
        assert_eq!(table.get("u_flash"), Some(UniformValue::Scalar(0.5)));
        assert_eq!(table.get("u_missing"), None);
    }

    #[test]
    fn program_without_block_gets_minimal_buffer() {
        let stage = compile_stage(crate::gpu::QUAD_VERTEX_WGSL, Stage::Vertex).expect("quad");
        let table = UniformTable::reflect("quad", &[&stage]).expect("reflects");
        assert_eq!(table.size(), 16);
        assert_eq!(table.names().count(), 0);
    }

    #[test]
    fn mismatched_blocks_fail_to_link() {
        let vertex = r"
struct Params {
    u_flash: f32,
};
@group(0) @binding(0) var<uniform> params: Params;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(params.u_flash, 0.0, 0.0, 1.0);
}";
        let vertex = compile_stage(vertex, Stage::Vertex).expect("vertex");
        let fragment = compile_stage(FRAGMENT, Stage::Fragment).expect("fragment");
        let err = UniformTable::reflect("mixed", &[&vertex, &fragment]).expect_err("mismatch");
        assert!(matches!(err, ShaderError::Link { .. }));
    }
}
