use std::fmt;

use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    Compile { stage: Stage, diagnostic: String },
    #[error("shader program `{label}` failed to link: {diagnostic}")]
    Link { label: String, diagnostic: String },
}

impl ShaderError {
    pub fn diagnostic(&self) -> &str {
        match self {
            ShaderError::Compile { diagnostic, .. } | ShaderError::Link { diagnostic, .. } => {
                diagnostic
            }
        }
    }
}

/// One validated WGSL stage, kept as IR for reflection.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: Stage,
    pub module: naga::Module,
    pub entry_point: String,
}

/// Parses and validates `source`, then locates its entry point for `stage`.
///
/// A module carrying several entry points of the same stage uses the first.
pub fn compile_stage(source: &str, stage: Stage) -> Result<CompiledStage, ShaderError> {
    let module = wgsl::parse_str(source).map_err(|err| ShaderError::Compile {
        stage,
        diagnostic: err.emit_to_string(source),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            stage,
            diagnostic: format!("{err}"),
        })?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage.naga())
        .map(|entry| entry.name.clone())
        .ok_or_else(|| ShaderError::Compile {
            stage,
            diagnostic: format!("no @{stage} entry point declared"),
        })?;

    Ok(CompiledStage {
        stage,
        module,
        entry_point,
    })
}
