//! WGSL front end: compile and link checks shared by every backend.
//!
//! A shader is "compiled" when naga parses and validates it and the stage's
//! entry point exists. Two shaders "link" when their stages are right, every
//! vertex input is fed by a vertex buffer attribute of the same scalar kind,
//! and every fragment input is written by the vertex stage with the same type
//! and interpolation.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{Binding, Handle, Interpolation, Module, Sampling, Scalar, ScalarKind, Type, TypeInner};

use super::{ProbeError, ShaderStage};

/// One user-defined `@location` on an entry point's interface.
#[derive(Debug, Clone, PartialEq)]
pub struct IoLocation {
    pub location: u32,
    pub ty: TypeInner,
    pub interpolation: Option<Interpolation>,
    pub sampling: Option<Sampling>,
}

impl IoLocation {
    fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.ty {
            TypeInner::Scalar(Scalar { kind, .. }) => Some(kind),
            TypeInner::Vector {
                scalar: Scalar { kind, .. },
                ..
            } => Some(kind),
            _ => None,
        }
    }
}

/// A shader that passed the front end.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    stage: ShaderStage,
    source: String,
    inputs: Vec<IoLocation>,
    outputs: Vec<IoLocation>,
}

impl CompiledShader {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// `@location`s read by the entry point.
    pub fn inputs(&self) -> &[IoLocation] {
        &self.inputs
    }

    /// `@location`s written by the entry point.
    pub fn outputs(&self) -> &[IoLocation] {
        &self.outputs
    }
}

/// Entry points of a successfully linked vertex + fragment pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LinkedStages {
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledShader, ProbeError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ProbeError::Compile {
        stage,
        log: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| ProbeError::Compile {
            stage,
            log: error_chain(&e.into_inner()),
        })?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == stage.entry_point() && ep.stage == stage.to_naga())
        .ok_or_else(|| ProbeError::Compile {
            stage,
            log: format!("no {stage} entry point named `{}`", stage.entry_point()),
        })?;

    let inputs = entry
        .function
        .arguments
        .iter()
        .flat_map(|arg| locations(&module, arg.ty, arg.binding.as_ref()))
        .collect();

    let outputs = entry
        .function
        .result
        .as_ref()
        .map(|res| locations(&module, res.ty, res.binding.as_ref()))
        .unwrap_or_default();

    log::debug!("compiled {stage} shader ({} bytes)", source.len());

    Ok(CompiledShader {
        stage,
        source: source.to_owned(),
        inputs,
        outputs,
    })
}

/// Checks that `vertex` and `fragment` form a complete pipeline when the
/// vertex stage is fed by `attributes`.
pub fn link(
    vertex: &CompiledShader,
    fragment: &CompiledShader,
    attributes: &[wgpu::VertexAttribute],
) -> Result<LinkedStages, ProbeError> {
    if vertex.stage != ShaderStage::Vertex {
        return Err(link_error(format!(
            "expected a vertex shader, got a {} shader",
            vertex.stage
        )));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(link_error(format!(
            "expected a fragment shader, got a {} shader",
            fragment.stage
        )));
    }

    for input in &vertex.inputs {
        let loc = input.location;
        let Some(attr) = attributes.iter().find(|a| a.shader_location == loc) else {
            return Err(link_error(format!(
                "vertex input @location({loc}) is not supplied by the vertex buffer"
            )));
        };
        let supplied = format_kind(attr.format);
        if input.scalar_kind() != Some(supplied) {
            return Err(link_error(format!(
                "vertex input @location({loc}) reads {:?}, vertex buffer supplies {:?}",
                input.ty, attr.format
            )));
        }
    }

    for input in &fragment.inputs {
        let loc = input.location;
        let Some(output) = vertex.outputs.iter().find(|o| o.location == loc) else {
            return Err(link_error(format!(
                "fragment input @location({loc}) is not written by the vertex stage"
            )));
        };
        if output.ty != input.ty {
            return Err(link_error(format!(
                "@location({loc}) type mismatch: vertex writes {:?}, fragment reads {:?}",
                output.ty, input.ty
            )));
        }
        if (output.interpolation, output.sampling) != (input.interpolation, input.sampling) {
            return Err(link_error(format!(
                "@location({loc}) interpolation mismatch: vertex uses {:?} {:?}, fragment uses {:?} {:?}",
                output.interpolation, output.sampling, input.interpolation, input.sampling
            )));
        }
    }

    Ok(LinkedStages {
        vertex_entry: ShaderStage::Vertex.entry_point(),
        fragment_entry: ShaderStage::Fragment.entry_point(),
    })
}

fn link_error(log: String) -> ProbeError {
    ProbeError::Link { log }
}

/// Scalar kind a vertex attribute format presents to the shader.
fn format_kind(format: wgpu::VertexFormat) -> ScalarKind {
    use wgpu::VertexFormat as F;
    match format {
        F::Uint8 | F::Uint8x2 | F::Uint8x4 | F::Uint16 | F::Uint16x2 | F::Uint16x4
        | F::Uint32 | F::Uint32x2 | F::Uint32x3 | F::Uint32x4 => ScalarKind::Uint,
        F::Sint8 | F::Sint8x2 | F::Sint8x4 | F::Sint16 | F::Sint16x2 | F::Sint16x4
        | F::Sint32 | F::Sint32x2 | F::Sint32x3 | F::Sint32x4 => ScalarKind::Sint,
        // Normalized, half, single and double formats all read as floats.
        _ => ScalarKind::Float,
    }
}

fn locations(module: &Module, ty: Handle<Type>, binding: Option<&Binding>) -> Vec<IoLocation> {
    match binding {
        Some(binding) => location(module, ty, binding).into_iter().collect(),
        // Unbound values are IO structs; their members carry the bindings.
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|m| location(module, m.ty, m.binding.as_ref()?))
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn location(module: &Module, ty: Handle<Type>, binding: &Binding) -> Option<IoLocation> {
    match *binding {
        Binding::Location {
            location,
            interpolation,
            sampling,
            ..
        } => Some(IoLocation {
            location,
            ty: module.types[ty].inner.clone(),
            interpolation,
            sampling,
        }),
        Binding::BuiltIn(_) => None,
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
