//! Shader programs: WGSL compile, link and interface reflection.
//!
//! Each stage is parsed and validated with naga before any GPU object is
//! created. Linking checks that the two stages agree, then the program's
//! attributes and uniforms are looked up by name for the rest of its life.

use crate::backend::{ProgramHandle, ProgramSource, RenderBackend};
use crate::error::RenderError;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind, ShaderStage, Type, TypeInner};
use std::fmt;

/// Which step of program construction rejected the sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramStage::Vertex => f.write_str("vertex"),
            ProgramStage::Fragment => f.write_str("fragment"),
            ProgramStage::Link => f.write_str("link"),
        }
    }
}

/// A rejected program, with the compiler or linker diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} stage failed: {diagnostic}")]
pub struct CompileError {
    pub stage: ProgramStage,
    pub diagnostic: String,
}

impl CompileError {
    fn new(stage: ProgramStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Kind of resource bound at a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// A `var<uniform>` of `size` bytes.
    Buffer { size: u32 },
    /// A filterable `texture_2d<f32>`.
    Texture,
    /// A filtering `sampler`.
    Sampler,
}

/// Stages that declare a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageVisibility {
    pub vertex: bool,
    pub fragment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
    /// Scalar components of the shader-side type (1 for `f32`, 3 for `vec3`).
    pub components: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: UniformKind,
    pub visibility: StageVisibility,
}

/// The linked interface of a program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub attributes: Vec<AttributeInfo>,
    /// Sorted by `(group, binding)`.
    pub uniforms: Vec<UniformInfo>,
}

impl ProgramInterface {
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Number of bind groups, counting empty groups below the highest used.
    pub fn group_count(&self) -> u32 {
        self.uniforms.iter().map(|u| u.group + 1).max().unwrap_or(0)
    }
}

/// What one stage exposes, before linking.
#[derive(Debug)]
struct StageReflection {
    entry_point: String,
    inputs: Vec<AttributeInfo>,
    outputs: Vec<u32>,
    uniforms: Vec<UniformInfo>,
}

fn reflect_stage(stage: ProgramStage, naga_stage: ShaderStage, source: &str) -> Result<StageReflection, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga_stage)
        .ok_or_else(|| CompileError::new(stage, format!("no @{stage} entry point")))?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut uniforms = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let (Some(binding), Some(name)) = (&var.binding, &var.name) else {
            continue;
        };
        let inner = &module.types[var.ty].inner;
        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => UniformKind::Buffer {
                size: inner.size(module.to_ctx()),
            },
            (
                AddressSpace::Handle,
                TypeInner::Image {
                    dim: ImageDimension::D2,
                    arrayed: false,
                    class: ImageClass::Sampled {
                        kind: ScalarKind::Float,
                        multi: false,
                    },
                },
            ) => UniformKind::Texture,
            (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => UniformKind::Sampler,
            _ => {
                return Err(CompileError::new(
                    stage,
                    format!("binding `{name}` has an unsupported resource type"),
                ));
            }
        };
        uniforms.push(UniformInfo {
            name: name.clone(),
            group: binding.group,
            binding: binding.binding,
            kind,
            visibility: StageVisibility {
                vertex: stage == ProgramStage::Vertex,
                fragment: stage == ProgramStage::Fragment,
            },
        });
    }

    Ok(StageReflection {
        entry_point: entry.name.clone(),
        inputs: inputs
            .into_iter()
            .map(|(name, location, components)| AttributeInfo {
                name,
                location,
                components,
            })
            .collect(),
        outputs: outputs.into_iter().map(|(_, location, _)| location).collect(),
        uniforms,
    })
}

/// Flattens `@location` bindings, descending into struct members.
fn collect_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<(String, u32, u32)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            let components = match module.types[ty].inner {
                TypeInner::Scalar(_) => 1,
                TypeInner::Vector { size, .. } => size as u32,
                _ => 0,
            };
            out.push((name.unwrap_or_default().to_string(), *location, components));
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.name.as_deref(), member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn link(vertex: StageReflection, fragment: StageReflection) -> Result<ProgramInterface, CompileError> {
    for input in &fragment.inputs {
        if !vertex.outputs.contains(&input.location) {
            return Err(CompileError::new(
                ProgramStage::Link,
                format!(
                    "fragment input `{}` at @location({}) is not written by the vertex stage",
                    input.name, input.location
                ),
            ));
        }
    }

    let mut uniforms: Vec<UniformInfo> = vertex.uniforms;
    for frag in fragment.uniforms {
        if let Some(existing) = uniforms.iter_mut().find(|u| u.name == frag.name) {
            if (existing.group, existing.binding, existing.kind) != (frag.group, frag.binding, frag.kind) {
                return Err(CompileError::new(
                    ProgramStage::Link,
                    format!("uniform `{}` is declared differently in the two stages", frag.name),
                ));
            }
            existing.visibility.fragment = true;
            continue;
        }
        if let Some(clash) = uniforms
            .iter()
            .find(|u| u.group == frag.group && u.binding == frag.binding)
        {
            return Err(CompileError::new(
                ProgramStage::Link,
                format!(
                    "uniforms `{}` and `{}` both use @group({}) @binding({})",
                    clash.name, frag.name, frag.group, frag.binding
                ),
            ));
        }
        uniforms.push(frag);
    }
    uniforms.sort_by_key(|u| (u.group, u.binding));

    Ok(ProgramInterface {
        vertex_entry: vertex.entry_point,
        fragment_entry: fragment.entry_point,
        attributes: vertex.inputs,
        uniforms,
    })
}

/// Compiles and links a vertex/fragment pair without touching a backend.
pub fn link_program(vertex_source: &str, fragment_source: &str) -> Result<ProgramInterface, CompileError> {
    let vertex = reflect_stage(ProgramStage::Vertex, ShaderStage::Vertex, vertex_source)?;
    let fragment = reflect_stage(ProgramStage::Fragment, ShaderStage::Fragment, fragment_source)?;
    link(vertex, fragment)
}

/// A linked GPU program and its reflected interface.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    handle: Option<ProgramHandle>,
    interface: ProgramInterface,
}

impl ShaderProgram {
    /// Compiles, links and uploads a program. Nothing is allocated on the
    /// backend unless both stages compile and link.
    pub fn compile<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, CompileError> {
        let interface = link_program(vertex_source, fragment_source).inspect_err(|e| {
            tracing::warn!("program `{label}` rejected: {e}");
        })?;

        let handle = backend
            .create_program(&ProgramSource {
                label,
                vertex_source,
                fragment_source,
                interface: &interface,
            })
            .map_err(|diagnostic| {
                tracing::warn!("program `{label}` rejected by backend: {diagnostic}");
                CompileError::new(ProgramStage::Link, diagnostic)
            })?;

        tracing::debug!(
            "program `{label}` linked: {} attributes, {} uniforms",
            interface.attributes.len(),
            interface.uniforms.len()
        );
        Ok(Self {
            label: label.to_string(),
            handle: Some(handle),
            interface,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Result<ProgramHandle, RenderError> {
        self.handle.ok_or(RenderError::Released("shader program"))
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Shader location of the vertex attribute called `name`.
    pub fn attribute_location(&self, name: &str) -> Result<&AttributeInfo, RenderError> {
        self.interface
            .attribute(name)
            .ok_or_else(|| RenderError::unknown_attribute(name))
    }

    /// Slot of the uniform called `name`.
    pub fn uniform_location(&self, name: &str) -> Result<&UniformInfo, RenderError> {
        self.interface
            .uniform(name)
            .ok_or_else(|| RenderError::unknown_uniform(name))
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Frees the backend program. Safe to call more than once.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(handle) = self.handle.take() {
            backend.release_program(handle);
            tracing::debug!("program `{}` released", self.label);
        }
    }
}
