//! Headless backend that records every command instead of drawing.
//!
//! Validates calls the way a GPU driver would (live handles, frame
//! bracketing, vertex ranges) so the core can be exercised without a device.

use crate::backend::{
    BufferHandle, DrawCall, ProgramHandle, ProgramSource, RenderBackend, TextureHandle, UniformValue,
};
use crate::error::RenderError;
use quadview_common::{ClearColor, ImagePayload};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateProgram { handle: ProgramHandle, label: String },
    ReleaseProgram(ProgramHandle),
    CreateBuffer { handle: BufferHandle, label: String, floats: usize },
    ReleaseBuffer(BufferHandle),
    CreateTexture { handle: TextureHandle, label: String, width: u32, height: u32 },
    ReleaseTexture(TextureHandle),
    BeginFrame(ClearColor),
    Draw(DrawCall),
    EndFrame,
}

/// A live program and the uniform slots its interface declares.
#[derive(Debug)]
struct RecordedProgram {
    slots: Vec<(u32, u32, String)>,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    next_id: u64,
    programs: BTreeMap<ProgramHandle, RecordedProgram>,
    buffers: BTreeMap<BufferHandle, usize>,
    textures: BTreeMap<TextureHandle, (u32, u32)>,
    in_frame: bool,
    frames_presented: u64,
    program_failure: Option<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_program` fail with `diagnostic`.
    pub fn fail_next_program(&mut self, diagnostic: impl Into<String>) {
        self.program_failure = Some(diagnostic.into());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Draws submitted between the most recent `BeginFrame` and its `EndFrame`.
    pub fn last_frame_draws(&self) -> Vec<&DrawCall> {
        let start = self
            .commands
            .iter()
            .rposition(|c| matches!(c, Command::BeginFrame(_)))
            .map_or(0, |i| i + 1);
        self.commands[start..]
            .iter()
            .filter_map(|c| match c {
                Command::Draw(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Human-readable dump of the last frame's draws.
    pub fn describe_last_frame(&self) -> String {
        let mut out = String::new();
        let draws = self.last_frame_draws();
        let _ = writeln!(out, "=== frame {} ===", self.frames_presented);
        let _ = writeln!(out, "Draws: {}", draws.len());
        for call in draws {
            let _ = writeln!(
                out,
                "  [{}] program={} buffer={} {:?} vertices={}..{} uniforms={}",
                call.label,
                call.program.0,
                call.buffer.0,
                call.topology,
                call.first_vertex,
                call.first_vertex + call.vertex_count,
                call.uniforms.len()
            );
        }
        out
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for RecordingBackend {
    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramHandle, String> {
        if let Some(diagnostic) = self.program_failure.take() {
            return Err(diagnostic);
        }
        let handle = ProgramHandle(self.allocate_id());
        let slots = source
            .interface
            .uniforms
            .iter()
            .map(|u| (u.group, u.binding, u.name.clone()))
            .collect();
        self.programs.insert(handle, RecordedProgram { slots });
        self.commands.push(Command::CreateProgram {
            handle,
            label: source.label.to_string(),
        });
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            self.commands.push(Command::ReleaseProgram(program));
        }
    }

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[f32]) -> Result<BufferHandle, RenderError> {
        if vertices.is_empty() {
            return Err(RenderError::Backend(format!("buffer `{label}` is empty")));
        }
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(handle, vertices.len());
        self.commands.push(Command::CreateBuffer {
            handle,
            label: label.to_string(),
            floats: vertices.len(),
        });
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_some() {
            self.commands.push(Command::ReleaseBuffer(buffer));
        }
    }

    fn create_texture(&mut self, label: &str, image: &ImagePayload) -> Result<TextureHandle, RenderError> {
        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(handle, (image.width(), image.height()));
        self.commands.push(Command::CreateTexture {
            handle,
            label: label.to_string(),
            width: image.width(),
            height: image.height(),
        });
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.commands.push(Command::ReleaseTexture(texture));
        }
    }

    fn begin_frame(&mut self, clear: ClearColor) -> Result<(), RenderError> {
        if self.in_frame {
            return Err(RenderError::Backend("begin_frame called twice".into()));
        }
        self.in_frame = true;
        self.commands.push(Command::BeginFrame(clear));
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::Backend("draw outside of a frame".into()));
        }
        let program = self
            .programs
            .get(&call.program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", call.program.0)))?;
        // A bind group missing one of its entries is a validation error on a real device.
        if let Some((_, _, name)) = program.slots.iter().find(|(group, binding, _)| {
            !call
                .uniforms
                .iter()
                .any(|u| (u.group, u.binding) == (*group, *binding))
        }) {
            return Err(RenderError::UnboundUniform(name.clone()));
        }
        let floats = *self
            .buffers
            .get(&call.buffer)
            .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", call.buffer.0)))?;
        for uniform in &call.uniforms {
            if let UniformValue::Texture(t) | UniformValue::Sampler(t) = uniform.value {
                if !self.textures.contains_key(&t) {
                    return Err(RenderError::UnknownResource(format!("texture {}", t.0)));
                }
            }
        }
        let end_bytes = (call.first_vertex as u64 + call.vertex_count as u64) * call.stride_bytes as u64;
        if end_bytes > floats as u64 * 4 {
            return Err(RenderError::Backend(format!(
                "draw `{}` reads past the end of buffer {}",
                call.label, call.buffer.0
            )));
        }
        self.commands.push(Command::Draw(call));
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::Backend("end_frame without begin_frame".into()));
        }
        self.in_frame = false;
        self.frames_presented += 1;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Topology;

    fn call(program: ProgramHandle, buffer: BufferHandle, vertex_count: u32) -> DrawCall {
        DrawCall {
            label: "quad".into(),
            program,
            buffer,
            stride_bytes: 20,
            attributes: vec![],
            uniforms: vec![],
            topology: Topology::TriangleFan,
            first_vertex: 0,
            vertex_count,
        }
    }

    fn program(backend: &mut RecordingBackend) -> ProgramHandle {
        program_with(backend, crate::shader::ProgramInterface::default())
    }

    fn program_with(backend: &mut RecordingBackend, iface: crate::shader::ProgramInterface) -> ProgramHandle {
        backend
            .create_program(&ProgramSource {
                label: "p",
                vertex_source: "",
                fragment_source: "",
                interface: &iface,
            })
            .unwrap()
    }

    #[test]
    fn draw_requires_open_frame() {
        let mut backend = RecordingBackend::new();
        let p = program(&mut backend);
        let b = backend.create_vertex_buffer("quad", &[0.0; 20]).unwrap();
        assert!(backend.draw(call(p, b, 4)).is_err());
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        backend.draw(call(p, b, 4)).unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.frames_presented(), 1);
        assert_eq!(backend.last_frame_draws().len(), 1);
    }

    #[test]
    fn draw_past_buffer_end_is_rejected() {
        let mut backend = RecordingBackend::new();
        let p = program(&mut backend);
        let b = backend.create_vertex_buffer("quad", &[0.0; 20]).unwrap();
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        assert!(matches!(backend.draw(call(p, b, 5)), Err(RenderError::Backend(_))));
    }

    #[test]
    fn released_handles_are_unknown() {
        let mut backend = RecordingBackend::new();
        let p = program(&mut backend);
        let b = backend.create_vertex_buffer("quad", &[0.0; 20]).unwrap();
        backend.release_buffer(b);
        backend.release_buffer(b);
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        assert!(matches!(
            backend.draw(call(p, b, 4)),
            Err(RenderError::UnknownResource(_))
        ));
        let releases = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::ReleaseBuffer(_)))
            .count();
        assert_eq!(releases, 1);
    }

    #[test]
    fn draw_must_cover_every_declared_uniform() {
        let mut backend = RecordingBackend::new();
        let iface = crate::shader::link_program(
            crate::shaders::QUAD_VERTEX_SHADER,
            crate::shaders::QUAD_FRAGMENT_SHADER,
        )
        .unwrap();
        let p = program_with(&mut backend, iface);
        let b = backend.create_vertex_buffer("quad", &[0.0; 20]).unwrap();
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        assert!(matches!(
            backend.draw(call(p, b, 4)),
            Err(RenderError::UnboundUniform(_))
        ));
        assert!(backend.last_frame_draws().is_empty());
    }

    #[test]
    fn describe_lists_draws() {
        let mut backend = RecordingBackend::new();
        let p = program(&mut backend);
        let b = backend.create_vertex_buffer("quad", &[0.0; 20]).unwrap();
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        backend.draw(call(p, b, 4)).unwrap();
        backend.end_frame().unwrap();
        let text = backend.describe_last_frame();
        assert!(text.contains("Draws: 1"));
        assert!(text.contains("TriangleFan"));
    }
}
