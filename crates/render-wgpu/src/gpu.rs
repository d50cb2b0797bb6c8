use quadview_common::{ClearColor, ImagePayload};
use quadview_render::backend::{
    AttributeBinding, BufferHandle, DrawCall, ProgramHandle, ProgramSource, RenderBackend, TextureHandle,
    Topology, UniformValue,
};
use quadview_render::shader::{StageVisibility, UniformKind};
use quadview_render::RenderError;
use std::collections::{BTreeMap, HashMap};
use wgpu::util::DeviceExt;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Shader modules and bind group layouts for one linked program. Pipelines
/// are built lazily per vertex layout.
struct GpuProgram {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    stride_bytes: u32,
    attributes: Vec<AttributeBinding>,
}

/// A validated draw waiting for `end_frame`.
struct PreparedDraw {
    pipeline: PipelineKey,
    buffer: BufferHandle,
    bind_groups: Vec<wgpu::BindGroup>,
    first_vertex: u32,
    vertex_count: u32,
    indexed: bool,
}

struct OpenFrame {
    clear: ClearColor,
    draws: Vec<PreparedDraw>,
    uniforms_used: usize,
}

/// [`RenderBackend`] on a wgpu device.
///
/// Draws are validated and their uniforms staged as they arrive; the render
/// pass is encoded and submitted in `end_frame` against the target set with
/// [`WgpuBackend::set_target`]. Each matrix uniform of each draw gets its own
/// buffer, so later draws in a frame never overwrite earlier ones.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth: wgpu::TextureView,
    size: (u32, u32),
    target: Option<wgpu::TextureView>,
    next_id: u64,
    programs: BTreeMap<ProgramHandle, GpuProgram>,
    buffers: BTreeMap<BufferHandle, GpuBuffer>,
    textures: BTreeMap<TextureHandle, GpuTexture>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    fan_indices: Option<(u32, wgpu::Buffer)>,
    uniform_pool: Vec<wgpu::Buffer>,
    frame: Option<OpenFrame>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let depth = create_depth_texture(&device, width, height);
        Self {
            device,
            queue,
            color_format,
            depth,
            size: (width.max(1), height.max(1)),
            target: None,
            next_id: 0,
            programs: BTreeMap::new(),
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            pipelines: HashMap::new(),
            fan_indices: None,
            uniform_pool: Vec::new(),
            frame: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Recreates the depth buffer for a new surface size.
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if size != self.size {
            self.depth = create_depth_texture(&self.device, size.0, size.1);
            self.size = size;
        }
    }

    /// Colour attachment for the next frame. It must match the size last
    /// passed to [`WgpuBackend::resize`].
    pub fn set_target(&mut self, view: wgpu::TextureView) {
        self.target = Some(view);
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_program(&self, source: &ProgramSource<'_>) -> GpuProgram {
        let label = source.label;
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}_vs")),
            source: wgpu::ShaderSource::Wgsl(source.vertex_source.into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}_fs")),
            source: wgpu::ShaderSource::Wgsl(source.fragment_source.into()),
        });

        let iface = source.interface;
        let group_layouts: Vec<_> = (0..iface.group_count())
            .map(|group| {
                let entries: Vec<_> = iface
                    .uniforms
                    .iter()
                    .filter(|u| u.group == group)
                    .map(|u| wgpu::BindGroupLayoutEntry {
                        binding: u.binding,
                        visibility: shader_stages(u.visibility),
                        ty: binding_type(u.kind),
                        count: None,
                    })
                    .collect();
                self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{label}_group{group}")),
                    entries: &entries,
                })
            })
            .collect();

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label}_layout")),
            bind_group_layouts: &group_layouts.iter().collect::<Vec<_>>(),
            push_constant_ranges: &[],
        });

        GpuProgram {
            label: label.to_string(),
            vertex,
            fragment,
            vertex_entry: iface.vertex_entry.clone(),
            fragment_entry: iface.fragment_entry.clone(),
            group_layouts,
            pipeline_layout,
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> Result<(), RenderError> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", key.program.0)))?;
        let attributes = key
            .attributes
            .iter()
            .map(|a| {
                Ok(wgpu::VertexAttribute {
                    format: vertex_format(a.components)?,
                    offset: a.offset_bytes as u64,
                    shader_location: a.location,
                })
            })
            .collect::<Result<Vec<_>, RenderError>>()?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{}_pipeline", program.label)),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(&program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: key.stride_bytes as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some(&program.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            // Fans and lists both become indexed or plain triangle lists.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Backend(format!(
                "pipeline for `{}` rejected: {err}",
                program.label
            )));
        }
        tracing::debug!("built pipeline for `{}` (stride {})", program.label, key.stride_bytes);
        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    /// Grows the shared fan index buffer to cover `vertex_count` vertices.
    fn ensure_fan_indices(&mut self, vertex_count: u32) {
        if matches!(&self.fan_indices, Some((capacity, _)) if *capacity >= vertex_count) {
            return;
        }
        let indices = fan_indices(vertex_count);
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fan_indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.fan_indices = Some((vertex_count, buffer));
    }

    fn ensure_uniform_pool(&mut self, needed: usize) {
        while self.uniform_pool.len() < needed {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("mat4_uniform_{}", self.uniform_pool.len())),
                size: std::mem::size_of::<[f32; 16]>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.uniform_pool.push(buffer);
        }
    }

    /// Creates one bind group per program group from the draw's uniform
    /// values, staging matrices into pool buffers starting at `first_slot`.
    fn bind_groups(&self, call: &DrawCall, first_slot: usize) -> Result<Vec<wgpu::BindGroup>, RenderError> {
        let program = self
            .programs
            .get(&call.program)
            .ok_or_else(|| RenderError::UnknownResource(format!("program {}", call.program.0)))?;

        let mut slot = first_slot;
        let mut entries: Vec<Vec<wgpu::BindGroupEntry<'_>>> = program.group_layouts.iter().map(|_| Vec::new()).collect();
        for uniform in &call.uniforms {
            let group = entries.get_mut(uniform.group as usize).ok_or_else(|| {
                RenderError::Backend(format!("draw `{}` binds group {} the program lacks", call.label, uniform.group))
            })?;
            let resource = match uniform.value {
                UniformValue::Mat4(m) => {
                    let buffer = &self.uniform_pool[slot];
                    slot += 1;
                    self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&m.to_cols_array()));
                    buffer.as_entire_binding()
                }
                UniformValue::Texture(h) => wgpu::BindingResource::TextureView(&self.texture(h)?.view),
                UniformValue::Sampler(h) => wgpu::BindingResource::Sampler(&self.texture(h)?.sampler),
            };
            group.push(wgpu::BindGroupEntry {
                binding: uniform.binding,
                resource,
            });
        }

        // Layout mismatches must not reach the uncaptured error handler.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let groups: Vec<_> = program
            .group_layouts
            .iter()
            .zip(&entries)
            .enumerate()
            .map(|(group, (layout, entries))| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{}_group{group}", call.label)),
                    layout,
                    entries,
                })
            })
            .collect();
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Backend(format!("bind groups for `{}` rejected: {err}", call.label)));
        }
        Ok(groups)
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture, RenderError> {
        self.textures
            .get(&handle)
            .ok_or_else(|| RenderError::UnknownResource(format!("texture {}", handle.0)))
    }
}

impl RenderBackend for WgpuBackend {
    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramHandle, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let program = self.build_program(source);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }
        let handle = ProgramHandle(self.allocate_id());
        tracing::debug!("created program `{}` as {}", source.label, handle.0);
        self.programs.insert(handle, program);
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            self.pipelines.retain(|key, _| key.program != program);
        }
    }

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[f32]) -> Result<BufferHandle, RenderError> {
        if vertices.is_empty() {
            return Err(RenderError::Backend(format!("buffer `{label}` is empty")));
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                size_bytes: std::mem::size_of_val(vertices) as u64,
            },
        );
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.buffer.destroy();
        }
    }

    fn create_texture(&mut self, label: &str, image: &ImagePayload) -> Result<TextureHandle, RenderError> {
        let size = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.rgba(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.bytes_per_row()),
                rows_per_image: Some(image.height()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let handle = TextureHandle(self.allocate_id());
        tracing::debug!("uploaded texture `{label}` {}x{}", image.width(), image.height());
        self.textures.insert(
            handle,
            GpuTexture {
                _texture: texture,
                view,
                sampler,
            },
        );
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn begin_frame(&mut self, clear: ClearColor) -> Result<(), RenderError> {
        if self.frame.is_some() {
            return Err(RenderError::Backend("begin_frame called twice".into()));
        }
        self.frame = Some(OpenFrame {
            clear,
            draws: Vec::new(),
            uniforms_used: 0,
        });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError> {
        let first_slot = match &self.frame {
            Some(frame) => frame.uniforms_used,
            None => return Err(RenderError::Backend("draw outside of a frame".into())),
        };
        let buffer = self
            .buffers
            .get(&call.buffer)
            .ok_or_else(|| RenderError::UnknownResource(format!("buffer {}", call.buffer.0)))?;
        let end_bytes = (call.first_vertex as u64 + call.vertex_count as u64) * call.stride_bytes as u64;
        if end_bytes > buffer.size_bytes {
            return Err(RenderError::Backend(format!(
                "draw `{}` reads past the end of buffer {}",
                call.label, call.buffer.0
            )));
        }

        let key = PipelineKey {
            program: call.program,
            stride_bytes: call.stride_bytes,
            attributes: call.attributes.clone(),
        };
        self.ensure_pipeline(&key)?;

        let matrices = call
            .uniforms
            .iter()
            .filter(|u| matches!(u.value, UniformValue::Mat4(_)))
            .count();
        self.ensure_uniform_pool(first_slot + matrices);
        let bind_groups = self.bind_groups(&call, first_slot)?;

        let indexed = call.topology == Topology::TriangleFan;
        if indexed {
            self.ensure_fan_indices(call.vertex_count);
        }

        if let Some(frame) = &mut self.frame {
            frame.uniforms_used += matrices;
            frame.draws.push(PreparedDraw {
                pipeline: key,
                buffer: call.buffer,
                bind_groups,
                first_vertex: call.first_vertex,
                vertex_count: call.vertex_count,
                indexed,
            });
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| RenderError::Backend("end_frame without begin_frame".into()))?;
        let target = self
            .target
            .take()
            .ok_or_else(|| RenderError::Backend("no render target set for this frame".into()))?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("quad_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: frame.clear.r,
                            g: frame.clear.g,
                            b: frame.clear.b,
                            a: frame.clear.a,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for draw in &frame.draws {
                let (Some(pipeline), Some(buffer)) =
                    (self.pipelines.get(&draw.pipeline), self.buffers.get(&draw.buffer))
                else {
                    tracing::warn!("dropping a draw whose resources were released mid-frame");
                    continue;
                };
                pass.set_pipeline(pipeline);
                for (index, group) in draw.bind_groups.iter().enumerate() {
                    pass.set_bind_group(index as u32, group, &[]);
                }
                pass.set_vertex_buffer(0, buffer.buffer.slice(..));
                match (&self.fan_indices, draw.indexed) {
                    (Some((_, indices)), true) => {
                        let index_count = Topology::TriangleFan.triangle_count(draw.vertex_count) * 3;
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..index_count, draw.first_vertex as i32, 0..1);
                    }
                    _ => {
                        pass.draw(draw.first_vertex..draw.first_vertex + draw.vertex_count, 0..1);
                    }
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

/// Triangle-list indices `[0, i, i + 1]` covering a fan of `vertex_count`
/// vertices.
pub fn fan_indices(vertex_count: u32) -> Vec<u32> {
    (1..vertex_count.saturating_sub(1))
        .flat_map(|i| [0, i, i + 1])
        .collect()
}

fn vertex_format(components: u32) -> Result<wgpu::VertexFormat, RenderError> {
    match components {
        1 => Ok(wgpu::VertexFormat::Float32),
        2 => Ok(wgpu::VertexFormat::Float32x2),
        3 => Ok(wgpu::VertexFormat::Float32x3),
        4 => Ok(wgpu::VertexFormat::Float32x4),
        n => Err(RenderError::Backend(format!("no vertex format for {n} components"))),
    }
}

fn shader_stages(visibility: StageVisibility) -> wgpu::ShaderStages {
    let mut stages = wgpu::ShaderStages::NONE;
    if visibility.vertex {
        stages |= wgpu::ShaderStages::VERTEX;
    }
    if visibility.fragment {
        stages |= wgpu::ShaderStages::FRAGMENT;
    }
    stages
}

fn binding_type(kind: UniformKind) -> wgpu::BindingType {
    match kind {
        UniformKind::Buffer { size } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        UniformKind::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        UniformKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_fan_becomes_two_triangles() {
        assert_eq!(fan_indices(4), vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(fan_indices(3), vec![0, 1, 2]);
        assert!(fan_indices(2).is_empty());
        assert!(fan_indices(0).is_empty());
    }

    #[test]
    fn fan_index_count_matches_topology() {
        for n in 3..10 {
            assert_eq!(
                fan_indices(n).len() as u32,
                Topology::TriangleFan.triangle_count(n) * 3
            );
        }
    }

    #[test]
    fn vertex_formats_by_width() {
        assert_eq!(vertex_format(2).unwrap(), wgpu::VertexFormat::Float32x2);
        assert_eq!(vertex_format(3).unwrap(), wgpu::VertexFormat::Float32x3);
        assert!(vertex_format(5).is_err());
    }

    #[test]
    fn visibility_maps_to_stages() {
        let both = StageVisibility {
            vertex: true,
            fragment: true,
        };
        assert_eq!(shader_stages(both), wgpu::ShaderStages::VERTEX_FRAGMENT);
        assert_eq!(shader_stages(StageVisibility::default()), wgpu::ShaderStages::NONE);
    }

    #[test]
    fn matrix_slots_require_exact_size() {
        match binding_type(UniformKind::Buffer { size: 64 }) {
            wgpu::BindingType::Buffer { min_binding_size, .. } => {
                assert_eq!(min_binding_size.map(|s| s.get()), Some(64));
            }
            other => panic!("unexpected binding type {other:?}"),
        }
    }
}
