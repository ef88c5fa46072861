//! Shader programs.
//!
//! A [`ShaderProgram`] is a vertex/fragment pair validated by naga, reflected into name-keyed
//! uniform and attribute tables, and turned into wgpu pipelines on demand. Compile and link
//! failures are logged and leave a broken program behind instead of aborting; drawing with a
//! broken program reports [`DrawError::ProgramBroken`].

use std::collections::{BTreeMap, HashMap};

use naga::ShaderStage;

use super::{
    ResourceId, Tracked,
    frame::{DrawCall, DrawRange, Frame, GroupBinding, GroupResource},
    reflect::{self, AttributeKind, ProgramReflection},
    states::RasterState,
    uniform::{Setter, UniformType, UniformValue, setter_for},
};
use crate::{
    context::Context,
    data_structures::scene::ComponentType,
    error::{BindingError, DrawError},
};

/// Vertex buffer offsets and strides must be multiples of this.
const VERTEX_ALIGNMENT: u64 = 4;

/// How a vertex buffer feeds one attribute.
#[derive(Clone, Copy, Debug)]
pub struct AttributeConfig<'a> {
    pub buffer: &'a Tracked<wgpu::Buffer>,
    pub components: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
    /// Bytes between consecutive vertices, 0 for tightly packed.
    pub stride: u32,
    pub offset: u64,
}

#[derive(Clone, Debug)]
struct BoundAttribute {
    buffer: Tracked<wgpu::Buffer>,
    offset: u64,
    format: wgpu::VertexFormat,
    stride: u64,
}

#[derive(Clone, Debug)]
struct BlockData {
    group: u32,
    binding: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Stages {
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    raster: RasterState,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    vertex: Vec<(u32, wgpu::VertexFormat, u64)>,
    topology: wgpu::PrimitiveTopology,
    strip_index_format: Option<wgpu::IndexFormat>,
}

#[derive(Debug)]
pub struct ShaderProgram {
    id: ResourceId,
    label: String,
    stages: Option<Stages>,
    reflection: ProgramReflection,
    setters: BTreeMap<String, Setter>,
    blocks: Vec<BlockData>,
    layouts: Vec<Tracked<wgpu::BindGroupLayout>>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    samplers: BTreeMap<String, u32>,
    attributes: BTreeMap<String, BoundAttribute>,
    pipelines: HashMap<PipelineKey, Tracked<wgpu::RenderPipeline>>,
}

impl ShaderProgram {
    /// Builds a program from separate vertex and fragment sources, each holding one entry
    /// point of its stage.
    pub fn compile(ctx: &Context, label: &str, vertex_src: &str, fragment_src: &str) -> Self {
        let vertex = parse_logged(label, "vertex", vertex_src);
        let fragment = parse_logged(label, "fragment", fragment_src);
        let linked = match (&vertex, &fragment) {
            (Some((vm, vi)), Some((fm, fi))) => link_logged(
                label,
                reflect::reflect_stage(vm, vi, ShaderStage::Vertex, None),
                reflect::reflect_stage(fm, fi, ShaderStage::Fragment, None),
            ),
            _ => None,
        };
        Self::finish(ctx, label, linked, vertex_src, fragment_src)
    }

    /// Builds a program from one WGSL source declaring both entry points.
    pub fn from_wgsl(ctx: &Context, label: &str, source: &str) -> Self {
        let linked = parse_logged(label, "program", source).and_then(|(module, info)| {
            link_logged(
                label,
                reflect::reflect_stage(&module, &info, ShaderStage::Vertex, None),
                reflect::reflect_stage(&module, &info, ShaderStage::Fragment, None),
            )
        });
        Self::finish(ctx, label, linked, source, source)
    }

    fn finish(
        ctx: &Context,
        label: &str,
        linked: Option<(ProgramReflection, String, String)>,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Self {
        let mut program = Self {
            id: ResourceId::next(),
            label: label.to_string(),
            stages: None,
            reflection: ProgramReflection::default(),
            setters: BTreeMap::new(),
            blocks: Vec::new(),
            layouts: Vec::new(),
            pipeline_layout: None,
            samplers: BTreeMap::new(),
            attributes: BTreeMap::new(),
            pipelines: HashMap::new(),
        };
        let Some((reflection, vertex_entry, fragment_entry)) = linked else {
            return program;
        };

        let device = &ctx.device;
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(vertex_src.to_owned().into()),
        });
        let fragment = if std::ptr::eq(vertex_src, fragment_src) {
            vertex.clone()
        } else {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(fragment_src.to_owned().into()),
            })
        };

        program.layouts = (0..reflection.group_count())
            .map(|group| {
                Tracked::new(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries: &reflection.layout_entries(group),
                }))
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> =
            program.layouts.iter().map(|l| l.handle()).collect();
        program.pipeline_layout = Some(device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            },
        ));

        program.blocks = reflection
            .blocks
            .iter()
            .map(|b| BlockData {
                group: b.group,
                binding: b.binding,
                data: vec![0; b.size as usize],
            })
            .collect();
        program.setters = reflection
            .uniforms
            .values()
            .filter_map(|u| setter_for(u.ty).map(|s| (u.name.clone(), s)))
            .collect();
        log::debug!(
            "linked {label}: {} attributes, {} uniforms, {} blocks",
            reflection.attributes.len(),
            reflection.uniforms.len(),
            reflection.blocks.len()
        );
        program.reflection = reflection;
        program.stages = Some(Stages {
            vertex,
            vertex_entry,
            fragment,
            fragment_entry,
        });
        program
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_broken(&self) -> bool {
        self.stages.is_none()
    }

    pub fn reflection(&self) -> &ProgramReflection {
        &self.reflection
    }

    /// Makes this the active program. Returns whether the active program changed.
    pub fn use_program(&self, ctx: &mut Context) -> bool {
        ctx.states.use_program(Some(self.id))
    }

    /// Assigns a uniform by name. Sampler uniforms take a texture: a unit is allocated, the
    /// texture bound to it and the unit recorded for the sampler.
    pub fn set_uniform<'a>(
        &mut self,
        ctx: &mut Context,
        name: &str,
        value: impl Into<UniformValue<'a>>,
    ) -> Result<(), BindingError> {
        let value = value.into();
        let Some(info) = self.reflection.uniforms.get(name) else {
            log::warn!("setUniform {name} fail");
            return Err(BindingError::UniformNotFound(name.to_string()));
        };
        let mismatch = || BindingError::TypeMismatch {
            name: name.to_string(),
            expected: info.ty.name(),
            found: value.name().to_string(),
        };

        if let UniformType::Sampler(kind) = info.ty {
            let UniformValue::Texture(texture) = value else {
                return Err(mismatch());
            };
            if texture.dimension != kind.dimension {
                return Err(BindingError::TextureDimension {
                    name: name.to_string(),
                    expected: kind.dimension,
                    found: texture.dimension,
                });
            }
            let unit = ctx.units.alloc_unit();
            ctx.states.active_texture(unit);
            ctx.states.bind_texture(texture.binding());
            self.samplers.insert(name.to_string(), unit);
            return Ok(());
        }

        let setter = self.setters.get(name).ok_or_else(mismatch)?;
        let block = self
            .blocks
            .iter_mut()
            .find(|b| b.group == info.group && b.binding == info.binding)
            .ok_or_else(mismatch)?;
        let dst = block
            .data
            .get_mut(info.byte_range())
            .ok_or_else(mismatch)?;
        setter(dst, info.stride, &value).ok_or_else(|| {
            let err = mismatch();
            log::warn!("setUniform {name}: {err}");
            err
        })
    }

    /// Feeds an attribute from a vertex buffer. Each attribute gets its own buffer slot.
    pub fn set_attribute(
        &mut self,
        ctx: &mut Context,
        name: &str,
        config: AttributeConfig,
    ) -> Result<(), BindingError> {
        let Some(info) = self.reflection.attributes.get(name) else {
            log::warn!("setAttribute {name} fail");
            return Err(BindingError::AttributeNotFound(name.to_string()));
        };
        let unsupported = |reason: String| BindingError::UnsupportedVertexFormat {
            name: name.to_string(),
            reason,
        };
        let format = vertex_format(config.components, config.component_type, config.normalized)
            .ok_or_else(|| {
                unsupported(format!(
                    "{} x {:?} (normalized: {})",
                    config.components, config.component_type, config.normalized
                ))
            })?;
        if format_kind(format) != info.kind {
            return Err(unsupported(format!(
                "{format:?} cannot feed a {:?} input",
                info.kind
            )));
        }
        let stride = if config.stride == 0 {
            format.size()
        } else {
            config.stride as u64
        };
        if stride % VERTEX_ALIGNMENT != 0 || config.offset % VERTEX_ALIGNMENT != 0 {
            return Err(unsupported(format!(
                "stride {stride} and offset {} must be multiples of {}",
                config.offset,
                VERTEX_ALIGNMENT
            )));
        }

        ctx.states.bind_array_buffer(Some(config.buffer.id()));
        self.attributes.insert(
            name.to_string(),
            BoundAttribute {
                buffer: config.buffer.clone(),
                offset: config.offset,
                format,
                stride,
            },
        );
        Ok(())
    }

    /// Records a draw into the frame's current pass with the uniforms, textures and state as
    /// they are right now.
    pub fn draw(
        &mut self,
        ctx: &Context,
        frame: &mut Frame,
        range: DrawRange,
        topology: wgpu::PrimitiveTopology,
    ) -> Result<(), DrawError> {
        let (Some(stages), Some(pipeline_layout)) = (&self.stages, &self.pipeline_layout) else {
            return Err(DrawError::ProgramBroken(self.label.clone()));
        };
        let target = frame.current_target().ok_or(DrawError::NoActivePass)?.clone();

        let mut inputs: Vec<_> = self.reflection.attributes.values().collect();
        inputs.sort_by_key(|a| a.location);
        let mut vertex_buffers = Vec::with_capacity(inputs.len());
        let mut vertex_key = Vec::with_capacity(inputs.len());
        for input in inputs {
            let bound = self
                .attributes
                .get(&input.name)
                .ok_or_else(|| DrawError::MissingAttribute(input.name.clone()))?;
            vertex_buffers.push((bound.buffer.clone(), bound.offset));
            vertex_key.push((input.location, bound.format, bound.stride));
        }

        let index = match range {
            DrawRange::Indexed { .. } => {
                let bound = ctx.states.index_buffer().ok_or(DrawError::NoIndexBuffer)?;
                Some((bound.buffer.clone(), bound.format, bound.offset))
            }
            DrawRange::Arrays { .. } => None,
        };

        let mut textures = Vec::new();
        for texture in self.reflection.textures.values() {
            let binding = self
                .samplers
                .get(&texture.name)
                .and_then(|unit| ctx.states.texture_unit(*unit))
                .ok_or_else(|| DrawError::UnboundTexture(texture.name.clone()))?;
            if binding.dimension != texture.kind.dimension {
                return Err(BindingError::TextureDimension {
                    name: texture.name.clone(),
                    expected: texture.kind.dimension,
                    found: binding.dimension,
                }
                .into());
            }
            textures.push((texture.group, texture.binding, texture.sampler_binding, binding.clone()));
        }

        let mut groups = Vec::with_capacity(self.layouts.len());
        for (group, layout) in self.layouts.iter().enumerate() {
            let group = group as u32;
            let mut entries = Vec::new();
            let mut dynamic_offsets = Vec::new();
            let mut blocks: Vec<_> = self.blocks.iter().filter(|b| b.group == group).collect();
            blocks.sort_by_key(|b| b.binding);
            for block in blocks {
                dynamic_offsets.push(frame.push_uniforms(&block.data));
                entries.push((
                    block.binding,
                    GroupResource::Uniform {
                        size: block.data.len() as u64,
                    },
                ));
            }
            for (_, binding, sampler_binding, bound) in textures.iter().filter(|t| t.0 == group) {
                entries.push((*binding, GroupResource::Texture(bound.view.clone())));
                entries.push((*sampler_binding, GroupResource::Sampler(bound.sampler.clone())));
            }
            entries.sort_by_key(|(binding, _)| *binding);
            groups.push(GroupBinding {
                layout: layout.clone(),
                entries,
                dynamic_offsets,
            });
        }

        let strip_index_format = match topology {
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip => {
                index.as_ref().map(|(_, format, _)| *format)
            }
            _ => None,
        };
        let key = PipelineKey {
            raster: ctx.states.raster(),
            color_format: target.color_format,
            depth_format: target.depth.as_ref().map(|(_, format)| *format),
            vertex: vertex_key,
            topology,
            strip_index_format,
        };
        let pipeline = match self.pipelines.get(&key) {
            Some(pipeline) => pipeline.clone(),
            None => {
                let pipeline = Tracked::new(create_pipeline(
                    &ctx.device,
                    &self.label,
                    pipeline_layout,
                    stages,
                    &key,
                ));
                self.pipelines.insert(key, pipeline.clone());
                pipeline
            }
        };

        let draw = DrawCall {
            viewport: ctx.states.viewport_for(target.size),
            scissor: ctx.states.scissor_for(target.size),
            blend_constant: ctx.states.blend_constant(),
            stencil_reference: ctx.states.stencil_reference(),
            pipeline,
            groups,
            vertex_buffers,
            index,
            range,
        };
        frame.push_draw(draw).map_err(|_| DrawError::NoActivePass)
    }
}

fn annotate(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(k, line)| format!("{k}:{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_logged(
    label: &str,
    stage: &str,
    source: &str,
) -> Option<(naga::Module, naga::valid::ModuleInfo)> {
    match reflect::parse_wgsl(source) {
        Ok(parsed) => Some(parsed),
        Err(diagnostic) => {
            log::error!(
                "{label}: {stage} shader failed to compile\n{diagnostic}\n{}",
                annotate(source)
            );
            None
        }
    }
}

fn link_logged(
    label: &str,
    vertex: Result<reflect::StageReflection, crate::error::LinkError>,
    fragment: Result<reflect::StageReflection, crate::error::LinkError>,
) -> Option<(ProgramReflection, String, String)> {
    let linked = vertex.and_then(|vs| {
        let fs = fragment?;
        let entries = (vs.entry_point.clone(), fs.entry_point.clone());
        reflect::link(vs, fs).map(|reflection| (reflection, entries.0, entries.1))
    });
    match linked {
        Ok(linked) => Some(linked),
        Err(e) => {
            log::error!("{label}: program failed to link: {e}");
            None
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    stages: &Stages,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .vertex
        .iter()
        .map(|(location, format, _)| {
            [wgpu::VertexAttribute {
                format: *format,
                offset: 0,
                shader_location: *location,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = key
        .vertex
        .iter()
        .zip(&attributes)
        .map(|((_, _, stride), attributes)| wgpu::VertexBufferLayout {
            array_stride: *stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &stages.vertex,
            entry_point: Some(stages.vertex_entry.as_str()),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &stages.fragment,
            entry_point: Some(stages.fragment_entry.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.color_format,
                blend: key.raster.blend,
                write_mask: key.raster.color_write,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: key.strip_index_format,
            front_face: key.raster.front_face,
            cull_mode: key.raster.cull(),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: key.depth_format.map(|format| key.raster.depth_stencil(format)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Maps an accessor layout onto a vertex format. Three-component 8- and 16-bit layouts have
/// no wgpu counterpart.
pub fn vertex_format(
    components: u32,
    component_type: ComponentType,
    normalized: bool,
) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    Some(match (component_type, normalized, components) {
        (ComponentType::Float, _, 1) => F::Float32,
        (ComponentType::Float, _, 2) => F::Float32x2,
        (ComponentType::Float, _, 3) => F::Float32x3,
        (ComponentType::Float, _, 4) => F::Float32x4,
        (ComponentType::UnsignedByte, true, 1) => F::Unorm8,
        (ComponentType::UnsignedByte, true, 2) => F::Unorm8x2,
        (ComponentType::UnsignedByte, true, 4) => F::Unorm8x4,
        (ComponentType::UnsignedByte, false, 1) => F::Uint8,
        (ComponentType::UnsignedByte, false, 2) => F::Uint8x2,
        (ComponentType::UnsignedByte, false, 4) => F::Uint8x4,
        (ComponentType::Byte, true, 1) => F::Snorm8,
        (ComponentType::Byte, true, 2) => F::Snorm8x2,
        (ComponentType::Byte, true, 4) => F::Snorm8x4,
        (ComponentType::Byte, false, 1) => F::Sint8,
        (ComponentType::Byte, false, 2) => F::Sint8x2,
        (ComponentType::Byte, false, 4) => F::Sint8x4,
        (ComponentType::UnsignedShort, true, 1) => F::Unorm16,
        (ComponentType::UnsignedShort, true, 2) => F::Unorm16x2,
        (ComponentType::UnsignedShort, true, 4) => F::Unorm16x4,
        (ComponentType::UnsignedShort, false, 1) => F::Uint16,
        (ComponentType::UnsignedShort, false, 2) => F::Uint16x2,
        (ComponentType::UnsignedShort, false, 4) => F::Uint16x4,
        (ComponentType::Short, true, 1) => F::Snorm16,
        (ComponentType::Short, true, 2) => F::Snorm16x2,
        (ComponentType::Short, true, 4) => F::Snorm16x4,
        (ComponentType::Short, false, 1) => F::Sint16,
        (ComponentType::Short, false, 2) => F::Sint16x2,
        (ComponentType::Short, false, 4) => F::Sint16x4,
        (ComponentType::UnsignedInt, false, 1) => F::Uint32,
        (ComponentType::UnsignedInt, false, 2) => F::Uint32x2,
        (ComponentType::UnsignedInt, false, 3) => F::Uint32x3,
        (ComponentType::UnsignedInt, false, 4) => F::Uint32x4,
        _ => return None,
    })
}

fn format_kind(format: wgpu::VertexFormat) -> AttributeKind {
    use wgpu::VertexFormat as F;
    match format {
        F::Uint8 | F::Uint8x2 | F::Uint8x4 | F::Uint16 | F::Uint16x2 | F::Uint16x4 => {
            AttributeKind::Uint
        }
        F::Uint32 | F::Uint32x2 | F::Uint32x3 | F::Uint32x4 => AttributeKind::Uint,
        F::Sint8 | F::Sint8x2 | F::Sint8x4 | F::Sint16 | F::Sint16x2 | F::Sint16x4 => {
            AttributeKind::Sint
        }
        F::Sint32 | F::Sint32x2 | F::Sint32x3 | F::Sint32x4 => AttributeKind::Sint,
        _ => AttributeKind::Float,
    }
}
