//! Shader introspection over the naga IR.
//!
//! Each stage is reflected on its own: location inputs and outputs, uniform blocks flattened
//! into named members, textures and samplers. [`link`] then checks a vertex/fragment pair
//! against each other and merges them into the name-keyed tables a program binds through.

use std::collections::{btree_map::Entry, BTreeMap};
use std::num::NonZeroU64;

use naga::{
    AddressSpace, ArraySize, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind,
    ShaderStage, Type, TypeInner, VectorSize, valid::ModuleInfo,
};

use super::uniform::{TextureKind, UniformType};
use crate::error::LinkError;

/// Parses and validates WGSL. The error string carries naga's annotated diagnostic.
pub fn parse_wgsl(source: &str) -> Result<(Module, ModuleInfo), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| format!("validation error: {}", e.as_inner()))?;
    Ok((module, info))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Float,
    Sint,
    Uint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
    pub components: u32,
    pub kind: AttributeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    pub group: u32,
    pub binding: u32,
    /// Byte offset inside the owning block.
    pub offset: u32,
    /// Array length, 1 for plain values.
    pub count: u32,
    pub stride: u32,
}

impl UniformInfo {
    /// The bytes of the owning block this uniform occupies, arrays included.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        let len = match self.stride {
            0 => self.ty.size(),
            stride => self.count * stride,
        };
        self.offset as usize..(self.offset + len) as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockInfo {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub size: u32,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub sampler_binding: u32,
    pub kind: TextureKind,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Clone, Debug, PartialEq)]
enum ResourceKind {
    Block {
        size: u32,
    },
    Texture {
        dimension: wgpu::TextureViewDimension,
        sample_type: wgpu::TextureSampleType,
    },
    Sampler {
        comparison: bool,
    },
}

#[derive(Clone, Debug)]
struct ResourceDecl {
    name: String,
    group: u32,
    binding: u32,
    visibility: wgpu::ShaderStages,
    kind: ResourceKind,
}

#[derive(Debug)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<AttributeInfo>,
    pub outputs: Vec<AttributeInfo>,
    pub uniforms: Vec<UniformInfo>,
    resources: Vec<ResourceDecl>,
}

/// Reflects the first entry point of `stage` (or the one named `entry`).
pub fn reflect_stage(
    module: &Module,
    info: &ModuleInfo,
    stage: ShaderStage,
    entry: Option<&str>,
) -> Result<StageReflection, LinkError> {
    let index = module
        .entry_points
        .iter()
        .position(|ep| ep.stage == stage && entry.is_none_or(|name| ep.name == name))
        .ok_or(LinkError::MissingEntryPoint(stage))?;
    let ep = &module.entry_points[index];
    let ep_info = info.get_entry_point(index);
    let visibility = match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        _ => wgpu::ShaderStages::COMPUTE,
    };

    let mut inputs = Vec::new();
    for arg in &ep.function.arguments {
        io_locations(module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &ep.function.result {
        io_locations(module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut uniforms = Vec::new();
    let mut resources = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else {
            continue;
        };
        let used = !ep_info[handle].is_empty();
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;
        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, TypeInner::Struct { span, .. }) => {
                flatten(module, var.ty, String::new(), rb, 0, &mut uniforms);
                ResourceKind::Block { size: *span }
            }
            (AddressSpace::Uniform, other) => {
                flatten(module, var.ty, name.clone(), rb, 0, &mut uniforms);
                ResourceKind::Block {
                    size: other.size(module.to_ctx()),
                }
            }
            (AddressSpace::Handle, TypeInner::Image { dim, arrayed, class }) => {
                let Some((dimension, sample_type)) = texture_kind(*dim, *arrayed, class) else {
                    continue;
                };
                ResourceKind::Texture {
                    dimension,
                    sample_type,
                }
            }
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => ResourceKind::Sampler {
                comparison: *comparison,
            },
            _ => continue,
        };
        resources.push(ResourceDecl {
            name,
            group: rb.group,
            binding: rb.binding,
            visibility: if used {
                visibility
            } else {
                wgpu::ShaderStages::NONE
            },
            kind,
        });
    }

    Ok(StageReflection {
        stage,
        entry_point: ep.name.clone(),
        inputs,
        outputs,
        uniforms,
        resources,
    })
}

fn io_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<AttributeInfo>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => {
            let shape = match inner {
                TypeInner::Scalar(scalar) => attribute_kind(scalar.kind).map(|k| (1, k)),
                TypeInner::Vector { size, scalar } => {
                    attribute_kind(scalar.kind).map(|k| (vector_len(*size), k))
                }
                _ => None,
            };
            if let Some((components, kind)) = shape {
                out.push(AttributeInfo {
                    name: name.unwrap_or_default().to_string(),
                    location: *location,
                    components,
                    kind,
                });
            }
        }
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    io_locations(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn flatten(
    module: &Module,
    ty: Handle<Type>,
    name: String,
    rb: &naga::ResourceBinding,
    offset: u32,
    out: &mut Vec<UniformInfo>,
) {
    match &module.types[ty].inner {
        TypeInner::Struct { members, .. } => {
            for member in members {
                let Some(member_name) = &member.name else {
                    continue;
                };
                let full = if name.is_empty() {
                    member_name.clone()
                } else {
                    format!("{name}.{member_name}")
                };
                flatten(module, member.ty, full, rb, offset + member.offset, out);
            }
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => match uniform_type(&module.types[*base].inner) {
            Some(ty) => out.push(UniformInfo {
                name,
                ty,
                group: rb.group,
                binding: rb.binding,
                offset,
                count: count.get(),
                stride: *stride,
            }),
            None => {
                for i in 0..count.get() {
                    flatten(module, *base, format!("{name}[{i}]"), rb, offset + i * stride, out);
                }
            }
        },
        inner => {
            if let Some(ty) = uniform_type(inner) {
                out.push(UniformInfo {
                    name,
                    ty,
                    group: rb.group,
                    binding: rb.binding,
                    offset,
                    count: 1,
                    stride: 0,
                });
            }
        }
    }
}

fn vector_len(size: VectorSize) -> u32 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

fn attribute_kind(kind: ScalarKind) -> Option<AttributeKind> {
    match kind {
        ScalarKind::Float => Some(AttributeKind::Float),
        ScalarKind::Sint => Some(AttributeKind::Sint),
        ScalarKind::Uint => Some(AttributeKind::Uint),
        _ => None,
    }
}

fn uniform_type(inner: &TypeInner) -> Option<UniformType> {
    use UniformType::*;
    Some(match inner {
        TypeInner::Scalar(s) => match s.kind {
            ScalarKind::Float => Float,
            ScalarKind::Sint => Int,
            ScalarKind::Uint => UInt,
            _ => return None,
        },
        TypeInner::Vector { size, scalar } => match (scalar.kind, size) {
            (ScalarKind::Float, VectorSize::Bi) => Vec2,
            (ScalarKind::Float, VectorSize::Tri) => Vec3,
            (ScalarKind::Float, VectorSize::Quad) => Vec4,
            (ScalarKind::Sint, VectorSize::Bi) => IVec2,
            (ScalarKind::Sint, VectorSize::Tri) => IVec3,
            (ScalarKind::Sint, VectorSize::Quad) => IVec4,
            (ScalarKind::Uint, VectorSize::Bi) => UVec2,
            (ScalarKind::Uint, VectorSize::Tri) => UVec3,
            (ScalarKind::Uint, VectorSize::Quad) => UVec4,
            _ => return None,
        },
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } if scalar.kind == ScalarKind::Float => match (columns, rows) {
            (VectorSize::Bi, VectorSize::Bi) => Mat2,
            (VectorSize::Tri, VectorSize::Tri) => Mat3,
            (VectorSize::Quad, VectorSize::Quad) => Mat4,
            _ => return None,
        },
        _ => return None,
    })
}

fn texture_kind(
    dim: ImageDimension,
    arrayed: bool,
    class: &ImageClass,
) -> Option<(wgpu::TextureViewDimension, wgpu::TextureSampleType)> {
    use wgpu::TextureViewDimension as D;
    let dimension = match (dim, arrayed) {
        (ImageDimension::D1, false) => D::D1,
        (ImageDimension::D2, false) => D::D2,
        (ImageDimension::D2, true) => D::D2Array,
        (ImageDimension::D3, false) => D::D3,
        (ImageDimension::Cube, false) => D::Cube,
        (ImageDimension::Cube, true) => D::CubeArray,
        _ => return None,
    };
    let sample_type = match class {
        ImageClass::Sampled {
            kind: ScalarKind::Float,
            multi: false,
        } => wgpu::TextureSampleType::Float { filterable: true },
        ImageClass::Sampled {
            kind: ScalarKind::Sint,
            multi: false,
        } => wgpu::TextureSampleType::Sint,
        ImageClass::Sampled {
            kind: ScalarKind::Uint,
            multi: false,
        } => wgpu::TextureSampleType::Uint,
        ImageClass::Depth { multi: false } => wgpu::TextureSampleType::Depth,
        _ => return None,
    };
    Some((dimension, sample_type))
}

/// A linked vertex/fragment pair.
#[derive(Debug, Default)]
pub struct ProgramReflection {
    pub attributes: BTreeMap<String, AttributeInfo>,
    pub uniforms: BTreeMap<String, UniformInfo>,
    pub blocks: Vec<BlockInfo>,
    pub textures: BTreeMap<String, TextureInfo>,
}

pub fn link(
    vertex: StageReflection,
    fragment: StageReflection,
) -> Result<ProgramReflection, LinkError> {
    for input in &fragment.inputs {
        if !vertex.outputs.iter().any(|o| o.location == input.location) {
            return Err(LinkError::UnmatchedVarying {
                name: input.name.clone(),
                location: input.location,
            });
        }
    }

    let mut resources: BTreeMap<(u32, u32), ResourceDecl> = BTreeMap::new();
    for decl in vertex.resources.into_iter().chain(fragment.resources) {
        match resources.entry((decl.group, decl.binding)) {
            Entry::Vacant(slot) => {
                slot.insert(decl);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().kind != decl.kind {
                    return Err(LinkError::BindingConflict {
                        group: decl.group,
                        binding: decl.binding,
                    });
                }
                slot.get_mut().visibility |= decl.visibility;
            }
        }
    }
    for decl in resources.values_mut() {
        if decl.visibility.is_empty() {
            decl.visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
        }
    }

    let mut uniforms: BTreeMap<String, UniformInfo> = BTreeMap::new();
    for uniform in vertex.uniforms.into_iter().chain(fragment.uniforms) {
        match uniforms.get(&uniform.name) {
            Some(existing) if *existing != uniform => {
                return Err(LinkError::DuplicateUniform(uniform.name));
            }
            Some(_) => {}
            None => {
                uniforms.insert(uniform.name.clone(), uniform);
            }
        }
    }

    let mut blocks = Vec::new();
    let mut textures = BTreeMap::new();
    for decl in resources.values() {
        match &decl.kind {
            ResourceKind::Block { size } => blocks.push(BlockInfo {
                name: decl.name.clone(),
                group: decl.group,
                binding: decl.binding,
                size: *size,
                visibility: decl.visibility,
            }),
            ResourceKind::Texture {
                dimension,
                sample_type,
            } => {
                let sampler_name = format!("{}_sampler", decl.name);
                let sampler = resources.values().find_map(|other| match other.kind {
                    ResourceKind::Sampler { comparison }
                        if other.name == sampler_name && other.group == decl.group =>
                    {
                        Some((other.binding, comparison, other.visibility))
                    }
                    _ => None,
                });
                let Some((sampler_binding, comparison, sampler_visibility)) = sampler else {
                    return Err(LinkError::MissingSampler(decl.name.clone()));
                };
                let kind = TextureKind {
                    dimension: *dimension,
                    sample_type: *sample_type,
                    comparison,
                };
                uniforms.insert(
                    decl.name.clone(),
                    UniformInfo {
                        name: decl.name.clone(),
                        ty: UniformType::Sampler(kind),
                        group: decl.group,
                        binding: decl.binding,
                        offset: 0,
                        count: 1,
                        stride: 0,
                    },
                );
                textures.insert(
                    decl.name.clone(),
                    TextureInfo {
                        name: decl.name.clone(),
                        group: decl.group,
                        binding: decl.binding,
                        sampler_binding,
                        kind,
                        visibility: decl.visibility | sampler_visibility,
                    },
                );
            }
            ResourceKind::Sampler { .. } => {}
        }
    }

    let attributes = vertex
        .inputs
        .into_iter()
        .map(|a| (a.name.clone(), a))
        .collect();

    Ok(ProgramReflection {
        attributes,
        uniforms,
        blocks,
        textures,
    })
}

impl ProgramReflection {
    /// Number of bind groups the pipeline layout needs, gaps included.
    pub fn group_count(&self) -> u32 {
        let blocks = self.blocks.iter().map(|b| b.group + 1);
        let textures = self.textures.values().map(|t| t.group + 1);
        blocks.chain(textures).max().unwrap_or(0)
    }

    /// Layout entries of one group, ordered by binding.
    pub fn layout_entries(&self, group: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut entries = Vec::new();
        for block in self.blocks.iter().filter(|b| b.group == group) {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: block.visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(block.size as u64),
                },
                count: None,
            });
        }
        for texture in self.textures.values().filter(|t| t.group == group) {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture.binding,
                visibility: texture.visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: texture.kind.sample_type,
                    view_dimension: texture.kind.dimension,
                    multisampled: false,
                },
                count: None,
            });
            let sampler_type = match texture.kind.sample_type {
                _ if texture.kind.comparison => wgpu::SamplerBindingType::Comparison,
                wgpu::TextureSampleType::Float { filterable: true } => {
                    wgpu::SamplerBindingType::Filtering
                }
                _ => wgpu::SamplerBindingType::NonFiltering,
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture.sampler_binding,
                visibility: texture.visibility,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            });
        }
        entries.sort_by_key(|e| e.binding);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::uniform::{UniformValue, setter_for};

    const PROGRAM: &str = r#"
struct Transforms {
    model_to_view: mat4x4<f32>,
    normal: mat3x3<f32>,
    tint: vec3<f32>,
    weights: array<vec4<f32>, 2>,
};
@group(0) @binding(0) var<uniform> transforms: Transforms;

struct Shading {
    exposure: f32,
    mode: u32,
};
@group(0) @binding(1) var<uniform> shading: Shading;

@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
@group(1) @binding(2) var sky: texture_cube<f32>;
@group(1) @binding(3) var sky_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>, @location(2) normal: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = transforms.model_to_view * vec4<f32>(position, 1.0);
    out.uv = uv;
    out.normal = transforms.normal * normal + transforms.tint + transforms.weights[1].xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(albedo, albedo_sampler, in.uv);
    let env = textureSample(sky, sky_sampler, in.normal);
    return (base + env) * shading.exposure;
}
"#;

    fn reflect(src: &str) -> Result<ProgramReflection, LinkError> {
        let (module, info) = parse_wgsl(src).expect("wgsl should validate");
        let vs = reflect_stage(&module, &info, ShaderStage::Vertex, None)?;
        let fs = reflect_stage(&module, &info, ShaderStage::Fragment, None)?;
        link(vs, fs)
    }

    #[test]
    fn attributes_are_reflected_by_location() {
        let program = reflect(PROGRAM).unwrap();
        let names: Vec<(&str, u32, u32)> = program
            .attributes
            .values()
            .map(|a| (a.name.as_str(), a.location, a.components))
            .collect();
        assert_eq!(
            names,
            vec![("normal", 2, 3), ("position", 0, 3), ("uv", 1, 2)]
        );
    }

    #[test]
    fn uniform_blocks_are_flattened() {
        let program = reflect(PROGRAM).unwrap();
        let mv = &program.uniforms["model_to_view"];
        assert_eq!((mv.ty, mv.offset, mv.group, mv.binding), (UniformType::Mat4, 0, 0, 0));
        let normal = &program.uniforms["normal"];
        assert_eq!((normal.ty, normal.offset), (UniformType::Mat3, 64));
        assert_eq!(program.uniforms["tint"].offset, 112);
        let weights = &program.uniforms["weights"];
        assert_eq!((weights.count, weights.stride, weights.offset), (2, 16, 128));
        assert_eq!(program.uniforms["mode"].ty, UniformType::UInt);

        let sizes: Vec<u32> = program.blocks.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![160, 8]);
        assert_eq!(program.blocks[0].visibility, wgpu::ShaderStages::VERTEX);
        assert_eq!(program.blocks[1].visibility, wgpu::ShaderStages::FRAGMENT);
    }

    #[test]
    fn textures_pair_with_samplers() {
        let program = reflect(PROGRAM).unwrap();
        let sky = &program.textures["sky"];
        assert_eq!(sky.kind.dimension, wgpu::TextureViewDimension::Cube);
        assert_eq!(sky.sampler_binding, 3);
        assert!(program.uniforms["albedo"].ty.is_sampler());

        assert_eq!(program.group_count(), 2);
        let entries = program.layout_entries(1);
        let bindings: Vec<u32> = entries.iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert!(matches!(
            entries[1].ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        ));
    }

    #[test]
    fn missing_sampler_fails_to_link() {
        let src = r#"
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var other: sampler;
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
@fragment fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(tex, other, vec2<f32>(0.5));
}
"#;
        assert_eq!(
            reflect(src).unwrap_err(),
            LinkError::MissingSampler("tex".into())
        );
    }

    #[test]
    fn unmatched_varying_fails_to_link() {
        let vs = r#"
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
"#;
        let fs = r#"
@fragment fn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {
    return vec4<f32>(shade);
}
"#;
        let (vm, vi) = parse_wgsl(vs).unwrap();
        let (fm, fi) = parse_wgsl(fs).unwrap();
        let vertex = reflect_stage(&vm, &vi, ShaderStage::Vertex, None).unwrap();
        let fragment = reflect_stage(&fm, &fi, ShaderStage::Fragment, None).unwrap();
        assert_eq!(
            link(vertex, fragment).unwrap_err(),
            LinkError::UnmatchedVarying {
                name: "shade".into(),
                location: 3
            }
        );
    }

    #[test]
    fn conflicting_blocks_fail_to_link() {
        let vs = r#"
@group(0) @binding(0) var<uniform> a: vec4<f32>;
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return a; }
"#;
        let fs = r#"
@group(0) @binding(0) var<uniform> b: mat4x4<f32>;
@fragment fn fs_main() -> @location(0) vec4<f32> { return b[0]; }
"#;
        let (vm, vi) = parse_wgsl(vs).unwrap();
        let (fm, fi) = parse_wgsl(fs).unwrap();
        let vertex = reflect_stage(&vm, &vi, ShaderStage::Vertex, None).unwrap();
        let fragment = reflect_stage(&fm, &fi, ShaderStage::Fragment, None).unwrap();
        assert_eq!(
            link(vertex, fragment).unwrap_err(),
            LinkError::BindingConflict {
                group: 0,
                binding: 0
            }
        );
    }

    #[test]
    fn parse_errors_carry_diagnostics() {
        let err = parse_wgsl("fn broken( {").unwrap_err();
        assert!(!err.is_empty());
        let (module, info) = parse_wgsl(
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        )
        .unwrap();
        assert_eq!(
            reflect_stage(&module, &info, ShaderStage::Vertex, None).unwrap_err(),
            LinkError::MissingEntryPoint(ShaderStage::Vertex)
        );
    }

    #[test]
    fn array_writes_stop_at_the_declared_length() {
        let program = reflect(
            r#"
struct Palette {
    weights: array<vec4<f32>, 2>,
    tint: vec4<f32>,
};
@group(0) @binding(0) var<uniform> palette: Palette;
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return palette.weights[1]; }
@fragment fn fs_main() -> @location(0) vec4<f32> { return palette.tint; }
"#,
        )
        .unwrap();
        let weights = &program.uniforms["weights"];
        let tint = &program.uniforms["tint"];
        assert_eq!(weights.byte_range(), 0..32);
        assert_eq!(tint.byte_range(), 32..48);

        let mut block = vec![0u8; 48];
        let set = setter_for(UniformType::Vec4).unwrap();
        let too_long = [1.0f32; 12];
        let dst = &mut block[weights.byte_range()];
        assert!(set(dst, weights.stride, &UniformValue::Floats(&too_long)).is_none());
        let dst = &mut block[weights.byte_range()];
        assert!(set(dst, weights.stride, &UniformValue::Floats(&too_long[..8])).is_some());

        let written: &[f32] = bytemuck::cast_slice(&block);
        assert_eq!(&written[..8], &[1.0; 8]);
        assert_eq!(&written[8..], &[0.0; 4]);
    }
}
