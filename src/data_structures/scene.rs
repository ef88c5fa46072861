//! Index-addressed scene documents.
//!
//! A [`Document`] mirrors the layout of a glTF asset: flat arrays cross-referencing each other
//! by plain indices. Loaders fill it, [`Document::validate`] checks every reference once, and
//! the renderer afterwards only reads it.

use cgmath::{Matrix4, Quaternion, Vector3};
use image::RgbaImage;

use crate::{error::SceneError, math};

pub const NEAREST: u32 = 9728;
pub const LINEAR: u32 = 9729;
pub const NEAREST_MIPMAP_NEAREST: u32 = 9984;
pub const LINEAR_MIPMAP_NEAREST: u32 = 9985;
pub const NEAREST_MIPMAP_LINEAR: u32 = 9986;
pub const LINEAR_MIPMAP_LINEAR: u32 = 9987;
pub const REPEAT: u32 = 10497;
pub const CLAMP_TO_EDGE: u32 = 33071;
pub const MIRRORED_REPEAT: u32 = 33648;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    UnsignedInt,
    Float,
}

impl ComponentType {
    pub fn from_gl(code: u32) -> Option<Self> {
        Some(match code {
            5120 => Self::Byte,
            5121 => Self::UnsignedByte,
            5122 => Self::Short,
            5123 => Self::UnsignedShort,
            5125 => Self::UnsignedInt,
            5126 => Self::Float,
            _ => return None,
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::UnsignedInt | Self::Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl AccessorType {
    pub fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// Primitive topology, numbered as in glTF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveMode {
    pub fn from_gl(mode: u32) -> Option<Self> {
        Some(match mode {
            0 => Self::Points,
            1 => Self::Lines,
            2 => Self::LineLoop,
            3 => Self::LineStrip,
            4 => Self::Triangles,
            5 => Self::TriangleStrip,
            6 => Self::TriangleFan,
            _ => return None,
        })
    }

    /// wgpu has no loops or fans.
    pub fn topology(self) -> Option<wgpu::PrimitiveTopology> {
        match self {
            Self::Points => Some(wgpu::PrimitiveTopology::PointList),
            Self::Lines => Some(wgpu::PrimitiveTopology::LineList),
            Self::LineStrip => Some(wgpu::PrimitiveTopology::LineStrip),
            Self::Triangles => Some(wgpu::PrimitiveTopology::TriangleList),
            Self::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
            Self::LineLoop | Self::TriangleFan => None,
        }
    }
}

/// A node's local transform: either an explicit matrix or a TRS triple, never both.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalTransform {
    Matrix([f32; 16]),
    Trs {
        translation: [f32; 3],
        rotation: [f32; 4],
        scale: [f32; 3],
    },
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::Trs {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl LocalTransform {
    pub fn matrix(&self) -> Matrix4<f32> {
        match *self {
            Self::Matrix(m) => math::from_array(m),
            Self::Trs {
                translation,
                rotation: [x, y, z, w],
                scale,
            } => math::compose(
                Vector3::from(translation),
                Quaternion::new(w, x, y, z),
                Vector3::from(scale),
            ),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub transform: LocalTransform,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Primitive {
    pub indices: Option<usize>,
    pub position: Option<usize>,
    pub normal: Option<usize>,
    pub tex_coord: Option<usize>,
    pub material: Option<usize>,
    pub mode: PrimitiveMode,
}

impl Default for Primitive {
    fn default() -> Self {
        Self {
            indices: None,
            position: None,
            normal: None,
            tex_coord: None,
            material: None,
            mode: PrimitiveMode::Triangles,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_texture: None,
            metallic_roughness_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRef {
    pub source: usize,
    pub sampler: Option<usize>,
}

/// Sampler parameters as GL enums. Unset filters fall back to `NEAREST`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerDef {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for SamplerDef {
    fn default() -> Self {
        Self {
            mag_filter: None,
            min_filter: None,
            wrap_s: REPEAT,
            wrap_t: REPEAT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    /// `ARRAY_BUFFER`
    Vertex,
    /// `ELEMENT_ARRAY_BUFFER`
    Index,
}

impl BufferTarget {
    pub fn from_gl(target: u32) -> Option<Self> {
        match target {
            34962 => Some(Self::Vertex),
            34963 => Some(Self::Index),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferView {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    pub target: Option<BufferTarget>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    pub byte_offset: usize,
    pub count: usize,
    pub component_type: ComponentType,
    pub accessor_type: AccessorType,
    pub normalized: bool,
}

impl Accessor {
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.accessor_type.components()
    }
}

/// Raw buffer bytes along with the length the document declared for them.
#[derive(Clone, Debug, Default)]
pub struct BufferData {
    pub byte_length: usize,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Document {
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureRef>,
    pub images: Vec<RgbaImage>,
    pub samplers: Vec<SamplerDef>,
    pub accessors: Vec<Accessor>,
    pub buffer_views: Vec<BufferView>,
    pub buffers: Vec<BufferData>,
    pub scenes: Vec<Scene>,
    /// The scene to show by default.
    pub scene: Option<usize>,
}

fn check(kind: &'static str, index: usize, len: usize) -> Result<(), SceneError> {
    if index < len {
        Ok(())
    } else {
        Err(SceneError::IndexOutOfRange { kind, index, len })
    }
}

impl Document {
    /// A one-mesh, one-node document from raw geometry, without textures.
    pub fn from_geometry(
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        uvs: &[[f32; 2]],
        indices: &[u16],
    ) -> Self {
        let mut data: Vec<u8> = Vec::new();
        let mut views = Vec::new();
        let mut push_view = |bytes: &[u8], target| {
            let byte_offset = data.len();
            data.extend_from_slice(bytes);
            data.resize(data.len().next_multiple_of(4), 0);
            views.push(BufferView {
                buffer: 0,
                byte_offset,
                byte_length: bytes.len(),
                byte_stride: None,
                target: Some(target),
            });
            views.len() - 1
        };
        let position = push_view(bytemuck::cast_slice(positions), BufferTarget::Vertex);
        let normal = push_view(bytemuck::cast_slice(normals), BufferTarget::Vertex);
        let uv = push_view(bytemuck::cast_slice(uvs), BufferTarget::Vertex);
        let index = push_view(bytemuck::cast_slice(indices), BufferTarget::Index);

        let accessor = |view, count, component_type, accessor_type| Accessor {
            buffer_view: Some(view),
            byte_offset: 0,
            count,
            component_type,
            accessor_type,
            normalized: false,
        };
        let accessors = vec![
            accessor(position, positions.len(), ComponentType::Float, AccessorType::Vec3),
            accessor(normal, normals.len(), ComponentType::Float, AccessorType::Vec3),
            accessor(uv, uvs.len(), ComponentType::Float, AccessorType::Vec2),
            accessor(index, indices.len(), ComponentType::UnsignedShort, AccessorType::Scalar),
        ];

        Self {
            nodes: vec![Node {
                mesh: Some(0),
                ..Default::default()
            }],
            meshes: vec![Mesh {
                name: None,
                primitives: vec![Primitive {
                    indices: Some(3),
                    position: Some(0),
                    normal: Some(1),
                    tex_coord: Some(2),
                    material: Some(0),
                    mode: PrimitiveMode::Triangles,
                }],
            }],
            materials: vec![Material::default()],
            accessors,
            buffer_views: views,
            buffers: vec![BufferData {
                byte_length: data.len(),
                data,
            }],
            scenes: vec![Scene {
                name: None,
                nodes: vec![0],
            }],
            scene: Some(0),
            ..Default::default()
        }
    }

    /// The bytes a buffer view covers.
    pub fn view_bytes(&self, view: usize) -> Result<&[u8], SceneError> {
        check("buffer view", view, self.buffer_views.len())?;
        let def = &self.buffer_views[view];
        check("buffer", def.buffer, self.buffers.len())?;
        let end = def
            .byte_offset
            .checked_add(def.byte_length)
            .ok_or(SceneError::ViewOutOfBounds(view))?;
        self.buffers[def.buffer]
            .data
            .get(def.byte_offset..end)
            .ok_or(SceneError::ViewOutOfBounds(view))
    }

    /// Checks every cross reference, byte range and the node hierarchy. A document that
    /// passes can be rendered without further bounds checks failing.
    pub fn validate(&self) -> Result<(), SceneError> {
        for (index, buffer) in self.buffers.iter().enumerate() {
            if buffer.data.len() != buffer.byte_length {
                return Err(SceneError::ByteLength {
                    index,
                    expected: buffer.byte_length,
                    found: buffer.data.len(),
                });
            }
        }
        for view in 0..self.buffer_views.len() {
            self.view_bytes(view)?;
        }
        for (index, accessor) in self.accessors.iter().enumerate() {
            self.validate_accessor(index, accessor)?;
        }
        for texture in &self.textures {
            check("image", texture.source, self.images.len())?;
            if let Some(sampler) = texture.sampler {
                check("sampler", sampler, self.samplers.len())?;
            }
        }
        for material in &self.materials {
            for texture in [material.base_color_texture, material.metallic_roughness_texture]
                .into_iter()
                .flatten()
            {
                check("texture", texture, self.textures.len())?;
            }
        }
        for (mesh, def) in self.meshes.iter().enumerate() {
            for (primitive, def) in def.primitives.iter().enumerate() {
                self.validate_primitive(mesh, primitive, def)?;
            }
        }
        for node in &self.nodes {
            if let Some(mesh) = node.mesh {
                check("mesh", mesh, self.meshes.len())?;
            }
            for &child in &node.children {
                check("node", child, self.nodes.len())?;
            }
        }
        for scene in &self.scenes {
            for &node in &scene.nodes {
                check("node", node, self.nodes.len())?;
            }
        }
        if let Some(scene) = self.scene {
            check("scene", scene, self.scenes.len())?;
        }
        self.check_acyclic()
    }

    /// Accessors without a buffer view (sparse or zero-filled) only matter once a primitive
    /// draws from them.
    fn validate_accessor(&self, index: usize, accessor: &Accessor) -> Result<(), SceneError> {
        let Some(view) = accessor.buffer_view else {
            return Ok(());
        };
        check("buffer view", view, self.buffer_views.len())?;
        if accessor.count == 0 {
            return Ok(());
        }
        let element = accessor.element_size();
        let stride = self.buffer_views[view].byte_stride.unwrap_or(element);
        let end = (accessor.count - 1)
            .checked_mul(stride)
            .and_then(|span| span.checked_add(accessor.byte_offset))
            .and_then(|span| span.checked_add(element));
        match end {
            Some(end) if end <= self.buffer_views[view].byte_length => Ok(()),
            _ => Err(SceneError::AccessorOutOfBounds(index)),
        }
    }

    fn drawable_accessor(&self, index: usize) -> Result<(), SceneError> {
        check("accessor", index, self.accessors.len())?;
        match self.accessors[index].buffer_view {
            Some(_) => Ok(()),
            None => Err(SceneError::MissingBufferView(index)),
        }
    }

    fn validate_primitive(
        &self,
        mesh: usize,
        primitive: usize,
        def: &Primitive,
    ) -> Result<(), SceneError> {
        let missing = |semantic| SceneError::MissingAttribute {
            mesh,
            primitive,
            semantic,
        };
        for (accessor, semantic) in [
            (def.position, "POSITION"),
            (def.normal, "NORMAL"),
            (def.tex_coord, "TEXCOORD_0"),
        ] {
            self.drawable_accessor(accessor.ok_or_else(|| missing(semantic))?)?;
        }
        if let Some(indices) = def.indices {
            self.drawable_accessor(indices)?;
            let accessor = &self.accessors[indices];
            let integral = matches!(
                accessor.component_type,
                ComponentType::UnsignedByte | ComponentType::UnsignedShort | ComponentType::UnsignedInt
            );
            if !integral || accessor.accessor_type != AccessorType::Scalar {
                return Err(SceneError::UnsupportedIndexType(indices));
            }
        }
        if let Some(material) = def.material {
            check("material", material, self.materials.len())?;
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), SceneError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut marks = vec![Mark::New; self.nodes.len()];
        for root in 0..self.nodes.len() {
            if marks[root] != Mark::New {
                continue;
            }
            // (node, next child) pairs
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Open;
            while let Some((node, child)) = stack.pop() {
                match self.nodes[node].children.get(child) {
                    Some(&next) => {
                        stack.push((node, child + 1));
                        match marks[next] {
                            Mark::Open => return Err(SceneError::Cycle(next)),
                            Mark::New => {
                                marks[next] = Mark::Open;
                                stack.push((next, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => marks[node] = Mark::Done,
                }
            }
        }
        Ok(())
    }

    /// World matrices of every node reachable from `scene`, in traversal order.
    pub fn world_matrices(&self, scene: usize, parent: Matrix4<f32>) -> Vec<(usize, Matrix4<f32>)> {
        match self.scenes.get(scene) {
            Some(scene) => self.subtree_matrices(&scene.nodes, parent),
            None => Vec::new(),
        }
    }

    /// World matrices of `roots` and their descendants, parents before children. Each root
    /// is placed under `parent`.
    pub fn subtree_matrices(
        &self,
        roots: &[usize],
        parent: Matrix4<f32>,
    ) -> Vec<(usize, Matrix4<f32>)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, Matrix4<f32>)> =
            roots.iter().rev().map(|&n| (n, parent)).collect();
        while let Some((node, parent)) = stack.pop() {
            let Some(def) = self.nodes.get(node) else {
                continue;
            };
            let world = math::multiply(&parent, &def.transform.matrix());
            out.push((node, world));
            stack.extend(def.children.iter().rev().map(|&c| (c, world)));
        }
        out
    }
}
